//! Process-wide registry mapping an engine name to the constructor that
//! opens one store directory for that engine.
//!
//! A [`Keeper`](crate::keeper::Keeper) is generic over *which* engine it
//! hosts; the registry is how [`crate::loader`] turns the `type` field of a
//! `meta.json` back into a live constructor without the caller having to
//! link every engine crate explicitly.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::Result;
use crate::filer::Engine;

/// Opens a single store directory for one engine, given its path and an
/// opaque, engine-specific options blob (round-tripped verbatim through
/// `Metadata::default_store_opts`, per the open question in SPEC_FULL.md §9).
pub type EngineConstructor =
    Arc<dyn Fn(&Path, Option<serde_json::Value>) -> Result<Arc<dyn Engine>> + Send + Sync>;

static REGISTRY: once_cell::sync::Lazy<RwLock<HashMap<String, EngineConstructor>>> =
    once_cell::sync::Lazy::new(|| RwLock::new(HashMap::new()));

/// Register (or silently overwrite) the constructor for `name`. Overwriting
/// is intentional: it's what lets tests install doubles for an engine name
/// without a separate "unregister" dance.
pub fn register(name: impl Into<String>, ctor: EngineConstructor) {
    REGISTRY.write().insert(name.into(), ctor);
}

/// Look up the constructor registered under `name`.
pub fn get(name: &str) -> Option<EngineConstructor> {
    REGISTRY.read().get(name).cloned()
}

/// All currently registered engine names.
pub fn list() -> Vec<String> {
    REGISTRY.read().keys().cloned().collect()
}

/// Remove every registered engine. Test-only: production code never needs to
/// un-register an engine mid-process.
#[cfg(test)]
pub fn clear() {
    REGISTRY.write().clear();
}

#[cfg(test)]
mod registry_tests;
