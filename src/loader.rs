//! Top-level entry point: turn a directory on disk into a live [`Keeper`].
//!
//! Grounded on the Go original's `loader.OpenKeeper`: stat the path, read
//! `meta.json` to learn which engine the directory was created with, look
//! the engine up in the registry, build a [`Keeper`], and run an initial
//! [`Keeper::discover`] so every existing store subdirectory comes back
//! online immediately. Unlike [`Keeper::new`], this entry point requires the
//! directory and its `meta.json` to already exist — it opens a keeper
//! created elsewhere, it doesn't create one from scratch.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use tracing::{info, instrument};

use crate::engines;
use crate::error::{KeeperError, Result};
use crate::keeper::Keeper;
use crate::metadata::Metadata;
use crate::registry;

/// Open an existing keeper directory. Fails if `path` doesn't exist, if
/// `meta.json` is missing or unparseable, or if no engine is registered
/// under the type named in `meta.json`. Always registers this crate's
/// bundled engines first, so callers never have to call
/// [`engines::ensure_registered`] themselves.
#[instrument(fields(path = %path.as_ref().display()))]
pub fn open_keeper(path: impl AsRef<Path>) -> Result<Arc<Keeper>> {
    engines::ensure_registered();
    let path = path.as_ref();

    fs::metadata(path).map_err(|e| KeeperError::io(format!("stat {}", path.display()), e))?;
    let meta = Metadata::load(path)?;

    let ctor = registry::get(&meta.kind).ok_or_else(|| KeeperError::UnknownEngine { engine: meta.kind.clone() })?;
    let keeper = Arc::new(Keeper::new(path, meta.kind.clone(), ctor));
    let (_, recovered_errs) = keeper.discover(false)?;
    if let Some(e) = recovered_errs {
        return Err(e);
    }
    info!(path = %path.display(), engine = %meta.kind, "keeper opened");
    Ok(keeper)
}

#[cfg(test)]
mod loader_tests;
