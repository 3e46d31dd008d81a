//! Concrete [`crate::filer::Engine`] implementations bundled with this crate.
//!
//! An engine crate only needs to provide a constructor matching
//! [`crate::registry::EngineConstructor`] and register it under a name; the
//! keeper/store lifecycle machinery is entirely engine-agnostic. `logdb` is
//! the one engine this crate ships out of the box, so the facade is usable
//! and testable without pulling in a separate crate.

pub mod logdb;

use std::sync::Once;

static REGISTER_BUILTINS: Once = Once::new();

/// Register every engine this crate bundles. Idempotent and cheap to call
/// repeatedly; [`crate::loader::open_keeper`] calls it once per process via
/// [`Once`] so a caller never has to remember to do it themselves — the
/// closest idiomatic-Rust equivalent of the Go original's `func init()`
/// self-registration, since this crate has no `ctor`-style dependency to run
/// code at library-load time.
pub fn ensure_registered() {
    REGISTER_BUILTINS.call_once(|| {
        crate::registry::register("logdb", std::sync::Arc::new(logdb::open));
    });
}
