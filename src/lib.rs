//! `keeperdb` — an embeddable multi-store key/value database facade.
//!
//! A [`keeper::Keeper`] roots a directory tree of independently-named
//! stores, each backed by a pluggable [`filer::Engine`] registered under a
//! name in [`registry`]. The same contract — init/with/close/destroy,
//! discover, backup/restore, migration — applies regardless of which engine
//! implements a given store.

pub mod backup;
pub mod engines;
pub mod error;
pub mod filer;
pub mod keeper;
pub mod keyvalue;
pub mod loader;
pub mod metadata;
pub mod migrator;
pub mod regularize;
pub mod registry;
pub mod search;

pub use error::{KeeperError, Result};
pub use filer::{Engine, Filer, Searcher, Store};
pub use keeper::Keeper;
pub use keyvalue::{Key, KeyValuePair, Value};
pub use metadata::Metadata;
pub use migrator::Migrator;

/// Installs a process-wide `tracing` subscriber for test binaries only.
/// Library code never installs a global subscriber on behalf of its
/// caller — this exists purely so `#[test]` runs have readable output
/// when `RUST_LOG` is set.
#[cfg(test)]
pub fn init_test_tracing() {
    use std::sync::Once;
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .or_else(|_| tracing_subscriber::EnvFilter::try_new("warn"))
            .unwrap();
        let _ = tracing_subscriber::fmt().with_env_filter(filter).with_test_writer().try_init();
    });
}
