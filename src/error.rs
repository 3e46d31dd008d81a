//! Unified error taxonomy for the keeper/store lifecycle.
//!
//! Every fallible operation in this crate returns [`KeeperError`]. Bulk
//! operations that apply to every open store (`sync_all`, `close_all`) never
//! short-circuit; they collect every failure into [`KeeperError::Compound`]
//! so no sub-error is silently dropped.

use std::fmt;

use thiserror::Error;

/// Stable error identities shared across every engine this crate can host.
#[derive(Debug, Error)]
pub enum KeeperError {
    #[error("unknown action")]
    UnknownAction,

    #[error("bogus store: {0}")]
    BogusStore(String),

    #[error("store already exists: {0}")]
    StoreExists(String),

    #[error("no stores initialized")]
    NoStores,

    #[error("bad options for store {store}: {reason}")]
    BadOptions { store: String, reason: String },

    #[error("key {} does not exist or has no value", String::from_utf8_lossy(.key))]
    NonExistentKey {
        key: Vec<u8>,
        #[source]
        underlying: Option<Box<KeeperError>>,
    },

    #[error("value does not satisfy the Store capability (Filer is not iterable)")]
    NotStore,

    #[error("duplicate keys found in destination stores: {}", describe_duplicates(.0))]
    DuplicateKeys(std::collections::BTreeMap<String, Vec<Vec<u8>>>),

    #[error("metadata document is empty")]
    EmptyMeta,

    #[error("metadata is of a different type, cannot cast")]
    NotCanonicalMetadata,

    #[error("store is closed")]
    Closed,

    #[error("engine {engine} not registered")]
    UnknownEngine { engine: String },

    /// Signals that an engine's on-disk metadata looks truncated/corrupt in
    /// a way [`crate::keeper::discover`]'s recovery hook knows how to try to
    /// repair (quarantine the index file, drop a stale lock, retry once).
    #[error("corrupt engine metadata for store {store}: {reason}")]
    CorruptEngineMetadata { store: String, reason: String },

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{context}: {source}")]
    Json {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("{store}: {message}")]
    Engine { store: String, message: String },

    #[error("{}", join_compound(.0))]
    Compound(Vec<KeeperError>),
}

fn describe_duplicates(m: &std::collections::BTreeMap<String, Vec<Vec<u8>>>) -> String {
    m.iter()
        .map(|(store, keys)| format!("{store}=[{}]", keys.len()))
        .collect::<Vec<_>>()
        .join(", ")
}

fn join_compound(errs: &[KeeperError]) -> String {
    errs.iter().map(|e| e.to_string()).collect::<Vec<_>>().join("; ")
}

impl KeeperError {
    /// True if this is (or wraps, via [`KeeperError::Compound`]) a [`KeeperError::NonExistentKey`].
    pub fn is_non_existent_key(&self) -> bool {
        match self {
            KeeperError::NonExistentKey { .. } => true,
            KeeperError::Compound(errs) => errs.iter().any(KeeperError::is_non_existent_key),
            _ => false,
        }
    }

    /// Wrap an I/O error with a short, human-readable location prefix.
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        KeeperError::Io { context: context.into(), source }
    }

    /// Wrap a JSON (de)serialization error with a short location prefix.
    pub fn json(context: impl Into<String>, source: serde_json::Error) -> Self {
        KeeperError::Json { context: context.into(), source }
    }

    /// Build an engine-local error, naming the offending store.
    pub fn engine(store: impl Into<String>, message: impl fmt::Display) -> Self {
        KeeperError::Engine { store: store.into(), message: message.to_string() }
    }

    /// Fold a list of fallible results into `Ok(())` if all succeeded, or a
    /// [`KeeperError::Compound`] retaining every failure otherwise.
    pub fn compound(errs: Vec<KeeperError>) -> Result<(), KeeperError> {
        if errs.is_empty() {
            Ok(())
        } else if errs.len() == 1 {
            Err(errs.into_iter().next().unwrap())
        } else {
            Err(KeeperError::Compound(errs))
        }
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, KeeperError>;

#[cfg(test)]
mod error_tests;
