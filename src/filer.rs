//! The minimal capability an engine must implement ([`Filer`]), the
//! iteration capability it may additionally provide ([`Searcher`]), and
//! their intersection ([`Store`]).

use crate::error::{KeeperError, Result};
use crate::keyvalue::KeyValuePair;

/// CRUD + lifecycle operations every engine must implement.
///
/// Invariant: after [`Filer::close`] returns `Ok`, every subsequent operation
/// on that handle fails with [`KeeperError::Closed`]; a second `close` fails
/// distinguishably (also `Closed`) rather than panicking.
pub trait Filer: Send + Sync {
    fn has(&self, key: &[u8]) -> Result<bool>;

    /// Returns `Ok(None)` if the key has no associated value. Engines that
    /// cannot natively distinguish "absent" from "error" should return
    /// whatever their backend gives back and let [`crate::regularize`]
    /// normalize it at a higher layer; this trait's contract is the
    /// unambiguous one.
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>>;

    fn put(&self, key: &[u8], value: &[u8]) -> Result<()>;

    fn delete(&self, key: &[u8]) -> Result<()>;

    fn keys(&self) -> Result<Vec<Vec<u8>>>;

    fn len(&self) -> Result<usize>;

    fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Flush any buffered writes to stable storage.
    fn sync(&self) -> Result<()>;

    /// Shut the engine down. Idempotent-unsafe by design: a second call must
    /// fail with [`KeeperError::Closed`] so callers can detect use-after-close
    /// bugs instead of silently no-op'ing.
    fn close(&self) -> Result<()>;

    /// Cheap, lock-free check of whether [`Filer::close`] has already run.
    /// The keeper uses this to evict tombstoned map entries in `with`
    /// without having to provoke a [`KeeperError::Closed`] by calling an
    /// operation. Engines that never close out from under their keeper can
    /// leave this `false`.
    fn is_closed(&self) -> bool {
        false
    }

    /// Debug escape hatch: engines may expose their concrete handle for
    /// diagnostics. Default: nothing to show.
    fn backend(&self) -> Option<&(dyn std::any::Any + Send + Sync)> {
        None
    }
}

/// Iteration capability: prefix scan, full-value scan, existence check.
/// A [`Filer`] is promotable to a [`Store`] only when its engine supports
/// this; engines that can't enumerate keys (for example, a pure
/// write-optimized log without an index) implement [`Filer`] alone.
pub trait Searcher: Send + Sync {
    /// All keys that start with `prefix`, paired with their current value.
    fn prefix_scan(&self, prefix: &[u8]) -> Result<Vec<KeyValuePair>>;

    /// All pairs whose value contains `query` as a byte substring.
    fn value_scan(&self, query: &[u8]) -> Result<Vec<KeyValuePair>>;

    /// The first key (in iteration order) whose value equals `value` exactly.
    fn value_exists(&self, value: &[u8]) -> Result<Option<Vec<u8>>>;
}

/// The intersection of [`Filer`] and [`Searcher`]: a fully capable store.
pub trait Store: Filer + Searcher {}

impl<T: Filer + Searcher + ?Sized> Store for T {}

/// What the keeper actually registers per store name: every engine
/// implements at least [`Filer`]; [`Engine::as_searcher`] is the capability
/// query the keeper uses to decide whether a handle is promotable to a
/// [`Store`].
pub trait Engine: Filer {
    fn as_searcher(&self) -> Option<&dyn Searcher> {
        None
    }
}

/// Borrowed view combining a [`Filer`] and a [`Searcher`] reference into a
/// single object that satisfies [`Store`]. This is how [`as_store`]
/// realizes the spec's "downcasting to `Store` is explicit and fallible"
/// design note without requiring every engine to hand back a single
/// concrete type that implements both traits.
pub struct StoreView<'a> {
    filer: &'a dyn Filer,
    searcher: &'a dyn Searcher,
}

impl<'a> Filer for StoreView<'a> {
    fn has(&self, key: &[u8]) -> Result<bool> {
        self.filer.has(key)
    }
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.filer.get(key)
    }
    fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.filer.put(key, value)
    }
    fn delete(&self, key: &[u8]) -> Result<()> {
        self.filer.delete(key)
    }
    fn keys(&self) -> Result<Vec<Vec<u8>>> {
        self.filer.keys()
    }
    fn len(&self) -> Result<usize> {
        self.filer.len()
    }
    fn sync(&self) -> Result<()> {
        self.filer.sync()
    }
    fn close(&self) -> Result<()> {
        self.filer.close()
    }
    fn backend(&self) -> Option<&(dyn std::any::Any + Send + Sync)> {
        self.filer.backend()
    }
}

impl<'a> Searcher for StoreView<'a> {
    fn prefix_scan(&self, prefix: &[u8]) -> Result<Vec<KeyValuePair>> {
        self.searcher.prefix_scan(prefix)
    }
    fn value_scan(&self, query: &[u8]) -> Result<Vec<KeyValuePair>> {
        self.searcher.value_scan(query)
    }
    fn value_exists(&self, value: &[u8]) -> Result<Option<Vec<u8>>> {
        self.searcher.value_exists(value)
    }
}

/// Attempt to view an [`Engine`] handle as a [`Store`]. Returns
/// [`KeeperError::NotStore`] when the underlying engine doesn't also
/// implement [`Searcher`].
pub fn as_store(engine: &dyn Engine) -> Result<StoreView<'_>> {
    match engine.as_searcher() {
        Some(searcher) => Ok(StoreView { filer: engine, searcher }),
        None => Err(KeeperError::NotStore),
    }
}
