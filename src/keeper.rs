//! The per-directory lifecycle core: init, discover, open/close/destroy/sync
//! of many named stores, backed by a single registered engine.
//!
//! A [`Keeper`] is generic over *which* engine it hosts (picked once, at
//! construction, via an [`EngineConstructor`]); the lifecycle machinery here
//! — the store map, the metadata document, the locking discipline — is the
//! same regardless of engine. This is the "keeper-and-store lifecycle
//! subsystem" that spec.md calls the core of the system.

mod discover;

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info, instrument};

use crate::error::{KeeperError, Result};
use crate::filer::Engine;
use crate::metadata::Metadata;
use crate::registry::EngineConstructor;

pub(crate) struct KeeperInner {
    pub(crate) stores: HashMap<String, Arc<dyn Engine>>,
    pub(crate) meta: Metadata,
}

/// The root object for a directory. See module docs.
pub struct Keeper {
    path: PathBuf,
    engine_type: String,
    ctor: EngineConstructor,
    pub(crate) inner: RwLock<KeeperInner>,
    initialized: AtomicBool,
    /// Serializes `backup_all`/`restore_all` against each other. Deliberately
    /// separate from `inner`'s `RwLock`: backup/restore call ordinary
    /// lifecycle methods (`discover`, `sync_all`, `close_all`, `destroy`)
    /// that each take `inner`'s lock on their own, so a single outer lock
    /// here avoids re-entrant acquisition while still giving the whole-keeper
    /// quiescence spec.md §4.4 asks for.
    pub(crate) backup_lock: parking_lot::Mutex<()>,
}

impl Keeper {
    /// Construct a `Keeper` rooted at `path` for the given registered engine
    /// type. Does not touch the filesystem yet — initialization happens
    /// lazily on first use, per spec.md §4.2.
    pub fn new(path: impl Into<PathBuf>, engine_type: impl Into<String>, ctor: EngineConstructor) -> Self {
        Keeper {
            path: path.into(),
            engine_type: engine_type.into(),
            ctor,
            inner: RwLock::new(KeeperInner { stores: HashMap::new(), meta: Metadata::new("") }),
            initialized: AtomicBool::new(false),
            backup_lock: parking_lot::Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn engine_type(&self) -> &str {
        &self.engine_type
    }

    /// Current metadata snapshot.
    pub fn meta(&self) -> Result<Metadata> {
        self.ensure_initialized()?;
        Ok(self.inner.read().meta.clone())
    }

    /// First-entry initialization: create the root directory if missing,
    /// read or create `meta.json`, verify engine-type agreement.
    #[instrument(skip(self), fields(path = %self.path.display()))]
    fn ensure_initialized(&self) -> Result<()> {
        if self.initialized.load(Ordering::Acquire) {
            return Ok(());
        }
        let mut inner = self.inner.write();
        // Re-check under the lock: another thread may have beaten us here.
        if self.initialized.load(Ordering::Acquire) {
            return Ok(());
        }

        match fs::metadata(&self.path) {
            Ok(stat) if stat.is_dir() => {}
            Ok(_) => {
                return Err(KeeperError::io(
                    format!("{} exists and is not a directory", self.path.display()),
                    std::io::Error::new(std::io::ErrorKind::AlreadyExists, "not a directory"),
                ))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                fs::create_dir_all(&self.path)
                    .map_err(|e| KeeperError::io(format!("creating {}", self.path.display()), e))?;
                #[cfg(unix)]
                {
                    use std::os::unix::fs::PermissionsExt;
                    let perms = fs::Permissions::from_mode(0o700);
                    let _ = fs::set_permissions(&self.path, perms);
                }
            }
            Err(e) => return Err(KeeperError::io(format!("stat {}", self.path.display()), e)),
        }

        let meta_path = self.path.join(crate::metadata::META_FILENAME);
        let meta = match fs::metadata(&meta_path) {
            Ok(stat) if stat.is_dir() => {
                return Err(KeeperError::io(
                    format!("{} is a directory", meta_path.display()),
                    std::io::Error::new(std::io::ErrorKind::InvalidInput, "meta.json is a directory"),
                ))
            }
            Ok(_) => {
                let loaded = Metadata::load(&self.path)?;
                if loaded.kind != self.engine_type {
                    return Err(KeeperError::BadOptions {
                        store: String::new(),
                        reason: format!(
                            "keeper engine type mismatch: meta.json says {}, opened as {}",
                            loaded.kind, self.engine_type
                        ),
                    });
                }
                loaded
            }
            Err(_) => {
                let mut fresh = Metadata::new(self.engine_type.clone());
                fresh.sync(&self.path)?;
                fresh
            }
        };

        info!(engine = %self.engine_type, "keeper initialized");
        inner.meta = meta;
        drop(inner);
        self.initialized.store(true, Ordering::Release);
        Ok(())
    }

    /// Open a new store subdirectory. Fails with [`KeeperError::StoreExists`]
    /// if already open.
    #[instrument(skip(self, opts), fields(store = %name))]
    pub fn init(&self, name: &str, opts: Option<serde_json::Value>) -> Result<()> {
        self.ensure_initialized()?;
        let mut inner = self.inner.write();
        if inner.stores.contains_key(name) {
            return Err(KeeperError::StoreExists(name.to_string()));
        }
        let store_path = self.path.join(name);
        let engine = (self.ctor)(&store_path, opts.or_else(|| inner.meta.default_store_opts.clone()))
            .map_err(|e| match e {
                KeeperError::BadOptions { reason, .. } => {
                    KeeperError::BadOptions { store: name.to_string(), reason }
                }
                other => other,
            })?;
        inner.stores.insert(name.to_string(), engine);
        inner.meta.add_store(name);
        debug!("store initialized");
        Ok(())
    }

    /// Return the currently-open store, or `None`. A record whose engine
    /// reports itself closed is evicted from the map and `None` is returned,
    /// per spec.md's `With` contract.
    pub fn with(&self, name: &str) -> Result<Option<Arc<dyn Engine>>> {
        self.ensure_initialized()?;
        {
            let inner = self.inner.read();
            if let Some(engine) = inner.stores.get(name) {
                if !engine.is_closed() {
                    return Ok(Some(Arc::clone(engine)));
                }
            } else {
                return Ok(None);
            }
        }
        // Evict the tombstone under the write lock.
        let mut inner = self.inner.write();
        inner.stores.remove(name);
        Ok(None)
    }

    /// Return the existing open store, else [`Keeper::init`] and return it.
    pub fn with_new(&self, name: &str, opts: Option<serde_json::Value>) -> Result<Arc<dyn Engine>> {
        if let Some(existing) = self.with(name)? {
            return Ok(existing);
        }
        match self.init(name, opts) {
            Ok(()) | Err(KeeperError::StoreExists(_)) => {}
            Err(e) => return Err(e),
        }
        self.with(name)?.ok_or_else(|| KeeperError::BogusStore(name.to_string()))
    }

    /// Close the store, removing it from the map. [`KeeperError::BogusStore`]
    /// if unknown.
    #[instrument(skip(self), fields(store = %name))]
    pub fn close(&self, name: &str) -> Result<()> {
        self.ensure_initialized()?;
        let mut inner = self.inner.write();
        let engine = inner.stores.remove(name).ok_or_else(|| KeeperError::BogusStore(name.to_string()))?;
        engine.close()
    }

    /// Close, remove from map, and recursively remove the subdirectory.
    #[instrument(skip(self), fields(store = %name))]
    pub fn destroy(&self, name: &str) -> Result<()> {
        self.ensure_initialized()?;
        let mut inner = self.inner.write();
        if let Some(engine) = inner.stores.remove(name) {
            // Destroy tolerates an already-closed handle (e.g. reached via
            // discovery recovery); a Closed error here is not fatal.
            match engine.close() {
                Ok(()) | Err(KeeperError::Closed) => {}
                Err(e) => return Err(e),
            }
        }
        inner.meta.remove_store(name);
        let store_path = self.path.join(name);
        if store_path.exists() {
            fs::remove_dir_all(&store_path)
                .map_err(|e| KeeperError::io(format!("removing {}", store_path.display()), e))?;
        }
        Ok(())
    }

    /// Flush engine buffers. [`KeeperError::BogusStore`] if unknown.
    pub fn sync(&self, name: &str) -> Result<()> {
        self.ensure_initialized()?;
        let engine = {
            let inner = self.inner.read();
            inner.stores.get(name).map(Arc::clone)
        };
        match engine {
            Some(engine) => engine.sync(),
            None => Err(KeeperError::BogusStore(name.to_string())),
        }
    }

    /// Snapshot of the currently-open store map.
    pub fn all_stores(&self) -> Result<HashMap<String, Arc<dyn Engine>>> {
        self.ensure_initialized()?;
        Ok(self.inner.read().stores.clone())
    }

    /// See [`discover`] module docs.
    pub fn discover(&self, force: bool) -> Result<(Vec<String>, Option<KeeperError>)> {
        self.ensure_initialized()?;
        discover::discover(self, force)
    }

    /// Apply `sync` to every open store, collecting every failure.
    pub fn sync_all(&self) -> Result<()> {
        self.ensure_initialized()?;
        let names: Vec<String> = self.inner.read().stores.keys().cloned().collect();
        if names.is_empty() {
            return Err(KeeperError::NoStores);
        }
        let mut errs = Vec::new();
        for name in names {
            if let Err(e) = self.sync(&name) {
                errs.push(KeeperError::engine(name, e));
            }
        }
        KeeperError::compound(errs)
    }

    /// Apply `close` to every open store, collecting every failure.
    pub fn close_all(&self) -> Result<()> {
        self.ensure_initialized()?;
        let names: Vec<String> = self.inner.read().stores.keys().cloned().collect();
        if names.is_empty() {
            return Err(KeeperError::NoStores);
        }
        let mut errs = Vec::new();
        for name in names {
            if let Err(e) = self.close(&name) {
                errs.push(KeeperError::engine(name, e));
            }
        }
        KeeperError::compound(errs)
    }

    /// Sync every store, then close every store, then sync metadata.
    ///
    /// Fails with [`KeeperError::NoStores`] if no store is open at the time
    /// of the call, matching [`Keeper::sync_all`] and [`Keeper::close_all`]'s
    /// contract rather than silently no-op'ing.
    pub fn sync_and_close_all(&self) -> Result<()> {
        self.ensure_initialized()?;
        if self.inner.read().stores.is_empty() {
            return Err(KeeperError::NoStores);
        }
        let mut errs = Vec::new();
        if let Err(e) = self.sync_all() {
            if !matches!(e, KeeperError::NoStores) {
                errs.push(KeeperError::engine("sync", e));
            }
        }
        if let Err(e) = self.close_all() {
            if !matches!(e, KeeperError::NoStores) {
                errs.push(KeeperError::engine("close", e));
            }
        }
        {
            let mut inner = self.inner.write();
            inner.meta.sync(&self.path)?;
        }
        KeeperError::compound(errs)
    }

    /// Archive the whole keeper directory as described in spec.md §4.4 and
    /// record the resulting [`crate::metadata::BackupDescriptor`] in
    /// metadata. See [`crate::backup::backup_all`] for the algorithm.
    pub fn backup_all(&self, archive_path: impl AsRef<Path>) -> Result<crate::metadata::BackupDescriptor> {
        crate::backup::backup_all(self, archive_path.as_ref(), &[])
    }

    /// Same as [`Keeper::backup_all`] but with caller-supplied extra bytes
    /// appended to the gzip comment header.
    pub fn backup_all_with_extra(
        &self,
        archive_path: impl AsRef<Path>,
        extra: &[u8],
    ) -> Result<crate::metadata::BackupDescriptor> {
        crate::backup::backup_all(self, archive_path.as_ref(), extra)
    }

    /// Replace the keeper's entire on-disk contents with the contents of a
    /// `.tar.gz` archive, taking a pre-restore safety snapshot first if any
    /// stores currently exist. See [`crate::backup::restore_all`].
    pub fn restore_all(&self, archive_path: impl AsRef<Path>) -> Result<()> {
        crate::backup::restore_all(self, archive_path.as_ref())
    }

    /// Recompute and compare the checksum of a previously recorded backup,
    /// looked up by its id in `meta.backups`.
    pub fn verify_backup(&self, id: &str) -> Result<()> {
        self.ensure_initialized()?;
        let descriptor = {
            let inner = self.inner.read();
            inner
                .meta
                .backups
                .get(id)
                .cloned()
                .ok_or_else(|| KeeperError::engine("verify_backup", format!("no backup recorded under id {id}")))?
        };
        crate::backup::verify_backup(&descriptor)
    }

    /// Clear the `initialized` flag without re-reading `meta.json`. Used by
    /// [`crate::backup::restore_all`] just before the archive overwrites the
    /// keeper's directory, so no other thread observes a half-restored state
    /// as initialized.
    pub(crate) fn mark_uninitialized(&self) {
        self.initialized.store(false, Ordering::Release);
    }

    /// Re-run first-entry initialization after [`Keeper::mark_uninitialized`].
    pub(crate) fn force_reinitialize(&self) -> Result<()> {
        self.ensure_initialized()
    }
}

#[cfg(test)]
mod keeper_tests;
