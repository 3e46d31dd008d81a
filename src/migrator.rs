//! Copies every key in every store of one keeper into another, with
//! configurable collision handling. Grounded on the Go original's
//! `migrate.Migrator`: a duplicate-key dry run before any data moves, then a
//! one-goroutine-per-store fan-out during the copy itself — realized here as
//! one scoped thread per store, since a keeper's stores are independent and
//! there's no shared mutable state to serialize beyond the duplicate-key set.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tracing::{info, instrument, warn};

use crate::error::{KeeperError, Result};
use crate::keeper::Keeper;

/// Drives a one-shot copy from one keeper to another.
///
/// Neither flag is set by default: a duplicate key found in both keepers is
/// fatal unless the caller opts into [`Migrator::with_skip_existing`] or
/// [`Migrator::with_clobber`].
pub struct Migrator<'a> {
    from: &'a Keeper,
    to: &'a Keeper,
    clobber: bool,
    skip_existing: bool,
    duplicate_keys: Mutex<BTreeMap<String, BTreeSet<Vec<u8>>>>,
}

impl<'a> Migrator<'a> {
    /// Build a migrator, running an initial discover on both keepers so
    /// their store maps reflect what's actually on disk.
    pub fn new(from: &'a Keeper, to: &'a Keeper) -> Result<Self> {
        from.discover(false)?;
        to.discover(false)?;
        Ok(Migrator { from, to, clobber: false, skip_existing: false, duplicate_keys: Mutex::new(BTreeMap::new()) })
    }

    /// Overwrite colliding destination keys instead of failing on them.
    pub fn with_clobber(mut self) -> Self {
        self.clobber = true;
        self
    }

    /// Leave colliding destination keys untouched instead of failing on them.
    pub fn with_skip_existing(mut self) -> Self {
        self.skip_existing = true;
        self
    }

    /// Find every key that exists in both a source store and its
    /// same-named destination store. Populates the internal duplicate set
    /// used by [`Migrator::migrate`]; also callable standalone to preview
    /// collisions before committing to a migration.
    #[instrument(skip(self))]
    pub fn check_duplicates(&self) -> Result<()> {
        let from_stores = self.from.all_stores()?;
        let to_stores = self.to.all_stores()?;
        if from_stores.is_empty() {
            return Err(KeeperError::NoStores);
        }

        let found: Mutex<BTreeMap<String, BTreeSet<Vec<u8>>>> = Mutex::new(BTreeMap::new());
        let errors: Mutex<Vec<KeeperError>> = Mutex::new(Vec::new());

        std::thread::scope(|scope| {
            let mut handles = Vec::new();
            for (store_name, src_store) in &from_stores {
                let Some(dst_store) = to_stores.get(store_name) else { continue };
                match dst_store.len() {
                    Ok(0) => continue,
                    Ok(_) => {}
                    Err(e) => {
                        errors.lock().push(KeeperError::engine(store_name.clone(), e));
                        continue;
                    }
                }
                handles.push(scope.spawn(move || {
                    let keys = match dst_store.keys() {
                        Ok(k) => k,
                        Err(e) => {
                            errors.lock().push(KeeperError::engine(store_name.clone(), e));
                            return;
                        }
                    };
                    for key in keys {
                        match src_store.has(&key) {
                            Ok(true) => {
                                found.lock().entry(store_name.clone()).or_default().insert(key);
                            }
                            Ok(false) => {}
                            Err(e) => errors.lock().push(KeeperError::engine(store_name.clone(), e)),
                        }
                    }
                }));
            }
            for h in handles {
                h.join().expect("duplicate-check worker thread panicked");
            }
        });

        KeeperError::compound(errors.into_inner())?;

        let found = found.into_inner();
        if !found.is_empty() {
            info!(stores = found.len(), "check_duplicates: collisions found");
        }
        *self.duplicate_keys.lock() = found.clone();

        if found.is_empty() || self.skip_existing || self.clobber {
            return Ok(());
        }
        Err(KeeperError::DuplicateKeys(
            found.into_iter().map(|(store, keys)| (store, keys.into_iter().collect())).collect(),
        ))
    }

    /// Copy every key of every source store into its destination,
    /// respecting [`Migrator::with_skip_existing`]/[`Migrator::with_clobber`]
    /// for anything [`Migrator::check_duplicates`] flagged. The first
    /// per-key failure cancels every other in-flight store's copy rather
    /// than leaving them to run to a half-migrated completion.
    #[instrument(skip(self))]
    pub fn migrate(&self) -> Result<()> {
        let from_stores = self.from.all_stores()?;
        if from_stores.is_empty() {
            return Err(KeeperError::NoStores);
        }
        self.check_duplicates()?;

        let cancelled = AtomicBool::new(false);
        let errors: Mutex<Vec<KeeperError>> = Mutex::new(Vec::new());

        std::thread::scope(|scope| {
            let mut handles = Vec::new();
            for (store_name, src_store) in &from_stores {
                match src_store.len() {
                    Ok(0) => continue,
                    Ok(_) => {}
                    Err(e) => {
                        errors.lock().push(KeeperError::engine(store_name.clone(), e));
                        continue;
                    }
                }
                handles.push(scope.spawn(move || {
                    self.migrate_store(store_name, src_store.as_ref(), &cancelled, &errors);
                }));
            }
            for h in handles {
                h.join().expect("migration worker thread panicked");
            }
        });

        KeeperError::compound(errors.into_inner())?;

        let from_after = self.from.all_stores()?;
        let to_after = self.to.all_stores()?;
        if from_after.len() != to_after.len() {
            return Err(KeeperError::engine(
                "migrate",
                "number of stores in source and destination keepers do not match",
            ));
        }

        let mut sync_errs = Vec::new();
        if let Err(e) = self.from.sync_all() {
            if !matches!(e, KeeperError::NoStores) {
                sync_errs.push(KeeperError::engine("sync source", e));
            }
        }
        if let Err(e) = self.to.sync_all() {
            if !matches!(e, KeeperError::NoStores) {
                sync_errs.push(KeeperError::engine("sync destination", e));
            }
        }
        KeeperError::compound(sync_errs)
    }

    fn migrate_store(
        &self,
        store_name: &str,
        src_store: &dyn crate::filer::Engine,
        cancelled: &AtomicBool,
        errors: &Mutex<Vec<KeeperError>>,
    ) {
        let keys = match src_store.keys() {
            Ok(k) => k,
            Err(e) => {
                errors.lock().push(KeeperError::engine(store_name, e));
                cancelled.store(true, Ordering::Relaxed);
                return;
            }
        };

        for key in keys {
            if cancelled.load(Ordering::Relaxed) {
                return;
            }
            let value = match src_store.get(&key) {
                Ok(Some(v)) => v,
                Ok(None) => continue,
                Err(e) => {
                    errors.lock().push(KeeperError::engine(store_name, e));
                    cancelled.store(true, Ordering::Relaxed);
                    return;
                }
            };

            let is_duplicate =
                self.duplicate_keys.lock().get(store_name).map(|s| s.contains(&key)).unwrap_or(false);
            if is_duplicate {
                if self.skip_existing {
                    continue;
                }
                if !self.clobber {
                    warn!(store = store_name, "migrate: unresolved duplicate key, cancelling");
                    errors.lock().push(KeeperError::DuplicateKeys(BTreeMap::from([(
                        store_name.to_string(),
                        vec![key],
                    )])));
                    cancelled.store(true, Ordering::Relaxed);
                    return;
                }
                match self.to.with(store_name) {
                    Ok(Some(dest)) => {
                        if let Err(e) = dest.put(&key, &value) {
                            errors.lock().push(KeeperError::engine(store_name, e));
                            cancelled.store(true, Ordering::Relaxed);
                            return;
                        }
                    }
                    Ok(None) => {
                        errors.lock().push(KeeperError::BogusStore(store_name.to_string()));
                        cancelled.store(true, Ordering::Relaxed);
                        return;
                    }
                    Err(e) => {
                        errors.lock().push(e);
                        cancelled.store(true, Ordering::Relaxed);
                        return;
                    }
                }
                continue;
            }

            match self.to.with_new(store_name, None) {
                Ok(dest) => {
                    if let Err(e) = dest.put(&key, &value) {
                        errors.lock().push(KeeperError::engine(store_name, e));
                        cancelled.store(true, Ordering::Relaxed);
                        return;
                    }
                }
                Err(e) => {
                    errors.lock().push(e);
                    cancelled.store(true, Ordering::Relaxed);
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod migrator_tests;
