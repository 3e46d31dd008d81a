//! Maps a keeper's directory tree onto its live store map.
//!
//! Convention for the one-shot recovery hook: an engine that wants
//! [`discover`] to attempt repair on open failure returns
//! [`KeeperError::CorruptEngineMetadata`] from its constructor, and keeps its
//! index file named `index.bin` and its advisory lock file named `lock`
//! inside the store directory (the bundled [`crate::engines::logdb`] engine
//! follows this convention; it mirrors the Go original's bitcask recovery
//! step of renaming the corrupt metadata file aside and dropping a stale
//! lock before retrying).

use std::collections::HashSet;
use std::fs;

use tracing::warn;

use super::Keeper;
use crate::error::{KeeperError, Result};

const INDEX_FILENAME: &str = "index.bin";
const LOCK_FILENAME: &str = "lock";

pub(super) fn discover(keeper: &Keeper, force: bool) -> Result<(Vec<String>, Option<KeeperError>)> {
    let mut names = Vec::new();
    let mut errs = Vec::new();
    // Guards against a persistently-corrupt store looping the recovery hook
    // forever within a single Discover call.
    let mut retried_once: HashSet<String> = HashSet::new();

    let entries = fs::read_dir(&keeper.path)
        .map_err(|e| KeeperError::io(format!("reading {}", keeper.path().display()), e))?;

    for entry in entries {
        let entry = entry.map_err(|e| KeeperError::io("reading directory entry", e))?;
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        let name = match path.file_name().and_then(|n| n.to_str()) {
            Some(n) => n.to_string(),
            None => continue,
        };
        if name == crate::metadata::META_FILENAME {
            continue;
        }

        let already_open = keeper.inner.read().stores.contains_key(&name);
        if already_open && !force {
            names.push(name);
            continue;
        }

        match open_with_recovery(keeper, &name, &mut retried_once) {
            Ok(engine) => {
                keeper.inner.write().stores.insert(name.clone(), engine);
                keeper.inner.write().meta.add_store(&name);
                names.push(name);
            }
            Err(e) => {
                warn!(store = %name, error = %e, "discover: skipping store");
                errs.push(KeeperError::engine(name, e));
            }
        }
    }

    let compound = if errs.is_empty() { None } else { Some(KeeperError::Compound(errs)) };
    Ok((names, compound))
}

fn open_with_recovery(
    keeper: &Keeper,
    name: &str,
    retried_once: &mut HashSet<String>,
) -> Result<std::sync::Arc<dyn crate::filer::Engine>> {
    let store_path = keeper.path.join(name);
    let default_opts = keeper.inner.read().meta.default_store_opts.clone();
    match (keeper.ctor)(&store_path, default_opts.clone()) {
        Ok(engine) => Ok(engine),
        Err(KeeperError::CorruptEngineMetadata { reason, .. }) if !retried_once.contains(name) => {
            retried_once.insert(name.to_string());
            warn!(store = %name, %reason, "discover: attempting one-shot recovery");
            let index_path = store_path.join(INDEX_FILENAME);
            if index_path.exists() {
                let backup_path = store_path.join(format!("{INDEX_FILENAME}.backup"));
                let _ = fs::rename(&index_path, &backup_path);
            }
            let lock_path = store_path.join(LOCK_FILENAME);
            if lock_path.exists() {
                let _ = fs::remove_file(&lock_path);
            }
            (keeper.ctor)(&store_path, default_opts)
        }
        Err(e) => Err(e),
    }
}
