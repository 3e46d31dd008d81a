//! The keeper's persisted `meta.json` document: engine identity, timestamps,
//! known stores, backup index, and engine-specific extras.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{KeeperError, Result};

pub const META_FILENAME: &str = "meta.json";

/// A checksum of a backup archive, as recorded in its [`BackupDescriptor`].
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Checksum {
    #[serde(rename = "type")]
    pub kind: String,
    pub value: String,
}

/// One entry in `Metadata::backups`, identifying a single archive.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct BackupDescriptor {
    pub timestamp: DateTime<Utc>,
    pub format: String,
    pub path: String,
    #[serde(default)]
    pub stores: Vec<String>,
    pub checksum: Checksum,
    pub size: u64,
}

/// The keeper's persisted document. `kind` (JSON key `type`) is the only
/// field the original design calls an absolute requirement; everything else
/// may be empty on a freshly-initialized keeper.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Metadata {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default = "Utc::now")]
    pub created: DateTime<Utc>,
    #[serde(default = "Utc::now", rename = "last_opened")]
    pub last_opened: DateTime<Utc>,
    #[serde(default)]
    pub stores: Vec<String>,
    #[serde(default)]
    pub backups: BTreeMap<String, BackupDescriptor>,
    #[serde(default, rename = "default_store_opts")]
    pub default_store_opts: Option<serde_json::Value>,
    #[serde(default)]
    pub extra: BTreeMap<String, serde_json::Value>,

    /// Path to the backing file, not persisted. `None` until the metadata
    /// has been written or loaded from disk at least once.
    #[serde(skip)]
    path: Option<PathBuf>,
}

impl Metadata {
    /// A brand-new metadata document for a keeper of the given engine type.
    pub fn new(kind: impl Into<String>) -> Self {
        let now = Utc::now();
        Metadata {
            kind: kind.into(),
            created: now,
            last_opened: now,
            stores: Vec::new(),
            backups: BTreeMap::new(),
            default_store_opts: None,
            extra: BTreeMap::new(),
            path: None,
        }
    }

    /// Read and parse `meta.json` at the given root directory.
    pub fn load(root: &Path) -> Result<Self> {
        let path = root.join(META_FILENAME);
        let data = std::fs::read(&path)
            .map_err(|e| KeeperError::io(format!("reading {}", path.display()), e))?;
        if data.is_empty() {
            return Err(KeeperError::EmptyMeta);
        }
        let mut meta: Metadata = serde_json::from_slice(&data)
            .map_err(|e| KeeperError::json(format!("parsing {}", path.display()), e))?;
        if meta.kind.is_empty() {
            return Err(KeeperError::EmptyMeta);
        }
        meta.path = Some(path);
        Ok(meta)
    }

    /// Record that the keeper was just reopened.
    pub fn touch(&mut self) {
        self.last_opened = Utc::now();
    }

    pub fn add_store(&mut self, name: &str) {
        if !self.stores.iter().any(|s| s == name) {
            self.stores.push(name.to_string());
        }
    }

    pub fn remove_store(&mut self, name: &str) {
        self.stores.retain(|s| s != name);
    }

    pub fn add_backup(&mut self, id: impl Into<String>, descriptor: BackupDescriptor) {
        self.backups.insert(id.into(), descriptor);
    }

    /// Atomically rewrite `meta.json` at `root`: write to a temp file in the
    /// same directory, then rename over the original so a crash mid-write
    /// can never leave a truncated metadata file behind.
    pub fn sync(&mut self, root: &Path) -> Result<()> {
        let path = root.join(META_FILENAME);
        let tmp_path = root.join(format!("{META_FILENAME}.tmp"));
        let data = serde_json::to_vec_pretty(self)
            .map_err(|e| KeeperError::json("serializing metadata", e))?;
        {
            let mut tmp = std::fs::File::create(&tmp_path)
                .map_err(|e| KeeperError::io(format!("creating {}", tmp_path.display()), e))?;
            tmp.write_all(&data)
                .map_err(|e| KeeperError::io(format!("writing {}", tmp_path.display()), e))?;
            tmp.sync_all()
                .map_err(|e| KeeperError::io(format!("syncing {}", tmp_path.display()), e))?;
        }
        std::fs::rename(&tmp_path, &path)
            .map_err(|e| KeeperError::io(format!("renaming into {}", path.display()), e))?;
        self.path = Some(path);
        Ok(())
    }
}

#[cfg(test)]
mod metadata_tests;
