//! `logdb`: an append-only log + in-memory hash index engine, in the
//! bitcask family. Grounded on `original_source/bitcask/bitcask.go` (Store
//! wraps a Filer + Searcher) and the record-framing style of
//! `storage/graphstore/wal.rs` (length-prefixed records with a per-record
//! CRC32, fsync on demand).
//!
//! On-disk layout per store directory:
//! ```text
//! <store>/data.log    append-only record log (source of truth)
//! <store>/index.bin   snapshot of the in-memory index, for fast reopen
//! <store>/lock        advisory marker, removed on clean close
//! ```
//! `index.bin` is a cache, not a second source of truth: if it's missing or
//! fails its xxh3 checksum, [`open`] rebuilds the index by replaying
//! `data.log` from the start. A checksum failure is reported as
//! [`KeeperError::CorruptEngineMetadata`] so `keeper::discover`'s recovery
//! hook can quarantine it and retry once, per spec.md §4.3.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::error::{KeeperError, Result};
use crate::filer::{Engine, Filer, Searcher};
use crate::keyvalue::KeyValuePair;

const DATA_FILENAME: &str = "data.log";
const INDEX_FILENAME: &str = "index.bin";
const LOCK_FILENAME: &str = "lock";

const RECORD_MAGIC: u32 = 0x4C4F_4731; // "LOG1"
const INDEX_MAGIC: u32 = 0x4C49_4458; // "LIDX"
const INDEX_VERSION: u32 = 1;

const KIND_PUT: u8 = 1;
const KIND_DELETE: u8 = 2;

/// Engine-specific options, round-tripped verbatim through
/// `Metadata::default_store_opts` per SPEC_FULL.md §9.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LogDbOptions {
    pub max_key_size: Option<u32>,
    pub max_value_size: Option<u64>,
}

impl LogDbOptions {
    fn parse(opts: Option<serde_json::Value>, store: &str) -> Result<Self> {
        match opts {
            None => Ok(LogDbOptions::default()),
            Some(v) => serde_json::from_value(v)
                .map_err(|e| KeeperError::BadOptions { store: store.to_string(), reason: e.to_string() }),
        }
    }
}

#[derive(Clone, Copy)]
struct IndexEntry {
    offset: u64,
    len: u32,
}

/// The append-only log + hash index engine itself.
pub struct LogDb {
    dir: PathBuf,
    append_file: Mutex<File>,
    index: RwLock<HashMap<Vec<u8>, IndexEntry>>,
    opts: LogDbOptions,
    closed: AtomicBool,
}

fn data_path(dir: &Path) -> PathBuf {
    dir.join(DATA_FILENAME)
}
fn index_path(dir: &Path) -> PathBuf {
    dir.join(INDEX_FILENAME)
}
fn lock_path(dir: &Path) -> PathBuf {
    dir.join(LOCK_FILENAME)
}

/// Open (or create) a `logdb` store at `path`. Registered under the name
/// `"logdb"`; see [`crate::engines::register`].
#[instrument(skip(opts), fields(path = %path.display()))]
pub fn open(path: &Path, opts: Option<serde_json::Value>) -> Result<Arc<dyn Engine>> {
    let store_name = path.file_name().and_then(|n| n.to_str()).unwrap_or("?").to_string();
    let options = LogDbOptions::parse(opts, &store_name)?;

    fs::create_dir_all(path).map_err(|e| KeeperError::io(format!("creating {}", path.display()), e))?;
    let _ = File::create(lock_path(path));

    let log_path = data_path(path);
    let append_file = OpenOptions::new()
        .create(true)
        .append(true)
        .read(true)
        .open(&log_path)
        .map_err(|e| KeeperError::io(format!("opening {}", log_path.display()), e))?;

    let index = match load_index_snapshot(path) {
        Ok(Some(index)) => index,
        Ok(None) => rebuild_index(&log_path)?,
        Err(KeeperError::CorruptEngineMetadata { reason, .. }) => {
            return Err(KeeperError::CorruptEngineMetadata { store: store_name, reason })
        }
        Err(e) => return Err(e),
    };

    debug!(store = %store_name, entries = index.len(), "logdb opened");
    Ok(Arc::new(LogDb {
        dir: path.to_path_buf(),
        append_file: Mutex::new(append_file),
        index: RwLock::new(index),
        opts: options,
        closed: AtomicBool::new(false),
    }))
}

/// Rebuild the in-memory index by replaying `data.log` from the start.
/// Used both for a brand-new store (empty log) and recovery when
/// `index.bin` is absent or fails to parse.
fn rebuild_index(log_path: &Path) -> Result<HashMap<Vec<u8>, IndexEntry>> {
    let mut index = HashMap::new();
    let mut file = match File::open(log_path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(index),
        Err(e) => return Err(KeeperError::io(format!("opening {}", log_path.display()), e)),
    };

    loop {
        let offset = file
            .stream_position()
            .map_err(|e| KeeperError::io("reading log position", e))?;
        let mut header = [0u8; 18];
        match file.read_exact(&mut header) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(KeeperError::io("reading log record header", e)),
        }
        let magic = u32::from_le_bytes(header[0..4].try_into().unwrap());
        let kind = header[4];
        let key_len = u32::from_le_bytes(header[6..10].try_into().unwrap());
        let val_len = u32::from_le_bytes(header[10..14].try_into().unwrap());
        let expected_crc = u32::from_le_bytes(header[14..18].try_into().unwrap());
        if magic != RECORD_MAGIC {
            // A torn write at the tail of the log; stop replaying here rather
            // than treating the whole store as corrupt.
            break;
        }
        let mut payload = vec![0u8; key_len as usize + val_len as usize];
        if file.read_exact(&mut payload).is_err() {
            break;
        }
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&header[4..14]);
        hasher.update(&payload);
        if hasher.finalize() != expected_crc {
            break;
        }
        let key = payload[..key_len as usize].to_vec();
        let record_len = header.len() as u32 + key_len + val_len;
        match kind {
            KIND_PUT => {
                index.insert(key, IndexEntry { offset, len: record_len });
            }
            KIND_DELETE => {
                index.remove(&key);
            }
            _ => break,
        }
    }
    Ok(index)
}

#[derive(Serialize, Deserialize)]
struct IndexSnapshotEntry {
    key: Vec<u8>,
    offset: u64,
    len: u32,
}

/// Load `index.bin` if present. Returns `Ok(None)` if it's simply absent
/// (normal for a first-ever open), `Err(CorruptEngineMetadata)` if it's
/// present but its checksum doesn't match.
fn load_index_snapshot(dir: &Path) -> Result<Option<HashMap<Vec<u8>, IndexEntry>>> {
    let path = index_path(dir);
    let data = match fs::read(&path) {
        Ok(d) => d,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(KeeperError::io(format!("reading {}", path.display()), e)),
    };
    if data.len() < 16 {
        return Err(KeeperError::CorruptEngineMetadata {
            store: String::new(),
            reason: "index.bin shorter than its fixed header".to_string(),
        });
    }
    let (body, checksum_bytes) = data.split_at(data.len() - 8);
    let expected = u64::from_le_bytes(checksum_bytes.try_into().unwrap());
    if xxhash_rust::xxh3::xxh3_64(body) != expected {
        return Err(KeeperError::CorruptEngineMetadata {
            store: String::new(),
            reason: "index.bin checksum mismatch".to_string(),
        });
    }
    let magic = u32::from_le_bytes(body[0..4].try_into().unwrap());
    let version = u32::from_le_bytes(body[4..8].try_into().unwrap());
    if magic != INDEX_MAGIC || version != INDEX_VERSION {
        return Err(KeeperError::CorruptEngineMetadata {
            store: String::new(),
            reason: format!("index.bin has unrecognized magic/version ({magic:#x}/{version})"),
        });
    }
    let entries: Vec<IndexSnapshotEntry> = serde_json::from_slice(&body[8..]).map_err(|e| {
        KeeperError::CorruptEngineMetadata { store: String::new(), reason: format!("index.bin payload: {e}") }
    })?;
    let mut index = HashMap::with_capacity(entries.len());
    for entry in entries {
        index.insert(entry.key, IndexEntry { offset: entry.offset, len: entry.len });
    }
    Ok(Some(index))
}

fn write_index_snapshot(dir: &Path, index: &HashMap<Vec<u8>, IndexEntry>) -> Result<()> {
    let entries: Vec<IndexSnapshotEntry> = index
        .iter()
        .map(|(key, e)| IndexSnapshotEntry { key: key.clone(), offset: e.offset, len: e.len })
        .collect();
    let payload = serde_json::to_vec(&entries).map_err(|e| KeeperError::json("serializing index.bin", e))?;

    let mut body = Vec::with_capacity(8 + payload.len());
    body.extend_from_slice(&INDEX_MAGIC.to_le_bytes());
    body.extend_from_slice(&INDEX_VERSION.to_le_bytes());
    body.extend_from_slice(&payload);
    let checksum = xxhash_rust::xxh3::xxh3_64(&body);

    let path = index_path(dir);
    let tmp_path = dir.join(format!("{INDEX_FILENAME}.tmp"));
    {
        let mut tmp = File::create(&tmp_path).map_err(|e| KeeperError::io(format!("creating {}", tmp_path.display()), e))?;
        tmp.write_all(&body).map_err(|e| KeeperError::io("writing index.bin", e))?;
        tmp.write_all(&checksum.to_le_bytes()).map_err(|e| KeeperError::io("writing index.bin checksum", e))?;
        tmp.sync_all().map_err(|e| KeeperError::io("syncing index.bin", e))?;
    }
    fs::rename(&tmp_path, &path).map_err(|e| KeeperError::io(format!("renaming into {}", path.display()), e))?;
    Ok(())
}

fn encode_record(kind: u8, key: &[u8], value: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(18 + key.len() + value.len());
    buf.extend_from_slice(&RECORD_MAGIC.to_le_bytes());
    buf.push(kind);
    buf.push(0); // padding byte, keeps the header 18 bytes and word-aligned
    buf.extend_from_slice(&(key.len() as u32).to_le_bytes());
    buf.extend_from_slice(&(value.len() as u32).to_le_bytes());
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&buf[4..14]);
    hasher.update(key);
    hasher.update(value);
    buf.extend_from_slice(&hasher.finalize().to_le_bytes());
    buf.extend_from_slice(key);
    buf.extend_from_slice(value);
    buf
}

impl LogDb {
    fn check_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            Err(KeeperError::Closed)
        } else {
            Ok(())
        }
    }

    fn read_value_at(&self, entry: IndexEntry) -> Result<Vec<u8>> {
        let mut file = File::open(data_path(&self.dir))
            .map_err(|e| KeeperError::io("reopening data.log for read", e))?;
        file.seek(SeekFrom::Start(entry.offset)).map_err(|e| KeeperError::io("seeking data.log", e))?;
        let mut record = vec![0u8; entry.len as usize];
        file.read_exact(&mut record).map_err(|e| KeeperError::io("reading data.log record", e))?;
        let key_len = u32::from_le_bytes(record[6..10].try_into().unwrap()) as usize;
        let val_len = u32::from_le_bytes(record[10..14].try_into().unwrap()) as usize;
        Ok(record[18 + key_len..18 + key_len + val_len].to_vec())
    }

    fn append(&self, record: &[u8]) -> Result<u64> {
        let mut file = self.append_file.lock();
        let offset = file.seek(SeekFrom::End(0)).map_err(|e| KeeperError::io("seeking data.log", e))?;
        file.write_all(record).map_err(|e| KeeperError::io("appending data.log", e))?;
        Ok(offset)
    }
}

impl Filer for LogDb {
    fn has(&self, key: &[u8]) -> Result<bool> {
        self.check_open()?;
        Ok(self.index.read().contains_key(key))
    }

    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.check_open()?;
        let entry = { self.index.read().get(key).copied() };
        match entry {
            Some(entry) => Ok(Some(self.read_value_at(entry)?)),
            None => Ok(None),
        }
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.check_open()?;
        if let Some(max) = self.opts.max_key_size {
            if key.len() as u32 > max {
                return Err(KeeperError::engine(
                    self.dir.display().to_string(),
                    format!("key of {} bytes exceeds max_key_size {max}", key.len()),
                ));
            }
        }
        if let Some(max) = self.opts.max_value_size {
            if value.len() as u64 > max {
                return Err(KeeperError::engine(
                    self.dir.display().to_string(),
                    format!("value of {} bytes exceeds max_value_size {max}", value.len()),
                ));
            }
        }
        let record = encode_record(KIND_PUT, key, value);
        let record_len = record.len() as u32;
        let offset = self.append(&record)?;
        self.index.write().insert(key.to_vec(), IndexEntry { offset, len: record_len });
        Ok(())
    }

    fn delete(&self, key: &[u8]) -> Result<()> {
        self.check_open()?;
        let record = encode_record(KIND_DELETE, key, &[]);
        self.append(&record)?;
        self.index.write().remove(key);
        Ok(())
    }

    fn keys(&self) -> Result<Vec<Vec<u8>>> {
        self.check_open()?;
        Ok(self.index.read().keys().cloned().collect())
    }

    fn len(&self) -> Result<usize> {
        self.check_open()?;
        Ok(self.index.read().len())
    }

    fn sync(&self) -> Result<()> {
        self.check_open()?;
        self.append_file.lock().sync_all().map_err(|e| KeeperError::io("syncing data.log", e))?;
        write_index_snapshot(&self.dir, &self.index.read())
    }

    fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Err(KeeperError::Closed);
        }
        self.append_file.lock().sync_all().map_err(|e| KeeperError::io("syncing data.log on close", e))?;
        write_index_snapshot(&self.dir, &self.index.read())?;
        let _ = fs::remove_file(lock_path(&self.dir));
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl Searcher for LogDb {
    fn prefix_scan(&self, prefix: &[u8]) -> Result<Vec<KeyValuePair>> {
        self.check_open()?;
        let matching: Vec<(Vec<u8>, IndexEntry)> = self
            .index
            .read()
            .iter()
            .filter(|(k, _)| k.starts_with(prefix))
            .map(|(k, e)| (k.clone(), *e))
            .collect();
        let mut out = Vec::with_capacity(matching.len());
        for (key, entry) in matching {
            let value = self.read_value_at(entry)?;
            out.push(KeyValuePair::new(key, value));
        }
        Ok(out)
    }

    fn value_scan(&self, query: &[u8]) -> Result<Vec<KeyValuePair>> {
        self.check_open()?;
        let all: Vec<(Vec<u8>, IndexEntry)> =
            self.index.read().iter().map(|(k, e)| (k.clone(), *e)).collect();
        let mut out = Vec::new();
        for (key, entry) in all {
            let value = self.read_value_at(entry)?;
            if contains_subslice(&value, query) {
                out.push(KeyValuePair::new(key, value));
            }
        }
        Ok(out)
    }

    fn value_exists(&self, value: &[u8]) -> Result<Option<Vec<u8>>> {
        self.check_open()?;
        let all: Vec<(Vec<u8>, IndexEntry)> =
            self.index.read().iter().map(|(k, e)| (k.clone(), *e)).collect();
        for (key, entry) in all {
            if self.read_value_at(entry)? == value {
                return Ok(Some(key));
            }
        }
        Ok(None)
    }
}

impl Engine for LogDb {
    fn as_searcher(&self) -> Option<&dyn Searcher> {
        Some(self)
    }
}

fn contains_subslice(haystack: &[u8], needle: &[u8]) -> bool {
    if needle.is_empty() {
        return true;
    }
    haystack.windows(needle.len()).any(|w| w == needle)
}

#[cfg(test)]
mod logdb_tests;
