//! Tar+gzip backup/restore pipeline, grounded on
//! `original_source/backup/backup.go` and `original_source/backup/verify.go`.
//!
//! [`backup_all`] streams the whole keeper directory into a temporary tar
//! file, verifies every requested store shows up in it, wraps it in gzip
//! with a fixed comment header, and records a SHA-256 digest. [`restore_all`]
//! is the keeper-level inverse: quiesce, snapshot, destroy, unpack, re-init.

use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::Utc;
use flate2::write::GzEncoder;
use flate2::{Compression, GzBuilder};
use sha2::Digest;
use tracing::{info, instrument, warn};

use crate::error::{KeeperError, Result};
use crate::keeper::Keeper;
use crate::metadata::{BackupDescriptor, Checksum};

const COMMENT_PREFIX: &str = "keeperdb backup archive";

/// Archive `keeper`'s entire directory (`meta.json` plus every store
/// subdirectory) into a `.tar.gz` file and record a [`BackupDescriptor`] in
/// metadata. See spec.md §4.4 for the numbered algorithm this follows.
#[instrument(skip(keeper, extra), fields(path = %keeper.path().display()))]
pub fn backup_all(keeper: &Keeper, archive_path: &Path, extra: &[u8]) -> Result<BackupDescriptor> {
    let _guard = keeper.backup_lock.lock();
    backup_all_locked(keeper, archive_path, extra)
}

fn backup_all_locked(keeper: &Keeper, archive_path: &Path, extra: &[u8]) -> Result<BackupDescriptor> {
    // Step 2: bring the store list current and quiesce every open store.
    let (_, discover_err) = keeper.discover(false)?;
    if let Some(e) = discover_err {
        warn!(error = %e, "backup_all: discover reported partial failures, continuing with what was found");
    }
    match keeper.sync_all() {
        Ok(()) | Err(KeeperError::NoStores) => {}
        Err(e) => return Err(KeeperError::engine("backup: sync_all", e)),
    }
    match keeper.close_all() {
        Ok(()) | Err(KeeperError::NoStores) => {}
        Err(e) => return Err(KeeperError::engine("backup: close_all", e)),
    }

    let stores: Vec<String> = keeper.inner.read().meta.stores.clone();

    // Step 3: resolve the final archive path.
    let final_path = resolve_archive_path(archive_path, keeper.path())?;
    if let Some(parent) = final_path.parent() {
        fs::create_dir_all(parent).map_err(|e| KeeperError::io(format!("creating {}", parent.display()), e))?;
    }
    let tmp_tar_path = {
        let mut s = final_path.as_os_str().to_owned();
        s.push(".tar.tmp");
        PathBuf::from(s)
    };

    // Step 4: stream the keeper directory into the temporary tar file.
    {
        let tar_file = File::create(&tmp_tar_path)
            .map_err(|e| KeeperError::io(format!("creating {}", tmp_tar_path.display()), e))?;
        let mut builder = tar::Builder::new(tar_file);
        builder
            .append_dir_all(".", keeper.path())
            .map_err(|e| KeeperError::io("adding files to backup tar", e))?;
        let tar_file = builder.into_inner().map_err(|e| KeeperError::io("closing backup tar", e))?;
        tar_file.sync_all().map_err(|e| KeeperError::io("syncing backup tar", e))?;
    }

    // Step 5: verify every requested store appears in the tar.
    if let Err(e) = verify_stores_present(&tmp_tar_path, &stores) {
        let _ = fs::remove_file(&tmp_tar_path);
        return Err(e);
    }

    // Steps 6-7: gzip-wrap the tar with a fixed comment header.
    write_gzip(&tmp_tar_path, &final_path, extra)?;

    // Step 8: checksum the final compressed file.
    let checksum_value = sha256_hex_of_file(&final_path)?;

    // Remove the temporary tar; archive is now complete and atomic.
    fs::remove_file(&tmp_tar_path).map_err(|e| KeeperError::io(format!("removing {}", tmp_tar_path.display()), e))?;

    let size = fs::metadata(&final_path)
        .map_err(|e| KeeperError::io(format!("stat {}", final_path.display()), e))?
        .len();

    let descriptor = BackupDescriptor {
        timestamp: Utc::now(),
        format: "tar.gz".to_string(),
        path: final_path.display().to_string(),
        stores: stores.clone(),
        checksum: Checksum { kind: "sha256".to_string(), value: checksum_value },
        size,
    };

    let id = format!("{}-{}", descriptor.timestamp.to_rfc3339(), uuid::Uuid::new_v4().simple());
    {
        let mut inner = keeper.inner.write();
        inner.meta.add_backup(id, descriptor.clone());
        inner.meta.sync(keeper.path())?;
    }

    // Step 9: reopen what quiescence closed. Backup must leave the keeper
    // exactly as usable as it found it, not tombstoned.
    let (_, reopen_err) = keeper.discover(false)?;
    if let Some(e) = reopen_err {
        warn!(error = %e, "backup_all: reopening stores after backup reported partial failures");
    }

    info!(path = %descriptor.path, stores = stores.len(), "backup complete");
    Ok(descriptor)
}

/// If `archive_path` names an existing directory, derive `<dir>/<base(keeper_path)>.tar.gz`.
/// Otherwise `archive_path` is used verbatim as the final archive path.
fn resolve_archive_path(archive_path: &Path, keeper_path: &Path) -> Result<PathBuf> {
    match fs::metadata(archive_path) {
        Ok(stat) if stat.is_dir() => {
            let base = keeper_path.file_name().unwrap_or_default();
            Ok(archive_path.join(format!("{}.tar.gz", Path::new(base).display())))
        }
        _ => Ok(archive_path.to_path_buf()),
    }
}

fn verify_stores_present(tar_path: &Path, stores: &[String]) -> Result<()> {
    let mut seen: HashSet<&str> = HashSet::new();
    let file = File::open(tar_path).map_err(|e| KeeperError::io(format!("reopening {}", tar_path.display()), e))?;
    let mut archive = tar::Archive::new(file);
    let entries = archive.entries().map_err(|e| KeeperError::io("reading backup tar entries", e))?;
    for entry in entries {
        let entry = entry.map_err(|e| KeeperError::io("reading backup tar entry", e))?;
        let path = entry.path().map_err(|e| KeeperError::io("reading backup tar entry name", e))?;
        if let Some(std::path::Component::Normal(os)) =
            path.components().find(|c| !matches!(c, std::path::Component::CurDir))
        {
            if let Some(name) = os.to_str() {
                if let Some(matched) = stores.iter().find(|s| s.as_str() == name) {
                    seen.insert(matched.as_str());
                }
            }
        }
    }
    for store in stores {
        if !seen.contains(store.as_str()) {
            return Err(KeeperError::engine("backup", format!("store {store} not found in backup")));
        }
    }
    Ok(())
}

fn write_gzip(tmp_tar_path: &Path, final_path: &Path, extra: &[u8]) -> Result<()> {
    let mut comment = COMMENT_PREFIX.as_bytes().to_vec();
    if !extra.is_empty() {
        comment.push(b'\n');
        comment.extend_from_slice(extra);
    }
    let final_file =
        File::create(final_path).map_err(|e| KeeperError::io(format!("creating {}", final_path.display()), e))?;
    let mut encoder: GzEncoder<File> =
        GzBuilder::new().comment(comment).write(final_file, Compression::default());
    let mut tmp_tar =
        File::open(tmp_tar_path).map_err(|e| KeeperError::io(format!("reopening {}", tmp_tar_path.display()), e))?;
    io::copy(&mut tmp_tar, &mut encoder).map_err(|e| KeeperError::io("writing gzip archive", e))?;
    let final_file = encoder.finish().map_err(|e| KeeperError::io("closing gzip archive", e))?;
    final_file.sync_all().map_err(|e| KeeperError::io("syncing final archive", e))?;
    Ok(())
}

fn sha256_hex_of_file(path: &Path) -> Result<String> {
    let mut file = File::open(path).map_err(|e| KeeperError::io(format!("reopening {}", path.display()), e))?;
    let mut hasher = sha2::Sha256::new();
    io::copy(&mut file, &mut hasher).map_err(|e| KeeperError::io("hashing archive", e))?;
    Ok(hex_lower(&hasher.finalize()))
}

fn hex_lower(bytes: &[u8]) -> String {
    use std::fmt::Write as _;
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(out, "{b:02x}");
    }
    out
}

/// Unpack a `.tar.gz` archive under `out_path`, rejecting any entry whose
/// name is absolute or traverses outside the destination. Performs no
/// checksum verification — that's [`verify_backup`]'s job.
#[instrument(skip(archive_path, out_path), fields(archive = %archive_path.display(), out = %out_path.display()))]
pub fn restore_tar_gz_backup(archive_path: &Path, out_path: &Path) -> Result<()> {
    let file = File::open(archive_path)
        .map_err(|e| KeeperError::io(format!("opening {}", archive_path.display()), e))?;
    let decoder = flate2::read::GzDecoder::new(file);
    let mut archive = tar::Archive::new(decoder);
    let entries = archive.entries().map_err(|e| KeeperError::io("reading restore archive entries", e))?;
    for entry in entries {
        let mut entry = entry.map_err(|e| KeeperError::io("reading restore archive entry", e))?;
        let entry_path = entry.path().map_err(|e| KeeperError::io("reading restore entry name", e))?.into_owned();
        if entry_path.is_absolute()
            || entry_path.components().any(|c| matches!(c, std::path::Component::ParentDir))
        {
            return Err(KeeperError::io(
                "rejecting unsafe tar entry",
                io::Error::new(io::ErrorKind::InvalidInput, format!("{}", entry_path.display())),
            ));
        }
        let dest = out_path.join(&entry_path);
        match entry.header().entry_type() {
            tar::EntryType::Directory => {
                fs::create_dir_all(&dest).map_err(|e| KeeperError::io(format!("creating {}", dest.display()), e))?;
                #[cfg(unix)]
                {
                    use std::os::unix::fs::PermissionsExt;
                    let _ = fs::set_permissions(&dest, fs::Permissions::from_mode(0o755));
                }
            }
            tar::EntryType::Regular => {
                if let Some(parent) = dest.parent() {
                    fs::create_dir_all(parent)
                        .map_err(|e| KeeperError::io(format!("creating {}", parent.display()), e))?;
                }
                let mut out_file =
                    File::create(&dest).map_err(|e| KeeperError::io(format!("creating {}", dest.display()), e))?;
                io::copy(&mut entry, &mut out_file)
                    .map_err(|e| KeeperError::io(format!("writing {}", dest.display()), e))?;
            }
            other => {
                return Err(KeeperError::io(
                    "unsupported tar entry type in restore archive",
                    io::Error::new(io::ErrorKind::InvalidData, format!("{other:?}")),
                ))
            }
        }
    }
    Ok(())
}

/// Keeper-level restore: quiesce and snapshot any existing stores, destroy
/// them, unpack the archive over the keeper directory, then re-initialize
/// and re-discover. See spec.md §4.4 step list.
#[instrument(skip(keeper, archive_path), fields(path = %keeper.path().display()))]
pub fn restore_all(keeper: &Keeper, archive_path: &Path) -> Result<()> {
    let _guard = keeper.backup_lock.lock();

    let names: Vec<String> = keeper.all_stores()?.keys().cloned().collect();

    match keeper.sync_and_close_all() {
        Ok(()) | Err(KeeperError::NoStores) => {}
        Err(e) => return Err(KeeperError::engine("restore: sync_and_close_all", e)),
    }

    let mut pre_restore_path: Option<PathBuf> = None;
    if !names.is_empty() {
        let tmp_path = std::env::temp_dir().join(format!("pre-restore-{}.tar.gz", Utc::now().to_rfc3339()));
        let descriptor = backup_all_locked(keeper, &tmp_path, &[])
            .map_err(|e| KeeperError::engine("restore: taking pre-restore backup", e))?;
        pre_restore_path = Some(PathBuf::from(&descriptor.path));
        for name in &names {
            if let Err(e) = keeper.destroy(name) {
                return Err(with_pre_restore_hint(e, &pre_restore_path));
            }
        }
    }

    keeper.mark_uninitialized();

    if let Err(e) = restore_tar_gz_backup(archive_path, keeper.path()) {
        return Err(with_pre_restore_hint(e, &pre_restore_path));
    }

    if let Err(e) = keeper.force_reinitialize() {
        return Err(with_pre_restore_hint(e, &pre_restore_path));
    }
    let (_, discover_err) = match keeper.discover(true) {
        Ok(r) => r,
        Err(e) => return Err(with_pre_restore_hint(e, &pre_restore_path)),
    };
    {
        let mut inner = keeper.inner.write();
        if let Err(e) = inner.meta.sync(keeper.path()) {
            return Err(with_pre_restore_hint(e, &pre_restore_path));
        }
    }
    if let Some(e) = discover_err {
        return Err(with_pre_restore_hint(e, &pre_restore_path));
    }

    info!(path = %archive_path.display(), "restore complete");
    Ok(())
}

fn with_pre_restore_hint(err: KeeperError, pre_restore_path: &Option<PathBuf>) -> KeeperError {
    match pre_restore_path {
        Some(p) => KeeperError::engine(format!("restore (pre-restore snapshot at {})", p.display()), err),
        None => err,
    }
}

/// Recompute the digest of the declared algorithm over the archive named in
/// `descriptor.path` and compare it to the recorded value.
#[instrument(skip(descriptor), fields(path = %descriptor.path))]
pub fn verify_backup(descriptor: &BackupDescriptor) -> Result<()> {
    if descriptor.format != "tar.gz" {
        return Err(KeeperError::engine("verify_backup", format!("unsupported backup format: {}", descriptor.format)));
    }
    let mut file = File::open(&descriptor.path)
        .map_err(|e| KeeperError::io(format!("opening {}", descriptor.path), e))?;

    let digest = match descriptor.checksum.kind.as_str() {
        "sha256" => {
            let mut h = sha2::Sha256::new();
            io::copy(&mut file, &mut h).map_err(|e| KeeperError::io("hashing backup", e))?;
            hex_lower(&h.finalize())
        }
        "sha512" => {
            let mut h = sha2::Sha512::new();
            io::copy(&mut file, &mut h).map_err(|e| KeeperError::io("hashing backup", e))?;
            hex_lower(&h.finalize())
        }
        "sha1" => {
            let mut h = sha1::Sha1::new();
            io::copy(&mut file, &mut h).map_err(|e| KeeperError::io("hashing backup", e))?;
            hex_lower(&h.finalize())
        }
        "md5" => {
            let mut h = md5::Md5::new();
            io::copy(&mut file, &mut h).map_err(|e| KeeperError::io("hashing backup", e))?;
            hex_lower(&h.finalize())
        }
        other => {
            return Err(KeeperError::engine("verify_backup", format!("unsupported checksum type: {other}")));
        }
    };

    if digest != descriptor.checksum.value {
        return Err(KeeperError::engine(
            "verify_backup",
            format!("checksum mismatch: expected {}, got {digest}", descriptor.checksum.value),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod backup_tests;
