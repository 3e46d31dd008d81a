use super::*;
use tempfile::tempdir;

fn open_store(dir: &std::path::Path) -> std::sync::Arc<dyn Engine> {
    open(dir, None).unwrap()
}

#[test]
fn put_then_get_roundtrips() {
    let dir = tempdir().unwrap();
    let store = open_store(&dir.path().join("s1"));
    store.put(b"k1", b"v1").unwrap();
    assert_eq!(store.get(b"k1").unwrap(), Some(b"v1".to_vec()));
    assert!(store.has(b"k1").unwrap());
    assert!(!store.has(b"missing").unwrap());
}

#[test]
fn get_missing_key_is_none() {
    let dir = tempdir().unwrap();
    let store = open_store(&dir.path().join("s1"));
    assert_eq!(store.get(b"nope").unwrap(), None);
}

#[test]
fn delete_removes_key() {
    let dir = tempdir().unwrap();
    let store = open_store(&dir.path().join("s1"));
    store.put(b"k1", b"v1").unwrap();
    store.delete(b"k1").unwrap();
    assert_eq!(store.get(b"k1").unwrap(), None);
    assert!(!store.has(b"k1").unwrap());
}

#[test]
fn put_overwrites_existing_value() {
    let dir = tempdir().unwrap();
    let store = open_store(&dir.path().join("s1"));
    store.put(b"k1", b"v1").unwrap();
    store.put(b"k1", b"v2").unwrap();
    assert_eq!(store.get(b"k1").unwrap(), Some(b"v2".to_vec()));
    assert_eq!(store.len().unwrap(), 1);
}

#[test]
fn len_and_keys_reflect_contents() {
    let dir = tempdir().unwrap();
    let store = open_store(&dir.path().join("s1"));
    store.put(b"a", b"1").unwrap();
    store.put(b"b", b"2").unwrap();
    assert_eq!(store.len().unwrap(), 2);
    let mut keys = store.keys().unwrap();
    keys.sort();
    assert_eq!(keys, vec![b"a".to_vec(), b"b".to_vec()]);
}

#[test]
fn close_then_operation_errors_closed() {
    let dir = tempdir().unwrap();
    let store = open_store(&dir.path().join("s1"));
    store.put(b"a", b"1").unwrap();
    store.close().unwrap();
    assert!(matches!(store.get(b"a"), Err(KeeperError::Closed)));
    assert!(matches!(store.close(), Err(KeeperError::Closed)));
}

#[test]
fn reopen_after_close_replays_log() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("s1");
    {
        let store = open_store(&path);
        store.put(b"a", b"1").unwrap();
        store.put(b"b", b"2").unwrap();
        store.delete(b"a").unwrap();
        store.close().unwrap();
    }
    let reopened = open_store(&path);
    assert_eq!(reopened.get(b"a").unwrap(), None);
    assert_eq!(reopened.get(b"b").unwrap(), Some(b"2".to_vec()));
}

#[test]
fn reopen_without_clean_close_rebuilds_from_log() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("s1");
    {
        let store = open_store(&path);
        store.put(b"a", b"1").unwrap();
        store.put(b"b", b"2").unwrap();
        // No close(): index.bin is never written, forcing a log replay.
    }
    fs::remove_file(index_path(&path)).ok();
    let reopened = open_store(&path);
    assert_eq!(reopened.get(b"a").unwrap(), Some(b"1".to_vec()));
    assert_eq!(reopened.get(b"b").unwrap(), Some(b"2".to_vec()));
}

#[test]
fn corrupt_index_snapshot_triggers_corrupt_engine_metadata() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("s1");
    {
        let store = open_store(&path);
        store.put(b"a", b"1").unwrap();
        store.close().unwrap();
    }
    fs::write(index_path(&path), b"not a valid index snapshot at all").unwrap();
    let err = open(&path, None).unwrap_err();
    assert!(matches!(err, KeeperError::CorruptEngineMetadata { .. }));
}

#[test]
fn max_key_size_rejects_oversized_key() {
    let dir = tempdir().unwrap();
    let opts = serde_json::json!({"max_key_size": 4});
    let store = open(&dir.path().join("s1"), Some(opts)).unwrap();
    assert!(store.put(b"toolongkey", b"v").is_err());
    assert!(store.put(b"ok", b"v").is_ok());
}

#[test]
fn bad_options_reports_bad_options_error() {
    let dir = tempdir().unwrap();
    let opts = serde_json::json!({"max_key_size": "not a number"});
    let err = open(&dir.path().join("s1"), Some(opts)).unwrap_err();
    assert!(matches!(err, KeeperError::BadOptions { .. }));
}

#[test]
fn prefix_scan_and_value_scan_and_value_exists() {
    let dir = tempdir().unwrap();
    let store = open_store(&dir.path().join("s1"));
    store.put(b"user:1", b"alice").unwrap();
    store.put(b"user:2", b"bob").unwrap();
    store.put(b"order:1", b"widget").unwrap();

    let searcher = store.as_searcher().unwrap();
    let mut prefixed = searcher.prefix_scan(b"user:").unwrap();
    prefixed.sort_by(|a, b| a.key.as_bytes().cmp(b.key.as_bytes()));
    assert_eq!(prefixed.len(), 2);

    let matches = searcher.value_scan(b"ali").unwrap();
    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].key.as_bytes(), b"user:1");

    assert_eq!(searcher.value_exists(b"bob").unwrap(), Some(b"user:2".to_vec()));
    assert_eq!(searcher.value_exists(b"nobody").unwrap(), None);
}

#[test]
fn lock_file_removed_on_close() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("s1");
    let store = open_store(&path);
    assert!(lock_path(&path).exists());
    store.close().unwrap();
    assert!(!lock_path(&path).exists());
}
