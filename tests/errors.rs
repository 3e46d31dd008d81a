//! Non-existent-key predicate and double-close behavior — spec.md §8.

use std::sync::Arc;

use keeperdb::{regularize, Filer, Keeper, KeeperError};

fn new_keeper(path: &std::path::Path) -> Keeper {
    Keeper::new(path, "logdb", Arc::new(keeperdb::engines::logdb::open))
}

#[test]
fn missing_key_normalizes_to_non_existent_key() {
    let dir = tempfile::tempdir().unwrap();
    let keeper = new_keeper(dir.path());
    keeper.init("s1", None).unwrap();
    let store = keeper.with("s1").unwrap().unwrap();

    let value = store.get(b"missing").unwrap();
    let err = regularize::normalize(b"missing", value, None).unwrap_err();
    assert!(err.is_non_existent_key());
}

#[test]
fn double_close_fails_distinctly_not_silently() {
    let dir = tempfile::tempdir().unwrap();
    let keeper = new_keeper(dir.path());
    let store = keeper.with_new("s1", None).unwrap();

    store.close().unwrap();
    let second = store.close();
    assert!(matches!(second, Err(KeeperError::Closed)));
}

#[test]
fn closed_store_rejects_further_operations() {
    let dir = tempfile::tempdir().unwrap();
    let keeper = new_keeper(dir.path());
    let store = keeper.with_new("s1", None).unwrap();
    store.put(b"k", b"v").unwrap();
    store.close().unwrap();

    assert!(matches!(store.get(b"k"), Err(KeeperError::Closed)));
    assert!(matches!(store.put(b"k2", b"v2"), Err(KeeperError::Closed)));
}
