use super::*;
use tempfile::tempdir;

fn logdb_keeper(dir: &std::path::Path) -> Keeper {
    Keeper::new(dir, "logdb", std::sync::Arc::new(crate::engines::logdb::open))
}

#[test]
fn init_creates_meta_json_and_store_dir() {
    let dir = tempdir().unwrap();
    let keeper = logdb_keeper(dir.path());
    keeper.init("s1", None).unwrap();
    assert!(dir.path().join(crate::metadata::META_FILENAME).exists());
    assert!(dir.path().join("s1").exists());
}

#[test]
fn init_twice_is_store_exists_error() {
    let dir = tempdir().unwrap();
    let keeper = logdb_keeper(dir.path());
    keeper.init("s1", None).unwrap();
    let err = keeper.init("s1", None).unwrap_err();
    assert!(matches!(err, KeeperError::StoreExists(_)));
}

#[test]
fn with_returns_none_for_unknown_store() {
    let dir = tempdir().unwrap();
    let keeper = logdb_keeper(dir.path());
    assert!(keeper.with("nope").unwrap().is_none());
}

#[test]
fn with_new_creates_on_first_call_reuses_on_second() {
    let dir = tempdir().unwrap();
    let keeper = logdb_keeper(dir.path());
    let first = keeper.with_new("s1", None).unwrap();
    first.put(b"k", b"v").unwrap();
    let second = keeper.with_new("s1", None).unwrap();
    assert_eq!(second.get(b"k").unwrap(), Some(b"v".to_vec()));
}

#[test]
fn close_evicts_from_store_map_and_with_returns_none() {
    let dir = tempdir().unwrap();
    let keeper = logdb_keeper(dir.path());
    keeper.init("s1", None).unwrap();
    keeper.close("s1").unwrap();
    assert!(keeper.with("s1").unwrap().is_none());
}

#[test]
fn close_unknown_store_is_bogus_store() {
    let dir = tempdir().unwrap();
    let keeper = logdb_keeper(dir.path());
    let err = keeper.close("nope").unwrap_err();
    assert!(matches!(err, KeeperError::BogusStore(_)));
}

#[test]
fn destroy_removes_directory_and_metadata_entry() {
    let dir = tempdir().unwrap();
    let keeper = logdb_keeper(dir.path());
    keeper.init("s1", None).unwrap();
    keeper.destroy("s1").unwrap();
    assert!(!dir.path().join("s1").exists());
    assert!(!keeper.meta().unwrap().stores.contains(&"s1".to_string()));
}

#[test]
fn destroy_tolerates_already_closed_store() {
    let dir = tempdir().unwrap();
    let keeper = logdb_keeper(dir.path());
    keeper.init("s1", None).unwrap();
    keeper.with("s1").unwrap().unwrap().close().unwrap();
    // The engine handle is already closed; destroy must still succeed.
    keeper.destroy("s1").unwrap();
    assert!(!dir.path().join("s1").exists());
}

#[test]
fn sync_all_and_close_all_fail_with_no_stores() {
    let dir = tempdir().unwrap();
    let keeper = logdb_keeper(dir.path());
    assert!(matches!(keeper.sync_all().unwrap_err(), KeeperError::NoStores));
    assert!(matches!(keeper.close_all().unwrap_err(), KeeperError::NoStores));
}

#[test]
fn sync_and_close_all_closes_every_store() {
    let dir = tempdir().unwrap();
    let keeper = logdb_keeper(dir.path());
    keeper.init("s1", None).unwrap();
    keeper.init("s2", None).unwrap();
    keeper.with("s1").unwrap().unwrap().put(b"a", b"1").unwrap();
    keeper.sync_and_close_all().unwrap();
    assert!(keeper.all_stores().unwrap().is_empty());
}

#[test]
fn discover_finds_store_directories_created_on_disk() {
    let dir = tempdir().unwrap();
    let keeper = logdb_keeper(dir.path());
    keeper.init("s1", None).unwrap();
    keeper.sync_and_close_all().unwrap();

    let (found, errs) = keeper.discover(false).unwrap();
    assert!(errs.is_none());
    assert!(found.contains(&"s1".to_string()));
    assert!(keeper.with("s1").unwrap().is_some());
}

#[test]
fn discover_with_force_reopens_already_open_stores() {
    let dir = tempdir().unwrap();
    let keeper = logdb_keeper(dir.path());
    keeper.init("s1", None).unwrap();
    keeper.with("s1").unwrap().unwrap().put(b"k", b"v").unwrap();
    keeper.sync("s1").unwrap();

    let (found, errs) = keeper.discover(true).unwrap();
    assert!(errs.is_none());
    assert!(found.contains(&"s1".to_string()));
    // The re-opened handle still sees durable data.
    assert_eq!(keeper.with("s1").unwrap().unwrap().get(b"k").unwrap(), Some(b"v".to_vec()));
}

#[test]
fn double_close_of_the_same_engine_handle_fails_distinctly() {
    let dir = tempdir().unwrap();
    let keeper = logdb_keeper(dir.path());
    let store = keeper.with_new("s1", None).unwrap();
    store.close().unwrap();
    assert!(matches!(store.close(), Err(KeeperError::Closed)));
}

#[test]
fn engine_type_mismatch_is_rejected_on_reopen() {
    let dir = tempdir().unwrap();
    let keeper = logdb_keeper(dir.path());
    keeper.init("s1", None).unwrap();
    drop(keeper);

    let mismatched =
        Keeper::new(dir.path(), "other-engine", std::sync::Arc::new(crate::engines::logdb::open));
    let err = mismatched.init("s2", None).unwrap_err();
    assert!(matches!(err, KeeperError::BadOptions { .. }));
}
