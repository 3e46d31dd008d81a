use super::*;
use tempfile::tempdir;

fn logdb_keeper(dir: &std::path::Path) -> Keeper {
    Keeper::new(dir, "logdb", std::sync::Arc::new(crate::engines::logdb::open))
}

#[test]
fn migrate_copies_all_keys() {
    let from_dir = tempdir().unwrap();
    let to_dir = tempdir().unwrap();
    let from = logdb_keeper(from_dir.path());
    let to = logdb_keeper(to_dir.path());

    from.init("s1", None).unwrap();
    {
        let store = from.with("s1").unwrap().unwrap();
        store.put(b"a", b"1").unwrap();
        store.put(b"b", b"2").unwrap();
    }

    let migrator = Migrator::new(&from, &to).unwrap();
    migrator.migrate().unwrap();

    let dest = to.with("s1").unwrap().unwrap();
    assert_eq!(dest.get(b"a").unwrap(), Some(b"1".to_vec()));
    assert_eq!(dest.get(b"b").unwrap(), Some(b"2".to_vec()));
}

#[test]
fn migrate_fails_with_no_source_stores() {
    let from_dir = tempdir().unwrap();
    let to_dir = tempdir().unwrap();
    let from = logdb_keeper(from_dir.path());
    let to = logdb_keeper(to_dir.path());

    let migrator = Migrator::new(&from, &to).unwrap();
    let err = migrator.migrate().unwrap_err();
    assert!(matches!(err, KeeperError::NoStores));
}

#[test]
fn duplicate_keys_are_fatal_by_default() {
    let from_dir = tempdir().unwrap();
    let to_dir = tempdir().unwrap();
    let from = logdb_keeper(from_dir.path());
    let to = logdb_keeper(to_dir.path());

    from.init("s1", None).unwrap();
    to.init("s1", None).unwrap();
    from.with("s1").unwrap().unwrap().put(b"k", b"from").unwrap();
    to.with("s1").unwrap().unwrap().put(b"k", b"to").unwrap();

    let migrator = Migrator::new(&from, &to).unwrap();
    let err = migrator.check_duplicates().unwrap_err();
    assert!(matches!(err, KeeperError::DuplicateKeys(_)));

    let err = migrator.migrate().unwrap_err();
    assert!(matches!(err, KeeperError::DuplicateKeys(_)));
    assert_eq!(to.with("s1").unwrap().unwrap().get(b"k").unwrap(), Some(b"to".to_vec()));
}

#[test]
fn clobber_overwrites_destination() {
    let from_dir = tempdir().unwrap();
    let to_dir = tempdir().unwrap();
    let from = logdb_keeper(from_dir.path());
    let to = logdb_keeper(to_dir.path());

    from.init("s1", None).unwrap();
    to.init("s1", None).unwrap();
    from.with("s1").unwrap().unwrap().put(b"k", b"from").unwrap();
    to.with("s1").unwrap().unwrap().put(b"k", b"to").unwrap();

    let migrator = Migrator::new(&from, &to).unwrap().with_clobber();
    migrator.migrate().unwrap();

    assert_eq!(to.with("s1").unwrap().unwrap().get(b"k").unwrap(), Some(b"from".to_vec()));
}

#[test]
fn skip_existing_leaves_destination_untouched() {
    let from_dir = tempdir().unwrap();
    let to_dir = tempdir().unwrap();
    let from = logdb_keeper(from_dir.path());
    let to = logdb_keeper(to_dir.path());

    from.init("s1", None).unwrap();
    to.init("s1", None).unwrap();
    from.with("s1").unwrap().unwrap().put(b"k", b"from").unwrap();
    to.with("s1").unwrap().unwrap().put(b"k", b"to").unwrap();

    let migrator = Migrator::new(&from, &to).unwrap().with_skip_existing();
    migrator.migrate().unwrap();

    assert_eq!(to.with("s1").unwrap().unwrap().get(b"k").unwrap(), Some(b"to".to_vec()));
}

#[test]
fn migrate_creates_destination_stores_as_needed() {
    let from_dir = tempdir().unwrap();
    let to_dir = tempdir().unwrap();
    let from = logdb_keeper(from_dir.path());
    let to = logdb_keeper(to_dir.path());

    from.init("new-store", None).unwrap();
    from.with("new-store").unwrap().unwrap().put(b"k", b"v").unwrap();

    let migrator = Migrator::new(&from, &to).unwrap();
    migrator.migrate().unwrap();

    assert!(to.all_stores().unwrap().contains_key("new-store"));
}
