//! Migration between two keepers under each collision policy —
//! spec.md §8: clean copy, fatal collision, and clobber-resolved collision.

use std::sync::Arc;

use keeperdb::{Filer, Keeper, KeeperError, Migrator};

fn new_keeper(path: &std::path::Path) -> Keeper {
    Keeper::new(path, "logdb", Arc::new(keeperdb::engines::logdb::open))
}

#[test]
fn clean_migration_copies_everything() {
    let from_dir = tempfile::tempdir().unwrap();
    let to_dir = tempfile::tempdir().unwrap();
    let from = new_keeper(from_dir.path());
    let to = new_keeper(to_dir.path());

    from.init("inventory", None).unwrap();
    {
        let store = from.with("inventory").unwrap().unwrap();
        store.put(b"widget", b"10").unwrap();
        store.put(b"gadget", b"3").unwrap();
    }

    let migrator = Migrator::new(&from, &to).unwrap();
    migrator.migrate().unwrap();

    let dest = to.with("inventory").unwrap().unwrap();
    assert_eq!(dest.get(b"widget").unwrap(), Some(b"10".to_vec()));
    assert_eq!(dest.get(b"gadget").unwrap(), Some(b"3".to_vec()));
}

#[test]
fn colliding_keys_are_fatal_without_a_policy() {
    let from_dir = tempfile::tempdir().unwrap();
    let to_dir = tempfile::tempdir().unwrap();
    let from = new_keeper(from_dir.path());
    let to = new_keeper(to_dir.path());

    from.init("inventory", None).unwrap();
    to.init("inventory", None).unwrap();
    from.with("inventory").unwrap().unwrap().put(b"widget", b"10").unwrap();
    to.with("inventory").unwrap().unwrap().put(b"widget", b"999").unwrap();

    let migrator = Migrator::new(&from, &to).unwrap();
    let err = migrator.migrate().unwrap_err();
    assert!(matches!(err, KeeperError::DuplicateKeys(_)));
    // Destination is untouched.
    assert_eq!(to.with("inventory").unwrap().unwrap().get(b"widget").unwrap(), Some(b"999".to_vec()));
}

#[test]
fn clobber_resolves_collisions_in_favor_of_source() {
    let from_dir = tempfile::tempdir().unwrap();
    let to_dir = tempfile::tempdir().unwrap();
    let from = new_keeper(from_dir.path());
    let to = new_keeper(to_dir.path());

    from.init("inventory", None).unwrap();
    to.init("inventory", None).unwrap();
    from.with("inventory").unwrap().unwrap().put(b"widget", b"10").unwrap();
    to.with("inventory").unwrap().unwrap().put(b"widget", b"999").unwrap();

    let migrator = Migrator::new(&from, &to).unwrap().with_clobber();
    migrator.migrate().unwrap();

    assert_eq!(to.with("inventory").unwrap().unwrap().get(b"widget").unwrap(), Some(b"10".to_vec()));
}
