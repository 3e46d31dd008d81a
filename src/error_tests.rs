use super::*;

#[test]
fn non_existent_key_predicate() {
    let err = KeeperError::NonExistentKey { key: b"k".to_vec(), underlying: None };
    assert!(err.is_non_existent_key());
    assert!(!KeeperError::NoStores.is_non_existent_key());
}

#[test]
fn non_existent_key_nested_in_compound_is_detected() {
    let err = KeeperError::Compound(vec![
        KeeperError::NoStores,
        KeeperError::NonExistentKey { key: b"k".to_vec(), underlying: None },
    ]);
    assert!(err.is_non_existent_key());
}

#[test]
fn compound_collapses_single_error() {
    let errs = vec![KeeperError::NoStores];
    let result = KeeperError::compound(errs);
    assert!(matches!(result, Err(KeeperError::NoStores)));
}

#[test]
fn compound_of_none_is_ok() {
    assert!(KeeperError::compound(vec![]).is_ok());
}

#[test]
fn compound_retains_every_sub_error() {
    let errs = vec![KeeperError::NoStores, KeeperError::UnknownAction];
    match KeeperError::compound(errs) {
        Err(KeeperError::Compound(inner)) => assert_eq!(inner.len(), 2),
        other => panic!("expected Compound, got {other:?}"),
    }
}
