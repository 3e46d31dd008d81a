use super::*;

#[test]
fn key_equality_is_by_bytes() {
    assert_eq!(Key::from("a"), Key::from("a"));
    assert_ne!(Key::from("a"), Key::from("b"));
}

#[test]
fn value_equality_is_by_bytes() {
    assert_eq!(Value::from("x"), Value::from("x"));
    assert_ne!(Value::from("x"), Value::from("y"));
}

#[test]
fn keyvalue_pair_equality_is_pairwise() {
    let a = KeyValuePair::new("k", "v");
    let b = KeyValuePair::new("k", "v");
    let c = KeyValuePair::new("k", "v2");
    assert_eq!(a, b);
    assert_ne!(a, c);
}

#[test]
fn key_as_str_is_lossy_view_not_used_for_equality() {
    let k = Key::from(vec![0xff, 0xfe]);
    // Must not panic even on invalid UTF-8.
    let _ = k.as_str();
}
