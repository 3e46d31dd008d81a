//! Compatibility shim for engines that, like some Go key/value backends the
//! original design had to accommodate, hand back a bare `(value, err)` pair
//! that can't natively distinguish "no such key" from "no error happened to
//! occur." [`crate::filer::Filer::get`] itself never needs this — it
//! returns `Result<Option<Vec<u8>>>`, which is unambiguous by construction —
//! but an engine wrapping a third-party store with murkier semantics can
//! still reach for [`normalize`] at its own boundary.

use crate::error::{KeeperError, Result};

/// Fold a `(value, err)` pair into the crate's single unambiguous outcome.
///
/// | value     | err        | result                                   |
/// |-----------|------------|-------------------------------------------|
/// | `Some(v)` | `None`     | `Ok(v)`                                    |
/// | `None`    | `None`     | `NonExistentKey { underlying: None }`       |
/// | `None`    | `Some(e)`  | `NonExistentKey { underlying: Some(e) }`    |
/// | `Some(_)` | `Some(e)`  | `e`, untouched                              |
pub fn normalize(key: &[u8], value: Option<Vec<u8>>, err: Option<KeeperError>) -> Result<Vec<u8>> {
    match (value, err) {
        (Some(v), None) => Ok(v),
        (None, None) => Err(KeeperError::NonExistentKey { key: key.to_vec(), underlying: None }),
        (None, Some(e)) => {
            Err(KeeperError::NonExistentKey { key: key.to_vec(), underlying: Some(Box::new(e)) })
        }
        (Some(_), Some(e)) => Err(e),
    }
}

#[cfg(test)]
mod regularize_tests;
