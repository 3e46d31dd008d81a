//! Default [`Searcher`] behavior built only on [`Filer`]'s `keys`/`get` —
//! for an engine whose on-disk layout has nothing cheaper to offer than
//! brute-force enumeration — plus a parallel variant for when the caller
//! wants a value scan to overlap its per-key I/O across several threads.
//!
//! [`crate::engines::logdb`] implements [`Searcher`] directly instead of
//! using this module, since it already holds every key in memory and can
//! filter without an extra round trip per key. A future engine without that
//! luxury can wrap itself in [`DefaultSearcher`] and get prefix/value scan
//! for free.

use std::sync::mpsc;

use crate::error::Result;
use crate::filer::{Filer, Searcher};
use crate::keyvalue::KeyValuePair;

/// Adapts any [`Filer`] into a [`Searcher`] by brute-force enumeration.
pub struct DefaultSearcher<'a> {
    filer: &'a dyn Filer,
}

impl<'a> DefaultSearcher<'a> {
    pub fn new(filer: &'a dyn Filer) -> Self {
        DefaultSearcher { filer }
    }
}

impl<'a> Searcher for DefaultSearcher<'a> {
    fn prefix_scan(&self, prefix: &[u8]) -> Result<Vec<KeyValuePair>> {
        prefix_scan(self.filer, prefix)
    }
    fn value_scan(&self, query: &[u8]) -> Result<Vec<KeyValuePair>> {
        value_scan(self.filer, query)
    }
    fn value_exists(&self, value: &[u8]) -> Result<Option<Vec<u8>>> {
        value_exists(self.filer, value)
    }
}

/// All (key, value) pairs whose key starts with `prefix`.
pub fn prefix_scan(filer: &dyn Filer, prefix: &[u8]) -> Result<Vec<KeyValuePair>> {
    let mut out = Vec::new();
    for key in filer.keys()? {
        if key.starts_with(prefix) {
            if let Some(value) = filer.get(&key)? {
                out.push(KeyValuePair::new(key, value));
            }
        }
    }
    Ok(out)
}

/// All (key, value) pairs whose value contains `query` as a byte substring.
pub fn value_scan(filer: &dyn Filer, query: &[u8]) -> Result<Vec<KeyValuePair>> {
    let mut out = Vec::new();
    for key in filer.keys()? {
        if let Some(value) = filer.get(&key)? {
            if contains_subslice(&value, query) {
                out.push(KeyValuePair::new(key, value));
            }
        }
    }
    Ok(out)
}

/// The first key (in enumeration order) whose value equals `value` exactly.
pub fn value_exists(filer: &dyn Filer, value: &[u8]) -> Result<Option<Vec<u8>>> {
    for key in filer.keys()? {
        if filer.get(&key)?.as_deref() == Some(value) {
            return Ok(Some(key));
        }
    }
    Ok(None)
}

fn contains_subslice(haystack: &[u8], needle: &[u8]) -> bool {
    if needle.is_empty() {
        return true;
    }
    haystack.windows(needle.len()).any(|w| w == needle)
}

/// Value-scan `filer` with its per-key `get` calls spread across
/// `worker_count` scoped threads, funnelling matches back through a channel.
/// This is the idiomatic analogue of the Go original's goroutine-plus-
/// channel streaming search: `std::thread::scope` bounds every worker to
/// this call (there's no `'static` handle to hand the caller), so the
/// channel exists to overlap I/O across workers rather than to let the
/// caller consume results before the scan finishes.
pub fn value_scan_parallel(filer: &dyn Filer, query: &[u8], worker_count: usize) -> Result<Vec<KeyValuePair>> {
    let keys = filer.keys()?;
    if keys.len() < 2 || worker_count <= 1 {
        return value_scan(filer, query);
    }

    let chunk_size = keys.len().div_ceil(worker_count);
    let (tx, rx) = mpsc::channel::<Result<Option<KeyValuePair>>>();

    std::thread::scope(|scope| {
        for chunk in keys.chunks(chunk_size) {
            let tx = tx.clone();
            scope.spawn(move || {
                for key in chunk {
                    let outcome = match filer.get(key) {
                        Ok(Some(value)) if contains_subslice(&value, query) => {
                            Ok(Some(KeyValuePair::new(key.clone(), value)))
                        }
                        Ok(_) => Ok(None),
                        Err(e) => Err(e),
                    };
                    if tx.send(outcome).is_err() {
                        return;
                    }
                }
            });
        }
        drop(tx);
    });

    let mut out = Vec::new();
    for outcome in rx {
        if let Some(pair) = outcome? {
            out.push(pair);
        }
    }
    Ok(out)
}

#[cfg(test)]
mod search_tests;
