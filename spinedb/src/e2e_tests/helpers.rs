//! Common helpers for end-to-end tests.

use std::path::Path;

use crate::storage::Data;

/// Deterministic key for index `i`; sorts in index order.
pub fn key(i: u32) -> Data {
    Data::from(format!("key-{i:06}").as_str())
}

/// Deterministic value for index `i` at revision `rev`.
pub fn value(i: u32, rev: u32) -> Data {
    Data::from(format!("value-{i}-{rev}").as_str())
}

/// Current bytes of the file at `path`.
pub fn file_bytes(path: &Path) -> Vec<u8> {
    std::fs::read(path).expect("read data file")
}

/// Random key over a small alphabet so collisions are common.
pub fn random_key(rng: &mut impl rand::Rng, max_len: usize) -> Data {
    let len = rng.random_range(1..=max_len);
    Data::from(
        (0..len)
            .map(|_| rng.random_range(b'a'..=b'h'))
            .collect::<Vec<u8>>(),
    )
}
