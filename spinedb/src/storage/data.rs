//! Immutable byte buffers used for keys and values.
//!
//! # Ordering
//!
//! `Data` orders byte-lexicographically, with a shorter buffer sorting first
//! when it is a prefix of the longer one. This is the only key comparison the
//! tree uses, for separators and leaves alike.

use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

/// An immutable, length-known sequence of bytes.
///
/// Cloning shares the underlying allocation.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Data(Arc<[u8]>);

impl Data {
    /// Create a buffer by copying `bytes`.
    #[must_use]
    pub fn new(bytes: &[u8]) -> Self {
        Self(Arc::from(bytes))
    }

    /// An empty buffer.
    #[must_use]
    pub fn empty() -> Self {
        Self::new(&[])
    }

    /// Number of bytes in the buffer.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the buffer holds no bytes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Borrow the raw bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Copy the bytes into an owned vector.
    #[must_use]
    pub fn to_vec(&self) -> Vec<u8> {
        self.0.to_vec()
    }
}

impl Deref for Data {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.0
    }
}

impl AsRef<[u8]> for Data {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<Vec<u8>> for Data {
    fn from(bytes: Vec<u8>) -> Self {
        Self(Arc::from(bytes))
    }
}

impl From<&[u8]> for Data {
    fn from(bytes: &[u8]) -> Self {
        Self::new(bytes)
    }
}

impl<const N: usize> From<&[u8; N]> for Data {
    fn from(bytes: &[u8; N]) -> Self {
        Self::new(bytes)
    }
}

impl From<&str> for Data {
    fn from(s: &str) -> Self {
        Self::new(s.as_bytes())
    }
}

impl PartialEq<[u8]> for Data {
    fn eq(&self, other: &[u8]) -> bool {
        self.as_bytes() == other
    }
}

impl PartialEq<&[u8]> for Data {
    fn eq(&self, other: &&[u8]) -> bool {
        self.as_bytes() == *other
    }
}

impl fmt::Debug for Data {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match std::str::from_utf8(&self.0) {
            Ok(s) if s.chars().all(|c| !c.is_control()) => write!(f, "Data({s:?})"),
            _ => {
                write!(f, "Data(0x")?;
                for byte in self.0.iter() {
                    write!(f, "{byte:02x}")?;
                }
                write!(f, ")")
            }
        }
    }
}

impl fmt::Display for Data {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    #[test]
    fn test_ordering_is_lexicographic() {
        assert!(Data::from("a") < Data::from("b"));
        assert!(Data::from("ab") < Data::from("b"));
        assert!(Data::from(&[0x01, 0xff]) < Data::from(&[0x02]));
    }

    #[test]
    fn test_prefix_sorts_first() {
        assert!(Data::empty() < Data::from("a"));
        assert!(Data::from("app") < Data::from("apple"));
    }

    #[test]
    fn test_ordering_matches_slices() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..500 {
            let a: Vec<u8> = (0..rng.random_range(0..6)).map(|_| rng.random_range(0..4)).collect();
            let b: Vec<u8> = (0..rng.random_range(0..6)).map(|_| rng.random_range(0..4)).collect();
            assert_eq!(
                Data::from(a.clone()).cmp(&Data::from(b.clone())),
                a.as_slice().cmp(b.as_slice())
            );
        }
    }

    #[test]
    fn test_clone_shares_bytes() {
        let data = Data::from("shared");
        let copy = data.clone();
        assert_eq!(data.as_bytes().as_ptr(), copy.as_bytes().as_ptr());
    }

    #[test]
    fn test_debug_format() {
        assert_eq!(format!("{:?}", Data::from("key")), "Data(\"key\")");
        assert_eq!(format!("{:?}", Data::from(&[0x00, 0xab])), "Data(0x00ab)");
    }
}
