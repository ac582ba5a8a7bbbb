//! Root-to-leaf traversal record.

use std::fmt;

use crate::storage::file::Offset;

/// Stack of offsets visited while descending one version's tree.
///
/// The bottom is the version's root and the top is the node the descent
/// stopped at: a record, or the root itself when the tree is empty. Popping
/// walks back up the spine, which is the order the copy-on-write rebuild
/// needs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Path {
    offsets: Vec<Offset>,
}

impl Path {
    /// Create an empty path.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            offsets: Vec::new(),
        }
    }

    /// Push an offset on top.
    pub fn push(&mut self, offset: Offset) {
        self.offsets.push(offset);
    }

    /// Remove and return the most recently pushed offset.
    pub fn pop(&mut self) -> Option<Offset> {
        self.offsets.pop()
    }

    /// The most recently pushed offset.
    #[must_use]
    pub fn peek(&self) -> Option<Offset> {
        self.offsets.last().copied()
    }

    /// The first offset pushed (the root).
    #[must_use]
    pub fn root(&self) -> Option<Offset> {
        self.offsets.first().copied()
    }

    /// Number of offsets on the stack.
    #[must_use]
    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    /// Whether the stack is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    /// Offsets from root to top.
    #[must_use]
    pub fn as_slice(&self) -> &[Offset] {
        &self.offsets
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, offset) in self.offsets.iter().enumerate() {
            if i > 0 {
                f.write_str(" -> ")?;
            }
            write!(f, "{offset}")?;
        }
        f.write_str("]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_pop_order() {
        let mut path = Path::new();
        path.push(16);
        path.push(120);
        path.push(300);

        assert_eq!(path.len(), 3);
        assert_eq!(path.root(), Some(16));
        assert_eq!(path.peek(), Some(300));
        assert_eq!(path.pop(), Some(300));
        assert_eq!(path.pop(), Some(120));
        assert_eq!(path.pop(), Some(16));
        assert_eq!(path.pop(), None);
        assert!(path.is_empty());
    }

    #[test]
    fn test_display() {
        let mut path = Path::new();
        assert_eq!(path.to_string(), "[]");
        path.push(16);
        path.push(42);
        assert_eq!(path.to_string(), "[16 -> 42]");
    }
}
