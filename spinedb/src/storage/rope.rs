//! Deferred byte builder for on-disk records.
//!
//! A `Rope` describes the bytes of one record (a node, a data block, or a
//! version entry) as an ordered list of segments. Nothing is concatenated
//! until the rope is flushed, and flushing is a single pass over the segments
//! into any `io::Write`. Nested records (an inline key inside a record node,
//! a record inside a test fixture) are attached with [`Rope::append`], which
//! moves the child rope instead of copying its bytes.
//!
//! All integers are big-endian.

use std::io::{self, Write};

use crate::storage::data::Data;

/// One piece of a rope.
#[derive(Debug, Clone)]
enum Segment {
    /// Small scalar fields, owned.
    Bytes(Vec<u8>),
    /// A shared buffer, referenced without copying.
    Data(Data),
    /// A nested rope.
    Rope(Rope),
}

/// An ordered, lazily concatenated sequence of byte chunks.
#[derive(Debug, Clone, Default)]
pub struct Rope {
    segments: Vec<Segment>,
    len: usize,
}

impl Rope {
    /// Create an empty rope.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            segments: Vec::new(),
            len: 0,
        }
    }

    /// Total number of bytes the rope will emit.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Whether the rope emits no bytes.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Append a single byte.
    pub fn push_u8(&mut self, value: u8) {
        self.push_bytes(&[value]);
    }

    /// Append a big-endian `u32`.
    pub fn push_u32(&mut self, value: u32) {
        self.push_bytes(&value.to_be_bytes());
    }

    /// Append a big-endian `u64`.
    pub fn push_u64(&mut self, value: u64) {
        self.push_bytes(&value.to_be_bytes());
    }

    /// Append raw bytes.
    ///
    /// Consecutive small writes are coalesced into one owned segment.
    pub fn push_bytes(&mut self, bytes: &[u8]) {
        if bytes.is_empty() {
            return;
        }
        self.len += bytes.len();
        if let Some(Segment::Bytes(last)) = self.segments.last_mut() {
            last.extend_from_slice(bytes);
        } else {
            self.segments.push(Segment::Bytes(bytes.to_vec()));
        }
    }

    /// Append a shared buffer without copying it.
    pub fn push_data(&mut self, data: &Data) {
        if data.is_empty() {
            return;
        }
        self.len += data.len();
        self.segments.push(Segment::Data(data.clone()));
    }

    /// Attach another rope after this one.
    pub fn append(&mut self, other: Self) {
        if other.is_empty() {
            return;
        }
        self.len += other.len;
        self.segments.push(Segment::Rope(other));
    }

    /// Concatenate two ropes into a new one.
    #[must_use]
    pub fn concat(mut self, other: Self) -> Self {
        self.append(other);
        self
    }

    /// Stream every byte, in order, into `out`.
    pub fn write_to<W: Write>(&self, out: &mut W) -> io::Result<()> {
        for segment in &self.segments {
            match segment {
                Segment::Bytes(bytes) => out.write_all(bytes)?,
                Segment::Data(data) => out.write_all(data.as_bytes())?,
                Segment::Rope(rope) => rope.write_to(out)?,
            }
        }
        Ok(())
    }

    /// Materialize the rope into one contiguous buffer.
    #[must_use]
    pub fn to_vec(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.len);
        self.extend_into(&mut buf);
        buf
    }

    fn extend_into(&self, buf: &mut Vec<u8>) {
        for segment in &self.segments {
            match segment {
                Segment::Bytes(bytes) => buf.extend_from_slice(bytes),
                Segment::Data(data) => buf.extend_from_slice(data.as_bytes()),
                Segment::Rope(rope) => rope.extend_into(buf),
            }
        }
    }
}

impl From<&Data> for Rope {
    fn from(data: &Data) -> Self {
        let mut rope = Self::new();
        rope.push_data(data);
        rope
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_rope() {
        let rope = Rope::new();
        assert!(rope.is_empty());
        assert_eq!(rope.to_vec(), Vec::<u8>::new());
    }

    #[test]
    fn test_integers_are_big_endian() {
        let mut rope = Rope::new();
        rope.push_u8(0xAA);
        rope.push_u32(0x0102_0304);
        rope.push_u64(5);
        assert_eq!(rope.len(), 13);
        assert_eq!(
            rope.to_vec(),
            vec![0xAA, 1, 2, 3, 4, 0, 0, 0, 0, 0, 0, 0, 5]
        );
    }

    #[test]
    fn test_nested_ropes_keep_order() {
        let mut inner = Rope::new();
        inner.push_bytes(b"bc");
        inner.push_data(&Data::from("de"));

        let mut outer = Rope::new();
        outer.push_bytes(b"a");
        outer.append(inner);
        outer.push_bytes(b"f");

        assert_eq!(outer.len(), 6);
        assert_eq!(outer.to_vec(), b"abcdef".to_vec());
    }

    #[test]
    fn test_concat() {
        let left = Rope::from(&Data::from("left-"));
        let right = Rope::from(&Data::from("right"));
        let joined = left.concat(right);
        assert_eq!(joined.len(), 10);
        assert_eq!(joined.to_vec(), b"left-right".to_vec());
    }

    #[test]
    fn test_write_to_matches_to_vec() {
        let mut rope = Rope::new();
        rope.push_u32(3);
        rope.push_data(&Data::from("xyz"));
        rope.append(Rope::from(&Data::from("!")));

        let mut sink = Vec::new();
        rope.write_to(&mut sink).expect("write to vec");
        assert_eq!(sink, rope.to_vec());
        assert_eq!(sink.len(), rope.len());
    }

    #[test]
    fn test_data_segments_are_not_copied_into_scalars() {
        let mut rope = Rope::new();
        rope.push_u8(1);
        rope.push_data(&Data::from("payload"));
        rope.push_u8(2);
        // scalar, data, scalar
        assert_eq!(rope.segments.len(), 3);
    }
}
