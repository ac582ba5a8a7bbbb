//! Record encoding and decoding.
//!
//! Every record in the data file starts with a one-byte tag:
//!
//! ```text
//! 'd' data block     u32 len | bytes
//! 'r' record node    key ref | value ref | u64 previous (0 = none)
//! 'b' block node     u32 count | count x (separator ref | u64 child)
//! 'v' version entry  u64 version | u64 root | u32 crc32 (over tag..root)
//! ```
//!
//! A ref is either an inline buffer (`'i'`, u32 len, bytes) or the offset of
//! a data block (`'@'`, u64 offset). Inline refs cost extra bytes in every
//! node that carries them but save a read when the node is decoded.
//!
//! Every offset stored in a record must point strictly below the record
//! itself. Decoding rejects forward references, which both matches the
//! append order and stops a corrupt file from sending descent in circles.
//!
//! # Limits
//!
//! Length and count prefixes are `u32`, so no buffer may exceed
//! `u32::MAX` bytes and no block may hold more than `u32::MAX` entries.
//! [`DataRef::store`] rejects oversized buffers with
//! [`NodeError::TooLarge`]; block widths are bounded by
//! `EngineConfig::MAX_BLOCK_ENTRIES`. The encoders assume both.

use std::cmp::Ordering;

use crate::storage::data::Data;
use crate::storage::file::{DataFile, FileError, HEADER_SIZE, Offset};
use crate::storage::rope::Rope;

/// Stored in a record's previous field when there is no previous occupant.
/// Offset 0 is inside the file header, so no record ever lives there.
pub const NO_PREVIOUS: Offset = 0;

/// Size in bytes of an encoded version entry.
pub const VERSION_ENTRY_SIZE: u64 = VERSION_ENTRY_LEN as u64;

/// [`VERSION_ENTRY_SIZE`] as a buffer length.
pub const VERSION_ENTRY_LEN: usize = 21;

const REF_INLINE: u8 = b'i';
const REF_STORED: u8 = b'@';

/// How far a cursor reads ahead when it needs more bytes.
const READ_AHEAD: usize = 4096;

/// Record kind discriminant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RecordTag {
    Data = b'd',
    Record = b'r',
    Block = b'b',
    Version = b'v',
}

impl TryFrom<u8> for RecordTag {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            b'd' => Ok(Self::Data),
            b'r' => Ok(Self::Record),
            b'b' => Ok(Self::Block),
            b'v' => Ok(Self::Version),
            _ => Err(value),
        }
    }
}

impl std::fmt::Display for RecordTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Data => "data block",
            Self::Record => "record",
            Self::Block => "block",
            Self::Version => "version entry",
        };
        f.write_str(name)
    }
}

/// A key or value as it appears inside a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataRef {
    /// Bytes embedded in the node.
    Inline(Data),
    /// Offset of a data block holding the bytes.
    Stored(Offset),
}

impl DataRef {
    /// Store `data` according to the inline policy.
    ///
    /// Buffers up to `inline_limit` bytes stay inline. Longer buffers are
    /// appended to `file` as a data block first and referenced by offset.
    pub fn store(file: &DataFile, data: &Data, inline_limit: usize) -> Result<Self, NodeError> {
        check_len(data.len())?;
        if data.len() <= inline_limit {
            return Ok(Self::Inline(data.clone()));
        }
        let offset = file.append(&make_data_block(data))?;
        Ok(Self::Stored(offset))
    }

    /// Number of bytes this ref occupies inside a node.
    #[must_use]
    pub fn encoded_len(&self) -> u64 {
        match self {
            Self::Inline(data) => 1 + 4 + data.len() as u64,
            Self::Stored(_) => 1 + 8,
        }
    }

    /// Materialize the referenced bytes.
    pub fn resolve(&self, file: &DataFile) -> Result<Data, NodeError> {
        match self {
            Self::Inline(data) => Ok(data.clone()),
            Self::Stored(offset) => read_data_block(file, *offset),
        }
    }

    /// Compare the referenced bytes with `key`.
    pub fn cmp_key(&self, file: &DataFile, key: &[u8]) -> Result<Ordering, NodeError> {
        match self {
            Self::Inline(data) => Ok(data.as_bytes().cmp(key)),
            Self::Stored(offset) => Ok(read_data_block(file, *offset)?.as_bytes().cmp(key)),
        }
    }

    fn encode(&self, rope: &mut Rope) {
        match self {
            Self::Inline(data) => {
                rope.push_u8(REF_INLINE);
                rope.push_u32(length_prefix(data.len()));
                rope.push_data(data);
            }
            Self::Stored(offset) => {
                rope.push_u8(REF_STORED);
                rope.push_u64(*offset);
            }
        }
    }

    fn decode(cursor: &mut Cursor<'_>, owner: Offset) -> Result<Self, NodeError> {
        let at = cursor.position();
        match cursor.u8()? {
            REF_INLINE => {
                let len = from_prefix(cursor.u32()?)?;
                Ok(Self::Inline(Data::from(cursor.bytes(len)?)))
            }
            REF_STORED => {
                let target = cursor.u64()?;
                check_backward(owner, target)?;
                Ok(Self::Stored(target))
            }
            tag => Err(NodeError::UnknownRefTag { offset: at, tag }),
        }
    }
}

/// One `(separator, child)` pair of a block node.
///
/// The separator is the smallest key in the child's subtree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockEntry {
    pub separator: DataRef,
    pub child: Offset,
}

/// A terminal node holding one key and its value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordNode {
    pub key: DataRef,
    pub value: DataRef,
    /// The record this one replaced for the same key, if any.
    pub previous: Option<Offset>,
}

impl RecordNode {
    /// Read a record node, failing if `offset` holds another kind.
    pub fn read(file: &DataFile, offset: Offset) -> Result<Self, NodeError> {
        match Node::read(file, offset)? {
            Node::Record(record) => Ok(record),
            Node::Block(_) => Err(NodeError::UnexpectedTag {
                offset,
                expected: RecordTag::Record,
                found: RecordTag::Block,
            }),
        }
    }

    /// Resolve the key bytes.
    pub fn key(&self, file: &DataFile) -> Result<Data, NodeError> {
        self.key.resolve(file)
    }

    /// Resolve the value bytes.
    pub fn value(&self, file: &DataFile) -> Result<Data, NodeError> {
        self.value.resolve(file)
    }

    /// Encoded size in bytes.
    #[must_use]
    pub fn encoded_len(&self) -> u64 {
        1 + self.key.encoded_len() + self.value.encoded_len() + 8
    }

    /// Encode this record.
    #[must_use]
    pub fn to_rope(&self) -> Rope {
        make_record(&self.key, &self.value, self.previous)
    }

    fn decode(cursor: &mut Cursor<'_>, offset: Offset) -> Result<Self, NodeError> {
        let key = DataRef::decode(cursor, offset)?;
        let value = DataRef::decode(cursor, offset)?;
        let previous = match cursor.u64()? {
            NO_PREVIOUS => None,
            target => {
                check_backward(offset, target)?;
                Some(target)
            }
        };
        Ok(Self {
            key,
            value,
            previous,
        })
    }
}

/// An internal node: ordered separators partitioning the key space.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlockNode {
    pub entries: Vec<BlockEntry>,
}

impl BlockNode {
    /// Read a block node, failing if `offset` holds another kind.
    pub fn read(file: &DataFile, offset: Offset) -> Result<Self, NodeError> {
        match Node::read(file, offset)? {
            Node::Block(block) => Ok(block),
            Node::Record(_) => Err(NodeError::UnexpectedTag {
                offset,
                expected: RecordTag::Block,
                found: RecordTag::Record,
            }),
        }
    }

    /// Encoded size in bytes.
    #[must_use]
    pub fn encoded_len(&self) -> u64 {
        1 + 4 + self
            .entries
            .iter()
            .map(|e| e.separator.encoded_len() + 8)
            .sum::<u64>()
    }

    /// Encode this block.
    #[must_use]
    pub fn to_rope(&self) -> Rope {
        make_block(&self.entries)
    }

    /// Index of the entry to descend into for `key`.
    ///
    /// Picks the greatest separator that is <= `key`, or the first entry when
    /// `key` sorts before every separator. Returns `None` for an empty block.
    pub fn find_child_index(&self, file: &DataFile, key: &[u8]) -> Result<Option<usize>, NodeError> {
        if self.entries.is_empty() {
            return Ok(None);
        }

        // First index whose separator is > key.
        let mut lo = 0;
        let mut hi = self.entries.len();
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            if self.entries[mid].separator.cmp_key(file, key)? == Ordering::Greater {
                hi = mid;
            } else {
                lo = mid + 1;
            }
        }

        Ok(Some(lo.saturating_sub(1)))
    }

    /// Position of the entry pointing at `child`.
    #[must_use]
    pub fn position_of(&self, child: Offset) -> Option<usize> {
        self.entries.iter().position(|e| e.child == child)
    }

    fn decode(cursor: &mut Cursor<'_>, offset: Offset) -> Result<Self, NodeError> {
        let count = from_prefix(cursor.u32()?)?;
        // Each entry takes at least 10 bytes; don't trust the count further.
        let mut entries = Vec::with_capacity(count.min(1024));
        for _ in 0..count {
            let separator = DataRef::decode(cursor, offset)?;
            let child = cursor.u64()?;
            check_backward(offset, child)?;
            entries.push(BlockEntry { separator, child });
        }
        Ok(Self { entries })
    }
}

/// A decoded tree node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Block(BlockNode),
    Record(RecordNode),
}

impl Node {
    /// Decode the node at `offset`, dispatching on its tag.
    pub fn read(file: &DataFile, offset: Offset) -> Result<Self, NodeError> {
        let mut cursor = Cursor::new(file, offset);
        match read_tag(&mut cursor)? {
            RecordTag::Block => Ok(Self::Block(BlockNode::decode(&mut cursor, offset)?)),
            RecordTag::Record => Ok(Self::Record(RecordNode::decode(&mut cursor, offset)?)),
            found => Err(NodeError::UnexpectedTag {
                offset,
                expected: RecordTag::Block,
                found,
            }),
        }
    }

    /// Whether this is a record (leaf) node.
    #[must_use]
    pub const fn is_record(&self) -> bool {
        matches!(self, Self::Record(_))
    }

    /// Encoded size in bytes.
    #[must_use]
    pub fn encoded_len(&self) -> u64 {
        match self {
            Self::Block(block) => block.encoded_len(),
            Self::Record(record) => record.encoded_len(),
        }
    }
}

/// A decoded version entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionEntry {
    pub version: u64,
    pub root: Offset,
}

impl VersionEntry {
    /// Read and verify the version entry at `offset`.
    pub fn read(file: &DataFile, offset: Offset) -> Result<Self, NodeError> {
        let bytes = file.read(offset, VERSION_ENTRY_LEN)?;
        Self::decode(&bytes, offset)
    }

    /// Verify and decode an entry from `bytes`, which were read at `offset`.
    /// Only the first `VERSION_ENTRY_SIZE` bytes are looked at.
    pub fn decode(bytes: &[u8], offset: Offset) -> Result<Self, NodeError> {
        let Some(bytes) = bytes.get(..VERSION_ENTRY_LEN) else {
            return Err(NodeError::File(FileError::OutOfBounds {
                offset,
                len: VERSION_ENTRY_SIZE,
                end: offset + bytes.len() as u64,
            }));
        };
        let found = RecordTag::try_from(bytes[0])
            .map_err(|tag| NodeError::UnknownTag { offset, tag })?;
        if found != RecordTag::Version {
            return Err(NodeError::UnexpectedTag {
                offset,
                expected: RecordTag::Version,
                found,
            });
        }

        let stored_crc = u32::from_be_bytes([bytes[17], bytes[18], bytes[19], bytes[20]]);
        if crc32fast::hash(&bytes[..17]) != stored_crc {
            return Err(NodeError::ChecksumMismatch { offset });
        }

        let mut version = [0u8; 8];
        version.copy_from_slice(&bytes[1..9]);
        let mut root = [0u8; 8];
        root.copy_from_slice(&bytes[9..17]);
        let entry = Self {
            version: u64::from_be_bytes(version),
            root: u64::from_be_bytes(root),
        };
        check_backward(offset, entry.root)?;
        Ok(entry)
    }
}

/// Encode a data block.
#[must_use]
pub fn make_data_block(data: &Data) -> Rope {
    let mut rope = Rope::new();
    rope.push_u8(RecordTag::Data as u8);
    rope.push_u32(length_prefix(data.len()));
    rope.push_data(data);
    rope
}

/// Encode a record node from refs.
#[must_use]
pub fn make_record(key: &DataRef, value: &DataRef, previous: Option<Offset>) -> Rope {
    let mut rope = Rope::new();
    rope.push_u8(RecordTag::Record as u8);
    key.encode(&mut rope);
    value.encode(&mut rope);
    rope.push_u64(previous.unwrap_or(NO_PREVIOUS));
    rope
}

/// Encode a record node with key and value inline.
#[must_use]
pub fn make_record_di(key: &Data, value: &Data, previous: Option<Offset>) -> Rope {
    make_record(
        &DataRef::Inline(key.clone()),
        &DataRef::Inline(value.clone()),
        previous,
    )
}

/// Encode a block node from entries.
#[must_use]
pub fn make_block(entries: &[BlockEntry]) -> Rope {
    let mut rope = Rope::new();
    rope.push_u8(RecordTag::Block as u8);
    rope.push_u32(length_prefix(entries.len()));
    for entry in entries {
        entry.separator.encode(&mut rope);
        rope.push_u64(entry.child);
    }
    rope
}

/// Encode a block node with every separator inline.
#[must_use]
pub fn make_block_di(entries: &[(Data, Offset)]) -> Rope {
    let mut rope = Rope::new();
    rope.push_u8(RecordTag::Block as u8);
    rope.push_u32(length_prefix(entries.len()));
    for (separator, child) in entries {
        DataRef::Inline(separator.clone()).encode(&mut rope);
        rope.push_u64(*child);
    }
    rope
}

/// Encode a version entry.
#[must_use]
pub fn make_version(version: u64, root: Offset) -> Rope {
    let mut body = [0u8; 17];
    body[0] = RecordTag::Version as u8;
    body[1..9].copy_from_slice(&version.to_be_bytes());
    body[9..17].copy_from_slice(&root.to_be_bytes());

    let mut rope = Rope::new();
    rope.push_bytes(&body);
    rope.push_u32(crc32fast::hash(&body));
    rope
}

/// Read the data block at `offset`.
pub fn read_data_block(file: &DataFile, offset: Offset) -> Result<Data, NodeError> {
    let tag = file.read_u8(offset)?;
    match RecordTag::try_from(tag) {
        Ok(RecordTag::Data) => Ok(file.read_data(offset + 1)?),
        Ok(found) => Err(NodeError::UnexpectedTag {
            offset,
            expected: RecordTag::Data,
            found,
        }),
        Err(tag) => Err(NodeError::UnknownTag { offset, tag }),
    }
}

/// Kind and encoded length of the record at `offset`.
///
/// Used to step through the file record by record. Version entries are
/// sized but not verified here.
pub fn record_extent(file: &DataFile, offset: Offset) -> Result<(RecordTag, u64), NodeError> {
    let mut cursor = Cursor::new(file, offset);
    let tag = read_tag(&mut cursor)?;
    let len = match tag {
        RecordTag::Data => 1 + 4 + u64::from(cursor.u32()?),
        RecordTag::Version => VERSION_ENTRY_SIZE,
        RecordTag::Record => RecordNode::decode(&mut cursor, offset)?.encoded_len(),
        RecordTag::Block => BlockNode::decode(&mut cursor, offset)?.encoded_len(),
    };
    let end = offset + len;
    if end > file.len() {
        return Err(FileError::OutOfBounds {
            offset,
            len,
            end: file.len(),
        }
        .into());
    }
    Ok((tag, len))
}

fn read_tag(cursor: &mut Cursor<'_>) -> Result<RecordTag, NodeError> {
    let offset = cursor.position();
    let tag = cursor.u8()?;
    RecordTag::try_from(tag).map_err(|tag| NodeError::UnknownTag { offset, tag })
}

/// Check that a buffer of `len` bytes fits a `u32` length prefix.
pub fn check_len(len: usize) -> Result<u32, NodeError> {
    u32::try_from(len).map_err(|_| NodeError::TooLarge { len: len as u64 })
}

#[allow(clippy::cast_possible_truncation)] // callers stay within check_len
fn length_prefix(len: usize) -> u32 {
    debug_assert!(check_len(len).is_ok(), "length {len} overflows its prefix");
    len as u32
}

fn from_prefix(len: u32) -> Result<usize, NodeError> {
    usize::try_from(len).map_err(|_| NodeError::TooLarge {
        len: u64::from(len),
    })
}

fn check_backward(owner: Offset, target: Offset) -> Result<(), NodeError> {
    if target >= HEADER_SIZE && target < owner {
        Ok(())
    } else {
        Err(NodeError::ForwardReference { owner, target })
    }
}

/// Sequential reader over one record, fetching the file in chunks.
struct Cursor<'a> {
    file: &'a DataFile,
    buf: Vec<u8>,
    /// File offset of `buf[0]`.
    buf_start: u64,
    /// Index of the next unread byte in `buf`.
    pos: usize,
}

impl<'a> Cursor<'a> {
    const fn new(file: &'a DataFile, offset: Offset) -> Self {
        Self {
            file,
            buf: Vec::new(),
            buf_start: offset,
            pos: 0,
        }
    }

    const fn position(&self) -> u64 {
        self.buf_start + self.pos as u64
    }

    fn bytes(&mut self, n: usize) -> Result<&[u8], NodeError> {
        if self.buf.len() - self.pos < n {
            self.fill(n)?;
        }
        let start = self.pos;
        self.pos += n;
        Ok(&self.buf[start..start + n])
    }

    /// Refill so that at least `n` bytes are available from the current
    /// position, reading ahead when the file has more.
    fn fill(&mut self, n: usize) -> Result<(), NodeError> {
        let start = self.position();
        let available =
            usize::try_from(self.file.len().saturating_sub(start)).unwrap_or(usize::MAX);
        let want = n.max(READ_AHEAD).min(available).max(n);
        self.buf = self.file.read(start, want)?;
        self.buf_start = start;
        self.pos = 0;
        Ok(())
    }

    fn u8(&mut self) -> Result<u8, NodeError> {
        Ok(self.bytes(1)?[0])
    }

    fn u32(&mut self) -> Result<u32, NodeError> {
        let b = self.bytes(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn u64(&mut self) -> Result<u64, NodeError> {
        let mut raw = [0u8; 8];
        raw.copy_from_slice(self.bytes(8)?);
        Ok(u64::from_be_bytes(raw))
    }
}

/// Errors that can occur when reading or writing records.
#[derive(Debug)]
pub enum NodeError {
    /// Underlying file error.
    File(FileError),
    /// A record starts with a byte that is not a known tag.
    UnknownTag { offset: u64, tag: u8 },
    /// A key or value ref starts with an unknown byte.
    UnknownRefTag { offset: u64, tag: u8 },
    /// A record of a different kind was found where one was expected.
    UnexpectedTag {
        offset: u64,
        expected: RecordTag,
        found: RecordTag,
    },
    /// A record points at itself, at something after it, or into the header.
    ForwardReference { owner: u64, target: u64 },
    /// A version entry's checksum does not match its contents.
    ChecksumMismatch { offset: u64 },
    /// A buffer or count does not fit the format's `u32` prefix.
    TooLarge { len: u64 },
}

impl NodeError {
    /// Whether this error means the file contents are damaged.
    #[must_use]
    pub const fn is_corruption(&self) -> bool {
        match self {
            Self::File(e) => e.is_corruption(),
            Self::TooLarge { .. } => false,
            _ => true,
        }
    }
}

impl std::fmt::Display for NodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::File(e) => write!(f, "file error: {e}"),
            Self::UnknownTag { offset, tag } => {
                write!(f, "unknown record tag 0x{tag:02x} at offset {offset}")
            }
            Self::UnknownRefTag { offset, tag } => {
                write!(f, "unknown ref tag 0x{tag:02x} at offset {offset}")
            }
            Self::UnexpectedTag {
                offset,
                expected,
                found,
            } => write!(f, "expected {expected} at offset {offset}, found {found}"),
            Self::ForwardReference { owner, target } => write!(
                f,
                "record at offset {owner} references offset {target}, which is not before it"
            ),
            Self::ChecksumMismatch { offset } => {
                write!(f, "version entry checksum mismatch at offset {offset}")
            }
            Self::TooLarge { len } => {
                write!(f, "length {len} exceeds the {} byte limit", u32::MAX)
            }
        }
    }
}

impl std::error::Error for NodeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::File(e) => Some(e),
            _ => None,
        }
    }
}

impl From<FileError> for NodeError {
    fn from(e: FileError) -> Self {
        Self::File(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use tempfile::{TempDir, tempdir};

    fn scratch() -> (TempDir, DataFile) {
        let dir = tempdir().expect("create temp dir");
        let file = DataFile::create(&dir.path().join("nodes.spine")).expect("create");
        (dir, file)
    }

    fn random_data(rng: &mut StdRng, max_len: usize) -> Data {
        let len = rng.random_range(0..=max_len);
        Data::from((0..len).map(|_| rng.random::<u8>()).collect::<Vec<u8>>())
    }

    #[test]
    fn test_data_block_layout() {
        let rope = make_data_block(&Data::from("abc"));
        assert_eq!(rope.to_vec(), vec![b'd', 0, 0, 0, 3, b'a', b'b', b'c']);
    }

    #[test]
    fn test_record_di_layout() {
        let rope = make_record_di(&Data::from("k"), &Data::from("vv"), None);
        let mut expected = vec![b'r'];
        expected.extend_from_slice(&[b'i', 0, 0, 0, 1, b'k']);
        expected.extend_from_slice(&[b'i', 0, 0, 0, 2, b'v', b'v']);
        expected.extend_from_slice(&[0; 8]);
        assert_eq!(rope.to_vec(), expected);
    }

    #[test]
    fn test_record_roundtrip_inline() {
        let (_dir, file) = scratch();
        let first = file
            .append(&make_record_di(&Data::from("a"), &Data::from("1"), None))
            .expect("append");
        let second = file
            .append(&make_record_di(&Data::from("a"), &Data::from("2"), Some(first)))
            .expect("append");

        let record = RecordNode::read(&file, second).expect("read");
        assert_eq!(record.key(&file).expect("key"), Data::from("a"));
        assert_eq!(record.value(&file).expect("value"), Data::from("2"));
        assert_eq!(record.previous, Some(first));
        assert_eq!(RecordNode::read(&file, first).expect("read").previous, None);
    }

    #[test]
    fn test_record_roundtrip_stored() {
        let (_dir, file) = scratch();
        let value = Data::from(vec![0xEE_u8; 500]);
        let value_ref = DataRef::store(&file, &value, 16).expect("store");
        assert!(matches!(value_ref, DataRef::Stored(_)));

        let key_ref = DataRef::store(&file, &Data::from("small"), 16).expect("store");
        assert_eq!(key_ref, DataRef::Inline(Data::from("small")));

        let off = file
            .append(&make_record(&key_ref, &value_ref, None))
            .expect("append");
        let record = RecordNode::read(&file, off).expect("read");
        assert_eq!(record.key, key_ref);
        assert_eq!(record.value, value_ref);
        assert_eq!(record.value(&file).expect("value"), value);
        assert_eq!(record.encoded_len(), record.to_rope().len() as u64);
    }

    #[test]
    fn test_block_roundtrip() {
        let (_dir, file) = scratch();
        let a = file
            .append(&make_record_di(&Data::from("a"), &Data::from("1"), None))
            .expect("append");
        let m = file
            .append(&make_record_di(&Data::from("m"), &Data::from("2"), None))
            .expect("append");

        let block_off = file
            .append(&make_block_di(&[(Data::from("a"), a), (Data::from("m"), m)]))
            .expect("append");

        let block = BlockNode::read(&file, block_off).expect("read");
        assert_eq!(block.entries.len(), 2);
        assert_eq!(block.entries[0].separator, DataRef::Inline(Data::from("a")));
        assert_eq!(block.entries[1].child, m);
        assert_eq!(block.encoded_len(), block.to_rope().len() as u64);
        assert_eq!(block.position_of(m), Some(1));
        assert_eq!(block.position_of(block_off), None);
    }

    #[test]
    fn test_random_roundtrip() {
        let (_dir, file) = scratch();
        let mut rng = StdRng::seed_from_u64(42);
        let mut children = Vec::new();

        for _ in 0..40 {
            let key = random_data(&mut rng, 40);
            let value = random_data(&mut rng, 200);
            let key_ref = DataRef::store(&file, &key, 32).expect("store");
            let value_ref = DataRef::store(&file, &value, 32).expect("store");
            let previous = children.last().map(|(_, off)| *off);
            let off = file
                .append(&make_record(&key_ref, &value_ref, previous))
                .expect("append");

            let record = RecordNode::read(&file, off).expect("read");
            assert_eq!(record.key(&file).expect("key"), key);
            assert_eq!(record.value(&file).expect("value"), value);
            assert_eq!(record.previous, previous);
            assert_eq!(record_extent(&file, off).expect("extent").1, record.encoded_len());
            children.push((key_ref, off));
        }

        let entries: Vec<BlockEntry> = children
            .iter()
            .map(|(separator, child)| BlockEntry {
                separator: separator.clone(),
                child: *child,
            })
            .collect();
        let off = file.append(&make_block(&entries)).expect("append");
        let block = BlockNode::read(&file, off).expect("read");
        assert_eq!(block.entries, entries);
        assert_eq!(
            record_extent(&file, off).expect("extent"),
            (RecordTag::Block, block.encoded_len())
        );
    }

    #[test]
    fn test_find_child_index() {
        let (_dir, file) = scratch();
        let mut entries = Vec::new();
        for key in ["b", "d", "f"] {
            let off = file
                .append(&make_record_di(&Data::from(key), &Data::empty(), None))
                .expect("append");
            entries.push((Data::from(key), off));
        }
        let off = file.append(&make_block_di(&entries)).expect("append");
        let block = BlockNode::read(&file, off).expect("read");

        let idx = |key: &str| block.find_child_index(&file, key.as_bytes()).expect("find");
        assert_eq!(idx("a"), Some(0)); // before every separator
        assert_eq!(idx("b"), Some(0));
        assert_eq!(idx("c"), Some(0));
        assert_eq!(idx("d"), Some(1));
        assert_eq!(idx("e"), Some(1));
        assert_eq!(idx("f"), Some(2));
        assert_eq!(idx("zzz"), Some(2));

        let empty = BlockNode::default();
        assert_eq!(empty.find_child_index(&file, b"x").expect("find"), None);
    }

    #[test]
    fn test_find_child_with_stored_separators() {
        let (_dir, file) = scratch();
        let mut entries = Vec::new();
        for i in 0..5u8 {
            let key = Data::from(vec![i * 10; 64]);
            let key_ref = DataRef::store(&file, &key, 8).expect("store");
            let off = file
                .append(&make_record(&key_ref, &DataRef::Inline(Data::empty()), None))
                .expect("append");
            entries.push(BlockEntry {
                separator: key_ref,
                child: off,
            });
        }
        let block = BlockNode { entries };

        assert_eq!(block.find_child_index(&file, &[25]).expect("find"), Some(2));
        assert_eq!(block.find_child_index(&file, &[0]).expect("find"), Some(0));
        assert_eq!(block.find_child_index(&file, &[255]).expect("find"), Some(4));
    }

    #[test]
    fn test_version_entry_roundtrip() {
        let (_dir, file) = scratch();
        let root = file.append(&make_block(&[])).expect("append");
        let off = file.append(&make_version(7, root)).expect("append");

        let entry = VersionEntry::read(&file, off).expect("read");
        assert_eq!(entry, VersionEntry { version: 7, root });
        assert_eq!(
            record_extent(&file, off).expect("extent"),
            (RecordTag::Version, VERSION_ENTRY_SIZE)
        );
    }

    #[test]
    fn test_version_entry_checksum() {
        let (_dir, file) = scratch();
        let root = file.append(&make_block(&[])).expect("append");
        let mut bytes = make_version(1, root).to_vec();
        bytes[4] ^= 0xFF;
        let mut rope = Rope::new();
        rope.push_bytes(&bytes);
        let off = file.append(&rope).expect("append");

        let err = VersionEntry::read(&file, off).expect_err("checksum must fail");
        assert!(matches!(err, NodeError::ChecksumMismatch { .. }));
        assert!(err.is_corruption());
    }

    #[test]
    fn test_length_prefix_limit() {
        assert_eq!(check_len(0).expect("fits"), 0);
        assert_eq!(check_len(5).expect("fits"), 5);
        let max = usize::try_from(u32::MAX).expect("usize holds u32");
        assert_eq!(check_len(max).expect("fits"), u32::MAX);

        #[cfg(target_pointer_width = "64")]
        {
            let err = check_len(max + 1).expect_err("too large");
            assert!(matches!(err, NodeError::TooLarge { len } if len == u64::from(u32::MAX) + 1));
            assert!(!err.is_corruption());
        }
    }

    #[test]
    fn test_version_entry_decode_short_buffer() {
        let bytes = make_version(3, HEADER_SIZE).to_vec();
        let err = VersionEntry::decode(&bytes[..20], 100).expect_err("short");
        assert!(matches!(
            err,
            NodeError::File(FileError::OutOfBounds { offset: 100, .. })
        ));
        assert_eq!(
            VersionEntry::decode(&bytes, 100).expect("decode"),
            VersionEntry {
                version: 3,
                root: HEADER_SIZE
            }
        );
    }

    #[test]
    fn test_unknown_tag() {
        let (_dir, file) = scratch();
        let mut rope = Rope::new();
        rope.push_bytes(b"zzzz");
        let off = file.append(&rope).expect("append");

        let err = Node::read(&file, off).expect_err("unknown tag");
        assert!(matches!(err, NodeError::UnknownTag { tag: b'z', .. }));
    }

    #[test]
    fn test_truncated_record() {
        let (_dir, file) = scratch();
        let full = make_record_di(&Data::from("key"), &Data::from("value"), None).to_vec();
        let mut rope = Rope::new();
        rope.push_bytes(&full[..full.len() - 3]);
        let off = file.append(&rope).expect("append");

        let err = Node::read(&file, off).expect_err("truncated");
        assert!(matches!(err, NodeError::File(FileError::OutOfBounds { .. })));
        assert!(err.is_corruption());
        assert!(record_extent(&file, off).is_err());
    }

    #[test]
    fn test_forward_reference_rejected() {
        let (_dir, file) = scratch();
        let future = file.len() + 1000;
        let off = file
            .append(&make_block_di(&[(Data::from("a"), future)]))
            .expect("append");

        let err = Node::read(&file, off).expect_err("forward ref");
        assert!(matches!(err, NodeError::ForwardReference { .. }));
    }

    #[test]
    fn test_wrong_kind() {
        let (_dir, file) = scratch();
        let data = file.append(&make_data_block(&Data::from("x"))).expect("append");
        let record = file
            .append(&make_record_di(&Data::from("k"), &Data::from("v"), None))
            .expect("append");

        assert!(matches!(
            Node::read(&file, data),
            Err(NodeError::UnexpectedTag {
                found: RecordTag::Data,
                ..
            })
        ));
        assert!(BlockNode::read(&file, record).is_err());
        assert!(read_data_block(&file, record).is_err());
        assert_eq!(read_data_block(&file, data).expect("data"), Data::from("x"));
    }
}
