//! Tree descent and copy-on-write rebuild.
//!
//! A tree is identified by the offset of its root block. Leaves are record
//! nodes holding one key each; every leaf sits at the same depth. A block's
//! separators are the smallest keys of its children's subtrees.
//!
//! # Descent
//!
//! At each block, follow the entry with the greatest separator <= key, or the
//! first entry when the key sorts before all of them. Descent stops at the
//! first record node, which is the only leaf that could hold the key; callers
//! compare the record's key to decide presence.
//!
//! # Rebuild
//!
//! A mutation never touches existing nodes. It descends with
//! [`search_path`], writes the new record, then pops the path and rewrites
//! each ancestor with the new child spliced in. Siblings are shared with the
//! previous version. Each level is written before its parent, so no node
//! ever points forward.
//!
//! - A block over `max_block_entries` is split into near-equal blocks.
//! - A non-root block under half that is merged with a neighbour; the merged
//!   entries are split again if they overflow.
//! - Empty blocks are dropped from their parent.
//! - A root left with a single block child collapses into that child; a root
//!   that overflows grows a new level.

use std::cmp::Ordering;

use crate::config::EngineConfig;
use crate::storage::data::Data;
use crate::storage::file::{DataFile, Offset};
use crate::storage::node::{
    BlockEntry, BlockNode, DataRef, Node, NodeError, RecordNode, RecordTag, make_block,
    make_record,
};
use crate::storage::path::Path;

/// Offset of the leaf record that would contain `key`, or `None` when the
/// tree is empty.
pub fn search(file: &DataFile, root: Offset, key: &[u8]) -> Result<Option<Offset>, TreeError> {
    descend(file, root, key, |_| {})
}

/// The full root-to-leaf path taken for `key`.
pub fn search_path(file: &DataFile, root: Offset, key: &[u8]) -> Result<Path, TreeError> {
    let mut path = Path::new();
    descend(file, root, key, |offset| path.push(offset))?;
    Ok(path)
}

fn descend(
    file: &DataFile,
    root: Offset,
    key: &[u8],
    mut visit: impl FnMut(Offset),
) -> Result<Option<Offset>, TreeError> {
    let mut current = root;
    loop {
        visit(current);
        match Node::read(file, current)? {
            Node::Record(_) => return Ok(Some(current)),
            Node::Block(block) => match block.find_child_index(file, key)? {
                Some(idx) => current = block.entries[idx].child,
                None => return Ok(None),
            },
        }
    }
}

/// Value stored under `key`, if any.
pub fn lookup(file: &DataFile, root: Offset, key: &[u8]) -> Result<Option<Data>, TreeError> {
    let Some(leaf) = search(file, root, key)? else {
        return Ok(None);
    };
    let record = RecordNode::read(file, leaf)?;
    if record.key.cmp_key(file, key)? == Ordering::Equal {
        Ok(Some(record.value(file)?))
    } else {
        Ok(None)
    }
}

/// Every value `key` has held along this version's lineage, newest first.
///
/// Follows the previous-occupant links from the live record. The chain
/// restarts when a key is deleted and inserted again.
pub fn history(file: &DataFile, root: Offset, key: &[u8]) -> Result<Vec<Data>, TreeError> {
    let Some(leaf) = search(file, root, key)? else {
        return Ok(Vec::new());
    };
    let mut record = RecordNode::read(file, leaf)?;
    if record.key.cmp_key(file, key)? != Ordering::Equal {
        return Ok(Vec::new());
    }

    let mut values = vec![record.value(file)?];
    while let Some(previous) = record.previous {
        record = RecordNode::read(file, previous)?;
        values.push(record.value(file)?);
    }
    Ok(values)
}

/// Every `(key, value)` pair in key order.
pub fn scan(file: &DataFile, root: Offset) -> Result<Vec<(Data, Data)>, TreeError> {
    let mut out = Vec::new();
    scan_node(file, root, &mut out)?;
    Ok(out)
}

fn scan_node(file: &DataFile, offset: Offset, out: &mut Vec<(Data, Data)>) -> Result<(), TreeError> {
    match Node::read(file, offset)? {
        Node::Record(record) => out.push((record.key(file)?, record.value(file)?)),
        Node::Block(block) => {
            for entry in &block.entries {
                scan_node(file, entry.child, out)?;
            }
        }
    }
    Ok(())
}

/// Shape of a tree, as measured by [`check`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TreeStats {
    /// Number of block levels above the records.
    pub depth: usize,
    pub blocks: usize,
    pub records: usize,
    /// Entry count of the fullest block.
    pub widest: usize,
}

/// Walk the whole tree and verify its structural invariants.
///
/// Checks that separators are strictly increasing and equal to the smallest
/// key below them, that every record is at the same depth, and that no block
/// other than an empty root is empty.
///
/// Block width is reported, not enforced: blocks written under a larger
/// `max_block_entries` stay valid after the limit is lowered.
pub fn check(file: &DataFile, root: Offset) -> Result<TreeStats, TreeError> {
    let mut checker = Checker {
        file,
        stats: TreeStats::default(),
        leaf_depth: None,
    };
    checker.walk(root, 0)?;
    checker.stats.depth = checker.leaf_depth.unwrap_or(1);
    Ok(checker.stats)
}

struct Checker<'a> {
    file: &'a DataFile,
    stats: TreeStats,
    leaf_depth: Option<usize>,
}

impl Checker<'_> {
    /// Returns the smallest and largest key below `offset`.
    fn walk(&mut self, offset: Offset, depth: usize) -> Result<Option<(Data, Data)>, TreeError> {
        let block = match Node::read(self.file, offset)? {
            Node::Record(record) => {
                self.stats.records += 1;
                match self.leaf_depth {
                    Some(d) if d != depth => {
                        return Err(TreeError::invariant(offset, "records at uneven depth"));
                    }
                    _ => self.leaf_depth = Some(depth),
                }
                let key = record.key(self.file)?;
                return Ok(Some((key.clone(), key)));
            }
            Node::Block(block) => block,
        };

        self.stats.blocks += 1;
        if block.entries.is_empty() {
            return if depth == 0 {
                Ok(None)
            } else {
                Err(TreeError::invariant(offset, "empty non-root block"))
            };
        }
        self.stats.widest = self.stats.widest.max(block.entries.len());

        let mut range: Option<(Data, Data)> = None;
        for entry in &block.entries {
            let separator = entry.separator.resolve(self.file)?;
            let Some((low, high)) = self.walk(entry.child, depth + 1)? else {
                return Err(TreeError::invariant(entry.child, "empty non-root block"));
            };
            if separator != low {
                return Err(TreeError::invariant(offset, "separator is not the subtree minimum"));
            }
            if let Some((_, last)) = &range
                && low <= *last
            {
                return Err(TreeError::invariant(offset, "separators out of order"));
            }
            range = Some((range.map_or(low, |(first, _)| first), high));
        }
        Ok(range)
    }
}

/// Writes new versions of a tree without modifying existing nodes.
pub struct CowWriter<'a> {
    file: &'a DataFile,
    max_block_entries: usize,
    inline_limit: usize,
}

impl<'a> CowWriter<'a> {
    /// Create a writer using the configured fan-out and inline policy.
    #[must_use]
    pub const fn new(file: &'a DataFile, config: &EngineConfig) -> Self {
        Self {
            file,
            max_block_entries: config.max_block_entries,
            inline_limit: config.inline_limit,
        }
    }

    /// Append an empty root block.
    pub fn empty_root(&self) -> Result<Offset, TreeError> {
        Ok(self.file.append(&make_block(&[]))?)
    }

    /// Write a tree where `key` maps to `value` and return its root.
    ///
    /// If `key` already exists the new record links back to the one it
    /// replaces.
    pub fn insert(&self, root: Offset, key: &Data, value: &Data) -> Result<Offset, TreeError> {
        let mut path = search_path(self.file, root, key)?;
        let top = path.pop().unwrap_or(root);
        let value_ref = DataRef::store(self.file, value, self.inline_limit)?;

        let existing = match Node::read(self.file, top)? {
            Node::Record(record) => record,
            Node::Block(_) => {
                // Descent stopped at a block, so the tree is empty.
                let key_ref = DataRef::store(self.file, key, self.inline_limit)?;
                let record = self.file.append(&make_record(&key_ref, &value_ref, None))?;
                let entry = BlockEntry {
                    separator: key_ref,
                    child: record,
                };
                return Ok(self.file.append(&make_block(&[entry]))?);
            }
        };

        let replacement = match existing.key.cmp_key(self.file, key)? {
            Ordering::Equal => {
                let record = self
                    .file
                    .append(&make_record(&existing.key, &value_ref, Some(top)))?;
                vec![BlockEntry {
                    separator: existing.key,
                    child: record,
                }]
            }
            order => {
                let key_ref = DataRef::store(self.file, key, self.inline_limit)?;
                let record = self.file.append(&make_record(&key_ref, &value_ref, None))?;
                let added = BlockEntry {
                    separator: key_ref,
                    child: record,
                };
                let kept = BlockEntry {
                    separator: existing.key,
                    child: top,
                };
                if order == Ordering::Less {
                    vec![kept, added]
                } else {
                    vec![added, kept]
                }
            }
        };

        self.propagate(path, root, top, replacement)
    }

    /// Write a tree without `key` and return its root, or `None` if `key` is
    /// not present.
    pub fn remove(&self, root: Offset, key: &[u8]) -> Result<Option<Offset>, TreeError> {
        let mut path = search_path(self.file, root, key)?;
        let top = path.pop().unwrap_or(root);

        let Node::Record(existing) = Node::read(self.file, top)? else {
            return Ok(None);
        };
        if existing.key.cmp_key(self.file, key)? != Ordering::Equal {
            return Ok(None);
        }

        self.propagate(path, root, top, Vec::new()).map(Some)
    }

    /// Replace `child` with `replacement` in its parent, then rewrite every
    /// ancestor up to the root.
    fn propagate(
        &self,
        mut path: Path,
        root: Offset,
        child: Offset,
        replacement: Vec<BlockEntry>,
    ) -> Result<Offset, TreeError> {
        let leaf_parent = path.pop().unwrap_or(root);
        let mut pending = self.read_block(leaf_parent)?.entries;
        let idx = position(&pending, leaf_parent, child)?;
        pending.splice(idx..=idx, replacement);

        let mut child = leaf_parent;
        while let Some(parent) = path.pop() {
            let mut entries = self.read_block(parent)?.entries;
            let idx = position(&entries, parent, child)?;
            self.place(&mut entries, idx, pending)?;
            pending = entries;
            child = parent;
        }

        self.finish_root(pending)
    }

    /// Write the new content of the child at `entries[idx]` and splice the
    /// result into `entries`.
    fn place(
        &self,
        entries: &mut Vec<BlockEntry>,
        idx: usize,
        pending: Vec<BlockEntry>,
    ) -> Result<(), TreeError> {
        if pending.is_empty() {
            entries.remove(idx);
            return Ok(());
        }

        let min_entries = self.max_block_entries / 2;
        if pending.len() < min_entries && entries.len() > 1 {
            let sibling_idx = if idx + 1 < entries.len() { idx + 1 } else { idx - 1 };
            let sibling = self.read_block(entries[sibling_idx].child)?.entries;
            let (start, merged) = if sibling_idx > idx {
                (idx, [pending, sibling].concat())
            } else {
                (sibling_idx, [sibling, pending].concat())
            };
            tracing::debug!(entries = merged.len(), "merging underfull block");
            let written = self.write_blocks(merged)?;
            entries.splice(start..start + 2, written);
        } else {
            let written = self.write_blocks(pending)?;
            entries.splice(idx..=idx, written);
        }
        Ok(())
    }

    /// Write `entries` as one block, or as several near-equal blocks if they
    /// exceed the fan-out. Returns the parent entries for what was written.
    fn write_blocks(&self, entries: Vec<BlockEntry>) -> Result<Vec<BlockEntry>, TreeError> {
        let count = entries.len().div_ceil(self.max_block_entries).max(1);
        if count > 1 {
            tracing::debug!(entries = entries.len(), blocks = count, "splitting block");
        }

        let base = entries.len() / count;
        let extra = entries.len() % count;
        let mut rest = entries.as_slice();
        let mut written = Vec::with_capacity(count);
        for i in 0..count {
            let size = base + usize::from(i < extra);
            let (chunk, tail) = rest.split_at(size);
            rest = tail;
            let offset = self.file.append(&make_block(chunk))?;
            written.push(BlockEntry {
                separator: chunk[0].separator.clone(),
                child: offset,
            });
        }
        Ok(written)
    }

    /// Write the root for the rebuilt top-level content.
    fn finish_root(&self, mut pending: Vec<BlockEntry>) -> Result<Offset, TreeError> {
        while pending.len() > self.max_block_entries {
            pending = self.write_blocks(pending)?;
        }

        if let [only] = pending.as_slice()
            && self.is_block(only.child)?
        {
            return Ok(only.child);
        }

        Ok(self.file.append(&make_block(&pending))?)
    }

    fn is_block(&self, offset: Offset) -> Result<bool, TreeError> {
        let tag = self.file.read_u8(offset).map_err(NodeError::from)?;
        Ok(tag == RecordTag::Block as u8)
    }

    fn read_block(&self, offset: Offset) -> Result<BlockNode, TreeError> {
        Ok(BlockNode::read(self.file, offset)?)
    }
}

fn position(entries: &[BlockEntry], parent: Offset, child: Offset) -> Result<usize, TreeError> {
    entries
        .iter()
        .position(|e| e.child == child)
        .ok_or(TreeError::MissingChild { parent, child })
}

/// Errors that can occur during tree operations.
#[derive(Debug)]
pub enum TreeError {
    /// Reading or writing a node failed.
    Node(NodeError),
    /// A block on the recorded path no longer lists the child it led to.
    MissingChild { parent: u64, child: u64 },
    /// A structural invariant does not hold.
    Invariant { offset: u64, message: &'static str },
}

impl TreeError {
    const fn invariant(offset: u64, message: &'static str) -> Self {
        Self::Invariant { offset, message }
    }

    /// Whether this error means the file contents are damaged.
    #[must_use]
    pub const fn is_corruption(&self) -> bool {
        match self {
            Self::Node(e) => e.is_corruption(),
            Self::MissingChild { .. } | Self::Invariant { .. } => true,
        }
    }
}

impl std::fmt::Display for TreeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Node(e) => write!(f, "node error: {e}"),
            Self::MissingChild { parent, child } => {
                write!(f, "block at offset {parent} has no entry for child {child}")
            }
            Self::Invariant { offset, message } => {
                write!(f, "tree invariant violated at offset {offset}: {message}")
            }
        }
    }
}

impl std::error::Error for TreeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Node(e) => Some(e),
            _ => None,
        }
    }
}

impl From<NodeError> for TreeError {
    fn from(e: NodeError) -> Self {
        Self::Node(e)
    }
}

impl From<crate::storage::file::FileError> for TreeError {
    fn from(e: crate::storage::file::FileError) -> Self {
        Self::Node(NodeError::File(e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::collections::BTreeMap;
    use tempfile::{TempDir, tempdir};

    fn small_config() -> EngineConfig {
        EngineConfig {
            max_block_entries: 4,
            inline_limit: 8,
            sync_on_commit: false,
        }
    }

    fn scratch() -> (TempDir, DataFile) {
        let dir = tempdir().expect("create temp dir");
        let file = DataFile::create(&dir.path().join("tree.spine")).expect("create");
        (dir, file)
    }

    fn key(i: u32) -> Data {
        Data::from(format!("key{i:05}").as_str())
    }

    #[test]
    fn test_empty_tree() {
        let (_dir, file) = scratch();
        let writer = CowWriter::new(&file, &small_config());
        let root = writer.empty_root().expect("root");

        assert_eq!(search(&file, root, b"x").expect("search"), None);
        assert_eq!(search_path(&file, root, b"x").expect("path").as_slice(), &[root]);
        assert_eq!(lookup(&file, root, b"x").expect("lookup"), None);
        assert_eq!(scan(&file, root).expect("scan"), Vec::<(Data, Data)>::new());
        assert_eq!(writer.remove(root, b"x").expect("remove"), None);
        assert_eq!(
            check(&file, root).expect("check"),
            TreeStats {
                depth: 1,
                blocks: 1,
                records: 0,
                widest: 0,
            }
        );
    }

    #[test]
    fn test_insert_into_empty_tree() {
        let (_dir, file) = scratch();
        let writer = CowWriter::new(&file, &small_config());
        let empty = writer.empty_root().expect("root");
        let root = writer
            .insert(empty, &Data::from("a"), &Data::from("1"))
            .expect("insert");

        assert_eq!(lookup(&file, root, b"a").expect("lookup"), Some(Data::from("1")));
        assert_eq!(lookup(&file, root, b"b").expect("lookup"), None);
        assert_eq!(lookup(&file, empty, b"a").expect("lookup"), None);

        let path = search_path(&file, root, b"a").expect("path");
        assert_eq!(path.len(), 2);
        assert_eq!(path.root(), Some(root));
        assert_eq!(search(&file, root, b"zzz").expect("search"), path.peek());
    }

    #[test]
    fn test_search_returns_candidate_leaf() {
        let (_dir, file) = scratch();
        let writer = CowWriter::new(&file, &small_config());
        let mut root = writer.empty_root().expect("root");
        for k in ["b", "d", "f"] {
            root = writer
                .insert(root, &Data::from(k), &Data::from(k))
                .expect("insert");
        }

        let leaf_key = |probe: &str| {
            let leaf = search(&file, root, probe.as_bytes())
                .expect("search")
                .expect("non-empty tree");
            RecordNode::read(&file, leaf).expect("record").key(&file).expect("key")
        };
        assert_eq!(leaf_key("a"), Data::from("b"));
        assert_eq!(leaf_key("c"), Data::from("b"));
        assert_eq!(leaf_key("d"), Data::from("d"));
        assert_eq!(leaf_key("z"), Data::from("f"));
    }

    #[test]
    fn test_splits_grow_the_tree() {
        let (_dir, file) = scratch();
        let writer = CowWriter::new(&file, &small_config());
        let mut root = writer.empty_root().expect("root");
        for i in 0..100 {
            root = writer.insert(root, &key(i), &key(i)).expect("insert");
        }

        let stats = check(&file, root).expect("check");
        assert_eq!(stats.records, 100);
        assert!(stats.widest <= 4);
        assert!(stats.depth >= 4, "100 keys with fan-out 4 need >= 4 levels");
        for i in 0..100 {
            assert_eq!(lookup(&file, root, &key(i)).expect("lookup"), Some(key(i)));
        }
    }

    #[test]
    fn test_lowered_fanout_keeps_old_blocks_valid() {
        let (_dir, file) = scratch();
        let wide = EngineConfig {
            max_block_entries: 8,
            ..small_config()
        };
        let writer = CowWriter::new(&file, &wide);
        let mut root = writer.empty_root().expect("root");
        for i in 0..40 {
            root = writer.insert(root, &key(i), &key(i)).expect("insert");
        }
        assert!(check(&file, root).expect("check").widest > 4);

        let narrow = CowWriter::new(&file, &small_config());
        root = narrow.insert(root, &key(1000), &key(1000)).expect("insert");
        root = narrow.remove(root, &key(3)).expect("remove").expect("present");

        let stats = check(&file, root).expect("check");
        assert_eq!(stats.records, 40);
        assert!(stats.widest > 4);
        assert_eq!(lookup(&file, root, &key(1000)).expect("lookup"), Some(key(1000)));
        assert_eq!(lookup(&file, root, &key(3)).expect("lookup"), None);
    }

    #[test]
    fn test_descending_inserts_keep_separators_minimal() {
        let (_dir, file) = scratch();
        let writer = CowWriter::new(&file, &small_config());
        let mut root = writer.empty_root().expect("root");
        for i in (0..60).rev() {
            root = writer.insert(root, &key(i), &Data::empty()).expect("insert");
            check(&file, root).expect("check");
        }
        let keys: Vec<Data> = scan(&file, root)
            .expect("scan")
            .into_iter()
            .map(|(k, _)| k)
            .collect();
        assert_eq!(keys, (0..60).map(key).collect::<Vec<_>>());
    }

    #[test]
    fn test_overwrite_links_history() {
        let (_dir, file) = scratch();
        let writer = CowWriter::new(&file, &small_config());
        let mut root = writer.empty_root().expect("root");
        for v in ["1", "2", "3"] {
            root = writer
                .insert(root, &Data::from("k"), &Data::from(v))
                .expect("insert");
        }
        root = writer
            .insert(root, &Data::from("other"), &Data::from("x"))
            .expect("insert");

        assert_eq!(
            history(&file, root, b"k").expect("history"),
            vec![Data::from("3"), Data::from("2"), Data::from("1")]
        );
        assert_eq!(
            history(&file, root, b"missing").expect("history"),
            Vec::<Data>::new()
        );
    }

    #[test]
    fn test_large_keys_are_stored_once() {
        let (_dir, file) = scratch();
        let writer = CowWriter::new(&file, &small_config());
        let empty = writer.empty_root().expect("root");
        let big_key = Data::from(vec![b'k'; 100]);
        let root = writer
            .insert(empty, &big_key, &Data::from("v"))
            .expect("insert");

        let block = BlockNode::read(&file, root).expect("block");
        let record = RecordNode::read(&file, block.entries[0].child).expect("record");
        assert!(matches!(record.key, DataRef::Stored(_)));
        assert_eq!(block.entries[0].separator, record.key);
        assert_eq!(lookup(&file, root, &big_key).expect("lookup"), Some(Data::from("v")));
    }

    #[test]
    fn test_remove_collapses_to_empty() {
        let (_dir, file) = scratch();
        let writer = CowWriter::new(&file, &small_config());
        let mut root = writer.empty_root().expect("root");
        for i in 0..30 {
            root = writer.insert(root, &key(i), &key(i)).expect("insert");
        }
        let full = root;
        for i in 0..30 {
            root = writer.remove(root, &key(i)).expect("remove").expect("present");
            check(&file, root).expect("check");
        }

        assert_eq!(check(&file, root).expect("check").records, 0);
        assert_eq!(scan(&file, root).expect("scan"), Vec::<(Data, Data)>::new());
        assert_eq!(scan(&file, full).expect("scan").len(), 30);
    }

    #[test]
    fn test_remove_missing_key() {
        let (_dir, file) = scratch();
        let writer = CowWriter::new(&file, &small_config());
        let empty = writer.empty_root().expect("root");
        let root = writer
            .insert(empty, &Data::from("a"), &Data::from("1"))
            .expect("insert");
        assert_eq!(writer.remove(root, b"b").expect("remove"), None);
    }

    #[test]
    fn test_random_operations_match_model() {
        let (_dir, file) = scratch();
        let writer = CowWriter::new(&file, &small_config());
        let mut rng = StdRng::seed_from_u64(0x5eed);
        let mut model = BTreeMap::new();
        let mut root = writer.empty_root().expect("root");
        let mut snapshots = Vec::new();

        for step in 0..600 {
            let len = rng.random_range(1..12);
            let k = Data::from(
                (0..len)
                    .map(|_| rng.random_range(b'a'..=b'f'))
                    .collect::<Vec<u8>>(),
            );
            if rng.random_bool(0.3) {
                let removed = writer.remove(root, &k).expect("remove");
                assert_eq!(removed.is_some(), model.remove(&k).is_some());
                if let Some(next) = removed {
                    root = next;
                }
            } else {
                let v = Data::from(format!("v{step}").as_str());
                root = writer.insert(root, &k, &v).expect("insert");
                model.insert(k, v);
            }

            if step % 50 == 0 {
                snapshots.push((root, model.clone()));
            }
        }

        assert!(check(&file, root).expect("check").widest <= 4);
        let expected: Vec<(Data, Data)> = model.into_iter().collect();
        assert_eq!(scan(&file, root).expect("scan"), expected);

        // Every earlier root still describes exactly the state it had.
        for (old_root, old_model) in snapshots {
            check(&file, old_root).expect("check");
            let expected: Vec<(Data, Data)> = old_model.into_iter().collect();
            assert_eq!(scan(&file, old_root).expect("scan"), expected);
        }
    }

    #[test]
    fn test_descent_reaches_containing_leaf() {
        let (_dir, file) = scratch();
        let writer = CowWriter::new(&file, &small_config());
        let mut rng = StdRng::seed_from_u64(99);
        let mut root = writer.empty_root().expect("root");
        let mut keys = Vec::new();
        for _ in 0..200 {
            let k = Data::from((0..4).map(|_| rng.random::<u8>()).collect::<Vec<u8>>());
            root = writer.insert(root, &k, &Data::empty()).expect("insert");
            keys.push(k);
        }
        keys.sort();
        keys.dedup();

        for _ in 0..500 {
            let probe: Vec<u8> = (0..rng.random_range(0..6)).map(|_| rng.random::<u8>()).collect();
            let leaf = search(&file, root, &probe).expect("search").expect("leaf");
            let found = RecordNode::read(&file, leaf)
                .expect("record")
                .key(&file)
                .expect("key");
            // The leaf holds the greatest key <= probe, or the smallest key.
            let expected = keys
                .iter()
                .rev()
                .find(|k| k.as_bytes() <= probe.as_slice())
                .unwrap_or(&keys[0]);
            assert_eq!(&found, expected);
        }
    }

    #[test]
    fn test_check_rejects_unordered_block() {
        let (_dir, file) = scratch();
        let a = file
            .append(&crate::storage::node::make_record_di(
                &Data::from("a"),
                &Data::empty(),
                None,
            ))
            .expect("append");
        let b = file
            .append(&crate::storage::node::make_record_di(
                &Data::from("b"),
                &Data::empty(),
                None,
            ))
            .expect("append");
        let root = file
            .append(&crate::storage::node::make_block_di(&[
                (Data::from("b"), b),
                (Data::from("a"), a),
            ]))
            .expect("append");

        let err = check(&file, root).expect_err("unordered");
        assert!(matches!(err, TreeError::Invariant { .. }));
        assert!(err.is_corruption());
    }
}
