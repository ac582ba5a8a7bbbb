//! Append-only copy-on-write B-tree storage engine.
//!
//! Everything lives in one file: a 16-byte header followed by tagged
//! records that are only ever appended.
//!
//! # File Format
//!
//! - Header: `SPINEDB\0` magic, `u32` format version, 4 reserved bytes
//! - Data blocks: keys and values too long to inline
//! - Record nodes: the leaves, one key each
//! - Block nodes: ordered separators with child offsets
//! - Version entries: version number and root offset, checksummed
//!
//! Children are always written before their parents, so every stored offset
//! points backwards. A version entry is appended only after its whole tree
//! is on disk.
//!
//! # Usage
//!
//! ```ignore
//! use spinedb::{Database, EngineConfig};
//!
//! let db = Database::open(path, EngineConfig::default())?;
//! let v1 = db.commit(db.current_version(), "a", "1")?;
//! assert_eq!(db.lookup(v1, "a")?.as_deref(), Some(&b"1"[..]));
//! ```

mod data;
mod database;
mod file;
mod node;
mod path;
mod recovery;
mod rope;
mod tree;
mod version;

pub use data::Data;
pub use database::{Database, DatabaseError};
pub use file::{DataFile, FORMAT_VERSION, FileError, HEADER_SIZE, MAGIC, Offset};
pub use node::{
    BlockEntry, BlockNode, DataRef, NO_PREVIOUS, Node, NodeError, RecordNode, RecordTag,
    VERSION_ENTRY_SIZE, VersionEntry, make_block, make_block_di, make_data_block, make_record,
    make_record_di, make_version, read_data_block, record_extent,
};
pub use path::Path;
pub use recovery::{RecoveryError, RecoveryResult, recover};
pub use rope::Rope;
pub use tree::{CowWriter, TreeError, TreeStats, check, history, lookup, scan, search, search_path};
pub use version::{BASE_VERSION, VersionError, VersionRegistry};
