//! Rebuilding the version registry when a data file is reopened.
//!
//! The file is self-describing: every record carries a tag and a length, so
//! it can be walked from the header to the end. Recovery does that walk and
//! collects every version entry it meets. Nothing else needs replaying;
//! nodes are never rewritten, so a version entry's root is exactly as valid
//! as when it was committed.
//!
//! # Torn tails
//!
//! A crash can leave the last append incomplete. A commit is only visible
//! once its version entry is fully on disk, so if nothing after the first
//! record that cannot be decoded looks like a valid version entry, that
//! record and everything after it belong to no committed version. Recovery
//! truncates the file back to the end of the last whole record and logs
//! what it dropped.
//!
//! If a valid version entry does follow, the damage is under committed
//! data and recovery fails without touching the file. A version entry that
//! fails its checksum is judged the same way.

use crate::storage::file::{DataFile, HEADER_SIZE, Offset};
use crate::storage::node::{
    NodeError, RecordTag, VERSION_ENTRY_LEN, VERSION_ENTRY_SIZE, VersionEntry, record_extent,
};
use crate::storage::version::VersionError;

/// Bytes read at a time when looking past damage for a version entry.
const SCAN_WINDOW: usize = 64 * 1024;

/// What recovery found in the file.
#[derive(Debug)]
pub struct RecoveryResult {
    /// `roots[v]` is the root offset of version `v`.
    pub roots: Vec<Offset>,

    /// Number of whole records walked, version entries included.
    pub records_scanned: usize,

    /// Bytes cut off the end of the file.
    pub truncated_bytes: u64,
}

/// Walk `file` and return the root of every committed version.
///
/// Truncates an incomplete tail. Must run before `file` is shared with
/// readers or writers.
pub fn recover(file: &DataFile) -> Result<RecoveryResult, RecoveryError> {
    let end = file.len();
    let mut offset = HEADER_SIZE;
    let mut roots = Vec::new();
    let mut records_scanned = 0;

    while offset < end {
        let decoded = record_extent(file, offset).and_then(|(tag, len)| {
            let entry = if tag == RecordTag::Version {
                Some(VersionEntry::read(file, offset)?)
            } else {
                None
            };
            Ok((entry, len))
        });
        let (entry, len) = match decoded {
            Ok(decoded) => decoded,
            Err(e) if e.is_corruption() => {
                if let Some(at) = next_version_entry(file, offset + 1)? {
                    tracing::error!(
                        offset,
                        version_entry = at,
                        error = %e,
                        "damaged record before a committed version"
                    );
                    return Err(e.into());
                }
                tracing::debug!(offset, error = %e, "undecodable record at tail");
                break;
            }
            Err(e) => return Err(e.into()),
        };

        if let Some(entry) = entry {
            accept_version(file, offset, entry, &mut roots)?;
        }

        records_scanned += 1;
        offset += len;
    }

    let truncated_bytes = end - offset;
    if truncated_bytes > 0 {
        tracing::warn!(
            path = %file.path().display(),
            valid_end = offset,
            truncated_bytes,
            "truncating incomplete tail"
        );
        file.truncate(offset).map_err(NodeError::from)?;
    }

    Ok(RecoveryResult {
        roots,
        records_scanned,
        truncated_bytes,
    })
}

/// Offset of the first well-formed version entry at or after `from`.
///
/// Looks at every byte position, since record boundaries past a damaged
/// record are unknown.
fn next_version_entry(file: &DataFile, from: Offset) -> Result<Option<Offset>, NodeError> {
    let end = file.len();
    let mut start = from;
    while start + VERSION_ENTRY_SIZE <= end {
        let len = usize::try_from(end - start)
            .map_or(SCAN_WINDOW, |rest| rest.min(SCAN_WINDOW));
        let bytes = file.read(start, len)?;
        // Positions whose whole entry lies inside this window.
        let candidates = bytes.windows(VERSION_ENTRY_LEN);
        let count = candidates.len();
        for (i, window) in candidates.enumerate() {
            let at = start + i as u64;
            if window[0] == RecordTag::Version as u8 && VersionEntry::decode(window, at).is_ok() {
                return Ok(Some(at));
            }
        }
        start += count as u64;
    }
    Ok(None)
}

fn accept_version(
    file: &DataFile,
    offset: Offset,
    entry: VersionEntry,
    roots: &mut Vec<Offset>,
) -> Result<(), RecoveryError> {
    let expected = roots.len() as u64;
    if entry.version != expected {
        return Err(VersionError::OutOfSequence {
            offset,
            expected,
            found: entry.version,
        }
        .into());
    }

    let tag = file.read_u8(entry.root).map_err(NodeError::from)?;
    if tag != RecordTag::Block as u8 {
        return Err(RecoveryError::InvalidRoot {
            version: entry.version,
            root: entry.root,
        });
    }

    roots.push(entry.root);
    Ok(())
}

/// Errors that can occur during recovery.
#[derive(Debug)]
pub enum RecoveryError {
    /// A record could not be read.
    Node(NodeError),
    /// The version log is inconsistent.
    Version(VersionError),
    /// A version entry's root is not a block node.
    InvalidRoot { version: u64, root: u64 },
}

impl RecoveryError {
    /// Whether this error means the file contents are damaged.
    #[must_use]
    pub const fn is_corruption(&self) -> bool {
        match self {
            Self::Node(e) => e.is_corruption(),
            Self::Version(e) => e.is_corruption(),
            Self::InvalidRoot { .. } => true,
        }
    }
}

impl std::fmt::Display for RecoveryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Node(e) => write!(f, "node error: {e}"),
            Self::Version(e) => write!(f, "version error: {e}"),
            Self::InvalidRoot { version, root } => {
                write!(f, "version {version} has root {root}, which is not a block")
            }
        }
    }
}

impl std::error::Error for RecoveryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Node(e) => Some(e),
            Self::Version(e) => Some(e),
            Self::InvalidRoot { .. } => None,
        }
    }
}

impl From<NodeError> for RecoveryError {
    fn from(e: NodeError) -> Self {
        Self::Node(e)
    }
}

impl From<VersionError> for RecoveryError {
    fn from(e: VersionError) -> Self {
        Self::Version(e)
    }
}
