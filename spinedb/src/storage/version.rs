//! Version registry.
//!
//! Maps version numbers to root offsets. The on-disk log of version entries
//! is the source of truth; the in-memory `roots` table is a cache of exactly
//! what that log records, rebuilt by recovery on reopen.
//!
//! # Locking
//!
//! The version lock guards the current version number and the act of
//! publishing a new one. It is taken before the file's write lock (inside
//! `DataFile::append`) and never while that lock is held. Node writing for a
//! commit happens before the version lock is taken, so a large commit only
//! holds it for the final 21-byte entry.
//!
//! Readers resolve roots through a read guard on `roots`, held only long
//! enough to copy one offset. The current version number is mirrored in an
//! atomic so that reading it never waits behind a commit's fsync.
//!
//! # Sync failures
//!
//! Once a version entry has been appended it is part of the log and will be
//! found by recovery, so it is published even if the flush after it fails.
//! The caller gets [`VersionError::Unsynced`] carrying the new number.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, RwLock};

use crate::storage::file::{DataFile, Offset};
use crate::storage::node::{NodeError, make_version};

/// The version number of a freshly created file.
pub const BASE_VERSION: u64 = 0;

/// Version number to root offset table plus the commit sequence.
pub struct VersionRegistry {
    /// Version lock. Holds the current version number.
    current: Mutex<u64>,
    /// Copy of `current`, stored under the version lock after `roots` grows.
    published: AtomicU64,
    /// `roots[v]` is the root offset of version `v`.
    /// Invariant: `roots.len() == current + 1`.
    roots: RwLock<Vec<Offset>>,
    sync_on_commit: bool,
}

impl VersionRegistry {
    /// Write the base version for a new file and return its registry.
    pub fn bootstrap(
        file: &DataFile,
        root: Offset,
        sync_on_commit: bool,
    ) -> Result<Self, VersionError> {
        file.append(&make_version(BASE_VERSION, root))
            .map_err(NodeError::from)?;
        file.sync().map_err(NodeError::from)?;
        Self::from_roots(vec![root], sync_on_commit)
    }

    /// Build a registry from roots recovered from the version log.
    ///
    /// `roots[v]` must be the root of version `v`.
    pub fn from_roots(roots: Vec<Offset>, sync_on_commit: bool) -> Result<Self, VersionError> {
        let Some(last) = roots.len().checked_sub(1) else {
            return Err(VersionError::Empty);
        };
        Ok(Self {
            current: Mutex::new(last as u64),
            published: AtomicU64::new(last as u64),
            roots: RwLock::new(roots),
            sync_on_commit,
        })
    }

    /// The newest committed version number.
    #[must_use]
    pub fn current(&self) -> u64 {
        self.published.load(Ordering::Acquire)
    }

    /// Root offset of `version`.
    #[allow(clippy::expect_used)] // RwLock poisoning indicates unrecoverable state
    pub fn root(&self, version: u64) -> Result<Offset, VersionError> {
        let roots = self.roots.read().expect("lock poisoned");
        usize::try_from(version)
            .ok()
            .and_then(|v| roots.get(v).copied())
            .ok_or(VersionError::UnknownVersion {
                version,
                current: roots.len() as u64 - 1,
            })
    }

    /// Snapshot of every `(version, root)` pair, oldest first.
    #[must_use]
    #[allow(clippy::expect_used)] // RwLock poisoning indicates unrecoverable state
    pub fn versions(&self) -> Vec<(u64, Offset)> {
        let roots = self.roots.read().expect("lock poisoned");
        (0u64..).zip(roots.iter().copied()).collect()
    }

    /// Publish `root` as a new version and return its number.
    ///
    /// Every node reachable from `root` must already be appended. With
    /// `sync_on_commit` those nodes are flushed before the entry is written
    /// and the entry is flushed after it.
    ///
    /// # Errors
    ///
    /// If the entry cannot be appended nothing is published. If it is
    /// appended but the flush after it fails, the version is published
    /// anyway and [`VersionError::Unsynced`] is returned.
    #[allow(clippy::expect_used)] // Mutex poisoning indicates unrecoverable state
    pub fn write_version(&self, file: &DataFile, root: Offset) -> Result<u64, VersionError> {
        let mut current = self.current.lock().expect("lock poisoned");
        let next = *current + 1;

        if self.sync_on_commit {
            file.sync().map_err(NodeError::from)?;
        }
        file.append(&make_version(next, root))
            .map_err(NodeError::from)?;

        self.roots.write().expect("lock poisoned").push(root);
        *current = next;
        self.published.store(next, Ordering::Release);
        tracing::debug!(version = next, root, "published version");

        let flushed = if self.sync_on_commit {
            file.sync()
        } else {
            Ok(())
        };
        drop(current);
        flushed.map(|()| next).map_err(|e| {
            tracing::warn!(version = next, error = %e, "version published but not flushed");
            VersionError::Unsynced {
                version: next,
                source: e.into(),
            }
        })
    }
}

/// Errors that can occur in the version registry.
#[derive(Debug)]
pub enum VersionError {
    /// Reading or writing a version entry failed.
    Node(NodeError),
    /// The requested version was never committed.
    UnknownVersion { version: u64, current: u64 },
    /// A version entry in the log does not continue the sequence.
    OutOfSequence {
        offset: u64,
        expected: u64,
        found: u64,
    },
    /// The file holds no version entries.
    Empty,
    /// `version` was appended and published, but flushing it failed.
    Unsynced { version: u64, source: NodeError },
}

impl VersionError {
    /// Whether this error means the file contents are damaged.
    #[must_use]
    pub const fn is_corruption(&self) -> bool {
        match self {
            Self::Node(e) => e.is_corruption(),
            Self::UnknownVersion { .. } | Self::Unsynced { .. } => false,
            Self::OutOfSequence { .. } | Self::Empty => true,
        }
    }
}

impl std::fmt::Display for VersionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Node(e) => write!(f, "node error: {e}"),
            Self::UnknownVersion { version, current } => {
                write!(f, "unknown version {version} (current is {current})")
            }
            Self::OutOfSequence {
                offset,
                expected,
                found,
            } => write!(
                f,
                "version entry at offset {offset} is {found}, expected {expected}"
            ),
            Self::Empty => write!(f, "no version entries found"),
            Self::Unsynced { version, source } => {
                write!(f, "version {version} was published but not flushed: {source}")
            }
        }
    }
}

impl std::error::Error for VersionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Node(e) | Self::Unsynced { source: e, .. } => Some(e),
            _ => None,
        }
    }
}

impl From<NodeError> for VersionError {
    fn from(e: NodeError) -> Self {
        Self::Node(e)
    }
}
