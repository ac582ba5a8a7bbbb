//! High-level database interface.
//!
//! Ties the data file, the version registry and the tree together into the
//! operations callers use: open, lookup, commit and delete against a
//! version number.

use std::path::Path;

use crate::config::{ConfigError, EngineConfig};
use crate::storage::data::Data;
use crate::storage::file::{DataFile, FileError, Offset};
use crate::storage::node::NodeError;
use crate::storage::path::Path as NodePath;
use crate::storage::recovery::{RecoveryError, recover};
use crate::storage::tree::{self, CowWriter, TreeError, TreeStats};
use crate::storage::version::{VersionError, VersionRegistry};

/// A database instance.
///
/// Every method takes `&self`; share it between threads with an `Arc`.
/// Readers never block on writers. Writers append their nodes concurrently
/// and are only serialised while a version number is assigned.
pub struct Database {
    file: DataFile,
    registry: VersionRegistry,
    config: EngineConfig,
}

impl Database {
    /// Open the database at `path`, creating it if it doesn't exist.
    ///
    /// A new file starts at version 0 with an empty tree. An existing file
    /// is recovered: its version log is scanned and an incomplete tail left
    /// by a crash is truncated.
    pub fn open(path: &Path, config: EngineConfig) -> Result<Self, DatabaseError> {
        config.validate()?;
        if path.exists() {
            Self::open_existing(path, config)
        } else {
            Self::create(path, config)
        }
    }

    fn create(path: &Path, config: EngineConfig) -> Result<Self, DatabaseError> {
        let file = DataFile::create(path)?;
        let root = CowWriter::new(&file, &config).empty_root()?;
        let registry = VersionRegistry::bootstrap(&file, root, config.sync_on_commit)?;
        tracing::info!(path = %path.display(), root, "created database");
        Ok(Self {
            file,
            registry,
            config,
        })
    }

    fn open_existing(path: &Path, config: EngineConfig) -> Result<Self, DatabaseError> {
        let file = DataFile::open(path)?;
        let recovered = recover(&file)?;

        let registry = if recovered.roots.is_empty() {
            // Crashed before version 0 was written.
            tracing::info!(path = %path.display(), "no committed version, bootstrapping");
            let root = CowWriter::new(&file, &config).empty_root()?;
            VersionRegistry::bootstrap(&file, root, config.sync_on_commit)?
        } else {
            VersionRegistry::from_roots(recovered.roots, config.sync_on_commit)?
        };

        tracing::info!(
            path = %path.display(),
            current_version = registry.current(),
            records = recovered.records_scanned,
            truncated_bytes = recovered.truncated_bytes,
            "opened database"
        );
        Ok(Self {
            file,
            registry,
            config,
        })
    }

    /// The newest committed version.
    #[must_use]
    pub fn current_version(&self) -> u64 {
        self.registry.current()
    }

    /// Every `(version, root offset)` pair, oldest first.
    #[must_use]
    pub fn versions(&self) -> Vec<(u64, Offset)> {
        self.registry.versions()
    }

    /// Root offset of `version`.
    pub fn root(&self, version: u64) -> Result<Offset, DatabaseError> {
        Ok(self.registry.root(version)?)
    }

    /// Offset of the leaf record that would contain `key` in `version`, or
    /// `None` when that version's tree is empty.
    pub fn search(&self, version: u64, key: impl AsRef<[u8]>) -> Result<Option<Offset>, DatabaseError> {
        let root = self.root(version)?;
        Ok(tree::search(&self.file, root, key.as_ref())?)
    }

    /// The root-to-leaf path descent takes for `key` in `version`.
    pub fn path(&self, version: u64, key: impl AsRef<[u8]>) -> Result<NodePath, DatabaseError> {
        let root = self.root(version)?;
        Ok(tree::search_path(&self.file, root, key.as_ref())?)
    }

    /// The value of `key` in `version`, or `None` if it has none.
    pub fn lookup(&self, version: u64, key: impl AsRef<[u8]>) -> Result<Option<Data>, DatabaseError> {
        let root = self.root(version)?;
        Ok(tree::lookup(&self.file, root, key.as_ref())?)
    }

    /// Values `key` has held in `version`'s lineage, newest first.
    pub fn history(&self, version: u64, key: impl AsRef<[u8]>) -> Result<Vec<Data>, DatabaseError> {
        let root = self.root(version)?;
        Ok(tree::history(&self.file, root, key.as_ref())?)
    }

    /// Every `(key, value)` pair in `version`, in key order.
    pub fn scan(&self, version: u64) -> Result<Vec<(Data, Data)>, DatabaseError> {
        let root = self.root(version)?;
        Ok(tree::scan(&self.file, root)?)
    }

    /// Verify the structure of `version`'s tree.
    pub fn check(&self, version: u64) -> Result<TreeStats, DatabaseError> {
        let root = self.root(version)?;
        Ok(tree::check(&self.file, root)?)
    }

    /// Commit `version` with `key` set to `value` as a new version and
    /// return its number.
    ///
    /// `version` need not be the current one; the new version is derived
    /// from whichever version is named.
    ///
    /// A [`VersionError::Unsynced`] error still carries a published version
    /// number; that version is readable and later commits follow it.
    pub fn commit(
        &self,
        version: u64,
        key: impl Into<Data>,
        value: impl Into<Data>,
    ) -> Result<u64, DatabaseError> {
        let key = key.into();
        let value = value.into();
        let base = self.root(version)?;

        let root = self.writer().insert(base, &key, &value)?;
        let committed = self.registry.write_version(&self.file, root)?;
        tracing::debug!(base = version, version = committed, root, key = %key, "committed");
        Ok(committed)
    }

    /// Commit `version` without `key` as a new version and return its
    /// number.
    ///
    /// Deleting a key that is absent still commits a version, sharing the
    /// base version's root.
    pub fn delete(&self, version: u64, key: impl AsRef<[u8]>) -> Result<u64, DatabaseError> {
        let key = key.as_ref();
        let base = self.root(version)?;

        let root = match self.writer().remove(base, key)? {
            Some(root) => root,
            None => {
                tracing::debug!(base = version, "delete of absent key");
                base
            }
        };
        let committed = self.registry.write_version(&self.file, root)?;
        tracing::debug!(base = version, version = committed, root, "deleted");
        Ok(committed)
    }

    /// Number of bytes in the data file.
    #[must_use]
    pub fn file_len(&self) -> u64 {
        self.file.len()
    }

    /// Path of the data file.
    #[must_use]
    pub fn file_path(&self) -> &Path {
        self.file.path()
    }

    /// The configuration this database was opened with.
    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Flush everything written so far to stable storage.
    pub fn sync(&self) -> Result<(), DatabaseError> {
        Ok(self.file.sync()?)
    }

    const fn writer(&self) -> CowWriter<'_> {
        CowWriter::new(&self.file, &self.config)
    }
}

/// Errors that can occur during database operations.
#[derive(Debug)]
pub enum DatabaseError {
    /// The configuration is unusable.
    Config(ConfigError),
    /// File I/O error.
    File(FileError),
    /// A record could not be encoded or decoded.
    Node(NodeError),
    /// Tree traversal or rebuild failed.
    Tree(TreeError),
    /// Version lookup or commit failed.
    Version(VersionError),
    /// The file could not be recovered on open.
    Recovery(RecoveryError),
}

impl DatabaseError {
    /// Whether this error means the file contents are damaged.
    #[must_use]
    pub const fn is_corruption(&self) -> bool {
        match self {
            Self::Config(_) => false,
            Self::File(e) => e.is_corruption(),
            Self::Node(e) => e.is_corruption(),
            Self::Tree(e) => e.is_corruption(),
            Self::Version(e) => e.is_corruption(),
            Self::Recovery(e) => e.is_corruption(),
        }
    }
}

impl std::fmt::Display for DatabaseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(e) => write!(f, "config error: {e}"),
            Self::File(e) => write!(f, "file error: {e}"),
            Self::Node(e) => write!(f, "node error: {e}"),
            Self::Tree(e) => write!(f, "tree error: {e}"),
            Self::Version(e) => write!(f, "version error: {e}"),
            Self::Recovery(e) => write!(f, "recovery error: {e}"),
        }
    }
}

impl std::error::Error for DatabaseError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Config(e) => Some(e),
            Self::File(e) => Some(e),
            Self::Node(e) => Some(e),
            Self::Tree(e) => Some(e),
            Self::Version(e) => Some(e),
            Self::Recovery(e) => Some(e),
        }
    }
}

impl From<ConfigError> for DatabaseError {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

impl From<FileError> for DatabaseError {
    fn from(e: FileError) -> Self {
        Self::File(e)
    }
}

impl From<NodeError> for DatabaseError {
    fn from(e: NodeError) -> Self {
        Self::Node(e)
    }
}

impl From<TreeError> for DatabaseError {
    fn from(e: TreeError) -> Self {
        Self::Tree(e)
    }
}

impl From<VersionError> for DatabaseError {
    fn from(e: VersionError) -> Self {
        Self::Version(e)
    }
}

impl From<RecoveryError> for DatabaseError {
    fn from(e: RecoveryError) -> Self {
        Self::Recovery(e)
    }
}
