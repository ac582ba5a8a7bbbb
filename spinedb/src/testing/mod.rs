//! Shared fixtures for unit and end-to-end tests.

use std::ops::Deref;
use std::path::PathBuf;

use tempfile::TempDir;

use crate::config::EngineConfig;
use crate::storage::{Database, DatabaseError};

/// A database in its own temporary directory.
///
/// The directory and the file inside it are removed on drop.
pub struct TestDatabase {
    db: Database,
    path: PathBuf,
    // Dropped after `db`.
    dir: TempDir,
}

impl TestDatabase {
    /// Create a fresh database with the default configuration, minus the
    /// per-commit fsync.
    pub fn new() -> Result<Self, DatabaseError> {
        Self::with_config(EngineConfig {
            sync_on_commit: false,
            ..EngineConfig::default()
        })
    }

    /// Create a fresh database with `config`.
    pub fn with_config(config: EngineConfig) -> Result<Self, DatabaseError> {
        let dir = tempfile::tempdir().map_err(crate::storage::FileError::Io)?;
        let path = dir.path().join("test.spine");
        let db = Database::open(&path, config)?;
        Ok(Self {
            db,
            path,
            dir,
        })
    }

    /// Close the database and open the same file again.
    pub fn reopen(self) -> Result<Self, DatabaseError> {
        let config = self.db.config().clone();
        let Self { db, path, dir } = self;
        drop(db);
        let db = Database::open(&path, config)?;
        Ok(Self { db, path, dir })
    }

    /// Close the database, keeping the directory so the file can be
    /// modified before reopening.
    pub fn close(self) -> (TempDir, PathBuf, EngineConfig) {
        let config = self.db.config().clone();
        let Self { db, path, dir } = self;
        drop(db);
        (dir, path, config)
    }
}

impl Deref for TestDatabase {
    type Target = Database;

    fn deref(&self) -> &Database {
        &self.db
    }
}

/// Configuration with a tiny fan-out so a few dozen keys build a deep tree.
pub fn small_fanout() -> EngineConfig {
    EngineConfig {
        max_block_entries: EngineConfig::MIN_BLOCK_ENTRIES,
        inline_limit: 16,
        sync_on_commit: false,
    }
}
