// Layers, bottom up:
//  - Data and Rope: immutable buffers and the builder that serialises records
//  - DataFile: append-only file with a single write lock
//  - Node codec: tagged records (data blocks, records, blocks, version entries)
//  - Tree: descent and the copy-on-write rebuild
//  - VersionRegistry: version number -> root offset, under the version lock
//  - Database: ties the above together
//
// Every write appends. Nothing in the file is ever overwritten, so every
// committed version stays readable for as long as the file exists.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod config;
pub mod storage;

mod e2e_tests;
#[cfg(test)]
mod testing;

pub use config::{ConfigError, EngineConfig};
pub use storage::{Data, Database, DatabaseError};
