//! Reopening a file recovers every committed version.

use std::fs::OpenOptions;
use std::io::{Seek, SeekFrom, Write};

use crate::config::EngineConfig;
use crate::e2e_tests::helpers::{file_bytes, key, value};
use crate::storage::{Data, Database, DatabaseError, make_version};
use crate::testing::{TestDatabase, small_fanout};

#[test]
fn test_reopen_keeps_all_versions() {
    let db = TestDatabase::with_config(small_fanout()).expect("open");
    let mut version = 0;
    let mut snapshots = Vec::new();
    for i in 0..50 {
        version = db.commit(version, key(i % 17), value(i, 0)).expect("commit");
        snapshots.push((version, db.scan(version).expect("scan")));
    }
    let versions = db.versions();

    let db = db.reopen().expect("reopen");
    assert_eq!(db.current_version(), version);
    assert_eq!(db.versions(), versions);
    for (v, contents) in snapshots {
        assert_eq!(db.scan(v).expect("scan"), contents);
    }

    let next = db.commit(version, "after", "reopen").expect("commit");
    assert_eq!(next, version + 1);
}

#[test]
fn test_torn_tail_is_truncated() {
    let db = TestDatabase::new().expect("open");
    let v1 = db.commit(0, "a", "1").expect("commit");
    let len = db.file_len();
    let (dir, path, config) = db.close();

    // Half of a record node left by a crash mid-append.
    let mut f = OpenOptions::new().append(true).open(&path).expect("open");
    f.write_all(&[b'r', b'i', 0, 0, 0, 9, b'x']).expect("write");
    drop(f);

    let db = Database::open(&path, config).expect("recover");
    assert_eq!(db.file_len(), len);
    assert_eq!(file_bytes(&path).len() as u64, len);
    assert_eq!(db.current_version(), v1);
    assert_eq!(db.lookup(v1, "a").expect("lookup"), Some(Data::from("1")));

    let v2 = db.commit(v1, "b", "2").expect("commit");
    assert_eq!(v2, 2);
    drop(db);
    drop(dir);
}

#[test]
fn test_torn_version_entry_is_dropped() {
    let db = TestDatabase::new().expect("open");
    let v1 = db.commit(0, "a", "1").expect("commit");
    let root = db.root(v1).expect("root");
    let (dir, path, config) = db.close();

    // A version entry cut short by a crash.
    let mut torn = make_version(2, root).to_vec();
    torn.truncate(10);
    let mut f = OpenOptions::new().append(true).open(&path).expect("open");
    f.write_all(&torn).expect("write");
    drop(f);

    let db = Database::open(&path, config).expect("recover");
    assert_eq!(db.current_version(), v1);
    assert_eq!(db.root(v1).expect("root"), root);
    assert!(db.root(2).is_err());
    drop(db);
    drop(dir);
}

#[test]
fn test_foreign_file_is_rejected() {
    let dir = tempfile::tempdir().expect("create temp dir");
    let path = dir.path().join("not-a-db");
    std::fs::write(&path, b"definitely not a spinedb file").expect("write");

    let err = Database::open(&path, EngineConfig::default())
        .err()
        .expect("bad magic");
    assert!(matches!(err, DatabaseError::File(_)));
    assert!(err.is_corruption());
}

#[test]
fn test_damage_under_committed_versions_fails_open() {
    let db = TestDatabase::new().expect("open");
    let mut version = 0;
    for i in 0..5 {
        version = db.commit(version, key(i), value(i, 0)).expect("commit");
    }
    let base_root = db.root(0).expect("root");
    let len = db.file_len();
    let (dir, path, config) = db.close();

    let mut f = OpenOptions::new().write(true).open(&path).expect("open");
    f.seek(SeekFrom::Start(base_root)).expect("seek");
    f.write_all(b"x").expect("write");
    drop(f);

    let err = Database::open(&path, config.clone())
        .err()
        .expect("damaged file");
    assert!(matches!(err, DatabaseError::Recovery(_)));
    assert!(err.is_corruption());
    assert_eq!(file_bytes(&path).len() as u64, len);

    // Still refused on a second attempt; nothing was cut away.
    assert!(Database::open(&path, config).is_err());
    assert_eq!(file_bytes(&path).len() as u64, len);
    drop(dir);
}

#[test]
fn test_reopen_with_smaller_fanout() {
    let wide = EngineConfig {
        max_block_entries: 16,
        ..small_fanout()
    };
    let db = TestDatabase::with_config(wide).expect("open");
    let mut version = 0;
    for i in 0..60 {
        version = db.commit(version, key(i), value(i, 0)).expect("commit");
    }
    assert!(db.check(version).expect("check").widest > small_fanout().max_block_entries);
    let (dir, path, _) = db.close();

    let db = Database::open(&path, small_fanout()).expect("reopen");
    let stats = db.check(version).expect("check");
    assert_eq!(stats.records, 60);

    let next = db.delete(version, key(7)).expect("delete");
    let next = db.commit(next, "after", "reopen").expect("commit");
    assert_eq!(db.check(next).expect("check").records, 60);
    assert_eq!(db.lookup(next, key(7)).expect("lookup"), None);
    assert_eq!(db.lookup(next, "after").expect("lookup"), Some(Data::from("reopen")));
    drop(db);
    drop(dir);
}
