//! Committed bytes are never rewritten.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::e2e_tests::helpers::{file_bytes, key, random_key, value};
use crate::testing::{TestDatabase, small_fanout};

#[test]
fn test_existing_bytes_never_change() {
    let db = TestDatabase::with_config(small_fanout()).expect("open");
    let mut rng = StdRng::seed_from_u64(3);
    let mut version = 0;
    let mut snapshots = Vec::new();

    for step in 0..200u32 {
        let k = random_key(&mut rng, 3);
        version = if rng.random_bool(0.25) {
            db.delete(version, k).expect("delete")
        } else {
            db.commit(version, k, value(step, 0)).expect("commit")
        };
        if step % 20 == 0 {
            snapshots.push((version, file_bytes(db.file_path()), db.scan(version).expect("scan")));
        }
    }

    let current = file_bytes(db.file_path());
    for (old_version, bytes, contents) in snapshots {
        assert!(current.len() >= bytes.len());
        assert_eq!(&current[..bytes.len()], bytes.as_slice(), "prefix rewritten");
        assert_eq!(db.scan(old_version).expect("scan"), contents);
    }
}

#[test]
fn test_commit_only_appends() {
    let db = TestDatabase::new().expect("open");
    let before = file_bytes(db.file_path());
    let v1 = db.commit(0, key(1), value(1, 0)).expect("commit");
    let after = file_bytes(db.file_path());

    assert!(after.len() > before.len());
    assert_eq!(&after[..before.len()], before.as_slice());
    assert_eq!(db.root(0).expect("root"), db.versions()[0].1);
    assert!(db.root(v1).expect("root") > db.root(0).expect("root"));
}
