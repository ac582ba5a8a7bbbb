//! Readers of a fixed version see a stable tree while commits append.

use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use crate::e2e_tests::helpers::{key, value};
use crate::testing::{TestDatabase, small_fanout};

#[test]
fn test_readers_during_commits() {
    let db = TestDatabase::with_config(small_fanout()).expect("open");
    let mut fixed = 0;
    for i in 0..64 {
        fixed = db.commit(fixed, key(i), value(i, 0)).expect("commit");
    }
    let expected = db.scan(fixed).expect("scan");
    let done = AtomicBool::new(false);

    thread::scope(|s| {
        for reader in 0..4u32 {
            let db = &db;
            let done = &done;
            let expected = &expected;
            s.spawn(move || {
                let mut rounds = 0;
                while !done.load(Ordering::Acquire) || rounds < 10 {
                    for i in (reader..64).step_by(4) {
                        assert_eq!(
                            db.lookup(fixed, key(i)).expect("lookup"),
                            Some(value(i, 0))
                        );
                    }
                    assert_eq!(&db.scan(fixed).expect("scan"), expected);
                    rounds += 1;
                }
            });
        }

        let mut version = fixed;
        for rev in 1..=20 {
            for i in (0..64).step_by(3) {
                version = db.commit(version, key(i), value(i, rev)).expect("commit");
            }
            version = db.delete(version, key(rev)).expect("delete");
        }
        done.store(true, Ordering::Release);
    });

    assert_eq!(db.scan(fixed).expect("scan"), expected);
}

#[test]
fn test_readers_follow_new_versions() {
    let db = TestDatabase::with_config(small_fanout()).expect("open");
    let done = AtomicBool::new(false);

    thread::scope(|s| {
        for _ in 0..3 {
            let db = &db;
            let done = &done;
            s.spawn(move || {
                while !done.load(Ordering::Acquire) {
                    // Whatever version is current, its tree is complete.
                    let version = db.current_version();
                    let count = db.check(version).expect("well formed").records;
                    assert!(count as u64 <= version);
                    for i in 0..count {
                        let i = u32::try_from(i).expect("small");
                        assert_eq!(db.lookup(version, key(i)).expect("lookup"), Some(value(i, 0)));
                    }
                }
            });
        }

        let mut version = 0;
        for i in 0..100 {
            version = db.commit(version, key(i), value(i, 0)).expect("commit");
        }
        done.store(true, Ordering::Release);
    });
}
