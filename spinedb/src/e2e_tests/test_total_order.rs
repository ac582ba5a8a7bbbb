//! The tree agrees with an ordered in-memory model under random workloads.

use std::collections::BTreeMap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::e2e_tests::helpers::{key, random_key, value};
use crate::storage::Data;
use crate::testing::{TestDatabase, small_fanout};

#[test]
fn test_random_workload_matches_model() {
    let db = TestDatabase::with_config(small_fanout()).expect("open");
    let mut rng = StdRng::seed_from_u64(0xb7ee);
    let mut model: BTreeMap<Data, Data> = BTreeMap::new();
    let mut version = 0;

    for step in 0..1000u32 {
        let k = random_key(&mut rng, 5);
        if rng.random_bool(0.35) {
            model.remove(&k);
            version = db.delete(version, k).expect("delete");
        } else {
            let v = value(step, 0);
            model.insert(k.clone(), v.clone());
            version = db.commit(version, k, v).expect("commit");
        }

        if step % 100 == 0 {
            db.check(version).expect("well formed");
        }
    }

    let stats = db.check(version).expect("well formed");
    assert_eq!(stats.records, model.len());
    let expected: Vec<(Data, Data)> = model.clone().into_iter().collect();
    assert_eq!(db.scan(version).expect("scan"), expected);

    for _ in 0..300 {
        let probe = random_key(&mut rng, 6);
        assert_eq!(db.lookup(version, &probe).expect("lookup"), model.get(&probe).cloned());
    }
}

#[test]
fn test_sequential_fill_and_drain() {
    let db = TestDatabase::with_config(small_fanout()).expect("open");
    let mut version = 0;
    for i in 0..256 {
        version = db.commit(version, key(i), value(i, 0)).expect("commit");
    }
    let full = version;
    let stats = db.check(full).expect("well formed");
    assert_eq!(stats.records, 256);
    assert!(stats.depth >= 4);

    // Drain from the middle outwards to exercise merges on both sides.
    let order: Vec<u32> = (0..128).rev().chain(128..256).collect();
    for (n, i) in order.into_iter().enumerate() {
        version = db.delete(version, key(i)).expect("delete");
        if n % 16 == 0 {
            db.check(version).expect("well formed");
        }
    }

    assert_eq!(db.check(version).expect("well formed").records, 0);
    assert_eq!(db.lookup(version, key(7)).expect("lookup"), None);
    assert_eq!(db.lookup(full, key(7)).expect("lookup"), Some(value(7, 0)));
}

#[test]
fn test_path_ends_at_search_result() {
    let db = TestDatabase::with_config(small_fanout()).expect("open");
    let mut version = 0;
    for i in (0..64).step_by(2) {
        version = db.commit(version, key(i), value(i, 0)).expect("commit");
    }
    let depth = db.check(version).expect("well formed").depth;

    for i in 0..64 {
        let path = db.path(version, key(i)).expect("path");
        assert_eq!(path.len(), depth + 1);
        assert_eq!(path.root(), Some(db.root(version).expect("root")));
        assert_eq!(path.peek(), db.search(version, key(i)).expect("search"));
        // Offsets strictly decrease from root to leaf.
        assert!(path.as_slice().windows(2).all(|w| w[0] > w[1]));
    }
}
