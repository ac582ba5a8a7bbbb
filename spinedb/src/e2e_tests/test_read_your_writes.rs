//! Every commit is visible in the version it returns and nowhere earlier.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::e2e_tests::helpers::{random_key, value};
use crate::testing::{TestDatabase, small_fanout};

#[test]
fn test_read_your_writes_and_isolation() {
    let db = TestDatabase::with_config(small_fanout()).expect("open");
    let mut rng = StdRng::seed_from_u64(7);
    let mut version = 0;

    for step in 0..300u32 {
        let k = random_key(&mut rng, 4);
        let before = db.lookup(version, &k).expect("lookup");
        let v = value(step, 0);

        let next = db.commit(version, k.clone(), v.clone()).expect("commit");

        assert_eq!(db.lookup(next, &k).expect("lookup"), Some(v));
        assert_eq!(db.lookup(version, &k).expect("lookup"), before);
        version = next;
    }
}

#[test]
fn test_branches_do_not_interfere() {
    let db = TestDatabase::with_config(small_fanout()).expect("open");
    let mut rng = StdRng::seed_from_u64(21);

    let mut base = 0;
    for i in 0..40u32 {
        base = db.commit(base, random_key(&mut rng, 3), value(i, 0)).expect("commit");
    }
    let snapshot = db.scan(base).expect("scan");

    // Two branches from the same base.
    let mut left = base;
    let mut right = base;
    for i in 0..30u32 {
        let k = random_key(&mut rng, 3);
        if rng.random_bool(0.5) {
            left = db.commit(left, k, value(i, 1)).expect("commit");
        } else {
            right = db.delete(right, k).expect("delete");
        }
    }

    assert_eq!(db.scan(base).expect("scan"), snapshot);
    db.check(left).expect("left is well formed");
    db.check(right).expect("right is well formed");
    for (k, _) in db.scan(right).expect("scan") {
        assert!(snapshot.iter().any(|(s, _)| *s == k), "deletes never add keys");
    }
}
