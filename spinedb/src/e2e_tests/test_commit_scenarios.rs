//! Commits derived from older versions leave those versions untouched.

use crate::storage::Data;
use crate::testing::TestDatabase;

#[test]
fn test_two_commits() {
    let db = TestDatabase::new().expect("open");

    let v1 = db.commit(0, "a", "1").expect("commit");
    let v2 = db.commit(v1, "b", "2").expect("commit");

    assert_eq!((v1, v2), (1, 2));
    assert_eq!(db.lookup(v2, "a").expect("lookup"), Some(Data::from("1")));
    assert_eq!(db.lookup(v2, "b").expect("lookup"), Some(Data::from("2")));
    assert_eq!(db.lookup(v1, "b").expect("lookup"), None);
    assert_eq!(db.lookup(0, "a").expect("lookup"), None);
}

#[test]
fn test_commit_from_older_version() {
    let db = TestDatabase::new().expect("open");
    let v1 = db.commit(0, "a", "1").expect("commit");
    let v2 = db.commit(v1, "b", "2").expect("commit");

    let v3 = db.commit(v1, "a", "override").expect("commit");

    assert_eq!(v3, 3);
    assert_eq!(db.current_version(), 3);
    assert_eq!(db.lookup(v3, "a").expect("lookup"), Some(Data::from("override")));
    assert_eq!(db.lookup(v1, "a").expect("lookup"), Some(Data::from("1")));
    // v3 branches from v1, so it never saw "b".
    assert_eq!(db.lookup(v3, "b").expect("lookup"), None);
    assert_eq!(db.lookup(v2, "a").expect("lookup"), Some(Data::from("1")));
}

#[test]
fn test_version_numbers_are_dense() {
    let db = TestDatabase::new().expect("open");
    let mut version = 0;
    for i in 0..20u32 {
        let next = db.commit(version, format!("k{i}").as_str(), "v").expect("commit");
        assert_eq!(next, version + 1);
        version = next;
    }
    let numbers: Vec<u64> = db.versions().into_iter().map(|(v, _)| v).collect();
    assert_eq!(numbers, (0..=20).collect::<Vec<u64>>());
}
