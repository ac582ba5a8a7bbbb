//! Overwrites keep a chain back to the values they replaced.

use crate::storage::Data;
use crate::testing::TestDatabase;

#[test]
fn test_history_newest_first() {
    let db = TestDatabase::new().expect("open");
    let v1 = db.commit(0, "k", "1").expect("commit");
    let v2 = db.commit(v1, "k", "2").expect("commit");
    let v3 = db.commit(v2, "other", "x").expect("commit");
    let v4 = db.commit(v3, "k", "3").expect("commit");

    assert_eq!(
        db.history(v4, "k").expect("history"),
        vec![Data::from("3"), Data::from("2"), Data::from("1")]
    );
    assert_eq!(
        db.history(v2, "k").expect("history"),
        vec![Data::from("2"), Data::from("1")]
    );
    assert_eq!(db.history(v4, "other").expect("history"), vec![Data::from("x")]);
    assert_eq!(db.history(0, "k").expect("history"), Vec::<Data>::new());
}

#[test]
fn test_history_restarts_after_delete() {
    let db = TestDatabase::new().expect("open");
    let v1 = db.commit(0, "k", "1").expect("commit");
    let v2 = db.delete(v1, "k").expect("delete");
    let v3 = db.commit(v2, "k", "2").expect("commit");

    assert_eq!(db.history(v2, "k").expect("history"), Vec::<Data>::new());
    assert_eq!(db.history(v3, "k").expect("history"), vec![Data::from("2")]);
}

#[test]
fn test_history_follows_branch() {
    let db = TestDatabase::new().expect("open");
    let v1 = db.commit(0, "k", "base").expect("commit");
    let left = db.commit(v1, "k", "left").expect("commit");
    let right = db.commit(v1, "k", "right").expect("commit");

    assert_eq!(
        db.history(left, "k").expect("history"),
        vec![Data::from("left"), Data::from("base")]
    );
    assert_eq!(
        db.history(right, "k").expect("history"),
        vec![Data::from("right"), Data::from("base")]
    );
}
