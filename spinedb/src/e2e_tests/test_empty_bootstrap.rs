//! A new file starts at version 0 with nothing in it.

use crate::storage::{Data, HEADER_SIZE};
use crate::testing::TestDatabase;

#[test]
fn test_fresh_file_is_version_zero() {
    let db = TestDatabase::new().expect("open");

    assert_eq!(db.current_version(), 0);
    assert_eq!(db.versions().len(), 1);
    assert!(db.file_len() > HEADER_SIZE);
    for probe in ["x", "", "a", "zzzz"] {
        assert_eq!(db.lookup(0, probe).expect("lookup"), None);
    }
    assert_eq!(db.search(0, "x").expect("search"), None);
    assert_eq!(db.scan(0).expect("scan"), Vec::<(Data, Data)>::new());
}

#[test]
fn test_reopen_empty_file() {
    let db = TestDatabase::new().expect("open");
    let len = db.file_len();
    let db = db.reopen().expect("reopen");

    assert_eq!(db.current_version(), 0);
    assert_eq!(db.file_len(), len);
    assert_eq!(db.lookup(0, "x").expect("lookup"), None);
}

#[test]
fn test_empty_key_is_a_key() {
    let db = TestDatabase::new().expect("open");
    let v1 = db.commit(0, "", "empty").expect("commit");

    assert_eq!(db.lookup(v1, "").expect("lookup"), Some(Data::from("empty")));
    assert_eq!(db.lookup(v1, "a").expect("lookup"), None);
}
