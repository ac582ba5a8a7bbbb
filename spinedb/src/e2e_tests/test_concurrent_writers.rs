//! Writers on separate threads each get their own version number.

use std::sync::Mutex;
use std::thread;

use crate::e2e_tests::helpers::value;
use crate::storage::Data;
use crate::testing::{TestDatabase, small_fanout};

#[test]
fn test_parallel_commits_from_one_base() {
    let db = TestDatabase::with_config(small_fanout()).expect("open");
    let base = db.commit(0, "shared", "base").expect("commit");
    let results = Mutex::new(Vec::new());

    thread::scope(|s| {
        for writer in 0..4u32 {
            let db = &db;
            let results = &results;
            s.spawn(move || {
                let mut version = base;
                for i in 0..25u32 {
                    let k = Data::from(format!("w{writer}-{i:03}").as_str());
                    version = db.commit(version, k, value(i, writer)).expect("commit");
                }
                results.lock().expect("lock").push((writer, version));
            });
        }
    });

    let results = results.into_inner().expect("lock");
    assert_eq!(db.current_version(), base + 100);

    let mut numbers: Vec<u64> = db.versions().into_iter().map(|(v, _)| v).collect();
    numbers.dedup();
    assert_eq!(numbers.len(), 102);

    // Each writer's chain holds only its own keys plus the shared base.
    for (writer, last) in results {
        let contents = db.scan(last).expect("scan");
        assert_eq!(contents.len(), 26);
        let prefix = format!("w{writer}-");
        for (k, _) in &contents {
            assert!(k.as_bytes() == b"shared" || k.as_bytes().starts_with(prefix.as_bytes()));
        }
        db.check(last).expect("well formed");
    }
}
