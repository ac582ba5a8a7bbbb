//! Keys and values past the inline limit live in their own data blocks.

use crate::config::EngineConfig;
use crate::storage::Data;
use crate::testing::TestDatabase;

fn config() -> EngineConfig {
    EngineConfig {
        max_block_entries: 8,
        inline_limit: 32,
        sync_on_commit: false,
    }
}

#[test]
fn test_large_values_round_trip() {
    let db = TestDatabase::with_config(config()).expect("open");
    let big = Data::from(vec![0xab_u8; 1 << 20]);
    let v1 = db.commit(0, "big", big.clone()).expect("commit");

    assert_eq!(db.lookup(v1, "big").expect("lookup"), Some(big));
    assert!(db.file_len() > 1 << 20);
}

#[test]
fn test_large_keys_order_correctly() {
    let db = TestDatabase::with_config(config()).expect("open");
    let mut version = 0;
    let mut keys = Vec::new();
    for i in 0..40u8 {
        // Shared long prefix so ordering depends on the tail.
        let mut k = vec![b'p'; 100];
        k.push(i);
        let k = Data::from(k);
        version = db.commit(version, k.clone(), Data::from(&[i])).expect("commit");
        keys.push(k);
    }

    db.check(version).expect("well formed");
    let scanned: Vec<Data> = db.scan(version).expect("scan").into_iter().map(|(k, _)| k).collect();
    assert_eq!(scanned, keys);
    for (i, k) in keys.iter().enumerate() {
        let i = u8::try_from(i).expect("small");
        assert_eq!(db.lookup(version, k).expect("lookup"), Some(Data::from(&[i])));
    }
}

#[test]
fn test_value_at_inline_boundary() {
    let db = TestDatabase::with_config(config()).expect("open");
    let at = Data::from(vec![1_u8; 32]);
    let over = Data::from(vec![2_u8; 33]);
    let v1 = db.commit(0, "at", at.clone()).expect("commit");
    let v2 = db.commit(v1, "over", over.clone()).expect("commit");

    assert_eq!(db.lookup(v2, "at").expect("lookup"), Some(at));
    assert_eq!(db.lookup(v2, "over").expect("lookup"), Some(over));
    assert_eq!(db.lookup(v2, "").expect("lookup"), None);
}
