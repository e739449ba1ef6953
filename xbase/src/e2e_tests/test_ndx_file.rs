//! Single-tag NDX files on disk.

use tempfile::tempdir;

use crate::config::IndexConfig;
use crate::e2e_tests::helpers::*;
use crate::index::{Index, IndexError, KeyType, Ndx, NodeKey};
use crate::storage::FileStore;

#[test]
fn test_ndx_name_scenario_survives_reopen() {
    let dir = tempdir().expect("create temp dir");
    let path = dir.path().join("names.ndx");
    let mut table = customers();

    {
        let store = FileStore::create(&path).expect("create store");
        let mut ndx =
            Ndx::create(store, "NAMES", "NAME", false, &table, IndexConfig::default()).expect("create");
        for name in ["ALICE", "BOB"] {
            let record = table.append(&[("NAME", Some(name))]);
            ndx.add_record(record, &table).expect("add");
        }
        ndx.close().expect("close");
    }

    let store = FileStore::open(&path).expect("open store");
    let mut ndx = Ndx::open(store, "NAMES", IndexConfig::default()).expect("open");
    assert_eq!(ndx.definition().key_type(), KeyType::Character);
    assert_eq!(ndx.find_entry(&NodeKey::text("ALICE")).expect("find"), Some(1));
    assert_eq!(forward(&mut ndx), vec![1, 2]);
}

#[test]
fn test_ndx_dates_use_numeric_keys() {
    let mut table = customers();
    let mut ndx = Ndx::create(
        crate::storage::MemoryStore::new(),
        "JOINED",
        "JOINED",
        false,
        &table,
        IndexConfig::default(),
    )
    .expect("create");
    assert_eq!(ndx.definition().key_type(), KeyType::Date);

    for date in ["20000101", "19700101"] {
        let record = table.append(&[("JOINED", Some(date))]);
        ndx.add_record(record, &table).expect("add");
    }
    assert_eq!(forward(&mut ndx), vec![2, 1]);
}

#[test]
fn test_ndx_unique_numeric() {
    let mut table = customers();
    let mut ndx = Ndx::create(
        crate::storage::MemoryStore::new(),
        "ID",
        "ID",
        true,
        &table,
        IndexConfig::default(),
    )
    .expect("create");
    assert_eq!(ndx.definition().key_type(), KeyType::Numeric);

    let first = table.append(&[("ID", Some("100"))]);
    ndx.add_record(first, &table).expect("add");
    let second = table.append(&[("ID", Some("100"))]);
    let err = ndx.add_record(second, &table).expect_err("duplicate");
    assert!(matches!(err, IndexError::DuplicateKey { record: 1, .. }));
    assert_eq!(
        ndx.find_entry(&NodeKey::Numeric(100.0)).expect("find"),
        Some(first)
    );
}

#[test]
fn test_ndx_many_keys_on_disk() {
    let dir = tempdir().expect("create temp dir");
    let path = dir.path().join("ids.ndx");
    let mut table = customers();

    let store = FileStore::create(&path).expect("create store");
    let mut ndx = Ndx::create(store, "IDS", "ID", false, &table, IndexConfig::default()).expect("create");
    for record in 1..=2000u32 {
        let id = ((record * 7919) % 2000).to_string();
        table.append(&[("ID", Some(id.as_str()))]);
        ndx.add_record(record, &table).expect("add");
    }
    assert_eq!(ndx.entry_count().expect("count"), 2000);
    ndx.close().expect("close");

    let length = std::fs::metadata(&path).expect("metadata").len();
    assert_eq!(length % 512, 0);

    let store = FileStore::open(&path).expect("open store");
    let mut ndx = Ndx::open(store, "IDS", IndexConfig::default()).expect("open");
    assert_eq!(ndx.find_entry(&NodeKey::Numeric(0.0)).expect("find"), Some(2000));
    assert_eq!(ndx.find_entry(&NodeKey::Numeric(1999.5)).expect("find"), None);
}
