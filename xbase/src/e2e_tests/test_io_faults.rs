//! Storage failures surface as errors, never panics.

use crate::config::IndexConfig;
use crate::e2e_tests::helpers::*;
use crate::index::{Index, IndexError, MdxFile, NodeKey};
use crate::storage::{FaultConfig, MemoryStore, StorageError};

#[test]
fn test_failed_write_during_insert() {
    let mut table = customers();
    let mut mdx = memory_mdx();
    mdx.create_tag("NAME", "NAME", false, &table).expect("tag");
    insert(&mut mdx, &mut table, &["NAME"], &[("NAME", Some("OK"))]);

    let mut store = mdx.close().expect("close");
    store.set_faults(FaultConfig {
        fail_writes_after: Some(0),
        fail_reads: false,
    });
    let mut mdx = MdxFile::open(store, IndexConfig::default()).expect("open");
    let mut tag = mdx.mdx("NAME").expect("tag");
    let err = tag.add_entry(&NodeKey::text("NEW"), 2).expect_err("write fault");
    assert!(matches!(err, IndexError::Storage(StorageError::InjectedFault(_))));

    // Reads still work and the failed entry is absent.
    assert_eq!(forward(&mut tag), vec![1]);
}

#[test]
fn test_failed_reads_on_open() {
    let mdx = memory_mdx();
    let mut store = mdx.close().expect("close");
    store.set_faults(FaultConfig {
        fail_writes_after: None,
        fail_reads: true,
    });
    let result = MdxFile::open(store, IndexConfig::default());
    assert!(matches!(
        result,
        Err(IndexError::Storage(StorageError::InjectedFault(_)))
    ));
}

#[test]
fn test_truncated_file() {
    let mut table = customers();
    let mut mdx = memory_mdx();
    mdx.create_tag("NAME", "NAME", false, &table).expect("tag");
    insert(&mut mdx, &mut table, &["NAME"], &[("NAME", Some("GONE"))]);
    let mut store = mdx.close().expect("close");

    // Cut the file inside the first tag's root page.
    crate::storage::ByteStore::truncate(&mut store, 5 * 512 + 100).expect("truncate");
    let mut mdx = MdxFile::open(store, IndexConfig::default()).expect("open");
    let mut tag = mdx.mdx("NAME").expect("tag");
    assert!(matches!(
        tag.find_entry(&NodeKey::text("GONE")),
        Err(IndexError::Storage(StorageError::Io(_)))
    ));
}

#[test]
fn test_fresh_store_is_not_an_index() {
    let result = MdxFile::open(MemoryStore::new(), IndexConfig::default());
    assert!(matches!(result, Err(IndexError::Storage(_))));
}
