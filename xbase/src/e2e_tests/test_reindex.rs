//! Whole-file rebuilds on disk.

use tempfile::tempdir;

use crate::config::IndexConfig;
use crate::e2e_tests::helpers::*;
use crate::index::{Index, MdxFile, NodeKey};
use crate::storage::FileStore;

#[test]
fn test_reindex_then_reopen() {
    let dir = tempdir().expect("create temp dir");
    let path = dir.path().join("customer.mdx");
    let mut table = customers();

    {
        let store = FileStore::create(&path).expect("create store");
        let mut mdx = MdxFile::create(store, "CUSTOMER", IndexConfig::default()).expect("create");
        mdx.create_tag("NAME", "NAME", false, &table).expect("tag");
        mdx.create_tag("ID", "ID", true, &table).expect("tag");
        mdx.create_tag("JOINED", "JOINED", false, &table).expect("tag");

        // Rows written without index maintenance, as after a bulk load.
        for record in 1..=150u32 {
            let name = format!("N{:03}", 150 - record);
            let id = record.to_string();
            let joined = format!("2020{:02}{:02}", record % 12 + 1, record % 28 + 1);
            table.append(&[
                ("NAME", Some(name.as_str())),
                ("ID", Some(id.as_str())),
                ("JOINED", Some(joined.as_str())),
            ]);
        }
        mdx.reindex(&mut table).expect("reindex");
        mdx.close().expect("close");
    }

    let store = FileStore::open(&path).expect("open store");
    let mut mdx = MdxFile::open(store, IndexConfig::default()).expect("open");
    assert_eq!(mdx.tag_names().expect("names"), vec!["NAME", "ID", "JOINED"]);

    let mut names = mdx.mdx("NAME").expect("tag");
    let expected: Vec<u32> = (1..=150).rev().collect();
    assert_eq!(forward(&mut names), expected);

    let mut ids = mdx.mdx("ID").expect("tag");
    assert!(ids.definition().is_unique());
    assert_eq!(ids.find_entry(&NodeKey::float(75.0)).expect("find"), Some(75));
    assert_eq!(ids.entry_count().expect("count"), 150);

    let mut joined = mdx.mdx("JOINED").expect("tag");
    assert_eq!(joined.entry_count().expect("count"), 150);
}

#[test]
fn test_reindex_reports_duplicates_in_unique_tag() {
    let mut table = customers();
    let mut mdx = memory_mdx();
    mdx.create_tag("ID", "ID", true, &table).expect("tag");
    for id in ["1", "2", "1"] {
        table.append(&[("ID", Some(id))]);
    }

    let err = mdx.reindex(&mut table).expect_err("duplicate");
    assert!(err.is_duplicate_key());
}
