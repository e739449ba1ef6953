//! Cursor moves: seeking, stepping and deleting.

use crate::e2e_tests::helpers::*;
use crate::index::{Index, IndexError, MdxFile, NodeKey, Park};
use crate::storage::MemoryStore;
use crate::testing::MemoryTable;

/// A tag over ID holding records `1..=count` with ids 10, 20, 30...
fn numbered(count: u32) -> (MemoryTable, MdxFile<MemoryStore>) {
    let mut table = customers();
    let mut mdx = memory_mdx();
    mdx.create_tag("ID", "ID", false, &table).expect("create tag");
    for record in 1..=count {
        let id = (record * 10).to_string();
        insert(&mut mdx, &mut table, &["ID"], &[("ID", Some(id.as_str()))]);
    }
    (table, mdx)
}

#[test]
fn test_walk_both_ways_across_pages() {
    let (_table, mut mdx) = numbered(300);
    let mut tag = mdx.mdx("ID").expect("tag");
    assert_ne!(tag.root(), 5, "tree should have grown past one page");

    let expected: Vec<u32> = (1..=300).collect();
    assert_eq!(forward(&mut tag), expected);
    let mut reversed = expected;
    reversed.reverse();
    assert_eq!(backward(&mut tag), reversed);
}

#[test]
fn test_seek_parks_around_equal_keys() {
    let mut table = customers();
    let mut mdx = memory_mdx();
    mdx.create_tag("CITY", "CITY", false, &table).expect("create tag");
    for city in ["OSLO", "BERN", "OSLO", "ROME", "OSLO"] {
        insert(&mut mdx, &mut table, &["CITY"], &[("CITY", Some(city))]);
    }

    let mut tag = mdx.mdx("CITY").expect("tag");
    tag.seek(&NodeKey::text("OSLO"), Park::Before).expect("seek");
    assert_eq!(tag.get_prev_key().expect("prev"), Some(2));

    tag.seek(&NodeKey::text("OSLO"), Park::Before).expect("seek");
    assert_eq!(tag.get_next_key().expect("next"), Some(1));

    tag.seek(&NodeKey::text("OSLO"), Park::After).expect("seek");
    assert_eq!(tag.get_prev_key().expect("prev"), Some(5));
    assert_eq!(tag.get_next_key().expect("next"), Some(4));
}

#[test]
fn test_ends_return_none() {
    let (_table, mut mdx) = numbered(3);
    let mut tag = mdx.mdx("ID").expect("tag");

    tag.position_at_first().expect("first");
    assert_eq!(tag.get_prev_key().expect("prev"), None);
    assert_eq!(tag.get_next_key().expect("next"), Some(1));

    tag.position_at_last().expect("last");
    assert_eq!(tag.get_next_key().expect("next"), None);
    assert_eq!(tag.get_prev_key().expect("prev"), Some(3));
}

#[test]
fn test_empty_tag() {
    let table = customers();
    let mut mdx = memory_mdx();
    let mut tag = mdx.create_tag("NAME", "NAME", false, &table).expect("create tag");
    assert!(tag.has_tree());
    assert_eq!(forward(&mut tag), Vec::<u32>::new());
    assert_eq!(backward(&mut tag), Vec::<u32>::new());
    assert_eq!(tag.find_entry(&NodeKey::text("ANY")).expect("find"), None);
    assert!(matches!(tag.del_entry(), Err(IndexError::NoCurrentEntry)));
}

#[test]
fn test_delete_while_walking() {
    let (_table, mut mdx) = numbered(120);
    let mut tag = mdx.mdx("ID").expect("tag");

    tag.position_at_first().expect("first");
    while let Some(record) = tag.get_next_key().expect("next") {
        if record % 3 == 0 {
            assert_eq!(tag.del_entry().expect("delete"), record);
        }
    }

    let expected: Vec<u32> = (1..=120).filter(|r| r % 3 != 0).collect();
    assert_eq!(forward(&mut tag), expected);
    assert_eq!(tag.find_entry(&NodeKey::float(30.0)).expect("find"), Some(4));
    assert!(!tag.found_exact());
}

#[test]
fn test_find_exact_entry() {
    let mut table = customers();
    let mut mdx = memory_mdx();
    mdx.create_tag("CITY", "CITY", false, &table).expect("create tag");
    for _ in 0..4 {
        insert(&mut mdx, &mut table, &["CITY"], &[("CITY", Some("LIMA"))]);
    }

    let mut tag = mdx.mdx("CITY").expect("tag");
    let lima = NodeKey::text("LIMA");
    assert_eq!(tag.find_entry_for(&lima, 3).expect("find"), Some(3));
    assert!(tag.found_exact());
    assert_eq!(tag.del_entry().expect("delete"), 3);
    assert_eq!(tag.find_entry_for(&lima, 3).expect("find"), None);
    assert!(!tag.found_exact());
    assert_eq!(forward(&mut tag), vec![1, 2, 4]);
}
