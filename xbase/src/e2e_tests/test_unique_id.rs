//! Unique numeric tag: duplicate detection.

use crate::e2e_tests::helpers::*;
use crate::index::field::Table;
use crate::index::{DuplicateCheck, Index, IndexError, KeyType, NodeKey};

#[test]
fn test_duplicate_id_is_rejected() {
    let mut table = customers();
    let mut mdx = memory_mdx();
    {
        let tag = mdx.create_tag("ID", "ID", true, &table).expect("create tag");
        assert_eq!(tag.definition().key_type(), KeyType::Float);
        assert!(tag.definition().is_unique());
    }

    insert(&mut mdx, &mut table, &["ID"], &[("ID", Some("100"))]);
    let second = table.append(&[("ID", Some("100.0"))]);
    assert_eq!(second, 2);

    let mut tag = mdx.mdx("ID").expect("tag");
    let err = tag.add_record(2, &table).expect_err("duplicate");
    assert!(err.is_duplicate_key());
    match err {
        IndexError::DuplicateKey { tag, key, record } => {
            assert_eq!(tag, "ID");
            assert_eq!(key, NodeKey::float(100.0));
            assert_eq!(record, 1);
        }
        other => panic!("unexpected error {other}"),
    }
    assert_eq!(tag.entry_count().expect("count"), 1);
}

#[test]
fn test_same_record_is_a_no_op() {
    let mut table = customers();
    let mut mdx = memory_mdx();
    mdx.create_tag("ID", "ID", true, &table).expect("create tag");
    insert(&mut mdx, &mut table, &["ID"], &[("ID", Some("100"))]);

    table.go_to(1).expect("go to");
    let mut tag = mdx.mdx("ID").expect("tag");
    tag.add_record(1, &table).expect("same record");
    assert_eq!(tag.entry_count().expect("count"), 1);
    assert_eq!(tag.find_entry(&NodeKey::float(100.0)).expect("find"), Some(1));
}

#[test]
fn test_check_before_append() {
    let mut table = customers();
    let mut mdx = memory_mdx();
    mdx.create_tag("ID", "ID", true, &table).expect("create tag");
    insert(&mut mdx, &mut table, &["ID"], &[("ID", Some("7"))]);

    let mut tag = mdx.mdx("ID").expect("tag");
    let taken = tag
        .check_for_duplicates(&NodeKey::float(7.0), DuplicateCheck::NewRecord)
        .expect_err("duplicate");
    assert!(taken.is_duplicate_key());
    tag.check_for_duplicates(&NodeKey::float(8.0), DuplicateCheck::NewRecord)
        .expect("free key");
    tag.check_for_duplicates(&NodeKey::float(7.0), DuplicateCheck::Record(1))
        .expect("own key");
}

#[test]
fn test_non_unique_tag_accepts_repeats() {
    let mut table = customers();
    let mut mdx = memory_mdx();
    mdx.create_tag("ID", "ID", false, &table).expect("create tag");
    for _ in 0..3 {
        insert(&mut mdx, &mut table, &["ID"], &[("ID", Some("5"))]);
    }

    let mut tag = mdx.mdx("ID").expect("tag");
    tag.check_for_duplicates(&NodeKey::float(5.0), DuplicateCheck::NewRecord)
        .expect("not unique");
    assert_eq!(forward(&mut tag), vec![1, 2, 3]);
}

#[test]
fn test_unparsable_number() {
    let mut table = customers();
    let mut mdx = memory_mdx();
    mdx.create_tag("ID", "ID", true, &table).expect("create tag");
    let record = table.append(&[("ID", Some("12x"))]);

    let err = mdx
        .mdx("ID")
        .expect("tag")
        .add_record(record, &table)
        .expect_err("bad number");
    assert!(matches!(err, IndexError::InvalidFieldValue { .. }));
}
