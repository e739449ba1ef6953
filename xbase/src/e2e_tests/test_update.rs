//! Moving a record's entry when its key fields change.

use crate::e2e_tests::helpers::*;
use crate::index::field::Table;
use crate::index::{Index, NodeKey};

#[test]
fn test_changed_key_moves_entry() {
    let mut table = customers();
    let mut mdx = memory_mdx();
    mdx.create_tag("NAME", "NAME", false, &table).expect("create tag");
    for name in ["ANNA", "BRUNO", "CLARA"] {
        insert(&mut mdx, &mut table, &["NAME"], &[("NAME", Some(name))]);
    }

    // The table layer reads record 1, remembers its key, then rewrites it.
    table.go_to(1).expect("go to");
    let mut tag = mdx.mdx("NAME").expect("tag");
    let old = tag.build_key(&table).expect("key");
    tag.set_active_key(Some(old));
    table.set("NAME", Some("ZELDA")).expect("set");
    tag.update(1, &table).expect("update");

    assert_eq!(forward(&mut tag), vec![2, 3, 1]);
    assert_eq!(tag.find_entry(&NodeKey::text("ANNA")).expect("find"), Some(2));
    assert!(!tag.found_exact());
    assert_eq!(tag.active_key(), Some(&NodeKey::text("ZELDA")));
    assert_eq!(tag.entry_count().expect("count"), 3);
}

#[test]
fn test_unchanged_key_is_left_alone() {
    let mut table = customers();
    let mut mdx = memory_mdx();
    mdx.create_tag("CITY", "CITY", false, &table).expect("create tag");
    insert(&mut mdx, &mut table, &["CITY"], &[("CITY", Some("ROME")), ("NAME", Some("A"))]);

    let mut tag = mdx.mdx("CITY").expect("tag");
    let pages = tag.header().pages_used;
    table.set("NAME", Some("B")).expect("set");
    tag.update(1, &table).expect("update");

    assert_eq!(forward(&mut tag), vec![1]);
    assert_eq!(tag.header().pages_used, pages);
}

#[test]
fn test_update_without_old_entry_inserts() {
    let mut table = customers();
    let mut mdx = memory_mdx();
    mdx.create_tag("NAME", "NAME", false, &table).expect("create tag");
    let record = table.append(&[("NAME", Some("LATE"))]);

    let mut tag = mdx.mdx("NAME").expect("tag");
    assert_eq!(tag.active_key(), None);
    tag.update(record, &table).expect("update");
    assert_eq!(tag.find_entry(&NodeKey::text("LATE")).expect("find"), Some(record));
}

#[test]
fn test_update_into_taken_unique_key_fails() {
    let mut table = customers();
    let mut mdx = memory_mdx();
    mdx.create_tag("ID", "ID", true, &table).expect("create tag");
    insert(&mut mdx, &mut table, &["ID"], &[("ID", Some("1"))]);
    insert(&mut mdx, &mut table, &["ID"], &[("ID", Some("2"))]);

    let mut tag = mdx.mdx("ID").expect("tag");
    table.set("ID", Some("1")).expect("set");
    let err = tag.update(2, &table).expect_err("taken");
    assert!(err.is_duplicate_key());
    assert_eq!(forward(&mut tag), vec![1, 2]);
    assert_eq!(
        tag.find_entry(&NodeKey::float(2.0)).expect("find"),
        Some(2)
    );
}

#[test]
fn test_dates_index_by_day() {
    let mut table = customers();
    let mut mdx = memory_mdx();
    mdx.create_tag("JOINED", "JOINED", false, &table).expect("create tag");
    for date in ["20240301", "19991231", "", "20240229"] {
        insert(&mut mdx, &mut table, &["JOINED"], &[("JOINED", Some(date))]);
    }

    let mut tag = mdx.mdx("JOINED").expect("tag");
    assert_eq!(forward(&mut tag), vec![3, 2, 4, 1]);

    table.go_to(4).expect("go to");
    let key = tag.build_key(&table).expect("key");
    table.go_to(1).expect("go to");
    let next_day = tag.build_key(&table).expect("key");
    match (key, next_day) {
        (NodeKey::Numeric(a), NodeKey::Numeric(b)) => assert!((b - a - 1.0).abs() < f64::EPSILON),
        other => panic!("unexpected keys {other:?}"),
    }
}
