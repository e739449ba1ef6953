//! Text tag over NAME: lookups and ordering.

use crate::e2e_tests::helpers::*;
use crate::index::{Index, KeyType, NodeKey};

#[test]
fn test_find_and_walk_names() {
    let mut table = customers();
    let mut mdx = memory_mdx();
    {
        let tag = mdx.create_tag("NAME", "NAME", false, &table).expect("create tag");
        assert_eq!(tag.definition().key_type(), KeyType::Character);
        assert_eq!(tag.definition().key_length(), 20);
        assert!(!tag.definition().is_unique());
    }

    insert(&mut mdx, &mut table, &["NAME"], &[("NAME", Some("ALICE"))]);
    insert(&mut mdx, &mut table, &["NAME"], &[("NAME", Some("BOB"))]);

    let mut tag = mdx.mdx("NAME").expect("tag");
    assert_eq!(tag.find_entry(&NodeKey::text("ALICE")).expect("find"), Some(1));
    assert!(tag.found_exact());

    tag.position_at_first().expect("first");
    assert_eq!(tag.get_next_key().expect("next"), Some(1));
    assert_eq!(tag.current_key(), Some(&NodeKey::text("ALICE")));
    assert_eq!(tag.get_next_key().expect("next"), Some(2));
    assert_eq!(tag.current_key(), Some(&NodeKey::text("BOB")));
    assert_eq!(tag.get_next_key().expect("next"), None);
}

#[test]
fn test_partial_key_finds_next_entry() {
    let mut table = customers();
    let mut mdx = memory_mdx();
    mdx.create_tag("NAME", "NAME", false, &table).expect("create tag");
    for name in ["CARLA", "ALBERT", "BEATRIX", "ALMA"] {
        insert(&mut mdx, &mut table, &["NAME"], &[("NAME", Some(name))]);
    }

    let mut tag = mdx.mdx("name").expect("tag");
    assert_eq!(tag.find_entry(&NodeKey::text("AL")).expect("find"), Some(2));
    assert!(!tag.found_exact());
    assert_eq!(tag.get_next_key().expect("next"), Some(4));
    assert_eq!(tag.find_entry(&NodeKey::text("B")).expect("find"), Some(3));
    assert_eq!(tag.find_entry(&NodeKey::text("ZED")).expect("find"), None);
    assert!(!tag.found_exact());
}

#[test]
fn test_duplicate_names_keep_record_order() {
    let mut table = customers();
    let mut mdx = memory_mdx();
    mdx.create_tag("NAME", "NAME", false, &table).expect("create tag");
    for name in ["SMITH", "JONES", "SMITH", "SMITH", "ADAMS"] {
        insert(&mut mdx, &mut table, &["NAME"], &[("NAME", Some(name))]);
    }

    let mut tag = mdx.mdx("NAME").expect("tag");
    assert_eq!(forward(&mut tag), vec![5, 2, 1, 3, 4]);
    assert_eq!(backward(&mut tag), vec![4, 3, 1, 2, 5]);
}

#[test]
fn test_compound_expression() {
    let mut table = customers();
    let mut mdx = memory_mdx();
    mdx.create_tag("CITYNAME", "city + name", false, &table)
        .expect("create tag");
    let rows = [("PORTO", "RUI"), ("LISBON", "ANA"), ("LISBON", "")];
    for (city, name) in rows {
        insert(
            &mut mdx,
            &mut table,
            &["CITYNAME"],
            &[("CITY", Some(city)), ("NAME", Some(name))],
        );
    }

    let mut tag = mdx.mdx("CITYNAME").expect("tag");
    assert_eq!(tag.definition().fields(), ["CITY", "NAME"]);
    assert_eq!(tag.definition().key_length(), 35);
    assert_eq!(forward(&mut tag), vec![3, 2, 1]);
    assert_eq!(
        tag.find_entry(&NodeKey::text("LISBONANA")).expect("find"),
        Some(2)
    );
}

#[test]
fn test_underscore_sorts_before_printables() {
    let mut table = customers();
    let mut mdx = memory_mdx();
    mdx.create_tag("NAME", "NAME", false, &table).expect("create tag");
    for name in ["A B", "A_B", "AAB"] {
        insert(&mut mdx, &mut table, &["NAME"], &[("NAME", Some(name))]);
    }

    let mut tag = mdx.mdx("NAME").expect("tag");
    assert_eq!(forward(&mut tag), vec![2, 1, 3]);
}
