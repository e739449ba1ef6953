//! Tag table limits.

use crate::e2e_tests::helpers::*;
use crate::index::IndexError;
use crate::index::tag::MAX_TAGS;

#[test]
fn test_forty_eighth_tag_is_rejected() {
    let table = customers();
    let mut mdx = memory_mdx();
    for i in 0..MAX_TAGS {
        mdx.create_tag(&format!("TAG{i}"), "NAME", false, &table)
            .expect("create tag");
    }
    assert_eq!(mdx.tag_count(), 47);
    assert_eq!(mdx.anchor().tags_in_use, 47);

    let result = mdx.create_tag("ONEMORE", "NAME", false, &table);
    assert!(matches!(result, Err(IndexError::MaxTagsReached)));

    let names = mdx.tag_names().expect("names");
    assert_eq!(names.len(), 47);
    assert_eq!(names.first().map(String::as_str), Some("TAG0"));
    assert_eq!(names.last().map(String::as_str), Some("TAG46"));
}

#[test]
fn test_names_differing_in_case_clash() {
    let table = customers();
    let mut mdx = memory_mdx();
    mdx.create_tag("Name", "NAME", false, &table).expect("create tag");

    let result = mdx.create_tag("nAME", "CITY", false, &table);
    assert!(matches!(result, Err(IndexError::TagNameInUse(ref name)) if name == "NAME"));
    assert_eq!(mdx.tag_count(), 1);
    assert!(mdx.has_tag("NAME"));
}
