//! Mixed-kind key comparison under both settings.

use crate::config::IndexConfig;
use crate::e2e_tests::helpers::*;
use crate::index::{Index, IndexError, KeyComparison, MdxFile, NodeKey};
use crate::storage::MemoryStore;

#[test]
fn test_strict_rejects_mixed_kinds() {
    let mut table = customers();
    let mut mdx = memory_mdx();
    mdx.create_tag("NAME", "NAME", false, &table).expect("tag");
    insert(&mut mdx, &mut table, &["NAME"], &[("NAME", Some("X"))]);

    let mut tag = mdx.mdx("NAME").expect("tag");
    assert!(matches!(
        tag.find_entry(&NodeKey::Numeric(1.0)),
        Err(IndexError::Key(_))
    ));
}

#[test]
fn test_lenient_treats_mixed_kinds_as_less() {
    let config = IndexConfig {
        key_comparison: KeyComparison::Lenient,
        ..IndexConfig::default()
    };
    let mut table = customers();
    let mut mdx = MdxFile::create(MemoryStore::new(), "CUSTOMER", config).expect("create");
    mdx.create_tag("NAME", "NAME", false, &table).expect("tag");
    insert(&mut mdx, &mut table, &["NAME"], &[("NAME", Some("X"))]);

    let mut tag = mdx.mdx("NAME").expect("tag");
    // A numeric probe sorts before every text key.
    assert_eq!(tag.find_entry(&NodeKey::Numeric(1.0)).expect("find"), Some(1));
    assert!(!tag.found_exact());
}
