//! Common helpers for end-to-end tests.

use crate::config::IndexConfig;
use crate::index::field::FieldType;
use crate::index::{Index, MdxFile};
use crate::storage::MemoryStore;
use crate::testing::MemoryTable;

/// A customer table with one field of every indexable type.
pub fn customers() -> MemoryTable {
    MemoryTable::new("CUSTOMER")
        .with_field("ID", FieldType::Numeric, 6)
        .with_field("NAME", FieldType::Character, 20)
        .with_field("CITY", FieldType::Character, 15)
        .with_field("BALANCE", FieldType::Float, 12)
        .with_field("JOINED", FieldType::Date, 8)
}

/// A fresh MDX file for the customer table.
pub fn memory_mdx() -> MdxFile<MemoryStore> {
    MdxFile::create(MemoryStore::new(), "CUSTOMER", IndexConfig::default())
        .expect("create MDX file")
}

/// Append a row and index it in every named tag.
pub fn insert(
    mdx: &mut MdxFile<MemoryStore>,
    table: &mut MemoryTable,
    tags: &[&str],
    values: &[(&str, Option<&str>)],
) -> u32 {
    let record = table.append(values);
    for tag in tags {
        mdx.mdx(tag)
            .expect("tag")
            .add_record(record, &*table)
            .expect("add record");
    }
    record
}

/// Every record in key order, from the first entry.
pub fn forward(index: &mut dyn Index) -> Vec<u32> {
    index.position_at_first().expect("position at first");
    std::iter::from_fn(|| index.get_next_key().expect("next key")).collect()
}

/// Every record in reverse key order, from the last entry.
pub fn backward(index: &mut dyn Index) -> Vec<u32> {
    index.position_at_last().expect("position at last");
    std::iter::from_fn(|| index.get_prev_key().expect("prev key")).collect()
}
