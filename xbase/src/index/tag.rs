//! MDX metadata records: the anchor, tag descriptors and tag headers.
//!
//! ```text
//! page 0        anchor
//! 512..544      reserved, zero
//! 512 + i*32    descriptor of tag i (1..=47)
//! page 4..      tag headers and tree pages
//! ```

#![allow(clippy::cast_possible_truncation)]

use chrono::{Datelike, Local, NaiveDate};

use crate::index::IndexError;
use crate::index::definition::{KeyDefinition, KeyType, MAX_EXPRESSION_LENGTH};
use crate::index::node::{KeyGeometry, NodeFormat};
use crate::storage::{PAGE_SIZE, Page, PageId};

/// Tags one MDX file can hold.
pub const MAX_TAGS: usize = 47;

/// Bytes per tag descriptor.
pub const TAG_ENTRY_LENGTH: usize = 32;

/// Longest tag name.
pub const TAG_NAME_LENGTH: usize = 10;

/// Pages holding the anchor and the descriptor table.
pub const TAG_TABLE_PAGES: PageId = 4;

const MDX_VERSION: u8 = 2;
const UNIQUE_FLAG: u8 = 0x40;
const SINGLE_FIELD_FLAG: u8 = 0x10;

mod anchor_offsets {
    pub const VERSION: usize = 0;
    pub const CREATED: usize = 1;
    pub const TABLE_NAME: usize = 4;
    pub const BLOCK_PAGES: usize = 20;
    pub const BLOCK_BYTES: usize = 22;
    pub const PRODUCTION: usize = 24;
    pub const MAX_TAGS: usize = 25;
    pub const TAG_ENTRY_LENGTH: usize = 26;
    pub const TAGS_IN_USE: usize = 28;
    pub const NEXT_AVAILABLE: usize = 32;
    pub const FREE_LIST: usize = 36;
    pub const FREE_BLOCKS: usize = 40;
    pub const UPDATED: usize = 44;
}

const TABLE_NAME_LENGTH: usize = 16;

/// Page 0 of an MDX file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MdxAnchor {
    pub version: u8,
    /// Creation date as (year - 1900, month, day).
    pub created: [u8; 3],
    pub table_name: String,
    pub block_pages: u16,
    pub block_bytes: u16,
    pub production: bool,
    pub max_tags: u8,
    pub tag_entry_length: u8,
    pub tags_in_use: u16,
    pub next_available: PageId,
    pub free_list: PageId,
    pub free_blocks: u32,
    pub updated: [u8; 3],
}

impl MdxAnchor {
    /// A fresh anchor for `table_name` with no tags.
    #[must_use]
    pub fn new(table_name: &str) -> Self {
        let today = today();
        Self {
            version: MDX_VERSION,
            created: today,
            table_name: table_name.to_string(),
            block_pages: 1,
            block_bytes: PAGE_SIZE as u16,
            production: true,
            max_tags: MAX_TAGS as u8,
            tag_entry_length: TAG_ENTRY_LENGTH as u8,
            tags_in_use: 0,
            next_available: TAG_TABLE_PAGES,
            free_list: 0,
            free_blocks: 0,
            updated: today,
        }
    }

    pub fn read(page: &Page) -> Result<Self, IndexError> {
        use anchor_offsets as o;
        let anchor = Self {
            version: page.read_u8(o::VERSION),
            created: date_at(page, o::CREATED),
            table_name: page.read_str(o::TABLE_NAME, TABLE_NAME_LENGTH),
            block_pages: page.read_u16(o::BLOCK_PAGES),
            block_bytes: page.read_u16(o::BLOCK_BYTES),
            production: page.read_u8(o::PRODUCTION) != 0,
            max_tags: page.read_u8(o::MAX_TAGS),
            tag_entry_length: page.read_u8(o::TAG_ENTRY_LENGTH),
            tags_in_use: page.read_u16(o::TAGS_IN_USE),
            next_available: page.read_u32(o::NEXT_AVAILABLE),
            free_list: page.read_u32(o::FREE_LIST),
            free_blocks: page.read_u32(o::FREE_BLOCKS),
            updated: date_at(page, o::UPDATED),
        };

        if usize::from(anchor.block_bytes) != PAGE_SIZE || anchor.block_pages != 1 {
            return Err(IndexError::InvalidHeader(format!(
                "unsupported block size {} x {}",
                anchor.block_pages, anchor.block_bytes
            )));
        }
        if usize::from(anchor.tag_entry_length) != TAG_ENTRY_LENGTH {
            return Err(IndexError::InvalidHeader(format!(
                "unsupported tag entry length {}",
                anchor.tag_entry_length
            )));
        }
        if usize::from(anchor.tags_in_use) > MAX_TAGS {
            return Err(IndexError::InvalidHeader(format!(
                "{} tags in use (max {MAX_TAGS})",
                anchor.tags_in_use
            )));
        }
        if anchor.next_available < TAG_TABLE_PAGES {
            return Err(IndexError::InvalidHeader(format!(
                "next available page {} overlaps the tag table",
                anchor.next_available
            )));
        }
        Ok(anchor)
    }

    #[must_use]
    pub fn write(&self) -> Page {
        use anchor_offsets as o;
        let mut page = Page::new();
        page.write_u8(o::VERSION, self.version);
        page.write_bytes(o::CREATED, &self.created);
        page.write_str(o::TABLE_NAME, TABLE_NAME_LENGTH, &self.table_name);
        page.write_u16(o::BLOCK_PAGES, self.block_pages);
        page.write_u16(o::BLOCK_BYTES, self.block_bytes);
        page.write_u8(o::PRODUCTION, u8::from(self.production));
        page.write_u8(o::MAX_TAGS, self.max_tags);
        page.write_u8(o::TAG_ENTRY_LENGTH, self.tag_entry_length);
        page.write_u16(o::TAGS_IN_USE, self.tags_in_use);
        page.write_u32(o::NEXT_AVAILABLE, self.next_available);
        page.write_u32(o::FREE_LIST, self.free_list);
        page.write_u32(o::FREE_BLOCKS, self.free_blocks);
        page.write_bytes(o::UPDATED, &self.updated);
        page
    }

    /// Stamp the update date.
    pub fn touch(&mut self) {
        self.updated = today();
    }
}

/// Byte offset of descriptor `index` from the start of the file.
#[must_use]
pub const fn descriptor_offset(index: usize) -> usize {
    PAGE_SIZE + index * TAG_ENTRY_LENGTH
}

/// One 32-byte entry of the tag table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagDescriptor {
    pub header_page: PageId,
    pub name: String,
    pub field_flag: u8,
    /// Next tag in creation order (0 = none).
    pub forward_tag: u8,
    pub forward_tag_greater: u8,
    /// Previous tag in creation order (0 = none).
    pub backward_tag: u8,
    pub key_type: KeyType,
}

impl TagDescriptor {
    #[must_use]
    pub fn new(name: &str, header_page: PageId, definition: &KeyDefinition) -> Self {
        Self {
            header_page,
            name: name.to_string(),
            field_flag: if definition.is_single_field() {
                SINGLE_FIELD_FLAG
            } else {
                0
            },
            forward_tag: 0,
            forward_tag_greater: 0,
            backward_tag: 0,
            key_type: definition.key_type(),
        }
    }

    /// Decode the descriptor at `offset` within `page`.
    pub fn read(page: &Page, offset: usize) -> Result<Self, IndexError> {
        let code = page.read_u8(offset + 20);
        let key_type = KeyType::from_code(code).ok_or_else(|| {
            IndexError::InvalidHeader(format!("unknown key type {code:#04x} in tag descriptor"))
        })?;
        Ok(Self {
            header_page: page.read_u32(offset),
            name: page.read_str(offset + 4, TAG_NAME_LENGTH + 1),
            field_flag: page.read_u8(offset + 15),
            forward_tag: page.read_u8(offset + 16),
            forward_tag_greater: page.read_u8(offset + 17),
            backward_tag: page.read_u8(offset + 18),
            key_type,
        })
    }

    /// Encode into the 32 bytes at `offset` within `page`.
    pub fn write(&self, page: &mut Page, offset: usize) {
        page.write_bytes(offset, &[0u8; TAG_ENTRY_LENGTH]);
        page.write_u32(offset, self.header_page);
        page.write_str(offset + 4, TAG_NAME_LENGTH + 1, &self.name);
        page.write_u8(offset + 15, self.field_flag);
        page.write_u8(offset + 16, self.forward_tag);
        page.write_u8(offset + 17, self.forward_tag_greater);
        page.write_u8(offset + 18, self.backward_tag);
        page.write_u8(offset + 20, self.key_type.code());
    }
}

mod header_offsets {
    pub const ROOT: usize = 0;
    pub const PAGES_USED: usize = 4;
    pub const KEY_FORMAT: usize = 8;
    pub const KEY_TYPE: usize = 9;
    pub const SQL: usize = 10;
    pub const KEY_LENGTH: usize = 12;
    pub const KEYS_PER_NODE: usize = 14;
    pub const NOT_USED: usize = 16;
    pub const ENTRY_SIZE: usize = 18;
    pub const CHANGES: usize = 20;
    pub const UNIQUE: usize = 23;
    pub const EXPRESSION: usize = 24;
    pub const FOR_EXPRESSION: usize = 125;
    pub const TRAILER: usize = 240;
}

const EXPRESSION_FIELD: usize = MAX_EXPRESSION_LENGTH + 1;

/// The header page of one tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagHeader {
    pub root: PageId,
    pub pages_used: u32,
    pub key_format: u8,
    pub key_type: KeyType,
    pub sql: u8,
    pub key_length: u16,
    pub keys_per_node: u16,
    pub not_used: u16,
    pub entry_size: u16,
    pub changes: u16,
    pub unique: bool,
    pub expression: String,
    pub for_expression: String,
}

impl TagHeader {
    #[must_use]
    pub fn new(definition: &KeyDefinition, geometry: &KeyGeometry, root: PageId) -> Self {
        Self {
            root,
            pages_used: 1,
            key_format: 0,
            key_type: definition.key_type(),
            sql: 0,
            key_length: definition.key_length(),
            keys_per_node: geometry.keys_per_node() as u16,
            not_used: 0,
            entry_size: geometry.entry_size() as u16,
            changes: 0,
            unique: definition.is_unique(),
            expression: definition.expression().to_string(),
            for_expression: String::new(),
        }
    }

    pub fn read(page: &Page) -> Result<Self, IndexError> {
        use header_offsets as o;
        let code = page.read_u8(o::KEY_TYPE);
        let key_type = KeyType::from_code(code).ok_or_else(|| {
            IndexError::InvalidHeader(format!("unknown key type {code:#04x} in tag header"))
        })?;
        Ok(Self {
            root: page.read_u32(o::ROOT),
            pages_used: page.read_u32(o::PAGES_USED),
            key_format: page.read_u8(o::KEY_FORMAT),
            key_type,
            sql: page.read_u8(o::SQL),
            key_length: page.read_u16(o::KEY_LENGTH),
            keys_per_node: page.read_u16(o::KEYS_PER_NODE),
            not_used: page.read_u16(o::NOT_USED),
            entry_size: page.read_u16(o::ENTRY_SIZE),
            changes: page.read_u16(o::CHANGES),
            unique: page.read_u8(o::UNIQUE) & UNIQUE_FLAG != 0,
            expression: page.read_str(o::EXPRESSION, EXPRESSION_FIELD),
            for_expression: page.read_str(o::FOR_EXPRESSION, EXPRESSION_FIELD),
        })
    }

    #[must_use]
    pub fn write(&self) -> Page {
        use header_offsets as o;
        let mut page = Page::new();
        page.write_u32(o::ROOT, self.root);
        page.write_u32(o::PAGES_USED, self.pages_used);
        page.write_u8(o::KEY_FORMAT, self.key_format);
        page.write_u8(o::KEY_TYPE, self.key_type.code());
        page.write_u8(o::SQL, self.sql);
        page.write_u16(o::KEY_LENGTH, self.key_length);
        page.write_u16(o::KEYS_PER_NODE, self.keys_per_node);
        page.write_u16(o::NOT_USED, self.not_used);
        page.write_u16(o::ENTRY_SIZE, self.entry_size);
        page.write_u16(o::CHANGES, self.changes);
        page.write_u8(o::UNIQUE, if self.unique { UNIQUE_FLAG } else { 0 });
        page.write_str(o::EXPRESSION, EXPRESSION_FIELD, &self.expression);
        page.write_str(o::FOR_EXPRESSION, EXPRESSION_FIELD, &self.for_expression);
        page.write_u32(o::TRAILER, self.root);
        page
    }

    /// Rebuild the key definition and check the stored geometry against it.
    pub fn definition(&self) -> Result<KeyDefinition, IndexError> {
        let definition =
            KeyDefinition::from_stored(&self.expression, self.key_type, self.key_length, self.unique)?;
        let geometry = KeyGeometry::new(NodeFormat::Mdx, self.key_type, self.key_length);
        if usize::from(self.entry_size) != geometry.entry_size()
            || usize::from(self.keys_per_node) != geometry.keys_per_node()
        {
            return Err(IndexError::InvalidHeader(format!(
                "tag geometry {} x {} does not match key length {}",
                self.keys_per_node, self.entry_size, self.key_length
            )));
        }
        Ok(definition)
    }
}

fn date_at(page: &Page, offset: usize) -> [u8; 3] {
    [
        page.read_u8(offset),
        page.read_u8(offset + 1),
        page.read_u8(offset + 2),
    ]
}

/// Today's date as (year - 1900, month, day).
fn today() -> [u8; 3] {
    dbase_date(Local::now().date_naive())
}

fn dbase_date(date: NaiveDate) -> [u8; 3] {
    [
        u8::try_from(date.year() - 1900).unwrap_or(u8::MAX),
        date.month() as u8,
        date.day() as u8,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mdx_geometry(definition: &KeyDefinition) -> KeyGeometry {
        KeyGeometry::new(NodeFormat::Mdx, definition.key_type(), definition.key_length())
    }

    #[test]
    fn test_anchor_roundtrip() {
        let mut anchor = MdxAnchor::new("CUSTOMERS");
        anchor.tags_in_use = 3;
        anchor.next_available = 17;
        let page = anchor.write();

        assert_eq!(page.read_u8(0), 2);
        assert_eq!(page.read_str(4, 16), "CUSTOMERS");
        assert_eq!(page.read_u16(22), 512);
        assert_eq!(page.read_u8(25), 47);
        assert_eq!(page.read_u8(26), 32);
        assert_eq!(page.read_u16(28), 3);
        assert_eq!(page.read_u32(32), 17);

        assert_eq!(MdxAnchor::read(&page).expect("read"), anchor);
    }

    #[test]
    fn test_anchor_rejects_foreign_layout() {
        let mut page = MdxAnchor::new("T").write();
        page.write_u16(22, 1024);
        assert!(matches!(
            MdxAnchor::read(&page),
            Err(IndexError::InvalidHeader(_))
        ));

        let mut page = MdxAnchor::new("T").write();
        page.write_u16(28, 48);
        assert!(MdxAnchor::read(&page).is_err());
    }

    #[test]
    fn test_descriptor_layout() {
        let definition =
            KeyDefinition::from_stored("NAME", KeyType::Character, 20, false).expect("definition");
        let mut descriptor = TagDescriptor::new("NAME", 4, &definition);
        descriptor.forward_tag = 2;
        descriptor.backward_tag = 0;

        let mut page = Page::new();
        let offset = descriptor_offset(1) % PAGE_SIZE;
        descriptor.write(&mut page, offset);

        assert_eq!(offset, 32);
        assert_eq!(page.read_u32(32), 4);
        assert_eq!(page.read_bytes(36, 5), b"NAME\0");
        assert_eq!(page.read_u8(47), 0x10);
        assert_eq!(page.read_u8(48), 2);
        assert_eq!(page.read_u8(52), b'C');
        assert_eq!(TagDescriptor::read(&page, offset).expect("read"), descriptor);
    }

    #[test]
    fn test_descriptor_table_fits_before_first_free_page() {
        assert_eq!(descriptor_offset(MAX_TAGS) + TAG_ENTRY_LENGTH, 2048);
        assert_eq!(
            TAG_TABLE_PAGES as usize * PAGE_SIZE,
            descriptor_offset(MAX_TAGS) + TAG_ENTRY_LENGTH
        );
    }

    #[test]
    fn test_header_roundtrip() {
        let definition =
            KeyDefinition::from_stored("ID", KeyType::Float, 12, true).expect("definition");
        let geometry = mdx_geometry(&definition);
        let header = TagHeader::new(&definition, &geometry, 9);
        let page = header.write();

        assert_eq!(page.read_u32(0), 9);
        assert_eq!(page.read_u8(9), b'F');
        assert_eq!(page.read_u16(12), 12);
        assert_eq!(page.read_u16(18), 20);
        assert_eq!(page.read_u8(23), 0x40);
        assert_eq!(page.read_str(24, 101), "ID");
        assert_eq!(page.read_u32(240), 9);

        let back = TagHeader::read(&page).expect("read");
        assert_eq!(back, header);
        assert_eq!(back.definition().expect("definition"), definition);
    }

    #[test]
    fn test_header_geometry_mismatch() {
        let definition =
            KeyDefinition::from_stored("NAME", KeyType::Character, 20, false).expect("definition");
        let mut header = TagHeader::new(&definition, &mdx_geometry(&definition), 5);
        header.entry_size = 99;
        assert!(matches!(
            header.definition(),
            Err(IndexError::InvalidHeader(_))
        ));
    }

    #[test]
    fn test_dbase_date() {
        let date = |y, m, d| NaiveDate::from_ymd_opt(y, m, d).expect("date");
        assert_eq!(dbase_date(date(1970, 1, 1)), [70, 1, 1]);
        assert_eq!(dbase_date(date(2000, 2, 29)), [100, 2, 29]);
        assert_eq!(dbase_date(date(2024, 12, 31)), [124, 12, 31]);
    }
}
