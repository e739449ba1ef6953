//! Index page codec.
//!
//! One 512-byte page holds a header and an array of fixed-width slots:
//!
//! ```text
//! NDX:  count:u32 | slot 0 | slot 1 | ... | slot n-1 | trailing pointer
//! MDX:  count:u32 | prev_page:u32 | slot 0 | ... | trailing pointer
//!
//! slot: lower:u32 | record:u32 | key (padded to a multiple of 4)
//! ```
//!
//! Leaf slots carry a table record number and a zero lower pointer.
//! Branch slots carry a child page, the record number of the child's
//! largest entry, and that entry's key. The trailing pointer addresses the
//! rightmost child of a branch and is zero in a leaf, which is how the two
//! are told apart.

#![allow(clippy::cast_possible_truncation)]

use crate::index::definition::KeyType;
use crate::index::key::{FLOAT_KEY_LEN, FloatKey, KeyKind, NodeKey};
use crate::storage::{PAGE_SIZE, Page, PageId, StorageError, encode_latin1};

/// Which on-disk page variant a tree uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeFormat {
    /// Single-tag `Node` pages.
    Ndx,
    /// Multi-tag `MNode` pages with a `prev_page` link.
    Mdx,
}

impl NodeFormat {
    /// Bytes before the first slot.
    #[must_use]
    pub const fn header_size(self) -> usize {
        match self {
            Self::Ndx => 4,
            Self::Mdx => 8,
        }
    }
}

/// Slot sizing for one tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyGeometry {
    format: NodeFormat,
    kind: KeyKind,
    key_length: u16,
}

impl KeyGeometry {
    /// Geometry for keys of `key_type` that are `key_length` bytes wide.
    #[must_use]
    pub const fn new(format: NodeFormat, key_type: KeyType, key_length: u16) -> Self {
        Self {
            format,
            kind: key_type.key_kind(),
            key_length,
        }
    }

    #[must_use]
    pub const fn format(&self) -> NodeFormat {
        self.format
    }

    #[must_use]
    pub const fn kind(&self) -> KeyKind {
        self.kind
    }

    #[must_use]
    pub const fn key_length(&self) -> u16 {
        self.key_length
    }

    /// Key bytes rounded up to a 4-byte boundary.
    #[must_use]
    pub const fn key_slot(&self) -> usize {
        (self.key_length as usize).div_ceil(4) * 4
    }

    /// Bytes per slot: lower pointer, record number, padded key.
    #[must_use]
    pub const fn entry_size(&self) -> usize {
        8 + self.key_slot()
    }

    /// Keys that fit in one page next to the trailing pointer slot.
    #[must_use]
    pub const fn keys_per_node(&self) -> usize {
        (PAGE_SIZE - self.format.header_size()) / self.entry_size() - 1
    }

    const fn slot_offset(&self, slot: usize) -> usize {
        self.format.header_size() + slot * self.entry_size()
    }

    /// Cut a text key to the stored width and at its first NUL.
    ///
    /// What comes back is exactly what a page would return after a write.
    #[must_use]
    pub fn fit(&self, key: &NodeKey) -> NodeKey {
        match key {
            NodeKey::Text(text) => {
                let width = usize::from(self.key_length);
                let text: String = text
                    .chars()
                    .take_while(|&c| c != '\0')
                    .map(|c| if u32::from(c) <= 0xFF { c } else { '?' })
                    .take(width)
                    .collect();
                NodeKey::Text(text)
            }
            other => other.clone(),
        }
    }
}

/// One populated slot.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeEntry {
    /// Child page (branch) or 0 (leaf).
    pub lower: PageId,
    /// Table record number; in a branch, the record of the child's last entry.
    pub record: u32,
    pub key: NodeKey,
}

impl NodeEntry {
    /// A leaf entry.
    #[must_use]
    pub const fn leaf(key: NodeKey, record: u32) -> Self {
        Self {
            lower: 0,
            record,
            key,
        }
    }
}

/// A decoded index page.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub page_id: PageId,
    pub entries: Vec<NodeEntry>,
    /// Rightmost child of a branch, 0 in a leaf.
    pub last_pointer: PageId,
    /// Previous leaf in key order (MDX only, 0 elsewhere).
    pub prev_page: PageId,
}

impl Node {
    /// An empty leaf.
    #[must_use]
    pub const fn new_leaf(page_id: PageId) -> Self {
        Self {
            page_id,
            entries: Vec::new(),
            last_pointer: 0,
            prev_page: 0,
        }
    }

    /// A branch over `entries` with `last_pointer` as its rightmost child.
    #[must_use]
    pub const fn new_branch(page_id: PageId, entries: Vec<NodeEntry>, last_pointer: PageId) -> Self {
        Self {
            page_id,
            entries,
            last_pointer,
            prev_page: 0,
        }
    }

    #[must_use]
    pub const fn is_branch(&self) -> bool {
        self.last_pointer != 0
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Child page at `index`; `index == len()` is the trailing pointer.
    #[must_use]
    pub fn child(&self, index: usize) -> PageId {
        self.entries
            .get(index)
            .map_or(self.last_pointer, |entry| entry.lower)
    }

    /// Decode a page.
    pub fn read(page_id: PageId, page: &Page, geometry: &KeyGeometry) -> Result<Self, NodeError> {
        if page_id == 0 {
            return Err(NodeError::InvalidPageNumber(page_id));
        }
        let count = page.read_u32(0) as usize;
        let max = geometry.keys_per_node();
        if count > max {
            return Err(NodeError::KeyCountOutOfRange {
                page: page_id,
                count,
                max,
            });
        }
        let prev_page = match geometry.format {
            NodeFormat::Ndx => 0,
            NodeFormat::Mdx => page.read_u32(4),
        };

        let mut entries = Vec::with_capacity(count);
        for slot in 0..count {
            let offset = geometry.slot_offset(slot);
            let lower = page.read_u32(offset);
            let record = page.read_u32(offset + 4);
            let key = read_key(page, offset + 8, geometry);
            entries.push(NodeEntry { lower, record, key });
        }
        let last_pointer = page.read_u32(geometry.slot_offset(count));

        let node = Self {
            page_id,
            entries,
            last_pointer,
            prev_page,
        };
        node.validate(geometry)?;
        Ok(node)
    }

    /// Encode into a fresh page; unused bytes are zero.
    pub fn write(&self, geometry: &KeyGeometry) -> Result<Page, NodeError> {
        if self.page_id == 0 {
            return Err(NodeError::InvalidPageNumber(self.page_id));
        }
        let max = geometry.keys_per_node();
        if self.entries.len() > max {
            return Err(NodeError::KeyCountOutOfRange {
                page: self.page_id,
                count: self.entries.len(),
                max,
            });
        }
        self.validate(geometry)?;

        let mut page = Page::new();
        page.write_u32(0, self.entries.len() as u32);
        if geometry.format == NodeFormat::Mdx {
            page.write_u32(4, self.prev_page);
        }
        for (slot, entry) in self.entries.iter().enumerate() {
            let offset = geometry.slot_offset(slot);
            page.write_u32(offset, entry.lower);
            page.write_u32(offset + 4, entry.record);
            write_key(&mut page, offset + 8, &entry.key);
        }
        page.write_u32(geometry.slot_offset(self.entries.len()), self.last_pointer);
        Ok(page)
    }

    fn validate(&self, geometry: &KeyGeometry) -> Result<(), NodeError> {
        let branch = self.is_branch();
        for (slot, entry) in self.entries.iter().enumerate() {
            let pointer_missing = if branch {
                entry.lower == 0
            } else {
                entry.lower != 0 || entry.record == 0
            };
            if pointer_missing {
                return Err(NodeError::ZeroPointers {
                    page: self.page_id,
                    slot,
                });
            }
            if entry.key.kind() != geometry.kind {
                return Err(NodeError::KeyKindMismatch {
                    page: self.page_id,
                    expected: geometry.kind,
                    found: entry.key.kind(),
                });
            }
            if let NodeKey::Text(text) = &entry.key {
                let length = text.chars().count();
                if length > usize::from(geometry.key_length) {
                    return Err(NodeError::KeyTooLong {
                        page: self.page_id,
                        length,
                        max: geometry.key_length,
                    });
                }
            }
        }
        Ok(())
    }
}

fn read_key(page: &Page, offset: usize, geometry: &KeyGeometry) -> NodeKey {
    match geometry.kind {
        KeyKind::Text => NodeKey::Text(page.read_str(offset, usize::from(geometry.key_length))),
        KeyKind::Numeric => NodeKey::Numeric(page.read_f64(offset)),
        KeyKind::Float => {
            let mut bytes = [0u8; FLOAT_KEY_LEN];
            bytes.copy_from_slice(page.read_bytes(offset, FLOAT_KEY_LEN));
            NodeKey::Float(FloatKey::from_bytes(bytes))
        }
    }
}

fn write_key(page: &mut Page, offset: usize, key: &NodeKey) {
    match key {
        NodeKey::Text(text) => page.write_bytes(offset, &encode_latin1(text)),
        NodeKey::Numeric(value) => page.write_f64(offset, *value),
        NodeKey::Float(value) => page.write_bytes(offset, value.as_bytes()),
    }
}

/// Structural problems in an index page.
#[derive(Debug)]
pub enum NodeError {
    /// Page 0 holds the file header and is never a tree page.
    InvalidPageNumber(PageId),
    /// More keys than a page can hold.
    KeyCountOutOfRange { page: PageId, count: usize, max: usize },
    /// A branch slot without a child, or a leaf slot without a record.
    ZeroPointers { page: PageId, slot: usize },
    /// A key of the wrong kind for this tag.
    KeyKindMismatch {
        page: PageId,
        expected: KeyKind,
        found: KeyKind,
    },
    /// A text key wider than the tag's key length.
    KeyTooLong { page: PageId, length: usize, max: u16 },
    /// A numeric key that is NaN or infinite and so has no place in the order.
    NonFiniteKey { page: PageId, value: f64 },
    Storage(StorageError),
}

impl std::fmt::Display for NodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidPageNumber(page) => write!(f, "invalid index page number {page}"),
            Self::KeyCountOutOfRange { page, count, max } => {
                write!(f, "page {page} holds {count} keys (max {max})")
            }
            Self::ZeroPointers { page, slot } => {
                write!(f, "page {page} slot {slot} has a zero pointer")
            }
            Self::KeyKindMismatch {
                page,
                expected,
                found,
            } => write!(f, "page {page} expects {expected} keys, found {found}"),
            Self::KeyTooLong { page, length, max } => {
                write!(f, "page {page}: key of {length} bytes exceeds {max}")
            }
            Self::NonFiniteKey { page, value } => {
                write!(f, "page {page}: numeric key {value} is not finite")
            }
            Self::Storage(e) => write!(f, "storage error: {e}"),
        }
    }
}

impl std::error::Error for NodeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Storage(e) => Some(e),
            _ => None,
        }
    }
}

impl From<StorageError> for NodeError {
    fn from(e: StorageError) -> Self {
        Self::Storage(e)
    }
}
