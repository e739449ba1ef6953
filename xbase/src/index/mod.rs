//! Tag indexes over a table.
//!
//! `Index` is the contract the table layer drives: add and locate entries,
//! walk them in key order, keep them in step with record updates. `Ndx`
//! implements it for a single-tag file; `MdxFile` hands out `MdxIndex`
//! handles for each tag of a multi-tag file.
//!
//! # Usage
//!
//! ```
//! use xbase::index::{Index, MdxFile};
//! use xbase::index::field::FieldType;
//! use xbase::storage::MemoryStore;
//! use xbase::testing::MemoryTable;
//! use xbase::IndexConfig;
//!
//! let mut table = MemoryTable::new("PEOPLE").with_field("NAME", FieldType::Character, 20);
//! let mut mdx = MdxFile::create(MemoryStore::new(), "PEOPLE", IndexConfig::default()).unwrap();
//! mdx.create_tag("NAME", "NAME", false, &table).unwrap();
//!
//! let record = table.append(&[("NAME", Some("ALICE"))]);
//! let mut tag = mdx.mdx("name").unwrap();
//! tag.add_record(record, &table).unwrap();
//!
//! assert_eq!(tag.find_entry(&xbase::index::NodeKey::text("ALICE")).unwrap(), Some(1));
//! ```

pub mod binary_tree;
pub mod definition;
pub mod field;
pub mod key;
pub mod mdx;
pub mod ndx;
pub mod node;
pub mod tag;
pub mod tree;

use std::cmp::Ordering;

pub use binary_tree::BinaryTree;
pub use definition::{KeyDefinition, KeyType};
pub use key::{FloatKey, KeyComparison, KeyError, NodeKey};
pub use mdx::{MdxFile, MdxIndex};
pub use ndx::Ndx;
pub use node::{NodeError, NodeFormat};

use crate::storage::StorageError;
use field::{FieldSource, Table};

/// Which record a uniqueness check is made for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DuplicateCheck {
    /// A record that is not in the index yet; any equal key is a duplicate.
    NewRecord,
    /// An existing record; only equal keys bound to other records count.
    Record(u32),
}

/// Where `seek` leaves the cursor relative to entries equal to the key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Park {
    /// Before the first equal entry; `get_next_key` returns it.
    Before,
    /// After the last equal entry; `get_prev_key` returns it.
    After,
}

/// Operations the table layer uses to keep one tag in step with its rows.
///
/// Record numbers returned by lookups and cursor moves are table record
/// numbers. `None` means the cursor ran off either end.
pub trait Index {
    /// Tag name.
    fn name(&self) -> &str;

    fn definition(&self) -> &KeyDefinition;

    /// Key of the record the table layer last read.
    fn active_key(&self) -> Option<&NodeKey>;

    fn set_active_key(&mut self, key: Option<NodeKey>);

    /// Whether the last lookup landed on an entry equal to the search key.
    fn found_exact(&self) -> bool;

    /// Whether a root page exists.
    fn has_tree(&self) -> bool;

    /// Insert `(key, record)`. Inserting a pair that is already present
    /// does nothing.
    fn add_entry(&mut self, key: &NodeKey, record: u32) -> Result<(), IndexError>;

    /// Park on the first entry `>= key` and return its record.
    fn find_entry(&mut self, key: &NodeKey) -> Result<Option<u32>, IndexError>;

    /// Park on the entry `(key, record)` if it exists.
    fn find_entry_for(&mut self, key: &NodeKey, record: u32) -> Result<Option<u32>, IndexError>;

    fn get_next_key(&mut self) -> Result<Option<u32>, IndexError>;

    fn get_prev_key(&mut self) -> Result<Option<u32>, IndexError>;

    /// Key of the entry under the cursor.
    fn current_key(&self) -> Option<&NodeKey>;

    /// Remove the entry under the cursor and return its record.
    fn del_entry(&mut self) -> Result<u32, IndexError>;

    /// Park the cursor next to the entries equal to `key`.
    fn seek(&mut self, key: &NodeKey, park: Park) -> Result<(), IndexError>;

    /// Discard the tree and rebuild it from every record of `table`.
    fn reindex(&mut self, table: &mut dyn Table) -> Result<(), IndexError>;

    /// Build this tag's key from the current record's fields.
    fn build_key(&self, fields: &dyn FieldSource) -> Result<NodeKey, IndexError> {
        self.definition().build_key(fields)
    }

    /// Fail with `DuplicateKey` if adding `key` would break uniqueness.
    ///
    /// Tags that are not unique, and tags without a tree, always pass.
    fn check_for_duplicates(&mut self, key: &NodeKey, check: DuplicateCheck) -> Result<(), IndexError> {
        if !self.definition().is_unique() || !self.has_tree() {
            return Ok(());
        }
        let mut found = self.find_entry(key)?;
        if !self.found_exact() {
            return Ok(());
        }
        // Stored keys are cut to the tag's width, so compare against the first match.
        let Some(matched) = self.current_key().cloned() else {
            return Ok(());
        };
        while let Some(record) = found {
            let equal = match self.current_key() {
                Some(current) => current.compare(&matched, KeyComparison::Lenient)? == Ordering::Equal,
                None => false,
            };
            if !equal {
                break;
            }
            let duplicate = match check {
                DuplicateCheck::NewRecord => true,
                DuplicateCheck::Record(own) => record != own,
            };
            if duplicate {
                return Err(IndexError::DuplicateKey {
                    tag: self.name().to_string(),
                    key: key.clone(),
                    record,
                });
            }
            found = self.get_next_key()?;
        }
        Ok(())
    }

    /// Index a record that has just been written.
    fn add_record(&mut self, record: u32, fields: &dyn FieldSource) -> Result<(), IndexError> {
        let key = self.build_key(fields)?;
        self.check_for_duplicates(&key, DuplicateCheck::Record(record))?;
        self.add_entry(&key, record)?;
        self.set_active_key(Some(key));
        Ok(())
    }

    /// Move `record`'s entry to the key its fields now produce.
    ///
    /// The old entry is found through the active key. Unchanged keys are
    /// left alone; a record without an old entry is simply inserted.
    fn update(&mut self, record: u32, fields: &dyn FieldSource) -> Result<(), IndexError> {
        let key = self.build_key(fields)?;
        self.check_for_duplicates(&key, DuplicateCheck::Record(record))?;

        if let Some(old) = self.active_key().cloned()
            && self.find_entry_for(&old, record)?.is_some()
        {
            if self.current_key() == Some(&key) {
                self.set_active_key(Some(key));
                return Ok(());
            }
            self.del_entry()?;
        }
        self.add_entry(&key, record)?;
        self.set_active_key(Some(key));
        Ok(())
    }

    /// Park before the first entry.
    fn position_at_first(&mut self) -> Result<(), IndexError> {
        let key = self.definition().key_type().min_key();
        self.seek(&key, Park::Before)
    }

    /// Park after the last entry.
    fn position_at_last(&mut self) -> Result<(), IndexError> {
        let key = self.definition().key_type().max_key();
        self.seek(&key, Park::After)
    }
}

/// Errors raised by index operations.
#[derive(Debug)]
pub enum IndexError {
    Storage(StorageError),
    Node(NodeError),
    Key(KeyError),
    /// The page graph or a header is inconsistent.
    Corruption(String),
    /// A unique tag already holds `key` for another record.
    DuplicateKey {
        tag: String,
        key: NodeKey,
        record: u32,
    },
    TagNotFound(String),
    MaxTagsReached,
    TagNameInUse(String),
    InvalidTagName(String),
    InvalidKeyExpression(String),
    UnknownField(String),
    InvalidFieldValue {
        field: String,
        value: String,
    },
    /// `del_entry` without an entry under the cursor.
    NoCurrentEntry,
    /// Reported by the table while walking records.
    Table(String),
    InvalidHeader(String),
}

impl IndexError {
    /// Whether this is a uniqueness violation rather than a failure.
    #[must_use]
    pub const fn is_duplicate_key(&self) -> bool {
        matches!(self, Self::DuplicateKey { .. })
    }

    /// Whether a tag lookup simply found nothing.
    #[must_use]
    pub const fn is_tag_not_found(&self) -> bool {
        matches!(self, Self::TagNotFound(_))
    }
}

impl std::fmt::Display for IndexError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Storage(e) => write!(f, "storage error: {e}"),
            Self::Node(e) => write!(f, "index page error: {e}"),
            Self::Key(e) => write!(f, "key error: {e}"),
            Self::Corruption(msg) => write!(f, "index corruption: {msg}"),
            Self::DuplicateKey { tag, key, record } => {
                write!(f, "duplicate key {key} in unique tag {tag} (record {record})")
            }
            Self::TagNotFound(name) => write!(f, "tag not found: {name}"),
            Self::MaxTagsReached => write!(f, "maximum number of tags reached"),
            Self::TagNameInUse(name) => write!(f, "tag name already in use: {name}"),
            Self::InvalidTagName(name) => write!(f, "invalid tag name: {name:?}"),
            Self::InvalidKeyExpression(expr) => write!(f, "invalid key expression: {expr}"),
            Self::UnknownField(name) => write!(f, "unknown field: {name}"),
            Self::InvalidFieldValue { field, value } => {
                write!(f, "field {field} has no numeric value: {value:?}")
            }
            Self::NoCurrentEntry => write!(f, "no entry under the cursor"),
            Self::Table(msg) => write!(f, "table error: {msg}"),
            Self::InvalidHeader(msg) => write!(f, "invalid index header: {msg}"),
        }
    }
}

impl std::error::Error for IndexError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Storage(e) => Some(e),
            Self::Node(e) => Some(e),
            Self::Key(e) => Some(e),
            _ => None,
        }
    }
}

impl From<StorageError> for IndexError {
    fn from(e: StorageError) -> Self {
        Self::Storage(e)
    }
}

impl From<NodeError> for IndexError {
    fn from(e: NodeError) -> Self {
        Self::Node(e)
    }
}

impl From<KeyError> for IndexError {
    fn from(e: KeyError) -> Self {
        Self::Key(e)
    }
}
