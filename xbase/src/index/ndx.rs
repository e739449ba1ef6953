//! Single-tag NDX index files.
//!
//! ```text
//! page 0   header
//!   0      root page          u32
//!   4      next available     u32
//!   12     key length         u16
//!   14     keys per page      u16
//!   16     key type           u16 (0 character, 1 numeric or date)
//!   18     entry size         u16
//!   23     unique flag        u8
//!   24     key expression     100 bytes
//! page 1.. tree pages
//! ```

#![allow(clippy::cast_possible_truncation)]

use tracing::{debug, info, warn};

use crate::config::IndexConfig;
use crate::index::definition::{KeyDefinition, KeyType, MAX_EXPRESSION_LENGTH};
use crate::index::field::{FieldSource, Table};
use crate::index::key::NodeKey;
use crate::index::node::{KeyGeometry, NodeFormat};
use crate::index::tree::TagState;
use crate::index::{Index, IndexError, Park};
use crate::storage::{ByteStore, IndexFile, Page, PageId};

mod offsets {
    pub const ROOT: usize = 0;
    pub const NEXT_AVAILABLE: usize = 4;
    pub const KEY_LENGTH: usize = 12;
    pub const KEYS_PER_NODE: usize = 14;
    pub const KEY_TYPE: usize = 16;
    pub const ENTRY_SIZE: usize = 18;
    pub const UNIQUE: usize = 23;
    pub const EXPRESSION: usize = 24;
}

const CHARACTER_TYPE: u16 = 0;
const NUMERIC_TYPE: u16 = 1;

/// First page after the header.
const FIRST_TREE_PAGE: PageId = 1;

#[derive(Debug, Clone, PartialEq, Eq)]
struct NdxHeader {
    root: PageId,
    next_available: PageId,
    key_length: u16,
    keys_per_node: u16,
    key_type: u16,
    entry_size: u16,
    unique: bool,
    expression: String,
}

impl NdxHeader {
    fn read(page: &Page) -> Self {
        use offsets as o;
        Self {
            root: page.read_u32(o::ROOT),
            next_available: page.read_u32(o::NEXT_AVAILABLE),
            key_length: page.read_u16(o::KEY_LENGTH),
            keys_per_node: page.read_u16(o::KEYS_PER_NODE),
            key_type: page.read_u16(o::KEY_TYPE),
            entry_size: page.read_u16(o::ENTRY_SIZE),
            unique: page.read_u8(o::UNIQUE) != 0,
            expression: page.read_str(o::EXPRESSION, MAX_EXPRESSION_LENGTH),
        }
    }

    fn write(&self) -> Page {
        use offsets as o;
        let mut page = Page::new();
        page.write_u32(o::ROOT, self.root);
        page.write_u32(o::NEXT_AVAILABLE, self.next_available);
        page.write_u16(o::KEY_LENGTH, self.key_length);
        page.write_u16(o::KEYS_PER_NODE, self.keys_per_node);
        page.write_u16(o::KEY_TYPE, self.key_type);
        page.write_u16(o::ENTRY_SIZE, self.entry_size);
        page.write_u8(o::UNIQUE, u8::from(self.unique));
        page.write_str(o::EXPRESSION, MAX_EXPRESSION_LENGTH, &self.expression);
        page
    }

    /// Decode the key definition and check the header against it.
    fn definition(&self) -> Result<KeyDefinition, IndexError> {
        let key_type = match self.key_type {
            CHARACTER_TYPE => KeyType::Character,
            NUMERIC_TYPE => KeyType::Numeric,
            other => {
                return Err(IndexError::InvalidHeader(format!("unknown NDX key type {other}")));
            }
        };
        let definition =
            KeyDefinition::from_stored(&self.expression, key_type, self.key_length, self.unique)?;
        let geometry = KeyGeometry::new(NodeFormat::Ndx, key_type, self.key_length);
        if usize::from(self.keys_per_node) != geometry.keys_per_node()
            || usize::from(self.entry_size) != geometry.entry_size()
        {
            return Err(IndexError::InvalidHeader(format!(
                "NDX geometry {} x {} does not match key length {}",
                self.keys_per_node, self.entry_size, self.key_length
            )));
        }
        if self.root < FIRST_TREE_PAGE || self.root >= self.next_available {
            return Err(IndexError::InvalidHeader(format!(
                "root page {} outside 1..{}",
                self.root, self.next_available
            )));
        }
        Ok(definition)
    }
}

/// An open NDX file: one tag over one table.
#[derive(Debug)]
pub struct Ndx<S: ByteStore> {
    file: IndexFile<S>,
    state: TagState,
    /// Root and page counter as last written to the header.
    persisted: (PageId, PageId),
}

impl<S: ByteStore> Ndx<S> {
    /// Start a new index in `store`, discarding whatever it held.
    pub fn create(
        mut store: S,
        name: &str,
        expression: &str,
        unique: bool,
        fields: &dyn FieldSource,
        config: IndexConfig,
    ) -> Result<Self, IndexError> {
        let definition = KeyDefinition::from_fields(expression, fields, NodeFormat::Ndx, unique)?;
        store.truncate(0)?;
        let mut ndx = Self {
            file: IndexFile::new(store, FIRST_TREE_PAGE, config.sync_on_flush),
            state: TagState::new(name, definition, NodeFormat::Ndx, config.key_comparison, 0),
            persisted: (0, 0),
        };
        ndx.state.create_root(&mut ndx.file)?;
        ndx.write_header()?;
        info!(
            index = name,
            expression = ndx.state.definition().expression(),
            key_type = %ndx.state.definition().key_type(),
            "created NDX index"
        );
        Ok(ndx)
    }

    /// Open an existing index.
    pub fn open(store: S, name: &str, config: IndexConfig) -> Result<Self, IndexError> {
        Self::open_store(store, name, config).inspect_err(|e| {
            warn!(index = name, error = %e, "failed to open NDX index");
        })
    }

    fn open_store(store: S, name: &str, config: IndexConfig) -> Result<Self, IndexError> {
        let mut file = IndexFile::new(store, FIRST_TREE_PAGE, config.sync_on_flush);
        let header = NdxHeader::read(&file.read_page(0)?);
        let definition = header.definition()?;
        file.set_next_page(header.next_available);
        debug!(index = name, root = header.root, "opened NDX index");
        Ok(Self {
            file,
            state: TagState::new(name, definition, NodeFormat::Ndx, config.key_comparison, header.root),
            persisted: (header.root, header.next_available),
        })
    }

    /// Sync and hand back the store.
    pub fn close(mut self) -> Result<S, IndexError> {
        self.write_header_if_changed()?;
        self.file.sync()?;
        Ok(self.file.into_store())
    }

    /// Number of entries in the tree.
    pub fn entry_count(&mut self) -> Result<usize, IndexError> {
        self.state.entry_count(&mut self.file)
    }

    /// Current root page.
    #[must_use]
    pub const fn root(&self) -> PageId {
        self.state.root()
    }

    fn write_header(&mut self) -> Result<(), IndexError> {
        let definition = self.state.definition();
        let geometry = self.state.geometry();
        let header = NdxHeader {
            root: self.state.root(),
            next_available: self.file.next_page(),
            key_length: definition.key_length(),
            keys_per_node: geometry.keys_per_node() as u16,
            key_type: match definition.key_type() {
                KeyType::Character => CHARACTER_TYPE,
                KeyType::Numeric | KeyType::Date | KeyType::Float => NUMERIC_TYPE,
            },
            entry_size: geometry.entry_size() as u16,
            unique: definition.is_unique(),
            expression: definition.expression().to_string(),
        };
        self.file.write_page(0, &header.write())?;
        self.file.flush()?;
        self.persisted = (header.root, header.next_available);
        Ok(())
    }

    fn write_header_if_changed(&mut self) -> Result<(), IndexError> {
        if self.persisted != (self.state.root(), self.file.next_page()) {
            self.write_header()?;
        }
        Ok(())
    }
}

impl<S: ByteStore> Index for Ndx<S> {
    fn name(&self) -> &str {
        self.state.name()
    }

    fn definition(&self) -> &KeyDefinition {
        self.state.definition()
    }

    fn active_key(&self) -> Option<&NodeKey> {
        self.state.active_key()
    }

    fn set_active_key(&mut self, key: Option<NodeKey>) {
        self.state.set_active_key(key);
    }

    fn found_exact(&self) -> bool {
        self.state.found_exact()
    }

    fn has_tree(&self) -> bool {
        self.state.has_tree()
    }

    fn add_entry(&mut self, key: &NodeKey, record: u32) -> Result<(), IndexError> {
        self.state.add_entry(&mut self.file, key, record)?;
        self.write_header_if_changed()
    }

    fn find_entry(&mut self, key: &NodeKey) -> Result<Option<u32>, IndexError> {
        self.state.find_entry(&mut self.file, key)
    }

    fn find_entry_for(&mut self, key: &NodeKey, record: u32) -> Result<Option<u32>, IndexError> {
        self.state.find_entry_for(&mut self.file, key, record)
    }

    fn get_next_key(&mut self) -> Result<Option<u32>, IndexError> {
        self.state.get_next_key(&mut self.file)
    }

    fn get_prev_key(&mut self) -> Result<Option<u32>, IndexError> {
        self.state.get_prev_key(&mut self.file)
    }

    fn current_key(&self) -> Option<&NodeKey> {
        self.state.current_key()
    }

    fn del_entry(&mut self) -> Result<u32, IndexError> {
        self.state.del_entry(&mut self.file)
    }

    fn seek(&mut self, key: &NodeKey, park: Park) -> Result<(), IndexError> {
        self.state.seek(&mut self.file, key, park)
    }

    fn reindex(&mut self, table: &mut dyn Table) -> Result<(), IndexError> {
        self.file.recreate()?;
        self.file.set_next_page(FIRST_TREE_PAGE);
        self.state.create_root(&mut self.file)?;
        self.write_header()?;
        let entries = self.state.populate(&mut self.file, table)?;
        self.write_header_if_changed()?;
        info!(index = self.state.name(), entries, "rebuilt NDX index");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::field::FieldType;
    use crate::storage::{FaultConfig, FileStore, MemoryStore};
    use crate::testing::MemoryTable;
    use tempfile::tempdir;

    fn table() -> MemoryTable {
        MemoryTable::new("STOCK")
            .with_field("CODE", FieldType::Character, 6)
            .with_field("QTY", FieldType::Numeric, 5)
    }

    #[test]
    fn test_create_writes_header() {
        let table = table();
        let ndx = Ndx::create(MemoryStore::new(), "CODE", "code", false, &table, IndexConfig::default())
            .expect("create");
        assert_eq!(ndx.root(), 1);

        let store = ndx.close().expect("close");
        let mut page = Page::new();
        page.as_bytes_mut().copy_from_slice(&store.as_bytes()[..512]);
        let header = NdxHeader::read(&page);
        assert_eq!(header.root, 1);
        assert_eq!(header.next_available, 2);
        assert_eq!(header.key_length, 6);
        assert_eq!(header.key_type, CHARACTER_TYPE);
        assert_eq!(header.keys_per_node, 30);
        assert_eq!(header.entry_size, 16);
        assert_eq!(header.expression, "code");
        assert_eq!(store.as_bytes().len(), 1024);
    }

    #[test]
    fn test_numeric_key_from_numeric_field() {
        let table = table();
        let ndx = Ndx::create(MemoryStore::new(), "QTY", "QTY", true, &table, IndexConfig::default())
            .expect("create");
        assert_eq!(ndx.definition().key_type(), KeyType::Numeric);
        assert_eq!(ndx.definition().key_length(), 8);
        assert!(ndx.definition().is_unique());
    }

    #[test]
    fn test_reopen_after_growth() {
        let dir = tempdir().expect("create temp dir");
        let path = dir.path().join("qty.ndx");
        let table = table();

        let root = {
            let store = FileStore::create(&path).expect("create store");
            let mut ndx =
                Ndx::create(store, "QTY", "QTY", false, &table, IndexConfig::default()).expect("create");
            for record in 1..=500u32 {
                let value = f64::from((record * 37) % 500);
                ndx.add_entry(&NodeKey::Numeric(value), record).expect("add");
            }
            let root = ndx.root();
            assert_ne!(root, 1);
            ndx.close().expect("close");
            root
        };

        let store = FileStore::open(&path).expect("open store");
        let mut ndx = Ndx::open(store, "QTY", IndexConfig::default()).expect("open");
        assert_eq!(ndx.root(), root);
        assert_eq!(ndx.entry_count().expect("count"), 500);

        ndx.position_at_first().expect("first");
        let mut previous = f64::MIN;
        while ndx.get_next_key().expect("next").is_some() {
            let Some(NodeKey::Numeric(value)) = ndx.current_key() else {
                panic!("expected a numeric key");
            };
            assert!(*value >= previous);
            previous = *value;
        }
    }

    #[test]
    fn test_open_rejects_bad_header() {
        let mut store = MemoryStore::new();
        let mut page = Page::new();
        page.write_u32(offsets::ROOT, 1);
        page.write_u32(offsets::NEXT_AVAILABLE, 2);
        page.write_u16(offsets::KEY_LENGTH, 6);
        page.write_u16(offsets::KEY_TYPE, 7);
        page.write_str(offsets::EXPRESSION, MAX_EXPRESSION_LENGTH, "CODE");
        store.write_at(0, page.as_bytes()).expect("write");

        let result = Ndx::open(store, "CODE", IndexConfig::default());
        assert!(matches!(result, Err(IndexError::InvalidHeader(_))));
    }

    #[test]
    fn test_open_empty_store_fails() {
        let result = Ndx::open(MemoryStore::new(), "CODE", IndexConfig::default());
        assert!(matches!(result, Err(IndexError::Storage(_))));
    }

    #[test]
    fn test_reindex_rebuilds_from_table() {
        let mut table = table();
        let mut ndx =
            Ndx::create(MemoryStore::new(), "CODE", "CODE", false, &table, IndexConfig::default())
                .expect("create");
        for code in ["PEAR", "APPLE", "FIG"] {
            let record = table.append(&[("CODE", Some(code)), ("QTY", Some("1"))]);
            ndx.add_record(record, &table).expect("add");
        }
        ndx.add_entry(&NodeKey::text("STALE"), 99).expect("add");

        ndx.reindex(&mut table).expect("reindex");
        assert_eq!(ndx.entry_count().expect("count"), 3);
        assert_eq!(ndx.find_entry(&NodeKey::text("STALE")).expect("find"), None);
        ndx.position_at_first().expect("first");
        assert_eq!(ndx.get_next_key().expect("next"), Some(2));
        assert_eq!(ndx.get_next_key().expect("next"), Some(3));
        assert_eq!(ndx.get_next_key().expect("next"), Some(1));
    }

    #[test]
    fn test_write_failure_propagates() {
        let table = table();
        let mut ndx =
            Ndx::create(MemoryStore::new(), "CODE", "CODE", false, &table, IndexConfig::default())
                .expect("create");
        ndx.file.store_mut().set_faults(FaultConfig {
            fail_writes_after: Some(0),
            fail_reads: false,
        });
        let result = ndx.add_entry(&NodeKey::text("A"), 1);
        assert!(matches!(
            result,
            Err(IndexError::Storage(crate::storage::StorageError::InjectedFault(_)))
        ));
    }
}
