//! Multi-tag MDX index files.
//!
//! An `MdxFile` owns the anchor, the tag table and one `TagState` per tag.
//! Tags are numbered from 1 in creation order; tag `n` is described at
//! `512 + n * 32` and the descriptors form a doubly linked chain through
//! their forward and backward tag bytes. Callers reach a tag through the
//! `MdxIndex` handle returned by `mdx` or `create_tag`.

#![allow(clippy::cast_possible_truncation)]

use tracing::{debug, info, warn};

use crate::config::IndexConfig;
use crate::index::definition::KeyDefinition;
use crate::index::field::{FieldSource, Table};
use crate::index::key::NodeKey;
use crate::index::node::NodeFormat;
use crate::index::tag::{
    MAX_TAGS, MdxAnchor, TAG_NAME_LENGTH, TAG_TABLE_PAGES, TagDescriptor, TagHeader,
    descriptor_offset,
};
use crate::index::tree::TagState;
use crate::index::{Index, IndexError, Park};
use crate::storage::{ByteStore, IndexFile, PAGE_SIZE, Page, PageId};

#[derive(Debug)]
struct MdxTag {
    descriptor: TagDescriptor,
    header: TagHeader,
    state: TagState,
}

/// Chain number of the tag at `slot`.
const fn tag_number(slot: usize) -> u8 {
    (slot + 1) as u8
}

/// An open MDX file.
#[derive(Debug)]
pub struct MdxFile<S: ByteStore> {
    file: IndexFile<S>,
    anchor: MdxAnchor,
    tags: Vec<MdxTag>,
    config: IndexConfig,
}

impl<S: ByteStore> MdxFile<S> {
    /// Start a new file for `table_name` in `store`, discarding whatever
    /// it held.
    pub fn create(mut store: S, table_name: &str, config: IndexConfig) -> Result<Self, IndexError> {
        store.truncate(0)?;
        let mut mdx = Self {
            file: IndexFile::new(store, TAG_TABLE_PAGES, config.sync_on_flush),
            anchor: MdxAnchor::new(table_name),
            tags: Vec::new(),
            config,
        };
        mdx.write_tag_table()?;
        mdx.write_anchor()?;
        mdx.file.flush()?;
        info!(table = table_name, "created MDX file");
        Ok(mdx)
    }

    /// Open an existing file and load every tag it describes.
    pub fn open(store: S, config: IndexConfig) -> Result<Self, IndexError> {
        Self::open_store(store, config).inspect_err(|e| {
            warn!(error = %e, "failed to open MDX file");
        })
    }

    fn open_store(store: S, config: IndexConfig) -> Result<Self, IndexError> {
        let mut file = IndexFile::new(store, TAG_TABLE_PAGES, config.sync_on_flush);
        let anchor = MdxAnchor::read(&file.read_page(0)?)?;
        file.set_next_page(anchor.next_available);
        if anchor.free_list != 0
            && !(TAG_TABLE_PAGES..anchor.next_available).contains(&anchor.free_list)
        {
            return Err(IndexError::InvalidHeader(format!(
                "free list starts at page {}",
                anchor.free_list
            )));
        }
        file.set_free_list(anchor.free_list);

        let mut table_pages = Vec::with_capacity(TAG_TABLE_PAGES as usize - 1);
        for page_id in 1..TAG_TABLE_PAGES {
            table_pages.push(file.read_page(page_id)?);
        }

        let in_range = |page: PageId| (TAG_TABLE_PAGES..anchor.next_available).contains(&page);
        let mut tags = Vec::with_capacity(usize::from(anchor.tags_in_use));
        for slot in 0..usize::from(anchor.tags_in_use) {
            let offset = descriptor_offset(slot + 1);
            let descriptor =
                TagDescriptor::read(&table_pages[offset / PAGE_SIZE - 1], offset % PAGE_SIZE)?;
            if !in_range(descriptor.header_page) {
                return Err(IndexError::InvalidHeader(format!(
                    "tag {} has its header at page {}",
                    descriptor.name, descriptor.header_page
                )));
            }
            let header = TagHeader::read(&file.read_page(descriptor.header_page)?)?;
            if !in_range(header.root) {
                return Err(IndexError::InvalidHeader(format!(
                    "tag {} has its root at page {}",
                    descriptor.name, header.root
                )));
            }
            let state = TagState::new(
                &descriptor.name,
                header.definition()?,
                NodeFormat::Mdx,
                config.key_comparison,
                header.root,
            );
            tags.push(MdxTag {
                descriptor,
                header,
                state,
            });
        }

        debug!(table = %anchor.table_name, tags = tags.len(), "opened MDX file");
        Ok(Self {
            file,
            anchor,
            tags,
            config,
        })
    }

    /// Sync and hand back the store.
    pub fn close(mut self) -> Result<S, IndexError> {
        self.file.sync()?;
        Ok(self.file.into_store())
    }

    #[must_use]
    pub fn table_name(&self) -> &str {
        &self.anchor.table_name
    }

    #[must_use]
    pub const fn anchor(&self) -> &MdxAnchor {
        &self.anchor
    }

    /// Number of tags in the file.
    #[must_use]
    pub fn tag_count(&self) -> usize {
        self.tags.len()
    }

    fn position(&self, name: &str) -> Option<usize> {
        let name = name.trim();
        self.tags
            .iter()
            .position(|tag| tag.state.name().eq_ignore_ascii_case(name))
    }

    fn slot(&self, name: &str) -> Result<usize, IndexError> {
        self.position(name)
            .ok_or_else(|| IndexError::TagNotFound(name.to_string()))
    }

    /// The index handle for tag `name` (any letter case).
    pub fn mdx(&mut self, name: &str) -> Result<MdxIndex<'_, S>, IndexError> {
        let slot = self.slot(name)?;
        Ok(MdxIndex { mdx: self, slot })
    }

    /// The tag table entry for `name` (any letter case).
    pub fn tag_descriptor(&self, name: &str) -> Result<&TagDescriptor, IndexError> {
        let slot = self.slot(name)?;
        Ok(&self.tags[slot].descriptor)
    }

    /// Whether a tag called `name` exists.
    #[must_use]
    pub fn has_tag(&self, name: &str) -> bool {
        match self.tag_descriptor(name) {
            Ok(_) => true,
            Err(e) if e.is_tag_not_found() => false,
            Err(e) => {
                warn!(tag = name, error = %e, "tag lookup failed");
                false
            }
        }
    }

    /// Tag names in chain order.
    pub fn tag_names(&self) -> Result<Vec<String>, IndexError> {
        let mut names = Vec::with_capacity(self.tags.len());
        let mut next = if self.tags.is_empty() { 0 } else { 1 };
        while next != 0 {
            let tag = usize::from(next)
                .checked_sub(1)
                .and_then(|slot| self.tags.get(slot))
                .ok_or_else(|| IndexError::Corruption(format!("tag chain points at tag {next}")))?;
            if names.len() == self.tags.len() {
                return Err(IndexError::Corruption("tag chain has a cycle".to_string()));
            }
            names.push(tag.descriptor.name.clone());
            next = tag.descriptor.forward_tag;
        }
        Ok(names)
    }

    /// Add a tag keyed on `expression` over the fields of `fields`.
    pub fn create_tag(
        &mut self,
        name: &str,
        expression: &str,
        unique: bool,
        fields: &dyn FieldSource,
    ) -> Result<MdxIndex<'_, S>, IndexError> {
        let name = tag_name(name)?;
        if self.tags.len() >= MAX_TAGS {
            return Err(IndexError::MaxTagsReached);
        }
        if self.position(&name).is_some() {
            return Err(IndexError::TagNameInUse(name));
        }
        let definition = KeyDefinition::from_fields(expression, fields, NodeFormat::Mdx, unique)?;

        let slot = self.push_tag(&name, definition)?;
        self.write_tag_table()?;
        self.write_anchor()?;
        self.file.flush()?;
        info!(
            tag = %name,
            expression,
            key_type = %self.tags[slot].state.definition().key_type(),
            unique,
            "created MDX tag"
        );
        Ok(MdxIndex { mdx: self, slot })
    }

    /// Allocate a header page and an empty root for a new tag and link it
    /// at the end of the chain. Writes the header page only.
    fn push_tag(&mut self, name: &str, definition: KeyDefinition) -> Result<usize, IndexError> {
        let header_page = self.file.allocate_page()?;
        let mut state = TagState::new(name, definition, NodeFormat::Mdx, self.config.key_comparison, 0);
        let root = state.create_root(&mut self.file)?;
        let header = TagHeader::new(state.definition(), state.geometry(), root);
        self.file.write_page(header_page, &header.write())?;

        let descriptor = TagDescriptor::new(name, header_page, state.definition());
        self.tags.push(MdxTag {
            descriptor,
            header,
            state,
        });
        let slot = self.tags.len() - 1;
        self.link_tag(slot);
        self.anchor.tags_in_use = self.tags.len() as u16;
        self.anchor.next_available = self.file.next_page();
        self.anchor.free_list = self.file.free_list();
        // The new header already counts its root.
        self.file.take_usage();
        Ok(slot)
    }

    /// Append the tag at `slot` to the end of the chain.
    fn link_tag(&mut self, slot: usize) {
        let Some(tail) = slot.checked_sub(1) else {
            return;
        };
        self.tags[tail].descriptor.forward_tag = tag_number(slot);
        self.tags[slot].descriptor.backward_tag = tag_number(tail);
        debug!(
            tag = self.tags[slot].state.name(),
            after = self.tags[tail].state.name(),
            "linked tag"
        );
    }

    fn write_anchor(&mut self) -> Result<(), IndexError> {
        self.anchor.touch();
        self.file.write_page(0, &self.anchor.write())?;
        Ok(())
    }

    /// Write pages 1 to 3 from the in-memory descriptors.
    fn write_tag_table(&mut self) -> Result<(), IndexError> {
        for page_id in 1..TAG_TABLE_PAGES {
            let mut page = Page::new();
            for (slot, tag) in self.tags.iter().enumerate() {
                let offset = descriptor_offset(slot + 1);
                if offset / PAGE_SIZE == page_id as usize {
                    tag.descriptor.write(&mut page, offset % PAGE_SIZE);
                }
            }
            self.file.write_page(page_id, &page)?;
        }
        Ok(())
    }

    /// Bring the tag header and anchor in line with the tag's root, the
    /// pages it gained or gave up, the page counter and the free list.
    fn persist_tag(&mut self, slot: usize) -> Result<(), IndexError> {
        let usage = self.file.take_usage();
        let next_page = self.file.next_page();
        let free_list = self.file.free_list();
        let anchor_moved =
            next_page != self.anchor.next_available || free_list != self.anchor.free_list;
        let tag = &mut self.tags[slot];
        let root_moved = tag.header.root != tag.state.root();
        if !root_moved && usage == 0 && !anchor_moved {
            return Ok(());
        }
        if root_moved {
            debug!(tag = tag.state.name(), root = tag.state.root(), "tag root changed");
        }
        tag.header.root = tag.state.root();
        tag.header.pages_used = tag.header.pages_used.saturating_add_signed(usage);
        self.file.write_page(tag.descriptor.header_page, &tag.header.write())?;
        if anchor_moved {
            self.anchor.next_available = next_page;
            self.anchor.free_list = free_list;
            self.write_anchor()?;
        }
        self.file.flush()?;
        Ok(())
    }

    /// Empty the tag at `slot` in place and refill it from `table`.
    ///
    /// Pages the old tree no longer needs go to the free list, and the
    /// refill takes pages from there before growing the file.
    fn rebuild_tag(&mut self, slot: usize, table: &mut dyn Table) -> Result<usize, IndexError> {
        let rebuilt = {
            let Self { file, tags, .. } = &mut *self;
            let state = &mut tags[slot].state;
            state
                .clear(file)
                .and_then(|_| state.populate(file, table))
        };
        // Persist even after a failure so the free list on disk never
        // names pages the tree has taken back.
        self.persist_tag(slot)?;
        rebuilt
    }

    /// Recreate the whole file and rebuild every tag from `table`.
    ///
    /// Tag names, definitions and order survive. Nothing is checkpointed:
    /// a failure part way leaves a partly rebuilt file.
    pub fn reindex(&mut self, table: &mut dyn Table) -> Result<(), IndexError> {
        let table_name = self.anchor.table_name.clone();
        self.file.recreate()?;
        self.file.set_next_page(TAG_TABLE_PAGES);
        self.file.take_usage();
        self.anchor = MdxAnchor::new(&table_name);

        let previous = std::mem::take(&mut self.tags);
        for tag in previous {
            self.push_tag(&tag.descriptor.name, tag.state.definition().clone())?;
        }
        self.write_tag_table()?;
        self.write_anchor()?;

        let mut entries = 0;
        for slot in 0..self.tags.len() {
            let Self { file, tags, .. } = &mut *self;
            entries += tags[slot].state.populate(file, table)?;
            self.persist_tag(slot)?;
        }
        self.file.flush()?;
        info!(table = %table_name, tags = self.tags.len(), entries, "rebuilt MDX file");
        Ok(())
    }
}

/// Upper-case a tag name and check it fits the tag table.
fn tag_name(name: &str) -> Result<String, IndexError> {
    let upper = name.trim().to_ascii_uppercase();
    let valid = !upper.is_empty()
        && upper.len() <= TAG_NAME_LENGTH
        && upper.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(upper)
    } else {
        Err(IndexError::InvalidTagName(name.to_string()))
    }
}

/// One tag of an open `MdxFile`.
pub struct MdxIndex<'a, S: ByteStore> {
    mdx: &'a mut MdxFile<S>,
    slot: usize,
}

impl<S: ByteStore> MdxIndex<'_, S> {
    fn tag(&self) -> &MdxTag {
        &self.mdx.tags[self.slot]
    }

    fn parts(&mut self) -> (&mut IndexFile<S>, &mut TagState) {
        let MdxFile { file, tags, .. } = &mut *self.mdx;
        (file, &mut tags[self.slot].state)
    }

    #[must_use]
    pub fn descriptor(&self) -> &TagDescriptor {
        &self.tag().descriptor
    }

    #[must_use]
    pub fn header(&self) -> &TagHeader {
        &self.tag().header
    }

    /// Current root page.
    #[must_use]
    pub fn root(&self) -> PageId {
        self.tag().state.root()
    }

    /// Number of entries in the tree.
    pub fn entry_count(&mut self) -> Result<usize, IndexError> {
        let (file, state) = self.parts();
        state.entry_count(file)
    }
}

impl<S: ByteStore> Index for MdxIndex<'_, S> {
    fn name(&self) -> &str {
        self.tag().state.name()
    }

    fn definition(&self) -> &KeyDefinition {
        self.tag().state.definition()
    }

    fn active_key(&self) -> Option<&NodeKey> {
        self.tag().state.active_key()
    }

    fn set_active_key(&mut self, key: Option<NodeKey>) {
        self.parts().1.set_active_key(key);
    }

    fn found_exact(&self) -> bool {
        self.tag().state.found_exact()
    }

    fn has_tree(&self) -> bool {
        self.tag().state.has_tree()
    }

    fn add_entry(&mut self, key: &NodeKey, record: u32) -> Result<(), IndexError> {
        let (file, state) = self.parts();
        state.add_entry(file, key, record)?;
        self.mdx.persist_tag(self.slot)
    }

    fn find_entry(&mut self, key: &NodeKey) -> Result<Option<u32>, IndexError> {
        let (file, state) = self.parts();
        state.find_entry(file, key)
    }

    fn find_entry_for(&mut self, key: &NodeKey, record: u32) -> Result<Option<u32>, IndexError> {
        let (file, state) = self.parts();
        state.find_entry_for(file, key, record)
    }

    fn get_next_key(&mut self) -> Result<Option<u32>, IndexError> {
        let (file, state) = self.parts();
        state.get_next_key(file)
    }

    fn get_prev_key(&mut self) -> Result<Option<u32>, IndexError> {
        let (file, state) = self.parts();
        state.get_prev_key(file)
    }

    fn current_key(&self) -> Option<&NodeKey> {
        self.tag().state.current_key()
    }

    fn del_entry(&mut self) -> Result<u32, IndexError> {
        let (file, state) = self.parts();
        state.del_entry(file)
    }

    fn seek(&mut self, key: &NodeKey, park: Park) -> Result<(), IndexError> {
        let (file, state) = self.parts();
        state.seek(file, key, park)
    }

    fn reindex(&mut self, table: &mut dyn Table) -> Result<(), IndexError> {
        let entries = self.mdx.rebuild_tag(self.slot, table)?;
        info!(tag = self.tag().state.name(), entries, "rebuilt MDX tag");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::definition::KeyType;
    use crate::index::field::FieldType;
    use crate::storage::{FileStore, MemoryStore};
    use crate::testing::MemoryTable;
    use tempfile::tempdir;

    fn table() -> MemoryTable {
        MemoryTable::new("CUSTOMER")
            .with_field("NAME", FieldType::Character, 20)
            .with_field("CITY", FieldType::Character, 15)
            .with_field("BALANCE", FieldType::Numeric, 10)
            .with_field("JOINED", FieldType::Date, 8)
    }

    fn create() -> MdxFile<MemoryStore> {
        MdxFile::create(MemoryStore::new(), "CUSTOMER", IndexConfig::default()).expect("create")
    }

    #[test]
    fn test_create_layout() {
        let mdx = create();
        assert_eq!(mdx.tag_count(), 0);
        assert_eq!(mdx.table_name(), "CUSTOMER");
        assert_eq!(mdx.anchor().next_available, TAG_TABLE_PAGES);
        assert!(mdx.tag_names().expect("names").is_empty());

        let store = mdx.close().expect("close");
        assert_eq!(store.as_bytes().len(), 4 * PAGE_SIZE);
        assert!(store.as_bytes()[PAGE_SIZE..].iter().all(|b| *b == 0));
    }

    #[test]
    fn test_create_tag_assigns_pages() {
        let table = table();
        let mut mdx = create();
        {
            let tag = mdx.create_tag("name", "NAME", false, &table).expect("tag");
            assert_eq!(tag.name(), "NAME");
            assert_eq!(tag.descriptor().header_page, 4);
            assert_eq!(tag.root(), 5);
            assert_eq!(tag.definition().key_type(), KeyType::Character);
            assert_eq!(tag.header().keys_per_node, 17);
        }
        let tag = mdx.create_tag("BAL", "BALANCE", true, &table).expect("tag");
        assert_eq!(tag.descriptor().header_page, 6);
        assert_eq!(tag.definition().key_type(), KeyType::Float);
        assert_eq!(mdx.anchor().next_available, 8);
        assert_eq!(mdx.anchor().tags_in_use, 2);
    }

    #[test]
    fn test_tag_chain_links_in_creation_order() {
        let table = table();
        let mut mdx = create();
        for name in ["NAME", "CITY", "JOINED"] {
            mdx.create_tag(name, name, false, &table).expect("tag");
        }
        assert_eq!(mdx.tag_names().expect("names"), vec!["NAME", "CITY", "JOINED"]);

        let first = mdx.tag_descriptor("name").expect("descriptor");
        assert_eq!((first.backward_tag, first.forward_tag), (0, 2));
        let middle = mdx.tag_descriptor("City").expect("descriptor");
        assert_eq!((middle.backward_tag, middle.forward_tag), (1, 3));
        let last = mdx.tag_descriptor("JOINED").expect("descriptor");
        assert_eq!((last.backward_tag, last.forward_tag), (2, 0));
        assert_eq!(last.key_type, KeyType::Date);
    }

    #[test]
    fn test_tag_name_rules() {
        let table = table();
        let mut mdx = create();
        for bad in ["", "   ", "ELEVENCHARS", "BAD-NAME"] {
            assert!(matches!(
                mdx.create_tag(bad, "NAME", false, &table),
                Err(IndexError::InvalidTagName(_))
            ));
        }
        assert!(matches!(
            mdx.create_tag("X", "MISSING", false, &table),
            Err(IndexError::UnknownField(_))
        ));
        assert!(matches!(
            mdx.create_tag("X", "NAME+", false, &table),
            Err(IndexError::InvalidKeyExpression(_))
        ));
        assert_eq!(mdx.tag_count(), 0);
    }

    #[test]
    fn test_missing_tag() {
        let table = table();
        let mut mdx = create();
        mdx.create_tag("NAME", "NAME", false, &table).expect("tag");
        assert!(mdx.has_tag("name"));
        assert!(!mdx.has_tag("CITY"));
        let err = mdx.mdx("CITY").err().expect("missing");
        assert!(err.is_tag_not_found());
        assert!(mdx.tag_descriptor("CITY").is_err());
    }

    #[test]
    fn test_reopen_restores_tags() {
        let dir = tempdir().expect("create temp dir");
        let path = dir.path().join("customer.mdx");
        let mut table = table();

        {
            let store = FileStore::create(&path).expect("create store");
            let mut mdx = MdxFile::create(store, "CUSTOMER", IndexConfig::default()).expect("create");
            mdx.create_tag("NAME", "NAME", false, &table).expect("tag");
            mdx.create_tag("CITYNAME", "CITY+NAME", false, &table).expect("tag");
            for record in 1..=200u32 {
                let name = format!("CUSTOMER{record:04}");
                table.append(&[("NAME", Some(name.as_str())), ("CITY", Some("LISBON"))]);
                for tag in ["NAME", "CITYNAME"] {
                    mdx.mdx(tag).expect("tag").add_record(record, &table).expect("add");
                }
            }
            mdx.close().expect("close");
        }

        let store = FileStore::open(&path).expect("open store");
        let mut mdx = MdxFile::open(store, IndexConfig::default()).expect("open");
        assert_eq!(mdx.tag_names().expect("names"), vec!["NAME", "CITYNAME"]);

        let mut tag = mdx.mdx("CITYNAME").expect("tag");
        assert_eq!(tag.definition().key_length(), 35);
        assert_eq!(tag.entry_count().expect("count"), 200);
        assert_eq!(
            tag.find_entry(&NodeKey::text("LISBONCUSTOMER0150")).expect("find"),
            Some(150)
        );
        assert!(tag.found_exact());
        let root = tag.root();
        assert_eq!(tag.header().root, root);
    }

    #[test]
    fn test_open_rejects_foreign_file() {
        let mut store = MemoryStore::new();
        store.write_at(0, &[0xAB; 2048]).expect("write");
        assert!(matches!(
            MdxFile::open(store, IndexConfig::default()),
            Err(IndexError::InvalidHeader(_))
        ));
    }

    #[test]
    fn test_reindex_rebuilds_every_tag() {
        let mut table = table();
        let mut mdx = create();
        mdx.create_tag("NAME", "NAME", false, &table).expect("tag");
        mdx.create_tag("BALANCE", "BALANCE", false, &table).expect("tag");
        for (name, balance) in [("CAROL", "30"), ("ALICE", "10.5"), ("BOB", "-2")] {
            table.append(&[("NAME", Some(name)), ("BALANCE", Some(balance))]);
        }
        mdx.mdx("NAME")
            .expect("tag")
            .add_entry(&NodeKey::text("GHOST"), 9)
            .expect("add");

        mdx.reindex(&mut table).expect("reindex");
        assert_eq!(mdx.tag_names().expect("names"), vec!["NAME", "BALANCE"]);
        assert_eq!(mdx.anchor().tags_in_use, 2);

        let mut names = mdx.mdx("NAME").expect("tag");
        assert_eq!(names.entry_count().expect("count"), 3);
        names.position_at_first().expect("first");
        assert_eq!(names.get_next_key().expect("next"), Some(2));

        let mut balances = mdx.mdx("BALANCE").expect("tag");
        balances.position_at_first().expect("first");
        let order: Vec<u32> = std::iter::from_fn(|| balances.get_next_key().expect("next")).collect();
        assert_eq!(order, vec![3, 2, 1]);
    }

    #[test]
    fn test_tag_reindex_keeps_other_tags() {
        let mut table = table();
        let mut mdx = create();
        mdx.create_tag("NAME", "NAME", false, &table).expect("tag");
        mdx.create_tag("CITY", "CITY", false, &table).expect("tag");
        let record = table.append(&[("NAME", Some("DORA")), ("CITY", Some("OSLO"))]);
        mdx.mdx("CITY").expect("tag").add_record(record, &table).expect("add");

        let mut tag = mdx.mdx("NAME").expect("tag");
        let old_root = tag.root();
        tag.reindex(&mut table).expect("reindex");
        assert_eq!(tag.root(), old_root);
        assert_eq!(tag.header().root, tag.root());
        assert_eq!(tag.find_entry(&NodeKey::text("DORA")).expect("find"), Some(1));

        let mut city = mdx.mdx("CITY").expect("tag");
        assert_eq!(city.entry_count().expect("count"), 1);
    }

    #[test]
    fn test_tag_reindex_reuses_pages() {
        let mut table = table();
        let mut mdx = create();
        mdx.create_tag("NAME", "NAME", false, &table).expect("tag");
        for i in 0..30u32 {
            let name = format!("N{:02}", (i * 7) % 30);
            let record = table.append(&[("NAME", Some(name.as_str()))]);
            mdx.mdx("NAME").expect("tag").add_record(record, &table).expect("add");
        }

        let mut sizes = Vec::new();
        let mut pages_used = Vec::new();
        for _ in 0..4 {
            let mut tag = mdx.mdx("NAME").expect("tag");
            tag.reindex(&mut table).expect("reindex");
            assert_eq!(tag.entry_count().expect("count"), 30);
            pages_used.push(tag.header().pages_used);
            sizes.push(mdx.anchor().next_available);
        }
        assert!(sizes.windows(2).all(|pair| pair[0] == pair[1]), "{sizes:?}");
        assert!(pages_used.windows(2).all(|pair| pair[0] == pair[1]), "{pages_used:?}");

        // Rebuilding from no rows leaves only the root; the rest is free.
        let mut empty = self::table();
        let mut tag = mdx.mdx("NAME").expect("tag");
        tag.reindex(&mut empty).expect("reindex");
        assert_eq!(tag.entry_count().expect("count"), 0);
        assert_eq!(tag.header().pages_used, 1);
        let free_list = mdx.anchor().free_list;
        let size = mdx.anchor().next_available;
        assert_ne!(free_list, 0);

        let store = mdx.close().expect("close");
        let mut mdx = MdxFile::open(store, IndexConfig::default()).expect("open");
        assert_eq!(mdx.anchor().free_list, free_list);
        mdx.create_tag("CITY", "CITY", false, &table).expect("tag");
        assert_eq!(mdx.anchor().next_available, size);
        assert!(mdx.tag_descriptor("CITY").expect("descriptor").header_page < size);

        let record = table.append(&[("NAME", Some("X")), ("CITY", Some("OSLO"))]);
        let mut city = mdx.mdx("CITY").expect("tag");
        city.add_record(record, &table).expect("add");
        assert_eq!(city.find_entry(&NodeKey::text("OSLO")).expect("find"), Some(record));
    }
}
