//! B-tree engine shared by NDX and MDX tags.
//!
//! Every table entry lives in a leaf, ordered by `(key, record)`. A branch
//! entry `(child, record, key)` names the largest entry its child subtree
//! may hold, and the trailing pointer addresses the rightmost child, so a
//! search for `t` descends into the first child whose bound is `>= t`.
//!
//! A full page splits in two: the left half moves to a newly allocated
//! page and the right half stays where it was. Parents therefore only gain
//! an entry for the new page, and the right neighbour's `prev_page` link
//! stays correct. Deletion removes the leaf entry and never merges.

use std::cmp::Ordering;
use std::collections::VecDeque;

use tracing::debug;

use crate::index::binary_tree::BinaryTree;
use crate::index::definition::KeyDefinition;
use crate::index::field::Table;
use crate::index::key::{KeyComparison, NodeKey};
use crate::index::node::{KeyGeometry, Node, NodeEntry, NodeError, NodeFormat};
use crate::index::{IndexError, Park};
use crate::storage::{ByteStore, IndexFile, PageId};

/// Deeper paths than this mean the page graph has a cycle.
const MAX_DEPTH: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PathStep {
    page: PageId,
    /// Index of the child taken; `len` means the trailing pointer.
    child: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    /// On the entry at this index.
    At(usize),
    /// Between entries: before the entry at this index.
    Gap(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Forward,
    Backward,
}

/// A position in a tag's leaf level.
#[derive(Debug, Clone)]
pub struct Cursor {
    path: Vec<PathStep>,
    leaf: Node,
    slot: Slot,
}

impl Cursor {
    /// The entry the cursor is on, if any.
    #[must_use]
    pub fn current(&self) -> Option<&NodeEntry> {
        match self.slot {
            Slot::At(index) => self.leaf.entries.get(index),
            Slot::Gap(_) => None,
        }
    }
}

/// One tag's tree over a borrowed index file.
pub struct TagTree<'a, S: ByteStore> {
    file: &'a mut IndexFile<S>,
    geometry: KeyGeometry,
    comparison: KeyComparison,
    root: PageId,
}

impl<'a, S: ByteStore> TagTree<'a, S> {
    /// Open the tree rooted at `root`.
    pub const fn new(
        file: &'a mut IndexFile<S>,
        geometry: KeyGeometry,
        comparison: KeyComparison,
        root: PageId,
    ) -> Self {
        Self {
            file,
            geometry,
            comparison,
            root,
        }
    }

    /// Allocate and write an empty root leaf.
    pub fn create(
        file: &'a mut IndexFile<S>,
        geometry: KeyGeometry,
        comparison: KeyComparison,
    ) -> Result<Self, IndexError> {
        let root = file.allocate_page()?;
        let mut tree = Self::new(file, geometry, comparison, root);
        tree.write_node(&Node::new_leaf(root))?;
        Ok(tree)
    }

    #[must_use]
    pub const fn root(&self) -> PageId {
        self.root
    }

    fn read_node(&mut self, page_id: PageId) -> Result<Node, IndexError> {
        let page = self.file.read_page(page_id)?;
        Ok(Node::read(page_id, &page, &self.geometry)?)
    }

    fn write_node(&mut self, node: &Node) -> Result<(), IndexError> {
        let page = node.write(&self.geometry)?;
        self.file.write_page(node.page_id, &page)?;
        Ok(())
    }

    fn compare(&self, key: &NodeKey, record: u32, entry: &NodeEntry) -> Result<Ordering, IndexError> {
        Ok(key
            .compare(&entry.key, self.comparison)?
            .then(record.cmp(&entry.record)))
    }

    /// Index of the first entry `>= (key, record)`.
    fn lower_bound(&self, node: &Node, key: &NodeKey, record: u32) -> Result<usize, IndexError> {
        for (index, entry) in node.entries.iter().enumerate() {
            if self.compare(key, record, entry)? != Ordering::Greater {
                return Ok(index);
            }
        }
        Ok(node.len())
    }

    fn push_step(path: &mut Vec<PathStep>, step: PathStep) -> Result<(), IndexError> {
        if path.len() >= MAX_DEPTH {
            return Err(IndexError::Corruption(format!(
                "index tree deeper than {MAX_DEPTH} levels at page {}",
                step.page
            )));
        }
        path.push(step);
        Ok(())
    }

    fn descend(&mut self, key: &NodeKey, record: u32) -> Result<(Vec<PathStep>, Node), IndexError> {
        let mut path = Vec::new();
        let mut node = self.read_node(self.root)?;
        while node.is_branch() {
            let child = self.lower_bound(&node, key, record)?;
            Self::push_step(
                &mut path,
                PathStep {
                    page: node.page_id,
                    child,
                },
            )?;
            node = self.read_node(node.child(child))?;
        }
        Ok((path, node))
    }

    /// Walk from `page` down the leftmost or rightmost edge to a leaf.
    fn edge(
        &mut self,
        page: PageId,
        path: &mut Vec<PathStep>,
        direction: Direction,
    ) -> Result<Node, IndexError> {
        let mut node = self.read_node(page)?;
        while node.is_branch() {
            let child = match direction {
                Direction::Forward => 0,
                Direction::Backward => node.len(),
            };
            Self::push_step(
                path,
                PathStep {
                    page: node.page_id,
                    child,
                },
            )?;
            node = self.read_node(node.child(child))?;
        }
        Ok(node)
    }

    /// Add `(key, record)`. Returns `false` when the pair is already present.
    pub fn insert(&mut self, key: &NodeKey, record: u32) -> Result<bool, IndexError> {
        if key.kind() != self.geometry.kind() {
            return Err(NodeError::KeyKindMismatch {
                page: self.root,
                expected: self.geometry.kind(),
                found: key.kind(),
            }
            .into());
        }
        if let NodeKey::Numeric(value) = key
            && !value.is_finite()
        {
            return Err(NodeError::NonFiniteKey {
                page: self.root,
                value: *value,
            }
            .into());
        }
        let key = self.geometry.fit(key);
        let (mut path, mut leaf) = self.descend(&key, record)?;
        let pos = self.lower_bound(&leaf, &key, record)?;
        if record == 0 {
            return Err(NodeError::ZeroPointers {
                page: leaf.page_id,
                slot: pos,
            }
            .into());
        }
        let present = match leaf.entries.get(pos) {
            Some(existing) => self.compare(&key, record, existing)? == Ordering::Equal,
            None => false,
        };
        if present {
            return Ok(false);
        }
        leaf.entries.insert(pos, NodeEntry::leaf(key, record));

        let mut node = leaf;
        loop {
            if node.len() <= self.geometry.keys_per_node() {
                self.write_node(&node)?;
                return Ok(true);
            }

            let (left, separator) = self.split(&mut node)?;
            self.write_node(&left)?;
            self.write_node(&node)?;
            debug!(left = left.page_id, right = node.page_id, "split index page");

            match path.pop() {
                Some(step) => {
                    let mut parent = self.read_node(step.page)?;
                    parent.entries.insert(step.child, separator);
                    node = parent;
                }
                None => {
                    let root = self.file.allocate_page()?;
                    self.write_node(&Node::new_branch(root, vec![separator], node.page_id))?;
                    debug!(old_root = node.page_id, new_root = root, "grew index root");
                    self.root = root;
                    return Ok(true);
                }
            }
        }
    }

    /// Move the left half of an overfull node to a new page.
    ///
    /// Returns the new left node and the parent entry that points at it.
    fn split(&mut self, node: &mut Node) -> Result<(Node, NodeEntry), IndexError> {
        let left_page = self.file.allocate_page()?;
        let mid = node.len() / 2;
        let right_entries = node.entries.split_off(mid);
        let left_entries = std::mem::replace(&mut node.entries, right_entries);

        if node.is_branch() {
            if node.entries.len() < 2 {
                return Err(IndexError::Corruption(format!(
                    "branch page {} too small to split",
                    node.page_id
                )));
            }
            let middle = node.entries.remove(0);
            let left = Node::new_branch(left_page, left_entries, middle.lower);
            let separator = NodeEntry {
                lower: left_page,
                ..middle
            };
            return Ok((left, separator));
        }

        let last = left_entries.last().ok_or_else(|| {
            IndexError::Corruption(format!("leaf page {} too small to split", node.page_id))
        })?;
        let separator = NodeEntry {
            lower: left_page,
            record: last.record,
            key: last.key.clone(),
        };
        let mut left = Node::new_leaf(left_page);
        left.entries = left_entries;
        if self.geometry.format() == NodeFormat::Mdx {
            left.prev_page = node.prev_page;
            node.prev_page = left_page;
        }
        Ok((left, separator))
    }

    /// A cursor in the gap before the first entry `>= (key, record)`.
    pub fn seek(&mut self, key: &NodeKey, record: u32) -> Result<Cursor, IndexError> {
        let key = self.geometry.fit(key);
        let (path, leaf) = self.descend(&key, record)?;
        let pos = self.lower_bound(&leaf, &key, record)?;
        Ok(Cursor {
            path,
            leaf,
            slot: Slot::Gap(pos),
        })
    }

    /// A cursor before the first entry.
    pub fn before_first(&mut self) -> Result<Cursor, IndexError> {
        let mut path = Vec::new();
        let leaf = self.edge(self.root, &mut path, Direction::Forward)?;
        Ok(Cursor {
            path,
            leaf,
            slot: Slot::Gap(0),
        })
    }

    /// A cursor after the last entry.
    pub fn after_last(&mut self) -> Result<Cursor, IndexError> {
        let mut path = Vec::new();
        let leaf = self.edge(self.root, &mut path, Direction::Backward)?;
        let end = leaf.len();
        Ok(Cursor {
            path,
            leaf,
            slot: Slot::Gap(end),
        })
    }

    /// Load the neighbouring leaf. Leaves the cursor alone at either end.
    fn step_leaf(&mut self, cursor: &mut Cursor, direction: Direction) -> Result<bool, IndexError> {
        let mut path = cursor.path.clone();
        while let Some(step) = path.last_mut() {
            let node = self.read_node(step.page)?;
            let next = match direction {
                Direction::Forward => (step.child < node.len()).then_some(step.child + 1),
                Direction::Backward => step.child.checked_sub(1),
            };
            if let Some(child) = next {
                step.child = child;
                let leaf = self.edge(node.child(child), &mut path, direction)?;
                cursor.path = path;
                cursor.leaf = leaf;
                return Ok(true);
            }
            path.pop();
        }
        Ok(false)
    }

    /// Advance to the next entry. `None` parks the cursor after the last one.
    pub fn next(&mut self, cursor: &mut Cursor) -> Result<Option<NodeEntry>, IndexError> {
        let mut index = match cursor.slot {
            Slot::At(i) => i + 1,
            Slot::Gap(g) => g,
        };
        loop {
            if let Some(entry) = cursor.leaf.entries.get(index) {
                cursor.slot = Slot::At(index);
                return Ok(Some(entry.clone()));
            }
            if !self.step_leaf(cursor, Direction::Forward)? {
                cursor.slot = Slot::Gap(cursor.leaf.len());
                return Ok(None);
            }
            index = 0;
        }
    }

    /// Step back to the previous entry. `None` parks the cursor before the first one.
    pub fn prev(&mut self, cursor: &mut Cursor) -> Result<Option<NodeEntry>, IndexError> {
        let mut index = match cursor.slot {
            Slot::At(i) | Slot::Gap(i) => i.checked_sub(1),
        };
        loop {
            if let Some((i, entry)) =
                index.and_then(|i| cursor.leaf.entries.get(i).map(|entry| (i, entry)))
            {
                cursor.slot = Slot::At(i);
                return Ok(Some(entry.clone()));
            }
            if !self.step_leaf(cursor, Direction::Backward)? {
                cursor.slot = Slot::Gap(0);
                return Ok(None);
            }
            index = cursor.leaf.len().checked_sub(1);
        }
    }

    /// Remove the entry under the cursor.
    ///
    /// The cursor is left in the gap the entry occupied, so `next` returns
    /// the entry that followed it.
    pub fn delete(&mut self, cursor: &mut Cursor) -> Result<NodeEntry, IndexError> {
        let Slot::At(index) = cursor.slot else {
            return Err(IndexError::NoCurrentEntry);
        };
        if index >= cursor.leaf.len() {
            return Err(IndexError::NoCurrentEntry);
        }
        let entry = cursor.leaf.entries.remove(index);
        self.write_node(&cursor.leaf)?;
        cursor.slot = Slot::Gap(index);
        Ok(entry)
    }

    /// Number of leaf entries.
    pub fn entry_count(&mut self) -> Result<usize, IndexError> {
        let mut cursor = self.before_first()?;
        let mut count = 0;
        while self.next(&mut cursor)?.is_some() {
            count += 1;
        }
        Ok(count)
    }

    /// Every page of the tree, level by level from the root.
    pub fn pages(&mut self) -> Result<Vec<PageId>, IndexError> {
        let mut pages = Vec::new();
        let mut level = vec![self.root];
        for _ in 0..=MAX_DEPTH {
            if level.is_empty() {
                return Ok(pages);
            }
            let mut below = Vec::new();
            for page_id in level {
                let node = self.read_node(page_id)?;
                if node.is_branch() {
                    below.extend((0..=node.len()).map(|index| node.child(index)));
                }
                pages.push(page_id);
            }
            level = below;
        }
        Err(IndexError::Corruption(format!(
            "tree at page {} is deeper than {MAX_DEPTH} levels",
            self.root
        )))
    }

    /// Remove every entry. The root stays in place as an empty leaf and
    /// the other pages go to the free list. Returns how many were freed.
    pub fn clear(&mut self) -> Result<usize, IndexError> {
        let pages = self.pages()?;
        let root = self.root;
        self.write_node(&Node::new_leaf(root))?;
        let mut freed = 0;
        for page_id in pages.into_iter().filter(|&page_id| page_id != root) {
            self.file.free_page(page_id)?;
            freed += 1;
        }
        debug!(root, freed, "cleared index tree");
        Ok(freed)
    }
}

/// Everything one tag keeps between calls: its definition, root and cursor.
///
/// NDX and MDX indexes both drive their trees through this; they differ
/// only in where the root and the page counter are persisted.
#[derive(Debug, Clone)]
pub struct TagState {
    name: String,
    definition: KeyDefinition,
    geometry: KeyGeometry,
    comparison: KeyComparison,
    root: PageId,
    cursor: Option<Cursor>,
    found_exact: bool,
    active_key: Option<NodeKey>,
}

impl TagState {
    #[must_use]
    pub fn new(
        name: &str,
        definition: KeyDefinition,
        format: NodeFormat,
        comparison: KeyComparison,
        root: PageId,
    ) -> Self {
        let geometry = KeyGeometry::new(format, definition.key_type(), definition.key_length());
        Self {
            name: name.to_string(),
            definition,
            geometry,
            comparison,
            root,
            cursor: None,
            found_exact: false,
            active_key: None,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub const fn definition(&self) -> &KeyDefinition {
        &self.definition
    }

    #[must_use]
    pub const fn geometry(&self) -> &KeyGeometry {
        &self.geometry
    }

    #[must_use]
    pub const fn comparison(&self) -> KeyComparison {
        self.comparison
    }

    #[must_use]
    pub const fn root(&self) -> PageId {
        self.root
    }

    /// Point at a new tree and forget the cursor.
    pub fn reset(&mut self, root: PageId) {
        self.root = root;
        self.cursor = None;
        self.found_exact = false;
    }

    #[must_use]
    pub const fn has_tree(&self) -> bool {
        self.root != 0
    }

    #[must_use]
    pub const fn found_exact(&self) -> bool {
        self.found_exact
    }

    #[must_use]
    pub const fn active_key(&self) -> Option<&NodeKey> {
        self.active_key.as_ref()
    }

    pub fn set_active_key(&mut self, key: Option<NodeKey>) {
        self.active_key = key;
    }

    /// Key of the entry under the cursor.
    #[must_use]
    pub fn current_key(&self) -> Option<&NodeKey> {
        self.cursor
            .as_ref()
            .and_then(Cursor::current)
            .map(|entry| &entry.key)
    }

    fn tree<'f, S: ByteStore>(&self, file: &'f mut IndexFile<S>) -> TagTree<'f, S> {
        TagTree::new(file, self.geometry, self.comparison, self.root)
    }

    fn require_tree(&self) -> Result<(), IndexError> {
        if self.has_tree() {
            Ok(())
        } else {
            Err(IndexError::Corruption(format!("tag {} has no root page", self.name)))
        }
    }

    /// Empty the tree in place, keeping its root page.
    pub fn clear<S: ByteStore>(&mut self, file: &mut IndexFile<S>) -> Result<usize, IndexError> {
        self.require_tree()?;
        let freed = self.tree(file).clear()?;
        self.reset(self.root);
        self.active_key = None;
        Ok(freed)
    }

    /// Allocate an empty root leaf for this tag.
    pub fn create_root<S: ByteStore>(&mut self, file: &mut IndexFile<S>) -> Result<PageId, IndexError> {
        let root = TagTree::create(file, self.geometry, self.comparison)?.root();
        self.reset(root);
        Ok(root)
    }

    pub fn add_entry<S: ByteStore>(
        &mut self,
        file: &mut IndexFile<S>,
        key: &NodeKey,
        record: u32,
    ) -> Result<bool, IndexError> {
        self.require_tree()?;
        self.cursor = None;
        let mut tree = self.tree(file);
        let inserted = tree.insert(key, record)?;
        self.root = tree.root();
        Ok(inserted)
    }

    pub fn find_entry<S: ByteStore>(
        &mut self,
        file: &mut IndexFile<S>,
        key: &NodeKey,
    ) -> Result<Option<u32>, IndexError> {
        self.require_tree()?;
        let mut tree = self.tree(file);
        let mut cursor = tree.seek(key, 0)?;
        let found = tree.next(&mut cursor)?;
        let key = self.geometry.fit(key);
        self.found_exact = match &found {
            Some(entry) => entry.key.compare(&key, self.comparison)? == Ordering::Equal,
            None => false,
        };
        self.cursor = Some(cursor);
        Ok(found.map(|entry| entry.record))
    }

    pub fn find_entry_for<S: ByteStore>(
        &mut self,
        file: &mut IndexFile<S>,
        key: &NodeKey,
        record: u32,
    ) -> Result<Option<u32>, IndexError> {
        self.require_tree()?;
        let mut tree = self.tree(file);
        let mut cursor = tree.seek(key, record)?;
        let found = tree.next(&mut cursor)?;
        let key = self.geometry.fit(key);
        self.found_exact = match &found {
            Some(entry) => {
                entry.record == record
                    && entry.key.compare(&key, self.comparison)? == Ordering::Equal
            }
            None => false,
        };
        self.cursor = Some(cursor);
        Ok(self.found_exact.then_some(record))
    }

    pub fn get_next_key<S: ByteStore>(
        &mut self,
        file: &mut IndexFile<S>,
    ) -> Result<Option<u32>, IndexError> {
        self.require_tree()?;
        let mut tree = self.tree(file);
        let mut cursor = match self.cursor.take() {
            Some(cursor) => cursor,
            None => tree.before_first()?,
        };
        let found = tree.next(&mut cursor);
        self.cursor = Some(cursor);
        Ok(found?.map(|entry| entry.record))
    }

    pub fn get_prev_key<S: ByteStore>(
        &mut self,
        file: &mut IndexFile<S>,
    ) -> Result<Option<u32>, IndexError> {
        self.require_tree()?;
        let mut tree = self.tree(file);
        let mut cursor = match self.cursor.take() {
            Some(cursor) => cursor,
            None => tree.after_last()?,
        };
        let found = tree.prev(&mut cursor);
        self.cursor = Some(cursor);
        Ok(found?.map(|entry| entry.record))
    }

    pub fn seek<S: ByteStore>(
        &mut self,
        file: &mut IndexFile<S>,
        key: &NodeKey,
        park: Park,
    ) -> Result<(), IndexError> {
        self.require_tree()?;
        let record = match park {
            Park::Before => 0,
            Park::After => u32::MAX,
        };
        let cursor = self.tree(file).seek(key, record)?;
        self.cursor = Some(cursor);
        self.found_exact = false;
        Ok(())
    }

    pub fn del_entry<S: ByteStore>(&mut self, file: &mut IndexFile<S>) -> Result<u32, IndexError> {
        let mut tree = self.tree(file);
        let cursor = self.cursor.as_mut().ok_or(IndexError::NoCurrentEntry)?;
        let entry = tree.delete(cursor)?;
        self.found_exact = false;
        Ok(entry.record)
    }

    pub fn entry_count<S: ByteStore>(&self, file: &mut IndexFile<S>) -> Result<usize, IndexError> {
        if !self.has_tree() {
            return Ok(0);
        }
        self.tree(file).entry_count()
    }

    /// Fill the (empty) tree from every record of `table`, in key order.
    ///
    /// Returns the number of entries added. A unique tag fails on the first
    /// key held by more than one record.
    pub fn populate<S: ByteStore>(
        &mut self,
        file: &mut IndexFile<S>,
        table: &mut dyn Table,
    ) -> Result<usize, IndexError> {
        self.require_tree()?;
        let ordered = self.order_records(table)?;

        let unique = self.definition.is_unique();
        let mut entries = 0;
        for (key, records) in ordered.iter() {
            if unique && records.len() > 1 {
                return Err(IndexError::DuplicateKey {
                    tag: self.name.clone(),
                    key: key.clone(),
                    record: records[0],
                });
            }
            for &record in records {
                self.add_entry(file, key, record)?;
            }
            entries += records.len();
        }
        self.cursor = None;
        self.active_key = None;
        Ok(entries)
    }

    /// Group record numbers by key, each group in ascending record order.
    ///
    /// Records are visited median first so a table already sorted on the
    /// key still gives a shallow tree.
    fn order_records(&self, table: &mut dyn Table) -> Result<BinaryTree<Vec<u32>>, IndexError> {
        let mut ordered: BinaryTree<Vec<u32>> = BinaryTree::new(self.comparison);
        for record in median_first(table.record_count()) {
            table.go_to(record)?;
            let key = self.geometry.fit(&self.definition.build_key(table.fields())?);
            match ordered.find(&key)? {
                Some(id) => {
                    if let Some(records) = ordered.payload_mut(id) {
                        records.push(record);
                    }
                }
                None => {
                    ordered.insert(key, vec![record])?;
                }
            }
        }
        let mut next = ordered.least();
        while let Some(id) = next {
            if let Some(records) = ordered.payload_mut(id) {
                records.sort_unstable();
            }
            next = ordered.next(id);
        }
        Ok(ordered)
    }
}

/// `1..=count`, each range's middle before its two halves.
fn median_first(count: u32) -> Vec<u32> {
    let mut out = Vec::with_capacity(usize::try_from(count).unwrap_or(0));
    let mut ranges = VecDeque::from([(1, count)]);
    while let Some((low, high)) = ranges.pop_front() {
        if low > high {
            continue;
        }
        let middle = low + (high - low) / 2;
        out.push(middle);
        if middle > low {
            ranges.push_back((low, middle - 1));
        }
        if middle < high {
            ranges.push_back((middle + 1, high));
        }
    }
    out
}
