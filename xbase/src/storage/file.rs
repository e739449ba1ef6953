//! Index file I/O operations.
//!
//! `FileStore` is the `ByteStore` over a real file. `IndexFile` layers
//! page-granular reads and writes, the next-available-page counter and the
//! free page list on top of any store; partial-page writes never happen
//! through it.
//!
//! A freed page holds the number of the next free page in its first four
//! bytes; 0 ends the list.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::storage::io::{ByteStore, StorageError};
use crate::storage::page::{Page, PageId, page_offset};

/// A `ByteStore` backed by a file on disk.
///
/// The store exclusively owns its handle; dropping the store closes it.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    file: Option<File>,
}

impl FileStore {
    /// Create (or truncate) the file at `path`.
    pub fn create(path: &Path) -> Result<Self, StorageError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;

        Ok(Self {
            path: path.to_path_buf(),
            file: Some(file),
        })
    }

    /// Open an existing file.
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;

        Ok(Self {
            path: path.to_path_buf(),
            file: Some(file),
        })
    }

    /// Path of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn handle(&mut self) -> Result<&mut File, StorageError> {
        self.file.as_mut().ok_or(StorageError::Closed)
    }
}

impl ByteStore for FileStore {
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<(), StorageError> {
        let file = self.handle()?;
        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(buf)?;
        Ok(())
    }

    fn write_at(&mut self, offset: u64, buf: &[u8]) -> Result<(), StorageError> {
        let file = self.handle()?;
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(buf)?;
        Ok(())
    }

    fn len(&mut self) -> Result<u64, StorageError> {
        Ok(self.handle()?.metadata()?.len())
    }

    fn truncate(&mut self, len: u64) -> Result<(), StorageError> {
        self.handle()?.set_len(len)?;
        Ok(())
    }

    fn sync(&mut self) -> Result<(), StorageError> {
        self.handle()?.sync_all()?;
        Ok(())
    }

    fn recreate(&mut self) -> Result<(), StorageError> {
        // Release the old handle before the file goes away.
        drop(self.file.take());
        std::fs::remove_file(&self.path)?;
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(&self.path)?;
        self.file = Some(file);
        Ok(())
    }
}

/// Page-level access to an index file.
#[derive(Debug)]
pub struct IndexFile<S: ByteStore> {
    store: S,
    next_page: PageId,
    free_list: PageId,
    /// Pages allocated minus pages freed since the last `take_usage`.
    usage: i32,
    sync_on_flush: bool,
}

impl<S: ByteStore> IndexFile<S> {
    /// Wrap a store whose first unused page is `next_page`.
    pub const fn new(store: S, next_page: PageId, sync_on_flush: bool) -> Self {
        Self {
            store,
            next_page,
            free_list: 0,
            usage: 0,
            sync_on_flush,
        }
    }

    /// Read a page from the store.
    pub fn read_page(&mut self, page_id: PageId) -> Result<Page, StorageError> {
        let mut page = Page::new();
        self.store
            .read_at(page_offset(page_id), page.as_bytes_mut())?;
        Ok(page)
    }

    /// Write a whole page to the store.
    pub fn write_page(&mut self, page_id: PageId, page: &Page) -> Result<(), StorageError> {
        self.store.write_at(page_offset(page_id), page.as_bytes())
    }

    /// Hand out a page: the head of the free list, or else a new one at
    /// the end of the file.
    ///
    /// The page is not written; the caller persists it.
    pub fn allocate_page(&mut self) -> Result<PageId, StorageError> {
        let page_id = if self.free_list == 0 {
            let page_id = self.next_page;
            self.next_page += 1;
            page_id
        } else {
            let page_id = self.free_list;
            let next = self.read_page(page_id)?.read_u32(0);
            if next == page_id || next >= self.next_page {
                return Err(StorageError::Io(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    format!("free page {page_id} links to page {next}"),
                )));
            }
            self.free_list = next;
            page_id
        };
        self.usage = self.usage.saturating_add(1);
        Ok(page_id)
    }

    /// Put `page_id` at the head of the free list.
    pub fn free_page(&mut self, page_id: PageId) -> Result<(), StorageError> {
        let mut page = Page::new();
        page.write_u32(0, self.free_list);
        self.write_page(page_id, &page)?;
        self.free_list = page_id;
        self.usage = self.usage.saturating_sub(1);
        Ok(())
    }

    /// Head of the free list, 0 when it is empty.
    #[must_use]
    pub const fn free_list(&self) -> PageId {
        self.free_list
    }

    /// Start from a free list persisted elsewhere.
    pub const fn set_free_list(&mut self, head: PageId) {
        self.free_list = head;
    }

    /// Net pages allocated since the last call, and reset the count.
    pub const fn take_usage(&mut self) -> i32 {
        let usage = self.usage;
        self.usage = 0;
        usage
    }

    /// The next page number `allocate_page` will return.
    #[must_use]
    pub const fn next_page(&self) -> PageId {
        self.next_page
    }

    /// Reset the allocation counter (used when the file is rebuilt).
    pub const fn set_next_page(&mut self, next_page: PageId) {
        self.next_page = next_page;
    }

    /// Sync if configured to do so after header writes.
    pub fn flush(&mut self) -> Result<(), StorageError> {
        if self.sync_on_flush {
            self.store.sync()?;
        }
        Ok(())
    }

    /// Sync all pending writes.
    pub fn sync(&mut self) -> Result<(), StorageError> {
        self.store.sync()
    }

    /// Discard the whole store contents and the free list with them.
    pub fn recreate(&mut self) -> Result<(), StorageError> {
        self.store.recreate()?;
        self.free_list = 0;
        Ok(())
    }

    /// Get mutable access to the underlying store.
    pub const fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    /// Give back the underlying store.
    pub fn into_store(self) -> S {
        self.store
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use tempfile::tempdir;

    #[test]
    fn test_create_and_reopen() {
        let dir = tempdir().expect("create temp dir");
        let path = dir.path().join("test.ndx");

        {
            let mut store = FileStore::create(&path).expect("create store");
            store.write_at(0, b"hello").expect("write");
            store.sync().expect("sync");
        }

        let mut store = FileStore::open(&path).expect("open store");
        let mut buf = [0u8; 5];
        store.read_at(0, &mut buf).expect("read");
        assert_eq!(&buf, b"hello");
        assert_eq!(store.len().expect("len"), 5);
    }

    #[test]
    fn test_open_missing_file() {
        let dir = tempdir().expect("create temp dir");
        let result = FileStore::open(&dir.path().join("missing.mdx"));
        assert!(matches!(result, Err(StorageError::Io(_))));
    }

    #[test]
    fn test_read_past_end_is_error() {
        let dir = tempdir().expect("create temp dir");
        let mut store = FileStore::create(&dir.path().join("t.ndx")).expect("create store");
        let mut buf = [0u8; 4];
        assert!(store.read_at(0, &mut buf).is_err());
    }

    #[test]
    fn test_recreate_discards_contents() {
        let dir = tempdir().expect("create temp dir");
        let path = dir.path().join("t.mdx");
        let mut store = FileStore::create(&path).expect("create store");
        store.write_at(0, &[1u8; 1024]).expect("write");

        store.recreate().expect("recreate");
        assert_eq!(store.len().expect("len"), 0);
        assert!(path.exists());
    }

    #[test]
    fn test_index_file_pages() {
        let dir = tempdir().expect("create temp dir");
        let store = FileStore::create(&dir.path().join("t.ndx")).expect("create store");
        let mut file = IndexFile::new(store, 1, false);

        let page_id = file.allocate_page().expect("allocate");
        assert_eq!(page_id, 1);
        assert_eq!(file.next_page(), 2);

        let mut page = Page::new();
        page.write_u32(0, 0xDEAD_BEEF);
        file.write_page(page_id, &page).expect("write page");

        let read = file.read_page(page_id).expect("read page");
        assert_eq!(read.read_u32(0), 0xDEAD_BEEF);
        assert_eq!(file.store_mut().len().expect("len"), 1024);
    }

    #[test]
    fn test_free_pages_are_reused_first() {
        let mut file = IndexFile::new(MemoryStore::new(), 1, false);
        let pages: Vec<PageId> = (0..4)
            .map(|_| file.allocate_page().expect("allocate"))
            .collect();
        assert_eq!(pages, vec![1, 2, 3, 4]);
        for page_id in &pages {
            file.write_page(*page_id, &Page::new()).expect("write");
        }
        assert_eq!(file.take_usage(), 4);

        file.free_page(2).expect("free");
        file.free_page(4).expect("free");
        assert_eq!(file.free_list(), 4);
        assert_eq!(file.take_usage(), -2);

        assert_eq!(file.allocate_page().expect("allocate"), 4);
        assert_eq!(file.allocate_page().expect("allocate"), 2);
        assert_eq!(file.free_list(), 0);
        assert_eq!(file.allocate_page().expect("allocate"), 5);
        assert_eq!(file.next_page(), 6);
        assert_eq!(file.take_usage(), 3);
    }

    #[test]
    fn test_broken_free_list() {
        let mut file = IndexFile::new(MemoryStore::new(), 1, false);
        let page_id = file.allocate_page().expect("allocate");
        let mut page = Page::new();
        page.write_u32(0, 99);
        file.write_page(page_id, &page).expect("write");
        file.set_free_list(page_id);
        assert!(matches!(file.allocate_page(), Err(StorageError::Io(_))));
    }
}
