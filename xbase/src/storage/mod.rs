//! Page storage for index files.
//!
//! # File Format
//!
//! Index files are sequences of 512-byte pages addressed as
//! `page_number * 512` from the start of the file:
//!
//! - NDX: page 0 is the index header, B-tree pages follow.
//! - MDX: page 0 is the anchor, pages 1-3 hold the tag table, tag headers
//!   and B-tree pages follow.
//!
//! # Usage
//!
//! ```
//! use xbase::storage::{IndexFile, MemoryStore, Page};
//!
//! let mut file = IndexFile::new(MemoryStore::new(), 1, false);
//! let page_id = file.allocate_page().unwrap();
//!
//! let mut page = Page::new();
//! page.write_u32(0, 42);
//! file.write_page(page_id, &page).unwrap();
//!
//! assert_eq!(file.read_page(page_id).unwrap().read_u32(0), 42);
//! ```

mod file;
mod io;
mod memory;
mod page;

pub use file::{FileStore, IndexFile};
pub use io::{ByteStore, StorageError};
pub use memory::{FaultConfig, MemoryStore};
pub use page::{PAGE_SIZE, PAGE_SIZE_U64, Page, PageId, encode_latin1, page_offset};
