// Index engine for dBase NDX and MDX files.
//
// Layers, bottom up:
//  - storage: 512-byte pages over a random-access byte store
//  - index::key / index::node: key values and the page codec
//  - index::tree: the B-tree engine and per-tag cursor state
//  - index::ndx / index::mdx: single-tag and multi-tag files
//
// A table layer drives everything through the `Index` trait: it builds a
// key from the current record's fields, checks uniqueness, then inserts or
// moves the record's entry.

pub mod config;
mod e2e_tests;
pub mod index;
pub mod storage;
pub mod testing;

pub use config::{ConfigError, IndexConfig};
pub use index::{
    DuplicateCheck, Index, IndexError, KeyComparison, KeyDefinition, KeyType, MdxFile, MdxIndex,
    Ndx, NodeKey, Park,
};
pub use storage::{ByteStore, FileStore, MemoryStore, StorageError};
