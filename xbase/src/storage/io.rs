//! Random-access byte store abstraction.
//!
//! Index files only need positioned reads and writes, the current length,
//! truncation and a sync. Real files go through `FileStore`; tests use the
//! in-memory `MemoryStore`, which can also inject faults.
//!
//! # Implementation Notes
//!
//! Implementations must ensure:
//! - `read_at` returns the last written content for a range
//! - reading past the end is an error, never a short read
//! - writing past the end extends the store

/// Errors that can occur during storage operations.
#[derive(Debug)]
pub enum StorageError {
    /// I/O error.
    Io(std::io::Error),
    /// The store was closed (or failed to reopen) and holds no handle.
    Closed,
    /// Injected fault for testing.
    InjectedFault(String),
}

impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::Closed => write!(f, "store is closed"),
            Self::InjectedFault(msg) => write!(f, "injected fault: {msg}"),
        }
    }
}

impl std::error::Error for StorageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Closed | Self::InjectedFault(_) => None,
        }
    }
}

impl From<std::io::Error> for StorageError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

/// Abstraction over a random-access byte store.
pub trait ByteStore {
    /// Fill `buf` with the bytes starting at `offset`.
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<(), StorageError>;

    /// Write `buf` starting at `offset`, extending the store if needed.
    fn write_at(&mut self, offset: u64, buf: &[u8]) -> Result<(), StorageError>;

    /// Current length in bytes.
    fn len(&mut self) -> Result<u64, StorageError>;

    /// Whether the store holds no bytes.
    fn is_empty(&mut self) -> Result<bool, StorageError> {
        Ok(self.len()? == 0)
    }

    /// Truncate (or zero-extend) the store to `len` bytes.
    fn truncate(&mut self, len: u64) -> Result<(), StorageError>;

    /// Make all previous writes durable.
    fn sync(&mut self) -> Result<(), StorageError>;

    /// Discard the store and start over with an empty one.
    ///
    /// The default truncates in place. File-backed stores delete and
    /// recreate the physical file.
    fn recreate(&mut self) -> Result<(), StorageError> {
        self.truncate(0)
    }
}
