//! In-memory byte store.
//!
//! Used by tests and by callers that build throwaway indexes. Faults can be
//! injected to exercise I/O error propagation deterministically.

use crate::storage::io::{ByteStore, StorageError};

/// Configuration for fault injection.
#[derive(Debug, Clone, Copy, Default)]
pub struct FaultConfig {
    /// Fail every write once this many writes have succeeded.
    pub fail_writes_after: Option<usize>,
    /// Fail every read.
    pub fail_reads: bool,
}

/// A `ByteStore` held entirely in memory.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    data: Vec<u8>,
    faults: FaultConfig,
    writes: usize,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty store with fault injection.
    #[must_use]
    pub fn with_faults(faults: FaultConfig) -> Self {
        Self {
            faults,
            ..Self::default()
        }
    }

    /// Replace the fault configuration.
    pub const fn set_faults(&mut self, faults: FaultConfig) {
        self.faults = faults;
        self.writes = 0;
    }

    /// The raw contents.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    fn range(offset: u64, len: usize) -> Result<(usize, usize), StorageError> {
        let start = usize::try_from(offset).map_err(|_| {
            StorageError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "offset does not fit in memory",
            ))
        })?;
        Ok((start, start + len))
    }
}

impl ByteStore for MemoryStore {
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<(), StorageError> {
        if self.faults.fail_reads {
            return Err(StorageError::InjectedFault(format!("read at {offset}")));
        }
        let (start, end) = Self::range(offset, buf.len())?;
        if end > self.data.len() {
            return Err(StorageError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                format!("read of {end} bytes past end ({})", self.data.len()),
            )));
        }
        buf.copy_from_slice(&self.data[start..end]);
        Ok(())
    }

    fn write_at(&mut self, offset: u64, buf: &[u8]) -> Result<(), StorageError> {
        if self
            .faults
            .fail_writes_after
            .is_some_and(|limit| self.writes >= limit)
        {
            return Err(StorageError::InjectedFault(format!("write at {offset}")));
        }
        let (start, end) = Self::range(offset, buf.len())?;
        if end > self.data.len() {
            self.data.resize(end, 0);
        }
        self.data[start..end].copy_from_slice(buf);
        self.writes += 1;
        Ok(())
    }

    fn len(&mut self) -> Result<u64, StorageError> {
        Ok(self.data.len() as u64)
    }

    fn truncate(&mut self, len: u64) -> Result<(), StorageError> {
        let (len, _) = Self::range(len, 0)?;
        self.data.resize(len, 0);
        Ok(())
    }

    fn sync(&mut self) -> Result<(), StorageError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_extends_with_zeros() {
        let mut store = MemoryStore::new();
        store.write_at(4, b"ab").expect("write");
        assert_eq!(store.as_bytes(), &[0, 0, 0, 0, b'a', b'b']);
        assert_eq!(store.len().expect("len"), 6);
    }

    #[test]
    fn test_read_past_end() {
        let mut store = MemoryStore::new();
        store.write_at(0, b"abc").expect("write");
        let mut buf = [0u8; 4];
        assert!(matches!(
            store.read_at(0, &mut buf),
            Err(StorageError::Io(_))
        ));
    }

    #[test]
    fn test_injected_write_fault() {
        let mut store = MemoryStore::with_faults(FaultConfig {
            fail_writes_after: Some(1),
            fail_reads: false,
        });
        store.write_at(0, b"a").expect("first write");
        assert!(matches!(
            store.write_at(1, b"b"),
            Err(StorageError::InjectedFault(_))
        ));
    }

    #[test]
    fn test_recreate_truncates() {
        let mut store = MemoryStore::new();
        store.write_at(0, &[7u8; 100]).expect("write");
        store.recreate().expect("recreate");
        assert!(store.is_empty().expect("is_empty"));
    }
}
