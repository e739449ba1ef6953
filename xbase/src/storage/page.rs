//! Page buffer and constants for the index files.
//!
//! NDX and MDX files are addressed in 512-byte pages. All integers inside a
//! page are little-endian regardless of the host; the accessors below are
//! the only place the byte order is applied, on both read and write.

/// Page size in bytes.
pub const PAGE_SIZE: usize = 512;

/// Page size as u64 for offset calculations.
pub const PAGE_SIZE_U64: u64 = PAGE_SIZE as u64;

/// A page number (0-indexed, offset = number * `PAGE_SIZE`).
pub type PageId = u32;

/// Byte offset of a page from the start of the file.
#[must_use]
pub fn page_offset(page_id: PageId) -> u64 {
    u64::from(page_id) * PAGE_SIZE_U64
}

/// A raw page buffer.
#[derive(Clone, PartialEq, Eq)]
pub struct Page {
    data: Box<[u8; PAGE_SIZE]>,
}

impl Page {
    /// Create a new zeroed page.
    #[must_use]
    pub fn new() -> Self {
        Self {
            data: Box::new([0u8; PAGE_SIZE]),
        }
    }

    /// Get the raw page data.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; PAGE_SIZE] {
        &self.data
    }

    /// Get mutable access to the raw page data.
    pub fn as_bytes_mut(&mut self) -> &mut [u8; PAGE_SIZE] {
        &mut self.data
    }

    /// Read bytes at a specific offset.
    #[must_use]
    pub fn read_bytes(&self, offset: usize, len: usize) -> &[u8] {
        &self.data[offset..offset + len]
    }

    /// Write bytes at a specific offset.
    pub fn write_bytes(&mut self, offset: usize, bytes: &[u8]) {
        self.data[offset..offset + bytes.len()].copy_from_slice(bytes);
    }

    /// Read a u8 at the given offset.
    #[must_use]
    pub fn read_u8(&self, offset: usize) -> u8 {
        self.data[offset]
    }

    /// Write a u8 at the given offset.
    pub fn write_u8(&mut self, offset: usize, value: u8) {
        self.data[offset] = value;
    }

    /// Read a u16 (little-endian) at the given offset.
    #[must_use]
    pub fn read_u16(&self, offset: usize) -> u16 {
        u16::from_le_bytes([self.data[offset], self.data[offset + 1]])
    }

    /// Write a u16 (little-endian) at the given offset.
    pub fn write_u16(&mut self, offset: usize, value: u16) {
        self.data[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
    }

    /// Read a u32 (little-endian) at the given offset.
    #[must_use]
    pub fn read_u32(&self, offset: usize) -> u32 {
        u32::from_le_bytes([
            self.data[offset],
            self.data[offset + 1],
            self.data[offset + 2],
            self.data[offset + 3],
        ])
    }

    /// Write a u32 (little-endian) at the given offset.
    pub fn write_u32(&mut self, offset: usize, value: u32) {
        self.data[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
    }

    /// Read an f64 stored as little-endian IEEE-754 bits.
    #[must_use]
    pub fn read_f64(&self, offset: usize) -> f64 {
        let mut bits = [0u8; 8];
        bits.copy_from_slice(&self.data[offset..offset + 8]);
        f64::from_bits(u64::from_le_bytes(bits))
    }

    /// Write an f64 as little-endian IEEE-754 bits.
    pub fn write_f64(&mut self, offset: usize, value: f64) {
        self.data[offset..offset + 8].copy_from_slice(&value.to_bits().to_le_bytes());
    }

    /// Read a NUL-padded Latin-1 string of at most `len` bytes.
    #[must_use]
    pub fn read_str(&self, offset: usize, len: usize) -> String {
        let raw = self.read_bytes(offset, len);
        let end = raw.iter().position(|&b| b == 0).unwrap_or(len);
        raw[..end].iter().map(|&b| char::from(b)).collect()
    }

    /// Write a string as NUL-padded Latin-1 into a `len`-byte field.
    ///
    /// Longer strings are truncated. The field is cleared first.
    pub fn write_str(&mut self, offset: usize, len: usize, value: &str) {
        self.data[offset..offset + len].fill(0);
        for (i, b) in encode_latin1(value).into_iter().take(len).enumerate() {
            self.data[offset + i] = b;
        }
    }
}

/// Encode a string as Latin-1, writing `?` for characters outside it.
#[must_use]
pub fn encode_latin1(value: &str) -> Vec<u8> {
    value
        .chars()
        .map(|c| u8::try_from(u32::from(c)).unwrap_or(b'?'))
        .collect()
}

impl Default for Page {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Page {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Page")
            .field("first_16_bytes", &&self.data[..16])
            .finish_non_exhaustive()
    }
}
