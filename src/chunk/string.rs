//! # String and JSON Chunks
//!
//! Variable-length rows behind a u64 offset table: `row_count + 1`
//! monotonically non-decreasing offsets into a contiguous blob, row `i`
//! occupying `blob[offsets[i]..offsets[i + 1]]`. JSON chunks use the same
//! physical layout and the same views; a JSON row is just a byte range that
//! happens to hold an encoded document. No parsing happens here.

use eyre::Result;

use crate::chunk::{range_validity, resolve_range, RowRange};
use crate::storage::Backing;

/// Chunk of UTF-8 rows (String or JSON payloads).
#[derive(Debug)]
pub struct StringChunk {
    backing: Backing,
    row_count: usize,
    offsets_pos: usize,
    valid: Option<Vec<bool>>,
}

impl StringChunk {
    pub(crate) fn new(
        backing: Backing,
        row_count: usize,
        offsets_pos: usize,
        valid: Option<Vec<bool>>,
    ) -> Self {
        Self {
            backing,
            row_count,
            offsets_pos,
            valid,
        }
    }

    pub fn row_count(&self) -> usize {
        self.row_count
    }

    pub fn size(&self) -> usize {
        self.backing.len()
    }

    pub fn validity(&self) -> Option<&[bool]> {
        self.valid.as_deref()
    }

    pub(crate) fn backing(&self) -> &Backing {
        &self.backing
    }

    fn blob_pos(&self) -> usize {
        self.offsets_pos + (self.row_count + 1) * 8
    }

    fn offset(&self, idx: usize) -> usize {
        let pos = self.offsets_pos + idx * 8;
        let bytes: [u8; 8] = self.backing.as_slice()[pos..pos + 8].try_into().unwrap();
        u64::from_le_bytes(bytes) as usize
    }

    /// Bytes of row `idx` (zero-length for null rows).
    pub(crate) fn row_bytes(&self, idx: usize) -> &[u8] {
        let blob = self.blob_pos();
        &self.backing.as_slice()[blob + self.offset(idx)..blob + self.offset(idx + 1)]
    }

    /// Zero-copy string slices plus per-row validity for the requested
    /// range (the whole chunk when `range` is None). Fails with an
    /// out-of-range error per the shared range rules, never clamping.
    pub fn string_views(&self, range: Option<RowRange>) -> Result<(Vec<&str>, Vec<bool>)> {
        let (start, len) = resolve_range(range, self.row_count)?;

        let mut views = Vec::with_capacity(len);
        for idx in start..start + len {
            let bytes = self.row_bytes(idx);
            let s = std::str::from_utf8(bytes)
                .map_err(|e| eyre::eyre!("invalid UTF-8 in string row {}: {}", idx, e))?;
            views.push(s);
        }

        Ok((views, range_validity(self.valid.as_deref(), start, len)))
    }
}
