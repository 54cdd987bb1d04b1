//! # Nested-Array Chunks
//!
//! One row per array. Physically a variable-length layout whose per-row byte
//! range holds a self-describing element array (see `crate::array`); `views`
//! decodes each requested row into an `ArrayView` without copying the
//! element storage. The element type of every stored row was checked against
//! the field descriptor at construction, so decoding here cannot surprise.
//!
//! A null row stores the canonical empty-array encoding for the field's
//! element type, so it still decodes to a well-formed, length-0 view.

use eyre::Result;

use crate::array::ArrayView;
use crate::chunk::{range_validity, resolve_range, RowRange};
use crate::storage::Backing;
use crate::types::DataType;

/// Chunk of nested-array rows.
#[derive(Debug)]
pub struct ArrayChunk {
    backing: Backing,
    row_count: usize,
    offsets_pos: usize,
    element_type: DataType,
    valid: Option<Vec<bool>>,
}

impl ArrayChunk {
    pub(crate) fn new(
        backing: Backing,
        row_count: usize,
        offsets_pos: usize,
        element_type: DataType,
        valid: Option<Vec<bool>>,
    ) -> Self {
        Self {
            backing,
            row_count,
            offsets_pos,
            element_type,
            valid,
        }
    }

    pub fn row_count(&self) -> usize {
        self.row_count
    }

    pub fn size(&self) -> usize {
        self.backing.len()
    }

    pub fn element_type(&self) -> DataType {
        self.element_type
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

    fn row_bytes(&self, idx: usize) -> &[u8] {
        let blob = self.blob_pos();
        &self.backing.as_slice()[blob + self.offset(idx)..blob + self.offset(idx + 1)]
    }

    /// Decoded array views plus per-row validity for the requested range
    /// (the whole chunk when `range` is None). Same range rules as string
    /// chunks: out-of-range requests fail, zero-length requests at a valid
    /// start yield empty views.
    pub fn views(&self, range: Option<RowRange>) -> Result<(Vec<ArrayView<'_>>, Vec<bool>)> {
        let (start, len) = resolve_range(range, self.row_count)?;

        let mut views = Vec::with_capacity(len);
        for idx in start..start + len {
            views.push(ArrayView::new(self.row_bytes(idx))?);
        }

        Ok((views, range_validity(self.valid.as_deref(), start, len)))
    }
}
