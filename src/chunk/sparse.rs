//! # Sparse Float-Vector Chunks
//!
//! One row per sparse vector: a packed run of (u32 index, f32 value) pairs
//! with strictly increasing indices, addressed through the shared u64 offset
//! table. There is no range-bounded view: `rows` returns one lightweight
//! zero-copy handle per row and callers slice the sequence themselves.
//!
//! The declared dimension is metadata for upstream index validation; rows
//! are never bounded by it here, and an empty row is a valid vector rather
//! than a null.

use eyre::{ensure, Result};
use zerocopy::FromBytes;

use crate::sparse::{PackedSparseEntry, SparseEntry, SPARSE_ENTRY_SIZE};
use crate::storage::Backing;

/// Chunk of sparse float-vector rows.
#[derive(Debug)]
pub struct SparseFloatVectorChunk {
    backing: Backing,
    row_count: usize,
    offsets_pos: usize,
    dim: u32,
    valid: Option<Vec<bool>>,
}

impl SparseFloatVectorChunk {
    pub(crate) fn new(
        backing: Backing,
        row_count: usize,
        offsets_pos: usize,
        dim: u32,
        valid: Option<Vec<bool>>,
    ) -> Self {
        Self {
            backing,
            row_count,
            offsets_pos,
            dim,
            valid,
        }
    }

    pub fn row_count(&self) -> usize {
        self.row_count
    }

    pub fn size(&self) -> usize {
        self.backing.len()
    }

    /// Declared dimension of the field; not enforced against row contents.
    pub fn dim(&self) -> u32 {
        self.dim
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

    /// One zero-copy row view per row, in chunk order.
    pub fn rows(&self) -> Vec<SparseRow<'_>> {
        let blob = self.blob_pos();
        let slice = self.backing.as_slice();
        (0..self.row_count)
            .map(|idx| SparseRow {
                bytes: &slice[blob + self.offset(idx)..blob + self.offset(idx + 1)],
            })
            .collect()
    }

    /// View over row `idx`.
    pub fn row(&self, idx: usize) -> Result<SparseRow<'_>> {
        ensure!(
            idx < self.row_count,
            "row {} out of range for chunk with {} rows",
            idx,
            self.row_count
        );
        let blob = self.blob_pos();
        Ok(SparseRow {
            bytes: &self.backing.as_slice()[blob + self.offset(idx)..blob + self.offset(idx + 1)],
        })
    }
}

/// Zero-copy view over one sparse row's packed pairs.
#[derive(Debug, Clone, Copy)]
pub struct SparseRow<'a> {
    bytes: &'a [u8],
}

impl<'a> SparseRow<'a> {
    /// Number of stored (index, value) pairs.
    pub fn len(&self) -> usize {
        self.bytes.len() / SPARSE_ENTRY_SIZE
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Decoded pair at position `idx`.
    pub fn get(&self, idx: usize) -> Result<SparseEntry> {
        ensure!(
            idx < self.len(),
            "entry {} out of range for sparse row with {} entries",
            idx,
            self.len()
        );
        let start = idx * SPARSE_ENTRY_SIZE;
        let packed = PackedSparseEntry::read_from_bytes(
            &self.bytes[start..start + SPARSE_ENTRY_SIZE],
        )
        .map_err(|e| eyre::eyre!("failed to decode sparse entry: {:?}", e))?;
        Ok(packed.get())
    }

    /// The row as a packed entry slice, without copying.
    pub fn entries(&self) -> Result<&'a [PackedSparseEntry]> {
        <[PackedSparseEntry]>::ref_from_bytes(self.bytes)
            .map_err(|e| eyre::eyre!("failed to reinterpret sparse row: {:?}", e))
    }

    pub fn iter(&self) -> impl Iterator<Item = SparseEntry> + 'a {
        let bytes = self.bytes;
        bytes.chunks_exact(SPARSE_ENTRY_SIZE).map(|pair| {
            let packed = PackedSparseEntry::read_from_bytes(pair)
                .expect("sparse row chunked into exact entry-size pieces");
            packed.get()
        })
    }
}
