//! # Sparse Float Vectors
//!
//! A sparse row is a variable-count sequence of `(index, value)` pairs sorted
//! by strictly increasing index. On the wire and inside a chunk each pair
//! occupies 8 bytes: a little-endian u32 index followed by a little-endian
//! f32 value. `PackedSparseEntry` gives zero-copy access to that layout via
//! zerocopy; `SparseVector` is the owned form used on the input side.
//!
//! An empty sparse row is a valid value, not a null.

use eyre::{ensure, Result};
use zerocopy::byteorder::{F32, LittleEndian, U32};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

/// Bytes per stored pair.
pub const SPARSE_ENTRY_SIZE: usize = 8;

/// One decoded nonzero entry of a sparse vector.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SparseEntry {
    pub index: u32,
    pub value: f32,
}

/// Wire/storage form of one entry. `Unaligned` so packed pair buffers can be
/// reinterpreted at any byte offset inside a chunk blob.
#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct PackedSparseEntry {
    index: U32<LittleEndian>,
    value: F32<LittleEndian>,
}

impl PackedSparseEntry {
    pub fn new(index: u32, value: f32) -> Self {
        Self {
            index: U32::new(index),
            value: F32::new(value),
        }
    }

    pub fn index(&self) -> u32 {
        self.index.get()
    }

    pub fn value(&self) -> f32 {
        self.value.get()
    }

    pub fn get(&self) -> SparseEntry {
        SparseEntry {
            index: self.index(),
            value: self.value(),
        }
    }
}

/// Owned sparse float vector with validated, strictly increasing indices.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SparseVector {
    entries: Vec<SparseEntry>,
}

impl SparseVector {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Builds a vector from already-sorted entries. Fails unless indices are
    /// strictly increasing (duplicates included).
    pub fn from_entries(entries: Vec<SparseEntry>) -> Result<Self> {
        for window in entries.windows(2) {
            ensure!(
                window[0].index < window[1].index,
                "sparse vector indices must be strictly increasing: {} then {}",
                window[0].index,
                window[1].index
            );
        }
        Ok(Self { entries })
    }

    pub fn from_pairs(pairs: &[(u32, f32)]) -> Result<Self> {
        Self::from_entries(
            pairs
                .iter()
                .map(|&(index, value)| SparseEntry { index, value })
                .collect(),
        )
    }

    /// Collects the nonzero positions of a dense row.
    pub fn from_dense(values: &[f32]) -> Self {
        let entries = values
            .iter()
            .enumerate()
            .filter(|(_, &v)| v != 0.0)
            .map(|(i, &v)| SparseEntry {
                index: i as u32,
                value: v,
            })
            .collect();
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[SparseEntry] {
        &self.entries
    }

    pub fn iter(&self) -> impl Iterator<Item = SparseEntry> + '_ {
        self.entries.iter().copied()
    }

    /// Largest stored index, if any entries exist.
    pub fn max_index(&self) -> Option<u32> {
        self.entries.last().map(|e| e.index)
    }

    /// Encoded byte length of this row.
    pub fn byte_len(&self) -> usize {
        self.entries.len() * SPARSE_ENTRY_SIZE
    }

    /// Appends the packed pair encoding of this row to `out`.
    pub fn write_to(&self, out: &mut Vec<u8>) {
        for entry in &self.entries {
            out.extend_from_slice(PackedSparseEntry::new(entry.index, entry.value).as_bytes());
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.byte_len());
        self.write_to(&mut out);
        out
    }

    /// Decodes a packed pair buffer, re-validating index order.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        ensure!(
            bytes.len() % SPARSE_ENTRY_SIZE == 0,
            "sparse row byte length {} is not a multiple of {}",
            bytes.len(),
            SPARSE_ENTRY_SIZE
        );
        let packed = <[PackedSparseEntry]>::ref_from_bytes(bytes)
            .map_err(|e| eyre::eyre!("failed to reinterpret sparse row bytes: {:?}", e))?;
        Self::from_entries(packed.iter().map(PackedSparseEntry::get).collect())
    }
}
