//! # Fixed-Width Chunks
//!
//! Scalars and dense float vectors: `row_count` elements of one statically
//! known size, packed contiguously. There is no range-bounded view: `span`
//! exposes the whole chunk and callers slice it themselves, which is the
//! natural shape for scan kernels that walk every row anyway.

use eyre::{ensure, Result};
use zerocopy::{FromBytes, Immutable, KnownLayout};

use crate::storage::Backing;
use crate::types::DataType;

/// Chunk of fixed-width rows.
#[derive(Debug)]
pub struct FixedWidthChunk {
    backing: Backing,
    data_type: DataType,
    row_count: usize,
    element_size: usize,
    data_pos: usize,
    valid: Option<Vec<bool>>,
}

impl FixedWidthChunk {
    pub(crate) fn new(
        backing: Backing,
        data_type: DataType,
        row_count: usize,
        element_size: usize,
        data_pos: usize,
        valid: Option<Vec<bool>>,
    ) -> Self {
        debug_assert!(data_pos + row_count * element_size <= backing.len());
        Self {
            backing,
            data_type,
            row_count,
            element_size,
            data_pos,
            valid,
        }
    }

    pub fn row_count(&self) -> usize {
        self.row_count
    }

    pub fn element_size(&self) -> usize {
        self.element_size
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
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

    /// Zero-copy view over all rows. Row `i` occupies
    /// `data()[i * element_size .. (i + 1) * element_size]`.
    pub fn span(&self) -> Span<'_> {
        let data_len = self.row_count * self.element_size;
        Span {
            data: &self.backing.as_slice()[self.data_pos..self.data_pos + data_len],
            valid: self.valid.as_deref(),
            row_count: self.row_count,
            element_size: self.element_size,
        }
    }
}

/// Full-chunk view over fixed-width rows: one validity flag per row, same
/// order as the data.
#[derive(Debug, Clone, Copy)]
pub struct Span<'a> {
    data: &'a [u8],
    valid: Option<&'a [bool]>,
    row_count: usize,
    element_size: usize,
}

impl<'a> Span<'a> {
    pub fn row_count(&self) -> usize {
        self.row_count
    }

    pub fn element_size(&self) -> usize {
        self.element_size
    }

    /// Raw packed element bytes, `row_count * element_size` long.
    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    /// Per-row validity, None for non-nullable fields.
    pub fn valid_data(&self) -> Option<&'a [bool]> {
        self.valid
    }

    /// Validity of row `i`; rows of non-nullable fields are always valid.
    pub fn is_valid(&self, idx: usize) -> bool {
        self.valid.map_or(true, |v| v[idx])
    }

    /// Bytes of row `i`.
    pub fn row(&self, idx: usize) -> Result<&'a [u8]> {
        ensure!(
            idx < self.row_count,
            "row {} out of range for span with {} rows",
            idx,
            self.row_count
        );
        let start = idx * self.element_size;
        Ok(&self.data[start..start + self.element_size])
    }

    /// Reinterprets the span as a packed typed slice. `T` must tile the
    /// element exactly (equal size for scalars, the component type for dense
    /// vectors); the builder's section alignment guarantees the cast cannot
    /// fail for the types this crate stores.
    pub fn typed<T>(&self) -> Result<&'a [T]>
    where
        T: FromBytes + Immutable + KnownLayout,
    {
        ensure!(
            std::mem::size_of::<T>() > 0 && self.element_size % std::mem::size_of::<T>() == 0,
            "typed span element size {} does not tile chunk element size {}",
            std::mem::size_of::<T>(),
            self.element_size
        );
        <[T]>::ref_from_bytes(self.data)
            .map_err(|e| eyre::eyre!("failed to reinterpret span data: {:?}", e))
    }
}
