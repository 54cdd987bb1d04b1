//! # Chunks - Immutable Columnar Column Slices
//!
//! A `Chunk` is one column's worth of rows, materialized by `ChunkBuilder`
//! into one of five physical layouts and immutable from then on. All view
//! operations are pure reads over the frozen backing region; a finished
//! chunk is `Send + Sync` and safe for unsynchronized concurrent readers.
//!
//! ## Physical Region Layout
//!
//! Every variant shares the same prefix inside its backing region:
//!
//! ```text
//! +--------------------------+---------+------------------------------+
//! | Validity bitmap          | Padding | Variant body                 |
//! | [(N+7)/8 bytes, iff null-| to 8    | fixed: N * element_size      |
//! |  able field]             | bytes   | var:   (N+1) u64 offsets +   |
//! |                          |         |        blob                  |
//! +--------------------------+---------+------------------------------+
//! ```
//!
//! The bitmap is bit-packed (LSB-first, set = valid); the builder also
//! decodes it once into a bool-per-row table so views can hand out validity
//! slices without touching bit arithmetic on every read. Null rows always
//! materialize as zeroed elements (fixed-width) or zero-length payloads
//! (variable-length), never unspecified filler.
//!
//! ## Variants
//!
//! - `FixedWidthChunk`: scalars and dense float vectors; full-span access
//! - `StringChunk`: String and JSON rows; range-bounded zero-copy slices
//! - `ArrayChunk`: nested element arrays; range-bounded decoded views
//! - `SparseFloatVectorChunk`: packed (index, value) pair rows
//!
//! View return shapes differ per variant, so views are inherent methods on
//! the variant types; `Chunk` only routes and exposes the shared surface
//! (row count, byte size, validity, downcasts).

mod array;
mod builder;
mod fixed;
mod string;
mod sparse;


pub use array::ArrayChunk;
pub use builder::ChunkBuilder;
pub use fixed::{FixedWidthChunk, Span};
pub use sparse::{SparseFloatVectorChunk, SparseRow};
pub use string::StringChunk;

use eyre::{ensure, Result};

use crate::types::DataType;

/// Row range of a view request: `(start, length)`. Negative bounds are
/// reportable errors rather than type-system impossibilities, matching the
/// query surface above this engine.
pub type RowRange = (i64, i64);

/// Immutable chunk handle; the variant is fixed at construction.
#[derive(Debug)]
pub enum Chunk {
    FixedWidth(FixedWidthChunk),
    String(StringChunk),
    Json(StringChunk),
    Array(ArrayChunk),
    SparseFloatVector(SparseFloatVectorChunk),
}

impl Chunk {
    pub fn row_count(&self) -> usize {
        match self {
            Chunk::FixedWidth(c) => c.row_count(),
            Chunk::String(c) | Chunk::Json(c) => c.row_count(),
            Chunk::Array(c) => c.row_count(),
            Chunk::SparseFloatVector(c) => c.row_count(),
        }
    }

    /// Total byte size of the backing region: exact for heap chunks, a
    /// multiple of the page size for file-backed chunks. The caller uses
    /// this verbatim as the next chunk's starting offset when packing.
    pub fn size(&self) -> usize {
        match self {
            Chunk::FixedWidth(c) => c.size(),
            Chunk::String(c) | Chunk::Json(c) => c.size(),
            Chunk::Array(c) => c.size(),
            Chunk::SparseFloatVector(c) => c.size(),
        }
    }

    pub fn data_type(&self) -> DataType {
        match self {
            Chunk::FixedWidth(c) => c.data_type(),
            Chunk::String(_) => DataType::String,
            Chunk::Json(_) => DataType::Json,
            Chunk::Array(_) => DataType::Array,
            Chunk::SparseFloatVector(_) => DataType::SparseFloatVector,
        }
    }

    /// Per-row validity, present iff the field was nullable.
    pub fn validity(&self) -> Option<&[bool]> {
        match self {
            Chunk::FixedWidth(c) => c.validity(),
            Chunk::String(c) | Chunk::Json(c) => c.validity(),
            Chunk::Array(c) => c.validity(),
            Chunk::SparseFloatVector(c) => c.validity(),
        }
    }

    pub fn is_mapped(&self) -> bool {
        self.backing().is_mapped()
    }

    /// Asks the OS to fault a file-backed chunk in before a scan; no-op for
    /// heap chunks.
    pub fn prefetch(&self) {
        self.backing().prefetch()
    }

    fn backing(&self) -> &crate::storage::Backing {
        match self {
            Chunk::FixedWidth(c) => c.backing(),
            Chunk::String(c) | Chunk::Json(c) => c.backing(),
            Chunk::Array(c) => c.backing(),
            Chunk::SparseFloatVector(c) => c.backing(),
        }
    }

    pub fn as_fixed_width(&self) -> Option<&FixedWidthChunk> {
        match self {
            Chunk::FixedWidth(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_string(&self) -> Option<&StringChunk> {
        match self {
            Chunk::String(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_json(&self) -> Option<&StringChunk> {
        match self {
            Chunk::Json(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&ArrayChunk> {
        match self {
            Chunk::Array(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_sparse_float_vector(&self) -> Option<&SparseFloatVectorChunk> {
        match self {
            Chunk::SparseFloatVector(c) => Some(c),
            _ => None,
        }
    }
}

/// Validates a view range against the chunk's row count and resolves it to
/// `(start, len)`. Requests are never clamped: anything outside
/// `[0, row_count]` is an error. A zero-length range at a valid start is
/// permitted and yields empty views.
pub(crate) fn resolve_range(range: Option<RowRange>, row_count: usize) -> Result<(usize, usize)> {
    let Some((start, len)) = range else {
        return Ok((0, row_count));
    };

    ensure!(
        start >= 0 && len >= 0,
        "view range ({}, {}) out of range: negative bound",
        start,
        len
    );

    let start = start as usize;
    let len = len as usize;
    ensure!(
        start.checked_add(len).is_some_and(|end| end <= row_count),
        "view range ({}, {}) out of range for chunk with {} rows",
        start,
        len,
        row_count
    );

    Ok((start, len))
}

/// Validity slice for one resolved view range: decoded bits for nullable
/// fields, all-true otherwise.
pub(crate) fn range_validity(
    validity: Option<&[bool]>,
    start: usize,
    len: usize,
) -> Vec<bool> {
    match validity {
        Some(valid) => valid[start..start + len].to_vec(),
        None => vec![true; len],
    }
}
