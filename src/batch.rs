//! # Column Batch Sources
//!
//! A `BatchSource` supplies already-decoded columnar data, one column per
//! field, batch by batch. The chunk builder drains a source fully before
//! sizing its backing region, so a source is good for exactly one chunk
//! construction; retry means re-supplying a fresh source.
//!
//! `ColumnData` is the decoded physical payload of one batch. Nested-array
//! rows arrive as encoded element-array buffers (see `crate::array`); dense
//! vector rows arrive packed row-major; sparse rows arrive as validated
//! `SparseVector`s.
//!
//! Per-row validity travels next to the data as a bool-per-row slice. A
//! nullable field fed by batches without validity gets every row marked
//! valid by the builder.

use eyre::{ensure, Result};

use crate::bitmap;
use crate::sparse::SparseVector;
use crate::types::DataType;

/// Decoded payload of one columnar batch.
#[derive(Debug, Clone)]
pub enum ColumnData {
    Bool(Vec<bool>),
    Int8(Vec<i8>),
    Int16(Vec<i16>),
    Int32(Vec<i32>),
    Int64(Vec<i64>),
    Float(Vec<f32>),
    Double(Vec<f64>),
    String(Vec<String>),
    Json(Vec<String>),
    /// Encoded element-array buffer per row.
    Array(Vec<Vec<u8>>),
    /// Row-major packed dense vectors, `values.len() == rows * dim`.
    FloatVector { dim: u32, values: Vec<f32> },
    SparseFloatVector(Vec<SparseVector>),
}

impl ColumnData {
    pub fn data_type(&self) -> DataType {
        match self {
            ColumnData::Bool(_) => DataType::Bool,
            ColumnData::Int8(_) => DataType::Int8,
            ColumnData::Int16(_) => DataType::Int16,
            ColumnData::Int32(_) => DataType::Int32,
            ColumnData::Int64(_) => DataType::Int64,
            ColumnData::Float(_) => DataType::Float,
            ColumnData::Double(_) => DataType::Double,
            ColumnData::String(_) => DataType::String,
            ColumnData::Json(_) => DataType::Json,
            ColumnData::Array(_) => DataType::Array,
            ColumnData::FloatVector { .. } => DataType::FloatVector,
            ColumnData::SparseFloatVector(_) => DataType::SparseFloatVector,
        }
    }

    /// Number of rows in this batch.
    pub fn len(&self) -> usize {
        match self {
            ColumnData::Bool(v) => v.len(),
            ColumnData::Int8(v) => v.len(),
            ColumnData::Int16(v) => v.len(),
            ColumnData::Int32(v) => v.len(),
            ColumnData::Int64(v) => v.len(),
            ColumnData::Float(v) => v.len(),
            ColumnData::Double(v) => v.len(),
            ColumnData::String(v) => v.len(),
            ColumnData::Json(v) => v.len(),
            ColumnData::Array(v) => v.len(),
            ColumnData::FloatVector { dim, values } => {
                debug_assert!(*dim > 0);
                values.len() / (*dim).max(1) as usize
            }
            ColumnData::SparseFloatVector(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One decoded batch: payload plus optional per-row validity.
#[derive(Debug, Clone)]
pub struct ColumnBatch {
    data: ColumnData,
    validity: Option<Vec<bool>>,
}

impl ColumnBatch {
    pub fn new(data: ColumnData) -> Result<Self> {
        if let ColumnData::FloatVector { dim, values } = &data {
            ensure!(*dim > 0, "dense vector batch needs a positive dimension");
            ensure!(
                values.len() % *dim as usize == 0,
                "dense vector batch has {} values, not a multiple of dim {}",
                values.len(),
                dim
            );
        }
        Ok(Self {
            data,
            validity: None,
        })
    }

    pub fn with_validity(data: ColumnData, validity: Vec<bool>) -> Result<Self> {
        let mut batch = Self::new(data)?;
        ensure!(
            validity.len() == batch.data.len(),
            "validity length {} does not match batch row count {}",
            validity.len(),
            batch.data.len()
        );
        batch.validity = Some(validity);
        Ok(batch)
    }

    /// Like `with_validity`, but takes the bit-packed form produced by
    /// upstream encoders (LSB-first, set bit = valid row).
    pub fn with_packed_validity(data: ColumnData, packed: &[u8]) -> Result<Self> {
        let rows = data.len();
        ensure!(
            packed.len() >= bitmap::bytes_for(rows),
            "packed validity has {} bytes, need {} for {} rows",
            packed.len(),
            bitmap::bytes_for(rows),
            rows
        );
        Self::with_validity(data, bitmap::unpack(packed, rows))
    }

    pub fn data(&self) -> &ColumnData {
        &self.data
    }

    pub fn validity(&self) -> Option<&[bool]> {
        self.validity.as_deref()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn data_type(&self) -> DataType {
        self.data.data_type()
    }

    pub(crate) fn into_parts(self) -> (ColumnData, Option<Vec<bool>>) {
        (self.data, self.validity)
    }
}

/// External supplier of decoded columnar batches.
pub trait BatchSource {
    /// Returns the next batch, or None once the column is exhausted.
    fn next_batch(&mut self) -> Result<Option<ColumnBatch>>;
}

/// In-memory batch source over pre-decoded batches.
pub struct MemoryBatchSource {
    batches: std::vec::IntoIter<ColumnBatch>,
}

impl MemoryBatchSource {
    pub fn new(batches: Vec<ColumnBatch>) -> Self {
        Self {
            batches: batches.into_iter(),
        }
    }

    pub fn single(batch: ColumnBatch) -> Self {
        Self::new(vec![batch])
    }
}

impl BatchSource for MemoryBatchSource {
    fn next_batch(&mut self) -> Result<Option<ColumnBatch>> {
        Ok(self.batches.next())
    }
}
