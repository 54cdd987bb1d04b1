//! # Chunk Construction
//!
//! `ChunkBuilder` turns one field descriptor plus one drained batch source
//! into an immutable chunk. Construction is two-pass by design: the batch
//! source is drained fully and the exact region size computed *before* any
//! byte is written, because file-backed regions cannot be resized after
//! mapping.
//!
//! ## Pipeline
//!
//! ```text
//! drain   -> type-check every batch, concatenate rows and validity
//! plan    -> variant-specific section sizes (bitmap, offsets, payload)
//! acquire -> heap region (exact size) or mapped file region (page multiple)
//! write   -> bitmap, offset table, row payloads, in row order
//! freeze  -> flush + seal read-only, wrap in the variant chunk type
//! ```
//!
//! Any failure before freeze leaves no observable chunk; a partially
//! written file region is the caller's to reclaim, as it would be after a
//! crash.
//!
//! ## Null Rows
//!
//! A nullable field drained without validity information marks every row
//! valid. Null rows never keep their input payload: fixed-width slots are
//! zeroed, string/JSON and sparse rows become zero-length, and array rows
//! store the canonical empty-array encoding so they still decode.

use std::fs::File;

use eyre::{bail, ensure, Result};
use smallvec::SmallVec;

use crate::array::{ArrayBuilder, ArrayView};
use crate::batch::{BatchSource, ColumnData};
use crate::bitmap;
use crate::chunk::{
    ArrayChunk, Chunk, FixedWidthChunk, SparseFloatVectorChunk, StringChunk,
};
use crate::field::FieldDef;
use crate::storage::{align_up, BackingMut, SECTION_ALIGN};
use crate::types::DataType;

/// Factory for chunks of one field.
pub struct ChunkBuilder<'a> {
    field: &'a FieldDef,
    dim: u32,
}

struct DrainedColumn {
    batches: SmallVec<[ColumnData; 4]>,
    row_count: usize,
    validity: Option<Vec<bool>>,
}

enum PlanKind {
    Fixed { element_size: usize },
    Variable { payload_lens: Vec<usize> },
}

struct ChunkPlan {
    bitmap_len: usize,
    body_pos: usize,
    total_size: usize,
    kind: PlanKind,
}

impl<'a> ChunkBuilder<'a> {
    /// Builder targeting the field's own dimension (if any).
    pub fn new(field: &'a FieldDef) -> Self {
        Self {
            field,
            dim: field.dim().unwrap_or(0),
        }
    }

    /// Overrides the target dimension used for dense-vector validation.
    pub fn with_dim(mut self, dim: u32) -> Self {
        self.dim = dim;
        self
    }

    /// Builds a heap-backed chunk. The region is exactly the required size.
    pub fn build(&self, source: &mut dyn BatchSource) -> Result<Chunk> {
        let column = self.drain(source)?;
        let plan = self.plan(&column)?;
        let backing = BackingMut::heap(plan.total_size)?;
        self.materialize(column, plan, backing)
    }

    /// Builds a file-backed chunk mapped at `offset`, which must be
    /// page-aligned (the caller's running total of previous chunk sizes).
    /// The resulting chunk's size is a multiple of the page size.
    pub fn build_in_file(
        &self,
        source: &mut dyn BatchSource,
        file: &File,
        offset: u64,
    ) -> Result<Chunk> {
        let column = self.drain(source)?;
        let plan = self.plan(&column)?;
        let backing = BackingMut::mapped(file, offset, plan.total_size)?;
        self.materialize(column, plan, backing)
    }

    fn drain(&self, source: &mut dyn BatchSource) -> Result<DrainedColumn> {
        let expected = self.field.data_type();
        let mut batches: SmallVec<[ColumnData; 4]> = SmallVec::new();
        let mut row_count = 0usize;
        let mut validity: Vec<bool> = Vec::new();

        while let Some(batch) = source.next_batch()? {
            ensure!(
                batch.data_type() == expected,
                "data type mismatch: batch has {:?}, field '{}' declares {:?}",
                batch.data_type(),
                self.field.name(),
                expected
            );
            if let ColumnData::FloatVector { dim, .. } = batch.data() {
                ensure!(
                    *dim == self.dim,
                    "dimension mismatch: batch has dim {}, target dim is {}",
                    dim,
                    self.dim
                );
            }

            let (data, batch_validity) = batch.into_parts();
            let rows = data.len();

            if self.field.nullable() {
                match batch_validity {
                    Some(v) => validity.extend(v),
                    // No validity information supplied: every row is valid.
                    None => validity.extend(std::iter::repeat_n(true, rows)),
                }
            }

            row_count += rows;
            batches.push(data);
        }

        Ok(DrainedColumn {
            batches,
            row_count,
            validity: self.field.nullable().then_some(validity),
        })
    }

    fn plan(&self, column: &DrainedColumn) -> Result<ChunkPlan> {
        let rows = column.row_count;
        let bitmap_len = if self.field.nullable() {
            bitmap::bytes_for(rows)
        } else {
            0
        };
        let body_pos = align_up(bitmap_len, SECTION_ALIGN);

        let kind = match self.field.data_type() {
            DataType::String | DataType::Json | DataType::Array | DataType::SparseFloatVector => {
                PlanKind::Variable {
                    payload_lens: self.payload_lens(column)?,
                }
            }
            _ => PlanKind::Fixed {
                element_size: self.field.element_size(self.dim)?,
            },
        };

        let total_size = match &kind {
            PlanKind::Fixed { element_size } => body_pos + rows * element_size,
            PlanKind::Variable { payload_lens } => {
                body_pos + (rows + 1) * 8 + payload_lens.iter().sum::<usize>()
            }
        };

        Ok(ChunkPlan {
            bitmap_len,
            body_pos,
            total_size,
            kind,
        })
    }

    /// Per-row payload sizes for variable-length variants, with null rows
    /// replaced by their canonical empty encoding. Array rows are also
    /// validated against the declared element type here, before any
    /// allocation happens.
    fn payload_lens(&self, column: &DrainedColumn) -> Result<Vec<usize>> {
        let mut lens = Vec::with_capacity(column.row_count);
        let validity = column.validity.as_deref();
        let mut row = 0usize;

        for data in &column.batches {
            match data {
                ColumnData::String(v) | ColumnData::Json(v) => {
                    for s in v {
                        lens.push(if is_valid(validity, row) { s.len() } else { 0 });
                        row += 1;
                    }
                }
                ColumnData::Array(v) => {
                    let declared = self.declared_element_type()?;
                    for bytes in v {
                        if is_valid(validity, row) {
                            let view = ArrayView::new(bytes)?;
                            let elem = view.elem_type()?;
                            ensure!(
                                elem == declared,
                                "data type mismatch: array row {} has {:?} elements, field '{}' declares {:?}",
                                row,
                                elem,
                                self.field.name(),
                                declared
                            );
                            lens.push(bytes.len());
                        } else {
                            lens.push(empty_array(declared).len());
                        }
                        row += 1;
                    }
                }
                ColumnData::SparseFloatVector(v) => {
                    for vec in v {
                        lens.push(if is_valid(validity, row) {
                            vec.byte_len()
                        } else {
                            0
                        });
                        row += 1;
                    }
                }
                other => bail!(
                    "data type mismatch: {:?} batch in a variable-length column",
                    other.data_type()
                ),
            }
        }

        Ok(lens)
    }

    fn declared_element_type(&self) -> Result<DataType> {
        self.field.element_type().ok_or_else(|| {
            eyre::eyre!("field '{}' has no declared element type", self.field.name())
        })
    }

    fn materialize(
        &self,
        column: DrainedColumn,
        plan: ChunkPlan,
        mut backing: BackingMut,
    ) -> Result<Chunk> {
        {
            let buf = backing.as_mut_slice();

            if let Some(validity) = column.validity.as_deref() {
                buf[..plan.bitmap_len].copy_from_slice(&bitmap::pack(validity));
                // The pad up to body_pos may cover recycled file bytes.
                buf[plan.bitmap_len..plan.body_pos].fill(0);
            }

            match &plan.kind {
                PlanKind::Fixed { element_size } => {
                    self.write_fixed(buf, &plan, *element_size, &column)?;
                }
                PlanKind::Variable { .. } => {
                    self.write_variable(buf, &plan, &column)?;
                }
            }
        }

        let backing = backing.freeze()?;
        let rows = column.row_count;
        let valid = column.validity;

        Ok(match self.field.data_type() {
            DataType::String => {
                Chunk::String(StringChunk::new(backing, rows, plan.body_pos, valid))
            }
            DataType::Json => Chunk::Json(StringChunk::new(backing, rows, plan.body_pos, valid)),
            DataType::Array => Chunk::Array(ArrayChunk::new(
                backing,
                rows,
                plan.body_pos,
                self.declared_element_type()?,
                valid,
            )),
            DataType::SparseFloatVector => Chunk::SparseFloatVector(SparseFloatVectorChunk::new(
                backing,
                rows,
                plan.body_pos,
                self.dim,
                valid,
            )),
            data_type => {
                let element_size = self.field.element_size(self.dim)?;
                Chunk::FixedWidth(FixedWidthChunk::new(
                    backing,
                    data_type,
                    rows,
                    element_size,
                    plan.body_pos,
                    valid,
                ))
            }
        })
    }

    fn write_fixed(
        &self,
        buf: &mut [u8],
        plan: &ChunkPlan,
        element_size: usize,
        column: &DrainedColumn,
    ) -> Result<()> {
        let validity = column.validity.as_deref();
        let mut row = 0usize;

        let slot = |row: usize| {
            let start = plan.body_pos + row * element_size;
            start..start + element_size
        };

        for data in &column.batches {
            match data {
                ColumnData::Bool(v) => {
                    for &value in v {
                        buf[slot(row)].copy_from_slice(&[write_or_zero(validity, row, value as u8)]);
                        row += 1;
                    }
                }
                ColumnData::Int8(v) => {
                    for &value in v {
                        buf[slot(row)].copy_from_slice(&[write_or_zero(validity, row, value as u8)]);
                        row += 1;
                    }
                }
                ColumnData::Int16(v) => {
                    for &value in v {
                        let value = if is_valid(validity, row) { value } else { 0 };
                        buf[slot(row)].copy_from_slice(&value.to_le_bytes());
                        row += 1;
                    }
                }
                ColumnData::Int32(v) => {
                    for &value in v {
                        let value = if is_valid(validity, row) { value } else { 0 };
                        buf[slot(row)].copy_from_slice(&value.to_le_bytes());
                        row += 1;
                    }
                }
                ColumnData::Int64(v) => {
                    for &value in v {
                        let value = if is_valid(validity, row) { value } else { 0 };
                        buf[slot(row)].copy_from_slice(&value.to_le_bytes());
                        row += 1;
                    }
                }
                ColumnData::Float(v) => {
                    for &value in v {
                        let value = if is_valid(validity, row) { value } else { 0.0 };
                        buf[slot(row)].copy_from_slice(&value.to_le_bytes());
                        row += 1;
                    }
                }
                ColumnData::Double(v) => {
                    for &value in v {
                        let value = if is_valid(validity, row) { value } else { 0.0 };
                        buf[slot(row)].copy_from_slice(&value.to_le_bytes());
                        row += 1;
                    }
                }
                ColumnData::FloatVector { dim, values } => {
                    for row_values in values.chunks_exact(*dim as usize) {
                        let dst = &mut buf[slot(row)];
                        if is_valid(validity, row) {
                            for (i, &value) in row_values.iter().enumerate() {
                                dst[i * 4..(i + 1) * 4].copy_from_slice(&value.to_le_bytes());
                            }
                        } else {
                            dst.fill(0);
                        }
                        row += 1;
                    }
                }
                other => bail!(
                    "data type mismatch: {:?} batch in a fixed-width column",
                    other.data_type()
                ),
            }
        }

        Ok(())
    }

    fn write_variable(&self, buf: &mut [u8], plan: &ChunkPlan, column: &DrainedColumn) -> Result<()> {
        let rows = column.row_count;
        let validity = column.validity.as_deref();
        let offsets_pos = plan.body_pos;
        let blob_pos = offsets_pos + (rows + 1) * 8;

        let mut cursor = 0usize;
        let mut row = 0usize;
        put_u64(buf, offsets_pos, 0);

        let append = |buf: &mut [u8], row: usize, cursor: &mut usize, bytes: &[u8]| {
            buf[blob_pos + *cursor..blob_pos + *cursor + bytes.len()].copy_from_slice(bytes);
            *cursor += bytes.len();
            put_u64(buf, offsets_pos + (row + 1) * 8, *cursor as u64);
        };

        for data in &column.batches {
            match data {
                ColumnData::String(v) | ColumnData::Json(v) => {
                    for s in v {
                        let bytes = if is_valid(validity, row) {
                            s.as_bytes()
                        } else {
                            &[]
                        };
                        append(buf, row, &mut cursor, bytes);
                        row += 1;
                    }
                }
                ColumnData::Array(v) => {
                    let declared = self.declared_element_type()?;
                    let empty = empty_array(declared);
                    for bytes in v {
                        let bytes: &[u8] = if is_valid(validity, row) { bytes } else { &empty };
                        append(buf, row, &mut cursor, bytes);
                        row += 1;
                    }
                }
                ColumnData::SparseFloatVector(v) => {
                    for vec in v {
                        if is_valid(validity, row) {
                            let start = blob_pos + cursor;
                            for (i, entry) in vec.iter().enumerate() {
                                let at = start + i * 8;
                                buf[at..at + 4].copy_from_slice(&entry.index.to_le_bytes());
                                buf[at + 4..at + 8].copy_from_slice(&entry.value.to_le_bytes());
                            }
                            cursor += vec.byte_len();
                        }
                        put_u64(buf, offsets_pos + (row + 1) * 8, cursor as u64);
                        row += 1;
                    }
                }
                other => bail!(
                    "data type mismatch: {:?} batch in a variable-length column",
                    other.data_type()
                ),
            }
        }

        Ok(())
    }
}

fn is_valid(validity: Option<&[bool]>, row: usize) -> bool {
    validity.map_or(true, |v| v[row])
}

fn write_or_zero(validity: Option<&[bool]>, row: usize, byte: u8) -> u8 {
    if is_valid(validity, row) {
        byte
    } else {
        0
    }
}

fn put_u64(buf: &mut [u8], pos: usize, value: u64) {
    buf[pos..pos + 8].copy_from_slice(&value.to_le_bytes());
}

/// Canonical encoding of an empty array with the given element type; what a
/// null array row stores so it still decodes to a length-0 view.
fn empty_array(element_type: DataType) -> Vec<u8> {
    ArrayBuilder::new(element_type).build()
}
