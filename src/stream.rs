//! # Serialized Column Stream Codec
//!
//! Self-describing framing for one column's worth of rows, as produced by an
//! upstream insert-event encoder. The payload opens with a fixed-size pair of
//! u64 timestamps (the event time range); everything after it is the columnar
//! record itself.
//!
//! ## Frame Layout
//!
//! ```text
//! Offset  Size      Description
//! 0       8         Start timestamp (u64 LE)
//! 8       8         End timestamp (u64 LE)
//! 16      4         Magic: "CCOL"
//! 20      1         Format version (1)
//! 21      1         Data type (DataType as u8)
//! 22      1         Element type, 0xFF if none
//! 23      1         Flags (bit 0: validity bitmap present)
//! 24      8         Row count (u64 LE)
//! 32      4         Vector dimension (u32 LE), 0 if not a vector
//! 36      (N+7)/8   Validity bitmap (iff flag bit 0)
//! ...     ...       Payload, per data type
//! ```
//!
//! Payload encodings: fixed scalars are packed little-endian values; String,
//! Json, Array, and SparseFloatVector rows are u32-length-prefixed byte
//! strings (array rows carry their encoded element-array buffer, sparse rows
//! their packed pairs); dense vectors are `rows * dim` packed f32s.
//!
//! `StreamReader` decodes a frame eagerly and then acts as a single-batch
//! `BatchSource`. Any malformed input is rejected up front with "truncated" /
//! "invalid" / "unsupported" context; no partially decoded batch escapes.
//! `StreamWriter` is the matching reference encoder; tests drive chunk
//! construction through it the way the surrounding system drives it from
//! serialized insert events.

use eyre::{ensure, Result};

use crate::array::ArrayView;
use crate::batch::{BatchSource, ColumnBatch, ColumnData};
use crate::bitmap;
use crate::sparse::{SparseVector, SPARSE_ENTRY_SIZE};
use crate::types::DataType;

const STREAM_MAGIC: &[u8; 4] = b"CCOL";
const STREAM_VERSION: u8 = 1;
const NO_ELEMENT_TYPE: u8 = 0xFF;
const FLAG_HAS_VALIDITY: u8 = 0x01;

/// Reference encoder for the column stream framing.
#[derive(Debug, Clone, Copy, Default)]
pub struct StreamWriter {
    start_ts: u64,
    end_ts: u64,
}

impl StreamWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timestamps(start_ts: u64, end_ts: u64) -> Self {
        Self { start_ts, end_ts }
    }

    pub fn encode(&self, batch: &ColumnBatch) -> Vec<u8> {
        let rows = batch.len();
        let mut out = Vec::with_capacity(64 + rows * 8);

        out.extend(self.start_ts.to_le_bytes());
        out.extend(self.end_ts.to_le_bytes());
        out.extend(STREAM_MAGIC);
        out.push(STREAM_VERSION);
        out.push(batch.data_type() as u8);
        out.push(element_type_byte(batch.data()));
        out.push(if batch.validity().is_some() {
            FLAG_HAS_VALIDITY
        } else {
            0
        });
        out.extend((rows as u64).to_le_bytes());
        out.extend(dim_of(batch.data()).to_le_bytes());

        if let Some(validity) = batch.validity() {
            out.extend(bitmap::pack(validity));
        }

        match batch.data() {
            ColumnData::Bool(v) => out.extend(v.iter().map(|&b| b as u8)),
            ColumnData::Int8(v) => out.extend(v.iter().map(|&n| n as u8)),
            ColumnData::Int16(v) => {
                for n in v {
                    out.extend(n.to_le_bytes());
                }
            }
            ColumnData::Int32(v) => {
                for n in v {
                    out.extend(n.to_le_bytes());
                }
            }
            ColumnData::Int64(v) => {
                for n in v {
                    out.extend(n.to_le_bytes());
                }
            }
            ColumnData::Float(v) => {
                for n in v {
                    out.extend(n.to_le_bytes());
                }
            }
            ColumnData::Double(v) => {
                for n in v {
                    out.extend(n.to_le_bytes());
                }
            }
            ColumnData::String(v) | ColumnData::Json(v) => {
                for s in v {
                    out.extend((s.len() as u32).to_le_bytes());
                    out.extend(s.as_bytes());
                }
            }
            ColumnData::Array(v) => {
                for row in v {
                    out.extend((row.len() as u32).to_le_bytes());
                    out.extend(row.iter());
                }
            }
            ColumnData::FloatVector { values, .. } => {
                for n in values {
                    out.extend(n.to_le_bytes());
                }
            }
            ColumnData::SparseFloatVector(v) => {
                for row in v {
                    out.extend((row.len() as u32).to_le_bytes());
                    row.write_to(&mut out);
                }
            }
        }

        out
    }
}

fn element_type_byte(data: &ColumnData) -> u8 {
    match data {
        ColumnData::Array(rows) => rows
            .first()
            .and_then(|row| ArrayView::new(row).ok())
            .and_then(|view| view.elem_type().ok())
            .map(|t| t as u8)
            .unwrap_or(NO_ELEMENT_TYPE),
        _ => NO_ELEMENT_TYPE,
    }
}

fn dim_of(data: &ColumnData) -> u32 {
    match data {
        ColumnData::FloatVector { dim, .. } => *dim,
        _ => 0,
    }
}

struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        ensure!(
            self.pos + n <= self.bytes.len(),
            "truncated column stream: need {} bytes at offset {}, have {}",
            n,
            self.pos,
            self.bytes.len() - self.pos
        );
        let slice = &self.bytes[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn read_u32(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.take(4)?.try_into().unwrap()))
    }

    fn read_u64(&mut self) -> Result<u64> {
        Ok(u64::from_le_bytes(self.take(8)?.try_into().unwrap()))
    }

    fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }
}

/// Decoded frame header.
#[derive(Debug, Clone, Copy)]
pub struct StreamHeader {
    pub start_ts: u64,
    pub end_ts: u64,
    pub data_type: DataType,
    pub element_type: Option<DataType>,
    pub nullable: bool,
    pub row_count: u64,
    pub dim: u32,
}

/// Single-batch `BatchSource` over one decoded column stream.
#[derive(Debug)]
pub struct StreamReader {
    header: StreamHeader,
    batch: Option<ColumnBatch>,
}

impl StreamReader {
    /// Decodes a full frame. The whole input is consumed and validated; any
    /// defect fails construction before a batch is produced.
    pub fn new(bytes: &[u8]) -> Result<Self> {
        let mut cur = Cursor::new(bytes);

        let start_ts = cur.read_u64()?;
        let end_ts = cur.read_u64()?;

        let magic = cur.take(4)?;
        ensure!(
            magic == STREAM_MAGIC,
            "invalid column stream: bad magic {:02x?}",
            magic
        );

        let version = cur.read_u8()?;
        ensure!(
            version == STREAM_VERSION,
            "unsupported column stream version {}",
            version
        );

        let data_type = DataType::try_from(cur.read_u8()?)?;
        let element_byte = cur.read_u8()?;
        let element_type = if element_byte == NO_ELEMENT_TYPE {
            None
        } else {
            Some(DataType::try_from(element_byte)?)
        };
        let flags = cur.read_u8()?;
        let row_count = cur.read_u64()?;
        let rows = usize::try_from(row_count)
            .map_err(|_| eyre::eyre!("invalid column stream: row count {} too large", row_count))?;
        let dim = cur.read_u32()?;

        let validity = if flags & FLAG_HAS_VALIDITY != 0 {
            let packed = cur.take(bitmap::bytes_for(rows))?;
            Some(bitmap::unpack(packed, rows))
        } else {
            None
        };

        // Every row encoding occupies at least one payload byte, so this
        // bounds row-derived size arithmetic before it can overflow.
        ensure!(
            rows <= cur.remaining(),
            "invalid column stream: row count {} exceeds {} payload bytes",
            rows,
            cur.remaining()
        );

        let data = Self::read_payload(&mut cur, data_type, rows, dim)?;
        ensure!(
            cur.remaining() == 0,
            "invalid column stream: {} trailing bytes after payload",
            cur.remaining()
        );

        let batch = match validity {
            Some(validity) => ColumnBatch::with_validity(data, validity)?,
            None => ColumnBatch::new(data)?,
        };

        Ok(Self {
            header: StreamHeader {
                start_ts,
                end_ts,
                data_type,
                element_type,
                nullable: flags & FLAG_HAS_VALIDITY != 0,
                row_count,
                dim,
            },
            batch: Some(batch),
        })
    }

    fn read_payload(
        cur: &mut Cursor<'_>,
        data_type: DataType,
        rows: usize,
        dim: u32,
    ) -> Result<ColumnData> {
        let data = match data_type {
            DataType::Bool => {
                let bytes = cur.take(rows)?;
                ColumnData::Bool(bytes.iter().map(|&b| b != 0).collect())
            }
            DataType::Int8 => {
                let bytes = cur.take(rows)?;
                ColumnData::Int8(bytes.iter().map(|&b| b as i8).collect())
            }
            DataType::Int16 => {
                let bytes = cur.take(rows * 2)?;
                ColumnData::Int16(
                    bytes
                        .chunks_exact(2)
                        .map(|c| i16::from_le_bytes(c.try_into().unwrap()))
                        .collect(),
                )
            }
            DataType::Int32 => {
                let bytes = cur.take(rows * 4)?;
                ColumnData::Int32(
                    bytes
                        .chunks_exact(4)
                        .map(|c| i32::from_le_bytes(c.try_into().unwrap()))
                        .collect(),
                )
            }
            DataType::Int64 => {
                let bytes = cur.take(rows * 8)?;
                ColumnData::Int64(
                    bytes
                        .chunks_exact(8)
                        .map(|c| i64::from_le_bytes(c.try_into().unwrap()))
                        .collect(),
                )
            }
            DataType::Float => {
                let bytes = cur.take(rows * 4)?;
                ColumnData::Float(
                    bytes
                        .chunks_exact(4)
                        .map(|c| f32::from_le_bytes(c.try_into().unwrap()))
                        .collect(),
                )
            }
            DataType::Double => {
                let bytes = cur.take(rows * 8)?;
                ColumnData::Double(
                    bytes
                        .chunks_exact(8)
                        .map(|c| f64::from_le_bytes(c.try_into().unwrap()))
                        .collect(),
                )
            }
            DataType::String | DataType::Json => {
                let mut values = Vec::with_capacity(rows);
                for i in 0..rows {
                    let len = cur.read_u32()? as usize;
                    let bytes = cur.take(len)?;
                    let s = std::str::from_utf8(bytes).map_err(|e| {
                        eyre::eyre!("invalid column stream: row {} is not UTF-8: {}", i, e)
                    })?;
                    values.push(s.to_owned());
                }
                if data_type == DataType::Json {
                    ColumnData::Json(values)
                } else {
                    ColumnData::String(values)
                }
            }
            DataType::Array => {
                let mut rows_out = Vec::with_capacity(rows);
                for i in 0..rows {
                    let len = cur.read_u32()? as usize;
                    let bytes = cur.take(len)?;
                    ArrayView::new(bytes).map_err(|e| {
                        eyre::eyre!("invalid column stream: array row {}: {}", i, e)
                    })?;
                    rows_out.push(bytes.to_vec());
                }
                ColumnData::Array(rows_out)
            }
            DataType::FloatVector => {
                ensure!(
                    dim > 0,
                    "invalid column stream: dense vector frame with dim 0"
                );
                let bytes = cur.take(rows * dim as usize * 4)?;
                ColumnData::FloatVector {
                    dim,
                    values: bytes
                        .chunks_exact(4)
                        .map(|c| f32::from_le_bytes(c.try_into().unwrap()))
                        .collect(),
                }
            }
            DataType::SparseFloatVector => {
                let mut rows_out = Vec::with_capacity(rows);
                for i in 0..rows {
                    let pairs = cur.read_u32()? as usize;
                    let bytes = cur.take(pairs * SPARSE_ENTRY_SIZE)?;
                    let row = SparseVector::from_bytes(bytes).map_err(|e| {
                        eyre::eyre!("invalid column stream: sparse row {}: {}", i, e)
                    })?;
                    rows_out.push(row);
                }
                ColumnData::SparseFloatVector(rows_out)
            }
        };

        ensure!(
            data.len() == rows,
            "invalid column stream: decoded {} rows, header says {}",
            data.len(),
            rows
        );
        Ok(data)
    }

    pub fn header(&self) -> &StreamHeader {
        &self.header
    }

    pub fn timestamps(&self) -> (u64, u64) {
        (self.header.start_ts, self.header.end_ts)
    }
}

impl BatchSource for StreamReader {
    fn next_batch(&mut self) -> Result<Option<ColumnBatch>> {
        Ok(self.batch.take())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::array::ArrayBuilder;

    fn round_trip(batch: ColumnBatch) -> ColumnBatch {
        let bytes = StreamWriter::with_timestamps(100, 200).encode(&batch);
        let mut reader = StreamReader::new(&bytes).unwrap();
        assert_eq!(reader.timestamps(), (100, 200));
        let decoded = reader.next_batch().unwrap().unwrap();
        assert!(reader.next_batch().unwrap().is_none());
        decoded
    }

    #[test]
    fn int64_round_trip() {
        let batch = ColumnBatch::new(ColumnData::Int64(vec![1, -2, 3])).unwrap();
        let decoded = round_trip(batch);
        match decoded.data() {
            ColumnData::Int64(v) => assert_eq!(v, &[1, -2, 3]),
            other => panic!("wrong variant: {:?}", other),
        }
    }

    #[test]
    fn string_round_trip_with_validity() {
        let batch = ColumnBatch::with_validity(
            ColumnData::String(vec!["a".into(), "".into(), "ccc".into()]),
            vec![true, false, true],
        )
        .unwrap();
        let decoded = round_trip(batch);
        assert_eq!(decoded.validity().unwrap(), &[true, false, true]);
        match decoded.data() {
            ColumnData::String(v) => assert_eq!(v, &["a", "", "ccc"]),
            other => panic!("wrong variant: {:?}", other),
        }
    }

    #[test]
    fn array_round_trip_records_element_type() {
        let mut builder = ArrayBuilder::new(DataType::Int32);
        builder.push_int32(7);
        let row = builder.build();

        let batch = ColumnBatch::new(ColumnData::Array(vec![row.clone(), row])).unwrap();
        let bytes = StreamWriter::new().encode(&batch);
        let reader = StreamReader::new(&bytes).unwrap();
        assert_eq!(reader.header().element_type, Some(DataType::Int32));
        assert_eq!(reader.header().row_count, 2);
    }

    #[test]
    fn sparse_round_trip() {
        let rows = vec![
            SparseVector::from_pairs(&[(1, 0.5), (9, 2.0)]).unwrap(),
            SparseVector::empty(),
        ];
        let batch = ColumnBatch::new(ColumnData::SparseFloatVector(rows.clone())).unwrap();
        let decoded = round_trip(batch);
        match decoded.data() {
            ColumnData::SparseFloatVector(v) => assert_eq!(v, &rows),
            other => panic!("wrong variant: {:?}", other),
        }
    }

    #[test]
    fn dense_vector_round_trip() {
        let batch = ColumnBatch::new(ColumnData::FloatVector {
            dim: 2,
            values: vec![1.0, 2.0, 3.0, 4.0],
        })
        .unwrap();
        let decoded = round_trip(batch);
        assert_eq!(decoded.len(), 2);
    }

    #[test]
    fn truncated_stream_rejected() {
        let batch = ColumnBatch::new(ColumnData::Int64(vec![1, 2, 3])).unwrap();
        let bytes = StreamWriter::new().encode(&batch);

        let result = StreamReader::new(&bytes[..bytes.len() - 4]);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("truncated"));
    }

    #[test]
    fn bad_magic_rejected() {
        let batch = ColumnBatch::new(ColumnData::Int64(vec![1])).unwrap();
        let mut bytes = StreamWriter::new().encode(&batch);
        bytes[16] = b'X';

        let result = StreamReader::new(&bytes);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("bad magic"));
    }

    #[test]
    fn trailing_garbage_rejected() {
        let batch = ColumnBatch::new(ColumnData::Int64(vec![1])).unwrap();
        let mut bytes = StreamWriter::new().encode(&batch);
        bytes.push(0xAB);

        let result = StreamReader::new(&bytes);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("trailing"));
    }

    #[test]
    fn empty_column_round_trip() {
        let batch = ColumnBatch::new(ColumnData::String(vec![])).unwrap();
        let decoded = round_trip(batch);
        assert_eq!(decoded.len(), 0);
    }
}
