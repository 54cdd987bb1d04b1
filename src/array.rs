//! # Element Arrays with O(1) Random Access
//!
//! This module defines the self-describing binary format for one nested-array
//! row. Each array row of an Array chunk is stored as one such buffer, and
//! the chunk re-exposes it through `ArrayView` without copying the element
//! storage.
//!
//! ## Binary Format
//!
//! ```text
//! +------------------+------------------+------------------+------------------+
//! | Header (8 bytes) | Null Bitmap      | Offset Table     | Data Payload     |
//! |                  | [u8; (N+7)/8]    | [u32; N] (if var)| [u8; ...]        |
//! +------------------+------------------+------------------+------------------+
//!
//! Header Layout:
//!   Bytes 0-3: Total size in bytes (u32 LE)
//!   Byte 4:    Element type (DataType as u8)
//!   Byte 5:    Reserved (zero)
//!   Bytes 6-7: Element count (u16 LE, max 65535 elements)
//! ```
//!
//! ## Fixed-Width Element Layout
//!
//! For fixed-width element types, elements are stored contiguously without an
//! offset table; element `i` lives at
//! `header_size + null_bitmap_size + i * element_size`.
//!
//! ## Variable-Width Element Layout
//!
//! For String elements, a u32 offset table provides O(1) lookup. Each entry
//! is the start offset of that element within the payload; the end is the
//! next entry's start, or `total_size - data_start` for the last element.
//!
//! ## Null Elements
//!
//! Null elements set their bit in the bitmap. A null fixed-width slot holds
//! zero bytes; a null variable-width element occupies no payload (its offset
//! equals the next element's offset).

use eyre::{bail, ensure, Result};

use crate::types::DataType;

const HEADER_SIZE: usize = 8;

/// Zero-copy reader over one encoded element array.
#[derive(Debug, Clone, Copy)]
pub struct ArrayView<'a> {
    data: &'a [u8],
}

impl<'a> ArrayView<'a> {
    pub fn new(data: &'a [u8]) -> Result<Self> {
        ensure!(
            data.len() >= HEADER_SIZE,
            "array data too short: {} bytes, need at least {}",
            data.len(),
            HEADER_SIZE
        );
        Ok(Self { data })
    }

    fn total_size(&self) -> u32 {
        u32::from_le_bytes([self.data[0], self.data[1], self.data[2], self.data[3]])
    }

    pub fn elem_type(&self) -> Result<DataType> {
        DataType::try_from(self.data[4])
    }

    pub fn len(&self) -> usize {
        u16::from_le_bytes([self.data[6], self.data[7]]) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Raw encoded bytes backing this view.
    pub fn as_bytes(&self) -> &'a [u8] {
        self.data
    }

    fn null_bitmap_size(&self) -> usize {
        self.len().div_ceil(8)
    }

    pub fn is_null(&self, idx: usize) -> bool {
        if idx >= self.len() {
            return true;
        }
        let byte_idx = HEADER_SIZE + idx / 8;
        (self.data[byte_idx] & (1 << (idx % 8))) != 0
    }

    fn data_start_fixed(&self) -> usize {
        HEADER_SIZE + self.null_bitmap_size()
    }

    fn offset_table_start(&self) -> usize {
        HEADER_SIZE + self.null_bitmap_size()
    }

    fn data_start_variable(&self) -> usize {
        self.offset_table_start() + self.len() * 4
    }

    fn read_offset(&self, idx: usize) -> u32 {
        let pos = self.offset_table_start() + idx * 4;
        u32::from_le_bytes([
            self.data[pos],
            self.data[pos + 1],
            self.data[pos + 2],
            self.data[pos + 3],
        ])
    }

    fn get_var_bounds(&self, idx: usize) -> Result<(usize, usize)> {
        ensure!(
            idx < self.len(),
            "array index {} out of bounds (len={})",
            idx,
            self.len()
        );

        let data_start = self.data_start_variable();
        let start = self.read_offset(idx) as usize;

        let end = if idx + 1 < self.len() {
            self.read_offset(idx + 1) as usize
        } else {
            self.total_size() as usize - data_start
        };

        Ok((data_start + start, data_start + end))
    }

    fn fixed_offset(&self, idx: usize, size: usize) -> Result<usize> {
        ensure!(
            idx < self.len(),
            "array index {} out of bounds (len={})",
            idx,
            self.len()
        );
        Ok(self.data_start_fixed() + idx * size)
    }

    pub fn get_bool(&self, idx: usize) -> Result<bool> {
        let offset = self.fixed_offset(idx, 1)?;
        Ok(self.data[offset] != 0)
    }

    pub fn get_int8(&self, idx: usize) -> Result<i8> {
        let offset = self.fixed_offset(idx, 1)?;
        Ok(self.data[offset] as i8)
    }

    pub fn get_int16(&self, idx: usize) -> Result<i16> {
        let offset = self.fixed_offset(idx, 2)?;
        Ok(i16::from_le_bytes([
            self.data[offset],
            self.data[offset + 1],
        ]))
    }

    pub fn get_int32(&self, idx: usize) -> Result<i32> {
        let offset = self.fixed_offset(idx, 4)?;
        Ok(i32::from_le_bytes([
            self.data[offset],
            self.data[offset + 1],
            self.data[offset + 2],
            self.data[offset + 3],
        ]))
    }

    pub fn get_int64(&self, idx: usize) -> Result<i64> {
        let offset = self.fixed_offset(idx, 8)?;
        let bytes: [u8; 8] = self.data[offset..offset + 8].try_into().unwrap();
        Ok(i64::from_le_bytes(bytes))
    }

    pub fn get_float(&self, idx: usize) -> Result<f32> {
        let offset = self.fixed_offset(idx, 4)?;
        Ok(f32::from_le_bytes([
            self.data[offset],
            self.data[offset + 1],
            self.data[offset + 2],
            self.data[offset + 3],
        ]))
    }

    pub fn get_double(&self, idx: usize) -> Result<f64> {
        let offset = self.fixed_offset(idx, 8)?;
        let bytes: [u8; 8] = self.data[offset..offset + 8].try_into().unwrap();
        Ok(f64::from_le_bytes(bytes))
    }

    pub fn get_str(&self, idx: usize) -> Result<&'a str> {
        if self.is_null(idx) {
            bail!("array element {} is null", idx);
        }
        let (start, end) = self.get_var_bounds(idx)?;
        let bytes = &self.data[start..end];
        std::str::from_utf8(bytes)
            .map_err(|e| eyre::eyre!("invalid UTF-8 in array string element {}: {}", idx, e))
    }
}

/// Incremental encoder for one element array.
pub struct ArrayBuilder {
    elem_type: DataType,
    null_bitmap: Vec<u8>,
    offsets: Vec<u32>,
    data: Vec<u8>,
    count: u16,
}

impl ArrayBuilder {
    pub fn new(elem_type: DataType) -> Self {
        Self {
            elem_type,
            null_bitmap: Vec::new(),
            offsets: Vec::new(),
            data: Vec::new(),
            count: 0,
        }
    }

    pub fn elem_type(&self) -> DataType {
        self.elem_type
    }

    pub fn len(&self) -> usize {
        self.count as usize
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    fn set_null_bit(&mut self, idx: usize) {
        let byte_idx = idx / 8;
        while self.null_bitmap.len() <= byte_idx {
            self.null_bitmap.push(0);
        }
        self.null_bitmap[byte_idx] |= 1 << (idx % 8);
    }

    fn ensure_bitmap_size(&mut self, count: usize) {
        let needed = count.div_ceil(8);
        while self.null_bitmap.len() < needed {
            self.null_bitmap.push(0);
        }
    }

    pub fn push_null(&mut self) {
        let idx = self.count as usize;
        self.set_null_bit(idx);

        if self.elem_type.is_variable() {
            self.offsets.push(self.data.len() as u32);
        } else if let Some(size) = self.elem_type.fixed_size() {
            self.data.extend(std::iter::repeat_n(0u8, size));
        }

        self.count += 1;
        self.ensure_bitmap_size(self.count as usize);
    }

    pub fn push_bool(&mut self, value: bool) {
        self.ensure_bitmap_size((self.count + 1) as usize);
        self.data.push(value as u8);
        self.count += 1;
    }

    pub fn push_int8(&mut self, value: i8) {
        self.ensure_bitmap_size((self.count + 1) as usize);
        self.data.push(value as u8);
        self.count += 1;
    }

    pub fn push_int16(&mut self, value: i16) {
        self.ensure_bitmap_size((self.count + 1) as usize);
        self.data.extend(value.to_le_bytes());
        self.count += 1;
    }

    pub fn push_int32(&mut self, value: i32) {
        self.ensure_bitmap_size((self.count + 1) as usize);
        self.data.extend(value.to_le_bytes());
        self.count += 1;
    }

    pub fn push_int64(&mut self, value: i64) {
        self.ensure_bitmap_size((self.count + 1) as usize);
        self.data.extend(value.to_le_bytes());
        self.count += 1;
    }

    pub fn push_float(&mut self, value: f32) {
        self.ensure_bitmap_size((self.count + 1) as usize);
        self.data.extend(value.to_le_bytes());
        self.count += 1;
    }

    pub fn push_double(&mut self, value: f64) {
        self.ensure_bitmap_size((self.count + 1) as usize);
        self.data.extend(value.to_le_bytes());
        self.count += 1;
    }

    pub fn push_str(&mut self, value: &str) {
        self.ensure_bitmap_size((self.count + 1) as usize);
        self.offsets.push(self.data.len() as u32);
        self.data.extend(value.as_bytes());
        self.count += 1;
    }

    pub fn build(&self) -> Vec<u8> {
        let is_variable = self.elem_type.is_variable();
        let bitmap_size = (self.count as usize).div_ceil(8);
        let offset_table_size = if is_variable {
            self.count as usize * 4
        } else {
            0
        };
        let total_size = HEADER_SIZE + bitmap_size + offset_table_size + self.data.len();

        let mut buf = Vec::with_capacity(total_size);

        buf.extend((total_size as u32).to_le_bytes());
        buf.push(self.elem_type as u8);
        buf.push(0);
        buf.extend(self.count.to_le_bytes());

        let mut bitmap = self.null_bitmap.clone();
        bitmap.resize(bitmap_size, 0);
        buf.extend(&bitmap);

        if is_variable {
            for offset in &self.offsets {
                buf.extend(offset.to_le_bytes());
            }
        }

        buf.extend(&self.data);

        buf
    }

    pub fn reset(&mut self) {
        self.null_bitmap.clear();
        self.offsets.clear();
        self.data.clear();
        self.count = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn int32_round_trip() {
        let mut builder = ArrayBuilder::new(DataType::Int32);
        builder.push_int32(10);
        builder.push_int32(-20);
        builder.push_int32(30);
        let data = builder.build();

        let view = ArrayView::new(&data).unwrap();
        assert_eq!(view.len(), 3);
        assert_eq!(view.elem_type().unwrap(), DataType::Int32);
        assert_eq!(view.get_int32(0).unwrap(), 10);
        assert_eq!(view.get_int32(1).unwrap(), -20);
        assert_eq!(view.get_int32(2).unwrap(), 30);
    }

    #[test]
    fn string_round_trip() {
        let mut builder = ArrayBuilder::new(DataType::String);
        builder.push_str("alpha");
        builder.push_str("");
        builder.push_str("gamma");
        let data = builder.build();

        let view = ArrayView::new(&data).unwrap();
        assert_eq!(view.len(), 3);
        assert_eq!(view.get_str(0).unwrap(), "alpha");
        assert_eq!(view.get_str(1).unwrap(), "");
        assert_eq!(view.get_str(2).unwrap(), "gamma");
    }

    #[test]
    fn null_elements_tracked_in_bitmap() {
        let mut builder = ArrayBuilder::new(DataType::Int64);
        builder.push_int64(1);
        builder.push_null();
        builder.push_int64(3);
        let data = builder.build();

        let view = ArrayView::new(&data).unwrap();
        assert_eq!(view.len(), 3);
        assert!(!view.is_null(0));
        assert!(view.is_null(1));
        assert!(!view.is_null(2));
        assert_eq!(view.get_int64(1).unwrap(), 0);
    }

    #[test]
    fn null_string_occupies_no_payload() {
        let mut builder = ArrayBuilder::new(DataType::String);
        builder.push_str("a");
        builder.push_null();
        builder.push_str("b");
        let data = builder.build();

        let view = ArrayView::new(&data).unwrap();
        assert!(view.get_str(1).is_err());
        assert_eq!(view.get_str(0).unwrap(), "a");
        assert_eq!(view.get_str(2).unwrap(), "b");
    }

    #[test]
    fn empty_array_is_header_only() {
        let builder = ArrayBuilder::new(DataType::String);
        let data = builder.build();
        assert_eq!(data.len(), 8);

        let view = ArrayView::new(&data).unwrap();
        assert!(view.is_empty());
        assert_eq!(view.elem_type().unwrap(), DataType::String);
    }

    #[test]
    fn out_of_bounds_access_fails() {
        let mut builder = ArrayBuilder::new(DataType::Int32);
        builder.push_int32(1);
        let data = builder.build();

        let view = ArrayView::new(&data).unwrap();
        let result = view.get_int32(1);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("out of bounds"));
    }

    #[test]
    fn view_rejects_truncated_buffer() {
        let result = ArrayView::new(&[0u8; 4]);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("too short"));
    }

    #[test]
    fn builder_reset_reuses_allocation() {
        let mut builder = ArrayBuilder::new(DataType::Int32);
        builder.push_int32(1);
        builder.reset();
        builder.push_int32(2);
        let data = builder.build();

        let view = ArrayView::new(&data).unwrap();
        assert_eq!(view.len(), 1);
        assert_eq!(view.get_int32(0).unwrap(), 2);
    }
}
