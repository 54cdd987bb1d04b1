//! # chunkstore - Columnar Chunk Storage & View Engine
//!
//! chunkstore is the column-chunk layer of an embedded vector-database
//! execution engine: it materializes decoded columnar batches into typed,
//! immutable, optionally memory-mapped chunks and exposes bounds-checked,
//! zero-copy views over their rows. This implementation prioritizes:
//!
//! - **Zero-copy reads**: views are slices into the chunk's own region
//! - **Exact sizing**: regions are sized before a single byte is written
//! - **Safe packing**: file-backed chunks are page-aligned and never share
//!   a page, so neighbors map and unmap independently
//!
//! ## Quick Start
//!
//! ```ignore
//! use chunkstore::{ChunkBuilder, ColumnBatch, ColumnData, FieldDef,
//!                  MemoryBatchSource, DataType};
//!
//! let field = FieldDef::new("title", 1, DataType::String, false)?;
//! let batch = ColumnBatch::new(ColumnData::String(vec!["a".into(), "b".into()]))?;
//! let mut source = MemoryBatchSource::single(batch);
//!
//! let chunk = ChunkBuilder::new(&field).build(&mut source)?;
//! let (views, valid) = chunk.as_string().unwrap().string_views(None)?;
//! assert_eq!(views, ["a", "b"]);
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────┐
//! │   Variant Views (span / string_views /    │
//! │        array views / sparse rows)         │
//! ├───────────────────────────────────────────┤
//! │     Chunk (closed union of 5 layouts)     │
//! ├───────────────────────────────────────────┤
//! │   ChunkBuilder (drain → plan → write)     │
//! ├─────────────────────┬─────────────────────┤
//! │  Batch Sources      │   Backing Store     │
//! │  (memory / stream)  │   (heap / mmap)     │
//! └─────────────────────┴─────────────────────┘
//! ```
//!
//! ## Module Overview
//!
//! - [`types`]: `DataType` and `Metric` tags
//! - [`field`]: immutable field descriptors
//! - [`batch`]: decoded column batches and the `BatchSource` boundary
//! - [`stream`]: serialized column stream codec (timestamps + framing)
//! - [`array`]: self-describing element arrays for nested-array rows
//! - [`sparse`]: sparse float vectors and their packed pair encoding
//! - [`storage`]: aligned heap buffers, mapped file regions, chunk files
//! - [`chunk`]: the five chunk variants, builder, and view protocols
//!
//! ## Concurrency
//!
//! Construction is single-threaded per destination region. A finished
//! `Chunk` is immutable, `Send + Sync`, and safe for unsynchronized
//! concurrent readers; every view call is a pure function of chunk state
//! and the requested range.

pub mod array;
pub mod batch;
mod bitmap;
pub mod chunk;
pub mod field;
pub mod sparse;
pub mod storage;
pub mod stream;
pub mod types;

pub use array::{ArrayBuilder, ArrayView};
pub use batch::{BatchSource, ColumnBatch, ColumnData, MemoryBatchSource};
pub use chunk::{
    ArrayChunk, Chunk, ChunkBuilder, FixedWidthChunk, RowRange, Span, SparseFloatVectorChunk,
    SparseRow, StringChunk,
};
pub use field::FieldDef;
pub use sparse::{SparseEntry, SparseVector};
pub use storage::ChunkFile;
pub use stream::{StreamHeader, StreamReader, StreamWriter};
pub use types::{DataType, Metric};
