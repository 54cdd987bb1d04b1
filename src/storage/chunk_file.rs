//! # Sequential Chunk Files
//!
//! A `ChunkFile` owns one open file and packs file-backed chunks into it
//! back-to-back. Each chunk's size is a page multiple, and the next chunk
//! starts exactly where the previous one ended, so every chunk stays
//! independently mappable and unmappable.
//!
//! The offset cursor is the only shared state; a mutex serializes appends
//! while finished chunks remain freely readable from any thread.

use std::fs::File;
use std::path::Path;

use eyre::{Result, WrapErr};
use parking_lot::Mutex;

use crate::batch::BatchSource;
use crate::chunk::{Chunk, ChunkBuilder};
use crate::field::FieldDef;

/// Appends chunks sequentially to one file at page-aligned offsets.
#[derive(Debug)]
pub struct ChunkFile {
    file: File,
    next_offset: Mutex<u64>,
}

impl ChunkFile {
    /// Creates (or truncates) the file at `path`.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::options()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
            .wrap_err_with(|| format!("failed to create chunk file '{}'", path.display()))?;

        Ok(Self {
            file,
            next_offset: Mutex::new(0),
        })
    }

    /// Builds a chunk from `source` at the current end of the file and
    /// advances the cursor by the chunk's (page-aligned) size.
    pub fn append(&self, field: &FieldDef, source: &mut dyn BatchSource) -> Result<Chunk> {
        let mut offset = self.next_offset.lock();
        let chunk = ChunkBuilder::new(field).build_in_file(source, &self.file, *offset)?;
        *offset += chunk.size() as u64;
        Ok(chunk)
    }

    /// Bytes consumed so far; also the offset the next chunk will occupy.
    pub fn len(&self) -> u64 {
        *self.next_offset.lock()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn file(&self) -> &File {
        &self.file
    }
}
