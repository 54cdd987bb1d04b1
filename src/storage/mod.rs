//! # Storage Layer
//!
//! Backing regions for chunks. A chunk's bytes live either in an aligned
//! heap buffer or in a page-aligned, memory-mapped slice of a caller-supplied
//! file. Both satisfy the same contract: a fixed-size byte region, writable
//! during construction, immutable after freeze, alive as long as the chunk.
//!
//! ## Page Alignment
//!
//! File-backed regions start at a page-aligned offset and span a page-aligned
//! length, so chunks packed back-to-back in one file (next offset = previous
//! offset + previous chunk size) can be mapped and unmapped independently;
//! no two chunks ever share a page.
//!
//! ## Module Organization
//!
//! - `backing`: `AlignedBuf`, `BackingMut`, `Backing`
//! - `chunk_file`: sequential chunk appender over one open file

mod backing;
mod chunk_file;

pub use backing::{AlignedBuf, Backing, BackingMut};
pub use chunk_file::ChunkFile;

use std::sync::OnceLock;

/// Alignment of every section inside a chunk region. Offset tables are u64
/// and typed fixed-width access casts the data section, so sections never
/// start on a stray byte.
pub const SECTION_ALIGN: usize = 8;

/// Host memory-page size, cached after the first query.
pub fn page_size() -> usize {
    static PAGE_SIZE: OnceLock<usize> = OnceLock::new();
    *PAGE_SIZE.get_or_init(|| {
        // SAFETY: sysconf(_SC_PAGESIZE) has no preconditions; it reads a
        // process-constant kernel value and cannot fail on any supported
        // platform (a negative return would mean a hostless libc).
        let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
        usize::try_from(size).unwrap_or(4096)
    })
}

/// Rounds `n` up to the next multiple of `align` (a power of two).
pub fn align_up(n: usize, align: usize) -> usize {
    debug_assert!(align.is_power_of_two());
    (n + align - 1) & !(align - 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_size_is_a_power_of_two() {
        let size = page_size();
        assert!(size >= 4096);
        assert!(size.is_power_of_two());
    }

    #[test]
    fn align_up_rounds_correctly() {
        assert_eq!(align_up(0, 8), 0);
        assert_eq!(align_up(1, 8), 8);
        assert_eq!(align_up(8, 8), 8);
        assert_eq!(align_up(9, 8), 16);
        assert_eq!(align_up(4097, 4096), 8192);
    }
}
