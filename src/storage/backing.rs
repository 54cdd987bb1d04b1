//! # Chunk Backing Regions
//!
//! A chunk is materialized in two phases: the builder sizes the region
//! exactly, acquires a writable `BackingMut`, fills it, then freezes it into
//! an immutable `Backing` that the chunk owns for its lifetime. File-backed
//! regions cannot be resized after mapping, which is why sizing always
//! precedes writing.
//!
//! ## Heap vs. Mapped
//!
//! | Backing | Region size | Base alignment | Freed by |
//! |---------|-------------|----------------|----------|
//! | Heap    | exact bytes requested | 8 | deallocation on drop |
//! | Mapped  | rounded up to page size | page | munmap on drop |
//!
//! A mapped region is a slice of a caller-supplied file starting at a
//! page-aligned offset. Freezing flushes the written bytes and remaps
//! read-only, so a finished chunk can never be written through again.

use std::alloc::{alloc_zeroed, dealloc, Layout};
use std::fs::File;
use std::ops::{Deref, DerefMut};
use std::ptr::NonNull;

use eyre::{ensure, Result, WrapErr};
use memmap2::{Mmap, MmapMut, MmapOptions};

use super::{align_up, page_size, SECTION_ALIGN};

/// Heap buffer with 8-byte base alignment, zeroed on allocation.
///
/// `Vec<u8>` makes no alignment promise; chunk regions hold u64 offset
/// tables and typed fixed-width data, so the base must not float.
#[derive(Debug)]
pub struct AlignedBuf {
    ptr: NonNull<u8>,
    len: usize,
}

impl AlignedBuf {
    pub fn zeroed(len: usize) -> Result<Self> {
        if len == 0 {
            return Ok(Self {
                ptr: NonNull::dangling(),
                len: 0,
            });
        }

        let layout = Layout::from_size_align(len, SECTION_ALIGN)
            .wrap_err_with(|| format!("invalid heap region layout for {} bytes", len))?;

        // SAFETY: layout has nonzero size (len == 0 returned above) and a
        // valid power-of-two alignment. The pointer is checked for null
        // before use and released with the identical layout in Drop.
        let raw = unsafe { alloc_zeroed(layout) };
        let ptr = NonNull::new(raw)
            .ok_or_else(|| eyre::eyre!("failed to allocate {} byte heap region", len))?;

        Ok(Self { ptr, len })
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl Deref for AlignedBuf {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        // SAFETY: ptr is valid for len bytes (allocated in zeroed(), or
        // dangling with len == 0, which from_raw_parts permits), and the
        // buffer is never aliased mutably while a shared borrow exists.
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }
}

impl DerefMut for AlignedBuf {
    fn deref_mut(&mut self) -> &mut [u8] {
        // SAFETY: as above, and &mut self guarantees exclusive access.
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }
}

impl Drop for AlignedBuf {
    fn drop(&mut self) {
        if self.len > 0 {
            // SAFETY: ptr was allocated in zeroed() with exactly this layout.
            unsafe {
                dealloc(
                    self.ptr.as_ptr(),
                    Layout::from_size_align_unchecked(self.len, SECTION_ALIGN),
                );
            }
        }
    }
}

// SAFETY: AlignedBuf exclusively owns its allocation; sending or sharing it
// across threads is no different from Vec<u8>.
unsafe impl Send for AlignedBuf {}
unsafe impl Sync for AlignedBuf {}

/// Writable backing region, alive only during chunk construction.
#[derive(Debug)]
pub enum BackingMut {
    Heap(AlignedBuf),
    Mapped(MmapMut),
}

impl BackingMut {
    /// Heap region of exactly `size` bytes.
    pub fn heap(size: usize) -> Result<Self> {
        Ok(BackingMut::Heap(AlignedBuf::zeroed(size)?))
    }

    /// Page-aligned region of the given file. `offset` must already be
    /// page-aligned; the mapped length is `size` rounded up to a page
    /// multiple (at least one page), and the file is extended to cover it.
    pub fn mapped(file: &File, offset: u64, size: usize) -> Result<Self> {
        let page = page_size();
        ensure!(
            offset % page as u64 == 0,
            "file offset {} is not aligned to page size {}",
            offset,
            page
        );

        let mapped_len = align_up(size.max(1), page);
        let end = offset + mapped_len as u64;

        let file_len = file
            .metadata()
            .wrap_err("failed to stat chunk file")?
            .len();
        if file_len < end {
            file.set_len(end)
                .wrap_err_with(|| format!("failed to extend chunk file to {} bytes", end))?;
        }

        // SAFETY: map_mut is unsafe because the underlying file could be
        // modified externally. This is safe for chunk regions because:
        // 1. The caller hands this file to the chunk engine exclusively and
        //    places successive chunks at disjoint, page-aligned offsets.
        // 2. The mapping covers [offset, offset + mapped_len), which the
        //    set_len above guarantees exists.
        // 3. The mapping's lifetime is tied to BackingMut/Backing, so no
        //    access can outlive the region.
        let mmap = unsafe {
            MmapOptions::new()
                .offset(offset)
                .len(mapped_len)
                .map_mut(file)
                .wrap_err_with(|| {
                    format!(
                        "failed to map {} bytes of chunk file at offset {}",
                        mapped_len, offset
                    )
                })?
        };

        Ok(BackingMut::Mapped(mmap))
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        match self {
            BackingMut::Heap(buf) => buf,
            BackingMut::Mapped(mmap) => mmap,
        }
    }

    /// Flushes (mapped regions) and seals the region read-only.
    pub fn freeze(self) -> Result<Backing> {
        match self {
            BackingMut::Heap(buf) => Ok(Backing::Heap(buf)),
            BackingMut::Mapped(mmap) => {
                mmap.flush()
                    .wrap_err("failed to flush chunk region before freeze")?;
                let mmap = mmap
                    .make_read_only()
                    .wrap_err("failed to remap chunk region read-only")?;
                Ok(Backing::Mapped(mmap))
            }
        }
    }
}

/// Immutable backing region owned by a finished chunk.
#[derive(Debug)]
pub enum Backing {
    Heap(AlignedBuf),
    Mapped(Mmap),
}

impl Backing {
    pub fn as_slice(&self) -> &[u8] {
        match self {
            Backing::Heap(buf) => buf,
            Backing::Mapped(mmap) => mmap,
        }
    }

    /// Total byte size of the region: exact for heap chunks, a page multiple
    /// for mapped chunks.
    pub fn len(&self) -> usize {
        self.as_slice().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_mapped(&self) -> bool {
        matches!(self, Backing::Mapped(_))
    }

    /// Hints the OS to fault the whole region in ahead of a sequential scan.
    /// No-op for heap regions.
    pub fn prefetch(&self) {
        #[cfg(unix)]
        if let Backing::Mapped(mmap) = self {
            if !mmap.is_empty() {
                // SAFETY: madvise with MADV_WILLNEED is a hint to the kernel
                // and does not cause undefined behavior. The range covers
                // exactly the live mapping owned by this Backing.
                unsafe {
                    libc::madvise(
                        mmap.as_ptr() as *mut libc::c_void,
                        mmap.len(),
                        libc::MADV_WILLNEED,
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn aligned_buf_is_zeroed_and_aligned() {
        let buf = AlignedBuf::zeroed(100).unwrap();
        assert_eq!(buf.len(), 100);
        assert!(buf.iter().all(|&b| b == 0));
        assert_eq!(buf.as_ptr() as usize % SECTION_ALIGN, 0);
    }

    #[test]
    fn zero_length_buf_is_valid() {
        let buf = AlignedBuf::zeroed(0).unwrap();
        assert!(buf.is_empty());
        assert_eq!(&buf[..], &[] as &[u8]);
    }

    #[test]
    fn heap_backing_round_trip() {
        let mut backing = BackingMut::heap(16).unwrap();
        backing.as_mut_slice()[0] = 0xAB;
        backing.as_mut_slice()[15] = 0xCD;

        let frozen = backing.freeze().unwrap();
        assert_eq!(frozen.len(), 16);
        assert!(!frozen.is_mapped());
        assert_eq!(frozen.as_slice()[0], 0xAB);
        assert_eq!(frozen.as_slice()[15], 0xCD);
    }

    #[test]
    fn mapped_backing_rounds_to_page_size() {
        let dir = tempdir().unwrap();
        let file = File::options()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(dir.path().join("chunks"))
            .unwrap();

        let mut backing = BackingMut::mapped(&file, 0, 100).unwrap();
        backing.as_mut_slice()[0] = 0x42;
        let frozen = backing.freeze().unwrap();

        assert!(frozen.is_mapped());
        assert_eq!(frozen.len() % page_size(), 0);
        assert_eq!(frozen.as_slice()[0], 0x42);
    }

    #[test]
    fn mapped_backing_rejects_unaligned_offset() {
        let dir = tempdir().unwrap();
        let file = File::options()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(dir.path().join("chunks"))
            .unwrap();

        let result = BackingMut::mapped(&file, 7, 100);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("not aligned"));
    }

    #[test]
    fn disjoint_mapped_regions_are_independent() {
        let dir = tempdir().unwrap();
        let file = File::options()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(dir.path().join("chunks"))
            .unwrap();

        let page = page_size();

        let mut first = BackingMut::mapped(&file, 0, 8).unwrap();
        first.as_mut_slice()[0] = 0x11;
        let first = first.freeze().unwrap();

        let mut second = BackingMut::mapped(&file, first.len() as u64, 8).unwrap();
        second.as_mut_slice()[0] = 0x22;
        let second = second.freeze().unwrap();

        assert_eq!(first.len(), page);
        assert_eq!(first.as_slice()[0], 0x11);
        assert_eq!(second.as_slice()[0], 0x22);

        // Dropping the first mapping must leave the second readable.
        drop(first);
        assert_eq!(second.as_slice()[0], 0x22);
    }
}
