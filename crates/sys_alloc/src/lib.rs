//! Anonymous memory regions straight from the operating system.
//!
//! The bug runtime keeps its young generation in one contiguous region that
//! lives as long as the runtime context. This crate hands out such regions,
//! rounded to whole pages and zero-filled by the OS on first touch.

use std::io;
use std::ops::Range;

#[cfg(unix)]
mod unix;
#[cfg(unix)]
use unix as os;

#[cfg(windows)]
mod windows;
#[cfg(windows)]
use windows as os;

pub use os::page_size;

/// Rounds `len` up to a whole number of pages.
///
/// Returns `None` if the rounded length does not fit in `usize`.
#[must_use]
pub fn round_to_pages(len: usize) -> Option<usize> {
    let page = page_size();
    len.checked_add(page - 1).map(|l| l & !(page - 1))
}

/// A handle to an anonymous memory mapping.
///
/// The region is unmapped when this handle is dropped.
pub struct Mmap {
    inner: os::MmapInner,
}

impl Mmap {
    /// Returns a pointer to the start of the mapping.
    #[must_use]
    pub fn ptr(&self) -> *mut u8 {
        self.inner.ptr()
    }

    /// Returns the length of the mapping in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Returns `true` if the mapping has no bytes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The address range covered by the mapping.
    #[must_use]
    pub fn address_range(&self) -> Range<usize> {
        let start = self.ptr() as usize;
        start..start + self.len()
    }

    /// Overwrites `len` bytes starting at `offset` with zeroes.
    ///
    /// # Panics
    ///
    /// Panics if `offset + len` runs past the end of the mapping.
    pub fn zero(&mut self, offset: usize, len: usize) {
        let end = offset.checked_add(len).expect("zero range overflows");
        assert!(
            end <= self.len(),
            "zero range {offset}..{end} exceeds mapping of {} bytes",
            self.len()
        );
        // SAFETY: the range was just checked against the mapping, which is
        // readable and writable for its whole length while `self` is alive.
        unsafe { std::ptr::write_bytes(self.ptr().add(offset), 0, len) };
    }
}

// SAFETY: `Mmap` owns its region exclusively; moving ownership across
// threads is sound, and shared access only reads the base pointer.
unsafe impl Send for Mmap {}
unsafe impl Sync for Mmap {}

/// Configuration for creating a memory mapping.
#[derive(Debug, Clone, Default)]
pub struct MmapOptions {
    len: usize,
    populate: bool,
}

impl MmapOptions {
    /// Creates a new `MmapOptions` with length 0.
    /// You must set a length before mapping.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            len: 0,
            populate: false,
        }
    }

    /// Sets the requested length in bytes. The mapping is rounded up to
    /// whole pages.
    #[must_use]
    pub const fn len(mut self, len: usize) -> Self {
        self.len = len;
        self
    }

    /// Sets whether to pre-populate (prefault) the page tables.
    ///
    /// On Linux, this adds `MAP_POPULATE`.
    #[must_use]
    pub const fn populate(mut self, populate: bool) -> Self {
        self.populate = populate;
        self
    }

    /// Creates an anonymous, zero-filled, read-write mapping.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` for a zero length or a length that overflows
    /// when rounded to pages, and the OS error if the mapping fails.
    pub fn map_anon(&self) -> io::Result<Mmap> {
        if self.len == 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "length must be greater than 0",
            ));
        }
        let len = round_to_pages(self.len).ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "length overflows page rounding")
        })?;

        // SAFETY: we request a fresh mapping at an OS-chosen address, so no
        // existing memory is aliased or replaced.
        let inner = unsafe { os::MmapInner::map_anon(len, self.populate)? };

        Ok(Mmap { inner })
    }
}
