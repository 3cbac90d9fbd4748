//! The young generation: a bump-pointer arena over one OS mapping.

use std::io;
use std::ops::Range;
use std::ptr::NonNull;

use sys_alloc::{Mmap, MmapOptions};

use super::header::Block;

/// Fixed-size bump arena.
///
/// Blocks are laid out back to back from the start of the region; walking
/// them by their recorded size visits every young allocation in order.
/// A zero-capacity arena maps nothing and never hands out memory.
pub struct Arena {
    region: Option<Mmap>,
    capacity: usize,
    next: usize,
}

impl Arena {
    /// Maps a zero-filled region of at least `capacity` bytes.
    pub fn new(capacity: usize, populate: bool) -> io::Result<Self> {
        let region = if capacity == 0 {
            None
        } else {
            Some(
                MmapOptions::new()
                    .len(capacity)
                    .populate(populate)
                    .map_anon()?,
            )
        };
        Ok(Self {
            region,
            capacity,
            next: 0,
        })
    }

    /// Usable bytes. The mapping itself may be larger after page rounding.
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Bytes handed out since the last reset.
    pub const fn used(&self) -> usize {
        self.next
    }

    /// Bytes still available.
    pub const fn remaining(&self) -> usize {
        self.capacity - self.next
    }

    /// Returns `true` if `size` bytes could fit after a reset.
    pub const fn could_fit(&self, size: usize) -> bool {
        size <= self.capacity
    }

    /// Bumps `size` bytes, or returns `None` if they do not fit.
    pub fn try_bump(&mut self, size: usize) -> Option<NonNull<u8>> {
        if size > self.remaining() {
            return None;
        }
        let region = self.region.as_ref()?;
        // SAFETY: `next + size <= capacity <= region.len()`.
        let ptr = unsafe { region.ptr().add(self.next) };
        self.next += size;
        NonNull::new(ptr)
    }

    /// Forgets every block and zeroes the used prefix.
    pub fn reset(&mut self) {
        if let Some(region) = &mut self.region {
            region.zero(0, self.next);
        }
        self.next = 0;
    }

    /// Walks every block allocated since the last reset.
    pub fn blocks(&self) -> Blocks<'_> {
        Blocks {
            arena: self,
            offset: 0,
        }
    }

    /// Address range of the mapping, empty when nothing is mapped.
    pub fn address_range(&self) -> Range<usize> {
        self.region.as_ref().map_or(0..0, Mmap::address_range)
    }
}

/// Iterator over the arena's blocks, in allocation order.
pub struct Blocks<'a> {
    arena: &'a Arena,
    offset: usize,
}

impl Iterator for Blocks<'_> {
    type Item = Block;

    fn next(&mut self) -> Option<Block> {
        if self.offset >= self.arena.next {
            return None;
        }
        let region = self.arena.region.as_ref()?;
        // SAFETY: `offset` is the start of a block written by `Block::init`
        // since every bump is followed by header initialisation.
        let block = unsafe {
            let ptr = region.ptr().add(self.offset);
            Block::from_raw(NonNull::new_unchecked(ptr))
        };
        assert!(
            block.is_valid() && block.size() > 0,
            "young walk: corrupt header at arena offset {}",
            self.offset
        );
        self.offset += block.size();
        Some(block)
    }
}
