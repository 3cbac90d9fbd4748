//! The old generation: individually allocated, individually freed blocks.

use std::alloc::{alloc, dealloc, handle_alloc_error, Layout};
use std::ptr::NonNull;

use super::header::Block;

/// Long-lived blocks that survive arena resets.
///
/// Blocks are never moved once here; fragmentation is accepted.
pub struct OldGeneration {
    blocks: Vec<Block>,
    bytes: usize,
}

impl OldGeneration {
    pub const fn new() -> Self {
        Self {
            blocks: Vec::new(),
            bytes: 0,
        }
    }

    /// Reserves raw memory for one block.
    ///
    /// The caller must initialise a header in it and hand it back through
    /// [`OldGeneration::adopt`]. Allocation failure is fatal.
    pub fn reserve(layout: Layout) -> NonNull<u8> {
        // SAFETY: block layouts always have a non-zero size.
        let ptr = unsafe { alloc(layout) };
        NonNull::new(ptr).unwrap_or_else(|| handle_alloc_error(layout))
    }

    /// Takes ownership of an initialised block.
    pub fn adopt(&mut self, block: Block) {
        debug_assert!(block.is_old());
        self.bytes += block.size();
        self.blocks.push(block);
    }

    /// Frees every unmarked block and clears the mark on survivors.
    ///
    /// `on_free` sees each block just before it is released. Returns the
    /// number of blocks and bytes freed.
    pub fn sweep(&mut self, mut on_free: impl FnMut(Block)) -> (usize, usize) {
        let mut freed = 0;
        let mut freed_bytes = 0;
        self.blocks.retain(|&block| {
            assert!(
                block.is_valid(),
                "sweep phase: corrupt header at {:#x}",
                block.addr()
            );
            if block.is_marked() {
                block.set_marked(false);
                true
            } else {
                freed += 1;
                freed_bytes += block.size();
                on_free(block);
                // SAFETY: the block came from `reserve` with this layout and
                // is dropped from the list here.
                unsafe { release(block) };
                false
            }
        });
        self.bytes -= freed_bytes;
        (freed, freed_bytes)
    }

    pub fn iter(&self) -> impl Iterator<Item = Block> + '_ {
        self.blocks.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub const fn bytes(&self) -> usize {
        self.bytes
    }
}

impl Drop for OldGeneration {
    fn drop(&mut self) {
        for block in self.blocks.drain(..) {
            // SAFETY: every adopted block came from `reserve` and is freed once.
            unsafe { release(block) };
        }
    }
}

/// # Safety
///
/// `block` must have been allocated by [`OldGeneration::reserve`] and must
/// not be used afterwards.
unsafe fn release(block: Block) {
    // SAFETY: the block's layout is the one passed to `reserve`.
    unsafe { dealloc(block.as_ptr(), block.layout()) };
}
