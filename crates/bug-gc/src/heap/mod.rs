//! Two-generation heap storage.
//!
//! New allocations are bump-allocated in a fixed young [`Arena`]; survivors
//! of a collection are copied into the [`OldGeneration`], where each block is
//! a separate system allocation. A [`SlotTable`] gives every allocation a
//! [`Handle`] that stays valid across that move.
//!
//! ```text
//!  Handle ──► SlotTable ──► Block ──► [ AllocationHeader | payload ]
//!                              │
//!                              ├─ young: inside the arena mapping
//!                              └─ old:   its own std::alloc block
//! ```

mod arena;
mod header;
mod old;
mod slots;

use std::alloc::Layout;
use std::ops::Range;

use crate::error::{Result, RuntimeError};
use crate::node::{Handle, Node};

pub(crate) use arena::Arena;
pub(crate) use header::{block_layout, Block};
pub use header::{PayloadKind, BLOCK_ALIGN, HEADER_SIZE, MIN_PAYLOAD};
pub(crate) use old::OldGeneration;
pub(crate) use slots::SlotTable;

/// Which generation currently holds an allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Generation {
    /// The bump arena.
    Young,
    /// The stable heap.
    Old,
}

/// Both generations plus the handle table.
pub struct Heap {
    pub(crate) arena: Arena,
    pub(crate) old: OldGeneration,
    pub(crate) slots: SlotTable,
    max_allocation_bytes: usize,
}

impl Heap {
    pub(crate) fn new(
        arena_bytes: usize,
        populate: bool,
        max_allocation_bytes: usize,
    ) -> Result<Self> {
        let arena = Arena::new(arena_bytes, populate).map_err(RuntimeError::ArenaReservation)?;
        Ok(Self {
            arena,
            old: OldGeneration::new(),
            slots: SlotTable::new(),
            max_allocation_bytes,
        })
    }

    // ------------------------------------------------------------------------
    // Allocation
    // ------------------------------------------------------------------------

    /// Block layout for `count` elements of `kind`, checked against the limit.
    pub(crate) fn layout_for(&self, kind: PayloadKind, count: usize) -> Result<Layout> {
        let too_large = |requested| RuntimeError::AllocationTooLarge {
            requested,
            limit: self.max_allocation_bytes,
        };
        let payload = kind
            .payload_bytes(count)
            .ok_or_else(|| too_large(usize::MAX))?;
        if payload > self.max_allocation_bytes {
            return Err(too_large(payload));
        }
        block_layout(payload).ok_or_else(|| too_large(payload))
    }

    /// Bump-allocates in the arena, or returns `None` if it is full.
    pub(crate) fn try_allocate_young(
        &mut self,
        kind: PayloadKind,
        count: usize,
        layout: Layout,
    ) -> Option<Handle> {
        let ptr = self.arena.try_bump(layout.size())?;
        let index = self.slots.reserve();
        // SAFETY: `ptr` is fresh, aligned arena memory of `layout.size()` bytes.
        let block = unsafe { Block::init(ptr, kind, count, layout, index, false) };
        Some(self.slots.occupy(index, block))
    }

    /// Allocates directly in the old generation.
    pub(crate) fn allocate_old(&mut self, kind: PayloadKind, count: usize, layout: Layout) -> Handle {
        let ptr = OldGeneration::reserve(layout);
        let index = self.slots.reserve();
        // SAFETY: `ptr` was just reserved with `layout`.
        let block = unsafe { Block::init(ptr, kind, count, layout, index, true) };
        self.old.adopt(block);
        self.slots.occupy(index, block)
    }

    // ------------------------------------------------------------------------
    // Payload access
    // ------------------------------------------------------------------------

    fn block_of(&self, handle: Handle, expected: PayloadKind) -> Result<Block> {
        let block = self
            .slots
            .resolve(handle)
            .ok_or(RuntimeError::DanglingHandle(handle))?;
        if block.kind() == expected {
            Ok(block)
        } else {
            Err(RuntimeError::PayloadMismatch {
                handle,
                expected: expected.describe(),
                found: block.kind().describe(),
            })
        }
    }

    /// The node array behind `handle`.
    ///
    /// # Errors
    ///
    /// [`RuntimeError::DanglingHandle`] if the allocation was reclaimed,
    /// [`RuntimeError::PayloadMismatch`] if it holds bytes.
    pub fn objects(&self, handle: Handle) -> Result<&[Node]> {
        let block = self.block_of(handle, PayloadKind::Objects)?;
        // SAFETY: objects block; the borrow of `self` excludes mutation.
        Ok(unsafe { block.objects() })
    }

    /// The node array behind `handle`, mutably.
    ///
    /// # Errors
    ///
    /// As for [`Heap::objects`].
    pub fn objects_mut(&mut self, handle: Handle) -> Result<&mut [Node]> {
        let block = self.block_of(handle, PayloadKind::Objects)?;
        // SAFETY: objects block; the exclusive borrow of `self` excludes
        // every other payload borrow.
        Ok(unsafe { block.objects_mut() })
    }

    /// The bytes behind `handle`.
    ///
    /// # Errors
    ///
    /// [`RuntimeError::DanglingHandle`] if the allocation was reclaimed,
    /// [`RuntimeError::PayloadMismatch`] if it holds objects.
    pub fn bytes(&self, handle: Handle) -> Result<&[u8]> {
        let block = self.block_of(handle, PayloadKind::Bytes)?;
        // SAFETY: bytes block; the borrow of `self` excludes mutation.
        Ok(unsafe { block.bytes() })
    }

    /// The bytes behind `handle`, mutably.
    ///
    /// # Errors
    ///
    /// As for [`Heap::bytes`].
    pub fn bytes_mut(&mut self, handle: Handle) -> Result<&mut [u8]> {
        let block = self.block_of(handle, PayloadKind::Bytes)?;
        // SAFETY: bytes block; the exclusive borrow of `self` excludes
        // every other payload borrow.
        Ok(unsafe { block.bytes_mut() })
    }

    // ------------------------------------------------------------------------
    // Introspection
    // ------------------------------------------------------------------------

    /// Returns `true` if `handle` refers to a live allocation.
    #[must_use]
    pub fn contains(&self, handle: Handle) -> bool {
        self.slots.resolve(handle).is_some()
    }

    /// The generation holding `handle`, or `None` if it was reclaimed.
    #[must_use]
    pub fn generation_of(&self, handle: Handle) -> Option<Generation> {
        self.slots.resolve(handle).map(|block| {
            if block.is_old() {
                Generation::Old
            } else {
                Generation::Young
            }
        })
    }

    /// Current payload address of `handle`.
    ///
    /// Changes when the allocation is promoted.
    #[must_use]
    pub fn address_of(&self, handle: Handle) -> Option<usize> {
        self.slots.resolve(handle).map(|block| block.payload() as usize)
    }

    /// Element count (objects) or byte count (bytes) of `handle`.
    #[must_use]
    pub fn payload_len(&self, handle: Handle) -> Option<usize> {
        self.slots.resolve(handle).map(Block::count)
    }

    /// Payload kind of `handle`.
    #[must_use]
    pub fn payload_kind(&self, handle: Handle) -> Option<PayloadKind> {
        self.slots.resolve(handle).map(Block::kind)
    }

    /// Address range of the young arena mapping.
    #[must_use]
    pub fn arena_range(&self) -> Range<usize> {
        self.arena.address_range()
    }

    /// Usable arena size.
    #[must_use]
    pub const fn arena_capacity(&self) -> usize {
        self.arena.capacity()
    }

    /// Bytes bump-allocated since the last collection.
    #[must_use]
    pub const fn young_bytes(&self) -> usize {
        self.arena.used()
    }

    /// Number of blocks in the old generation.
    #[must_use]
    pub fn old_blocks(&self) -> usize {
        self.old.len()
    }

    /// Bytes held by the old generation.
    #[must_use]
    pub const fn old_bytes(&self) -> usize {
        self.old.bytes()
    }

    /// Allocations tracked in either generation.
    #[must_use]
    pub const fn live_allocations(&self) -> usize {
        self.slots.live()
    }
}
