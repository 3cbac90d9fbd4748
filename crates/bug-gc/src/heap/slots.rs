//! Handle table mapping stable handles to current block locations.

use std::num::NonZeroU32;

use super::header::Block;
use crate::node::Handle;

struct Slot {
    version: NonZeroU32,
    block: Option<Block>,
}

/// Slot map from [`Handle`] to [`Block`].
///
/// Promotion moves a block by rewriting its slot, so handles held in the
/// live graph never need fixing up.
pub struct SlotTable {
    slots: Vec<Slot>,
    free: Vec<u32>,
    live: usize,
}

impl SlotTable {
    pub const fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            live: 0,
        }
    }

    /// Picks the slot index the next allocation will occupy.
    ///
    /// # Panics
    ///
    /// Panics if more than `u32::MAX` slots would be needed.
    pub fn reserve(&mut self) -> u32 {
        if let Some(&index) = self.free.last() {
            return index;
        }
        let index = u32::try_from(self.slots.len()).expect("handle table exhausted");
        self.slots.push(Slot {
            version: NonZeroU32::MIN,
            block: None,
        });
        self.free.push(index);
        index
    }

    /// Fills the slot last returned by [`SlotTable::reserve`].
    pub fn occupy(&mut self, index: u32, block: Block) -> Handle {
        let popped = self.free.pop();
        debug_assert_eq!(popped, Some(index), "occupy must follow reserve");
        let slot = &mut self.slots[index as usize];
        debug_assert!(slot.block.is_none());
        slot.block = Some(block);
        self.live += 1;
        Handle::new(index, slot.version)
    }

    /// The block behind `handle`, if it is still live.
    pub fn resolve(&self, handle: Handle) -> Option<Block> {
        let slot = self.slots.get(handle.index() as usize)?;
        if slot.version.get() == handle.version() {
            slot.block
        } else {
            None
        }
    }

    /// Points an occupied slot at a new block.
    pub fn relocate(&mut self, index: u32, block: Block) {
        let slot = &mut self.slots[index as usize];
        assert!(slot.block.is_some(), "relocating vacant slot {index}");
        slot.block = Some(block);
    }

    /// Vacates a slot. Outstanding handles to it become dangling.
    pub fn release(&mut self, index: u32) {
        let slot = &mut self.slots[index as usize];
        assert!(slot.block.take().is_some(), "double release of slot {index}");
        slot.version = slot.version.checked_add(1).unwrap_or(NonZeroU32::MIN);
        self.free.push(index);
        self.live -= 1;
    }

    /// Number of occupied slots.
    pub const fn live(&self) -> usize {
        self.live
    }
}
