//! Allocation headers and the raw block view.

use std::alloc::Layout;
use std::mem::size_of;
use std::ptr::NonNull;

use crate::node::Node;

// ============================================================================
// Constants
// ============================================================================

/// Alignment of every block, header and payload alike (two machine words).
pub const BLOCK_ALIGN: usize = 2 * size_of::<usize>();

/// Smallest payload a block carries. Zero-size requests round up to this.
pub const MIN_PAYLOAD: usize = 16;

/// Magic number for validating allocation headers ("BUGA" in ASCII).
pub const MAGIC_BLOCK: u32 = 0x4255_4741;

/// Header size, rounded up to block alignment.
pub const HEADER_SIZE: usize = align_up(size_of::<AllocationHeader>());

const FLAG_REACHABLE: u8 = 1 << 0;
const FLAG_OBJECTS: u8 = 1 << 1;
const FLAG_OLD: u8 = 1 << 2;

const fn align_up(n: usize) -> usize {
    (n + BLOCK_ALIGN - 1) & !(BLOCK_ALIGN - 1)
}

// ============================================================================
// Payload kind and sizing
// ============================================================================

/// What a block's payload holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadKind {
    /// An array of [`Node`]s, traced by the collector.
    Objects,
    /// Opaque bytes, never traced.
    Bytes,
}

impl PayloadKind {
    /// Payload size in bytes for `count` elements, or `None` on overflow.
    #[must_use]
    pub const fn payload_bytes(self, count: usize) -> Option<usize> {
        match self {
            Self::Objects => count.checked_mul(size_of::<Node>()),
            Self::Bytes => Some(count),
        }
    }

    /// Plural noun used in diagnostics.
    #[must_use]
    pub const fn describe(self) -> &'static str {
        match self {
            Self::Objects => "objects",
            Self::Bytes => "bytes",
        }
    }
}

/// Layout of a whole block (header + padded payload).
///
/// Returns `None` if the size overflows or exceeds `isize::MAX`.
#[must_use]
pub fn block_layout(payload_bytes: usize) -> Option<Layout> {
    let payload = payload_bytes.max(MIN_PAYLOAD);
    let padded = payload.checked_add(BLOCK_ALIGN - 1)? & !(BLOCK_ALIGN - 1);
    let size = HEADER_SIZE.checked_add(padded)?;
    Layout::from_size_align(size, BLOCK_ALIGN).ok()
}

// ============================================================================
// AllocationHeader
// ============================================================================

/// Metadata in front of every payload, in both generations.
///
/// Never exposed to the mutator.
#[repr(C)]
pub struct AllocationHeader {
    /// Must equal [`MAGIC_BLOCK`]; anything else is heap corruption.
    magic: u32,
    /// Handle-table slot that owns this block.
    slot: u32,
    /// `FLAG_*` bits.
    flags: u8,
    _padding: [u8; 7],
    /// Element count for objects, byte count for bytes.
    count: usize,
    /// Whole block size, header included.
    size: usize,
}

// ============================================================================
// Block - raw view of one allocation
// ============================================================================

/// A pointer to a block header.
///
/// A `Block` is only created over memory that holds an initialised header
/// and is used only while that memory belongs to the heap. The heap drops
/// every `Block` it gave out for a region before releasing the region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Block(NonNull<AllocationHeader>);

impl Block {
    /// Writes a fresh header at `ptr` and initialises the payload.
    ///
    /// # Safety
    ///
    /// `ptr` must be `BLOCK_ALIGN`-aligned and valid for writes of
    /// `layout.size()` bytes, where `layout` came from [`block_layout`] for
    /// the payload of `count` elements of `kind`.
    pub unsafe fn init(
        ptr: NonNull<u8>,
        kind: PayloadKind,
        count: usize,
        layout: Layout,
        slot: u32,
        old: bool,
    ) -> Self {
        let mut flags = 0;
        if kind == PayloadKind::Objects {
            flags |= FLAG_OBJECTS;
        }
        if old {
            flags |= FLAG_OLD;
        }
        let header = ptr.cast::<AllocationHeader>();
        // SAFETY: caller guarantees `ptr` is aligned and writable for the
        // whole block, which starts with the header.
        unsafe {
            header.as_ptr().write(AllocationHeader {
                magic: MAGIC_BLOCK,
                slot,
                flags,
                _padding: [0; 7],
                count,
                size: layout.size(),
            });
        }
        let block = Self(header);
        match kind {
            PayloadKind::Objects => {
                let nodes = block.payload().cast::<Node>();
                for i in 0..count {
                    // SAFETY: the payload holds `count` node-sized, aligned
                    // slots inside the block.
                    unsafe { nodes.add(i).write(Node::Undefined) };
                }
            }
            PayloadKind::Bytes => {
                // SAFETY: the payload holds at least `count` bytes.
                unsafe { std::ptr::write_bytes(block.payload(), 0, count) };
            }
        }
        block
    }

    /// Copies this block into `dst` and marks the copy as old.
    ///
    /// # Safety
    ///
    /// `dst` must be `BLOCK_ALIGN`-aligned, valid for writes of
    /// [`Block::size`] bytes, and must not overlap this block.
    pub unsafe fn copy_to(self, dst: NonNull<u8>) -> Self {
        // SAFETY: caller guarantees `dst` is large enough and disjoint.
        unsafe {
            std::ptr::copy_nonoverlapping(self.0.as_ptr().cast::<u8>(), dst.as_ptr(), self.size());
        }
        let copy = Self(dst.cast());
        copy.set_flag(FLAG_OLD, true);
        copy
    }

    /// Reinterprets a header address found by walking a region.
    ///
    /// # Safety
    ///
    /// `ptr` must point at memory written by [`Block::init`] that is still
    /// owned by the heap.
    pub const unsafe fn from_raw(ptr: NonNull<u8>) -> Self {
        Self(ptr.cast())
    }

    fn header(&self) -> &AllocationHeader {
        // SAFETY: type invariant, the header is initialised and owned by the heap.
        unsafe { self.0.as_ref() }
    }

    fn set_flag(self, flag: u8, on: bool) {
        // SAFETY: type invariant. The collector and allocator are the only
        // writers and run on the mutator thread without outstanding borrows.
        let header = unsafe { &mut *self.0.as_ptr() };
        if on {
            header.flags |= flag;
        } else {
            header.flags &= !flag;
        }
    }

    /// Overwrites the magic word the way a stray write into the heap would.
    #[cfg(test)]
    pub(crate) fn clobber_magic(self) {
        // SAFETY: type invariant; only the header word is touched.
        unsafe { (*self.0.as_ptr()).magic = 0 };
    }

    /// Address of the header.
    #[must_use]
    pub fn addr(self) -> usize {
        self.0.as_ptr() as usize
    }

    /// Pointer to the block start, for freeing.
    #[must_use]
    pub const fn as_ptr(self) -> *mut u8 {
        self.0.as_ptr().cast()
    }

    /// Pointer to the first payload byte.
    #[must_use]
    pub fn payload(self) -> *mut u8 {
        // SAFETY: every block is at least `HEADER_SIZE + MIN_PAYLOAD` bytes.
        unsafe { self.as_ptr().add(HEADER_SIZE) }
    }

    /// Returns `true` if the magic word is intact.
    #[must_use]
    pub fn is_valid(self) -> bool {
        self.header().magic == MAGIC_BLOCK
    }

    /// Payload kind.
    #[must_use]
    pub fn kind(self) -> PayloadKind {
        if self.header().flags & FLAG_OBJECTS == 0 {
            PayloadKind::Bytes
        } else {
            PayloadKind::Objects
        }
    }

    /// Element or byte count.
    #[must_use]
    pub fn count(self) -> usize {
        self.header().count
    }

    /// Whole block size, header included.
    #[must_use]
    pub fn size(self) -> usize {
        self.header().size
    }

    /// Layout the block was allocated with.
    #[must_use]
    pub fn layout(self) -> Layout {
        // SAFETY: `size` was taken from a `Layout` with this alignment.
        unsafe { Layout::from_size_align_unchecked(self.size(), BLOCK_ALIGN) }
    }

    /// Owning handle-table slot.
    #[must_use]
    pub fn slot(self) -> u32 {
        self.header().slot
    }

    /// Returns `true` if the block lives in the old generation.
    #[must_use]
    pub fn is_old(self) -> bool {
        self.header().flags & FLAG_OLD != 0
    }

    /// Returns `true` if the mark bit is set.
    #[must_use]
    pub fn is_marked(self) -> bool {
        self.header().flags & FLAG_REACHABLE != 0
    }

    /// Sets or clears the mark bit.
    pub fn set_marked(self, marked: bool) {
        self.set_flag(FLAG_REACHABLE, marked);
    }

    /// The object payload.
    ///
    /// # Safety
    ///
    /// The block must hold objects, and no mutable borrow of its payload may
    /// overlap `'a`.
    pub unsafe fn objects<'a>(self) -> &'a [Node] {
        // SAFETY: objects blocks hold `count` initialised nodes.
        unsafe { std::slice::from_raw_parts(self.payload().cast::<Node>(), self.count()) }
    }

    /// The object payload, mutably.
    ///
    /// # Safety
    ///
    /// The block must hold objects, and no other borrow of its payload may
    /// overlap `'a`.
    pub unsafe fn objects_mut<'a>(self) -> &'a mut [Node] {
        // SAFETY: objects blocks hold `count` initialised nodes.
        unsafe { std::slice::from_raw_parts_mut(self.payload().cast::<Node>(), self.count()) }
    }

    /// The byte payload.
    ///
    /// # Safety
    ///
    /// The block must hold bytes, and no mutable borrow of its payload may
    /// overlap `'a`.
    pub unsafe fn bytes<'a>(self) -> &'a [u8] {
        // SAFETY: bytes blocks hold `count` initialised bytes.
        unsafe { std::slice::from_raw_parts(self.payload(), self.count()) }
    }

    /// The byte payload, mutably.
    ///
    /// # Safety
    ///
    /// The block must hold bytes, and no other borrow of its payload may
    /// overlap `'a`.
    pub unsafe fn bytes_mut<'a>(self) -> &'a mut [u8] {
        // SAFETY: bytes blocks hold `count` initialised bytes.
        unsafe { std::slice::from_raw_parts_mut(self.payload(), self.count()) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[repr(C, align(16))]
    struct Scratch([u8; 256]);

    #[test]
    fn test_header_is_aligned() {
        assert_eq!(HEADER_SIZE % BLOCK_ALIGN, 0);
        assert!(HEADER_SIZE >= size_of::<AllocationHeader>());
        assert_eq!(BLOCK_ALIGN, 2 * size_of::<usize>());
    }

    #[test]
    fn test_block_layout_rounds_up() {
        let empty = block_layout(0).unwrap();
        assert_eq!(empty.size(), HEADER_SIZE + MIN_PAYLOAD.next_multiple_of(BLOCK_ALIGN));

        let five = block_layout(5).unwrap();
        assert_eq!(five.size(), empty.size());

        let big = block_layout(100).unwrap();
        assert_eq!(big.size() % BLOCK_ALIGN, 0);
        assert!(big.size() >= HEADER_SIZE + 100);
        assert_eq!(big.align(), BLOCK_ALIGN);
    }

    #[test]
    fn test_block_layout_overflow() {
        assert!(block_layout(usize::MAX).is_none());
        assert!(PayloadKind::Objects.payload_bytes(usize::MAX).is_none());
    }

    #[test]
    fn test_init_objects_block() {
        let mut scratch = Scratch([0xFF; 256]);
        let layout = block_layout(PayloadKind::Objects.payload_bytes(3).unwrap()).unwrap();
        let ptr = NonNull::new(scratch.0.as_mut_ptr()).unwrap();

        // SAFETY: scratch is 16-aligned and larger than the layout.
        let block = unsafe { Block::init(ptr, PayloadKind::Objects, 3, layout, 7, false) };

        assert!(block.is_valid());
        assert_eq!(block.kind(), PayloadKind::Objects);
        assert_eq!(block.count(), 3);
        assert_eq!(block.slot(), 7);
        assert_eq!(block.size(), layout.size());
        assert!(!block.is_old());
        assert!(!block.is_marked());

        // SAFETY: the block holds objects and nothing else borrows it.
        let nodes = unsafe { block.objects() };
        assert!(nodes.iter().all(|n| *n == Node::Undefined));

        block.set_marked(true);
        assert!(block.is_marked());
        block.set_marked(false);
        assert!(!block.is_marked());
    }

    #[test]
    fn test_copy_to_preserves_payload() {
        let mut src = Scratch([0; 256]);
        let mut dst = Scratch([0; 256]);
        let layout = block_layout(5).unwrap();

        // SAFETY: both scratch buffers are aligned and large enough.
        unsafe {
            let block = Block::init(
                NonNull::new(src.0.as_mut_ptr()).unwrap(),
                PayloadKind::Bytes,
                5,
                layout,
                1,
                false,
            );
            block.bytes_mut().copy_from_slice(b"hello");
            block.set_marked(true);

            let copy = block.copy_to(NonNull::new(dst.0.as_mut_ptr()).unwrap());
            assert!(copy.is_old());
            assert!(copy.is_marked());
            assert_eq!(copy.bytes(), b"hello");
            assert_ne!(copy.addr(), block.addr());
        }
    }
}
