//! Recoverable runtime errors.
//!
//! These are mistakes made by the mutator (generated or interpreted code):
//! overflowing the value stack, reading a list past its end, calling a
//! closure with the wrong captures. They are returned to the caller.
//!
//! Corruption of the heap itself is not represented here. The collector
//! panics when it finds a broken header or a handle that resolves to
//! nothing, and system allocation failure goes through
//! [`std::alloc::handle_alloc_error`].

use std::io;

use thiserror::Error;

use crate::node::{Handle, NodeType};

/// Errors surfaced to the mutator.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// A push would grow the value stack past its capacity.
    #[error("value stack overflow (capacity {capacity} slots)")]
    StackOverflow {
        /// Total slots in the stack.
        capacity: usize,
    },

    /// A pop would shrink the stack below the current frame base.
    #[error("value stack underflow")]
    StackUnderflow,

    /// A frame-relative slot index is outside the live frame.
    #[error("stack slot {index} out of range (frame holds {len} slots)")]
    SlotOutOfRange {
        /// Requested frame-relative index.
        index: usize,
        /// Number of live slots in the frame.
        len: usize,
    },

    /// An allocation request exceeds the configured maximum.
    #[error("allocation of {requested} bytes exceeds the limit of {limit} bytes")]
    AllocationTooLarge {
        /// Requested payload size in bytes, saturated on overflow.
        requested: usize,
        /// Configured maximum.
        limit: usize,
    },

    /// The handle refers to an allocation that has been reclaimed.
    #[error("handle {0} does not refer to a live allocation")]
    DanglingHandle(Handle),

    /// The allocation holds bytes where objects were expected, or vice versa.
    #[error("handle {handle} holds {found} but {expected} were requested")]
    PayloadMismatch {
        /// The offending handle.
        handle: Handle,
        /// What the caller asked for.
        expected: &'static str,
        /// What the allocation actually holds.
        found: &'static str,
    },

    /// A value of the wrong type was passed to an operation.
    #[error("expected {expected}, found {found}")]
    TypeMismatch {
        /// Description of the accepted type(s).
        expected: &'static str,
        /// The type that was actually supplied.
        found: NodeType,
    },

    /// `car` or `cdr` on the empty list.
    #[error("operation on an empty list")]
    EmptyList,

    /// A capture index or capture block disagrees with the closure's count.
    #[error("capture {index} requested but the closure holds {count} captures")]
    CaptureCountMismatch {
        /// Requested or recorded index.
        index: usize,
        /// Number of captures the block actually holds.
        count: usize,
    },

    /// `capture` was called while no closure was running.
    #[error("no closure is currently running")]
    NoActiveClosure,

    /// The root id was never registered or has already been removed.
    #[error("unknown root id {0}")]
    UnknownRoot(u32),

    /// The young arena could not be mapped at context creation.
    #[error("failed to reserve the young arena: {0}")]
    ArenaReservation(#[source] io::Error),

    /// Writing program output failed.
    #[error("output error: {0}")]
    Io(#[from] io::Error),
}

/// Convenience alias for results carrying a [`RuntimeError`].
pub type Result<T> = std::result::Result<T, RuntimeError>;
