//! GC tracing support.
//!
//! When the `tracing` feature is enabled, this module provides structured
//! tracing spans and events for garbage collection operations.

#[cfg(feature = "tracing")]
pub mod internal {
    use std::sync::atomic::{AtomicU64, Ordering};
    use tracing::{span, Level};

    /// Collection phases, in the order they run.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum GcPhase {
        /// Reset mark bits in both generations.
        Clear,
        /// Trace the live graph from the roots.
        Mark,
        /// Copy surviving young blocks into the old generation.
        Promote,
        /// Free unreachable old blocks.
        Sweep,
    }

    /// Stable identifier for a GC run.
    ///
    /// Correlates every event emitted during one collection. Monotonically
    /// increasing across all contexts in the process, starting at 1.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct GcId(pub u64);

    static NEXT_GC_ID: AtomicU64 = AtomicU64::new(1);

    /// Generate the next unique GC ID.
    pub fn next_gc_id() -> GcId {
        GcId(NEXT_GC_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Create a span for the entire GC collection.
    pub fn trace_gc_collection(trigger: &str, gc_id: GcId) -> span::EnteredSpan {
        span!(Level::DEBUG, "gc_collect", trigger = trigger, gc_id = gc_id.0).entered()
    }

    /// Create a span for one GC phase.
    pub fn trace_phase(phase: GcPhase) -> span::EnteredSpan {
        span!(Level::DEBUG, "gc_phase", phase = ?phase).entered()
    }

    /// Log the end of a GC phase with the allocations and bytes it handled.
    pub fn log_phase_end(phase: GcPhase, objects: usize, bytes: usize) {
        tracing::debug!(phase = ?phase, objects, bytes, "phase_end");
    }

    /// Log a request that bypassed the arena.
    pub fn log_oversize_escape(requested: usize, arena_capacity: usize) {
        tracing::debug!(requested, arena_capacity, "oversize_escape");
    }
}

#[cfg(not(feature = "tracing"))]
pub mod internal {
    /// Stub type when tracing is disabled.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct GcId(pub u64);

    /// Stub function when tracing is disabled.
    pub const fn next_gc_id() -> GcId {
        GcId(0)
    }
}

pub use internal::GcId;
