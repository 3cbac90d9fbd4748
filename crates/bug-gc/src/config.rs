//! Heap configuration and the collection policy.

// ============================================================================
// Collection statistics
// ============================================================================

/// Heap state handed to a [`CollectCondition`] at a checkpoint.
#[derive(Debug, Clone, Copy, Default)]
pub struct CollectInfo {
    /// Allocations made since the last collection.
    pub(crate) allocations_since_collect: usize,
    /// Bytes bump-allocated in the young arena.
    pub(crate) young_size: usize,
    /// Bytes held by the old generation.
    pub(crate) old_size: usize,
    /// Live allocations across both generations.
    pub(crate) live_allocations: usize,
}

impl CollectInfo {
    /// Allocations made since the last collection.
    #[must_use]
    pub const fn allocations_since_collect(&self) -> usize {
        self.allocations_since_collect
    }

    /// Bytes in the young arena.
    #[must_use]
    pub const fn young_size(&self) -> usize {
        self.young_size
    }

    /// Bytes in the old generation.
    #[must_use]
    pub const fn old_size(&self) -> usize {
        self.old_size
    }

    /// Total bytes across both generations.
    #[must_use]
    pub const fn heap_size(&self) -> usize {
        self.young_size + self.old_size
    }

    /// Allocations currently tracked, reachable or not.
    #[must_use]
    pub const fn live_allocations(&self) -> usize {
        self.live_allocations
    }
}

// ============================================================================
// Collection condition
// ============================================================================

/// Type for collection condition functions.
pub type CollectCondition = fn(&CollectInfo) -> bool;

/// The default collection condition.
///
/// Collects whenever anything was allocated since the last collection, so a
/// checkpoint after each top-level statement keeps the live set tight and is
/// free when the statement allocated nothing.
#[must_use]
pub const fn default_collect_condition(info: &CollectInfo) -> bool {
    info.allocations_since_collect > 0
}

// ============================================================================
// HeapConfig
// ============================================================================

/// Sizing and policy for a [`Context`](crate::Context).
///
/// ```
/// use bug_gc::HeapConfig;
///
/// let config = HeapConfig::new().arena_bytes(64 * 1024).stack_slots(1024);
/// assert_eq!(config.arena_bytes_value(), 64 * 1024);
/// ```
#[derive(Debug, Clone, Copy)]
pub struct HeapConfig {
    pub(crate) arena_bytes: usize,
    pub(crate) stack_slots: usize,
    pub(crate) max_allocation_bytes: usize,
    pub(crate) collect_condition: CollectCondition,
    pub(crate) populate: bool,
}

impl HeapConfig {
    /// Default young arena size in bytes.
    pub const DEFAULT_ARENA_BYTES: usize = 16_000;
    /// Default value stack capacity in slots.
    pub const DEFAULT_STACK_SLOTS: usize = 16_000;
    /// Default ceiling for a single allocation's payload.
    pub const DEFAULT_MAX_ALLOCATION_BYTES: usize = 1 << 30;

    /// Creates the default configuration.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            arena_bytes: Self::DEFAULT_ARENA_BYTES,
            stack_slots: Self::DEFAULT_STACK_SLOTS,
            max_allocation_bytes: Self::DEFAULT_MAX_ALLOCATION_BYTES,
            collect_condition: default_collect_condition,
            populate: false,
        }
    }

    /// Requested young arena size. The mapping is rounded up to whole pages.
    ///
    /// Zero maps no arena at all: every allocation then goes straight to the
    /// old generation and only explicit collections or checkpoints run.
    #[must_use]
    pub const fn arena_bytes(mut self, bytes: usize) -> Self {
        self.arena_bytes = bytes;
        self
    }

    /// Value stack capacity in slots.
    #[must_use]
    pub const fn stack_slots(mut self, slots: usize) -> Self {
        self.stack_slots = slots;
        self
    }

    /// Largest payload a single allocation may request.
    #[must_use]
    pub const fn max_allocation_bytes(mut self, bytes: usize) -> Self {
        self.max_allocation_bytes = bytes;
        self
    }

    /// Policy consulted by [`Context::checkpoint`](crate::Context::checkpoint).
    #[must_use]
    pub const fn collect_condition(mut self, condition: CollectCondition) -> Self {
        self.collect_condition = condition;
        self
    }

    /// Prefault the arena's pages when the context is created.
    #[must_use]
    pub const fn populate(mut self, populate: bool) -> Self {
        self.populate = populate;
        self
    }

    /// Configured arena size.
    #[must_use]
    pub const fn arena_bytes_value(&self) -> usize {
        self.arena_bytes
    }

    /// Configured stack capacity.
    #[must_use]
    pub const fn stack_slots_value(&self) -> usize {
        self.stack_slots
    }

    /// Configured allocation ceiling.
    #[must_use]
    pub const fn max_allocation_bytes_value(&self) -> usize {
        self.max_allocation_bytes
    }
}

impl Default for HeapConfig {
    fn default() -> Self {
        Self::new()
    }
}
