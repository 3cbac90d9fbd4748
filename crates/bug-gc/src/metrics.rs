//! GC metrics and statistics.

use std::time::{Duration, Instant};

/// What caused a collection to run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[repr(u8)]
pub enum CollectTrigger {
    /// No collection has run yet.
    #[default]
    None = 0,
    /// The mutator called [`Context::collect`](crate::Context::collect).
    Explicit = 1,
    /// A [`Context::checkpoint`](crate::Context::checkpoint) whose condition held.
    Checkpoint = 2,
    /// An allocation did not fit in the remaining arena space.
    ArenaExhausted = 3,
}

impl CollectTrigger {
    /// Name used in log fields.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Explicit => "explicit",
            Self::Checkpoint => "checkpoint",
            Self::ArenaExhausted => "arena_exhausted",
        }
    }
}

/// Statistics from one garbage collection.
#[derive(Debug, Clone, Copy)]
pub struct GcMetrics {
    /// Duration of the whole collection.
    pub duration: Duration,
    /// Duration of the clear phase.
    pub clear_duration: Duration,
    /// Duration of the mark phase.
    pub mark_duration: Duration,
    /// Duration of the promote phase.
    pub promote_duration: Duration,
    /// Duration of the old-generation sweep.
    pub sweep_duration: Duration,
    /// Why the collection ran.
    pub trigger: CollectTrigger,
    /// 1-based index of this collection within its context.
    pub collection_number: usize,
    /// Allocations found reachable.
    pub objects_marked: usize,
    /// Young allocations copied into the old generation.
    pub objects_promoted: usize,
    /// Block bytes copied into the old generation.
    pub bytes_promoted: usize,
    /// Young allocations abandoned in the arena.
    pub young_objects_reclaimed: usize,
    /// Block bytes abandoned in the arena.
    pub young_bytes_reclaimed: usize,
    /// Old-generation blocks freed.
    pub old_objects_reclaimed: usize,
    /// Old-generation block bytes freed.
    pub old_bytes_reclaimed: usize,
    /// Allocations alive after the collection (all in the old generation).
    pub objects_surviving: usize,
    /// Block bytes alive after the collection.
    pub bytes_surviving: usize,
}

impl Default for GcMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl GcMetrics {
    /// Create a new `GcMetrics` with all fields set to zero/defaults.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            duration: Duration::ZERO,
            clear_duration: Duration::ZERO,
            mark_duration: Duration::ZERO,
            promote_duration: Duration::ZERO,
            sweep_duration: Duration::ZERO,
            trigger: CollectTrigger::None,
            collection_number: 0,
            objects_marked: 0,
            objects_promoted: 0,
            bytes_promoted: 0,
            young_objects_reclaimed: 0,
            young_bytes_reclaimed: 0,
            old_objects_reclaimed: 0,
            old_bytes_reclaimed: 0,
            objects_surviving: 0,
            bytes_surviving: 0,
        }
    }

    /// Allocations reclaimed from both generations.
    #[must_use]
    pub const fn objects_reclaimed(&self) -> usize {
        self.young_objects_reclaimed + self.old_objects_reclaimed
    }

    /// Bytes reclaimed from both generations.
    #[must_use]
    pub const fn bytes_reclaimed(&self) -> usize {
        self.young_bytes_reclaimed + self.old_bytes_reclaimed
    }
}

/// Internal helper for capturing phase durations.
///
/// The collector times its four phases in order:
/// - Clear: reset mark bits in both generations
/// - Mark: walk the roots and flag reachable allocations
/// - Promote: copy marked young blocks into the old generation
/// - Sweep: free unmarked old blocks
#[derive(Debug, Clone, Copy, Default)]
pub struct PhaseTimer {
    /// Clear phase time.
    pub clear: Duration,
    /// Mark phase time.
    pub mark: Duration,
    /// Promote phase time.
    pub promote: Duration,
    /// Sweep phase time.
    pub sweep: Duration,
    current_start: Option<Instant>,
}

impl PhaseTimer {
    /// Create a new `PhaseTimer` with all durations set to zero.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            clear: Duration::ZERO,
            mark: Duration::ZERO,
            promote: Duration::ZERO,
            sweep: Duration::ZERO,
            current_start: None,
        }
    }

    /// Start timing a phase.
    pub fn start(&mut self) {
        self.current_start = Some(Instant::now());
    }

    fn take(&mut self) -> Duration {
        self.current_start
            .take()
            .map_or(Duration::ZERO, |start| start.elapsed())
    }

    /// End the clear phase and record its duration.
    pub fn end_clear(&mut self) {
        self.clear = self.take();
    }

    /// End the mark phase and record its duration.
    pub fn end_mark(&mut self) {
        self.mark = self.take();
    }

    /// End the promote phase and record its duration.
    pub fn end_promote(&mut self) {
        self.promote = self.take();
    }

    /// End the sweep phase and record its duration.
    pub fn end_sweep(&mut self) {
        self.sweep = self.take();
    }
}

/// Cumulative statistics for one context.
///
/// Counters accumulate across collections; the `current_*` fields are a
/// snapshot of the heap taken when [`Context::stats`](crate::Context::stats)
/// was called.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeapStats {
    /// Collections run so far.
    pub collections: usize,
    /// Allocations served, from either generation.
    pub allocations: usize,
    /// Young allocations promoted into the old generation.
    pub objects_promoted: usize,
    /// Block bytes promoted into the old generation.
    pub bytes_promoted: usize,
    /// Allocations reclaimed from either generation.
    pub objects_reclaimed: usize,
    /// Block bytes reclaimed from either generation.
    pub bytes_reclaimed: usize,
    /// Requests served directly by the old generation.
    pub oversize_escapes: usize,
    /// Total time spent collecting.
    pub total_pause: Duration,
    /// Bytes bump-allocated in the young arena right now.
    pub current_young_bytes: usize,
    /// Blocks in the old generation right now.
    pub current_old_blocks: usize,
    /// Bytes in the old generation right now.
    pub current_old_bytes: usize,
}

impl HeapStats {
    /// Folds one collection's metrics into the running totals.
    pub(crate) fn record(&mut self, metrics: &GcMetrics) {
        self.collections += 1;
        self.objects_promoted += metrics.objects_promoted;
        self.bytes_promoted += metrics.bytes_promoted;
        self.objects_reclaimed += metrics.objects_reclaimed();
        self.bytes_reclaimed += metrics.bytes_reclaimed();
        self.total_pause += metrics.duration;
    }
}
