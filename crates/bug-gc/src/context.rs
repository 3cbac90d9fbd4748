//! The mutator-facing runtime context.

use std::ops::{Deref, DerefMut};

use crate::config::{CollectInfo, HeapConfig};
use crate::error::{Result, RuntimeError};
use crate::gc;
use crate::heap::{Heap, PayloadKind};
use crate::metrics::{CollectTrigger, GcMetrics, HeapStats};
use crate::node::{ClosureCode, Handle, Node};
use crate::roots::{RegisteredRoots, RootId, RootSet};
use crate::stack::{Frame, ValueStack};

#[cfg(feature = "tracing")]
use crate::tracing::internal::log_oversize_escape;

/// One runtime instance: heap, value stack and root lists.
///
/// Everything is owned by the context and released when it is dropped: the
/// stack, the arena mapping and every old-generation block.
///
/// Payload borrows (`objects`, `bytes`, ...) hold a borrow of the context,
/// so no reference into the heap can survive a call that might collect.
///
/// ```
/// use bug_gc::{Context, Generation, Node};
///
/// let mut ctx = Context::new()?;
/// let cell = ctx.allocate_objects(1)?;
/// ctx.objects_mut(cell)?[0] = Node::Integer(7);
/// ctx.push(Node::Pointer { target: Some(cell) })?;
///
/// ctx.collect();
/// assert_eq!(ctx.heap().generation_of(cell), Some(Generation::Old));
/// assert_eq!(ctx.objects(cell)?[0], Node::Integer(7));
/// # Ok::<(), bug_gc::RuntimeError>(())
/// ```
pub struct Context {
    heap: Heap,
    stack: ValueStack,
    /// Capture blocks of the closures currently running, innermost last.
    captures: Vec<Handle>,
    roots: RegisteredRoots,
    config: HeapConfig,
    stats: HeapStats,
    last_metrics: Option<GcMetrics>,
    allocations_since_collect: usize,
    inhibit_depth: usize,
}

impl Context {
    /// Creates a context with the default [`HeapConfig`].
    ///
    /// # Errors
    ///
    /// [`RuntimeError::ArenaReservation`] if the arena cannot be mapped.
    pub fn new() -> Result<Self> {
        Self::with_config(HeapConfig::default())
    }

    /// Creates a context with an explicit configuration.
    ///
    /// # Errors
    ///
    /// [`RuntimeError::ArenaReservation`] if the arena cannot be mapped.
    pub fn with_config(config: HeapConfig) -> Result<Self> {
        let heap = Heap::new(
            config.arena_bytes,
            config.populate,
            config.max_allocation_bytes,
        )?;
        Ok(Self {
            heap,
            stack: ValueStack::new(config.stack_slots),
            captures: Vec::new(),
            roots: RegisteredRoots::new(),
            config,
            stats: HeapStats::default(),
            last_metrics: None,
            allocations_since_collect: 0,
            inhibit_depth: 0,
        })
    }

    /// The configuration this context was built with.
    #[must_use]
    pub const fn config(&self) -> &HeapConfig {
        &self.config
    }

    /// Read-only view of the heap, for introspection.
    #[must_use]
    pub const fn heap(&self) -> &Heap {
        &self.heap
    }

    // ========================================================================
    // Allocation
    // ========================================================================

    /// Allocates `n` zeroed bytes.
    ///
    /// May run a collection; every value the caller still needs must be
    /// reachable from a root.
    ///
    /// # Errors
    ///
    /// [`RuntimeError::AllocationTooLarge`] above the configured limit.
    pub fn allocate_bytes(&mut self, n: usize) -> Result<Handle> {
        self.allocate(PayloadKind::Bytes, n)
    }

    /// Allocates an array of `count` nodes, all `Undefined`.
    ///
    /// May run a collection; every value the caller still needs must be
    /// reachable from a root.
    ///
    /// # Errors
    ///
    /// [`RuntimeError::AllocationTooLarge`] above the configured limit.
    pub fn allocate_objects(&mut self, count: usize) -> Result<Handle> {
        self.allocate(PayloadKind::Objects, count)
    }

    fn allocate(&mut self, kind: PayloadKind, count: usize) -> Result<Handle> {
        let layout = self.heap.layout_for(kind, count)?;

        let mut handle = self.heap.try_allocate_young(kind, count, layout);
        if handle.is_none()
            && self.inhibit_depth == 0
            && self.heap.arena.could_fit(layout.size())
        {
            self.collect_with(CollectTrigger::ArenaExhausted);
            handle = self.heap.try_allocate_young(kind, count, layout);
        }
        let handle = handle.unwrap_or_else(|| {
            #[cfg(feature = "tracing")]
            log_oversize_escape(layout.size(), self.heap.arena_capacity());
            self.stats.oversize_escapes += 1;
            self.heap.allocate_old(kind, count, layout)
        });

        self.allocations_since_collect += 1;
        self.stats.allocations += 1;
        Ok(handle)
    }

    // ========================================================================
    // Payload access
    // ========================================================================

    /// The node array behind `handle`.
    ///
    /// # Errors
    ///
    /// [`RuntimeError::DanglingHandle`] or [`RuntimeError::PayloadMismatch`].
    pub fn objects(&self, handle: Handle) -> Result<&[Node]> {
        self.heap.objects(handle)
    }

    /// The node array behind `handle`, mutably.
    ///
    /// # Errors
    ///
    /// [`RuntimeError::DanglingHandle`] or [`RuntimeError::PayloadMismatch`].
    pub fn objects_mut(&mut self, handle: Handle) -> Result<&mut [Node]> {
        self.heap.objects_mut(handle)
    }

    /// The bytes behind `handle`.
    ///
    /// # Errors
    ///
    /// [`RuntimeError::DanglingHandle`] or [`RuntimeError::PayloadMismatch`].
    pub fn bytes(&self, handle: Handle) -> Result<&[u8]> {
        self.heap.bytes(handle)
    }

    /// The bytes behind `handle`, mutably.
    ///
    /// # Errors
    ///
    /// [`RuntimeError::DanglingHandle`] or [`RuntimeError::PayloadMismatch`].
    pub fn bytes_mut(&mut self, handle: Handle) -> Result<&mut [u8]> {
        self.heap.bytes_mut(handle)
    }

    // ========================================================================
    // Collection
    // ========================================================================

    /// Runs a full collection now.
    pub fn collect(&mut self) -> GcMetrics {
        self.collect_with(CollectTrigger::Explicit)
    }

    /// Collects if the configured [`CollectCondition`](crate::CollectCondition)
    /// says so. Meant to be called after each unit of work.
    ///
    /// Returns `None` when no collection ran, including while collection is
    /// inhibited.
    pub fn checkpoint(&mut self) -> Option<GcMetrics> {
        if self.inhibit_depth > 0 {
            return None;
        }
        let info = self.collect_info();
        (self.config.collect_condition)(&info).then(|| self.collect_with(CollectTrigger::Checkpoint))
    }

    fn collect_with(&mut self, trigger: CollectTrigger) -> GcMetrics {
        let roots = RootSet {
            stack: self.stack.live(),
            captures: &self.captures,
            registered: &self.roots,
        };
        let metrics = gc::collect(&mut self.heap, &roots, trigger, self.stats.collections + 1);
        self.stats.record(&metrics);
        self.allocations_since_collect = 0;
        self.last_metrics = Some(metrics);
        metrics
    }

    /// Runs `f` with collection disabled.
    ///
    /// Allocations that do not fit in the arena go straight to the old
    /// generation instead of collecting, and checkpoints do nothing. Calls
    /// nest. An explicit [`Context::collect`] still runs.
    ///
    /// The inhibition is lifted when `f` returns or unwinds.
    pub fn inhibit_collection<R>(&mut self, f: impl FnOnce(&mut Self) -> R) -> R {
        self.inhibit_depth += 1;
        let mut guard = InhibitGuard(self);
        f(&mut *guard)
    }

    /// Returns `true` inside [`Context::inhibit_collection`].
    #[must_use]
    pub const fn is_collection_inhibited(&self) -> bool {
        self.inhibit_depth > 0
    }

    /// Heap state as seen by the collect condition.
    #[must_use]
    pub const fn collect_info(&self) -> CollectInfo {
        CollectInfo {
            allocations_since_collect: self.allocations_since_collect,
            young_size: self.heap.young_bytes(),
            old_size: self.heap.old_bytes(),
            live_allocations: self.heap.live_allocations(),
        }
    }

    /// Metrics of the most recent collection, if any ran.
    #[must_use]
    pub const fn last_metrics(&self) -> Option<GcMetrics> {
        self.last_metrics
    }

    /// Cumulative statistics plus a snapshot of current heap usage.
    #[must_use]
    pub fn stats(&self) -> HeapStats {
        HeapStats {
            current_young_bytes: self.heap.young_bytes(),
            current_old_blocks: self.heap.old_blocks(),
            current_old_bytes: self.heap.old_bytes(),
            ..self.stats
        }
    }

    // ========================================================================
    // Value stack
    // ========================================================================

    /// Pushes a value onto the stack, rooting it.
    ///
    /// # Errors
    ///
    /// [`RuntimeError::StackOverflow`] if the stack is full.
    pub fn push(&mut self, node: Node) -> Result<()> {
        self.stack.push(node)
    }

    /// Pops the top value of the current frame.
    ///
    /// # Errors
    ///
    /// [`RuntimeError::StackUnderflow`] if the frame is empty.
    pub fn pop(&mut self) -> Result<Node> {
        self.stack.pop()
    }

    /// Reads the top value of the current frame.
    ///
    /// # Errors
    ///
    /// [`RuntimeError::StackUnderflow`] if the frame is empty.
    pub fn peek(&self) -> Result<Node> {
        self.stack.peek()
    }

    /// Reads slot `index` of the current frame.
    ///
    /// # Errors
    ///
    /// [`RuntimeError::SlotOutOfRange`] past the frame's top.
    pub fn local(&self, index: usize) -> Result<Node> {
        self.stack.local(index)
    }

    /// Overwrites slot `index` of the current frame.
    ///
    /// # Errors
    ///
    /// [`RuntimeError::SlotOutOfRange`] past the frame's top.
    pub fn set_local(&mut self, index: usize, node: Node) -> Result<()> {
        self.stack.set_local(index, node)
    }

    /// Pushes `n` `Undefined` locals.
    ///
    /// # Errors
    ///
    /// [`RuntimeError::StackOverflow`] if there is no room.
    pub fn reserve(&mut self, n: usize) -> Result<()> {
        self.stack.reserve(n)
    }

    /// Slots in use across all frames.
    #[must_use]
    pub const fn stack_len(&self) -> usize {
        self.stack.len()
    }

    /// Slots in use by the current frame.
    #[must_use]
    pub const fn frame_len(&self) -> usize {
        self.stack.frame_len()
    }

    /// Starts a frame; locals are addressed relative to it.
    pub fn push_frame(&mut self) -> Frame {
        self.stack.push_frame()
    }

    /// Ends a frame, discarding its values.
    pub fn pop_frame(&mut self, frame: Frame) {
        self.stack.pop_frame(frame);
    }

    /// Pops `n` values from the current frame.
    ///
    /// # Errors
    ///
    /// [`RuntimeError::StackUnderflow`] if the frame holds fewer than `n`.
    pub fn drop_n(&mut self, n: usize) -> Result<()> {
        self.stack.drop_n(n)
    }

    // ========================================================================
    // Registered roots
    // ========================================================================

    /// Keeps `node` alive until [`Context::unregister_root`].
    pub fn register_root(&mut self, node: Node) -> RootId {
        self.roots.register(node)
    }

    /// Stops rooting a registered value and returns it.
    ///
    /// # Errors
    ///
    /// [`RuntimeError::UnknownRoot`] if `id` is not registered.
    pub fn unregister_root(&mut self, id: RootId) -> Result<Node> {
        self.roots.unregister(id)
    }

    /// Replaces a registered root's value.
    ///
    /// # Errors
    ///
    /// [`RuntimeError::UnknownRoot`] if `id` is not registered.
    pub fn set_root(&mut self, id: RootId, node: Node) -> Result<()> {
        self.roots.set(id, node)
    }

    /// Number of values currently registered as roots.
    #[must_use]
    pub fn root_count(&self) -> usize {
        self.roots.len()
    }

    /// Reads a registered root.
    ///
    /// # Errors
    ///
    /// [`RuntimeError::UnknownRoot`] if `id` is not registered.
    pub fn root(&self, id: RootId) -> Result<Node> {
        self.roots.get(id)
    }

    // ========================================================================
    // Closures
    // ========================================================================

    /// Invokes a closure with `args` as the first locals of a fresh frame.
    ///
    /// While the code runs its capture block is a root and is readable via
    /// [`Context::capture`]. The caller's frame and capture state are
    /// restored afterwards, whether the code succeeded or not. Void closures
    /// yield `Undefined`.
    ///
    /// # Errors
    ///
    /// [`RuntimeError::TypeMismatch`] if `closure` is not a closure,
    /// [`RuntimeError::CaptureCountMismatch`] if its capture block is
    /// malformed, and whatever the closure's code returns.
    pub fn call(&mut self, closure: Node, args: &[Node]) -> Result<Node> {
        let (code, captures) = closure.closure_parts().ok_or_else(|| RuntimeError::TypeMismatch {
            expected: "a closure",
            found: closure.node_type(),
        })?;
        self.capture_count_of(captures)?;

        let frame = self.stack.push_frame();
        self.captures.push(captures);
        let result = self.enter(code, args);
        self.captures.pop();
        self.stack.pop_frame(frame);
        result
    }

    fn enter(&mut self, code: ClosureCode, args: &[Node]) -> Result<Node> {
        for &arg in args {
            self.stack.push(arg)?;
        }
        match code {
            ClosureCode::Void(code) => code(self).map(|()| Node::Undefined),
            ClosureCode::Value(code) => code(self),
        }
    }

    /// Captured value `index` of the innermost running closure.
    ///
    /// # Errors
    ///
    /// [`RuntimeError::NoActiveClosure`] outside a closure,
    /// [`RuntimeError::CaptureCountMismatch`] if `index` is out of range.
    pub fn capture(&self, index: usize) -> Result<Node> {
        let block = *self.captures.last().ok_or(RuntimeError::NoActiveClosure)?;
        let count = self.capture_count_of(block)?;
        if index >= count {
            return Err(RuntimeError::CaptureCountMismatch { index, count });
        }
        Ok(self.heap.objects(block)?[index + 1])
    }

    /// Number of captures of the innermost running closure.
    ///
    /// # Errors
    ///
    /// [`RuntimeError::NoActiveClosure`] outside a closure.
    pub fn capture_count(&self) -> Result<usize> {
        let block = *self.captures.last().ok_or(RuntimeError::NoActiveClosure)?;
        self.capture_count_of(block)
    }

    /// Validates a capture block: slot 0 must be `Integer(n)` with `n`
    /// values following it.
    fn capture_count_of(&self, block: Handle) -> Result<usize> {
        let nodes = self.heap.objects(block)?;
        let held = nodes.len().saturating_sub(1);
        match nodes.first() {
            Some(&Node::Integer(n)) if usize::try_from(n).is_ok_and(|n| n == held) => Ok(held),
            Some(&Node::Integer(n)) => Err(RuntimeError::CaptureCountMismatch {
                index: usize::try_from(n).unwrap_or(usize::MAX),
                count: held,
            }),
            _ => Err(RuntimeError::CaptureCountMismatch {
                index: 0,
                count: held,
            }),
        }
    }
}

/// Holds collection off for as long as it lives.
struct InhibitGuard<'a>(&'a mut Context);

impl Deref for InhibitGuard<'_> {
    type Target = Context;

    fn deref(&self) -> &Context {
        self.0
    }
}

impl DerefMut for InhibitGuard<'_> {
    fn deref_mut(&mut self) -> &mut Context {
        self.0
    }
}

impl Drop for InhibitGuard<'_> {
    fn drop(&mut self) {
        self.0.inhibit_depth -= 1;
    }
}
