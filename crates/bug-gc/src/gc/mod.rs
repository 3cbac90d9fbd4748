//! Stop-the-world collection over both generations.
//!
//! One collection runs four phases and then resets the arena:
//!
//! 1. **Clear**: reset the mark bit on every block in both generations.
//! 2. **Mark**: walk the root set with a worklist (see [`mark`]).
//! 3. **Promote**: copy every marked young block into a fresh old block and
//!    retarget its handle slot; release the slots of unmarked young blocks.
//! 4. **Sweep**: free unmarked old blocks and clear the mark on survivors.
//!
//! Handles are the only references in the value graph, so retargeting the
//! slot is the whole relocation. Nothing in the graph needs rewriting.

mod mark;

use std::time::Instant;

use crate::heap::{Heap, OldGeneration};
use crate::metrics::{CollectTrigger, GcMetrics, PhaseTimer};
use crate::roots::RootSet;

#[cfg(feature = "tracing")]
use crate::tracing::internal::{
    log_phase_end, next_gc_id, trace_gc_collection, trace_phase, GcPhase,
};

/// Runs one full collection.
///
/// # Panics
///
/// Panics on heap corruption: a reachable handle with no allocation behind
/// it, or a header whose magic word is wrong.
pub(crate) fn collect(
    heap: &mut Heap,
    roots: &RootSet<'_>,
    trigger: CollectTrigger,
    collection_number: usize,
) -> GcMetrics {
    let start = Instant::now();

    #[cfg(feature = "tracing")]
    let _gc_span = trace_gc_collection(trigger.as_str(), next_gc_id());

    let mut timer = PhaseTimer::new();
    let mut metrics = GcMetrics {
        trigger,
        collection_number,
        ..GcMetrics::new()
    };

    // Clear
    timer.start();
    {
        #[cfg(feature = "tracing")]
        let _phase = trace_phase(GcPhase::Clear);
        #[cfg_attr(not(feature = "tracing"), allow(unused_variables))]
        let cleared = clear_marks(heap);
        #[cfg(feature = "tracing")]
        log_phase_end(GcPhase::Clear, cleared, 0);
    }
    timer.end_clear();

    // Mark
    timer.start();
    {
        #[cfg(feature = "tracing")]
        let _phase = trace_phase(GcPhase::Mark);
        let stats = mark::mark_from_roots(heap, roots);
        metrics.objects_marked = stats.objects;
        #[cfg(feature = "tracing")]
        log_phase_end(GcPhase::Mark, stats.objects, stats.bytes);
    }
    timer.end_mark();

    // Promote
    timer.start();
    {
        #[cfg(feature = "tracing")]
        let _phase = trace_phase(GcPhase::Promote);
        promote(heap, &mut metrics);
        #[cfg(feature = "tracing")]
        log_phase_end(GcPhase::Promote, metrics.objects_promoted, metrics.bytes_promoted);
    }
    timer.end_promote();

    // Sweep
    timer.start();
    {
        #[cfg(feature = "tracing")]
        let _phase = trace_phase(GcPhase::Sweep);
        let slots = &mut heap.slots;
        let (freed, freed_bytes) = heap.old.sweep(|block| slots.release(block.slot()));
        metrics.old_objects_reclaimed = freed;
        metrics.old_bytes_reclaimed = freed_bytes;
        #[cfg(feature = "tracing")]
        log_phase_end(GcPhase::Sweep, freed, freed_bytes);
    }
    timer.end_sweep();

    heap.arena.reset();

    metrics.objects_surviving = heap.slots.live();
    metrics.bytes_surviving = heap.old.bytes();
    metrics.clear_duration = timer.clear;
    metrics.mark_duration = timer.mark;
    metrics.promote_duration = timer.promote;
    metrics.sweep_duration = timer.sweep;
    metrics.duration = start.elapsed();
    metrics
}

/// Resets mark bits in both generations, validating every header on the way.
fn clear_marks(heap: &Heap) -> usize {
    let mut blocks = 0;
    for block in heap.arena.blocks().chain(heap.old.iter()) {
        assert!(
            block.is_valid(),
            "clear phase: corrupt header at {:#x}",
            block.addr()
        );
        block.set_marked(false);
        blocks += 1;
    }
    blocks
}

/// Moves marked young blocks to the old generation and drops the rest.
fn promote(heap: &mut Heap, metrics: &mut GcMetrics) {
    let Heap {
        arena, old, slots, ..
    } = heap;

    for block in arena.blocks() {
        if block.is_marked() {
            let dst = OldGeneration::reserve(block.layout());
            // SAFETY: `dst` is a fresh allocation of the block's own layout.
            let copy = unsafe { block.copy_to(dst) };
            old.adopt(copy);
            slots.relocate(block.slot(), copy);
            metrics.objects_promoted += 1;
            metrics.bytes_promoted += block.size();
        } else {
            slots.release(block.slot());
            metrics.young_objects_reclaimed += 1;
            metrics.young_bytes_reclaimed += block.size();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heap::{Generation, PayloadKind};
    use crate::node::{Handle, Node};
    use crate::roots::RegisteredRoots;

    fn heap() -> Heap {
        Heap::new(4096, false, 1 << 20).unwrap()
    }

    fn young(heap: &mut Heap, kind: PayloadKind, count: usize) -> Handle {
        let layout = heap.layout_for(kind, count).unwrap();
        heap.try_allocate_young(kind, count, layout).unwrap()
    }

    fn run(heap: &mut Heap, stack: &[Node]) -> GcMetrics {
        let registered = RegisteredRoots::new();
        let roots = RootSet {
            stack,
            captures: &[],
            registered: &registered,
        };
        collect(heap, &roots, CollectTrigger::Explicit, 1)
    }

    #[test]
    fn test_unrooted_young_is_reclaimed() {
        let mut heap = heap();
        let h = young(&mut heap, PayloadKind::Bytes, 8);

        let metrics = run(&mut heap, &[]);

        assert!(!heap.contains(h));
        assert_eq!(metrics.young_objects_reclaimed, 1);
        assert_eq!(metrics.objects_promoted, 0);
        assert_eq!(heap.young_bytes(), 0);
    }

    #[test]
    fn test_rooted_young_is_promoted() {
        let mut heap = heap();
        let h = young(&mut heap, PayloadKind::Objects, 1);
        heap.objects_mut(h).unwrap()[0] = Node::Integer(42);
        let before = heap.address_of(h).unwrap();

        let metrics = run(&mut heap, &[Node::Pointer { target: Some(h) }]);

        assert_eq!(metrics.objects_marked, 1);
        assert_eq!(metrics.objects_promoted, 1);
        assert_eq!(heap.generation_of(h), Some(Generation::Old));
        assert_ne!(heap.address_of(h).unwrap(), before);
        assert_eq!(heap.objects(h).unwrap(), &[Node::Integer(42)]);
    }

    #[test]
    fn test_cycle_terminates() {
        let mut heap = heap();
        let a = young(&mut heap, PayloadKind::Objects, 1);
        let b = young(&mut heap, PayloadKind::Objects, 1);
        heap.objects_mut(a).unwrap()[0] = Node::Pointer { target: Some(b) };
        heap.objects_mut(b).unwrap()[0] = Node::Pointer { target: Some(a) };

        let metrics = run(&mut heap, &[Node::Pointer { target: Some(a) }]);
        assert_eq!(metrics.objects_marked, 2);

        let metrics = run(&mut heap, &[]);
        assert_eq!(metrics.old_objects_reclaimed, 2);
        assert_eq!(heap.live_allocations(), 0);
    }

    #[test]
    #[should_panic(expected = "mark phase")]
    fn test_dangling_root_is_fatal() {
        let mut heap = heap();
        let h = young(&mut heap, PayloadKind::Bytes, 1);
        run(&mut heap, &[]);
        run(&mut heap, &[Node::String { len: 1, bytes: h }]);
    }

    #[test]
    #[should_panic(expected = "corrupt header")]
    fn test_corrupt_young_header_is_fatal() {
        let mut heap = heap();
        let h = young(&mut heap, PayloadKind::Objects, 2);
        heap.slots.resolve(h).unwrap().clobber_magic();

        run(&mut heap, &[Node::Pointer { target: Some(h) }]);
    }

    #[test]
    #[should_panic(expected = "clear phase: corrupt header")]
    fn test_corrupt_old_header_is_fatal() {
        let mut heap = heap();
        let h = young(&mut heap, PayloadKind::Bytes, 4);
        let root = [Node::String { len: 4, bytes: h }];
        run(&mut heap, &root);
        assert_eq!(heap.generation_of(h), Some(Generation::Old));

        heap.slots.resolve(h).unwrap().clobber_magic();
        run(&mut heap, &root);
    }
}
