//! Worklist marking.

use crate::heap::{Heap, PayloadKind};
use crate::node::{Handle, Node};
use crate::roots::RootSet;

/// Allocations and block bytes found reachable.
#[derive(Debug, Clone, Copy, Default)]
pub(super) struct MarkStats {
    pub objects: usize,
    #[cfg_attr(not(feature = "tracing"), allow(dead_code))]
    pub bytes: usize,
}

/// Marks everything reachable from `roots`.
///
/// Uses an explicit worklist keyed by handle. An already-marked block is
/// skipped without looking at its payload, so shared subgraphs are visited
/// once and cycles terminate. Long lists cost worklist entries, never
/// native stack depth.
///
/// # Panics
///
/// Panics if a reachable handle resolves to nothing or to a corrupt header.
pub(super) fn mark_from_roots(heap: &Heap, roots: &RootSet<'_>) -> MarkStats {
    let mut worklist: Vec<Handle> = roots.handles().collect();
    let mut stats = MarkStats::default();

    while let Some(handle) = worklist.pop() {
        let Some(block) = heap.slots.resolve(handle) else {
            panic!("mark phase: reachable handle {handle} refers to a reclaimed allocation");
        };
        assert!(
            block.is_valid(),
            "mark phase: corrupt header at {:#x} for handle {handle}",
            block.addr()
        );
        if block.is_marked() {
            continue;
        }
        block.set_marked(true);
        stats.objects += 1;
        stats.bytes += block.size();

        if block.kind() == PayloadKind::Objects {
            // SAFETY: objects block; the collector holds the heap and no
            // payload borrow is live.
            let nodes = unsafe { block.objects() };
            worklist.extend(nodes.iter().flat_map(Node::references));
        }
    }

    stats
}
