//! Collection metrics and cumulative statistics.

use bug_gc::builtins::new_string;
use bug_gc::{CollectInfo, CollectTrigger, Context, HeapConfig};

fn small() -> Context {
    Context::with_config(HeapConfig::new().arena_bytes(4096).stack_slots(64)).unwrap()
}

#[test]
fn test_collection_metrics() {
    let mut ctx = small();
    let keep = new_string(&mut ctx, "keep").unwrap();
    ctx.push(keep).unwrap();
    new_string(&mut ctx, "drop 1").unwrap();
    new_string(&mut ctx, "drop 2").unwrap();

    let m = ctx.collect();
    assert_eq!(m.trigger, CollectTrigger::Explicit);
    assert_eq!(m.collection_number, 1);
    assert_eq!(m.objects_marked, 1);
    assert_eq!(m.objects_promoted, 1);
    assert_eq!(m.young_objects_reclaimed, 2);
    assert_eq!(m.old_objects_reclaimed, 0);
    assert_eq!(m.objects_surviving, 1);
    assert_eq!(m.bytes_surviving, m.bytes_promoted);
    assert!(m.young_bytes_reclaimed > m.bytes_promoted);
    assert_eq!(m.objects_reclaimed(), 2);
    assert!(m.duration >= m.mark_duration);

    ctx.pop().unwrap();
    let m2 = ctx.collect();
    assert_eq!(m2.collection_number, 2);
    assert_eq!(m2.old_objects_reclaimed, 1);
    assert_eq!(m2.old_bytes_reclaimed, m.bytes_promoted);
    assert_eq!(m2.objects_surviving, 0);
    assert_eq!(ctx.last_metrics().map(|m| m.collection_number), Some(2));

    let stats = ctx.stats();
    assert_eq!(stats.collections, 2);
    assert_eq!(stats.allocations, 3);
    assert_eq!(stats.objects_promoted, 1);
    assert_eq!(stats.objects_reclaimed, 3);
    assert_eq!(stats.current_old_blocks, 0);
    assert!(stats.total_pause >= m2.duration);
}

#[test]
fn test_stats_snapshot_heap_usage() {
    let mut ctx = small();
    new_string(&mut ctx, "x").unwrap();
    let stats = ctx.stats();
    assert_eq!(stats.collections, 0);
    assert_eq!(stats.current_young_bytes, ctx.heap().young_bytes());
    assert!(stats.current_young_bytes > 0);
}

fn young_over_1k(info: &CollectInfo) -> bool {
    info.young_size() > 1024
}

#[test]
fn test_custom_collect_condition() {
    let mut ctx = Context::with_config(
        HeapConfig::new()
            .arena_bytes(4096)
            .collect_condition(young_over_1k),
    )
    .unwrap();

    new_string(&mut ctx, "small").unwrap();
    assert!(ctx.checkpoint().is_none());

    while ctx.collect_info().young_size() <= 1024 {
        ctx.allocate_bytes(100).unwrap();
    }
    let m = ctx.checkpoint().unwrap();
    assert_eq!(m.trigger, CollectTrigger::Checkpoint);
    assert_eq!(ctx.collect_info().young_size(), 0);
    assert_eq!(ctx.collect_info().allocations_since_collect(), 0);
}

#[test]
fn test_trigger_names() {
    assert_eq!(CollectTrigger::Explicit.as_str(), "explicit");
    assert_eq!(CollectTrigger::Checkpoint.as_str(), "checkpoint");
    assert_eq!(CollectTrigger::ArenaExhausted.as_str(), "arena_exhausted");
}
