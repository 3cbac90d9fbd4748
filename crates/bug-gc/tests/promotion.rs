//! Survivors move out of the young arena and keep their contents.

use std::collections::HashSet;

use bug_gc::builtins::{new_string, string_lossy};
use bug_gc::heap::PayloadKind;
use bug_gc::{Context, Generation, Handle, HeapConfig, Node};

fn small() -> Context {
    Context::with_config(HeapConfig::new().arena_bytes(4096).stack_slots(64)).unwrap()
}

/// Every handle reachable from `roots`.
fn reachable(ctx: &Context, roots: &[Node]) -> Vec<Handle> {
    let mut seen = HashSet::new();
    let mut order = Vec::new();
    let mut pending: Vec<Handle> = roots.iter().flat_map(|n| n.references()).collect();
    while let Some(handle) = pending.pop() {
        if !seen.insert(handle) {
            continue;
        }
        order.push(handle);
        if ctx.heap().payload_kind(handle) == Some(PayloadKind::Objects) {
            for node in ctx.objects(handle).unwrap() {
                pending.extend(node.references());
            }
        }
    }
    order
}

/// `top -> mid -> leaf string`, plus an integer in `mid`.
fn three_levels(ctx: &mut Context) -> Node {
    let leaf = new_string(ctx, "leaf").unwrap();
    ctx.push(leaf).unwrap();

    let mid = ctx.allocate_objects(2).unwrap();
    ctx.objects_mut(mid)
        .unwrap()
        .copy_from_slice(&[leaf, Node::Integer(7)]);
    ctx.push(Node::Pointer { target: Some(mid) }).unwrap();

    let top = ctx.allocate_objects(1).unwrap();
    ctx.objects_mut(top).unwrap()[0] = Node::Pointer { target: Some(mid) };

    ctx.drop_n(2).unwrap();
    Node::Pointer { target: Some(top) }
}

#[test]
fn test_nested_graph_leaves_the_arena() {
    let mut ctx = small();
    let root = three_levels(&mut ctx);
    ctx.push(root).unwrap();

    let handles = reachable(&ctx, &[root]);
    assert_eq!(handles.len(), 3);
    let arena = ctx.heap().arena_range();
    let before: Vec<usize> = handles
        .iter()
        .map(|&h| ctx.heap().address_of(h).unwrap())
        .collect();
    assert!(before.iter().all(|a| arena.contains(a)));

    ctx.collect();

    let arena = ctx.heap().arena_range();
    for (&handle, old_address) in handles.iter().zip(&before) {
        let address = ctx.heap().address_of(handle).unwrap();
        assert_ne!(address, *old_address);
        assert!(!arena.contains(&address), "{handle} still points into the arena");
        assert_eq!(ctx.heap().generation_of(handle), Some(Generation::Old));
    }
    assert_eq!(reachable(&ctx, &[root]), handles);
}

#[test]
fn test_nested_contents_survive() {
    let mut ctx = small();
    let root = three_levels(&mut ctx);
    ctx.push(root).unwrap();

    ctx.collect();
    ctx.collect();

    let Node::Pointer { target: Some(top) } = root else {
        unreachable!()
    };
    let Node::Pointer { target: Some(mid) } = ctx.objects(top).unwrap()[0] else {
        panic!("top no longer points at mid");
    };
    let mid_nodes = ctx.objects(mid).unwrap().to_vec();
    assert_eq!(mid_nodes[1], Node::Integer(7));
    assert_eq!(string_lossy(&ctx, mid_nodes[0]).unwrap(), "leaf");
}

#[test]
fn test_string_survives_repeated_collections() {
    let mut ctx = small();
    let hello = new_string(&mut ctx, "hello").unwrap();
    ctx.push(hello).unwrap();

    ctx.collect();
    let Node::String { bytes, .. } = hello else {
        unreachable!()
    };
    let promoted_at = ctx.heap().address_of(bytes);
    ctx.collect();

    assert_eq!(string_lossy(&ctx, hello).unwrap(), "hello");
    assert_eq!(
        ctx.heap().address_of(bytes),
        promoted_at,
        "old blocks do not move"
    );
}

#[test]
fn test_arena_is_empty_after_collect() {
    let mut ctx = small();
    let root = three_levels(&mut ctx);
    ctx.push(root).unwrap();
    assert!(ctx.heap().young_bytes() > 0);

    ctx.collect();

    assert_eq!(ctx.heap().young_bytes(), 0);
    assert_eq!(ctx.heap().old_blocks(), 3);
}

#[test]
fn test_mutation_after_promotion() {
    let mut ctx = small();
    let cell = ctx.allocate_objects(1).unwrap();
    ctx.push(Node::Pointer { target: Some(cell) }).unwrap();
    ctx.collect();

    // Old cell now references a young string.
    let s = new_string(&mut ctx, "young").unwrap();
    ctx.objects_mut(cell).unwrap()[0] = s;
    ctx.collect();

    let Node::String { bytes, .. } = s else {
        unreachable!()
    };
    assert_eq!(ctx.heap().generation_of(bytes), Some(Generation::Old));
    assert_eq!(string_lossy(&ctx, ctx.objects(cell).unwrap()[0]).unwrap(), "young");
}
