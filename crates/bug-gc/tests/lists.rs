//! List construction and traversal tests.

use bug_gc::builtins::{
    car, cdr, empty_list, is_a, list_cat, list_elements, list_length, new_string, string_lossy,
};
use bug_gc::{Context, HeapConfig, Node, NodeType, RuntimeError};

fn small() -> Context {
    Context::with_config(HeapConfig::new().arena_bytes(1024).stack_slots(64)).unwrap()
}

fn int_list(ctx: &mut Context, values: impl IntoIterator<Item = i64>) -> Node {
    values.into_iter().fold(empty_list(), |list, i| {
        list_cat(ctx, list, Node::Integer(i)).unwrap()
    })
}

#[test]
fn test_append_preserves_order() {
    let mut ctx = small();
    let list = int_list(&mut ctx, 0..200);

    assert!(
        ctx.stats().collections > 0,
        "the arena is small enough that appending must collect"
    );
    assert_eq!(list_length(&ctx, list).unwrap(), 200);
    let expected: Vec<Node> = (0..200).map(Node::Integer).collect();
    assert_eq!(list_elements(&ctx, list).unwrap(), expected);
}

#[test]
fn test_first_append_creates_head() {
    let mut ctx = small();
    let list = list_cat(&mut ctx, empty_list(), Node::Bool(true)).unwrap();

    assert!(!list.is_empty_list());
    assert_eq!(is_a(list, NodeType::Pointer), Node::Bool(true));
    assert_eq!(car(&ctx, list).unwrap(), Node::Bool(true));
    assert_eq!(cdr(&ctx, list).unwrap(), empty_list());
}

#[test]
fn test_append_keeps_head() {
    let mut ctx = small();
    let list = int_list(&mut ctx, [1]);
    let again = list_cat(&mut ctx, list, Node::Integer(2)).unwrap();
    assert_eq!(again, list);
}

#[test]
fn test_cdr_is_a_view() {
    let mut ctx = small();
    let list = int_list(&mut ctx, [1, 2, 3]);
    let live = ctx.heap().live_allocations();

    let rest = cdr(&ctx, list).unwrap();
    assert_eq!(car(&ctx, rest).unwrap(), Node::Integer(2));
    assert_eq!(ctx.heap().live_allocations(), live, "cdr must not allocate");

    let last = cdr(&ctx, rest).unwrap();
    assert_eq!(list_elements(&ctx, last).unwrap(), vec![Node::Integer(3)]);
    let end = cdr(&ctx, last).unwrap();
    assert!(end.is_empty_list());
    assert!(matches!(cdr(&ctx, end), Err(RuntimeError::EmptyList)));
}

#[test]
fn test_mixed_elements() {
    let mut ctx = small();
    let mut list = empty_list();
    for value in [
        Node::Integer(7),
        Node::Double(0.25),
        Node::Char('λ'),
        Node::Bool(false),
    ] {
        list = list_cat(&mut ctx, list, value).unwrap();
    }

    ctx.push(list).unwrap();
    let word = new_string(&mut ctx, "word").unwrap();
    ctx.pop().unwrap();
    list = list_cat(&mut ctx, list, word).unwrap();

    ctx.push(list).unwrap();
    ctx.collect();

    let elements = list_elements(&ctx, list).unwrap();
    assert_eq!(
        &elements[..4],
        &[
            Node::Integer(7),
            Node::Double(0.25),
            Node::Char('λ'),
            Node::Bool(false)
        ]
    );
    assert_eq!(string_lossy(&ctx, elements[4]).unwrap(), "word");
}

#[test]
fn test_strings_survive_many_collections() {
    let mut ctx = small();
    let mut list = empty_list();
    for i in 0..50 {
        ctx.push(list).unwrap();
        let s = new_string(&mut ctx, &format!("item-{i}")).unwrap();
        ctx.pop().unwrap();
        list = list_cat(&mut ctx, list, s).unwrap();
    }
    ctx.push(list).unwrap();
    ctx.collect();

    let texts: Vec<String> = list_elements(&ctx, list)
        .unwrap()
        .into_iter()
        .map(|s| string_lossy(&ctx, s).unwrap())
        .collect();
    let expected: Vec<String> = (0..50).map(|i| format!("item-{i}")).collect();
    assert_eq!(texts, expected);
}

#[test]
fn test_nested_list() {
    let mut ctx = small();
    let inner = int_list(&mut ctx, [1, 2]);
    ctx.push(inner).unwrap();
    let outer = list_cat(&mut ctx, empty_list(), inner).unwrap();
    ctx.pop().unwrap();
    ctx.push(outer).unwrap();

    ctx.collect();

    let head = car(&ctx, outer).unwrap();
    assert_eq!(head, inner);
    assert_eq!(
        list_elements(&ctx, head).unwrap(),
        vec![Node::Integer(1), Node::Integer(2)]
    );
}

#[test]
fn test_non_list_is_rejected() {
    let mut ctx = small();
    assert!(matches!(
        list_cat(&mut ctx, Node::Integer(1), Node::Integer(2)),
        Err(RuntimeError::TypeMismatch {
            found: NodeType::Integer,
            ..
        })
    ));
    assert!(matches!(car(&ctx, empty_list()), Err(RuntimeError::EmptyList)));
}

#[test]
fn test_unrooted_list_is_reclaimed() {
    let mut ctx = small();
    int_list(&mut ctx, 0..10);
    ctx.collect();
    assert_eq!(ctx.heap().live_allocations(), 0);
}
