//! The minimal standard library that generated code calls into.
//!
//! Every constructor here keeps its partially built value rooted on the
//! value stack across any allocation that might collect, and returns the
//! finished value unrooted. The caller roots it before allocating again.
//!
//! Lists are chains of one-element object allocations, each holding a list
//! cell. Scalar elements live inline in `ListInteger`/`ListDouble`/
//! `ListChar`/`ListBool` cells; anything else is boxed and referenced from a
//! `ListPointer` cell. A list value is a `Pointer` to the first cell's
//! allocation, or the empty list.

use std::collections::HashSet;
use std::fmt::Write as _;
use std::io::Write;

use crate::context::Context;
use crate::error::{Result, RuntimeError};
use crate::node::{ClosureCode, Handle, Node, NodeType};

/// Runs `f` in a scratch frame that is discarded afterwards, even on error.
fn scratch<R>(ctx: &mut Context, f: impl FnOnce(&mut Context) -> Result<R>) -> Result<R> {
    let frame = ctx.push_frame();
    let result = f(ctx);
    ctx.pop_frame(frame);
    result
}

// ============================================================================
// Strings
// ============================================================================

/// Copies `text` into a fresh byte allocation.
///
/// # Errors
///
/// [`RuntimeError::AllocationTooLarge`] above the heap's limit.
pub fn new_string(ctx: &mut Context, text: &str) -> Result<Node> {
    let bytes = ctx.allocate_bytes(text.len())?;
    ctx.bytes_mut(bytes)?.copy_from_slice(text.as_bytes());
    Ok(Node::String {
        len: text.len(),
        bytes,
    })
}

/// The bytes of a string node.
///
/// # Errors
///
/// [`RuntimeError::TypeMismatch`] for non-strings,
/// [`RuntimeError::DanglingHandle`] if the buffer was reclaimed.
pub fn string_bytes(ctx: &Context, node: Node) -> Result<&[u8]> {
    match node {
        Node::String { len, bytes } => {
            let buffer = ctx.bytes(bytes)?;
            buffer.get(..len).ok_or(RuntimeError::PayloadMismatch {
                handle: bytes,
                expected: "string bytes",
                found: "a shorter buffer",
            })
        }
        other => Err(RuntimeError::TypeMismatch {
            expected: "a string",
            found: other.node_type(),
        }),
    }
}

/// A string node's contents, with invalid UTF-8 replaced.
///
/// # Errors
///
/// As for [`string_bytes`].
pub fn string_lossy(ctx: &Context, node: Node) -> Result<String> {
    string_bytes(ctx, node).map(|b| String::from_utf8_lossy(b).into_owned())
}

/// Text form of a printable value.
fn render(ctx: &Context, node: Node) -> Result<String> {
    match node {
        Node::Integer(i) => Ok(i.to_string()),
        Node::Double(d) => Ok(format!("{d:.6}")),
        Node::Char(c) => Ok(c.to_string()),
        Node::Bool(b) => Ok(b.to_string()),
        Node::String { .. } => string_lossy(ctx, node),
        other => Err(RuntimeError::TypeMismatch {
            expected: "a scalar or string",
            found: other.node_type(),
        }),
    }
}

/// Converts a scalar to a string node. Strings are returned unchanged.
///
/// Doubles are written with six fractional digits.
///
/// # Errors
///
/// [`RuntimeError::TypeMismatch`] for pointers, lists and closures.
pub fn to_string(ctx: &mut Context, node: Node) -> Result<Node> {
    if let Node::String { .. } = node {
        return Ok(node);
    }
    let text = render(ctx, node)?;
    new_string(ctx, &text)
}

/// Writes a value's text to `out`. Returns the byte count as an integer.
///
/// # Errors
///
/// [`RuntimeError::TypeMismatch`] for unprintable values,
/// [`RuntimeError::Io`] if writing fails.
pub fn print(ctx: &Context, node: Node, out: &mut impl Write) -> Result<Node> {
    let text = render(ctx, node)?;
    out.write_all(text.as_bytes())?;
    Ok(byte_count(text.len()))
}

/// As [`print`], followed by a newline that is included in the count.
///
/// # Errors
///
/// As for [`print`].
pub fn println(ctx: &Context, node: Node, out: &mut impl Write) -> Result<Node> {
    let mut text = render(ctx, node)?;
    text.push('\n');
    out.write_all(text.as_bytes())?;
    Ok(byte_count(text.len()))
}

fn byte_count(n: usize) -> Node {
    Node::Integer(i64::try_from(n).unwrap_or(i64::MAX))
}

// ============================================================================
// Boxes
// ============================================================================

/// Puts `value` into a fresh one-element allocation.
///
/// # Errors
///
/// [`RuntimeError::StackOverflow`] if `value` cannot be rooted.
pub fn box_value(ctx: &mut Context, value: Node) -> Result<Node> {
    let target = allocate_box(ctx, value)?;
    Ok(Node::Pointer {
        target: Some(target),
    })
}

fn allocate_box(ctx: &mut Context, value: Node) -> Result<Handle> {
    scratch(ctx, |ctx| {
        ctx.push(value)?;
        let target = ctx.allocate_objects(1)?;
        ctx.objects_mut(target)?[0] = value;
        Ok(target)
    })
}

/// The value inside a box.
///
/// # Errors
///
/// [`RuntimeError::TypeMismatch`] if `node` is not a non-empty pointer.
pub fn unbox(ctx: &Context, node: Node) -> Result<Node> {
    match node {
        Node::Pointer {
            target: Some(target),
        } => ctx
            .objects(target)?
            .first()
            .copied()
            .ok_or(RuntimeError::TypeMismatch {
                expected: "a box",
                found: NodeType::Pointer,
            }),
        other => Err(RuntimeError::TypeMismatch {
            expected: "a box",
            found: other.node_type(),
        }),
    }
}

/// `Bool(true)` if `node` has type `ty`.
#[must_use]
pub fn is_a(node: Node, ty: NodeType) -> Node {
    Node::Bool(node.node_type() == ty)
}

// ============================================================================
// Lists
// ============================================================================

/// The empty list.
#[must_use]
pub const fn empty_list() -> Node {
    Node::EMPTY_LIST
}

/// The first cell of a non-empty list.
fn first_cell(ctx: &Context, list: Node) -> Result<Option<(Handle, Node)>> {
    match list {
        Node::Pointer { target: None } => Ok(None),
        Node::Pointer {
            target: Some(target),
        } => {
            let cell = read_cell(ctx, target)?;
            Ok(Some((target, cell)))
        }
        other => Err(RuntimeError::TypeMismatch {
            expected: "a list",
            found: other.node_type(),
        }),
    }
}

fn read_cell(ctx: &Context, handle: Handle) -> Result<Node> {
    let cell = ctx.objects(handle)?.first().copied().unwrap_or_default();
    if cell.is_list_cell() {
        Ok(cell)
    } else {
        Err(RuntimeError::TypeMismatch {
            expected: "a list cell",
            found: cell.node_type(),
        })
    }
}

/// Appends `value` to the end of `list` and returns the list.
///
/// The empty list yields a new one-element list; otherwise the last cell is
/// relinked in place and the same head is returned.
///
/// # Errors
///
/// [`RuntimeError::TypeMismatch`] if `list` is not a list.
pub fn list_cat(ctx: &mut Context, list: Node, value: Node) -> Result<Node> {
    let first = first_cell(ctx, list)?.map(|(handle, _)| handle);
    scratch(ctx, |ctx| {
        ctx.push(list)?;
        ctx.push(value)?;

        let cell = match value {
            Node::Integer(head) => Node::ListInteger { head, next: None },
            Node::Double(head) => Node::ListDouble { head, next: None },
            Node::Char(head) => Node::ListChar { head, next: None },
            Node::Bool(head) => Node::ListBool { head, next: None },
            other => {
                let head = allocate_box(ctx, other)?;
                ctx.push(Node::Pointer { target: Some(head) })?;
                Node::ListPointer { head, next: None }
            }
        };
        let link = ctx.allocate_objects(1)?;
        ctx.objects_mut(link)?[0] = cell;

        let Some(mut last) = first else {
            return Ok(Node::Pointer { target: Some(link) });
        };
        while let Some(next) = read_cell(ctx, last)?.next_cell() {
            last = next;
        }
        ctx.objects_mut(last)?[0].set_next_cell(Some(link));
        Ok(list)
    })
}

/// The first element of a list.
///
/// # Errors
///
/// [`RuntimeError::EmptyList`] on the empty list,
/// [`RuntimeError::TypeMismatch`] if `list` is not a list.
pub fn car(ctx: &Context, list: Node) -> Result<Node> {
    let (_, cell) = first_cell(ctx, list)?.ok_or(RuntimeError::EmptyList)?;
    cell_value(ctx, cell)
}

fn cell_value(ctx: &Context, cell: Node) -> Result<Node> {
    Ok(match cell {
        Node::ListInteger { head, .. } => Node::Integer(head),
        Node::ListDouble { head, .. } => Node::Double(head),
        Node::ListChar { head, .. } => Node::Char(head),
        Node::ListBool { head, .. } => Node::Bool(head),
        Node::ListPointer { head, .. } => unbox(ctx, Node::Pointer { target: Some(head) })?,
        other => {
            return Err(RuntimeError::TypeMismatch {
                expected: "a list cell",
                found: other.node_type(),
            })
        }
    })
}

/// The list after its first element. A view of the same cells, not a copy.
///
/// # Errors
///
/// [`RuntimeError::EmptyList`] on the empty list,
/// [`RuntimeError::TypeMismatch`] if `list` is not a list.
pub fn cdr(ctx: &Context, list: Node) -> Result<Node> {
    let (_, cell) = first_cell(ctx, list)?.ok_or(RuntimeError::EmptyList)?;
    Ok(Node::Pointer {
        target: cell.next_cell(),
    })
}

/// Every element of a list, in order.
///
/// # Errors
///
/// [`RuntimeError::TypeMismatch`] if `list` is not a list.
pub fn list_elements(ctx: &Context, list: Node) -> Result<Vec<Node>> {
    let mut elements = Vec::new();
    let mut cursor = first_cell(ctx, list)?.map(|(_, cell)| cell);
    while let Some(cell) = cursor {
        elements.push(cell_value(ctx, cell)?);
        cursor = cell.next_cell().map(|next| read_cell(ctx, next)).transpose()?;
    }
    Ok(elements)
}

/// Number of cells in a list.
///
/// # Errors
///
/// [`RuntimeError::TypeMismatch`] if `list` is not a list.
pub fn list_length(ctx: &Context, list: Node) -> Result<usize> {
    let mut len = 0;
    let mut cursor = first_cell(ctx, list)?.map(|(_, cell)| cell);
    while let Some(cell) = cursor {
        len += 1;
        cursor = cell.next_cell().map(|next| read_cell(ctx, next)).transpose()?;
    }
    Ok(len)
}

// ============================================================================
// Closures
// ============================================================================

/// Snapshots frame slots into a new capture block.
///
/// Slot 0 of the block holds `Integer(count)`; slots `1..=count` hold the
/// values of the given frame-relative locals, copied by value.
///
/// # Errors
///
/// [`RuntimeError::SlotOutOfRange`] for a slot past the frame's top.
pub fn make_captures(ctx: &mut Context, slots: &[usize]) -> Result<Handle> {
    let values = slots
        .iter()
        .map(|&slot| ctx.local(slot))
        .collect::<Result<Vec<_>>>()?;
    let block = ctx.allocate_objects(values.len() + 1)?;
    let nodes = ctx.objects_mut(block)?;
    nodes[0] = Node::Integer(i64::try_from(values.len()).unwrap_or(i64::MAX));
    nodes[1..].copy_from_slice(&values);
    Ok(block)
}

/// Builds a closure over the given frame slots.
///
/// # Errors
///
/// As for [`make_captures`].
pub fn make_closure(ctx: &mut Context, code: ClosureCode, slots: &[usize]) -> Result<Node> {
    let captures = make_captures(ctx, slots)?;
    Ok(match code {
        ClosureCode::Void(code) => Node::VoidClosure { code, captures },
        ClosureCode::Value(code) => Node::ValueClosure { code, captures },
    })
}

// ============================================================================
// Debugging
// ============================================================================

/// Indented dump of a value and everything it references.
///
/// Each allocation is expanded once; later references to it print as
/// `<seen #handle>`, so shared and cyclic structures terminate.
///
/// # Errors
///
/// [`RuntimeError::DanglingHandle`] if the graph references a reclaimed
/// allocation.
pub fn describe(ctx: &Context, node: Node) -> Result<String> {
    let mut out = String::new();
    let mut seen = HashSet::new();
    let mut pending = vec![(node, 0usize)];

    while let Some((node, depth)) = pending.pop() {
        let indent = "  ".repeat(depth);
        let mut children: Vec<(Node, usize)> = Vec::new();

        let line = match node {
            Node::Undefined => "undefined".to_owned(),
            Node::Integer(i) => format!("integer {i}"),
            Node::Double(d) => format!("double {d:.6}"),
            Node::Char(c) => format!("char {c:?}"),
            Node::Bool(b) => format!("bool {b}"),
            Node::Pointer { target: None } => "empty list".to_owned(),
            Node::Pointer {
                target: Some(target),
            } => {
                if seen.insert(target) {
                    let nodes = ctx.objects(target)?;
                    children.extend(nodes.iter().map(|&n| (n, depth + 1)));
                    format!("pointer {target} ({} slots)", nodes.len())
                } else {
                    format!("<seen {target}>")
                }
            }
            Node::String { len, .. } => {
                format!("string {:?} ({len} bytes)", string_lossy(ctx, node)?)
            }
            Node::VoidClosure { captures, .. } | Node::ValueClosure { captures, .. } => {
                if seen.insert(captures) {
                    let nodes = ctx.objects(captures)?;
                    children.extend(nodes.iter().skip(1).map(|&n| (n, depth + 1)));
                    format!(
                        "{} {captures} ({} captures)",
                        node.node_type(),
                        nodes.len().saturating_sub(1)
                    )
                } else {
                    format!("<seen {captures}>")
                }
            }
            cell => {
                let line = match cell {
                    Node::ListInteger { head, .. } => format!("{} {head}", cell.node_type()),
                    Node::ListDouble { head, .. } => format!("{} {head:.6}", cell.node_type()),
                    Node::ListChar { head, .. } => format!("{} {head:?}", cell.node_type()),
                    Node::ListBool { head, .. } => format!("{} {head}", cell.node_type()),
                    _ => cell.node_type().to_string(),
                };
                if let Some(next) = cell.next_cell() {
                    if seen.insert(next) {
                        children.push((read_cell(ctx, next)?, depth));
                    } else {
                        children.push((Node::Pointer { target: Some(next) }, depth));
                    }
                }
                if let Node::ListPointer { head, .. } = cell {
                    children.push((Node::Pointer { target: Some(head) }, depth + 1));
                }
                line
            }
        };

        let _ = writeln!(out, "{indent}{line}");
        pending.extend(children.into_iter().rev());
    }

    Ok(out)
}
