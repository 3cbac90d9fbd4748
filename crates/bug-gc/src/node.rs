//! The runtime value model.
//!
//! Every value produced by generated or interpreted code is a [`Node`]: a
//! small `Copy` enum that either carries a scalar inline or refers to a heap
//! allocation through a [`Handle`]. Nodes themselves are never freed; they
//! live inline on the value stack or inside object allocations, and only the
//! allocations they reference are managed by the collector.

use std::fmt;
use std::num::NonZeroU32;

use crate::context::Context;
use crate::error::RuntimeError;

/// Native code behind a closure that produces no value.
pub type VoidFn = fn(&mut Context) -> Result<(), RuntimeError>;

/// Native code behind a closure that produces a value.
pub type ValueFn = fn(&mut Context) -> Result<Node, RuntimeError>;

/// The code of a closure, either flavour.
#[derive(Debug, Clone, Copy)]
pub enum ClosureCode {
    /// Runs for effect.
    Void(VoidFn),
    /// Produces a value.
    Value(ValueFn),
}

// ============================================================================
// Handle - stable allocation identity
// ============================================================================

/// Identity of one heap allocation.
///
/// A handle names a slot in the heap's handle table rather than an address,
/// so it stays valid when the collector promotes the allocation out of the
/// young arena. When an allocation is reclaimed its slot version is bumped,
/// so an old handle can never resolve to a newer allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle {
    index: u32,
    version: NonZeroU32,
}

impl Handle {
    pub(crate) const fn new(index: u32, version: NonZeroU32) -> Self {
        Self { index, version }
    }

    /// Slot index in the handle table.
    #[must_use]
    pub const fn index(self) -> u32 {
        self.index
    }

    /// Version of the slot this handle was issued for.
    #[must_use]
    pub const fn version(self) -> u32 {
        self.version.get()
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}v{}", self.index, self.version)
    }
}

// ============================================================================
// NodeType - payload-free tag
// ============================================================================

/// The type tag of a [`Node`], without its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeType {
    /// No value.
    Undefined,
    /// A box, a list head, or the empty list.
    Pointer,
    /// 64-bit signed integer.
    Integer,
    /// 64-bit float.
    Double,
    /// Unicode scalar value.
    Char,
    /// Boolean.
    Bool,
    /// Byte string.
    String,
    /// Closure run for effect.
    VoidClosure,
    /// Closure producing a value.
    ValueClosure,
    /// List cell holding a boxed element.
    ListPointer,
    /// List cell holding an integer.
    ListInteger,
    /// List cell holding a double.
    ListDouble,
    /// List cell holding a char.
    ListChar,
    /// List cell holding a bool.
    ListBool,
}

impl NodeType {
    /// Lower-case name used in diagnostics.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Undefined => "undefined",
            Self::Pointer => "pointer",
            Self::Integer => "integer",
            Self::Double => "double",
            Self::Char => "char",
            Self::Bool => "bool",
            Self::String => "string",
            Self::VoidClosure => "void closure",
            Self::ValueClosure => "value closure",
            Self::ListPointer => "pointer list cell",
            Self::ListInteger => "integer list cell",
            Self::ListDouble => "double list cell",
            Self::ListChar => "char list cell",
            Self::ListBool => "bool list cell",
        }
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ============================================================================
// Node
// ============================================================================

/// A runtime value.
///
/// Pointer-shaped variants refer to allocations by [`Handle`]:
///
/// - `Pointer` targets an object allocation (a box or the first cell of a
///   list). `target: None` is the empty list.
/// - `String` targets a byte allocation holding exactly `len` bytes.
/// - Closures target a capture block: an object allocation whose slot 0 is
///   `Integer(count)` followed by `count` captured values.
/// - List cells carry their element in `head` (inline for scalars, a box for
///   `ListPointer`) and chain through `next`, a one-element object
///   allocation holding the following cell.
#[derive(Debug, Clone, Copy, Default)]
pub enum Node {
    /// No value. Fresh object slots and cleared stack slots hold this.
    #[default]
    Undefined,
    /// A box or list head; `None` is the empty list.
    Pointer {
        /// The referenced object allocation.
        target: Option<Handle>,
    },
    /// 64-bit signed integer.
    Integer(i64),
    /// 64-bit float.
    Double(f64),
    /// Unicode scalar value.
    Char(char),
    /// Boolean.
    Bool(bool),
    /// Byte string.
    String {
        /// Length in bytes, no terminator.
        len: usize,
        /// Byte allocation holding exactly `len` bytes.
        bytes: Handle,
    },
    /// Closure run for effect.
    VoidClosure {
        /// Native code.
        code: VoidFn,
        /// Capture block.
        captures: Handle,
    },
    /// Closure producing a value.
    ValueClosure {
        /// Native code.
        code: ValueFn,
        /// Capture block.
        captures: Handle,
    },
    /// List cell whose element is boxed.
    ListPointer {
        /// Box holding the element.
        head: Handle,
        /// Allocation holding the next cell.
        next: Option<Handle>,
    },
    /// List cell holding an integer.
    ListInteger {
        /// The element.
        head: i64,
        /// Allocation holding the next cell.
        next: Option<Handle>,
    },
    /// List cell holding a double.
    ListDouble {
        /// The element.
        head: f64,
        /// Allocation holding the next cell.
        next: Option<Handle>,
    },
    /// List cell holding a char.
    ListChar {
        /// The element.
        head: char,
        /// Allocation holding the next cell.
        next: Option<Handle>,
    },
    /// List cell holding a bool.
    ListBool {
        /// The element.
        head: bool,
        /// Allocation holding the next cell.
        next: Option<Handle>,
    },
}

impl Node {
    /// The empty list.
    pub const EMPTY_LIST: Self = Self::Pointer { target: None };

    /// The type tag of this node.
    #[must_use]
    pub const fn node_type(&self) -> NodeType {
        match self {
            Self::Undefined => NodeType::Undefined,
            Self::Pointer { .. } => NodeType::Pointer,
            Self::Integer(_) => NodeType::Integer,
            Self::Double(_) => NodeType::Double,
            Self::Char(_) => NodeType::Char,
            Self::Bool(_) => NodeType::Bool,
            Self::String { .. } => NodeType::String,
            Self::VoidClosure { .. } => NodeType::VoidClosure,
            Self::ValueClosure { .. } => NodeType::ValueClosure,
            Self::ListPointer { .. } => NodeType::ListPointer,
            Self::ListInteger { .. } => NodeType::ListInteger,
            Self::ListDouble { .. } => NodeType::ListDouble,
            Self::ListChar { .. } => NodeType::ListChar,
            Self::ListBool { .. } => NodeType::ListBool,
        }
    }

    /// Returns `true` if this is the empty list.
    #[must_use]
    pub const fn is_empty_list(&self) -> bool {
        matches!(self, Self::Pointer { target: None })
    }

    /// Returns `true` for list cell variants.
    #[must_use]
    pub const fn is_list_cell(&self) -> bool {
        matches!(
            self,
            Self::ListPointer { .. }
                | Self::ListInteger { .. }
                | Self::ListDouble { .. }
                | Self::ListChar { .. }
                | Self::ListBool { .. }
        )
    }

    /// The following cell of a list cell, if any.
    #[must_use]
    pub const fn next_cell(&self) -> Option<Handle> {
        match *self {
            Self::ListPointer { next, .. }
            | Self::ListInteger { next, .. }
            | Self::ListDouble { next, .. }
            | Self::ListChar { next, .. }
            | Self::ListBool { next, .. } => next,
            _ => None,
        }
    }

    /// Code and capture block of a closure node.
    #[must_use]
    pub const fn closure_parts(&self) -> Option<(ClosureCode, Handle)> {
        match *self {
            Self::VoidClosure { code, captures } => Some((ClosureCode::Void(code), captures)),
            Self::ValueClosure { code, captures } => Some((ClosureCode::Value(code), captures)),
            _ => None,
        }
    }

    /// Relinks a list cell to a new following cell. No-op for other variants.
    pub(crate) fn set_next_cell(&mut self, link: Option<Handle>) {
        match self {
            Self::ListPointer { next, .. }
            | Self::ListInteger { next, .. }
            | Self::ListDouble { next, .. }
            | Self::ListChar { next, .. }
            | Self::ListBool { next, .. } => *next = link,
            _ => {}
        }
    }

    /// The allocations this node refers to directly.
    ///
    /// These are the outgoing edges the collector follows.
    pub fn references(&self) -> impl Iterator<Item = Handle> {
        let edges: [Option<Handle>; 2] = match *self {
            Self::Pointer { target } => [target, None],
            Self::String { bytes, .. } => [Some(bytes), None],
            Self::VoidClosure { captures, .. } | Self::ValueClosure { captures, .. } => {
                [Some(captures), None]
            }
            Self::ListPointer { head, next } => [Some(head), next],
            Self::ListInteger { next, .. }
            | Self::ListDouble { next, .. }
            | Self::ListChar { next, .. }
            | Self::ListBool { next, .. } => [next, None],
            Self::Undefined
            | Self::Integer(_)
            | Self::Double(_)
            | Self::Char(_)
            | Self::Bool(_) => [None, None],
        };
        edges.into_iter().flatten()
    }
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        match (*self, *other) {
            (Self::Undefined, Self::Undefined) => true,
            (Self::Pointer { target: a }, Self::Pointer { target: b }) => a == b,
            (Self::Integer(a), Self::Integer(b)) => a == b,
            (Self::Double(a), Self::Double(b)) => a == b,
            (Self::Char(a), Self::Char(b)) => a == b,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::String { len: la, bytes: a }, Self::String { len: lb, bytes: b }) => {
                la == lb && a == b
            }
            (
                Self::VoidClosure { code: fa, captures: a },
                Self::VoidClosure { code: fb, captures: b },
            ) => fa as usize == fb as usize && a == b,
            (
                Self::ValueClosure { code: fa, captures: a },
                Self::ValueClosure { code: fb, captures: b },
            ) => fa as usize == fb as usize && a == b,
            (Self::ListPointer { head: ha, next: a }, Self::ListPointer { head: hb, next: b }) => {
                ha == hb && a == b
            }
            (Self::ListInteger { head: ha, next: a }, Self::ListInteger { head: hb, next: b }) => {
                ha == hb && a == b
            }
            (Self::ListDouble { head: ha, next: a }, Self::ListDouble { head: hb, next: b }) => {
                ha == hb && a == b
            }
            (Self::ListChar { head: ha, next: a }, Self::ListChar { head: hb, next: b }) => {
                ha == hb && a == b
            }
            (Self::ListBool { head: ha, next: a }, Self::ListBool { head: hb, next: b }) => {
                ha == hb && a == b
            }
            _ => false,
        }
    }
}

impl From<i64> for Node {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<f64> for Node {
    fn from(value: f64) -> Self {
        Self::Double(value)
    }
}

impl From<char> for Node {
    fn from(value: char) -> Self {
        Self::Char(value)
    }
}

impl From<bool> for Node {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle(index: u32) -> Handle {
        Handle::new(index, NonZeroU32::MIN)
    }

    #[test]
    fn test_node_is_small() {
        assert!(std::mem::size_of::<Node>() <= 24);
        assert_eq!(
            std::mem::size_of::<Option<Handle>>(),
            std::mem::size_of::<Handle>()
        );
    }

    #[test]
    fn test_scalars_have_no_references() {
        for node in [
            Node::Undefined,
            Node::Integer(7),
            Node::Double(1.5),
            Node::Char('x'),
            Node::Bool(true),
            Node::EMPTY_LIST,
        ] {
            assert_eq!(node.references().count(), 0, "{node:?}");
        }
    }

    #[test]
    fn test_list_pointer_references_head_and_next() {
        let cell = Node::ListPointer {
            head: handle(1),
            next: Some(handle(2)),
        };
        let refs: Vec<_> = cell.references().collect();
        assert_eq!(refs, vec![handle(1), handle(2)]);
    }

    #[test]
    fn test_scalar_cells_reference_only_next() {
        let cell = Node::ListInteger {
            head: 4,
            next: Some(handle(9)),
        };
        assert_eq!(cell.references().collect::<Vec<_>>(), vec![handle(9)]);
        assert_eq!(cell.next_cell(), Some(handle(9)));
    }

    #[test]
    fn test_set_next_cell() {
        let mut cell = Node::ListBool {
            head: true,
            next: None,
        };
        cell.set_next_cell(Some(handle(3)));
        assert_eq!(cell.next_cell(), Some(handle(3)));

        let mut scalar = Node::Integer(1);
        scalar.set_next_cell(Some(handle(3)));
        assert_eq!(scalar, Node::Integer(1));
    }

    #[test]
    fn test_node_type_tags() {
        assert_eq!(Node::EMPTY_LIST.node_type(), NodeType::Pointer);
        assert!(Node::EMPTY_LIST.is_empty_list());
        assert_eq!(Node::from(3i64).node_type(), NodeType::Integer);
        assert_eq!(Node::from('c').node_type(), NodeType::Char);
        assert_eq!(NodeType::ListDouble.to_string(), "double list cell");
    }

    #[test]
    fn test_handle_display() {
        assert_eq!(handle(12).to_string(), "#12v1");
    }
}
