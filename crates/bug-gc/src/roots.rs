//! Root tracking beyond the value stack.
//!
//! The collector starts marking from three sources:
//! - the live prefix of the [`ValueStack`](crate::stack::ValueStack)
//! - the capture blocks of closures that are currently running
//! - values the host registered explicitly with [`RegisteredRoots`]

use std::num::NonZeroU32;

use crate::error::{Result, RuntimeError};
use crate::node::{Handle, Node};

// ============================================================================
// RegisteredRoots - explicit root list
// ============================================================================

/// Identifier of a registered root.
///
/// Carries the version of its slot, so an id kept after
/// [`RegisteredRoots::unregister`] never reaches a later registration that
/// reuses the same slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RootId {
    index: u32,
    version: NonZeroU32,
}

impl RootId {
    /// Raw index, for diagnostics.
    #[must_use]
    pub const fn index(self) -> u32 {
        self.index
    }

    /// Version of the slot this id was issued for.
    #[must_use]
    pub const fn version(self) -> u32 {
        self.version.get()
    }
}

#[derive(Debug)]
struct RootSlot {
    version: NonZeroU32,
    node: Option<Node>,
}

/// Values kept alive on behalf of the host, outside the value stack.
#[derive(Debug, Default)]
pub struct RegisteredRoots {
    roots: Vec<RootSlot>,
    free: Vec<u32>,
}

impl RegisteredRoots {
    /// Create an empty root list.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            roots: Vec::new(),
            free: Vec::new(),
        }
    }

    /// Register a new root.
    ///
    /// # Panics
    ///
    /// Panics if more than `u32::MAX` roots are registered at once.
    pub fn register(&mut self, node: Node) -> RootId {
        if let Some(index) = self.free.pop() {
            let slot = &mut self.roots[index as usize];
            slot.node = Some(node);
            return RootId {
                index,
                version: slot.version,
            };
        }
        let index = u32::try_from(self.roots.len()).expect("root list exhausted");
        self.roots.push(RootSlot {
            version: NonZeroU32::MIN,
            node: Some(node),
        });
        RootId {
            index,
            version: NonZeroU32::MIN,
        }
    }

    fn slot(&self, id: RootId) -> Result<&RootSlot> {
        self.roots
            .get(id.index as usize)
            .filter(|slot| slot.version == id.version && slot.node.is_some())
            .ok_or(RuntimeError::UnknownRoot(id.index))
    }

    fn slot_mut(&mut self, id: RootId) -> Result<&mut RootSlot> {
        self.roots
            .get_mut(id.index as usize)
            .filter(|slot| slot.version == id.version && slot.node.is_some())
            .ok_or(RuntimeError::UnknownRoot(id.index))
    }

    /// Unregister a root, returning its last value.
    ///
    /// # Errors
    ///
    /// [`RuntimeError::UnknownRoot`] if `id` is not registered.
    pub fn unregister(&mut self, id: RootId) -> Result<Node> {
        let slot = self.slot_mut(id)?;
        let node = slot.node.take().unwrap_or_default();
        slot.version = slot.version.checked_add(1).unwrap_or(NonZeroU32::MIN);
        self.free.push(id.index);
        Ok(node)
    }

    /// Replace a root's value.
    ///
    /// # Errors
    ///
    /// [`RuntimeError::UnknownRoot`] if `id` is not registered.
    pub fn set(&mut self, id: RootId, node: Node) -> Result<()> {
        self.slot_mut(id)?.node = Some(node);
        Ok(())
    }

    /// Read a root's value.
    ///
    /// # Errors
    ///
    /// [`RuntimeError::UnknownRoot`] if `id` is not registered.
    pub fn get(&self, id: RootId) -> Result<Node> {
        Ok(self.slot(id)?.node.unwrap_or_default())
    }

    /// Number of registered roots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.roots.len() - self.free.len()
    }

    /// Iterate over all registered values.
    pub fn iter(&self) -> impl Iterator<Item = Node> + '_ {
        self.roots.iter().filter_map(|slot| slot.node)
    }
}

// ============================================================================
// RootSet - everything the collector scans
// ============================================================================

/// Borrowed view of every root source for one collection.
pub(crate) struct RootSet<'a> {
    pub stack: &'a [Node],
    pub captures: &'a [Handle],
    pub registered: &'a RegisteredRoots,
}

impl RootSet<'_> {
    /// Handles directly reachable from a root.
    pub fn handles(&self) -> impl Iterator<Item = Handle> + '_ {
        self.stack
            .iter()
            .copied()
            .chain(self.registered.iter())
            .flat_map(|node| node.references())
            .chain(self.captures.iter().copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_reuse() {
        let mut roots = RegisteredRoots::new();
        let a = roots.register(Node::Integer(1));
        let b = roots.register(Node::Integer(2));
        assert_eq!(roots.len(), 2);

        assert_eq!(roots.unregister(a).unwrap(), Node::Integer(1));
        assert!(matches!(roots.get(a), Err(RuntimeError::UnknownRoot(_))));
        assert!(matches!(roots.unregister(a), Err(RuntimeError::UnknownRoot(_))));

        let c = roots.register(Node::Integer(3));
        assert_eq!(c.index(), a.index(), "freed slots are reused");
        assert_ne!(c, a);
        assert_eq!(roots.get(b).unwrap(), Node::Integer(2));
        assert_eq!(roots.iter().count(), 2);
    }

    #[test]
    fn test_set_root() {
        let mut roots = RegisteredRoots::new();
        let id = roots.register(Node::Undefined);
        roots.set(id, Node::Bool(true)).unwrap();
        assert_eq!(roots.get(id).unwrap(), Node::Bool(true));
        let unknown = RootId {
            index: 99,
            version: NonZeroU32::MIN,
        };
        assert!(roots.set(unknown, Node::Undefined).is_err());
    }

    #[test]
    fn test_stale_id_does_not_reach_reused_slot() {
        let mut roots = RegisteredRoots::new();
        let stale = roots.register(Node::Integer(1));
        roots.unregister(stale).unwrap();
        let fresh = roots.register(Node::Integer(2));
        assert_eq!(fresh.index(), stale.index());

        assert!(matches!(roots.get(stale), Err(RuntimeError::UnknownRoot(_))));
        assert!(matches!(
            roots.set(stale, Node::Undefined),
            Err(RuntimeError::UnknownRoot(_))
        ));
        assert!(matches!(
            roots.unregister(stale),
            Err(RuntimeError::UnknownRoot(_))
        ));

        assert_eq!(roots.get(fresh).unwrap(), Node::Integer(2));
        assert_eq!(roots.len(), 1);
        assert_eq!(roots.iter().collect::<Vec<_>>(), vec![Node::Integer(2)]);
    }

    #[test]
    fn test_root_set_handles_skip_scalars() {
        let roots = RegisteredRoots::new();
        let stack = [Node::Integer(1), Node::EMPTY_LIST, Node::Undefined];
        let set = RootSet {
            stack: &stack,
            captures: &[],
            registered: &roots,
        };
        assert_eq!(set.handles().count(), 0);
    }
}
