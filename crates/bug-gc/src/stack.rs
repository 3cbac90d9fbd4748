//! The mutator's value stack.
//!
//! A preallocated array of [`Node`]s with a bump `top` and a frame `base`.
//! Every slot below `top` is a root; slots at or above `top` are always
//! `Undefined`, so a collection never reads a stale value.

use crate::error::{Result, RuntimeError};
use crate::node::Node;

/// Saved frame base, returned by [`ValueStack::push_frame`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use = "a frame must be handed back to pop_frame"]
pub struct Frame {
    base: usize,
    top: usize,
}

/// Fixed-capacity stack of values.
pub struct ValueStack {
    slots: Box<[Node]>,
    top: usize,
    base: usize,
}

impl ValueStack {
    /// Creates a stack of `capacity` `Undefined` slots.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: vec![Node::Undefined; capacity].into_boxed_slice(),
            top: 0,
            base: 0,
        }
    }

    /// Slots in use across all frames.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.top
    }

    /// Slots in use by the current frame.
    #[must_use]
    pub const fn frame_len(&self) -> usize {
        self.top - self.base
    }

    /// Pushes one value.
    ///
    /// # Errors
    ///
    /// [`RuntimeError::StackOverflow`] if the stack is full.
    pub fn push(&mut self, node: Node) -> Result<()> {
        let capacity = self.slots.len();
        let slot = self
            .slots
            .get_mut(self.top)
            .ok_or(RuntimeError::StackOverflow { capacity })?;
        *slot = node;
        self.top += 1;
        Ok(())
    }

    /// Pops one value from the current frame.
    ///
    /// # Errors
    ///
    /// [`RuntimeError::StackUnderflow`] if the frame is empty.
    pub fn pop(&mut self) -> Result<Node> {
        if self.top == self.base {
            return Err(RuntimeError::StackUnderflow);
        }
        self.top -= 1;
        Ok(std::mem::take(&mut self.slots[self.top]))
    }

    /// The value on top of the current frame.
    ///
    /// # Errors
    ///
    /// [`RuntimeError::StackUnderflow`] if the frame is empty.
    pub fn peek(&self) -> Result<Node> {
        if self.top == self.base {
            return Err(RuntimeError::StackUnderflow);
        }
        Ok(self.slots[self.top - 1])
    }

    /// Pushes `n` `Undefined` local slots.
    ///
    /// # Errors
    ///
    /// [`RuntimeError::StackOverflow`] if fewer than `n` slots are free; the
    /// stack is left unchanged.
    pub fn reserve(&mut self, n: usize) -> Result<()> {
        let capacity = self.slots.len();
        match self.top.checked_add(n) {
            Some(new_top) if new_top <= capacity => {
                self.top = new_top;
                Ok(())
            }
            _ => Err(RuntimeError::StackOverflow { capacity }),
        }
    }

    /// Frame-relative read.
    ///
    /// # Errors
    ///
    /// [`RuntimeError::SlotOutOfRange`] if `index` is past the frame's top.
    pub fn local(&self, index: usize) -> Result<Node> {
        self.frame_index(index).map(|i| self.slots[i])
    }

    /// Frame-relative write.
    ///
    /// # Errors
    ///
    /// [`RuntimeError::SlotOutOfRange`] if `index` is past the frame's top.
    pub fn set_local(&mut self, index: usize, node: Node) -> Result<()> {
        let i = self.frame_index(index)?;
        self.slots[i] = node;
        Ok(())
    }

    fn frame_index(&self, index: usize) -> Result<usize> {
        if index < self.frame_len() {
            Ok(self.base + index)
        } else {
            Err(RuntimeError::SlotOutOfRange {
                index,
                len: self.frame_len(),
            })
        }
    }

    /// Pops `n` values from the current frame.
    ///
    /// # Errors
    ///
    /// [`RuntimeError::StackUnderflow`] if the frame holds fewer than `n`;
    /// the stack is left unchanged.
    pub fn drop_n(&mut self, n: usize) -> Result<()> {
        if n > self.frame_len() {
            return Err(RuntimeError::StackUnderflow);
        }
        self.truncate(self.top - n);
        Ok(())
    }

    /// Starts a new frame at the current top.
    pub fn push_frame(&mut self) -> Frame {
        let frame = Frame {
            base: self.base,
            top: self.top,
        };
        self.base = self.top;
        frame
    }

    /// Discards everything pushed since `frame` and restores its base.
    pub fn pop_frame(&mut self, frame: Frame) {
        debug_assert!(frame.top <= self.top, "frames popped out of order");
        self.truncate(frame.top);
        self.base = frame.base;
    }

    fn truncate(&mut self, new_top: usize) {
        if new_top < self.top {
            self.slots[new_top..self.top].fill(Node::Undefined);
            self.top = new_top;
        }
    }

    /// Every live slot, across all frames. This is the collector's root range.
    #[must_use]
    pub fn live(&self) -> &[Node] {
        &self.slots[..self.top]
    }
}
