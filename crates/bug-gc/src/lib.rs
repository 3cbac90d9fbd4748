//! Managed heap and tracing garbage collector for the bug language runtime.
//!
//! `bug-gc` owns every value that generated or interpreted bug code creates.
//! Values are [`Node`]s: a closed enum carrying scalars inline and referring
//! to heap allocations by [`Handle`]. New allocations are bump-allocated in a
//! small **young arena**; a stop-the-world **mark / promote / sweep**
//! collection copies survivors into a stable **old generation** of
//! individually allocated blocks and resets the arena.
//!
//! # Features
//!
//! - **Handle indirection**: promotion retargets a handle-table slot, so the
//!   live graph never needs pointer rewriting
//! - **Explicit roots**: the value stack, running closures' captures and a
//!   registered root list. No conservative scanning
//! - **Worklist marking**: cycles and shared subgraphs terminate, long lists
//!   never deepen the native stack
//! - **Oversize escape**: requests larger than the arena go straight to the
//!   old generation
//!
//! # Quick Start
//!
//! ```
//! use bug_gc::{builtins, Context, Node};
//!
//! let mut ctx = Context::new()?;
//!
//! let hello = builtins::new_string(&mut ctx, "hello")?;
//! ctx.push(hello)?;
//!
//! let mut list = builtins::empty_list();
//! for i in 1..=3 {
//!     ctx.push(list)?;
//!     list = builtins::list_cat(&mut ctx, list, Node::Integer(i))?;
//!     ctx.pop()?;
//! }
//! ctx.push(list)?;
//!
//! ctx.collect();
//!
//! assert_eq!(builtins::string_lossy(&ctx, hello)?, "hello");
//! assert_eq!(
//!     builtins::list_elements(&ctx, list)?,
//!     vec![Node::Integer(1), Node::Integer(2), Node::Integer(3)]
//! );
//! # Ok::<(), bug_gc::RuntimeError>(())
//! ```
//!
//! # Thread Safety
//!
//! A [`Context`] belongs to one mutator thread. Collection runs
//! synchronously inside the mutator's own calls.

#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod builtins;
mod config;
mod context;
mod error;
mod gc;
pub mod heap;
mod metrics;
mod node;
mod roots;
mod stack;

/// GC tracing support.
///
/// When the `tracing` feature is enabled, this module provides structured
/// tracing spans and events for garbage collection operations.
pub mod tracing;

pub use config::{default_collect_condition, CollectCondition, CollectInfo, HeapConfig};
pub use context::Context;
pub use error::{Result, RuntimeError};
pub use heap::{Generation, Heap};
pub use metrics::{CollectTrigger, GcMetrics, HeapStats, PhaseTimer};
pub use node::{ClosureCode, Handle, Node, NodeType, ValueFn, VoidFn};
pub use roots::RootId;
pub use stack::Frame;
