//! Behavior Tree runtime built on `ai-core`.
//!
//! Trees are built once through a [`TreeBuilder`], laid out as an arena in pre-order, and then
//! driven tick by tick by bounded traversal iterators: one primary iterator plus one per parallel
//! branch. Conditional aborts preempt lower-priority branches (leftmost wins), interrupts unwind
//! branches unconditionally.

#![cfg_attr(docsrs, feature(doc_cfg))]
#![forbid(unsafe_code)]

pub mod abort;
pub mod bt;
pub mod builder;
pub mod composite;
pub mod decorator;
pub mod error;
mod exec;
pub mod interrupt;
pub mod iterator;
pub mod node;
pub mod parallel;
pub mod timer;
pub mod traversal;
pub mod tree;

pub use abort::{AbortPolicy, Chance, ConditionalAbort, KeyCondition, Predicate};
pub use bt::{BtContext, BtStatus, Condition, ExitReason, Task};
pub use builder::{DraftId, TreeBuilder};
pub use composite::{Composite, CompositeKind};
pub use decorator::{Decorator, Guard, GuardConfig};
pub use error::{BuildError, TreeError};
pub use interrupt::{Interruptable, Interruptor};
pub use iterator::{BehaviorIterator, IteratorId};
pub use node::{Arity, Node, NodeId, NodeInfo, NodeKind};
pub use parallel::{Parallel, ParallelPolicy};
pub use timer::Timer;
pub use tree::{BehaviorTree, InterruptMode, TreeConfig};
