use std::fmt;

use crate::abort::{AbortPolicy, ConditionalAbort};
use crate::bt::{BtStatus, Condition, Task};
use crate::composite::{Composite, CompositeKind};
use crate::decorator::{Decorator, GuardConfig};
use crate::interrupt::Interruptor;
use crate::iterator::IteratorId;
use crate::parallel::{Parallel, ParallelPolicy};

/// A node's pre-order index. Doubles as its priority rank: lower runs first.
pub type NodeId = usize;

/// Structural data computed once when the tree is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeInfo {
    pub(crate) pre_order: NodeId,
    pub(crate) post_order: usize,
    pub(crate) level: u32,
    pub(crate) child_order: usize,
    pub(crate) parent: Option<NodeId>,
    pub(crate) children: Vec<NodeId>,
    /// One past the last pre-order index of this node's subtree.
    pub(crate) subtree_end: NodeId,
    pub(crate) iterator: IteratorId,
}

impl NodeInfo {
    pub fn pre_order(&self) -> NodeId {
        self.pre_order
    }

    pub fn post_order(&self) -> usize {
        self.post_order
    }

    /// Depth from the root (root = 0).
    pub fn level(&self) -> u32 {
        self.level
    }

    /// Position among the parent's children.
    pub fn child_order(&self) -> usize {
        self.child_order
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    /// Pre-order indices covered by this node's subtree, the node itself included.
    pub fn subtree(&self) -> std::ops::Range<NodeId> {
        self.pre_order..self.subtree_end
    }

    /// Iterator responsible for ticking this node.
    pub fn iterator(&self) -> IteratorId {
        self.iterator
    }
}

pub struct Node {
    pub(crate) info: NodeInfo,
    pub(crate) kind: NodeKind,
}

impl Node {
    pub fn info(&self) -> &NodeInfo {
        &self.info
    }

    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    /// Mutable access to the node's state. Changing state of a node that is on a traversal stack
    /// is allowed but bypasses the scheduler's bookkeeping.
    pub fn kind_mut(&mut self) -> &mut NodeKind {
        &mut self.kind
    }

    /// Task name for leaves, kind label for everything else.
    pub fn name(&self) -> &str {
        match &self.kind {
            NodeKind::Task(task) => task.name(),
            kind => kind.label(),
        }
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("name", &self.name())
            .field("info", &self.info)
            .finish()
    }
}

/// How many children a node kind accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Leaf,
    One,
    Many,
}

/// The closed set of node variants the scheduler knows how to drive.
pub enum NodeKind {
    Task(Box<dyn Task>),
    Interruptor(Interruptor),
    Composite(Composite),
    Parallel(Parallel),
    Decorator(Decorator),
    ConditionalAbort(ConditionalAbort),
}

impl NodeKind {
    pub fn task(task: impl Task) -> Self {
        NodeKind::Task(Box::new(task))
    }

    pub fn composite(kind: CompositeKind) -> Self {
        NodeKind::Composite(Composite::new(kind))
    }

    pub fn sequence() -> Self {
        Self::composite(CompositeKind::Sequence)
    }

    pub fn selector() -> Self {
        Self::composite(CompositeKind::Selector)
    }

    /// Succeeds when every branch succeeds, fails on the first branch failure.
    pub fn parallel() -> Self {
        NodeKind::Parallel(Parallel::new(ParallelPolicy::AllSucceed))
    }

    /// Succeeds on the first branch success, fails when every branch fails.
    pub fn parallel_selector() -> Self {
        NodeKind::Parallel(Parallel::new(ParallelPolicy::AnySucceeds))
    }

    pub fn inverter() -> Self {
        NodeKind::Decorator(Decorator::Inverter)
    }

    pub fn succeeder() -> Self {
        NodeKind::Decorator(Decorator::Succeeder)
    }

    pub fn failer() -> Self {
        NodeKind::Decorator(Decorator::Failer)
    }

    pub fn repeat(times: u32) -> Self {
        NodeKind::Decorator(Decorator::repeater(Some(times), false))
    }

    pub fn repeat_forever() -> Self {
        NodeKind::Decorator(Decorator::repeater(None, false))
    }

    /// Repeats until the child fails, then fails; succeeds after `times` successes.
    pub fn repeat_until_failure(times: Option<u32>) -> Self {
        NodeKind::Decorator(Decorator::repeater(times, true))
    }

    pub fn until_success() -> Self {
        NodeKind::Decorator(Decorator::UntilSuccess)
    }

    pub fn until_failure() -> Self {
        NodeKind::Decorator(Decorator::UntilFailure)
    }

    pub fn cooldown(seconds: f32) -> Self {
        NodeKind::Decorator(Decorator::cooldown(seconds))
    }

    pub fn time_limit(seconds: f32) -> Self {
        NodeKind::Decorator(Decorator::time_limit(seconds))
    }

    pub fn guard(config: GuardConfig) -> Self {
        NodeKind::Decorator(Decorator::guard(config))
    }

    /// Decorator that finishes with `status` when an [`Interruptor`] fires at it.
    pub fn interruptable(status: BtStatus) -> Self {
        NodeKind::Decorator(Decorator::interruptable(status))
    }

    pub fn interruptor() -> Self {
        NodeKind::Interruptor(Interruptor::default())
    }

    pub fn conditional(condition: impl Condition, policy: AbortPolicy) -> Self {
        NodeKind::ConditionalAbort(ConditionalAbort::new(Box::new(condition), policy))
    }

    pub fn label(&self) -> &'static str {
        match self {
            NodeKind::Task(_) => "task",
            NodeKind::Interruptor(_) => "interruptor",
            NodeKind::Composite(c) => c.kind().label(),
            NodeKind::Parallel(p) => p.policy().label(),
            NodeKind::Decorator(d) => d.label(),
            NodeKind::ConditionalAbort(_) => "conditional_abort",
        }
    }

    pub fn arity(&self) -> Arity {
        match self {
            NodeKind::Task(_) | NodeKind::Interruptor(_) => Arity::Leaf,
            NodeKind::Decorator(_) | NodeKind::ConditionalAbort(_) => Arity::One,
            NodeKind::Composite(_) | NodeKind::Parallel(_) => Arity::Many,
        }
    }

    /// Composites and parallels: nodes whose exit tears down their children's decorator chains.
    pub fn is_composite(&self) -> bool {
        matches!(self, NodeKind::Composite(_) | NodeKind::Parallel(_))
    }

    pub fn as_composite(&self) -> Option<&Composite> {
        match self {
            NodeKind::Composite(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_parallel(&self) -> Option<&Parallel> {
        match self {
            NodeKind::Parallel(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_decorator(&self) -> Option<&Decorator> {
        match self {
            NodeKind::Decorator(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_conditional(&self) -> Option<&ConditionalAbort> {
        match self {
            NodeKind::ConditionalAbort(c) => Some(c),
            _ => None,
        }
    }

    pub(crate) fn is_guard(&self) -> bool {
        matches!(self, NodeKind::Decorator(Decorator::Guard(_)))
    }

    pub(crate) fn is_interruptable(&self) -> bool {
        matches!(self, NodeKind::Decorator(Decorator::Interruptable(_)))
    }

    /// Cross-node references held by guards and interruptors.
    pub fn links(&self) -> &[NodeId] {
        match self {
            NodeKind::Decorator(Decorator::Guard(g)) => g.links(),
            NodeKind::Interruptor(i) => i.targets(),
            _ => &[],
        }
    }

    pub(crate) fn set_links(&mut self, links: Vec<NodeId>) {
        match self {
            NodeKind::Decorator(Decorator::Guard(g)) => g.set_links(links),
            NodeKind::Interruptor(i) => i.set_targets(links),
            _ => {}
        }
    }

    /// A copy with the same configuration and fresh runtime state. Links are dropped; the
    /// builder re-installs them once the copy has its new indices.
    pub fn fresh_clone(&self) -> Self {
        match self {
            NodeKind::Task(task) => NodeKind::Task(task.clone_task()),
            NodeKind::Interruptor(_) => NodeKind::Interruptor(Interruptor::default()),
            NodeKind::Composite(c) => NodeKind::Composite(c.fresh()),
            NodeKind::Parallel(p) => NodeKind::Parallel(Parallel::new(p.policy())),
            NodeKind::Decorator(d) => NodeKind::Decorator(d.fresh()),
            NodeKind::ConditionalAbort(c) => NodeKind::ConditionalAbort(c.fresh()),
        }
    }
}

impl fmt::Debug for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeKind::Task(task) => f.debug_tuple("Task").field(&task.name()).finish(),
            NodeKind::Interruptor(i) => f.debug_tuple("Interruptor").field(i).finish(),
            NodeKind::Composite(c) => f.debug_tuple("Composite").field(c).finish(),
            NodeKind::Parallel(p) => f.debug_tuple("Parallel").field(p).finish(),
            NodeKind::Decorator(d) => f.debug_tuple("Decorator").field(d).finish(),
            NodeKind::ConditionalAbort(c) => f.debug_tuple("ConditionalAbort").field(c).finish(),
        }
    }
}
