use std::collections::BTreeSet;

use ai_core::{Blackboard, SplitMix64, TickContext};
use ai_tools::{emit as trace_emit, TraceEvent};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::builder::TreeBuilder;
use crate::bt::BtStatus;
use crate::error::{BuildError, Result, TreeError};
use crate::iterator::{BehaviorIterator, IteratorId};
use crate::node::{Node, NodeId, NodeKind};
use crate::traversal::Hierarchy;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TreeConfig {
    /// Seed for the tree's RNG (shuffles, chance conditions).
    pub seed: u64,
    /// Deepest level a tree may have. Deeper trees are rejected at build time.
    pub max_height: u32,
    /// Re-enter the root on the tick after the tree finishes.
    pub restart_on_completion: bool,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            max_height: 64,
            restart_on_completion: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InterruptMode {
    /// Unwind only. The parent is not told: its cursor stays on the interrupted child, so a
    /// composite parent traverses that same child again on its next run.
    #[default]
    Silent,
    /// Unwind, then report `Failure` to the parent as if the node had failed.
    ReportFailure,
}

/// A built behavior tree instance: the node arena in pre-order plus its iterators.
#[derive(Debug)]
pub struct BehaviorTree {
    pub(crate) nodes: Vec<Node>,
    pub(crate) iterators: Vec<BehaviorIterator>,
    pub(crate) observers: Vec<NodeId>,
    pub(crate) tree_tickers: Vec<NodeId>,
    pub(crate) height: u32,
    pub(crate) config: TreeConfig,
    pub(crate) blackboard: Blackboard,
    pub(crate) rng: SplitMix64,
    pub(crate) ctx: TickContext,
    pub(crate) started: bool,
    pub(crate) root_status: Option<BtStatus>,
    // Keyed observers notified on a pass where their iterator had already aborted.
    pub(crate) deferred: BTreeSet<u64>,
}

impl BehaviorTree {
    pub fn builder() -> TreeBuilder {
        TreeBuilder::new()
    }

    /// Run every task's `on_start`, then traverse the root. The first tick enters it.
    pub fn start(&mut self) -> std::result::Result<(), TreeError> {
        if self.nodes.is_empty() {
            return Err(TreeError::Empty);
        }
        if self.started {
            return Err(TreeError::AlreadyStarted);
        }
        self.started = true;
        for node in 0..self.nodes.len() {
            self.on_start(node);
        }
        debug!(
            nodes = self.nodes.len(),
            height = self.height,
            iterators = self.iterators.len(),
            "behavior tree start"
        );
        self.begin();
        Ok(())
    }

    /// Advance the tree by one tick: tree-tick hooks, then observers, then one update of the
    /// primary iterator.
    ///
    /// Panics if the tree was not started.
    pub fn tick(&mut self, ctx: &TickContext) -> BtStatus {
        assert!(self.started, "tick on a behavior tree that was not started");
        self.ctx = *ctx;

        if !self.iterators[IteratorId::PRIMARY.0].is_running() {
            if !(self.config.restart_on_completion && self.root_status.is_some()) {
                return self.status();
            }
            debug!(tick = ctx.tick, "behavior tree restart on completion");
            self.begin();
        }

        self.tick_tree_nodes();
        self.evaluate_observers();
        if self.iterators[IteratorId::PRIMARY.0].is_running() {
            self.update_iterator(IteratorId::PRIMARY);
        }
        self.status()
    }

    /// `Running` while the root is on the stack, otherwise the root's last result (`Failure` if
    /// it has none).
    pub fn status(&self) -> BtStatus {
        match self.iterators.first() {
            Some(primary) if primary.is_running() => BtStatus::Running,
            _ => self.root_status.unwrap_or(BtStatus::Failure),
        }
    }

    pub fn is_running(&self) -> bool {
        self.status() == BtStatus::Running
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    /// Unwind everything and traverse the root again. Starts the tree if needed.
    pub fn restart(&mut self) -> std::result::Result<(), TreeError> {
        if self.nodes.is_empty() {
            return Err(TreeError::Empty);
        }
        if !self.started {
            return self.start();
        }
        self.unwind_all();
        debug!("behavior tree restart");
        self.begin();
        Ok(())
    }

    /// Force `node` and everything running below it off its iterator. Returns `false` when the
    /// node was not running.
    pub fn interrupt(&mut self, node: NodeId, mode: InterruptMode) -> bool {
        let it = self.nodes[node].info.iterator;
        if !self.interrupt_iterator(it, node) {
            return false;
        }
        if mode == InterruptMode::ReportFailure {
            self.notify_child_exit(it, node, BtStatus::Failure);
        }
        true
    }

    /// Unwind and drop the whole structure. A torn-down tree refuses to start again.
    pub fn teardown(&mut self) {
        if self.started && !self.nodes.is_empty() {
            self.unwind_all();
        }
        debug!(nodes = self.nodes.len(), "behavior tree teardown");
        self.nodes.clear();
        self.iterators.clear();
        self.observers.clear();
        self.tree_tickers.clear();
        self.deferred.clear();
        self.height = 0;
        self.started = false;
        self.root_status = None;
    }

    /// An independent copy with fresh runtime state and a cloned blackboard.
    pub fn clone_tree(&self) -> Result<BehaviorTree> {
        self.clone_subtree(0)
    }

    /// A new tree made of copies of `root` and its descendants. Links to nodes outside the
    /// subtree are dropped.
    pub fn clone_subtree(&self, root: NodeId) -> Result<BehaviorTree> {
        let range = self
            .nodes
            .get(root)
            .map(|node| node.info.subtree())
            .ok_or(BuildError::MissingRoot)?;
        let offset = range.start;

        let mut builder = TreeBuilder::new();
        let ids: Vec<_> = range
            .clone()
            .map(|i| builder.node(self.nodes[i].kind.fresh_clone()))
            .collect();
        for i in range.clone() {
            for &child in &self.nodes[i].info.children {
                builder.attach(ids[i - offset], ids[child - offset]);
            }
        }
        builder.set_root(ids[0]);

        // Second pass: links are re-installed once every copy has an id.
        for i in range.clone() {
            let links: Vec<_> = self.nodes[i]
                .kind
                .links()
                .iter()
                .filter(|target| range.contains(*target))
                .map(|&target| ids[target - offset])
                .collect();
            if !links.is_empty() {
                builder.set_links(ids[i - offset], links);
            }
        }

        *builder.blackboard_mut() = self.blackboard.clone();
        builder.build(self.config)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn root(&self) -> Option<NodeId> {
        (!self.nodes.is_empty()).then_some(0)
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id]
    }

    /// All nodes, indexed by pre-order.
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Deepest level in the tree (root = 0).
    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn config(&self) -> &TreeConfig {
        &self.config
    }

    /// Conditional aborts with an observing policy, in pre-order.
    pub fn observers(&self) -> &[NodeId] {
        &self.observers
    }

    /// Nodes that may want a tick every tree tick, in pre-order.
    pub fn tree_tickers(&self) -> &[NodeId] {
        &self.tree_tickers
    }

    pub fn iterator(&self, id: IteratorId) -> &BehaviorIterator {
        &self.iterators[id.0]
    }

    pub fn iterators(&self) -> &[BehaviorIterator] {
        &self.iterators
    }

    pub fn blackboard(&self) -> &Blackboard {
        &self.blackboard
    }

    pub fn blackboard_mut(&mut self) -> &mut Blackboard {
        &mut self.blackboard
    }

    /// Context of the most recent tick.
    pub fn tick_context(&self) -> &TickContext {
        &self.ctx
    }

    pub fn reseed(&mut self, seed: u64) {
        self.config.seed = seed;
        self.rng = SplitMix64::new(seed);
    }

    fn begin(&mut self) {
        self.root_status = None;
        self.emit("bt.start", 0, 0);
        self.traverse(IteratorId::PRIMARY, 0);
    }

    fn unwind_all(&mut self) {
        self.interrupt_iterator(IteratorId::PRIMARY, 0);
        for iterator in &mut self.iterators {
            iterator.clear();
        }

        let Self {
            nodes,
            blackboard,
            observers,
            ..
        } = self;
        for &node in observers.iter() {
            if let NodeKind::ConditionalAbort(abort) = &mut nodes[node].kind {
                abort.stop_observing(blackboard, node);
            }
        }
        self.blackboard.take_notified();
        self.deferred.clear();
    }

    fn tick_tree_nodes(&mut self) {
        for i in 0..self.tree_tickers.len() {
            let node = self.tree_tickers[i];
            if self.can_tick_on_tree(node) {
                self.on_tree_tick(node);
            }
        }
    }

    /// Poll observers in pre-order. Each iterator accepts at most one abort per pass, so the
    /// leftmost satisfied observer wins.
    fn evaluate_observers(&mut self) {
        let mut notified = self.blackboard.take_notified();
        notified.append(&mut self.deferred);
        let mut fired = vec![false; self.iterators.len()];

        for i in 0..self.observers.len() {
            let node = self.observers[i];
            let it = self.nodes[node].info.iterator;
            if !self.iterators[it.0].is_running() {
                continue;
            }
            let Some(abort) = self.nodes[node].kind.as_conditional() else {
                continue;
            };
            if !abort.is_observing() {
                continue;
            }
            let keyed = !abort.watched_keys().is_empty();
            if keyed && !notified.contains(&(node as u64)) {
                continue;
            }
            if fired[it.0] {
                if keyed {
                    self.deferred.insert(node as u64);
                }
                continue;
            }
            if self.evaluate_abort(node) {
                fired[it.0] = true;
            }
        }
    }

    pub(crate) fn emit(&mut self, tag: &'static str, a: u64, b: u64) {
        let event = TraceEvent::new(self.ctx.tick, tag).with_a(a).with_b(b);
        trace_emit(&mut self.blackboard, event);
    }
}

impl Hierarchy for [Node] {
    fn child_count(&self, node: usize) -> usize {
        self[node].info.children.len()
    }

    fn child_at(&self, node: usize, index: usize) -> usize {
        self[node].info.children[index]
    }
}

impl Hierarchy for BehaviorTree {
    fn child_count(&self, node: usize) -> usize {
        self.nodes.child_count(node)
    }

    fn child_at(&self, node: usize, index: usize) -> usize {
        self.nodes.child_at(node, index)
    }
}
