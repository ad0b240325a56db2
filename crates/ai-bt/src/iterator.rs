//! Traversal cursors.
//!
//! An iterator owns a bounded stack holding the active root-to-leaf path of one branch context:
//! the primary iterator drives everything outside parallel composites, and every parallel child
//! gets a branch iterator of its own. Nodes pushed by [`BehaviorTree::traverse`] are entered
//! lazily at the start of the next update, never inside the push itself.

use std::collections::VecDeque;

use tracing::{debug, trace};

use crate::bt::{BtStatus, ExitReason};
use crate::node::NodeId;
use crate::tree::BehaviorTree;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct IteratorId(pub(crate) usize);

impl IteratorId {
    /// The iterator that starts at the tree root.
    pub const PRIMARY: IteratorId = IteratorId(0);

    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone)]
pub struct BehaviorIterator {
    traversal: Vec<NodeId>,
    capacity: usize,
    // Pushed but not entered yet. Always a suffix of `traversal`.
    requested: VecDeque<NodeId>,
    last_child_exit: Option<BtStatus>,
    last_executed: Option<BtStatus>,
    owner: Option<NodeId>,
    high_water: usize,
}

impl BehaviorIterator {
    pub(crate) fn new(capacity: usize, owner: Option<NodeId>) -> Self {
        Self {
            traversal: Vec::with_capacity(capacity),
            capacity,
            requested: VecDeque::with_capacity(capacity),
            last_child_exit: None,
            last_executed: None,
            owner,
            high_water: 0,
        }
    }

    pub fn is_running(&self) -> bool {
        !self.traversal.is_empty()
    }

    pub fn len(&self) -> usize {
        self.traversal.len()
    }

    pub fn is_empty(&self) -> bool {
        self.traversal.is_empty()
    }

    /// Maximum stack depth, fixed when the tree is built.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Node at the top of the stack.
    pub fn current(&self) -> Option<NodeId> {
        self.traversal.last().copied()
    }

    /// Active path, root side first.
    pub fn traversal(&self) -> &[NodeId] {
        &self.traversal
    }

    pub fn contains(&self, node: NodeId) -> bool {
        self.traversal.contains(&node)
    }

    /// Nodes pushed but not entered yet.
    pub fn pending(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.requested.iter().copied()
    }

    /// Status of the most recent child exit. Unset whenever a new child is entered.
    pub fn last_child_exit(&self) -> Option<BtStatus> {
        self.last_child_exit
    }

    pub fn last_executed(&self) -> Option<BtStatus> {
        self.last_executed
    }

    /// Parallel composite owning this branch iterator. `None` for the primary iterator.
    pub fn owner(&self) -> Option<NodeId> {
        self.owner
    }

    /// Deepest the stack has been since the tree was built.
    pub fn high_water(&self) -> usize {
        self.high_water
    }

    fn push(&mut self, node: NodeId) {
        assert!(
            self.traversal.len() < self.capacity,
            "iterator stack overflow pushing node {node} (capacity {})",
            self.capacity
        );
        self.traversal.push(node);
        self.requested.push_back(node);
        self.high_water = self.high_water.max(self.traversal.len());
    }

    /// Pops the top node. The flag is `false` when the node was never entered.
    fn pop(&mut self) -> Option<(NodeId, bool)> {
        let node = self.traversal.pop()?;
        if self.requested.back() == Some(&node) {
            self.requested.pop_back();
            return Some((node, false));
        }
        Some((node, true))
    }

    pub(crate) fn clear(&mut self) {
        self.traversal.clear();
        self.requested.clear();
        self.last_child_exit = None;
        self.last_executed = None;
    }
}

impl BehaviorTree {
    /// Push `node` onto iterator `it`. It is entered at the start of that iterator's next update.
    pub(crate) fn traverse(&mut self, it: IteratorId, node: NodeId) {
        self.iterators[it.0].push(node);
    }

    /// One step of iterator `it`: enter pending nodes, tick branch nodes, then run the top node.
    /// Returns `true` once the iterator is idle.
    pub(crate) fn update_iterator(&mut self, it: IteratorId) -> bool {
        assert!(
            self.iterators[it.0].is_running(),
            "update of idle iterator {it:?}"
        );

        // Nodes queued while entering are entered in the same pass.
        while let Some(node) = self.iterators[it.0].requested.pop_front() {
            self.enter_requested(it, node);
        }

        self.tick_branch(it);

        let Some(top) = self.iterators[it.0].current() else {
            return true;
        };
        let status = self.run_node(it, top);
        self.iterators[it.0].last_executed = Some(status);

        // `run` may already have unwound the node (interruptors, time limits).
        if status.is_terminal() && self.iterators[it.0].current() == Some(top) {
            self.pop_node(it, ExitReason::Completed(status));
            self.notify_child_exit(it, top, status);
        }

        !self.iterators[it.0].is_running()
    }

    fn enter_requested(&mut self, it: IteratorId, node: NodeId) {
        trace!(node, name = self.nodes[node].name(), "bt enter");
        self.emit("bt.enter", node as u64, 0);
        self.on_enter(it, node);
        // Roots too: a restarted root must not see the previous pass's result.
        self.iterators[it.0].last_child_exit = None;

        let info = &self.nodes[node].info;
        if let Some(parent) = info.parent {
            let child_order = info.child_order;
            self.on_child_enter(parent, child_order);
        }
    }

    fn tick_branch(&mut self, it: IteratorId) {
        let mut i = 0;
        // Branch ticks may shrink the stack.
        while i < self.iterators[it.0].traversal.len() {
            let node = self.iterators[it.0].traversal[i];
            if self.can_tick_on_branch(node) {
                self.on_branch_tick(it, node);
            }
            i += 1;
        }
    }

    /// Pop the top of `it`, running exit hooks if the node was entered.
    pub(crate) fn pop_node(&mut self, it: IteratorId, reason: ExitReason) -> Option<NodeId> {
        let (node, entered) = self.iterators[it.0].pop()?;
        if !entered {
            return Some(node);
        }

        if self.nodes[node].kind.is_composite() {
            for i in 0..self.nodes[node].info.children.len() {
                let child = self.nodes[node].info.children[i];
                self.on_composite_parent_exit(child);
            }
        }
        self.on_exit(it, node, reason);

        trace!(node, ?reason, "bt exit");
        self.emit("bt.exit", node as u64, reason.tag());
        Some(node)
    }

    /// Parent first, then the iterator's bookkeeping, so the parent's next run sees the result.
    pub(crate) fn notify_child_exit(&mut self, it: IteratorId, node: NodeId, status: BtStatus) {
        let info = &self.nodes[node].info;
        match info.parent {
            Some(parent) => {
                let child_order = info.child_order;
                self.on_child_exit(parent, child_order, status);
            }
            None => {
                debug!(?status, "behavior tree finished");
                self.root_status = Some(status);
                self.emit("bt.done", node as u64, ExitReason::Completed(status).tag());
            }
        }
        self.iterators[it.0].last_child_exit = Some(status);
    }

    /// Unwind `it` down to `parent`, then restart at its child `position`.
    ///
    /// Panics if `parent` is not on the iterator's stack.
    pub(crate) fn abort_running_child_branch(
        &mut self,
        it: IteratorId,
        parent: NodeId,
        position: usize,
    ) {
        assert!(
            self.iterators[it.0].contains(parent),
            "abort toward node {parent} which is not on iterator {it:?}"
        );

        while self.iterators[it.0].current() != Some(parent) {
            self.pop_node(it, ExitReason::Aborted);
        }
        self.on_abort(parent, position);
        self.iterators[it.0].requested.clear();

        let child = self.nodes[parent].info.children[position];
        debug!(parent, child, "bt abort");
        self.emit("bt.abort", parent as u64, child as u64);
        self.traverse(it, child);
    }

    /// Unwind `it` until `subroot` and everything above it are gone. Returns `false` if `subroot`
    /// was not on the stack.
    pub(crate) fn interrupt_iterator(&mut self, it: IteratorId, subroot: NodeId) -> bool {
        if !self.iterators[it.0].contains(subroot) {
            return false;
        }

        let stop = self.nodes[subroot]
            .info
            .parent
            .filter(|p| self.iterators[it.0].contains(*p));
        while let Some(top) = self.iterators[it.0].current() {
            if Some(top) == stop {
                break;
            }
            self.pop_node(it, ExitReason::Interrupted);
        }
        self.iterators[it.0].requested.clear();

        debug!(node = subroot, iterator = it.0, "bt interrupt");
        self.emit("bt.interrupt", subroot as u64, it.0 as u64);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pop_reports_whether_node_was_entered() {
        let mut it = BehaviorIterator::new(3, None);
        it.push(0);
        it.push(1);
        assert_eq!(it.requested.pop_front(), Some(0));
        assert_eq!(it.pop(), Some((1, false)));
        assert_eq!(it.pop(), Some((0, true)));
        assert_eq!(it.pop(), None);
        assert_eq!(it.high_water(), 2);
    }

    #[test]
    #[should_panic(expected = "iterator stack overflow")]
    fn push_beyond_capacity_panics() {
        let mut it = BehaviorIterator::new(1, None);
        it.push(0);
        it.push(1);
    }
}
