//! Per-kind hook dispatch.
//!
//! The iterator calls into these when nodes are entered, run, exited and notified. Everything
//! node-specific lives here so the scheduler itself only deals with stacks.

use ai_core::rng::shuffle;
use tracing::debug;

use crate::abort::ConditionalAbort;
use crate::bt::{BtContext, BtStatus, ExitReason, Task};
use crate::composite::{ranked, ChildOrdering, Composite, CompositeStep};
use crate::decorator::{Decorator, DecoratorStep};
use crate::iterator::IteratorId;
use crate::node::{NodeId, NodeKind};
use crate::parallel::Parallel;
use crate::tree::BehaviorTree;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Shape {
    Task,
    Interruptor,
    Composite,
    Parallel,
    Decorator,
    ConditionalAbort,
}

impl BehaviorTree {
    fn shape(&self, node: NodeId) -> Shape {
        match &self.nodes[node].kind {
            NodeKind::Task(_) => Shape::Task,
            NodeKind::Interruptor(_) => Shape::Interruptor,
            NodeKind::Composite(_) => Shape::Composite,
            NodeKind::Parallel(_) => Shape::Parallel,
            NodeKind::Decorator(_) => Shape::Decorator,
            NodeKind::ConditionalAbort(_) => Shape::ConditionalAbort,
        }
    }

    fn first_child(&self, node: NodeId) -> Option<NodeId> {
        self.nodes[node].info.children.first().copied()
    }

    fn with_task<R>(
        &mut self,
        node: NodeId,
        f: impl FnOnce(&mut Box<dyn Task>, &mut BtContext<'_>) -> R,
    ) -> R {
        let Self {
            nodes,
            blackboard,
            rng,
            ctx,
            ..
        } = self;
        match &mut nodes[node].kind {
            NodeKind::Task(task) => {
                let mut cx = BtContext {
                    tick: ctx,
                    blackboard,
                    rng,
                    node,
                };
                f(task, &mut cx)
            }
            other => unreachable!("node {node} is a {}, not a task", other.label()),
        }
    }

    fn composite_mut(&mut self, node: NodeId) -> &mut Composite {
        match &mut self.nodes[node].kind {
            NodeKind::Composite(c) => c,
            other => unreachable!("node {node} is a {}, not a composite", other.label()),
        }
    }

    fn parallel_mut(&mut self, node: NodeId) -> &mut Parallel {
        match &mut self.nodes[node].kind {
            NodeKind::Parallel(p) => p,
            other => unreachable!("node {node} is a {}, not a parallel", other.label()),
        }
    }

    fn decorator_mut(&mut self, node: NodeId) -> &mut Decorator {
        match &mut self.nodes[node].kind {
            NodeKind::Decorator(d) => d,
            other => unreachable!("node {node} is a {}, not a decorator", other.label()),
        }
    }

    fn conditional_mut(&mut self, node: NodeId) -> &mut ConditionalAbort {
        match &mut self.nodes[node].kind {
            NodeKind::ConditionalAbort(c) => c,
            other => unreachable!("node {node} is a {}, not a conditional abort", other.label()),
        }
    }

    pub(crate) fn check_condition(&mut self, node: NodeId) -> bool {
        let Self {
            nodes,
            blackboard,
            rng,
            ctx,
            ..
        } = self;
        match &mut nodes[node].kind {
            NodeKind::ConditionalAbort(abort) => {
                let mut cx = BtContext {
                    tick: ctx,
                    blackboard,
                    rng,
                    node,
                };
                abort.check(&mut cx)
            }
            other => unreachable!("node {node} is a {}, not a conditional abort", other.label()),
        }
    }

    pub(crate) fn on_start(&mut self, node: NodeId) {
        if self.shape(node) == Shape::Task {
            self.with_task(node, |task, cx| task.on_start(cx));
        }
    }

    pub(crate) fn on_enter(&mut self, it: IteratorId, node: NodeId) {
        match self.shape(node) {
            Shape::Task => self.with_task(node, |task, cx| task.on_enter(cx)),
            Shape::Interruptor => {}
            Shape::Composite => {
                let order = self.child_order_for(node);
                if let Some(position) = self.composite_mut(node).enter(order) {
                    let child = self.nodes[node].info.children[position];
                    self.traverse(it, child);
                }
            }
            Shape::Parallel => {
                self.parallel_mut(node).enter();
                let branches = self.parallel_mut(node).branches().to_vec();
                for (i, branch) in branches.into_iter().enumerate() {
                    let child = self.nodes[node].info.children[i];
                    self.traverse(branch, child);
                }
            }
            Shape::Decorator => {
                let full = self.guard_set_full(node);
                if self.decorator_mut(node).enter(full) {
                    if let Some(child) = self.first_child(node) {
                        self.traverse(it, child);
                    }
                }
            }
            Shape::ConditionalAbort => {
                let Self {
                    nodes, blackboard, ..
                } = self;
                if let NodeKind::ConditionalAbort(abort) = &mut nodes[node].kind {
                    abort.enter();
                    abort.start_observing(blackboard, node);
                }
                if self.check_condition(node) {
                    if let Some(child) = self.first_child(node) {
                        self.traverse(it, child);
                    }
                }
            }
        }
    }

    pub(crate) fn on_exit(&mut self, it: IteratorId, node: NodeId, reason: ExitReason) {
        match self.shape(node) {
            Shape::Task => self.with_task(node, |task, cx| task.on_exit(cx, reason)),
            Shape::Interruptor => {}
            Shape::Composite => self.composite_mut(node).exit(),
            Shape::Parallel => {
                let branches = self.parallel_mut(node).branches().to_vec();
                for (i, branch) in branches.into_iter().enumerate() {
                    let child = self.nodes[node].info.children[i];
                    self.interrupt_iterator(branch, child);
                }
                self.parallel_mut(node).exit();
            }
            Shape::Decorator => self.decorator_mut(node).exit(),
            Shape::ConditionalAbort => {
                let Self {
                    nodes, blackboard, ..
                } = self;
                if let NodeKind::ConditionalAbort(abort) = &mut nodes[node].kind {
                    if abort.exit() {
                        abort.stop_observing(blackboard, node);
                    }
                }
            }
        }
        debug_assert!(
            !self.iterators[it.0].contains(node),
            "node {node} exited while still on iterator {it:?}"
        );
    }

    pub(crate) fn run_node(&mut self, it: IteratorId, node: NodeId) -> BtStatus {
        match self.shape(node) {
            Shape::Task => self.with_task(node, |task, cx| task.run(cx)),
            Shape::Interruptor => self.run_interruptor(node),
            Shape::Composite => match self.composite_mut(node).run() {
                CompositeStep::Finish(status) => status,
                CompositeStep::Traverse(position) => {
                    let child = self.nodes[node].info.children[position];
                    self.traverse(it, child);
                    BtStatus::Running
                }
            },
            Shape::Parallel => self.run_parallel(node),
            Shape::Decorator => {
                let last = self.iterators[it.0].last_child_exit();
                let full = self.guard_set_full(node);
                match self.decorator_mut(node).run(last, full) {
                    DecoratorStep::Finish(status) => status,
                    DecoratorStep::TraverseChild => {
                        if let Some(child) = self.first_child(node) {
                            self.traverse(it, child);
                        }
                        BtStatus::Running
                    }
                    DecoratorStep::Wait => BtStatus::Running,
                }
            }
            // Failure when the condition kept the child from running.
            Shape::ConditionalAbort => self.iterators[it.0]
                .last_child_exit()
                .unwrap_or(BtStatus::Failure),
        }
    }

    pub(crate) fn on_child_enter(&mut self, parent: NodeId, child_order: usize) {
        if self.shape(parent) == Shape::Composite {
            self.composite_mut(parent).child_entered(child_order);
        }
    }

    pub(crate) fn on_child_exit(&mut self, parent: NodeId, child_order: usize, status: BtStatus) {
        match self.shape(parent) {
            Shape::Composite => self.composite_mut(parent).child_exited(status),
            Shape::Parallel => self.parallel_mut(parent).branch_done(child_order, status),
            Shape::Decorator => self.decorator_mut(parent).child_exited(),
            _ => {}
        }
    }

    pub(crate) fn on_abort(&mut self, parent: NodeId, position: usize) {
        if self.shape(parent) == Shape::Composite {
            self.composite_mut(parent).abort_to(position);
        }
    }

    /// Walks the decorator chain below `child`, ending the observation of conditional aborts.
    pub(crate) fn on_composite_parent_exit(&mut self, child: NodeId) {
        let Self {
            nodes, blackboard, ..
        } = self;
        let mut node = child;
        loop {
            let next = nodes[node].info.children.first().copied();
            match &mut nodes[node].kind {
                NodeKind::ConditionalAbort(abort) => abort.stop_observing(blackboard, node),
                NodeKind::Decorator(_) => {}
                _ => break,
            }
            match next {
                Some(next) => node = next,
                None => break,
            }
        }
    }

    pub(crate) fn can_tick_on_branch(&self, node: NodeId) -> bool {
        match &self.nodes[node].kind {
            NodeKind::Task(task) => task.can_tick_on_branch(),
            NodeKind::Decorator(d) => d.ticks_on_branch(),
            _ => false,
        }
    }

    pub(crate) fn on_branch_tick(&mut self, it: IteratorId, node: NodeId) {
        match self.shape(node) {
            Shape::Task => self.with_task(node, |task, cx| task.on_branch_tick(cx)),
            Shape::Decorator => {
                let dt = self.ctx.dt_seconds;
                if self.decorator_mut(node).on_branch_tick(dt) {
                    if let Some(child) = self.first_child(node) {
                        debug!(node, child, "bt time limit expired");
                        self.interrupt_iterator(it, child);
                    }
                }
            }
            _ => {}
        }
    }

    pub(crate) fn can_tick_on_tree(&self, node: NodeId) -> bool {
        match &self.nodes[node].kind {
            NodeKind::Task(task) => task.can_tick_on_tree(),
            NodeKind::Decorator(d) => d.ticks_on_tree(),
            NodeKind::Composite(c) => {
                c.kind().is_reactive()
                    && c.is_active()
                    && c.current_child_index() > 0
                    && c.running_child().is_some()
            }
            _ => false,
        }
    }

    pub(crate) fn on_tree_tick(&mut self, node: NodeId) {
        match self.shape(node) {
            Shape::Task => self.with_task(node, |task, cx| task.on_tree_tick(cx)),
            Shape::Decorator => {
                let dt = self.ctx.dt_seconds;
                self.decorator_mut(node).on_tree_tick(dt);
            }
            Shape::Composite => self.reevaluate_reactive(node),
            _ => {}
        }
    }

    /// Re-check the guards of children the reactive composite has already moved past, while a
    /// later child is running. A selector jumps back to the first one whose guard now passes, a
    /// sequence to the first one whose guard now fails.
    fn reevaluate_reactive(&mut self, node: NodeId) {
        let it = self.nodes[node].info.iterator;
        if !self.iterators[it.0].contains(node) {
            return;
        }

        let composite = self.composite_mut(node);
        let selector = composite.kind().is_selector();
        let done = composite
            .current_child_index()
            .min(composite.execution_order().len());
        let earlier = composite.execution_order()[..done].to_vec();

        for position in earlier {
            let child = self.nodes[node].info.children[position];
            let Some(guard) = self.guard_of(child) else {
                continue;
            };
            if self.check_condition(guard) == selector {
                debug!(node, position, "bt reactive re-entry");
                self.abort_running_child_branch(it, node, position);
                return;
            }
        }
    }

    /// The conditional abort heading `node`'s decorator chain, if any.
    pub(crate) fn guard_of(&self, node: NodeId) -> Option<NodeId> {
        let mut node = node;
        loop {
            match &self.nodes[node].kind {
                NodeKind::ConditionalAbort(_) => return Some(node),
                NodeKind::Decorator(_) => node = self.first_child(node)?,
                _ => return None,
            }
        }
    }

    /// Re-evaluate observer `node`. Returns `true` if it aborted a branch.
    pub(crate) fn evaluate_abort(&mut self, node: NodeId) -> bool {
        let passes = self.check_condition(node);
        let abort = self.conditional_mut(node);
        let policy = abort.policy();
        let active = abort.is_active();

        if active && !passes && policy.aborts_self() {
            self.abort_self(node);
            return true;
        }
        if !active && passes && policy.aborts_lower_priority() {
            return self.abort_lower_priority(node);
        }
        false
    }

    /// Unwind to the parent and re-enter `node`, which then fails on its own condition.
    fn abort_self(&mut self, node: NodeId) {
        let info = &self.nodes[node].info;
        let it = info.iterator;
        match info.parent {
            Some(parent) if self.iterators[it.0].contains(parent) => {
                let position = info.child_order;
                self.abort_running_child_branch(it, parent, position);
            }
            // Root of its iterator: restart the iterator at this node.
            _ => {
                self.interrupt_iterator(it, node);
                debug!(node, "bt self abort at iterator root");
                self.emit("bt.abort", node as u64, node as u64);
                self.traverse(it, node);
            }
        }
    }

    fn abort_lower_priority(&mut self, node: NodeId) -> bool {
        let mut branch = node;
        let mut parent = self.nodes[node].info.parent;
        while let Some(p) = parent {
            match &self.nodes[p].kind {
                NodeKind::Composite(_) => break,
                // Branches of a parallel run side by side; nothing has lower priority.
                NodeKind::Parallel(_) => return false,
                _ => {
                    branch = p;
                    parent = self.nodes[p].info.parent;
                }
            }
        }
        let Some(composite) = parent else {
            return false;
        };

        let position = self.nodes[branch].info.child_order;
        let c = self.composite_mut(composite);
        if !c.is_active() || !c.is_past(position) {
            return false;
        }
        let it = self.nodes[composite].info.iterator;
        if !self.iterators[it.0].contains(composite) {
            return false;
        }
        self.abort_running_child_branch(it, composite, position);
        true
    }

    fn run_interruptor(&mut self, node: NodeId) -> BtStatus {
        let targets = self.nodes[node].kind.links().to_vec();
        for target in targets {
            let fired = match &mut self.nodes[target].kind {
                NodeKind::Decorator(Decorator::Interruptable(i)) => i.interrupt(),
                _ => false,
            };
            if !fired {
                continue;
            }
            if let Some(child) = self.first_child(target) {
                let it = self.nodes[child].info.iterator;
                self.interrupt_iterator(it, child);
            }
        }
        BtStatus::Success
    }

    /// Pump every unfinished branch once, in child order, stopping as soon as the result is
    /// decided.
    fn run_parallel(&mut self, node: NodeId) -> BtStatus {
        let branches = self.parallel_mut(node).branches().to_vec();
        for (i, branch) in branches.into_iter().enumerate() {
            if self.parallel_mut(node).branch_status(i).is_some() {
                continue;
            }
            if self.iterators[branch.0].is_running() {
                self.update_iterator(branch);
            }

            let idle = !self.iterators[branch.0].is_running();
            let parallel = self.parallel_mut(node);
            // A branch unwound this parallel (e.g. through an interruptor).
            if !parallel.is_active() {
                return BtStatus::Failure;
            }
            // Interrupted without reporting a result.
            if idle && parallel.branch_status(i).is_none() {
                parallel.branch_done(i, BtStatus::Failure);
            }
            if let Some(status) = parallel.resolve() {
                return status;
            }
        }
        self.parallel_mut(node)
            .resolve()
            .unwrap_or(BtStatus::Running)
    }

    fn guard_set_full(&self, node: NodeId) -> bool {
        let NodeKind::Decorator(Decorator::Guard(guard)) = &self.nodes[node].kind else {
            return false;
        };
        let occupied = guard
            .links()
            .iter()
            .filter(|&&link| {
                matches!(
                    &self.nodes[link].kind,
                    NodeKind::Decorator(Decorator::Guard(other)) if other.is_occupied()
                )
            })
            .count();
        occupied >= guard.config().max_active
    }

    fn child_order_for(&mut self, node: NodeId) -> Vec<usize> {
        let count = self.nodes[node].info.children.len();
        let ordering = self.composite_mut(node).kind().ordering();
        match ordering {
            ChildOrdering::Declared => (0..count).collect(),
            ChildOrdering::Shuffled => {
                let mut order: Vec<usize> = (0..count).collect();
                shuffle(&mut self.rng, &mut order);
                order
            }
            ChildOrdering::Priority => {
                let scores: Vec<f32> = self.nodes[node]
                    .info
                    .children
                    .iter()
                    .map(|&child| self.branch_priority(child))
                    .collect();
                ranked(&scores)
            }
            ChildOrdering::Utility => {
                let scores: Vec<f32> = self.nodes[node]
                    .info
                    .children
                    .iter()
                    .map(|&child| self.branch_utility(child))
                    .collect();
                ranked(&scores)
            }
        }
    }

    /// Highest task priority in the branch, or the negated pre-order index of its root.
    fn branch_priority(&self, child: NodeId) -> f32 {
        self.nodes[child]
            .info
            .subtree()
            .filter_map(|i| match &self.nodes[i].kind {
                NodeKind::Task(task) => task.priority(&self.blackboard),
                _ => None,
            })
            .reduce(f32::max)
            .unwrap_or(-(child as f32))
    }

    /// Summed task utility of the branch.
    fn branch_utility(&self, child: NodeId) -> f32 {
        self.nodes[child]
            .info
            .subtree()
            .map(|i| match &self.nodes[i].kind {
                NodeKind::Task(task) => task.utility_value(&self.blackboard),
                _ => 0.0,
            })
            .sum()
    }
}
