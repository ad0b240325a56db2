//! Composite state machines.
//!
//! A composite owns a cursor into its execution order. The execution order is a permutation of
//! child positions chosen on every entry (declared order, shuffled, or ranked by priority or
//! utility); everything else is shared: sequences stop on the first `Failure`, selectors on the
//! first `Success`.

use crate::bt::BtStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompositeKind {
    Sequence,
    Selector,
    PrioritySequence,
    PrioritySelector,
    RandomSequence,
    RandomSelector,
    UtilitySelector,
    /// Sequence that re-checks the guards of already completed children every tree tick.
    ReactiveSequence,
    /// Selector that re-checks the guards of higher-priority children every tree tick.
    ReactiveSelector,
}

/// How the execution order is chosen on entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ChildOrdering {
    Declared,
    Shuffled,
    Priority,
    Utility,
}

impl CompositeKind {
    /// Selector family: stops on the first `Success`, fails when every child fails.
    pub fn is_selector(self) -> bool {
        matches!(
            self,
            CompositeKind::Selector
                | CompositeKind::PrioritySelector
                | CompositeKind::RandomSelector
                | CompositeKind::UtilitySelector
                | CompositeKind::ReactiveSelector
        )
    }

    pub fn is_reactive(self) -> bool {
        matches!(
            self,
            CompositeKind::ReactiveSequence | CompositeKind::ReactiveSelector
        )
    }

    pub(crate) fn ordering(self) -> ChildOrdering {
        match self {
            CompositeKind::Sequence
            | CompositeKind::Selector
            | CompositeKind::ReactiveSequence
            | CompositeKind::ReactiveSelector => ChildOrdering::Declared,
            CompositeKind::RandomSequence | CompositeKind::RandomSelector => {
                ChildOrdering::Shuffled
            }
            CompositeKind::PrioritySequence | CompositeKind::PrioritySelector => {
                ChildOrdering::Priority
            }
            CompositeKind::UtilitySelector => ChildOrdering::Utility,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            CompositeKind::Sequence => "sequence",
            CompositeKind::Selector => "selector",
            CompositeKind::PrioritySequence => "priority_sequence",
            CompositeKind::PrioritySelector => "priority_selector",
            CompositeKind::RandomSequence => "random_sequence",
            CompositeKind::RandomSelector => "random_selector",
            CompositeKind::UtilitySelector => "utility_selector",
            CompositeKind::ReactiveSequence => "reactive_sequence",
            CompositeKind::ReactiveSelector => "reactive_selector",
        }
    }
}

/// What the composite wants after a `run`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CompositeStep {
    Finish(BtStatus),
    /// Traverse the child at this position and keep running.
    Traverse(usize),
}

#[derive(Debug, Clone)]
pub struct Composite {
    kind: CompositeKind,
    order: Vec<usize>,
    cursor: usize,
    last_child_status: Option<BtStatus>,
    running_child: Option<usize>,
    active: bool,
}

impl Composite {
    pub fn new(kind: CompositeKind) -> Self {
        Self {
            kind,
            order: Vec::new(),
            cursor: 0,
            last_child_status: None,
            running_child: None,
            active: false,
        }
    }

    pub fn kind(&self) -> CompositeKind {
        self.kind
    }

    /// Cursor into [`Composite::execution_order`]. Advances each time a child exits.
    pub fn current_child_index(&self) -> usize {
        self.cursor
    }

    /// Child position the cursor points at, if any remain.
    pub fn current_child(&self) -> Option<usize> {
        self.order.get(self.cursor).copied()
    }

    pub fn execution_order(&self) -> &[usize] {
        &self.order
    }

    /// Child position that was entered most recently and has not exited yet.
    pub fn running_child(&self) -> Option<usize> {
        self.running_child
    }

    pub fn last_child_status(&self) -> Option<BtStatus> {
        self.last_child_status
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// `true` when the running branch has lower priority than the child at `position`.
    pub fn is_past(&self, position: usize) -> bool {
        self.rank_of(position).is_some_and(|rank| self.cursor > rank)
    }

    fn rank_of(&self, position: usize) -> Option<usize> {
        self.order.iter().position(|&p| p == position)
    }

    /// Reset for a fresh activation. Returns the first child position to traverse.
    pub(crate) fn enter(&mut self, order: Vec<usize>) -> Option<usize> {
        self.order = order;
        self.cursor = 0;
        self.last_child_status = None;
        self.running_child = None;
        self.active = true;
        self.current_child()
    }

    pub(crate) fn exit(&mut self) {
        self.active = false;
        self.running_child = None;
    }

    pub(crate) fn child_entered(&mut self, position: usize) {
        self.running_child = Some(position);
    }

    pub(crate) fn child_exited(&mut self, status: BtStatus) {
        self.cursor += 1;
        self.last_child_status = Some(status);
        self.running_child = None;
    }

    /// Resume exactly at the aborting branch on the next run.
    pub(crate) fn abort_to(&mut self, position: usize) {
        self.cursor = self.rank_of(position).unwrap_or(position);
        self.last_child_status = None;
        self.running_child = None;
    }

    pub(crate) fn run(&mut self) -> CompositeStep {
        let selector = self.kind.is_selector();
        match self.last_child_status {
            Some(BtStatus::Failure) if !selector => return CompositeStep::Finish(BtStatus::Failure),
            Some(BtStatus::Success) if selector => return CompositeStep::Finish(BtStatus::Success),
            _ => {}
        }
        match self.current_child() {
            Some(position) => CompositeStep::Traverse(position),
            None if selector => CompositeStep::Finish(BtStatus::Failure),
            None => CompositeStep::Finish(BtStatus::Success),
        }
    }

    pub(crate) fn fresh(&self) -> Self {
        Self::new(self.kind)
    }
}

/// Child positions sorted by descending score. Ties keep declared order.
pub(crate) fn ranked(scores: &[f32]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]));
    order
}
