use ai_core::{Blackboard, SplitMix64, TickContext};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::node::NodeId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum BtStatus {
    Running,
    Success,
    Failure,
}

impl BtStatus {
    /// `Success` or `Failure`: the node leaves the traversal stack.
    #[inline]
    pub fn is_terminal(self) -> bool {
        !matches!(self, BtStatus::Running)
    }

    #[inline]
    pub fn is_success(self) -> bool {
        matches!(self, BtStatus::Success)
    }

    #[inline]
    pub fn is_failure(self) -> bool {
        matches!(self, BtStatus::Failure)
    }

    /// Swaps `Success` and `Failure`; `Running` is unchanged.
    #[inline]
    pub fn invert(self) -> Self {
        match self {
            BtStatus::Success => BtStatus::Failure,
            BtStatus::Failure => BtStatus::Success,
            BtStatus::Running => BtStatus::Running,
        }
    }
}

/// Why a node left its iterator's traversal stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    Completed(BtStatus),
    /// Unwound by a conditional abort.
    Aborted,
    /// Unwound by an interrupt (parallel teardown, interruptor, explicit tree interrupt).
    Interrupted,
}

impl ExitReason {
    pub(crate) fn tag(self) -> u64 {
        match self {
            ExitReason::Completed(BtStatus::Success) => 0,
            ExitReason::Completed(BtStatus::Failure) => 1,
            ExitReason::Completed(BtStatus::Running) => 2,
            ExitReason::Aborted => 3,
            ExitReason::Interrupted => 4,
        }
    }
}

/// Everything a leaf or condition may touch while it executes.
pub struct BtContext<'a> {
    pub tick: &'a TickContext,
    pub blackboard: &'a mut Blackboard,
    pub rng: &'a mut SplitMix64,
    /// Pre-order index of the node being executed.
    pub node: NodeId,
}

impl BtContext<'_> {
    pub fn dt_seconds(&self) -> f32 {
        self.tick.dt_seconds
    }
}

pub trait TaskClone {
    fn clone_task(&self) -> Box<dyn Task>;
}

impl<T> TaskClone for T
where
    T: Task + Clone,
{
    fn clone_task(&self) -> Box<dyn Task> {
        Box::new(self.clone())
    }
}

/// A leaf behavior. Every hook except [`Task::run`] defaults to a no-op.
pub trait Task: TaskClone + 'static {
    fn run(&mut self, cx: &mut BtContext<'_>) -> BtStatus;

    fn name(&self) -> &str {
        "task"
    }

    /// Called once when the tree instance is built.
    fn on_enable(&mut self, _blackboard: &mut Blackboard) {}

    /// Called once per [`crate::BehaviorTree::start`], before the first tick.
    fn on_start(&mut self, _cx: &mut BtContext<'_>) {}

    fn on_enter(&mut self, _cx: &mut BtContext<'_>) {}

    fn on_exit(&mut self, _cx: &mut BtContext<'_>, _reason: ExitReason) {}

    fn can_tick_on_branch(&self) -> bool {
        false
    }

    /// Called every update of the owning iterator while the task is on its stack and
    /// [`Task::can_tick_on_branch`] holds.
    fn on_branch_tick(&mut self, _cx: &mut BtContext<'_>) {}

    /// Sampled once at build time: tasks returning `true` are cached as tree-tick candidates and
    /// then ticked every tree tick while this keeps returning `true`.
    fn can_tick_on_tree(&self) -> bool {
        false
    }

    fn on_tree_tick(&mut self, _cx: &mut BtContext<'_>) {}

    /// Contribution to the summed branch utility used by utility selectors.
    fn utility_value(&self, _blackboard: &Blackboard) -> f32 {
        0.0
    }

    /// Priority used by priority composites. `None` means "negated pre-order index".
    fn priority(&self, _blackboard: &Blackboard) -> Option<f32> {
        None
    }
}

pub trait ConditionClone {
    fn clone_condition(&self) -> Box<dyn Condition>;
}

impl<T> ConditionClone for T
where
    T: Condition + Clone,
{
    fn clone_condition(&self) -> Box<dyn Condition> {
        Box::new(self.clone())
    }
}

/// Predicate guarding a conditional abort.
pub trait Condition: ConditionClone + 'static {
    fn check(&mut self, cx: &mut BtContext<'_>) -> bool;

    /// Blackboard key ids this condition reads. A condition with watched keys is re-evaluated
    /// only when one of them changes; one without is polled every tick.
    fn watched_keys(&self) -> Vec<u64> {
        Vec::new()
    }
}
