use crate::bt::BtStatus;
use crate::iterator::IteratorId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParallelPolicy {
    /// Success once every branch succeeds; Failure on the first branch failure.
    AllSucceed,
    /// Success on the first branch success; Failure once every branch fails.
    AnySucceeds,
}

impl ParallelPolicy {
    pub fn label(self) -> &'static str {
        match self {
            ParallelPolicy::AllSucceed => "parallel",
            ParallelPolicy::AnySucceeds => "parallel_selector",
        }
    }
}

/// Runs every child at once, each on its own branch iterator.
#[derive(Debug, Clone)]
pub struct Parallel {
    policy: ParallelPolicy,
    branches: Vec<IteratorId>,
    statuses: Vec<Option<BtStatus>>,
    done: usize,
    active: bool,
}

impl Parallel {
    pub fn new(policy: ParallelPolicy) -> Self {
        Self {
            policy,
            branches: Vec::new(),
            statuses: Vec::new(),
            done: 0,
            active: false,
        }
    }

    pub fn policy(&self) -> ParallelPolicy {
        self.policy
    }

    /// Branch iterator per child, in child order.
    pub fn branches(&self) -> &[IteratorId] {
        &self.branches
    }

    pub(crate) fn set_branches(&mut self, branches: Vec<IteratorId>) {
        self.statuses = vec![None; branches.len()];
        self.branches = branches;
    }

    /// Final status of branch `index`, once it has finished.
    pub fn branch_status(&self, index: usize) -> Option<BtStatus> {
        self.statuses.get(index).copied().flatten()
    }

    /// Number of branches that have finished since entry.
    pub fn completed(&self) -> usize {
        self.done
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub(crate) fn enter(&mut self) {
        self.statuses.iter_mut().for_each(|s| *s = None);
        self.done = 0;
        self.active = true;
    }

    pub(crate) fn exit(&mut self) {
        self.active = false;
    }

    /// Record the exit of branch `index`. Only the first result per activation counts.
    pub(crate) fn branch_done(&mut self, index: usize, status: BtStatus) {
        if let Some(slot) = self.statuses.get_mut(index) {
            if slot.is_none() {
                *slot = Some(status);
                self.done += 1;
            }
        }
    }

    /// The aggregate result, if the recorded branch results already decide it.
    pub(crate) fn resolve(&self) -> Option<BtStatus> {
        let (decisive, fallback) = match self.policy {
            ParallelPolicy::AllSucceed => (BtStatus::Failure, BtStatus::Success),
            ParallelPolicy::AnySucceeds => (BtStatus::Success, BtStatus::Failure),
        };
        if self.statuses.iter().any(|s| *s == Some(decisive)) {
            return Some(decisive);
        }
        (self.done == self.statuses.len()).then_some(fallback)
    }
}
