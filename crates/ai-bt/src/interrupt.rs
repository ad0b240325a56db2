use crate::bt::BtStatus;
use crate::node::NodeId;

/// State of an interruptable decorator.
#[derive(Debug, Clone)]
pub struct Interruptable {
    interruption_status: BtStatus,
    interrupted: Option<BtStatus>,
    active: bool,
}

impl Interruptable {
    pub fn new(interruption_status: BtStatus) -> Self {
        Self {
            interruption_status,
            interrupted: None,
            active: false,
        }
    }

    pub fn interruption_status(&self) -> BtStatus {
        self.interruption_status
    }

    /// Status to finish with, once an interruptor has fired at this node.
    pub fn interrupted(&self) -> Option<BtStatus> {
        self.interrupted
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub(crate) fn enter(&mut self) {
        self.active = true;
        self.interrupted = None;
    }

    pub(crate) fn exit(&mut self) {
        self.active = false;
        self.interrupted = None;
    }

    /// Marks the node interrupted. Returns `false` when it is not running.
    pub(crate) fn interrupt(&mut self) -> bool {
        if !self.active {
            return false;
        }
        self.interrupted = Some(self.interruption_status);
        true
    }
}

/// Leaf that interrupts the children of its linked interruptables, then succeeds.
#[derive(Debug, Clone, Default)]
pub struct Interruptor {
    targets: Vec<NodeId>,
}

impl Interruptor {
    pub fn targets(&self) -> &[NodeId] {
        &self.targets
    }

    pub(crate) fn set_targets(&mut self, targets: Vec<NodeId>) {
        self.targets = targets;
    }
}
