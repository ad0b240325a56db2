//! Single-child nodes.
//!
//! Each decorator is a small state machine the scheduler drives through `enter`, `run`,
//! `child_exited` and `exit`. By default a decorator traverses its child as soon as it is entered
//! and relays the child's status when run.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::bt::BtStatus;
use crate::interrupt::Interruptable;
use crate::node::NodeId;
use crate::timer::Timer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct GuardConfig {
    /// How many guards of one linked set may run their child at the same time.
    pub max_active: usize,
    /// When the set is full: keep returning `Running` until a slot frees up, instead of skipping.
    pub wait_until_available: bool,
    /// Status returned when the guard skips its child.
    pub skip_status: BtStatus,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            max_active: 1,
            wait_until_available: false,
            skip_status: BtStatus::Failure,
        }
    }
}

/// Limits how many members of a linked set of guards run their child concurrently.
#[derive(Debug, Clone)]
pub struct Guard {
    config: GuardConfig,
    links: Vec<NodeId>,
    admitted: bool,
    occupied: bool,
}

impl Guard {
    pub fn new(config: GuardConfig) -> Self {
        Self {
            config,
            links: Vec::new(),
            admitted: false,
            occupied: false,
        }
    }

    pub fn config(&self) -> GuardConfig {
        self.config
    }

    /// Other guards of the same set.
    pub fn links(&self) -> &[NodeId] {
        &self.links
    }

    pub(crate) fn set_links(&mut self, links: Vec<NodeId>) {
        self.links = links;
    }

    /// `true` while this guard's child holds a slot.
    pub fn is_occupied(&self) -> bool {
        self.occupied
    }

    fn admit(&mut self) {
        self.admitted = true;
        self.occupied = true;
    }
}

/// What the decorator wants after a `run`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DecoratorStep {
    Finish(BtStatus),
    TraverseChild,
    /// Stay on the stack without traversing.
    Wait,
}

#[derive(Debug, Clone)]
pub enum Decorator {
    Inverter,
    /// Always succeeds once its child finishes.
    Succeeder,
    /// Always fails once its child finishes.
    Failer,
    Repeater {
        /// `None` repeats forever.
        limit: Option<u32>,
        end_on_failure: bool,
        count: u32,
    },
    UntilSuccess,
    UntilFailure,
    /// Fails without running its child until the timer started by the last run has expired.
    Cooldown { timer: Timer, admitted: bool },
    /// Interrupts its child and fails if the child is still running after the timer expires.
    TimeLimit { timer: Timer, timed_out: bool },
    Guard(Guard),
    Interruptable(Interruptable),
}

impl Decorator {
    pub fn repeater(limit: Option<u32>, end_on_failure: bool) -> Self {
        Decorator::Repeater {
            limit,
            end_on_failure,
            count: 0,
        }
    }

    pub fn cooldown(seconds: f32) -> Self {
        Decorator::Cooldown {
            timer: Timer::new(seconds),
            admitted: false,
        }
    }

    pub fn time_limit(seconds: f32) -> Self {
        Decorator::TimeLimit {
            timer: Timer::new(seconds),
            timed_out: false,
        }
    }

    pub fn guard(config: GuardConfig) -> Self {
        Decorator::Guard(Guard::new(config))
    }

    pub fn interruptable(status: BtStatus) -> Self {
        Decorator::Interruptable(Interruptable::new(status))
    }

    pub fn label(&self) -> &'static str {
        match self {
            Decorator::Inverter => "inverter",
            Decorator::Succeeder => "succeeder",
            Decorator::Failer => "failer",
            Decorator::Repeater { .. } => "repeater",
            Decorator::UntilSuccess => "until_success",
            Decorator::UntilFailure => "until_failure",
            Decorator::Cooldown { .. } => "cooldown",
            Decorator::TimeLimit { .. } => "time_limit",
            Decorator::Guard(_) => "guard",
            Decorator::Interruptable(_) => "interruptable",
        }
    }

    pub fn timer(&self) -> Option<&Timer> {
        match self {
            Decorator::Cooldown { timer, .. } | Decorator::TimeLimit { timer, .. } => Some(timer),
            _ => None,
        }
    }

    /// Activation. Returns whether the child should be traversed now.
    pub(crate) fn enter(&mut self, guard_full: bool) -> bool {
        match self {
            Decorator::Repeater { limit, count, .. } => {
                *count = 0;
                *limit != Some(0)
            }
            Decorator::Cooldown { timer, admitted } => {
                *admitted = !timer.is_running();
                *admitted
            }
            Decorator::TimeLimit { timer, timed_out } => {
                *timed_out = false;
                timer.start();
                true
            }
            Decorator::Guard(guard) => {
                guard.admitted = false;
                if guard_full {
                    false
                } else {
                    guard.admit();
                    true
                }
            }
            Decorator::Interruptable(i) => {
                i.enter();
                true
            }
            _ => true,
        }
    }

    /// `last` is the status of the child's most recent exit, if it has exited since entry.
    pub(crate) fn run(&mut self, last: Option<BtStatus>, guard_full: bool) -> DecoratorStep {
        let relay = last.unwrap_or(BtStatus::Failure);
        match self {
            Decorator::Inverter => DecoratorStep::Finish(relay.invert()),
            Decorator::Succeeder => DecoratorStep::Finish(BtStatus::Success),
            Decorator::Failer => DecoratorStep::Finish(BtStatus::Failure),
            Decorator::Repeater {
                limit,
                end_on_failure,
                count,
            } => {
                if *end_on_failure && last == Some(BtStatus::Failure) {
                    return DecoratorStep::Finish(BtStatus::Failure);
                }
                match limit {
                    Some(limit) if *count >= *limit => DecoratorStep::Finish(BtStatus::Success),
                    _ => DecoratorStep::TraverseChild,
                }
            }
            Decorator::UntilSuccess => match last {
                Some(BtStatus::Success) => DecoratorStep::Finish(BtStatus::Success),
                _ => DecoratorStep::TraverseChild,
            },
            Decorator::UntilFailure => match last {
                Some(BtStatus::Failure) => DecoratorStep::Finish(BtStatus::Success),
                _ => DecoratorStep::TraverseChild,
            },
            Decorator::Cooldown { timer, admitted } => {
                if !*admitted {
                    return DecoratorStep::Finish(BtStatus::Failure);
                }
                timer.start();
                DecoratorStep::Finish(relay)
            }
            // A child cut off by the timer never exits, so `last` is unset and this fails.
            Decorator::TimeLimit { .. } => DecoratorStep::Finish(relay),
            Decorator::Guard(guard) => {
                if guard.admitted {
                    DecoratorStep::Finish(relay)
                } else if !guard.config.wait_until_available {
                    DecoratorStep::Finish(guard.config.skip_status)
                } else if guard_full {
                    DecoratorStep::Wait
                } else {
                    guard.admit();
                    DecoratorStep::TraverseChild
                }
            }
            Decorator::Interruptable(i) => DecoratorStep::Finish(i.interrupted().unwrap_or(relay)),
        }
    }

    pub(crate) fn child_exited(&mut self) {
        match self {
            Decorator::Repeater { count, .. } => *count += 1,
            Decorator::Guard(guard) => guard.occupied = false,
            _ => {}
        }
    }

    pub(crate) fn exit(&mut self) {
        match self {
            Decorator::TimeLimit { timer, .. } => timer.stop(),
            Decorator::Guard(guard) => {
                guard.admitted = false;
                guard.occupied = false;
            }
            Decorator::Interruptable(i) => i.exit(),
            _ => {}
        }
    }

    /// `true` once a time limit has cut its child off during the current activation.
    pub fn timed_out(&self) -> bool {
        matches!(self, Decorator::TimeLimit { timed_out: true, .. })
    }

    /// Cooldown timers keep running after the decorator exits, so the tree advances them.
    pub(crate) fn ticks_on_tree(&self) -> bool {
        matches!(self, Decorator::Cooldown { timer, .. } if timer.is_running())
    }

    pub(crate) fn on_tree_tick(&mut self, dt_seconds: f32) {
        if let Decorator::Cooldown { timer, .. } = self {
            timer.update(dt_seconds);
        }
    }

    pub(crate) fn ticks_on_branch(&self) -> bool {
        matches!(self, Decorator::TimeLimit { timer, .. } if timer.is_running())
    }

    /// Returns `true` when the time limit expired on this tick.
    pub(crate) fn on_branch_tick(&mut self, dt_seconds: f32) -> bool {
        match self {
            Decorator::TimeLimit { timer, timed_out } => {
                let expired = timer.update(dt_seconds);
                *timed_out |= expired;
                expired
            }
            _ => false,
        }
    }

    pub(crate) fn fresh(&self) -> Self {
        match self {
            Decorator::Repeater {
                limit,
                end_on_failure,
                ..
            } => Decorator::repeater(*limit, *end_on_failure),
            Decorator::Cooldown { timer, .. } => Decorator::cooldown(timer.interval()),
            Decorator::TimeLimit { timer, .. } => Decorator::time_limit(timer.interval()),
            Decorator::Guard(guard) => Decorator::guard(guard.config),
            Decorator::Interruptable(i) => Decorator::interruptable(i.interruption_status()),
            other => other.clone(),
        }
    }
}
