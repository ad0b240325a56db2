#![allow(dead_code)]

use std::cell::RefCell;
use std::rc::Rc;

use ai_bt::{BehaviorTree, BtContext, BtStatus, ExitReason, Task};
use ai_core::{Blackboard, TickContext};
use tracing_subscriber::EnvFilter;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[derive(Debug, Default)]
pub struct Stats {
    pub enables: u32,
    pub starts: u32,
    pub enters: u32,
    pub exits: u32,
    pub runs: u32,
    pub reasons: Vec<ExitReason>,
}

/// Ordered `(probe, hook)` records shared by several probes.
pub type Journal = Rc<RefCell<Vec<(&'static str, &'static str)>>>;

/// Scripted leaf: returns `Running` until it has run `after` times in the current activation,
/// then `result`. A `Running` result never finishes.
#[derive(Clone)]
pub struct Probe {
    name: &'static str,
    result: BtStatus,
    after: u32,
    runs_this_activation: u32,
    priority: Option<f32>,
    utility: f32,
    stats: Rc<RefCell<Stats>>,
    journal: Option<Journal>,
}

impl Probe {
    pub fn new(name: &'static str, result: BtStatus) -> Self {
        Self {
            name,
            result,
            after: 1,
            runs_this_activation: 0,
            priority: None,
            utility: 0.0,
            stats: Rc::default(),
            journal: None,
        }
    }

    pub fn success(name: &'static str) -> Self {
        Self::new(name, BtStatus::Success)
    }

    pub fn failure(name: &'static str) -> Self {
        Self::new(name, BtStatus::Failure)
    }

    pub fn running(name: &'static str) -> Self {
        Self::new(name, BtStatus::Running)
    }

    pub fn after(mut self, runs: u32) -> Self {
        self.after = runs.max(1);
        self
    }

    pub fn with_priority(mut self, priority: f32) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn with_utility(mut self, utility: f32) -> Self {
        self.utility = utility;
        self
    }

    pub fn with_journal(mut self, journal: &Journal) -> Self {
        self.journal = Some(Rc::clone(journal));
        self
    }

    pub fn stats(&self) -> Rc<RefCell<Stats>> {
        Rc::clone(&self.stats)
    }

    fn record(&self, hook: &'static str) {
        if let Some(journal) = &self.journal {
            journal.borrow_mut().push((self.name, hook));
        }
    }
}

impl Task for Probe {
    fn name(&self) -> &str {
        self.name
    }

    fn on_enable(&mut self, _blackboard: &mut Blackboard) {
        self.stats.borrow_mut().enables += 1;
    }

    fn on_start(&mut self, _cx: &mut BtContext<'_>) {
        self.stats.borrow_mut().starts += 1;
    }

    fn on_enter(&mut self, _cx: &mut BtContext<'_>) {
        self.runs_this_activation = 0;
        self.stats.borrow_mut().enters += 1;
        self.record("enter");
    }

    fn on_exit(&mut self, _cx: &mut BtContext<'_>, reason: ExitReason) {
        let mut stats = self.stats.borrow_mut();
        stats.exits += 1;
        stats.reasons.push(reason);
        drop(stats);
        self.record("exit");
    }

    fn run(&mut self, _cx: &mut BtContext<'_>) -> BtStatus {
        self.runs_this_activation += 1;
        self.stats.borrow_mut().runs += 1;
        self.record("run");
        if self.result != BtStatus::Running && self.runs_this_activation >= self.after {
            self.result
        } else {
            BtStatus::Running
        }
    }

    fn priority(&self, _blackboard: &Blackboard) -> Option<f32> {
        self.priority
    }

    fn utility_value(&self, _blackboard: &Blackboard) -> f32 {
        self.utility
    }
}

/// Tick once with the given frame time.
pub fn step(tree: &mut BehaviorTree, dt_seconds: f32) -> BtStatus {
    let ctx = TickContext {
        tick: tree.tick_context().tick + 1,
        dt_seconds,
        seed: tree.config().seed,
    };
    tree.tick(&ctx)
}

pub fn ticks(tree: &mut BehaviorTree, n: usize) -> Vec<BtStatus> {
    (0..n).map(|_| step(tree, 0.1)).collect()
}

/// Tick until the root finishes. Panics after `limit` ticks.
pub fn run_to_completion(tree: &mut BehaviorTree, limit: usize) -> BtStatus {
    for _ in 0..limit {
        let status = step(tree, 0.1);
        if status != BtStatus::Running {
            return status;
        }
    }
    panic!("tree still running after {limit} ticks");
}
