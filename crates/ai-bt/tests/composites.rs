mod common;

use std::cell::RefCell;
use std::rc::Rc;

use ai_bt::{
    AbortPolicy, BehaviorTree, BtStatus, CompositeKind, ExitReason, KeyCondition, NodeKind,
    TreeBuilder, TreeConfig,
};
use ai_core::BbKey;
use common::{run_to_completion, ticks, Journal, Probe};

fn flat(kind: CompositeKind, probes: &[Probe]) -> BehaviorTree {
    let mut b = TreeBuilder::new();
    let root = b.add_root(NodeKind::composite(kind));
    for probe in probes {
        b.add(root, NodeKind::task(probe.clone()));
    }
    let mut tree = b.build(TreeConfig::default()).expect("valid tree");
    tree.start().expect("start");
    tree
}

#[test]
fn sequence_succeeds_after_every_child_succeeds() {
    let probes = [
        Probe::success("a"),
        Probe::success("b"),
        Probe::success("c"),
    ];
    let mut tree = flat(CompositeKind::Sequence, &probes);

    // Each leaf runs on its entry tick; the sequence spends a tick moving to the next child.
    let statuses = ticks(&mut tree, 6);
    assert_eq!(&statuses[..5], &[BtStatus::Running; 5]);
    assert_eq!(statuses[5], BtStatus::Success);

    for probe in &probes {
        let stats = probe.stats();
        let stats = stats.borrow();
        assert_eq!((stats.enters, stats.runs, stats.exits), (1, 1, 1));
        assert_eq!(stats.reasons, vec![ExitReason::Completed(BtStatus::Success)]);
    }
}

#[test]
fn sequence_fails_on_first_failure_and_skips_the_rest() {
    let probes = [
        Probe::success("a"),
        Probe::failure("b"),
        Probe::success("c"),
    ];
    let mut tree = flat(CompositeKind::Sequence, &probes);

    assert_eq!(run_to_completion(&mut tree, 20), BtStatus::Failure);
    assert_eq!(probes[0].stats().borrow().runs, 1);
    assert_eq!(probes[1].stats().borrow().runs, 1);
    assert_eq!(probes[2].stats().borrow().enters, 0);
}

#[test]
fn selector_succeeds_on_first_success() {
    let probes = [
        Probe::failure("a"),
        Probe::failure("b"),
        Probe::success("c"),
    ];
    let mut tree = flat(CompositeKind::Selector, &probes);
    assert_eq!(run_to_completion(&mut tree, 20), BtStatus::Success);
    assert!(probes.iter().all(|p| p.stats().borrow().enters == 1));

    let probes = [Probe::failure("a"), Probe::success("b"), Probe::success("c")];
    let mut tree = flat(CompositeKind::Selector, &probes);
    assert_eq!(run_to_completion(&mut tree, 20), BtStatus::Success);
    assert_eq!(probes[2].stats().borrow().enters, 0);
}

#[test]
fn selector_fails_when_every_child_fails() {
    let probes = [Probe::failure("a"), Probe::failure("b")];
    let mut tree = flat(CompositeKind::Selector, &probes);
    assert_eq!(run_to_completion(&mut tree, 20), BtStatus::Failure);
}

#[test]
fn running_children_keep_the_composite_running() {
    let probes = [Probe::success("a").after(3), Probe::success("b")];
    let mut tree = flat(CompositeKind::Sequence, &probes);

    ticks(&mut tree, 2);
    assert_eq!(probes[0].stats().borrow().runs, 2);
    assert_eq!(probes[1].stats().borrow().enters, 0);
    assert_eq!(run_to_completion(&mut tree, 20), BtStatus::Success);
    assert_eq!(probes[0].stats().borrow().enters, 1);
}

#[test]
fn priority_selector_tries_highest_priority_first() {
    let probes = [
        Probe::success("low").with_priority(1.0),
        Probe::success("high").with_priority(5.0),
    ];
    let mut tree = flat(CompositeKind::PrioritySelector, &probes);

    assert_eq!(run_to_completion(&mut tree, 20), BtStatus::Success);
    assert_eq!(probes[0].stats().borrow().enters, 0);
    assert_eq!(probes[1].stats().borrow().enters, 1);

    let root = tree.node(0).kind().as_composite().expect("composite root");
    assert_eq!(root.execution_order(), &[1, 0]);
}

#[test]
fn utility_selector_orders_by_branch_utility() {
    let probes = [
        Probe::failure("meh").with_utility(0.2),
        Probe::failure("best").with_utility(0.9),
        Probe::success("mid").with_utility(0.5),
    ];
    let mut tree = flat(CompositeKind::UtilitySelector, &probes);

    assert_eq!(run_to_completion(&mut tree, 20), BtStatus::Success);
    assert_eq!(probes[1].stats().borrow().enters, 1);
    assert_eq!(probes[2].stats().borrow().enters, 1);
    assert_eq!(probes[0].stats().borrow().enters, 0);
}

fn shuffled_entry_order(seed: u64) -> Vec<&'static str> {
    let journal: Journal = Rc::new(RefCell::new(Vec::new()));
    let mut b = TreeBuilder::new();
    let root = b.add_root(NodeKind::composite(CompositeKind::RandomSequence));
    for name in ["a", "b", "c", "d", "e"] {
        b.add(root, NodeKind::task(Probe::success(name).with_journal(&journal)));
    }
    let mut tree = b
        .build(TreeConfig {
            seed,
            ..TreeConfig::default()
        })
        .expect("valid tree");
    tree.start().expect("start");
    assert_eq!(run_to_completion(&mut tree, 40), BtStatus::Success);

    let entries = journal
        .borrow()
        .iter()
        .filter(|(_, hook)| *hook == "enter")
        .map(|(name, _)| *name)
        .collect();
    entries
}

#[test]
fn random_sequence_is_a_seeded_permutation() {
    let first = shuffled_entry_order(7);
    let again = shuffled_entry_order(7);
    assert_eq!(first, again);

    let mut sorted = first.clone();
    sorted.sort_unstable();
    assert_eq!(sorted, vec!["a", "b", "c", "d", "e"]);
}

const DANGER: BbKey<bool> = BbKey::new(40);

#[test]
fn reactive_selector_reenters_a_higher_branch_whose_guard_passes() {
    let flee = Probe::running("flee");
    let wander = Probe::running("wander");

    let mut b = TreeBuilder::new();
    let root = b.add_root(NodeKind::composite(CompositeKind::ReactiveSelector));
    let guard = b.add(
        root,
        NodeKind::conditional(
            KeyCondition::new(DANGER, |v: Option<&bool>| v.copied().unwrap_or(false)),
            AbortPolicy::None,
        ),
    );
    b.add(guard, NodeKind::task(flee.clone()));
    b.add(root, NodeKind::task(wander.clone()));
    let mut tree = b.build(TreeConfig::default()).expect("valid tree");
    tree.start().expect("start");

    ticks(&mut tree, 3);
    assert_eq!(flee.stats().borrow().enters, 0);
    assert_eq!(wander.stats().borrow().enters, 1);

    tree.blackboard_mut().set(DANGER, true);
    assert_eq!(ticks(&mut tree, 1), vec![BtStatus::Running]);

    assert_eq!(flee.stats().borrow().enters, 1);
    assert_eq!(wander.stats().borrow().reasons, vec![ExitReason::Aborted]);

    ticks(&mut tree, 3);
    assert_eq!(flee.stats().borrow().enters, 1);
    assert_eq!(wander.stats().borrow().enters, 1);
}

#[test]
fn reactive_sequence_restarts_when_an_earlier_guard_fails() {
    const READY: BbKey<bool> = BbKey::new(41);
    let work = Probe::running("work");

    let mut b = TreeBuilder::new();
    b.blackboard_mut().set(READY, true);
    let root = b.add_root(NodeKind::composite(CompositeKind::ReactiveSequence));
    let check = b.add(
        root,
        NodeKind::conditional(
            KeyCondition::new(READY, |v: Option<&bool>| v.copied().unwrap_or(false)),
            AbortPolicy::None,
        ),
    );
    b.add(check, NodeKind::task(Probe::success("prepare")));
    b.add(root, NodeKind::task(work.clone()));
    let mut tree = b.build(TreeConfig::default()).expect("valid tree");
    tree.start().expect("start");

    run_until_entered(&mut tree, &work);
    tree.blackboard_mut().set(READY, false);
    ticks(&mut tree, 1);

    assert_eq!(work.stats().borrow().reasons, vec![ExitReason::Aborted]);
    assert_eq!(run_to_completion(&mut tree, 10), BtStatus::Failure);
}

fn run_until_entered(tree: &mut BehaviorTree, probe: &Probe) {
    for _ in 0..20 {
        if probe.stats().borrow().enters > 0 {
            return;
        }
        ticks(tree, 1);
    }
    panic!("probe was never entered");
}
