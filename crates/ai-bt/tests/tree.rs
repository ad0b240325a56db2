mod common;

use ai_bt::{
    AbortPolicy, BehaviorTree, BtStatus, BuildError, ExitReason, GuardConfig, InterruptMode,
    IteratorId, KeyCondition, NodeKind, TreeBuilder, TreeConfig, TreeError,
};
use ai_core::BbKey;
use ai_tools::{TraceLog, TRACE_LOG};
use common::{init_tracing, run_to_completion, ticks, Probe};

const MOOD: BbKey<u32> = BbKey::new(7);
const ARMED: BbKey<bool> = BbKey::new(8);

/// `sequence[ a, selector[ inverter(b), c ], parallel[ d, e ] ]`
fn sample(probes: &[Probe; 5]) -> BehaviorTree {
    let mut b = TreeBuilder::new();
    b.blackboard_mut().set(TRACE_LOG, TraceLog::default());
    b.blackboard_mut().set(MOOD, 3);
    let root = b.add_root(NodeKind::sequence());
    b.add(root, NodeKind::task(probes[0].clone()));
    let sel = b.add(root, NodeKind::selector());
    let inv = b.add(sel, NodeKind::inverter());
    b.add(inv, NodeKind::task(probes[1].clone()));
    b.add(sel, NodeKind::task(probes[2].clone()));
    let par = b.add(root, NodeKind::parallel());
    b.add(par, NodeKind::task(probes[3].clone()));
    b.add(par, NodeKind::task(probes[4].clone()));
    b.build(TreeConfig::default()).expect("valid tree")
}

fn sample_probes() -> [Probe; 5] {
    [
        Probe::success("a"),
        Probe::success("b"),
        Probe::success("c").after(2),
        Probe::success("d"),
        Probe::success("e").after(3),
    ]
}

#[test]
fn layout_is_pre_order() {
    let tree = sample(&sample_probes());
    assert_eq!(tree.len(), 9);
    assert_eq!(tree.height(), 3);
    assert_eq!(tree.root(), Some(0));

    let sel = tree.node(2).info();
    assert_eq!(sel.parent(), Some(0));
    assert_eq!(sel.children(), &[3, 5]);
    assert_eq!(sel.child_order(), 1);
    assert_eq!(sel.level(), 1);
    assert_eq!(sel.subtree(), 2..6);

    let names: Vec<_> = tree.nodes().iter().map(|n| n.name().to_string()).collect();
    assert_eq!(
        names,
        vec!["sequence", "a", "selector", "inverter", "b", "c", "parallel", "d", "e"]
    );

    // Children before parents in post-order.
    for node in tree.nodes() {
        if let Some(parent) = node.info().parent() {
            assert!(node.info().post_order() < tree.node(parent).info().post_order());
        }
    }
    assert_eq!(tree.node(0).info().post_order(), 8);
}

#[test]
fn hooks_fire_in_lifecycle_order_and_pair_up() {
    init_tracing();
    let probes = sample_probes();
    let mut tree = sample(&probes);
    for probe in &probes {
        assert_eq!(probe.stats().borrow().enables, 1);
        assert_eq!(probe.stats().borrow().starts, 0);
    }

    tree.start().expect("start");
    assert_eq!(run_to_completion(&mut tree, 40), BtStatus::Success);

    for probe in &probes {
        let stats = probe.stats();
        let stats = stats.borrow();
        assert_eq!(stats.starts, 1);
        assert_eq!(stats.enters, stats.exits);
    }
    // The inverted success fails, so the selector falls through to `c`.
    assert_eq!(probes[2].stats().borrow().enters, 1);
    for it in tree.iterators() {
        assert!(it.high_water() <= it.capacity());
    }
    assert!(tree.iterator(ai_bt::IteratorId::PRIMARY).high_water() <= tree.height() as usize + 1);
}

#[test]
fn trace_log_records_every_enter_and_exit() {
    let probes = sample_probes();
    let mut tree = sample(&probes);
    tree.start().expect("start");
    run_to_completion(&mut tree, 40);

    let log = tree.blackboard().get(TRACE_LOG).expect("trace log");
    assert_eq!(log.with_tag("bt.start").count(), 1);
    assert_eq!(log.with_tag("bt.enter").count(), 9);
    assert_eq!(log.with_tag("bt.exit").count(), 9);
    let done: Vec<_> = log.with_tag("bt.done").map(|e| e.a).collect();
    assert_eq!(done, vec![0]);

    let first = log.with_tag("bt.enter").next().expect("enter event");
    assert_eq!(first.a, 0);
}

#[test]
fn ticking_is_deterministic_across_clones() {
    let probes = sample_probes();
    let mut original = sample(&probes);
    let mut copy = original.clone_tree().expect("clone");

    assert_eq!(copy.len(), original.len());
    for (a, b) in original.nodes().iter().zip(copy.nodes()) {
        assert_eq!(a.name(), b.name());
        assert_eq!(a.info().parent(), b.info().parent());
        assert_eq!(a.info().children(), b.info().children());
        assert_eq!(a.info().level(), b.info().level());
        assert_eq!(a.info().iterator(), b.info().iterator());
    }
    assert_eq!(copy.blackboard().get(MOOD), Some(&3));

    original.start().expect("start");
    copy.start().expect("start");
    assert_eq!(ticks(&mut original, 20), ticks(&mut copy, 20));
}

#[test]
fn clone_keeps_links_inside_the_copied_structure() {
    let mut b = TreeBuilder::new();
    let root = b.add_root(NodeKind::parallel());
    let g1 = b.add(root, NodeKind::guard(GuardConfig::default()));
    b.add(g1, NodeKind::task(Probe::success("x")));
    let g2 = b.add(root, NodeKind::guard(GuardConfig::default()));
    b.add(g2, NodeKind::task(Probe::success("y")));
    b.link_guards(&[g1, g2]);
    let tree = b.build(TreeConfig::default()).expect("valid tree");

    let copy = tree.clone_tree().expect("clone");
    assert_eq!(copy.node(1).kind().links(), &[3]);
    assert_eq!(copy.node(3).kind().links(), &[1]);

    // The partner guard lies outside the subtree, so the link is dropped.
    let sub = tree.clone_subtree(1).expect("subtree");
    assert_eq!(sub.len(), 2);
    assert!(sub.node(0).kind().links().is_empty());
    assert_eq!(sub.node(1).name(), "x");

    assert_eq!(tree.clone_subtree(42).err(), Some(BuildError::MissingRoot));
}

#[test]
fn start_twice_is_rejected() {
    let mut tree = sample(&sample_probes());
    assert_eq!(tree.start(), Ok(()));
    assert_eq!(tree.start(), Err(TreeError::AlreadyStarted));
}

#[test]
#[should_panic(expected = "not started")]
fn tick_before_start_panics() {
    let mut tree = sample(&sample_probes());
    ticks(&mut tree, 1);
}

#[test]
fn finished_tree_reports_its_result_until_restarted() {
    let probes = sample_probes();
    let mut tree = sample(&probes);
    tree.start().expect("start");
    assert_eq!(run_to_completion(&mut tree, 40), BtStatus::Success);
    assert_eq!(ticks(&mut tree, 3), vec![BtStatus::Success; 3]);
    assert_eq!(probes[0].stats().borrow().enters, 1);

    tree.restart().expect("restart");
    assert!(tree.is_running());
    ticks(&mut tree, 1);
    assert_eq!(probes[0].stats().borrow().enters, 2);
}

#[test]
fn restart_on_completion_loops_the_root() {
    let leaf = Probe::success("leaf");
    let mut b = TreeBuilder::new();
    b.add_root(NodeKind::task(leaf.clone()));
    let mut tree = b
        .build(TreeConfig {
            restart_on_completion: true,
            ..TreeConfig::default()
        })
        .expect("valid tree");
    tree.start().expect("start");

    assert_eq!(ticks(&mut tree, 4), vec![BtStatus::Success; 4]);
    assert_eq!(leaf.stats().borrow().runs, 4);
}

#[test]
fn restarted_conditional_root_fails_when_its_condition_turns_false() {
    let leaf = Probe::success("leaf");
    let mut b = TreeBuilder::new();
    b.blackboard_mut().set(ARMED, true);
    let root = b.add_root(NodeKind::conditional(
        KeyCondition::new(ARMED, |v: Option<&bool>| v.copied().unwrap_or(false)),
        AbortPolicy::None,
    ));
    b.add(root, NodeKind::task(leaf.clone()));
    let mut tree = b
        .build(TreeConfig {
            restart_on_completion: true,
            ..TreeConfig::default()
        })
        .expect("valid tree");
    tree.start().expect("start");

    assert_eq!(ticks(&mut tree, 2), vec![BtStatus::Running, BtStatus::Success]);

    tree.blackboard_mut().set(ARMED, false);
    assert_eq!(ticks(&mut tree, 1), vec![BtStatus::Failure]);
    assert_eq!(leaf.stats().borrow().enters, 1);
    let primary = tree.iterator(IteratorId::PRIMARY);
    assert_eq!(primary.last_child_exit(), Some(BtStatus::Failure));
}

#[test]
fn interrupt_reporting_failure_fails_the_parent() {
    let stuck = Probe::running("stuck");
    let mut b = TreeBuilder::new();
    let root = b.add_root(NodeKind::sequence());
    b.add(root, NodeKind::task(stuck.clone()));
    b.add(root, NodeKind::task(Probe::success("never")));
    let mut tree = b.build(TreeConfig::default()).expect("valid tree");
    tree.start().expect("start");

    ticks(&mut tree, 2);
    assert!(tree.interrupt(1, InterruptMode::ReportFailure));
    assert!(!tree.interrupt(1, InterruptMode::ReportFailure));
    assert_eq!(stuck.stats().borrow().reasons, vec![ExitReason::Interrupted]);
    assert_eq!(ticks(&mut tree, 1), vec![BtStatus::Failure]);
}

#[test]
fn silent_interrupt_leaves_the_parent_on_the_same_child() {
    let stuck = Probe::running("stuck");
    let after = Probe::success("after");
    let mut b = TreeBuilder::new();
    let root = b.add_root(NodeKind::sequence());
    b.add(root, NodeKind::task(stuck.clone()));
    b.add(root, NodeKind::task(after.clone()));
    let mut tree = b.build(TreeConfig::default()).expect("valid tree");
    tree.start().expect("start");

    ticks(&mut tree, 2);
    assert!(tree.interrupt(1, InterruptMode::Silent));
    assert_eq!(stuck.stats().borrow().reasons, vec![ExitReason::Interrupted]);

    // The sequence never saw an exit, so it re-traverses the interrupted child.
    assert_eq!(ticks(&mut tree, 2), vec![BtStatus::Running; 2]);
    assert_eq!(stuck.stats().borrow().enters, 2);
    assert_eq!(after.stats().borrow().enters, 0);
}

#[test]
fn silent_interrupt_of_the_root_stops_the_tree() {
    let stuck = Probe::running("stuck");
    let mut b = TreeBuilder::new();
    let root = b.add_root(NodeKind::sequence());
    b.add(root, NodeKind::task(stuck.clone()));
    let mut tree = b.build(TreeConfig::default()).expect("valid tree");
    tree.start().expect("start");

    ticks(&mut tree, 1);
    assert!(tree.interrupt(0, InterruptMode::Silent));
    assert_eq!(tree.status(), BtStatus::Failure);
    assert_eq!(ticks(&mut tree, 2), vec![BtStatus::Failure; 2]);
    assert_eq!(stuck.stats().borrow().exits, 1);
}

#[test]
fn teardown_unwinds_and_empties_the_tree() {
    let stuck = Probe::running("stuck");
    let mut b = TreeBuilder::new();
    let root = b.add_root(NodeKind::selector());
    b.add(root, NodeKind::task(stuck.clone()));
    let mut tree = b.build(TreeConfig::default()).expect("valid tree");
    tree.start().expect("start");
    ticks(&mut tree, 1);

    tree.teardown();
    assert!(tree.is_empty());
    assert_eq!(stuck.stats().borrow().reasons, vec![ExitReason::Interrupted]);
    assert_eq!(tree.start(), Err(TreeError::Empty));
    assert_eq!(tree.restart(), Err(TreeError::Empty));
}

fn leaf() -> NodeKind {
    NodeKind::task(Probe::success("leaf"))
}

#[test]
fn build_rejects_missing_root() {
    let mut b = TreeBuilder::new();
    b.node(leaf());
    assert_eq!(b.build(TreeConfig::default()).err(), Some(BuildError::MissingRoot));
}

#[test]
fn build_rejects_ids_from_another_builder() {
    let mut other = TreeBuilder::new();
    let foreign = (0..4).map(|_| other.node(leaf())).last().expect("ids");

    let mut b = TreeBuilder::new();
    let root = b.add_root(NodeKind::sequence());
    b.attach(root, foreign);
    assert_eq!(
        b.build(TreeConfig::default()).err(),
        Some(BuildError::UnknownNode(foreign))
    );
}

#[test]
fn build_rejects_shared_children_and_cycles() {
    let mut b = TreeBuilder::new();
    let root = b.add_root(NodeKind::sequence());
    let shared = b.node(leaf());
    b.attach(root, shared);
    b.attach(root, shared);
    assert_eq!(
        b.build(TreeConfig::default()).err(),
        Some(BuildError::MultipleParents { node: shared })
    );

    let mut b = TreeBuilder::new();
    let root = b.add_root(NodeKind::sequence());
    let inner = b.add(root, NodeKind::sequence());
    b.attach(inner, root);
    assert_eq!(
        b.build(TreeConfig::default()).err(),
        Some(BuildError::Cycle { node: root })
    );
}

#[test]
fn build_rejects_detached_nodes() {
    let mut b = TreeBuilder::new();
    let root = b.add_root(NodeKind::sequence());
    b.add(root, leaf());
    let stray = b.node(leaf());
    assert_eq!(
        b.build(TreeConfig::default()).err(),
        Some(BuildError::Unreachable { node: stray })
    );
}

#[test]
fn build_checks_arity() {
    let mut b = TreeBuilder::new();
    let root = b.add_root(leaf());
    b.add(root, leaf());
    assert!(matches!(
        b.build(TreeConfig::default()),
        Err(BuildError::LeafWithChildren { label: "task", .. })
    ));

    let mut b = TreeBuilder::new();
    let root = b.add_root(NodeKind::inverter());
    b.add(root, leaf());
    b.add(root, leaf());
    assert!(matches!(
        b.build(TreeConfig::default()),
        Err(BuildError::DecoratorArity { found: 2, .. })
    ));

    let mut b = TreeBuilder::new();
    b.add_root(NodeKind::selector());
    assert!(matches!(
        b.build(TreeConfig::default()),
        Err(BuildError::EmptyComposite { .. })
    ));
}

#[test]
fn build_enforces_the_height_limit() {
    let mut b = TreeBuilder::new();
    let mut parent = b.add_root(NodeKind::inverter());
    for _ in 0..4 {
        parent = b.add(parent, NodeKind::inverter());
    }
    b.add(parent, leaf());
    let config = TreeConfig {
        max_height: 3,
        ..TreeConfig::default()
    };
    assert_eq!(
        b.build(config).err(),
        Some(BuildError::HeightExceeded {
            height: 5,
            limit: 3
        })
    );
}

#[test]
fn build_rejects_links_to_the_wrong_kind() {
    let mut b = TreeBuilder::new();
    let root = b.add_root(NodeKind::sequence());
    let guard = b.add(root, NodeKind::guard(GuardConfig::default()));
    b.add(guard, leaf());
    let plain = b.add(root, NodeKind::inverter());
    b.add(plain, leaf());
    b.link_guards(&[guard, plain]);
    assert!(matches!(
        b.build(TreeConfig::default()),
        Err(BuildError::InvalidLink {
            expected: "guard",
            ..
        })
    ));

    let mut b = TreeBuilder::new();
    let root = b.add_root(NodeKind::sequence());
    let interruptor = b.add(root, NodeKind::interruptor());
    let target = b.add(root, leaf());
    b.link_interruptor(interruptor, &[target]);
    assert!(matches!(
        b.build(TreeConfig::default()),
        Err(BuildError::InvalidLink {
            expected: "interruptable",
            ..
        })
    ));
}
