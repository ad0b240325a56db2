#![cfg(feature = "serde")]

mod common;

use ai_bt::{NodeKind, TreeBuilder, TreeConfig};
use ai_tools::{TraceLog, TRACE_LOG};
use common::{run_to_completion, Probe};

#[test]
fn recorded_trace_log_survives_json() {
    let mut b = TreeBuilder::new();
    b.blackboard_mut().set(TRACE_LOG, TraceLog::default());
    let root = b.add_root(NodeKind::selector());
    b.add(root, NodeKind::task(Probe::failure("first")));
    b.add(root, NodeKind::task(Probe::success("second")));
    let mut tree = b.build(TreeConfig::default()).expect("valid tree");
    tree.start().expect("start");
    run_to_completion(&mut tree, 10);

    let log = tree.blackboard().get(TRACE_LOG).expect("trace log");
    let json = serde_json::to_string(log).expect("serialize");
    let decoded: TraceLog = serde_json::from_str(&json).expect("deserialize");
    assert_eq!(&decoded, log);

    let entered: Vec<u64> = decoded.with_tag("bt.enter").map(|e| e.a).collect();
    assert_eq!(entered, vec![0, 1, 2]);
    assert_eq!(decoded.events.first().map(|e| e.tag.as_ref()), Some("bt.start"));
    assert_eq!(decoded.events.last().map(|e| e.tag.as_ref()), Some("bt.done"));
}

#[test]
fn tree_config_survives_json() {
    let config = TreeConfig {
        seed: 99,
        max_height: 12,
        restart_on_completion: true,
    };
    let json = serde_json::to_string(&config).expect("serialize");
    let decoded: TreeConfig = serde_json::from_str(&json).expect("deserialize");
    assert_eq!(decoded, config);
}
