use std::collections::BTreeSet;

use ai_core::{Blackboard, SplitMix64, TickContext};
use tracing::debug;

use crate::decorator::Decorator;
use crate::error::{BuildError, Result};
use crate::iterator::{BehaviorIterator, IteratorId};
use crate::node::{Arity, Node, NodeId, NodeInfo, NodeKind};
use crate::traversal::{post_order, pre_order, pre_order_skip_children, subtree_height, Hierarchy};
use crate::tree::{BehaviorTree, TreeConfig};

/// Handle to a node inside a [`TreeBuilder`]. Unrelated to the node's final pre-order index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DraftId(pub(crate) usize);

impl DraftId {
    pub fn index(self) -> usize {
        self.0
    }
}

struct Draft {
    kind: NodeKind,
    children: Vec<DraftId>,
    links: Vec<DraftId>,
}

/// Additive tree construction. Nothing is validated until [`TreeBuilder::build`].
#[derive(Default)]
pub struct TreeBuilder {
    drafts: Vec<Draft>,
    root: Option<DraftId>,
    blackboard: Blackboard,
    // First id passed in that did not exist at the time.
    unknown: Option<DraftId>,
}

impl TreeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_blackboard(mut self, blackboard: Blackboard) -> Self {
        self.blackboard = blackboard;
        self
    }

    pub fn blackboard_mut(&mut self) -> &mut Blackboard {
        &mut self.blackboard
    }

    pub fn len(&self) -> usize {
        self.drafts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.drafts.is_empty()
    }

    /// A detached node.
    pub fn node(&mut self, kind: NodeKind) -> DraftId {
        let id = DraftId(self.drafts.len());
        self.drafts.push(Draft {
            kind,
            children: Vec::new(),
            links: Vec::new(),
        });
        id
    }

    /// Append `child` to `parent`'s children.
    pub fn attach(&mut self, parent: DraftId, child: DraftId) {
        if !self.check(parent) || !self.check(child) {
            return;
        }
        self.drafts[parent.0].children.push(child);
    }

    pub fn set_root(&mut self, root: DraftId) {
        self.root = Some(root);
    }

    pub fn add_root(&mut self, kind: NodeKind) -> DraftId {
        let id = self.node(kind);
        self.set_root(id);
        id
    }

    /// A new node appended to `parent`'s children.
    pub fn add(&mut self, parent: DraftId, kind: NodeKind) -> DraftId {
        let id = self.node(kind);
        self.attach(parent, id);
        id
    }

    /// Make `guards` one linked set: each counts the others when deciding whether it is full.
    pub fn link_guards(&mut self, guards: &[DraftId]) {
        if !guards.iter().all(|&g| self.check(g)) {
            return;
        }
        for &guard in guards {
            let links = &mut self.drafts[guard.0].links;
            for &other in guards {
                if other != guard && !links.contains(&other) {
                    links.push(other);
                }
            }
        }
    }

    pub fn link_interruptor(&mut self, interruptor: DraftId, targets: &[DraftId]) {
        if !self.check(interruptor) || !targets.iter().all(|&t| self.check(t)) {
            return;
        }
        let links = &mut self.drafts[interruptor.0].links;
        for &target in targets {
            if !links.contains(&target) {
                links.push(target);
            }
        }
    }

    pub(crate) fn set_links(&mut self, node: DraftId, links: Vec<DraftId>) {
        if self.check(node) {
            self.drafts[node.0].links = links;
        }
    }

    fn check(&mut self, id: DraftId) -> bool {
        let known = id.0 < self.drafts.len();
        if !known && self.unknown.is_none() {
            self.unknown = Some(id);
        }
        known
    }

    /// Validate the structure, lay it out in pre-order and allocate iterators.
    pub fn build(self, config: TreeConfig) -> Result<BehaviorTree> {
        if let Some(id) = self.unknown {
            return Err(BuildError::UnknownNode(id));
        }
        let root = self.root.ok_or(BuildError::MissingRoot)?;
        if root.0 >= self.drafts.len() {
            return Err(BuildError::UnknownNode(root));
        }
        self.validate_links()?;
        self.validate_shape(root)?;

        let layout = self.layout(root);
        if layout.height > config.max_height {
            return Err(BuildError::HeightExceeded {
                height: layout.height,
                limit: config.max_height,
            });
        }

        let TreeBuilder {
            drafts,
            mut blackboard,
            ..
        } = self;
        let n = drafts.len();
        let pre = &layout.pre_index;

        let mut parent_of = vec![None; n];
        let mut child_order_of = vec![0; n];
        for (d, draft) in drafts.iter().enumerate() {
            for (i, child) in draft.children.iter().enumerate() {
                parent_of[child.0] = Some(pre[d]);
                child_order_of[child.0] = i;
            }
        }

        let mut kinds = Vec::with_capacity(n);
        let mut children = Vec::with_capacity(n);
        let mut links = Vec::with_capacity(n);
        for draft in drafts {
            kinds.push(Some(draft.kind));
            children.push(draft.children);
            links.push(draft.links);
        }

        let mut nodes = Vec::with_capacity(n);
        for (p, &d) in layout.order.iter().enumerate() {
            let Some(kind) = kinds[d].take() else {
                return Err(BuildError::Cycle { node: DraftId(d) });
            };
            nodes.push(Node {
                info: NodeInfo {
                    pre_order: p,
                    post_order: layout.post_index[d],
                    level: layout.level[d],
                    child_order: child_order_of[d],
                    parent: parent_of[d],
                    children: children[d].iter().map(|c| pre[c.0]).collect(),
                    subtree_end: p + layout.size[d],
                    iterator: IteratorId::PRIMARY,
                },
                kind,
            });
        }

        // Links refer to builder ids until every node has its index.
        for (d, targets) in links.iter().enumerate() {
            if !targets.is_empty() {
                let mapped = targets.iter().map(|t| pre[t.0]).collect();
                nodes[pre[d]].kind.set_links(mapped);
            }
        }

        let iterators = assign_iterators(&mut nodes, layout.height);

        let observers: Vec<NodeId> = (0..nodes.len())
            .filter(|&i| {
                nodes[i]
                    .kind
                    .as_conditional()
                    .is_some_and(|abort| abort.policy().observes())
            })
            .collect();
        let tree_tickers: Vec<NodeId> = (0..nodes.len())
            .filter(|&i| match &nodes[i].kind {
                NodeKind::Task(task) => task.can_tick_on_tree(),
                NodeKind::Decorator(Decorator::Cooldown { .. }) => true,
                NodeKind::Composite(c) => c.kind().is_reactive(),
                _ => false,
            })
            .collect();

        for node in &mut nodes {
            if let NodeKind::Task(task) = &mut node.kind {
                task.on_enable(&mut blackboard);
            }
        }

        debug!(
            nodes = nodes.len(),
            height = layout.height,
            iterators = iterators.len(),
            observers = observers.len(),
            "behavior tree built"
        );

        Ok(BehaviorTree {
            nodes,
            iterators,
            observers,
            tree_tickers,
            height: layout.height,
            config,
            blackboard,
            rng: SplitMix64::new(config.seed),
            ctx: TickContext {
                seed: config.seed,
                ..TickContext::default()
            },
            started: false,
            root_status: None,
            deferred: BTreeSet::new(),
        })
    }

    fn validate_links(&self) -> Result<()> {
        for (d, draft) in self.drafts.iter().enumerate() {
            let node = DraftId(d);
            let Some(&first) = draft.links.first() else {
                continue;
            };
            let interruptor = matches!(draft.kind, NodeKind::Interruptor(_));
            if !interruptor && !draft.kind.is_guard() {
                return Err(BuildError::InvalidLink {
                    node,
                    target: first,
                    expected: "guard",
                });
            }
            for &target in &draft.links {
                let Some(other) = self.drafts.get(target.0) else {
                    return Err(BuildError::UnknownNode(target));
                };
                let (ok, expected) = if interruptor {
                    (other.kind.is_interruptable(), "interruptable")
                } else {
                    (other.kind.is_guard(), "guard")
                };
                if !ok {
                    return Err(BuildError::InvalidLink {
                        node,
                        target,
                        expected,
                    });
                }
            }
        }
        Ok(())
    }

    /// Single parents, no cycles, everything reachable, child counts matching each kind.
    fn validate_shape(&self, root: DraftId) -> Result<()> {
        let n = self.drafts.len();

        let mut parents = vec![0usize; n];
        for draft in &self.drafts {
            for &child in &draft.children {
                parents[child.0] += 1;
                if parents[child.0] > 1 {
                    return Err(BuildError::MultipleParents { node: child });
                }
            }
        }

        const WHITE: u8 = 0;
        const GREY: u8 = 1;
        const BLACK: u8 = 2;
        let mut color = vec![WHITE; n];
        let mut stack = vec![(root.0, 0usize)];
        color[root.0] = GREY;
        while let Some(top) = stack.last_mut() {
            let (node, next) = *top;
            if next < self.drafts[node].children.len() {
                top.1 += 1;
                let child = self.drafts[node].children[next].0;
                match color[child] {
                    GREY => return Err(BuildError::Cycle { node: DraftId(child) }),
                    WHITE => {
                        color[child] = GREY;
                        stack.push((child, 0));
                    }
                    _ => {}
                }
            } else {
                color[node] = BLACK;
                stack.pop();
            }
        }
        if let Some(d) = color.iter().position(|&c| c == WHITE) {
            return Err(BuildError::Unreachable { node: DraftId(d) });
        }

        for (d, draft) in self.drafts.iter().enumerate() {
            let node = DraftId(d);
            let label = draft.kind.label();
            let found = draft.children.len();
            match draft.kind.arity() {
                Arity::Leaf if found > 0 => {
                    return Err(BuildError::LeafWithChildren { node, label })
                }
                Arity::One if found != 1 => {
                    return Err(BuildError::DecoratorArity { node, label, found })
                }
                Arity::Many if found == 0 => return Err(BuildError::EmptyComposite { node, label }),
                _ => {}
            }
        }
        Ok(())
    }

    fn layout(&self, root: DraftId) -> Layout {
        let n = self.drafts.len();
        let order: Vec<usize> = pre_order(self, root.0).collect();

        let mut pre_index = vec![usize::MAX; n];
        let mut level = vec![0u32; n];
        for (p, &d) in order.iter().enumerate() {
            pre_index[d] = p;
            for child in &self.drafts[d].children {
                level[child.0] = level[d] + 1;
            }
        }

        let mut post_index = vec![0; n];
        for (i, d) in post_order(self, root.0).enumerate() {
            post_index[d] = i;
        }

        let mut size = vec![1usize; n];
        for &d in order.iter().rev() {
            size[d] += self.drafts[d]
                .children
                .iter()
                .map(|c| size[c.0])
                .sum::<usize>();
        }

        let height = order.iter().map(|&d| level[d]).max().unwrap_or(0);
        Layout {
            order,
            pre_index,
            post_index,
            level,
            size,
            height,
        }
    }
}

struct Layout {
    /// Builder ids in pre-order.
    order: Vec<usize>,
    pre_index: Vec<NodeId>,
    post_index: Vec<usize>,
    level: Vec<u32>,
    size: Vec<usize>,
    height: u32,
}

/// Primary iterator for everything outside parallels, one branch iterator per parallel child.
fn assign_iterators(nodes: &mut [Node], height: u32) -> Vec<BehaviorIterator> {
    let mut iterators = vec![BehaviorIterator::new(height as usize + 1, None)];
    let mut work = vec![(0, IteratorId::PRIMARY)];

    while let Some((start, it)) = work.pop() {
        let walked: Vec<NodeId> = pre_order_skip_children(&*nodes, start, |n| {
            matches!(nodes[n].kind, NodeKind::Parallel(_))
        })
        .collect();

        for node in walked {
            nodes[node].info.iterator = it;
            if !matches!(nodes[node].kind, NodeKind::Parallel(_)) {
                continue;
            }
            let mut branches = Vec::with_capacity(nodes[node].info.children.len());
            for i in 0..nodes[node].info.children.len() {
                let child = nodes[node].info.children[i];
                let branch = IteratorId(iterators.len());
                let capacity = subtree_height(&*nodes, child) as usize + 1;
                iterators.push(BehaviorIterator::new(capacity, Some(node)));
                branches.push(branch);
                work.push((child, branch));
            }
            if let NodeKind::Parallel(parallel) = &mut nodes[node].kind {
                parallel.set_branches(branches);
            }
        }
    }
    iterators
}

impl Hierarchy for TreeBuilder {
    fn child_count(&self, node: usize) -> usize {
        self.drafts[node].children.len()
    }

    fn child_at(&self, node: usize, index: usize) -> usize {
        self.drafts[node].children[index].0
    }
}
