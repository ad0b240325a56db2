use thiserror::Error;

use crate::builder::DraftId;

/// Structural problems detected while building a tree. A tree that fails to build never runs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildError {
    #[error("tree has no root")]
    MissingRoot,

    #[error("node {0:?} does not exist in this builder")]
    UnknownNode(DraftId),

    #[error("node {node:?} is attached to more than one parent")]
    MultipleParents { node: DraftId },

    #[error("cycle detected through node {node:?}")]
    Cycle { node: DraftId },

    #[error("node {node:?} is not reachable from the root")]
    Unreachable { node: DraftId },

    #[error("leaf node {node:?} ({label}) cannot have children")]
    LeafWithChildren { node: DraftId, label: &'static str },

    #[error("decorator {node:?} ({label}) needs exactly one child, found {found}")]
    DecoratorArity {
        node: DraftId,
        label: &'static str,
        found: usize,
    },

    #[error("composite {node:?} ({label}) has no children")]
    EmptyComposite { node: DraftId, label: &'static str },

    #[error("tree height {height} exceeds the configured limit {limit}")]
    HeightExceeded { height: u32, limit: u32 },

    #[error("node {node:?} links to {target:?}, which is not a {expected}")]
    InvalidLink {
        node: DraftId,
        target: DraftId,
        expected: &'static str,
    },
}

/// Lifecycle errors reported by [`crate::BehaviorTree::start`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TreeError {
    #[error("tree was already started")]
    AlreadyStarted,

    #[error("tree has no nodes (torn down?)")]
    Empty,
}

pub type Result<T> = std::result::Result<T, BuildError>;
