//! Directed flows between nodes.

use mizzen_core::NodeId;
use serde::{Deserialize, Serialize};

/// A directed edge from `source` to `target`.
///
/// Flows out of an XOR/OR split carry predicates; the branch marked
/// `is_default` is taken when no predicate holds. `rank` fixes the
/// evaluation and emission order deterministically.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flow {
    /// Source node.
    pub source: NodeId,
    /// Target node.
    pub target: NodeId,
    /// Branch predicate over the case document, if any.
    #[serde(default)]
    pub predicate: Option<String>,
    /// Whether this is the split's default branch.
    #[serde(default)]
    pub is_default: bool,
    /// Evaluation order among flows sharing a source (lower first).
    #[serde(default)]
    pub rank: u32,
}

impl Flow {
    /// An unpredicated flow with rank 0.
    #[must_use]
    pub fn new(source: impl Into<NodeId>, target: impl Into<NodeId>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            predicate: None,
            is_default: false,
            rank: 0,
        }
    }

    /// Attach a predicate expression.
    #[must_use]
    pub fn with_predicate(mut self, predicate: impl Into<String>) -> Self {
        self.predicate = Some(predicate.into());
        self
    }

    /// Mark as the default branch.
    #[must_use]
    pub fn default_branch(mut self) -> Self {
        self.is_default = true;
        self
    }

    /// Set the evaluation rank.
    #[must_use]
    pub fn with_rank(mut self, rank: u32) -> Self {
        self.rank = rank;
        self
    }
}
