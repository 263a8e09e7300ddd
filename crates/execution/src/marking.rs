//! Token marking: non-negative counts per node.

use indexmap::IndexMap;
use mizzen_core::NodeId;
use serde::{Deserialize, Serialize};

use crate::error::ExecutionError;

/// Assignment of token counts to the nodes of one running net.
///
/// Only nodes with at least one token appear in the map, so serialized
/// markings stay small and iteration order is insertion order (stable for
/// snapshots).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Marking {
    tokens: IndexMap<NodeId, u32>,
}

impl Marking {
    /// An empty marking.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Tokens currently on `node`.
    #[must_use]
    pub fn count(&self, node: &NodeId) -> u32 {
        self.tokens.get(node).copied().unwrap_or(0)
    }

    /// Returns `true` if `node` holds at least one token.
    #[must_use]
    pub fn is_marked(&self, node: &NodeId) -> bool {
        self.count(node) > 0
    }

    /// Add `n` tokens to `node`.
    pub fn add(&mut self, node: NodeId, n: u32) {
        if n > 0 {
            *self.tokens.entry(node).or_insert(0) += n;
        }
    }

    /// Remove `n` tokens from `node`; underflow is an error and leaves the
    /// marking unchanged.
    pub fn remove(&mut self, node: &NodeId, n: u32) -> Result<(), ExecutionError> {
        let current = self.count(node);
        if current < n {
            return Err(ExecutionError::TokenUnderflow { node: node.clone() });
        }
        if current == n {
            self.tokens.shift_remove(node);
        } else if let Some(slot) = self.tokens.get_mut(node) {
            *slot = current - n;
        }
        Ok(())
    }

    /// Remove every token from `node`, returning how many were removed.
    pub fn clear(&mut self, node: &NodeId) -> u32 {
        self.tokens.shift_remove(node).unwrap_or(0)
    }

    /// Total tokens across all nodes.
    #[must_use]
    pub fn total(&self) -> u32 {
        self.tokens.values().sum()
    }

    /// Returns `true` if no node holds a token.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Nodes holding at least one token, in insertion order.
    pub fn marked_nodes(&self) -> impl Iterator<Item = (&NodeId, u32)> {
        self.tokens.iter().map(|(node, &count)| (node, count))
    }
}
