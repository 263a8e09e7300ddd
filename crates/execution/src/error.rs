//! Runtime state errors.

use mizzen_core::{CaseId, NodeId, WorkItemId};
use thiserror::Error;

/// Errors raised while mutating runtime case state.
#[derive(Debug, Error)]
pub enum ExecutionError {
    /// A work item transition violated the lifecycle state machine.
    #[error("work item {item}: invalid transition from {from} to {to}")]
    InvalidWorkItemTransition {
        /// The work item in question.
        item: WorkItemId,
        /// Current status.
        from: String,
        /// Attempted target status.
        to: String,
    },

    /// A case transition violated the case state machine.
    #[error("case {case}: invalid transition from {from} to {to}")]
    InvalidCaseTransition {
        /// The case in question.
        case: CaseId,
        /// Current status.
        from: String,
        /// Attempted target status.
        to: String,
    },

    /// An attempt to remove more tokens than a node holds.
    #[error("token underflow at node {node}")]
    TokenUnderflow {
        /// The node whose count would go negative.
        node: NodeId,
    },

    /// A referenced work item does not exist in the case.
    #[error("work item not found: {0}")]
    WorkItemNotFound(WorkItemId),

    /// A referenced net runner does not exist in the case.
    #[error("runner not found: {0}")]
    RunnerNotFound(CaseId),

    /// A repeated completion supplied a different output document.
    #[error("work item {item}: repeated completion with conflicting output")]
    CompletionConflict {
        /// The work item in question.
        item: WorkItemId,
    },

    /// A snapshot was produced by an incompatible schema version.
    #[error("snapshot schema {found} is not supported (expected {expected})")]
    SnapshotSchema {
        /// Version found in the byte stream.
        found: u32,
        /// Version this build reads.
        expected: u32,
    },

    /// A serialization or deserialization failure.
    #[error("serialization: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use mizzen_core::NodeId;

    #[test]
    fn transition_error_names_states() {
        let err = ExecutionError::InvalidWorkItemTransition {
            item: "1:approve".parse().unwrap(),
            from: "completed".into(),
            to: "executing".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("completed"));
        assert!(msg.contains("executing"));
        assert!(msg.contains("1:approve"));
    }

    #[test]
    fn underflow_names_node() {
        let err = ExecutionError::TokenUnderflow {
            node: NodeId::new("c1"),
        };
        assert!(err.to_string().contains("c1"));
    }

    #[test]
    fn from_serde_error() {
        let serde_err = serde_json::from_str::<String>("nope").unwrap_err();
        let err = ExecutionError::from(serde_err);
        assert!(err.to_string().starts_with("serialization:"));
    }
}
