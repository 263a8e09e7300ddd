//! Specification validation errors.

use mizzen_core::{NetId, NodeId};
use thiserror::Error;

/// Errors surfaced when a specification fails load-time validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SpecError {
    /// The declared root net is not present in the net table.
    #[error("root net not found: {0}")]
    RootNetNotFound(NetId),

    /// A net's input or output condition is missing from its node table.
    #[error("net {net}: boundary condition {node} is not declared")]
    MissingBoundary {
        /// The net in question.
        net: NetId,
        /// The undeclared boundary condition.
        node: NodeId,
    },

    /// A flow references a node that does not exist in the net.
    #[error("net {net}: flow references unknown node {node}")]
    UnknownFlowNode {
        /// The net in question.
        net: NetId,
        /// The unknown endpoint.
        node: NodeId,
    },

    /// The net's input condition has an incoming flow, or the output
    /// condition has an outgoing flow.
    #[error("net {net}: boundary condition {node} has a flow on the wrong side")]
    BoundaryFlow {
        /// The net in question.
        net: NetId,
        /// The offending boundary condition.
        node: NodeId,
    },

    /// A flow connects two conditions directly.
    #[error("net {net}: flow {flow_source} -> {target} connects two conditions")]
    ConditionToCondition {
        /// The net in question.
        net: NetId,
        /// Flow source.
        flow_source: NodeId,
        /// Flow target.
        target: NodeId,
    },

    /// An XOR/OR split branch has no predicate and is not the default.
    #[error("net {net}: task {task} split branch to {target} has no predicate and is not the default")]
    UnpredicatedBranch {
        /// The net in question.
        net: NetId,
        /// The splitting task.
        task: NodeId,
        /// The unpredicated branch target.
        target: NodeId,
    },

    /// A split declares more than one default branch.
    #[error("net {net}: task {task} declares multiple default branches")]
    MultipleDefaults {
        /// The net in question.
        net: NetId,
        /// The splitting task.
        task: NodeId,
    },

    /// A task's composite decomposition names a net that does not exist.
    #[error("net {net}: task {task} decomposes to unknown net {subnet}")]
    UnknownSubNet {
        /// The net in question.
        net: NetId,
        /// The composite task.
        task: NodeId,
        /// The missing sub-net.
        subnet: NetId,
    },

    /// A cancellation region entry names a node that does not exist.
    #[error("net {net}: task {task} cancellation region references unknown node {node}")]
    UnknownRegionNode {
        /// The net in question.
        net: NetId,
        /// The owning task.
        task: NodeId,
        /// The unknown region entry.
        node: NodeId,
    },

    /// A multi-instance block is internally inconsistent.
    #[error("net {net}: task {task} multi-instance bounds are inconsistent: {reason}")]
    InvalidMultiInstance {
        /// The net in question.
        net: NetId,
        /// The multi-instance task.
        task: NodeId,
        /// Human-readable description of the inconsistency.
        reason: String,
    },

    /// Two nodes in the same net share an identifier.
    #[error("net {net}: duplicate node id {node}")]
    DuplicateNode {
        /// The net in question.
        net: NetId,
        /// The duplicated identifier.
        node: NodeId,
    },
}
