//! A single level of the workflow graph: one input condition, one output
//! condition, and internal tasks/conditions wired by flows.
//!
//! The graph is stored as flat tables keyed by node id plus a flow list —
//! no owning object references, so the runtime heap stays cycle-free.
//! Flows are kept sorted by `(rank, source, target)` at construction, so
//! every filtered view iterates deterministically.

use indexmap::IndexMap;
use mizzen_core::{NetId, NodeId};
use serde::{Deserialize, Serialize};

use crate::flow::Flow;
use crate::task::Task;

/// A passive node holding tokens awaiting a downstream task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Condition {
    /// Node identifier, unique within the net.
    pub id: NodeId,
    /// Whether this condition was synthesized to normalize a task-to-task
    /// flow rather than authored explicitly.
    #[serde(default)]
    pub implicit: bool,
}

impl Condition {
    /// An explicit (authored) condition.
    #[must_use]
    pub fn new(id: impl Into<NodeId>) -> Self {
        Self {
            id: id.into(),
            implicit: false,
        }
    }
}

/// A named net: boundary conditions, internal nodes, and flows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Net {
    /// Net identifier, unique within the specification.
    pub id: NetId,
    /// The distinguished input condition.
    pub input: NodeId,
    /// The distinguished output condition.
    pub output: NodeId,
    tasks: IndexMap<NodeId, Task>,
    conditions: IndexMap<NodeId, Condition>,
    flows: Vec<Flow>,
}

impl Net {
    /// Assemble a net from its parts. Flows are re-sorted into canonical
    /// `(rank, source, target)` order; callers normally go through
    /// [`NetBuilder`](crate::builder::NetBuilder) instead.
    #[must_use]
    pub fn new(
        id: NetId,
        input: NodeId,
        output: NodeId,
        tasks: IndexMap<NodeId, Task>,
        conditions: IndexMap<NodeId, Condition>,
        mut flows: Vec<Flow>,
    ) -> Self {
        flows.sort_by(|a, b| {
            (a.rank, &a.source, &a.target).cmp(&(b.rank, &b.source, &b.target))
        });
        Self {
            id,
            input,
            output,
            tasks,
            conditions,
            flows,
        }
    }

    /// Look up a task by id.
    #[must_use]
    pub fn task(&self, id: &NodeId) -> Option<&Task> {
        self.tasks.get(id)
    }

    /// Look up a condition by id.
    #[must_use]
    pub fn condition(&self, id: &NodeId) -> Option<&Condition> {
        self.conditions.get(id)
    }

    /// Returns `true` if `id` names a task in this net.
    #[must_use]
    pub fn is_task(&self, id: &NodeId) -> bool {
        self.tasks.contains_key(id)
    }

    /// Returns `true` if `id` names a condition in this net.
    #[must_use]
    pub fn is_condition(&self, id: &NodeId) -> bool {
        self.conditions.contains_key(id)
    }

    /// Returns `true` if `id` names any node in this net.
    #[must_use]
    pub fn contains(&self, id: &NodeId) -> bool {
        self.is_task(id) || self.is_condition(id)
    }

    /// All tasks, in declaration order.
    pub fn tasks(&self) -> impl Iterator<Item = &Task> {
        self.tasks.values()
    }

    /// All conditions, in declaration order.
    pub fn conditions(&self) -> impl Iterator<Item = &Condition> {
        self.conditions.values()
    }

    /// All flows, in canonical order.
    #[must_use]
    pub fn flows(&self) -> &[Flow] {
        &self.flows
    }

    /// Flows leaving `node`, in canonical rank order.
    pub fn flows_out<'a>(&'a self, node: &'a NodeId) -> impl Iterator<Item = &'a Flow> {
        self.flows.iter().filter(move |f| &f.source == node)
    }

    /// Flows entering `node`, in canonical rank order.
    pub fn flows_in<'a>(&'a self, node: &'a NodeId) -> impl Iterator<Item = &'a Flow> {
        self.flows.iter().filter(move |f| &f.target == node)
    }

    /// The preset of `node`: sources of its incoming flows.
    #[must_use]
    pub fn preset<'a>(&'a self, node: &'a NodeId) -> Vec<&'a NodeId> {
        self.flows_in(node).map(|f| &f.source).collect()
    }

    /// The postset of `node`: targets of its outgoing flows.
    #[must_use]
    pub fn postset<'a>(&'a self, node: &'a NodeId) -> Vec<&'a NodeId> {
        self.flows_out(node).map(|f| &f.target).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn two_task_net() -> Net {
        let mut tasks = IndexMap::new();
        tasks.insert(NodeId::new("a"), Task::atomic("a"));
        tasks.insert(NodeId::new("b"), Task::atomic("b"));
        let mut conditions = IndexMap::new();
        for id in ["i", "m", "o"] {
            conditions.insert(NodeId::new(id), Condition::new(id));
        }
        let flows = vec![
            Flow::new("m", "b"),
            Flow::new("i", "a"),
            Flow::new("a", "m"),
            Flow::new("b", "o"),
        ];
        Net::new(
            NetId::new("root"),
            NodeId::new("i"),
            NodeId::new("o"),
            tasks,
            conditions,
            flows,
        )
    }

    #[test]
    fn lookups() {
        let net = two_task_net();
        assert!(net.is_task(&NodeId::new("a")));
        assert!(net.is_condition(&NodeId::new("m")));
        assert!(!net.contains(&NodeId::new("zzz")));
        assert!(net.task(&NodeId::new("m")).is_none());
    }

    #[test]
    fn flows_are_canonically_ordered() {
        let net = two_task_net();
        let order: Vec<_> = net
            .flows()
            .iter()
            .map(|f| (f.source.as_str(), f.target.as_str()))
            .collect();
        // Same rank everywhere, so lexicographic (source, target).
        assert_eq!(order, vec![("a", "m"), ("b", "o"), ("i", "a"), ("m", "b")]);
    }

    #[test]
    fn rank_dominates_ordering() {
        let mut tasks = IndexMap::new();
        tasks.insert(NodeId::new("t"), Task::atomic("t"));
        let mut conditions = IndexMap::new();
        for id in ["i", "o", "x", "y"] {
            conditions.insert(NodeId::new(id), Condition::new(id));
        }
        let flows = vec![
            Flow::new("t", "y").with_rank(0),
            Flow::new("t", "x").with_rank(1),
            Flow::new("i", "t"),
        ];
        let net = Net::new(
            NetId::new("n"),
            NodeId::new("i"),
            NodeId::new("o"),
            tasks,
            conditions,
            flows,
        );
        let t = NodeId::new("t");
        let targets: Vec<_> = net.flows_out(&t).map(|f| f.target.as_str()).collect();
        assert_eq!(targets, vec!["y", "x"]);
    }

    #[test]
    fn preset_and_postset() {
        let net = two_task_net();
        assert_eq!(net.preset(&NodeId::new("b")), vec![&NodeId::new("m")]);
        assert_eq!(net.postset(&NodeId::new("a")), vec![&NodeId::new("m")]);
    }

    #[test]
    fn serde_roundtrip() {
        let net = two_task_net();
        let json = serde_json::to_string(&net).unwrap();
        let back: Net = serde_json::from_str(&json).unwrap();
        assert_eq!(back, net);
    }
}
