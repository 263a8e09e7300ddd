//! Fluent construction of specifications.
//!
//! The builder is the normalization point: flows declared directly between
//! two tasks are rewritten through a synthesized implicit condition
//! (`"a->b"`), so the built [`Net`] is strictly bipartite and the runner
//! only ever moves tokens between conditions and tasks. Flow ranks default
//! to declaration order per source node.

use indexmap::IndexMap;
use mizzen_core::{NetId, NodeId, SpecKey};

use crate::error::SpecError;
use crate::flow::Flow;
use crate::net::{Condition, Net};
use crate::specification::Specification;
use crate::task::{
    DataMapping, Decomposition, JoinType, MultiInstance, SplitType, Task, TimerSpec,
};

/// Builder for a [`Task`].
#[derive(Debug, Clone)]
pub struct TaskBuilder {
    task: Task,
}

impl TaskBuilder {
    /// An atomic task (external work item) with AND split/join.
    #[must_use]
    pub fn atomic(id: impl Into<NodeId>) -> Self {
        Self {
            task: Task::atomic(id),
        }
    }

    /// A routing task: completes within the firing step, no work item.
    #[must_use]
    pub fn routing(id: impl Into<NodeId>) -> Self {
        Self {
            task: Task::routing(id),
        }
    }

    /// A composite task decomposing to the named sub-net.
    #[must_use]
    pub fn composite(id: impl Into<NodeId>, subnet: impl Into<NetId>) -> Self {
        let mut task = Task::atomic(id);
        task.decomposition = Decomposition::SubNet(subnet.into());
        Self { task }
    }

    /// Set an external handler reference on an atomic task.
    #[must_use]
    pub fn handler(mut self, handler: impl Into<String>) -> Self {
        self.task.decomposition = Decomposition::Atomic {
            handler: Some(handler.into()),
        };
        self
    }

    /// Use an XOR split.
    #[must_use]
    pub fn xor_split(mut self) -> Self {
        self.task.split = SplitType::Xor;
        self
    }

    /// Use an OR split.
    #[must_use]
    pub fn or_split(mut self) -> Self {
        self.task.split = SplitType::Or;
        self
    }

    /// Use an XOR join.
    #[must_use]
    pub fn xor_join(mut self) -> Self {
        self.task.join = JoinType::Xor;
        self
    }

    /// Use an OR join.
    #[must_use]
    pub fn or_join(mut self) -> Self {
        self.task.join = JoinType::Or;
        self
    }

    /// Attach a multi-instance block.
    #[must_use]
    pub fn multi_instance(mut self, mi: MultiInstance) -> Self {
        self.task.multi_instance = Some(mi);
        self
    }

    /// Declare the cancellation region.
    #[must_use]
    pub fn cancels<I, S>(mut self, nodes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<NodeId>,
    {
        self.task.cancellation_region = nodes.into_iter().map(Into::into).collect();
        self
    }

    /// Attach a timer.
    #[must_use]
    pub fn timer(mut self, timer: TimerSpec) -> Self {
        self.task.timer = Some(timer);
        self
    }

    /// Set the input mapping expression.
    #[must_use]
    pub fn input_expr(mut self, expr: impl Into<String>) -> Self {
        self.task.mapping.input = Some(expr.into());
        self
    }

    /// Set the output mapping target path.
    #[must_use]
    pub fn output_target(mut self, path: impl Into<String>) -> Self {
        self.task.mapping.output_target = Some(path.into());
        self
    }

    /// Set both halves of the data mapping at once.
    #[must_use]
    pub fn mapping(mut self, mapping: DataMapping) -> Self {
        self.task.mapping = mapping;
        self
    }

    /// Set the resourcing hint (disables automatic firing for this task).
    #[must_use]
    pub fn resourcing(mut self, hint: impl Into<String>) -> Self {
        self.task.resourcing = Some(hint.into());
        self
    }

    fn build(self) -> Task {
        self.task
    }
}

/// Builder for a [`Net`]. Boundary conditions default to `"in"`/`"out"`.
#[derive(Debug, Clone)]
pub struct NetBuilder {
    id: NetId,
    input: NodeId,
    output: NodeId,
    tasks: Vec<TaskBuilder>,
    conditions: Vec<NodeId>,
    flows: Vec<Flow>,
}

impl NetBuilder {
    /// Start a net with the default `"in"`/`"out"` boundary conditions.
    #[must_use]
    pub fn new(id: impl Into<NetId>) -> Self {
        Self {
            id: id.into(),
            input: NodeId::new("in"),
            output: NodeId::new("out"),
            tasks: Vec::new(),
            conditions: Vec::new(),
            flows: Vec::new(),
        }
    }

    /// Rename the input condition.
    #[must_use]
    pub fn input(mut self, id: impl Into<NodeId>) -> Self {
        self.input = id.into();
        self
    }

    /// Rename the output condition.
    #[must_use]
    pub fn output(mut self, id: impl Into<NodeId>) -> Self {
        self.output = id.into();
        self
    }

    /// Declare an explicit internal condition.
    #[must_use]
    pub fn condition(mut self, id: impl Into<NodeId>) -> Self {
        self.conditions.push(id.into());
        self
    }

    /// Add a task.
    #[must_use]
    pub fn task(mut self, task: TaskBuilder) -> Self {
        self.tasks.push(task);
        self
    }

    /// Add an unpredicated flow. Rank is the declaration index per source.
    #[must_use]
    pub fn flow(self, source: impl Into<NodeId>, target: impl Into<NodeId>) -> Self {
        self.push_flow(source.into(), target.into(), None, false)
    }

    /// Add a predicated flow (XOR/OR split branch).
    #[must_use]
    pub fn flow_if(
        self,
        source: impl Into<NodeId>,
        target: impl Into<NodeId>,
        predicate: impl Into<String>,
    ) -> Self {
        self.push_flow(source.into(), target.into(), Some(predicate.into()), false)
    }

    /// Add a default branch.
    #[must_use]
    pub fn flow_default(self, source: impl Into<NodeId>, target: impl Into<NodeId>) -> Self {
        self.push_flow(source.into(), target.into(), None, true)
    }

    fn push_flow(
        mut self,
        source: NodeId,
        target: NodeId,
        predicate: Option<String>,
        is_default: bool,
    ) -> Self {
        let rank = self.flows.iter().filter(|f| f.source == source).count() as u32;
        self.flows.push(Flow {
            source,
            target,
            predicate,
            is_default,
            rank,
        });
        self
    }

    /// Normalize and assemble the net.
    fn build(self) -> Net {
        let mut tasks: IndexMap<NodeId, Task> = IndexMap::new();
        for builder in self.tasks {
            let task = builder.build();
            tasks.insert(task.id.clone(), task);
        }

        let mut conditions: IndexMap<NodeId, Condition> = IndexMap::new();
        conditions.insert(self.input.clone(), Condition::new(self.input.clone()));
        conditions.insert(self.output.clone(), Condition::new(self.output.clone()));
        for id in self.conditions {
            conditions.insert(id.clone(), Condition::new(id));
        }

        // Rewrite task-to-task flows through implicit conditions so the net
        // is bipartite. The predicate and rank stay on the task-side edge.
        let mut flows = Vec::with_capacity(self.flows.len());
        for flow in self.flows {
            let both_tasks =
                tasks.contains_key(&flow.source) && tasks.contains_key(&flow.target);
            if both_tasks {
                let implicit = NodeId::new(format!("{}->{}", flow.source, flow.target));
                conditions
                    .entry(implicit.clone())
                    .or_insert_with(|| Condition {
                        id: implicit.clone(),
                        implicit: true,
                    });
                flows.push(Flow {
                    target: implicit.clone(),
                    ..flow.clone()
                });
                flows.push(Flow {
                    source: implicit,
                    target: flow.target,
                    predicate: None,
                    is_default: false,
                    rank: 0,
                });
            } else {
                flows.push(flow);
            }
        }

        Net::new(self.id, self.input, self.output, tasks, conditions, flows)
    }
}

/// Builder for a [`Specification`]. The root net defaults to the first
/// net added.
#[derive(Debug, Clone)]
pub struct SpecificationBuilder {
    key: SpecKey,
    root: Option<NetId>,
    nets: Vec<NetBuilder>,
    schema: Option<serde_json::Value>,
}

impl SpecificationBuilder {
    /// Start a specification with the given identity.
    #[must_use]
    pub fn new(uri: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            key: SpecKey::new(uri, version),
            root: None,
            nets: Vec::new(),
            schema: None,
        }
    }

    /// Name the root net explicitly.
    #[must_use]
    pub fn root(mut self, id: impl Into<NetId>) -> Self {
        self.root = Some(id.into());
        self
    }

    /// Attach a data schema reference.
    #[must_use]
    pub fn schema(mut self, schema: serde_json::Value) -> Self {
        self.schema = Some(schema);
        self
    }

    /// Add a net.
    #[must_use]
    pub fn net(mut self, net: NetBuilder) -> Self {
        self.nets.push(net);
        self
    }

    /// Normalize, validate, and produce the immutable specification.
    pub fn build(self) -> Result<Specification, SpecError> {
        let mut nets: IndexMap<NetId, Net> = IndexMap::new();
        let mut first: Option<NetId> = None;
        for builder in self.nets {
            let net = builder.build();
            first.get_or_insert_with(|| net.id.clone());
            nets.insert(net.id.clone(), net);
        }
        let root = self
            .root
            .or(first)
            .unwrap_or_else(|| NetId::new("root"));
        Specification::new(self.key, root, nets, self.schema)
    }
}
