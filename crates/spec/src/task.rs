//! Task attributes: split/join behaviour, decomposition, multi-instance
//! bounds, cancellation region, timers, and data mappings.

use mizzen_core::{NetId, NodeId};
use serde::{Deserialize, Serialize};

/// How a task emits tokens on its outgoing flows when it completes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SplitType {
    /// Emit one token on every outgoing flow.
    #[default]
    And,
    /// Emit one token on the first branch whose predicate holds, else the default.
    Xor,
    /// Emit one token on every branch whose predicate holds, else the default.
    Or,
}

/// What a task requires on its incoming flows before it can fire.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinType {
    /// Every incoming flow's source must hold a token.
    #[default]
    And,
    /// Any one incoming flow's source must hold a token; exactly one is consumed.
    Xor,
    /// At least one token present, and no further token can ever arrive
    /// (informed semantics — see the engine's OR-join analysis).
    Or,
}

/// The body of a task.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decomposition {
    /// A routing task: fires and completes in the same step, no work item.
    #[default]
    None,
    /// An atomic task handled by an external resource. The handler reference
    /// is an opaque hint for the dispatching service.
    Atomic {
        /// External handler reference, if any.
        handler: Option<String>,
    },
    /// A composite task: fires by instantiating the named sub-net.
    SubNet(NetId),
}

impl Decomposition {
    /// Returns `true` for the routing (empty) decomposition.
    #[must_use]
    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }
}

/// When multi-instance children are created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CreationMode {
    /// All children spawn when the task fires.
    #[default]
    Static,
    /// Children may be added during execution, up to `max`.
    Dynamic,
}

/// What happens to still-running children once the completion threshold is met.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContinuationPolicy {
    /// Remaining children are force-cancelled.
    #[default]
    Cancel,
    /// Remaining children run to completion; their output is discarded.
    Continue,
}

/// Multi-instance attributes of a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultiInstance {
    /// Minimum number of children to spawn at fire time.
    pub min: u32,
    /// Maximum number of children over the task's lifetime.
    pub max: u32,
    /// Number of completed children at which the task completes.
    pub threshold: u32,
    /// Static or dynamic child creation.
    #[serde(default)]
    pub creation: CreationMode,
    /// Policy for children still running at threshold.
    #[serde(default)]
    pub continuation: ContinuationPolicy,
    /// Expression extracting the input collection from the case document.
    pub accessor: String,
    /// Expression deriving each child's input from an element, bound as `item`.
    /// Absent: the element itself is the child input.
    #[serde(default)]
    pub splitter: Option<String>,
    /// Expression combining children's outputs, bound as `items`.
    /// Absent: the output is the raw list.
    #[serde(default)]
    pub aggregator: Option<String>,
    /// Aggregate in creation-index order instead of completion order.
    #[serde(default)]
    pub ordered_by_creation: bool,
}

impl MultiInstance {
    /// A minimal block spawning one child per element of `accessor`, with
    /// the threshold equal to `max`.
    #[must_use]
    pub fn over(accessor: impl Into<String>, max: u32) -> Self {
        Self {
            min: 1,
            max,
            threshold: max,
            creation: CreationMode::Static,
            continuation: ContinuationPolicy::Cancel,
            accessor: accessor.into(),
            splitter: None,
            aggregator: None,
            ordered_by_creation: false,
        }
    }

    /// Override the completion threshold.
    #[must_use]
    pub fn with_threshold(mut self, threshold: u32) -> Self {
        self.threshold = threshold;
        self
    }

    /// Override the continuation policy.
    #[must_use]
    pub fn with_continuation(mut self, policy: ContinuationPolicy) -> Self {
        self.continuation = policy;
        self
    }

    /// Switch to dynamic child creation.
    #[must_use]
    pub fn dynamic(mut self) -> Self {
        self.creation = CreationMode::Dynamic;
        self
    }
}

/// When a task timer starts counting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimerTrigger {
    /// The timer starts when the work item becomes enabled.
    OnEnablement,
    /// The timer starts when the work item is fired (checked out).
    OnFiring,
}

/// What happens when a task timer expires.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpiryPolicy {
    /// Cancel the work item quietly; only the timer event is announced.
    ExpireSilently,
    /// Complete the work item with the given default output document.
    CompleteWithDefault(serde_json::Value),
    /// Fail the work item and run the exception hook.
    RaiseException,
}

/// Timer attributes of a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimerSpec {
    /// When the countdown starts.
    pub trigger: TimerTrigger,
    /// Countdown duration in milliseconds.
    pub delay_ms: u64,
    /// Expiry behaviour.
    pub policy: ExpiryPolicy,
}

/// Data mapping between the case document and a task's work items.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataMapping {
    /// Expression computing the work item input from the case document.
    /// Absent: the whole document is passed.
    #[serde(default)]
    pub input: Option<String>,
    /// Dot-path in the case document where the output is written.
    /// Absent: top-level object merge.
    #[serde(default)]
    pub output_target: Option<String>,
}

/// An active node: fires when its join precondition holds, runs its
/// decomposition, and emits tokens per its split behaviour.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Node identifier, unique within the net.
    pub id: NodeId,
    /// Split behaviour on completion.
    #[serde(default)]
    pub split: SplitType,
    /// Join precondition for firing.
    #[serde(default)]
    pub join: JoinType,
    /// The task body.
    #[serde(default)]
    pub decomposition: Decomposition,
    /// Multi-instance attributes, if any.
    #[serde(default)]
    pub multi_instance: Option<MultiInstance>,
    /// Nodes whose tokens and work items are removed when this task fires
    /// its outputs.
    #[serde(default)]
    pub cancellation_region: Vec<NodeId>,
    /// Timer attributes, if any.
    #[serde(default)]
    pub timer: Option<TimerSpec>,
    /// Input/output data mapping.
    #[serde(default)]
    pub mapping: DataMapping,
    /// Resourcing hint (queue/role) for the worklist service. Tasks without
    /// one are eligible for automatic firing.
    #[serde(default)]
    pub resourcing: Option<String>,
}

impl Task {
    /// A plain AND/AND atomic task with no handler reference.
    #[must_use]
    pub fn atomic(id: impl Into<NodeId>) -> Self {
        Self {
            id: id.into(),
            split: SplitType::And,
            join: JoinType::And,
            decomposition: Decomposition::Atomic { handler: None },
            multi_instance: None,
            cancellation_region: Vec::new(),
            timer: None,
            mapping: DataMapping::default(),
            resourcing: None,
        }
    }

    /// A routing task: no decomposition, completes in the firing step.
    #[must_use]
    pub fn routing(id: impl Into<NodeId>) -> Self {
        Self {
            decomposition: Decomposition::None,
            ..Self::atomic(id)
        }
    }

    /// Returns `true` if this task expands a sub-net.
    #[must_use]
    pub fn is_composite(&self) -> bool {
        matches!(self.decomposition, Decomposition::SubNet(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn defaults_are_and_and() {
        let task = Task::atomic("a");
        assert_eq!(task.split, SplitType::And);
        assert_eq!(task.join, JoinType::And);
        assert!(!task.is_composite());
    }

    #[test]
    fn routing_task_has_no_decomposition() {
        let task = Task::routing("merge");
        assert!(task.decomposition.is_none());
    }

    #[test]
    fn multi_instance_builder_defaults() {
        let mi = MultiInstance::over("data.items", 5);
        assert_eq!(mi.min, 1);
        assert_eq!(mi.max, 5);
        assert_eq!(mi.threshold, 5);
        assert_eq!(mi.creation, CreationMode::Static);
        assert_eq!(mi.continuation, ContinuationPolicy::Cancel);
    }

    #[test]
    fn multi_instance_overrides() {
        let mi = MultiInstance::over("data.items", 5)
            .with_threshold(3)
            .with_continuation(ContinuationPolicy::Continue)
            .dynamic();
        assert_eq!(mi.threshold, 3);
        assert_eq!(mi.continuation, ContinuationPolicy::Continue);
        assert_eq!(mi.creation, CreationMode::Dynamic);
    }

    #[test]
    fn split_type_serde_snake_case() {
        assert_eq!(serde_json::to_string(&SplitType::Xor).unwrap(), "\"xor\"");
        assert_eq!(serde_json::to_string(&JoinType::Or).unwrap(), "\"or\"");
    }

    #[test]
    fn task_serde_roundtrip() {
        let mut task = Task::atomic("review");
        task.split = SplitType::Or;
        task.multi_instance = Some(MultiInstance::over("data.reviewers", 3));
        task.timer = Some(TimerSpec {
            trigger: TimerTrigger::OnEnablement,
            delay_ms: 60_000,
            policy: ExpiryPolicy::ExpireSilently,
        });
        let json = serde_json::to_string(&task).unwrap();
        let back: Task = serde_json::from_str(&json).unwrap();
        assert_eq!(back, task);
    }
}
