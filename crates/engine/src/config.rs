//! Engine configuration.

use std::collections::HashMap;
use std::time::Duration;

use mizzen_core::NodeId;

use crate::exceptions::RdrTree;

/// How an OR-join decides it can fire.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OrJoinPolicy {
    /// Informed semantics: fire only when the residual-reachability
    /// analysis proves no further token can arrive.
    #[default]
    Informed,
    /// Operator override: fire as soon as any input is marked.
    Optimistic,
}

/// Tunable engine behaviour shared by both facade variants.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Fire work items immediately for tasks with no resourcing hint.
    pub automatic_firing: bool,
    /// State budget for one informed OR-join analysis. Exhausting it is
    /// answered conservatively: the join defers.
    pub or_join_scan_limit: usize,
    /// Per-task OR-join policy overrides.
    pub or_join_policies: HashMap<NodeId, OrJoinPolicy>,
    /// Idle window after which the stateless facade's eviction monitor
    /// hands a case snapshot to the eviction listener and drops the case.
    pub idle_timeout: Duration,
    /// How often the eviction monitor scans.
    pub eviction_scan_interval: Duration,
    /// How often the background timer pump checks for due timers.
    pub timer_tick_interval: Duration,
    /// Ripple-down exception rules applied on work item failure.
    pub exception_rules: Option<RdrTree>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            automatic_firing: false,
            or_join_scan_limit: 1024,
            or_join_policies: HashMap::new(),
            idle_timeout: Duration::from_secs(300),
            eviction_scan_interval: Duration::from_secs(30),
            timer_tick_interval: Duration::from_millis(250),
            exception_rules: None,
        }
    }
}

impl EngineConfig {
    /// The OR-join policy for a task.
    #[must_use]
    pub fn or_join_policy(&self, task: &NodeId) -> OrJoinPolicy {
        self.or_join_policies.get(task).copied().unwrap_or_default()
    }
}
