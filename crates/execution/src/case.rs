//! The mutable state of one case: runner stack, work item registry, data
//! document, and flags.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use mizzen_core::{CaseId, NetId, SpecKey, WorkItemId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ExecutionError;
use crate::marking::Marking;
use crate::status::CaseStatus;
use crate::transition::validate_case_transition;
use crate::work_item::WorkItem;

/// One running net instance: the root net, or a sub-net expanded by a
/// composite work item.
///
/// A runner is identified by a case id: the root runner by the case's own
/// id, sub-net runners by child ids (`"7.1"`, `"7.1.2"`). Work item ids
/// carry their runner's case id, which is how completions find their way
/// back to the right marking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunnerState {
    /// This runner's identity within the case tree.
    pub case_id: CaseId,
    /// The net this runner executes.
    pub net: NetId,
    /// Token positions.
    pub marking: Marking,
    /// The composite work item that expanded this runner, if any.
    #[serde(default)]
    pub parent: Option<WorkItemId>,
}

impl RunnerState {
    /// A fresh runner with an empty marking.
    #[must_use]
    pub fn new(case_id: CaseId, net: NetId, parent: Option<WorkItemId>) -> Self {
        Self {
            case_id,
            net,
            marking: Marking::new(),
            parent,
        }
    }
}

/// The complete mutable runtime state of a case.
///
/// Everything here is serializable; [`CaseSnapshot`](crate::snapshot::CaseSnapshot)
/// wraps the whole struct for export/import.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseState {
    /// Root case identifier.
    pub id: CaseId,
    /// The specification this case executes.
    pub spec: SpecKey,
    /// Case lifecycle status.
    pub status: CaseStatus,
    /// The case data document.
    pub data: Value,
    /// Active runners, root first; sub-net runners stack behind their
    /// ancestors.
    pub runners: Vec<RunnerState>,
    /// Every work item ever created for this case, live and terminal.
    pub work_items: IndexMap<WorkItemId, WorkItem>,
    /// Set while a case cancel is tearing things down.
    #[serde(default)]
    pub cancelling: bool,
    /// When the case was launched.
    pub launched_at: DateTime<Utc>,
    /// When the case reached a terminal status or deadlock.
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
    /// Counter for child runner ids.
    #[serde(default)]
    pub next_child: u64,
}

impl CaseState {
    /// A fresh running case with no runners yet.
    #[must_use]
    pub fn new(id: CaseId, spec: SpecKey, data: Value) -> Self {
        Self {
            id,
            spec,
            status: CaseStatus::Running,
            data,
            runners: Vec::new(),
            work_items: IndexMap::new(),
            cancelling: false,
            launched_at: Utc::now(),
            finished_at: None,
            next_child: 1,
        }
    }

    /// Allocate the next child runner id.
    pub fn next_child_id(&mut self, parent: &CaseId) -> CaseId {
        let id = parent.child(self.next_child);
        self.next_child += 1;
        id
    }

    /// Look up a runner by its case id.
    #[must_use]
    pub fn runner(&self, case_id: &CaseId) -> Option<&RunnerState> {
        self.runners.iter().find(|r| &r.case_id == case_id)
    }

    /// Mutable runner lookup.
    pub fn runner_mut(&mut self, case_id: &CaseId) -> Option<&mut RunnerState> {
        self.runners.iter_mut().find(|r| &r.case_id == case_id)
    }

    /// Runner lookup that errors when absent.
    pub fn require_runner_mut(
        &mut self,
        case_id: &CaseId,
    ) -> Result<&mut RunnerState, ExecutionError> {
        self.runner_mut(case_id)
            .ok_or_else(|| ExecutionError::RunnerNotFound(case_id.clone()))
    }

    /// Remove a runner from the stack, returning it.
    pub fn remove_runner(&mut self, case_id: &CaseId) -> Option<RunnerState> {
        let pos = self.runners.iter().position(|r| &r.case_id == case_id)?;
        Some(self.runners.remove(pos))
    }

    /// The root runner, if the case has started.
    #[must_use]
    pub fn root_runner(&self) -> Option<&RunnerState> {
        self.runners.first()
    }

    /// Work item lookup.
    #[must_use]
    pub fn work_item(&self, id: &WorkItemId) -> Option<&WorkItem> {
        self.work_items.get(id)
    }

    /// Mutable work item lookup.
    pub fn work_item_mut(&mut self, id: &WorkItemId) -> Option<&mut WorkItem> {
        self.work_items.get_mut(id)
    }

    /// Work item lookup that errors when absent.
    pub fn require_work_item_mut(
        &mut self,
        id: &WorkItemId,
    ) -> Result<&mut WorkItem, ExecutionError> {
        self.work_items
            .get_mut(id)
            .ok_or_else(|| ExecutionError::WorkItemNotFound(id.clone()))
    }

    /// Register a new work item.
    pub fn insert_work_item(&mut self, item: WorkItem) {
        self.work_items.insert(item.id.clone(), item);
    }

    /// Live work items, in creation order.
    pub fn live_items(&self) -> impl Iterator<Item = &WorkItem> {
        self.work_items.values().filter(|wi| wi.is_live())
    }

    /// Returns `true` if any work item is still live.
    #[must_use]
    pub fn has_live_items(&self) -> bool {
        self.live_items().next().is_some()
    }

    /// Live work items belonging to one runner.
    pub fn live_items_of_runner<'a>(
        &'a self,
        case_id: &'a CaseId,
    ) -> impl Iterator<Item = &'a WorkItem> {
        self.live_items().filter(move |wi| &wi.id.case == case_id)
    }

    /// Validated case status transition with timestamp bookkeeping.
    pub fn transition_status(&mut self, to: CaseStatus) -> Result<(), ExecutionError> {
        validate_case_transition(&self.id, self.status, to)?;
        self.status = to;
        if to.is_terminal() || to == CaseStatus::Deadlocked {
            self.finished_at = Some(Utc::now());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn case() -> CaseState {
        CaseState::new(
            CaseId::root(1),
            SpecKey::new("http://example.org/s", "1"),
            json!({"data": {}}),
        )
    }

    #[test]
    fn new_case_is_running() {
        let case = case();
        assert_eq!(case.status, CaseStatus::Running);
        assert!(case.runners.is_empty());
        assert!(!case.has_live_items());
    }

    #[test]
    fn child_ids_increment() {
        let mut case = case();
        let root = case.id.clone();
        assert_eq!(case.next_child_id(&root).as_str(), "1.1");
        assert_eq!(case.next_child_id(&root).as_str(), "1.2");
        let nested = "1.1".parse().unwrap();
        assert_eq!(case.next_child_id(&nested).as_str(), "1.1.3");
    }

    #[test]
    fn runner_stack_push_find_remove() {
        let mut case = case();
        let root = case.id.clone();
        case.runners
            .push(RunnerState::new(root.clone(), NetId::new("root"), None));
        let child_id = case.next_child_id(&root);
        case.runners.push(RunnerState::new(
            child_id.clone(),
            NetId::new("sub"),
            None,
        ));

        assert_eq!(case.root_runner().unwrap().net, NetId::new("root"));
        assert!(case.runner(&child_id).is_some());

        let removed = case.remove_runner(&child_id).unwrap();
        assert_eq!(removed.net, NetId::new("sub"));
        assert!(case.runner(&child_id).is_none());
    }

    #[test]
    fn require_runner_errors_when_missing() {
        let mut case = case();
        let ghost: CaseId = "9.9".parse().unwrap();
        assert!(matches!(
            case.require_runner_mut(&ghost),
            Err(ExecutionError::RunnerNotFound(_))
        ));
    }

    #[test]
    fn live_items_filtering() {
        let mut case = case();
        let a = WorkItem::enabled("1:a".parse().unwrap(), json!({}));
        let mut b = WorkItem::enabled("1:b".parse().unwrap(), json!({}));
        b.fire(None).unwrap();
        b.complete(json!({})).unwrap();
        case.insert_work_item(a);
        case.insert_work_item(b);

        let live: Vec<_> = case.live_items().map(|wi| wi.id.to_string()).collect();
        assert_eq!(live, vec!["1:a"]);
        assert!(case.has_live_items());
    }

    #[test]
    fn live_items_of_runner_partitions_by_case() {
        let mut case = case();
        case.insert_work_item(WorkItem::enabled("1:a".parse().unwrap(), json!({})));
        case.insert_work_item(WorkItem::enabled("1.1:b".parse().unwrap(), json!({})));

        let sub: CaseId = "1.1".parse().unwrap();
        let of_sub: Vec<_> = case
            .live_items_of_runner(&sub)
            .map(|wi| wi.id.to_string())
            .collect();
        assert_eq!(of_sub, vec!["1.1:b"]);
    }

    #[test]
    fn status_transitions_stamp_finish() {
        let mut case1 = case();
        let mut case2 = case();
        case1.transition_status(CaseStatus::Completed).unwrap();
        assert!(case1.finished_at.is_some());

        case2.transition_status(CaseStatus::Deadlocked).unwrap();
        assert!(case2.finished_at.is_some());
    }

    #[test]
    fn illegal_status_transition_rejected() {
        let mut case = case();
        case.transition_status(CaseStatus::Completed).unwrap();
        let err = case.transition_status(CaseStatus::Running).unwrap_err();
        assert!(matches!(err, ExecutionError::InvalidCaseTransition { .. }));
    }

    #[test]
    fn serde_roundtrip() {
        let mut case = case();
        case.runners
            .push(RunnerState::new(case.id.clone(), NetId::new("root"), None));
        case.insert_work_item(WorkItem::enabled("1:a".parse().unwrap(), json!({"k": 1})));
        let json = serde_json::to_string(&case).unwrap();
        let back: CaseState = serde_json::from_str(&json).unwrap();
        assert_eq!(back, case);
    }
}
