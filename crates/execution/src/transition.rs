//! State machine transition validation for cases and work items.

use mizzen_core::{CaseId, WorkItemId};

use crate::error::ExecutionError;
use crate::status::{CaseStatus, WorkItemStatus};

/// Returns `true` if the work item transition from `from` to `to` is valid.
#[must_use]
pub fn can_transition_work_item(from: WorkItemStatus, to: WorkItemStatus) -> bool {
    use WorkItemStatus as S;
    matches!(
        (from, to),
        (S::Enabled, S::Fired)
            | (S::Enabled, S::Cancelled)
            | (S::Enabled, S::Deadlocked)
            | (S::Fired, S::Executing)
            | (S::Fired, S::Completed)
            | (S::Fired, S::Failed)
            | (S::Fired, S::Cancelled)
            | (S::Fired, S::Deadlocked)
            | (S::Executing, S::Completed)
            | (S::Executing, S::Failed)
            | (S::Executing, S::Suspended)
            | (S::Executing, S::Cancelled)
            | (S::Executing, S::Deadlocked)
            | (S::Suspended, S::Executing)
            | (S::Suspended, S::Cancelled)
            | (S::Suspended, S::Deadlocked)
    )
}

/// Validate a work item transition, returning an error naming both states.
pub fn validate_work_item_transition(
    item: &WorkItemId,
    from: WorkItemStatus,
    to: WorkItemStatus,
) -> Result<(), ExecutionError> {
    if can_transition_work_item(from, to) {
        Ok(())
    } else {
        Err(ExecutionError::InvalidWorkItemTransition {
            item: item.clone(),
            from: from.to_string(),
            to: to.to_string(),
        })
    }
}

/// Returns `true` if the case transition from `from` to `to` is valid.
#[must_use]
pub fn can_transition_case(from: CaseStatus, to: CaseStatus) -> bool {
    use CaseStatus as S;
    matches!(
        (from, to),
        (S::Running, S::Suspended)
            | (S::Running, S::Completed)
            | (S::Running, S::Cancelled)
            | (S::Running, S::Deadlocked)
            | (S::Suspended, S::Running)
            | (S::Suspended, S::Cancelled)
            | (S::Deadlocked, S::Cancelled)
    )
}

/// Validate a case transition, returning an error naming both states.
pub fn validate_case_transition(
    case: &CaseId,
    from: CaseStatus,
    to: CaseStatus,
) -> Result<(), ExecutionError> {
    if can_transition_case(from, to) {
        Ok(())
    } else {
        Err(ExecutionError::InvalidCaseTransition {
            case: case.clone(),
            from: from.to_string(),
            to: to.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(WorkItemStatus::Enabled, WorkItemStatus::Fired)]
    #[case(WorkItemStatus::Enabled, WorkItemStatus::Cancelled)]
    #[case(WorkItemStatus::Fired, WorkItemStatus::Executing)]
    #[case(WorkItemStatus::Fired, WorkItemStatus::Completed)]
    #[case(WorkItemStatus::Fired, WorkItemStatus::Failed)]
    #[case(WorkItemStatus::Executing, WorkItemStatus::Completed)]
    #[case(WorkItemStatus::Executing, WorkItemStatus::Suspended)]
    #[case(WorkItemStatus::Suspended, WorkItemStatus::Executing)]
    #[case(WorkItemStatus::Suspended, WorkItemStatus::Cancelled)]
    fn valid_work_item_transitions(#[case] from: WorkItemStatus, #[case] to: WorkItemStatus) {
        assert!(can_transition_work_item(from, to), "{from} -> {to}");
    }

    #[rstest]
    #[case(WorkItemStatus::Enabled, WorkItemStatus::Executing)]
    #[case(WorkItemStatus::Enabled, WorkItemStatus::Completed)]
    #[case(WorkItemStatus::Enabled, WorkItemStatus::Suspended)]
    #[case(WorkItemStatus::Completed, WorkItemStatus::Executing)]
    #[case(WorkItemStatus::Cancelled, WorkItemStatus::Fired)]
    #[case(WorkItemStatus::Failed, WorkItemStatus::Completed)]
    #[case(WorkItemStatus::Deadlocked, WorkItemStatus::Fired)]
    #[case(WorkItemStatus::Fired, WorkItemStatus::Suspended)]
    fn invalid_work_item_transitions(#[case] from: WorkItemStatus, #[case] to: WorkItemStatus) {
        assert!(!can_transition_work_item(from, to), "{from} -> {to}");
    }

    #[test]
    fn terminal_states_admit_nothing() {
        use WorkItemStatus as S;
        for from in [S::Completed, S::Failed, S::Cancelled, S::Deadlocked] {
            for to in [
                S::Enabled,
                S::Fired,
                S::Executing,
                S::Suspended,
                S::Completed,
                S::Failed,
                S::Cancelled,
                S::Deadlocked,
            ] {
                assert!(!can_transition_work_item(from, to), "{from} -> {to}");
            }
        }
    }

    #[rstest]
    #[case(CaseStatus::Running, CaseStatus::Completed)]
    #[case(CaseStatus::Running, CaseStatus::Suspended)]
    #[case(CaseStatus::Running, CaseStatus::Deadlocked)]
    #[case(CaseStatus::Suspended, CaseStatus::Running)]
    #[case(CaseStatus::Deadlocked, CaseStatus::Cancelled)]
    fn valid_case_transitions(#[case] from: CaseStatus, #[case] to: CaseStatus) {
        assert!(can_transition_case(from, to));
    }

    #[rstest]
    #[case(CaseStatus::Completed, CaseStatus::Running)]
    #[case(CaseStatus::Cancelled, CaseStatus::Running)]
    #[case(CaseStatus::Suspended, CaseStatus::Completed)]
    #[case(CaseStatus::Deadlocked, CaseStatus::Running)]
    fn invalid_case_transitions(#[case] from: CaseStatus, #[case] to: CaseStatus) {
        assert!(!can_transition_case(from, to));
    }

    #[test]
    fn validate_names_both_states() {
        let item: WorkItemId = "1:a".parse().unwrap();
        let err = validate_work_item_transition(
            &item,
            WorkItemStatus::Completed,
            WorkItemStatus::Fired,
        )
        .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("completed") && msg.contains("fired"));
    }
}
