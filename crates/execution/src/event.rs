//! Lifecycle events distributed by the announcer.

use chrono::{DateTime, Utc};
use mizzen_core::{CaseId, SpecKey, WorkItemId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A lifecycle event. Events within one case are delivered in the order
/// the underlying transitions occurred.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EngineEvent {
    /// A case was launched.
    CaseLaunched {
        /// When the event occurred.
        timestamp: DateTime<Utc>,
        /// The launched case.
        case: CaseId,
        /// The specification it executes.
        spec: SpecKey,
    },

    /// A case completed normally.
    CaseCompleted {
        /// When the event occurred.
        timestamp: DateTime<Utc>,
        /// The completed case.
        case: CaseId,
    },

    /// A case was cancelled.
    CaseCancelled {
        /// When the event occurred.
        timestamp: DateTime<Utc>,
        /// The cancelled case.
        case: CaseId,
    },

    /// A case was suspended.
    CaseSuspended {
        /// When the event occurred.
        timestamp: DateTime<Utc>,
        /// The suspended case.
        case: CaseId,
    },

    /// A suspended case resumed.
    CaseResumed {
        /// When the event occurred.
        timestamp: DateTime<Utc>,
        /// The resumed case.
        case: CaseId,
    },

    /// A case can make no further progress and is not complete.
    CaseDeadlocked {
        /// When the event occurred.
        timestamp: DateTime<Utc>,
        /// The deadlocked case.
        case: CaseId,
    },

    /// A work item became enabled.
    WorkItemEnabled {
        /// When the event occurred.
        timestamp: DateTime<Utc>,
        /// The enabled item.
        item: WorkItemId,
    },

    /// A work item was fired (checked out or auto-fired).
    WorkItemFired {
        /// When the event occurred.
        timestamp: DateTime<Utc>,
        /// The fired item.
        item: WorkItemId,
    },

    /// A work item started executing.
    WorkItemExecuting {
        /// When the event occurred.
        timestamp: DateTime<Utc>,
        /// The executing item.
        item: WorkItemId,
    },

    /// A work item completed.
    WorkItemCompleted {
        /// When the event occurred.
        timestamp: DateTime<Utc>,
        /// The completed item.
        item: WorkItemId,
        /// The recorded output document.
        output: Value,
    },

    /// A work item failed.
    WorkItemFailed {
        /// When the event occurred.
        timestamp: DateTime<Utc>,
        /// The failed item.
        item: WorkItemId,
        /// Failure reason.
        reason: String,
    },

    /// A work item was cancelled.
    WorkItemCancelled {
        /// When the event occurred.
        timestamp: DateTime<Utc>,
        /// The cancelled item.
        item: WorkItemId,
    },

    /// A work item was suspended.
    WorkItemSuspended {
        /// When the event occurred.
        timestamp: DateTime<Utc>,
        /// The suspended item.
        item: WorkItemId,
    },

    /// A suspended work item resumed executing.
    WorkItemResumed {
        /// When the event occurred.
        timestamp: DateTime<Utc>,
        /// The resumed item.
        item: WorkItemId,
    },

    /// A task timer fired.
    TimerFired {
        /// When the event occurred.
        timestamp: DateTime<Utc>,
        /// The item whose timer fired.
        item: WorkItemId,
    },

    /// An exception was raised: handler failure, listener failure, or a
    /// discarded anomaly.
    ExceptionRaised {
        /// When the event occurred.
        timestamp: DateTime<Utc>,
        /// The case in question.
        case: CaseId,
        /// The work item in question, if any.
        item: Option<WorkItemId>,
        /// Machine-readable code (`listener_failure`,
        /// `discarded_late_output`, `duplicate_timer_fire`, …).
        code: String,
        /// Human-readable detail.
        message: String,
    },
}

impl EngineEvent {
    /// When the event occurred.
    #[must_use]
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::CaseLaunched { timestamp, .. }
            | Self::CaseCompleted { timestamp, .. }
            | Self::CaseCancelled { timestamp, .. }
            | Self::CaseSuspended { timestamp, .. }
            | Self::CaseResumed { timestamp, .. }
            | Self::CaseDeadlocked { timestamp, .. }
            | Self::WorkItemEnabled { timestamp, .. }
            | Self::WorkItemFired { timestamp, .. }
            | Self::WorkItemExecuting { timestamp, .. }
            | Self::WorkItemCompleted { timestamp, .. }
            | Self::WorkItemFailed { timestamp, .. }
            | Self::WorkItemCancelled { timestamp, .. }
            | Self::WorkItemSuspended { timestamp, .. }
            | Self::WorkItemResumed { timestamp, .. }
            | Self::TimerFired { timestamp, .. }
            | Self::ExceptionRaised { timestamp, .. } => *timestamp,
        }
    }

    /// The case this event belongs to.
    #[must_use]
    pub fn case_id(&self) -> CaseId {
        match self {
            Self::CaseLaunched { case, .. }
            | Self::CaseCompleted { case, .. }
            | Self::CaseCancelled { case, .. }
            | Self::CaseSuspended { case, .. }
            | Self::CaseResumed { case, .. }
            | Self::CaseDeadlocked { case, .. }
            | Self::ExceptionRaised { case, .. } => case.clone(),
            Self::WorkItemEnabled { item, .. }
            | Self::WorkItemFired { item, .. }
            | Self::WorkItemExecuting { item, .. }
            | Self::WorkItemCompleted { item, .. }
            | Self::WorkItemFailed { item, .. }
            | Self::WorkItemCancelled { item, .. }
            | Self::WorkItemSuspended { item, .. }
            | Self::WorkItemResumed { item, .. }
            | Self::TimerFired { item, .. } => item.case.clone(),
        }
    }

    /// The work item this event concerns, if any.
    #[must_use]
    pub fn work_item(&self) -> Option<&WorkItemId> {
        match self {
            Self::WorkItemEnabled { item, .. }
            | Self::WorkItemFired { item, .. }
            | Self::WorkItemExecuting { item, .. }
            | Self::WorkItemCompleted { item, .. }
            | Self::WorkItemFailed { item, .. }
            | Self::WorkItemCancelled { item, .. }
            | Self::WorkItemSuspended { item, .. }
            | Self::WorkItemResumed { item, .. }
            | Self::TimerFired { item, .. } => Some(item),
            Self::ExceptionRaised { item, .. } => item.as_ref(),
            _ => None,
        }
    }

    /// Stable kind tag, matching the serialized `event` field.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::CaseLaunched { .. } => "case_launched",
            Self::CaseCompleted { .. } => "case_completed",
            Self::CaseCancelled { .. } => "case_cancelled",
            Self::CaseSuspended { .. } => "case_suspended",
            Self::CaseResumed { .. } => "case_resumed",
            Self::CaseDeadlocked { .. } => "case_deadlocked",
            Self::WorkItemEnabled { .. } => "workitem_enabled",
            Self::WorkItemFired { .. } => "workitem_fired",
            Self::WorkItemExecuting { .. } => "workitem_executing",
            Self::WorkItemCompleted { .. } => "workitem_completed",
            Self::WorkItemFailed { .. } => "workitem_failed",
            Self::WorkItemCancelled { .. } => "workitem_cancelled",
            Self::WorkItemSuspended { .. } => "workitem_suspended",
            Self::WorkItemResumed { .. } => "workitem_resumed",
            Self::TimerFired { .. } => "timer_fired",
            Self::ExceptionRaised { .. } => "exception_raised",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        Utc::now()
    }

    #[test]
    fn case_event_accessors() {
        let event = EngineEvent::CaseLaunched {
            timestamp: now(),
            case: CaseId::root(3),
            spec: SpecKey::new("u", "1"),
        };
        assert_eq!(event.case_id(), CaseId::root(3));
        assert!(event.work_item().is_none());
        assert_eq!(event.kind(), "case_launched");
    }

    #[test]
    fn work_item_event_accessors() {
        let item: WorkItemId = "3.1:review#2".parse().unwrap();
        let event = EngineEvent::WorkItemCompleted {
            timestamp: now(),
            item: item.clone(),
            output: serde_json::json!({"ok": true}),
        };
        assert_eq!(event.case_id().as_str(), "3.1");
        assert_eq!(event.work_item(), Some(&item));
        assert_eq!(event.kind(), "workitem_completed");
    }

    #[test]
    fn exception_event_with_optional_item() {
        let event = EngineEvent::ExceptionRaised {
            timestamp: now(),
            case: CaseId::root(1),
            item: None,
            code: "listener_failure".into(),
            message: "boom".into(),
        };
        assert!(event.work_item().is_none());
        assert_eq!(event.kind(), "exception_raised");
    }

    #[test]
    fn serde_tagging() {
        let event = EngineEvent::TimerFired {
            timestamp: now(),
            item: "1:wait".parse().unwrap(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "timer_fired");
        let back: EngineEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back.kind(), "timer_fired");
    }
}
