//! Work item and case status enums.

use serde::{Deserialize, Serialize};

/// The lifecycle state of a single work item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkItemStatus {
    /// Created by the runner, waiting for checkout.
    Enabled,
    /// Checked out (or auto-fired); in an external handler's hands.
    Fired,
    /// Explicitly started long-running work.
    Executing,
    /// Paused by an external suspend; no mutation until resumed.
    Suspended,
    /// Finished successfully with an output document.
    Completed,
    /// Reported failed by its handler.
    Failed,
    /// Removed by a cancellation region, case cancel, or MI threshold.
    Cancelled,
    /// Stranded by a deadlocked case.
    Deadlocked,
}

impl WorkItemStatus {
    /// Returns `true` once the item can never transition again.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Failed | Self::Cancelled | Self::Deadlocked
        )
    }

    /// Returns `true` while the item still counts as live for completion
    /// and deadlock detection.
    #[must_use]
    pub fn is_live(&self) -> bool {
        !self.is_terminal()
    }

    /// Returns `true` while the item is in an external handler's hands.
    #[must_use]
    pub fn is_in_progress(&self) -> bool {
        matches!(self, Self::Fired | Self::Executing | Self::Suspended)
    }
}

impl std::fmt::Display for WorkItemStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Enabled => "enabled",
            Self::Fired => "fired",
            Self::Executing => "executing",
            Self::Suspended => "suspended",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
            Self::Deadlocked => "deadlocked",
        };
        f.write_str(s)
    }
}

/// The lifecycle state of a case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseStatus {
    /// Tokens are flowing.
    Running,
    /// Frozen by an external suspend.
    Suspended,
    /// The root net reached its completion predicate.
    Completed,
    /// Torn down by an external cancel.
    Cancelled,
    /// No progress is possible and the case is not complete.
    Deadlocked,
}

impl CaseStatus {
    /// Returns `true` once the case can never advance again.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }
}

impl std::fmt::Display for CaseStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Running => "running",
            Self::Suspended => "suspended",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::Deadlocked => "deadlocked",
        };
        f.write_str(s)
    }
}
