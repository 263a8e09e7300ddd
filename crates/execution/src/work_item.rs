//! A work item: one schedulable task instance within a case.

use chrono::{DateTime, Utc};
use mizzen_core::WorkItemId;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ExecutionError;
use crate::status::WorkItemStatus;
use crate::transition::validate_work_item_transition;

/// Multi-instance progress tracked on the parent work item.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MiProgress {
    /// Children created so far (also the next creation index).
    pub created: u32,
    /// Outputs of completed children as `(creation index, output)`,
    /// in completion order.
    pub completed: Vec<(u32, Value)>,
    /// Set once the threshold fired; late completions are discarded.
    pub threshold_met: bool,
}

/// One task instance. Owned by the runner; external handlers hold the id
/// and interact through the engine facade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkItem {
    /// Identity: case, task, optional MI index.
    pub id: WorkItemId,
    /// Current lifecycle status.
    pub status: WorkItemStatus,
    /// Parent work item for MI children.
    #[serde(default)]
    pub parent: Option<WorkItemId>,
    /// Input document computed from the task's input mapping.
    pub input: Value,
    /// Output document recorded at completion.
    #[serde(default)]
    pub output: Option<Value>,
    /// Failure reason, if the item failed.
    #[serde(default)]
    pub error: Option<String>,
    /// Opaque resource handle recorded at checkout.
    #[serde(default)]
    pub handle: Option<String>,
    /// Multi-instance progress (parents only).
    #[serde(default)]
    pub mi: Option<MiProgress>,
    /// When the timer armed for this item is due, if any.
    #[serde(default)]
    pub timer_due: Option<DateTime<Utc>>,
    /// When the item became enabled (or was created fired).
    pub enabled_at: DateTime<Utc>,
    /// When the item was fired.
    #[serde(default)]
    pub fired_at: Option<DateTime<Utc>>,
    /// When the item started executing.
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    /// When the item reached a terminal status.
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
}

/// Outcome of a completion request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionOutcome {
    /// The item transitioned to completed now.
    Completed,
    /// The item was already completed with the same output; the request is
    /// an acknowledged retry.
    AlreadyCompleted,
}

impl WorkItem {
    /// Create an enabled work item.
    #[must_use]
    pub fn enabled(id: WorkItemId, input: Value) -> Self {
        Self {
            id,
            status: WorkItemStatus::Enabled,
            parent: None,
            input,
            output: None,
            error: None,
            handle: None,
            mi: None,
            timer_due: None,
            enabled_at: Utc::now(),
            fired_at: None,
            started_at: None,
            finished_at: None,
        }
    }

    /// Attach a parent (MI children).
    #[must_use]
    pub fn with_parent(mut self, parent: WorkItemId) -> Self {
        self.parent = Some(parent);
        self
    }

    /// Validated transition with timestamp bookkeeping. Completion goes
    /// through [`WorkItem::complete`] instead so idempotency is preserved.
    pub fn transition_to(&mut self, to: WorkItemStatus) -> Result<(), ExecutionError> {
        validate_work_item_transition(&self.id, self.status, to)?;
        self.status = to;
        match to {
            WorkItemStatus::Fired => self.fired_at = Some(Utc::now()),
            WorkItemStatus::Executing if self.started_at.is_none() => {
                self.started_at = Some(Utc::now());
            }
            _ => {}
        }
        if to.is_terminal() {
            self.finished_at = Some(Utc::now());
        }
        Ok(())
    }

    /// Fire the item, recording the checkout handle.
    pub fn fire(&mut self, handle: Option<String>) -> Result<(), ExecutionError> {
        self.transition_to(WorkItemStatus::Fired)?;
        self.handle = handle;
        Ok(())
    }

    /// Complete with an output document.
    ///
    /// Idempotent against retries: a second completion with an equal output
    /// returns [`CompletionOutcome::AlreadyCompleted`]; a differing output
    /// is a conflict. Completion of a non-completable state is a state
    /// error like any other transition.
    pub fn complete(&mut self, output: Value) -> Result<CompletionOutcome, ExecutionError> {
        if self.status == WorkItemStatus::Completed {
            if self.output.as_ref() == Some(&output) {
                return Ok(CompletionOutcome::AlreadyCompleted);
            }
            return Err(ExecutionError::CompletionConflict {
                item: self.id.clone(),
            });
        }
        self.transition_to(WorkItemStatus::Completed)?;
        self.output = Some(output);
        Ok(CompletionOutcome::Completed)
    }

    /// Fail with a reason.
    pub fn fail(&mut self, reason: impl Into<String>) -> Result<(), ExecutionError> {
        self.transition_to(WorkItemStatus::Failed)?;
        self.error = Some(reason.into());
        Ok(())
    }

    /// Force-cancel regardless of the current live state. Errors only if
    /// the item is already terminal.
    pub fn cancel(&mut self) -> Result<(), ExecutionError> {
        self.transition_to(WorkItemStatus::Cancelled)
    }

    /// The creation index of an MI child, if this is one.
    #[must_use]
    pub fn instance_index(&self) -> Option<u32> {
        self.id.index
    }

    /// Returns `true` while the item counts as live.
    #[must_use]
    pub fn is_live(&self) -> bool {
        self.status.is_live()
    }
}
