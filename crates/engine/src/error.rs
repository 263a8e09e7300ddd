//! The engine error taxonomy.
//!
//! Every error carries a machine-readable kind (see [`EngineError::kind`])
//! so transport adapters can map failures 1:1 onto their own codes, and a
//! message naming the offending entity and states.

use mizzen_core::{CaseId, SpecKey, WorkItemId};
use mizzen_execution::{CaseStatus, ExecutionError};
use mizzen_expression::ExpressionError;
use mizzen_spec::SpecError;
use mizzen_storage::StorageError;
use thiserror::Error;

/// Errors surfaced by the engine facade.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The specification is malformed, or an expression tied to one of its
    /// flows or mappings failed to evaluate.
    #[error("specification: {0}")]
    Specification(String),

    /// No specification registered under this key.
    #[error("specification not registered: {0}")]
    SpecNotFound(SpecKey),

    /// A specification is already registered under this key.
    #[error("specification already registered: {0}")]
    SpecAlreadyLoaded(SpecKey),

    /// Unload refused: live cases still reference the specification.
    #[error("specification {key} has {live_cases} live case(s)")]
    SpecInUse {
        /// The specification in question.
        key: SpecKey,
        /// How many live cases reference it.
        live_cases: usize,
    },

    /// No case registered under this id.
    #[error("case not found: {0}")]
    CaseNotFound(CaseId),

    /// Import refused: a case with this id already exists.
    #[error("case already exists: {0}")]
    CaseExists(CaseId),

    /// The operation requires a running case.
    #[error("case {case} is {status}, operation requires a running case")]
    CaseNotActive {
        /// The case in question.
        case: CaseId,
        /// Its current status.
        status: CaseStatus,
    },

    /// No work item registered under this id.
    #[error("work item not found: {0}")]
    WorkItemNotFound(WorkItemId),

    /// An illegal lifecycle transition or other state machine violation.
    #[error(transparent)]
    State(ExecutionError),

    /// A conflicting retry or an operation racing a terminal transition.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The persistence adapter failed; the in-memory mutation was reverted.
    #[error("resource: {0}")]
    Resource(#[from] StorageError),
}

impl EngineError {
    /// Machine-readable kind for transport mapping.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Specification(_) => "specification",
            Self::SpecNotFound(_) => "spec_not_found",
            Self::SpecAlreadyLoaded(_) => "spec_already_loaded",
            Self::SpecInUse { .. } => "spec_in_use",
            Self::CaseNotFound(_) => "case_not_found",
            Self::CaseExists(_) => "case_exists",
            Self::CaseNotActive { .. } => "case_not_active",
            Self::WorkItemNotFound(_) => "work_item_not_found",
            Self::State(_) => "state",
            Self::Conflict(_) => "conflict",
            Self::Resource(_) => "resource",
        }
    }
}

impl From<SpecError> for EngineError {
    fn from(err: SpecError) -> Self {
        Self::Specification(err.to_string())
    }
}

impl From<ExpressionError> for EngineError {
    fn from(err: ExpressionError) -> Self {
        Self::Specification(err.to_string())
    }
}

impl From<ExecutionError> for EngineError {
    fn from(err: ExecutionError) -> Self {
        match err {
            ExecutionError::CompletionConflict { item } => {
                Self::Conflict(format!("work item {item}: conflicting completion output"))
            }
            ExecutionError::WorkItemNotFound(id) => Self::WorkItemNotFound(id),
            other => Self::State(other),
        }
    }
}

/// Engine result alias.
pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_are_distinct_for_taxonomy() {
        let errors: Vec<EngineError> = vec![
            EngineError::Specification("x".into()),
            EngineError::SpecNotFound(SpecKey::new("u", "1")),
            EngineError::CaseNotFound(CaseId::root(1)),
            EngineError::Conflict("x".into()),
            EngineError::Resource(StorageError::Backend("x".into())),
        ];
        let kinds: Vec<_> = errors.iter().map(|e| e.kind()).collect();
        assert_eq!(
            kinds,
            vec![
                "specification",
                "spec_not_found",
                "case_not_found",
                "conflict",
                "resource"
            ]
        );
    }

    #[test]
    fn completion_conflict_maps_to_conflict_kind() {
        let err = EngineError::from(ExecutionError::CompletionConflict {
            item: "1:a".parse().unwrap(),
        });
        assert_eq!(err.kind(), "conflict");
    }

    #[test]
    fn transition_error_maps_to_state_kind() {
        let err = EngineError::from(ExecutionError::InvalidCaseTransition {
            case: CaseId::root(1),
            from: "completed".into(),
            to: "running".into(),
        });
        assert_eq!(err.kind(), "state");
        assert!(err.to_string().contains("completed"));
    }

    #[test]
    fn expression_error_maps_to_specification_kind() {
        let err = EngineError::from(ExpressionError::NotABool { expr: "1".into() });
        assert_eq!(err.kind(), "specification");
    }

    #[test]
    fn case_not_active_names_status() {
        let err = EngineError::CaseNotActive {
            case: CaseId::root(2),
            status: CaseStatus::Cancelled,
        };
        assert!(err.to_string().contains("cancelled"));
    }
}
