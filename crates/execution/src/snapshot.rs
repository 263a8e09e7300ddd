//! Self-contained case snapshots for export, import, and eviction handoff.

use serde::{Deserialize, Serialize};

use crate::case::CaseState;
use crate::error::ExecutionError;

/// The snapshot schema version this build reads and writes.
pub const SNAPSHOT_SCHEMA: u32 = 1;

/// A schema-versioned, self-describing serialized case.
///
/// The byte form is JSON: snapshots cross process boundaries (export /
/// import / eviction listeners), where self-description matters more than
/// compactness at case-state sizes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseSnapshot {
    /// Schema version; [`SNAPSHOT_SCHEMA`] in snapshots this build writes.
    pub schema: u32,
    /// The complete case state.
    pub case: CaseState,
}

impl CaseSnapshot {
    /// Capture a snapshot of `case`.
    #[must_use]
    pub fn capture(case: &CaseState) -> Self {
        Self {
            schema: SNAPSHOT_SCHEMA,
            case: case.clone(),
        }
    }

    /// Serialize to bytes.
    pub fn encode(&self) -> Result<Vec<u8>, ExecutionError> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Deserialize from bytes, rejecting unknown schema versions.
    pub fn decode(bytes: &[u8]) -> Result<Self, ExecutionError> {
        let snapshot: Self = serde_json::from_slice(bytes)?;
        if snapshot.schema != SNAPSHOT_SCHEMA {
            return Err(ExecutionError::SnapshotSchema {
                found: snapshot.schema,
                expected: SNAPSHOT_SCHEMA,
            });
        }
        Ok(snapshot)
    }

    /// Unwrap into the case state.
    #[must_use]
    pub fn into_case(self) -> CaseState {
        self.case
    }
}
