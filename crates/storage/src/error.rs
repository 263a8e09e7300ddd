//! Storage errors.

use thiserror::Error;

/// Errors from a persistence backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    /// The backend rejected or failed an operation.
    #[error("storage backend: {0}")]
    Backend(String),

    /// A commit failed; staged writes were discarded.
    #[error("commit failed: {0}")]
    CommitFailed(String),
}
