//! The adapter and transaction traits.

use async_trait::async_trait;
use mizzen_core::{CaseId, SpecKey};

use crate::error::StorageError;

/// A transaction: writes are staged in memory and applied atomically at
/// [`commit`](PersistenceTx::commit). Dropping a transaction without
/// committing discards its staged writes.
#[async_trait]
pub trait PersistenceTx: Send {
    /// Stage a case snapshot write.
    fn save_case(&mut self, id: &CaseId, bytes: Vec<u8>);

    /// Stage a case deletion.
    fn delete_case(&mut self, id: &CaseId);

    /// Stage a specification write.
    fn save_specification(&mut self, key: &SpecKey, bytes: Vec<u8>);

    /// Stage a specification deletion.
    fn delete_specification(&mut self, key: &SpecKey);

    /// Apply every staged write atomically.
    async fn commit(self: Box<Self>) -> Result<(), StorageError>;

    /// Discard every staged write.
    async fn rollback(self: Box<Self>) -> Result<(), StorageError>;
}

/// A persistence backend. Implementations are responsible for their own
/// internal concurrency; the engine assumes per-transaction linearizability.
#[async_trait]
pub trait PersistenceAdapter: Send + Sync {
    /// Open a transaction.
    async fn begin(&self) -> Result<Box<dyn PersistenceTx>, StorageError>;

    /// Load a case snapshot, if present.
    async fn load_case(&self, id: &CaseId) -> Result<Option<Vec<u8>>, StorageError>;

    /// Every persisted case id, used for startup recovery.
    async fn list_case_ids(&self) -> Result<Vec<CaseId>, StorageError>;

    /// Every persisted specification blob.
    async fn load_specifications(&self) -> Result<Vec<Vec<u8>>, StorageError>;
}
