//! In-memory reference backend.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use mizzen_core::{CaseId, SpecKey};
use parking_lot::Mutex;

use crate::adapter::{PersistenceAdapter, PersistenceTx};
use crate::error::StorageError;

#[derive(Debug, Default)]
struct Store {
    cases: BTreeMap<CaseId, Vec<u8>>,
    specifications: BTreeMap<SpecKey, Vec<u8>>,
    fail_next_commit: bool,
}

/// In-memory backend: a mutex-guarded pair of maps. Cheap to clone
/// (`Arc` inside); clones share the same store.
#[derive(Debug, Clone, Default)]
pub struct MemoryAdapter {
    store: Arc<Mutex<Store>>,
}

impl MemoryAdapter {
    /// A fresh empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of persisted cases.
    #[must_use]
    pub fn case_count(&self) -> usize {
        self.store.lock().cases.len()
    }

    /// Test hook: make the next `commit` fail with a backend error, leaving
    /// the store untouched.
    pub fn fail_next_commit(&self) {
        self.store.lock().fail_next_commit = true;
    }
}

enum Op {
    SaveCase(CaseId, Vec<u8>),
    DeleteCase(CaseId),
    SaveSpec(SpecKey, Vec<u8>),
    DeleteSpec(SpecKey),
}

struct MemoryTx {
    store: Arc<Mutex<Store>>,
    ops: Vec<Op>,
}

#[async_trait]
impl PersistenceTx for MemoryTx {
    fn save_case(&mut self, id: &CaseId, bytes: Vec<u8>) {
        self.ops.push(Op::SaveCase(id.clone(), bytes));
    }

    fn delete_case(&mut self, id: &CaseId) {
        self.ops.push(Op::DeleteCase(id.clone()));
    }

    fn save_specification(&mut self, key: &SpecKey, bytes: Vec<u8>) {
        self.ops.push(Op::SaveSpec(key.clone(), bytes));
    }

    fn delete_specification(&mut self, key: &SpecKey) {
        self.ops.push(Op::DeleteSpec(key.clone()));
    }

    async fn commit(self: Box<Self>) -> Result<(), StorageError> {
        let mut store = self.store.lock();
        if store.fail_next_commit {
            store.fail_next_commit = false;
            tracing::warn!("memory adapter: injected commit failure");
            return Err(StorageError::CommitFailed("injected failure".into()));
        }
        for op in self.ops {
            match op {
                Op::SaveCase(id, bytes) => {
                    store.cases.insert(id, bytes);
                }
                Op::DeleteCase(id) => {
                    store.cases.remove(&id);
                }
                Op::SaveSpec(key, bytes) => {
                    store.specifications.insert(key, bytes);
                }
                Op::DeleteSpec(key) => {
                    store.specifications.remove(&key);
                }
            }
        }
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StorageError> {
        tracing::debug!(ops = self.ops.len(), "memory adapter: rollback");
        Ok(())
    }
}

#[async_trait]
impl PersistenceAdapter for MemoryAdapter {
    async fn begin(&self) -> Result<Box<dyn PersistenceTx>, StorageError> {
        Ok(Box::new(MemoryTx {
            store: Arc::clone(&self.store),
            ops: Vec::new(),
        }))
    }

    async fn load_case(&self, id: &CaseId) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self.store.lock().cases.get(id).cloned())
    }

    async fn list_case_ids(&self) -> Result<Vec<CaseId>, StorageError> {
        Ok(self.store.lock().cases.keys().cloned().collect())
    }

    async fn load_specifications(&self) -> Result<Vec<Vec<u8>>, StorageError> {
        Ok(self.store.lock().specifications.values().cloned().collect())
    }
}
