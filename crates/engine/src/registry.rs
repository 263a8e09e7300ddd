//! Specification and case registries.
//!
//! The specification registry is a process-wide reader-writer map: many
//! cases resolve specifications concurrently, loads and unloads are rare.
//! Cases live in per-case cells: one async mutex each, so operations on
//! different cases never contend while operations on the same case
//! serialize.

use std::sync::Arc;

use dashmap::DashMap;
use mizzen_core::{CaseId, SpecKey};
use mizzen_execution::CaseState;
use mizzen_spec::Specification;
use parking_lot::RwLock;
use std::collections::HashMap;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::error::{EngineError, EngineResult};

/// The specification registry.
#[derive(Default)]
pub struct SpecRegistry {
    specs: RwLock<HashMap<SpecKey, Arc<Specification>>>,
}

impl SpecRegistry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a specification; re-registering the same key is an error.
    pub fn insert(&self, spec: Specification) -> EngineResult<Arc<Specification>> {
        let mut specs = self.specs.write();
        if specs.contains_key(&spec.key) {
            return Err(EngineError::SpecAlreadyLoaded(spec.key.clone()));
        }
        let spec = Arc::new(spec);
        specs.insert(spec.key.clone(), Arc::clone(&spec));
        Ok(spec)
    }

    /// Resolve a specification.
    pub fn get(&self, key: &SpecKey) -> EngineResult<Arc<Specification>> {
        self.specs
            .read()
            .get(key)
            .cloned()
            .ok_or_else(|| EngineError::SpecNotFound(key.clone()))
    }

    /// Remove a specification. The caller is responsible for the live-case
    /// guard.
    pub fn remove(&self, key: &SpecKey) -> EngineResult<()> {
        if self.specs.write().remove(key).is_none() {
            return Err(EngineError::SpecNotFound(key.clone()));
        }
        Ok(())
    }

    /// Every registered key.
    #[must_use]
    pub fn keys(&self) -> Vec<SpecKey> {
        self.specs.read().keys().cloned().collect()
    }
}

/// One case's cell: the state under its exclusive lock, plus idle-time
/// bookkeeping for the eviction monitor.
pub struct CaseCell {
    /// The case state; every mutation and coherent read goes through this
    /// lock.
    pub state: Mutex<CaseState>,
    /// Last time an operation touched this case.
    pub touched: parking_lot::Mutex<Instant>,
}

impl CaseCell {
    /// Wrap a case state.
    #[must_use]
    pub fn new(state: CaseState) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(state),
            touched: parking_lot::Mutex::new(Instant::now()),
        })
    }

    /// Record activity.
    pub fn touch(&self) {
        *self.touched.lock() = Instant::now();
    }

    /// How long since the last operation.
    #[must_use]
    pub fn idle_for(&self) -> std::time::Duration {
        self.touched.lock().elapsed()
    }
}

/// The case registry, keyed by root case id.
#[derive(Default)]
pub struct CaseRegistry {
    cases: DashMap<CaseId, Arc<CaseCell>>,
}

impl CaseRegistry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a case; the id must be free.
    pub fn insert(&self, id: CaseId, cell: Arc<CaseCell>) -> EngineResult<()> {
        use dashmap::mapref::entry::Entry;
        match self.cases.entry(id.clone()) {
            Entry::Occupied(_) => Err(EngineError::CaseExists(id)),
            Entry::Vacant(slot) => {
                slot.insert(cell);
                Ok(())
            }
        }
    }

    /// Resolve a case cell.
    pub fn get(&self, id: &CaseId) -> EngineResult<Arc<CaseCell>> {
        self.cases
            .get(id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| EngineError::CaseNotFound(id.clone()))
    }

    /// Remove a case cell.
    pub fn remove(&self, id: &CaseId) -> Option<Arc<CaseCell>> {
        self.cases.remove(id).map(|(_, cell)| cell)
    }

    /// Every registered cell.
    #[must_use]
    pub fn cells(&self) -> Vec<(CaseId, Arc<CaseCell>)> {
        let mut cells: Vec<_> = self
            .cases
            .iter()
            .map(|entry| (entry.key().clone(), Arc::clone(entry.value())))
            .collect();
        cells.sort_by(|a, b| a.0.cmp(&b.0));
        cells
    }

    /// Number of registered cases.
    #[must_use]
    pub fn len(&self) -> usize {
        self.cases.len()
    }

    /// Returns `true` when no cases are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cases.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mizzen_spec::{NetBuilder, SpecificationBuilder, TaskBuilder};
    use serde_json::json;

    fn spec(uri: &str) -> Specification {
        SpecificationBuilder::new(uri, "1")
            .net(
                NetBuilder::new("root")
                    .task(TaskBuilder::atomic("a"))
                    .flow("in", "a")
                    .flow("a", "out"),
            )
            .build()
            .unwrap()
    }

    #[test]
    fn spec_registry_roundtrip() {
        let registry = SpecRegistry::new();
        let key = SpecKey::new("u", "1");
        registry.insert(spec("u")).unwrap();
        assert_eq!(registry.get(&key).unwrap().key, key);
        assert_eq!(registry.keys(), vec![key.clone()]);
        registry.remove(&key).unwrap();
        assert!(matches!(
            registry.get(&key),
            Err(EngineError::SpecNotFound(_))
        ));
    }

    #[test]
    fn spec_registry_rejects_double_load() {
        let registry = SpecRegistry::new();
        registry.insert(spec("u")).unwrap();
        assert!(matches!(
            registry.insert(spec("u")),
            Err(EngineError::SpecAlreadyLoaded(_))
        ));
    }

    #[test]
    fn spec_registry_remove_missing_errors() {
        let registry = SpecRegistry::new();
        assert!(matches!(
            registry.remove(&SpecKey::new("ghost", "1")),
            Err(EngineError::SpecNotFound(_))
        ));
    }

    #[tokio::test]
    async fn case_registry_roundtrip() {
        let registry = CaseRegistry::new();
        let id = CaseId::root(1);
        let state = CaseState::new(id.clone(), SpecKey::new("u", "1"), json!({}));
        registry.insert(id.clone(), CaseCell::new(state)).unwrap();

        assert_eq!(registry.len(), 1);
        let cell = registry.get(&id).unwrap();
        assert_eq!(cell.state.lock().await.id, id);

        assert!(matches!(
            registry.insert(id.clone(), CaseCell::new(CaseState::new(
                id.clone(),
                SpecKey::new("u", "1"),
                json!({})
            ))),
            Err(EngineError::CaseExists(_))
        ));

        registry.remove(&id);
        assert!(registry.is_empty());
    }

    #[test]
    fn cells_are_sorted_by_case_id() {
        let registry = CaseRegistry::new();
        for n in [3u64, 1, 2] {
            let id = CaseId::root(n);
            let state = CaseState::new(id.clone(), SpecKey::new("u", "1"), json!({}));
            registry.insert(id, CaseCell::new(state)).unwrap();
        }
        let order: Vec<_> = registry
            .cells()
            .into_iter()
            .map(|(id, _)| id.to_string())
            .collect();
        assert_eq!(order, vec!["1", "2", "3"]);
    }
}
