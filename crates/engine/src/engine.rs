//! The engine facade.
//!
//! One `Engine` type serves both deployment shapes, differing only in the
//! injected durability strategy:
//!
//! - [`Engine::persistent`] write-through: every successful mutation is
//!   committed through the [`PersistenceAdapter`] before the case lock is
//!   released; a commit failure reverts the in-memory mutation and
//!   surfaces as a resource error. [`Engine::restore`] recovers the
//!   persisted case set at startup.
//! - [`Engine::stateless`] holds cases in memory only; the optional idle
//!   eviction monitor hands snapshots to an [`EvictionListener`] and drops
//!   idle cases, which callers may re-import later.
//!
//! Every mutation follows the same sequence: lock the case, clone the
//! pre-state, run the kernel, commit (persistent only), deliver events to
//! synchronous listeners, release the lock, deliver to deferred listeners.
//! A kernel or commit error restores the pre-state, so callers never
//! observe a partial mutation.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use mizzen_core::{CaseId, NodeId, SpecKey, WorkItemId};
use mizzen_execution::{
    CaseSnapshot, CaseState, CaseStatus, CompletionOutcome, EngineEvent, WorkItem, WorkItemStatus,
};
use mizzen_expression::ExpressionEngine;
use mizzen_spec::Specification;
use mizzen_storage::PersistenceAdapter;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::announcer::{Announcer, DeliveryMode, EngineListener, ListenerId};
use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::registry::{CaseCell, CaseRegistry, SpecRegistry};
use crate::runner::Kernel;
use crate::timer::TimerService;

/// Receives a final snapshot when the stateless engine evicts an idle case.
pub trait EvictionListener: Send + Sync {
    /// Called with the evicted case's id and encoded snapshot.
    fn on_evict(&self, case: &CaseId, snapshot: &[u8]);
}

/// Criteria for [`Engine::list_work_items`]. Empty filter = everything.
#[derive(Debug, Clone, Default)]
pub struct WorkItemFilter {
    /// Restrict to one root case (includes its sub-net items).
    pub case: Option<CaseId>,
    /// Restrict to one status.
    pub status: Option<WorkItemStatus>,
    /// Restrict to one task.
    pub task: Option<NodeId>,
}

impl WorkItemFilter {
    fn matches(&self, root: &CaseId, item: &WorkItem) -> bool {
        self.case.as_ref().is_none_or(|c| c == root)
            && self.status.is_none_or(|s| s == item.status)
            && self.task.as_ref().is_none_or(|t| t == &item.id.task)
    }
}

/// The workflow engine.
pub struct Engine {
    config: EngineConfig,
    eval: ExpressionEngine,
    specs: SpecRegistry,
    cases: CaseRegistry,
    announcer: Announcer,
    timers: TimerService,
    adapter: Option<Arc<dyn PersistenceAdapter>>,
    eviction_listener: Option<Arc<dyn EvictionListener>>,
    launch_counter: AtomicU64,
    shutdown: CancellationToken,
}

impl Engine {
    /// A write-through engine over the given adapter.
    #[must_use]
    pub fn persistent(adapter: Arc<dyn PersistenceAdapter>, config: EngineConfig) -> Arc<Self> {
        Arc::new(Self {
            config,
            eval: ExpressionEngine::new(),
            specs: SpecRegistry::new(),
            cases: CaseRegistry::new(),
            announcer: Announcer::new(),
            timers: TimerService::new(),
            adapter: Some(adapter),
            eviction_listener: None,
            launch_counter: AtomicU64::new(1),
            shutdown: CancellationToken::new(),
        })
    }

    /// An in-memory engine with no backing store.
    #[must_use]
    pub fn stateless(config: EngineConfig) -> Arc<Self> {
        Self::stateless_inner(config, None)
    }

    /// An in-memory engine whose idle cases are handed to `listener`.
    #[must_use]
    pub fn stateless_with_eviction(
        config: EngineConfig,
        listener: Arc<dyn EvictionListener>,
    ) -> Arc<Self> {
        Self::stateless_inner(config, Some(listener))
    }

    fn stateless_inner(
        config: EngineConfig,
        eviction_listener: Option<Arc<dyn EvictionListener>>,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            eval: ExpressionEngine::new(),
            specs: SpecRegistry::new(),
            cases: CaseRegistry::new(),
            announcer: Announcer::new(),
            timers: TimerService::new(),
            adapter: None,
            eviction_listener,
            launch_counter: AtomicU64::new(1),
            shutdown: CancellationToken::new(),
        })
    }

    // ── listeners ──────────────────────────────────────────────────────

    /// Register a lifecycle listener.
    pub fn register_listener(
        &self,
        listener: Arc<dyn EngineListener>,
        mode: DeliveryMode,
    ) -> ListenerId {
        self.announcer.register(listener, mode)
    }

    /// Remove a lifecycle listener.
    pub fn unregister_listener(&self, id: ListenerId) {
        self.announcer.unregister(id);
    }

    // ── specifications ─────────────────────────────────────────────────

    /// Register a specification and (persistent variant) record it.
    pub async fn load_specification(&self, spec: Specification) -> EngineResult<()> {
        spec.validate()?;
        let key = spec.key.clone();
        let blob = serde_json::to_vec(&spec)
            .map_err(mizzen_execution::ExecutionError::Serialization)?;
        self.specs.insert(spec)?;
        if let Some(adapter) = &self.adapter {
            let result: Result<(), mizzen_storage::StorageError> = async {
                let mut tx = adapter.begin().await?;
                tx.save_specification(&key, blob);
                tx.commit().await
            }
            .await;
            if let Err(err) = result {
                self.specs.remove(&key).ok();
                return Err(err.into());
            }
        }
        tracing::info!(spec = %key, "specification loaded");
        Ok(())
    }

    /// Unregister a specification. Fails while live cases reference it.
    pub async fn unload_specification(&self, key: &SpecKey) -> EngineResult<()> {
        self.specs.get(key)?;
        let mut live = 0usize;
        for (_, cell) in self.cases.cells() {
            let state = cell.state.lock().await;
            if state.spec == *key && !state.status.is_terminal() {
                live += 1;
            }
        }
        if live > 0 {
            return Err(EngineError::SpecInUse {
                key: key.clone(),
                live_cases: live,
            });
        }
        self.specs.remove(key)?;
        if let Some(adapter) = &self.adapter {
            let mut tx = adapter.begin().await?;
            tx.delete_specification(key);
            tx.commit().await.map_err(EngineError::from)?;
        }
        tracing::info!(spec = %key, "specification unloaded");
        Ok(())
    }

    // ── case lifecycle ─────────────────────────────────────────────────

    /// Launch a case: create it, start the root runner, fire the initial
    /// enablements, and return its id.
    pub async fn launch_case(&self, key: &SpecKey, data: Value) -> EngineResult<CaseId> {
        self.specs.get(key)?;
        let number = self.launch_counter.fetch_add(1, Ordering::SeqCst);
        let id = CaseId::root(number);
        let cell = CaseCell::new(CaseState::new(id.clone(), key.clone(), data));
        self.cases.insert(id.clone(), Arc::clone(&cell))?;

        let result = self
            .mutate(&id, &cell, |kernel, case, events| kernel.launch(case, events))
            .await;
        if result.is_err() {
            self.cases.remove(&id);
        }
        result.map(|()| id)
    }

    /// Suspend a running case.
    pub async fn suspend_case(&self, id: &CaseId) -> EngineResult<()> {
        let cell = self.cases.get(id)?;
        self.mutate(id, &cell, |kernel, case, events| {
            kernel.suspend_case(case, events)
        })
        .await
    }

    /// Resume a suspended case.
    pub async fn resume_case(&self, id: &CaseId) -> EngineResult<()> {
        let cell = self.cases.get(id)?;
        self.mutate(id, &cell, |kernel, case, events| {
            kernel.resume_case(case, events)
        })
        .await
    }

    /// Cancel a case, invalidating all outstanding work items.
    pub async fn cancel_case(&self, id: &CaseId) -> EngineResult<()> {
        let cell = self.cases.get(id)?;
        self.mutate(id, &cell, |kernel, case, events| {
            kernel.cancel_case(case, events)
        })
        .await
    }

    /// A case's current status.
    pub async fn case_status(&self, id: &CaseId) -> EngineResult<CaseStatus> {
        let cell = self.cases.get(id)?;
        let state = cell.state.lock().await;
        Ok(state.status)
    }

    /// A coherent copy of a case's data document.
    pub async fn case_data(&self, id: &CaseId) -> EngineResult<Value> {
        let cell = self.cases.get(id)?;
        let state = cell.state.lock().await;
        Ok(state.data.clone())
    }

    // ── work items ─────────────────────────────────────────────────────

    /// A read-only snapshot of work items matching `filter`.
    pub async fn list_work_items(&self, filter: &WorkItemFilter) -> Vec<WorkItem> {
        let mut items = Vec::new();
        for (root, cell) in self.cases.cells() {
            if filter.case.as_ref().is_some_and(|c| c != &root) {
                continue;
            }
            let state = cell.state.lock().await;
            items.extend(
                state
                    .work_items
                    .values()
                    .filter(|wi| filter.matches(&root, wi))
                    .cloned(),
            );
        }
        items.sort_by(|a, b| a.id.cmp(&b.id));
        items
    }

    /// Check out an enabled work item, assigning it to `handle`.
    pub async fn checkout_work_item(
        &self,
        id: &WorkItemId,
        handle: impl Into<String>,
    ) -> EngineResult<WorkItem> {
        let handle = handle.into();
        let root = id.case.root_ancestor();
        let cell = self.cases.get(&root)?;
        self.mutate(&root, &cell, |kernel, case, events| {
            kernel.checkout_item(case, id, Some(handle), events)
        })
        .await
    }

    /// Mark a fired work item as executing.
    pub async fn start_work_item(&self, id: &WorkItemId) -> EngineResult<()> {
        let root = id.case.root_ancestor();
        let cell = self.cases.get(&root)?;
        self.mutate(&root, &cell, |kernel, case, events| {
            kernel.start_item(case, id, events)
        })
        .await
    }

    /// Complete a work item with its output document. Idempotent against
    /// retries with an identical output.
    pub async fn checkin_work_item(
        &self,
        id: &WorkItemId,
        output: Value,
    ) -> EngineResult<CompletionOutcome> {
        let root = id.case.root_ancestor();
        let cell = self.cases.get(&root)?;
        self.mutate(&root, &cell, |kernel, case, events| {
            kernel.complete_item(case, id, output, events)
        })
        .await
    }

    /// Report a work item failed.
    pub async fn fail_work_item(&self, id: &WorkItemId, reason: &str) -> EngineResult<()> {
        let root = id.case.root_ancestor();
        let cell = self.cases.get(&root)?;
        self.mutate(&root, &cell, |kernel, case, events| {
            kernel.fail_item(case, id, reason, events)
        })
        .await
    }

    /// Suspend an executing work item.
    pub async fn suspend_work_item(&self, id: &WorkItemId) -> EngineResult<()> {
        let root = id.case.root_ancestor();
        let cell = self.cases.get(&root)?;
        self.mutate(&root, &cell, |kernel, case, events| {
            kernel.suspend_item(case, id, events)
        })
        .await
    }

    /// Resume a suspended work item.
    pub async fn resume_work_item(&self, id: &WorkItemId) -> EngineResult<()> {
        let root = id.case.root_ancestor();
        let cell = self.cases.get(&root)?;
        self.mutate(&root, &cell, |kernel, case, events| {
            kernel.resume_item(case, id, events)
        })
        .await
    }

    /// Add a child to a dynamic multi-instance task.
    pub async fn add_mi_instance(
        &self,
        parent: &WorkItemId,
        element: Value,
    ) -> EngineResult<WorkItemId> {
        let root = parent.case.root_ancestor();
        let cell = self.cases.get(&root)?;
        self.mutate(&root, &cell, |kernel, case, events| {
            kernel.add_mi_instance(case, parent, &element, events)
        })
        .await
    }

    // ── snapshots ──────────────────────────────────────────────────────

    /// Export a case as a self-contained snapshot.
    pub async fn export_case(&self, id: &CaseId) -> EngineResult<Vec<u8>> {
        let cell = self.cases.get(id)?;
        let state = cell.state.lock().await;
        Ok(CaseSnapshot::capture(&state).encode()?)
    }

    /// Import a previously exported case. The case's specification must be
    /// loaded, and its id must be free.
    pub async fn import_case(&self, bytes: &[u8]) -> EngineResult<CaseId> {
        let state = CaseSnapshot::decode(bytes)?.into_case();
        self.specs.get(&state.spec)?;
        let id = state.id.clone();
        self.bump_launch_counter(&id);
        let cell = CaseCell::new(state);
        self.cases.insert(id.clone(), Arc::clone(&cell))?;

        {
            let state = cell.state.lock().await;
            if let Some(adapter) = &self.adapter {
                let blob = CaseSnapshot::capture(&state).encode()?;
                let result: Result<(), mizzen_storage::StorageError> = async {
                    let mut tx = adapter.begin().await?;
                    tx.save_case(&id, blob);
                    tx.commit().await
                }
                .await;
                if let Err(err) = result {
                    drop(state);
                    self.cases.remove(&id);
                    return Err(err.into());
                }
            }
            self.rearm_timers(&state);
        }
        tracing::info!(case = %id, "case imported");
        Ok(id)
    }

    // ── persistence recovery ───────────────────────────────────────────

    /// Restore specifications and cases from the adapter. Returns how many
    /// cases were recovered.
    pub async fn restore(&self) -> EngineResult<usize> {
        let Some(adapter) = self.adapter.clone() else {
            return Ok(0);
        };
        for blob in adapter.load_specifications().await? {
            match serde_json::from_slice::<Specification>(&blob) {
                Ok(spec) => {
                    if let Err(err) = self.specs.insert(spec) {
                        tracing::warn!(error = %err, "skipping persisted specification");
                    }
                }
                Err(err) => tracing::warn!(error = %err, "undecodable persisted specification"),
            }
        }

        let mut restored = 0usize;
        for id in adapter.list_case_ids().await? {
            let Some(bytes) = adapter.load_case(&id).await? else {
                continue;
            };
            let state = match CaseSnapshot::decode(&bytes) {
                Ok(snapshot) => snapshot.into_case(),
                Err(err) => {
                    tracing::warn!(case = %id, error = %err, "undecodable persisted case");
                    continue;
                }
            };
            self.bump_launch_counter(&state.id);
            let cell = CaseCell::new(state);
            {
                let state = cell.state.lock().await;
                self.rearm_timers(&state);
            }
            if self.cases.insert(id.clone(), cell).is_ok() {
                restored += 1;
            }
        }
        tracing::info!(restored, "engine state restored");
        Ok(restored)
    }

    // ── timers ─────────────────────────────────────────────────────────

    /// Process every timer due by now. Exposed for deterministic tests;
    /// the background pump calls it on an interval.
    pub async fn fire_due_timers(&self) -> EngineResult<()> {
        for entry in self.timers.due(Utc::now()) {
            let root = entry.item.case.root_ancestor();
            let Ok(cell) = self.cases.get(&root) else {
                tracing::debug!(item = %entry.item, "timer for unknown case, dropping");
                continue;
            };
            if let Err(err) = self
                .mutate(&root, &cell, |kernel, case, events| {
                    kernel.timer_fired(case, &entry.item, entry.due, events)
                })
                .await
            {
                tracing::warn!(item = %entry.item, error = %err, "timer processing failed");
            }
        }
        Ok(())
    }

    /// Spawn the background timer pump.
    pub fn start_timer_pump(self: &Arc<Self>) {
        let engine = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(engine.config.timer_tick_interval);
            loop {
                tokio::select! {
                    () = engine.shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        if let Err(err) = engine.fire_due_timers().await {
                            tracing::warn!(error = %err, "timer pump");
                        }
                    }
                }
            }
        });
    }

    /// Spawn the idle-eviction monitor (stateless variant only).
    pub fn start_eviction_monitor(self: &Arc<Self>) {
        if self.adapter.is_some() {
            tracing::warn!("eviction monitor is a stateless-engine feature, not starting");
            return;
        }
        let engine = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(engine.config.eviction_scan_interval);
            loop {
                tokio::select! {
                    () = engine.shutdown.cancelled() => break,
                    _ = ticker.tick() => engine.evict_idle_cases().await,
                }
            }
        });
    }

    /// One eviction sweep. Exposed for deterministic tests.
    pub async fn evict_idle_cases(&self) {
        for (id, cell) in self.cases.cells() {
            if cell.idle_for() < self.config.idle_timeout {
                continue;
            }
            // Skip cases busy right now; they are not idle.
            let Ok(state) = cell.state.try_lock() else {
                continue;
            };
            if state.has_live_items() {
                continue;
            }
            let snapshot = match CaseSnapshot::capture(&state).encode() {
                Ok(bytes) => bytes,
                Err(err) => {
                    tracing::warn!(case = %id, error = %err, "eviction snapshot failed");
                    continue;
                }
            };
            drop(state);
            if let Some(listener) = &self.eviction_listener {
                listener.on_evict(&id, &snapshot);
            }
            self.cases.remove(&id);
            tracing::info!(case = %id, "idle case evicted");
        }
    }

    /// Stop background tasks.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    // ── the mutation wrapper ───────────────────────────────────────────

    async fn mutate<R>(
        &self,
        id: &CaseId,
        cell: &Arc<CaseCell>,
        f: impl FnOnce(&Kernel<'_>, &mut CaseState, &mut Vec<EngineEvent>) -> EngineResult<R>,
    ) -> EngineResult<R> {
        let mut guard = cell.state.lock().await;
        let spec = self.specs.get(&guard.spec)?;
        let kernel = Kernel::new(&spec, &self.eval, &self.config);

        let before = guard.clone();
        let mut events = Vec::new();
        let value = match f(&kernel, &mut guard, &mut events) {
            Ok(value) => value,
            Err(err) => {
                *guard = before;
                return Err(err);
            }
        };

        if let Some(adapter) = &self.adapter {
            let commit: Result<(), EngineError> = async {
                let mut tx = adapter.begin().await.map_err(EngineError::from)?;
                if guard.status.is_terminal() {
                    tx.delete_case(id);
                } else {
                    let blob = CaseSnapshot::capture(&guard)
                        .encode()
                        .map_err(EngineError::from)?;
                    tx.save_case(id, blob);
                }
                tx.commit().await.map_err(EngineError::from)
            }
            .await;
            if let Err(err) = commit {
                *guard = before;
                return Err(err);
            }
        }

        let failures = self.announcer.announce_sync(&events);
        self.rearm_changed_timers(&before, &guard);
        cell.touch();
        drop(guard);

        let mut batch = events;
        batch.extend(failures);
        self.announcer.announce_deferred(&batch);
        Ok(value)
    }

    /// Schedule heap entries for timers that appeared or moved in this
    /// mutation. Stale entries are filtered when they pop.
    fn rearm_changed_timers(&self, before: &CaseState, after: &CaseState) {
        for item in after.live_items() {
            let Some(due) = item.timer_due else { continue };
            let unchanged = before
                .work_item(&item.id)
                .is_some_and(|prev| prev.timer_due == Some(due));
            if !unchanged {
                self.timers.schedule(item.id.clone(), due);
            }
        }
    }

    /// Schedule heap entries for every armed timer (import/restore path).
    fn rearm_timers(&self, state: &CaseState) {
        for item in state.live_items() {
            if let Some(due) = item.timer_due {
                self.timers.schedule(item.id.clone(), due);
            }
        }
    }

    fn bump_launch_counter(&self, id: &CaseId) {
        if let Ok(number) = id.root_ancestor().as_str().parse::<u64>() {
            self.launch_counter.fetch_max(number + 1, Ordering::SeqCst);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mizzen_spec::{NetBuilder, SpecificationBuilder, TaskBuilder};
    use mizzen_storage::MemoryAdapter;
    use serde_json::json;

    fn sequence_spec() -> Specification {
        SpecificationBuilder::new("http://example.org/seq", "1")
            .net(
                NetBuilder::new("root")
                    .task(TaskBuilder::atomic("a"))
                    .flow("in", "a")
                    .flow("a", "out"),
            )
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn launch_requires_loaded_spec() {
        let engine = Engine::stateless(EngineConfig::default());
        let err = engine
            .launch_case(&SpecKey::new("ghost", "1"), json!({}))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "spec_not_found");
    }

    #[tokio::test]
    async fn load_launch_checkout_checkin() {
        let engine = Engine::stateless(EngineConfig::default());
        engine.load_specification(sequence_spec()).await.unwrap();
        let key = SpecKey::new("http://example.org/seq", "1");

        let case = engine.launch_case(&key, json!({"data": {}})).await.unwrap();
        assert_eq!(case, CaseId::root(1));

        let enabled = engine
            .list_work_items(&WorkItemFilter {
                status: Some(WorkItemStatus::Enabled),
                ..WorkItemFilter::default()
            })
            .await;
        assert_eq!(enabled.len(), 1);
        let id = enabled[0].id.clone();

        let item = engine.checkout_work_item(&id, "tester").await.unwrap();
        assert_eq!(item.status, WorkItemStatus::Fired);
        assert_eq!(item.handle.as_deref(), Some("tester"));

        engine.checkin_work_item(&id, json!({})).await.unwrap();
        assert_eq!(
            engine.case_status(&case).await.unwrap(),
            CaseStatus::Completed
        );
    }

    #[tokio::test]
    async fn double_load_is_rejected() {
        let engine = Engine::stateless(EngineConfig::default());
        engine.load_specification(sequence_spec()).await.unwrap();
        let err = engine
            .load_specification(sequence_spec())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "spec_already_loaded");
    }

    #[tokio::test]
    async fn unload_with_live_case_fails() {
        let engine = Engine::stateless(EngineConfig::default());
        engine.load_specification(sequence_spec()).await.unwrap();
        let key = SpecKey::new("http://example.org/seq", "1");
        engine.launch_case(&key, json!({})).await.unwrap();

        let err = engine.unload_specification(&key).await.unwrap_err();
        assert_eq!(err.kind(), "spec_in_use");
        // The spec and the case are unaffected.
        assert!(engine.specs.get(&key).is_ok());
    }

    #[tokio::test]
    async fn unload_after_completion_succeeds() {
        let engine = Engine::stateless(EngineConfig::default());
        engine.load_specification(sequence_spec()).await.unwrap();
        let key = SpecKey::new("http://example.org/seq", "1");
        let _case = engine.launch_case(&key, json!({})).await.unwrap();
        let items = engine.list_work_items(&WorkItemFilter::default()).await;
        let id = items[0].id.clone();
        engine.checkout_work_item(&id, "t").await.unwrap();
        engine.checkin_work_item(&id, json!({})).await.unwrap();

        engine.unload_specification(&key).await.unwrap();
        assert!(engine.specs.get(&key).is_err());
    }

    #[tokio::test]
    async fn commit_failure_reverts_mutation() {
        let adapter = Arc::new(MemoryAdapter::new());
        let engine = Engine::persistent(adapter.clone(), EngineConfig::default());
        engine.load_specification(sequence_spec()).await.unwrap();
        let key = SpecKey::new("http://example.org/seq", "1");
        let case = engine.launch_case(&key, json!({})).await.unwrap();
        let items = engine.list_work_items(&WorkItemFilter::default()).await;
        let id = items[0].id.clone();

        adapter.fail_next_commit();
        let err = engine.checkout_work_item(&id, "t").await.unwrap_err();
        assert_eq!(err.kind(), "resource");

        // The in-memory state reverted: the item is still enabled.
        let items = engine.list_work_items(&WorkItemFilter::default()).await;
        assert_eq!(items[0].status, WorkItemStatus::Enabled);
        assert_eq!(engine.case_status(&case).await.unwrap(), CaseStatus::Running);

        // And the operation can be retried successfully.
        engine.checkout_work_item(&id, "t").await.unwrap();
    }

    #[tokio::test]
    async fn persistent_restart_restores_cases() {
        let adapter = Arc::new(MemoryAdapter::new());
        let key = SpecKey::new("http://example.org/seq", "1");
        {
            let engine = Engine::persistent(adapter.clone(), EngineConfig::default());
            engine.load_specification(sequence_spec()).await.unwrap();
            engine.launch_case(&key, json!({})).await.unwrap();
        }

        let engine = Engine::persistent(adapter, EngineConfig::default());
        let restored = engine.restore().await.unwrap();
        assert_eq!(restored, 1);

        // The restored case resumes exactly where it stopped.
        let items = engine.list_work_items(&WorkItemFilter::default()).await;
        assert_eq!(items.len(), 1);
        let id = items[0].id.clone();
        engine.checkout_work_item(&id, "t").await.unwrap();
        engine.checkin_work_item(&id, json!({})).await.unwrap();
        assert_eq!(
            engine.case_status(&CaseId::root(1)).await.unwrap(),
            CaseStatus::Completed
        );

        // New launches do not reuse restored ids.
        engine.load_specification(sequence_spec()).await.ok();
        let next = engine.launch_case(&key, json!({})).await.unwrap();
        assert_eq!(next, CaseId::root(2));
    }

    #[tokio::test]
    async fn completed_case_is_deleted_from_store() {
        let adapter = Arc::new(MemoryAdapter::new());
        let engine = Engine::persistent(adapter.clone(), EngineConfig::default());
        engine.load_specification(sequence_spec()).await.unwrap();
        let key = SpecKey::new("http://example.org/seq", "1");
        engine.launch_case(&key, json!({})).await.unwrap();
        assert_eq!(adapter.case_count(), 1);

        let items = engine.list_work_items(&WorkItemFilter::default()).await;
        let id = items[0].id.clone();
        engine.checkout_work_item(&id, "t").await.unwrap();
        engine.checkin_work_item(&id, json!({})).await.unwrap();
        assert_eq!(adapter.case_count(), 0);
    }
}
