//! The net runner: the kernel that advances a case.
//!
//! Every method takes `&mut CaseState` and an event buffer and runs
//! synchronously; the facade owns locking, persistence, and announcement.
//! The main loop collects follow-up work by iterating to a fixed point
//! instead of recursing, so deeply nested sub-net compositions never grow
//! the call stack.

use chrono::{Duration, Utc};
use mizzen_core::{CaseId, NodeId, WorkItemId};
use mizzen_execution::{
    CaseState, CaseStatus, CompletionOutcome, EngineEvent, MiProgress, RunnerState, WorkItem,
    WorkItemStatus,
};
use mizzen_expression::ExpressionEngine;
use mizzen_spec::{
    CreationMode, ContinuationPolicy, Decomposition, ExpiryPolicy, JoinType, MultiInstance,
    Specification, SplitType, Task, TimerTrigger,
};
use serde_json::{Value, json};

use crate::cancellation;
use crate::config::{EngineConfig, OrJoinPolicy};
use crate::error::{EngineError, EngineResult};
use crate::eval;
use crate::exceptions::ExceptionAction;
use crate::multi_instance;
use crate::orjoin::{self, OrJoinVerdict};

/// The kernel: stateless over a specification, an expression engine, and
/// the engine configuration.
pub struct Kernel<'a> {
    spec: &'a Specification,
    eval: &'a ExpressionEngine,
    config: &'a EngineConfig,
}

impl<'a> Kernel<'a> {
    /// Assemble a kernel.
    #[must_use]
    pub fn new(
        spec: &'a Specification,
        eval: &'a ExpressionEngine,
        config: &'a EngineConfig,
    ) -> Self {
        Self { spec, eval, config }
    }

    /// Start the root net runner and advance to quiescence.
    pub fn launch(&self, case: &mut CaseState, events: &mut Vec<EngineEvent>) -> EngineResult<()> {
        let root = self.spec.root_net();
        let mut runner = RunnerState::new(case.id.clone(), root.id.clone(), None);
        runner.marking.add(root.input.clone(), 1);
        case.runners.push(runner);
        events.push(EngineEvent::CaseLaunched {
            timestamp: Utc::now(),
            case: case.id.clone(),
            spec: case.spec.clone(),
        });
        tracing::info!(case = %case.id, spec = %case.spec, "case launched");
        self.continue_case(case, events)
    }

    /// The main loop: fire every enabled task and retire every finished
    /// sub-net until no further progress is possible, then check for
    /// completion or deadlock.
    pub fn continue_case(
        &self,
        case: &mut CaseState,
        events: &mut Vec<EngineEvent>,
    ) -> EngineResult<()> {
        if case.status != CaseStatus::Running {
            return Ok(());
        }
        loop {
            let mut progressed = false;
            let runner_ids: Vec<CaseId> =
                case.runners.iter().map(|r| r.case_id.clone()).collect();
            for rid in runner_ids {
                if case.runner(&rid).is_none() {
                    continue;
                }
                for task_id in self.enabled_tasks(case, &rid)? {
                    // Earlier firings in this pass may have consumed the
                    // tokens; re-verify before firing.
                    if self.is_enabled(case, &rid, &task_id)? {
                        self.fire_task(case, &rid, &task_id, events)?;
                        progressed = true;
                    }
                }
            }
            if self.retire_finished_subnets(case, events)? {
                progressed = true;
            }
            if !progressed {
                break;
            }
        }
        self.check_termination(case, events)
    }

    // ── enablement ─────────────────────────────────────────────────────

    /// Tasks of runner `rid` whose join precondition holds, in canonical
    /// order (identity hash, tie-broken by identifier).
    fn enabled_tasks(&self, case: &CaseState, rid: &CaseId) -> EngineResult<Vec<NodeId>> {
        let runner = case.runner(rid).ok_or_else(|| {
            EngineError::from(mizzen_execution::ExecutionError::RunnerNotFound(rid.clone()))
        })?;
        let net = self.net(&runner.net)?;
        let mut enabled: Vec<NodeId> = Vec::new();
        for task in net.tasks() {
            if self.is_enabled(case, rid, &task.id)? {
                enabled.push(task.id.clone());
            }
        }
        enabled.sort_by_key(|id| (eval::identity_hash(id.as_str()), id.clone()));
        Ok(enabled)
    }

    fn is_enabled(&self, case: &CaseState, rid: &CaseId, task_id: &NodeId) -> EngineResult<bool> {
        let Some(runner) = case.runner(rid) else {
            return Ok(false);
        };
        let net = self.net(&runner.net)?;
        let Some(task) = net.task(task_id) else {
            return Ok(false);
        };
        // One live instance per task per runner; the next enablement waits
        // for the current item to reach a terminal state.
        let busy = case
            .live_items_of_runner(rid)
            .any(|wi| &wi.id.task == task_id);
        if busy || runner.marking.is_marked(task_id) {
            return Ok(false);
        }
        let preset = net.preset(task_id);
        if preset.is_empty() {
            return Ok(false);
        }
        let satisfied = match task.join {
            JoinType::And => preset.iter().all(|c| runner.marking.is_marked(c)),
            JoinType::Xor => preset.iter().any(|c| runner.marking.is_marked(c)),
            JoinType::Or => {
                preset.iter().any(|c| runner.marking.is_marked(c))
                    && match self.config.or_join_policy(task_id) {
                        OrJoinPolicy::Optimistic => true,
                        OrJoinPolicy::Informed => {
                            orjoin::analyze(
                                net,
                                &runner.marking,
                                task_id,
                                self.config.or_join_scan_limit,
                            ) == OrJoinVerdict::Fire
                        }
                    }
            }
        };
        Ok(satisfied)
    }

    // ── firing ─────────────────────────────────────────────────────────

    fn fire_task(
        &self,
        case: &mut CaseState,
        rid: &CaseId,
        task_id: &NodeId,
        events: &mut Vec<EngineEvent>,
    ) -> EngineResult<()> {
        let task = self.task(case, rid, task_id)?;
        self.consume_join_tokens(case, rid, &task)?;
        case.require_runner_mut(rid)?.marking.add(task_id.clone(), 1);
        tracing::debug!(runner = %rid, task = %task_id, "task fired");

        match &task.decomposition {
            Decomposition::None => {
                // Routing task: completes within the firing step.
                self.complete_task(case, rid, &task, None, events)
            }
            Decomposition::Atomic { .. } => {
                if let Some(mi) = task.multi_instance.clone() {
                    self.spawn_multi_instance(case, rid, &task, &mi, events)
                } else {
                    let input = eval::input_document(
                        self.eval,
                        task.mapping.input.as_deref(),
                        &case.data,
                    )?;
                    self.create_item(case, rid, &task, input, None, events)?;
                    Ok(())
                }
            }
            Decomposition::SubNet(subnet) => {
                let subnet = subnet.clone();
                if let Some(mi) = task.multi_instance.clone() {
                    self.spawn_multi_instance(case, rid, &task, &mi, events)
                } else {
                    let input = eval::input_document(
                        self.eval,
                        task.mapping.input.as_deref(),
                        &case.data,
                    )?;
                    self.expand_subnet(case, rid, &task, &subnet, input, None, events)?;
                    Ok(())
                }
            }
        }
    }

    fn consume_join_tokens(
        &self,
        case: &mut CaseState,
        rid: &CaseId,
        task: &Task,
    ) -> EngineResult<()> {
        let net = self.net_of_runner(case, rid)?;
        let preset: Vec<NodeId> = net.preset(&task.id).into_iter().cloned().collect();
        let runner = case.require_runner_mut(rid)?;
        match task.join {
            JoinType::And => {
                for condition in &preset {
                    runner.marking.remove(condition, 1)?;
                }
            }
            JoinType::Xor => {
                let Some(chosen) = preset.iter().find(|c| runner.marking.is_marked(c)) else {
                    return Err(EngineError::Specification(format!(
                        "xor-join {} fired without a marked input",
                        task.id
                    )));
                };
                runner.marking.remove(chosen, 1)?;
            }
            JoinType::Or => {
                let marked: Vec<&NodeId> =
                    preset.iter().filter(|c| runner.marking.is_marked(c)).collect();
                for condition in marked {
                    runner.marking.remove(condition, 1)?;
                }
            }
        }
        Ok(())
    }

    /// Create a work item for an atomic task instance: announce enablement,
    /// arm the enablement timer, and auto-fire when configured.
    fn create_item(
        &self,
        case: &mut CaseState,
        rid: &CaseId,
        task: &Task,
        input: Value,
        parent: Option<WorkItemId>,
        events: &mut Vec<EngineEvent>,
    ) -> EngineResult<WorkItemId> {
        let id = self.fresh_item_id(case, rid, &task.id, parent.is_some());
        let mut item = WorkItem::enabled(id.clone(), input);
        item.parent = parent;
        if let Some(timer) = &task.timer {
            if timer.trigger == TimerTrigger::OnEnablement {
                item.timer_due = Some(Utc::now() + Duration::milliseconds(timer.delay_ms as i64));
            }
        }
        case.insert_work_item(item);
        events.push(EngineEvent::WorkItemEnabled {
            timestamp: Utc::now(),
            item: id.clone(),
        });
        if self.config.automatic_firing && task.resourcing.is_none() {
            self.fire_item(case, &id, None, task, events)?;
        }
        Ok(id)
    }

    /// Transition an enabled item to fired, arming the firing timer.
    fn fire_item(
        &self,
        case: &mut CaseState,
        id: &WorkItemId,
        handle: Option<String>,
        task: &Task,
        events: &mut Vec<EngineEvent>,
    ) -> EngineResult<()> {
        let item = case.require_work_item_mut(id)?;
        item.fire(handle)?;
        if let Some(timer) = &task.timer {
            if timer.trigger == TimerTrigger::OnFiring {
                item.timer_due = Some(Utc::now() + Duration::milliseconds(timer.delay_ms as i64));
            }
        }
        events.push(EngineEvent::WorkItemFired {
            timestamp: Utc::now(),
            item: id.clone(),
        });
        Ok(())
    }

    /// Expand a composite task instance: a fired proxy item plus a child
    /// runner with a token on the sub-net's input condition.
    fn expand_subnet(
        &self,
        case: &mut CaseState,
        rid: &CaseId,
        task: &Task,
        subnet: &mizzen_core::NetId,
        input: Value,
        parent: Option<WorkItemId>,
        events: &mut Vec<EngineEvent>,
    ) -> EngineResult<WorkItemId> {
        let net = self.net(subnet)?;
        let id = self.fresh_item_id(case, rid, &task.id, parent.is_some());
        let mut item = WorkItem::enabled(id.clone(), input);
        item.parent = parent;
        case.insert_work_item(item);
        events.push(EngineEvent::WorkItemEnabled {
            timestamp: Utc::now(),
            item: id.clone(),
        });
        // The proxy is immediately fired: it represents the running sub-net.
        let item = case.require_work_item_mut(&id)?;
        item.fire(None)?;
        events.push(EngineEvent::WorkItemFired {
            timestamp: Utc::now(),
            item: id.clone(),
        });

        let child_case = case.next_child_id(rid);
        let mut runner = RunnerState::new(child_case, subnet.clone(), Some(id.clone()));
        runner.marking.add(net.input.clone(), 1);
        case.runners.push(runner);
        Ok(id)
    }

    // ── multi-instance ─────────────────────────────────────────────────

    fn spawn_multi_instance(
        &self,
        case: &mut CaseState,
        rid: &CaseId,
        task: &Task,
        mi: &MultiInstance,
        events: &mut Vec<EngineEvent>,
    ) -> EngineResult<()> {
        let elements = multi_instance::accessor_elements(self.eval, &mi.accessor, &case.data)?;
        if elements.len() < mi.min as usize {
            return Err(EngineError::Specification(format!(
                "multi-instance task {}: accessor produced {} element(s), min is {}",
                task.id,
                elements.len(),
                mi.min
            )));
        }
        let spawn = elements.len().min(mi.max as usize);

        let parent_id = self.fresh_item_id(case, rid, &task.id, false);
        let mut parent = WorkItem::enabled(parent_id.clone(), Value::Null);
        parent.mi = Some(MiProgress::default());
        case.insert_work_item(parent);
        events.push(EngineEvent::WorkItemEnabled {
            timestamp: Utc::now(),
            item: parent_id.clone(),
        });
        // The parent is engine-managed: fired for its whole life.
        case.require_work_item_mut(&parent_id)?.fire(None)?;
        events.push(EngineEvent::WorkItemFired {
            timestamp: Utc::now(),
            item: parent_id.clone(),
        });

        for element in elements.iter().take(spawn) {
            self.spawn_mi_child(case, rid, task, mi, &parent_id, element, events)?;
        }
        Ok(())
    }

    fn spawn_mi_child(
        &self,
        case: &mut CaseState,
        rid: &CaseId,
        task: &Task,
        mi: &MultiInstance,
        parent_id: &WorkItemId,
        element: &Value,
        events: &mut Vec<EngineEvent>,
    ) -> EngineResult<WorkItemId> {
        let input = multi_instance::child_input(self.eval, mi.splitter.as_deref(), &case.data, element)?;
        {
            let parent = case.require_work_item_mut(parent_id)?;
            if let Some(progress) = parent.mi.as_mut() {
                progress.created += 1;
            }
        }
        match &task.decomposition {
            Decomposition::SubNet(subnet) => {
                let subnet = subnet.clone();
                self.expand_subnet(case, rid, task, &subnet, input, Some(parent_id.clone()), events)
            }
            _ => self.create_item(case, rid, task, input, Some(parent_id.clone()), events),
        }
    }

    /// Dynamically add a child to a running multi-instance task.
    pub fn add_mi_instance(
        &self,
        case: &mut CaseState,
        parent_id: &WorkItemId,
        element: &Value,
        events: &mut Vec<EngineEvent>,
    ) -> EngineResult<WorkItemId> {
        self.require_running(case)?;
        let task = self.task_of_item(case, parent_id)?;
        let Some(mi) = task.multi_instance.clone() else {
            return Err(EngineError::Conflict(format!(
                "work item {parent_id} is not a multi-instance parent"
            )));
        };
        if mi.creation != CreationMode::Dynamic {
            return Err(EngineError::Conflict(format!(
                "multi-instance task {} uses static creation",
                task.id
            )));
        }
        let parent = case
            .work_item(parent_id)
            .ok_or_else(|| EngineError::WorkItemNotFound(parent_id.clone()))?;
        let Some(progress) = &parent.mi else {
            return Err(EngineError::Conflict(format!(
                "work item {parent_id} is not a multi-instance parent"
            )));
        };
        if progress.threshold_met || !parent.is_live() {
            return Err(EngineError::Conflict(format!(
                "multi-instance task {} is already complete",
                task.id
            )));
        }
        if progress.created >= mi.max {
            return Err(EngineError::Conflict(format!(
                "multi-instance task {} is at its max of {}",
                task.id, mi.max
            )));
        }
        let rid = parent_id.case.clone();
        let id = self.spawn_mi_child(case, &rid, &task, &mi, parent_id, element, events)?;
        self.continue_case(case, events)?;
        Ok(id)
    }

    fn record_mi_child_completion(
        &self,
        case: &mut CaseState,
        parent_id: &WorkItemId,
        child_id: &WorkItemId,
        output: Value,
        events: &mut Vec<EngineEvent>,
    ) -> EngineResult<()> {
        let task = self.task_of_item(case, parent_id)?;
        let Some(mi) = task.multi_instance.clone() else {
            return Err(EngineError::Conflict(format!(
                "work item {parent_id} is not a multi-instance parent"
            )));
        };
        let index = child_id.index.unwrap_or(0);

        let threshold_already_met = {
            let parent = case.require_work_item_mut(parent_id)?;
            let Some(progress) = parent.mi.as_mut() else {
                return Err(EngineError::Conflict(format!(
                    "work item {parent_id} is not a multi-instance parent"
                )));
            };
            if progress.threshold_met {
                true
            } else {
                progress.completed.push((index, output));
                false
            }
        };

        if threshold_already_met {
            // Late child under the continue policy: its output is discarded.
            tracing::warn!(parent = %parent_id, child = %child_id, "discarding late multi-instance output");
            events.push(EngineEvent::ExceptionRaised {
                timestamp: Utc::now(),
                case: case.id.clone(),
                item: Some(child_id.clone()),
                code: "discarded_late_output".into(),
                message: format!("child of {parent_id} completed after threshold"),
            });
            return Ok(());
        }

        let completed_count = case
            .work_item(parent_id)
            .and_then(|p| p.mi.as_ref())
            .map_or(0, |p| p.completed.len());
        if completed_count < mi.threshold as usize {
            return Ok(());
        }

        // Threshold reached: aggregate, settle remaining children, and
        // complete the task.
        let completed = case
            .work_item(parent_id)
            .and_then(|p| p.mi.as_ref())
            .map(|p| p.completed.clone())
            .unwrap_or_default();
        let aggregated = multi_instance::aggregate(
            self.eval,
            mi.aggregator.as_deref(),
            &case.data,
            &completed,
            mi.ordered_by_creation,
        )?;
        if let Some(progress) = case
            .require_work_item_mut(parent_id)?
            .mi
            .as_mut()
        {
            progress.threshold_met = true;
        }

        if mi.continuation == ContinuationPolicy::Cancel {
            let remaining: Vec<WorkItemId> = case
                .live_items()
                .filter(|wi| wi.parent.as_ref() == Some(parent_id))
                .map(|wi| wi.id.clone())
                .collect();
            for child in remaining {
                cancellation::cancel_cascade(case, &child, events)?;
            }
        }

        let parent = case.require_work_item_mut(parent_id)?;
        parent.complete(aggregated.clone())?;
        events.push(EngineEvent::WorkItemCompleted {
            timestamp: Utc::now(),
            item: parent_id.clone(),
            output: aggregated.clone(),
        });
        let rid = parent_id.case.clone();
        self.complete_task(case, &rid, &task, Some(aggregated), events)
    }

    // ── task completion ────────────────────────────────────────────────

    /// Finish a task instance: release the busy token, merge output,
    /// execute the cancellation region, and emit split tokens.
    fn complete_task(
        &self,
        case: &mut CaseState,
        rid: &CaseId,
        task: &Task,
        output: Option<Value>,
        events: &mut Vec<EngineEvent>,
    ) -> EngineResult<()> {
        case.require_runner_mut(rid)?.marking.remove(&task.id, 1)?;

        // Output lands before predicates run, so routing sees the result.
        if let Some(output) = output {
            eval::merge_output(&mut case.data, task.mapping.output_target.as_deref(), output);
        }

        // Region before emission: no observer sees outputs alongside stale
        // region tokens.
        if !task.cancellation_region.is_empty() {
            cancellation::execute_region(case, rid, &task.cancellation_region, events)?;
        }

        let net = self.net_of_runner(case, rid)?;
        let flows: Vec<mizzen_spec::Flow> =
            net.flows_out(&task.id).cloned().collect();
        let mut emit: Vec<NodeId> = Vec::new();
        match task.split {
            SplitType::And => {
                emit.extend(flows.iter().map(|f| f.target.clone()));
            }
            SplitType::Xor => {
                let mut chosen = None;
                for flow in flows.iter().filter(|f| !f.is_default) {
                    if eval::flow_predicate(self.eval, flow, &case.data)? {
                        chosen = Some(flow.target.clone());
                        break;
                    }
                }
                let chosen = chosen.or_else(|| {
                    flows
                        .iter()
                        .find(|f| f.is_default)
                        .map(|f| f.target.clone())
                });
                match chosen {
                    Some(target) => emit.push(target),
                    None if flows.is_empty() => {}
                    None => {
                        return Err(EngineError::Specification(format!(
                            "xor-split {}: no branch eligible and no default",
                            task.id
                        )));
                    }
                }
            }
            SplitType::Or => {
                for flow in flows.iter().filter(|f| !f.is_default) {
                    if eval::flow_predicate(self.eval, flow, &case.data)? {
                        emit.push(flow.target.clone());
                    }
                }
                if emit.is_empty() {
                    match flows.iter().find(|f| f.is_default) {
                        Some(flow) => emit.push(flow.target.clone()),
                        None if flows.is_empty() => {}
                        None => {
                            return Err(EngineError::Specification(format!(
                                "or-split {}: no branch eligible and no default",
                                task.id
                            )));
                        }
                    }
                }
            }
        }
        let runner = case.require_runner_mut(rid)?;
        for target in emit {
            runner.marking.add(target, 1);
        }
        tracing::debug!(runner = %rid, task = %task.id, "task completed");
        Ok(())
    }

    /// Retire sub-net runners that reached their completion predicate,
    /// deepest first. Returns `true` if any runner was retired.
    fn retire_finished_subnets(
        &self,
        case: &mut CaseState,
        events: &mut Vec<EngineEvent>,
    ) -> EngineResult<bool> {
        let mut candidates: Vec<CaseId> = case
            .runners
            .iter()
            .filter(|r| r.parent.is_some())
            .map(|r| r.case_id.clone())
            .collect();
        candidates.sort_by_key(|id| std::cmp::Reverse(id.depth()));

        let mut retired = false;
        for rid in candidates {
            let Some(runner) = case.runner(&rid) else {
                continue;
            };
            let net = self.net(&runner.net)?;
            let finished = runner.marking.is_marked(&net.output)
                && case.live_items_of_runner(&rid).next().is_none()
                && self.enabled_tasks(case, &rid)?.is_empty();
            if !finished {
                continue;
            }
            let Some(removed) = case.remove_runner(&rid) else {
                continue;
            };
            let Some(proxy_id) = removed.parent else {
                continue;
            };
            tracing::debug!(runner = %rid, proxy = %proxy_id, "sub-net completed");

            // The sub-net wrote through the shared case document, so the
            // proxy's own output document is empty.
            let parent = case.require_work_item_mut(&proxy_id)?;
            let mi_parent = parent.parent.clone();
            parent.complete(json!({}))?;
            events.push(EngineEvent::WorkItemCompleted {
                timestamp: Utc::now(),
                item: proxy_id.clone(),
                output: json!({}),
            });

            let task = self.task_of_item(case, &proxy_id)?;
            match mi_parent {
                Some(mi_parent_id) => {
                    self.record_mi_child_completion(
                        case,
                        &mi_parent_id,
                        &proxy_id,
                        json!({}),
                        events,
                    )?;
                }
                None => {
                    let parent_rid = proxy_id.case.clone();
                    self.complete_task(case, &parent_rid, &task, None, events)?;
                }
            }
            retired = true;
        }
        Ok(retired)
    }

    // ── external work item operations ──────────────────────────────────

    /// Check out an enabled work item.
    pub fn checkout_item(
        &self,
        case: &mut CaseState,
        id: &WorkItemId,
        handle: Option<String>,
        events: &mut Vec<EngineEvent>,
    ) -> EngineResult<WorkItem> {
        self.require_running(case)?;
        let task = self.task_of_item(case, id)?;
        self.guard_engine_managed(case, id, &task)?;
        self.fire_item(case, id, handle, &task, events)?;
        case.work_item(id)
            .cloned()
            .ok_or_else(|| EngineError::WorkItemNotFound(id.clone()))
    }

    /// Mark a fired item as executing.
    pub fn start_item(
        &self,
        case: &mut CaseState,
        id: &WorkItemId,
        events: &mut Vec<EngineEvent>,
    ) -> EngineResult<()> {
        self.require_running(case)?;
        case.require_work_item_mut(id)?
            .transition_to(WorkItemStatus::Executing)?;
        events.push(EngineEvent::WorkItemExecuting {
            timestamp: Utc::now(),
            item: id.clone(),
        });
        Ok(())
    }

    /// Suspend an executing item.
    pub fn suspend_item(
        &self,
        case: &mut CaseState,
        id: &WorkItemId,
        events: &mut Vec<EngineEvent>,
    ) -> EngineResult<()> {
        self.require_running(case)?;
        case.require_work_item_mut(id)?
            .transition_to(WorkItemStatus::Suspended)?;
        events.push(EngineEvent::WorkItemSuspended {
            timestamp: Utc::now(),
            item: id.clone(),
        });
        Ok(())
    }

    /// Resume a suspended item.
    pub fn resume_item(
        &self,
        case: &mut CaseState,
        id: &WorkItemId,
        events: &mut Vec<EngineEvent>,
    ) -> EngineResult<()> {
        self.require_running(case)?;
        case.require_work_item_mut(id)?
            .transition_to(WorkItemStatus::Executing)?;
        events.push(EngineEvent::WorkItemResumed {
            timestamp: Utc::now(),
            item: id.clone(),
        });
        Ok(())
    }

    /// Complete a work item with an output document and advance the case.
    pub fn complete_item(
        &self,
        case: &mut CaseState,
        id: &WorkItemId,
        output: Value,
        events: &mut Vec<EngineEvent>,
    ) -> EngineResult<CompletionOutcome> {
        self.require_running(case)?;
        let task = self.task_of_item(case, id)?;
        self.guard_engine_managed(case, id, &task)?;
        self.settle_item(case, id, &task, output, events)
    }

    /// The completion path shared by external check-in, timer default
    /// completion, and RDR force-complete.
    fn settle_item(
        &self,
        case: &mut CaseState,
        id: &WorkItemId,
        task: &Task,
        output: Value,
        events: &mut Vec<EngineEvent>,
    ) -> EngineResult<CompletionOutcome> {
        let item = case.require_work_item_mut(id)?;
        let parent = item.parent.clone();
        let outcome = item.complete(output.clone())?;
        if outcome == CompletionOutcome::AlreadyCompleted {
            return Ok(outcome);
        }
        events.push(EngineEvent::WorkItemCompleted {
            timestamp: Utc::now(),
            item: id.clone(),
            output: output.clone(),
        });
        match parent {
            Some(mi_parent) => {
                self.record_mi_child_completion(case, &mi_parent, id, output, events)?;
            }
            None => {
                let rid = id.case.clone();
                self.complete_task(case, &rid, task, Some(output), events)?;
            }
        }
        self.continue_case(case, events)?;
        Ok(outcome)
    }

    /// Fail a work item, run the exception rules, and advance the case.
    pub fn fail_item(
        &self,
        case: &mut CaseState,
        id: &WorkItemId,
        reason: &str,
        events: &mut Vec<EngineEvent>,
    ) -> EngineResult<()> {
        self.require_running(case)?;
        let task = self.task_of_item(case, id)?;
        self.guard_engine_managed(case, id, &task)?;

        let action = self
            .config
            .exception_rules
            .as_ref()
            .and_then(|tree| tree.evaluate(self.eval, &case.data));

        if let Some(ExceptionAction::ForceComplete(output)) = action {
            // The rule substitutes an output for the failure.
            events.push(EngineEvent::ExceptionRaised {
                timestamp: Utc::now(),
                case: case.id.clone(),
                item: Some(id.clone()),
                code: "handler_failure".into(),
                message: format!("{reason} (force-completed by exception rule)"),
            });
            self.settle_item(case, id, &task, output, events)?;
            return Ok(());
        }

        case.require_work_item_mut(id)?.fail(reason)?;
        events.push(EngineEvent::WorkItemFailed {
            timestamp: Utc::now(),
            item: id.clone(),
            reason: reason.to_string(),
        });
        events.push(EngineEvent::ExceptionRaised {
            timestamp: Utc::now(),
            case: case.id.clone(),
            item: Some(id.clone()),
            code: "handler_failure".into(),
            message: reason.to_string(),
        });
        tracing::warn!(item = %id, reason, "work item failed");

        if let Some(ExceptionAction::SuspendCase) = action {
            case.transition_status(CaseStatus::Suspended)?;
            events.push(EngineEvent::CaseSuspended {
                timestamp: Utc::now(),
                case: case.id.clone(),
            });
            return Ok(());
        }
        self.continue_case(case, events)
    }

    // ── timers ─────────────────────────────────────────────────────────

    /// Process a timer expiry popped by the timer service. Stale entries
    /// (the item moved on, or the case is no longer running) are announced
    /// as discarded anomalies, never silently dropped.
    pub fn timer_fired(
        &self,
        case: &mut CaseState,
        id: &WorkItemId,
        due: chrono::DateTime<Utc>,
        events: &mut Vec<EngineEvent>,
    ) -> EngineResult<()> {
        let stale_reason = if case.status != CaseStatus::Running {
            Some(format!("case is {}", case.status))
        } else {
            match case.work_item(id) {
                None => Some("work item no longer exists".to_string()),
                Some(wi) if !wi.is_live() => Some(format!("work item is {}", wi.status)),
                Some(wi) if wi.timer_due != Some(due) => Some("timer was re-armed".to_string()),
                Some(_) => None,
            }
        };
        if let Some(reason) = stale_reason {
            events.push(EngineEvent::ExceptionRaised {
                timestamp: Utc::now(),
                case: case.id.clone(),
                item: Some(id.clone()),
                code: "duplicate_timer_fire".into(),
                message: reason,
            });
            return Ok(());
        }

        events.push(EngineEvent::TimerFired {
            timestamp: Utc::now(),
            item: id.clone(),
        });
        case.require_work_item_mut(id)?.timer_due = None;

        let task = self.task_of_item(case, id)?;
        let Some(timer) = task.timer.clone() else {
            return Ok(());
        };
        match timer.policy {
            ExpiryPolicy::ExpireSilently => {
                let is_mi_child = case
                    .work_item(id)
                    .is_some_and(|wi| wi.parent.is_some());
                cancellation::cancel_cascade(case, id, events)?;
                // A plain item is the task's whole instance: expiring it
                // spends the busy token too. MI children leave the parent's
                // token in place.
                let rid = id.case.clone();
                if !is_mi_child && case.runner(&rid).is_some() {
                    case.require_runner_mut(&rid)?.marking.remove(&task.id, 1)?;
                }
                self.continue_case(case, events)
            }
            ExpiryPolicy::CompleteWithDefault(output) => {
                if case
                    .work_item(id)
                    .is_some_and(|wi| wi.status == WorkItemStatus::Enabled)
                {
                    self.fire_item(case, id, None, &task, events)?;
                }
                self.settle_item(case, id, &task, output, events)?;
                Ok(())
            }
            ExpiryPolicy::RaiseException => {
                if case
                    .work_item(id)
                    .is_some_and(|wi| wi.status == WorkItemStatus::Enabled)
                {
                    self.fire_item(case, id, None, &task, events)?;
                }
                self.fail_item(case, id, "timer expired", events)
            }
        }
    }

    // ── case-level controls ────────────────────────────────────────────

    /// Cancel the whole case: every live item is invalidated, runners are
    /// torn down depth-first, and the case lands cancelled.
    pub fn cancel_case(
        &self,
        case: &mut CaseState,
        events: &mut Vec<EngineEvent>,
    ) -> EngineResult<()> {
        if case.status.is_terminal() {
            return Err(EngineError::Conflict(format!(
                "case {} is already {}",
                case.id, case.status
            )));
        }
        case.cancelling = true;
        let mut runner_ids: Vec<CaseId> =
            case.runners.iter().map(|r| r.case_id.clone()).collect();
        runner_ids.sort_by_key(|id| std::cmp::Reverse(id.depth()));
        for rid in runner_ids {
            let victims: Vec<WorkItemId> = case
                .live_items_of_runner(&rid)
                .map(|wi| wi.id.clone())
                .collect();
            for victim in victims {
                cancellation::cancel_cascade(case, &victim, events)?;
            }
        }
        case.runners.clear();
        case.cancelling = false;
        case.transition_status(CaseStatus::Cancelled)?;
        events.push(EngineEvent::CaseCancelled {
            timestamp: Utc::now(),
            case: case.id.clone(),
        });
        tracing::info!(case = %case.id, "case cancelled");
        Ok(())
    }

    /// Suspend the case.
    pub fn suspend_case(
        &self,
        case: &mut CaseState,
        events: &mut Vec<EngineEvent>,
    ) -> EngineResult<()> {
        case.transition_status(CaseStatus::Suspended)?;
        events.push(EngineEvent::CaseSuspended {
            timestamp: Utc::now(),
            case: case.id.clone(),
        });
        Ok(())
    }

    /// Resume a suspended case and advance anything that accrued.
    pub fn resume_case(
        &self,
        case: &mut CaseState,
        events: &mut Vec<EngineEvent>,
    ) -> EngineResult<()> {
        case.transition_status(CaseStatus::Running)?;
        events.push(EngineEvent::CaseResumed {
            timestamp: Utc::now(),
            case: case.id.clone(),
        });
        self.continue_case(case, events)
    }

    // ── termination ────────────────────────────────────────────────────

    fn check_termination(
        &self,
        case: &mut CaseState,
        events: &mut Vec<EngineEvent>,
    ) -> EngineResult<()> {
        if case.status != CaseStatus::Running {
            return Ok(());
        }
        let Some(root) = case.root_runner() else {
            return Ok(());
        };
        let net = self.net(&root.net)?;
        let output_marked = root.marking.is_marked(&net.output);

        if case.has_live_items() {
            return Ok(());
        }
        let mut any_enabled = false;
        let runner_ids: Vec<CaseId> = case.runners.iter().map(|r| r.case_id.clone()).collect();
        for rid in runner_ids {
            if !self.enabled_tasks(case, &rid)?.is_empty() {
                any_enabled = true;
                break;
            }
        }
        if any_enabled {
            return Ok(());
        }

        if output_marked {
            case.transition_status(CaseStatus::Completed)?;
            events.push(EngineEvent::CaseCompleted {
                timestamp: Utc::now(),
                case: case.id.clone(),
            });
            tracing::info!(case = %case.id, "case completed");
        } else {
            case.transition_status(CaseStatus::Deadlocked)?;
            events.push(EngineEvent::CaseDeadlocked {
                timestamp: Utc::now(),
                case: case.id.clone(),
            });
            tracing::warn!(case = %case.id, "case deadlocked");
        }
        Ok(())
    }

    // ── lookups ────────────────────────────────────────────────────────

    fn require_running(&self, case: &CaseState) -> EngineResult<()> {
        if case.status == CaseStatus::Running {
            Ok(())
        } else {
            Err(EngineError::CaseNotActive {
                case: case.id.clone(),
                status: case.status,
            })
        }
    }

    /// Reject external operations on engine-managed items: composite
    /// proxies and multi-instance parents complete through the runner.
    fn guard_engine_managed(
        &self,
        case: &CaseState,
        id: &WorkItemId,
        task: &Task,
    ) -> EngineResult<()> {
        let is_mi_parent = case
            .work_item(id)
            .is_some_and(|wi| wi.mi.is_some());
        if task.is_composite() || is_mi_parent {
            return Err(EngineError::Conflict(format!(
                "work item {id} is engine-managed"
            )));
        }
        Ok(())
    }

    fn net(&self, id: &mizzen_core::NetId) -> EngineResult<&'a mizzen_spec::Net> {
        self.spec
            .net(id)
            .ok_or_else(|| EngineError::Specification(format!("unknown net {id}")))
    }

    fn net_of_runner(&self, case: &CaseState, rid: &CaseId) -> EngineResult<&'a mizzen_spec::Net> {
        let runner = case.runner(rid).ok_or_else(|| {
            EngineError::from(mizzen_execution::ExecutionError::RunnerNotFound(rid.clone()))
        })?;
        self.net(&runner.net)
    }

    fn task(&self, case: &CaseState, rid: &CaseId, task_id: &NodeId) -> EngineResult<Task> {
        self.net_of_runner(case, rid)?
            .task(task_id)
            .cloned()
            .ok_or_else(|| EngineError::Specification(format!("unknown task {task_id}")))
    }

    /// The task a work item instantiates, resolved through its runner.
    /// Falls back to a specification-wide search when the runner is
    /// already gone (completion of the last item may retire it first).
    fn task_of_item(&self, case: &CaseState, id: &WorkItemId) -> EngineResult<Task> {
        if case.work_item(id).is_none() {
            return Err(EngineError::WorkItemNotFound(id.clone()));
        }
        if case.runner(&id.case).is_some() {
            return self.task(case, &id.case, &id.task);
        }
        self.spec
            .net_of_node(&id.task)
            .and_then(|net| net.task(&id.task))
            .cloned()
            .ok_or_else(|| EngineError::Specification(format!("unknown task {}", id.task)))
    }

    fn fresh_item_id(
        &self,
        case: &CaseState,
        rid: &CaseId,
        task_id: &NodeId,
        indexed: bool,
    ) -> WorkItemId {
        let base = WorkItemId::new(rid.clone(), task_id.clone());
        if !indexed && !case.work_items.contains_key(&base) {
            return base;
        }
        let next = case
            .work_items
            .keys()
            .filter(|id| id.case == *rid && id.task == *task_id)
            .map(|id| id.index.map_or(0, |i| i + 1))
            .max()
            .unwrap_or(0);
        WorkItemId::instance(rid.clone(), task_id.clone(), next)
    }
}
