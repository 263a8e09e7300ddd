//! Cancellation: region execution and cascading work item teardown.
//!
//! A cancellation region is executed inside the owning task's completion
//! mutation, after data merge and before output emission, so no observer
//! ever sees emitted outputs alongside stale region tokens. Cancelling a
//! composite proxy tears its sub-net runner down with it; the walk is
//! iterative so nesting depth never threatens the call stack.

use chrono::Utc;
use mizzen_core::{CaseId, NodeId, WorkItemId};
use mizzen_execution::{CaseState, EngineEvent};

use crate::error::EngineResult;

/// Execute a task's cancellation region within runner `rid`: every listed
/// node loses all tokens, and every live work item of a listed task is
/// cancelled (cascading into sub-nets).
pub fn execute_region(
    case: &mut CaseState,
    rid: &CaseId,
    region: &[NodeId],
    events: &mut Vec<EngineEvent>,
) -> EngineResult<()> {
    for node in region {
        let removed = case.require_runner_mut(rid)?.marking.clear(node);
        if removed > 0 {
            tracing::debug!(runner = %rid, node = %node, removed, "cancellation region cleared tokens");
        }
        let victims: Vec<WorkItemId> = case
            .live_items_of_runner(rid)
            .filter(|wi| &wi.id.task == node)
            .map(|wi| wi.id.clone())
            .collect();
        for victim in victims {
            cancel_cascade(case, &victim, events)?;
        }
    }
    Ok(())
}

/// Cancel a work item and everything hanging off it: sub-net runners of
/// composite proxies, and their items in turn. Items already terminal are
/// left alone.
pub fn cancel_cascade(
    case: &mut CaseState,
    item: &WorkItemId,
    events: &mut Vec<EngineEvent>,
) -> EngineResult<()> {
    let mut pending: Vec<WorkItemId> = vec![item.clone()];
    while let Some(id) = pending.pop() {
        let Some(wi) = case.work_item_mut(&id) else {
            continue;
        };
        if !wi.is_live() {
            continue;
        }
        wi.cancel()?;
        events.push(EngineEvent::WorkItemCancelled {
            timestamp: Utc::now(),
            item: id.clone(),
        });

        // Tear down the sub-net runner this proxy expanded, if any, and
        // queue its items.
        let expanded: Vec<CaseId> = case
            .runners
            .iter()
            .filter(|r| r.parent.as_ref() == Some(&id))
            .map(|r| r.case_id.clone())
            .collect();
        for runner_id in expanded {
            case.remove_runner(&runner_id);
            pending.extend(
                case.live_items_of_runner(&runner_id)
                    .map(|wi| wi.id.clone()),
            );
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use mizzen_core::{NetId, SpecKey};
    use mizzen_execution::{RunnerState, WorkItem, WorkItemStatus};
    use serde_json::json;

    fn case_with_root() -> CaseState {
        let mut case = CaseState::new(CaseId::root(1), SpecKey::new("u", "1"), json!({}));
        case.runners.push(RunnerState::new(
            case.id.clone(),
            NetId::new("root"),
            None,
        ));
        case
    }

    #[test]
    fn region_clears_tokens_and_cancels_items() {
        let mut case = case_with_root();
        let rid = case.id.clone();
        case.runner_mut(&rid)
            .unwrap()
            .marking
            .add(NodeId::new("c"), 2);
        let mut victim = WorkItem::enabled("1:u".parse().unwrap(), json!({}));
        victim.fire(None).unwrap();
        case.insert_work_item(victim);

        let mut events = Vec::new();
        execute_region(
            &mut case,
            &rid,
            &[NodeId::new("c"), NodeId::new("u")],
            &mut events,
        )
        .unwrap();

        assert_eq!(case.runner(&rid).unwrap().marking.count(&NodeId::new("c")), 0);
        let victim = case.work_item(&"1:u".parse().unwrap()).unwrap();
        assert_eq!(victim.status, WorkItemStatus::Cancelled);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind(), "workitem_cancelled");
    }

    #[test]
    fn cascade_tears_down_nested_runners() {
        let mut case = case_with_root();
        // proxy in root expands runner 1.1; an item lives there, and a
        // deeper proxy expands 1.2 with its own item.
        let proxy: WorkItemId = "1:sub".parse().unwrap();
        let mut proxy_item = WorkItem::enabled(proxy.clone(), json!({}));
        proxy_item.fire(None).unwrap();
        case.insert_work_item(proxy_item);
        let sub: CaseId = "1.1".parse().unwrap();
        case.runners.push(RunnerState::new(
            sub.clone(),
            NetId::new("subnet"),
            Some(proxy.clone()),
        ));
        case.insert_work_item(WorkItem::enabled("1.1:a".parse().unwrap(), json!({})));

        let deep_proxy: WorkItemId = "1.1:deeper".parse().unwrap();
        let mut deep_item = WorkItem::enabled(deep_proxy.clone(), json!({}));
        deep_item.fire(None).unwrap();
        case.insert_work_item(deep_item);
        let deep: CaseId = "1.2".parse().unwrap();
        case.runners.push(RunnerState::new(
            deep.clone(),
            NetId::new("subsub"),
            Some(deep_proxy.clone()),
        ));
        case.insert_work_item(WorkItem::enabled("1.2:b".parse().unwrap(), json!({})));

        let mut events = Vec::new();
        cancel_cascade(&mut case, &proxy, &mut events).unwrap();

        for id in ["1:sub", "1.1:a", "1.1:deeper", "1.2:b"] {
            let wi = case.work_item(&id.parse().unwrap()).unwrap();
            assert_eq!(wi.status, WorkItemStatus::Cancelled, "{id}");
        }
        assert!(case.runner(&sub).is_none());
        assert!(case.runner(&deep).is_none());
        assert_eq!(events.len(), 4);
    }

    #[test]
    fn terminal_items_are_left_alone() {
        let mut case = case_with_root();
        let mut done = WorkItem::enabled("1:done".parse().unwrap(), json!({}));
        done.fire(None).unwrap();
        done.complete(json!({})).unwrap();
        case.insert_work_item(done);

        let mut events = Vec::new();
        cancel_cascade(&mut case, &"1:done".parse().unwrap(), &mut events).unwrap();
        assert!(events.is_empty());
        let wi = case.work_item(&"1:done".parse().unwrap()).unwrap();
        assert_eq!(wi.status, WorkItemStatus::Completed);
    }
}
