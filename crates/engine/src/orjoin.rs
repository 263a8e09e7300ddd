//! Informed OR-join analysis.
//!
//! An OR-join may only fire once no further token can ever arrive on any
//! of its unsatisfied inputs. That question is answered by a bounded
//! exploration of an over-approximating abstraction of the net:
//!
//! - the structural predecessor closure of the unsatisfied inputs is
//!   computed on the net graph (anything outside it can never contribute
//!   a token, so its tokens are pruned);
//! - busy tasks are assumed to complete and emit on *every* outgoing
//!   flow (a superset of any real split decision);
//! - XOR-joins branch over every marked input, OR-joins fire as soon as
//!   any input is marked.
//!
//! The abstraction reaches a superset of the real net's markings, so
//! "no reachable abstract marking touches an unsatisfied input" is a
//! sound "no more tokens can arrive". Exhausting the state budget is
//! answered conservatively: the join defers.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

use mizzen_core::NodeId;
use mizzen_execution::Marking;
use mizzen_spec::{JoinType, Net};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::{Bfs, Reversed};

/// The analysis outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrJoinVerdict {
    /// No further token can arrive; the join may fire now.
    Fire,
    /// A token may still arrive (or the budget ran out); wait.
    Defer,
}

type AbstractMarking = BTreeMap<NodeId, u32>;

/// Decide whether the OR-join `join` may fire under the given marking.
///
/// `scan_limit` bounds the number of abstract states visited.
#[must_use]
pub fn analyze(net: &Net, marking: &Marking, join: &NodeId, scan_limit: usize) -> OrJoinVerdict {
    let preset: Vec<NodeId> = net.preset(join).into_iter().cloned().collect();
    let unsatisfied: Vec<NodeId> = preset
        .iter()
        .filter(|c| !marking.is_marked(c))
        .cloned()
        .collect();
    if unsatisfied.is_empty() {
        return OrJoinVerdict::Fire;
    }

    let closure = predecessor_closure(net, &unsatisfied);

    // Residual marking over the closure: satisfied inputs lose the one
    // token the join would consume; everything outside the closure is
    // pruned.
    let mut initial: AbstractMarking = BTreeMap::new();
    for (node, count) in marking.marked_nodes() {
        let count = if preset.contains(node) { count - 1 } else { count };
        if count > 0 && closure.contains(node) {
            initial.insert(node.clone(), count);
        }
    }

    // Busy tasks complete eventually: replace their tokens with emissions
    // on every outgoing flow.
    let mut queue: VecDeque<AbstractMarking> = VecDeque::new();
    queue.push_back(expand_busy_tasks(net, &closure, initial));

    let mut visited: HashSet<AbstractMarking> = HashSet::new();
    while let Some(state) = queue.pop_front() {
        if unsatisfied.iter().any(|c| state.contains_key(c)) {
            return OrJoinVerdict::Defer;
        }
        if !visited.insert(state.clone()) {
            continue;
        }
        if visited.len() > scan_limit {
            tracing::debug!(join = %join, limit = scan_limit, "or-join budget exhausted, deferring");
            return OrJoinVerdict::Defer;
        }

        for task in net.tasks().filter(|t| &t.id != join && closure.contains(&t.id)) {
            let task_preset: Vec<&NodeId> = net.preset(&task.id);
            let marked: Vec<&NodeId> = task_preset
                .iter()
                .copied()
                .filter(|c| state.contains_key(*c))
                .collect();
            if marked.is_empty() {
                continue;
            }

            // Consumption alternatives per join abstraction.
            let consumptions: Vec<Vec<&NodeId>> = match task.join {
                JoinType::And => {
                    if marked.len() == task_preset.len() {
                        vec![task_preset.clone()]
                    } else {
                        continue;
                    }
                }
                JoinType::Xor => marked.iter().map(|c| vec![*c]).collect(),
                JoinType::Or => vec![marked.clone()],
            };

            for consumed in consumptions {
                let mut next = state.clone();
                let mut ok = true;
                for condition in consumed {
                    match next.get_mut(condition) {
                        Some(count) if *count > 1 => *count -= 1,
                        Some(_) => {
                            next.remove(condition);
                        }
                        None => {
                            ok = false;
                            break;
                        }
                    }
                }
                if !ok {
                    continue;
                }
                // Completion emits on every outgoing flow (superset of
                // any split decision).
                for flow in net.flows_out(&task.id) {
                    if closure.contains(&flow.target) {
                        *next.entry(flow.target.clone()).or_insert(0) += 1;
                    }
                }
                if !visited.contains(&next) {
                    queue.push_back(next);
                }
            }
        }
    }

    OrJoinVerdict::Fire
}

/// Replace busy-task tokens with emissions on every outgoing flow: a busy
/// task will complete eventually, and the abstraction assumes it emits on
/// all branches.
fn expand_busy_tasks(
    net: &Net,
    closure: &HashSet<NodeId>,
    mut marking: AbstractMarking,
) -> AbstractMarking {
    let busy: Vec<(NodeId, u32)> = marking
        .iter()
        .filter(|(node, _)| net.is_task(node))
        .map(|(node, &count)| (node.clone(), count))
        .collect();
    for (task, count) in busy {
        marking.remove(&task);
        for flow in net.flows_out(&task) {
            if closure.contains(&flow.target) {
                *marking.entry(flow.target.clone()).or_insert(0) += count;
            }
        }
    }
    marking
}

/// Nodes from which a token could structurally reach any of `targets`.
fn predecessor_closure(net: &Net, targets: &[NodeId]) -> HashSet<NodeId> {
    let mut graph: DiGraph<NodeId, ()> = DiGraph::new();
    let mut indices: HashMap<NodeId, NodeIndex> = HashMap::new();

    for task in net.tasks() {
        indices.insert(task.id.clone(), graph.add_node(task.id.clone()));
    }
    for condition in net.conditions() {
        indices.insert(condition.id.clone(), graph.add_node(condition.id.clone()));
    }
    for flow in net.flows() {
        if let (Some(&src), Some(&dst)) = (indices.get(&flow.source), indices.get(&flow.target)) {
            graph.add_edge(src, dst, ());
        }
    }

    let reversed = Reversed(&graph);
    let mut closure = HashSet::new();
    for target in targets {
        let Some(&start) = indices.get(target) else {
            continue;
        };
        let mut bfs = Bfs::new(reversed, start);
        while let Some(index) = bfs.next(reversed) {
            closure.insert(graph[index].clone());
        }
    }
    closure
}

#[cfg(test)]
mod tests {
    use super::*;
    use mizzen_spec::{NetBuilder, SpecificationBuilder, TaskBuilder};

    /// in -> w -> (p | q) ; p -> j, q -> j ; j(or-join) -> out
    ///
    /// `w` XOR-splits to conditions p and q feeding the OR-join j.
    fn diamond_net() -> mizzen_spec::Specification {
        SpecificationBuilder::new("u", "1")
            .net(
                NetBuilder::new("root")
                    .condition("p")
                    .condition("q")
                    .task(TaskBuilder::routing("w").xor_split())
                    .task(TaskBuilder::atomic("j").or_join())
                    .flow("in", "w")
                    .flow_if("w", "p", "data.left")
                    .flow_default("w", "q")
                    .flow("p", "j")
                    .flow("q", "j")
                    .flow("j", "out"),
            )
            .build()
            .unwrap()
    }

    #[test]
    fn all_inputs_marked_fires() {
        let spec = diamond_net();
        let net = spec.root_net();
        let mut marking = Marking::new();
        marking.add(NodeId::new("p"), 1);
        marking.add(NodeId::new("q"), 1);
        assert_eq!(
            analyze(net, &marking, &NodeId::new("j"), 1024),
            OrJoinVerdict::Fire
        );
    }

    #[test]
    fn pending_upstream_task_defers() {
        let spec = diamond_net();
        let net = spec.root_net();
        let mut marking = Marking::new();
        marking.add(NodeId::new("p"), 1);
        // `w` is busy: its completion could still emit into q.
        marking.add(NodeId::new("w"), 1);
        assert_eq!(
            analyze(net, &marking, &NodeId::new("j"), 1024),
            OrJoinVerdict::Defer
        );
    }

    #[test]
    fn token_before_upstream_task_defers() {
        let spec = diamond_net();
        let net = spec.root_net();
        let mut marking = Marking::new();
        marking.add(NodeId::new("p"), 1);
        // `in` marked: w can fire and emit into q.
        marking.add(NodeId::new("in"), 1);
        assert_eq!(
            analyze(net, &marking, &NodeId::new("j"), 1024),
            OrJoinVerdict::Defer
        );
    }

    #[test]
    fn resolved_branch_fires() {
        let spec = diamond_net();
        let net = spec.root_net();
        let mut marking = Marking::new();
        // Only p marked, nothing upstream can run again.
        marking.add(NodeId::new("p"), 1);
        assert_eq!(
            analyze(net, &marking, &NodeId::new("j"), 1024),
            OrJoinVerdict::Fire
        );
    }

    #[test]
    fn zero_budget_defers_conservatively() {
        let spec = diamond_net();
        let net = spec.root_net();
        let mut marking = Marking::new();
        marking.add(NodeId::new("p"), 1);
        marking.add(NodeId::new("in"), 1);
        assert_eq!(
            analyze(net, &marking, &NodeId::new("j"), 0),
            OrJoinVerdict::Defer
        );
    }

    #[test]
    fn unrelated_tokens_are_pruned() {
        // A token parked on a node with no path to the join's inputs must
        // not affect the verdict.
        let spec = SpecificationBuilder::new("u", "1")
            .net(
                NetBuilder::new("root")
                    .condition("p")
                    .condition("q")
                    .condition("elsewhere")
                    .task(TaskBuilder::atomic("j").or_join())
                    .task(TaskBuilder::atomic("sink"))
                    .flow("in", "j") // keeps `in` attached
                    .flow("p", "j")
                    .flow("q", "j")
                    .flow("j", "out")
                    .flow("elsewhere", "sink")
                    .flow("sink", "out"),
            )
            .build()
            .unwrap();
        let net = spec.root_net();
        let mut marking = Marking::new();
        marking.add(NodeId::new("p"), 1);
        marking.add(NodeId::new("in"), 1);
        marking.add(NodeId::new("elsewhere"), 5);
        assert_eq!(
            analyze(net, &marking, &NodeId::new("j"), 1024),
            OrJoinVerdict::Fire
        );
    }
}
