//! The top-level specification: a root net, sub-nets, and a data schema
//! reference, validated once at load and immutable afterwards.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use mizzen_core::{NetId, NodeId, SpecKey};
use serde::{Deserialize, Serialize};

use crate::error::SpecError;
use crate::net::Net;
use crate::task::{Decomposition, SplitType};

/// An immutable workflow specification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Specification {
    /// Unique `(uri, version)` identity.
    pub key: SpecKey,
    /// The root net's identifier.
    pub root: NetId,
    nets: IndexMap<NetId, Net>,
    /// Opaque data schema reference handed to external validators.
    #[serde(default)]
    pub schema: Option<serde_json::Value>,
    /// When the specification value was assembled.
    pub created_at: DateTime<Utc>,
}

impl Specification {
    /// Assemble and validate a specification. Callers normally go through
    /// [`SpecificationBuilder`](crate::builder::SpecificationBuilder).
    pub fn new(
        key: SpecKey,
        root: NetId,
        nets: IndexMap<NetId, Net>,
        schema: Option<serde_json::Value>,
    ) -> Result<Self, SpecError> {
        let spec = Self {
            key,
            root,
            nets,
            schema,
            created_at: Utc::now(),
        };
        spec.validate()?;
        Ok(spec)
    }

    /// The root net.
    #[must_use]
    pub fn root_net(&self) -> &Net {
        &self.nets[&self.root]
    }

    /// Look up a net by id.
    #[must_use]
    pub fn net(&self, id: &NetId) -> Option<&Net> {
        self.nets.get(id)
    }

    /// All nets, root first if declared first.
    pub fn nets(&self) -> impl Iterator<Item = &Net> {
        self.nets.values()
    }

    /// Structural validation of everything the kernel relies on.
    ///
    /// Full reachability analysis (every node on an input-to-output path)
    /// is the loader's contract; the checks here are the ones whose
    /// violation would corrupt execution rather than merely strand a node.
    pub fn validate(&self) -> Result<(), SpecError> {
        if !self.nets.contains_key(&self.root) {
            return Err(SpecError::RootNetNotFound(self.root.clone()));
        }
        for net in self.nets.values() {
            self.validate_net(net)?;
        }
        Ok(())
    }

    fn validate_net(&self, net: &Net) -> Result<(), SpecError> {
        for boundary in [&net.input, &net.output] {
            if !net.is_condition(boundary) {
                return Err(SpecError::MissingBoundary {
                    net: net.id.clone(),
                    node: boundary.clone(),
                });
            }
        }
        for task in net.tasks() {
            if net.is_condition(&task.id) {
                return Err(SpecError::DuplicateNode {
                    net: net.id.clone(),
                    node: task.id.clone(),
                });
            }
        }

        for flow in net.flows() {
            for node in [&flow.source, &flow.target] {
                if !net.contains(node) {
                    return Err(SpecError::UnknownFlowNode {
                        net: net.id.clone(),
                        node: node.clone(),
                    });
                }
            }
            if net.is_condition(&flow.source) && net.is_condition(&flow.target) {
                return Err(SpecError::ConditionToCondition {
                    net: net.id.clone(),
                    flow_source: flow.source.clone(),
                    target: flow.target.clone(),
                });
            }
            if flow.target == net.input || flow.source == net.output {
                let node = if flow.target == net.input {
                    net.input.clone()
                } else {
                    net.output.clone()
                };
                return Err(SpecError::BoundaryFlow {
                    net: net.id.clone(),
                    node,
                });
            }
        }

        for task in net.tasks() {
            self.validate_task(net, task)?;
        }
        Ok(())
    }

    fn validate_task(&self, net: &Net, task: &crate::task::Task) -> Result<(), SpecError> {
        // XOR/OR split branches need a predicate or the default mark.
        if matches!(task.split, SplitType::Xor | SplitType::Or) {
            let mut defaults = 0usize;
            for flow in net.flows_out(&task.id) {
                if flow.is_default {
                    defaults += 1;
                } else if flow.predicate.is_none() {
                    return Err(SpecError::UnpredicatedBranch {
                        net: net.id.clone(),
                        task: task.id.clone(),
                        target: flow.target.clone(),
                    });
                }
            }
            if defaults > 1 {
                return Err(SpecError::MultipleDefaults {
                    net: net.id.clone(),
                    task: task.id.clone(),
                });
            }
        }

        if let Decomposition::SubNet(subnet) = &task.decomposition {
            if !self.nets.contains_key(subnet) {
                return Err(SpecError::UnknownSubNet {
                    net: net.id.clone(),
                    task: task.id.clone(),
                    subnet: subnet.clone(),
                });
            }
        }

        for node in &task.cancellation_region {
            if !net.contains(node) {
                return Err(SpecError::UnknownRegionNode {
                    net: net.id.clone(),
                    task: task.id.clone(),
                    node: node.clone(),
                });
            }
        }

        if let Some(mi) = &task.multi_instance {
            let reason = if mi.min == 0 {
                Some("min must be at least 1".to_string())
            } else if mi.min > mi.max {
                Some(format!("min {} exceeds max {}", mi.min, mi.max))
            } else if mi.threshold == 0 || mi.threshold > mi.max {
                Some(format!(
                    "threshold {} outside 1..={}",
                    mi.threshold, mi.max
                ))
            } else {
                None
            };
            if let Some(reason) = reason {
                return Err(SpecError::InvalidMultiInstance {
                    net: net.id.clone(),
                    task: task.id.clone(),
                    reason,
                });
            }
        }
        Ok(())
    }
}

/// Node lookup that searches every net; used by snapshot restore and tests.
impl Specification {
    /// Find the net containing the given node, if any.
    #[must_use]
    pub fn net_of_node(&self, node: &NodeId) -> Option<&Net> {
        self.nets.values().find(|net| net.contains(node))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{NetBuilder, SpecificationBuilder, TaskBuilder};

    fn minimal() -> Specification {
        SpecificationBuilder::new("http://example.org/min", "1.0")
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
    fn minimal_spec_validates() {
        let spec = minimal();
        assert_eq!(spec.root_net().id, NetId::new("root"));
        assert!(spec.net(&NetId::new("root")).is_some());
        assert!(spec.net(&NetId::new("missing")).is_none());
    }

    #[test]
    fn missing_root_net_rejected() {
        let err = SpecificationBuilder::new("u", "1")
            .root("ghost")
            .net(
                NetBuilder::new("root")
                    .task(TaskBuilder::atomic("a"))
                    .flow("in", "a")
                    .flow("a", "out"),
            )
            .build()
            .unwrap_err();
        assert_eq!(err, SpecError::RootNetNotFound(NetId::new("ghost")));
    }

    #[test]
    fn unpredicated_xor_branch_rejected() {
        let err = SpecificationBuilder::new("u", "1")
            .net(
                NetBuilder::new("root")
                    .task(TaskBuilder::atomic("decide").xor_split())
                    .task(TaskBuilder::atomic("a"))
                    .task(TaskBuilder::atomic("b"))
                    .flow("in", "decide")
                    .flow("decide", "a") // neither predicate nor default
                    .flow_default("decide", "b")
                    .flow("a", "out")
                    .flow("b", "out"),
            )
            .build()
            .unwrap_err();
        assert!(matches!(err, SpecError::UnpredicatedBranch { .. }));
    }

    #[test]
    fn multiple_defaults_rejected() {
        let err = SpecificationBuilder::new("u", "1")
            .net(
                NetBuilder::new("root")
                    .task(TaskBuilder::atomic("decide").xor_split())
                    .task(TaskBuilder::atomic("a"))
                    .task(TaskBuilder::atomic("b"))
                    .flow("in", "decide")
                    .flow_default("decide", "a")
                    .flow_default("decide", "b")
                    .flow("a", "out")
                    .flow("b", "out"),
            )
            .build()
            .unwrap_err();
        assert!(matches!(err, SpecError::MultipleDefaults { .. }));
    }

    #[test]
    fn unknown_subnet_rejected() {
        let err = SpecificationBuilder::new("u", "1")
            .net(
                NetBuilder::new("root")
                    .task(TaskBuilder::composite("sub", "ghost"))
                    .flow("in", "sub")
                    .flow("sub", "out"),
            )
            .build()
            .unwrap_err();
        assert!(matches!(err, SpecError::UnknownSubNet { .. }));
    }

    #[test]
    fn unknown_region_node_rejected() {
        let err = SpecificationBuilder::new("u", "1")
            .net(
                NetBuilder::new("root")
                    .task(TaskBuilder::atomic("a").cancels(["ghost"]))
                    .flow("in", "a")
                    .flow("a", "out"),
            )
            .build()
            .unwrap_err();
        assert!(matches!(err, SpecError::UnknownRegionNode { .. }));
    }

    #[test]
    fn bad_multi_instance_bounds_rejected() {
        let err = SpecificationBuilder::new("u", "1")
            .net(
                NetBuilder::new("root")
                    .task(
                        TaskBuilder::atomic("m")
                            .multi_instance(crate::MultiInstance::over("data.items", 2).with_threshold(5)),
                    )
                    .flow("in", "m")
                    .flow("m", "out"),
            )
            .build()
            .unwrap_err();
        assert!(matches!(err, SpecError::InvalidMultiInstance { .. }));
    }

    #[test]
    fn net_of_node_finds_owner() {
        let spec = minimal();
        assert!(spec.net_of_node(&NodeId::new("a")).is_some());
        assert!(spec.net_of_node(&NodeId::new("nope")).is_none());
    }

    #[test]
    fn serde_roundtrip() {
        let spec = minimal();
        let json = serde_json::to_string(&spec).unwrap();
        let back: Specification = serde_json::from_str(&json).unwrap();
        assert_eq!(back, spec);
    }
}
