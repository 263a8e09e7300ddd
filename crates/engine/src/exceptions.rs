//! Ripple-down-rule exception handling.
//!
//! When a work item fails, the engine walks an RDR tree against the case
//! document: each node's condition refines its parent, and the conclusion
//! of the last satisfied node wins. The selected action is applied inside
//! the same case-locked mutation as the failure itself.

use mizzen_expression::{EvaluationContext, ExpressionEngine};
use serde_json::Value;

/// What to do about a failed work item.
#[derive(Debug, Clone, PartialEq)]
pub enum ExceptionAction {
    /// Leave the item failed and let the case run on.
    Continue,
    /// Suspend the whole case for operator attention.
    SuspendCase,
    /// Complete the failed item with a substitute output, as if the
    /// handler had succeeded.
    ForceComplete(Value),
}

/// One rule node: a condition, a conclusion, and refinement branches.
#[derive(Debug, Clone, PartialEq)]
pub struct RdrNode {
    /// Predicate over the case document.
    pub condition: String,
    /// Conclusion when the condition holds (unless refined).
    pub conclusion: ExceptionAction,
    /// Refinement consulted when the condition holds.
    pub if_true: Option<Box<RdrNode>>,
    /// Alternative consulted when it does not.
    pub if_false: Option<Box<RdrNode>>,
}

impl RdrNode {
    /// A leaf rule.
    #[must_use]
    pub fn leaf(condition: impl Into<String>, conclusion: ExceptionAction) -> Self {
        Self {
            condition: condition.into(),
            conclusion,
            if_true: None,
            if_false: None,
        }
    }

    /// Attach the refinement branch.
    #[must_use]
    pub fn refined_by(mut self, node: RdrNode) -> Self {
        self.if_true = Some(Box::new(node));
        self
    }

    /// Attach the alternative branch.
    #[must_use]
    pub fn otherwise(mut self, node: RdrNode) -> Self {
        self.if_false = Some(Box::new(node));
        self
    }
}

/// A ripple-down-rule tree.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RdrTree {
    /// The root rule, if any.
    pub root: Option<RdrNode>,
}

impl RdrTree {
    /// A tree with a single root rule.
    #[must_use]
    pub fn new(root: RdrNode) -> Self {
        Self { root: Some(root) }
    }

    /// Walk the tree against `doc`, returning the last satisfied
    /// conclusion. Conditions that fail to evaluate count as unsatisfied.
    #[must_use]
    pub fn evaluate(&self, engine: &ExpressionEngine, doc: &Value) -> Option<ExceptionAction> {
        let mut node = self.root.as_ref();
        let mut conclusion = None;
        let ctx = EvaluationContext::new(doc);
        while let Some(rule) = node {
            let holds = engine.evaluate_bool(&rule.condition, &ctx).unwrap_or(false);
            if holds {
                conclusion = Some(rule.conclusion.clone());
                node = rule.if_true.as_deref();
            } else {
                node = rule.if_false.as_deref();
            }
        }
        conclusion
    }
}
