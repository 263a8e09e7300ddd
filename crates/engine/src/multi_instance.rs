//! Multi-instance expression helpers: accessor, splitter, aggregator.

use mizzen_expression::{EvaluationContext, ExpressionEngine};
use serde_json::Value;

use crate::error::{EngineError, EngineResult};

/// Evaluate the accessor expression to the input collection.
pub fn accessor_elements(
    engine: &ExpressionEngine,
    accessor: &str,
    doc: &Value,
) -> EngineResult<Vec<Value>> {
    let ctx = EvaluationContext::new(doc);
    match engine.evaluate(accessor, &ctx) {
        Ok(Value::Array(elements)) => Ok(elements),
        Ok(other) => Err(EngineError::Specification(format!(
            "multi-instance accessor {accessor:?} produced {}, expected an array",
            type_name(&other)
        ))),
        Err(err) => Err(EngineError::Specification(format!(
            "multi-instance accessor: {err}"
        ))),
    }
}

/// Derive one child's input from a collection element. The element is
/// bound as `item`; without a splitter the element itself is the input.
pub fn child_input(
    engine: &ExpressionEngine,
    splitter: Option<&str>,
    doc: &Value,
    element: &Value,
) -> EngineResult<Value> {
    match splitter {
        None => Ok(element.clone()),
        Some(expr) => {
            let ctx = EvaluationContext::new(doc).with_var("item", element.clone());
            engine
                .evaluate(expr, &ctx)
                .map_err(|err| EngineError::Specification(format!("multi-instance splitter: {err}")))
        }
    }
}

/// Combine completed children's outputs into the task output. Outputs
/// arrive as `(creation index, output)` in completion order; the
/// `ordered_by_creation` flag re-sorts them first. The list is bound as
/// `items`; without an aggregator the raw list is the output.
pub fn aggregate(
    engine: &ExpressionEngine,
    aggregator: Option<&str>,
    doc: &Value,
    completed: &[(u32, Value)],
    ordered_by_creation: bool,
) -> EngineResult<Value> {
    let mut outputs: Vec<(u32, Value)> = completed.to_vec();
    if ordered_by_creation {
        outputs.sort_by_key(|(index, _)| *index);
    }
    let list = Value::Array(outputs.into_iter().map(|(_, output)| output).collect());
    match aggregator {
        None => Ok(list),
        Some(expr) => {
            let ctx = EvaluationContext::new(doc).with_var("items", list);
            engine
                .evaluate(expr, &ctx)
                .map_err(|err| {
                    EngineError::Specification(format!("multi-instance aggregator: {err}"))
                })
        }
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
