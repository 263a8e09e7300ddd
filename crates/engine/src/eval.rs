//! Expression glue: predicates, data mappings, and canonical task ordering.

use mizzen_expression::{EvaluationContext, ExpressionEngine};
use mizzen_spec::Flow;
use serde_json::Value;

use crate::error::{EngineError, EngineResult};

/// Evaluate a flow predicate against the case document. Unpredicated flows
/// are `true`.
pub fn flow_predicate(
    engine: &ExpressionEngine,
    flow: &Flow,
    doc: &Value,
) -> EngineResult<bool> {
    match &flow.predicate {
        None => Ok(true),
        Some(expr) => {
            let ctx = EvaluationContext::new(doc);
            engine.evaluate_bool(expr, &ctx).map_err(|err| {
                EngineError::Specification(format!(
                    "predicate on flow {} -> {}: {err}",
                    flow.source, flow.target
                ))
            })
        }
    }
}

/// Compute a work item's input document from the task's input mapping.
/// Absent mapping: the whole document.
pub fn input_document(
    engine: &ExpressionEngine,
    mapping: Option<&str>,
    doc: &Value,
) -> EngineResult<Value> {
    match mapping {
        None => Ok(doc.clone()),
        Some(expr) => {
            let ctx = EvaluationContext::new(doc);
            engine
                .evaluate(expr, &ctx)
                .map_err(|err| EngineError::Specification(format!("input mapping: {err}")))
        }
    }
}

/// Merge a work item's output into the case document.
///
/// With a target path the output replaces the value at that path (parent
/// objects are created as needed). Without one, an object output is
/// shallow-merged at the top level and any other value lands under
/// `"result"`.
pub fn merge_output(doc: &mut Value, target: Option<&str>, output: Value) {
    match target {
        Some(path) => set_path(doc, path, output),
        None => match output {
            Value::Object(map) => {
                if !doc.is_object() {
                    *doc = Value::Object(serde_json::Map::new());
                }
                if let Some(root) = doc.as_object_mut() {
                    for (key, value) in map {
                        root.insert(key, value);
                    }
                }
            }
            Value::Null => {}
            other => set_path(doc, "result", other),
        },
    }
}

/// Set a dot-path in a document, creating intermediate objects.
fn set_path(doc: &mut Value, path: &str, value: Value) {
    let mut value = Some(value);
    let mut current = doc;
    let mut segments = path.split('.').peekable();
    while let Some(segment) = segments.next() {
        if !current.is_object() {
            *current = Value::Object(serde_json::Map::new());
        }
        let Value::Object(map) = current else { return };
        if segments.peek().is_none() {
            map.insert(segment.to_string(), value.take().unwrap_or(Value::Null));
            return;
        }
        current = map
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(serde_json::Map::new()));
    }
}

/// 64-bit FNV-1a over a task identifier.
///
/// Inlined rather than taken from a hashing crate: the canonical firing
/// order must be stable across processes and toolchain versions for
/// deterministic replay, which rules out `DefaultHasher`.
#[must_use]
pub fn identity_hash(id: &str) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;
    let mut hash = OFFSET;
    for byte in id.as_bytes() {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(PRIME);
    }
    hash
}
