#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # Mizzen Expression
//!
//! The expression capability injected into the workflow kernel: a small
//! path-selector language evaluated against the JSON case data document.
//! Flow predicates, data mappings, and multi-instance accessor/splitter/
//! aggregator expressions all go through here.
//!
//! Supported syntax:
//!
//! - Literals: `null`, `true`, `false`, integers, floats, `'strings'`
//! - Paths: `data.order.items[0].qty` — resolved against bound variables
//!   first, then the root document; missing segments yield `null`
//! - Comparison: `==`, `!=`, `<`, `<=`, `>`, `>=`
//! - Logic: `&&`, `||`, `!`, parentheses
//! - Arithmetic: `+`, `-`, `*`, `%`
//! - Builtins: `exists(path)`, `size(expr)`, `sum(expr)`
//!
//! ```ignore
//! let engine = ExpressionEngine::new();
//! let doc = serde_json::json!({"data": {"x": 1}});
//! let ctx = EvaluationContext::new(&doc);
//! assert!(engine.evaluate_bool("data.x == 1", &ctx).unwrap());
//! ```

pub mod ast;
pub mod error;
pub mod eval;
pub mod lexer;
pub mod parser;

pub use error::ExpressionError;
pub use eval::{EvaluationContext, ExpressionEngine};
