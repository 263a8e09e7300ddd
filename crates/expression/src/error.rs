//! Expression errors, each carrying the offending source text.

use thiserror::Error;

/// Errors from lexing, parsing, or evaluating an expression.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExpressionError {
    /// An unexpected character was encountered while lexing.
    #[error("lex error in {expr:?} at offset {offset}: unexpected character {found:?}")]
    Lex {
        /// The full expression text.
        expr: String,
        /// Byte offset of the unexpected character.
        offset: usize,
        /// The character that could not be tokenized.
        found: char,
    },

    /// The token stream did not match the grammar.
    #[error("parse error in {expr:?}: {message}")]
    Parse {
        /// The full expression text.
        expr: String,
        /// What the parser expected.
        message: String,
    },

    /// Evaluation failed (type mismatch, bad builtin argument, …).
    #[error("evaluation error in {expr:?}: {message}")]
    Eval {
        /// The full expression text.
        expr: String,
        /// What went wrong.
        message: String,
    },

    /// The expression evaluated to a non-boolean where a predicate was
    /// required.
    #[error("expression {expr:?} evaluated to a non-boolean predicate result")]
    NotABool {
        /// The full expression text.
        expr: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_expression_text() {
        let err = ExpressionError::Parse {
            expr: "data.x ==".into(),
            message: "expected operand".into(),
        };
        assert!(err.to_string().contains("data.x =="));
    }
}
