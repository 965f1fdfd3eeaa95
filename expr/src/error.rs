//! Errors produced while parsing and evaluating expressions.

use std::sync::Arc;

use thiserror::Error;

use crate::types::ValueType;

/// Numeric fault raised by arithmetic kernels, shared by the reference
/// interpreter and the compiled VM.
#[derive(Debug, Clone, PartialEq, Error)]
#[non_exhaustive]
pub enum NumericError {
    /// Division or remainder by zero.
    #[error("division by zero")]
    DivisionByZero,
    /// Argument outside the domain of a math function, e.g. `sqrt(-1)`.
    #[error("domain error in `{function}`")]
    Domain {
        /// Name of the offending function or operator.
        function: &'static str,
    },
    /// Integer arithmetic overflowed 64 bits.
    #[error("integer overflow in `{operation}`")]
    Overflow {
        /// Name of the offending operation.
        operation: &'static str,
    },
    /// Shift amount outside `[0, 64)`.
    #[error("shift amount {amount} out of range")]
    ShiftOutOfRange {
        /// The offending shift amount.
        amount: i64,
    },
}

/// Fault raised when evaluating an expression, either by the reference
/// interpreter or by a compiled program.
#[derive(Debug, Clone, PartialEq, Error)]
#[non_exhaustive]
pub enum EvalError {
    /// Evaluation reached a free variable with no bound value.
    #[error("symbol `{0}` is not bound to a value")]
    Symbol(String),
    /// Operand types incompatible with an operator, or an impossible cast.
    #[error("type error: {0}")]
    Type(String),
    /// An object has no attribute of the requested name.
    ///
    /// Kept distinct from [`Type`](Self::Type) so that constant folding can
    /// leave attribute lookups in place instead of failing.
    #[error("`{receiver}` object has no attribute `{attribute}`")]
    Attribute {
        /// Type name of the receiver.
        receiver: String,
        /// The missing attribute.
        attribute: String,
    },
    /// Arithmetic fault.
    #[error(transparent)]
    Numeric(#[from] NumericError),
}

impl EvalError {
    /// Shorthand used throughout the evaluator for operand type mismatches.
    pub(crate) fn type_error(message: impl Into<String>) -> Self {
        Self::Type(message.into())
    }

    /// Mismatch between an expected type and an actual value type.
    pub(crate) fn expected(expected: ValueType, found: &str) -> Self {
        Self::Type(format!("expected {expected}, found {found}"))
    }

    /// Whether constant folding should leave the offending node untouched
    /// rather than propagate the fault.
    pub(crate) fn is_unbound(&self) -> bool {
        matches!(self, Self::Symbol(_) | Self::Attribute { .. })
    }
}

/// Kind of a [`ParseError`].
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ParseErrorKind {
    /// Input ended unexpectedly.
    #[error("unexpected end of input")]
    Eof,
    /// Trailing characters after a complete expression.
    #[error("unexpected characters after the expression")]
    Leftovers,
    /// A literal could not be converted to a value.
    #[error("cannot parse literal: {0}")]
    Literal(#[source] anyhow::Error),
    /// A positional argument followed a keyword argument in a call.
    #[error("positional argument after a keyword argument")]
    PositionalAfterKeyword,
    /// Error produced by a `nom` combinator with no more specific kind.
    #[error("syntax error")]
    Syntax,
    /// Error annotated with a grammar context, e.g. `"call arguments"`.
    #[error("syntax error in {0}")]
    Context(&'static str),
}

/// Syntactic failure, carrying the position and the offending input fragment.
///
/// Rendered as `<kind>, while parsing `<fragment>``.
#[derive(Debug, Error)]
#[error("{kind}, while parsing `{fragment}`")]
pub struct ParseError {
    pub(crate) kind: ParseErrorKind,
    pub(crate) fragment: Arc<str>,
    pub(crate) offset: usize,
    pub(crate) line: u32,
    pub(crate) column: usize,
}

impl ParseError {
    /// Kind of the error.
    pub fn kind(&self) -> &ParseErrorKind {
        &self.kind
    }

    /// The input fragment at which parsing failed, truncated for display.
    pub fn fragment(&self) -> &str {
        &self.fragment
    }

    /// Byte offset of the failure in the input.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// 1-based line of the failure.
    pub fn line(&self) -> u32 {
        self.line
    }

    /// 1-based column of the failure.
    pub fn column(&self) -> usize {
        self.column
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eval_error_display() {
        let err = EvalError::Symbol("pt".to_owned());
        assert_eq!(err.to_string(), "symbol `pt` is not bound to a value");

        let err = EvalError::from(NumericError::DivisionByZero);
        assert_eq!(err.to_string(), "division by zero");

        let err = NumericError::Domain { function: "sqrt" };
        assert_eq!(err.to_string(), "domain error in `sqrt`");
    }

    #[test]
    fn unbound_classification() {
        assert!(EvalError::Symbol("x".into()).is_unbound());
        assert!(EvalError::Attribute {
            receiver: "table".into(),
            attribute: "rows".into(),
        }
        .is_unbound());
        assert!(!EvalError::from(NumericError::DivisionByZero).is_unbound());
    }
}
