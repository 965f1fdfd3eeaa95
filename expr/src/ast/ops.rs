//! Operator enums shared by the AST, the parser and the compiler.

use core::fmt;

use crate::types::ValueType;

/// Relative binding strength of operators, from loosest to tightest.
///
/// Used when parenthesising formulas for display and when deciding grammar
/// levels in the parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum OpPriority {
    /// `or`.
    Or,
    /// `and`.
    And,
    /// `not`.
    Not,
    /// Comparisons, including `in` / `not in`.
    Comparison,
    /// `|`.
    BitOr,
    /// `^`.
    BitXor,
    /// `&`.
    BitAnd,
    /// `<<` and `>>`.
    Shift,
    /// `+` and binary `-`.
    AddOrSub,
    /// `*`, `/`, `//` and `%`.
    MulOrDiv,
    /// Unary `-` and `~`.
    Negation,
    /// `**`.
    Power,
    /// Calls, attribute access, subscripts and atoms.
    Call,
}

impl OpPriority {
    /// Returns the maximum priority.
    pub fn max_priority() -> Self {
        Self::Call
    }
}

/// Unary operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum UnaryOp {
    /// Arithmetic negation, `-x`.
    Neg,
    /// Bitwise complement, `~x`.
    BitNot,
    /// Boolean negation, `not x`.
    Not,
}

impl fmt::Display for UnaryOp {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

impl UnaryOp {
    /// Symbol of this operator.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Neg => "-",
            Self::BitNot => "~",
            Self::Not => "not",
        }
    }

    /// Priority of this operator.
    pub fn priority(self) -> OpPriority {
        match self {
            Self::Neg | Self::BitNot => OpPriority::Negation,
            Self::Not => OpPriority::Not,
        }
    }

    /// Result type given the operand type.
    pub fn result_type(self, operand: ValueType) -> ValueType {
        match self {
            Self::Neg | Self::BitNot => operand.promote(),
            Self::Not => ValueType::Bool,
        }
    }
}

/// Binary operator.
///
/// Only the three canonical comparisons appear here; `!=`, `>` and `>=` are
/// parsed into negations and argument swaps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum BinaryOp {
    /// Power, `**`.
    Pow,
    /// Multiplication, `*`.
    Mul,
    /// True division, `/` (float result for numeric operands).
    Div,
    /// Floor division, `//`.
    FloorDiv,
    /// Remainder, `%` (sign of the divisor).
    Rem,
    /// Addition, `+`.
    Add,
    /// Subtraction, `-`.
    Sub,
    /// Left shift, `<<`.
    Shl,
    /// Arithmetic right shift, `>>`.
    Shr,
    /// Bitwise and, `&`.
    BitAnd,
    /// Bitwise xor, `^`.
    BitXor,
    /// Bitwise or, `|`.
    BitOr,
    /// Equality, `==`.
    Eq,
    /// Less than, `<`.
    Lt,
    /// Less than or equal, `<=`.
    Le,
    /// Membership, `in`.
    In,
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

impl BinaryOp {
    /// Symbol of this operator.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pow => "**",
            Self::Mul => "*",
            Self::Div => "/",
            Self::FloorDiv => "//",
            Self::Rem => "%",
            Self::Add => "+",
            Self::Sub => "-",
            Self::Shl => "<<",
            Self::Shr => ">>",
            Self::BitAnd => "&",
            Self::BitXor => "^",
            Self::BitOr => "|",
            Self::Eq => "==",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::In => "in",
        }
    }

    /// Priority of this operator.
    pub fn priority(self) -> OpPriority {
        match self {
            Self::Pow => OpPriority::Power,
            Self::Mul | Self::Div | Self::FloorDiv | Self::Rem => OpPriority::MulOrDiv,
            Self::Add | Self::Sub => OpPriority::AddOrSub,
            Self::Shl | Self::Shr => OpPriority::Shift,
            Self::BitAnd => OpPriority::BitAnd,
            Self::BitXor => OpPriority::BitXor,
            Self::BitOr => OpPriority::BitOr,
            Self::Eq | Self::Lt | Self::Le | Self::In => OpPriority::Comparison,
        }
    }

    /// Whether this is an arithmetic operation.
    pub fn is_arithmetic(self) -> bool {
        matches!(
            self,
            Self::Add | Self::Sub | Self::Mul | Self::Div | Self::FloorDiv | Self::Rem | Self::Pow
        )
    }

    /// Whether this operator produces a boolean.
    pub fn is_comparison(self) -> bool {
        matches!(self, Self::Eq | Self::Lt | Self::Le | Self::In)
    }

    /// Whether this operator works on the bit patterns of integers.
    pub fn is_bitwise(self) -> bool {
        matches!(
            self,
            Self::BitAnd | Self::BitXor | Self::BitOr | Self::Shl | Self::Shr
        )
    }

    /// Whether operand order is irrelevant for algebraic equality.
    ///
    /// Chains of a commutative operator are flattened before comparison, so
    /// `a + (b + c)` equals `(c + a) + b`.
    pub fn is_commutative(self) -> bool {
        matches!(
            self,
            Self::Add | Self::Mul | Self::BitAnd | Self::BitXor | Self::BitOr | Self::Eq
        )
    }

    /// Result type given the operand types.
    pub fn result_type(self, lhs: ValueType, rhs: ValueType) -> ValueType {
        match self {
            Self::Add | Self::Sub | Self::Mul | Self::FloorDiv | Self::Rem => {
                lhs.arithmetic_join(rhs)
            }
            Self::Div => lhs.division_join(rhs),
            Self::Pow => {
                if lhs == ValueType::Object || rhs == ValueType::Object {
                    ValueType::Object
                } else {
                    ValueType::Float
                }
            }
            Self::Shl | Self::Shr | Self::BitAnd | Self::BitXor | Self::BitOr => ValueType::Int,
            Self::Eq | Self::Lt | Self::Le | Self::In => ValueType::Bool,
        }
    }
}

/// Variadic lazy boolean operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BoolOp {
    /// `and`: false as soon as a term is false; later terms not evaluated.
    And,
    /// `or`: true as soon as a term is true; later terms not evaluated.
    Or,
}

impl fmt::Display for BoolOp {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

impl BoolOp {
    /// Keyword of this operator.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::And => "and",
            Self::Or => "or",
        }
    }

    /// Priority of this operator.
    pub fn priority(self) -> OpPriority {
        match self {
            Self::And => OpPriority::And,
            Self::Or => OpPriority::Or,
        }
    }

    /// The value that terminates evaluation of the chain early.
    pub fn short_circuit(self) -> bool {
        matches!(self, Self::Or)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priorities_are_ordered() {
        assert!(BinaryOp::Add.priority() < BinaryOp::Mul.priority());
        assert!(BinaryOp::Mul.priority() < BinaryOp::Pow.priority());
        assert!(BinaryOp::BitOr.priority() < BinaryOp::BitXor.priority());
        assert!(BinaryOp::Eq.priority() < BinaryOp::BitOr.priority());
        assert!(BoolOp::Or.priority() < BoolOp::And.priority());
        assert!(BoolOp::And.priority() < UnaryOp::Not.priority());
        assert!(UnaryOp::Not.priority() < BinaryOp::Eq.priority());
        assert!(UnaryOp::Neg.priority() < BinaryOp::Pow.priority());
        assert_eq!(OpPriority::max_priority(), OpPriority::Call);
    }

    #[test]
    fn result_types() {
        use ValueType::{Bool, Float, Int, Object};

        assert_eq!(BinaryOp::Add.result_type(Int, Int), Int);
        assert_eq!(BinaryOp::Add.result_type(Bool, Bool), Int);
        assert_eq!(BinaryOp::Div.result_type(Int, Int), Float);
        assert_eq!(BinaryOp::Pow.result_type(Int, Int), Float);
        assert_eq!(BinaryOp::Pow.result_type(Int, Object), Object);
        assert_eq!(BinaryOp::Shl.result_type(Int, Int), Int);
        assert_eq!(BinaryOp::Lt.result_type(Float, Int), Bool);
        assert_eq!(UnaryOp::Neg.result_type(Bool), Int);
        assert_eq!(UnaryOp::Not.result_type(Object), Bool);
    }
}
