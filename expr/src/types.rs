//! Type lattice for expressions: `bool`, `int`, `float` and the `object`
//! escape hatch, together with the coercion rules that drive cast insertion
//! and opcode selection.

use core::fmt;

/// Static type of an expression node or a column.
///
/// The four tags form a small lattice: `Bool` promotes to `Int` in arithmetic
/// contexts, `Int` widens to `Float`, and `Object` absorbs everything. Values
/// of type [`Object`](Self::Object) are only typed at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    /// Boolean.
    Bool,
    /// 64-bit signed integer.
    Int,
    /// 64-bit IEEE 754 float.
    Float,
    /// Dynamically typed value (strings, tuples, functions, user objects).
    Object,
}

impl fmt::Display for ValueType {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(match self {
            Self::Bool => "bool",
            Self::Int => "int",
            Self::Float => "float",
            Self::Object => "object",
        })
    }
}

impl ValueType {
    /// Coercion join of two types: the narrowest type both operands can be
    /// converted to without losing numeric information.
    ///
    /// `Object` absorbs everything; mixing `Int` and `Float` yields `Float`;
    /// `Bool` joined with a numeric type promotes to that type.
    pub fn join(self, other: Self) -> Self {
        match (self, other) {
            (Self::Object, _) | (_, Self::Object) => Self::Object,
            (Self::Float, _) | (_, Self::Float) => Self::Float,
            (Self::Int, _) | (_, Self::Int) => Self::Int,
            (Self::Bool, Self::Bool) => Self::Bool,
        }
    }

    /// Join as used in arithmetic contexts, where `Bool` counts as `Int`.
    pub fn arithmetic_join(self, other: Self) -> Self {
        self.promote().join(other.promote())
    }

    /// `Bool` promoted to `Int`; other types unchanged.
    pub fn promote(self) -> Self {
        match self {
            Self::Bool => Self::Int,
            other => other,
        }
    }

    /// Result type of true division: `Float` unless an operand is untyped.
    pub fn division_join(self, other: Self) -> Self {
        match self.arithmetic_join(other) {
            Self::Object => Self::Object,
            _ => Self::Float,
        }
    }

    /// Whether the type is `Int`, `Float` or `Bool`.
    pub fn is_numeric(self) -> bool {
        !matches!(self, Self::Object)
    }
}
