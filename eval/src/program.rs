//! Compiled programs and their instruction set.
//!
//! A [`CompiledProgram`] is a flat list of [`Op`]s executed by the
//! [`Vm`](crate::Vm) over three stacks: integers (which also carry booleans
//! as 0/1), floats and boxed [`Value`](ntuple_expr::Value)s. The compiler
//! selects typed opcodes wherever the static types allow it; subtrees it
//! cannot lower fall back to [`Op::EvalNode`], which runs the reference
//! interpreter on the original expression node so that results and faults
//! stay identical.

use std::fmt;
use std::sync::Arc;

use ntuple_expr::{Builtin, Expr, ValueType};

/// Single VM instruction.
///
/// Jump offsets are relative to the instruction *after* the jump, so `+0` is
/// a no-op. Cache and symbol indices refer to [`CacheStore`](crate::CacheStore)
/// slots and [`symbols`](ntuple_expr::symbols) indices respectively.
#[derive(Debug, Clone, Copy, PartialEq)]
#[allow(missing_docs)] // variant names follow a strict `<stack><operation>` scheme
pub enum Op {
    // === Constants and symbols ===
    /// Pushes an integer literal.
    PushInt(i64),
    /// Pushes a float literal.
    PushFloat(f64),
    /// Pushes the value bound to a symbol slot onto the integer stack.
    IntSymbol { slot: usize },
    /// Pushes the value bound to a symbol slot onto the float stack.
    FloatSymbol { slot: usize },
    /// Pushes the truth of the value bound to a symbol slot.
    BoolSymbol { slot: usize },
    /// Pushes the value bound to a symbol slot onto the value stack.
    ObjectSymbol { slot: usize },

    // === Conversions between stacks ===
    IntToFloat,
    /// Truncates toward zero; faults on a non-finite float.
    FloatToInt,
    IntToBool,
    FloatToBool,
    IntToObject,
    FloatToObject,
    BoolToObject,
    /// Pops a value and converts it to an int; faults when impossible.
    ObjectToInt,
    ObjectToFloat,
    ObjectToBool,

    // === Integer arithmetic (booleans ride this stack as 0/1) ===
    IntAdd,
    IntSub,
    IntMul,
    IntFloorDiv,
    IntRem,
    IntNeg,
    IntAbs,
    IntShl,
    IntShr,
    IntBitAnd,
    IntBitOr,
    IntBitXor,
    IntBitNot,

    // === Float arithmetic ===
    FloatAdd,
    FloatSub,
    FloatMul,
    FloatDiv,
    FloatFloorDiv,
    FloatRem,
    FloatPow,
    FloatNeg,
    FloatAbs,

    // === Comparisons (result goes to the integer stack) ===
    IntEq,
    IntLt,
    IntLe,
    FloatEq,
    /// Faults when an operand is NaN, like the `<` operator.
    FloatLt,
    FloatLe,
    BoolNot,

    // === Builtin calls ===
    /// Unary float builtin such as `sqrt` or `sin`.
    CallFloat1(Builtin),
    /// Binary float builtin such as `atan2`.
    CallFloat2(Builtin),
    /// Ternary float builtin (`gaussian`).
    CallFloat3(Builtin),
    /// Minimum of the top `count` integers.
    IntMin { count: usize },
    IntMax { count: usize },
    /// Minimum of the top `count` floats; faults on NaN operands.
    FloatMin { count: usize },
    FloatMax { count: usize },
    /// Euclidean norm of the top `count` floats.
    Hypot { count: usize },
    /// Pops bit index and value, pushes the selected bit.
    GetBit,
    /// Pops `hi`, `lo`, `x`, pushes `lo <= x < hi`.
    InRange,
    /// Pops `tol`, `y`, `x`, pushes `|x - y| <= tol`.
    Near,

    // === Control flow ===
    /// Unconditional relative jump.
    Jump { skip: usize },
    /// Pops a boolean and jumps when it is true.
    JumpIfTrue { skip: usize },
    /// Short-circuit for `and`: jumps when the top is false, leaving it as
    /// the chain's result; otherwise pops it and falls through.
    AndLazy { skip: usize },
    /// Short-circuit for `or`: jumps when the top is true.
    OrLazy { skip: usize },

    // === Per-row caches ===
    /// On a cache hit for the current row, pushes the cached value and jumps
    /// over the recomputation; otherwise falls through.
    IntCacheGet { slot: usize, skip: usize },
    /// Records the top of the stack for the current row without popping it.
    IntCacheSet { slot: usize },
    FloatCacheGet { slot: usize, skip: usize },
    FloatCacheSet { slot: usize },
    BoolCacheGet { slot: usize, skip: usize },
    BoolCacheSet { slot: usize },
    ObjectCacheGet { slot: usize, skip: usize },
    ObjectCacheSet { slot: usize },

    // === Escape hatch ===
    /// Evaluates a stored expression node with the reference interpreter and
    /// pushes the result onto the value stack.
    EvalNode { id: usize },
}

impl fmt::Display for Op {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PushInt(value) => write!(formatter, "push_int {value}"),
            Self::PushFloat(value) => write!(formatter, "push_float {value}"),
            Self::IntSymbol { slot } => write!(formatter, "int_symbol ${slot}"),
            Self::FloatSymbol { slot } => write!(formatter, "float_symbol ${slot}"),
            Self::BoolSymbol { slot } => write!(formatter, "bool_symbol ${slot}"),
            Self::ObjectSymbol { slot } => write!(formatter, "object_symbol ${slot}"),

            Self::IntToFloat => formatter.write_str("int_to_float"),
            Self::FloatToInt => formatter.write_str("float_to_int"),
            Self::IntToBool => formatter.write_str("int_to_bool"),
            Self::FloatToBool => formatter.write_str("float_to_bool"),
            Self::IntToObject => formatter.write_str("int_to_object"),
            Self::FloatToObject => formatter.write_str("float_to_object"),
            Self::BoolToObject => formatter.write_str("bool_to_object"),
            Self::ObjectToInt => formatter.write_str("object_to_int"),
            Self::ObjectToFloat => formatter.write_str("object_to_float"),
            Self::ObjectToBool => formatter.write_str("object_to_bool"),

            Self::IntAdd => formatter.write_str("int_add"),
            Self::IntSub => formatter.write_str("int_sub"),
            Self::IntMul => formatter.write_str("int_mul"),
            Self::IntFloorDiv => formatter.write_str("int_floor_div"),
            Self::IntRem => formatter.write_str("int_rem"),
            Self::IntNeg => formatter.write_str("int_neg"),
            Self::IntAbs => formatter.write_str("int_abs"),
            Self::IntShl => formatter.write_str("int_shl"),
            Self::IntShr => formatter.write_str("int_shr"),
            Self::IntBitAnd => formatter.write_str("int_bit_and"),
            Self::IntBitOr => formatter.write_str("int_bit_or"),
            Self::IntBitXor => formatter.write_str("int_bit_xor"),
            Self::IntBitNot => formatter.write_str("int_bit_not"),

            Self::FloatAdd => formatter.write_str("float_add"),
            Self::FloatSub => formatter.write_str("float_sub"),
            Self::FloatMul => formatter.write_str("float_mul"),
            Self::FloatDiv => formatter.write_str("float_div"),
            Self::FloatFloorDiv => formatter.write_str("float_floor_div"),
            Self::FloatRem => formatter.write_str("float_rem"),
            Self::FloatPow => formatter.write_str("float_pow"),
            Self::FloatNeg => formatter.write_str("float_neg"),
            Self::FloatAbs => formatter.write_str("float_abs"),

            Self::IntEq => formatter.write_str("int_eq"),
            Self::IntLt => formatter.write_str("int_lt"),
            Self::IntLe => formatter.write_str("int_le"),
            Self::FloatEq => formatter.write_str("float_eq"),
            Self::FloatLt => formatter.write_str("float_lt"),
            Self::FloatLe => formatter.write_str("float_le"),
            Self::BoolNot => formatter.write_str("bool_not"),

            Self::CallFloat1(builtin) => write!(formatter, "call1 {}", builtin.name()),
            Self::CallFloat2(builtin) => write!(formatter, "call2 {}", builtin.name()),
            Self::CallFloat3(builtin) => write!(formatter, "call3 {}", builtin.name()),
            Self::IntMin { count } => write!(formatter, "int_min {count}"),
            Self::IntMax { count } => write!(formatter, "int_max {count}"),
            Self::FloatMin { count } => write!(formatter, "float_min {count}"),
            Self::FloatMax { count } => write!(formatter, "float_max {count}"),
            Self::Hypot { count } => write!(formatter, "hypot {count}"),
            Self::GetBit => formatter.write_str("get_bit"),
            Self::InRange => formatter.write_str("in_range"),
            Self::Near => formatter.write_str("near"),

            Self::Jump { skip } => write!(formatter, "jump +{skip}"),
            Self::JumpIfTrue { skip } => write!(formatter, "jump_if_true +{skip}"),
            Self::AndLazy { skip } => write!(formatter, "and_lazy +{skip}"),
            Self::OrLazy { skip } => write!(formatter, "or_lazy +{skip}"),

            Self::IntCacheGet { slot, skip } => {
                write!(formatter, "int_cache_get @{slot} +{skip}")
            }
            Self::IntCacheSet { slot } => write!(formatter, "int_cache_set @{slot}"),
            Self::FloatCacheGet { slot, skip } => {
                write!(formatter, "float_cache_get @{slot} +{skip}")
            }
            Self::FloatCacheSet { slot } => write!(formatter, "float_cache_set @{slot}"),
            Self::BoolCacheGet { slot, skip } => {
                write!(formatter, "bool_cache_get @{slot} +{skip}")
            }
            Self::BoolCacheSet { slot } => write!(formatter, "bool_cache_set @{slot}"),
            Self::ObjectCacheGet { slot, skip } => {
                write!(formatter, "object_cache_get @{slot} +{skip}")
            }
            Self::ObjectCacheSet { slot } => write!(formatter, "object_cache_set @{slot}"),

            Self::EvalNode { id } => write!(formatter, "eval_node #{id}"),
        }
    }
}

/// Expression compiled to VM instructions.
///
/// Produced by [`Compiler::compile`](crate::Compiler::compile); immutable
/// afterwards. The [`Display`](fmt::Display) impl renders a disassembly, one
/// instruction per line.
#[derive(Debug, Clone)]
pub struct CompiledProgram {
    pub(crate) ops: Vec<Op>,
    pub(crate) nodes: Vec<Arc<Expr>>,
    pub(crate) source: String,
    pub(crate) result_type: ValueType,
}

impl CompiledProgram {
    /// Formula this program was compiled from.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Static type of the program's result.
    pub fn result_type(&self) -> ValueType {
        self.result_type
    }

    /// Compiled instructions.
    pub fn ops(&self) -> &[Op] {
        &self.ops
    }

    /// Number of instructions.
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Whether the program has no instructions.
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

impl fmt::Display for CompiledProgram {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(formatter, "; {} -> {}", self.source, self.result_type)?;
        for (index, op) in self.ops.iter().enumerate() {
            writeln!(formatter, "{index:>4}: {op}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::mem;

    use super::*;

    #[test]
    fn ops_stay_small() {
        let size = mem::size_of::<Op>();
        assert!(size <= 24, "Op grew to {size} bytes");
        eprintln!("Op size: {size} bytes");
    }

    #[test]
    fn disassembly_lists_one_op_per_line() {
        let program = CompiledProgram {
            ops: vec![
                Op::FloatSymbol { slot: 7 },
                Op::PushFloat(2.0),
                Op::FloatPow,
            ],
            nodes: vec![],
            source: "pt ** 2".to_owned(),
            result_type: ValueType::Float,
        };

        let listing = program.to_string();
        let lines: Vec<_> = listing.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[0].contains("pt ** 2"));
        assert!(lines[1].ends_with("float_symbol $7"));
        assert!(lines[3].ends_with("float_pow"));
    }
}
