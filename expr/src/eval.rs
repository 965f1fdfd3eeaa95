//! Reference interpreter over expression trees.
//!
//! This walker defines the semantics that compiled programs must reproduce;
//! it favours clarity over speed and handles every value shape through the
//! object-path kernels in [`crate::arith`].

use std::collections::HashMap;

use crate::arith;
use crate::ast::ops::{BinaryOp, UnaryOp};
use crate::ast::Expr;
use crate::builtins::Builtin;
use crate::error::EvalError;
use crate::value::{Function, Value};

/// Source of symbol values during evaluation.
pub trait Bindings {
    /// Looks up a symbol by name. `None` means the symbol is unbound.
    fn get(&self, name: &str) -> Option<Value>;
}

impl<B: Bindings + ?Sized> Bindings for &B {
    fn get(&self, name: &str) -> Option<Value> {
        (**self).get(name)
    }
}

/// No bindings; only closed expressions evaluate successfully.
impl Bindings for () {
    fn get(&self, _name: &str) -> Option<Value> {
        None
    }
}

impl Bindings for HashMap<String, Value> {
    fn get(&self, name: &str) -> Option<Value> {
        HashMap::get(self, name).cloned()
    }
}

impl Bindings for HashMap<&str, Value> {
    fn get(&self, name: &str) -> Option<Value> {
        HashMap::get(self, name).cloned()
    }
}

/// Evaluates an expression against the provided bindings.
///
/// Boolean chains and `if_then` are lazy: terms after the decisive one and
/// the unselected branch are not evaluated. Cache markers are transparent
/// here; only compiled programs memoise.
///
/// # Errors
///
/// Returns an error when a symbol is unbound, an operand has an unsuitable
/// type or an arithmetic operation faults.
pub fn evaluate(expr: &Expr, bindings: &dyn Bindings) -> Result<Value, EvalError> {
    match expr {
        Expr::Constant(value) => Ok(value.clone()),
        Expr::Symbol { name, .. } => bindings
            .get(name)
            .ok_or_else(|| EvalError::Symbol(name.to_string())),
        Expr::Cast { ty, inner } => evaluate(inner, bindings)?.cast(*ty),
        Expr::Unary { op, inner } => {
            let value = evaluate(inner, bindings)?;
            match op {
                UnaryOp::Neg => arith::loose_neg(&value),
                UnaryOp::BitNot => arith::loose_bit_not(&value),
                UnaryOp::Not => Ok(Value::Bool(!value.truth()?)),
            }
        }
        Expr::Binary { op, lhs, rhs } => {
            let left = evaluate(lhs, bindings)?;
            let right = evaluate(rhs, bindings)?;
            apply_binary(*op, &left, &right)
        }
        Expr::Logical { op, terms } => {
            let decisive = op.short_circuit();
            for term in terms {
                if evaluate(term, bindings)?.truth()? == decisive {
                    return Ok(Value::Bool(decisive));
                }
            }
            Ok(Value::Bool(!decisive))
        }
        Expr::Call {
            function,
            args,
            kwargs,
        } => {
            if !kwargs.is_empty() {
                return Err(EvalError::type_error(
                    "keyword arguments are not supported in calls",
                ));
            }
            if let Expr::Constant(Value::Function(Function::Builtin(Builtin::IfThen))) =
                function.as_ref()
            {
                if args.len() == 3 {
                    let chosen = if evaluate(&args[0], bindings)?.truth()? {
                        &args[1]
                    } else {
                        &args[2]
                    };
                    return evaluate(chosen, bindings);
                }
            }
            let callee = evaluate(function, bindings)?;
            let values = args
                .iter()
                .map(|arg| evaluate(arg, bindings))
                .collect::<Result<Vec<_>, _>>()?;
            match callee {
                Value::Function(function) => function.call(&values),
                other => Err(EvalError::type_error(format!(
                    "{} is not callable",
                    other.type_name()
                ))),
            }
        }
        Expr::Attr { receiver, name } => arith::loose_attr(&evaluate(receiver, bindings)?, name),
        Expr::Index { receiver, index } => {
            let object = evaluate(receiver, bindings)?;
            let key = evaluate(index, bindings)?;
            arith::loose_index(&object, &key)
        }
        Expr::Tuple(items) => {
            let values = items
                .iter()
                .map(|item| evaluate(item, bindings))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Value::tuple(values))
        }
        Expr::Cached { inner, .. } => evaluate(inner, bindings),
    }
}

fn apply_binary(op: BinaryOp, lhs: &Value, rhs: &Value) -> Result<Value, EvalError> {
    match op {
        BinaryOp::Add => arith::loose_add(lhs, rhs),
        BinaryOp::Sub => arith::loose_sub(lhs, rhs),
        BinaryOp::Mul => arith::loose_mul(lhs, rhs),
        BinaryOp::Div => arith::loose_div(lhs, rhs),
        BinaryOp::FloorDiv => arith::loose_floor_div(lhs, rhs),
        BinaryOp::Rem => arith::loose_rem(lhs, rhs),
        BinaryOp::Pow => arith::loose_pow(lhs, rhs),
        BinaryOp::Shl => arith::loose_shl(lhs, rhs),
        BinaryOp::Shr => arith::loose_shr(lhs, rhs),
        BinaryOp::BitAnd => arith::loose_bit_and(lhs, rhs),
        BinaryOp::BitOr => arith::loose_bit_or(lhs, rhs),
        BinaryOp::BitXor => arith::loose_bit_xor(lhs, rhs),
        BinaryOp::Eq => Ok(Value::Bool(arith::loose_eq(lhs, rhs))),
        BinaryOp::Lt => arith::loose_lt(lhs, rhs).map(Value::Bool),
        BinaryOp::Le => arith::loose_le(lhs, rhs).map(Value::Bool),
        BinaryOp::In => arith::loose_in(lhs, rhs).map(Value::Bool),
    }
}
