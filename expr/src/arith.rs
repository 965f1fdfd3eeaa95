//! Arithmetic kernels shared by the reference interpreter and the compiled
//! VM, so that both produce identical results and identical faults.
//!
//! Typed kernels operate on raw `i64`/`f64` and report [`NumericError`]s;
//! the `loose_*` kernels implement the dynamically-typed object path over
//! [`Value`]s, with numeric promotion and the string/tuple conveniences.

use std::cmp::Ordering;

use crate::error::{EvalError, NumericError};
use crate::value::Value;

// === Typed integer kernels ===

pub fn int_add(a: i64, b: i64) -> Result<i64, NumericError> {
    a.checked_add(b).ok_or(NumericError::Overflow { operation: "+" })
}

pub fn int_sub(a: i64, b: i64) -> Result<i64, NumericError> {
    a.checked_sub(b).ok_or(NumericError::Overflow { operation: "-" })
}

pub fn int_mul(a: i64, b: i64) -> Result<i64, NumericError> {
    a.checked_mul(b).ok_or(NumericError::Overflow { operation: "*" })
}

pub fn int_neg(a: i64) -> Result<i64, NumericError> {
    a.checked_neg().ok_or(NumericError::Overflow { operation: "-" })
}

pub fn int_abs(a: i64) -> Result<i64, NumericError> {
    a.checked_abs().ok_or(NumericError::Overflow { operation: "abs" })
}

/// Floor division: rounds toward negative infinity, like `//` on ints in
/// the formula language (`-7 // 2 == -4`).
pub fn int_floor_div(a: i64, b: i64) -> Result<i64, NumericError> {
    if b == 0 {
        return Err(NumericError::DivisionByZero);
    }
    let quotient = a.checked_div(b).ok_or(NumericError::Overflow { operation: "//" })?;
    let remainder = a.wrapping_rem(b);
    if remainder != 0 && (remainder < 0) != (b < 0) {
        Ok(quotient - 1)
    } else {
        Ok(quotient)
    }
}

/// Remainder paired with [`int_floor_div`]: the result takes the sign of the
/// divisor (`-7 % 2 == 1`).
pub fn int_floor_rem(a: i64, b: i64) -> Result<i64, NumericError> {
    if b == 0 {
        return Err(NumericError::DivisionByZero);
    }
    let remainder = a.wrapping_rem(b);
    if remainder != 0 && (remainder < 0) != (b < 0) {
        Ok(remainder + b)
    } else {
        Ok(remainder)
    }
}

pub fn int_shl(a: i64, amount: i64) -> Result<i64, NumericError> {
    let shift = shift_amount(amount)?;
    let shifted = a.checked_shl(shift).ok_or(NumericError::Overflow { operation: "<<" })?;
    if shifted >> shift == a {
        Ok(shifted)
    } else {
        Err(NumericError::Overflow { operation: "<<" })
    }
}

/// Arithmetic (sign-extending) right shift.
pub fn int_shr(a: i64, amount: i64) -> Result<i64, NumericError> {
    Ok(a >> shift_amount(amount)?)
}

fn shift_amount(amount: i64) -> Result<u32, NumericError> {
    if (0..64).contains(&amount) {
        Ok(amount as u32)
    } else {
        Err(NumericError::ShiftOutOfRange { amount })
    }
}

/// Tests bit `bit` of `x`.
pub fn get_bit(x: i64, bit: i64) -> Result<bool, NumericError> {
    Ok((x >> shift_amount(bit)?) & 1 != 0)
}

// === Typed float kernels ===

pub fn float_div(a: f64, b: f64) -> Result<f64, NumericError> {
    if b == 0.0 {
        Err(NumericError::DivisionByZero)
    } else {
        Ok(a / b)
    }
}

pub fn float_floor_div(a: f64, b: f64) -> Result<f64, NumericError> {
    if b == 0.0 {
        Err(NumericError::DivisionByZero)
    } else {
        Ok((a / b).floor())
    }
}

/// Float remainder with the sign of the divisor, matching [`int_floor_rem`].
pub fn float_floor_rem(a: f64, b: f64) -> Result<f64, NumericError> {
    if b == 0.0 {
        Err(NumericError::DivisionByZero)
    } else {
        Ok(a - b * (a / b).floor())
    }
}

/// C-style remainder (sign of the dividend), the `fmod` builtin.
pub fn float_fmod(a: f64, b: f64) -> Result<f64, NumericError> {
    if b == 0.0 {
        Err(NumericError::DivisionByZero)
    } else {
        Ok(a % b)
    }
}

pub fn float_pow(a: f64, b: f64) -> Result<f64, NumericError> {
    if a == 0.0 && b < 0.0 {
        return Err(NumericError::DivisionByZero);
    }
    if a < 0.0 && b.fract() != 0.0 {
        return Err(NumericError::Domain { function: "pow" });
    }
    let result = a.powf(b);
    if result.is_infinite() && a.is_finite() && b.is_finite() {
        Err(NumericError::Overflow { operation: "pow" })
    } else {
        Ok(result)
    }
}

pub fn sqrt(x: f64) -> Result<f64, NumericError> {
    if x < 0.0 {
        Err(NumericError::Domain { function: "sqrt" })
    } else {
        Ok(x.sqrt())
    }
}

pub fn log(x: f64) -> Result<f64, NumericError> {
    if x <= 0.0 {
        Err(NumericError::Domain { function: "log" })
    } else {
        Ok(x.ln())
    }
}

pub fn log10(x: f64) -> Result<f64, NumericError> {
    if x <= 0.0 {
        Err(NumericError::Domain { function: "log10" })
    } else {
        Ok(x.log10())
    }
}

pub fn asin(x: f64) -> Result<f64, NumericError> {
    if (-1.0..=1.0).contains(&x) {
        Ok(x.asin())
    } else {
        Err(NumericError::Domain { function: "asin" })
    }
}

pub fn acos(x: f64) -> Result<f64, NumericError> {
    if (-1.0..=1.0).contains(&x) {
        Ok(x.acos())
    } else {
        Err(NumericError::Domain { function: "acos" })
    }
}

pub fn exp(x: f64) -> Result<f64, NumericError> {
    overflow_guard(x.exp(), x, "exp")
}

pub fn sinh(x: f64) -> Result<f64, NumericError> {
    overflow_guard(x.sinh(), x, "sinh")
}

pub fn cosh(x: f64) -> Result<f64, NumericError> {
    overflow_guard(x.cosh(), x, "cosh")
}

fn overflow_guard(result: f64, input: f64, function: &'static str) -> Result<f64, NumericError> {
    if result.is_infinite() && input.is_finite() {
        Err(NumericError::Overflow { operation: function })
    } else {
        Ok(result)
    }
}

/// Normalised Gaussian density at `x` with mean `mu` and width `sigma`.
pub fn gaussian(mu: f64, sigma: f64, x: f64) -> Result<f64, NumericError> {
    if sigma <= 0.0 {
        return Err(NumericError::Domain { function: "gaussian" });
    }
    let pulled = (x - mu) / sigma;
    Ok((-0.5 * pulled * pulled).exp() / (sigma * (2.0 * std::f64::consts::PI).sqrt()))
}

/// Euclidean norm of any number of components.
pub fn hypot_n(components: &[f64]) -> f64 {
    components.iter().fold(0.0, |acc, &x| acc.hypot(x))
}

/// Half-open range test, `lo <= x < hi`.
pub fn in_range(x: f64, lo: f64, hi: f64) -> bool {
    lo <= x && x < hi
}

/// Closed tolerance test, `|x - y| <= tol`.
pub fn near(x: f64, y: f64, tol: f64) -> bool {
    (x - y).abs() <= tol
}

// === Object-path kernels ===

enum Promoted {
    Int(i64, i64),
    Float(f64, f64),
}

fn promote(a: &Value, b: &Value) -> Option<Promoted> {
    match (a, b) {
        (Value::Float(_), _) | (_, Value::Float(_)) => Some(Promoted::Float(a.as_f64()?, b.as_f64()?)),
        _ => Some(Promoted::Int(a.as_i64()?, b.as_i64()?)),
    }
}

fn binary_type_error(op: &str, a: &Value, b: &Value) -> EvalError {
    EvalError::type_error(format!(
        "unsupported operand types for `{op}`: {} and {}",
        a.type_name(),
        b.type_name()
    ))
}

macro_rules! loose_arith {
    ($name:ident, $op:literal, $int:expr, $float:expr) => {
        pub fn $name(a: &Value, b: &Value) -> Result<Value, EvalError> {
            match promote(a, b) {
                Some(Promoted::Int(x, y)) => Ok(Value::Int($int(x, y)?)),
                Some(Promoted::Float(x, y)) => Ok(Value::Float($float(x, y)?)),
                None => Err(binary_type_error($op, a, b)),
            }
        }
    };
}

loose_arith!(loose_sub, "-", int_sub, |x, y| Ok::<_, NumericError>(x - y));
loose_arith!(loose_mul_num, "*", int_mul, |x, y| Ok::<_, NumericError>(x * y));
loose_arith!(loose_floor_div, "//", int_floor_div, float_floor_div);
loose_arith!(loose_rem, "%", int_floor_rem, float_floor_rem);

pub fn loose_add(a: &Value, b: &Value) -> Result<Value, EvalError> {
    match (a, b) {
        (Value::Str(lhs), Value::Str(rhs)) => {
            let mut joined = String::with_capacity(lhs.len() + rhs.len());
            joined.push_str(lhs);
            joined.push_str(rhs);
            Ok(Value::Str(joined.into()))
        }
        (Value::Tuple(lhs), Value::Tuple(rhs)) => {
            Ok(Value::Tuple(lhs.iter().chain(rhs.iter()).cloned().collect()))
        }
        _ => match promote(a, b) {
            Some(Promoted::Int(x, y)) => Ok(Value::Int(int_add(x, y)?)),
            Some(Promoted::Float(x, y)) => Ok(Value::Float(x + y)),
            None => Err(binary_type_error("+", a, b)),
        },
    }
}

pub fn loose_mul(a: &Value, b: &Value) -> Result<Value, EvalError> {
    loose_mul_num(a, b)
}

/// True division: always a float for numeric operands.
pub fn loose_div(a: &Value, b: &Value) -> Result<Value, EvalError> {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => Ok(Value::Float(float_div(x, y)?)),
        _ => Err(binary_type_error("/", a, b)),
    }
}

pub fn loose_pow(a: &Value, b: &Value) -> Result<Value, EvalError> {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => Ok(Value::Float(float_pow(x, y)?)),
        _ => Err(binary_type_error("**", a, b)),
    }
}

pub fn loose_neg(value: &Value) -> Result<Value, EvalError> {
    match value {
        Value::Int(int) => Ok(Value::Int(int_neg(*int)?)),
        Value::Bool(flag) => Ok(Value::Int(-i64::from(*flag))),
        Value::Float(float) => Ok(Value::Float(-*float)),
        other => Err(EvalError::type_error(format!(
            "unsupported operand type for unary `-`: {}",
            other.type_name()
        ))),
    }
}

pub fn loose_bit_not(value: &Value) -> Result<Value, EvalError> {
    value.as_i64().map(|int| Value::Int(!int)).ok_or_else(|| {
        EvalError::type_error(format!(
            "unsupported operand type for `~`: {}",
            value.type_name()
        ))
    })
}

macro_rules! loose_int_op {
    ($name:ident, $op:literal, $apply:expr) => {
        pub fn $name(a: &Value, b: &Value) -> Result<Value, EvalError> {
            match (a.as_i64(), b.as_i64()) {
                (Some(x), Some(y)) => Ok(Value::Int($apply(x, y)?)),
                _ => Err(binary_type_error($op, a, b)),
            }
        }
    };
}

loose_int_op!(loose_bit_and, "&", |x, y| Ok::<_, NumericError>(x & y));
loose_int_op!(loose_bit_or, "|", |x, y| Ok::<_, NumericError>(x | y));
loose_int_op!(loose_bit_xor, "^", |x, y| Ok::<_, NumericError>(x ^ y));
loose_int_op!(loose_shl, "<<", int_shl);
loose_int_op!(loose_shr, ">>", int_shr);

/// Equality of the `==` operator: numeric across int/float/bool, structural
/// for strings and tuples, pointer identity for functions and objects.
/// Never faults; incomparable values are simply unequal.
pub fn loose_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Str(lhs), Value::Str(rhs)) => lhs == rhs,
        (Value::Tuple(lhs), Value::Tuple(rhs)) => {
            lhs.len() == rhs.len() && lhs.iter().zip(rhs.iter()).all(|(x, y)| loose_eq(x, y))
        }
        (Value::Function(_) | Value::Object(_), _) | (_, Value::Function(_) | Value::Object(_)) => {
            a == b
        }
        _ => match promote(a, b) {
            Some(Promoted::Int(x, y)) => x == y,
            Some(Promoted::Float(x, y)) => x == y,
            None => false,
        },
    }
}

fn loose_cmp(op: &'static str, a: &Value, b: &Value) -> Result<Ordering, EvalError> {
    if let (Value::Str(lhs), Value::Str(rhs)) = (a, b) {
        return Ok(lhs.cmp(rhs));
    }
    let ordering = match promote(a, b) {
        Some(Promoted::Int(x, y)) => x.partial_cmp(&y),
        Some(Promoted::Float(x, y)) => x.partial_cmp(&y),
        None => None,
    };
    ordering.ok_or_else(|| binary_type_error(op, a, b))
}

pub fn loose_lt(a: &Value, b: &Value) -> Result<bool, EvalError> {
    Ok(loose_cmp("<", a, b)? == Ordering::Less)
}

pub fn loose_le(a: &Value, b: &Value) -> Result<bool, EvalError> {
    Ok(loose_cmp("<=", a, b)? != Ordering::Greater)
}

/// Membership test: tuples by element equality, strings by substring,
/// objects through their [`contains`](crate::ObjectValue::contains) hook.
pub fn loose_in(item: &Value, sequence: &Value) -> Result<bool, EvalError> {
    match sequence {
        Value::Tuple(items) => Ok(items.iter().any(|candidate| loose_eq(item, candidate))),
        Value::Str(haystack) => match item {
            Value::Str(needle) => Ok(haystack.contains(needle.as_ref())),
            other => Err(EvalError::type_error(format!(
                "`in <string>` requires a string, found {}",
                other.type_name()
            ))),
        },
        Value::Object(object) => object.contains(item).ok_or_else(|| {
            EvalError::type_error(format!(
                "{} object does not support membership tests",
                object.type_name()
            ))
        }),
        other => Err(EvalError::type_error(format!(
            "`in` requires a sequence, found {}",
            other.type_name()
        ))),
    }
}

/// Subscripting: tuples and strings by (possibly negative) index, objects
/// through their [`index`](crate::ObjectValue::index) hook.
pub fn loose_index(receiver: &Value, index: &Value) -> Result<Value, EvalError> {
    match receiver {
        Value::Tuple(items) => {
            let position = tuple_position(index, items.len())?;
            Ok(items[position].clone())
        }
        Value::Str(string) => {
            let position = tuple_position(index, string.chars().count())?;
            let ch: String = string.chars().skip(position).take(1).collect();
            Ok(Value::Str(ch.into()))
        }
        Value::Object(object) => object.index(index).ok_or_else(|| {
            EvalError::type_error(format!(
                "{} object is not subscriptable by {}",
                object.type_name(),
                index.type_name()
            ))
        }),
        other => Err(EvalError::type_error(format!(
            "{} object is not subscriptable",
            other.type_name()
        ))),
    }
}

fn tuple_position(index: &Value, len: usize) -> Result<usize, EvalError> {
    let raw = index
        .as_i64()
        .ok_or_else(|| EvalError::type_error(format!("indices must be ints, found {}", index.type_name())))?;
    let resolved = if raw < 0 { raw + len as i64 } else { raw };
    if (0..len as i64).contains(&resolved) {
        Ok(resolved as usize)
    } else {
        Err(EvalError::type_error(format!("index {raw} out of range for length {len}")))
    }
}

/// Attribute access through the object hook.
pub fn loose_attr(receiver: &Value, name: &str) -> Result<Value, EvalError> {
    match receiver {
        Value::Object(object) => object.attr(name).ok_or_else(|| EvalError::Attribute {
            receiver: object.type_name().to_owned(),
            attribute: name.to_owned(),
        }),
        other => Err(EvalError::Attribute {
            receiver: other.type_name().to_owned(),
            attribute: name.to_owned(),
        }),
    }
}
