//! Recognised functions and named constants.
//!
//! The parser resolves identifiers through [`Builtins::standard`], so
//! `sqrt(x)` parses directly into a call of [`Builtin::Sqrt`] rather than a
//! free symbol. Builtin names are reserved: a column that shares a name with
//! one of them is not reachable from formulas.

use std::collections::HashMap;
use std::f64::consts;

use once_cell::sync::Lazy;

use crate::arith;
use crate::error::{EvalError, NumericError};
use crate::types::ValueType;
use crate::value::{Function, Value};

/// Function recognised by name in formulas.
///
/// Each builtin has generic object-path semantics through [`Builtin::apply`]
/// and, when its arguments have data types, a typed signature that compiled
/// programs use to stay on the primitive stacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum Builtin {
    /// `sqrt(x)`.
    Sqrt,
    /// `exp(x)`.
    Exp,
    /// `log(x)`, natural logarithm.
    Log,
    /// `log10(x)`.
    Log10,
    /// `sin(x)`.
    Sin,
    /// `cos(x)`.
    Cos,
    /// `tan(x)`.
    Tan,
    /// `asin(x)`.
    Asin,
    /// `acos(x)`.
    Acos,
    /// `atan(x)`.
    Atan,
    /// `atan2(y, x)`.
    Atan2,
    /// `sinh(x)`.
    Sinh,
    /// `cosh(x)`.
    Cosh,
    /// `tanh(x)`.
    Tanh,
    /// `floor(x)`.
    Floor,
    /// `ceil(x)`.
    Ceil,
    /// `pow(x, y)`, same rules as the `**` operator.
    Pow,
    /// `fmod(x, y)`, C-style remainder with the sign of the dividend.
    Fmod,
    /// `degrees(x)`, radians to degrees.
    Degrees,
    /// `radians(x)`, degrees to radians.
    Radians,
    /// `abs(x)`; keeps integers integral.
    Abs,
    /// `min(a, b, ...)`.
    Min,
    /// `max(a, b, ...)`.
    Max,
    /// `hypot(a, b, ...)`, Euclidean norm of the arguments.
    Hypot,
    /// `if_then(cond, a, b)`; only the selected branch is evaluated.
    IfThen,
    /// `in_range(x, lo, hi)`, the half-open test `lo <= x < hi`.
    InRange,
    /// `near(x, y, tol)`, the closed test `|x - y| <= tol`.
    Near,
    /// `get_bit(x, bit)`.
    GetBit,
    /// `gaussian(mu, sigma, x)`, normalised Gaussian density.
    Gaussian,
}

/// Parameter and result types selected for a call site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FnSignature {
    /// Types the arguments are converted to before the call.
    pub params: Vec<ValueType>,
    /// Result type.
    pub ret: ValueType,
}

impl FnSignature {
    fn new(params: Vec<ValueType>, ret: ValueType) -> Self {
        Self { params, ret }
    }
}

/// Dispatch shape of a builtin; keeps the matches in [`Builtin::apply`] and
/// [`Builtin::signature`] exhaustive without listing every trig function
/// twice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    FloatUnary,
    FloatBinary,
    FloatTernary,
    Abs,
    Extreme,
    Hypot,
    IfThen,
    InRange,
    Near,
    GetBit,
}

impl Builtin {
    /// Name the function is known by in formulas.
    pub fn name(self) -> &'static str {
        match self {
            Self::Sqrt => "sqrt",
            Self::Exp => "exp",
            Self::Log => "log",
            Self::Log10 => "log10",
            Self::Sin => "sin",
            Self::Cos => "cos",
            Self::Tan => "tan",
            Self::Asin => "asin",
            Self::Acos => "acos",
            Self::Atan => "atan",
            Self::Atan2 => "atan2",
            Self::Sinh => "sinh",
            Self::Cosh => "cosh",
            Self::Tanh => "tanh",
            Self::Floor => "floor",
            Self::Ceil => "ceil",
            Self::Pow => "pow",
            Self::Fmod => "fmod",
            Self::Degrees => "degrees",
            Self::Radians => "radians",
            Self::Abs => "abs",
            Self::Min => "min",
            Self::Max => "max",
            Self::Hypot => "hypot",
            Self::IfThen => "if_then",
            Self::InRange => "in_range",
            Self::Near => "near",
            Self::GetBit => "get_bit",
            Self::Gaussian => "gaussian",
        }
    }

    fn kind(self) -> Kind {
        match self {
            Self::Sqrt
            | Self::Exp
            | Self::Log
            | Self::Log10
            | Self::Sin
            | Self::Cos
            | Self::Tan
            | Self::Asin
            | Self::Acos
            | Self::Atan
            | Self::Sinh
            | Self::Cosh
            | Self::Tanh
            | Self::Floor
            | Self::Ceil
            | Self::Degrees
            | Self::Radians => Kind::FloatUnary,
            Self::Atan2 | Self::Pow | Self::Fmod => Kind::FloatBinary,
            Self::Gaussian => Kind::FloatTernary,
            Self::Abs => Kind::Abs,
            Self::Min | Self::Max => Kind::Extreme,
            Self::Hypot => Kind::Hypot,
            Self::IfThen => Kind::IfThen,
            Self::InRange => Kind::InRange,
            Self::Near => Kind::Near,
            Self::GetBit => Kind::GetBit,
        }
    }

    /// Typed kernel of a unary float builtin.
    ///
    /// # Panics
    ///
    /// Panics if this builtin is not one of the unary float functions.
    pub fn eval_float1(self, x: f64) -> Result<f64, NumericError> {
        match self {
            Self::Sqrt => arith::sqrt(x),
            Self::Exp => arith::exp(x),
            Self::Log => arith::log(x),
            Self::Log10 => arith::log10(x),
            Self::Sin => Ok(x.sin()),
            Self::Cos => Ok(x.cos()),
            Self::Tan => Ok(x.tan()),
            Self::Asin => arith::asin(x),
            Self::Acos => arith::acos(x),
            Self::Atan => Ok(x.atan()),
            Self::Sinh => arith::sinh(x),
            Self::Cosh => arith::cosh(x),
            Self::Tanh => Ok(x.tanh()),
            Self::Floor => Ok(x.floor()),
            Self::Ceil => Ok(x.ceil()),
            Self::Degrees => Ok(x.to_degrees()),
            Self::Radians => Ok(x.to_radians()),
            other => panic!("{} is not a unary float function", other.name()),
        }
    }

    /// Typed kernel of a binary float builtin.
    ///
    /// # Panics
    ///
    /// Panics if this builtin is not one of the binary float functions.
    pub fn eval_float2(self, x: f64, y: f64) -> Result<f64, NumericError> {
        match self {
            Self::Atan2 => Ok(x.atan2(y)),
            Self::Pow => arith::float_pow(x, y),
            Self::Fmod => arith::float_fmod(x, y),
            other => panic!("{} is not a binary float function", other.name()),
        }
    }

    /// Typed kernel of a ternary float builtin.
    ///
    /// # Panics
    ///
    /// Panics if this builtin is not a ternary float function.
    pub fn eval_float3(self, a: f64, b: f64, c: f64) -> Result<f64, NumericError> {
        match self {
            Self::Gaussian => arith::gaussian(a, b, c),
            other => panic!("{} is not a ternary float function", other.name()),
        }
    }

    /// Signature used when every argument has a data type, or `None` when
    /// the call has to go through the object path.
    pub fn signature(self, args: &[ValueType]) -> Option<FnSignature> {
        use ValueType::{Bool, Float, Int, Object};

        let all_data = args.iter().all(|ty| *ty != Object);
        match self.kind() {
            Kind::FloatUnary => {
                (args.len() == 1 && all_data).then(|| FnSignature::new(vec![Float], Float))
            }
            Kind::FloatBinary => {
                (args.len() == 2 && all_data).then(|| FnSignature::new(vec![Float, Float], Float))
            }
            Kind::FloatTernary => (args.len() == 3 && all_data)
                .then(|| FnSignature::new(vec![Float, Float, Float], Float)),
            Kind::Abs => (args.len() == 1 && all_data).then(|| {
                let ty = args[0].promote();
                FnSignature::new(vec![ty], ty)
            }),
            Kind::Extreme => (args.len() >= 2 && all_data).then(|| {
                let joined = args.iter().fold(Int, |acc, ty| acc.arithmetic_join(*ty));
                FnSignature::new(vec![joined; args.len()], joined)
            }),
            Kind::Hypot => (args.len() >= 2 && all_data)
                .then(|| FnSignature::new(vec![Float; args.len()], Float)),
            Kind::IfThen => {
                if args.len() == 3 && args[1] != Object && args[2] != Object {
                    let branch = args[1].join(args[2]);
                    Some(FnSignature::new(vec![Bool, branch, branch], branch))
                } else {
                    None
                }
            }
            Kind::InRange | Kind::Near => (args.len() == 3 && all_data)
                .then(|| FnSignature::new(vec![Float, Float, Float], Bool)),
            Kind::GetBit => {
                if args.len() == 2 && args.iter().all(|ty| matches!(ty, Bool | Int)) {
                    Some(FnSignature::new(vec![Int, Int], Bool))
                } else {
                    None
                }
            }
        }
    }

    /// Applies the function to evaluated arguments.
    ///
    /// This is the object-path entry point; it accepts any argument values
    /// and checks arity and types at runtime. `if_then` evaluates both
    /// branches when called this way; the lazy form is handled by the
    /// evaluation backends before the call.
    ///
    /// # Errors
    ///
    /// Returns an error on an arity mismatch, on arguments of an unsupported
    /// type, or when the underlying operation faults.
    pub fn apply(self, args: &[Value]) -> Result<Value, EvalError> {
        let name = self.name();
        match self.kind() {
            Kind::FloatUnary => {
                require_arity(name, args, 1)?;
                let x = float_arg(name, args, 0)?;
                Ok(Value::Float(self.eval_float1(x)?))
            }
            Kind::FloatBinary => {
                require_arity(name, args, 2)?;
                let x = float_arg(name, args, 0)?;
                let y = float_arg(name, args, 1)?;
                Ok(Value::Float(self.eval_float2(x, y)?))
            }
            Kind::FloatTernary => {
                require_arity(name, args, 3)?;
                let a = float_arg(name, args, 0)?;
                let b = float_arg(name, args, 1)?;
                let c = float_arg(name, args, 2)?;
                Ok(Value::Float(self.eval_float3(a, b, c)?))
            }
            Kind::Abs => {
                require_arity(name, args, 1)?;
                match &args[0] {
                    Value::Bool(flag) => Ok(Value::Int(i64::from(*flag))),
                    Value::Int(int) => Ok(Value::Int(arith::int_abs(*int)?)),
                    Value::Float(float) => Ok(Value::Float(float.abs())),
                    other => Err(EvalError::type_error(format!(
                        "abs() expects a number, got {}",
                        other.type_name()
                    ))),
                }
            }
            Kind::Extreme => fold_extreme(name, args, self == Self::Min),
            Kind::Hypot => {
                if args.len() < 2 {
                    return Err(EvalError::type_error(format!(
                        "hypot() expects at least 2 arguments, got {}",
                        args.len()
                    )));
                }
                let components = (0..args.len())
                    .map(|i| float_arg(name, args, i))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Value::Float(arith::hypot_n(&components)))
            }
            Kind::IfThen => {
                require_arity(name, args, 3)?;
                let selected = if args[0].truth()? { &args[1] } else { &args[2] };
                Ok(selected.clone())
            }
            Kind::InRange => {
                require_arity(name, args, 3)?;
                let x = float_arg(name, args, 0)?;
                let lo = float_arg(name, args, 1)?;
                let hi = float_arg(name, args, 2)?;
                Ok(Value::Bool(arith::in_range(x, lo, hi)))
            }
            Kind::Near => {
                require_arity(name, args, 3)?;
                let x = float_arg(name, args, 0)?;
                let y = float_arg(name, args, 1)?;
                let tol = float_arg(name, args, 2)?;
                Ok(Value::Bool(arith::near(x, y, tol)))
            }
            Kind::GetBit => {
                require_arity(name, args, 2)?;
                let x = int_arg(name, args, 0)?;
                let bit = int_arg(name, args, 1)?;
                Ok(Value::Bool(arith::get_bit(x, bit)?))
            }
        }
    }
}

fn require_arity(name: &str, args: &[Value], expected: usize) -> Result<(), EvalError> {
    if args.len() == expected {
        Ok(())
    } else {
        Err(EvalError::type_error(format!(
            "{name}() expects {expected} argument(s), got {}",
            args.len()
        )))
    }
}

fn float_arg(name: &str, args: &[Value], index: usize) -> Result<f64, EvalError> {
    args[index].as_f64().ok_or_else(|| {
        EvalError::type_error(format!(
            "{name}() argument {} must be a number, got {}",
            index + 1,
            args[index].type_name()
        ))
    })
}

fn int_arg(name: &str, args: &[Value], index: usize) -> Result<i64, EvalError> {
    args[index].as_i64().ok_or_else(|| {
        EvalError::type_error(format!(
            "{name}() argument {} must be an integer, got {}",
            index + 1,
            args[index].type_name()
        ))
    })
}

fn fold_extreme(name: &str, args: &[Value], pick_less: bool) -> Result<Value, EvalError> {
    if args.len() < 2 {
        return Err(EvalError::type_error(format!(
            "{name}() expects at least 2 arguments, got {}",
            args.len()
        )));
    }
    let mut best = args[0].clone();
    for candidate in &args[1..] {
        let replace = if pick_less {
            arith::loose_lt(candidate, &best)?
        } else {
            arith::loose_lt(&best, candidate)?
        };
        if replace {
            best = candidate.clone();
        }
    }
    Ok(best)
}

/// What an identifier resolves to at parse time.
#[derive(Debug, Clone)]
pub(crate) enum Resolved {
    /// Named constant or function value.
    Constant(Value),
    /// Conversion function; `int(x)` parses into a cast node.
    Cast(ValueType),
}

/// Table of names the parser recognises.
#[derive(Debug)]
pub struct Builtins {
    entries: HashMap<&'static str, Resolved>,
}

static STANDARD: Lazy<Builtins> = Lazy::new(|| {
    let mut entries = HashMap::new();

    entries.insert("true", Resolved::Constant(Value::Bool(true)));
    entries.insert("false", Resolved::Constant(Value::Bool(false)));
    entries.insert("pi", Resolved::Constant(Value::Float(consts::PI)));
    entries.insert("e", Resolved::Constant(Value::Float(consts::E)));
    entries.insert("inf", Resolved::Constant(Value::Float(f64::INFINITY)));
    entries.insert("nan", Resolved::Constant(Value::Float(f64::NAN)));

    entries.insert("bool", Resolved::Cast(ValueType::Bool));
    entries.insert("int", Resolved::Cast(ValueType::Int));
    entries.insert("float", Resolved::Cast(ValueType::Float));

    let functions = [
        Builtin::Sqrt,
        Builtin::Exp,
        Builtin::Log,
        Builtin::Log10,
        Builtin::Sin,
        Builtin::Cos,
        Builtin::Tan,
        Builtin::Asin,
        Builtin::Acos,
        Builtin::Atan,
        Builtin::Atan2,
        Builtin::Sinh,
        Builtin::Cosh,
        Builtin::Tanh,
        Builtin::Floor,
        Builtin::Ceil,
        Builtin::Pow,
        Builtin::Fmod,
        Builtin::Degrees,
        Builtin::Radians,
        Builtin::Abs,
        Builtin::Min,
        Builtin::Max,
        Builtin::Hypot,
        Builtin::IfThen,
        Builtin::InRange,
        Builtin::Near,
        Builtin::GetBit,
        Builtin::Gaussian,
    ];
    for builtin in functions {
        entries.insert(
            builtin.name(),
            Resolved::Constant(Value::Function(Function::Builtin(builtin))),
        );
    }

    Builtins { entries }
});

impl Builtins {
    /// The standard table used by the parser.
    pub fn standard() -> &'static Self {
        &STANDARD
    }

    pub(crate) fn resolve(&self, name: &str) -> Option<&Resolved> {
        self.entries.get(name)
    }

    /// Whether `name` is reserved for a builtin.
    pub fn is_reserved(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// All reserved names, sorted.
    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.entries.keys().copied().collect();
        names.sort_unstable();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn signatures_follow_argument_types() {
        use ValueType::{Bool, Float, Int, Object};

        let sig = Builtin::Sqrt.signature(&[Int]).unwrap();
        assert_eq!(sig.params, [Float]);
        assert_eq!(sig.ret, Float);
        assert!(Builtin::Sqrt.signature(&[Object]).is_none());
        assert!(Builtin::Sqrt.signature(&[Float, Float]).is_none());

        let sig = Builtin::Abs.signature(&[Int]).unwrap();
        assert_eq!(sig.ret, Int);
        let sig = Builtin::Abs.signature(&[Bool]).unwrap();
        assert_eq!(sig.ret, Int);

        let sig = Builtin::Min.signature(&[Int, Int, Int]).unwrap();
        assert_eq!(sig.ret, Int);
        let sig = Builtin::Min.signature(&[Int, Float]).unwrap();
        assert_eq!(sig.ret, Float);

        let sig = Builtin::IfThen.signature(&[Object, Int, Float]).unwrap();
        assert_eq!(sig.params, [Bool, Float, Float]);
        assert_eq!(sig.ret, Float);
        assert!(Builtin::IfThen.signature(&[Bool, Object, Int]).is_none());

        let sig = Builtin::GetBit.signature(&[Int, Int]).unwrap();
        assert_eq!(sig.ret, Bool);
        assert!(Builtin::GetBit.signature(&[Float, Int]).is_none());
    }

    #[test]
    fn apply_checks_arity_and_types() {
        assert_matches!(
            Builtin::Sqrt.apply(&[Value::Float(1.0), Value::Float(2.0)]),
            Err(EvalError::Type(_))
        );
        assert_matches!(
            Builtin::Sqrt.apply(&[Value::Str("x".into())]),
            Err(EvalError::Type(_))
        );
        assert_matches!(Builtin::Sqrt.apply(&[Value::Int(9)]), Ok(Value::Float(x)) if x == 3.0);
    }

    #[test]
    fn min_max_pick_by_value() {
        let args = [Value::Int(3), Value::Float(1.5), Value::Int(2)];
        assert_matches!(Builtin::Min.apply(&args), Ok(Value::Float(x)) if x == 1.5);
        assert_matches!(Builtin::Max.apply(&args), Ok(Value::Int(3)));
    }

    #[test]
    fn if_then_selects_by_truthiness() {
        let args = [Value::Int(2), Value::Str("a".into()), Value::Str("b".into())];
        assert_matches!(Builtin::IfThen.apply(&args), Ok(Value::Str(s)) if &*s == "a");
        let args = [Value::Int(0), Value::Str("a".into()), Value::Str("b".into())];
        assert_matches!(Builtin::IfThen.apply(&args), Ok(Value::Str(s)) if &*s == "b");
    }

    #[test]
    fn range_tests() {
        let in_range = |x: f64, lo: f64, hi: f64| {
            Builtin::InRange.apply(&[Value::Float(x), Value::Float(lo), Value::Float(hi)])
        };
        assert_matches!(in_range(1.0, 1.0, 2.0), Ok(Value::Bool(true)));
        assert_matches!(in_range(2.0, 1.0, 2.0), Ok(Value::Bool(false)));

        let near = Builtin::Near.apply(&[Value::Float(1.0), Value::Float(1.5), Value::Float(0.5)]);
        assert_matches!(near, Ok(Value::Bool(true)));
        let near = Builtin::Near.apply(&[Value::Float(1.0), Value::Float(1.5), Value::Float(0.25)]);
        assert_matches!(near, Ok(Value::Bool(false)));
    }

    #[test]
    fn standard_table_resolves_constants_and_functions() {
        let builtins = Builtins::standard();
        assert!(builtins.is_reserved("sqrt"));
        assert!(builtins.is_reserved("pi"));
        assert!(builtins.is_reserved("int"));
        assert!(!builtins.is_reserved("pt"));

        assert_matches!(
            builtins.resolve("pi"),
            Some(Resolved::Constant(Value::Float(x))) if *x == std::f64::consts::PI
        );
        assert_matches!(
            builtins.resolve("float"),
            Some(Resolved::Cast(ValueType::Float))
        );
    }
}
