//! Runtime values flowing through expression evaluation.

use core::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::builtins::Builtin;
use crate::error::EvalError;
use crate::types::ValueType;

/// User-defined function callable from expressions.
///
/// Implementations receive already-evaluated positional arguments. Keyword
/// arguments are rejected before the call is made.
pub trait NativeFn: Send + Sync {
    /// Name used in error messages and when the value is displayed.
    fn name(&self) -> &str;

    /// Calls the function.
    fn call(&self, args: &[Value]) -> Result<Value, EvalError>;
}

impl fmt::Debug for dyn NativeFn {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "NativeFn(<{}>)", self.name())
    }
}

/// Opaque runtime object: the escape hatch for values the type lattice does
/// not describe, such as reconstructed particles or table handles.
///
/// All hooks default to "not supported"; implementors opt into attribute
/// access, subscripting and membership tests.
pub trait ObjectValue: Send + Sync {
    /// Name of the object's type, used in error messages.
    fn type_name(&self) -> &'static str;

    /// Attribute lookup, `obj.name` in formulas.
    fn attr(&self, _name: &str) -> Option<Value> {
        None
    }

    /// Subscript lookup, `obj[index]` in formulas.
    fn index(&self, _index: &Value) -> Option<Value> {
        None
    }

    /// Membership test, `item in obj` in formulas. `None` means the object
    /// does not support membership tests.
    fn contains(&self, _item: &Value) -> Option<bool> {
        None
    }
}

impl fmt::Debug for dyn ObjectValue {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "Object(<{}>)", self.type_name())
    }
}

/// Callable value: either one of the recognised builtins or a user-supplied
/// native function.
#[derive(Debug, Clone)]
pub enum Function {
    /// Builtin function with typed opcode specialisations.
    Builtin(Builtin),
    /// User-supplied function, always called through the object path.
    Native(Arc<dyn NativeFn>),
}

impl Function {
    /// Name of the function.
    pub fn name(&self) -> &str {
        match self {
            Self::Builtin(builtin) => builtin.name(),
            Self::Native(native) => native.name(),
        }
    }

    /// Calls the function with evaluated positional arguments.
    pub fn call(&self, args: &[Value]) -> Result<Value, EvalError> {
        match self {
            Self::Builtin(builtin) => builtin.apply(args),
            Self::Native(native) => native.call(args),
        }
    }
}

impl PartialEq for Function {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Builtin(lhs), Self::Builtin(rhs)) => lhs == rhs,
            (Self::Native(lhs), Self::Native(rhs)) => Arc::ptr_eq(lhs, rhs),
            _ => false,
        }
    }
}

/// Runtime value.
///
/// Clones are cheap; strings, tuples and objects are reference-counted.
#[derive(Debug, Clone)]
pub enum Value {
    /// Boolean.
    Bool(bool),
    /// 64-bit signed integer.
    Int(i64),
    /// 64-bit float.
    Float(f64),
    /// Immutable string.
    Str(Arc<str>),
    /// Immutable tuple of values.
    Tuple(Arc<[Value]>),
    /// Callable value.
    Function(Function),
    /// Opaque object.
    Object(Arc<dyn ObjectValue>),
}

impl Value {
    /// Creates a tuple value.
    pub fn tuple(items: impl IntoIterator<Item = Value>) -> Self {
        Self::Tuple(items.into_iter().collect())
    }

    /// Wraps a native function.
    pub fn native_fn(function: impl NativeFn + 'static) -> Self {
        Self::Function(Function::Native(Arc::new(function)))
    }

    /// Wraps an opaque object.
    pub fn object(object: impl ObjectValue + 'static) -> Self {
        Self::Object(Arc::new(object))
    }

    /// Static type of the value.
    pub fn value_type(&self) -> ValueType {
        match self {
            Self::Bool(_) => ValueType::Bool,
            Self::Int(_) => ValueType::Int,
            Self::Float(_) => ValueType::Float,
            _ => ValueType::Object,
        }
    }

    /// Human-readable type name for error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Str(_) => "string",
            Self::Tuple(_) => "tuple",
            Self::Function(_) => "function",
            Self::Object(object) => object.type_name(),
        }
    }

    /// Numeric view of the value, promoting `Bool` and `Int`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Bool(flag) => Some(f64::from(u8::from(*flag))),
            Self::Int(int) => Some(*int as f64),
            Self::Float(float) => Some(*float),
            _ => None,
        }
    }

    /// Integer view of the value, promoting `Bool`.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Bool(flag) => Some(i64::from(*flag)),
            Self::Int(int) => Some(*int),
            _ => None,
        }
    }

    /// Truth value: `false` for zero numerics, empty strings and empty
    /// tuples. Functions and objects have no defined truth value.
    pub fn truth(&self) -> Result<bool, EvalError> {
        match self {
            Self::Bool(flag) => Ok(*flag),
            Self::Int(int) => Ok(*int != 0),
            Self::Float(float) => Ok(*float != 0.0),
            Self::Str(string) => Ok(!string.is_empty()),
            Self::Tuple(items) => Ok(!items.is_empty()),
            other => Err(EvalError::expected(ValueType::Bool, other.type_name())),
        }
    }

    /// Converts the value to the requested type.
    ///
    /// Numeric casts follow the usual rules: float→int truncates toward
    /// zero, numeric→bool tests against zero. Casting to `Object` always
    /// succeeds; any other conversion of a non-numeric value is a type
    /// error.
    pub fn cast(&self, ty: ValueType) -> Result<Value, EvalError> {
        match ty {
            ValueType::Object => Ok(self.clone()),
            ValueType::Bool => self.truth().map(Value::Bool),
            ValueType::Int => match self {
                Self::Float(float) if float.is_finite() => Ok(Value::Int(*float as i64)),
                other => other
                    .as_i64()
                    .map(Value::Int)
                    .ok_or_else(|| EvalError::expected(ValueType::Int, self.type_name())),
            },
            ValueType::Float => self
                .as_f64()
                .map(Value::Float)
                .ok_or_else(|| EvalError::expected(ValueType::Float, self.type_name())),
        }
    }

    fn hash_value<H: Hasher>(&self, state: &mut H) {
        core::mem::discriminant(self).hash(state);
        match self {
            Self::Bool(flag) => flag.hash(state),
            Self::Int(int) => int.hash(state),
            Self::Float(float) => float.to_bits().hash(state),
            Self::Str(string) => string.hash(state),
            Self::Tuple(items) => {
                for item in items.iter() {
                    item.hash_value(state);
                }
            }
            Self::Function(Function::Builtin(builtin)) => builtin.hash(state),
            Self::Function(Function::Native(native)) => {
                (Arc::as_ptr(native) as *const () as usize).hash(state);
            }
            Self::Object(object) => {
                (Arc::as_ptr(object) as *const () as usize).hash(state);
            }
        }
    }
}

/// Structural equality, used for algebraic identity of constants inside
/// expressions. Floats compare bitwise (so `NaN == NaN` here) and objects
/// compare by pointer; the *numeric* equality of the `==` operator lives in
/// the arithmetic kernels instead.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Bool(lhs), Self::Bool(rhs)) => lhs == rhs,
            (Self::Int(lhs), Self::Int(rhs)) => lhs == rhs,
            (Self::Float(lhs), Self::Float(rhs)) => lhs.to_bits() == rhs.to_bits(),
            (Self::Str(lhs), Self::Str(rhs)) => lhs == rhs,
            (Self::Tuple(lhs), Self::Tuple(rhs)) => lhs == rhs,
            (Self::Function(lhs), Self::Function(rhs)) => lhs == rhs,
            (Self::Object(lhs), Self::Object(rhs)) => {
                std::ptr::eq(Arc::as_ptr(lhs) as *const (), Arc::as_ptr(rhs) as *const ())
            }
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.hash_value(state);
    }
}

impl fmt::Display for Value {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(true) => formatter.write_str("true"),
            Self::Bool(false) => formatter.write_str("false"),
            Self::Int(int) => write!(formatter, "{int}"),
            Self::Float(float) => write!(formatter, "{float:?}"),
            Self::Str(string) => write!(formatter, "{string:?}"),
            Self::Tuple(items) => {
                formatter.write_str("(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        formatter.write_str(", ")?;
                    }
                    fmt::Display::fmt(item, formatter)?;
                }
                if items.len() == 1 {
                    formatter.write_str(",")?;
                }
                formatter.write_str(")")
            }
            Self::Function(function) => write!(formatter, "{}", function.name()),
            Self::Object(object) => write!(formatter, "<{}>", object.type_name()),
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Str(value.into())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Str(value.into())
    }
}
