//! Expression trees over named columns.
//!
//! An [`Expr`] is an immutable tree; children are held behind [`Arc`] so that
//! rewrites share unchanged subtrees instead of copying them. Equality is
//! *algebraic*: chains of a commutative operator compare as multisets, so
//! `a + (b + c)` equals `(c + a) + b`. [`Hash`] agrees with this equality,
//! which makes expressions usable as lookup keys for caching.

pub mod ops;

use std::collections::hash_map::DefaultHasher;
use std::collections::BTreeSet;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use self::ops::{BinaryOp, BoolOp, OpPriority, UnaryOp};
use crate::builtins::FnSignature;
use crate::error::{EvalError, ParseError};
use crate::eval::Bindings;
use crate::types::ValueType;
use crate::value::{Function, Value};

/// Expression tree node.
///
/// Nodes are produced by the parser or assembled with the constructor
/// methods; both return [`Arc<Expr>`] so that subtrees compose without
/// copying.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum Expr {
    /// Literal value.
    Constant(Value),
    /// Named input, resolved through [`Bindings`] at evaluation time.
    Symbol {
        /// Symbol name.
        name: Arc<str>,
        /// Declared type, if any. An untyped symbol evaluates as an object.
        ty: Option<ValueType>,
    },
    /// Conversion of the inner value to a fixed type.
    ///
    /// There is no dedicated cast syntax; these nodes come from the `int`,
    /// `float` and `bool` functions and from type-driven rewrites.
    Cast {
        /// Target type.
        ty: ValueType,
        /// Converted expression.
        inner: Arc<Expr>,
    },
    /// Unary operation.
    Unary {
        /// Operator.
        op: UnaryOp,
        /// Operand.
        inner: Arc<Expr>,
    },
    /// Binary operation.
    Binary {
        /// Operator.
        op: BinaryOp,
        /// Left operand.
        lhs: Arc<Expr>,
        /// Right operand.
        rhs: Arc<Expr>,
    },
    /// Lazy boolean chain with two or more terms, in evaluation order.
    Logical {
        /// Operator.
        op: BoolOp,
        /// Terms; evaluation stops at the first decisive one.
        terms: Vec<Arc<Expr>>,
    },
    /// Function call.
    Call {
        /// Called expression, usually a resolved function constant.
        function: Arc<Expr>,
        /// Positional arguments.
        args: Vec<Arc<Expr>>,
        /// Keyword arguments, in source order.
        kwargs: Vec<(Arc<str>, Arc<Expr>)>,
    },
    /// Attribute access, `receiver.name`.
    Attr {
        /// Receiver expression.
        receiver: Arc<Expr>,
        /// Attribute name.
        name: Arc<str>,
    },
    /// Subscript, `receiver[index]`.
    Index {
        /// Receiver expression.
        receiver: Arc<Expr>,
        /// Index expression.
        index: Arc<Expr>,
    },
    /// Tuple literal.
    Tuple(Vec<Arc<Expr>>),
    /// Marker wrapping a subtree whose value is memoised per table row.
    ///
    /// Semantically transparent; evaluation backends may consult the slot
    /// index to reuse a previously computed value for the same row.
    Cached {
        /// Cache slot index, shared by all occurrences of the subtree.
        slot: usize,
        /// Wrapped expression.
        inner: Arc<Expr>,
    },
}

impl Expr {
    /// Creates a constant node.
    pub fn constant(value: impl Into<Value>) -> Arc<Self> {
        Arc::new(Self::Constant(value.into()))
    }

    /// Creates an untyped symbol node.
    pub fn symbol(name: impl AsRef<str>) -> Arc<Self> {
        Arc::new(Self::Symbol {
            name: name.as_ref().into(),
            ty: None,
        })
    }

    /// Creates a symbol node with a declared type.
    pub fn typed_symbol(name: impl AsRef<str>, ty: ValueType) -> Arc<Self> {
        Arc::new(Self::Symbol {
            name: name.as_ref().into(),
            ty: Some(ty),
        })
    }

    /// Creates a cast node.
    pub fn cast(ty: ValueType, inner: Arc<Self>) -> Arc<Self> {
        Arc::new(Self::Cast { ty, inner })
    }

    /// Creates a unary operation node.
    pub fn unary(op: UnaryOp, inner: Arc<Self>) -> Arc<Self> {
        Arc::new(Self::Unary { op, inner })
    }

    /// Creates a binary operation node.
    pub fn binary(op: BinaryOp, lhs: Arc<Self>, rhs: Arc<Self>) -> Arc<Self> {
        Arc::new(Self::Binary { op, lhs, rhs })
    }

    /// Creates an `and` chain. A single term is returned unchanged.
    ///
    /// `terms` must not be empty.
    pub fn and(terms: Vec<Arc<Self>>) -> Arc<Self> {
        Self::logical(BoolOp::And, terms)
    }

    /// Creates an `or` chain. A single term is returned unchanged.
    ///
    /// `terms` must not be empty.
    pub fn or(terms: Vec<Arc<Self>>) -> Arc<Self> {
        Self::logical(BoolOp::Or, terms)
    }

    fn logical(op: BoolOp, mut terms: Vec<Arc<Self>>) -> Arc<Self> {
        debug_assert!(!terms.is_empty(), "boolean chain without terms");
        if terms.len() == 1 {
            terms.remove(0)
        } else {
            Arc::new(Self::Logical { op, terms })
        }
    }

    /// Creates a call node without keyword arguments.
    pub fn call(function: Arc<Self>, args: Vec<Arc<Self>>) -> Arc<Self> {
        Arc::new(Self::Call {
            function,
            args,
            kwargs: Vec::new(),
        })
    }

    /// Creates a call node with keyword arguments.
    pub fn call_with_kwargs(
        function: Arc<Self>,
        args: Vec<Arc<Self>>,
        kwargs: Vec<(Arc<str>, Arc<Self>)>,
    ) -> Arc<Self> {
        Arc::new(Self::Call {
            function,
            args,
            kwargs,
        })
    }

    /// Creates an attribute access node.
    pub fn attr(receiver: Arc<Self>, name: impl AsRef<str>) -> Arc<Self> {
        Arc::new(Self::Attr {
            receiver,
            name: name.as_ref().into(),
        })
    }

    /// Creates a subscript node.
    pub fn index(receiver: Arc<Self>, index: Arc<Self>) -> Arc<Self> {
        Arc::new(Self::Index { receiver, index })
    }

    /// Creates a tuple node.
    pub fn tuple(items: Vec<Arc<Self>>) -> Arc<Self> {
        Arc::new(Self::Tuple(items))
    }

    /// Wraps an expression in a per-row cache marker.
    pub fn cached(slot: usize, inner: Arc<Self>) -> Arc<Self> {
        Arc::new(Self::Cached { slot, inner })
    }

    /// Parses a formula into an expression tree.
    ///
    /// Shorthand for [`crate::parser::parse_expression`].
    ///
    /// # Errors
    ///
    /// Returns an error if the input is not a well-formed formula.
    pub fn parse(input: &str) -> Result<Arc<Self>, ParseError> {
        crate::parser::parse_expression(input)
    }

    /// Evaluates this expression against the provided bindings.
    ///
    /// # Errors
    ///
    /// Returns an error if a symbol is unbound or an operation fails.
    pub fn evaluate(&self, bindings: &dyn Bindings) -> Result<Value, EvalError> {
        crate::eval::evaluate(self, bindings)
    }

    /// Returns the contained value if this node is a constant.
    pub fn as_constant(&self) -> Option<&Value> {
        match self {
            Self::Constant(value) => Some(value),
            _ => None,
        }
    }

    /// Type this expression produces when evaluated.
    ///
    /// Untyped symbols and structural accesses (attributes, subscripts,
    /// tuples, unrecognised calls) produce [`ValueType::Object`].
    pub fn result_type(&self) -> ValueType {
        match self {
            Self::Constant(value) => value.value_type(),
            Self::Symbol { ty, .. } => ty.unwrap_or(ValueType::Object),
            Self::Cast { ty, .. } => *ty,
            Self::Unary { op, inner } => op.result_type(inner.result_type()),
            Self::Binary { op, lhs, rhs } => op.result_type(lhs.result_type(), rhs.result_type()),
            Self::Logical { .. } => ValueType::Bool,
            Self::Call { .. } => self
                .function_signature()
                .map_or(ValueType::Object, |signature| signature.ret),
            Self::Attr { .. } | Self::Index { .. } | Self::Tuple(_) => ValueType::Object,
            Self::Cached { inner, .. } => inner.result_type(),
        }
    }

    /// Signature selected for this call node, if it is a call to a known
    /// function applicable to the argument types.
    pub fn function_signature(&self) -> Option<FnSignature> {
        if let Self::Call {
            function,
            args,
            kwargs,
        } = self
        {
            if !kwargs.is_empty() {
                return None;
            }
            if let Self::Constant(Value::Function(Function::Builtin(builtin))) = function.as_ref() {
                let arg_types: Vec<_> = args.iter().map(|arg| arg.result_type()).collect();
                return builtin.signature(&arg_types);
            }
        }
        None
    }

    /// Names of all symbols occurring in this expression, sorted.
    pub fn symbol_names(&self) -> BTreeSet<String> {
        let mut names = BTreeSet::new();
        self.visit(&mut |node| {
            if let Self::Symbol { name, .. } = node {
                names.insert(name.to_string());
            }
        });
        names
    }

    /// Calls `action` for this node and then for every descendant.
    pub fn visit<F: FnMut(&Expr)>(&self, action: &mut F) {
        action(self);
        for child in self.children() {
            child.visit(action);
        }
    }

    /// Rebuilds this node with every direct child passed through `mapping`.
    pub fn map_children(&self, mut mapping: impl FnMut(&Arc<Expr>) -> Arc<Expr>) -> Self {
        match self {
            Self::Constant(_) | Self::Symbol { .. } => self.clone(),
            Self::Cast { ty, inner } => Self::Cast {
                ty: *ty,
                inner: mapping(inner),
            },
            Self::Unary { op, inner } => Self::Unary {
                op: *op,
                inner: mapping(inner),
            },
            Self::Binary { op, lhs, rhs } => Self::Binary {
                op: *op,
                lhs: mapping(lhs),
                rhs: mapping(rhs),
            },
            Self::Logical { op, terms } => Self::Logical {
                op: *op,
                terms: terms.iter().map(|term| mapping(term)).collect(),
            },
            Self::Call {
                function,
                args,
                kwargs,
            } => Self::Call {
                function: mapping(function),
                args: args.iter().map(|arg| mapping(arg)).collect(),
                kwargs: kwargs
                    .iter()
                    .map(|(name, value)| (Arc::clone(name), mapping(value)))
                    .collect(),
            },
            Self::Attr { receiver, name } => Self::Attr {
                receiver: mapping(receiver),
                name: Arc::clone(name),
            },
            Self::Index { receiver, index } => Self::Index {
                receiver: mapping(receiver),
                index: mapping(index),
            },
            Self::Tuple(items) => Self::Tuple(items.iter().map(|item| mapping(item)).collect()),
            Self::Cached { slot, inner } => Self::Cached {
                slot: *slot,
                inner: mapping(inner),
            },
        }
    }

    pub(crate) fn children(&self) -> Vec<&Arc<Expr>> {
        match self {
            Self::Constant(_) | Self::Symbol { .. } => Vec::new(),
            Self::Cast { inner, .. } | Self::Unary { inner, .. } | Self::Cached { inner, .. } => {
                vec![inner]
            }
            Self::Binary { lhs, rhs, .. } => vec![lhs, rhs],
            Self::Logical { terms, .. } => terms.iter().collect(),
            Self::Call {
                function,
                args,
                kwargs,
            } => {
                let mut out = vec![function];
                out.extend(args.iter());
                out.extend(kwargs.iter().map(|(_, value)| value));
                out
            }
            Self::Attr { receiver, .. } => vec![receiver],
            Self::Index { receiver, index } => vec![receiver, index],
            Self::Tuple(items) => items.iter().collect(),
        }
    }

    fn node_hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.hash(&mut hasher);
        hasher.finish()
    }

    fn priority(&self) -> OpPriority {
        match self {
            Self::Constant(Value::Int(value)) if *value < 0 => OpPriority::Negation,
            Self::Constant(Value::Float(value)) if value.is_sign_negative() => {
                OpPriority::Negation
            }
            Self::Constant(_)
            | Self::Symbol { .. }
            | Self::Cast { .. }
            | Self::Call { .. }
            | Self::Attr { .. }
            | Self::Index { .. }
            | Self::Tuple(_) => OpPriority::Call,
            Self::Unary { op, .. } => op.priority(),
            Self::Binary { op, .. } => op.priority(),
            Self::Logical { op, .. } => op.priority(),
            Self::Cached { inner, .. } => inner.priority(),
        }
    }

    fn fmt_prio(
        &self,
        formatter: &mut fmt::Formatter<'_>,
        min: OpPriority,
        strict: bool,
    ) -> fmt::Result {
        let own = self.priority();
        if own < min || (strict && own == min) {
            formatter.write_str("(")?;
            self.fmt_prio(formatter, OpPriority::Or, false)?;
            return formatter.write_str(")");
        }
        match self {
            Self::Constant(Value::Float(value)) if value.is_nan() => formatter.write_str("nan"),
            Self::Constant(value) => write!(formatter, "{value}"),
            Self::Symbol { name, .. } => formatter.write_str(name),
            Self::Cast { ty, inner } => {
                write!(formatter, "{ty}(")?;
                inner.fmt_prio(formatter, OpPriority::Or, false)?;
                formatter.write_str(")")
            }
            Self::Unary { op, inner } => {
                match op {
                    UnaryOp::Not => formatter.write_str("not ")?,
                    _ => formatter.write_str(op.as_str())?,
                }
                inner.fmt_prio(formatter, op.priority(), false)
            }
            Self::Binary { op, lhs, rhs } => {
                // `**` is right-associative, the rest are left-associative.
                let (lhs_strict, rhs_strict) = match op {
                    BinaryOp::Pow => (true, false),
                    _ => (false, true),
                };
                lhs.fmt_prio(formatter, op.priority(), lhs_strict)?;
                write!(formatter, " {op} ")?;
                rhs.fmt_prio(formatter, op.priority(), rhs_strict)
            }
            Self::Logical { op, terms } => {
                for (i, term) in terms.iter().enumerate() {
                    if i > 0 {
                        write!(formatter, " {op} ")?;
                    }
                    term.fmt_prio(formatter, op.priority(), true)?;
                }
                Ok(())
            }
            Self::Call {
                function,
                args,
                kwargs,
            } => {
                function.fmt_prio(formatter, OpPriority::Call, false)?;
                formatter.write_str("(")?;
                let mut first = true;
                for arg in args {
                    if !first {
                        formatter.write_str(", ")?;
                    }
                    first = false;
                    arg.fmt_prio(formatter, OpPriority::Or, false)?;
                }
                for (name, value) in kwargs {
                    if !first {
                        formatter.write_str(", ")?;
                    }
                    first = false;
                    write!(formatter, "{name}=")?;
                    value.fmt_prio(formatter, OpPriority::Or, false)?;
                }
                formatter.write_str(")")
            }
            Self::Attr { receiver, name } => {
                receiver.fmt_prio(formatter, OpPriority::Call, false)?;
                write!(formatter, ".{name}")
            }
            Self::Index { receiver, index } => {
                receiver.fmt_prio(formatter, OpPriority::Call, false)?;
                formatter.write_str("[")?;
                index.fmt_prio(formatter, OpPriority::Or, false)?;
                formatter.write_str("]")
            }
            Self::Tuple(items) => {
                formatter.write_str("(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        formatter.write_str(", ")?;
                    }
                    item.fmt_prio(formatter, OpPriority::Or, false)?;
                }
                if items.len() == 1 {
                    formatter.write_str(",")?;
                }
                formatter.write_str(")")
            }
            Self::Cached { inner, .. } => inner.fmt_prio(formatter, min, strict),
        }
    }
}

/// Renders the expression as a formula that parses back to an equal tree.
///
/// Cast nodes render as calls to the conversion functions (`int(x)` and so
/// on) and cache markers are invisible, so for those nodes the round trip is
/// semantic rather than structural.
impl fmt::Display for Expr {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_prio(formatter, OpPriority::Or, false)
    }
}

fn flatten_operands(node: &Arc<Expr>, op: BinaryOp, out: &mut Vec<Arc<Expr>>) {
    if let Expr::Binary {
        op: inner_op,
        lhs,
        rhs,
    } = node.as_ref()
    {
        if *inner_op == op {
            flatten_operands(lhs, op, out);
            flatten_operands(rhs, op, out);
            return;
        }
    }
    out.push(Arc::clone(node));
}

fn multiset_eq(lhs: &[Arc<Expr>], rhs: &[Arc<Expr>]) -> bool {
    if lhs.len() != rhs.len() {
        return false;
    }
    let rhs_hashes: Vec<_> = rhs.iter().map(|operand| operand.node_hash()).collect();
    let mut used = vec![false; rhs.len()];
    'outer: for operand in lhs {
        let hash = operand.node_hash();
        for (i, candidate) in rhs.iter().enumerate() {
            if !used[i] && rhs_hashes[i] == hash && **candidate == **operand {
                used[i] = true;
                continue 'outer;
            }
        }
        return false;
    }
    true
}

fn kwargs_eq(lhs: &[(Arc<str>, Arc<Expr>)], rhs: &[(Arc<str>, Arc<Expr>)]) -> bool {
    if lhs.len() != rhs.len() {
        return false;
    }
    let sorted = |kwargs: &[(Arc<str>, Arc<Expr>)]| {
        let mut sorted: Vec<_> = kwargs.to_vec();
        sorted.sort_by(|a, b| a.0.cmp(&b.0));
        sorted
    };
    sorted(lhs) == sorted(rhs)
}

impl PartialEq for Expr {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Constant(lhs), Self::Constant(rhs)) => lhs == rhs,
            (
                Self::Symbol { name, ty },
                Self::Symbol {
                    name: other_name,
                    ty: other_ty,
                },
            ) => name == other_name && ty == other_ty,
            (
                Self::Cast { ty, inner },
                Self::Cast {
                    ty: other_ty,
                    inner: other_inner,
                },
            ) => ty == other_ty && inner == other_inner,
            (
                Self::Unary { op, inner },
                Self::Unary {
                    op: other_op,
                    inner: other_inner,
                },
            ) => op == other_op && inner == other_inner,
            (
                Self::Binary { op, lhs, rhs },
                Self::Binary {
                    op: other_op,
                    lhs: other_lhs,
                    rhs: other_rhs,
                },
            ) => {
                if op != other_op {
                    false
                } else if op.is_commutative() {
                    let mut operands = Vec::new();
                    flatten_operands(lhs, *op, &mut operands);
                    flatten_operands(rhs, *op, &mut operands);
                    let mut other_operands = Vec::new();
                    flatten_operands(other_lhs, *op, &mut other_operands);
                    flatten_operands(other_rhs, *op, &mut other_operands);
                    multiset_eq(&operands, &other_operands)
                } else {
                    lhs == other_lhs && rhs == other_rhs
                }
            }
            (
                Self::Logical { op, terms },
                Self::Logical {
                    op: other_op,
                    terms: other_terms,
                },
            ) => op == other_op && terms == other_terms,
            (
                Self::Call {
                    function,
                    args,
                    kwargs,
                },
                Self::Call {
                    function: other_function,
                    args: other_args,
                    kwargs: other_kwargs,
                },
            ) => function == other_function && args == other_args && kwargs_eq(kwargs, other_kwargs),
            (
                Self::Attr { receiver, name },
                Self::Attr {
                    receiver: other_receiver,
                    name: other_name,
                },
            ) => receiver == other_receiver && name == other_name,
            (
                Self::Index { receiver, index },
                Self::Index {
                    receiver: other_receiver,
                    index: other_index,
                },
            ) => receiver == other_receiver && index == other_index,
            (Self::Tuple(items), Self::Tuple(other_items)) => items == other_items,
            (
                Self::Cached { slot, inner },
                Self::Cached {
                    slot: other_slot,
                    inner: other_inner,
                },
            ) => slot == other_slot && inner == other_inner,
            _ => false,
        }
    }
}

impl Eq for Expr {}

impl Hash for Expr {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Self::Constant(value) => value.hash(state),
            Self::Symbol { name, ty } => {
                name.hash(state);
                ty.hash(state);
            }
            Self::Cast { ty, inner } => {
                ty.hash(state);
                inner.hash(state);
            }
            Self::Unary { op, inner } => {
                op.hash(state);
                inner.hash(state);
            }
            Self::Binary { op, lhs, rhs } => {
                op.hash(state);
                if op.is_commutative() {
                    // Hash the flattened operands in hash order so that the
                    // result does not depend on how the chain is nested.
                    let mut operands = Vec::new();
                    flatten_operands(lhs, *op, &mut operands);
                    flatten_operands(rhs, *op, &mut operands);
                    let mut hashes: Vec<_> =
                        operands.iter().map(|operand| operand.node_hash()).collect();
                    hashes.sort_unstable();
                    hashes.hash(state);
                } else {
                    lhs.hash(state);
                    rhs.hash(state);
                }
            }
            Self::Logical { op, terms } => {
                op.hash(state);
                terms.hash(state);
            }
            Self::Call {
                function,
                args,
                kwargs,
            } => {
                function.hash(state);
                args.hash(state);
                let mut sorted: Vec<_> = kwargs.iter().collect();
                sorted.sort_by(|a, b| a.0.cmp(&b.0));
                for (name, value) in sorted {
                    name.hash(state);
                    value.hash(state);
                }
            }
            Self::Attr { receiver, name } => {
                receiver.hash(state);
                name.hash(state);
            }
            Self::Index { receiver, index } => {
                receiver.hash(state);
                index.hash(state);
            }
            Self::Tuple(items) => items.hash(state),
            Self::Cached { slot, inner } => {
                slot.hash(state);
                inner.hash(state);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hash_of(expr: &Expr) -> u64 {
        expr.node_hash()
    }

    #[test]
    fn commutative_chains_compare_as_multisets() {
        let a = Expr::symbol("a");
        let b = Expr::symbol("b");
        let c = Expr::symbol("c");

        let left = Expr::binary(
            BinaryOp::Add,
            Expr::binary(BinaryOp::Add, Arc::clone(&a), Arc::clone(&b)),
            Arc::clone(&c),
        );
        let right = Expr::binary(
            BinaryOp::Add,
            Arc::clone(&c),
            Expr::binary(BinaryOp::Add, Arc::clone(&b), Arc::clone(&a)),
        );
        assert_eq!(left, right);
        assert_eq!(hash_of(&left), hash_of(&right));

        let product = Expr::binary(BinaryOp::Mul, Arc::clone(&a), Arc::clone(&b));
        let swapped = Expr::binary(BinaryOp::Mul, Arc::clone(&b), Arc::clone(&a));
        assert_eq!(product, swapped);
        assert_eq!(hash_of(&product), hash_of(&swapped));
    }

    #[test]
    fn duplicate_operands_are_counted() {
        let a = Expr::symbol("a");
        let b = Expr::symbol("b");

        // a + a + b != a + b + b even though the operand sets coincide.
        let left = Expr::binary(
            BinaryOp::Add,
            Expr::binary(BinaryOp::Add, Arc::clone(&a), Arc::clone(&a)),
            Arc::clone(&b),
        );
        let right = Expr::binary(
            BinaryOp::Add,
            Expr::binary(BinaryOp::Add, Arc::clone(&a), Arc::clone(&b)),
            Arc::clone(&b),
        );
        assert_ne!(left, right);
    }

    #[test]
    fn non_commutative_ops_stay_ordered() {
        let a = Expr::symbol("a");
        let b = Expr::symbol("b");
        let difference = Expr::binary(BinaryOp::Sub, Arc::clone(&a), Arc::clone(&b));
        let swapped = Expr::binary(BinaryOp::Sub, Arc::clone(&b), Arc::clone(&a));
        assert_ne!(difference, swapped);

        let and = Expr::and(vec![Arc::clone(&a), Arc::clone(&b)]);
        let and_swapped = Expr::and(vec![Arc::clone(&b), Arc::clone(&a)]);
        assert_ne!(and, and_swapped);
    }

    #[test]
    fn typed_and_untyped_symbols_differ() {
        assert_ne!(
            *Expr::symbol("x"),
            *Expr::typed_symbol("x", ValueType::Float)
        );
        assert_eq!(
            *Expr::typed_symbol("x", ValueType::Float),
            *Expr::typed_symbol("x", ValueType::Float)
        );
    }

    #[test]
    fn result_types_flow_through_operators() {
        let int_sym = Expr::typed_symbol("n", ValueType::Int);
        let float_sym = Expr::typed_symbol("x", ValueType::Float);

        let sum = Expr::binary(BinaryOp::Add, Arc::clone(&int_sym), Arc::clone(&float_sym));
        assert_eq!(sum.result_type(), ValueType::Float);

        let quotient = Expr::binary(BinaryOp::Div, Arc::clone(&int_sym), Arc::clone(&int_sym));
        assert_eq!(quotient.result_type(), ValueType::Float);

        let untyped = Expr::symbol("anything");
        assert_eq!(untyped.result_type(), ValueType::Object);
        let mixed = Expr::binary(BinaryOp::Add, untyped, int_sym);
        assert_eq!(mixed.result_type(), ValueType::Object);
    }

    #[test]
    fn symbol_names_are_collected_once() {
        let expr = Expr::binary(
            BinaryOp::Add,
            Expr::binary(BinaryOp::Mul, Expr::symbol("pt"), Expr::symbol("weight")),
            Expr::symbol("pt"),
        );
        let names: Vec<_> = expr.symbol_names().into_iter().collect();
        assert_eq!(names, ["pt", "weight"]);
    }

    #[test]
    fn display_inserts_minimal_parentheses() {
        let a = Expr::symbol("a");
        let b = Expr::symbol("b");
        let c = Expr::symbol("c");

        let expr = Expr::binary(
            BinaryOp::Add,
            Arc::clone(&a),
            Expr::binary(BinaryOp::Mul, Arc::clone(&b), Arc::clone(&c)),
        );
        assert_eq!(expr.to_string(), "a + b * c");

        let expr = Expr::binary(
            BinaryOp::Mul,
            Expr::binary(BinaryOp::Add, Arc::clone(&a), Arc::clone(&b)),
            Arc::clone(&c),
        );
        assert_eq!(expr.to_string(), "(a + b) * c");

        let expr = Expr::binary(
            BinaryOp::Sub,
            Arc::clone(&a),
            Expr::binary(BinaryOp::Sub, Arc::clone(&b), Arc::clone(&c)),
        );
        assert_eq!(expr.to_string(), "a - (b - c)");

        let expr = Expr::binary(
            BinaryOp::Pow,
            Arc::clone(&a),
            Expr::binary(BinaryOp::Pow, Arc::clone(&b), Arc::clone(&c)),
        );
        assert_eq!(expr.to_string(), "a ** b ** c");

        let expr = Expr::binary(
            BinaryOp::Pow,
            Expr::binary(BinaryOp::Pow, Arc::clone(&a), Arc::clone(&b)),
            Arc::clone(&c),
        );
        assert_eq!(expr.to_string(), "(a ** b) ** c");
    }

    #[test]
    fn display_of_unary_and_logical_nodes() {
        let a = Expr::symbol("a");
        let b = Expr::symbol("b");

        let neg_pow = Expr::unary(
            UnaryOp::Neg,
            Expr::binary(BinaryOp::Pow, Arc::clone(&a), Expr::constant(2_i64)),
        );
        assert_eq!(neg_pow.to_string(), "-a ** 2");

        let pow_of_neg = Expr::binary(
            BinaryOp::Pow,
            Expr::unary(UnaryOp::Neg, Arc::clone(&a)),
            Expr::constant(2_i64),
        );
        assert_eq!(pow_of_neg.to_string(), "(-a) ** 2");

        let guarded = Expr::and(vec![
            Expr::unary(UnaryOp::Not, Arc::clone(&a)),
            Expr::or(vec![Arc::clone(&b), Arc::clone(&a)]),
        ]);
        assert_eq!(guarded.to_string(), "not a and (b or a)");
    }

    #[test]
    fn display_of_structural_nodes() {
        let table = Expr::symbol("_table");
        let expr = Expr::index(
            Expr::attr(Arc::clone(&table), "columns"),
            Expr::constant(0_i64),
        );
        assert_eq!(expr.to_string(), "_table.columns[0]");

        let tuple = Expr::tuple(vec![Expr::constant(1_i64)]);
        assert_eq!(tuple.to_string(), "(1,)");

        let cast = Expr::cast(ValueType::Int, Expr::symbol("x"));
        assert_eq!(cast.to_string(), "int(x)");

        let cached = Expr::cached(3, Expr::binary(
            BinaryOp::Add,
            Expr::symbol("a"),
            Expr::symbol("b"),
        ));
        assert_eq!(cached.to_string(), "a + b");
    }

    #[test]
    fn cached_wrapper_is_part_of_identity() {
        let inner = Expr::binary(BinaryOp::Add, Expr::symbol("a"), Expr::symbol("b"));
        let cached = Expr::cached(0, Arc::clone(&inner));
        assert_ne!(*cached, *inner);
        assert_eq!(*cached, *Expr::cached(0, Arc::clone(&inner)));
        assert_ne!(*cached, *Expr::cached(1, inner));
    }
}
