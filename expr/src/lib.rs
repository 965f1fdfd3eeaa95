//! Symbolic arithmetic over tabular event data.
//!
//! Formulas are parsed into immutable, shareable expression trees whose free
//! symbols stand in for table columns. A tree carries static types from a
//! four-value lattice (`bool <= int <= float`, with a catch-all object type
//! for everything else), compares algebraically (commutative operator chains
//! compare as multisets, and hashing agrees), and supports substitution,
//! type propagation, constant folding and cast insertion. The reference
//! interpreter in this crate defines the semantics that compiling backends
//! must reproduce.
//!
//! # Supported syntax
//!
//! - Arithmetic `+`, `-`, `*`, `/`, `//`, `%`, `**`; bit operations `~`,
//!   `&`, `|`, `^`, `<<`, `>>`. True division and power always produce
//!   floats; the other operators stay integral on integral operands.
//! - Comparisons `==`, `!=`, `<`, `<=`, `>`, `>=`, `in`, `not in`,
//!   including chains such as `0 < eta < 2.5`, and lazy `and`, `or`, `not`.
//! - Literals: decimal and hex integers, floats, single- or double-quoted
//!   strings, `true`/`false`, tuples `(a, b)`.
//! - Attribute access `row.field`, subscripts `jets[0]`, calls with
//!   positional and keyword arguments.
//! - A fixed builtin table resolved at parse time: mathematical constants
//!   and functions plus the domain helpers `if_then`, `in_range`, `near`,
//!   `get_bit` and `gaussian`.
//!
//! # Examples
//!
//! Parsing and evaluating against bound symbols:
//!
//! ```
//! use ntuple_expr::{evaluate, Expr, Value};
//! use std::collections::HashMap;
//!
//! # fn main() -> anyhow::Result<()> {
//! let selection = Expr::parse("sqrt(px ** 2 + py ** 2) > 30.0")?;
//! assert_eq!(
//!     selection.symbol_names().into_iter().collect::<Vec<_>>(),
//!     ["px", "py"]
//! );
//!
//! let row = HashMap::from([
//!     ("px".to_owned(), Value::Float(20.0)),
//!     ("py".to_owned(), Value::Float(28.0)),
//! ]);
//! assert_eq!(evaluate(&selection, &row)?, Value::Bool(true));
//!
//! // Operand order does not matter for commutative operators.
//! assert_eq!(Expr::parse("px * py")?, Expr::parse("py * px")?);
//! # Ok(())
//! # }
//! ```
//!
//! Typing and partial evaluation:
//!
//! ```
//! use ntuple_expr::{transform, Expr, ValueType};
//! use std::collections::HashMap;
//!
//! # fn main() -> anyhow::Result<()> {
//! let expr = Expr::parse("2 * pi * radius")?;
//! let types = HashMap::from([("radius".to_owned(), ValueType::Float)]);
//! let expr = transform::set_types(&expr, &types);
//! assert_eq!(expr.result_type(), ValueType::Float);
//!
//! let folded = transform::fold_constants(&expr)?;
//! assert_eq!(folded.to_string(), "6.283185307179586 * radius");
//! # Ok(())
//! # }
//! ```

#![doc(html_root_url = "https://docs.rs/ntuple-expr/0.1.0")]
#![warn(missing_docs, missing_debug_implementations)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(
    clippy::missing_errors_doc,
    clippy::must_use_candidate,
    clippy::module_name_repetitions,
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation
)]

pub use crate::{
    ast::{
        ops::{BinaryOp, BoolOp, OpPriority, UnaryOp},
        Expr,
    },
    builtins::{Builtin, Builtins, FnSignature},
    error::{EvalError, NumericError, ParseError, ParseErrorKind},
    eval::{evaluate, Bindings},
    parser::parse_expression,
    types::ValueType,
    value::{Function, NativeFn, ObjectValue, Value},
};

pub mod arith;
mod ast;
mod builtins;
mod error;
mod eval;
mod parser;
pub mod symbols;
pub mod transform;
mod types;
mod value;
