//! Bytecode compiler and stack VM for `ntuple-expr` expressions.
//!
//! The reference interpreter in [`ntuple_expr`] walks trees and boxes every
//! intermediate value; this crate compiles a typed tree once and then runs
//! it over many events on primitive stacks. The [`Compiler`] selects typed
//! instructions from declared symbol types, keeps untypable subtrees as
//! interpreter fallbacks, and lowers cache markers to per-row memoisation
//! against a shared [`CacheStore`]. One [`Vm`] executes any number of
//! programs; a [`Frame`] supplies the symbol values of one event.
//!
//! Compiled programs are observationally identical to tree evaluation: the
//! same values, and the same faults in the same places. Short-circuiting of
//! `and` / `or` chains and `if_then` is preserved, so a guarded divisor
//! such as `n != 0 and 10 / n > 1` never divides by zero.
//!
//! # Examples
//!
//! ```
//! use ntuple_eval::{Compiler, Frame, Vm};
//! use ntuple_expr::{parse_expression, Value, ValueType};
//!
//! # fn main() -> anyhow::Result<()> {
//! let selection = parse_expression("sqrt(px ** 2 + py ** 2) > 30.0")?;
//! let program = Compiler::new()
//!     .with_default_type(ValueType::Float)
//!     .compile(&selection);
//!
//! let mut frame = Frame::new();
//! frame.set_named("px", Value::Float(20.0));
//! frame.set_named("py", Value::Float(28.0));
//!
//! let mut vm = Vm::new();
//! assert_eq!(vm.run(&program, &frame)?, Value::Bool(true));
//! # Ok(())
//! # }
//! ```

#![doc(html_root_url = "https://docs.rs/ntuple-eval/0.1.0")]
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
    cache::CacheStore,
    compiler::Compiler,
    frame::Frame,
    program::{CompiledProgram, Op},
    vm::Vm,
};

mod cache;
mod compiler;
mod frame;
mod program;
mod vm;
