//! Filling histograms from rows.
//!
//! A [`Projector`] drives one pass over a row source and feeds one or more
//! [`Projection`]s: a target formula, an optional boolean selection and a
//! sink accepting the target's value with the row weight. Against a
//! [`MemoryTable`] every formula runs as a compiled program sharing the
//! table's per-row caches; arbitrary [`Bindings`] fall back to the tree
//! interpreter.
//!
//! A long projection should not die on one malformed row, so the
//! [`ErrorPolicy`] decides what a fault in a formula does: propagate as
//! [`ProjectError::Eval`], or log a warning and skip the row (for weight
//! faults) or the single projection (for target and selection faults). Sink
//! errors always propagate.

use core::fmt;
use std::sync::Arc;

use ntuple_eval::{Frame, Vm};
use ntuple_expr::{evaluate, symbols, Bindings, EvalError, Expr, Value};
use ntuple_hist::Histogram;

use crate::error::ProjectError;
use crate::table::MemoryTable;

/// Consumer of projected values.
pub trait Accept {
    /// Takes one value with its row weight.
    fn accept(&mut self, value: &Value, weight: f64) -> Result<(), ProjectError>;
}

/// Histograms accumulate the projected value as coordinates: a tuple fills
/// one axis per item, a scalar fills a one-dimensional histogram.
impl Accept for Histogram {
    fn accept(&mut self, value: &Value, weight: f64) -> Result<(), ProjectError> {
        match value {
            Value::Tuple(items) => self.accumulate(items, weight)?,
            scalar => self.accumulate(std::slice::from_ref(scalar), weight)?,
        }
        Ok(())
    }
}

impl<F> Accept for F
where
    F: FnMut(&Value, f64) -> Result<(), ProjectError>,
{
    fn accept(&mut self, value: &Value, weight: f64) -> Result<(), ProjectError> {
        self(value, weight)
    }
}

/// One output of a projection pass.
pub struct Projection<'a> {
    target: Arc<Expr>,
    selection: Option<Arc<Expr>>,
    sink: &'a mut dyn Accept,
}

impl<'a> Projection<'a> {
    /// Projection computing `target` for every accepted row.
    pub fn new(target: &Arc<Expr>, sink: &'a mut dyn Accept) -> Self {
        Self {
            target: Arc::clone(target),
            selection: None,
            sink,
        }
    }

    /// Restricts the projection to rows where `selection` is true.
    #[must_use]
    pub fn with_selection(mut self, selection: &Arc<Expr>) -> Self {
        self.selection = Some(Arc::clone(selection));
        self
    }
}

impl fmt::Debug for Projection<'_> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("Projection")
            .field("target", &self.target)
            .field("selection", &self.selection)
            .finish_non_exhaustive()
    }
}

/// What a fault in a weight, selection or target does.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ErrorPolicy {
    /// Stop the pass and return the fault.
    #[default]
    Propagate,
    /// Log a warning and move on; a weight fault drops the whole row, a
    /// selection or target fault drops one projection for that row.
    WarnAndSkip,
}

/// What one formula produced on one row, once the policy has been applied
/// to any fault.
enum Outcome<T> {
    /// The formula produced a value.
    Ok(T),
    /// The formula faulted and the policy logged and moved on.
    Skip,
    /// The formula faulted and the policy propagates.
    Fatal(ProjectError),
}

/// Drives projection passes over row sources.
#[derive(Debug, Clone, Default)]
pub struct Projector {
    weight: Option<Arc<Expr>>,
    policy: ErrorPolicy,
}

impl Projector {
    /// Projector weighting every row with one.
    pub fn new() -> Self {
        Self::default()
    }

    /// Weights each row with a formula instead of one.
    #[must_use]
    pub fn with_weight(mut self, weight: &Arc<Expr>) -> Self {
        self.weight = Some(Arc::clone(weight));
        self
    }

    /// Sets the fault policy.
    #[must_use]
    pub fn on_error(mut self, policy: ErrorPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Projects a table through compiled programs.
    ///
    /// Every formula is compiled against the table, so column reads are
    /// typed and subtrees registered with
    /// [`cache_expression`](MemoryTable::cache_expression) are computed once
    /// per row across all projections. Returns the sum of row weights,
    /// including rows no selection accepted.
    pub fn project(
        &self,
        table: &MemoryTable,
        projections: &mut [Projection<'_>],
    ) -> Result<f64, ProjectError> {
        let weight = self.weight.as_ref().map(|expr| table.compile(expr));
        let compiled: Vec<_> = projections
            .iter()
            .map(|projection| {
                let target = table.compile(&projection.target);
                let selection = projection
                    .selection
                    .as_ref()
                    .map(|selection| table.compile(selection));
                (target, selection)
            })
            .collect();

        // Bind only the columns the programs actually read.
        let mut read = std::collections::BTreeSet::new();
        if let Some(expr) = &self.weight {
            read.extend(expr.symbol_names());
        }
        for projection in projections.iter() {
            read.extend(projection.target.symbol_names());
            if let Some(selection) = &projection.selection {
                read.extend(selection.symbol_names());
            }
        }
        let mut bound = Vec::new();
        let mut index_slot = None;
        let mut table_slot = None;
        for name in &read {
            match name.as_str() {
                "_index" => index_slot = Some(symbols::symbol_index(name)),
                "_table" => table_slot = Some(symbols::symbol_index(name)),
                _ => {
                    // Unknown names stay unbound and fault as missing
                    // symbols when a program reads them.
                    if let Some(column) = table.schema().index_of(name) {
                        bound.push((symbols::symbol_index(name), column));
                    }
                }
            }
        }

        let mut caches = table.cache_guard();
        let mut vm = Vm::new();
        let mut frame = Frame::new();
        if let Some(slot) = table_slot {
            frame.set(slot, Value::Object(table.meta_object()));
        }

        let mut total = 0.0;
        for row in 0..table.len() {
            for &(slot, column) in &bound {
                if let Some(value) = table.column(column).value(row) {
                    frame.set(slot, value);
                }
            }
            if let Some(slot) = index_slot {
                frame.set(slot, Value::Int(row as i64));
            }
            frame.set_row(Some(row));

            let row_weight = match &weight {
                None => 1.0,
                Some(program) => {
                    let evaluated = vm
                        .run_cached(program, &frame, &mut caches)
                        .and_then(|value| numeric_weight(&value));
                    match self.resolve(evaluated, row, program.source()) {
                        Outcome::Ok(row_weight) => row_weight,
                        Outcome::Skip => continue,
                        Outcome::Fatal(error) => return Err(error),
                    }
                }
            };
            total += row_weight;

            for (projection, (target, selection)) in projections.iter_mut().zip(&compiled) {
                if let Some(selection) = selection {
                    let keep = vm
                        .run_cached(selection, &frame, &mut caches)
                        .and_then(|value| value.truth());
                    match self.resolve(keep, row, selection.source()) {
                        Outcome::Ok(true) => {}
                        Outcome::Ok(false) | Outcome::Skip => continue,
                        Outcome::Fatal(error) => return Err(error),
                    }
                }
                let evaluated = vm.run_cached(target, &frame, &mut caches);
                let value = match self.resolve(evaluated, row, target.source()) {
                    Outcome::Ok(value) => value,
                    Outcome::Skip => continue,
                    Outcome::Fatal(error) => return Err(error),
                };
                projection.sink.accept(&value, row_weight)?;
            }
        }
        Ok(total)
    }

    /// Projects detached rows through the tree interpreter.
    ///
    /// This is the path for row sources that are not [`MemoryTable`]s; the
    /// semantics match [`project`](Self::project), without typed programs
    /// or caches.
    pub fn project_rows<R, I>(
        &self,
        rows: I,
        projections: &mut [Projection<'_>],
    ) -> Result<f64, ProjectError>
    where
        R: Bindings,
        I: IntoIterator<Item = R>,
    {
        let mut total = 0.0;
        for (row, bindings) in rows.into_iter().enumerate() {
            let row_weight = match &self.weight {
                None => 1.0,
                Some(expr) => {
                    let evaluated =
                        evaluate(expr, &bindings).and_then(|value| numeric_weight(&value));
                    match self.resolve(evaluated, row, &expr.to_string()) {
                        Outcome::Ok(row_weight) => row_weight,
                        Outcome::Skip => continue,
                        Outcome::Fatal(error) => return Err(error),
                    }
                }
            };
            total += row_weight;

            for projection in projections.iter_mut() {
                if let Some(selection) = &projection.selection {
                    let keep = evaluate(selection, &bindings).and_then(|value| value.truth());
                    match self.resolve(keep, row, &selection.to_string()) {
                        Outcome::Ok(true) => {}
                        Outcome::Ok(false) | Outcome::Skip => continue,
                        Outcome::Fatal(error) => return Err(error),
                    }
                }
                let evaluated = evaluate(&projection.target, &bindings);
                let value = match self.resolve(evaluated, row, &projection.target.to_string()) {
                    Outcome::Ok(value) => value,
                    Outcome::Skip => continue,
                    Outcome::Fatal(error) => return Err(error),
                };
                projection.sink.accept(&value, row_weight)?;
            }
        }
        Ok(total)
    }

    /// Applies the error policy to one formula's result.
    fn resolve<T>(&self, result: Result<T, EvalError>, row: usize, source: &str) -> Outcome<T> {
        match result {
            Ok(value) => Outcome::Ok(value),
            Err(fault) => match self.policy {
                ErrorPolicy::Propagate => Outcome::Fatal(ProjectError::Eval {
                    expression: source.to_owned(),
                    fault,
                }),
                ErrorPolicy::WarnAndSkip => {
                    log::warn!("row {row}: skipping `{source}`: {fault}");
                    Outcome::Skip
                }
            },
        }
    }
}

/// Weights must come out as numbers.
fn numeric_weight(value: &Value) -> Result<f64, EvalError> {
    value.as_f64().ok_or_else(|| {
        EvalError::Type(format!(
            "the weight is {}, not a number",
            value.type_name()
        ))
    })
}
