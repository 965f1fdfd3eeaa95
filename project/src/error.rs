//! Errors of table construction and projection.

use ntuple_expr::EvalError;
use ntuple_hist::HistogramError;
use thiserror::Error;

/// Errors produced while building tables or projecting rows.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ProjectError {
    /// A column was built with a different number of rows than the others.
    #[error("column `{name}` holds {found} rows where {expected} were expected")]
    ColumnLength {
        /// Name of the offending column.
        name: String,
        /// Row count of the columns seen before it.
        expected: usize,
        /// Row count of the offending column.
        found: usize,
    },
    /// Two columns share a name.
    #[error("duplicate column `{name}`")]
    DuplicateColumn {
        /// The repeated name.
        name: String,
    },
    /// A compiled formula faulted and the error policy propagates faults.
    #[error("evaluating `{expression}`: {fault}")]
    Eval {
        /// Source form of the faulting formula.
        expression: String,
        /// The underlying fault.
        #[source]
        fault: EvalError,
    },
    /// A histogram operation failed.
    #[error(transparent)]
    Histogram(#[from] HistogramError),
    /// A projection target refused a value.
    #[error("projection target failed")]
    Sink(#[source] anyhow::Error),
}
