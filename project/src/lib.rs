//! In-memory tables and the projector that fills histograms from them.
//!
//! A [`MemoryTable`] holds named, typed columns of equal length and knows how
//! to compile `ntuple-expr` formulas against its schema: column names become
//! typed symbols, registered subexpressions become per-row cache hits, and
//! the pseudo-columns `_index` and `_table` expose the row number and the
//! table itself. The [`Projector`] then drives any number of compiled
//! [`Projection`]s over the table in a single pass, weighting and selecting
//! rows before histograms accumulate the projected values.
//!
//! # Examples
//!
//! ```
//! use ntuple_expr::{parse_expression, ValueType};
//! use ntuple_hist::{BinIndex, BinType, BinnedAxis, ErrorModel, Histogram};
//! use ntuple_project::{ColumnData, MemoryTable, Projection, Projector};
//!
//! # fn main() -> anyhow::Result<()> {
//! let table = MemoryTable::from_columns(vec![(
//!     "pt",
//!     ColumnData::Float(vec![12.0, 48.0, 31.0]),
//! )])?;
//!
//! let axis = BinnedAxis::even(5, (0.0, 50.0), ValueType::Float)?;
//! let mut histogram = Histogram::new(vec![axis], BinType::Float, ErrorModel::Symmetric)?;
//!
//! let pt = parse_expression("pt")?;
//! let cut = parse_expression("pt > 20.0")?;
//! let mut projections = [Projection::new(&pt, &mut histogram).with_selection(&cut)];
//! let total = Projector::new().project(&table, &mut projections)?;
//!
//! // Every row contributes its weight; only the selected rows fill bins.
//! assert_eq!(total, 3.0);
//! assert_eq!(histogram.bin_content(&[BinIndex::Bin(3)])?, 1.0);
//! assert_eq!(histogram.bin_content(&[BinIndex::Bin(4)])?, 1.0);
//! # Ok(())
//! # }
//! ```

#![doc(html_root_url = "https://docs.rs/ntuple-project/0.1.0")]
#![warn(missing_docs, missing_debug_implementations)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(
    clippy::missing_errors_doc,
    clippy::must_use_candidate,
    clippy::module_name_repetitions,
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_possible_wrap,
    clippy::cast_sign_loss
)]

pub use crate::{
    auto::auto_histogram,
    error::ProjectError,
    projector::{Accept, ErrorPolicy, Projection, Projector},
    schema::{Column, Schema},
    table::{ColumnData, MemoryTable, Row, Rows},
};

mod auto;
mod error;
mod projector;
mod schema;
mod table;
