//! N-dimensional histograms with typed axes and five bin-error models.
//!
//! A [`Histogram`] combines ordered [`BinnedAxis`] values with a dense cell
//! block: every axis contributes its numbered bins plus an underflow and an
//! overflow cell, so out-of-range samples are counted instead of dropped.
//! Contents are exact integer counts or float weight sums per [`BinType`],
//! and the [`ErrorModel`] decides how each bin reports its `(low, high)`
//! uncertainty: nothing, frequentist Poisson intervals, `sqrt(|content|)`,
//! or stored sums of squared weights.
//!
//! Histogram arithmetic is pure. [`Histogram::scale`], [`Histogram::add`],
//! [`Histogram::divide`], [`Histogram::rebin`], [`Histogram::slice`] and
//! [`Histogram::normalized`] return new histograms and propagate errors in
//! quadrature, checking that axes match exactly.
//!
//! # Examples
//!
//! ```
//! use ntuple_expr::{Value, ValueType};
//! use ntuple_hist::{BinIndex, BinType, BinnedAxis, ErrorModel, Histogram};
//!
//! # fn main() -> Result<(), ntuple_hist::HistogramError> {
//! let axis = BinnedAxis::even(5, (0.0, 50.0), ValueType::Float)?;
//! let mut histogram = Histogram::new(vec![axis], BinType::Float, ErrorModel::Symmetric)?;
//!
//! for pt in [3.0, 12.0, 17.0, 110.0] {
//!     histogram.accumulate(&[Value::Float(pt)], 1.0)?;
//! }
//!
//! assert_eq!(histogram.bin_content(&[BinIndex::Bin(1)])?, 2.0);
//! assert_eq!(histogram.bin_content(&[BinIndex::Overflow])?, 1.0);
//! assert_eq!(histogram.integrate(true, None)?.value, 4.0);
//! # Ok(())
//! # }
//! ```

#![doc(html_root_url = "https://docs.rs/ntuple-hist/0.1.0")]
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
    axis::{BinIndex, BinnedAxis, UnbinnedAxis},
    error::{AxisError, HistogramError, ShapeError},
    histogram::{BinSelection, BinType, ErrorModel, Histogram},
    poisson::poisson_errors,
    statistic::Statistic,
};

mod axis;
mod error;
mod histogram;
mod poisson;
mod statistic;
