//! Errors raised by axes and histograms.

use ntuple_expr::ValueType;
use thiserror::Error;

use crate::histogram::ErrorModel;

/// Failure to construct an axis, map a coordinate or address a bin.
#[derive(Debug, Clone, PartialEq, Error)]
#[non_exhaustive]
pub enum AxisError {
    /// An axis was asked for with no bins, or with fewer than two edges.
    #[error("an axis needs at least one bin")]
    NoBins,
    /// Binned range with `lo >= hi`.
    #[error("axis range {lo}..{hi} is empty")]
    EmptyRange {
        /// Lower bound of the offending range.
        lo: f64,
        /// Upper bound of the offending range.
        hi: f64,
    },
    /// Integer axis whose range does not split into equal integer bins.
    #[error("range {lo}..{hi} does not divide into {bins} integer-width bins")]
    Indivisible {
        /// Lower bound of the range.
        lo: f64,
        /// Upper bound of the range.
        hi: f64,
        /// Requested bin count.
        bins: usize,
    },
    /// Bin edges that are not finite and strictly increasing.
    #[error("bin edges must be finite and strictly increasing")]
    UnorderedEdges,
    /// Axis over a type that cannot order coordinates.
    #[error("an axis holds int or float coordinates, not {0}")]
    UnsupportedType(ValueType),
    /// Coordinate value that the axis type cannot represent.
    #[error("cannot map {found} onto a {axis} axis")]
    Coordinate {
        /// Type name of the offending value.
        found: String,
        /// Type of the axis.
        axis: ValueType,
    },
    /// Numbered bin outside `[0, bins)`.
    #[error("bin {bin} out of range for {bins} bins")]
    BinOutOfRange {
        /// The offending bin number.
        bin: usize,
        /// Number of bins on the axis.
        bins: usize,
    },
    /// Value that must be integral for integer binning but is not.
    #[error("{value} is not an integer, as integer binning requires")]
    Fractional {
        /// The offending value.
        value: f64,
    },
    /// Bin address string that is neither a number nor a sentinel.
    #[error("`{input}` is neither a bin number nor `underflow`/`overflow`")]
    BinAddress {
        /// The offending input.
        input: String,
    },
}

/// Histogram operation with incompatible dimensions or axes.
///
/// Raised before any output is mutated, so a failed operation leaves both
/// operands untouched.
#[derive(Debug, Clone, PartialEq, Error)]
#[non_exhaustive]
pub enum ShapeError {
    /// A histogram was asked for with no axes.
    #[error("a histogram needs at least one axis")]
    NoAxes,
    /// Coordinate or address tuple of the wrong length.
    #[error("expected {expected} values, found {found}")]
    Arity {
        /// Number of values the histogram expects.
        expected: usize,
        /// Number of values supplied.
        found: usize,
    },
    /// Binary operation between histograms of different dimensionality.
    #[error("cannot combine {left} dimensions with {right}")]
    DimensionMismatch {
        /// Dimensions of the left operand.
        left: usize,
        /// Dimensions of the right operand.
        right: usize,
    },
    /// Binary operation between histograms whose axes differ.
    #[error("axes differ on dimension {axis}")]
    AxisMismatch {
        /// First dimension on which the axes disagree.
        axis: usize,
    },
    /// Axis number outside the histogram's dimensionality.
    #[error("axis {axis} out of range for a {dimensions}-dimensional histogram")]
    AxisOutOfRange {
        /// The offending axis number.
        axis: usize,
        /// Dimensions of the histogram.
        dimensions: usize,
    },
    /// Rebin group that does not evenly divide the bin count.
    #[error("rebin group {group} does not divide {bins} bins")]
    RebinGroup {
        /// The offending group size.
        group: usize,
        /// Number of bins on the axis.
        bins: usize,
    },
    /// Operation applied to a histogram of unsuitable dimensionality.
    #[error("`{operation}` does not apply to a {found}-dimensional histogram")]
    WrongDimensions {
        /// Name of the operation.
        operation: &'static str,
        /// Dimensions of the histogram.
        found: usize,
    },
    /// Normalisation of a histogram whose integral is zero.
    #[error("cannot normalize a histogram with zero integral")]
    ZeroIntegral,
}

/// Any failure of histogram filling, addressing or arithmetic.
#[derive(Debug, Clone, PartialEq, Error)]
#[non_exhaustive]
pub enum HistogramError {
    /// Axis-level failure.
    #[error(transparent)]
    Axis(#[from] AxisError),
    /// Dimension- or axis-compatibility failure.
    #[error(transparent)]
    Shape(#[from] ShapeError),
    /// A stored error was written to a model that derives errors from
    /// contents.
    #[error("the {model} error model does not store per-bin errors")]
    DerivedErrors {
        /// Model of the histogram.
        model: ErrorModel,
    },
}
