//! N-dimensional histograms.
//!
//! A [`Histogram`] owns a dense block of cells covering every combination of
//! bin numbers of its axes, with an underflow and an overflow cell per axis.
//! Cells hold either exact integer counts or float sums of weights, and each
//! histogram carries one of five [`ErrorModel`]s deciding how a per-bin
//! uncertainty is obtained: from dedicated storage filled alongside the
//! contents, or derived from the contents on demand.
//!
//! Arithmetic never mutates in place. [`Histogram::add`], [`Histogram::scale`]
//! and the rest return new histograms, so a raw spectrum can be kept around
//! while scaled and background-subtracted variants are derived from it.

use core::fmt;
use std::ops::{AddAssign, Range};

use ntuple_expr::Value;

use crate::{
    axis::{BinIndex, BinnedAxis},
    error::{AxisError, HistogramError, ShapeError},
    poisson::poisson_errors,
    statistic::Statistic,
};

/// Storage type of histogram cells.
///
/// Integer histograms count exactly; any operation that would produce a
/// fractional count is an error. Float histograms sum weights.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinType {
    /// Exact integer counts.
    Int,
    /// Float sums of weights.
    Float,
}

/// Rule assigning a `(low, high)` uncertainty to each bin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorModel {
    /// No uncertainties; every bin reports `(0, 0)`.
    None,
    /// Frequentist Poisson intervals derived from the absolute bin content.
    Poisson,
    /// `sqrt(|content|)`, derived from the bin content.
    Gaussian,
    /// One stored sum of squared weights per bin.
    Symmetric,
    /// Separately stored low and high sums of squared weights per bin.
    Asymmetric,
}

impl fmt::Display for ErrorModel {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(match self {
            Self::None => "none",
            Self::Poisson => "poisson",
            Self::Gaussian => "gaussian",
            Self::Symmetric => "symmetric",
            Self::Asymmetric => "asymmetric",
        })
    }
}

/// Bins of one axis summed over by [`Histogram::slice`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BinSelection {
    /// Every numbered bin plus the underflow and overflow cells.
    All,
    /// Every numbered bin, excluding the sentinels.
    Range,
    /// Explicit numbered bins.
    List(Vec<usize>),
}

#[derive(Debug, Clone, PartialEq)]
enum Contents {
    Int(Vec<i64>),
    Float(Vec<f64>),
}

impl Contents {
    fn len(&self) -> usize {
        match self {
            Self::Int(values) => values.len(),
            Self::Float(values) => values.len(),
        }
    }

    fn value(&self, cell: usize) -> f64 {
        match self {
            Self::Int(values) => values[cell] as f64,
            Self::Float(values) => values[cell],
        }
    }

    fn add(&mut self, cell: usize, value: f64) -> Result<(), AxisError> {
        match self {
            Self::Int(values) => values[cell] += exact_int(value)?,
            Self::Float(values) => values[cell] += value,
        }
        Ok(())
    }

    fn set(&mut self, cell: usize, value: f64) -> Result<(), AxisError> {
        match self {
            Self::Int(values) => values[cell] = exact_int(value)?,
            Self::Float(values) => values[cell] = value,
        }
        Ok(())
    }
}

fn exact_int(value: f64) -> Result<i64, AxisError> {
    if value.is_finite() && value.fract() == 0.0 {
        Ok(value as i64)
    } else {
        Err(AxisError::Fractional { value })
    }
}

#[derive(Debug, Clone, PartialEq)]
enum ErrorStorage {
    None,
    Symmetric(Vec<f64>),
    Asymmetric { low: Vec<f64>, high: Vec<f64> },
}

impl ErrorStorage {
    fn for_model(model: ErrorModel, cells: usize) -> Self {
        match model {
            ErrorModel::None | ErrorModel::Poisson | ErrorModel::Gaussian => Self::None,
            ErrorModel::Symmetric => Self::Symmetric(vec![0.0; cells]),
            ErrorModel::Asymmetric => Self::Asymmetric {
                low: vec![0.0; cells],
                high: vec![0.0; cells],
            },
        }
    }
}

/// Sums `values` into a fresh vector of `cells` slots, `target` mapping each
/// source cell to its destination.
fn merged<T>(values: &[T], cells: usize, target: impl Fn(usize) -> usize) -> Vec<T>
where
    T: Copy + Default + AddAssign,
{
    let mut output = vec![T::default(); cells];
    for (cell, value) in values.iter().enumerate() {
        output[target(cell)] += *value;
    }
    output
}

/// Dense N-dimensional histogram with typed contents and per-bin errors.
///
/// Axes are frozen at construction; contents change through
/// [`accumulate`](Self::accumulate) and the `set_bin_*` methods. The cell
/// block has `(n_1 + 2) * ... * (n_D + 2)` slots so that out-of-range
/// coordinates land in underflow or overflow cells instead of being dropped.
#[derive(Debug, Clone, PartialEq)]
pub struct Histogram {
    axes: Vec<BinnedAxis>,
    error_model: ErrorModel,
    contents: Contents,
    errors: ErrorStorage,
    samples: u64,
}

impl Histogram {
    /// Empty histogram over the given axes.
    pub fn new(
        axes: Vec<BinnedAxis>,
        bin_type: BinType,
        error_model: ErrorModel,
    ) -> Result<Self, HistogramError> {
        if axes.is_empty() {
            return Err(ShapeError::NoAxes.into());
        }
        let cells = axes.iter().map(BinnedAxis::cells).product();
        Ok(Self {
            contents: match bin_type {
                BinType::Int => Contents::Int(vec![0; cells]),
                BinType::Float => Contents::Float(vec![0.0; cells]),
            },
            errors: ErrorStorage::for_model(error_model, cells),
            axes,
            error_model,
            samples: 0,
        })
    }

    /// Axes of the histogram, in projection order.
    pub fn axes(&self) -> &[BinnedAxis] {
        &self.axes
    }

    /// Number of axes.
    pub fn dimensions(&self) -> usize {
        self.axes.len()
    }

    /// Storage type of the cells.
    pub fn bin_type(&self) -> BinType {
        match self.contents {
            Contents::Int(_) => BinType::Int,
            Contents::Float(_) => BinType::Float,
        }
    }

    /// Error model of the histogram.
    pub fn error_model(&self) -> ErrorModel {
        self.error_model
    }

    /// Number of [`accumulate`](Self::accumulate) calls, as opposed to the
    /// sum of accumulated weights.
    pub fn number_of_samples(&self) -> u64 {
        self.samples
    }

    /// Adds a weighted sample at the given coordinates.
    ///
    /// Out-of-range coordinates land in underflow or overflow cells. The
    /// histogram is left untouched when a coordinate cannot be interpreted
    /// by its axis or when an integer histogram receives a fractional
    /// weight.
    pub fn accumulate(&mut self, coordinates: &[Value], weight: f64) -> Result<(), HistogramError> {
        if coordinates.len() != self.axes.len() {
            return Err(ShapeError::Arity {
                expected: self.axes.len(),
                found: coordinates.len(),
            }
            .into());
        }
        let mut bins = Vec::with_capacity(coordinates.len());
        for (axis, coordinate) in self.axes.iter().zip(coordinates) {
            bins.push(axis.bin_of(coordinate)?);
        }
        let cell = self.cell_of(&bins)?;
        self.contents.add(cell, weight)?;
        match &mut self.errors {
            ErrorStorage::None => {}
            ErrorStorage::Symmetric(squares) => squares[cell] += weight * weight,
            ErrorStorage::Asymmetric { low, high } => {
                low[cell] += weight * weight;
                high[cell] += weight * weight;
            }
        }
        self.samples += 1;
        Ok(())
    }

    /// Content of one cell.
    pub fn bin_content(&self, bins: &[BinIndex]) -> Result<f64, HistogramError> {
        Ok(self.contents.value(self.cell_of(bins)?))
    }

    /// Overwrites the content of one cell.
    ///
    /// Errors, if the model stores any, are left as they are.
    pub fn set_bin_content(&mut self, bins: &[BinIndex], value: f64) -> Result<(), HistogramError> {
        let cell = self.cell_of(bins)?;
        self.contents.set(cell, value)?;
        Ok(())
    }

    /// `(low, high)` uncertainty of one cell, per the error model.
    pub fn bin_error(&self, bins: &[BinIndex]) -> Result<(f64, f64), HistogramError> {
        Ok(self.cell_error(self.cell_of(bins)?))
    }

    /// Overwrites the symmetric uncertainty of one cell.
    ///
    /// Only the `symmetric` and `asymmetric` models store per-bin errors;
    /// the others derive them from the contents and reject the call.
    pub fn set_bin_error(&mut self, bins: &[BinIndex], error: f64) -> Result<(), HistogramError> {
        let cell = self.cell_of(bins)?;
        match &mut self.errors {
            ErrorStorage::Symmetric(squares) => squares[cell] = error * error,
            ErrorStorage::Asymmetric { low, high } => {
                low[cell] = error * error;
                high[cell] = error * error;
            }
            ErrorStorage::None => {
                return Err(HistogramError::DerivedErrors {
                    model: self.error_model,
                });
            }
        }
        Ok(())
    }

    /// The histogram with every cell multiplied by `factor`.
    ///
    /// Integer histograms stay integer for integral factors and turn into
    /// float histograms otherwise. Errors scale with `|factor|`; the
    /// content-derived models are materialized into stored ones, since the
    /// scaled errors no longer follow from the scaled contents.
    pub fn scale(&self, factor: f64) -> Histogram {
        let contents = match &self.contents {
            Contents::Int(values) if factor.is_finite() && factor.fract() == 0.0 => {
                Contents::Int(values.iter().map(|value| value * factor as i64).collect())
            }
            contents => Contents::Float(
                (0..contents.len())
                    .map(|cell| contents.value(cell) * factor)
                    .collect(),
            ),
        };
        let (mut low, mut high) = self.squared_errors();
        let square = factor * factor;
        for value in low.iter_mut().chain(high.iter_mut()) {
            *value *= square;
        }
        let model = self.materialized_model();
        Histogram {
            axes: self.axes.clone(),
            error_model: model,
            errors: Self::storage_for(model, low, high),
            contents,
            samples: self.samples,
        }
    }

    /// Cell-wise `self + factor * other`. The axes must match exactly.
    ///
    /// Errors combine in quadrature. The result counts in integers only if
    /// both inputs do and `factor` is integral.
    pub fn add(&self, other: &Histogram, factor: f64) -> Result<Histogram, HistogramError> {
        self.check_axes(other)?;
        let contents = match (&self.contents, &other.contents) {
            (Contents::Int(left), Contents::Int(right))
                if factor.is_finite() && factor.fract() == 0.0 =>
            {
                Contents::Int(
                    left.iter()
                        .zip(right)
                        .map(|(mine, theirs)| mine + factor as i64 * theirs)
                        .collect(),
                )
            }
            (left, right) => Contents::Float(
                (0..left.len())
                    .map(|cell| left.value(cell) + factor * right.value(cell))
                    .collect(),
            ),
        };
        let (mut low, mut high) = self.squared_errors();
        let (other_low, other_high) = other.squared_errors();
        let square = factor * factor;
        for (mine, theirs) in low
            .iter_mut()
            .zip(&other_low)
            .chain(high.iter_mut().zip(&other_high))
        {
            *mine += square * theirs;
        }
        let model = Self::combined_model(self.materialized_model(), other.materialized_model());
        Ok(Histogram {
            axes: self.axes.clone(),
            error_model: model,
            errors: Self::storage_for(model, low, high),
            contents,
            samples: self.samples + other.samples,
        })
    }

    /// Cell-wise ratio `self / other`. The axes must match exactly.
    ///
    /// A cell where either input is zero yields zero with zero error; the
    /// remaining cells carry standard ratio-propagated errors. The result is
    /// always a float histogram.
    pub fn divide(&self, other: &Histogram) -> Result<Histogram, HistogramError> {
        self.check_axes(other)?;
        let cells = self.contents.len();
        let (self_low, self_high) = self.squared_errors();
        let (other_low, other_high) = other.squared_errors();
        let mut contents = vec![0.0; cells];
        let mut low = vec![0.0; cells];
        let mut high = vec![0.0; cells];
        for cell in 0..cells {
            let numerator = self.contents.value(cell);
            let denominator = other.contents.value(cell);
            if numerator == 0.0 || denominator == 0.0 {
                continue;
            }
            let quotient = numerator / denominator;
            let relative_low =
                self_low[cell] / (numerator * numerator) + other_low[cell] / (denominator * denominator);
            let relative_high = self_high[cell] / (numerator * numerator)
                + other_high[cell] / (denominator * denominator);
            contents[cell] = quotient;
            low[cell] = quotient * quotient * relative_low;
            high[cell] = quotient * quotient * relative_high;
        }
        let model = Self::combined_model(self.materialized_model(), other.materialized_model());
        Ok(Histogram {
            axes: self.axes.clone(),
            error_model: model,
            errors: Self::storage_for(model, low, high),
            contents: Contents::Float(contents),
            samples: self.samples,
        })
    }

    /// Merges every `group` adjacent bins of a one-dimensional histogram.
    ///
    /// `group` must divide the bin count. Underflow and overflow cells are
    /// carried over, stored errors sum in quadrature and the error model is
    /// kept: merged Poisson counts are Poisson counts again.
    pub fn rebin(&self, group: usize) -> Result<Histogram, HistogramError> {
        let [axis] = self.axes.as_slice() else {
            return Err(ShapeError::WrongDimensions {
                operation: "rebin",
                found: self.axes.len(),
            }
            .into());
        };
        let bins = axis.bin_count();
        if group == 0 || bins % group != 0 {
            return Err(ShapeError::RebinGroup { group, bins }.into());
        }
        let merged_axis = axis.rebinned(group);
        let cells = merged_axis.cells();
        let target = |cell: usize| {
            if cell == 0 {
                0
            } else if cell == bins + 1 {
                cells - 1
            } else {
                1 + (cell - 1) / group
            }
        };
        let contents = match &self.contents {
            Contents::Int(values) => Contents::Int(merged(values, cells, target)),
            Contents::Float(values) => Contents::Float(merged(values, cells, target)),
        };
        let errors = match &self.errors {
            ErrorStorage::None => ErrorStorage::None,
            ErrorStorage::Symmetric(squares) => ErrorStorage::Symmetric(merged(squares, cells, target)),
            ErrorStorage::Asymmetric { low, high } => ErrorStorage::Asymmetric {
                low: merged(low, cells, target),
                high: merged(high, cells, target),
            },
        };
        Ok(Histogram {
            axes: vec![merged_axis],
            error_model: self.error_model,
            contents,
            errors,
            samples: self.samples,
        })
    }

    /// Sums the selected bins of one axis away, dropping a dimension.
    ///
    /// [`BinSelection::All`] includes the underflow and overflow cells of the
    /// sliced axis, [`BinSelection::Range`] covers the numbered bins only and
    /// [`BinSelection::List`] names them explicitly. Stored errors sum in
    /// quadrature; the error model and bin type are kept.
    pub fn slice(&self, axis: usize, selection: &BinSelection) -> Result<Histogram, HistogramError> {
        if self.axes.len() < 2 {
            return Err(ShapeError::WrongDimensions {
                operation: "slice",
                found: self.axes.len(),
            }
            .into());
        }
        if axis >= self.axes.len() {
            return Err(ShapeError::AxisOutOfRange {
                axis,
                dimensions: self.axes.len(),
            }
            .into());
        }
        let sliced = &self.axes[axis];
        let mut selected = vec![false; sliced.cells()];
        match selection {
            BinSelection::All => selected.fill(true),
            BinSelection::Range => selected[1..=sliced.bin_count()].fill(true),
            BinSelection::List(bins) => {
                for &bin in bins {
                    if bin >= sliced.bin_count() {
                        return Err(AxisError::BinOutOfRange {
                            bin,
                            bins: sliced.bin_count(),
                        }
                        .into());
                    }
                    selected[bin + 1] = true;
                }
            }
        }

        let axes: Vec<_> = self
            .axes
            .iter()
            .enumerate()
            .filter(|(index, _)| *index != axis)
            .map(|(_, kept)| kept.clone())
            .collect();
        let cells = axes.iter().map(BinnedAxis::cells).product();
        let mut result = Histogram {
            axes,
            error_model: self.error_model,
            contents: match self.contents {
                Contents::Int(_) => Contents::Int(vec![0; cells]),
                Contents::Float(_) => Contents::Float(vec![0.0; cells]),
            },
            errors: ErrorStorage::for_model(self.error_model, cells),
            samples: self.samples,
        };

        for cell in 0..self.contents.len() {
            let mut coordinates = self.cell_coordinates(cell);
            if !selected[coordinates[axis]] {
                continue;
            }
            coordinates.remove(axis);
            let index = result.cell_index(&coordinates);
            match (&mut result.contents, &self.contents) {
                (Contents::Int(output), Contents::Int(values)) => output[index] += values[cell],
                (Contents::Float(output), Contents::Float(values)) => output[index] += values[cell],
                _ => unreachable!("the sliced histogram keeps the bin type"),
            }
            match (&mut result.errors, &self.errors) {
                (ErrorStorage::None, ErrorStorage::None) => {}
                (ErrorStorage::Symmetric(output), ErrorStorage::Symmetric(squares)) => {
                    output[index] += squares[cell];
                }
                (
                    ErrorStorage::Asymmetric {
                        low: output_low,
                        high: output_high,
                    },
                    ErrorStorage::Asymmetric { low, high },
                ) => {
                    output_low[index] += low[cell];
                    output_high[index] += high[cell];
                }
                _ => unreachable!("the sliced histogram keeps the error model"),
            }
        }
        Ok(result)
    }

    /// The histogram scaled so that its integral equals `total`.
    ///
    /// `overflows` decides whether the sentinel cells count towards the
    /// integral being normalized away.
    pub fn normalized(&self, total: f64, overflows: bool) -> Result<Histogram, HistogramError> {
        let integral = self.integrate(overflows, None)?.value;
        if integral == 0.0 {
            return Err(ShapeError::ZeroIntegral.into());
        }
        Ok(self.scale(total / integral))
    }

    /// Sums cell contents into a [`Statistic`] with a symmetrized error.
    ///
    /// With `ranges` given, one half-open bin range per axis restricts the
    /// sum to numbered bins and `overflows` is ignored. Asymmetric per-cell
    /// errors enter as the mean of their low and high sides.
    pub fn integrate(
        &self,
        overflows: bool,
        ranges: Option<&[Range<usize>]>,
    ) -> Result<Statistic, HistogramError> {
        let mut included = Vec::with_capacity(self.axes.len());
        if let Some(ranges) = ranges {
            if ranges.len() != self.axes.len() {
                return Err(ShapeError::Arity {
                    expected: self.axes.len(),
                    found: ranges.len(),
                }
                .into());
            }
            for (axis, range) in self.axes.iter().zip(ranges) {
                if range.end > axis.bin_count() {
                    return Err(AxisError::BinOutOfRange {
                        bin: range.end,
                        bins: axis.bin_count(),
                    }
                    .into());
                }
                included.push(range.start + 1..range.end + 1);
            }
        } else {
            for axis in &self.axes {
                included.push(if overflows {
                    0..axis.cells()
                } else {
                    1..axis.bin_count() + 1
                });
            }
        }

        let mut int_total = 0_i64;
        let mut float_total = 0.0;
        let mut deviation_squares = 0.0;
        for cell in 0..self.contents.len() {
            let coordinates = self.cell_coordinates(cell);
            let kept = included
                .iter()
                .zip(&coordinates)
                .all(|(range, cell)| range.contains(cell));
            if !kept {
                continue;
            }
            match &self.contents {
                Contents::Int(values) => int_total += values[cell],
                Contents::Float(values) => float_total += values[cell],
            }
            let (low, high) = self.cell_error(cell);
            let deviation = (low + high) / 2.0;
            deviation_squares += deviation * deviation;
        }
        let value = match self.contents {
            Contents::Int(_) => int_total as f64,
            Contents::Float(_) => float_total,
        };
        Ok(Statistic::new(value, deviation_squares.sqrt()))
    }

    /// Linear cell index of a bin-number tuple; the last axis runs fastest.
    fn cell_of(&self, bins: &[BinIndex]) -> Result<usize, HistogramError> {
        if bins.len() != self.axes.len() {
            return Err(ShapeError::Arity {
                expected: self.axes.len(),
                found: bins.len(),
            }
            .into());
        }
        let mut index = 0;
        for (axis, bin) in self.axes.iter().zip(bins) {
            let cell = match *bin {
                BinIndex::Underflow => 0,
                BinIndex::Bin(bin) => {
                    if bin >= axis.bin_count() {
                        return Err(AxisError::BinOutOfRange {
                            bin,
                            bins: axis.bin_count(),
                        }
                        .into());
                    }
                    bin + 1
                }
                BinIndex::Overflow => axis.bin_count() + 1,
            };
            index = index * axis.cells() + cell;
        }
        Ok(index)
    }

    fn cell_index(&self, coordinates: &[usize]) -> usize {
        self.axes
            .iter()
            .zip(coordinates)
            .fold(0, |index, (axis, &cell)| index * axis.cells() + cell)
    }

    fn cell_coordinates(&self, mut cell: usize) -> Vec<usize> {
        let mut coordinates = vec![0; self.axes.len()];
        for (axis, slot) in self.axes.iter().zip(&mut coordinates).rev() {
            *slot = cell % axis.cells();
            cell /= axis.cells();
        }
        coordinates
    }

    fn cell_error(&self, cell: usize) -> (f64, f64) {
        match (self.error_model, &self.errors) {
            (ErrorModel::None, _) => (0.0, 0.0),
            (ErrorModel::Gaussian, _) => {
                let deviation = self.contents.value(cell).abs().sqrt();
                (deviation, deviation)
            }
            (ErrorModel::Poisson, _) => {
                poisson_errors(self.contents.value(cell).abs().round() as u64)
            }
            (ErrorModel::Symmetric, ErrorStorage::Symmetric(squares)) => {
                let deviation = squares[cell].sqrt();
                (deviation, deviation)
            }
            (ErrorModel::Asymmetric, ErrorStorage::Asymmetric { low, high }) => {
                (low[cell].sqrt(), high[cell].sqrt())
            }
            _ => unreachable!("error storage does not match the error model"),
        }
    }

    /// Per-cell `(low^2, high^2)` errors, with the content-derived models
    /// evaluated into plain numbers.
    fn squared_errors(&self) -> (Vec<f64>, Vec<f64>) {
        let cells = self.contents.len();
        match (self.error_model, &self.errors) {
            (ErrorModel::None, _) => (vec![0.0; cells], vec![0.0; cells]),
            (ErrorModel::Gaussian, _) => {
                let squares: Vec<_> = (0..cells)
                    .map(|cell| self.contents.value(cell).abs())
                    .collect();
                (squares.clone(), squares)
            }
            (ErrorModel::Poisson, _) => (0..cells)
                .map(|cell| {
                    let (low, high) = poisson_errors(self.contents.value(cell).abs().round() as u64);
                    (low * low, high * high)
                })
                .unzip(),
            (ErrorModel::Symmetric, ErrorStorage::Symmetric(squares)) => {
                (squares.clone(), squares.clone())
            }
            (ErrorModel::Asymmetric, ErrorStorage::Asymmetric { low, high }) => {
                (low.clone(), high.clone())
            }
            _ => unreachable!("error storage does not match the error model"),
        }
    }

    /// Model a histogram falls back to once its errors no longer follow
    /// from its contents.
    fn materialized_model(&self) -> ErrorModel {
        match self.error_model {
            ErrorModel::None => ErrorModel::None,
            ErrorModel::Symmetric | ErrorModel::Gaussian => ErrorModel::Symmetric,
            ErrorModel::Asymmetric | ErrorModel::Poisson => ErrorModel::Asymmetric,
        }
    }

    fn combined_model(left: ErrorModel, right: ErrorModel) -> ErrorModel {
        match (left, right) {
            (ErrorModel::None, ErrorModel::None) => ErrorModel::None,
            (ErrorModel::Asymmetric, _) | (_, ErrorModel::Asymmetric) => ErrorModel::Asymmetric,
            _ => ErrorModel::Symmetric,
        }
    }

    fn storage_for(model: ErrorModel, low: Vec<f64>, high: Vec<f64>) -> ErrorStorage {
        match model {
            ErrorModel::None | ErrorModel::Poisson | ErrorModel::Gaussian => ErrorStorage::None,
            ErrorModel::Symmetric => ErrorStorage::Symmetric(low),
            ErrorModel::Asymmetric => ErrorStorage::Asymmetric { low, high },
        }
    }

    fn check_axes(&self, other: &Histogram) -> Result<(), ShapeError> {
        if self.axes.len() != other.axes.len() {
            return Err(ShapeError::DimensionMismatch {
                left: self.axes.len(),
                right: other.axes.len(),
            });
        }
        for (axis, (mine, theirs)) in self.axes.iter().zip(&other.axes).enumerate() {
            if mine != theirs {
                return Err(ShapeError::AxisMismatch { axis });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use ntuple_expr::ValueType;

    fn counts(bins: usize, range: (f64, f64)) -> Histogram {
        let axis = BinnedAxis::even(bins, range, ValueType::Float).unwrap();
        Histogram::new(vec![axis], BinType::Int, ErrorModel::Poisson).unwrap()
    }

    #[test]
    fn filling_routes_values_to_cells() {
        let mut histogram = counts(5, (0.0, 50.0));
        for value in [3.0, 12.0, 17.0, -4.0, 110.0] {
            histogram.accumulate(&[Value::Float(value)], 1.0).unwrap();
        }
        assert_eq!(histogram.bin_content(&[BinIndex::Bin(0)]).unwrap(), 1.0);
        assert_eq!(histogram.bin_content(&[BinIndex::Bin(1)]).unwrap(), 2.0);
        assert_eq!(histogram.bin_content(&[BinIndex::Bin(2)]).unwrap(), 0.0);
        assert_eq!(histogram.bin_content(&[BinIndex::Underflow]).unwrap(), 1.0);
        assert_eq!(histogram.bin_content(&[BinIndex::Overflow]).unwrap(), 1.0);
        assert_eq!(histogram.number_of_samples(), 5);
    }

    #[test]
    fn two_dimensional_cells_are_addressed_independently() {
        let x = BinnedAxis::even(2, (0.0, 2.0), ValueType::Float).unwrap();
        let y = BinnedAxis::even(3, (0.0, 3.0), ValueType::Float).unwrap();
        let mut histogram =
            Histogram::new(vec![x, y], BinType::Float, ErrorModel::None).unwrap();
        histogram
            .accumulate(&[Value::Float(0.5), Value::Float(2.5)], 1.0)
            .unwrap();
        histogram
            .accumulate(&[Value::Float(1.5), Value::Float(-1.0)], 2.0)
            .unwrap();

        assert_eq!(
            histogram
                .bin_content(&[BinIndex::Bin(0), BinIndex::Bin(2)])
                .unwrap(),
            1.0
        );
        assert_eq!(
            histogram
                .bin_content(&[BinIndex::Bin(1), BinIndex::Underflow])
                .unwrap(),
            2.0
        );
        assert_eq!(
            histogram
                .bin_content(&[BinIndex::Bin(0), BinIndex::Bin(0)])
                .unwrap(),
            0.0
        );
        assert_matches!(
            histogram.bin_content(&[BinIndex::Bin(0)]),
            Err(HistogramError::Shape(ShapeError::Arity {
                expected: 2,
                found: 1
            }))
        );
    }

    #[test]
    fn int_histograms_reject_fractional_weights() {
        let mut histogram = counts(5, (0.0, 50.0));
        histogram.accumulate(&[Value::Float(3.0)], 2.0).unwrap();
        let error = histogram
            .accumulate(&[Value::Float(3.0)], 0.5)
            .unwrap_err();
        assert_matches!(
            error,
            HistogramError::Axis(AxisError::Fractional { value }) if value == 0.5
        );
        assert_eq!(histogram.bin_content(&[BinIndex::Bin(0)]).unwrap(), 2.0);
        assert_eq!(histogram.number_of_samples(), 1);

        assert_matches!(
            histogram.set_bin_content(&[BinIndex::Bin(0)], 1.5),
            Err(HistogramError::Axis(AxisError::Fractional { .. }))
        );
    }

    #[test]
    fn derived_error_models_follow_the_contents() {
        let axis = BinnedAxis::even(1, (0.0, 1.0), ValueType::Float).unwrap();
        let mut gaussian =
            Histogram::new(vec![axis.clone()], BinType::Float, ErrorModel::Gaussian).unwrap();
        gaussian.set_bin_content(&[BinIndex::Bin(0)], 9.0).unwrap();
        assert_eq!(gaussian.bin_error(&[BinIndex::Bin(0)]).unwrap(), (3.0, 3.0));

        let mut poisson =
            Histogram::new(vec![axis.clone()], BinType::Int, ErrorModel::Poisson).unwrap();
        poisson.set_bin_content(&[BinIndex::Bin(0)], 4.0).unwrap();
        let (low, high) = poisson.bin_error(&[BinIndex::Bin(0)]).unwrap();
        assert!((low - (4.0 - 2.086)).abs() < 1e-9);
        assert!((high - (7.163 - 4.0)).abs() < 1e-9);

        let none = Histogram::new(vec![axis], BinType::Float, ErrorModel::None).unwrap();
        assert_eq!(none.bin_error(&[BinIndex::Bin(0)]).unwrap(), (0.0, 0.0));
    }

    #[test]
    fn derived_error_models_reject_stored_errors() {
        let mut histogram = counts(5, (0.0, 50.0));
        assert_matches!(
            histogram.set_bin_error(&[BinIndex::Bin(0)], 1.0),
            Err(HistogramError::DerivedErrors {
                model: ErrorModel::Poisson
            })
        );
    }

    #[test]
    fn weighted_fills_track_squared_weights() {
        let axis = BinnedAxis::even(1, (0.0, 1.0), ValueType::Float).unwrap();
        let mut histogram =
            Histogram::new(vec![axis], BinType::Float, ErrorModel::Symmetric).unwrap();
        histogram.accumulate(&[Value::Float(0.5)], 2.0).unwrap();
        histogram.accumulate(&[Value::Float(0.5)], 2.0).unwrap();
        assert_eq!(histogram.bin_content(&[BinIndex::Bin(0)]).unwrap(), 4.0);
        let (low, high) = histogram.bin_error(&[BinIndex::Bin(0)]).unwrap();
        assert_eq!(low, 8.0_f64.sqrt());
        assert_eq!(high, low);
    }

    #[test]
    fn scaling_keeps_integer_counts_for_integral_factors() {
        let mut histogram = counts(5, (0.0, 50.0));
        histogram.accumulate(&[Value::Float(3.0)], 2.0).unwrap();
        assert_eq!(histogram.scale(3.0).bin_type(), BinType::Int);
        assert_eq!(
            histogram.scale(3.0).bin_content(&[BinIndex::Bin(0)]).unwrap(),
            6.0
        );
        assert_eq!(histogram.scale(0.5).bin_type(), BinType::Float);
        assert_eq!(
            histogram.scale(0.5).bin_content(&[BinIndex::Bin(0)]).unwrap(),
            1.0
        );
    }

    #[test]
    fn scaling_materializes_derived_errors() {
        let axis = BinnedAxis::even(1, (0.0, 1.0), ValueType::Float).unwrap();
        let mut histogram =
            Histogram::new(vec![axis], BinType::Float, ErrorModel::Gaussian).unwrap();
        histogram.set_bin_content(&[BinIndex::Bin(0)], 9.0).unwrap();

        let doubled = histogram.scale(2.0);
        assert_eq!(doubled.error_model(), ErrorModel::Symmetric);
        assert_eq!(doubled.bin_content(&[BinIndex::Bin(0)]).unwrap(), 18.0);
        assert_eq!(doubled.bin_error(&[BinIndex::Bin(0)]).unwrap(), (6.0, 6.0));
    }

    #[test]
    fn incompatible_histograms_do_not_combine() {
        let five = counts(5, (0.0, 50.0));
        let ten = counts(10, (0.0, 50.0));
        let shifted = counts(5, (0.0, 25.0));
        assert_matches!(
            five.add(&ten, 1.0),
            Err(HistogramError::Shape(ShapeError::AxisMismatch { axis: 0 }))
        );
        assert_matches!(
            five.add(&shifted, 1.0),
            Err(HistogramError::Shape(ShapeError::AxisMismatch { axis: 0 }))
        );

        let x = BinnedAxis::even(5, (0.0, 50.0), ValueType::Float).unwrap();
        let y = BinnedAxis::even(5, (0.0, 50.0), ValueType::Float).unwrap();
        let plane = Histogram::new(vec![x, y], BinType::Int, ErrorModel::Poisson).unwrap();
        assert_matches!(
            five.add(&plane, 1.0),
            Err(HistogramError::Shape(ShapeError::DimensionMismatch {
                left: 1,
                right: 2
            }))
        );
    }

    #[test]
    fn shape_changing_operations_check_their_dimension() {
        let x = BinnedAxis::even(2, (0.0, 2.0), ValueType::Float).unwrap();
        let y = BinnedAxis::even(2, (0.0, 2.0), ValueType::Float).unwrap();
        let plane = Histogram::new(vec![x, y], BinType::Int, ErrorModel::Poisson).unwrap();
        assert_matches!(
            plane.rebin(2),
            Err(HistogramError::Shape(ShapeError::WrongDimensions {
                operation: "rebin",
                found: 2
            }))
        );

        let line = counts(6, (0.0, 6.0));
        assert_matches!(
            line.slice(0, &BinSelection::All),
            Err(HistogramError::Shape(ShapeError::WrongDimensions {
                operation: "slice",
                found: 1
            }))
        );
        assert_matches!(
            line.rebin(4),
            Err(HistogramError::Shape(ShapeError::RebinGroup { group: 4, bins: 6 }))
        );
        assert_matches!(
            plane.slice(2, &BinSelection::All),
            Err(HistogramError::Shape(ShapeError::AxisOutOfRange {
                axis: 2,
                dimensions: 2
            }))
        );
    }

    #[test]
    fn histograms_need_at_least_one_axis() {
        assert_matches!(
            Histogram::new(vec![], BinType::Int, ErrorModel::None),
            Err(HistogramError::Shape(ShapeError::NoAxes))
        );
    }
}
