//! One-call histogramming of a value sample.

use ntuple_expr::{Value, ValueType};
use ntuple_hist::{
    AxisError, BinType, BinnedAxis, ErrorModel, Histogram, HistogramError, ShapeError,
};

/// Builds and fills a one-dimensional histogram over a sample.
///
/// The axis is derived from the data unless overridden: integer samples get
/// integer-aligned bins covering every value, float samples get a range
/// rounded outward to a 1-2-5 step so that edges land on round numbers. The
/// default is at most `50` bins. Unweighted integer samples count with
/// Poisson errors; anything weighted or float-valued sums weights with
/// symmetric errors.
///
/// The maximum of the sample always lands in the last numbered bin, not in
/// overflow.
pub fn auto_histogram(
    values: &[Value],
    bins: Option<usize>,
    range: Option<(f64, f64)>,
    weights: Option<&[f64]>,
) -> Result<Histogram, HistogramError> {
    if let Some(weights) = weights {
        if weights.len() != values.len() {
            return Err(ShapeError::Arity {
                expected: values.len(),
                found: weights.len(),
            }
            .into());
        }
    }
    if values.is_empty() && range.is_none() {
        return Err(AxisError::EmptyRange { lo: 0.0, hi: 0.0 }.into());
    }

    let integers = !values.is_empty()
        && values
            .iter()
            .all(|value| matches!(value, Value::Int(_) | Value::Bool(_)));
    let mut coordinates = Vec::with_capacity(values.len());
    for value in values {
        let coordinate = value.as_f64().ok_or_else(|| AxisError::Coordinate {
            found: value.type_name().to_owned(),
            axis: if integers { ValueType::Int } else { ValueType::Float },
        })?;
        coordinates.push(coordinate);
    }

    let target = bins.unwrap_or(50);
    let axis = if integers {
        integer_axis(&coordinates, target, range)?
    } else {
        float_axis(&coordinates, target, range)?
    };

    let bin_type = if integers && weights.is_none() {
        BinType::Int
    } else {
        BinType::Float
    };
    let model = if bin_type == BinType::Int {
        ErrorModel::Poisson
    } else {
        ErrorModel::Symmetric
    };

    let mut histogram = Histogram::new(vec![axis], bin_type, model)?;
    for (row, value) in values.iter().enumerate() {
        let weight = weights.map_or(1.0, |weights| weights[row]);
        histogram.accumulate(std::slice::from_ref(value), weight)?;
    }
    Ok(histogram)
}

/// Integer-aligned axis: bins of equal integer width covering every sample.
fn integer_axis(
    coordinates: &[f64],
    target: usize,
    range: Option<(f64, f64)>,
) -> Result<BinnedAxis, AxisError> {
    if let Some((lo, hi)) = range {
        return BinnedAxis::even(target, (lo, hi), ValueType::Int);
    }
    let lo = coordinates.iter().copied().fold(f64::INFINITY, f64::min) as i64;
    let hi = coordinates.iter().copied().fold(f64::NEG_INFINITY, f64::max) as i64;
    let span = hi - lo + 1;
    let width = span.div_euclid(target as i64) + i64::from(span.rem_euclid(target as i64) != 0);
    let bins = span.div_euclid(width) + i64::from(span.rem_euclid(width) != 0);
    BinnedAxis::even(
        bins as usize,
        (lo as f64, (lo + bins * width) as f64),
        ValueType::Int,
    )
}

/// Float axis with edges on multiples of a 1-2-5 step.
fn float_axis(
    coordinates: &[f64],
    target: usize,
    range: Option<(f64, f64)>,
) -> Result<BinnedAxis, AxisError> {
    if let Some((lo, hi)) = range {
        return BinnedAxis::even(target, (lo, hi), ValueType::Float);
    }
    let min = coordinates.iter().copied().fold(f64::INFINITY, f64::min);
    let max = coordinates.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if min == max {
        // Degenerate sample; a unit range around it keeps the bins usable.
        return BinnedAxis::even(target, (min - 0.5, min + 0.5), ValueType::Float);
    }
    let step = nice_step((max - min) / target as f64);
    let lo = (min / step).floor() * step;
    let mut hi = (max / step).ceil() * step;
    while hi <= max {
        hi += step;
    }
    let bins = ((hi - lo) / step).round() as usize;
    BinnedAxis::even(bins, (lo, hi), ValueType::Float)
}

/// Smallest of 1, 2, 5 times a power of ten that is at least `raw`.
fn nice_step(raw: f64) -> f64 {
    let magnitude = 10.0_f64.powf(raw.log10().floor());
    let fraction = raw / magnitude;
    let nice = if fraction <= 1.0 {
        1.0
    } else if fraction <= 2.0 {
        2.0
    } else if fraction <= 5.0 {
        5.0
    } else {
        10.0
    };
    nice * magnitude
}
