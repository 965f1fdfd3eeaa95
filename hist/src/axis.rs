//! Axes mapping coordinate values to bin numbers.
//!
//! A binned axis splits a half-open range into ordered bins and maps any
//! numeric coordinate to a [`BinIndex`]: a numbered bin, or the underflow or
//! overflow sentinel when the coordinate falls outside the range. Out-of-range
//! coordinates are never an error; only values an axis cannot interpret at
//! all are. An [`UnbinnedAxis`] carries the same descriptive metadata without
//! any binning, for scatter and fit inputs.

use core::fmt;
use std::str::FromStr;

use ntuple_expr::{Value, ValueType};

use crate::error::AxisError;

/// Address of one cell along an axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinIndex {
    /// Strictly below the lower edge of the axis.
    Underflow,
    /// Numbered bin, counted from zero.
    Bin(usize),
    /// At or above the upper edge of the axis.
    Overflow,
}

impl BinIndex {
    /// Parses `"underflow"`, `"overflow"` or a decimal bin number.
    pub fn parse(input: &str) -> Result<Self, AxisError> {
        match input {
            "underflow" => Ok(Self::Underflow),
            "overflow" => Ok(Self::Overflow),
            _ => input.parse().map(Self::Bin).map_err(|_| AxisError::BinAddress {
                input: input.to_owned(),
            }),
        }
    }
}

impl FromStr for BinIndex {
    type Err = AxisError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        Self::parse(input)
    }
}

impl fmt::Display for BinIndex {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Underflow => formatter.write_str("underflow"),
            Self::Bin(bin) => write!(formatter, "{bin}"),
            Self::Overflow => formatter.write_str("overflow"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum AxisKind {
    Even { bins: usize, lo: f64, hi: f64 },
    Uneven { edges: Vec<f64> },
}

/// Axis with a finite set of ordered bins plus under/overflow.
#[derive(Debug, Clone, PartialEq)]
pub struct BinnedAxis {
    kind: AxisKind,
    ty: ValueType,
}

impl BinnedAxis {
    /// Axis of `bins` equal-width bins over the half-open range `lo..hi`.
    ///
    /// An `Int` axis requires integral bounds and a range that splits into
    /// equal integer-width bins, so that every bin covers the same number of
    /// integers.
    pub fn even(bins: usize, (lo, hi): (f64, f64), ty: ValueType) -> Result<Self, AxisError> {
        if !matches!(ty, ValueType::Int | ValueType::Float) {
            return Err(AxisError::UnsupportedType(ty));
        }
        if bins == 0 {
            return Err(AxisError::NoBins);
        }
        if !(lo.is_finite() && hi.is_finite() && lo < hi) {
            return Err(AxisError::EmptyRange { lo, hi });
        }
        if ty == ValueType::Int {
            let indivisible = lo.fract() != 0.0
                || hi.fract() != 0.0
                || ((hi - lo) as i64).rem_euclid(bins as i64) != 0;
            if indivisible {
                return Err(AxisError::Indivisible { lo, hi, bins });
            }
        }
        Ok(Self {
            kind: AxisKind::Even { bins, lo, hi },
            ty,
        })
    }

    /// Axis whose bins are delimited by an explicit edge list.
    ///
    /// `edges` must hold at least two values, finite and strictly
    /// increasing; `n` edges delimit `n - 1` bins. The axis is always a
    /// float axis.
    pub fn uneven(edges: Vec<f64>) -> Result<Self, AxisError> {
        if edges.len() < 2 {
            return Err(AxisError::NoBins);
        }
        let ordered = edges
            .windows(2)
            .all(|pair| pair[0].is_finite() && pair[1].is_finite() && pair[0] < pair[1]);
        if !ordered {
            return Err(AxisError::UnorderedEdges);
        }
        Ok(Self {
            kind: AxisKind::Uneven { edges },
            ty: ValueType::Float,
        })
    }

    /// Coordinate type of the axis, `Int` or `Float`.
    pub fn value_type(&self) -> ValueType {
        self.ty
    }

    /// Number of numbered bins.
    pub fn bin_count(&self) -> usize {
        match &self.kind {
            AxisKind::Even { bins, .. } => *bins,
            AxisKind::Uneven { edges } => edges.len() - 1,
        }
    }

    /// Full `(lo, hi)` range covered by the numbered bins.
    pub fn range(&self) -> (f64, f64) {
        match &self.kind {
            AxisKind::Even { lo, hi, .. } => (*lo, *hi),
            AxisKind::Uneven { edges } => (edges[0], edges[edges.len() - 1]),
        }
    }

    /// Half-open `(lo, hi)` range of one numbered bin.
    pub fn bin_range(&self, bin: usize) -> Result<(f64, f64), AxisError> {
        if bin >= self.bin_count() {
            return Err(AxisError::BinOutOfRange {
                bin,
                bins: self.bin_count(),
            });
        }
        Ok(match &self.kind {
            AxisKind::Even { .. } => (self.even_edge(bin), self.even_edge(bin + 1)),
            AxisKind::Uneven { edges } => (edges[bin], edges[bin + 1]),
        })
    }

    /// Midpoint of one numbered bin.
    pub fn bin_center(&self, bin: usize) -> Result<f64, AxisError> {
        let (lo, hi) = self.bin_range(bin)?;
        Ok((lo + hi) / 2.0)
    }

    /// Width of one numbered bin.
    pub fn bin_width(&self, bin: usize) -> Result<f64, AxisError> {
        let (lo, hi) = self.bin_range(bin)?;
        Ok(hi - lo)
    }

    /// Maps a coordinate value to a bin.
    ///
    /// Out-of-range coordinates map to the sentinels. The only failures are
    /// values the axis type cannot interpret: non-numeric values on any
    /// axis, and fractional values on an `Int` axis.
    pub fn bin_of(&self, value: &Value) -> Result<BinIndex, AxisError> {
        if self.ty == ValueType::Int {
            let coordinate = int_coordinate(value).ok_or_else(|| self.bad_coordinate(value))?;
            return Ok(self.map_int(coordinate));
        }
        let coordinate = value.as_f64().ok_or_else(|| self.bad_coordinate(value))?;
        Ok(self.map_float(coordinate))
    }

    fn bad_coordinate(&self, value: &Value) -> AxisError {
        if let (ValueType::Int, Value::Float(fraction)) = (self.ty, value) {
            return AxisError::Fractional { value: *fraction };
        }
        AxisError::Coordinate {
            found: value.type_name().to_owned(),
            axis: self.ty,
        }
    }

    fn map_int(&self, coordinate: i64) -> BinIndex {
        let AxisKind::Even { bins, lo, hi } = &self.kind else {
            // Uneven axes are always float axes.
            return self.map_float(coordinate as f64);
        };
        let (lo, hi) = (*lo as i64, *hi as i64);
        if coordinate < lo {
            BinIndex::Underflow
        } else if coordinate >= hi {
            BinIndex::Overflow
        } else {
            let width = (hi - lo) / *bins as i64;
            BinIndex::Bin(((coordinate - lo) / width) as usize)
        }
    }

    fn map_float(&self, coordinate: f64) -> BinIndex {
        match &self.kind {
            AxisKind::Even { bins, lo, hi } => {
                if coordinate < *lo || coordinate.is_nan() {
                    BinIndex::Underflow
                } else if coordinate >= *hi {
                    BinIndex::Overflow
                } else {
                    let scaled = (coordinate - lo) / (hi - lo) * *bins as f64;
                    let mut bin = (scaled as usize).min(bins - 1);
                    // Keep the mapping consistent with the edges `bin_range`
                    // reports; rounding in `scaled` can be off by one step.
                    if bin > 0 && coordinate < self.even_edge(bin) {
                        bin -= 1;
                    } else if bin + 1 < *bins && coordinate >= self.even_edge(bin + 1) {
                        bin += 1;
                    }
                    BinIndex::Bin(bin)
                }
            }
            AxisKind::Uneven { edges } => {
                if coordinate < edges[0] || coordinate.is_nan() {
                    BinIndex::Underflow
                } else if coordinate >= edges[edges.len() - 1] {
                    BinIndex::Overflow
                } else {
                    BinIndex::Bin(edges.partition_point(|edge| *edge <= coordinate) - 1)
                }
            }
        }
    }

    fn even_edge(&self, index: usize) -> f64 {
        let AxisKind::Even { bins, lo, hi } = &self.kind else {
            unreachable!("even_edge is only called on even axes");
        };
        lo + (hi - lo) * index as f64 / *bins as f64
    }

    /// Number of storage cells: the bins plus the two sentinels.
    pub(crate) fn cells(&self) -> usize {
        self.bin_count() + 2
    }

    /// The axis with every `group` adjacent bins merged into one.
    ///
    /// The caller has already checked that `group` divides the bin count.
    pub(crate) fn rebinned(&self, group: usize) -> BinnedAxis {
        let kind = match &self.kind {
            AxisKind::Even { bins, lo, hi } => AxisKind::Even {
                bins: bins / group,
                lo: *lo,
                hi: *hi,
            },
            AxisKind::Uneven { edges } => AxisKind::Uneven {
                edges: edges.iter().copied().step_by(group).collect(),
            },
        };
        BinnedAxis { kind, ty: self.ty }
    }
}

/// Integer reading of a coordinate. Floats carrying an exact integer are
/// accepted; fractional and non-finite floats are not.
fn int_coordinate(value: &Value) -> Option<i64> {
    if let Value::Float(float) = value {
        if float.is_finite() && float.fract() == 0.0 {
            return Some(*float as i64);
        }
        return None;
    }
    value.as_i64()
}

/// Axis metadata for scatter and fit inputs; carries no binning.
#[derive(Debug, Clone, PartialEq)]
pub struct UnbinnedAxis {
    ty: ValueType,
    range: Option<(f64, f64)>,
    name: Option<String>,
    units: Option<String>,
}

impl UnbinnedAxis {
    /// Unbinned axis over values of the given type.
    pub fn new(ty: ValueType) -> Self {
        Self {
            ty,
            range: None,
            name: None,
            units: None,
        }
    }

    /// Sets the range the axis is expected to cover.
    #[must_use]
    pub fn with_range(mut self, lo: f64, hi: f64) -> Self {
        self.range = Some((lo, hi));
        self
    }

    /// Sets the display name of the axis.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Sets the units of the axis.
    #[must_use]
    pub fn with_units(mut self, units: impl Into<String>) -> Self {
        self.units = Some(units.into());
        self
    }

    /// Coordinate type of the axis.
    pub fn value_type(&self) -> ValueType {
        self.ty
    }

    /// Expected range, if one was declared.
    pub fn range(&self) -> Option<(f64, f64)> {
        self.range
    }

    /// Display name, if one was declared.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Units, if declared.
    pub fn units(&self) -> Option<&str> {
        self.units.as_deref()
    }
}
