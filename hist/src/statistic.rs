//! Scalar measurement with a symmetric uncertainty.

/// Value with a one-sigma spread, as returned by histogram integration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Statistic {
    /// The measured value.
    pub value: f64,
    /// Symmetric standard deviation of the value.
    pub stddev: f64,
}

impl Statistic {
    /// Creates a statistic from a value and its spread.
    pub fn new(value: f64, stddev: f64) -> Self {
        Self { value, stddev }
    }

    /// Sum of independent statistics: values add, spreads combine in
    /// quadrature.
    pub fn combined(terms: &[Statistic]) -> Statistic {
        let value = terms.iter().map(|term| term.value).sum();
        let variance: f64 = terms.iter().map(|term| term.stddev * term.stddev).sum();
        Statistic::new(value, variance.sqrt())
    }
}
