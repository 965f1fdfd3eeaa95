//! Poisson counting errors for low bin contents.
//!
//! A bin holding `n` raw counts has an asymmetric uncertainty: the 68.27%
//! central-confidence (Garwood) interval around `n` is wider above than
//! below, markedly so for small `n` where the symmetric `sqrt(n)` estimate
//! breaks down entirely (`n = 0` would claim zero uncertainty). The interval
//! bounds for `n <= 10` are tabulated; beyond that the symmetric estimate is
//! accurate to a few percent and is used instead.

use once_cell::sync::Lazy;

/// Garwood 68.27% central-confidence interval bounds `(lo, hi)` around
/// `n = 0..=10` counts.
const INTERVALS: [(f64, f64); 11] = [
    (0.000, 1.841),
    (0.173, 3.300),
    (0.708, 4.638),
    (1.367, 5.918),
    (2.086, 7.163),
    (2.840, 8.382),
    (3.620, 9.584),
    (4.419, 10.770),
    (5.232, 11.950),
    (6.057, 13.110),
    (6.891, 14.260),
];

/// Deviations `(n - lo, hi - n)` derived from the tabulated bounds.
static DEVIATIONS: Lazy<[(f64, f64); 11]> = Lazy::new(|| {
    let mut table = [(0.0, 0.0); 11];
    for (n, (lo, hi)) in INTERVALS.iter().enumerate() {
        let n_f = n as f64;
        table[n] = (n_f - lo, hi - n_f);
    }
    table
});

/// `(lo, hi)` error on a bin holding `n` counts.
pub fn poisson_errors(n: u64) -> (f64, f64) {
    match DEVIATIONS.get(n as usize) {
        Some(&deviation) => deviation,
        None => {
            let symmetric = (n as f64).sqrt();
            (symmetric, symmetric)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(actual: (f64, f64), expected: (f64, f64)) {
        assert!(
            (actual.0 - expected.0).abs() < 1e-9 && (actual.1 - expected.1).abs() < 1e-9,
            "{actual:?} != {expected:?}"
        );
    }

    #[test]
    fn empty_bins_still_have_an_upper_error() {
        assert_eq!(poisson_errors(0), (0.0, 1.841));
    }

    #[test]
    fn low_counts_match_the_garwood_intervals() {
        assert_close(poisson_errors(1), (0.827, 2.300));
        assert_close(poisson_errors(5), (2.160, 3.382));
        assert_close(poisson_errors(10), (3.109, 4.260));
    }

    #[test]
    fn large_counts_fall_back_to_sqrt() {
        assert_eq!(poisson_errors(100), (10.0, 10.0));
        assert_eq!(poisson_errors(12), (12.0_f64.sqrt(), 12.0_f64.sqrt()));
    }

    #[test]
    fn tabulated_intervals_straddle_sqrt() {
        for n in 1..=10 {
            let (lo, hi) = poisson_errors(n);
            let symmetric = (n as f64).sqrt();
            assert!(lo < symmetric && symmetric < hi, "n = {n}");
        }
    }
}
