//! Macro-pixel statistics.
//!
//! An [`AggregatedNumber`] summarises the N x N samples of one attribute:
//! counts of present, good and sigma-clipped samples, plus plain and
//! clipped mean/stddev. Computation uses two passes over the samples in
//! `f64` and never fails; empty good sets produce NaN means and zero counts.

use std::fmt;

/// Standard deviations below this value disable sigma clipping.
const MIN_CLIPPING_SIGMA: f64 = 1e-10;

/// Statistics of one macro-pixel attribute.
///
/// Invariant: `filtered_count <= good_count <= total_count`.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregatedNumber {
    /// Samples that are not missing (not NaN).
    pub total_count: usize,
    /// Non-missing samples whose mask is set.
    pub good_count: usize,
    /// Good samples kept by sigma clipping (equals `good_count` without clipping).
    pub filtered_count: usize,
    pub sum: f64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub stddev: f64,
    pub filtered_mean: f64,
    pub filtered_stddev: f64,
}

impl AggregatedNumber {
    /// Statistics of a window without any present sample.
    pub fn empty() -> Self {
        Self {
            total_count: 0,
            good_count: 0,
            filtered_count: 0,
            sum: 0.0,
            min: f64::NAN,
            max: f64::NAN,
            mean: f64::NAN,
            stddev: 0.0,
            filtered_mean: f64::NAN,
            filtered_stddev: 0.0,
        }
    }
}

impl fmt::Display for AggregatedNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "mean={} sigma={} n={} nT={} nF={}",
            self.mean, self.stddev, self.good_count, self.total_count, self.filtered_count
        )
    }
}

#[inline]
fn is_good(mask: Option<&[i64]>, i: usize) -> bool {
    mask.is_none_or(|m| m.get(i).is_some_and(|&v| v != 0))
}

/// Mean and sample standard deviation of the values selected by `keep`.
fn mean_and_sigma<F>(values: &[f64], mut keep: F) -> (usize, f64, f64)
where
    F: FnMut(usize, f64) -> bool,
{
    let mut n = 0usize;
    let mut sum = 0.0;
    for (i, &v) in values.iter().enumerate() {
        if keep(i, v) {
            n += 1;
            sum += v;
        }
    }
    let mean = if n > 0 { sum / n as f64 } else { f64::NAN };

    let mut sum_sq = 0.0;
    for (i, &v) in values.iter().enumerate() {
        if keep(i, v) {
            sum_sq += (v - mean) * (v - mean);
        }
    }
    let sigma = if n > 1 {
        (sum_sq / (n - 1) as f64).sqrt()
    } else {
        0.0
    };
    (n, mean, sigma)
}

/// Aggregate the samples of one attribute.
///
/// `mask` selects good samples (non-zero entries); `None` means all
/// samples are good. A `coefficient` k > 0 enables sigma clipping to
/// `[mean - k*sigma, mean + k*sigma]`.
pub fn aggregate(values: &[f64], mask: Option<&[i64]>, coefficient: f64) -> AggregatedNumber {
    let mut total_count = 0usize;
    let mut sum = 0.0;
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;

    for (i, &v) in values.iter().enumerate() {
        if v.is_nan() {
            continue;
        }
        total_count += 1;
        if is_good(mask, i) {
            sum += v;
            min = min.min(v);
            max = max.max(v);
        }
    }

    let (good_count, mean, stddev) =
        mean_and_sigma(values, |i, v| !v.is_nan() && is_good(mask, i));

    if good_count == 0 {
        return AggregatedNumber {
            total_count,
            ..AggregatedNumber::empty()
        };
    }

    let mut result = AggregatedNumber {
        total_count,
        good_count,
        filtered_count: good_count,
        sum,
        min,
        max,
        mean,
        stddev,
        filtered_mean: mean,
        filtered_stddev: stddev,
    };

    if coefficient <= 0.0 || stddev.abs() < MIN_CLIPPING_SIGMA {
        return result;
    }

    let lower = mean - coefficient * stddev;
    let upper = mean + coefficient * stddev;
    let (filtered_count, filtered_mean, filtered_stddev) = mean_and_sigma(values, |i, v| {
        !v.is_nan() && is_good(mask, i) && v >= lower && v <= upper
    });
    result.filtered_count = filtered_count;
    result.filtered_mean = filtered_mean;
    result.filtered_stddev = filtered_stddev;
    result
}

/// Integer flavour of [`aggregate`]; integer samples are never missing.
pub fn aggregate_ints(values: &[i64], mask: Option<&[i64]>, coefficient: f64) -> AggregatedNumber {
    let floats: Vec<f64> = values.iter().map(|&v| v as f64).collect();
    aggregate(&floats, mask, coefficient)
}
