//! Descriptive statistics used by the fitter.
//!
//! All functions are deterministic: inputs are sorted with `total_cmp`
//! and binning depends only on values, so the same rows in any order
//! yield bit-identical statistics.

use serde::{Deserialize, Serialize};

/// Quantile with linear interpolation between closest ranks.
///
/// `sorted` must be ascending. Returns `None` for an empty slice.
pub fn quantile_sorted(sorted: &[f64], q: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let q = q.clamp(0.0, 1.0);
    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * frac)
}

/// Sorted copy of the finite values in `values`.
pub fn sorted_finite(values: &[f64]) -> Vec<f64> {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    sorted.sort_by(|a, b| a.total_cmp(b));
    sorted
}

/// Median of the finite values, `None` when there are none.
pub fn median(values: &[f64]) -> Option<f64> {
    quantile_sorted(&sorted_finite(values), 0.5)
}

/// Interquartile-range acceptance window `[Q1 - k·IQR, Q3 + k·IQR]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IqrBounds {
    pub q1: f64,
    pub q3: f64,
    pub lower: f64,
    pub upper: f64,
}

impl IqrBounds {
    /// Fit bounds over the finite values with multiplier `k` (1.5 for Tukey fences).
    pub fn fit(values: &[f64], k: f64) -> Option<Self> {
        let sorted = sorted_finite(values);
        let q1 = quantile_sorted(&sorted, 0.25)?;
        let q3 = quantile_sorted(&sorted, 0.75)?;
        let iqr = q3 - q1;
        Some(Self {
            q1,
            q3,
            lower: q1 - k * iqr,
            upper: q3 + k * iqr,
        })
    }

    /// Inclusive membership test.
    pub fn contains(&self, value: f64) -> bool {
        value >= self.lower && value <= self.upper
    }
}

/// Assign each value to an equal-frequency bin.
///
/// Bin edges are the `i / bins` quantiles of the finite values, with
/// duplicate edges merged, and bins are right-closed with the lowest edge
/// included. Equal values always share a bin, so fewer than `bins` bins
/// may be used. The result is parallel to `values`; non-finite values go to
/// bin 0.
pub fn equal_frequency_bins(values: &[f64], bins: usize) -> Vec<usize> {
    let sorted = sorted_finite(values);
    let bins = bins.max(1);
    let mut edges: Vec<f64> = (0..=bins)
        .filter_map(|i| quantile_sorted(&sorted, i as f64 / bins as f64))
        .collect();
    edges.dedup();

    let last = edges.len().saturating_sub(2);
    values
        .iter()
        .map(|&v| match edges.get(1..) {
            Some(upper) if v.is_finite() => upper.partition_point(|&e| e < v).min(last),
            _ => 0,
        })
        .collect()
}
