//! Descriptive statistics over `f64` slices.
//!
//! Empty input yields NaN rather than an error; callers filter missing
//! values before calling in.

use std::cmp::Ordering;

pub fn mean(values: &[f64]) -> f64 {
    match values.len() {
        0 => f64::NAN,
        n => values.iter().sum::<f64>() / n as f64,
    }
}

/// Unbiased sample variance (Welford's update).
pub fn variance(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return f64::NAN;
    }
    let (mut running_mean, mut m2) = (0.0, 0.0);
    for (i, &v) in values.iter().enumerate() {
        let delta = v - running_mean;
        running_mean += delta / (i + 1) as f64;
        m2 += delta * (v - running_mean);
    }
    m2 / (values.len() - 1) as f64
}

pub fn std_dev(values: &[f64]) -> f64 {
    variance(values).sqrt()
}

pub fn median(values: &[f64]) -> f64 {
    quantile(values, 0.5)
}

/// Linear-interpolated empirical quantile.
pub fn quantile(values: &[f64], q: f64) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));

    let n = sorted.len();
    let pos = q.clamp(0.0, 1.0) * (n - 1) as f64;
    let lower = pos.floor() as usize;
    let upper = pos.ceil() as usize;
    let frac = pos - lower as f64;

    if lower == upper || upper >= n {
        sorted[lower.min(n - 1)]
    } else {
        sorted[lower] * (1.0 - frac) + sorted[upper] * frac
    }
}

/// Quantile of a weighted empirical distribution (inverse of the weighted CDF).
///
/// Non-positive weights are ignored.
pub fn weighted_quantile(values: &[f64], weights: &[f64], q: f64) -> f64 {
    let mut pairs: Vec<(f64, f64)> = values
        .iter()
        .zip(weights.iter())
        .filter(|(_, &w)| w > 0.0)
        .map(|(&v, &w)| (v, w))
        .collect();
    if pairs.is_empty() {
        return f64::NAN;
    }
    pairs.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(Ordering::Equal));

    let total: f64 = pairs.iter().map(|(_, w)| w).sum();
    let target = q.clamp(0.0, 1.0) * total;
    let mut cumulative = 0.0;
    for &(v, w) in &pairs {
        cumulative += w;
        if cumulative >= target {
            return v;
        }
    }
    pairs[pairs.len() - 1].0
}
