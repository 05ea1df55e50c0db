//! Differencing.

/// Apply differencing `d` times; the result is `d` elements shorter.
pub fn difference(series: &[f64], d: usize) -> Vec<f64> {
    if d == 0 || series.is_empty() {
        return series.to_vec();
    }

    let mut result = series.to_vec();
    for _ in 0..d {
        if result.len() <= 1 {
            return Vec::new();
        }
        result = result.windows(2).map(|w| w[1] - w[0]).collect();
    }
    result
}

/// Differencing aligned with the input: the first `d` positions are `NaN`.
pub fn difference_aligned(series: &[f64], d: usize) -> Vec<f64> {
    let n = series.len();
    let diffed = difference(series, d);
    let mut result = vec![f64::NAN; n.min(d)];
    result.extend(diffed);
    result.resize(n, f64::NAN);
    result
}
