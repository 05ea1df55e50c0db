//! Trailing window functions used by feature augmentation.
//!
//! Every function returns a series aligned with its input; positions without
//! enough history hold `NaN`.

/// Value `k` steps back.
pub fn lag(series: &[f64], k: usize) -> Vec<f64> {
    let n = series.len();
    let mut result = vec![f64::NAN; n];
    for i in k..n {
        result[i] = series[i - k];
    }
    result
}

/// Trailing rolling mean.
pub fn rolling_mean(series: &[f64], window: usize) -> Vec<f64> {
    rolling_apply(series, window, 1, |s| s.iter().sum::<f64>() / s.len() as f64)
}

/// Trailing rolling sample standard deviation.
pub fn rolling_std(series: &[f64], window: usize) -> Vec<f64> {
    rolling_apply(series, window, 2, |s| {
        let mean = s.iter().sum::<f64>() / s.len() as f64;
        let var = s.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (s.len() - 1) as f64;
        var.sqrt()
    })
}

fn rolling_apply<F>(series: &[f64], window: usize, min_window: usize, f: F) -> Vec<f64>
where
    F: Fn(&[f64]) -> f64,
{
    let n = series.len();
    let mut result = vec![f64::NAN; n];
    if window < min_window {
        return result;
    }

    for i in (window - 1)..n {
        result[i] = f(&series[i + 1 - window..=i]);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn lag_shifts_forward() {
        let lagged = lag(&[1.0, 2.0, 3.0, 4.0], 2);
        assert!(lagged[0].is_nan() && lagged[1].is_nan());
        assert_eq!(&lagged[2..], &[1.0, 2.0]);
        assert_eq!(lag(&[1.0, 2.0], 0), vec![1.0, 2.0]);
        assert!(lag(&[1.0], 3)[0].is_nan());
    }

    #[test]
    fn rolling_mean_trailing() {
        let result = rolling_mean(&[1.0, 2.0, 3.0, 4.0, 5.0], 3);
        assert!(result[0].is_nan());
        assert!(result[1].is_nan());
        assert_relative_eq!(result[2], 2.0, epsilon = 1e-10);
        assert_relative_eq!(result[4], 4.0, epsilon = 1e-10);
    }

    #[test]
    fn rolling_std_trailing() {
        let result = rolling_std(&[1.0, 2.0, 3.0, 4.0, 5.0], 3);
        assert!(result[1].is_nan());
        assert_relative_eq!(result[2], 1.0, epsilon = 1e-10);
        assert!(rolling_std(&[1.0, 2.0], 1).iter().all(|v| v.is_nan()));
    }

    #[test]
    fn window_longer_than_series() {
        assert!(rolling_mean(&[1.0, 2.0], 5).iter().all(|v| v.is_nan()));
        assert!(rolling_mean(&[], 3).is_empty());
    }
}
