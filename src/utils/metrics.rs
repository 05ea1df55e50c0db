//! Accuracy metrics used to rank candidate models.

use crate::config::Scoring;
use crate::core::QuantileLevel;
use crate::error::{EnsembleError, Result};

/// Average of `loss(actual - predicted)`, NaN on empty or ragged input.
fn mean_residual_loss(actual: &[f64], predicted: &[f64], loss: impl Fn(f64) -> f64) -> f64 {
    if actual.is_empty() || actual.len() != predicted.len() {
        return f64::NAN;
    }
    let total: f64 = actual.iter().zip(predicted).map(|(a, p)| loss(a - p)).sum();
    total / actual.len() as f64
}

/// Mean pinball (quantile) loss.
///
/// `rho_tau(r) = r * (tau - 1{r < 0})` with `r = actual - predicted`.
pub fn pinball_loss(actual: &[f64], predicted: &[f64], tau: f64) -> f64 {
    mean_residual_loss(actual, predicted, |r| {
        if r < 0.0 {
            (tau - 1.0) * r
        } else {
            tau * r
        }
    })
}

pub fn mae(actual: &[f64], predicted: &[f64]) -> f64 {
    mean_residual_loss(actual, predicted, f64::abs)
}

pub fn mse(actual: &[f64], predicted: &[f64]) -> f64 {
    mean_residual_loss(actual, predicted, |r| r * r)
}

pub fn rmse(actual: &[f64], predicted: &[f64]) -> f64 {
    mse(actual, predicted).sqrt()
}

/// Score predictions with the configured criterion (lower is better).
pub fn score(
    scoring: Scoring,
    actual: &[f64],
    predicted: &[f64],
    quantile: QuantileLevel,
) -> Result<f64> {
    match (actual.len(), predicted.len()) {
        (0, _) | (_, 0) => return Err(EnsembleError::EmptyData),
        (expected, got) if expected != got => {
            return Err(EnsembleError::DimensionMismatch { expected, got })
        }
        _ => {}
    }

    let value = match scoring {
        Scoring::Pinball => pinball_loss(actual, predicted, quantile.value()),
        Scoring::Mae => mae(actual, predicted),
        Scoring::Rmse => rmse(actual, predicted),
    };

    if !value.is_finite() {
        return Err(EnsembleError::ComputationError(
            "score is not finite".to_string(),
        ));
    }
    Ok(value)
}
