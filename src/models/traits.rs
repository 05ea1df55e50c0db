//! Common interface of the quantile regression families.

use crate::core::{Matrix, QuantileLevel};
use crate::error::Result;
use serde::{Deserialize, Serialize};

/// Interpretation of a fitted linear model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Explanation {
    /// Intercept first, then one coefficient per regressor.
    pub coefficients: Vec<f64>,
    /// Two-sided p-values aligned with `coefficients`.
    pub p_values: Vec<f64>,
    pub summary: String,
}

/// A regressor that estimates one conditional quantile.
pub trait QuantileRegressor {
    /// Fit the model for the given quantile level.
    fn fit(&mut self, x: &Matrix, y: &[f64], quantile: QuantileLevel) -> Result<()>;

    /// Predict one value per row of `x`.
    fn predict(&self, x: &Matrix) -> Result<Vec<f64>>;

    /// Get the model name.
    fn name(&self) -> &str;

    /// Check if the model has been fitted.
    fn is_fitted(&self) -> bool;

    /// Coefficients, p-values and a summary for interpretable families.
    fn explain(&self) -> Option<Explanation> {
        None
    }
}
