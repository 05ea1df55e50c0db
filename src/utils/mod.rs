//! Numerical utilities shared by models and selection.

pub mod metrics;
pub mod ols;
pub mod stats;

pub use metrics::{mae, pinball_loss, rmse, score};
pub use ols::{linear_predict, ols_fit, weighted_least_squares};
pub use stats::{mean, median, quantile, std_dev, variance, weighted_quantile};
