//! Linear quantile regression fitted by iteratively reweighted least squares.
//!
//! The pinball loss `rho_tau(r)` is majorized at the current residuals by a
//! weighted square with weights `|tau - 1{r < 0}| / |r|`, so every iteration
//! is a weighted least squares solve. An optional L1 penalty on the slopes is
//! majorized the same way (`alpha / |beta|` on the diagonal).

use crate::core::{Matrix, QuantileLevel};
use crate::error::{EnsembleError, Result};
use crate::models::traits::{Explanation, QuantileRegressor};
use crate::utils::metrics::pinball_loss;
use crate::utils::ols::{
    invert_symmetric, linear_predict, ols_fit, weighted_least_squares, weighted_normal_equations,
};
use crate::utils::stats::{quantile, std_dev};
use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, StudentsT};
use std::fmt::Write;

/// Residuals smaller than this are clamped when computing IRLS weights.
const RESIDUAL_FLOOR: f64 = 1e-6;

/// Hyperparameters of the linear families.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearParams {
    /// L1 penalty on the slopes; zero for plain quantile regression.
    pub alpha: f64,
    pub max_iter: usize,
    pub tol: f64,
}

impl Default for LinearParams {
    fn default() -> Self {
        Self {
            alpha: 0.0,
            max_iter: 50,
            tol: 1e-6,
        }
    }
}

impl LinearParams {
    pub fn with_alpha(alpha: f64) -> Self {
        Self {
            alpha,
            ..Default::default()
        }
    }
}

/// Linear quantile regression, optionally L1-regularized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearQuantileRegression {
    params: LinearParams,
    coefficients: Option<Vec<f64>>,
    explanation: Option<Explanation>,
    iterations: usize,
}

impl LinearQuantileRegression {
    pub fn new(params: LinearParams) -> Self {
        Self {
            params,
            coefficients: None,
            explanation: None,
            iterations: 0,
        }
    }

    pub fn params(&self) -> &LinearParams {
        &self.params
    }

    /// Intercept followed by slopes, once fitted.
    pub fn coefficients(&self) -> Option<&[f64]> {
        self.coefficients.as_deref()
    }

    /// IRLS iterations used by the last fit.
    pub fn iterations(&self) -> usize {
        self.iterations
    }

    fn irls(&self, x: &Matrix, y: &[f64], tau: f64) -> Result<(Vec<f64>, usize)> {
        let n = y.len();
        let num_params = x.ncols() + 1;
        let mut beta = ols_fit(x, y)?;

        for iter in 0..self.params.max_iter {
            let fitted = linear_predict(x, &beta)?;
            let weights: Vec<f64> = y
                .iter()
                .zip(fitted.iter())
                .map(|(yi, fi)| {
                    let r = yi - fi;
                    let slope = if r < 0.0 { 1.0 - tau } else { tau };
                    slope / r.abs().max(RESIDUAL_FLOOR)
                })
                .collect();

            let penalty: Vec<f64> = if self.params.alpha > 0.0 {
                (0..num_params)
                    .map(|j| {
                        if j == 0 {
                            0.0
                        } else {
                            n as f64 * self.params.alpha / beta[j].abs().max(RESIDUAL_FLOOR)
                        }
                    })
                    .collect()
            } else {
                Vec::new()
            };

            let next = weighted_least_squares(x, y, &weights, &penalty)?;
            let delta = next
                .iter()
                .zip(beta.iter())
                .map(|(a, b)| (a - b).abs())
                .fold(0.0, f64::max);
            let size = next.iter().map(|b| b.abs()).fold(0.0, f64::max);
            beta = next;

            if delta < self.params.tol * (1.0 + size) {
                return Ok((beta, iter + 1));
            }
        }
        Ok((beta, self.params.max_iter))
    }

    fn build_explanation(
        &self,
        x: &Matrix,
        y: &[f64],
        beta: &[f64],
        tau: f64,
    ) -> Result<Explanation> {
        let n = y.len();
        let num_params = beta.len();
        let fitted = linear_predict(x, beta)?;
        let residuals: Vec<f64> = y.iter().zip(fitted.iter()).map(|(a, b)| a - b).collect();

        let loss = pinball_loss(y, &fitted, tau);
        let null_fit = vec![quantile(y, tau); n];
        let loss_null = pinball_loss(y, &null_fit, tau);
        let pseudo_r2 = if loss_null > 0.0 {
            1.0 - loss / loss_null
        } else {
            f64::NAN
        };

        let p_values = self.p_values(x, &residuals, beta, tau)?;

        let mut summary = String::new();
        let _ = writeln!(summary, "Linear quantile regression (tau = {})", tau);
        let _ = writeln!(
            summary,
            "observations: {}  regressors: {}  penalty: {}",
            n,
            num_params - 1,
            self.params.alpha
        );
        let _ = writeln!(summary, "pseudo R2: {:.4}", pseudo_r2);
        let _ = writeln!(summary, "{:<10} {:>14} {:>10}", "term", "coef", "p-value");
        for (j, (b, p)) in beta.iter().zip(p_values.iter()).enumerate() {
            let term = if j == 0 {
                "const".to_string()
            } else {
                format!("x{}", j)
            };
            let _ = writeln!(summary, "{:<10} {:>14.6} {:>10.4}", term, b, p);
        }

        Ok(Explanation {
            coefficients: beta.to_vec(),
            p_values,
            summary,
        })
    }

    /// IID-error p-values: `cov = tau (1 - tau) s^2 (X'X)^-1` with the
    /// sparsity `s` estimated from a Gaussian kernel density of the residuals at 0.
    fn p_values(&self, x: &Matrix, residuals: &[f64], beta: &[f64], tau: f64) -> Result<Vec<f64>> {
        let n = residuals.len();
        let num_params = beta.len();
        let unavailable = vec![f64::NAN; num_params];
        if n <= num_params {
            return Ok(unavailable);
        }

        let sigma = std_dev(residuals);
        let bandwidth = 1.06 * sigma * (n as f64).powf(-0.2);
        if bandwidth.is_nan() || bandwidth <= 0.0 {
            return Ok(unavailable);
        }
        let norm = (2.0 * std::f64::consts::PI).sqrt();
        let density = residuals
            .iter()
            .map(|r| (-(r / bandwidth).powi(2) / 2.0).exp() / norm)
            .sum::<f64>()
            / (n as f64 * bandwidth);
        if density.is_nan() || density <= 0.0 {
            return Ok(unavailable);
        }
        let sparsity = 1.0 / density;

        let (mut xtx, _) = weighted_normal_equations(x, residuals, &vec![1.0; n])?;
        for (i, row) in xtx.iter_mut().enumerate() {
            row[i] += 1e-8;
        }
        let Some(inverse) = invert_symmetric(&xtx) else {
            return Ok(unavailable);
        };

        let dist = StudentsT::new(0.0, 1.0, (n - num_params) as f64)
            .map_err(|e| EnsembleError::ComputationError(e.to_string()))?;
        let scale = tau * (1.0 - tau) * sparsity * sparsity;

        Ok(beta
            .iter()
            .enumerate()
            .map(|(j, b)| {
                let se = (scale * inverse[j][j]).sqrt();
                if se > 0.0 && se.is_finite() {
                    let t = (b / se).abs();
                    (2.0 * (1.0 - dist.cdf(t))).clamp(0.0, 1.0)
                } else {
                    f64::NAN
                }
            })
            .collect())
    }
}

impl QuantileRegressor for LinearQuantileRegression {
    fn fit(&mut self, x: &Matrix, y: &[f64], quantile: QuantileLevel) -> Result<()> {
        if x.nrows() != y.len() {
            return Err(EnsembleError::DimensionMismatch {
                expected: x.nrows(),
                got: y.len(),
            });
        }
        if y.len() < x.ncols() + 2 {
            return Err(EnsembleError::InsufficientData {
                needed: x.ncols() + 2,
                got: y.len(),
            });
        }
        if self.params.alpha < 0.0 {
            return Err(EnsembleError::InvalidParameter(
                "alpha must be non-negative".into(),
            ));
        }

        let tau = quantile.value();
        let (beta, iterations) = self.irls(x, y, tau)?;
        if beta.iter().any(|b| !b.is_finite()) {
            return Err(EnsembleError::ComputationError(
                "non-finite coefficients".into(),
            ));
        }

        self.explanation = Some(self.build_explanation(x, y, &beta, tau)?);
        self.coefficients = Some(beta);
        self.iterations = iterations;
        Ok(())
    }

    fn predict(&self, x: &Matrix) -> Result<Vec<f64>> {
        let beta = self.coefficients.as_ref().ok_or(EnsembleError::FitRequired)?;
        linear_predict(x, beta)
    }

    fn name(&self) -> &str {
        if self.params.alpha > 0.0 {
            "LQR"
        } else {
            "LR"
        }
    }

    fn is_fitted(&self) -> bool {
        self.coefficients.is_some()
    }

    fn explain(&self) -> Option<Explanation> {
        self.explanation.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    /// y = 1 + 2 x + e with e uniform in [-1, 1].
    fn make_data(n: usize) -> (Matrix, Vec<f64>) {
        let mut rng = StdRng::seed_from_u64(7);
        let x: Vec<f64> = (0..n).map(|i| i as f64 / n as f64 * 10.0).collect();
        let y: Vec<f64> = x
            .iter()
            .map(|xi| 1.0 + 2.0 * xi + rng.gen_range(-1.0..1.0))
            .collect();
        (Matrix::from_columns(&[x]).unwrap(), y)
    }

    fn level(q: f64) -> QuantileLevel {
        QuantileLevel::new(q).unwrap()
    }

    #[test]
    fn median_regression_recovers_line() {
        let (x, y) = make_data(400);
        let mut model = LinearQuantileRegression::new(LinearParams::default());
        model.fit(&x, &y, level(0.5)).unwrap();
        let beta = model.coefficients().unwrap();
        assert_relative_eq!(beta[0], 1.0, epsilon = 0.3);
        assert_relative_eq!(beta[1], 2.0, epsilon = 0.1);
        assert_eq!(model.name(), "LR");
    }

    #[test]
    fn quantiles_are_ordered() {
        let (x, y) = make_data(400);
        let mut low = LinearQuantileRegression::new(LinearParams::default());
        let mut high = LinearQuantileRegression::new(LinearParams::default());
        low.fit(&x, &y, level(0.1)).unwrap();
        high.fit(&x, &y, level(0.9)).unwrap();

        let probe = Matrix::from_columns(&[vec![5.0]]).unwrap();
        let lo = low.predict(&probe).unwrap()[0];
        let hi = high.predict(&probe).unwrap()[0];
        assert!(lo < hi);
        // Uniform noise: the 10/90 band is about 1.6 wide.
        assert_relative_eq!(hi - lo, 1.6, epsilon = 0.4);

        let coverage = y
            .iter()
            .zip(high.predict(&x).unwrap())
            .filter(|(a, p)| *a <= p)
            .count() as f64
            / y.len() as f64;
        assert_relative_eq!(coverage, 0.9, epsilon = 0.05);
    }

    #[test]
    fn explanation_flags_significant_slope() {
        let (x, y) = make_data(300);
        let mut model = LinearQuantileRegression::new(LinearParams::default());
        model.fit(&x, &y, level(0.5)).unwrap();
        let explanation = model.explain().unwrap();
        assert_eq!(explanation.coefficients.len(), 2);
        assert!(explanation.p_values[1] < 1e-6);
        assert!(explanation.summary.contains("pseudo R2"));
        assert!(explanation.summary.contains("const"));
    }

    #[test]
    fn l1_penalty_shrinks_noise_regressor() {
        let (x, y) = make_data(300);
        let mut rng = StdRng::seed_from_u64(11);
        let noise: Vec<f64> = (0..300).map(|_| rng.gen_range(-1.0..1.0)).collect();
        let x2 = x.hstack(&Matrix::from_columns(&[noise]).unwrap()).unwrap();

        let mut plain = LinearQuantileRegression::new(LinearParams::default());
        let mut lasso = LinearQuantileRegression::new(LinearParams::with_alpha(0.05));
        plain.fit(&x2, &y, level(0.5)).unwrap();
        lasso.fit(&x2, &y, level(0.5)).unwrap();

        assert!(lasso.coefficients().unwrap()[2].abs() <= plain.coefficients().unwrap()[2].abs());
        assert_eq!(lasso.name(), "LQR");
    }

    #[test]
    fn collinear_regressors_are_tolerated() {
        let (x, y) = make_data(300);
        let mut rng = StdRng::seed_from_u64(3);
        let base = x.column(0);
        let other: Vec<f64> = (0..300).map(|_| rng.gen_range(-3.0..3.0)).collect();
        let combined: Vec<f64> = base.iter().zip(&other).map(|(a, b)| a - b).collect();
        let x3 = Matrix::from_columns(&[base, other, combined]).unwrap();

        let mut model = LinearQuantileRegression::new(LinearParams::default());
        model.fit(&x3, &y, level(0.5)).unwrap();
        let beta = model.coefficients().unwrap();
        assert_eq!(beta[3], 0.0);
        assert!(beta.iter().all(|b| b.is_finite()));
        let explanation = model.explain().unwrap();
        assert!(explanation.p_values[3].is_nan());
        assert!(explanation.p_values[1] < 1e-6);

        let probe = Matrix::from_columns(&[vec![5.0], vec![0.0], vec![5.0]]).unwrap();
        assert_relative_eq!(model.predict(&probe).unwrap()[0], 11.0, epsilon = 0.3);
    }

    #[test]
    fn predict_requires_fit() {
        let model = LinearQuantileRegression::new(LinearParams::default());
        let probe = Matrix::from_columns(&[vec![1.0]]).unwrap();
        assert_eq!(model.predict(&probe), Err(EnsembleError::FitRequired));
        assert!(!model.is_fitted());
    }

    #[test]
    fn rejects_too_few_rows() {
        let x = Matrix::from_columns(&[vec![1.0, 2.0]]).unwrap();
        let mut model = LinearQuantileRegression::new(LinearParams::default());
        assert!(matches!(
            model.fit(&x, &[1.0, 2.0], level(0.5)),
            Err(EnsembleError::InsufficientData { .. })
        ));
    }
}
