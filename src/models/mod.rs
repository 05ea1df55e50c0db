//! Quantile regression families.
//!
//! Each family implements [`QuantileRegressor`]. [`ModelParams`] names a
//! family together with its hyperparameters and [`FittedModel`] is the
//! serializable result of fitting it:
//!
//! ```
//! use wind_ensemble::config::ModelType;
//! use wind_ensemble::core::{Matrix, QuantileLevel};
//! use wind_ensemble::models::ModelParams;
//!
//! let x = Matrix::from_columns(&[(0..50).map(|i| i as f64).collect()]).unwrap();
//! let y: Vec<f64> = (0..50).map(|i| 2.0 * i as f64 + 1.0).collect();
//!
//! let params = &ModelParams::candidate_grid(ModelType::LR, 42)[0];
//! let model = params.fit(&x, &y, QuantileLevel::MEDIAN).unwrap();
//! let predictions = model.predict(&x).unwrap();
//! assert!((predictions[10] - 21.0).abs() < 1e-3);
//! assert!(model.explain().is_some());
//! ```

mod traits;

pub mod boosting;
pub mod forest;
pub mod linear;
pub mod tree;

pub use boosting::{BoostingParams, GradientBoosting};
pub use forest::{ForestParams, QuantileForest};
pub use linear::{LinearParams, LinearQuantileRegression};
pub use traits::{Explanation, QuantileRegressor};

use crate::config::ModelType;
use crate::core::{Matrix, QuantileLevel};
use crate::error::{EnsembleError, Result};
use serde::{Deserialize, Serialize};

/// A model family and its hyperparameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ModelParams {
    LR(LinearParams),
    LQR(LinearParams),
    QRF(ForestParams),
    GBR(BoostingParams),
}

impl ModelParams {
    pub fn model_type(&self) -> ModelType {
        match self {
            ModelParams::LR(_) => ModelType::LR,
            ModelParams::LQR(_) => ModelType::LQR,
            ModelParams::QRF(_) => ModelType::QRF,
            ModelParams::GBR(_) => ModelType::GBR,
        }
    }

    /// Hyperparameter candidates searched for a family.
    pub fn candidate_grid(model_type: ModelType, seed: u64) -> Vec<ModelParams> {
        match model_type {
            ModelType::LR => vec![ModelParams::LR(LinearParams::default())],
            ModelType::LQR => [0.001, 0.01, 0.1]
                .iter()
                .map(|&alpha| ModelParams::LQR(LinearParams::with_alpha(alpha)))
                .collect(),
            ModelType::QRF => [(6, 10), (10, 5)]
                .iter()
                .map(|&(max_depth, min_samples_leaf)| {
                    ModelParams::QRF(ForestParams {
                        n_trees: 30,
                        max_depth,
                        min_samples_leaf,
                        max_features: None,
                        seed,
                    })
                })
                .collect(),
            ModelType::GBR => [(50, 0.1), (100, 0.05)]
                .iter()
                .map(|&(n_estimators, learning_rate)| {
                    ModelParams::GBR(BoostingParams {
                        n_estimators,
                        learning_rate,
                        seed,
                        ..Default::default()
                    })
                })
                .collect(),
        }
    }

    fn build(&self) -> FittedModel {
        match self {
            ModelParams::LR(p) => FittedModel::LR(LinearQuantileRegression::new(p.clone())),
            ModelParams::LQR(p) => FittedModel::LQR(LinearQuantileRegression::new(p.clone())),
            ModelParams::QRF(p) => FittedModel::QRF(QuantileForest::new(p.clone())),
            ModelParams::GBR(p) => FittedModel::GBR(GradientBoosting::new(p.clone())),
        }
    }

    /// Fit a fresh model with these hyperparameters.
    ///
    /// Failures are reported as [`EnsembleError::ModelFit`] tagged with the quantile.
    pub fn fit(&self, x: &Matrix, y: &[f64], quantile: QuantileLevel) -> Result<FittedModel> {
        let mut model = self.build();
        model
            .as_regressor_mut()
            .fit(x, y, quantile)
            .map_err(|e| EnsembleError::ModelFit {
                quantile: quantile.value(),
                reason: e.to_string(),
            })?;
        Ok(model)
    }
}

/// A fitted model of any family.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FittedModel {
    LR(LinearQuantileRegression),
    LQR(LinearQuantileRegression),
    QRF(QuantileForest),
    GBR(GradientBoosting),
}

impl FittedModel {
    fn as_regressor(&self) -> &dyn QuantileRegressor {
        match self {
            FittedModel::LR(m) | FittedModel::LQR(m) => m,
            FittedModel::QRF(m) => m,
            FittedModel::GBR(m) => m,
        }
    }

    fn as_regressor_mut(&mut self) -> &mut dyn QuantileRegressor {
        match self {
            FittedModel::LR(m) | FittedModel::LQR(m) => m,
            FittedModel::QRF(m) => m,
            FittedModel::GBR(m) => m,
        }
    }

    pub fn model_type(&self) -> ModelType {
        match self {
            FittedModel::LR(_) => ModelType::LR,
            FittedModel::LQR(_) => ModelType::LQR,
            FittedModel::QRF(_) => ModelType::QRF,
            FittedModel::GBR(_) => ModelType::GBR,
        }
    }

    pub fn predict(&self, x: &Matrix) -> Result<Vec<f64>> {
        self.as_regressor().predict(x)
    }

    pub fn name(&self) -> &str {
        self.as_regressor().name()
    }

    /// Coefficients, p-values and summary; only the `LR` family is interpretable.
    pub fn explain(&self) -> Option<Explanation> {
        match self {
            FittedModel::LR(m) => m.explain(),
            _ => None,
        }
    }
}
