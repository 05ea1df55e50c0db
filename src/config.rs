//! Run configuration for the ensemble engine.
//!
//! `EnsembleParams` can be loaded from TOML or built in code:
//!
//! ```
//! use wind_ensemble::config::{EnsembleParams, ModelType};
//!
//! let params = EnsembleParams::default()
//!     .with_model_type(ModelType::GBR)
//!     .with_quantiles(vec![0.1, 0.5, 0.9]);
//! assert!(params.validate().is_ok());
//!
//! let parsed = EnsembleParams::from_toml_str(r#"
//!     model_type = "LR"
//!     standardize = true
//!     normalize = false
//!     quantiles = [0.1, 0.5, 0.9]
//! "#).unwrap();
//! assert!(parsed.standardize);
//! ```

use crate::core::QuantileLevel;
use crate::error::{EnsembleError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Regression family used by the per-quantile trainer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModelType {
    /// Linear quantile regression (interpretable).
    LR,
    /// L1-regularized linear quantile regression.
    LQR,
    /// Quantile regression forest.
    QRF,
    /// Gradient boosting with the pinball loss.
    GBR,
}

impl ModelType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelType::LR => "LR",
            ModelType::LQR => "LQR",
            ModelType::QRF => "QRF",
            ModelType::GBR => "GBR",
        }
    }

    /// Whether fitted models expose coefficients, p-values and a summary.
    pub fn is_interpretable(&self) -> bool {
        matches!(self, ModelType::LR)
    }
}

/// Criterion used to rank candidate models on the hold-out window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scoring {
    /// Mean pinball loss at the quantile being trained.
    #[default]
    Pinball,
    /// Mean absolute error.
    Mae,
    /// Root mean squared error.
    Rmse,
}

/// Which forecast target a caller is interested in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChallengeUsecase {
    WindPower,
    WindPowerVariability,
    Simulation,
}

/// Scaling applied to forecaster and buyer values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScalingMethod {
    None,
    /// Min/max normalization to [0, 1] over the training window.
    Normalize,
    /// Zero mean, unit variance over the training window.
    Standardize,
}

/// Ensemble parameters (`ens_params`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnsembleParams {
    pub model_type: ModelType,
    pub normalize: bool,
    pub standardize: bool,
    pub scale_features: bool,
    pub max_lags: usize,
    pub max_lags_var: usize,
    pub add_lags: bool,
    pub add_lags_var: bool,
    pub augment_with_poly: bool,
    pub augment_with_poly_var: bool,
    pub augment_with_roll_stats: bool,
    /// Window (rows) of the rolling statistics.
    pub roll_window: usize,
    #[serde(rename = "differenciate")]
    pub differentiate: bool,
    #[serde(rename = "differenciate_var")]
    pub differentiate_var: bool,
    pub order_diff: usize,
    pub add_quantile_predictions: bool,
    pub quantiles: Vec<f64>,
    pub forecasters_diversity: bool,
    pub scoring: Scoring,
    /// Run a full hyperparameter search every `reselect_every` iterations.
    pub reselect_every: u64,
    /// Days at the end of the training window held out for model selection.
    pub validation_days: usize,
    /// Seed for bootstrap and feature sampling in tree ensembles.
    pub seed: u64,
    /// Directory holding one state file per resource.
    pub state_dir: PathBuf,
}

impl Default for EnsembleParams {
    fn default() -> Self {
        Self {
            model_type: ModelType::LR,
            normalize: true,
            standardize: false,
            scale_features: true,
            max_lags: 4,
            max_lags_var: 4,
            add_lags: true,
            add_lags_var: true,
            augment_with_poly: false,
            augment_with_poly_var: false,
            augment_with_roll_stats: false,
            roll_window: 4,
            differentiate: false,
            differentiate_var: true,
            order_diff: 1,
            add_quantile_predictions: true,
            quantiles: vec![0.1, 0.5, 0.9],
            forecasters_diversity: false,
            scoring: Scoring::Pinball,
            reselect_every: 7,
            validation_days: 3,
            seed: 42,
            state_dir: PathBuf::from("ensemble_state"),
        }
    }
}

impl EnsembleParams {
    /// Parse parameters from a TOML document; missing keys take defaults.
    pub fn from_toml_str(source: &str) -> Result<Self> {
        toml::from_str(source)
            .map_err(|e| EnsembleError::Config(format!("failed to parse parameters: {}", e)))
    }

    /// Load parameters from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|e| {
            EnsembleError::Config(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&source)
    }

    pub fn with_model_type(mut self, model_type: ModelType) -> Self {
        self.model_type = model_type;
        self
    }

    pub fn with_quantiles(mut self, quantiles: Vec<f64>) -> Self {
        self.quantiles = quantiles;
        self
    }

    /// Select the scaling method; also enables feature scaling when a method is chosen.
    pub fn with_scaling(mut self, method: ScalingMethod) -> Self {
        self.normalize = method == ScalingMethod::Normalize;
        self.standardize = method == ScalingMethod::Standardize;
        if method != ScalingMethod::None {
            self.scale_features = true;
        }
        self
    }

    pub fn with_max_lags(mut self, max_lags: usize) -> Self {
        self.max_lags = max_lags;
        self
    }

    pub fn with_state_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.state_dir = dir.into();
        self
    }

    pub fn with_scoring(mut self, scoring: Scoring) -> Self {
        self.scoring = scoring;
        self
    }

    pub fn with_quantile_predictions(mut self, enabled: bool) -> Self {
        self.add_quantile_predictions = enabled;
        self
    }

    /// The scaling method implied by `normalize` / `standardize`.
    pub fn scaling_method(&self) -> ScalingMethod {
        if self.normalize {
            ScalingMethod::Normalize
        } else if self.standardize {
            ScalingMethod::Standardize
        } else {
            ScalingMethod::None
        }
    }

    /// Configured quantile levels in order.
    pub fn quantile_levels(&self) -> Result<Vec<QuantileLevel>> {
        self.quantiles.iter().map(|&q| QuantileLevel::new(q)).collect()
    }

    /// Reject contradictory or unsupported settings before any data is touched.
    pub fn validate(&self) -> Result<()> {
        if self.normalize && self.standardize {
            return Err(EnsembleError::Config(
                "normalize and standardize cannot both be true".into(),
            ));
        }
        if (self.normalize || self.standardize) && !self.scale_features {
            return Err(EnsembleError::Config(
                "scale_features must be true if normalize or standardize is true".into(),
            ));
        }
        if self.model_type == ModelType::LR && !(self.normalize || self.standardize) {
            return Err(EnsembleError::Config(
                "normalize or standardize must be true for model_type 'LR'".into(),
            ));
        }

        let levels = self.quantile_levels().map_err(|e| EnsembleError::Config(e.to_string()))?;
        if levels.is_empty() {
            return Err(EnsembleError::Config("quantiles must not be empty".into()));
        }
        if levels.windows(2).any(|w| w[1].value() <= w[0].value()) {
            return Err(EnsembleError::Config(
                "quantiles must be strictly increasing".into(),
            ));
        }
        if !levels.iter().any(|q| q.is_median()) {
            return Err(EnsembleError::Config("quantiles must include 0.5".into()));
        }

        if self.add_lags && self.max_lags == 0 {
            return Err(EnsembleError::Config(
                "max_lags must be positive when add_lags is true".into(),
            ));
        }
        if self.add_lags_var && self.max_lags_var == 0 {
            return Err(EnsembleError::Config(
                "max_lags_var must be positive when add_lags_var is true".into(),
            ));
        }
        if self.order_diff == 0 {
            return Err(EnsembleError::Config("order_diff must be positive".into()));
        }
        if self.augment_with_roll_stats && self.roll_window < 2 {
            return Err(EnsembleError::Config(
                "roll_window must be at least 2".into(),
            ));
        }
        if self.reselect_every == 0 {
            return Err(EnsembleError::Config(
                "reselect_every must be positive".into(),
            ));
        }
        Ok(())
    }
}
