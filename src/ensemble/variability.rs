//! Second stage: forecasting the variability of the first-stage target.
//!
//! The frame is built from the realized targets and the median first-stage
//! predictions (in-sample for the training window, out-of-sample for the
//! horizon). The target is either the absolute `order_diff`-th difference of
//! the realized series or the absolute first-stage error; the regressors are
//! the matching transform of the predictions plus its lags and square.

use crate::config::EnsembleParams;
use crate::core::{Matrix, QuantileLevel, QuantileMap, TimeFrame};
use crate::ensemble::selection::BestResults;
use crate::ensemble::trainer::{train_quantile, QuantileExtras, TrainingInputs};
use crate::error::{EnsembleError, Result};
use crate::features::AugmentedFrame;
use crate::models::FittedModel;
use crate::preprocess::{check_horizon, split_train_test, xy_train_test};
use crate::transform::{difference_aligned, lag, ScalerStats};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

pub const TARGET_COLUMN: &str = "targets";
pub const PREDICTION_COLUMN: &str = "predictions";

/// Derived-column options of the second stage (`*_var` parameters).
#[derive(Debug, Clone, PartialEq)]
pub struct SecondStageOptions {
    pub differentiate: bool,
    pub order_diff: usize,
    pub max_lags: usize,
    pub add_lags: bool,
    pub augment_with_poly: bool,
}

impl SecondStageOptions {
    pub fn from_params(params: &EnsembleParams) -> Self {
        Self {
            differentiate: params.differentiate_var,
            order_diff: params.order_diff,
            max_lags: params.max_lags_var,
            add_lags: params.add_lags_var,
            augment_with_poly: params.augment_with_poly_var,
        }
    }

    pub fn lookback(&self) -> usize {
        let diff = if self.differentiate { self.order_diff } else { 0 };
        let lags = if self.add_lags { self.max_lags } else { 0 };
        diff + lags
    }
}

/// First-stage quantities feeding the second stage, all in scaled units.
#[derive(Debug, Clone, Copy)]
pub struct SecondStageInputs<'a> {
    pub train_index: &'a [DateTime<Utc>],
    pub test_index: &'a [DateTime<Utc>],
    pub y_train: &'a [f64],
    /// Realized horizon targets; NaN where not yet observed.
    pub y_test: &'a [f64],
    pub predictions_insample: &'a [f64],
    pub predictions_outsample: &'a [f64],
}

/// Diagnostics kept for each second-stage quantile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariabilityContribution {
    /// Median first-stage model whose predictions fed this stage.
    pub fitted_model: FittedModel,
    pub var_fitted_model: FittedModel,
    pub x_train: Matrix,
    pub x_test: Matrix,
    pub y_train: Vec<f64>,
    pub scaler_stats: ScalerStats,
}

/// Result of the second stage, in scaled units.
#[derive(Debug, Clone, PartialEq)]
pub struct VariabilityOutcome {
    pub train_index: Vec<DateTime<Utc>>,
    pub test_index: Vec<DateTime<Utc>>,
    pub predictions: QuantileMap<Vec<f64>>,
    pub predictions_insample: QuantileMap<Vec<f64>>,
    /// Realized variability over the horizon; NaN where unknown.
    pub y_test: Vec<f64>,
    pub contributions: QuantileMap<VariabilityContribution>,
    pub best: BestResults,
}

/// Join realized targets and first-stage predictions over train and test rows.
pub fn create_second_stage_frame(inputs: &SecondStageInputs<'_>) -> Result<TimeFrame> {
    let check = |expected: usize, got: usize| -> Result<()> {
        if expected != got {
            return Err(EnsembleError::DimensionMismatch { expected, got });
        }
        Ok(())
    };
    check(inputs.train_index.len(), inputs.y_train.len())?;
    check(inputs.train_index.len(), inputs.predictions_insample.len())?;
    check(inputs.test_index.len(), inputs.y_test.len())?;
    check(inputs.test_index.len(), inputs.predictions_outsample.len())?;

    let mut index = inputs.train_index.to_vec();
    index.extend_from_slice(inputs.test_index);
    let mut targets = inputs.y_train.to_vec();
    targets.extend_from_slice(inputs.y_test);
    let mut predictions = inputs.predictions_insample.to_vec();
    predictions.extend_from_slice(inputs.predictions_outsample);

    TimeFrame::new(
        index,
        vec![TARGET_COLUMN.to_string(), PREDICTION_COLUMN.to_string()],
        vec![targets, predictions],
    )
}

/// Replace the raw columns with the variability target and its regressors.
pub fn create_augmented_second_stage(
    frame: &TimeFrame,
    options: &SecondStageOptions,
) -> Result<AugmentedFrame> {
    let missing_column =
        |name: &str| EnsembleError::InvalidParameter(format!("second stage frame lacks '{}'", name));
    let targets = frame.column(TARGET_COLUMN).ok_or_else(|| missing_column(TARGET_COLUMN))?;
    let predictions = frame
        .column(PREDICTION_COLUMN)
        .ok_or_else(|| missing_column(PREDICTION_COLUMN))?;

    let (target, base, base_name) = if options.differentiate {
        let abs_diff = |v: &[f64]| -> Vec<f64> {
            difference_aligned(v, options.order_diff)
                .into_iter()
                .map(f64::abs)
                .collect()
        };
        (abs_diff(targets), abs_diff(predictions), "predictions_abs_diff")
    } else {
        let errors = targets
            .iter()
            .zip(predictions.iter())
            .map(|(t, p)| (t - p).abs())
            .collect();
        (errors, predictions.to_vec(), PREDICTION_COLUMN)
    };

    let mut augmented = TimeFrame::with_index(frame.index().to_vec())?;
    if options.add_lags {
        for k in 1..=options.max_lags {
            augmented.push_column(format!("{}_lag{}", base_name, k), lag(&base, k))?;
        }
    }
    if options.augment_with_poly {
        augmented.push_column(
            format!("{}_sq", base_name),
            base.iter().map(|v| v * v).collect(),
        )?;
    }
    augmented.push_column(base_name, base)?;
    augmented.push_column(TARGET_COLUMN, target)?;

    Ok(AugmentedFrame {
        frame: augmented,
        lookback: options.lookback(),
    })
}

/// Build, fit and predict the variability models for every configured quantile.
pub fn run_second_stage(
    params: &EnsembleParams,
    scaler_stats: &ScalerStats,
    first_stage_model: &FittedModel,
    inputs: &SecondStageInputs<'_>,
    prior_best: &BestResults,
    iteration: u64,
    end_train: DateTime<Utc>,
    start_prediction: DateTime<Utc>,
) -> Result<VariabilityOutcome> {
    info!("computing variability predictions");

    let frame = create_second_stage_frame(inputs)?;
    let augmented = create_augmented_second_stage(&frame, &SecondStageOptions::from_params(params))?;
    drop(frame);

    let (train, test) = split_train_test(&augmented.frame, end_train, start_prediction);
    let lookback = augmented.lookback;
    drop(augmented);
    let train = train.skip_rows(lookback);

    info!(train_len = train.len(), test_len = test.len(), "second stage frames");
    check_horizon(test.len(), "2nd")?;

    let missing = train.count_missing();
    if missing > 0 {
        return Err(EnsembleError::MissingValues {
            context: "second stage train frame".to_string(),
            count: missing,
        });
    }
    let features = test.select_columns(|c| c != TARGET_COLUMN);
    let missing = features.count_missing();
    if missing > 0 {
        return Err(EnsembleError::MissingValues {
            context: "second stage test features".to_string(),
            count: missing,
        });
    }

    let xy = xy_train_test(&train, &test, TARGET_COLUMN)?;
    let training = TrainingInputs {
        x_train: &xy.x_train,
        y_train: &xy.y_train,
        x_test: &xy.x_test,
        train_frame: &train,
        target: TARGET_COLUMN,
    };

    let mut best = prior_best.clone();
    let mut predictions = QuantileMap::new();
    let mut predictions_insample = QuantileMap::new();
    let mut contributions = QuantileMap::new();
    let no_extras = QuantileExtras::none();

    for &q in &params.quantiles {
        let quantile = QuantileLevel::new(q)?;
        let outcome = train_quantile(params, &training, quantile, &mut best, iteration, &no_extras)?;
        predictions_insample.push(quantile, outcome.insample_predictions()?)?;
        predictions.push(quantile, outcome.predictions.clone())?;
        contributions.push(
            quantile,
            VariabilityContribution {
                fitted_model: first_stage_model.clone(),
                var_fitted_model: outcome.model,
                x_train: outcome.x_train_augmented,
                x_test: outcome.x_test_augmented,
                y_train: xy.y_train.clone(),
                scaler_stats: scaler_stats.clone(),
            },
        )?;
    }

    Ok(VariabilityOutcome {
        train_index: train.index().to_vec(),
        test_index: test.index().to_vec(),
        predictions,
        predictions_insample,
        y_test: xy.y_test,
        contributions,
        best,
    })
}
