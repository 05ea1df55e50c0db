//! Per-quantile training: prior best, candidate fits, selection, prediction.

use crate::config::EnsembleParams;
use crate::core::{Matrix, QuantileLevel, TimeFrame};
use crate::ensemble::selection::{select_and_fit, BestEntry, BestResults};
use crate::error::{EnsembleError, Result};
use crate::models::{Explanation, FittedModel};
use crate::transform::ScalerStats;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Model-ready data shared by every quantile of a stage.
#[derive(Debug, Clone, Copy)]
pub struct TrainingInputs<'a> {
    pub x_train: &'a Matrix,
    pub y_train: &'a [f64],
    pub x_test: &'a Matrix,
    /// Training frame (features then target) the matrices were built from.
    pub train_frame: &'a TimeFrame,
    /// Name of the target column in `train_frame`.
    pub target: &'a str,
}

/// Augmented q10/q90 forecaster features aligned with the base matrices.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct QuantileExtras {
    pub q10_columns: Vec<String>,
    pub q10_train: Matrix,
    pub q10_test: Matrix,
    pub q90_columns: Vec<String>,
    pub q90_train: Matrix,
    pub q90_test: Matrix,
}

impl QuantileExtras {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.q10_train.is_empty() && self.q90_train.is_empty()
    }

    /// q10 features for levels below the median, q90 features above it.
    pub fn for_level(&self, quantile: QuantileLevel) -> Option<(&[String], &Matrix, &Matrix)> {
        let (columns, train, test) = if quantile.is_median() {
            return None;
        } else if quantile.value() < 0.5 {
            (&self.q10_columns, &self.q10_train, &self.q10_test)
        } else {
            (&self.q90_columns, &self.q90_train, &self.q90_test)
        };
        if train.is_empty() {
            None
        } else {
            Some((columns.as_slice(), train, test))
        }
    }
}

/// Everything produced by training one quantile.
#[derive(Debug, Clone, PartialEq)]
pub struct QuantileOutcome {
    pub quantile: QuantileLevel,
    /// Out-of-sample predictions, in model (scaled) units.
    pub predictions: Vec<f64>,
    pub model: FittedModel,
    pub best: BestEntry,
    pub searched: bool,
    pub x_train_augmented: Matrix,
    pub x_test_augmented: Matrix,
    pub train_frame_augmented: TimeFrame,
    pub explanation: Option<Explanation>,
}

impl QuantileOutcome {
    /// In-sample predictions on the augmented training matrix.
    pub fn insample_predictions(&self) -> Result<Vec<f64>> {
        self.model.predict(&self.x_train_augmented)
    }
}

/// Diagnostics kept for each first-stage quantile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastContribution {
    pub fitted_model: FittedModel,
    pub x_train_augmented: Matrix,
    pub x_test_augmented: Matrix,
    pub train_frame_augmented: TimeFrame,
    pub scaler_stats: ScalerStats,
    pub explanation: Option<Explanation>,
}

impl ForecastContribution {
    pub fn from_outcome(outcome: &QuantileOutcome, scaler_stats: &ScalerStats) -> Self {
        Self {
            fitted_model: outcome.model.clone(),
            x_train_augmented: outcome.x_train_augmented.clone(),
            x_test_augmented: outcome.x_test_augmented.clone(),
            train_frame_augmented: outcome.train_frame_augmented.clone(),
            scaler_stats: scaler_stats.clone(),
            explanation: outcome.explanation.clone(),
        }
    }
}

/// Train frame with auxiliary quantile columns inserted before the target.
fn augment_train_frame(
    inputs: &TrainingInputs<'_>,
    extra: Option<(&[String], &Matrix, &Matrix)>,
) -> Result<TimeFrame> {
    let Some((columns, train, _)) = extra else {
        return Ok(inputs.train_frame.clone());
    };
    let mut frame = inputs.train_frame.clone();
    let target = frame.take_column(inputs.target).ok_or_else(|| {
        EnsembleError::InvalidParameter(format!("missing target '{}'", inputs.target))
    })?;
    for (j, name) in columns.iter().enumerate() {
        frame.push_column(name.clone(), train.column(j))?;
    }
    frame.push_column(inputs.target, target)?;
    Ok(frame)
}

/// Train, select and predict for one quantile, updating `best` in place.
pub fn train_quantile(
    params: &EnsembleParams,
    inputs: &TrainingInputs<'_>,
    quantile: QuantileLevel,
    best: &mut BestResults,
    iteration: u64,
    extras: &QuantileExtras,
) -> Result<QuantileOutcome> {
    let extra = if params.add_quantile_predictions {
        extras.for_level(quantile)
    } else {
        None
    };

    let (x_train_augmented, x_test_augmented) = match extra {
        Some((_, train, test)) => (inputs.x_train.hstack(train)?, inputs.x_test.hstack(test)?),
        None => (inputs.x_train.clone(), inputs.x_test.clone()),
    };
    let train_frame_augmented = augment_train_frame(inputs, extra)?;

    let missing = x_train_augmented.count_missing() + inputs.y_train.iter().filter(|v| !v.is_finite()).count();
    if missing > 0 {
        return Err(EnsembleError::MissingValues {
            context: format!("training data for quantile {}", quantile),
            count: missing,
        });
    }

    let selection = select_and_fit(
        params,
        &x_train_augmented,
        inputs.y_train,
        quantile,
        best.get(quantile),
        iteration,
    )?;
    let predictions = selection.model.predict(&x_test_augmented)?;
    let explanation = selection.model.explain();

    info!(
        quantile = quantile.value(),
        features = x_train_augmented.ncols(),
        extras = extra.is_some(),
        searched = selection.searched,
        "trained quantile model"
    );

    best.insert(quantile, selection.best.clone());

    Ok(QuantileOutcome {
        quantile,
        predictions,
        model: selection.model,
        best: selection.best,
        searched: selection.searched,
        x_train_augmented,
        x_test_augmented,
        train_frame_augmented,
        explanation,
    })
}
