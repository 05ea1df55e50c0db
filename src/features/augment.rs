//! Derived regressors for forecaster frames.
//!
//! Lags, squares, rolling statistics and differences are computed on the
//! whole timeline so that the first rows of the prediction window can borrow
//! history from the end of the training window.

use crate::config::EnsembleParams;
use crate::core::TimeFrame;
use crate::error::{EnsembleError, Result};
use crate::transform::{difference_aligned, lag, rolling_mean, rolling_std};
use chrono::{DateTime, Utc};
use tracing::debug;

/// Which derived columns to add.
#[derive(Debug, Clone, PartialEq)]
pub struct AugmentOptions {
    pub max_lags: usize,
    pub add_lags: bool,
    pub augment_with_poly: bool,
    pub augment_with_roll_stats: bool,
    pub roll_window: usize,
    pub differentiate: bool,
    pub forecasters_diversity: bool,
}

impl AugmentOptions {
    /// Options for forecaster frames of the first stage.
    pub fn first_stage(params: &EnsembleParams) -> Self {
        Self {
            max_lags: params.max_lags,
            add_lags: params.add_lags,
            augment_with_poly: params.augment_with_poly,
            augment_with_roll_stats: params.augment_with_roll_stats,
            roll_window: params.roll_window,
            differentiate: params.differentiate,
            forecasters_diversity: params.forecasters_diversity,
        }
    }

    /// Number of leading rows whose derived columns lack history.
    pub fn lookback(&self) -> usize {
        let mut lookback = 0;
        if self.add_lags {
            lookback = lookback.max(self.max_lags);
        }
        if self.augment_with_roll_stats {
            lookback = lookback.max(self.roll_window.saturating_sub(1));
        }
        if self.differentiate {
            lookback = lookback.max(1);
        }
        lookback
    }
}

/// An augmented frame and the number of leading rows that are incomplete.
#[derive(Debug, Clone, PartialEq)]
pub struct AugmentedFrame {
    pub frame: TimeFrame,
    pub lookback: usize,
}

/// Quantile suffix shared by every column (`q10` for `a_q10`, `b_q10`).
fn shared_suffix(frame: &TimeFrame) -> Option<&str> {
    let mut suffixes = frame
        .columns()
        .iter()
        .map(|name| name.rsplit_once('_').map(|(_, suffix)| suffix));
    let first = suffixes.next()??;
    suffixes.all(|s| s == Some(first)).then_some(first)
}

/// Row-wise mean, population std and range across forecasters.
///
/// Names carry the quantile suffix of the frame so that diversity columns of
/// the q10 and q90 frames can sit next to those of q50.
fn diversity_columns(frame: &TimeFrame) -> [(String, Vec<f64>); 3] {
    let n = frame.len();
    let columns = frame.values_by_column();
    let mut mean = vec![f64::NAN; n];
    let mut std = vec![f64::NAN; n];
    let mut range = vec![f64::NAN; n];

    for row in 0..n {
        let values: Vec<f64> = columns.iter().map(|c| c[row]).collect();
        let m = values.iter().sum::<f64>() / values.len() as f64;
        mean[row] = m;
        std[row] =
            (values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64).sqrt();
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        range[row] = max - min;
    }

    let name = |stat: &str| match shared_suffix(frame) {
        Some(suffix) => format!("forecasters_{}_{}", stat, suffix),
        None => format!("forecasters_{}", stat),
    };
    [(name("mean"), mean), (name("std"), std), (name("range"), range)]
}

/// Augment `frame` and keep the rows of the training and prediction windows.
///
/// Rows strictly between `end_train` and `start_prediction` are dropped.
/// Every row of the prediction window must be fully populated.
pub fn create_augmented_frame(
    frame: &TimeFrame,
    options: &AugmentOptions,
    end_train: DateTime<Utc>,
    start_prediction: DateTime<Utc>,
) -> Result<AugmentedFrame> {
    if frame.is_empty() {
        return Err(EnsembleError::EmptyData);
    }
    if start_prediction <= end_train {
        return Err(EnsembleError::TimestampError(format!(
            "prediction start {} must follow training end {}",
            start_prediction, end_train
        )));
    }

    let mut base = frame.clone();
    if options.forecasters_diversity {
        for (name, values) in diversity_columns(frame) {
            base.push_column(name, values)?;
        }
    }

    let mut augmented = base.clone();
    let sources: Vec<(String, Vec<f64>)> = base
        .columns()
        .iter()
        .cloned()
        .zip(base.values_by_column().iter().cloned())
        .collect();

    if options.add_lags {
        for (name, values) in &sources {
            for k in 1..=options.max_lags {
                augmented.push_column(format!("{}_lag{}", name, k), lag(values, k))?;
            }
        }
    }
    if options.augment_with_poly {
        for (name, values) in &sources {
            augmented.push_column(
                format!("{}_sq", name),
                values.iter().map(|v| v * v).collect(),
            )?;
        }
    }
    if options.augment_with_roll_stats {
        let w = options.roll_window;
        for (name, values) in &sources {
            augmented.push_column(format!("{}_roll_mean_{}", name, w), rolling_mean(values, w))?;
            augmented.push_column(format!("{}_roll_std_{}", name, w), rolling_std(values, w))?;
        }
    }
    if options.differentiate {
        for (name, values) in &sources {
            augmented.push_column(format!("{}_diff", name), difference_aligned(values, 1))?;
        }
    }

    let train = augmented.rows_between(None, Some(end_train));
    let test = augmented.rows_between(Some(start_prediction), None);
    let missing = test.count_missing();
    if missing > 0 {
        return Err(EnsembleError::MissingValues {
            context: "augmented prediction window".to_string(),
            count: missing,
        });
    }

    let frame = train.append_rows(&test)?;
    debug!(
        columns = frame.n_columns(),
        rows = frame.len(),
        lookback = options.lookback(),
        "augmented frame"
    );

    Ok(AugmentedFrame {
        frame,
        lookback: options.lookback(),
    })
}
