//! Buyer-derived scaling of forecaster and target values.
//!
//! Statistics are computed once per run from the buyer's own history up to
//! the training cutoff, then applied unchanged to every forecaster column so
//! that features and target share one scale.

use crate::config::{EnsembleParams, ScalingMethod};
use crate::core::TimeFrame;
use crate::error::{EnsembleError, Result};
use crate::preprocess::QuantileFrames;
use crate::utils::stats::{mean, std_dev};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which pipeline stage produced the values being rescaled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Stage {
    /// Levels of the target (wind power).
    First,
    /// Magnitudes of changes or errors; rescaled without the location offset.
    Second,
}

impl Stage {
    pub fn label(&self) -> &'static str {
        match self {
            Stage::First => "1st",
            Stage::Second => "2nd",
        }
    }
}

/// Location and scale learned from the buyer series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalerStats {
    pub resource: String,
    pub method: ScalingMethod,
    /// Min (normalize) or mean (standardize).
    pub center: f64,
    /// Range (normalize) or standard deviation (standardize).
    pub scale: f64,
}

impl ScalerStats {
    /// Statistics that leave values untouched.
    pub fn identity(resource: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            method: ScalingMethod::None,
            center: 0.0,
            scale: 1.0,
        }
    }

    /// Learn statistics from buyer rows at or before `end_train`.
    pub fn compute(
        params: &EnsembleParams,
        buyer: &TimeFrame,
        end_train: DateTime<Utc>,
        resource: &str,
    ) -> Result<Self> {
        let method = params.scaling_method();
        if method == ScalingMethod::None {
            return Ok(Self::identity(resource));
        }

        let history = buyer.rows_between(None, Some(end_train));
        let column = history.column(resource).ok_or_else(|| {
            EnsembleError::InvalidParameter(format!("buyer frame has no column '{}'", resource))
        })?;
        let observed: Vec<f64> = column.iter().copied().filter(|v| v.is_finite()).collect();
        if observed.len() < 2 {
            return Err(EnsembleError::InsufficientData {
                needed: 2,
                got: observed.len(),
            });
        }

        let (center, spread) = match method {
            ScalingMethod::Normalize => {
                let min = observed.iter().copied().fold(f64::INFINITY, f64::min);
                let max = observed.iter().copied().fold(f64::NEG_INFINITY, f64::max);
                (min, max - min)
            }
            ScalingMethod::Standardize => (mean(&observed), std_dev(&observed)),
            ScalingMethod::None => (0.0, 1.0),
        };
        let scale = if spread < 1e-10 { 1.0 } else { spread };

        Ok(Self {
            resource: resource.to_string(),
            method,
            center,
            scale,
        })
    }

    /// Forward transform of a single value.
    pub fn transform_value(&self, x: f64) -> f64 {
        (x - self.center) / self.scale
    }

    /// Forward transform of a slice.
    pub fn transform(&self, data: &[f64]) -> Vec<f64> {
        data.iter().map(|&x| self.transform_value(x)).collect()
    }

    /// Map model-space values back to physical units.
    pub fn inverse(&self, data: &[f64], stage: Stage) -> Vec<f64> {
        match stage {
            Stage::First => data.iter().map(|&x| x * self.scale + self.center).collect(),
            Stage::Second => data.iter().map(|&x| x * self.scale).collect(),
        }
    }
}

/// Scale every forecaster frame with the buyer statistics.
///
/// Frames pass through unchanged unless `scale_features` is set and a method
/// is configured.
pub fn scale_forecasters_frames(
    params: &EnsembleParams,
    stats: &ScalerStats,
    frames: &QuantileFrames,
) -> QuantileFrames {
    if !params.scale_features || stats.method == ScalingMethod::None {
        return frames.clone();
    }
    let scale = |frame: &TimeFrame| frame.map_values(|v| stats.transform_value(v));
    QuantileFrames {
        q50: scale(&frames.q50),
        q10: scale(&frames.q10),
        q90: scale(&frames.q90),
    }
}

/// Name of the scaled buyer target column.
pub fn normalized_target_name(resource: &str) -> String {
    format!("norm_{}", resource)
}

/// Scale the buyer target and rename it `norm_<resource>`.
pub fn scale_buyer_frame(
    params: &EnsembleParams,
    stats: &ScalerStats,
    buyer: &TimeFrame,
) -> Result<TimeFrame> {
    let values = buyer.column(&stats.resource).ok_or_else(|| {
        EnsembleError::InvalidParameter(format!("buyer frame has no column '{}'", stats.resource))
    })?;
    let scaled = if params.scale_features {
        stats.transform(values)
    } else {
        values.to_vec()
    };
    TimeFrame::from_column(
        buyer.index().to_vec(),
        normalized_target_name(&stats.resource),
        scaled,
    )
}
