//! Hyperparameter selection and carry-over of the best model between runs.

use crate::config::{EnsembleParams, ModelType};
use crate::core::{Matrix, QuantileLevel, QuantileMap, HORIZON_LEN};
use crate::error::{EnsembleError, Result};
use crate::models::{FittedModel, ModelParams};
use crate::utils::metrics::score;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Best configuration found for one quantile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BestEntry {
    pub params: ModelParams,
    /// Hold-out score of `params` when it was selected (lower is better).
    pub score: f64,
    pub model_type: ModelType,
    /// Run iteration at which the entry was selected.
    pub iteration: u64,
}

/// Best configuration per quantile for one stage.
pub type BestResults = QuantileMap<BestEntry>;

/// A model refitted on the full training set plus its updated best entry.
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    pub model: FittedModel,
    pub best: BestEntry,
    /// Whether a full search ran (as opposed to refitting the prior best).
    pub searched: bool,
    pub candidates: usize,
}

/// Whether the candidate grid must be searched at this iteration.
pub fn needs_search(
    model_type: ModelType,
    prior: Option<&BestEntry>,
    iteration: u64,
    reselect_every: u64,
) -> bool {
    match prior {
        None => true,
        Some(entry) if entry.model_type != model_type => true,
        Some(_) => iteration % reselect_every.max(1) == 0,
    }
}

/// Number of leading training rows used to fit candidates; the rest is the hold-out.
pub fn holdout_start(n_rows: usize, validation_days: usize) -> Result<usize> {
    if n_rows < 4 {
        return Err(EnsembleError::InsufficientData {
            needed: 4,
            got: n_rows,
        });
    }
    let configured = validation_days * HORIZON_LEN;
    let holdout = if configured > 0 && 2 * configured <= n_rows {
        configured
    } else {
        (n_rows / 5).max(1)
    };
    Ok(n_rows - holdout)
}

/// Pick hyperparameters for `quantile` and refit the winner on all rows.
pub fn select_and_fit(
    params: &EnsembleParams,
    x: &Matrix,
    y: &[f64],
    quantile: QuantileLevel,
    prior: Option<&BestEntry>,
    iteration: u64,
) -> Result<Selection> {
    if x.nrows() != y.len() {
        return Err(EnsembleError::DimensionMismatch {
            expected: x.nrows(),
            got: y.len(),
        });
    }
    let model_type = params.model_type;

    if !needs_search(model_type, prior, iteration, params.reselect_every) {
        if let Some(entry) = prior {
            debug!(quantile = quantile.value(), "refitting prior best parameters");
            let model = entry.params.fit(x, y, quantile)?;
            return Ok(Selection {
                model,
                best: entry.clone(),
                searched: false,
                candidates: 1,
            });
        }
    }

    let mut candidates = Vec::new();
    if let Some(entry) = prior.filter(|e| e.model_type == model_type) {
        candidates.push(entry.params.clone());
    }
    for candidate in ModelParams::candidate_grid(model_type, params.seed) {
        if !candidates.contains(&candidate) {
            candidates.push(candidate);
        }
    }

    let split = holdout_start(y.len(), params.validation_days)?;
    let x_fit = x.slice_rows(0, split);
    let x_val = x.slice_rows(split, x.nrows());
    let (y_fit, y_val) = y.split_at(split);

    let mut best: Option<(usize, f64)> = None;
    for (i, candidate) in candidates.iter().enumerate() {
        let model = candidate.fit(&x_fit, y_fit, quantile)?;
        let predictions = model.predict(&x_val)?;
        let value = score(params.scoring, y_val, &predictions, quantile)?;
        debug!(quantile = quantile.value(), candidate = i, score = value, "scored candidate");
        if best.is_none_or(|(_, s)| value < s) {
            best = Some((i, value));
        }
    }

    let (winner, best_score) = best.ok_or_else(|| EnsembleError::ModelFit {
        quantile: quantile.value(),
        reason: "no candidate parameters".to_string(),
    })?;
    let chosen = candidates[winner].clone();
    let model = chosen.fit(x, y, quantile)?;

    info!(
        quantile = quantile.value(),
        model_type = model_type.as_str(),
        candidates = candidates.len(),
        score = best_score,
        "selected hyperparameters"
    );

    Ok(Selection {
        model,
        best: BestEntry {
            params: chosen,
            score: best_score,
            model_type,
            iteration,
        },
        searched: true,
        candidates: candidates.len(),
    })
}
