//! Rescaling of stage outputs and assembly of the result bundle.

use crate::core::{QuantileLevel, QuantileMap};
use crate::ensemble::selection::BestResults;
use crate::ensemble::trainer::ForecastContribution;
use crate::ensemble::variability::VariabilityContribution;
use crate::error::{EnsembleError, Result};
use crate::transform::{ScalerStats, Stage};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const TARGETS_COLUMN: &str = "targets";

/// Map scaled stage outputs back to physical units and clip negatives to zero.
///
/// A NaN prediction is a model fault and is reported rather than clipped.
pub fn rescale_predictions(values: &[f64], stats: &ScalerStats, stage: Stage) -> Result<Vec<f64>> {
    let restored = stats.inverse(values, stage);
    let missing = restored.iter().filter(|v| v.is_nan()).count();
    if missing > 0 {
        return Err(EnsembleError::MissingValues {
            context: format!("{} stage predictions", stage.label()),
            count: missing,
        });
    }
    Ok(restored.into_iter().map(|v| v.max(0.0)).collect())
}

/// Wide table: one column per quantile plus optional realized targets.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EnsembleTable {
    index: Vec<DateTime<Utc>>,
    quantiles: Vec<QuantileLevel>,
    values: Vec<Vec<f64>>,
    targets: Option<Vec<f64>>,
}

impl EnsembleTable {
    pub fn new(index: Vec<DateTime<Utc>>) -> Self {
        Self {
            index,
            ..Default::default()
        }
    }

    pub fn push_quantile(&mut self, quantile: QuantileLevel, values: Vec<f64>) -> Result<()> {
        if values.len() != self.index.len() {
            return Err(EnsembleError::DimensionMismatch {
                expected: self.index.len(),
                got: values.len(),
            });
        }
        if self.quantiles.iter().any(|q| q.matches(quantile)) {
            return Err(EnsembleError::InvalidParameter(format!(
                "duplicate quantile column {}",
                quantile.label()
            )));
        }
        self.quantiles.push(quantile);
        self.values.push(values);
        Ok(())
    }

    pub fn with_targets(mut self, targets: Vec<f64>) -> Result<Self> {
        if targets.len() != self.index.len() {
            return Err(EnsembleError::DimensionMismatch {
                expected: self.index.len(),
                got: targets.len(),
            });
        }
        self.targets = Some(targets);
        Ok(self)
    }

    pub fn index(&self) -> &[DateTime<Utc>] {
        &self.index
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn quantiles(&self) -> &[QuantileLevel] {
        &self.quantiles
    }

    pub fn targets(&self) -> Option<&[f64]> {
        self.targets.as_deref()
    }

    /// Column by label (`q0.5`, `targets`).
    pub fn column(&self, label: &str) -> Option<&[f64]> {
        if label == TARGETS_COLUMN {
            return self.targets();
        }
        self.quantiles
            .iter()
            .position(|q| q.label() == label)
            .map(|i| self.values[i].as_slice())
    }

    pub fn column_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.quantiles.iter().map(QuantileLevel::label).collect();
        if self.targets.is_some() {
            names.push(TARGETS_COLUMN.to_string());
        }
        names
    }

    /// Long format, one row per quantile and timestamp; targets are not melted.
    pub fn melt(&self) -> MeltedTable {
        let rows = self
            .quantiles
            .iter()
            .zip(self.values.iter())
            .flat_map(|(q, values)| {
                let label = q.label();
                self.index
                    .iter()
                    .zip(values.iter())
                    .map(move |(&timestamp, &value)| MeltedRow {
                        timestamp,
                        quantile: label.clone(),
                        value,
                    })
            })
            .collect();
        MeltedTable { rows }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeltedRow {
    pub timestamp: DateTime<Utc>,
    pub quantile: String,
    pub value: f64,
}

/// Long-format predictions, ordered by quantile then timestamp.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MeltedTable {
    pub rows: Vec<MeltedRow>,
}

impl MeltedTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn quantile_rows<'a>(&'a self, label: &'a str) -> impl Iterator<Item = &'a MeltedRow> + 'a {
        self.rows.iter().filter(move |r| r.quantile == label)
    }
}

/// Variability predictions on the second-stage train and test windows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RampTable {
    pub insample: EnsembleTable,
    pub outsample: EnsembleTable,
}

/// Predictions of one target as stored in the bundle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StoredPredictions {
    Wide(EnsembleTable),
    Melted(MeltedTable),
}

impl StoredPredictions {
    pub fn melted(&self) -> MeltedTable {
        match self {
            StoredPredictions::Wide(table) => table.melt(),
            StoredPredictions::Melted(table) => table.clone(),
        }
    }

    pub fn wide(&self) -> Option<&EnsembleTable> {
        match self {
            StoredPredictions::Wide(table) => Some(table),
            StoredPredictions::Melted(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetRecord<C> {
    pub predictions: StoredPredictions,
    pub info_contributions: QuantileMap<C>,
    pub best_results: BestResults,
}

/// Everything a run produces; also the persisted state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultBundle {
    /// Launch time of the run.
    pub previous_lt: DateTime<Utc>,
    pub iteration: u64,
    pub wind_power: TargetRecord<ForecastContribution>,
    pub wind_power_variability: TargetRecord<VariabilityContribution>,
    /// Present in simulation mode only.
    pub wind_power_ramp: Option<RampTable>,
}
