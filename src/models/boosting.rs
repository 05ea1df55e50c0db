//! Gradient boosting with the pinball loss.

use crate::core::{Matrix, QuantileLevel};
use crate::error::{EnsembleError, Result};
use crate::models::traits::QuantileRegressor;
use crate::models::tree::{RegressionTree, TreeParams};
use crate::utils::stats::quantile;
use rand::rngs::StdRng;
use rand::seq::index::sample;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoostingParams {
    pub n_estimators: usize,
    pub learning_rate: f64,
    pub max_depth: usize,
    pub min_samples_leaf: usize,
    /// Fraction of rows drawn (without replacement) for each stage.
    pub subsample: f64,
    pub seed: u64,
}

impl Default for BoostingParams {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            learning_rate: 0.1,
            max_depth: 3,
            min_samples_leaf: 10,
            subsample: 1.0,
            seed: 42,
        }
    }
}

/// Additive model `F(x) = init + lr * sum_m tree_m(x)`.
///
/// Each tree is grown on the negative pinball gradient (`tau` above the
/// current fit, `tau - 1` below) and its leaves are then set to the
/// `tau`-quantile of the residuals they contain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradientBoosting {
    params: BoostingParams,
    init: Option<f64>,
    trees: Vec<RegressionTree>,
    leaf_values: Vec<Vec<f64>>,
    n_features: usize,
}

impl GradientBoosting {
    pub fn new(params: BoostingParams) -> Self {
        Self {
            params,
            init: None,
            trees: Vec::new(),
            leaf_values: Vec::new(),
            n_features: 0,
        }
    }

    pub fn params(&self) -> &BoostingParams {
        &self.params
    }

    pub fn n_stages(&self) -> usize {
        self.trees.len()
    }

    fn stage_value(&self, stage: usize, row: &[f64]) -> f64 {
        self.leaf_values[stage][self.trees[stage].leaf_index(row)]
    }

    fn validate(&self) -> Result<()> {
        let p = &self.params;
        if p.n_estimators == 0 {
            return Err(EnsembleError::InvalidParameter(
                "n_estimators must be positive".into(),
            ));
        }
        if !(p.learning_rate > 0.0 && p.learning_rate <= 1.0) {
            return Err(EnsembleError::InvalidParameter(
                "learning_rate must be in (0, 1]".into(),
            ));
        }
        if !(p.subsample > 0.0 && p.subsample <= 1.0) {
            return Err(EnsembleError::InvalidParameter(
                "subsample must be in (0, 1]".into(),
            ));
        }
        Ok(())
    }
}

impl QuantileRegressor for GradientBoosting {
    fn fit(&mut self, x: &Matrix, y: &[f64], quantile_level: QuantileLevel) -> Result<()> {
        self.validate()?;
        let n = y.len();
        if x.nrows() != n {
            return Err(EnsembleError::DimensionMismatch {
                expected: x.nrows(),
                got: n,
            });
        }
        let min_leaf = self.params.min_samples_leaf.max(1);
        if n < 2 * min_leaf {
            return Err(EnsembleError::InsufficientData {
                needed: 2 * min_leaf,
                got: n,
            });
        }

        let tau = quantile_level.value();
        let tree_params = TreeParams {
            max_depth: self.params.max_depth,
            min_samples_leaf: min_leaf,
            max_features: None,
        };
        let sample_size = ((n as f64 * self.params.subsample).round() as usize).clamp(2 * min_leaf, n);
        let mut rng = StdRng::seed_from_u64(self.params.seed);

        let init = quantile(y, tau);
        let mut fitted = vec![init; n];
        let mut trees = Vec::with_capacity(self.params.n_estimators);
        let mut leaf_values = Vec::with_capacity(self.params.n_estimators);

        for _ in 0..self.params.n_estimators {
            let residuals: Vec<f64> = y.iter().zip(fitted.iter()).map(|(a, f)| a - f).collect();
            let gradient: Vec<f64> = residuals
                .iter()
                .map(|&r| if r > 0.0 { tau } else { tau - 1.0 })
                .collect();

            let rows: Vec<usize> = if sample_size < n {
                sample(&mut rng, n, sample_size).into_vec()
            } else {
                (0..n).collect()
            };

            let (tree, leaves) = RegressionTree::fit(x, &gradient, &rows, &tree_params, &mut rng);
            let values: Vec<f64> = leaves
                .iter()
                .map(|leaf| {
                    let leaf_residuals: Vec<f64> = leaf.iter().map(|&r| residuals[r]).collect();
                    let v = quantile(&leaf_residuals, tau);
                    if v.is_finite() {
                        v
                    } else {
                        0.0
                    }
                })
                .collect();

            for (i, f) in fitted.iter_mut().enumerate() {
                *f += self.params.learning_rate * values[tree.leaf_index(x.row(i))];
            }
            trees.push(tree);
            leaf_values.push(values);
        }

        self.init = Some(init);
        self.trees = trees;
        self.leaf_values = leaf_values;
        self.n_features = x.ncols();
        Ok(())
    }

    fn predict(&self, x: &Matrix) -> Result<Vec<f64>> {
        let init = self.init.ok_or(EnsembleError::FitRequired)?;
        if x.ncols() != self.n_features {
            return Err(EnsembleError::DimensionMismatch {
                expected: self.n_features,
                got: x.ncols(),
            });
        }
        Ok((0..x.nrows())
            .map(|i| {
                let row = x.row(i);
                init + self.params.learning_rate
                    * (0..self.trees.len())
                        .map(|m| self.stage_value(m, row))
                        .sum::<f64>()
            })
            .collect())
    }

    fn name(&self) -> &str {
        "GBR"
    }

    fn is_fitted(&self) -> bool {
        self.init.is_some()
    }
}
