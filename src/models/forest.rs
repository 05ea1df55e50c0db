//! Quantile regression forest.
//!
//! Trees are grown on bootstrap samples with random feature subsets, exactly
//! like a random forest. Instead of leaf means, every leaf keeps the targets
//! of its training rows; a prediction pools the leaves reached in all trees
//! (each observation weighted by the inverse of its leaf size) and reads the
//! requested quantile off that weighted distribution.

use crate::core::{Matrix, QuantileLevel};
use crate::error::{EnsembleError, Result};
use crate::models::traits::QuantileRegressor;
use crate::models::tree::{RegressionTree, TreeParams};
use crate::utils::stats::weighted_quantile;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForestParams {
    pub n_trees: usize,
    pub max_depth: usize,
    pub min_samples_leaf: usize,
    /// Features tried per split; `sqrt(p)` when `None`.
    pub max_features: Option<usize>,
    pub seed: u64,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            n_trees: 50,
            max_depth: 8,
            min_samples_leaf: 5,
            max_features: None,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuantileForest {
    params: ForestParams,
    trees: Vec<RegressionTree>,
    /// `leaf_targets[tree][leaf]` holds the training targets of that leaf.
    leaf_targets: Vec<Vec<Vec<f64>>>,
    quantile: Option<f64>,
    n_features: usize,
}

impl QuantileForest {
    pub fn new(params: ForestParams) -> Self {
        Self {
            params,
            trees: Vec::new(),
            leaf_targets: Vec::new(),
            quantile: None,
            n_features: 0,
        }
    }

    pub fn params(&self) -> &ForestParams {
        &self.params
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    /// Pooled leaf targets and their weights for one feature row.
    fn weighted_neighbourhood(&self, row: &[f64]) -> (Vec<f64>, Vec<f64>) {
        let mut values = Vec::new();
        let mut weights = Vec::new();
        for (tree, leaves) in self.trees.iter().zip(self.leaf_targets.iter()) {
            let samples = &leaves[tree.leaf_index(row)];
            if samples.is_empty() {
                continue;
            }
            let w = 1.0 / samples.len() as f64;
            values.extend_from_slice(samples);
            weights.extend(std::iter::repeat_n(w, samples.len()));
        }
        (values, weights)
    }
}

impl QuantileRegressor for QuantileForest {
    fn fit(&mut self, x: &Matrix, y: &[f64], quantile: QuantileLevel) -> Result<()> {
        let n = y.len();
        if x.nrows() != n {
            return Err(EnsembleError::DimensionMismatch {
                expected: x.nrows(),
                got: n,
            });
        }
        if n < 2 * self.params.min_samples_leaf.max(1) {
            return Err(EnsembleError::InsufficientData {
                needed: 2 * self.params.min_samples_leaf.max(1),
                got: n,
            });
        }
        if self.params.n_trees == 0 {
            return Err(EnsembleError::InvalidParameter(
                "n_trees must be positive".into(),
            ));
        }

        let p = x.ncols();
        let tree_params = TreeParams {
            max_depth: self.params.max_depth,
            min_samples_leaf: self.params.min_samples_leaf,
            max_features: Some(
                self.params
                    .max_features
                    .unwrap_or_else(|| (p as f64).sqrt().ceil() as usize)
                    .clamp(1, p.max(1)),
            ),
        };

        let mut rng = StdRng::seed_from_u64(self.params.seed);
        let mut trees = Vec::with_capacity(self.params.n_trees);
        let mut leaf_targets = Vec::with_capacity(self.params.n_trees);

        for _ in 0..self.params.n_trees {
            let rows: Vec<usize> = (0..n).map(|_| rng.gen_range(0..n)).collect();
            let (tree, leaves) = RegressionTree::fit(x, y, &rows, &tree_params, &mut rng);
            leaf_targets.push(
                leaves
                    .into_iter()
                    .map(|leaf| leaf.into_iter().map(|r| y[r]).collect())
                    .collect(),
            );
            trees.push(tree);
        }

        self.trees = trees;
        self.leaf_targets = leaf_targets;
        self.quantile = Some(quantile.value());
        self.n_features = p;
        Ok(())
    }

    fn predict(&self, x: &Matrix) -> Result<Vec<f64>> {
        let tau = self.quantile.ok_or(EnsembleError::FitRequired)?;
        if x.ncols() != self.n_features {
            return Err(EnsembleError::DimensionMismatch {
                expected: self.n_features,
                got: x.ncols(),
            });
        }
        Ok((0..x.nrows())
            .map(|i| {
                let (values, weights) = self.weighted_neighbourhood(x.row(i));
                weighted_quantile(&values, &weights, tau)
            })
            .collect())
    }

    fn name(&self) -> &str {
        "QRF"
    }

    fn is_fitted(&self) -> bool {
        self.quantile.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_data(n: usize) -> (Matrix, Vec<f64>) {
        let mut rng = StdRng::seed_from_u64(3);
        let x: Vec<f64> = (0..n).map(|i| (i % 50) as f64).collect();
        let y: Vec<f64> = x.iter().map(|xi| xi + rng.gen_range(0.0..10.0)).collect();
        (Matrix::from_columns(&[x]).unwrap(), y)
    }

    fn small_forest(seed: u64) -> QuantileForest {
        QuantileForest::new(ForestParams {
            n_trees: 20,
            seed,
            ..Default::default()
        })
    }

    #[test]
    fn quantile_predictions_are_ordered() {
        let (x, y) = make_data(500);
        let probe = Matrix::from_columns(&[vec![10.0, 25.0, 40.0]]).unwrap();

        let mut low = small_forest(1);
        let mut high = small_forest(1);
        low.fit(&x, &y, QuantileLevel::new(0.1).unwrap()).unwrap();
        high.fit(&x, &y, QuantileLevel::new(0.9).unwrap()).unwrap();

        let lo = low.predict(&probe).unwrap();
        let hi = high.predict(&probe).unwrap();
        for (l, h) in lo.iter().zip(hi.iter()) {
            assert!(l < h);
        }
        // Conditional median at x = 25 lies in [25, 35].
        let mut median = small_forest(1);
        median.fit(&x, &y, QuantileLevel::MEDIAN).unwrap();
        let m = median.predict(&probe).unwrap()[1];
        assert!(m > 24.0 && m < 36.0, "median {}", m);
    }

    #[test]
    fn same_seed_same_forest() {
        let (x, y) = make_data(200);
        let mut a = small_forest(9);
        let mut b = small_forest(9);
        a.fit(&x, &y, QuantileLevel::MEDIAN).unwrap();
        b.fit(&x, &y, QuantileLevel::MEDIAN).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.n_trees(), 20);
    }

    #[test]
    fn predict_checks_state_and_width() {
        let (x, y) = make_data(100);
        let mut forest = small_forest(1);
        assert_eq!(forest.predict(&x), Err(EnsembleError::FitRequired));
        forest.fit(&x, &y, QuantileLevel::MEDIAN).unwrap();
        let wide = x.hstack(&x).unwrap();
        assert!(forest.predict(&wide).is_err());
    }
}
