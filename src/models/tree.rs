//! CART regression tree shared by the forest and boosting families.
//!
//! The tree only learns the partition (squared-error splits). What a leaf
//! predicts is decided by the caller from the training rows that fell into it.

use crate::core::Matrix;
use rand::rngs::StdRng;
use rand::seq::index::sample;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Growth limits of a single tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeParams {
    pub max_depth: usize,
    pub min_samples_leaf: usize,
    /// Features examined per split; all when `None`.
    pub max_features: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
enum Node {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf(usize),
}

/// A fitted partition of the feature space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionTree {
    nodes: Vec<Node>,
    n_leaves: usize,
}

struct SplitCandidate {
    feature: usize,
    threshold: f64,
    gain: f64,
}

impl RegressionTree {
    /// Grow a tree on the given training rows (repeats allowed).
    ///
    /// Returns the tree and, for each leaf, the rows that reached it.
    pub fn fit(
        x: &Matrix,
        y: &[f64],
        rows: &[usize],
        params: &TreeParams,
        rng: &mut StdRng,
    ) -> (Self, Vec<Vec<usize>>) {
        let mut tree = RegressionTree {
            nodes: Vec::new(),
            n_leaves: 0,
        };
        let mut leaves = Vec::new();
        tree.grow(x, y, rows.to_vec(), 0, params, rng, &mut leaves);
        (tree, leaves)
    }

    #[allow(clippy::too_many_arguments)]
    fn grow(
        &mut self,
        x: &Matrix,
        y: &[f64],
        rows: Vec<usize>,
        depth: usize,
        params: &TreeParams,
        rng: &mut StdRng,
        leaves: &mut Vec<Vec<usize>>,
    ) -> usize {
        let node_id = self.nodes.len();
        let min_leaf = params.min_samples_leaf.max(1);

        let split = if depth < params.max_depth && rows.len() >= 2 * min_leaf {
            best_split(x, y, &rows, min_leaf, params.max_features, rng)
        } else {
            None
        };

        match split {
            Some(split) => {
                // Reserve the slot, children are pushed after it.
                self.nodes.push(Node::Leaf(usize::MAX));
                let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = rows
                    .into_iter()
                    .partition(|&r| x.get(r, split.feature) <= split.threshold);
                let left = self.grow(x, y, left_rows, depth + 1, params, rng, leaves);
                let right = self.grow(x, y, right_rows, depth + 1, params, rng, leaves);
                self.nodes[node_id] = Node::Split {
                    feature: split.feature,
                    threshold: split.threshold,
                    left,
                    right,
                };
            }
            None => {
                let leaf = self.n_leaves;
                self.n_leaves += 1;
                self.nodes.push(Node::Leaf(leaf));
                leaves.push(rows);
            }
        }
        node_id
    }

    pub fn n_leaves(&self) -> usize {
        self.n_leaves
    }

    /// Leaf reached by a feature row.
    pub fn leaf_index(&self, row: &[f64]) -> usize {
        let mut node = 0;
        loop {
            match &self.nodes[node] {
                Node::Leaf(leaf) => return *leaf,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    node = if row[*feature] <= *threshold {
                        *left
                    } else {
                        *right
                    };
                }
            }
        }
    }
}

/// Largest reduction in squared error over the sampled features.
fn best_split(
    x: &Matrix,
    y: &[f64],
    rows: &[usize],
    min_leaf: usize,
    max_features: Option<usize>,
    rng: &mut StdRng,
) -> Option<SplitCandidate> {
    let p = x.ncols();
    if p == 0 {
        return None;
    }
    let features: Vec<usize> = match max_features {
        Some(m) if m < p => sample(rng, p, m.max(1)).into_vec(),
        _ => (0..p).collect(),
    };

    let n = rows.len() as f64;
    let total: f64 = rows.iter().map(|&r| y[r]).sum();
    let total_sq: f64 = rows.iter().map(|&r| y[r] * y[r]).sum();
    let parent_sse = total_sq - total * total / n;

    let mut best: Option<SplitCandidate> = None;
    let mut order: Vec<usize> = rows.to_vec();

    for feature in features {
        order.sort_by(|&a, &b| {
            x.get(a, feature)
                .partial_cmp(&x.get(b, feature))
                .unwrap_or(Ordering::Equal)
        });

        let mut left_sum = 0.0;
        let mut left_sq = 0.0;
        for i in 0..order.len() - 1 {
            let yi = y[order[i]];
            left_sum += yi;
            left_sq += yi * yi;

            let n_left = i + 1;
            let n_right = order.len() - n_left;
            if n_left < min_leaf || n_right < min_leaf {
                continue;
            }
            let here = x.get(order[i], feature);
            let next = x.get(order[i + 1], feature);
            if next <= here {
                continue;
            }

            let right_sum = total - left_sum;
            let right_sq = total_sq - left_sq;
            let sse = (left_sq - left_sum * left_sum / n_left as f64)
                + (right_sq - right_sum * right_sum / n_right as f64);
            let gain = parent_sse - sse;

            if gain > 1e-12 && best.as_ref().is_none_or(|b| gain > b.gain) {
                best = Some(SplitCandidate {
                    feature,
                    threshold: 0.5 * (here + next),
                    gain,
                });
            }
        }
    }
    best
}
