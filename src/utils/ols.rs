//! (Weighted) least squares on the normal equations.
//!
//! Used as the inner solver of the iteratively reweighted quantile
//! regressions. The design matrix is augmented with a leading intercept
//! column, so returned parameter vectors are `[intercept, b1, ..., bk]`.
//! A regressor that is an exact linear combination of earlier ones, such as
//! a difference next to its own lag, gets a zero coefficient.

use crate::core::Matrix;
use crate::error::{EnsembleError, Result};
use tracing::trace;

/// Ridge added to the diagonal for numerical stability.
const JITTER: f64 = 1e-8;

/// Build `X'WX` and `X'Wy` for the intercept-augmented design.
pub fn weighted_normal_equations(
    x: &Matrix,
    y: &[f64],
    weights: &[f64],
) -> Result<(Vec<Vec<f64>>, Vec<f64>)> {
    let n = x.nrows();
    if n == 0 {
        return Err(EnsembleError::InsufficientData { needed: 1, got: 0 });
    }
    if y.len() != n {
        return Err(EnsembleError::DimensionMismatch {
            expected: n,
            got: y.len(),
        });
    }
    if weights.len() != n {
        return Err(EnsembleError::DimensionMismatch {
            expected: n,
            got: weights.len(),
        });
    }

    let k = x.ncols();
    let num_params = k + 1;
    let mut xtx = vec![vec![0.0; num_params]; num_params];
    let mut xty = vec![0.0; num_params];

    for obs in 0..n {
        let w = weights[obs];
        if w == 0.0 {
            continue;
        }
        let row = x.row(obs);
        let y_obs = y[obs];

        xtx[0][0] += w;
        xty[0] += w * y_obs;
        for i in 0..k {
            let xi = row[i];
            xtx[0][i + 1] += w * xi;
            xty[i + 1] += w * xi * y_obs;
            for j in 0..=i {
                xtx[i + 1][j + 1] += w * xi * row[j];
            }
        }
    }

    // Fill the symmetric halves.
    for i in 0..num_params {
        for j in (i + 1)..num_params {
            if i == 0 {
                xtx[j][0] = xtx[0][j];
            } else {
                xtx[i][j] = xtx[j][i];
            }
        }
    }

    Ok((xtx, xty))
}

/// Solve weighted least squares with an optional per-parameter diagonal penalty.
///
/// `penalty` must be empty or have one entry per parameter (intercept first).
pub fn weighted_least_squares(
    x: &Matrix,
    y: &[f64],
    weights: &[f64],
    penalty: &[f64],
) -> Result<Vec<f64>> {
    let (mut xtx, xty) = weighted_normal_equations(x, y, weights)?;
    let num_params = xty.len();

    if !penalty.is_empty() && penalty.len() != num_params {
        return Err(EnsembleError::DimensionMismatch {
            expected: num_params,
            got: penalty.len(),
        });
    }

    for i in 0..num_params {
        xtx[i][i] += JITTER + penalty.get(i).copied().unwrap_or(0.0);
    }

    solve_symmetric(&xtx, &xty).ok_or_else(|| {
        EnsembleError::ComputationError(
            "least squares failed: matrix not positive semi-definite".into(),
        )
    })
}

/// Ordinary least squares, `y = b0 + X b`.
pub fn ols_fit(x: &Matrix, y: &[f64]) -> Result<Vec<f64>> {
    weighted_least_squares(x, y, &vec![1.0; y.len()], &[])
}

/// Evaluate `b0 + X b` for each row.
pub fn linear_predict(x: &Matrix, params: &[f64]) -> Result<Vec<f64>> {
    if params.len() != x.ncols() + 1 {
        return Err(EnsembleError::DimensionMismatch {
            expected: x.ncols() + 1,
            got: params.len(),
        });
    }
    Ok((0..x.nrows())
        .map(|i| {
            params[0]
                + x.row(i)
                    .iter()
                    .zip(params[1..].iter())
                    .map(|(a, b)| a * b)
                    .sum::<f64>()
        })
        .collect())
}

/// Relative pivot below which a column is treated as a linear combination
/// of the columns before it.
const DEPENDENCE_TOL: f64 = 1e-9;

/// Cholesky factor of a positive semi-definite matrix.
///
/// Columns whose pivot vanishes relative to their diagonal are flagged as
/// dependent; their row of the factor is zero and their unknown is pinned to
/// zero, which solves the system restricted to the independent columns.
struct Factor {
    lower: Vec<Vec<f64>>,
    dependent: Vec<bool>,
}

impl Factor {
    /// `None` when a diagonal entry is not positive.
    fn new(a: &[Vec<f64>]) -> Option<Self> {
        let dim = a.len();
        let mut lower: Vec<Vec<f64>> = Vec::with_capacity(dim);
        let mut dependent = Vec::with_capacity(dim);

        for (r, a_row) in a.iter().enumerate() {
            let diagonal = a_row[r];
            if diagonal.is_nan() || diagonal <= 0.0 {
                return None;
            }
            let mut row = vec![0.0; dim];
            for c in 0..r {
                if dependent[c] {
                    continue;
                }
                let dot: f64 = (0..c).map(|m| row[m] * lower[c][m]).sum();
                row[c] = (a_row[c] - dot) / lower[c][c];
            }
            // A slightly negative pivot is rounding on a dependent column.
            let pivot = diagonal - row[..r].iter().map(|v| v * v).sum::<f64>();
            if pivot <= DEPENDENCE_TOL * diagonal {
                dependent.push(true);
                lower.push(vec![0.0; dim]);
            } else {
                row[r] = pivot.sqrt();
                dependent.push(false);
                lower.push(row);
            }
        }
        Some(Self { lower, dependent })
    }

    fn rank(&self) -> usize {
        self.dependent.iter().filter(|d| !**d).count()
    }

    /// Solve `L L' x = rhs` by a forward then a backward sweep.
    fn solve(&self, rhs: &[f64]) -> Vec<f64> {
        let dim = rhs.len();
        let lower = &self.lower;

        let mut z = Vec::with_capacity(dim);
        for (r, row) in lower.iter().enumerate() {
            if self.dependent[r] {
                z.push(0.0);
                continue;
            }
            let partial: f64 = row[..r].iter().zip(&z).map(|(l, v)| l * v).sum();
            z.push((rhs[r] - partial) / row[r]);
        }

        let mut solution = vec![0.0; dim];
        for r in (0..dim).rev() {
            if self.dependent[r] {
                continue;
            }
            let partial: f64 = ((r + 1)..dim).map(|m| lower[m][r] * solution[m]).sum();
            solution[r] = (z[r] - partial) / lower[r][r];
        }
        solution
    }
}

/// Solve `A x = b` for symmetric positive semi-definite `A`.
///
/// Unknowns of linearly dependent columns are set to zero.
pub fn solve_symmetric(a: &[Vec<f64>], b: &[f64]) -> Option<Vec<f64>> {
    let n = b.len();
    if n == 0 || a.len() != n {
        return None;
    }
    let factor = Factor::new(a)?;
    if factor.rank() < n {
        trace!(rank = factor.rank(), columns = n, "dropping dependent columns");
    }
    Some(factor.solve(b))
}

/// Inverse of a symmetric positive semi-definite matrix.
///
/// Rows and columns of linearly dependent columns are NaN: the rest is the
/// inverse of the matrix restricted to the independent columns.
pub fn invert_symmetric(a: &[Vec<f64>]) -> Option<Vec<Vec<f64>>> {
    let n = a.len();
    if n == 0 {
        return None;
    }
    let factor = Factor::new(a)?;
    let mut inverse = vec![vec![f64::NAN; n]; n];
    for col in (0..n).filter(|c| !factor.dependent[*c]) {
        let mut e = vec![0.0; n];
        e[col] = 1.0;
        let x = factor.solve(&e);
        for row in (0..n).filter(|r| !factor.dependent[*r]) {
            inverse[row][col] = x[row];
        }
    }
    Some(inverse)
}
