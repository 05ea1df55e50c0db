//! Dense row-major matrix used as model input.

use crate::error::{EnsembleError, Result};
use serde::{Deserialize, Serialize};

/// Row-major `f64` matrix.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Matrix {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}

impl Matrix {
    /// Create a matrix from row-major data.
    pub fn new(rows: usize, cols: usize, data: Vec<f64>) -> Result<Self> {
        if data.len() != rows * cols {
            return Err(EnsembleError::DimensionMismatch {
                expected: rows * cols,
                got: data.len(),
            });
        }
        Ok(Self { rows, cols, data })
    }

    pub(crate) fn from_parts(rows: usize, cols: usize, data: Vec<f64>) -> Self {
        debug_assert_eq!(data.len(), rows * cols);
        Self { rows, cols, data }
    }

    /// Build a matrix from rows of equal length.
    pub fn from_rows(rows: &[Vec<f64>]) -> Result<Self> {
        let cols = rows.first().map(|r| r.len()).unwrap_or(0);
        let mut data = Vec::with_capacity(rows.len() * cols);
        for row in rows {
            if row.len() != cols {
                return Err(EnsembleError::DimensionMismatch {
                    expected: cols,
                    got: row.len(),
                });
            }
            data.extend_from_slice(row);
        }
        Ok(Self {
            rows: rows.len(),
            cols,
            data,
        })
    }

    /// Build a matrix from equally long columns.
    pub fn from_columns(columns: &[Vec<f64>]) -> Result<Self> {
        let rows = columns.first().map(|c| c.len()).unwrap_or(0);
        for col in columns {
            if col.len() != rows {
                return Err(EnsembleError::DimensionMismatch {
                    expected: rows,
                    got: col.len(),
                });
            }
        }
        let cols = columns.len();
        let mut data = Vec::with_capacity(rows * cols);
        for r in 0..rows {
            for col in columns {
                data.push(col[r]);
            }
        }
        Ok(Self { rows, cols, data })
    }

    pub fn nrows(&self) -> usize {
        self.rows
    }

    pub fn ncols(&self) -> usize {
        self.cols
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0 || self.cols == 0
    }

    pub fn row(&self, i: usize) -> &[f64] {
        &self.data[i * self.cols..(i + 1) * self.cols]
    }

    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.data[i * self.cols + j]
    }

    /// Copy of column `j`.
    pub fn column(&self, j: usize) -> Vec<f64> {
        (0..self.rows).map(|i| self.get(i, j)).collect()
    }

    /// Horizontal concatenation; both matrices must have the same row count.
    pub fn hstack(&self, other: &Matrix) -> Result<Matrix> {
        if other.cols == 0 {
            return Ok(self.clone());
        }
        if self.rows != other.rows {
            return Err(EnsembleError::DimensionMismatch {
                expected: self.rows,
                got: other.rows,
            });
        }
        let cols = self.cols + other.cols;
        let mut data = Vec::with_capacity(self.rows * cols);
        for i in 0..self.rows {
            data.extend_from_slice(self.row(i));
            data.extend_from_slice(other.row(i));
        }
        Ok(Matrix {
            rows: self.rows,
            cols,
            data,
        })
    }

    /// Rows `[start, end)`.
    pub fn slice_rows(&self, start: usize, end: usize) -> Matrix {
        let end = end.min(self.rows);
        let start = start.min(end);
        Matrix {
            rows: end - start,
            cols: self.cols,
            data: self.data[start * self.cols..end * self.cols].to_vec(),
        }
    }

    /// Gather rows by position (repeats allowed).
    pub fn select_rows(&self, positions: &[usize]) -> Matrix {
        let mut data = Vec::with_capacity(positions.len() * self.cols);
        for &p in positions {
            data.extend_from_slice(self.row(p));
        }
        Matrix {
            rows: positions.len(),
            cols: self.cols,
            data,
        }
    }

    /// Number of NaN/Inf cells.
    pub fn count_missing(&self) -> usize {
        self.data.iter().filter(|v| !v.is_finite()).count()
    }
}
