//! Time-indexed, column-major frame used for forecaster and buyer data.

use crate::core::Matrix;
use crate::error::{EnsembleError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A table of named `f64` columns sharing a strictly increasing timestamp index.
///
/// Missing observations are stored as `NaN`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TimeFrame {
    index: Vec<DateTime<Utc>>,
    columns: Vec<String>,
    /// Values stored in column-major format: values[column][row]
    values: Vec<Vec<f64>>,
}

impl TimeFrame {
    /// Create a new frame, validating index order and column lengths.
    pub fn new(
        index: Vec<DateTime<Utc>>,
        columns: Vec<String>,
        values: Vec<Vec<f64>>,
    ) -> Result<Self> {
        for i in 1..index.len() {
            if index[i] <= index[i - 1] {
                return Err(EnsembleError::TimestampError(
                    "timestamps must be strictly increasing".to_string(),
                ));
            }
        }

        if columns.len() != values.len() {
            return Err(EnsembleError::DimensionMismatch {
                expected: columns.len(),
                got: values.len(),
            });
        }

        for column in &values {
            if column.len() != index.len() {
                return Err(EnsembleError::DimensionMismatch {
                    expected: index.len(),
                    got: column.len(),
                });
            }
        }

        for (i, name) in columns.iter().enumerate() {
            if columns[..i].contains(name) {
                return Err(EnsembleError::InvalidParameter(format!(
                    "duplicate column '{}'",
                    name
                )));
            }
        }

        Ok(Self {
            index,
            columns,
            values,
        })
    }

    /// Create an empty frame (no rows, no columns).
    pub fn empty() -> Self {
        Self::default()
    }

    /// Create a frame holding a single column.
    pub fn from_column(
        index: Vec<DateTime<Utc>>,
        name: impl Into<String>,
        values: Vec<f64>,
    ) -> Result<Self> {
        Self::new(index, vec![name.into()], vec![values])
    }

    /// Create a frame with an index and no columns yet.
    pub fn with_index(index: Vec<DateTime<Utc>>) -> Result<Self> {
        Self::new(index, Vec::new(), Vec::new())
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// A frame is empty when it has no rows or no columns.
    pub fn is_empty(&self) -> bool {
        self.index.is_empty() || self.columns.is_empty()
    }

    /// Number of columns.
    pub fn n_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn index(&self) -> &[DateTime<Utc>] {
        &self.index
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Get a column by name.
    pub fn column(&self, name: &str) -> Option<&[f64]> {
        self.columns
            .iter()
            .position(|c| c == name)
            .map(|i| self.values[i].as_slice())
    }

    /// All values organized by column.
    pub fn values_by_column(&self) -> &[Vec<f64>] {
        &self.values
    }

    /// Append a column.
    pub fn push_column(&mut self, name: impl Into<String>, values: Vec<f64>) -> Result<()> {
        let name = name.into();
        if values.len() != self.index.len() {
            return Err(EnsembleError::DimensionMismatch {
                expected: self.index.len(),
                got: values.len(),
            });
        }
        if self.columns.contains(&name) {
            return Err(EnsembleError::InvalidParameter(format!(
                "duplicate column '{}'",
                name
            )));
        }
        self.columns.push(name);
        self.values.push(values);
        Ok(())
    }

    /// Rename a column in place.
    pub fn rename_column(&mut self, from: &str, to: impl Into<String>) -> Result<()> {
        let to = to.into();
        let position = self.columns.iter().position(|c| c == from).ok_or_else(|| {
            EnsembleError::InvalidParameter(format!("unknown column '{}'", from))
        })?;
        if self.columns.iter().any(|c| c == &to) && self.columns[position] != to {
            return Err(EnsembleError::InvalidParameter(format!(
                "duplicate column '{}'",
                to
            )));
        }
        self.columns[position] = to;
        Ok(())
    }

    /// Keep only the columns whose name satisfies `keep`, preserving order and index.
    pub fn select_columns<F>(&self, keep: F) -> TimeFrame
    where
        F: Fn(&str) -> bool,
    {
        let (columns, values): (Vec<String>, Vec<Vec<f64>>) = self
            .columns
            .iter()
            .zip(self.values.iter())
            .filter(|(name, _)| keep(name))
            .map(|(name, v)| (name.clone(), v.clone()))
            .unzip();

        TimeFrame {
            index: self.index.clone(),
            columns,
            values,
        }
    }

    /// Remove the named column, returning its values.
    pub fn take_column(&mut self, name: &str) -> Option<Vec<f64>> {
        let position = self.columns.iter().position(|c| c == name)?;
        self.columns.remove(position);
        Some(self.values.remove(position))
    }

    /// Extract rows `[start, end)`.
    pub fn slice(&self, start: usize, end: usize) -> Result<TimeFrame> {
        if start > end {
            return Err(EnsembleError::InvalidParameter(
                "start must be <= end".to_string(),
            ));
        }
        if end > self.len() {
            return Err(EnsembleError::DimensionMismatch {
                expected: self.len(),
                got: end,
            });
        }

        Ok(TimeFrame {
            index: self.index[start..end].to_vec(),
            columns: self.columns.clone(),
            values: self
                .values
                .iter()
                .map(|col| col[start..end].to_vec())
                .collect(),
        })
    }

    /// Rows with `start <= timestamp <= end`; either bound may be open.
    pub fn rows_between(
        &self,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> TimeFrame {
        let from = match start {
            Some(s) => self.index.partition_point(|t| *t < s),
            None => 0,
        };
        let to = match end {
            Some(e) => self.index.partition_point(|t| *t <= e),
            None => self.len(),
        };
        let to = to.max(from);

        TimeFrame {
            index: self.index[from..to].to_vec(),
            columns: self.columns.clone(),
            values: self.values.iter().map(|col| col[from..to].to_vec()).collect(),
        }
    }

    /// Drop the first `n` rows.
    pub fn skip_rows(&self, n: usize) -> TimeFrame {
        let n = n.min(self.len());
        TimeFrame {
            index: self.index[n..].to_vec(),
            columns: self.columns.clone(),
            values: self.values.iter().map(|col| col[n..].to_vec()).collect(),
        }
    }

    /// Total number of NaN/Inf cells.
    pub fn count_missing(&self) -> usize {
        self.values
            .iter()
            .map(|col| col.iter().filter(|v| !v.is_finite()).count())
            .sum()
    }

    /// Check if the frame has missing values (NaN or Inf).
    pub fn has_missing_values(&self) -> bool {
        self.values
            .iter()
            .any(|col| col.iter().any(|v| !v.is_finite()))
    }

    /// Column-wise concatenation of two frames with identical indexes.
    pub fn join_columns(&self, other: &TimeFrame) -> Result<TimeFrame> {
        if self.index != other.index {
            return Err(EnsembleError::IndexMismatch {
                context: "column join".to_string(),
                left: self.len(),
                right: other.len(),
            });
        }
        let mut joined = self.clone();
        for (name, values) in other.columns.iter().zip(other.values.iter()) {
            joined.push_column(name.clone(), values.clone())?;
        }
        Ok(joined)
    }

    /// Row-wise concatenation; `other` must have the same columns and start after `self` ends.
    pub fn append_rows(&self, other: &TimeFrame) -> Result<TimeFrame> {
        if self.columns != other.columns {
            return Err(EnsembleError::DimensionMismatch {
                expected: self.n_columns(),
                got: other.n_columns(),
            });
        }
        if let (Some(last), Some(first)) = (self.index.last(), other.index.first()) {
            if first <= last {
                return Err(EnsembleError::TimestampError(
                    "appended rows must start after the last timestamp".to_string(),
                ));
            }
        }

        let mut index = self.index.clone();
        index.extend_from_slice(&other.index);
        let values = self
            .values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| {
                let mut col = a.clone();
                col.extend_from_slice(b);
                col
            })
            .collect();

        Ok(TimeFrame {
            index,
            columns: self.columns.clone(),
            values,
        })
    }

    /// Apply `f` to every cell.
    pub fn map_values<F>(&self, f: F) -> TimeFrame
    where
        F: Fn(f64) -> f64,
    {
        TimeFrame {
            index: self.index.clone(),
            columns: self.columns.clone(),
            values: self
                .values
                .iter()
                .map(|col| col.iter().map(|&v| f(v)).collect())
                .collect(),
        }
    }

    /// Row-major matrix of all columns.
    pub fn to_matrix(&self) -> Matrix {
        let rows = self.len();
        let cols = self.n_columns();
        let mut data = Vec::with_capacity(rows * cols);
        for r in 0..rows {
            for col in &self.values {
                data.push(col[r]);
            }
        }
        Matrix::from_parts(rows, cols, data)
    }
}
