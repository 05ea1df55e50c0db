//! Quantile levels and quantile-keyed collections.

use crate::error::{EnsembleError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

const LEVEL_TOLERANCE: f64 = 1e-9;

/// A probability level in the open interval (0, 1).
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct QuantileLevel(f64);

impl QuantileLevel {
    /// The median, which triggers the second stage.
    pub const MEDIAN: QuantileLevel = QuantileLevel(0.5);

    pub fn new(level: f64) -> Result<Self> {
        if !(level > 0.0 && level < 1.0) {
            return Err(EnsembleError::InvalidParameter(format!(
                "quantile level must be in (0, 1), got {}",
                level
            )));
        }
        Ok(Self(level))
    }

    pub fn value(&self) -> f64 {
        self.0
    }

    pub fn is_median(&self) -> bool {
        self.matches(Self::MEDIAN)
    }

    /// Equality up to float noise.
    pub fn matches(&self, other: QuantileLevel) -> bool {
        (self.0 - other.0).abs() < LEVEL_TOLERANCE
    }

    /// Column label, e.g. `q0.1`.
    pub fn label(&self) -> String {
        format!("q{}", self.0)
    }
}

impl fmt::Display for QuantileLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Ordered collection keyed by quantile level.
///
/// Entries keep their insertion order, so iterating a map filled while
/// looping over the configured quantiles reproduces that order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuantileMap<T> {
    entries: Vec<(QuantileLevel, T)>,
}

impl<T> Default for QuantileMap<T> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<T> QuantileMap<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the value for `level`; returns the previous value.
    pub fn insert(&mut self, level: QuantileLevel, value: T) -> Option<T> {
        match self.entries.iter_mut().find(|(q, _)| q.matches(level)) {
            Some((_, slot)) => Some(std::mem::replace(slot, value)),
            None => {
                self.entries.push((level, value));
                None
            }
        }
    }

    /// Append a value for a level that must not be present yet.
    pub fn push(&mut self, level: QuantileLevel, value: T) -> Result<()> {
        if self.contains(level) {
            return Err(EnsembleError::InvalidParameter(format!(
                "duplicate result for quantile {}",
                level
            )));
        }
        self.entries.push((level, value));
        Ok(())
    }

    pub fn get(&self, level: QuantileLevel) -> Option<&T> {
        self.entries
            .iter()
            .find(|(q, _)| q.matches(level))
            .map(|(_, v)| v)
    }

    pub fn contains(&self, level: QuantileLevel) -> bool {
        self.get(level).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (QuantileLevel, &T)> {
        self.entries.iter().map(|(q, v)| (*q, v))
    }

    pub fn levels(&self) -> impl Iterator<Item = QuantileLevel> + '_ {
        self.entries.iter().map(|(q, _)| *q)
    }

    /// Transform every value, keeping keys and order.
    pub fn map_values<U, F>(&self, mut f: F) -> QuantileMap<U>
    where
        F: FnMut(QuantileLevel, &T) -> U,
    {
        QuantileMap {
            entries: self.entries.iter().map(|(q, v)| (*q, f(*q, v))).collect(),
        }
    }
}
