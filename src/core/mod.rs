//! Core data structures for the ensemble pipeline.

mod frame;
mod matrix;
mod quantile;

pub use frame::TimeFrame;
pub use matrix::Matrix;
pub use quantile::{QuantileLevel, QuantileMap};

/// Number of 15-minute steps in one forecast day.
pub const HORIZON_LEN: usize = 96;
