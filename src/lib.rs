//! # wind-ensemble
//!
//! Two-stage quantile ensemble for wind power forecasts.
//!
//! The first stage combines the quantile forecasts of several upstream
//! forecasters into one calibrated forecast per quantile level. The second
//! stage uses the median first-stage forecast to predict the short-term
//! variability (ramp) of the same resource. Best model configurations are
//! carried between runs in a per-resource state file.
//!
//! The entry point is [`engine::create_ensemble_forecasts`].

// Allow some clippy warnings for cleaner code in specific cases
#![allow(clippy::upper_case_acronyms)]
#![allow(clippy::too_many_arguments)]
#![allow(clippy::type_complexity)]
#![allow(clippy::needless_range_loop)]

pub mod config;
pub mod core;
pub mod engine;
pub mod ensemble;
pub mod error;
pub mod features;
pub mod logging;
pub mod models;
pub mod preprocess;
pub mod session;
pub mod transform;
pub mod utils;

pub use error::{EnsembleError, Result};

pub mod prelude {
    pub use crate::config::{ChallengeUsecase, EnsembleParams, ModelType, Scoring};
    pub use crate::core::{Matrix, QuantileLevel, QuantileMap, TimeFrame, HORIZON_LEN};
    pub use crate::engine::{create_ensemble_forecasts, EngineOutput, ForecastRequest};
    pub use crate::ensemble::{EnsembleTable, MeltedTable, ResultBundle};
    pub use crate::error::{EnsembleError, Result};
    pub use crate::models::{FittedModel, ModelParams, QuantileRegressor};
}
