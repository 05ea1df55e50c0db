//! Error types for the wind-ensemble pipeline.

use thiserror::Error;

/// Result type alias for ensemble operations.
pub type Result<T> = std::result::Result<T, EnsembleError>;

/// Errors that can occur while building, training or persisting an ensemble run.
///
/// Every variant is fatal for the run: the pipeline never retries and never
/// persists a partial result.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EnsembleError {
    /// Contradictory or unsupported configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// The mandatory quantile columns were not found in the market frame.
    #[error("quantile columns '{0}' were not found in the market frame")]
    MissingRequiredQuantile(String),

    /// Feature and target frames do not share the same timestamp index.
    #[error("index mismatch in {context}: {left} rows vs {right} rows")]
    IndexMismatch {
        context: String,
        left: usize,
        right: usize,
    },

    /// The test partition does not cover exactly one forecast horizon.
    #[error("test partition of {stage} stage must have {expected} rows, got {got}")]
    HorizonLength {
        stage: String,
        expected: usize,
        got: usize,
    },

    /// Missing values detected where none are allowed.
    #[error("{count} missing values detected in {context}")]
    MissingValues { context: String, count: usize },

    /// Input data is empty.
    #[error("empty input data")]
    EmptyData,

    /// Insufficient data points for the operation.
    #[error("insufficient data: need at least {needed}, got {got}")]
    InsufficientData { needed: usize, got: usize },

    /// Dimension mismatch between data structures.
    #[error("dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    /// Timestamp-related error.
    #[error("timestamp error: {0}")]
    TimestampError(String),

    /// Invalid parameter value.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// A model could not be fitted for a quantile level.
    #[error("model fit failed for quantile {quantile}: {reason}")]
    ModelFit { quantile: f64, reason: String },

    /// Model was used before being fitted.
    #[error("model must be fitted before prediction")]
    FitRequired,

    /// Computation error (e.g., numerical issues).
    #[error("computation error: {0}")]
    ComputationError(String),

    /// The state file could not be read or written.
    #[error("state file I/O error at {path}: {reason}")]
    StateIo { path: String, reason: String },

    /// The state file exists but cannot be decoded.
    #[error("state file {path} is unreadable: {reason}")]
    StateCorrupt { path: String, reason: String },
}
