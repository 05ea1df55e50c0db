//! Data transformations: buyer-derived scaling, window functions and differencing.
//!
//! # Example
//!
//! ```
//! use wind_ensemble::transform::{difference, lag, rolling_mean};
//!
//! let series = vec![1.0, 2.0, 4.0, 7.0, 11.0];
//!
//! let lagged = lag(&series, 1);
//! let rm = rolling_mean(&series, 3);
//! let diffed = difference(&series, 1);
//! assert_eq!(diffed, vec![1.0, 2.0, 3.0, 4.0]);
//! assert_eq!(lagged.len(), rm.len());
//! ```

pub mod diff;
pub mod scale;
pub mod window;

pub use diff::{difference, difference_aligned};
pub use scale::{
    normalized_target_name, scale_buyer_frame, scale_forecasters_frames, ScalerStats, Stage,
};
pub use window::{lag, rolling_mean, rolling_std};
