//! Feature engineering for the ensemble regressors.
//!
//! # Example
//!
//! ```
//! use chrono::{Duration, TimeZone, Utc};
//! use wind_ensemble::core::TimeFrame;
//! use wind_ensemble::features::{create_augmented_frame, AugmentOptions};
//!
//! let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
//! let index: Vec<_> = (0..8).map(|i| start + Duration::minutes(15 * i)).collect();
//! let frame = TimeFrame::from_column(index.clone(), "fc_q50", (0..8).map(|i| i as f64).collect()).unwrap();
//!
//! let options = AugmentOptions {
//!     max_lags: 2,
//!     add_lags: true,
//!     augment_with_poly: true,
//!     augment_with_roll_stats: false,
//!     roll_window: 4,
//!     differentiate: false,
//!     forecasters_diversity: false,
//! };
//! let augmented = create_augmented_frame(&frame, &options, index[5], index[6]).unwrap();
//! assert_eq!(augmented.frame.n_columns(), 4);
//! assert_eq!(augmented.lookback, 2);
//! ```

pub mod augment;

pub use augment::{create_augmented_frame, AugmentOptions, AugmentedFrame};
