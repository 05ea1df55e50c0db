//! Input preparation: quantile column assembly and train/test alignment.

pub mod quantile;
pub mod split;

pub use quantile::{
    assemble_quantile_frames, extract_quantile_columns, impute_mean_for_nan, QuantileFrames,
};
pub use split::{
    align_quantile_features, check_horizon, concatenate_features_targets, split_train_test,
    xy_train_test, XySplit,
};
