//! Property-based tests for the data preparation and rescaling invariants.

use chrono::{DateTime, Duration, TimeZone, Utc};
use proptest::prelude::*;
use wind_ensemble::config::{EnsembleParams, ScalingMethod};
use wind_ensemble::core::{TimeFrame, HORIZON_LEN};
use wind_ensemble::ensemble::rescale_predictions;
use wind_ensemble::error::EnsembleError;
use wind_ensemble::preprocess::{check_horizon, impute_mean_for_nan, split_train_test};
use wind_ensemble::transform::{ScalerStats, Stage};

fn make_timestamps(n: usize) -> Vec<DateTime<Utc>> {
    let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    (0..n)
        .map(|i| base + Duration::minutes(15 * i as i64))
        .collect()
}

/// Power-like values with some variation so the scaling spread is non-zero.
fn power_strategy(min_len: usize, max_len: usize) -> impl Strategy<Value = Vec<f64>> {
    (min_len..max_len).prop_flat_map(|len| {
        prop::collection::vec(0.0..500.0_f64, len).prop_map(|mut v| {
            for (i, val) in v.iter_mut().enumerate() {
                *val += (i % 7) as f64 * 0.01;
            }
            v
        })
    })
}

/// Columns with roughly one cell in five missing.
fn gappy_columns_strategy() -> impl Strategy<Value = Vec<Vec<f64>>> {
    (5usize..60, 1usize..5).prop_flat_map(|(len, n_cols)| {
        prop::collection::vec(
            prop::collection::vec(
                prop_oneof![4 => (0.0..100.0_f64), 1 => Just(f64::NAN)],
                len,
            ),
            n_cols,
        )
    })
}

fn scaling_strategy() -> impl Strategy<Value = ScalingMethod> {
    prop_oneof![Just(ScalingMethod::Normalize), Just(ScalingMethod::Standardize)]
}

proptest! {
    #[test]
    fn scaling_round_trip(values in power_strategy(10, 200), method in scaling_strategy()) {
        let n = values.len();
        let index = make_timestamps(n);
        let buyer = TimeFrame::from_column(index.clone(), "farm", values.clone()).unwrap();
        let params = EnsembleParams::default().with_scaling(method);
        let stats = ScalerStats::compute(&params, &buyer, index[n / 2], "farm").unwrap();

        let restored = stats.inverse(&stats.transform(&values), Stage::First);
        for (a, b) in values.iter().zip(restored.iter()) {
            prop_assert!((a - b).abs() < 1e-8 * (1.0 + a.abs()));
        }
    }

    #[test]
    fn imputation_is_idempotent(columns in gappy_columns_strategy()) {
        let n = columns[0].len();
        let names: Vec<String> = (0..columns.len()).map(|i| format!("fc{}_q50", i)).collect();
        let frame = TimeFrame::new(make_timestamps(n), names, columns).unwrap();

        let once = impute_mean_for_nan(&frame).unwrap();
        let twice = impute_mean_for_nan(&once).unwrap();
        prop_assert!(!once.has_missing_values());
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn rescaled_outputs_are_non_negative(
        values in prop::collection::vec(-5.0..5.0_f64, 1..300),
        center in -100.0..100.0_f64,
        scale in 0.01..50.0_f64,
        second in any::<bool>(),
    ) {
        let stats = ScalerStats {
            resource: "farm".into(),
            method: ScalingMethod::Standardize,
            center,
            scale,
        };
        let stage = if second { Stage::Second } else { Stage::First };
        let rescaled = rescale_predictions(&values, &stats, stage).unwrap();
        prop_assert_eq!(rescaled.len(), values.len());
        prop_assert!(rescaled.iter().all(|v| *v >= 0.0));
    }

    #[test]
    fn only_full_horizons_pass(len in 0usize..200) {
        let result = check_horizon(len, "1st");
        if len == HORIZON_LEN {
            prop_assert!(result.is_ok());
        } else {
            let is_horizon_error = matches!(result, Err(EnsembleError::HorizonLength { .. }));
            prop_assert!(is_horizon_error);
        }
    }

    #[test]
    fn split_is_exact_at_the_boundary(n in 20usize..300, cut in 1usize..19) {
        let index = make_timestamps(n);
        let frame = TimeFrame::from_column(index.clone(), "x", (0..n).map(|i| i as f64).collect()).unwrap();
        let (train, test) = split_train_test(&frame, index[cut - 1], index[cut]);
        prop_assert_eq!(train.len(), cut);
        prop_assert_eq!(test.len(), n - cut);
        prop_assert!(train.index().iter().all(|t| *t <= index[cut - 1]));
        prop_assert!(test.index().iter().all(|t| *t >= index[cut]));
    }
}
