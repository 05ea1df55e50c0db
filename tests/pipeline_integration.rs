//! End-to-end runs of the ensemble engine on synthetic wind farm data.
//!
//! Five forecasters publish q10/q50/q90 forecasts for 30 days at 15-minute
//! resolution. Training ends with day 29 and day 30 is the horizon.

use chrono::{DateTime, Duration, TimeZone, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::path::Path;
use wind_ensemble::config::{ChallengeUsecase, EnsembleParams, ModelType, ScalingMethod};
use wind_ensemble::core::{TimeFrame, HORIZON_LEN};
use wind_ensemble::engine::{create_ensemble_forecasts, EngineOutput, ForecastRequest};
use wind_ensemble::ensemble::{ResultBundle, StoredPredictions};
use wind_ensemble::error::EnsembleError;
use wind_ensemble::session::SessionState;

const DAYS: usize = 30;
const RESOURCE: &str = "windfarm";

fn make_timestamps(n: usize) -> Vec<DateTime<Utc>> {
    let base = Utc.with_ymd_and_hms(2024, 4, 1, 0, 0, 0).unwrap();
    (0..n)
        .map(|i| base + Duration::minutes(15 * i as i64))
        .collect()
}

/// Realized power in MW: slow weather cycle plus a diurnal term and noise.
fn generate_power(n: usize, rng: &mut StdRng) -> Vec<f64> {
    (0..n)
        .map(|i| {
            let t = i as f64;
            let weather = 40.0 + 30.0 * (2.0 * std::f64::consts::PI * t / 700.0).sin();
            let diurnal = 8.0 * (2.0 * std::f64::consts::PI * t / 96.0).cos();
            (weather + diurnal + rng.gen_range(-3.0..3.0)).max(0.0)
        })
        .collect()
}

/// Market frame with `<forecaster>_<quantile>` columns.
fn generate_market(
    power: &[f64],
    with_tails: bool,
    rng: &mut StdRng,
) -> TimeFrame {
    let n = power.len();
    let mut frame = TimeFrame::with_index(make_timestamps(n)).unwrap();
    for f in 0..5 {
        let bias = f as f64 - 2.0;
        let q50: Vec<f64> = power
            .iter()
            .map(|p| p + bias + rng.gen_range(-4.0..4.0))
            .collect();
        if with_tails {
            let q10: Vec<f64> = q50
                .iter()
                .map(|m| m - 6.0 - rng.gen_range(0.0..3.0))
                .collect();
            let q90: Vec<f64> = q50
                .iter()
                .map(|m| m + 6.0 + rng.gen_range(0.0..3.0))
                .collect();
            frame.push_column(format!("fc{}_q10", f), q10).unwrap();
            frame.push_column(format!("fc{}_q90", f), q90).unwrap();
        }
        let mut q50 = q50;
        // A few gaps in the training window are imputed.
        if f == 1 {
            for i in (100..400).step_by(50) {
                q50[i] = f64::NAN;
            }
        }
        frame.push_column(format!("fc{}_q50", f), q50).unwrap();
    }
    frame
}

fn params(state_dir: &Path) -> EnsembleParams {
    EnsembleParams::default()
        .with_max_lags(2)
        .with_state_dir(state_dir)
}

fn build_request(
    params: EnsembleParams,
    with_tails: bool,
    simulation: bool,
    usecase: ChallengeUsecase,
) -> ForecastRequest {
    let n = DAYS * HORIZON_LEN;
    let mut rng = StdRng::seed_from_u64(7);
    let power = generate_power(n, &mut rng);
    let market = generate_market(&power, with_tails, &mut rng);
    let index = make_timestamps(n);
    let train_end = (DAYS - 1) * HORIZON_LEN;
    ForecastRequest {
        params,
        buyer: TimeFrame::from_column(index.clone(), RESOURCE, power).unwrap(),
        market,
        end_train: index[train_end - 1],
        forecast_range: index[train_end..].to_vec(),
        challenge_usecase: usecase,
        simulation,
    }
}

fn simulation_request(params: EnsembleParams) -> ForecastRequest {
    build_request(params, true, true, ChallengeUsecase::Simulation)
}

fn run_simulation(request: &ForecastRequest) -> ResultBundle {
    create_ensemble_forecasts(request)
        .unwrap()
        .into_bundle()
        .expect("simulation mode returns the bundle")
}

#[test]
fn simulation_run_returns_one_day_per_quantile() {
    let dir = tempfile::tempdir().unwrap();
    let request = simulation_request(params(dir.path()));
    let bundle = run_simulation(&request);

    assert_eq!(bundle.iteration, 0);
    assert_eq!(bundle.previous_lt, request.end_train);

    let table = bundle.wind_power.predictions.wide().unwrap();
    assert_eq!(table.len(), HORIZON_LEN);
    assert_eq!(table.column_names(), vec!["q0.1", "q0.5", "q0.9", "targets"]);
    assert_eq!(table.index(), request.forecast_range.as_slice());

    // Targets come back in physical units.
    let expected = &request.buyer.column(RESOURCE).unwrap()[(DAYS - 1) * HORIZON_LEN..];
    for (got, want) in table.column("targets").unwrap().iter().zip(expected) {
        assert!((got - want).abs() < 1e-6);
    }
    for label in ["q0.1", "q0.5", "q0.9"] {
        assert!(table.column(label).unwrap().iter().all(|v| *v >= 0.0));
    }

    // Forecast quality on a well-behaved synthetic farm.
    let median = table.column("q0.5").unwrap();
    let mae = median
        .iter()
        .zip(expected)
        .map(|(p, a)| (p - a).abs())
        .sum::<f64>()
        / HORIZON_LEN as f64;
    assert!(mae < 10.0, "median MAE too large: {}", mae);

    let variability = bundle.wind_power_variability.predictions.wide().unwrap();
    assert_eq!(variability.len(), HORIZON_LEN);
    assert_eq!(variability.column_names(), vec!["q0.1", "q0.5", "q0.9", "targets"]);
    for label in ["q0.1", "q0.5", "q0.9"] {
        assert!(variability.column(label).unwrap().iter().all(|v| *v >= 0.0));
    }

    let ramp = bundle.wind_power_ramp.as_ref().unwrap();
    assert_eq!(ramp.outsample.len(), HORIZON_LEN);
    assert!(ramp.insample.len() > 20 * HORIZON_LEN);

    let contributions = &bundle.wind_power.info_contributions;
    assert_eq!(contributions.len(), 3);
    for (quantile, c) in contributions.iter() {
        assert!(c.explanation.is_some());
        assert_eq!(c.x_test_augmented.nrows(), HORIZON_LEN);
        let base_columns = 5 * 3;
        if quantile.is_median() {
            assert_eq!(c.x_train_augmented.ncols(), base_columns);
        } else {
            assert_eq!(c.x_train_augmented.ncols(), 2 * base_columns);
        }
    }
    assert_eq!(bundle.wind_power.best_results.len(), 3);
    assert_eq!(bundle.wind_power_variability.best_results.len(), 3);

    assert!(SessionState::state_path(&request.params, RESOURCE).exists());
}

#[test]
fn run_without_tail_quantiles_completes() {
    let dir = tempfile::tempdir().unwrap();
    let request = build_request(params(dir.path()), false, true, ChallengeUsecase::Simulation);
    let bundle = run_simulation(&request);

    let table = bundle.wind_power.predictions.wide().unwrap();
    assert_eq!(table.len(), HORIZON_LEN);
    for (_, c) in bundle.wind_power.info_contributions.iter() {
        assert_eq!(c.x_train_augmented.ncols(), 5 * 3);
    }
}

#[test]
fn consecutive_runs_carry_best_results() {
    let dir = tempfile::tempdir().unwrap();
    let request = simulation_request(params(dir.path()));

    let first = run_simulation(&request);
    let state = SessionState::load_or_init(&request.params, RESOURCE).unwrap();
    assert_eq!(state.iteration, 1);
    assert_eq!(state.best_first, first.wind_power.best_results);
    assert_eq!(state.best_second, first.wind_power_variability.best_results);

    let second = run_simulation(&request);
    assert_eq!(second.iteration, first.iteration + 1);
    // Iteration 1 refits the stored configuration instead of searching again.
    assert_eq!(second.wind_power.best_results, first.wind_power.best_results);
}

#[test]
fn corrupt_state_aborts_the_run() {
    let dir = tempfile::tempdir().unwrap();
    let request = simulation_request(params(dir.path()));
    let path = SessionState::state_path(&request.params, RESOURCE);
    std::fs::write(&path, b"\x00\x01garbage").unwrap();

    let result = create_ensemble_forecasts(&request);
    assert!(matches!(result, Err(EnsembleError::StateCorrupt { .. })));
    // The corrupt file is left for inspection.
    assert_eq!(std::fs::read(&path).unwrap(), b"\x00\x01garbage");
}

#[test]
fn wrong_horizon_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let mut request = simulation_request(params(dir.path()));
    request.forecast_range.truncate(HORIZON_LEN - 1);
    assert!(matches!(
        create_ensemble_forecasts(&request),
        Err(EnsembleError::HorizonLength { got: 95, .. })
    ));

    // Data ending before the horizon does: the first-stage test partition is short.
    let mut request = simulation_request(params(dir.path()));
    let keep = DAYS * HORIZON_LEN - 6;
    request.buyer = request.buyer.slice(0, keep).unwrap();
    request.market = request.market.slice(0, keep).unwrap();
    let err = create_ensemble_forecasts(&request).unwrap_err();
    assert!(matches!(
        err,
        EnsembleError::HorizonLength { ref stage, got: 90, .. } if stage == "1st"
    ));
    assert!(!SessionState::state_path(&request.params, RESOURCE).exists());
}

#[test]
fn linear_model_without_scaling_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let params = params(dir.path())
        .with_model_type(ModelType::LR)
        .with_scaling(ScalingMethod::None);
    let request = simulation_request(params);
    assert!(matches!(
        create_ensemble_forecasts(&request),
        Err(EnsembleError::Config(_))
    ));
}

#[test]
fn normal_mode_returns_melted_predictions() {
    let dir = tempfile::tempdir().unwrap();
    let mut request = build_request(params(dir.path()), true, false, ChallengeUsecase::WindPower);
    // Horizon targets are unknown outside simulation.
    let mut power = request.buyer.column(RESOURCE).unwrap().to_vec();
    let train_end = (DAYS - 1) * HORIZON_LEN;
    power[train_end..].iter_mut().for_each(|v| *v = f64::NAN);
    request.buyer = TimeFrame::from_column(request.buyer.index().to_vec(), RESOURCE, power).unwrap();

    let melted = match create_ensemble_forecasts(&request).unwrap() {
        EngineOutput::Predictions(table) => table,
        EngineOutput::Simulation(_) => panic!("normal mode must not return the bundle"),
    };
    assert_eq!(melted.len(), 3 * HORIZON_LEN);
    assert_eq!(melted.rows[0].quantile, "q0.1");
    assert_eq!(melted.rows[HORIZON_LEN].quantile, "q0.5");
    assert!(melted.rows.iter().all(|r| r.value >= 0.0));

    // Both stages are persisted even though only one target is returned.
    let path = SessionState::state_path(&request.params, RESOURCE);
    let stored = wind_ensemble::session::read_bundle(&path).unwrap();
    assert!(stored.wind_power_ramp.is_none());
    assert!(matches!(
        stored.wind_power_variability.predictions,
        StoredPredictions::Melted(_)
    ));

    request.challenge_usecase = ChallengeUsecase::WindPowerVariability;
    let variability = create_ensemble_forecasts(&request)
        .unwrap()
        .into_predictions()
        .unwrap();
    assert_eq!(variability.len(), 3 * HORIZON_LEN);
}

fn assert_complete_day(table: &wind_ensemble::ensemble::EnsembleTable, case: &str) {
    assert_eq!(table.len(), HORIZON_LEN, "{}", case);
    for label in ["q0.1", "q0.5", "q0.9"] {
        let column = table.column(label).unwrap();
        assert!(
            column.iter().all(|v| v.is_finite() && *v >= 0.0),
            "{}: {} has negative or missing values",
            case,
            label
        );
    }
}

#[test]
fn every_model_family_and_augmentation_completes() {
    let base = EnsembleParams::default().with_max_lags(2);
    let cases: Vec<(&str, EnsembleParams)> = vec![
        ("LR", base.clone().with_model_type(ModelType::LR)),
        ("LQR", base.clone().with_model_type(ModelType::LQR)),
        ("QRF", base.clone().with_model_type(ModelType::QRF)),
        ("GBR", base.clone().with_model_type(ModelType::GBR)),
        (
            "LR with differences",
            EnsembleParams {
                differentiate: true,
                ..base.clone()
            },
        ),
        (
            "LR with rolling stats",
            EnsembleParams {
                augment_with_roll_stats: true,
                roll_window: 3,
                ..base.clone()
            },
        ),
        (
            "LR with diversity",
            EnsembleParams {
                forecasters_diversity: true,
                add_quantile_predictions: false,
                ..base.clone()
            },
        ),
        (
            "LR with diversity and quantile extras",
            EnsembleParams {
                forecasters_diversity: true,
                add_quantile_predictions: true,
                ..base.clone()
            },
        ),
        (
            "QRF with diversity and quantile extras",
            EnsembleParams {
                forecasters_diversity: true,
                add_quantile_predictions: true,
                ..base.clone().with_model_type(ModelType::QRF)
            },
        ),
        (
            "LQR with every augmentation",
            EnsembleParams {
                differentiate: true,
                augment_with_roll_stats: true,
                roll_window: 3,
                augment_with_poly: true,
                forecasters_diversity: true,
                ..base.clone().with_model_type(ModelType::LQR)
            },
        ),
        (
            "second stage without differences",
            EnsembleParams {
                differentiate_var: false,
                ..base.clone()
            },
        ),
    ];

    for (case, params) in cases {
        let dir = tempfile::tempdir().unwrap();
        let request = simulation_request(params.with_state_dir(dir.path()));
        let bundle = match create_ensemble_forecasts(&request) {
            Ok(output) => output.into_bundle().unwrap(),
            Err(err) => panic!("{} failed: {}", case, err),
        };
        assert_complete_day(bundle.wind_power.predictions.wide().unwrap(), case);
        assert_complete_day(bundle.wind_power_variability.predictions.wide().unwrap(), case);
    }
}

#[test]
fn diversity_columns_of_each_quantile_are_kept_apart() {
    let dir = tempfile::tempdir().unwrap();
    let params = EnsembleParams {
        forecasters_diversity: true,
        add_quantile_predictions: true,
        ..params(dir.path())
    };
    let bundle = run_simulation(&simulation_request(params));

    for (quantile, c) in bundle.wind_power.info_contributions.iter() {
        let names = c.train_frame_augmented.columns();
        assert!(names.iter().any(|n| n == "forecasters_mean_q50"));
        let side = if quantile.is_median() {
            None
        } else if quantile.value() < 0.5 {
            Some("forecasters_mean_q10")
        } else {
            Some("forecasters_mean_q90")
        };
        if let Some(name) = side {
            assert!(names.iter().any(|n| n == name), "{} missing for {}", name, quantile);
        }
    }
}
