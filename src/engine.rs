//! Run orchestration: from forecaster outputs to the persisted result bundle.
//!
//! A run assembles and scales the forecaster frames, augments them, trains one
//! model per quantile (the median model also feeding the variability stage),
//! rescales both stages to physical units and writes the bundle to the state
//! file of the resource. Every check happens before the state file is touched,
//! so a failed run never replaces the previous state.

use crate::config::{ChallengeUsecase, EnsembleParams};
use crate::core::{Matrix, QuantileMap, TimeFrame, HORIZON_LEN};
use crate::ensemble::{
    rescale_predictions, run_second_stage, train_quantile, EnsembleTable, ForecastContribution,
    MeltedTable, QuantileExtras, RampTable, ResultBundle, SecondStageInputs, StoredPredictions,
    TargetRecord, TrainingInputs, VariabilityOutcome,
};
use crate::error::{EnsembleError, Result};
use crate::features::{create_augmented_frame, AugmentOptions, AugmentedFrame};
use crate::preprocess::{
    align_quantile_features, assemble_quantile_frames, check_horizon,
    concatenate_features_targets, split_train_test, xy_train_test,
};
use crate::session::SessionState;
use crate::transform::{
    normalized_target_name, scale_buyer_frame, scale_forecasters_frames, ScalerStats, Stage,
};
use chrono::{DateTime, Utc};
use tracing::{debug, info};

/// Input of one run.
#[derive(Debug, Clone)]
pub struct ForecastRequest {
    pub params: EnsembleParams,
    /// Single column named after the resource, covering train and horizon rows.
    pub buyer: TimeFrame,
    /// Forecaster columns named `<forecaster>_<q10|q50|q90>`.
    pub market: TimeFrame,
    pub end_train: DateTime<Utc>,
    /// The 96 timestamps to forecast.
    pub forecast_range: Vec<DateTime<Utc>>,
    pub challenge_usecase: ChallengeUsecase,
    pub simulation: bool,
}

impl ForecastRequest {
    /// Name of the buyer resource (its single column).
    pub fn resource(&self) -> Result<&str> {
        match self.buyer.columns() {
            [name] => Ok(name.as_str()),
            columns => Err(EnsembleError::InvalidParameter(format!(
                "buyer frame must have exactly one column, got {}",
                columns.len()
            ))),
        }
    }

    /// Reject the request before any data is processed.
    pub fn validate(&self) -> Result<()> {
        self.params.validate()?;
        self.resource()?;
        check_horizon(self.forecast_range.len(), "requested")?;
        if self.forecast_range.windows(2).any(|w| w[1] <= w[0]) {
            return Err(EnsembleError::TimestampError(
                "forecast range must be strictly increasing".into(),
            ));
        }
        match (self.simulation, self.challenge_usecase) {
            (true, ChallengeUsecase::Simulation) => Ok(()),
            (true, _) => Err(EnsembleError::Config(
                "challenge_usecase must be 'simulation' in simulation mode".into(),
            )),
            (false, ChallengeUsecase::Simulation) => Err(EnsembleError::Config(
                "challenge_usecase must be either 'wind_power' or 'wind_power_variability'"
                    .into(),
            )),
            (false, _) => Ok(()),
        }
    }
}

/// What a run hands back to the caller.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineOutput {
    /// Long-format predictions of the requested target.
    Predictions(MeltedTable),
    /// The full bundle with wide tables, targets and ramp tables.
    Simulation(Box<ResultBundle>),
}

impl EngineOutput {
    pub fn into_bundle(self) -> Option<ResultBundle> {
        match self {
            EngineOutput::Simulation(bundle) => Some(*bundle),
            EngineOutput::Predictions(_) => None,
        }
    }

    pub fn into_predictions(self) -> Option<MeltedTable> {
        match self {
            EngineOutput::Predictions(table) => Some(table),
            EngineOutput::Simulation(_) => None,
        }
    }
}

fn augment_optional(
    frame: &TimeFrame,
    enabled: bool,
    options: &AugmentOptions,
    end_train: DateTime<Utc>,
    start_prediction: DateTime<Utc>,
) -> Result<Option<AugmentedFrame>> {
    if !enabled || frame.is_empty() {
        return Ok(None);
    }
    create_augmented_frame(frame, options, end_train, start_prediction).map(Some)
}

fn aligned_extras(
    augmented: Option<&AugmentedFrame>,
    train_index: &[DateTime<Utc>],
    test_index: &[DateTime<Utc>],
) -> Result<(Vec<String>, (Matrix, Matrix))> {
    match augmented {
        Some(a) => Ok((
            a.frame.columns().to_vec(),
            align_quantile_features(&a.frame, train_index, test_index)?,
        )),
        None => Ok((Vec::new(), Default::default())),
    }
}

/// Run both stages for one request and persist the bundle.
///
/// Normal mode returns the melted predictions of `challenge_usecase`;
/// simulation mode returns the whole bundle.
pub fn create_ensemble_forecasts(request: &ForecastRequest) -> Result<EngineOutput> {
    request.validate()?;
    let params = &request.params;
    let resource = request.resource()?;
    let end_train = request.end_train;
    let (start_prediction, end_prediction) =
        match (request.forecast_range.first(), request.forecast_range.last()) {
            (Some(&s), Some(&e)) => (s, e),
            _ => {
                return Err(EnsembleError::HorizonLength {
                    stage: "requested".into(),
                    expected: HORIZON_LEN,
                    got: 0,
                })
            }
        };

    info!(
        launch_time = %end_train,
        start = %start_prediction,
        end = %end_prediction,
        resource,
        model_type = params.model_type.as_str(),
        "starting ensemble run"
    );

    let frames = assemble_quantile_frames(&request.market)?;
    let stats = ScalerStats::compute(params, &request.buyer, end_train, resource)?;
    let scaled = scale_forecasters_frames(params, &stats, &frames);
    drop(frames);

    let options = AugmentOptions::first_stage(params);
    let augmented = create_augmented_frame(&scaled.q50, &options, end_train, start_prediction)?;
    let extras_enabled = params.add_quantile_predictions;
    let augmented_q10 =
        augment_optional(&scaled.q10, extras_enabled, &options, end_train, start_prediction)?;
    let augmented_q90 =
        augment_optional(&scaled.q90, extras_enabled, &options, end_train, start_prediction)?;
    debug!(
        q50_columns = augmented.frame.n_columns(),
        q10 = augmented_q10.is_some(),
        q90 = augmented_q90.is_some(),
        "augmented forecaster frames"
    );

    let buyer = scale_buyer_frame(params, &stats, &request.buyer)?;
    let (train_features, test_features) =
        split_train_test(&augmented.frame, end_train, start_prediction);
    let (train_targets, test_targets) = split_train_test(&buyer, end_train, start_prediction);
    let max_lag = params.max_lags.max(augmented.lookback);
    let (train, test) = concatenate_features_targets(
        &train_features,
        &test_features,
        &train_targets,
        &test_targets,
        max_lag,
    )?;

    info!(train_len = train.len(), test_len = test.len(), "first stage frames");
    check_horizon(test.len(), Stage::First.label())?;

    let target = normalized_target_name(resource);
    let xy = xy_train_test(&train, &test, &target)?;
    let (q10_columns, (q10_train, q10_test)) =
        aligned_extras(augmented_q10.as_ref(), train.index(), test.index())?;
    let (q90_columns, (q90_train, q90_test)) =
        aligned_extras(augmented_q90.as_ref(), train.index(), test.index())?;
    let extras = QuantileExtras {
        q10_columns,
        q10_train,
        q10_test,
        q90_columns,
        q90_train,
        q90_test,
    };

    let train_missing = train.count_missing();
    info!(
        train_missing,
        test_missing = test.count_missing(),
        "missing values in ensemble frames"
    );
    if train_missing > 0 {
        return Err(EnsembleError::MissingValues {
            context: "first stage train frame".into(),
            count: train_missing,
        });
    }

    let session = SessionState::load_or_init(params, resource)?;
    let iteration = session.iteration;
    info!(iteration, "computing ensemble predictions");

    let inputs = TrainingInputs {
        x_train: &xy.x_train,
        y_train: &xy.y_train,
        x_test: &xy.x_test,
        train_frame: &train,
        target: &target,
    };
    let mut best_first = session.best_first.clone();
    let mut predictions = QuantileMap::new();
    let mut contributions = QuantileMap::new();
    let mut variability: Option<VariabilityOutcome> = None;

    for quantile in params.quantile_levels()? {
        let outcome = train_quantile(params, &inputs, quantile, &mut best_first, iteration, &extras)?;
        contributions.push(quantile, ForecastContribution::from_outcome(&outcome, &stats))?;

        if quantile.is_median() {
            let insample = outcome.insample_predictions()?;
            let second_inputs = SecondStageInputs {
                train_index: train.index(),
                test_index: test.index(),
                y_train: &xy.y_train,
                y_test: &xy.y_test,
                predictions_insample: &insample,
                predictions_outsample: &outcome.predictions,
            };
            variability = Some(run_second_stage(
                params,
                &stats,
                &outcome.model,
                &second_inputs,
                &session.best_second,
                iteration,
                end_train,
                start_prediction,
            )?);
        }
        predictions.push(quantile, outcome.predictions)?;
    }

    let variability = variability
        .ok_or_else(|| EnsembleError::Config("quantiles must include 0.5".into()))?;

    let mut power_table = EnsembleTable::new(test.index().to_vec());
    for (quantile, values) in predictions.iter() {
        power_table.push_quantile(quantile, rescale_predictions(values, &stats, Stage::First)?)?;
    }
    let mut variability_table = EnsembleTable::new(variability.test_index.clone());
    let mut insample_table = EnsembleTable::new(variability.train_index.clone());
    for (quantile, values) in variability.predictions.iter() {
        variability_table
            .push_quantile(quantile, rescale_predictions(values, &stats, Stage::Second)?)?;
    }
    for (quantile, values) in variability.predictions_insample.iter() {
        insample_table
            .push_quantile(quantile, rescale_predictions(values, &stats, Stage::Second)?)?;
    }

    let (power_predictions, variability_predictions, ramp) = if request.simulation {
        let ramp = RampTable {
            insample: insample_table,
            outsample: variability_table.clone(),
        };
        let power = power_table.with_targets(stats.inverse(&xy.y_test, Stage::First))?;
        let var = variability_table.with_targets(stats.inverse(&variability.y_test, Stage::Second))?;
        (
            StoredPredictions::Wide(power),
            StoredPredictions::Wide(var),
            Some(ramp),
        )
    } else {
        (
            StoredPredictions::Melted(power_table.melt()),
            StoredPredictions::Melted(variability_table.melt()),
            None,
        )
    };

    let bundle = ResultBundle {
        previous_lt: end_train,
        iteration,
        wind_power: TargetRecord {
            predictions: power_predictions,
            info_contributions: contributions,
            best_results: best_first,
        },
        wind_power_variability: TargetRecord {
            predictions: variability_predictions,
            info_contributions: variability.contributions,
            best_results: variability.best,
        },
        wind_power_ramp: ramp,
    };
    session.save(&bundle)?;

    if request.simulation {
        return Ok(EngineOutput::Simulation(Box::new(bundle)));
    }
    let table = match request.challenge_usecase {
        ChallengeUsecase::WindPowerVariability => bundle.wind_power_variability.predictions.melted(),
        _ => bundle.wind_power.predictions.melted(),
    };
    Ok(EngineOutput::Predictions(table))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn make_index(start: usize, n: usize) -> Vec<DateTime<Utc>> {
        let base = Utc.with_ymd_and_hms(2024, 9, 1, 0, 0, 0).unwrap();
        (start..start + n)
            .map(|i| base + Duration::minutes(15 * i as i64))
            .collect()
    }

    fn request(simulation: bool, usecase: ChallengeUsecase) -> ForecastRequest {
        let index = make_index(0, 200);
        ForecastRequest {
            params: EnsembleParams::default(),
            buyer: TimeFrame::from_column(index.clone(), "farm", vec![1.0; 200]).unwrap(),
            market: TimeFrame::from_column(index, "a_q50", vec![1.0; 200]).unwrap(),
            end_train: make_index(103, 1)[0],
            forecast_range: make_index(104, HORIZON_LEN),
            challenge_usecase: usecase,
            simulation,
        }
    }

    #[test]
    fn mode_and_usecase_must_agree() {
        assert!(request(true, ChallengeUsecase::Simulation).validate().is_ok());
        assert!(request(false, ChallengeUsecase::WindPower).validate().is_ok());
        assert!(matches!(
            request(true, ChallengeUsecase::WindPower).validate(),
            Err(EnsembleError::Config(_))
        ));
        assert!(matches!(
            request(false, ChallengeUsecase::Simulation).validate(),
            Err(EnsembleError::Config(_))
        ));
    }

    #[test]
    fn horizon_must_have_96_steps() {
        let mut req = request(false, ChallengeUsecase::WindPower);
        req.forecast_range.pop();
        assert!(matches!(
            req.validate(),
            Err(EnsembleError::HorizonLength { got: 95, .. })
        ));
    }

    #[test]
    fn buyer_must_have_one_column() {
        let mut req = request(false, ChallengeUsecase::WindPower);
        let values = req.buyer.column("farm").unwrap().to_vec();
        req.buyer.push_column("other", values).unwrap();
        assert!(matches!(
            create_ensemble_forecasts(&req),
            Err(EnsembleError::InvalidParameter(_))
        ));
    }

    #[test]
    fn missing_median_forecasters_fail_before_state_is_touched() {
        let dir = tempfile::tempdir().unwrap();
        let mut req = request(false, ChallengeUsecase::WindPower);
        req.params = req.params.with_state_dir(dir.path().join("state"));
        req.market.rename_column("a_q50", "a_q10").unwrap();
        assert!(matches!(
            create_ensemble_forecasts(&req),
            Err(EnsembleError::MissingRequiredQuantile(_))
        ));
        assert!(!dir.path().join("state").exists());
    }
}
