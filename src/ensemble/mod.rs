//! Two-stage quantile ensemble: per-quantile training, model selection,
//! the variability stage and result assembly.

pub mod results;
pub mod selection;
pub mod trainer;
pub mod variability;

pub use results::{
    rescale_predictions, EnsembleTable, MeltedRow, MeltedTable, RampTable, ResultBundle,
    StoredPredictions, TargetRecord,
};
pub use selection::{holdout_start, needs_search, select_and_fit, BestEntry, BestResults, Selection};
pub use trainer::{
    train_quantile, ForecastContribution, QuantileExtras, QuantileOutcome, TrainingInputs,
};
pub use variability::{
    create_augmented_second_stage, create_second_stage_frame, run_second_stage,
    SecondStageInputs, SecondStageOptions, VariabilityContribution, VariabilityOutcome,
};
