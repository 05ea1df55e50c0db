//! Extraction and cleaning of per-quantile forecaster columns.

use crate::core::TimeFrame;
use crate::error::{EnsembleError, Result};
use crate::utils::stats::mean;
use tracing::warn;

/// Forecaster frames split by quantile suffix, already imputed.
#[derive(Debug, Clone, PartialEq)]
pub struct QuantileFrames {
    pub q50: TimeFrame,
    /// May be empty when no forecaster publishes q10.
    pub q10: TimeFrame,
    /// May be empty when no forecaster publishes q90.
    pub q90: TimeFrame,
}

/// Select the columns named `<forecaster>_<suffix>`, keeping the row index.
pub fn extract_quantile_columns(market: &TimeFrame, suffix: &str) -> TimeFrame {
    let pattern = format!("_{}", suffix);
    market.select_columns(|name| name.ends_with(&pattern) && name.len() > pattern.len())
}

/// Replace missing cells with the mean of their own column.
///
/// A column with no finite value at all has no mean; it is dropped so that no
/// NaN reaches training.
pub fn impute_mean_for_nan(frame: &TimeFrame) -> Result<TimeFrame> {
    let mut columns = Vec::with_capacity(frame.n_columns());
    let mut values = Vec::with_capacity(frame.n_columns());

    for (name, column) in frame.columns().iter().zip(frame.values_by_column()) {
        let observed: Vec<f64> = column.iter().copied().filter(|v| v.is_finite()).collect();
        if observed.is_empty() {
            warn!(column = %name, "dropping forecaster column without observations");
            continue;
        }
        let fill = mean(&observed);
        columns.push(name.clone());
        values.push(
            column
                .iter()
                .map(|&v| if v.is_finite() { v } else { fill })
                .collect(),
        );
    }

    if columns.is_empty() {
        return Ok(TimeFrame::empty());
    }
    TimeFrame::new(frame.index().to_vec(), columns, values)
}

/// Extract and impute q50/q10/q90 forecaster frames; q50 is mandatory.
pub fn assemble_quantile_frames(market: &TimeFrame) -> Result<QuantileFrames> {
    let extract = |suffix: &str| -> Result<TimeFrame> {
        let frame = extract_quantile_columns(market, suffix);
        if frame.is_empty() {
            Ok(TimeFrame::empty())
        } else {
            impute_mean_for_nan(&frame)
        }
    };

    let q50 = extract("q50")?;
    let q10 = extract("q10")?;
    let q90 = extract("q90")?;

    if q50.is_empty() {
        return Err(EnsembleError::MissingRequiredQuantile("q50".into()));
    }

    Ok(QuantileFrames { q50, q10, q90 })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::{DateTime, Duration, TimeZone, Utc};

    fn make_index(n: usize) -> Vec<DateTime<Utc>> {
        let base = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        (0..n)
            .map(|i| base + Duration::minutes(15 * i as i64))
            .collect()
    }

    fn market() -> TimeFrame {
        TimeFrame::new(
            make_index(4),
            vec![
                "fc1_q50".into(),
                "fc1_q10".into(),
                "fc2_q50".into(),
                "fc2_q90".into(),
                "q50".into(),
            ],
            vec![
                vec![1.0, f64::NAN, 3.0, 5.0],
                vec![0.5, 0.5, 0.5, 0.5],
                vec![2.0, 2.0, 2.0, 2.0],
                vec![f64::NAN; 4],
                vec![9.0; 4],
            ],
        )
        .unwrap()
    }

    #[test]
    fn extracts_by_suffix_only() {
        let q50 = extract_quantile_columns(&market(), "q50");
        assert_eq!(q50.columns(), &["fc1_q50".to_string(), "fc2_q50".to_string()]);
        assert_eq!(q50.len(), 4);
    }

    #[test]
    fn imputes_with_column_mean() {
        let q50 = impute_mean_for_nan(&extract_quantile_columns(&market(), "q50")).unwrap();
        let col = q50.column("fc1_q50").unwrap();
        assert_relative_eq!(col[1], 3.0, epsilon = 1e-12);
        assert_eq!(q50.count_missing(), 0);
    }

    #[test]
    fn imputation_is_idempotent() {
        let once = impute_mean_for_nan(&extract_quantile_columns(&market(), "q50")).unwrap();
        let twice = impute_mean_for_nan(&once).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn fully_missing_column_degrades_to_empty() {
        let frames = assemble_quantile_frames(&market()).unwrap();
        assert!(frames.q90.is_empty());
        assert_eq!(frames.q10.n_columns(), 1);
    }

    #[test]
    fn q50_is_mandatory() {
        let only_q10 = market().select_columns(|c| c.ends_with("_q10"));
        assert_eq!(
            assemble_quantile_frames(&only_q10),
            Err(EnsembleError::MissingRequiredQuantile("q50".into()))
        );
    }
}
