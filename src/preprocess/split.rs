//! Train/test splitting and feature/target alignment.

use crate::core::{Matrix, TimeFrame, HORIZON_LEN};
use crate::error::{EnsembleError, Result};
use chrono::{DateTime, Utc};

/// Model-ready matrices for one stage.
#[derive(Debug, Clone, PartialEq)]
pub struct XySplit {
    pub x_train: Matrix,
    pub y_train: Vec<f64>,
    pub x_test: Matrix,
    /// Realized targets over the horizon; NaN where not yet observed.
    pub y_test: Vec<f64>,
}

/// Partition `frame` into rows `<= end_train` and rows `>= start_prediction`.
pub fn split_train_test(
    frame: &TimeFrame,
    end_train: DateTime<Utc>,
    start_prediction: DateTime<Utc>,
) -> (TimeFrame, TimeFrame) {
    let train = frame.rows_between(None, Some(end_train));
    let test = frame.rows_between(Some(start_prediction), None);
    (train, test)
}

/// Fail unless the test partition covers exactly one horizon.
pub fn check_horizon(test_len: usize, stage: &str) -> Result<()> {
    if test_len != HORIZON_LEN {
        return Err(EnsembleError::HorizonLength {
            stage: stage.to_string(),
            expected: HORIZON_LEN,
            got: test_len,
        });
    }
    Ok(())
}

/// Join feature and target partitions after dropping the first `max_lag` training rows.
///
/// Returns the train and test frames with the target column last.
pub fn concatenate_features_targets(
    train_features: &TimeFrame,
    test_features: &TimeFrame,
    train_targets: &TimeFrame,
    test_targets: &TimeFrame,
    max_lag: usize,
) -> Result<(TimeFrame, TimeFrame)> {
    let train_features = train_features.skip_rows(max_lag);
    let train_targets = train_targets.skip_rows(max_lag);

    if train_features.index() != train_targets.index() {
        return Err(EnsembleError::IndexMismatch {
            context: "train features and targets".to_string(),
            left: train_features.len(),
            right: train_targets.len(),
        });
    }
    if test_features.index() != test_targets.index() {
        return Err(EnsembleError::IndexMismatch {
            context: "test features and targets".to_string(),
            left: test_features.len(),
            right: test_targets.len(),
        });
    }

    let train = train_features.join_columns(&train_targets)?;
    let test = test_features.join_columns(test_targets)?;
    Ok((train, test))
}

/// Split a joined frame into feature matrices and target vectors.
pub fn xy_train_test(train: &TimeFrame, test: &TimeFrame, target: &str) -> Result<XySplit> {
    let y_train = train
        .column(target)
        .ok_or_else(|| EnsembleError::InvalidParameter(format!("missing target '{}'", target)))?
        .to_vec();
    let y_test = test
        .column(target)
        .ok_or_else(|| EnsembleError::InvalidParameter(format!("missing target '{}'", target)))?
        .to_vec();

    let x_train = train.select_columns(|c| c != target).to_matrix();
    let x_test = test.select_columns(|c| c != target).to_matrix();

    if x_train.ncols() != x_test.ncols() {
        return Err(EnsembleError::DimensionMismatch {
            expected: x_train.ncols(),
            got: x_test.ncols(),
        });
    }

    Ok(XySplit {
        x_train,
        y_train,
        x_test,
        y_test,
    })
}

/// Restrict an auxiliary quantile feature frame to the base train/test indexes.
///
/// Returns empty matrices when the auxiliary frame is empty.
pub fn align_quantile_features(
    frame: &TimeFrame,
    train_index: &[DateTime<Utc>],
    test_index: &[DateTime<Utc>],
) -> Result<(Matrix, Matrix)> {
    if frame.is_empty() {
        return Ok((Matrix::default(), Matrix::default()));
    }

    let pick = |index: &[DateTime<Utc>], context: &str| -> Result<Matrix> {
        let (Some(&first), Some(&last)) = (index.first(), index.last()) else {
            return Ok(Matrix::default());
        };
        let rows = frame.rows_between(Some(first), Some(last));
        if rows.index() != index {
            return Err(EnsembleError::IndexMismatch {
                context: context.to_string(),
                left: rows.len(),
                right: index.len(),
            });
        }
        Ok(rows.to_matrix())
    };

    let train = pick(train_index, "train quantile features")?;
    let test = pick(test_index, "test quantile features")?;
    Ok((train, test))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn make_index(n: usize) -> Vec<DateTime<Utc>> {
        let base = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        (0..n)
            .map(|i| base + Duration::minutes(15 * i as i64))
            .collect()
    }

    fn frame(name: &str, n: usize) -> TimeFrame {
        TimeFrame::from_column(make_index(n), name, (0..n).map(|i| i as f64).collect()).unwrap()
    }

    #[test]
    fn splits_at_exact_boundary() {
        let f = frame("x", 200);
        let idx = f.index().to_vec();
        let (train, test) = split_train_test(&f, idx[103], idx[104]);
        assert_eq!(train.len(), 104);
        assert_eq!(test.len(), 96);
        assert_eq!(*train.index().last().unwrap(), idx[103]);
        assert_eq!(test.index()[0], idx[104]);
        assert!(check_horizon(test.len(), "1st").is_ok());
    }

    #[test]
    fn rejects_wrong_horizon() {
        assert!(matches!(
            check_horizon(95, "2nd"),
            Err(EnsembleError::HorizonLength { got: 95, .. })
        ));
    }

    #[test]
    fn concatenation_drops_lag_rows() {
        let features = frame("x", 20);
        let targets = frame("y", 20);
        let idx = features.index().to_vec();
        let (trf, tef) = split_train_test(&features, idx[9], idx[10]);
        let (trt, tet) = split_train_test(&targets, idx[9], idx[10]);
        let (train, test) = concatenate_features_targets(&trf, &tef, &trt, &tet, 3).unwrap();
        assert_eq!(train.len(), 7);
        assert_eq!(train.index()[0], idx[3]);
        assert_eq!(test.n_columns(), 2);

        let split = xy_train_test(&train, &test, "y").unwrap();
        assert_eq!(split.x_train.ncols(), 1);
        assert_eq!(split.y_train.len(), 7);
        assert_eq!(split.y_test.len(), 10);
    }

    #[test]
    fn concatenation_detects_misaligned_targets() {
        let features = frame("x", 20);
        let targets = frame("y", 19);
        let idx = features.index().to_vec();
        let (trf, tef) = split_train_test(&features, idx[9], idx[10]);
        let (trt, tet) = split_train_test(&targets, idx[9], idx[10]);
        let result = concatenate_features_targets(&trf, &tef, &trt, &tet, 0);
        assert!(matches!(result, Err(EnsembleError::IndexMismatch { .. })));
    }

    #[test]
    fn aligns_auxiliary_quantile_features() {
        let aux = frame("fc_q10", 20);
        let idx = aux.index().to_vec();
        let (train, test) = align_quantile_features(&aux, &idx[3..10], &idx[10..]).unwrap();
        assert_eq!(train.nrows(), 7);
        assert_eq!(test.nrows(), 10);

        let (train, test) = align_quantile_features(&TimeFrame::empty(), &idx, &idx).unwrap();
        assert!(train.is_empty() && test.is_empty());
    }
}
