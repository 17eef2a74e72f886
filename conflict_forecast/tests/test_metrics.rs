use approx::assert_relative_eq;
use chrono::NaiveDate;
use conflict_forecast::data::{Granularity, TimeSeries};
use conflict_forecast::error::ForecastError;
use conflict_forecast::metrics::{forecast_accuracy, mape, AccuracyTracker};
use conflict_forecast::models::{ForecastModel, LinearTrendForecaster};
use pretty_assertions::assert_eq;
use rstest::rstest;

fn linear_series(len: u64) -> TimeSeries {
    let counts: Vec<u64> = (0..len).map(|t| 100 + 2 * t).collect();
    TimeSeries::from_counts(
        "Borno",
        Granularity::Daily,
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
        &counts,
    )
    .unwrap()
}

#[test]
fn test_mape_floors_denominator_at_one() {
    // |0 - 1| / 1 and |4 - 2| / 4
    let value = mape(&[1.0, 2.0], &[0.0, 4.0]).unwrap();
    assert_relative_eq!(value, 0.75, epsilon = 1e-12);
}

#[test]
fn test_forecast_accuracy() {
    let forecast = vec![10.0, 12.0, 14.0, 16.0];
    let actual = vec![11.0, 12.0, 13.0, 20.0];

    let accuracy = forecast_accuracy(&forecast, &actual).unwrap();

    assert_relative_eq!(accuracy.mae, 6.0 / 4.0, epsilon = 1e-12);
    assert_relative_eq!(accuracy.rmse, (18.0f64 / 4.0).sqrt(), epsilon = 1e-12);
    let expected_mape = (1.0 / 11.0 + 0.0 + 1.0 / 13.0 + 4.0 / 20.0) / 4.0;
    assert_relative_eq!(accuracy.mape, expected_mape, epsilon = 1e-12);
    assert!(accuracy.smape > 0.0 && accuracy.smape < 2.0);

    let rendered = accuracy.to_string();
    assert!(rendered.contains("MAE:"));
    assert!(rendered.contains("MAPE:"));
}

#[test]
fn test_perfect_forecast_scores_zero() {
    let values = vec![0.0, 3.0, 5.0];
    let accuracy = forecast_accuracy(&values, &values).unwrap();
    assert_eq!(accuracy.mae, 0.0);
    assert_eq!(accuracy.rmse, 0.0);
    assert_eq!(accuracy.mape, 0.0);
    assert_eq!(accuracy.smape, 0.0);
}

#[rstest]
#[case(vec![1.0, 2.0], vec![1.0])]
#[case(vec![], vec![])]
#[case(vec![f64::NAN], vec![1.0])]
fn test_invalid_inputs_rejected(#[case] forecast: Vec<f64>, #[case] actual: Vec<f64>) {
    assert!(matches!(
        forecast_accuracy(&forecast, &actual),
        Err(ForecastError::ValidationError(_))
    ));
}

#[rstest]
#[case(100, 10, vec![70, 80, 90], 10)]
#[case(35, 10, vec![25], 10)]
#[case(24, 10, vec![20], 4)]
#[case(20, 10, vec![], 0)]
fn test_backtest_cutoffs(
    #[case] len: usize,
    #[case] horizon: usize,
    #[case] expected: Vec<usize>,
    #[case] expected_horizon: usize,
) {
    let tracker = AccuracyTracker::new(3, 20).unwrap();
    let (cutoffs, h) = tracker.cutoffs(len, horizon);
    assert_eq!(cutoffs, expected);
    assert_eq!(h, expected_horizon);
}

#[test]
fn test_tracker_rejects_empty_configuration() {
    assert!(AccuracyTracker::new(0, 20).is_err());
    assert!(AccuracyTracker::new(3, 0).is_err());
}

#[test]
fn test_linear_backtest_on_linear_series_is_nearly_exact() {
    let series = linear_series(120);
    let tracker = AccuracyTracker::new(3, 20).unwrap();
    let forecaster = LinearTrendForecaster::default();

    let report = tracker
        .backtest(&series, 10, |train, h| {
            forecaster.fit(train, h).map(|r| r.point_estimates())
        })
        .unwrap();

    assert_eq!(report.folds.len(), 3);
    assert!(report.mape < 0.01, "MAPE {}", report.mape);
    assert!(report.mae < 1e-6);
    assert_eq!(
        report.folds.iter().map(|f| f.cutoff).collect::<Vec<_>>(),
        vec![90, 100, 110]
    );
}

#[test]
fn test_failed_folds_are_skipped() {
    let series = linear_series(60);
    let tracker = AccuracyTracker::new(2, 20).unwrap();

    let report = tracker
        .backtest(&series, 10, |train, h| {
            if train.len() < 50 {
                Err(ForecastError::AllModelsFailed("too early".to_string()))
            } else {
                Ok(vec![0.0; h])
            }
        })
        .unwrap();

    assert_eq!(report.folds.len(), 1);
    assert_eq!(report.folds[0].cutoff, 50);
    assert!(report.mape > 0.99);
}

#[test]
fn test_backtest_errors_when_every_fold_fails() {
    let series = linear_series(60);
    let tracker = AccuracyTracker::new(2, 20).unwrap();

    let result = tracker.backtest(&series, 10, |_, _| {
        Err(ForecastError::AllModelsFailed("nothing converged".to_string()))
    });
    assert!(matches!(result, Err(ForecastError::AllModelsFailed(_))));
}

#[test]
fn test_backtest_on_short_series_is_insufficient() {
    let series = linear_series(15);
    let tracker = AccuracyTracker::new(3, 20).unwrap();

    let result = tracker.backtest(&series, 5, |_, h| Ok(vec![0.0; h]));
    assert_eq!(
        result.unwrap_err(),
        ForecastError::InsufficientHistory { needed: 21, got: 15 }
    );
}
