use approx::assert_relative_eq;
use chrono::{Duration, NaiveDate};
use conflict_forecast::data::{Granularity, TimeSeries};
use conflict_forecast::ensemble::{EnsembleCombiner, EnsembleWeights};
use conflict_forecast::error::{ForecastError, Result};
use conflict_forecast::models::{
    ForecastModel, ForecastPoint, LinearTrendForecaster, ModelFitResult, ModelKind, ModelParameters,
    SeasonalTrendForecaster,
};
use conflict_forecast::config::SeasonalConfig;
use pretty_assertions::assert_eq;
use rstest::rstest;

fn start_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 3, 4).unwrap()
}

fn linear_params() -> ModelParameters {
    ModelParameters::LinearTrend {
        slope: 0.0,
        intercept: 0.0,
        residual_std_error: 0.0,
        r_squared: 0.0,
    }
}

/// A fit result with the given (estimate, half-width) per step
fn fit(kind: ModelKind, steps: &[(f64, f64)]) -> ModelFitResult {
    let points = steps
        .iter()
        .enumerate()
        .map(|(i, &(estimate, half))| {
            ForecastPoint::new(start_date() + Duration::days(i as i64), estimate, half).unwrap()
        })
        .collect();
    ModelFitResult::new(kind, linear_params(), points, true)
}

fn failed(kind: ModelKind) -> ForecastError {
    ForecastError::ModelFit {
        model: kind.to_string(),
        reason: "did not converge".to_string(),
    }
}

#[test]
fn test_default_weights_sum_to_one() {
    let weights = EnsembleWeights::default();
    assert_relative_eq!(weights.sum(), 1.0, epsilon = 1e-9);
    assert_eq!(weights.weight(ModelKind::SeasonalTrend), 0.5);
    assert_eq!(weights.weight(ModelKind::Autoregressive), 0.3);
    assert_eq!(weights.weight(ModelKind::LinearTrend), 0.2);
}

#[rstest]
#[case(0.6, 0.3, 0.1)]
#[case(1.0, 0.0, 0.0)]
#[case(0.1, 0.2, 0.7)]
fn test_valid_weights_accepted(#[case] s: f64, #[case] a: f64, #[case] l: f64) {
    let weights = EnsembleWeights::new(s, a, l).unwrap();
    assert_relative_eq!(weights.sum(), 1.0, epsilon = 1e-9);
}

#[rstest]
#[case(0.5, 0.3, 0.3)]
#[case(0.5, 0.3, 0.1)]
#[case(1.2, -0.1, -0.1)]
#[case(f64::NAN, 0.5, 0.5)]
fn test_invalid_weights_rejected(#[case] s: f64, #[case] a: f64, #[case] l: f64) {
    assert!(matches!(
        EnsembleWeights::new(s, a, l),
        Err(ForecastError::ValidationError(_))
    ));
}

#[test]
fn test_failed_constituent_weight_is_redistributed() {
    let combiner = EnsembleCombiner::new(EnsembleWeights::default(), 0.0);
    let outcomes: Vec<(ModelKind, Result<ModelFitResult>)> = vec![
        (ModelKind::SeasonalTrend, Err(failed(ModelKind::SeasonalTrend))),
        (
            ModelKind::Autoregressive,
            Ok(fit(ModelKind::Autoregressive, &[(10.0, 2.0), (12.0, 2.0)])),
        ),
        (ModelKind::LinearTrend, Ok(fit(ModelKind::LinearTrend, &[(20.0, 2.0), (22.0, 2.0)]))),
    ];

    let combined = combiner.combine(&outcomes).unwrap();

    assert_eq!(combined.model_label, "autoregressive+linear_trend");
    assert_relative_eq!(
        combined.points[0].point_estimate(),
        0.6 * 10.0 + 0.4 * 20.0,
        epsilon = 1e-9
    );
    assert_relative_eq!(
        combined.points[1].point_estimate(),
        0.6 * 12.0 + 0.4 * 22.0,
        epsilon = 1e-9
    );

    let weights: Vec<f64> = combined.constituents.iter().map(|c| c.weight).collect();
    assert_relative_eq!(weights[0], 0.0);
    assert_relative_eq!(weights[1], 0.6, epsilon = 1e-9);
    assert_relative_eq!(weights[2], 0.4, epsilon = 1e-9);
    assert!(combined.constituents[0].error.is_some());
}

#[test]
fn test_fallback_output_is_excluded_when_primaries_exist() {
    let combiner = EnsembleCombiner::new(EnsembleWeights::default(), 0.0);
    let substitute = ModelFitResult::substitute(
        ModelKind::Autoregressive,
        fit(ModelKind::LinearTrend, &[(20.0, 1.0)]),
    );
    let outcomes: Vec<(ModelKind, Result<ModelFitResult>)> = vec![
        (ModelKind::SeasonalTrend, Ok(fit(ModelKind::SeasonalTrend, &[(10.0, 1.0)]))),
        (ModelKind::Autoregressive, Ok(substitute)),
        (ModelKind::LinearTrend, Ok(fit(ModelKind::LinearTrend, &[(20.0, 1.0)]))),
    ];

    let combined = combiner.combine(&outcomes).unwrap();

    assert_eq!(combined.model_label, "seasonal_trend+linear_trend");
    let ar = &combined.constituents[1];
    assert_eq!(ar.fallback, Some(ModelKind::LinearTrend));
    assert_eq!(ar.weight, 0.0);
    assert!(!ar.converged);
    assert_relative_eq!(
        combined.points[0].point_estimate(),
        (0.5 * 10.0 + 0.2 * 20.0) / 0.7,
        epsilon = 1e-9
    );
}

#[test]
fn test_fallback_used_when_nothing_else_succeeded() {
    let combiner = EnsembleCombiner::new(EnsembleWeights::default(), 0.0);
    let substitute = ModelFitResult::substitute(
        ModelKind::Autoregressive,
        fit(ModelKind::LinearTrend, &[(7.0, 1.0)]),
    );
    let outcomes: Vec<(ModelKind, Result<ModelFitResult>)> = vec![
        (ModelKind::SeasonalTrend, Err(failed(ModelKind::SeasonalTrend))),
        (ModelKind::Autoregressive, Ok(substitute)),
        (ModelKind::LinearTrend, Err(failed(ModelKind::LinearTrend))),
    ];

    let combined = combiner.combine(&outcomes).unwrap();
    assert_eq!(combined.model_label, "autoregressive(linear_trend)");
    assert_relative_eq!(combined.points[0].point_estimate(), 7.0);
}

#[test]
fn test_all_failed_is_reported() {
    let combiner = EnsembleCombiner::new(EnsembleWeights::default(), 0.5);
    let outcomes: Vec<(ModelKind, Result<ModelFitResult>)> = vec![
        (ModelKind::SeasonalTrend, Err(failed(ModelKind::SeasonalTrend))),
        (
            ModelKind::Autoregressive,
            Err(ForecastError::Timeout {
                model: "autoregressive".to_string(),
                budget_ms: 5000,
            }),
        ),
        (
            ModelKind::LinearTrend,
            Err(ForecastError::InsufficientHistory { needed: 3, got: 2 }),
        ),
    ];

    match combiner.combine(&outcomes) {
        Err(ForecastError::AllModelsFailed(detail)) => {
            assert!(detail.contains("seasonal_trend"));
            assert!(detail.contains("5000 ms"));
        }
        other => panic!("Expected AllModelsFailed, got {:?}", other),
    }
}

#[test]
fn test_misaligned_horizons_rejected() {
    let combiner = EnsembleCombiner::new(EnsembleWeights::default(), 0.5);
    let outcomes: Vec<(ModelKind, Result<ModelFitResult>)> = vec![
        (ModelKind::SeasonalTrend, Ok(fit(ModelKind::SeasonalTrend, &[(1.0, 1.0), (1.0, 1.0)]))),
        (ModelKind::LinearTrend, Ok(fit(ModelKind::LinearTrend, &[(1.0, 1.0)]))),
    ];
    assert!(matches!(
        combiner.combine(&outcomes),
        Err(ForecastError::ValidationError(_))
    ));
}

#[test]
fn test_combined_interval_not_narrower_than_constituents() {
    let counts: Vec<u64> = (0..84)
        .map(|t| 8 + (t % 7 == 5) as u64 * 6 + (t % 7 == 6) as u64 * 4 + (t % 3) as u64)
        .collect();
    let series =
        TimeSeries::from_counts("Yobe", Granularity::Daily, start_date(), &counts).unwrap();

    let seasonal = SeasonalTrendForecaster::new(&SeasonalConfig::default(), 0.95)
        .unwrap()
        .fit(&series, 14)
        .unwrap();
    let linear = LinearTrendForecaster::new(0.95).unwrap().fit(&series, 14).unwrap();

    let combiner = EnsembleCombiner::new(EnsembleWeights::default(), 0.5);
    let outcomes: Vec<(ModelKind, Result<ModelFitResult>)> = vec![
        (ModelKind::SeasonalTrend, Ok(seasonal.clone())),
        (ModelKind::LinearTrend, Ok(linear.clone())),
    ];
    let combined = combiner.combine(&outcomes).unwrap();

    assert_eq!(combined.points.len(), 14);
    for (step, point) in combined.points.iter().enumerate() {
        let narrowest = seasonal.points()[step].width().min(linear.points()[step].width());
        assert!(point.width() >= narrowest - 1e-9, "step {} too narrow", step);
        assert!(point.width() >= 1.0 - 1e-9);
        assert!(point.lower_bound() <= point.point_estimate());
        assert!(point.point_estimate() <= point.upper_bound());
    }
}
