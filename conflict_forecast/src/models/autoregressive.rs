//! ARIMA forecaster with automatic order selection

use crate::config::AutoregressiveConfig;
use crate::data::TimeSeries;
use crate::error::{ForecastError, Result};
use crate::models::linear_trend::LinearTrendForecaster;
use crate::models::{
    prepare, FitDeadline, ForecastModel, ForecastPoint, ModelFitResult, ModelKind,
    ModelParameters,
};
use forecast_math::arma::{is_invertible_ma, is_stationary_ar, psi_weights};
use forecast_math::differencing::{adf_test, difference, integrate};
use forecast_math::optimize::{nelder_mead, NelderMeadConfig};
use forecast_math::regression::least_squares;
use forecast_math::stats::{mean, std_dev, two_sided_z};

/// Minimum number of periods before an autoregressive fit is attempted
const MIN_PERIODS: usize = 10;

/// ARIMA(p, d, q) fitted by conditional sum of squares
///
/// `d` is the smallest number of differences (up to `max_differences`) after which the
/// augmented Dickey-Fuller test rejects a unit root. Every `(p, q)` up to the configured
/// maxima is then fitted and the converged candidate with the lowest AIC wins. When no
/// candidate converges the linear trend output is returned in its place, marked as a
/// fallback.
#[derive(Debug, Clone)]
pub struct AutoregressiveForecaster {
    max_p: usize,
    max_q: usize,
    max_differences: usize,
    adf_max_lags: Option<usize>,
    optimizer: NelderMeadConfig,
    confidence_level: f64,
    deadline: Option<FitDeadline>,
}

impl AutoregressiveForecaster {
    pub fn new(config: &AutoregressiveConfig, confidence_level: f64) -> Result<Self> {
        if !(confidence_level > 0.0 && confidence_level < 1.0) {
            return Err(ForecastError::InvalidParameter(format!(
                "Confidence level must be in (0, 1), got {}",
                confidence_level
            )));
        }
        if config.max_differences > 2 {
            return Err(ForecastError::InvalidParameter(format!(
                "At most 2 differences are supported, got {}",
                config.max_differences
            )));
        }

        Ok(Self {
            max_p: config.max_p,
            max_q: config.max_q,
            max_differences: config.max_differences,
            adf_max_lags: config.adf_max_lags,
            optimizer: NelderMeadConfig {
                max_iter: config.max_iterations.max(1),
                ..NelderMeadConfig::default()
            },
            confidence_level,
            deadline: None,
        })
    }

    /// Give up with a timeout once `deadline` passes, mid-optimisation included
    pub fn with_deadline(mut self, deadline: FitDeadline) -> Self {
        self.optimizer.deadline = Some(deadline.at());
        self.deadline = Some(deadline);
        self
    }

    fn check_deadline(&self) -> Result<()> {
        match &self.deadline {
            Some(deadline) => deadline.check(ModelKind::Autoregressive),
            None => Ok(()),
        }
    }

    /// Differencing order chosen by repeated unit-root tests
    pub fn select_differences(&self, values: &[f64]) -> usize {
        let mut d = 0;
        while d < self.max_differences {
            match adf_test(&difference(values, d), self.adf_max_lags) {
                Ok(result) if result.is_stationary => break,
                Ok(_) => d += 1,
                Err(e) => {
                    log::debug!("Unit-root test unavailable at d = {}: {}", d, e);
                    break;
                }
            }
        }
        d
    }

    fn fallback(
        &self,
        series: &TimeSeries,
        horizon: usize,
        reason: &str,
    ) -> Result<ModelFitResult> {
        log::warn!(
            "No autoregressive order converged for {} ({}), substituting linear trend",
            series.location(),
            reason
        );
        let linear = LinearTrendForecaster::new(self.confidence_level)?.fit(series, horizon)?;
        Ok(ModelFitResult::substitute(ModelKind::Autoregressive, linear))
    }
}

/// A fitted candidate order
#[derive(Debug, Clone)]
struct ArmaFit {
    p: usize,
    q: usize,
    intercept: f64,
    ar: Vec<f64>,
    ma: Vec<f64>,
    css: f64,
    sigma2: f64,
    aic: f64,
    residuals: Vec<f64>,
}

/// Residuals of a zero-mean ARMA recursion, zero before `start`
fn arma_residuals(z: &[f64], ar: &[f64], ma: &[f64], start: usize) -> Vec<f64> {
    let mut e = vec![0.0; z.len()];
    for t in start..z.len() {
        let mut value = z[t];
        for (i, phi) in ar.iter().enumerate() {
            value -= phi * z[t - 1 - i];
        }
        for (j, theta) in ma.iter().enumerate() {
            if t > j {
                value -= theta * e[t - 1 - j];
            }
        }
        e[t] = value;
    }
    e
}

/// Hannan-Rissanen style starting values: a long autoregression estimates the shocks,
/// then `z_t` is regressed on its own lags and the lagged shocks.
fn initial_coefficients(z: &[f64], p: usize, q: usize) -> (Vec<f64>, Vec<f64>) {
    let zeros = || (vec![0.0; p], vec![0.0; q]);
    if p + q == 0 {
        return zeros();
    }

    let long = (p.max(q) + 3).min(z.len() / 4);
    if long == 0 {
        return zeros();
    }
    let long_rows: Vec<Vec<f64>> = (long..z.len())
        .map(|t| (1..=long).map(|i| z[t - i]).collect())
        .collect();
    let Ok(long_fit) = least_squares(&long_rows, &z[long..]) else {
        return zeros();
    };
    let mut shocks = vec![0.0; z.len()];
    for (offset, row) in long_rows.iter().enumerate() {
        shocks[long + offset] = z[long + offset] - long_fit.predict_row(row);
    }

    let start = long + q.max(p);
    if z.len() <= start + p + q + 1 {
        return zeros();
    }
    let rows: Vec<Vec<f64>> = (start..z.len())
        .map(|t| {
            (1..=p)
                .map(|i| z[t - i])
                .chain((1..=q).map(|j| shocks[t - j]))
                .collect()
        })
        .collect();
    let Ok(fit) = least_squares(&rows, &z[start..]) else {
        return zeros();
    };

    let ar = fit.coefficients[..p].to_vec();
    let ma = fit.coefficients[p..].to_vec();
    let ar = if is_stationary_ar(&ar) { ar } else { vec![0.0; p] };
    let ma = if is_invertible_ma(&ma) { ma } else { vec![0.0; q] };
    (ar, ma)
}

impl AutoregressiveForecaster {
    /// Fit one `(p, q)` on the differenced series; `None` when it fails to converge
    fn fit_order(
        &self,
        w: &[f64],
        p: usize,
        q: usize,
        start: usize,
        d: usize,
    ) -> Option<ArmaFit> {
        let m = w.len().checked_sub(start)?;
        let k = p + q + 1;
        if m < k + 3 {
            return None;
        }

        // A constant only makes sense up to one difference; beyond that it is a
        // polynomial trend of degree two or more.
        let with_intercept = d < 2;
        let centre = if with_intercept { mean(w) } else { 0.0 };
        let spread = std_dev(w).max(1.0);

        let z0: Vec<f64> = w.iter().map(|v| v - centre).collect();
        let (ar0, ma0) = initial_coefficients(&z0, p, q);

        let offset = usize::from(with_intercept);
        let unpack = |x: &[f64]| -> (f64, Vec<f64>, Vec<f64>) {
            let mu = if with_intercept { x[0] } else { 0.0 };
            (mu, x[offset..offset + p].to_vec(), x[offset + p..].to_vec())
        };
        let css_at = |x: &[f64]| -> f64 {
            let (mu, ar, ma) = unpack(x);
            if !is_stationary_ar(&ar) || !is_invertible_ma(&ma) {
                return f64::INFINITY;
            }
            let z: Vec<f64> = w.iter().map(|v| v - mu).collect();
            arma_residuals(&z, &ar, &ma, start)[start..]
                .iter()
                .map(|e| e * e)
                .sum()
        };

        let mut initial = Vec::with_capacity(offset + p + q);
        let mut bounds = Vec::with_capacity(offset + p + q);
        if with_intercept {
            initial.push(centre);
            bounds.push((centre - 10.0 * spread, centre + 10.0 * spread));
        }
        initial.extend(ar0);
        initial.extend(ma0);
        bounds.extend(std::iter::repeat((-2.5, 2.5)).take(p + q));

        let result = nelder_mead(css_at, &initial, Some(&bounds), self.optimizer);
        let (mu, ar, ma) = unpack(&result.point);

        let converged = result.converged
            && result.value.is_finite()
            && is_stationary_ar(&ar)
            && is_invertible_ma(&ma);
        if !converged {
            log::debug!(
                "ARMA({}, {}) did not converge after {} iterations",
                p,
                q,
                result.iterations
            );
            return None;
        }

        let css = result.value;
        let mf = m as f64;
        // Floor relative to the data scale so exact fits compare on parameter count alone
        let floor = 1e-12 * spread * spread;
        let aic = mf * (css / mf).max(floor).ln() + 2.0 * k as f64;
        let sigma2 = css / (m.saturating_sub(k).max(1)) as f64;

        let z: Vec<f64> = w.iter().map(|v| v - mu).collect();
        let residuals = arma_residuals(&z, &ar, &ma, start);

        Some(ArmaFit {
            p,
            q,
            intercept: mu,
            ar,
            ma,
            css,
            sigma2,
            aic,
            residuals,
        })
    }
}

impl ForecastModel for AutoregressiveForecaster {
    fn kind(&self) -> ModelKind {
        ModelKind::Autoregressive
    }

    fn fit(&self, series: &TimeSeries, horizon: usize) -> Result<ModelFitResult> {
        let periods = prepare(series, horizon, MIN_PERIODS)?;
        let values = series.values();

        let d = self.select_differences(&values);
        let w = difference(&values, d);
        // Every candidate conditions on the same leading values so AIC is comparable
        let start = self.max_p;

        let mut best: Option<ArmaFit> = None;
        for p in 0..=self.max_p {
            for q in 0..=self.max_q {
                self.check_deadline()?;
                let Some(candidate) = self.fit_order(&w, p, q, start, d) else {
                    continue;
                };
                if best.as_ref().map_or(true, |b| candidate.aic < b.aic) {
                    best = Some(candidate);
                }
            }
        }

        // A search cut short by the deadline is not a convergence failure
        self.check_deadline()?;
        let Some(fit) = best else {
            return self.fallback(series, horizon, "every candidate order failed");
        };
        log::debug!(
            "Selected ARIMA({}, {}, {}) for {} with AIC {:.3} and CSS {:.3}",
            fit.p,
            d,
            fit.q,
            series.location(),
            fit.aic,
            fit.css
        );

        // Recursive forecast on the differenced scale, future shocks at zero
        let mut z: Vec<f64> = w.iter().map(|v| v - fit.intercept).collect();
        let mut shocks = fit.residuals.clone();
        let mut future = Vec::with_capacity(horizon);
        for _ in 0..horizon {
            let t = z.len();
            let mut next = 0.0;
            for (i, phi) in fit.ar.iter().enumerate() {
                if t > i {
                    next += phi * z[t - 1 - i];
                }
            }
            for (j, theta) in fit.ma.iter().enumerate() {
                if t > j {
                    next += theta * shocks[t - 1 - j];
                }
            }
            z.push(next);
            shocks.push(0.0);
            future.push(next + fit.intercept);
        }
        let forecast = integrate(&future, &values, d);

        let z_score = two_sided_z(self.confidence_level)?;
        let psi = psi_weights(&fit.ar, &fit.ma, d, horizon);
        let mut cumulative = 0.0;
        let mut points = Vec::with_capacity(horizon);
        for ((period_start, estimate), weight) in periods.into_iter().zip(forecast).zip(psi) {
            cumulative += weight * weight;
            let half_width = z_score * (fit.sigma2 * cumulative).sqrt();
            points.push(ForecastPoint::new(period_start, estimate, half_width)?);
        }

        Ok(ModelFitResult::new(
            ModelKind::Autoregressive,
            ModelParameters::Autoregressive {
                p: fit.p,
                d,
                q: fit.q,
                intercept: fit.intercept,
                ar: fit.ar,
                ma: fit.ma,
                aic: fit.aic,
                sigma2: fit.sigma2,
            },
            points,
            true,
        ))
    }
}
