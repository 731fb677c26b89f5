//! Cointegration Estimator
//!
//! Engle-Granger two-step test for a pair of aligned price series:
//! 1. OLS of `a` on `b` with an intercept; its residuals feed the test
//! 2. Augmented Dickey-Fuller on those residuals, no deterministic terms,
//!    lag order chosen by AIC
//!
//! The traded hedge ratio is the separate through-origin slope of `a` on
//! `b`, and zero crossings are counted on the spread it produces.
//!
//! Critical values and p-values use MacKinnon's response surfaces for two
//! variables with a constant in the cointegrating regression.
//!
//! `coint_flag` is set only when the ADF statistic is strictly below the
//! 5% critical value.

use statrs::function::erf::erf;
use tracing::debug;

use super::stats::{ensure_finite, least_squares, ols_through_origin, simple_ols, StatsError};
use crate::domain::{AlignedPrices, CointegrationResult};

/// Smallest aligned sample accepted by `estimate`
pub const MIN_SAMPLES: usize = 30;

/// MacKinnon (2010) critical value coefficients, N = 2, constant term.
/// Rows are the 1%, 5% and 10% levels; value = c0 + c1/T + c2/T^2.
const CRIT_1PCT: [f64; 3] = [-3.89644, -10.9519, -22.527];
const CRIT_5PCT: [f64; 3] = [-3.33613, -6.1101, -6.823];
const CRIT_10PCT: [f64; 3] = [-3.04445, -4.2412, -2.720];

/// MacKinnon (1994) p-value surface, N = 2, constant term
const TAU_MAX: f64 = 0.92;
const TAU_MIN: f64 = -18.86;
const TAU_STAR: f64 = -2.62;
const TAU_SMALLP: [f64; 3] = [2.92, 1.5012, 0.039796];
const TAU_LARGEP: [f64; 4] = [2.1945, 0.64695, -0.29198, -0.042377];

/// Critical values of the residual-based test at the usual levels
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CriticalValues {
    pub one_pct: f64,
    pub five_pct: f64,
    pub ten_pct: f64,
}

impl CriticalValues {
    /// Finite-sample critical values for `nobs` observations
    pub fn for_nobs(nobs: usize) -> Self {
        let surface = |c: [f64; 3]| {
            let inv = 1.0 / nobs as f64;
            c[0] + c[1] * inv + c[2] * inv * inv
        };
        Self {
            one_pct: surface(CRIT_1PCT),
            five_pct: surface(CRIT_5PCT),
            ten_pct: surface(CRIT_10PCT),
        }
    }
}

/// Augmented Dickey-Fuller regression output
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdfOutcome {
    pub t_statistic: f64,
    pub used_lag: usize,
    pub nobs: usize,
}

/// Engle-Granger estimator with a configurable minimum sample
#[derive(Debug, Clone, Copy)]
pub struct CointegrationEstimator {
    min_samples: usize,
}

impl Default for CointegrationEstimator {
    fn default() -> Self {
        Self {
            min_samples: MIN_SAMPLES,
        }
    }
}

impl CointegrationEstimator {
    /// The ADF lag search needs at least 10 points whatever is requested
    pub fn new(min_samples: usize) -> Self {
        Self {
            min_samples: min_samples.max(10),
        }
    }

    pub fn min_samples(&self) -> usize {
        self.min_samples
    }

    pub fn estimate_aligned(&self, prices: &AlignedPrices) -> Result<CointegrationResult, StatsError> {
        self.estimate(&prices.a, &prices.b)
    }

    /// Test `prices_a` against `prices_b`; both must already be aligned
    pub fn estimate(&self, prices_a: &[f64], prices_b: &[f64]) -> Result<CointegrationResult, StatsError> {
        if prices_a.len() != prices_b.len() {
            return Err(StatsError::LengthMismatch(prices_a.len(), prices_b.len()));
        }
        if prices_a.is_empty() {
            return Err(StatsError::EmptySeries);
        }
        let n = prices_a.len();
        if n < self.min_samples {
            return Err(StatsError::InsufficientData {
                required: self.min_samples,
                actual: n,
            });
        }
        ensure_finite(prices_a)?;
        ensure_finite(prices_b)?;

        let fit = simple_ols(prices_a, prices_b)?;
        let residuals: Vec<f64> = prices_a
            .iter()
            .zip(prices_b)
            .map(|(a, b)| a - fit.intercept - fit.slope * b)
            .collect();
        let hedge_ratio = ols_through_origin(prices_a, prices_b)?;
        let spread: Vec<f64> = prices_a
            .iter()
            .zip(prices_b)
            .map(|(a, b)| a - hedge_ratio * b)
            .collect();

        let adf = adf_no_constant(&residuals)?;
        let critical = CriticalValues::for_nobs(n - 1);
        let p_value = mackinnon_p_value(adf.t_statistic);

        debug!(
            "Engle-Granger: n={} hr={:.4} t={:.3} crit5={:.3} p={:.4} lag={}",
            n, hedge_ratio, adf.t_statistic, critical.five_pct, p_value, adf.used_lag
        );

        Ok(CointegrationResult {
            hedge_ratio,
            p_value,
            t_statistic: adf.t_statistic,
            critical_value_5pct: critical.five_pct,
            zero_crossings: zero_crossings(&spread),
            coint_flag: adf.t_statistic < critical.five_pct,
        })
    }
}

/// Convenience wrapper with the default minimum sample
pub fn estimate(prices_a: &[f64], prices_b: &[f64]) -> Result<CointegrationResult, StatsError> {
    CointegrationEstimator::default().estimate(prices_a, prices_b)
}

/// Schwert's rule, capped so the largest lag still leaves a usable regression
pub fn default_max_lag(n: usize) -> usize {
    let schwert = (12.0 * (n as f64 / 100.0).powf(0.25)).ceil() as usize;
    schwert.min((n / 2).saturating_sub(1))
}

/// ADF t-statistic of `x` with no constant or trend, AIC lag selection
pub fn adf_no_constant(x: &[f64]) -> Result<AdfOutcome, StatsError> {
    let n = x.len();
    if n < 10 {
        return Err(StatsError::InsufficientData { required: 10, actual: n });
    }
    let diffs: Vec<f64> = x.windows(2).map(|w| w[1] - w[0]).collect();
    let max_lag = default_max_lag(n);

    // Every candidate lag is fitted on the same sample so AIC values compare
    let mut best: Option<(f64, usize)> = None;
    for lag in 0..=max_lag {
        let (rows, y) = adf_design(x, &diffs, lag, max_lag);
        let aic = match least_squares(&rows, &y) {
            Ok(fit) => fit.aic(),
            Err(_) => continue,
        };
        if best.map_or(true, |(best_aic, _)| aic < best_aic) {
            best = Some((aic, lag));
        }
    }
    let (_, used_lag) = best.ok_or_else(|| {
        StatsError::DegenerateRegression("no ADF lag order could be fitted".into())
    })?;

    let (rows, y) = adf_design(x, &diffs, used_lag, used_lag);
    let fit = least_squares(&rows, &y)?;
    Ok(AdfOutcome {
        t_statistic: fit.t_value(0),
        used_lag,
        nobs: fit.nobs,
    })
}

/// Rows `[x_t, dx_{t-1}, .., dx_{t-lag}]` against `dx_t`, starting at `dx[start]`
fn adf_design(x: &[f64], diffs: &[f64], lag: usize, start: usize) -> (Vec<Vec<f64>>, Vec<f64>) {
    let mut rows = Vec::with_capacity(diffs.len().saturating_sub(start));
    let mut y = Vec::with_capacity(rows.capacity());
    for t in start..diffs.len() {
        let mut row = Vec::with_capacity(lag + 1);
        row.push(x[t]);
        row.extend((1..=lag).map(|k| diffs[t - k]));
        rows.push(row);
        y.push(diffs[t]);
    }
    (rows, y)
}

/// Approximate p-value of the residual-based test statistic
pub fn mackinnon_p_value(t_statistic: f64) -> f64 {
    if t_statistic.is_nan() {
        return f64::NAN;
    }
    if t_statistic > TAU_MAX {
        return 1.0;
    }
    if t_statistic < TAU_MIN {
        return 0.0;
    }
    let z = if t_statistic <= TAU_STAR {
        polyval(&TAU_SMALLP, t_statistic)
    } else {
        polyval(&TAU_LARGEP, t_statistic)
    };
    normal_cdf(z)
}

fn polyval(coefficients: &[f64], x: f64) -> f64 {
    coefficients.iter().rev().fold(0.0, |acc, c| acc * x + c)
}

fn normal_cdf(z: f64) -> f64 {
    0.5 * (1.0 + erf(z / f64::sqrt(2.0)))
}

/// Sign changes of a series; exact zeros do not break a run
pub fn zero_crossings(series: &[f64]) -> usize {
    let mut crossings = 0;
    let mut last_sign = 0.0;
    for v in series {
        if *v == 0.0 {
            continue;
        }
        let sign = v.signum();
        if last_sign != 0.0 && sign != last_sign {
            crossings += 1;
        }
        last_sign = sign;
    }
    crossings
}
