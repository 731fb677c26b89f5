//! Mean-reversion half-life
//!
//! Fits `Δz_t = α + β z_{t-1}` and reports `t_1/2 = -ln(2) / β` in bars.
//! A non-negative β means the series does not revert and has no half-life.

use super::stats::{simple_ols, StatsError};

/// Summary of a z-score history for one pair
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReversionStats {
    pub mean_zscore: f64,
    pub half_life: Option<f64>,
}

/// Half-life in bars of `series`
pub fn half_life(series: &[f64]) -> Result<Option<f64>, StatsError> {
    if series.len() < 3 {
        return Err(StatsError::InsufficientData {
            required: 3,
            actual: series.len(),
        });
    }
    let lagged = &series[..series.len() - 1];
    let delta: Vec<f64> = series.windows(2).map(|w| w[1] - w[0]).collect();

    let beta = simple_ols(&delta, lagged)?.slope;
    if beta >= 0.0 {
        return Ok(None);
    }
    Ok(Some(-std::f64::consts::LN_2 / beta))
}

/// Mean and half-life over the present values of a z-score history
pub fn reversion_stats(history: &[Option<f64>]) -> Result<ReversionStats, StatsError> {
    let values: Vec<f64> = history.iter().flatten().copied().filter(|v| v.is_finite()).collect();
    if values.is_empty() {
        return Err(StatsError::EmptySeries);
    }
    let mean_zscore = values.iter().sum::<f64>() / values.len() as f64;
    // A flat history has a mean but no measurable reversion speed
    let half_life = match half_life(&values) {
        Ok(h) => h,
        Err(StatsError::DegenerateRegression(_)) | Err(StatsError::InsufficientData { .. }) => None,
        Err(e) => return Err(e),
    };
    Ok(ReversionStats {
        mean_zscore,
        half_life,
    })
}
