//! Spread and Z-Score
//!
//! Spread of a pair is `a - hedge_ratio * b`. Three standardizations are used:
//! - full-sample z-score (population std) for the ranking row
//! - rolling z-score (sample std) for the mean / half-life statistics
//! - live z-score over the trailing bars while a position is monitored
//!   (sample std, so it sits on the same scale as the rolling z-score)
//!
//! Z-Score Formula: z = (spread - mean) / std

use super::stats::{is_zero_spread, mean, population_std, sample_std, StatsError};
use crate::domain::AlignedPrices;

/// Result of a windowed z-score calculation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZScoreResult {
    /// Current z-score value
    pub z_score: f64,
    /// Window mean of the spread
    pub mean: f64,
    /// Window standard deviation of the spread
    pub std_dev: f64,
    /// Spread of the latest bar
    pub current_spread: f64,
}

/// Pointwise `a - hedge_ratio * b`
pub fn spread(prices_a: &[f64], prices_b: &[f64], hedge_ratio: f64) -> Result<Vec<f64>, StatsError> {
    if prices_a.len() != prices_b.len() {
        return Err(StatsError::LengthMismatch(prices_a.len(), prices_b.len()));
    }
    if prices_a.is_empty() {
        return Err(StatsError::EmptySeries);
    }
    Ok(prices_a
        .iter()
        .zip(prices_b)
        .map(|(a, b)| a - hedge_ratio * b)
        .collect())
}

/// Standardize over the whole series. A flat series gives all zeros.
pub fn zscore(spread: &[f64]) -> Result<Vec<f64>, StatsError> {
    let m = mean(spread).ok_or(StatsError::EmptySeries)?;
    let std = population_std(spread, m);
    if is_zero_spread(std, m) {
        return Ok(vec![0.0; spread.len()]);
    }
    Ok(spread.iter().map(|s| (s - m) / std).collect())
}

/// Trailing-window z-score, absent until the window fills or when the
/// window is flat
pub fn rolling_zscore(spread: &[f64], window: usize) -> Vec<Option<f64>> {
    if window < 2 {
        return vec![None; spread.len()];
    }
    (0..spread.len())
        .map(|i| {
            if i + 1 < window {
                return None;
            }
            let slice = &spread[i + 1 - window..=i];
            let m = mean(slice)?;
            let std = sample_std(slice, m)?;
            if is_zero_spread(std, m) {
                return None;
            }
            Some((spread[i] - m) / std)
        })
        .collect()
}

/// Z-score of the latest bar against the trailing `window` bars, all
/// including the latest one, with the sample standard deviation. Matches
/// the last value of `rolling_zscore` over the same bars. A flat window
/// gives 0.0.
pub fn live_zscore(
    prices: &AlignedPrices,
    hedge_ratio: f64,
    window: usize,
) -> Result<ZScoreResult, StatsError> {
    if prices.len() < window || window < 2 {
        return Err(StatsError::InsufficientData {
            required: window.max(2),
            actual: prices.len(),
        });
    }
    let trailing = prices.tail(window);
    let spread = spread(&trailing.a, &trailing.b, hedge_ratio)?;
    let m = mean(&spread).ok_or(StatsError::EmptySeries)?;
    let std_dev = sample_std(&spread, m).ok_or(StatsError::InsufficientData {
        required: 2,
        actual: spread.len(),
    })?;
    let current_spread = *spread.last().ok_or(StatsError::EmptySeries)?;

    let z_score = if is_zero_spread(std_dev, m) {
        0.0
    } else {
        (current_spread - m) / std_dev
    };

    Ok(ZScoreResult {
        z_score,
        mean: m,
        std_dev,
        current_spread,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::test_series::SeriesGen;
    use approx::assert_relative_eq;
    use chrono::{Duration, TimeZone, Utc};

    fn aligned(a: Vec<f64>, b: Vec<f64>) -> AlignedPrices {
        let start = Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap();
        AlignedPrices {
            timestamps: (0..a.len() as i64).map(|h| start + Duration::hours(h)).collect(),
            a,
            b,
        }
    }

    #[test]
    fn test_spread_pointwise() {
        let s = spread(&[10.0, 12.0], &[4.0, 5.0], 2.0).unwrap();
        assert_eq!(s, vec![2.0, 2.0]);
        assert_eq!(spread(&[], &[], 1.0).unwrap_err(), StatsError::EmptySeries);
        assert_eq!(spread(&[1.0], &[], 1.0).unwrap_err(), StatsError::LengthMismatch(1, 0));
    }

    #[test]
    fn test_zscore_standardizes() {
        let mut gen = SeriesGen::new(21);
        let s = gen.random_walk(200, 5.0, 0.3);
        let z = zscore(&s).unwrap();

        let m = mean(&z).unwrap();
        assert_relative_eq!(m, 0.0, epsilon = 1e-10);
        assert_relative_eq!(population_std(&z, m), 1.0, epsilon = 1e-10);
    }

    #[test]
    fn test_zscore_idempotent() {
        let mut gen = SeriesGen::new(5);
        let s = gen.random_walk(100, 0.0, 1.0);
        let once = zscore(&s).unwrap();
        let twice = zscore(&once).unwrap();
        for (x, y) in once.iter().zip(&twice) {
            assert_relative_eq!(x, y, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_zscore_flat_and_empty() {
        assert_eq!(zscore(&[3.3; 10]).unwrap(), vec![0.0; 10]);
        assert_eq!(zscore(&[]).unwrap_err(), StatsError::EmptySeries);
    }

    #[test]
    fn test_rolling_zscore_warmup() {
        let s: Vec<f64> = (0..10).map(|i| (i % 3) as f64).collect();
        let z = rolling_zscore(&s, 4);
        assert!(z[..3].iter().all(Option::is_none));
        assert!(z[3..].iter().all(Option::is_some));
        assert!(rolling_zscore(&[1.0; 5], 3).iter().all(Option::is_none));
    }

    #[test]
    fn test_live_zscore_uses_trailing_window() {
        // Early history is noisy; the trailing window is a clean ramp
        let mut a: Vec<f64> = vec![500.0, -300.0, 800.0];
        a.extend((0..5).map(|i| 10.0 + i as f64));
        let b = vec![0.0; a.len()];
        let result = live_zscore(&aligned(a, b), 1.0, 5).unwrap();

        // Ramp 10..14: mean 12, sample std sqrt(2.5)
        assert_relative_eq!(result.mean, 12.0);
        assert_relative_eq!(result.current_spread, 14.0);
        assert_relative_eq!(result.std_dev, 2.5_f64.sqrt(), epsilon = 1e-12);
        assert_relative_eq!(result.z_score, 2.0 / 2.5_f64.sqrt(), epsilon = 1e-12);
    }

    #[test]
    fn test_live_zscore_matches_rolling_last_value() {
        // Alternating window: population and sample std differ by more
        // than the exit tolerance here
        let a: Vec<f64> = (0..20).map(|i| if i % 2 == 0 { 1.0 } else { -1.0 }).chain([0.9]).collect();
        let b = vec![0.0; a.len()];
        let live = live_zscore(&aligned(a.clone(), b.clone()), 1.0, 20).unwrap();

        let s = spread(&a, &b, 1.0).unwrap();
        let rolling = rolling_zscore(&s, 20);
        let last = rolling.last().copied().flatten().unwrap();
        assert_relative_eq!(live.z_score, last, epsilon = 1e-12);

        let m = mean(&s[s.len() - 20..]).unwrap();
        let pop = (0.9 - m) / population_std(&s[s.len() - 20..], m);
        assert!((pop - live.z_score).abs() > 0.02);
    }

    #[test]
    fn test_live_zscore_flat_window_is_zero() {
        let a: Vec<f64> = (0..25).map(|i| 2.0 * i as f64 + 1.0).collect();
        let b: Vec<f64> = (0..25).map(|i| i as f64).collect();
        let result = live_zscore(&aligned(a, b), 2.0, 20).unwrap();
        assert_eq!(result.z_score, 0.0);
    }

    #[test]
    fn test_live_zscore_short_history() {
        let err = live_zscore(&aligned(vec![1.0; 5], vec![1.0; 5]), 1.0, 20).unwrap_err();
        assert_eq!(err, StatsError::InsufficientData { required: 20, actual: 5 });
        let err = live_zscore(&aligned(vec![1.0; 5], vec![1.0; 5]), 1.0, 1).unwrap_err();
        assert_eq!(err, StatsError::InsufficientData { required: 2, actual: 5 });
    }
}
