use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use super::pair::PairKey;

/// Why the monitor stopped watching a position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExitReason {
    StopLoss,
    MeanReversion,
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitReason::StopLoss => write!(f, "STOP_LOSS"),
            ExitReason::MeanReversion => write!(f, "MEAN_REVERSION"),
        }
    }
}

/// Monitor state machine phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorPhase {
    Monitoring,
    ExitSignaled(ExitReason),
}

/// Snapshot rebuilt on every poll, never persisted
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MonitorState {
    pub pnl_pct: f64,
    pub current_zscore: Option<f64>,
    pub last_poll_time: DateTime<Utc>,
}

/// The single open long/short pair position
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairPosition {
    /// Orientation used for the spread (`first - hedge_ratio * second`)
    pub spread_key: PairKey,
    pub long_symbol: String,
    pub short_symbol: String,
    pub hedge_ratio: f64,
    pub mean_zscore_at_entry: f64,
    /// Ranking z-score that triggered the entry
    pub entry_zscore: f64,
    pub entry_time: DateTime<Utc>,
    pub notional_long: f64,
    pub notional_short: f64,
}

#[derive(Debug, Error, PartialEq)]
pub enum PositionError {
    #[error("Long and short legs must differ, got {0} for both")]
    SameLeg(String),
    #[error("Legs {long}/{short} do not match spread pair {pair}")]
    LegMismatch { long: String, short: String, pair: String },
    #[error("Invalid notional: {0}")]
    InvalidNotional(f64),
    #[error("Invalid hedge ratio: {0}")]
    InvalidHedgeRatio(f64),
    #[error("Invalid mean z-score: {0}")]
    InvalidMeanZScore(f64),
}

impl PairPosition {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        spread_key: PairKey,
        long_symbol: String,
        short_symbol: String,
        hedge_ratio: f64,
        mean_zscore_at_entry: f64,
        entry_zscore: f64,
        entry_time: DateTime<Utc>,
        notional_long: f64,
        notional_short: f64,
    ) -> Result<Self, PositionError> {
        if long_symbol == short_symbol {
            return Err(PositionError::SameLeg(long_symbol));
        }
        if !spread_key.contains(&long_symbol) || !spread_key.contains(&short_symbol) {
            return Err(PositionError::LegMismatch {
                long: long_symbol,
                short: short_symbol,
                pair: spread_key.label(),
            });
        }
        for notional in [notional_long, notional_short] {
            if !notional.is_finite() || notional <= 0.0 {
                return Err(PositionError::InvalidNotional(notional));
            }
        }
        if !hedge_ratio.is_finite() {
            return Err(PositionError::InvalidHedgeRatio(hedge_ratio));
        }
        if !mean_zscore_at_entry.is_finite() {
            return Err(PositionError::InvalidMeanZScore(mean_zscore_at_entry));
        }

        Ok(Self {
            spread_key,
            long_symbol,
            short_symbol,
            hedge_ratio,
            mean_zscore_at_entry,
            entry_zscore,
            entry_time,
            notional_long,
            notional_short,
        })
    }

    pub fn symbols(&self) -> [&str; 2] {
        [self.long_symbol.as_str(), self.short_symbol.as_str()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn key() -> PairKey {
        PairKey::new("ALTUSDT", "ZILUSDT").unwrap()
    }

    fn entry_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 12, 1, 0).unwrap()
    }

    #[test]
    fn test_new_position() {
        let position = PairPosition::new(
            key(), "ALTUSDT".into(), "ZILUSDT".into(), 1.7, 0.12, -2.3, entry_time(), 50.0, 50.0,
        )
        .unwrap();
        assert_eq!(position.notional_long + position.notional_short, 100.0);
        assert_eq!(position.symbols(), ["ALTUSDT", "ZILUSDT"]);
    }

    #[test]
    fn test_rejects_same_leg() {
        let result = PairPosition::new(
            key(), "ALTUSDT".into(), "ALTUSDT".into(), 1.0, 0.0, 0.0, entry_time(), 1.0, 1.0,
        );
        assert!(matches!(result, Err(PositionError::SameLeg(_))));
    }

    #[test]
    fn test_rejects_foreign_leg() {
        let result = PairPosition::new(
            key(), "ALTUSDT".into(), "BTCUSDT".into(), 1.0, 0.0, 0.0, entry_time(), 1.0, 1.0,
        );
        assert!(matches!(result, Err(PositionError::LegMismatch { .. })));
    }

    #[test]
    fn test_rejects_invalid_numbers() {
        let result = PairPosition::new(
            key(), "ALTUSDT".into(), "ZILUSDT".into(), 1.0, 0.0, 0.0, entry_time(), 0.0, 1.0,
        );
        assert!(matches!(result, Err(PositionError::InvalidNotional(_))));

        let result = PairPosition::new(
            key(), "ALTUSDT".into(), "ZILUSDT".into(), f64::INFINITY, 0.0, 0.0, entry_time(), 1.0, 1.0,
        );
        assert!(matches!(result, Err(PositionError::InvalidHedgeRatio(_))));

        let result = PairPosition::new(
            key(), "ALTUSDT".into(), "ZILUSDT".into(), 1.0, f64::NAN, 0.0, entry_time(), 1.0, 1.0,
        );
        assert!(matches!(result, Err(PositionError::InvalidMeanZScore(_))));
    }

    #[test]
    fn test_exit_reason_display() {
        assert_eq!(ExitReason::StopLoss.to_string(), "STOP_LOSS");
        assert_eq!(ExitReason::MeanReversion.to_string(), "MEAN_REVERSION");
    }
}
