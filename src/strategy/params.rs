//! Strategy Parameters
//!
//! Windows, thresholds and sizing for the pairs strategy.
//! Defaults follow the hourly cadence: 20-bar z-score windows, a 0.02
//! mean-reversion exit band and a -5% account stop loss.

use serde::{Deserialize, Serialize};

/// Main strategy configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyConfig {
    /// Minimum aligned observations for a cointegration estimate
    pub min_samples: usize,
    /// Rolling window for the mean z-score / half-life statistics
    pub zscore_window: usize,
    /// Trailing bars used for the live z-score while monitoring
    pub live_window: usize,
    /// Exit when |live z - mean z at entry| is within this band
    pub exit_tolerance: f64,
    /// Account PnL% at or below which the position is stopped out (negative)
    pub stop_loss_pct: f64,
    /// Fraction of total balance allocated to each leg
    pub leg_fraction: f64,
    /// Only enter when the best z-score is strictly below this value
    pub entry_zscore_max: Option<f64>,
    /// Keep only pairs whose test statistic beats the 5% critical value
    pub require_cointegration: bool,
    /// Number of pairs kept for ranking, by zero crossings
    pub max_candidates: usize,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            min_samples: 30,
            zscore_window: 20,
            live_window: 20,
            exit_tolerance: 0.02,
            stop_loss_pct: -5.0,
            leg_fraction: 0.5,
            entry_zscore_max: None,
            require_cointegration: true,
            max_candidates: 50,
        }
    }
}

impl StrategyConfig {
    /// Create a new config with a custom exit band
    pub fn with_exit_tolerance(mut self, tolerance: f64) -> Self {
        self.exit_tolerance = tolerance;
        self
    }

    /// Create a new config with a custom stop loss
    pub fn with_stop_loss_pct(mut self, pct: f64) -> Self {
        self.stop_loss_pct = pct;
        self
    }

    pub fn with_live_window(mut self, window: usize) -> Self {
        self.live_window = window;
        self
    }

    pub fn with_entry_zscore_max(mut self, z: f64) -> Self {
        self.entry_zscore_max = Some(z);
        self
    }

    /// Validate configuration parameters
    pub fn validate(&self) -> Result<(), ParamError> {
        if self.min_samples < 10 {
            return Err(ParamError::InvalidMinSamples(self.min_samples));
        }
        if self.zscore_window < 2 {
            return Err(ParamError::InvalidWindow("zscore_window", self.zscore_window));
        }
        if self.live_window < 2 {
            return Err(ParamError::InvalidWindow("live_window", self.live_window));
        }
        if !self.exit_tolerance.is_finite() || self.exit_tolerance < 0.0 {
            return Err(ParamError::InvalidExitTolerance(self.exit_tolerance));
        }
        if !self.stop_loss_pct.is_finite() || self.stop_loss_pct >= 0.0 || self.stop_loss_pct < -100.0 {
            return Err(ParamError::InvalidStopLoss(self.stop_loss_pct));
        }
        if !(self.leg_fraction > 0.0 && self.leg_fraction <= 0.5) {
            return Err(ParamError::InvalidLegFraction(self.leg_fraction));
        }
        if let Some(z) = self.entry_zscore_max {
            if !z.is_finite() {
                return Err(ParamError::InvalidEntryThreshold(z));
            }
        }
        if self.max_candidates == 0 {
            return Err(ParamError::InvalidMaxCandidates);
        }
        Ok(())
    }
}

/// Parameter validation errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum ParamError {
    #[error("Invalid min_samples: {0} (minimum 10)")]
    InvalidMinSamples(usize),
    #[error("Invalid {0}: {1} (minimum 2)")]
    InvalidWindow(&'static str, usize),
    #[error("Invalid exit tolerance: {0} (must be >= 0)")]
    InvalidExitTolerance(f64),
    #[error("Invalid stop loss: {0}% (must be -100 <= loss < 0)")]
    InvalidStopLoss(f64),
    #[error("Invalid leg fraction: {0} (must be 0 < fraction <= 0.5)")]
    InvalidLegFraction(f64),
    #[error("Invalid entry z-score threshold: {0}")]
    InvalidEntryThreshold(f64),
    #[error("max_candidates must be > 0")]
    InvalidMaxCandidates,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = StrategyConfig::default();
        assert_eq!(config.min_samples, 30);
        assert_eq!(config.live_window, 20);
        assert_eq!(config.exit_tolerance, 0.02);
        assert_eq!(config.stop_loss_pct, -5.0);
        assert_eq!(config.leg_fraction, 0.5);
        assert!(config.entry_zscore_max.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_builder() {
        let config = StrategyConfig::default()
            .with_exit_tolerance(0.05)
            .with_stop_loss_pct(-3.0)
            .with_live_window(30)
            .with_entry_zscore_max(-1.5);
        assert_eq!(config.exit_tolerance, 0.05);
        assert_eq!(config.stop_loss_pct, -3.0);
        assert_eq!(config.live_window, 30);
        assert_eq!(config.entry_zscore_max, Some(-1.5));
    }

    #[test]
    fn test_invalid_min_samples() {
        let mut config = StrategyConfig::default();
        config.min_samples = 5;
        assert!(matches!(config.validate(), Err(ParamError::InvalidMinSamples(5))));
    }

    #[test]
    fn test_invalid_stop_loss() {
        let config = StrategyConfig::default().with_stop_loss_pct(5.0);
        assert!(matches!(config.validate(), Err(ParamError::InvalidStopLoss(_))));
    }

    #[test]
    fn test_invalid_leg_fraction() {
        let mut config = StrategyConfig::default();
        config.leg_fraction = 0.6;
        assert!(matches!(config.validate(), Err(ParamError::InvalidLegFraction(_))));
        config.leg_fraction = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_windows() {
        let config = StrategyConfig::default().with_live_window(1);
        assert!(matches!(config.validate(), Err(ParamError::InvalidWindow("live_window", 1))));
    }
}
