//! Strategy Layer - Cointegration Statistics and Pair Selection
//!
//! Pure computations over aligned price series:
//! - Engle-Granger cointegration test with OLS hedge ratio
//! - Spread z-scores (full sample, rolling and live trailing window)
//! - Mean-reversion half-life
//! - Most-negative z-score pair ranking
//!
//! Nothing here touches the network or the filesystem.

pub mod params;
pub mod stats;
pub mod cointegration;
pub mod zscore;
pub mod half_life;
pub mod ranker;

#[cfg(test)]
pub(crate) mod test_series;

pub use params::{ParamError, StrategyConfig};
pub use stats::StatsError;
pub use cointegration::{estimate, CointegrationEstimator, CriticalValues, MIN_SAMPLES};
pub use zscore::{live_zscore, rolling_zscore, spread, zscore, ZScoreResult};
pub use half_life::{half_life, reversion_stats, ReversionStats};
pub use ranker::{latest_sorted, select_best, RankError, RankedPair};
