//! Candidate Refresh Pipeline
//!
//! Sequential stages run at the start of every hourly cycle:
//! 1. Prices: close series for every universe symbol
//! 2. Cointegration: Engle-Granger over every symbol pair, best by zero crossings
//! 3. Ranking: append the latest full-sample z-score of each kept pair
//! 4. Mean / half-life: rolling z-score statistics per kept pair
//!
//! Each stage persists its table through the `StatsStore` before the next
//! one starts. A stage failure aborts the refresh.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::domain::{
    align, AlignedPrices, CointegrationRecord, CointegrationTable, PairKey, PairStats,
    PairStatsTable, PricePoint, PriceSeries, TableError,
};
use crate::ports::{with_timeout, ExchangePort, StatsStore, StoreError};
use crate::strategy::{reversion_stats, rolling_zscore, spread, zscore, CointegrationEstimator, StrategyConfig};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Only {loaded} symbols have usable prices (need 2)")]
    NotEnoughSymbols { loaded: usize },

    #[error("No cointegrated pairs among {tested} tested")]
    NoCointegratedPairs { tested: usize },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Ranking table error: {0}")]
    Table(#[from] TableError),
}

/// Which symbols to scan and how much history to pull
#[derive(Debug, Clone)]
pub struct UniverseSettings {
    pub symbols: Vec<String>,
    pub timeframe: String,
    pub history_bars: usize,
}

/// Everything one refresh produced
#[derive(Debug, Clone)]
pub struct EvaluationSnapshot {
    pub evaluated_at: DateTime<Utc>,
    pub symbols_loaded: usize,
    pub pairs_tested: usize,
    pub cointegration: CointegrationTable,
    /// Latest z-score per kept pair, in cointegration table order
    pub ranking_row: Vec<(PairKey, f64)>,
    pub pair_stats: PairStatsTable,
}

pub struct CandidatePipeline {
    exchange: Arc<dyn ExchangePort>,
    store: Arc<dyn StatsStore>,
    universe: UniverseSettings,
    strategy: StrategyConfig,
    estimator: CointegrationEstimator,
    request_timeout: Duration,
}

impl CandidatePipeline {
    pub fn new(
        exchange: Arc<dyn ExchangePort>,
        store: Arc<dyn StatsStore>,
        universe: UniverseSettings,
        strategy: StrategyConfig,
    ) -> Self {
        let estimator = CointegrationEstimator::new(strategy.min_samples);
        Self {
            exchange,
            store,
            universe,
            strategy,
            estimator,
            request_timeout: Duration::from_secs(10),
        }
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Run all stages for an evaluation stamped `now`
    pub async fn refresh(&self, now: DateTime<Utc>) -> Result<EvaluationSnapshot, PipelineError> {
        let series = self.load_prices().await;
        if series.len() < 2 {
            return Err(PipelineError::NotEnoughSymbols { loaded: series.len() });
        }

        let (kept, tested) = self.cointegrated_pairs(&series);
        if kept.is_empty() {
            return Err(PipelineError::NoCointegratedPairs { tested });
        }
        let cointegration = CointegrationTable::new(
            now,
            kept.iter().map(|(record, _)| record.clone()).collect(),
        );
        self.store.save_cointegration(&cointegration)?;
        info!(
            "Cointegration: {} of {} pairs kept from {} symbols",
            cointegration.len(),
            tested,
            series.len()
        );

        let mut ranking_row = Vec::with_capacity(kept.len());
        let mut stats = Vec::with_capacity(kept.len());
        for (record, prices) in &kept {
            let pair_spread = match spread(&prices.a, &prices.b, record.result.hedge_ratio) {
                Ok(s) => s,
                Err(e) => {
                    warn!("Skipping {} spread: {}", record.pair, e);
                    continue;
                }
            };

            match zscore(&pair_spread) {
                Ok(z) => {
                    if let Some(last) = z.last() {
                        ranking_row.push((record.pair.clone(), *last));
                    }
                }
                Err(e) => warn!("Skipping {} z-score: {}", record.pair, e),
            }

            let rolling = rolling_zscore(&pair_spread, self.strategy.zscore_window);
            match reversion_stats(&rolling) {
                Ok(r) => stats.push(PairStats {
                    pair: record.pair.clone(),
                    mean_zscore: r.mean_zscore,
                    half_life: r.half_life,
                }),
                Err(e) => warn!("No mean z-score for {}: {}", record.pair, e),
            }
        }

        let mut candidates = self.store.load_candidates()?;
        candidates.append_row(now, &ranking_row)?;
        self.store.save_candidates(&candidates)?;
        info!(
            "Ranking: appended row {} with {} pairs ({} rows total)",
            now,
            ranking_row.len(),
            candidates.rows().len()
        );

        let pair_stats = PairStatsTable::new(now, stats);
        self.store.save_pair_stats(&pair_stats)?;
        debug!("Mean / half-life stored for {} pairs", pair_stats.entries.len());

        Ok(EvaluationSnapshot {
            evaluated_at: now,
            symbols_loaded: series.len(),
            pairs_tested: tested,
            cointegration,
            ranking_row,
            pair_stats,
        })
    }

    /// Close-price series per symbol; failed symbols are skipped
    async fn load_prices(&self) -> Vec<PriceSeries> {
        let mut seen = HashSet::new();
        let mut series = Vec::new();
        for symbol in &self.universe.symbols {
            if !seen.insert(symbol.as_str()) {
                continue;
            }
            let candles = match with_timeout(
                self.request_timeout,
                self.exchange
                    .fetch_ohlcv(symbol, &self.universe.timeframe, self.universe.history_bars),
            )
            .await
            {
                Ok(c) => c,
                Err(e) => {
                    warn!("Skipping {}: failed to fetch candles: {}", symbol, e);
                    continue;
                }
            };

            let points = candles
                .iter()
                .map(|c| PricePoint {
                    timestamp: c.timestamp,
                    price: c.close,
                })
                .collect();
            match PriceSeries::new(symbol.clone(), points) {
                Ok(s) if !s.is_empty() => series.push(s),
                Ok(_) => warn!("Skipping {}: no candles returned", symbol),
                Err(e) => warn!("Skipping {}: {}", symbol, e),
            }
        }
        series
    }

    /// Kept records with their aligned prices, best first, plus the number tested
    fn cointegrated_pairs(&self, series: &[PriceSeries]) -> (Vec<(CointegrationRecord, AlignedPrices)>, usize) {
        let mut tested = 0;
        let mut seen = HashSet::new();
        let mut kept = Vec::new();

        for i in 0..series.len() {
            for j in (i + 1)..series.len() {
                let pair = match PairKey::new(series[i].symbol(), series[j].symbol()) {
                    Ok(p) => p,
                    Err(e) => {
                        warn!("Skipping pair: {}", e);
                        continue;
                    }
                };
                if !seen.insert(pair.canonical()) {
                    continue;
                }
                tested += 1;

                let prices = align(&series[i], &series[j]);
                let result = match self.estimator.estimate_aligned(&prices) {
                    Ok(r) => r,
                    Err(e) => {
                        debug!("Cointegration {} failed: {}", pair, e);
                        continue;
                    }
                };
                if self.strategy.require_cointegration && !result.coint_flag {
                    continue;
                }
                kept.push((CointegrationRecord { pair, result }, prices));
            }
        }

        // stable sort keeps universe order among equal crossing counts
        kept.sort_by(|a, b| b.0.result.zero_crossings.cmp(&a.0.result.zero_crossings));
        kept.truncate(self.strategy.max_candidates);
        (kept, tested)
    }
}
