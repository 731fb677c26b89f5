//! Position Monitor
//!
//! Polls an open pair position until an exit fires:
//! 1. Stop loss: account PnL% at or below the configured loss, checked first
//! 2. Mean reversion: live z-score back within the exit band of the entry mean
//!
//! A failed poll is logged and retried on the next interval; the monitor
//! only returns once an exit has been signaled.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::domain::{
    align, ExitReason, MonitorPhase, MonitorState, PairPosition, PricePoint, PriceSeries,
    PriceSeriesError,
};
use crate::ports::{notify, with_timeout, AlertPort, Clock, ExchangeError, ExchangePort};
use crate::strategy::{live_zscore, StatsError, StrategyConfig};

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("Exchange error: {0}")]
    Exchange(#[from] ExchangeError),

    #[error("Total balance is not positive: {0}")]
    InvalidBalance(f64),

    #[error("Price history error: {0}")]
    Prices(#[from] PriceSeriesError),

    #[error("Live z-score unavailable: {0}")]
    Stats(#[from] StatsError),
}

/// Polling cadence and exit rules
#[derive(Debug, Clone)]
pub struct MonitorSettings {
    pub poll_interval: Duration,
    pub request_timeout: Duration,
    pub timeframe: String,
    pub live_window: usize,
    pub exit_tolerance: f64,
    pub stop_loss_pct: f64,
}

impl MonitorSettings {
    pub fn from_strategy(strategy: &StrategyConfig, timeframe: impl Into<String>) -> Self {
        Self {
            poll_interval: Duration::from_secs(300),
            request_timeout: Duration::from_secs(10),
            timeframe: timeframe.into(),
            live_window: strategy.live_window,
            exit_tolerance: strategy.exit_tolerance,
            stop_loss_pct: strategy.stop_loss_pct,
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

/// Exit rule for one poll. The stop loss wins regardless of the z-score.
pub fn evaluate(
    pnl_pct: f64,
    live_zscore: Option<f64>,
    mean_zscore_at_entry: f64,
    exit_tolerance: f64,
    stop_loss_pct: f64,
) -> MonitorPhase {
    if pnl_pct <= stop_loss_pct {
        return MonitorPhase::ExitSignaled(ExitReason::StopLoss);
    }
    match live_zscore {
        Some(z) if (z - mean_zscore_at_entry).abs() <= exit_tolerance => {
            MonitorPhase::ExitSignaled(ExitReason::MeanReversion)
        }
        _ => MonitorPhase::Monitoring,
    }
}

/// Aggregate unrealized PnL as a percentage of total balance
pub fn pnl_percent(unrealized_pnl: f64, total_balance: f64) -> Result<f64, MonitorError> {
    if !total_balance.is_finite() || total_balance <= 0.0 {
        return Err(MonitorError::InvalidBalance(total_balance));
    }
    Ok(unrealized_pnl / total_balance * 100.0)
}

pub struct PositionMonitor {
    exchange: Arc<dyn ExchangePort>,
    alerts: Arc<dyn AlertPort>,
    clock: Arc<dyn Clock>,
    settings: MonitorSettings,
}

impl PositionMonitor {
    pub fn new(
        exchange: Arc<dyn ExchangePort>,
        alerts: Arc<dyn AlertPort>,
        clock: Arc<dyn Clock>,
        settings: MonitorSettings,
    ) -> Self {
        Self {
            exchange,
            alerts,
            clock,
            settings,
        }
    }

    /// Block until an exit is signaled for `position`
    pub async fn run(&self, position: &PairPosition) -> ExitReason {
        info!(
            "Monitoring {} (long {}, short {}), mean z at entry {:.3}, poll every {:?}",
            position.spread_key,
            position.long_symbol,
            position.short_symbol,
            position.mean_zscore_at_entry,
            self.settings.poll_interval
        );

        loop {
            match self.poll(position).await {
                Ok((state, MonitorPhase::ExitSignaled(reason))) => {
                    let text = exit_message(position, &state, reason);
                    info!("{}", text);
                    notify(self.alerts.as_ref(), &text).await;
                    return reason;
                }
                Ok((state, MonitorPhase::Monitoring)) => {
                    info!(
                        "{} | PnL {:+.2}% | live z {} | target {:.3}",
                        position.spread_key,
                        state.pnl_pct,
                        state
                            .current_zscore
                            .map(|z| format!("{:.3}", z))
                            .unwrap_or_else(|| "n/a".into()),
                        position.mean_zscore_at_entry
                    );
                }
                Err(e) => warn!("Monitor poll failed, retrying next interval: {}", e),
            }
            self.clock.sleep(self.settings.poll_interval).await;
        }
    }

    /// One poll: PnL first, then the live z-score only if the stop did not fire
    pub async fn poll(&self, position: &PairPosition) -> Result<(MonitorState, MonitorPhase), MonitorError> {
        let now = self.clock.now();
        let timeout = self.settings.request_timeout;

        let (balance, positions) = tokio::join!(
            with_timeout(timeout, self.exchange.fetch_balance()),
            with_timeout(timeout, self.exchange.fetch_positions()),
        );
        let balance = balance?;
        let unrealized: f64 = positions?
            .iter()
            .filter(|p| p.contracts.abs() > 0.0)
            .map(|p| p.unrealized_pnl)
            .sum();
        let pnl_pct = pnl_percent(unrealized, balance.total)?;

        if pnl_pct <= self.settings.stop_loss_pct {
            let state = MonitorState {
                pnl_pct,
                current_zscore: None,
                last_poll_time: now,
            };
            return Ok((state, MonitorPhase::ExitSignaled(ExitReason::StopLoss)));
        }

        let current_zscore = match self.live_zscore(position).await {
            Ok(z) => Some(z),
            Err(e) => {
                warn!("No live z-score for {}: {}", position.spread_key, e);
                None
            }
        };

        let phase = evaluate(
            pnl_pct,
            current_zscore,
            position.mean_zscore_at_entry,
            self.settings.exit_tolerance,
            self.settings.stop_loss_pct,
        );
        let state = MonitorState {
            pnl_pct,
            current_zscore,
            last_poll_time: now,
        };
        Ok((state, phase))
    }

    /// Z-score of the latest bar over the trailing window, in the stored
    /// spread orientation
    async fn live_zscore(&self, position: &PairPosition) -> Result<f64, MonitorError> {
        let key = &position.spread_key;
        let (first, second) = tokio::join!(
            self.close_series(&key.first),
            self.close_series(&key.second),
        );
        let aligned = align(&first?, &second?);
        let result = live_zscore(&aligned, position.hedge_ratio, self.settings.live_window)?;
        debug!(
            "Live spread {:.6} mean {:.6} std {:.6} z {:.3}",
            result.current_spread, result.mean, result.std_dev, result.z_score
        );
        Ok(result.z_score)
    }

    async fn close_series(&self, symbol: &str) -> Result<PriceSeries, MonitorError> {
        let candles = with_timeout(
            self.settings.request_timeout,
            self.exchange
                .fetch_ohlcv(symbol, &self.settings.timeframe, self.settings.live_window),
        )
        .await?;
        let points = candles
            .iter()
            .map(|c| PricePoint {
                timestamp: c.timestamp,
                price: c.close,
            })
            .collect();
        Ok(PriceSeries::new(symbol, points)?)
    }
}

fn exit_message(position: &PairPosition, state: &MonitorState, reason: ExitReason) -> String {
    match reason {
        ExitReason::StopLoss => format!(
            "{}: {} PnL {:.2}% breached stop loss",
            reason, position.spread_key, state.pnl_pct
        ),
        ExitReason::MeanReversion => format!(
            "{}: {} live z {:.3} reached mean {:.3} (PnL {:.2}%)",
            reason,
            position.spread_key,
            state.current_zscore.unwrap_or(f64::NAN),
            position.mean_zscore_at_entry,
            state.pnl_pct
        ),
    }
}
