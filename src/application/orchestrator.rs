//! Hourly Orchestrator
//!
//! One cycle per hour, aligned to the top of the hour plus an offset:
//! 1. Halt marker present → do nothing until an operator resumes
//! 2. Any open contracts on the account → skip, re-check after the guard interval
//! 3. Refresh pipeline → rank → look up hedge ratio and mean z-score
//! 4. Size both legs from total balance, execute, monitor until exit, close
//!
//! At most one pair position exists at a time; the open-contracts guard
//! enforces it from the exchange's point of view.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, DurationRound, TimeDelta, Utc};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

use super::executor::{ExecutionError, Executor};
use super::monitor::PositionMonitor;
use super::pipeline::CandidatePipeline;
use crate::domain::{ExitReason, HaltRecord, PairKey, PairPosition};
use crate::ports::{notify, with_timeout, AlertPort, Clock, ExchangePort, StatsStore, StoreError};
use crate::strategy::{select_best, RankError, StrategyConfig};

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Loop timing
#[derive(Debug, Clone)]
pub struct ScheduleSettings {
    /// Delay after the top of the hour before a cycle starts
    pub cycle_offset: Duration,
    /// Re-check interval while positions are open
    pub guard_interval: Duration,
    pub request_timeout: Duration,
}

impl Default for ScheduleSettings {
    fn default() -> Self {
        Self {
            cycle_offset: Duration::from_secs(60),
            guard_interval: Duration::from_secs(300),
            request_timeout: Duration::from_secs(10),
        }
    }
}

/// How a cycle ended
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    Halted(HaltRecord),
    SkippedOpenPositions { contracts: f64 },
    GuardFailed(String),
    PipelineFailed(String),
    NoCandidates(String),
    NoSignal { pair: PairKey, zscore: f64 },
    LookupMissed(PairKey),
    ExecutionFailed(String),
    PartialExecution(String),
    /// An order timed out, so whether it filled is unknown
    AmbiguousFill(String),
    Closed { pair: PairKey, reason: ExitReason },
    CloseFailed { pair: PairKey, reason: ExitReason, error: String },
}

impl CycleOutcome {
    /// Outcomes after which the loop re-checks soon instead of waiting an hour
    pub fn is_guarded(&self) -> bool {
        matches!(self, CycleOutcome::SkippedOpenPositions { .. } | CycleOutcome::GuardFailed(_))
    }
}

/// Start of the next cycle: the next top of the hour plus `offset`, or the
/// current hour's slot when it is still ahead
pub fn next_cycle_start(now: DateTime<Utc>, offset: Duration) -> DateTime<Utc> {
    let offset = TimeDelta::from_std(offset).unwrap_or(TimeDelta::zero());
    let hour = now.duration_trunc(TimeDelta::hours(1)).unwrap_or(now);
    let slot = hour + offset;
    if slot > now {
        slot
    } else {
        slot + TimeDelta::hours(1)
    }
}

pub struct PairsOrchestrator {
    exchange: Arc<dyn ExchangePort>,
    alerts: Arc<dyn AlertPort>,
    clock: Arc<dyn Clock>,
    store: Arc<dyn StatsStore>,
    pipeline: CandidatePipeline,
    executor: Executor,
    monitor: PositionMonitor,
    strategy: StrategyConfig,
    schedule: ScheduleSettings,
    is_running: Arc<RwLock<bool>>,
    /// Set while entry orders are in flight
    is_executing: Arc<RwLock<bool>>,
}

impl PairsOrchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        exchange: Arc<dyn ExchangePort>,
        alerts: Arc<dyn AlertPort>,
        clock: Arc<dyn Clock>,
        store: Arc<dyn StatsStore>,
        pipeline: CandidatePipeline,
        executor: Executor,
        monitor: PositionMonitor,
        strategy: StrategyConfig,
    ) -> Self {
        Self {
            exchange,
            alerts,
            clock,
            store,
            pipeline,
            executor,
            monitor,
            strategy,
            schedule: ScheduleSettings::default(),
            is_running: Arc::new(RwLock::new(false)),
            is_executing: Arc::new(RwLock::new(false)),
        }
    }

    pub fn with_schedule(mut self, schedule: ScheduleSettings) -> Self {
        self.schedule = schedule;
        self
    }

    pub async fn stop(&self) {
        *self.is_running.write().await = false;
    }

    /// True between submitting the first entry order and learning how
    /// both legs ended
    pub async fn is_executing(&self) -> bool {
        *self.is_executing.read().await
    }

    /// Run cycles until stopped. With `wait_for_slot` the first cycle waits
    /// for the next hourly slot instead of starting immediately.
    pub async fn run(&self, wait_for_slot: bool) -> Result<(), OrchestratorError> {
        *self.is_running.write().await = true;
        info!(
            "Starting pairs orchestrator - offset {:?}, guard interval {:?}",
            self.schedule.cycle_offset, self.schedule.guard_interval
        );

        if let Some(halt) = self.store.load_halt()? {
            warn!("Halt marker present ({}); run `resume` to re-enable trading", halt.reason);
        }
        if wait_for_slot {
            self.wait_for_next_slot().await;
        }

        while *self.is_running.read().await {
            let outcome = self.run_cycle().await;
            info!("Cycle finished: {:?}", outcome);

            if !*self.is_running.read().await {
                break;
            }
            if outcome.is_guarded() {
                self.clock.sleep(self.schedule.guard_interval).await;
            } else {
                self.wait_for_next_slot().await;
            }
        }

        info!("Pairs orchestrator stopped");
        Ok(())
    }

    async fn wait_for_next_slot(&self) {
        let next = next_cycle_start(self.clock.now(), self.schedule.cycle_offset);
        info!("Next cycle at {}", next);
        self.clock.sleep_until(next).await;
    }

    /// One full cycle
    pub async fn run_cycle(&self) -> CycleOutcome {
        match self.store.load_halt() {
            Ok(Some(halt)) => {
                warn!("Automatic cycling halted since {}: {}", halt.at, halt.reason);
                return CycleOutcome::Halted(halt);
            }
            Ok(None) => {}
            Err(e) => return CycleOutcome::GuardFailed(format!("cannot read halt marker: {}", e)),
        }

        match with_timeout(self.schedule.request_timeout, self.exchange.open_contracts()).await {
            Ok(contracts) if contracts > 0.0 => {
                info!("{} contracts open, skipping pipeline", contracts);
                return CycleOutcome::SkippedOpenPositions { contracts };
            }
            Ok(_) => {}
            Err(e) => {
                warn!("Open-position guard failed: {}", e);
                return CycleOutcome::GuardFailed(e.to_string());
            }
        }

        let now = self.clock.now();
        if let Err(e) = self.pipeline.refresh(now).await {
            error!("Pipeline failed: {}", e);
            notify(self.alerts.as_ref(), &format!("Pipeline failed: {}", e)).await;
            return CycleOutcome::PipelineFailed(e.to_string());
        }

        let ranked = match self
            .store
            .load_candidates()
            .map_err(|e| e.to_string())
            .and_then(|t| select_best(&t).map_err(|e: RankError| e.to_string()))
        {
            Ok(r) => r,
            Err(msg) => {
                warn!("No candidates: {}", msg);
                return CycleOutcome::NoCandidates(msg);
            }
        };
        info!("Best candidate {} z={:.3}", ranked.pair, ranked.zscore);

        if let Some(max) = self.strategy.entry_zscore_max {
            if ranked.zscore >= max {
                info!("z={:.3} not below entry threshold {:.3}, no trade", ranked.zscore, max);
                return CycleOutcome::NoSignal {
                    pair: ranked.pair,
                    zscore: ranked.zscore,
                };
            }
        }

        let (spread_key, hedge_ratio, mean_zscore) = match self.lookup(&ranked.pair) {
            Some(found) => found,
            None => {
                warn!("Hedge ratio or mean z-score missing for {}", ranked.pair);
                return CycleOutcome::LookupMissed(ranked.pair);
            }
        };

        let balance = match with_timeout(self.schedule.request_timeout, self.exchange.fetch_balance()).await {
            Ok(b) => b,
            Err(e) => {
                warn!("Balance fetch failed: {}", e);
                return CycleOutcome::ExecutionFailed(e.to_string());
            }
        };
        let notional = self.strategy.leg_fraction * balance.total;

        let position = match PairPosition::new(
            spread_key,
            ranked.long_symbol().to_string(),
            ranked.short_symbol().to_string(),
            hedge_ratio,
            mean_zscore,
            ranked.zscore,
            now,
            notional,
            notional,
        ) {
            Ok(p) => p,
            Err(e) => {
                warn!("Cannot size position: {}", e);
                return CycleOutcome::ExecutionFailed(e.to_string());
            }
        };

        *self.is_executing.write().await = true;
        let execution = self
            .executor
            .execute_with_margin(
                &position.long_symbol,
                &position.short_symbol,
                position.notional_long,
                position.notional_short,
                balance.free,
            )
            .await;
        *self.is_executing.write().await = false;

        match execution {
            Ok(fill) => {
                notify(
                    self.alerts.as_ref(),
                    &format!(
                        "Opened {}: long {} ({}), short {} ({}), z={:.3}, target mean z={:.3}",
                        position.spread_key,
                        position.long_symbol,
                        fill.long,
                        position.short_symbol,
                        fill.short,
                        position.entry_zscore,
                        position.mean_zscore_at_entry
                    ),
                )
                .await;
            }
            Err(ExecutionError::PartialExecution { receipt, source }) => {
                let text = format!(
                    "PARTIAL EXECUTION on {}: long leg filled ({}) but short {} failed: {}. Manual action required; cycling halted.",
                    position.spread_key, receipt, position.short_symbol, source
                );
                error!("{}", text);
                notify(self.alerts.as_ref(), &text).await;
                self.halt(&text);
                return CycleOutcome::PartialExecution(text);
            }
            Err(e @ ExecutionError::AmbiguousFill { .. }) => {
                let text = format!(
                    "UNKNOWN FILL on {}: {}. Check the account manually; cycling halted.",
                    position.spread_key, e
                );
                error!("{}", text);
                notify(self.alerts.as_ref(), &text).await;
                self.halt(&text);
                return CycleOutcome::AmbiguousFill(text);
            }
            Err(e) => {
                error!("Execution failed: {}", e);
                notify(self.alerts.as_ref(), &format!("Execution failed for {}: {}", position.spread_key, e)).await;
                return CycleOutcome::ExecutionFailed(e.to_string());
            }
        }

        let reason = self.monitor.run(&position).await;

        match self.executor.close_pair(&position).await {
            Ok(receipts) => {
                let closed: Vec<String> = receipts.iter().map(|r| r.to_string()).collect();
                notify(
                    self.alerts.as_ref(),
                    &format!("Closed {} on {}: {}", position.spread_key, reason, closed.join(", ")),
                )
                .await;
                CycleOutcome::Closed {
                    pair: position.spread_key,
                    reason,
                }
            }
            Err(e) => {
                let text = format!(
                    "CLOSE FAILED for {} after {}: {}. Manual action required; cycling halted.",
                    position.spread_key, reason, e
                );
                error!("{}", text);
                notify(self.alerts.as_ref(), &text).await;
                self.halt(&text);
                CycleOutcome::CloseFailed {
                    pair: position.spread_key,
                    reason,
                    error: e.to_string(),
                }
            }
        }
    }

    /// Stored orientation, hedge ratio and mean z-score for `pair`
    fn lookup(&self, pair: &PairKey) -> Option<(PairKey, f64, f64)> {
        let cointegration = match self.store.load_cointegration() {
            Ok(t) => t,
            Err(e) => {
                warn!("Cannot read cointegration table: {}", e);
                return None;
            }
        };
        let stats = match self.store.load_pair_stats() {
            Ok(t) => t,
            Err(e) => {
                warn!("Cannot read mean z-score table: {}", e);
                return None;
            }
        };
        let record = cointegration.lookup(pair)?;
        let entry = stats.lookup(pair)?;
        Some((record.pair.clone(), record.result.hedge_ratio, entry.mean_zscore))
    }

    fn halt(&self, reason: &str) {
        let record = HaltRecord {
            reason: reason.to_string(),
            at: self.clock.now(),
        };
        if let Err(e) = self.store.save_halt(&record) {
            error!("Failed to persist halt marker: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::monitor::MonitorSettings;
    use crate::application::pipeline::UniverseSettings;
    use crate::ports::mocks::{ManualClock, MemoryStore, MockExchange, RecordingAlerts};
    use crate::ports::PositionSide;
    use chrono::TimeZone;

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 7, 1, h, m, s).unwrap()
    }

    #[test]
    fn test_next_cycle_start() {
        let offset = Duration::from_secs(60);
        assert_eq!(next_cycle_start(at(10, 0, 30), offset), at(10, 1, 0));
        assert_eq!(next_cycle_start(at(10, 1, 0), offset), at(11, 1, 0));
        assert_eq!(next_cycle_start(at(10, 45, 0), offset), at(11, 1, 0));
        assert_eq!(next_cycle_start(at(23, 59, 59), offset), Utc.with_ymd_and_hms(2025, 7, 2, 0, 1, 0).unwrap());
    }

    fn orchestrator(exchange: &MockExchange, store: &MemoryStore, alerts: &RecordingAlerts) -> PairsOrchestrator {
        orchestrator_with_clock(exchange, store, alerts, &ManualClock::new(at(10, 1, 0)))
    }

    fn orchestrator_with_clock(
        exchange: &MockExchange,
        store: &MemoryStore,
        alerts: &RecordingAlerts,
        clock: &ManualClock,
    ) -> PairsOrchestrator {
        let exchange_port: Arc<dyn ExchangePort> = Arc::new(exchange.clone());
        let store_port: Arc<dyn StatsStore> = Arc::new(store.clone());
        let alert_port: Arc<dyn AlertPort> = Arc::new(alerts.clone());
        let clock: Arc<dyn Clock> = Arc::new(clock.clone());
        let strategy = StrategyConfig::default();
        let universe = UniverseSettings {
            symbols: vec!["AAA".into(), "BBB".into()],
            timeframe: "1h".into(),
            history_bars: 100,
        };
        PairsOrchestrator::new(
            exchange_port.clone(),
            alert_port.clone(),
            clock.clone(),
            store_port.clone(),
            CandidatePipeline::new(exchange_port.clone(), store_port, universe, strategy.clone()),
            Executor::new(exchange_port.clone()),
            PositionMonitor::new(
                exchange_port,
                alert_port,
                clock,
                MonitorSettings::from_strategy(&strategy, "1h"),
            ),
            strategy,
        )
    }

    #[tokio::test]
    async fn test_halt_marker_blocks_cycle() {
        let exchange = MockExchange::new();
        let store = MemoryStore::new();
        store
            .save_halt(&HaltRecord { reason: "partial fill".into(), at: at(9, 1, 0) })
            .unwrap();
        let outcome = orchestrator(&exchange, &store, &RecordingAlerts::new()).run_cycle().await;

        assert!(matches!(outcome, CycleOutcome::Halted(ref h) if h.reason == "partial fill"));
        assert!(exchange.get_calls().is_empty());
    }

    #[tokio::test]
    async fn test_open_positions_skip_pipeline() {
        let exchange = MockExchange::new().with_position("XXX", PositionSide::Long, 3.0, 0.0);
        let store = MemoryStore::new();
        let outcome = orchestrator(&exchange, &store, &RecordingAlerts::new()).run_cycle().await;

        assert_eq!(outcome, CycleOutcome::SkippedOpenPositions { contracts: 3.0 });
        assert_eq!(exchange.get_calls(), vec!["fetch_positions"]);
    }

    #[tokio::test]
    async fn test_pipeline_failure_alerts_and_aborts() {
        let exchange = MockExchange::new();
        let alerts = RecordingAlerts::new();
        let outcome = orchestrator(&exchange, &MemoryStore::new(), &alerts).run_cycle().await;

        assert!(matches!(outcome, CycleOutcome::PipelineFailed(_)));
        assert!(alerts.contains("Pipeline failed"));
        assert!(exchange.get_orders().is_empty());
    }

    #[test]
    fn test_guarded_outcomes() {
        assert!(CycleOutcome::SkippedOpenPositions { contracts: 1.0 }.is_guarded());
        assert!(CycleOutcome::GuardFailed("timeout".into()).is_guarded());
        assert!(!CycleOutcome::PipelineFailed("x".into()).is_guarded());
        assert!(!CycleOutcome::AmbiguousFill("x".into()).is_guarded());
    }

    #[tokio::test]
    async fn test_run_rechecks_guard_then_waits_for_next_slot() {
        let exchange = MockExchange::new().with_position("XXX", PositionSide::Long, 3.0, 0.0);
        let store = MemoryStore::new();
        let alerts = RecordingAlerts::new();
        let clock = ManualClock::new(at(10, 1, 0));
        let orch = orchestrator_with_clock(&exchange, &store, &alerts, &clock);

        let (result, _) = tokio::join!(orch.run(false), async {
            // first cycle skipped on open contracts
            while clock.sleeps().is_empty() {
                tokio::task::yield_now().await;
            }
            exchange.clear_positions();
            // second cycle has no candles, so the pipeline fails
            while clock.sleeps().len() < 2 {
                tokio::task::yield_now().await;
            }
            orch.stop().await;
        });
        result.unwrap();

        // guard interval at 10:01, then the rest of the hour up to 11:01
        assert_eq!(
            clock.sleeps(),
            vec![Duration::from_secs(300), Duration::from_secs(55 * 60)]
        );
        assert_eq!(clock.now(), at(11, 1, 0));
        assert!(alerts.contains("Pipeline failed"));
        assert!(!orch.is_executing().await);
    }

    #[tokio::test]
    async fn test_run_waits_for_first_slot() {
        let exchange = MockExchange::new().with_position("XXX", PositionSide::Long, 3.0, 0.0);
        let clock = ManualClock::new(at(10, 30, 0));
        let orch = orchestrator_with_clock(&exchange, &MemoryStore::new(), &RecordingAlerts::new(), &clock);

        let (result, _) = tokio::join!(orch.run(true), async {
            while clock.sleeps().is_empty() {
                tokio::task::yield_now().await;
            }
            orch.stop().await;
        });
        result.unwrap();

        assert_eq!(clock.sleeps(), vec![Duration::from_secs(31 * 60)]);
        assert!(exchange.get_calls().is_empty());
    }
}
