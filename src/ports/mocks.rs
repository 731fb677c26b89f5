//! Recording test doubles for the ports
//!
//! Each mock records the calls it receives and returns scripted responses,
//! so tests can assert on ordering (long leg before short leg, no order
//! submitted after a failed margin check) without a network.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::alerts::{AlertError, AlertPort};
use super::clock::Clock;
use super::exchange::{
    Balance, ExchangeError, ExchangePort, Ohlcv, OrderReceipt, OrderRequest, OrderSide,
    PositionSide, PositionSnapshot, Ticker,
};
use super::store::{StatsStore, StoreError};
use crate::domain::tables::{CandidateTable, CointegrationTable, HaltRecord, PairStatsTable};

#[derive(Debug, Default)]
struct ExchangeState {
    balances: VecDeque<Balance>,
    tickers: HashMap<String, f64>,
    candles: HashMap<String, Vec<Ohlcv>>,
    positions: Vec<PositionSnapshot>,
    pnl_script: VecDeque<f64>,
    failures: HashMap<&'static str, VecDeque<ExchangeError>>,
    rejected_symbols: HashSet<String>,
    order_failures: HashMap<String, VecDeque<ExchangeError>>,
    calls: Vec<String>,
    orders: Vec<OrderRequest>,
    next_order_id: u64,
}

/// Simulated exchange account. Filled orders update the position book.
#[derive(Debug, Clone, Default)]
pub struct MockExchange {
    state: Arc<Mutex<ExchangeState>>,
}

impl MockExchange {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a balance; the last queued balance is returned repeatedly
    pub fn with_balance(self, free: f64, total: f64) -> Self {
        self.state.lock().unwrap().balances.push_back(Balance { free, total });
        self
    }

    pub fn with_ticker(self, symbol: &str, last_price: f64) -> Self {
        self.state.lock().unwrap().tickers.insert(symbol.to_string(), last_price);
        self
    }

    pub fn with_candles(self, symbol: &str, candles: Vec<Ohlcv>) -> Self {
        self.state.lock().unwrap().candles.insert(symbol.to_string(), candles);
        self
    }

    pub fn with_position(self, symbol: &str, side: PositionSide, contracts: f64, unrealized_pnl: f64) -> Self {
        self.state.lock().unwrap().positions.push(PositionSnapshot {
            symbol: symbol.to_string(),
            side,
            contracts,
            unrealized_pnl,
        });
        self
    }

    /// Aggregate unrealized PnL reported by successive `fetch_positions`
    /// calls; the last value sticks
    pub fn with_pnl_sequence(self, pnl: Vec<f64>) -> Self {
        self.state.lock().unwrap().pnl_script.extend(pnl);
        self
    }

    /// Make the next call of `method` fail with `error`
    pub fn fail_next(self, method: &'static str, error: ExchangeError) -> Self {
        self.state
            .lock()
            .unwrap()
            .failures
            .entry(method)
            .or_default()
            .push_back(error);
        self
    }

    /// Make the next order for `symbol` fail with `error`
    pub fn fail_next_order_for(self, symbol: &str, error: ExchangeError) -> Self {
        self.state
            .lock()
            .unwrap()
            .order_failures
            .entry(symbol.to_string())
            .or_default()
            .push_back(error);
        self
    }

    /// Reject every order for `symbol`
    pub fn reject_orders_for(self, symbol: &str) -> Self {
        self.state.lock().unwrap().rejected_symbols.insert(symbol.to_string());
        self
    }

    pub fn set_candles(&self, symbol: &str, candles: Vec<Ohlcv>) {
        self.state.lock().unwrap().candles.insert(symbol.to_string(), candles);
    }

    /// Drop every held position, as if closed outside the bot
    pub fn clear_positions(&self) {
        self.state.lock().unwrap().positions.clear();
    }

    pub fn get_calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn get_orders(&self) -> Vec<OrderRequest> {
        self.state.lock().unwrap().orders.clone()
    }

    pub fn get_positions(&self) -> Vec<PositionSnapshot> {
        self.state.lock().unwrap().positions.clone()
    }

    fn enter(&self, call: String, method: &'static str) -> Result<(), ExchangeError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(call);
        match state.failures.get_mut(method).and_then(|q| q.pop_front()) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl ExchangePort for MockExchange {
    async fn fetch_balance(&self) -> Result<Balance, ExchangeError> {
        self.enter("fetch_balance".into(), "fetch_balance")?;
        let mut state = self.state.lock().unwrap();
        let balance = if state.balances.len() > 1 {
            state.balances.pop_front()
        } else {
            state.balances.front().copied()
        };
        balance.ok_or_else(|| ExchangeError::ApiError("No balance configured".into()))
    }

    async fn fetch_ticker(&self, symbol: &str) -> Result<Ticker, ExchangeError> {
        self.enter(format!("fetch_ticker:{}", symbol), "fetch_ticker")?;
        let state = self.state.lock().unwrap();
        state
            .tickers
            .get(symbol)
            .map(|&last_price| Ticker { symbol: symbol.to_string(), last_price })
            .ok_or_else(|| ExchangeError::UnknownSymbol(symbol.to_string()))
    }

    async fn fetch_ohlcv(&self, symbol: &str, _timeframe: &str, limit: usize) -> Result<Vec<Ohlcv>, ExchangeError> {
        self.enter(format!("fetch_ohlcv:{}", symbol), "fetch_ohlcv")?;
        let state = self.state.lock().unwrap();
        let candles = state
            .candles
            .get(symbol)
            .ok_or_else(|| ExchangeError::UnknownSymbol(symbol.to_string()))?;
        let start = candles.len().saturating_sub(limit);
        Ok(candles[start..].to_vec())
    }

    async fn fetch_positions(&self) -> Result<Vec<PositionSnapshot>, ExchangeError> {
        self.enter("fetch_positions".into(), "fetch_positions")?;
        let mut state = self.state.lock().unwrap();
        let scripted = if state.pnl_script.len() > 1 {
            state.pnl_script.pop_front()
        } else {
            state.pnl_script.front().copied()
        };
        if let Some(total_pnl) = scripted {
            for (i, position) in state.positions.iter_mut().enumerate() {
                position.unrealized_pnl = if i == 0 { total_pnl } else { 0.0 };
            }
        }
        Ok(state.positions.clone())
    }

    async fn create_market_order(&self, request: OrderRequest) -> Result<OrderReceipt, ExchangeError> {
        self.enter(format!("create_market_order:{}", request.symbol), "create_market_order")?;
        let mut state = self.state.lock().unwrap();
        if let Some(err) = state.order_failures.get_mut(&request.symbol).and_then(|q| q.pop_front()) {
            return Err(err);
        }
        if state.rejected_symbols.contains(&request.symbol) {
            return Err(ExchangeError::Rejected {
                code: -2019,
                message: "Margin is insufficient.".into(),
            });
        }
        state.orders.push(request.clone());
        state.next_order_id += 1;
        let id = state.next_order_id.to_string();

        let side = match request.side {
            OrderSide::Buy => PositionSide::Long,
            OrderSide::Sell => PositionSide::Short,
        };
        if request.reduce_only {
            state.positions.retain_mut(|p| {
                if p.symbol == request.symbol && p.side != side {
                    p.contracts -= request.quantity;
                }
                p.contracts > 1e-12
            });
        } else {
            state.positions.push(PositionSnapshot {
                symbol: request.symbol.clone(),
                side,
                contracts: request.quantity,
                unrealized_pnl: 0.0,
            });
        }

        Ok(OrderReceipt {
            id,
            symbol: request.symbol,
            side: request.side,
            status: "FILLED".into(),
            requested: request.quantity,
            filled: request.quantity,
        })
    }
}

/// Alert sink that keeps every message
#[derive(Debug, Clone, Default)]
pub struct RecordingAlerts {
    messages: Arc<Mutex<Vec<String>>>,
    fail: bool,
}

impl RecordingAlerts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record messages but report every delivery as failed
    pub fn failing() -> Self {
        Self { fail: true, ..Self::default() }
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.messages.lock().unwrap().iter().any(|m| m.contains(needle))
    }
}

#[async_trait]
impl AlertPort for RecordingAlerts {
    async fn send_alert(&self, text: &str) -> Result<(), AlertError> {
        self.messages.lock().unwrap().push(text.to_string());
        if self.fail {
            return Err(AlertError::DeliveryFailed("recording sink set to fail".into()));
        }
        Ok(())
    }
}

/// Simulated clock: `sleep` advances time instantly
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<DateTime<Utc>>>,
    sleeps: Arc<Mutex<Vec<Duration>>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(Mutex::new(start)),
            sleeps: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn advance(&self, duration: Duration) {
        let mut now = self.now.lock().unwrap();
        *now += chrono::Duration::from_std(duration).unwrap_or_else(|_| chrono::Duration::zero());
    }

    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().unwrap().clone()
    }
}

#[async_trait]
impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }

    async fn sleep(&self, duration: Duration) {
        self.sleeps.lock().unwrap().push(duration);
        self.advance(duration);
        tokio::task::yield_now().await;
    }
}

/// In-memory `StatsStore`
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    cointegration: Arc<Mutex<CointegrationTable>>,
    candidates: Arc<Mutex<CandidateTable>>,
    pair_stats: Arc<Mutex<PairStatsTable>>,
    halt: Arc<Mutex<Option<HaltRecord>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StatsStore for MemoryStore {
    fn load_cointegration(&self) -> Result<CointegrationTable, StoreError> {
        Ok(self.cointegration.lock().unwrap().clone())
    }

    fn save_cointegration(&self, table: &CointegrationTable) -> Result<(), StoreError> {
        *self.cointegration.lock().unwrap() = table.clone();
        Ok(())
    }

    fn load_candidates(&self) -> Result<CandidateTable, StoreError> {
        Ok(self.candidates.lock().unwrap().clone())
    }

    fn save_candidates(&self, table: &CandidateTable) -> Result<(), StoreError> {
        *self.candidates.lock().unwrap() = table.clone();
        Ok(())
    }

    fn load_pair_stats(&self) -> Result<PairStatsTable, StoreError> {
        Ok(self.pair_stats.lock().unwrap().clone())
    }

    fn save_pair_stats(&self, table: &PairStatsTable) -> Result<(), StoreError> {
        *self.pair_stats.lock().unwrap() = table.clone();
        Ok(())
    }

    fn load_halt(&self) -> Result<Option<HaltRecord>, StoreError> {
        Ok(self.halt.lock().unwrap().clone())
    }

    fn save_halt(&self, record: &HaltRecord) -> Result<(), StoreError> {
        *self.halt.lock().unwrap() = Some(record.clone());
        Ok(())
    }

    fn clear_halt(&self) -> Result<(), StoreError> {
        *self.halt.lock().unwrap() = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[tokio::test]
    async fn test_mock_exchange_records_and_fills() {
        let exchange = MockExchange::new().with_balance(100.0, 100.0);

        let receipt = exchange
            .create_market_order(OrderRequest::market("ETHUSDT", OrderSide::Buy, 2.0))
            .await
            .unwrap();
        assert_eq!(receipt.filled, 2.0);
        assert_eq!(exchange.open_contracts().await.unwrap(), 2.0);

        exchange
            .create_market_order(OrderRequest::market("ETHUSDT", OrderSide::Sell, 2.0).reduce_only())
            .await
            .unwrap();
        assert!(exchange.get_positions().is_empty());
        assert_eq!(
            exchange.get_calls(),
            vec![
                "create_market_order:ETHUSDT",
                "fetch_positions",
                "create_market_order:ETHUSDT"
            ]
        );
    }

    #[tokio::test]
    async fn test_mock_exchange_scripted_failure() {
        let exchange = MockExchange::new()
            .with_balance(1.0, 1.0)
            .fail_next("fetch_balance", ExchangeError::ApiError("boom".into()));
        assert!(exchange.fetch_balance().await.is_err());
        assert!(exchange.fetch_balance().await.is_ok());
    }

    #[tokio::test]
    async fn test_manual_clock_advances_on_sleep() {
        let start = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let clock = ManualClock::new(start);
        clock.sleep(Duration::from_secs(300)).await;
        assert_eq!(clock.now(), start + chrono::Duration::minutes(5));
        assert_eq!(clock.sleeps(), vec![Duration::from_secs(300)]);
    }
}
