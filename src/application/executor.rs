//! Pair Execution
//!
//! Opens a pair as two market orders, long leg first, and closes it with
//! reduce-only orders against what the exchange reports as held.
//!
//! The legs are not atomic. A failed short leg after a filled long leg is
//! reported as `ExecutionError::PartialExecution` carrying the long receipt
//! and is never retried here. An order that times out may still have been
//! filled, so either leg timing out is reported as `AmbiguousFill`.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{error, info, warn};

use crate::domain::PairPosition;
use crate::ports::{
    with_timeout, ExchangeError, ExchangePort, OrderReceipt, OrderRequest, OrderSide, PositionSide,
};

#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("Insufficient margin: required {required:.2}, available {available:.2}")]
    InsufficientMargin { required: f64, available: f64 },

    #[error("Invalid notional for {symbol}: {notional}")]
    InvalidNotional { symbol: String, notional: f64 },

    #[error("Invalid price for {symbol}: {price}")]
    InvalidPrice { symbol: String, price: f64 },

    #[error("Exchange error: {0}")]
    Exchange(#[from] ExchangeError),

    #[error("Partial execution: long leg filled ({receipt}) but short leg failed: {source}")]
    PartialExecution {
        receipt: OrderReceipt,
        source: ExchangeError,
    },

    #[error("Order for {symbol} timed out and may have filled{}: {source}", long_leg_note(.long))]
    AmbiguousFill {
        symbol: String,
        long: Option<OrderReceipt>,
        source: ExchangeError,
    },

    #[error("Failed to close {symbols:?}: {message}")]
    CloseFailed { symbols: Vec<String>, message: String },
}

fn long_leg_note(long: &Option<OrderReceipt>) -> String {
    match long {
        Some(receipt) => format!(" after long leg filled ({})", receipt),
        None => String::new(),
    }
}

/// Both legs of an opened pair
#[derive(Debug, Clone, PartialEq)]
pub struct PairFill {
    pub long: OrderReceipt,
    pub short: OrderReceipt,
}

pub struct Executor {
    exchange: Arc<dyn ExchangePort>,
    request_timeout: Duration,
}

impl Executor {
    pub fn new(exchange: Arc<dyn ExchangePort>) -> Self {
        Self {
            exchange,
            request_timeout: Duration::from_secs(10),
        }
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Open the pair against the account's current free margin
    pub async fn execute(
        &self,
        long_symbol: &str,
        short_symbol: &str,
        long_notional: f64,
        short_notional: f64,
    ) -> Result<PairFill, ExecutionError> {
        let balance = with_timeout(self.request_timeout, self.exchange.fetch_balance()).await?;
        info!("Free margin: {:.2} (total {:.2})", balance.free, balance.total);
        self.execute_with_margin(long_symbol, short_symbol, long_notional, short_notional, balance.free)
            .await
    }

    /// Open the pair given an already known free margin. The margin check
    /// happens before any exchange call.
    pub async fn execute_with_margin(
        &self,
        long_symbol: &str,
        short_symbol: &str,
        long_notional: f64,
        short_notional: f64,
        available_margin: f64,
    ) -> Result<PairFill, ExecutionError> {
        for (symbol, notional) in [(long_symbol, long_notional), (short_symbol, short_notional)] {
            if !notional.is_finite() || notional <= 0.0 {
                return Err(ExecutionError::InvalidNotional {
                    symbol: symbol.to_string(),
                    notional,
                });
            }
        }
        let required = long_notional + short_notional;
        if required > available_margin {
            return Err(ExecutionError::InsufficientMargin {
                required,
                available: available_margin,
            });
        }

        let long_price = self.last_price(long_symbol).await?;
        let short_price = self.last_price(short_symbol).await?;
        let long_qty = long_notional / long_price;
        let short_qty = short_notional / short_price;
        info!(
            "Placing pair: long {} {:.6} @ {:.6}, short {} {:.6} @ {:.6}",
            long_symbol, long_qty, long_price, short_symbol, short_qty, short_price
        );

        let long = match self
            .submit(OrderRequest::market(long_symbol, OrderSide::Buy, long_qty))
            .await
        {
            Ok(receipt) => receipt,
            Err(source @ ExchangeError::Timeout(_)) => {
                error!("Long leg order timed out, fill state unknown: {}", source);
                return Err(ExecutionError::AmbiguousFill {
                    symbol: long_symbol.to_string(),
                    long: None,
                    source,
                });
            }
            Err(e) => return Err(e.into()),
        };
        info!("Long leg placed: {}", long);

        let short = match self
            .submit(OrderRequest::market(short_symbol, OrderSide::Sell, short_qty))
            .await
        {
            Ok(receipt) => receipt,
            Err(source @ ExchangeError::Timeout(_)) => {
                error!("Short leg order timed out after long leg filled: {}", source);
                return Err(ExecutionError::AmbiguousFill {
                    symbol: short_symbol.to_string(),
                    long: Some(long),
                    source,
                });
            }
            Err(source) => {
                error!("Short leg failed after long leg filled: {}", source);
                return Err(ExecutionError::PartialExecution { receipt: long, source });
            }
        };
        info!("Short leg placed: {}", short);

        Ok(PairFill { long, short })
    }

    /// Flatten both legs with reduce-only market orders sized from the
    /// exchange's position book, long leg first
    pub async fn close_pair(&self, position: &PairPosition) -> Result<Vec<OrderReceipt>, ExecutionError> {
        let held = with_timeout(self.request_timeout, self.exchange.fetch_positions()).await?;

        let mut receipts = Vec::new();
        let mut failed = Vec::new();
        let mut messages = Vec::new();

        for symbol in position.symbols() {
            let legs: Vec<_> = held
                .iter()
                .filter(|p| p.symbol == symbol && p.contracts.abs() > 0.0)
                .collect();
            if legs.is_empty() {
                warn!("No open position for {} to close", symbol);
                continue;
            }
            for leg in legs {
                let side = match leg.side {
                    PositionSide::Long => OrderSide::Sell,
                    PositionSide::Short => OrderSide::Buy,
                };
                let request = OrderRequest::market(symbol, side, leg.contracts.abs()).reduce_only();
                match self.submit(request).await {
                    Ok(receipt) => {
                        info!("Closed {}: {}", symbol, receipt);
                        receipts.push(receipt);
                    }
                    Err(e) => {
                        error!("Failed to close {}: {}", symbol, e);
                        failed.push(symbol.to_string());
                        messages.push(format!("{}: {}", symbol, e));
                    }
                }
            }
        }

        if failed.is_empty() {
            Ok(receipts)
        } else {
            Err(ExecutionError::CloseFailed {
                symbols: failed,
                message: messages.join("; "),
            })
        }
    }

    async fn last_price(&self, symbol: &str) -> Result<f64, ExecutionError> {
        let ticker = with_timeout(self.request_timeout, self.exchange.fetch_ticker(symbol)).await?;
        if !ticker.last_price.is_finite() || ticker.last_price <= 0.0 {
            return Err(ExecutionError::InvalidPrice {
                symbol: symbol.to_string(),
                price: ticker.last_price,
            });
        }
        Ok(ticker.last_price)
    }

    async fn submit(&self, request: OrderRequest) -> Result<OrderReceipt, ExchangeError> {
        with_timeout(self.request_timeout, self.exchange.create_market_order(request)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::PairKey;
    use crate::ports::mocks::MockExchange;
    use approx::assert_relative_eq;
    use chrono::{TimeZone, Utc};

    fn executor(exchange: &MockExchange) -> Executor {
        Executor::new(Arc::new(exchange.clone()))
    }

    fn position() -> PairPosition {
        PairPosition::new(
            PairKey::new("ALTUSDT", "ZILUSDT").unwrap(),
            "ALTUSDT".into(),
            "ZILUSDT".into(),
            1.8,
            0.1,
            -2.3,
            Utc.with_ymd_and_hms(2025, 5, 1, 10, 1, 0).unwrap(),
            100.0,
            100.0,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_insufficient_margin_before_any_call() {
        let exchange = MockExchange::new().with_ticker("A", 1.0).with_ticker("B", 1.0);
        let err = executor(&exchange)
            .execute_with_margin("A", "B", 100.0, 90.0, 150.0)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            ExecutionError::InsufficientMargin { required, available } if required == 190.0 && available == 150.0
        ));
        assert!(exchange.get_calls().is_empty());
        assert!(exchange.get_orders().is_empty());
    }

    #[tokio::test]
    async fn test_execute_long_then_short() {
        let exchange = MockExchange::new()
            .with_balance(500.0, 500.0)
            .with_ticker("ALTUSDT", 0.5)
            .with_ticker("ZILUSDT", 0.02);
        let fill = executor(&exchange)
            .execute("ALTUSDT", "ZILUSDT", 100.0, 100.0)
            .await
            .unwrap();

        assert_eq!(fill.long.side, OrderSide::Buy);
        assert_relative_eq!(fill.long.requested, 200.0);
        assert_eq!(fill.short.side, OrderSide::Sell);
        assert_relative_eq!(fill.short.requested, 5000.0, epsilon = 1e-9);
        assert_eq!(
            exchange.get_calls(),
            vec![
                "fetch_balance",
                "fetch_ticker:ALTUSDT",
                "fetch_ticker:ZILUSDT",
                "create_market_order:ALTUSDT",
                "create_market_order:ZILUSDT",
            ]
        );
    }

    #[tokio::test]
    async fn test_partial_execution_carries_long_receipt() {
        let exchange = MockExchange::new()
            .with_balance(500.0, 500.0)
            .with_ticker("ALTUSDT", 0.5)
            .with_ticker("ZILUSDT", 0.02)
            .reject_orders_for("ZILUSDT");
        let err = executor(&exchange)
            .execute("ALTUSDT", "ZILUSDT", 100.0, 100.0)
            .await
            .unwrap_err();

        match err {
            ExecutionError::PartialExecution { receipt, source } => {
                assert_eq!(receipt.symbol, "ALTUSDT");
                assert!(matches!(source, ExchangeError::Rejected { code: -2019, .. }));
            }
            other => panic!("expected partial execution, got {other:?}"),
        }
        // exactly one order went through, nothing was retried
        assert_eq!(exchange.get_orders().len(), 1);
    }

    #[tokio::test]
    async fn test_long_leg_failure_is_plain_exchange_error() {
        let exchange = MockExchange::new()
            .with_ticker("ALTUSDT", 0.5)
            .with_ticker("ZILUSDT", 0.02)
            .reject_orders_for("ALTUSDT");
        let err = executor(&exchange)
            .execute_with_margin("ALTUSDT", "ZILUSDT", 10.0, 10.0, 100.0)
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutionError::Exchange(_)));
        assert!(!exchange.get_calls().contains(&"create_market_order:ZILUSDT".to_string()));
    }

    #[tokio::test]
    async fn test_long_leg_timeout_is_ambiguous() {
        let exchange = MockExchange::new()
            .with_ticker("ALTUSDT", 0.5)
            .with_ticker("ZILUSDT", 0.02)
            .fail_next("create_market_order", ExchangeError::Timeout(Duration::from_secs(10)));
        let err = executor(&exchange)
            .execute_with_margin("ALTUSDT", "ZILUSDT", 10.0, 10.0, 100.0)
            .await
            .unwrap_err();

        match err {
            ExecutionError::AmbiguousFill { symbol, long, source } => {
                assert_eq!(symbol, "ALTUSDT");
                assert!(long.is_none());
                assert!(matches!(source, ExchangeError::Timeout(_)));
            }
            other => panic!("expected ambiguous fill, got {other:?}"),
        }
        // the short leg is never attempted
        assert!(!exchange.get_calls().contains(&"create_market_order:ZILUSDT".to_string()));
    }

    #[tokio::test]
    async fn test_short_leg_timeout_keeps_long_receipt() {
        let exchange = MockExchange::new()
            .with_ticker("ALTUSDT", 0.5)
            .with_ticker("ZILUSDT", 0.02)
            .fail_next_order_for("ZILUSDT", ExchangeError::Timeout(Duration::from_secs(10)));
        let err = executor(&exchange)
            .execute_with_margin("ALTUSDT", "ZILUSDT", 10.0, 10.0, 100.0)
            .await
            .unwrap_err();

        match err {
            ExecutionError::AmbiguousFill { symbol, long: Some(receipt), .. } => {
                assert_eq!(symbol, "ZILUSDT");
                assert_eq!(receipt.symbol, "ALTUSDT");
            }
            other => panic!("expected ambiguous fill with long receipt, got {other:?}"),
        }
        assert_eq!(exchange.get_orders().len(), 1);
    }

    #[tokio::test]
    async fn test_invalid_price_and_notional() {
        let exchange = MockExchange::new().with_ticker("A", 0.0).with_ticker("B", 1.0);
        let err = executor(&exchange)
            .execute_with_margin("A", "B", 10.0, 10.0, 100.0)
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutionError::InvalidPrice { .. }));

        let err = executor(&exchange)
            .execute_with_margin("A", "B", -1.0, 10.0, 100.0)
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutionError::InvalidNotional { .. }));
    }

    #[tokio::test]
    async fn test_close_pair_reduces_held_contracts() {
        let exchange = MockExchange::new()
            .with_position("ALTUSDT", PositionSide::Long, 180.0, 1.0)
            .with_position("ZILUSDT", PositionSide::Short, 4900.0, -0.5);
        let receipts = executor(&exchange).close_pair(&position()).await.unwrap();

        assert_eq!(receipts.len(), 2);
        let orders = exchange.get_orders();
        assert_eq!(orders[0].symbol, "ALTUSDT");
        assert_eq!(orders[0].side, OrderSide::Sell);
        assert_relative_eq!(orders[0].quantity, 180.0);
        assert!(orders[0].reduce_only);
        assert_eq!(orders[1].side, OrderSide::Buy);
        assert!(exchange.get_positions().is_empty());
    }

    #[tokio::test]
    async fn test_close_failure_still_closes_other_leg() {
        let exchange = MockExchange::new()
            .with_position("ALTUSDT", PositionSide::Long, 180.0, 1.0)
            .with_position("ZILUSDT", PositionSide::Short, 4900.0, -0.5)
            .reject_orders_for("ALTUSDT");
        let err = executor(&exchange).close_pair(&position()).await.unwrap_err();

        match err {
            ExecutionError::CloseFailed { symbols, .. } => assert_eq!(symbols, vec!["ALTUSDT"]),
            other => panic!("expected close failure, got {other:?}"),
        }
        let orders = exchange.get_orders();
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].symbol, "ZILUSDT");
    }
}
