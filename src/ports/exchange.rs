//! Exchange Port
//!
//! Provider-neutral surface of a derivatives exchange account: balances,
//! tickers, candles, open positions and market orders.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ExchangeError {
    #[error("API request failed: {0}")]
    ApiError(String),
    #[error("Exchange rejected request ({code}): {message}")]
    Rejected { code: i64, message: String },
    #[error("Request timed out after {0:?}")]
    Timeout(std::time::Duration),
    #[error("Data parsing error: {0}")]
    ParseError(String),
    #[error("Unknown symbol: {0}")]
    UnknownSymbol(String),
    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),
    #[error("Authentication error: {0}")]
    Authentication(String),
}

/// Account balance in the settlement asset
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Balance {
    /// Margin available for new orders
    pub free: f64,
    /// Wallet balance including margin in use
    pub total: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticker {
    pub symbol: String,
    pub last_price: f64,
}

/// OHLCV candle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ohlcv {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionSide {
    Long,
    Short,
}

/// Open position as reported by the exchange
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionSnapshot {
    pub symbol: String,
    pub side: PositionSide,
    /// Absolute size in contracts
    pub contracts: f64,
    pub unrealized_pnl: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn opposite(self) -> Self {
        match self {
            OrderSide::Buy => OrderSide::Sell,
            OrderSide::Sell => OrderSide::Buy,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OrderSide::Buy => "BUY",
            OrderSide::Sell => "SELL",
        }
    }
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Market order request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub symbol: String,
    pub side: OrderSide,
    pub quantity: f64,
    /// Only reduce an existing position, never open or flip one
    pub reduce_only: bool,
}

impl OrderRequest {
    pub fn market(symbol: impl Into<String>, side: OrderSide, quantity: f64) -> Self {
        Self {
            symbol: symbol.into(),
            side,
            quantity,
            reduce_only: false,
        }
    }

    pub fn reduce_only(mut self) -> Self {
        self.reduce_only = true;
        self
    }
}

/// Exchange acknowledgement of a submitted order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderReceipt {
    pub id: String,
    pub symbol: String,
    pub side: OrderSide,
    pub status: String,
    pub requested: f64,
    pub filled: f64,
}

impl fmt::Display for OrderReceipt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} id={} status={} filled={}/{}",
            self.side, self.symbol, self.id, self.status, self.filled, self.requested
        )
    }
}

#[async_trait]
pub trait ExchangePort: Send + Sync {
    async fn fetch_balance(&self) -> Result<Balance, ExchangeError>;

    async fn fetch_ticker(&self, symbol: &str) -> Result<Ticker, ExchangeError>;

    /// Most recent `limit` candles, oldest first
    async fn fetch_ohlcv(
        &self,
        symbol: &str,
        timeframe: &str,
        limit: usize,
    ) -> Result<Vec<Ohlcv>, ExchangeError>;

    /// Positions with non-zero size
    async fn fetch_positions(&self) -> Result<Vec<PositionSnapshot>, ExchangeError>;

    async fn create_market_order(&self, request: OrderRequest) -> Result<OrderReceipt, ExchangeError>;

    /// Sum of open contracts across the account
    async fn open_contracts(&self) -> Result<f64, ExchangeError> {
        let positions = self.fetch_positions().await?;
        Ok(positions.iter().map(|p| p.contracts.abs()).sum())
    }
}

/// Bound an exchange call; an elapsed deadline becomes `ExchangeError::Timeout`
pub async fn with_timeout<T, F>(limit: std::time::Duration, call: F) -> Result<T, ExchangeError>
where
    F: std::future::Future<Output = Result<T, ExchangeError>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(ExchangeError::Timeout(limit)),
    }
}
