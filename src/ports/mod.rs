//! Ports Layer - Trait definitions for external dependencies
//!
//! This module defines the interfaces (ports) that adapters must implement.
//! Following hexagonal architecture, these traits abstract:
//! - The exchange account (balances, candles, positions, market orders)
//! - Alert delivery
//! - Wall-clock time and sleeping
//! - Persistence of the pipeline's statistics tables

pub mod exchange;
pub mod alerts;
pub mod clock;
pub mod store;

#[cfg(any(test, feature = "test-utils"))]
pub mod mocks;

pub use exchange::{
    Balance, ExchangeError, ExchangePort, Ohlcv, OrderReceipt, OrderRequest, OrderSide,
    PositionSide, PositionSnapshot, Ticker, with_timeout,
};
pub use alerts::{notify, AlertError, AlertPort};
pub use clock::{Clock, SystemClock};
pub use store::{StatsStore, StoreError};
