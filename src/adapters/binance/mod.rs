//! Binance Adapter
//!
//! Implementation of the ExchangePort for Binance USDⓈ-M perpetual futures.
//! Handles request signing, candle and position parsing, and lot-size
//! rounding of market order quantities.

mod client;
mod types;

pub use client::{encode_query, sign, BinanceClient, BinanceConfig};
pub use types::{LotSize, INTERVALS};
