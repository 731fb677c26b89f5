//! Adapters Layer - External System Implementations
//!
//! This module contains implementations of the port traits:
//! - Binance: USDⓈ-M futures REST client (ExchangePort)
//! - Telegram: Bot API alert sink, plus a log-only fallback (AlertPort)
//! - JSON store: file-backed statistics tables and halt marker (StatsStore)
//! - CLI: Command-line interface handlers

pub mod binance;
pub mod telegram;
pub mod json_store;
pub mod cli;

pub use binance::{BinanceClient, BinanceConfig};
pub use telegram::{LogAlerts, TelegramAlerts};
pub use json_store::JsonFileStore;
pub use cli::CliApp;
