//! coint-pairs - Cointegration Pairs Trading Library
//!
//! Hourly statistical-arbitrage engine for Binance USDⓈ-M perpetual futures.
//!
//! # Modules
//!
//! - `domain`: Core types (PairKey, PriceSeries, PairPosition, statistics tables)
//! - `ports`: Trait abstractions (ExchangePort, AlertPort, Clock, StatsStore)
//! - `strategy`: Statistics (Engle-Granger cointegration, z-scores, half-life, ranking)
//! - `adapters`: External implementations (Binance, Telegram, JSON files, CLI)
//! - `config`: Configuration loading and validation
//! - `application`: Candidate pipeline, executor, position monitor and hourly loop

pub mod domain;
pub mod ports;
pub mod strategy;
pub mod adapters;
pub mod config;
pub mod application;
