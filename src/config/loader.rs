//! Configuration Loader
//!
//! Loads and validates configuration from TOML files matching config/example.toml.
//! Every section except `[universe]` may be omitted and falls back to defaults.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::adapters::binance::{BinanceConfig, INTERVALS};
use crate::application::{MonitorSettings, ScheduleSettings, UniverseSettings};
use crate::strategy::params::StrategyConfig;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub exchange: ExchangeSection,
    pub universe: UniverseSection,
    #[serde(default)]
    pub strategy: StrategySection,
    #[serde(default)]
    pub schedule: ScheduleSection,
    #[serde(default)]
    pub storage: StorageSection,
    #[serde(default)]
    pub logging: LoggingSection,
    #[serde(default)]
    pub alerts: AlertsSection,
}

/// Exchange connection section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExchangeSection {
    /// USDⓈ-M futures REST endpoint
    pub base_url: String,
    /// API key (falls back to BINANCE_API_KEY)
    pub api_key: Option<String>,
    /// API secret (falls back to BINANCE_API_SECRET)
    pub api_secret: Option<String>,
    pub recv_window_ms: u64,
    /// HTTP client timeout
    pub timeout_secs: u64,
    /// Margin asset used for balances
    pub settlement_asset: String,
}

impl Default for ExchangeSection {
    fn default() -> Self {
        let defaults = BinanceConfig::default();
        Self {
            base_url: defaults.base_url,
            api_key: None,
            api_secret: None,
            recv_window_ms: defaults.recv_window_ms,
            timeout_secs: defaults.timeout.as_secs(),
            settlement_asset: defaults.settlement_asset,
        }
    }
}

/// Non-empty config value, else the environment variable
fn value_or_env(value: &Option<String>, var: &str) -> Option<String> {
    if let Some(ref v) = value {
        if !v.trim().is_empty() {
            return Some(v.clone());
        }
    }
    std::env::var(var).ok().filter(|v| !v.trim().is_empty())
}

impl ExchangeSection {
    pub fn get_api_key(&self) -> Option<String> {
        value_or_env(&self.api_key, "BINANCE_API_KEY")
    }

    pub fn get_api_secret(&self) -> Option<String> {
        value_or_env(&self.api_secret, "BINANCE_API_SECRET")
    }

    /// Client settings; missing credentials stay empty and fail on the first signed call
    pub fn binance_config(&self) -> BinanceConfig {
        BinanceConfig {
            base_url: self.base_url.trim_end_matches('/').to_string(),
            api_key: self.get_api_key().unwrap_or_default(),
            api_secret: self.get_api_secret().unwrap_or_default(),
            recv_window_ms: self.recv_window_ms,
            timeout: Duration::from_secs(self.timeout_secs),
            settlement_asset: self.settlement_asset.clone(),
            ..BinanceConfig::default()
        }
    }
}

/// Tradable symbols and the candle history pulled for each
#[derive(Debug, Clone, Deserialize)]
pub struct UniverseSection {
    pub symbols: Vec<String>,
    #[serde(default = "default_timeframe")]
    pub timeframe: String,
    /// Candles per symbol (480 hourly bars = 20 days)
    #[serde(default = "default_history_bars")]
    pub history_bars: usize,
    /// Pairs kept for ranking, by zero crossings
    #[serde(default = "default_max_candidates")]
    pub max_candidates: usize,
}

fn default_timeframe() -> String {
    "1h".to_string()
}

fn default_history_bars() -> usize {
    480
}

fn default_max_candidates() -> usize {
    StrategyConfig::default().max_candidates
}

/// Strategy section; see `StrategyConfig` for meanings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StrategySection {
    pub min_samples: usize,
    pub zscore_window: usize,
    pub live_window: usize,
    pub exit_tolerance: f64,
    pub stop_loss_pct: f64,
    pub leg_fraction: f64,
    pub entry_zscore_max: Option<f64>,
    pub require_cointegration: bool,
}

impl Default for StrategySection {
    fn default() -> Self {
        let d = StrategyConfig::default();
        Self {
            min_samples: d.min_samples,
            zscore_window: d.zscore_window,
            live_window: d.live_window,
            exit_tolerance: d.exit_tolerance,
            stop_loss_pct: d.stop_loss_pct,
            leg_fraction: d.leg_fraction,
            entry_zscore_max: d.entry_zscore_max,
            require_cointegration: d.require_cointegration,
        }
    }
}

/// Loop timing section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScheduleSection {
    /// Seconds after the top of the hour a cycle starts
    pub cycle_offset_secs: u64,
    /// Seconds between monitor polls
    pub poll_interval_secs: u64,
    /// Seconds between open-position re-checks
    pub guard_interval_secs: u64,
    /// Bound on each exchange call made by the loop and the monitor
    pub request_timeout_secs: u64,
}

impl Default for ScheduleSection {
    fn default() -> Self {
        Self {
            cycle_offset_secs: 60,
            poll_interval_secs: 300,
            guard_interval_secs: 300,
            request_timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageSection {
    /// Directory of the persisted tables and halt marker (`~` expanded)
    pub data_dir: String,
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            data_dir: "data".to_string(),
        }
    }
}

impl StorageSection {
    pub fn data_dir(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.data_dir).into_owned())
    }
}

/// Logging configuration section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Log level: "trace", "debug", "info", "warn", "error"
    pub level: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Alerts configuration section (optional)
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AlertsSection {
    /// Enable Telegram notifications
    #[serde(default)]
    pub telegram_enabled: bool,
    /// Telegram bot token (falls back to TELEGRAM_BOT_TOKEN)
    #[serde(default)]
    pub telegram_bot_token: Option<String>,
    /// Telegram chat ID (falls back to TELEGRAM_CHAT_ID)
    #[serde(default)]
    pub telegram_chat_id: Option<String>,
}

impl AlertsSection {
    pub fn get_bot_token(&self) -> Option<String> {
        value_or_env(&self.telegram_bot_token, "TELEGRAM_BOT_TOKEN")
    }

    pub fn get_chat_id(&self) -> Option<String> {
        value_or_env(&self.telegram_chat_id, "TELEGRAM_CHAT_ID")
    }
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("Validation failed: {0}")]
    ValidationError(String),
}

/// Load configuration from a TOML file (`~` expanded)
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let raw = path.as_ref().to_string_lossy();
    let expanded = shellexpand::tilde(&raw).into_owned();
    let content = std::fs::read_to_string(expanded)?;
    Config::from_toml_str(&content)
}

impl Config {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate all configuration parameters
    pub fn validate(&self) -> Result<(), ConfigError> {
        // Universe
        let symbols = self.universe_settings().symbols;
        if symbols.len() < 2 {
            return Err(ConfigError::ValidationError(format!(
                "universe needs at least 2 distinct symbols, got {}",
                symbols.len()
            )));
        }
        if self.universe.symbols.iter().any(|s| s.trim().is_empty()) {
            return Err(ConfigError::ValidationError(
                "universe symbols cannot be empty".to_string(),
            ));
        }
        if !INTERVALS.contains(&self.universe.timeframe.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "unsupported timeframe '{}'",
                self.universe.timeframe
            )));
        }
        if self.universe.history_bars < self.strategy.min_samples {
            return Err(ConfigError::ValidationError(format!(
                "history_bars ({}) must be >= min_samples ({})",
                self.universe.history_bars, self.strategy.min_samples
            )));
        }

        // Strategy
        self.strategy_config()
            .validate()
            .map_err(|e| ConfigError::ValidationError(e.to_string()))?;

        // Schedule
        let intervals = [
            ("poll_interval_secs", self.schedule.poll_interval_secs),
            ("guard_interval_secs", self.schedule.guard_interval_secs),
            ("request_timeout_secs", self.schedule.request_timeout_secs),
            ("timeout_secs", self.exchange.timeout_secs),
        ];
        for (name, value) in intervals {
            if value == 0 {
                return Err(ConfigError::ValidationError(format!("{} must be > 0", name)));
            }
        }
        if self.schedule.cycle_offset_secs >= 3600 {
            return Err(ConfigError::ValidationError(format!(
                "cycle_offset_secs must be < 3600, got {}",
                self.schedule.cycle_offset_secs
            )));
        }

        // Exchange
        if self.exchange.base_url.is_empty() {
            return Err(ConfigError::ValidationError(
                "base_url cannot be empty".to_string(),
            ));
        }

        if self.storage.data_dir.is_empty() {
            return Err(ConfigError::ValidationError(
                "data_dir cannot be empty".to_string(),
            ));
        }

        Ok(())
    }

    pub fn strategy_config(&self) -> StrategyConfig {
        StrategyConfig {
            min_samples: self.strategy.min_samples,
            zscore_window: self.strategy.zscore_window,
            live_window: self.strategy.live_window,
            exit_tolerance: self.strategy.exit_tolerance,
            stop_loss_pct: self.strategy.stop_loss_pct,
            leg_fraction: self.strategy.leg_fraction,
            entry_zscore_max: self.strategy.entry_zscore_max,
            require_cointegration: self.strategy.require_cointegration,
            max_candidates: self.universe.max_candidates,
        }
    }

    /// Universe with symbols upper-cased and de-duplicated in order
    pub fn universe_settings(&self) -> UniverseSettings {
        let mut symbols: Vec<String> = Vec::new();
        for symbol in &self.universe.symbols {
            let symbol = symbol.trim().to_uppercase();
            if !symbol.is_empty() && !symbols.contains(&symbol) {
                symbols.push(symbol);
            }
        }
        UniverseSettings {
            symbols,
            timeframe: self.universe.timeframe.clone(),
            history_bars: self.universe.history_bars,
        }
    }

    pub fn schedule_settings(&self) -> ScheduleSettings {
        ScheduleSettings {
            cycle_offset: Duration::from_secs(self.schedule.cycle_offset_secs),
            guard_interval: Duration::from_secs(self.schedule.guard_interval_secs),
            request_timeout: self.request_timeout(),
        }
    }

    pub fn monitor_settings(&self) -> MonitorSettings {
        MonitorSettings::from_strategy(&self.strategy_config(), self.universe.timeframe.clone())
            .with_poll_interval(Duration::from_secs(self.schedule.poll_interval_secs))
            .with_request_timeout(self.request_timeout())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.schedule.request_timeout_secs)
    }
}
