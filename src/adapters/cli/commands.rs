//! CLI Command Handlers
//!
//! Implementation of all CLI commands for the pairs bot.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};

use crate::adapters::binance::BinanceClient;
use crate::adapters::json_store::JsonFileStore;
use crate::adapters::telegram::{LogAlerts, TelegramAlerts};
use crate::application::{
    pnl_percent, CandidatePipeline, EvaluationSnapshot, Executor, PairsOrchestrator,
    PositionMonitor,
};
use crate::config::{load_config, Config};
use crate::ports::{AlertPort, ExchangePort, StatsStore, SystemClock};

/// Poll interval while waiting for in-flight entry orders on shutdown
const EXECUTION_POLL: Duration = Duration::from_millis(200);

/// coint-pairs - Cointegration pairs trading on Binance USDT-M futures
#[derive(Parser, Debug)]
#[command(
    name = "coint-pairs",
    version = env!("CARGO_PKG_VERSION"),
    author = env!("CARGO_PKG_AUTHORS"),
    about = "Cointegration pairs trading on Binance USDT-M futures",
    long_about = "Every hour coint-pairs ranks cointegrated futures pairs by spread z-score, \
                  opens one hedged pair on the most stretched spread and closes it once the \
                  spread reverts to its mean or the account stop loss is hit."
)]
pub struct CliApp {
    /// The command to execute
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the hourly trading loop
    Run(RunCmd),

    /// Refresh the candidate tables once and print the ranking
    Scan(ScanCmd),

    /// Show balance, open positions and halt state
    Status(StatusCmd),

    /// Clear the halt marker after a partial fill or failed close
    Resume(ResumeCmd),
}

impl Command {
    pub fn config_path(&self) -> &Path {
        match self {
            Command::Run(cmd) => &cmd.config,
            Command::Scan(cmd) => &cmd.config,
            Command::Status(cmd) => &cmd.config,
            Command::Resume(cmd) => &cmd.config,
        }
    }
}

/// Start trading loop
#[derive(Parser, Debug)]
pub struct RunCmd {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", default_value = "config/example.toml")]
    pub config: PathBuf,

    /// Wait for the next hourly slot before the first cycle
    #[arg(long)]
    pub wait_for_hour: bool,
}

/// Run the refresh pipeline once
#[derive(Parser, Debug)]
pub struct ScanCmd {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", default_value = "config/example.toml")]
    pub config: PathBuf,

    /// Number of pairs shown at each end of the ranking
    #[arg(short, long, value_name = "N", default_value = "5")]
    pub top: usize,
}

/// Check bot status
#[derive(Parser, Debug)]
pub struct StatusCmd {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", default_value = "config/example.toml")]
    pub config: PathBuf,
}

/// Resume trading after a halt
#[derive(Parser, Debug)]
pub struct ResumeCmd {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", default_value = "config/example.toml")]
    pub config: PathBuf,
}

/// Execute the CLI command
pub async fn execute(app: CliApp) -> Result<()> {
    let loaded = load_config(app.command.config_path());
    let level = loaded
        .as_ref()
        .map(|c| c.logging.level.clone())
        .unwrap_or_else(|_| "info".to_string());
    init_logging(app.verbose, app.debug, &level);

    let config = loaded.with_context(|| {
        format!("Failed to load configuration from {}", app.command.config_path().display())
    })?;

    match app.command {
        Command::Run(cmd) => run_command(cmd, config).await,
        Command::Scan(cmd) => scan_command(cmd, config).await,
        Command::Status(_) => status_command(config).await,
        Command::Resume(_) => resume_command(config),
    }
}

/// Initialize logging; RUST_LOG wins, then --debug, --verbose, the config level
pub fn init_logging(verbose: bool, debug: bool, config_level: &str) {
    use tracing_subscriber::{fmt, EnvFilter};

    let fallback = if debug {
        "debug"
    } else if verbose {
        "info"
    } else {
        config_level
    };
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(fallback))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    // A second init (tests, embedding) keeps the first subscriber
    let _ = fmt().with_env_filter(filter).with_target(false).try_init();
}

fn build_exchange(config: &Config) -> Result<Arc<BinanceClient>> {
    let client = BinanceClient::new(config.exchange.binance_config())
        .context("Failed to create Binance client")?;
    Ok(Arc::new(client))
}

fn require_credentials(config: &Config) -> Result<()> {
    if config.exchange.get_api_key().is_none() || config.exchange.get_api_secret().is_none() {
        bail!(
            "Binance credentials missing.\n\n\
             Set api_key/api_secret under [exchange] or export BINANCE_API_KEY and \
             BINANCE_API_SECRET (a .env file in the working directory also works)."
        );
    }
    Ok(())
}

fn build_store(config: &Config) -> Arc<JsonFileStore> {
    let store = JsonFileStore::new(config.storage.data_dir());
    tracing::info!("Data directory: {}", store.data_dir().display());
    Arc::new(store)
}

/// Telegram when enabled and configured, otherwise log-only alerts
fn build_alerts(config: &Config) -> Arc<dyn AlertPort> {
    if !config.alerts.telegram_enabled {
        return Arc::new(LogAlerts);
    }
    let token = config.alerts.get_bot_token().unwrap_or_default();
    let chat_id = config.alerts.get_chat_id().unwrap_or_default();
    match TelegramAlerts::new(token, chat_id) {
        Ok(telegram) => Arc::new(telegram),
        Err(e) => {
            tracing::warn!("Telegram alerts disabled: {}", e);
            Arc::new(LogAlerts)
        }
    }
}

fn build_pipeline(
    config: &Config,
    exchange: Arc<dyn ExchangePort>,
    store: Arc<dyn StatsStore>,
) -> CandidatePipeline {
    CandidatePipeline::new(exchange, store, config.universe_settings(), config.strategy_config())
        .with_request_timeout(config.request_timeout())
}

/// Handle run command
async fn run_command(cmd: RunCmd, config: Config) -> Result<()> {
    require_credentials(&config)?;
    tracing::info!("Starting coint-pairs with {}", cmd.config.display());

    let exchange: Arc<dyn ExchangePort> = build_exchange(&config)?;
    let store: Arc<dyn StatsStore> = build_store(&config);
    let alerts = build_alerts(&config);
    let clock = Arc::new(SystemClock);

    let pipeline = build_pipeline(&config, exchange.clone(), store.clone());
    let executor = Executor::new(exchange.clone()).with_request_timeout(config.request_timeout());
    let monitor = PositionMonitor::new(
        exchange.clone(),
        alerts.clone(),
        clock.clone(),
        config.monitor_settings(),
    );

    let orchestrator = PairsOrchestrator::new(
        exchange,
        alerts,
        clock,
        store,
        pipeline,
        executor,
        monitor,
        config.strategy_config(),
    )
    .with_schedule(config.schedule_settings());

    let run = orchestrator.run(cmd.wait_for_hour);
    tokio::pin!(run);

    tokio::select! {
        result = &mut run => {
            result.context("Orchestrator failed")?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
            orchestrator.stop().await;

            // Dropping the loop mid-order would leave the fill state unknown
            while orchestrator.is_executing().await {
                tracing::warn!("Entry orders in flight, waiting for both legs before exiting");
                tokio::select! {
                    result = &mut run => {
                        result.context("Orchestrator failed")?;
                        break;
                    }
                    _ = tokio::time::sleep(EXECUTION_POLL) => {}
                }
            }
            tracing::warn!("Open positions, if any, stay open; the next run skips cycles until they are closed");
        }
    }

    tracing::info!("coint-pairs stopped");
    Ok(())
}

/// Handle scan command
async fn scan_command(cmd: ScanCmd, config: Config) -> Result<()> {
    let exchange: Arc<dyn ExchangePort> = build_exchange(&config)?;
    let store: Arc<dyn StatsStore> = build_store(&config);
    let pipeline = build_pipeline(&config, exchange, store);

    let snapshot = pipeline
        .refresh(Utc::now())
        .await
        .context("Candidate refresh failed")?;

    print_snapshot(&snapshot, cmd.top);
    Ok(())
}

fn print_snapshot(snapshot: &EvaluationSnapshot, top: usize) {
    println!("Evaluation at {}", snapshot.evaluated_at.format("%Y-%m-%d %H:%M UTC"));
    println!(
        "  Symbols loaded: {}  Pairs tested: {}  Candidates: {}",
        snapshot.symbols_loaded,
        snapshot.pairs_tested,
        snapshot.cointegration.len()
    );

    let mut ranking = snapshot.ranking_row.clone();
    ranking.sort_by(|a, b| a.1.total_cmp(&b.1));

    let print_row = |pair: &crate::domain::PairKey, z: f64| {
        let stats = snapshot.pair_stats.lookup(pair);
        let half_life = stats
            .and_then(|s| s.half_life)
            .map(|h| format!("{:.1}", h))
            .unwrap_or_else(|| "-".to_string());
        let mean = stats
            .map(|s| format!("{:+.3}", s.mean_zscore))
            .unwrap_or_else(|| "-".to_string());
        println!("  {:<24} z={:+.3}  mean={}  half-life={}", pair.label(), z, mean, half_life);
    };

    println!();
    println!("Most negative z-scores (long first leg):");
    for (pair, z) in ranking.iter().take(top) {
        print_row(pair, *z);
    }

    println!();
    println!("Most positive z-scores:");
    for (pair, z) in ranking.iter().rev().take(top) {
        print_row(pair, *z);
    }
}

/// Handle status command
async fn status_command(config: Config) -> Result<()> {
    require_credentials(&config)?;
    let exchange = build_exchange(&config)?;
    let store = build_store(&config);

    let balance = exchange.fetch_balance().await.context("Failed to fetch balance")?;
    let positions = exchange.fetch_positions().await.context("Failed to fetch positions")?;

    println!(
        "Balance: {:.2} {} total, {:.2} free",
        balance.total, config.exchange.settlement_asset, balance.free
    );

    if positions.is_empty() {
        println!("Open positions: none");
    } else {
        println!("Open positions:");
        for p in &positions {
            println!(
                "  {:<12} {:<5} {:>14.6} contracts  uPnL {:+.2}",
                p.symbol,
                format!("{:?}", p.side).to_uppercase(),
                p.contracts,
                p.unrealized_pnl
            );
        }
        let unrealized: f64 = positions.iter().map(|p| p.unrealized_pnl).sum();
        match pnl_percent(unrealized, balance.total) {
            Ok(pct) => println!("Aggregate PnL: {:+.2} ({:+.3}%)", unrealized, pct),
            Err(e) => println!("Aggregate PnL: {:+.2} ({})", unrealized, e),
        }
    }

    match store.load_halt().context("Failed to read halt marker")? {
        Some(halt) => println!("Trading: HALTED since {} - {}", halt.at, halt.reason),
        None => println!("Trading: active"),
    }

    Ok(())
}

/// Handle resume command
fn resume_command(config: Config) -> Result<()> {
    let store = build_store(&config);

    match store.load_halt().context("Failed to read halt marker")? {
        None => {
            println!("Trading is NOT halted. No action needed.");
        }
        Some(halt) => {
            println!("Halted since {}: {}", halt.at, halt.reason);
            println!("Make sure both legs are flat or intentionally held before resuming.");
            store.clear_halt().context("Failed to clear halt marker")?;
            tracing::info!("Halt marker cleared by operator");
            println!("Halt cleared. The next cycle will run normally.");
        }
    }
    Ok(())
}
