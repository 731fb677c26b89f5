//! coint-pairs - Cointegration Pairs Bot
//!
//! Hourly pairs trading on Binance USDⓈ-M futures.

use anyhow::Result;

use coint_pairs::adapters::cli;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if it exists (secrets go here, not in the config file)
    dotenvy::dotenv().ok();

    let app = cli::init();
    cli::execute(app).await
}
