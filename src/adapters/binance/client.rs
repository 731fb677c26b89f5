//! Binance Futures Client
//!
//! Signed REST client for the USDⓈ-M futures API. Signed endpoints carry
//! `timestamp` and `recvWindow` in the query and an HMAC-SHA256 `signature`
//! over it, with the key in the `X-MBX-APIKEY` header.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use sha2::Sha256;
use tokio::sync::RwLock;

use crate::ports::exchange::{
    Balance, ExchangeError, ExchangePort, Ohlcv, OrderReceipt, OrderRequest, PositionSnapshot,
    Ticker,
};
use super::types::{
    balance_for, parse_decimal, parse_klines, positions_from_risk, ApiErrorBody, AssetBalance,
    ExchangeInfo, LotSize, OrderResponse, PositionRisk, PriceTicker, INTERVALS, MAX_KLINES,
};

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone)]
pub struct BinanceConfig {
    pub base_url: String,
    pub api_key: String,
    pub api_secret: String,
    /// Milliseconds a signed request stays valid after its timestamp
    pub recv_window_ms: u64,
    pub timeout: Duration,
    pub max_retries: u32,
    /// Margin asset reported by `fetch_balance`
    pub settlement_asset: String,
}

impl Default for BinanceConfig {
    fn default() -> Self {
        Self {
            base_url: "https://fapi.binance.com".to_string(),
            api_key: String::new(),
            api_secret: String::new(),
            recv_window_ms: 5000,
            timeout: Duration::from_secs(10),
            max_retries: 3,
            settlement_asset: "USDT".to_string(),
        }
    }
}

pub struct BinanceClient {
    config: BinanceConfig,
    http: Client,
    lot_sizes: RwLock<HashMap<String, LotSize>>,
}

/// Hex HMAC-SHA256 of the query string
pub fn sign(secret: &str, query: &str) -> Result<String, ExchangeError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| ExchangeError::Authentication(format!("invalid API secret: {}", e)))?;
    mac.update(query.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Render `key=value` pairs in order, joined by `&`
pub fn encode_query(params: &[(&str, String)]) -> String {
    params
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&")
}

impl BinanceClient {
    pub fn new(config: BinanceConfig) -> Result<Self, ExchangeError> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ExchangeError::ApiError(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            config,
            http,
            lot_sizes: RwLock::new(HashMap::new()),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    fn has_credentials(&self) -> bool {
        !self.config.api_key.is_empty() && !self.config.api_secret.is_empty()
    }

    /// Append timestamp, recvWindow and signature to the parameters
    fn signed_query(&self, params: &[(&str, String)]) -> Result<String, ExchangeError> {
        if !self.has_credentials() {
            return Err(ExchangeError::Authentication(
                "API key and secret are required for account endpoints".into(),
            ));
        }
        let mut all: Vec<(&str, String)> = params.to_vec();
        all.push(("recvWindow", self.config.recv_window_ms.to_string()));
        all.push(("timestamp", chrono::Utc::now().timestamp_millis().to_string()));
        let query = encode_query(&all);
        let signature = sign(&self.config.api_secret, &query)?;
        Ok(format!("{}&signature={}", query, signature))
    }

    fn request(&self, method: Method, path: &str, query: &str) -> RequestBuilder {
        let url = if query.is_empty() {
            format!("{}{}", self.config.base_url, path)
        } else {
            format!("{}{}?{}", self.config.base_url, path, query)
        };
        let mut req = self.http.request(method, url);
        if !self.config.api_key.is_empty() {
            req = req.header("X-MBX-APIKEY", &self.config.api_key);
        }
        req
    }

    async fn public_get<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<T, ExchangeError> {
        let query = encode_query(params);
        let response = self
            .execute_with_retry(|| Ok(self.request(Method::GET, path, &query)))
            .await?;
        self.handle_response(response).await
    }

    /// Signed reads are re-signed on every attempt so the timestamp stays fresh
    async fn signed_get<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<T, ExchangeError> {
        let response = self
            .execute_with_retry(|| {
                let query = self.signed_query(params)?;
                Ok(self.request(Method::GET, path, &query))
            })
            .await?;
        self.handle_response(response).await
    }

    /// Orders are sent once; a retried POST could open a second position
    async fn signed_post<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<T, ExchangeError> {
        let query = self.signed_query(params)?;
        let response = self
            .request(Method::POST, path, &query)
            .send()
            .await
            .map_err(|e| ExchangeError::ApiError(e.to_string()))?;
        self.handle_response(response).await
    }

    /// Retry on rate limiting (429/418) and server errors with backoff
    async fn execute_with_retry<F>(&self, build: F) -> Result<reqwest::Response, ExchangeError>
    where
        F: Fn() -> Result<RequestBuilder, ExchangeError>,
    {
        let mut last_error = None;

        for attempt in 0..self.config.max_retries.max(1) {
            let request = build()?;
            match request.send().await {
                Ok(response) => {
                    let status = response.status();
                    if status == StatusCode::TOO_MANY_REQUESTS || status.as_u16() == 418 {
                        let backoff = Duration::from_secs(2u64.pow(attempt + 1));
                        tracing::warn!(
                            "Rate limited ({}), backing off for {:?} (attempt {}/{})",
                            status, backoff, attempt + 1, self.config.max_retries
                        );
                        last_error = Some(ExchangeError::ApiError(format!("Rate limited: {}", status)));
                        tokio::time::sleep(backoff).await;
                        continue;
                    }
                    if status.is_server_error() {
                        last_error = Some(ExchangeError::ApiError(format!("Server error: {}", status)));
                        tokio::time::sleep(Duration::from_millis(500 * (attempt as u64 + 1))).await;
                        continue;
                    }
                    return Ok(response);
                }
                Err(e) => {
                    last_error = Some(if e.is_timeout() {
                        ExchangeError::Timeout(self.config.timeout)
                    } else {
                        ExchangeError::ApiError(e.to_string())
                    });
                    tokio::time::sleep(Duration::from_millis(500 * (attempt as u64 + 1))).await;
                }
            }
        }

        Err(last_error.unwrap_or_else(|| ExchangeError::ApiError("Max retries exceeded".into())))
    }

    async fn handle_response<T: DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T, ExchangeError> {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ExchangeError::ApiError(format!("Failed to read response: {}", e)))?;

        if !status.is_success() {
            return Err(match serde_json::from_str::<ApiErrorBody>(&body) {
                Ok(api_error) => api_error.into_error(),
                Err(_) => ExchangeError::ApiError(format!("HTTP {}: {}", status, body)),
            });
        }

        serde_json::from_str(&body)
            .map_err(|e| ExchangeError::ParseError(format!("Failed to parse response: {}", e)))
    }

    /// Lot size of a symbol, loading `exchangeInfo` on first use
    async fn lot_size(&self, symbol: &str) -> Result<LotSize, ExchangeError> {
        if let Some(lot) = self.lot_sizes.read().await.get(symbol) {
            return Ok(*lot);
        }

        let info: ExchangeInfo = self.public_get("/fapi/v1/exchangeInfo", &[]).await?;
        let mut cache = self.lot_sizes.write().await;
        for entry in &info.symbols {
            if let Some(lot) = entry.lot_size() {
                cache.insert(entry.symbol.clone(), lot);
            }
        }
        tracing::debug!("Cached lot sizes for {} symbols", cache.len());

        cache
            .get(symbol)
            .copied()
            .ok_or_else(|| ExchangeError::UnknownSymbol(symbol.to_string()))
    }
}

#[async_trait]
impl ExchangePort for BinanceClient {
    async fn fetch_balance(&self) -> Result<Balance, ExchangeError> {
        let assets: Vec<AssetBalance> = self.signed_get("/fapi/v2/balance", &[]).await?;
        balance_for(&assets, &self.config.settlement_asset)
    }

    async fn fetch_ticker(&self, symbol: &str) -> Result<Ticker, ExchangeError> {
        let ticker: PriceTicker = self
            .public_get("/fapi/v1/ticker/price", &[("symbol", symbol.to_string())])
            .await?;
        Ok(Ticker {
            last_price: parse_decimal("price", &ticker.price)?,
            symbol: ticker.symbol,
        })
    }

    async fn fetch_ohlcv(
        &self,
        symbol: &str,
        timeframe: &str,
        limit: usize,
    ) -> Result<Vec<Ohlcv>, ExchangeError> {
        if !INTERVALS.contains(&timeframe) {
            return Err(ExchangeError::InvalidParameters(format!(
                "unsupported timeframe '{}'",
                timeframe
            )));
        }
        if limit == 0 {
            return Ok(Vec::new());
        }
        if limit > MAX_KLINES {
            tracing::warn!("Requested {} candles for {}, capping at {}", limit, symbol, MAX_KLINES);
        }

        let rows: Vec<serde_json::Value> = self
            .public_get(
                "/fapi/v1/klines",
                &[
                    ("symbol", symbol.to_string()),
                    ("interval", timeframe.to_string()),
                    ("limit", limit.min(MAX_KLINES).to_string()),
                ],
            )
            .await?;
        parse_klines(&rows)
    }

    async fn fetch_positions(&self) -> Result<Vec<PositionSnapshot>, ExchangeError> {
        let rows: Vec<PositionRisk> = self.signed_get("/fapi/v2/positionRisk", &[]).await?;
        positions_from_risk(&rows)
    }

    async fn create_market_order(&self, request: OrderRequest) -> Result<OrderReceipt, ExchangeError> {
        if !request.quantity.is_finite() || request.quantity <= 0.0 {
            return Err(ExchangeError::InvalidParameters(format!(
                "{} quantity must be positive, got {}",
                request.symbol, request.quantity
            )));
        }
        let lot = self.lot_size(&request.symbol).await?;
        let quantity = lot.format_quantity(&request.symbol, request.quantity)?;

        let mut params = vec![
            ("symbol", request.symbol.clone()),
            ("side", request.side.as_str().to_string()),
            ("type", "MARKET".to_string()),
            ("quantity", quantity.clone()),
            ("newOrderRespType", "RESULT".to_string()),
        ];
        if request.reduce_only {
            params.push(("reduceOnly", "true".to_string()));
        }

        tracing::info!(
            "Placing {} {} {} @ MARKET{}",
            request.side,
            quantity,
            request.symbol,
            if request.reduce_only { " (reduce-only)" } else { "" }
        );

        let response: OrderResponse = self.signed_post("/fapi/v1/order", &params).await?;
        let receipt = response.into_receipt()?;
        tracing::info!("Order accepted: {}", receipt);
        Ok(receipt)
    }
}
