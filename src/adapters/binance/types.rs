//! Binance Futures Wire Types
//!
//! Response bodies of the USDⓈ-M futures REST API and their conversion into
//! the provider-neutral port types. Binance encodes decimals as strings.

use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::prelude::*;
use serde::Deserialize;

use crate::ports::exchange::{
    Balance, ExchangeError, Ohlcv, OrderReceipt, OrderSide, PositionSide, PositionSnapshot,
};

/// Intervals accepted by `/fapi/v1/klines`
pub const INTERVALS: &[&str] = &[
    "1m", "3m", "5m", "15m", "30m", "1h", "2h", "4h", "6h", "8h", "12h", "1d", "3d", "1w", "1M",
];

/// Largest page `/fapi/v1/klines` serves
pub const MAX_KLINES: usize = 1500;

/// Error body returned with non-2xx responses
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorBody {
    pub code: i64,
    pub msg: String,
}

impl ApiErrorBody {
    /// Signature, key and permission failures
    pub fn is_auth_failure(&self) -> bool {
        matches!(self.code, -1022 | -2014 | -2015)
    }

    pub fn into_error(self) -> ExchangeError {
        if self.is_auth_failure() {
            ExchangeError::Authentication(format!("{} ({})", self.msg, self.code))
        } else {
            ExchangeError::Rejected {
                code: self.code,
                message: self.msg,
            }
        }
    }
}

/// Entry of `/fapi/v2/balance`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetBalance {
    pub asset: String,
    pub balance: String,
    pub available_balance: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PriceTicker {
    pub symbol: String,
    pub price: String,
}

/// Entry of `/fapi/v2/positionRisk`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionRisk {
    pub symbol: String,
    pub position_amt: String,
    #[serde(rename = "unRealizedProfit")]
    pub unrealized_profit: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderResponse {
    pub order_id: i64,
    pub symbol: String,
    pub status: String,
    pub side: String,
    pub orig_qty: String,
    pub executed_qty: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExchangeInfo {
    pub symbols: Vec<SymbolInfo>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SymbolInfo {
    pub symbol: String,
    #[serde(default)]
    pub filters: Vec<serde_json::Value>,
}

/// Quantity constraints of a symbol's `LOT_SIZE` filter
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LotSize {
    pub step_size: Decimal,
    pub min_qty: Decimal,
}

impl SymbolInfo {
    pub fn lot_size(&self) -> Option<LotSize> {
        let filter = self
            .filters
            .iter()
            .find(|f| f.get("filterType").and_then(|v| v.as_str()) == Some("LOT_SIZE"))?;
        let step_size = filter.get("stepSize")?.as_str()?.parse::<Decimal>().ok()?;
        let min_qty = filter.get("minQty")?.as_str()?.parse::<Decimal>().ok()?;
        Some(LotSize { step_size, min_qty })
    }
}

impl LotSize {
    /// Round a quantity down to the step and render it for the order query.
    /// Quantities below `min_qty` after rounding are rejected.
    pub fn format_quantity(&self, symbol: &str, quantity: f64) -> Result<String, ExchangeError> {
        let qty = Decimal::from_f64(quantity).ok_or_else(|| {
            ExchangeError::InvalidParameters(format!("{} quantity {} is not representable", symbol, quantity))
        })?;
        let rounded = if self.step_size.is_zero() {
            qty
        } else {
            (qty / self.step_size).floor() * self.step_size
        };
        if rounded <= Decimal::ZERO || rounded < self.min_qty {
            return Err(ExchangeError::InvalidParameters(format!(
                "{} quantity {} is below the minimum {}",
                symbol, quantity, self.min_qty
            )));
        }
        Ok(rounded.normalize().to_string())
    }
}

pub(crate) fn parse_decimal(field: &str, raw: &str) -> Result<f64, ExchangeError> {
    raw.parse::<f64>()
        .map_err(|e| ExchangeError::ParseError(format!("{} '{}': {}", field, raw, e)))
}

/// Pick the settlement asset out of `/fapi/v2/balance`
pub fn balance_for(assets: &[AssetBalance], asset: &str) -> Result<Balance, ExchangeError> {
    let entry = assets
        .iter()
        .find(|a| a.asset.eq_ignore_ascii_case(asset))
        .ok_or_else(|| ExchangeError::ParseError(format!("no {} balance in account", asset)))?;
    Ok(Balance {
        free: parse_decimal("availableBalance", &entry.available_balance)?,
        total: parse_decimal("balance", &entry.balance)?,
    })
}

/// Klines arrive as positional arrays: `[openTime, open, high, low, close, volume, ...]`
pub fn parse_klines(rows: &[serde_json::Value]) -> Result<Vec<Ohlcv>, ExchangeError> {
    rows.iter().map(parse_kline).collect()
}

fn parse_kline(row: &serde_json::Value) -> Result<Ohlcv, ExchangeError> {
    let cells = row
        .as_array()
        .filter(|c| c.len() >= 6)
        .ok_or_else(|| ExchangeError::ParseError(format!("malformed kline: {}", row)))?;

    let open_ms = cells[0]
        .as_i64()
        .ok_or_else(|| ExchangeError::ParseError(format!("kline open time: {}", cells[0])))?;
    let timestamp = millis_to_utc(open_ms)?;

    let field = |idx: usize, name: &str| -> Result<f64, ExchangeError> {
        match &cells[idx] {
            serde_json::Value::String(s) => parse_decimal(name, s),
            serde_json::Value::Number(n) => n
                .as_f64()
                .ok_or_else(|| ExchangeError::ParseError(format!("kline {}: {}", name, n))),
            other => Err(ExchangeError::ParseError(format!("kline {}: {}", name, other))),
        }
    };

    Ok(Ohlcv {
        timestamp,
        open: field(1, "open")?,
        high: field(2, "high")?,
        low: field(3, "low")?,
        close: field(4, "close")?,
        volume: field(5, "volume")?,
    })
}

pub(crate) fn millis_to_utc(ms: i64) -> Result<DateTime<Utc>, ExchangeError> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .ok_or_else(|| ExchangeError::ParseError(format!("timestamp out of range: {}", ms)))
}

/// Non-zero positions; one-way mode reports shorts as a negative amount
pub fn positions_from_risk(rows: &[PositionRisk]) -> Result<Vec<PositionSnapshot>, ExchangeError> {
    let mut positions = Vec::new();
    for row in rows {
        let amount = parse_decimal("positionAmt", &row.position_amt)?;
        if amount == 0.0 {
            continue;
        }
        positions.push(PositionSnapshot {
            symbol: row.symbol.clone(),
            side: if amount > 0.0 { PositionSide::Long } else { PositionSide::Short },
            contracts: amount.abs(),
            unrealized_pnl: parse_decimal("unRealizedProfit", &row.unrealized_profit)?,
        });
    }
    Ok(positions)
}

impl OrderResponse {
    pub fn into_receipt(self) -> Result<OrderReceipt, ExchangeError> {
        let side = match self.side.as_str() {
            "BUY" => OrderSide::Buy,
            "SELL" => OrderSide::Sell,
            other => return Err(ExchangeError::ParseError(format!("order side '{}'", other))),
        };
        Ok(OrderReceipt {
            id: self.order_id.to_string(),
            requested: parse_decimal("origQty", &self.orig_qty)?,
            filled: parse_decimal("executedQty", &self.executed_qty)?,
            symbol: self.symbol,
            side,
            status: self.status,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rust_decimal_macros::dec;

    #[test]
    fn test_error_body_mapping() {
        let body: ApiErrorBody =
            serde_json::from_str(r#"{"code":-2019,"msg":"Margin is insufficient."}"#).unwrap();
        assert_eq!(
            body.into_error(),
            ExchangeError::Rejected { code: -2019, message: "Margin is insufficient.".into() }
        );

        let auth: ApiErrorBody =
            serde_json::from_str(r#"{"code":-2015,"msg":"Invalid API-key, IP, or permissions for action."}"#)
                .unwrap();
        assert!(matches!(auth.into_error(), ExchangeError::Authentication(_)));
    }

    #[test]
    fn test_balance_for_settlement_asset() {
        let assets: Vec<AssetBalance> = serde_json::from_str(
            r#"[
                {"accountAlias":"SgsR","asset":"BNB","balance":"0.5","availableBalance":"0.5"},
                {"accountAlias":"SgsR","asset":"USDT","balance":"1200.50","availableBalance":"830.25"}
            ]"#,
        )
        .unwrap();

        let balance = balance_for(&assets, "USDT").unwrap();
        assert_relative_eq!(balance.total, 1200.50);
        assert_relative_eq!(balance.free, 830.25);

        assert!(balance_for(&assets, "BUSD").is_err());
    }

    #[test]
    fn test_parse_klines() {
        let rows: Vec<serde_json::Value> = serde_json::from_str(
            r#"[
                [1700000000000,"35000.1","35100.0","34900.5","35050.2","120.5",1700003599999,"0",10,"0","0","0"],
                [1700003600000,"35050.2","35200.0","35000.0","35180.0","98.1",1700007199999,"0",8,"0","0","0"]
            ]"#,
        )
        .unwrap();

        let candles = parse_klines(&rows).unwrap();
        assert_eq!(candles.len(), 2);
        assert_eq!(candles[0].timestamp.timestamp(), 1_700_000_000);
        assert_relative_eq!(candles[1].close, 35180.0);
        assert!(candles[0].timestamp < candles[1].timestamp);
    }

    #[test]
    fn test_parse_klines_rejects_short_rows() {
        let rows: Vec<serde_json::Value> =
            serde_json::from_str(r#"[[1700000000000,"1.0","1.0"]]"#).unwrap();
        assert!(matches!(parse_klines(&rows), Err(ExchangeError::ParseError(_))));
    }

    #[test]
    fn test_positions_from_risk() {
        let rows: Vec<PositionRisk> = serde_json::from_str(
            r#"[
                {"symbol":"ETHUSDT","positionAmt":"0.500","entryPrice":"2000","unRealizedProfit":"12.5"},
                {"symbol":"BTCUSDT","positionAmt":"-0.010","entryPrice":"35000","unRealizedProfit":"-3.1"},
                {"symbol":"XRPUSDT","positionAmt":"0.0","entryPrice":"0","unRealizedProfit":"0.0"}
            ]"#,
        )
        .unwrap();

        let positions = positions_from_risk(&rows).unwrap();
        assert_eq!(positions.len(), 2);
        assert_eq!(positions[0].side, PositionSide::Long);
        assert_eq!(positions[1].side, PositionSide::Short);
        assert_relative_eq!(positions[1].contracts, 0.01);
        assert_relative_eq!(positions[1].unrealized_pnl, -3.1);
    }

    #[test]
    fn test_lot_size_rounding() {
        let info: SymbolInfo = serde_json::from_str(
            r#"{"symbol":"ETHUSDT","filters":[
                {"filterType":"PRICE_FILTER","tickSize":"0.01"},
                {"filterType":"LOT_SIZE","stepSize":"0.001","minQty":"0.001","maxQty":"10000"}
            ]}"#,
        )
        .unwrap();
        let lot = info.lot_size().unwrap();
        assert_eq!(lot, LotSize { step_size: dec!(0.001), min_qty: dec!(0.001) });

        assert_eq!(lot.format_quantity("ETHUSDT", 0.123456).unwrap(), "0.123");
        assert_eq!(lot.format_quantity("ETHUSDT", 2.0).unwrap(), "2");
        assert!(lot.format_quantity("ETHUSDT", 0.0004).is_err());
    }

    #[test]
    fn test_order_receipt() {
        let response: OrderResponse = serde_json::from_str(
            r#"{"orderId":283194212,"symbol":"ETHUSDT","status":"FILLED","clientOrderId":"x",
                "side":"SELL","type":"MARKET","origQty":"0.500","executedQty":"0.500","avgPrice":"2001.2"}"#,
        )
        .unwrap();
        let receipt = response.into_receipt().unwrap();
        assert_eq!(receipt.id, "283194212");
        assert_eq!(receipt.side, OrderSide::Sell);
        assert_relative_eq!(receipt.filled, 0.5);
    }
}
