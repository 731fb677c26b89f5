//! Price Series
//!
//! Ordered close prices for one instrument and the inner-join alignment of
//! two series onto a common timestamp index.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum PriceSeriesError {
    #[error("Timestamps must be strictly increasing ({symbol} at index {index})")]
    NotIncreasing { symbol: String, index: usize },
    #[error("Non-finite price for {symbol} at index {index}")]
    NonFinitePrice { symbol: String, index: usize },
}

/// A single observation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub timestamp: DateTime<Utc>,
    pub price: f64,
}

/// Immutable, strictly time-ordered price sequence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceSeries {
    symbol: String,
    points: Vec<PricePoint>,
}

impl PriceSeries {
    pub fn new(symbol: impl Into<String>, points: Vec<PricePoint>) -> Result<Self, PriceSeriesError> {
        let symbol = symbol.into();
        for (index, point) in points.iter().enumerate() {
            if !point.price.is_finite() {
                return Err(PriceSeriesError::NonFinitePrice { symbol, index });
            }
            if index > 0 && points[index - 1].timestamp >= point.timestamp {
                return Err(PriceSeriesError::NotIncreasing { symbol, index });
            }
        }
        Ok(Self { symbol, points })
    }

    /// Build from `(timestamp, price)` tuples
    pub fn from_pairs(
        symbol: impl Into<String>,
        pairs: impl IntoIterator<Item = (DateTime<Utc>, f64)>,
    ) -> Result<Self, PriceSeriesError> {
        let points = pairs
            .into_iter()
            .map(|(timestamp, price)| PricePoint { timestamp, price })
            .collect();
        Self::new(symbol, points)
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn points(&self) -> &[PricePoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn prices(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.price).collect()
    }

    pub fn last(&self) -> Option<&PricePoint> {
        self.points.last()
    }
}

/// Two series joined on identical timestamps
#[derive(Debug, Clone, PartialEq)]
pub struct AlignedPrices {
    pub timestamps: Vec<DateTime<Utc>>,
    pub a: Vec<f64>,
    pub b: Vec<f64>,
}

impl AlignedPrices {
    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    /// Keep only the trailing `n` rows
    pub fn tail(&self, n: usize) -> AlignedPrices {
        let start = self.len().saturating_sub(n);
        AlignedPrices {
            timestamps: self.timestamps[start..].to_vec(),
            a: self.a[start..].to_vec(),
            b: self.b[start..].to_vec(),
        }
    }
}

/// Inner join on timestamp. Rows missing on either side are dropped.
pub fn align(a: &PriceSeries, b: &PriceSeries) -> AlignedPrices {
    let (pa, pb) = (a.points(), b.points());
    let capacity = pa.len().min(pb.len());
    let mut out = AlignedPrices {
        timestamps: Vec::with_capacity(capacity),
        a: Vec::with_capacity(capacity),
        b: Vec::with_capacity(capacity),
    };

    // both sides are strictly increasing, so a merge walk is enough
    let (mut i, mut j) = (0, 0);
    while i < pa.len() && j < pb.len() {
        match pa[i].timestamp.cmp(&pb[j].timestamp) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => {
                out.timestamps.push(pa[i].timestamp);
                out.a.push(pa[i].price);
                out.b.push(pb[j].price);
                i += 1;
                j += 1;
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn hour(h: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap() + Duration::hours(h)
    }

    #[test]
    fn test_rejects_unordered_timestamps() {
        let result = PriceSeries::from_pairs("BTC", vec![(hour(1), 1.0), (hour(1), 2.0)]);
        assert!(matches!(result, Err(PriceSeriesError::NotIncreasing { index: 1, .. })));
    }

    #[test]
    fn test_rejects_nan_price() {
        let result = PriceSeries::from_pairs("BTC", vec![(hour(0), f64::NAN)]);
        assert!(matches!(result, Err(PriceSeriesError::NonFinitePrice { index: 0, .. })));
    }

    #[test]
    fn test_align_drops_missing_rows() {
        let a = PriceSeries::from_pairs("A", vec![(hour(0), 1.0), (hour(1), 2.0), (hour(3), 4.0)]).unwrap();
        let b = PriceSeries::from_pairs("B", vec![(hour(1), 20.0), (hour(2), 30.0), (hour(3), 40.0)]).unwrap();

        let aligned = align(&a, &b);
        assert_eq!(aligned.timestamps, vec![hour(1), hour(3)]);
        assert_eq!(aligned.a, vec![2.0, 4.0]);
        assert_eq!(aligned.b, vec![20.0, 40.0]);
    }

    #[test]
    fn test_tail() {
        let a = PriceSeries::from_pairs("A", (0..5).map(|h| (hour(h), h as f64))).unwrap();
        let aligned = align(&a, &a.clone());
        let tail = aligned.tail(2);
        assert_eq!(tail.a, vec![3.0, 4.0]);
        assert_eq!(aligned.tail(10).len(), 5);
    }
}
