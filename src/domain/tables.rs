//! Persisted Statistics Tables
//!
//! Record types shared between the refresh pipeline, the ranker and the
//! hourly loop:
//! - `CointegrationTable`: one row per cointegrated pair of the latest run
//! - `CandidateTable`: append-only z-score history, one column per pair
//! - `PairStatsTable`: mean z-score and half-life per pair
//! - `HaltRecord`: marker that blocks automatic cycling

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::pair::{lookup_either, PairKey};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum TableError {
    #[error("Evaluation at {new} is not after the latest row at {latest}")]
    OutOfOrder { new: DateTime<Utc>, latest: DateTime<Utc> },
    #[error("Pair {0} appears twice in one evaluation")]
    DuplicatePair(String),
}

/// Output of one cointegration estimate, never mutated after creation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CointegrationResult {
    pub hedge_ratio: f64,
    pub p_value: f64,
    pub t_statistic: f64,
    pub critical_value_5pct: f64,
    pub zero_crossings: usize,
    pub coint_flag: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CointegrationRecord {
    pub pair: PairKey,
    pub result: CointegrationResult,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CointegrationTable {
    pub evaluated_at: Option<DateTime<Utc>>,
    pub records: Vec<CointegrationRecord>,
}

impl CointegrationTable {
    pub fn new(evaluated_at: DateTime<Utc>, records: Vec<CointegrationRecord>) -> Self {
        Self {
            evaluated_at: Some(evaluated_at),
            records,
        }
    }

    /// Exact orientation first, then reversed
    pub fn lookup(&self, key: &PairKey) -> Option<&CointegrationRecord> {
        lookup_either(self.records.iter().map(|r| (&r.pair, r)), key).map(|(_, r)| r)
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }
}

/// One evaluation run. `zscores[i]` belongs to `CandidateTable::columns()[i]`;
/// rows written before a column existed are shorter and read as absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateRow {
    pub evaluated_at: DateTime<Utc>,
    pub zscores: Vec<Option<f64>>,
}

impl CandidateRow {
    pub fn get(&self, column: usize) -> Option<f64> {
        self.zscores.get(column).copied().flatten()
    }
}

/// Append-only ranking history
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CandidateTable {
    columns: Vec<PairKey>,
    rows: Vec<CandidateRow>,
}

impl CandidateTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn columns(&self) -> &[PairKey] {
        &self.columns
    }

    pub fn rows(&self) -> &[CandidateRow] {
        &self.rows
    }

    pub fn latest_row(&self) -> Option<&CandidateRow> {
        self.rows.last()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Append one evaluation. Unknown pairs become new trailing columns.
    pub fn append_row(
        &mut self,
        evaluated_at: DateTime<Utc>,
        values: &[(PairKey, f64)],
    ) -> Result<(), TableError> {
        if let Some(latest) = self.rows.last() {
            if evaluated_at <= latest.evaluated_at {
                return Err(TableError::OutOfOrder {
                    new: evaluated_at,
                    latest: latest.evaluated_at,
                });
            }
        }
        for (i, (pair, _)) in values.iter().enumerate() {
            if values[..i].iter().any(|(other, _)| other == pair) {
                return Err(TableError::DuplicatePair(pair.label()));
            }
        }

        for (pair, _) in values {
            if !self.columns.contains(pair) {
                self.columns.push(pair.clone());
            }
        }

        let mut zscores = vec![None; self.columns.len()];
        for (pair, z) in values {
            if let Some(idx) = self.columns.iter().position(|c| c == pair) {
                zscores[idx] = z.is_finite().then_some(*z);
            }
        }

        self.rows.push(CandidateRow { evaluated_at, zscores });
        Ok(())
    }
}

/// Mean z-score and half-life for one pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairStats {
    pub pair: PairKey,
    pub mean_zscore: f64,
    /// In bars; absent when the series does not mean-revert
    pub half_life: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PairStatsTable {
    pub evaluated_at: Option<DateTime<Utc>>,
    pub entries: Vec<PairStats>,
}

impl PairStatsTable {
    pub fn new(evaluated_at: DateTime<Utc>, entries: Vec<PairStats>) -> Self {
        Self {
            evaluated_at: Some(evaluated_at),
            entries,
        }
    }

    pub fn lookup(&self, key: &PairKey) -> Option<&PairStats> {
        lookup_either(self.entries.iter().map(|e| (&e.pair, e)), key).map(|(_, e)| e)
    }
}

/// Present while automatic cycling is halted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HaltRecord {
    pub reason: String,
    pub at: DateTime<Utc>,
}
