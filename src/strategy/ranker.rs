//! Pair Ranker
//!
//! Picks the entry candidate from the latest ranking row: the pair with the
//! algebraically smallest z-score, where `first` is cheapest relative to
//! `second`. Ties keep the earliest column.

use thiserror::Error;

use crate::domain::{CandidateTable, PairKey};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum RankError {
    #[error("No candidates: {0}")]
    NoCandidates(String),
}

/// Selected pair with its current z-score
#[derive(Debug, Clone, PartialEq)]
pub struct RankedPair {
    pub pair: PairKey,
    pub zscore: f64,
}

impl RankedPair {
    /// Buy the cheap leg
    pub fn long_symbol(&self) -> &str {
        &self.pair.first
    }

    /// Sell the rich leg
    pub fn short_symbol(&self) -> &str {
        &self.pair.second
    }
}

pub fn select_best(table: &CandidateTable) -> Result<RankedPair, RankError> {
    let row = table
        .latest_row()
        .ok_or_else(|| RankError::NoCandidates("ranking table is empty".into()))?;
    if table.columns().is_empty() {
        return Err(RankError::NoCandidates("ranking table has no pair columns".into()));
    }

    let mut best: Option<(usize, f64)> = None;
    for idx in 0..table.columns().len() {
        let Some(z) = row.get(idx) else { continue };
        // strict comparison keeps the first column on ties
        if best.map_or(true, |(_, best_z)| z < best_z) {
            best = Some((idx, z));
        }
    }

    let (idx, zscore) = best.ok_or_else(|| {
        RankError::NoCandidates(format!("latest row at {} has no z-scores", row.evaluated_at))
    })?;
    Ok(RankedPair {
        pair: table.columns()[idx].clone(),
        zscore,
    })
}

/// Present z-scores of the latest row, highest first
pub fn latest_sorted(table: &CandidateTable) -> Vec<(PairKey, f64)> {
    let Some(row) = table.latest_row() else {
        return Vec::new();
    };
    let mut values: Vec<(PairKey, f64)> = table
        .columns()
        .iter()
        .enumerate()
        .filter_map(|(idx, pair)| row.get(idx).map(|z| (pair.clone(), z)))
        .collect();
    values.sort_by(|a, b| b.1.total_cmp(&a.1));
    values
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn pair(a: &str, b: &str) -> PairKey {
        PairKey::new(a, b).unwrap()
    }

    fn table_with(rows: &[&[(PairKey, f64)]]) -> CandidateTable {
        let start = Utc.with_ymd_and_hms(2025, 2, 1, 0, 1, 0).unwrap();
        let mut table = CandidateTable::new();
        for (i, row) in rows.iter().enumerate() {
            table.append_row(start + Duration::hours(i as i64), row).unwrap();
        }
        table
    }

    #[test]
    fn test_tie_keeps_first_column() {
        let table = table_with(&[&[
            (pair("A", "B"), -2.1),
            (pair("C", "D"), 0.3),
            (pair("E", "F"), -2.1),
        ]]);
        let best = select_best(&table).unwrap();
        assert_eq!(best.pair, pair("A", "B"));
        assert_eq!(best.zscore, -2.1);
        assert_eq!(best.long_symbol(), "A");
        assert_eq!(best.short_symbol(), "B");
    }

    #[test]
    fn test_deterministic() {
        let table = table_with(&[&[
            (pair("A", "B"), 0.5),
            (pair("C", "D"), -1.7),
            (pair("E", "F"), 1.2),
        ]]);
        let first = select_best(&table).unwrap();
        for _ in 0..5 {
            assert_eq!(select_best(&table).unwrap(), first);
        }
        assert_eq!(first.pair, pair("C", "D"));
    }

    #[test]
    fn test_only_latest_row_counts() {
        let table = table_with(&[
            &[(pair("A", "B"), -9.0), (pair("C", "D"), 0.0)],
            &[(pair("A", "B"), 1.0), (pair("C", "D"), -0.1)],
        ]);
        assert_eq!(select_best(&table).unwrap().pair, pair("C", "D"));
    }

    #[test]
    fn test_absent_values_skipped() {
        let table = table_with(&[
            &[(pair("A", "B"), -3.0)],
            &[(pair("C", "D"), 0.7)],
        ]);
        let best = select_best(&table).unwrap();
        assert_eq!(best.pair, pair("C", "D"));
    }

    #[test]
    fn test_empty_table() {
        assert!(matches!(select_best(&CandidateTable::new()), Err(RankError::NoCandidates(_))));
        let table = table_with(&[&[]]);
        assert!(matches!(select_best(&table), Err(RankError::NoCandidates(_))));
        let table = table_with(&[&[(pair("A", "B"), f64::NAN)]]);
        assert!(matches!(select_best(&table), Err(RankError::NoCandidates(_))));
    }

    #[test]
    fn test_latest_sorted() {
        let table = table_with(&[&[(pair("A", "B"), -1.0), (pair("C", "D"), 2.0)]]);
        let sorted = latest_sorted(&table);
        assert_eq!(sorted[0].0, pair("C", "D"));
        assert_eq!(sorted[1].1, -1.0);
    }
}
