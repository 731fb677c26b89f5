//! Statistics Store Port
//!
//! Persistence for the tables produced by the refresh pipeline and for the
//! halt marker. Missing tables load as empty.

use thiserror::Error;

use crate::domain::tables::{CandidateTable, CointegrationTable, HaltRecord, PairStatsTable};

#[derive(Error, Debug, Clone)]
pub enum StoreError {
    #[error("Failed to serialize {0}: {1}")]
    SerializationError(&'static str, String),

    #[error("Failed to deserialize {0}: {1}")]
    DeserializationError(&'static str, String),

    #[error("Failed to write {0}: {1}")]
    WriteError(String, String),

    #[error("Failed to read {0}: {1}")]
    ReadError(String, String),

    #[error("Failed to create directory: {0}")]
    DirectoryError(String),
}

pub trait StatsStore: Send + Sync {
    fn load_cointegration(&self) -> Result<CointegrationTable, StoreError>;
    fn save_cointegration(&self, table: &CointegrationTable) -> Result<(), StoreError>;

    fn load_candidates(&self) -> Result<CandidateTable, StoreError>;
    fn save_candidates(&self, table: &CandidateTable) -> Result<(), StoreError>;

    fn load_pair_stats(&self) -> Result<PairStatsTable, StoreError>;
    fn save_pair_stats(&self, table: &PairStatsTable) -> Result<(), StoreError>;

    fn load_halt(&self) -> Result<Option<HaltRecord>, StoreError>;
    fn save_halt(&self, record: &HaltRecord) -> Result<(), StoreError>;
    fn clear_halt(&self) -> Result<(), StoreError>;
}
