//! JSON File Store
//!
//! `StatsStore` backed by one pretty-printed JSON file per table inside a
//! data directory. Writes go to a temporary sibling first and are renamed
//! into place, so a crash mid-write leaves the previous table intact.

use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::domain::tables::{CandidateTable, CointegrationTable, HaltRecord, PairStatsTable};
use crate::ports::store::{StatsStore, StoreError};

pub const COINTEGRATION_FILE: &str = "cointegration.json";
pub const CANDIDATES_FILE: &str = "candidates.json";
pub const PAIR_STATS_FILE: &str = "pair_stats.json";
pub const HALT_FILE: &str = "halt.json";

#[derive(Debug, Clone)]
pub struct JsonFileStore {
    data_dir: PathBuf,
}

impl JsonFileStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    fn path(&self, file: &str) -> PathBuf {
        self.data_dir.join(file)
    }

    /// Missing or blank files read as `None`
    fn read<T: DeserializeOwned>(&self, file: &'static str) -> Result<Option<T>, StoreError> {
        let path = self.path(file);
        if !path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(&path)
            .map_err(|e| StoreError::ReadError(path.display().to_string(), e.to_string()))?;
        if content.trim().is_empty() {
            return Ok(None);
        }

        serde_json::from_str(&content)
            .map(Some)
            .map_err(|e| StoreError::DeserializationError(file, e.to_string()))
    }

    fn write<T: Serialize>(&self, file: &'static str, value: &T) -> Result<(), StoreError> {
        fs::create_dir_all(&self.data_dir)
            .map_err(|e| StoreError::DirectoryError(format!("{}: {}", self.data_dir.display(), e)))?;

        let content = serde_json::to_string_pretty(value)
            .map_err(|e| StoreError::SerializationError(file, e.to_string()))?;

        let path = self.path(file);
        let tmp = self.path(&format!("{}.tmp", file));
        fs::write(&tmp, content)
            .map_err(|e| StoreError::WriteError(tmp.display().to_string(), e.to_string()))?;
        fs::rename(&tmp, &path)
            .map_err(|e| StoreError::WriteError(path.display().to_string(), e.to_string()))?;

        tracing::debug!("Wrote {}", path.display());
        Ok(())
    }
}

impl StatsStore for JsonFileStore {
    fn load_cointegration(&self) -> Result<CointegrationTable, StoreError> {
        Ok(self.read(COINTEGRATION_FILE)?.unwrap_or_default())
    }

    fn save_cointegration(&self, table: &CointegrationTable) -> Result<(), StoreError> {
        self.write(COINTEGRATION_FILE, table)
    }

    fn load_candidates(&self) -> Result<CandidateTable, StoreError> {
        Ok(self.read(CANDIDATES_FILE)?.unwrap_or_default())
    }

    fn save_candidates(&self, table: &CandidateTable) -> Result<(), StoreError> {
        self.write(CANDIDATES_FILE, table)
    }

    fn load_pair_stats(&self) -> Result<PairStatsTable, StoreError> {
        Ok(self.read(PAIR_STATS_FILE)?.unwrap_or_default())
    }

    fn save_pair_stats(&self, table: &PairStatsTable) -> Result<(), StoreError> {
        self.write(PAIR_STATS_FILE, table)
    }

    fn load_halt(&self) -> Result<Option<HaltRecord>, StoreError> {
        self.read(HALT_FILE)
    }

    fn save_halt(&self, record: &HaltRecord) -> Result<(), StoreError> {
        self.write(HALT_FILE, record)?;
        tracing::warn!("Halt marker written: {}", record.reason);
        Ok(())
    }

    fn clear_halt(&self) -> Result<(), StoreError> {
        let path = self.path(HALT_FILE);
        if path.exists() {
            fs::remove_file(&path)
                .map_err(|e| StoreError::WriteError(path.display().to_string(), e.to_string()))?;
            tracing::info!("Halt marker cleared");
        }
        Ok(())
    }
}
