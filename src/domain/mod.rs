//! Domain Layer - Core types for the pairs engine
//!
//! This module contains pure domain types and logic with no external dependencies.
//! All external interactions happen through the ports layer.
//!
//! - `pair`: ordered pair identity and the `SYM1:SYM2` label convention
//! - `price_series`: timestamped close prices and the timestamp inner join
//! - `position`: the open pair position and the monitor's state
//! - `tables`: persisted statistics tables shared across cycles

pub mod pair;
pub mod price_series;
pub mod position;
pub mod tables;

pub use pair::{lookup_either, PairKey, PairKeyError, PAIR_SEPARATOR};
pub use price_series::{align, AlignedPrices, PricePoint, PriceSeries, PriceSeriesError};
pub use position::{ExitReason, MonitorPhase, MonitorState, PairPosition, PositionError};
pub use tables::{
    CandidateRow, CandidateTable, CointegrationRecord, CointegrationResult, CointegrationTable,
    HaltRecord, PairStats, PairStatsTable, TableError,
};
