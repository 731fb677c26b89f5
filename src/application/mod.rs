pub mod pipeline;
pub mod executor;
pub mod monitor;
pub mod orchestrator;

pub use pipeline::{CandidatePipeline, EvaluationSnapshot, PipelineError, UniverseSettings};
pub use executor::{ExecutionError, Executor, PairFill};
pub use monitor::{evaluate, pnl_percent, MonitorError, MonitorSettings, PositionMonitor};
pub use orchestrator::{
    next_cycle_start, CycleOutcome, OrchestratorError, PairsOrchestrator, ScheduleSettings,
};
