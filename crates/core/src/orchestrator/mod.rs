//! Acquisition orchestrator: the per-item state machine over key
//! resolution, label search, preview, verification and save.
//!
//! Items and candidates are processed strictly sequentially. A failure on
//! one item is recorded and never stops the batch; only a lost portal
//! session ends a run early.

mod config;
mod runner;
mod types;

pub use config::OrchestratorConfig;
pub use runner::AcquisitionOrchestrator;
pub use types::{
    AcquisitionResult, BatchReport, ItemOutcome, ItemStatus, OrchestratorError, ShipmentItem,
};
