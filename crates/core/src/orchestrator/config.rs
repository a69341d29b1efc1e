//! Orchestrator configuration.

use serde::{Deserialize, Serialize};

/// Configuration for the acquisition orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Upper bound on candidates tried per item. Extra search results are
    /// ignored, in order.
    #[serde(default = "default_max_candidates")]
    pub max_candidates_per_item: usize,

    /// Close the preview window after a successful save.
    #[serde(default = "default_true")]
    pub close_preview_after_save: bool,

    /// Channel buffer for ledger events.
    #[serde(default = "default_ledger_buffer")]
    pub ledger_buffer: usize,
}

fn default_max_candidates() -> usize {
    20
}

fn default_true() -> bool {
    true
}

fn default_ledger_buffer() -> usize {
    256
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_candidates_per_item: default_max_candidates(),
            close_preview_after_save: true,
            ledger_buffer: default_ledger_buffer(),
        }
    }
}
