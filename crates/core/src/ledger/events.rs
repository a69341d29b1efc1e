use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Stage;

/// Verification ledger event types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LedgerEvent {
    RunStarted {
        run_id: String,
        version: String,
        config_hash: String,
        items: usize,
    },
    ItemStatusChanged {
        run_id: String,
        item_key: String,
        lot_key: String,
        from_status: String,
        to_status: String,
        reason: Option<String>,
    },
    /// A candidate's rendered text lacked required tokens.
    CandidateRejected {
        run_id: String,
        item_key: String,
        lot_key: String,
        candidate: usize,
        missing: Vec<String>,
    },
    LabelSaved {
        run_id: String,
        item_key: String,
        lot_key: String,
        production_key: String,
        candidate: usize,
        output_path: String,
        sha256: Option<String>,
    },
    ErrorRecorded {
        run_id: String,
        item_key: String,
        lot_key: String,
        stage: Stage,
        message: String,
        retryable: bool,
    },
    RunFinished {
        run_id: String,
        saved: usize,
        exhausted: usize,
        failed: usize,
        cancelled: bool,
    },
}

impl LedgerEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::RunStarted { .. } => "run_started",
            Self::ItemStatusChanged { .. } => "item_status_changed",
            Self::CandidateRejected { .. } => "candidate_rejected",
            Self::LabelSaved { .. } => "label_saved",
            Self::ErrorRecorded { .. } => "error_recorded",
            Self::RunFinished { .. } => "run_finished",
        }
    }

    pub fn run_id(&self) -> &str {
        match self {
            Self::RunStarted { run_id, .. }
            | Self::ItemStatusChanged { run_id, .. }
            | Self::CandidateRejected { run_id, .. }
            | Self::LabelSaved { run_id, .. }
            | Self::ErrorRecorded { run_id, .. }
            | Self::RunFinished { run_id, .. } => run_id,
        }
    }

    /// The item an event is keyed by, if any.
    pub fn item(&self) -> Option<(&str, &str)> {
        match self {
            Self::ItemStatusChanged {
                item_key, lot_key, ..
            }
            | Self::CandidateRejected {
                item_key, lot_key, ..
            }
            | Self::LabelSaved {
                item_key, lot_key, ..
            }
            | Self::ErrorRecorded {
                item_key, lot_key, ..
            } => Some((item_key, lot_key)),
            Self::RunStarted { .. } | Self::RunFinished { .. } => None,
        }
    }
}

/// A stored ledger record with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerRecord {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub run_id: String,
    pub item_key: Option<String>,
    pub lot_key: Option<String>,
    pub data: LedgerEvent,
}

impl LedgerRecord {
    pub fn from_event(timestamp: DateTime<Utc>, event: LedgerEvent) -> Self {
        let (item_key, lot_key) = match event.item() {
            Some((item, lot)) => (Some(item.to_string()), Some(lot.to_string())),
            None => (None, None),
        };
        Self {
            id: 0,
            timestamp,
            event_type: event.event_type().to_string(),
            run_id: event.run_id().to_string(),
            item_key,
            lot_key,
            data: event,
        }
    }
}
