//! Types for the acquisition orchestrator.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ledger::{ErrorLedger, ExportRow};
use crate::navigator::NavigatorError;

/// Errors that end a run early.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// Login failed. Nothing was processed.
    #[error("authentication failed: {0}")]
    Authentication(#[source] NavigatorError),

    /// The portal session was lost mid-run. The report covers every item.
    #[error("session lost during run: {source}")]
    SessionLost {
        #[source]
        source: NavigatorError,
        report: Box<BatchReport>,
    },

    /// An item status would have moved backwards.
    #[error("invalid item status transition: {from} -> {to}")]
    InvalidState { from: ItemStatus, to: ItemStatus },
}

/// Processing status of a shipment item. Only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    Pending,
    Searching,
    Found,
    VerificationExhausted,
    Saved,
    Failed,
}

impl ItemStatus {
    fn rank(self) -> u8 {
        match self {
            ItemStatus::Pending => 0,
            ItemStatus::Searching => 1,
            ItemStatus::Found => 2,
            ItemStatus::VerificationExhausted | ItemStatus::Saved | ItemStatus::Failed => 3,
        }
    }

    pub fn is_terminal(self) -> bool {
        self.rank() == 3
    }

    pub fn can_advance_to(self, next: ItemStatus) -> bool {
        next.rank() > self.rank()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ItemStatus::Pending => "pending",
            ItemStatus::Searching => "searching",
            ItemStatus::Found => "found",
            ItemStatus::VerificationExhausted => "verification_exhausted",
            ItemStatus::Saved => "saved",
            ItemStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One line item of a shipment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShipmentItem {
    pub item_key: String,
    pub lot_key: String,
    /// Production key carried by the input, if any.
    pub production_key_hint: Option<String>,
    #[serde(default)]
    pub trip: String,
    #[serde(default)]
    pub tracking_number: String,
    pub status: ItemStatus,
}

impl ShipmentItem {
    pub fn new(item_key: impl Into<String>, lot_key: impl Into<String>) -> Self {
        Self {
            item_key: item_key.into(),
            lot_key: lot_key.into(),
            production_key_hint: None,
            trip: String::new(),
            tracking_number: String::new(),
            status: ItemStatus::Pending,
        }
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.production_key_hint = Some(hint.into());
        self
    }

    /// `item/lot`, the key failures are recorded under.
    pub fn reference(&self) -> String {
        format!("{}/{}", self.item_key, self.lot_key)
    }

    /// Move to `next`, returning the previous status.
    pub fn advance(&mut self, next: ItemStatus) -> Result<ItemStatus, OrchestratorError> {
        if !self.status.can_advance_to(next) {
            return Err(OrchestratorError::InvalidState {
                from: self.status,
                to: next,
            });
        }
        Ok(std::mem::replace(&mut self.status, next))
    }
}

/// The single result recorded for an item.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcquisitionResult {
    pub production_key: Option<String>,
    /// 1-based position of the saved candidate in the search results.
    pub matched_candidate_index: Option<usize>,
    pub output_path: Option<PathBuf>,
    pub sha256: Option<String>,
    pub failure_reason: Option<String>,
}

impl AcquisitionResult {
    pub fn failed(production_key: Option<String>, reason: impl Into<String>) -> Self {
        Self {
            production_key,
            failure_reason: Some(reason.into()),
            ..Default::default()
        }
    }
}

/// An item in its final state together with its result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemOutcome {
    pub item: ShipmentItem,
    pub result: AcquisitionResult,
    pub candidates_tried: usize,
    pub duration_ms: u64,
}

/// Everything a run produced, in submission order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchReport {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub outcomes: Vec<ItemOutcome>,
    pub errors: ErrorLedger,
    pub cancelled: bool,
}

impl BatchReport {
    pub fn new(run_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            started_at: Utc::now(),
            finished_at: None,
            outcomes: Vec::new(),
            errors: ErrorLedger::new(),
            cancelled: false,
        }
    }

    pub fn count(&self, status: ItemStatus) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.item.status == status)
            .count()
    }

    pub fn outcome(&self, item_key: &str, lot_key: &str) -> Option<&ItemOutcome> {
        self.outcomes
            .iter()
            .find(|o| o.item.item_key == item_key && o.item.lot_key == lot_key)
    }

    /// Rows for the production-number export.
    pub fn export_rows(&self) -> Vec<ExportRow> {
        self.outcomes
            .iter()
            .map(|o| ExportRow {
                trip: o.item.trip.clone(),
                tracking_number: o.item.tracking_number.clone(),
                item_number: o.item.item_key.clone(),
                lot_number: o.item.lot_key.clone(),
                production_number: o.result.production_key.clone().unwrap_or_default(),
                status: o.item.status.to_string(),
                output: o
                    .result
                    .output_path
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_default(),
                reason: o.result.failure_reason.clone().unwrap_or_default(),
            })
            .collect()
    }
}
