use std::fmt;

use serde::{Deserialize, Serialize};

/// Pipeline stage a failure is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Authenticate,
    ResolveProductionKey,
    SearchLabels,
    OpenPreview,
    ExtractText,
    Verify,
    ActivateControl,
    SelectTarget,
    SubmitDestination,
    Close,
    Exhaustion,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Authenticate => "authenticate",
            Stage::ResolveProductionKey => "resolve_production_key",
            Stage::SearchLabels => "search_labels",
            Stage::OpenPreview => "open_preview",
            Stage::ExtractText => "extract_text",
            Stage::Verify => "verify",
            Stage::ActivateControl => "activate_control",
            Stage::SelectTarget => "select_target",
            Stage::SubmitDestination => "submit_destination",
            Stage::Close => "close",
            Stage::Exhaustion => "exhaustion",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One recorded failure cause.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub item_reference: String,
    pub stage: Stage,
    pub message: String,
    pub retryable: bool,
}

/// Failure causes accumulated over a run, in the order they occurred.
///
/// Recording never fails and never stops the batch.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ErrorLedger {
    records: Vec<ErrorRecord>,
}

impl ErrorLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, record: ErrorRecord) {
        self.records.push(record);
    }

    pub fn for_item<'a>(
        &'a self,
        item_reference: &str,
    ) -> impl Iterator<Item = &'a ErrorRecord> + 'a {
        let item_reference = item_reference.to_string();
        self.records
            .iter()
            .filter(move |r| r.item_reference == item_reference)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ErrorRecord> {
        self.records.iter()
    }

    /// Failure counts per stage, in stage order.
    pub fn summary(&self) -> Vec<(Stage, usize)> {
        let mut counts: Vec<(Stage, usize)> = Vec::new();
        for record in &self.records {
            match counts.iter_mut().find(|(stage, _)| *stage == record.stage) {
                Some((_, n)) => *n += 1,
                None => counts.push((record.stage, 1)),
            }
        }
        counts.sort_by_key(|(stage, _)| *stage as u8);
        counts
    }

    pub fn into_records(self) -> Vec<ErrorRecord> {
        self.records
    }
}
