use thiserror::Error;

use super::LedgerRecord;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Export error: {0}")]
    Export(String),
}

/// Filter for querying ledger records
#[derive(Debug, Clone, Default)]
pub struct LedgerFilter {
    pub run_id: Option<String>,
    pub item_key: Option<String>,
    pub lot_key: Option<String>,
    pub event_type: Option<String>,
    pub limit: i64,
    pub offset: i64,
}

impl LedgerFilter {
    pub fn new() -> Self {
        Self {
            limit: 100,
            offset: 0,
            ..Default::default()
        }
    }

    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = Some(run_id.into());
        self
    }

    pub fn with_item(mut self, item_key: impl Into<String>, lot_key: impl Into<String>) -> Self {
        self.item_key = Some(item_key.into());
        self.lot_key = Some(lot_key.into());
        self
    }

    pub fn with_event_type(mut self, event_type: impl Into<String>) -> Self {
        self.event_type = Some(event_type.into());
        self
    }

    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_offset(mut self, offset: i64) -> Self {
        self.offset = offset;
        self
    }
}

/// Append-only storage for ledger records
pub trait LedgerStore: Send + Sync {
    /// Append a record, returns the assigned ID
    fn insert(&self, record: &LedgerRecord) -> Result<i64, LedgerError>;

    /// Matching records, oldest first
    fn query(&self, filter: &LedgerFilter) -> Result<Vec<LedgerRecord>, LedgerError>;

    fn count(&self, filter: &LedgerFilter) -> Result<i64, LedgerError>;
}
