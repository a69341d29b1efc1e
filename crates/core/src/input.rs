//! Reading the parsed shipment input (tab-separated, one row per item/lot).

use std::collections::HashSet;
use std::io::Read;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::orchestrator::{ItemStatus, ShipmentItem};

/// Item names with this prefix are shipping containers, not labelled goods.
const CONTAINER_PREFIX: &str = "CC-";

#[derive(Debug, Error)]
pub enum InputError {
    #[error("Input file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to read input: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed input row {row}: {message}")]
    Malformed { row: usize, message: String },
}

/// One row of the parsed input file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedInputRow {
    #[serde(default)]
    pub trip: String,
    #[serde(default)]
    pub tracking_number: String,
    #[serde(alias = "item_name")]
    pub item_key: String,
    #[serde(alias = "lot")]
    pub lot_key: String,
    #[serde(default, alias = "production_number")]
    pub production_key_hint: String,
}

impl From<&ParsedInputRow> for ShipmentItem {
    fn from(row: &ParsedInputRow) -> Self {
        let hint = row.production_key_hint.trim();
        ShipmentItem {
            item_key: row.item_key.trim().to_string(),
            lot_key: row.lot_key.trim().to_string(),
            production_key_hint: (!hint.is_empty()).then(|| hint.to_string()),
            trip: row.trip.trim().to_string(),
            tracking_number: row.tracking_number.trim().to_string(),
            status: ItemStatus::Pending,
        }
    }
}

/// Read a parsed input file from disk.
pub fn read_parsed_input(path: &Path) -> Result<Vec<ParsedInputRow>, InputError> {
    if !path.exists() {
        return Err(InputError::FileNotFound(path.to_path_buf()));
    }
    let file = std::fs::File::open(path)?;
    parse_parsed_input(file)
}

/// Parse tab-separated rows, dropping container rows, blank rows and
/// repeated item/lot pairs.
pub fn parse_parsed_input<R: Read>(reader: R) -> Result<Vec<ParsedInputRow>, InputError> {
    let mut csv = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(reader);

    let mut seen = HashSet::new();
    let mut rows = Vec::new();

    for (index, record) in csv.deserialize::<ParsedInputRow>().enumerate() {
        // Header is line 1.
        let line = index + 2;
        let row = record.map_err(|e| InputError::Malformed {
            row: line,
            message: e.to_string(),
        })?;

        if row.item_key.is_empty() || row.lot_key.is_empty() {
            debug!(line, "Skipping row without item or lot");
            continue;
        }
        if row.item_key.starts_with(CONTAINER_PREFIX) {
            debug!(line, item = %row.item_key, "Skipping container row");
            continue;
        }
        if !seen.insert((row.item_key.clone(), row.lot_key.clone())) {
            debug!(line, item = %row.item_key, lot = %row.lot_key, "Skipping duplicate row");
            continue;
        }
        rows.push(row);
    }

    info!(rows = rows.len(), "Parsed input loaded");
    Ok(rows)
}
