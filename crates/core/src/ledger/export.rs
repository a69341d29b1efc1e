use std::io::Write;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::LedgerError;

/// One line of the production-number verification export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportRow {
    pub trip: String,
    pub tracking_number: String,
    #[serde(rename = "Item number")]
    pub item_number: String,
    #[serde(rename = "Lot number")]
    pub lot_number: String,
    #[serde(rename = "Production number")]
    pub production_number: String,
    #[serde(rename = "Status")]
    pub status: String,
    #[serde(rename = "Output")]
    pub output: String,
    #[serde(rename = "Reason")]
    pub reason: String,
}

/// Write export rows as comma-separated values with a header line.
pub fn write_export<W: Write>(writer: W, rows: &[ExportRow]) -> Result<(), LedgerError> {
    let mut csv = csv::Writer::from_writer(writer);
    for row in rows {
        csv.serialize(row)
            .map_err(|e| LedgerError::Export(e.to_string()))?;
    }
    csv.flush().map_err(|e| LedgerError::Export(e.to_string()))
}

/// Write the export to `path`, creating parent directories.
pub fn write_export_file(path: &Path, rows: &[ExportRow]) -> Result<(), LedgerError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| LedgerError::Export(e.to_string()))?;
    }
    let file = std::fs::File::create(path).map_err(|e| LedgerError::Export(e.to_string()))?;
    write_export(file, rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_export_header_and_quoting() {
        let rows = vec![ExportRow {
            trip: "T-1042".to_string(),
            tracking_number: "1Z999".to_string(),
            item_number: "NP6MSTGQP1".to_string(),
            lot_number: "UE4376".to_string(),
            production_number: "482913577".to_string(),
            status: "verification_exhausted".to_string(),
            output: String::new(),
            reason: "no matching/saveable label among 2 candidates, see log".to_string(),
        }];

        let mut buf = Vec::new();
        write_export(&mut buf, &rows).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let mut lines = text.lines();
        assert_eq!(
            lines.next(),
            Some("trip,tracking_number,Item number,Lot number,Production number,Status,Output,Reason")
        );
        assert_eq!(
            lines.next(),
            Some("T-1042,1Z999,NP6MSTGQP1,UE4376,482913577,verification_exhausted,,\"no matching/saveable label among 2 candidates, see log\"")
        );
    }

    #[test]
    fn test_export_file_creates_parent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("verification").join("production_numbers.csv");
        write_export_file(&path, &[]).unwrap();
        assert!(path.exists());
    }
}
