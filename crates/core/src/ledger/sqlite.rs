use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};

use super::{LedgerError, LedgerEvent, LedgerFilter, LedgerRecord, LedgerStore};

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS ledger_events (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        timestamp TEXT NOT NULL,
        event_type TEXT NOT NULL,
        run_id TEXT NOT NULL,
        item_key TEXT,
        lot_key TEXT,
        data TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_ledger_events_run_id ON ledger_events(run_id);
    CREATE INDEX IF NOT EXISTS idx_ledger_events_item ON ledger_events(item_key, lot_key);
    CREATE INDEX IF NOT EXISTS idx_ledger_events_event_type ON ledger_events(event_type);
"#;

/// SQLite-backed verification ledger
pub struct SqliteLedgerStore {
    conn: Mutex<Connection>,
}

impl SqliteLedgerStore {
    /// Open (or create) the ledger database at `path`
    pub fn new(path: &Path) -> Result<Self, LedgerError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| LedgerError::Database(e.to_string()))?;
        }
        let conn = Connection::open(path).map_err(|e| LedgerError::Database(e.to_string()))?;
        Self::init(conn)
    }

    /// In-memory ledger, for tests and dry runs
    pub fn in_memory() -> Result<Self, LedgerError> {
        let conn = Connection::open_in_memory().map_err(|e| LedgerError::Database(e.to_string()))?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self, LedgerError> {
        conn.execute_batch(SCHEMA)
            .map_err(|e| LedgerError::Database(e.to_string()))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, LedgerError> {
        self.conn
            .lock()
            .map_err(|_| LedgerError::Database("connection lock poisoned".to_string()))
    }

    fn build_where_clause(filter: &LedgerFilter) -> (String, Vec<Box<dyn rusqlite::ToSql>>) {
        let mut conditions = Vec::new();
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(ref run_id) = filter.run_id {
            conditions.push("run_id = ?");
            params.push(Box::new(run_id.clone()));
        }

        if let Some(ref item_key) = filter.item_key {
            conditions.push("item_key = ?");
            params.push(Box::new(item_key.clone()));
        }

        if let Some(ref lot_key) = filter.lot_key {
            conditions.push("lot_key = ?");
            params.push(Box::new(lot_key.clone()));
        }

        if let Some(ref event_type) = filter.event_type {
            conditions.push("event_type = ?");
            params.push(Box::new(event_type.clone()));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        (where_clause, params)
    }
}

impl LedgerStore for SqliteLedgerStore {
    fn insert(&self, record: &LedgerRecord) -> Result<i64, LedgerError> {
        let conn = self.conn()?;

        let data_json = serde_json::to_string(&record.data)
            .map_err(|e| LedgerError::Serialization(e.to_string()))?;

        conn.execute(
            "INSERT INTO ledger_events (timestamp, event_type, run_id, item_key, lot_key, data) VALUES (?, ?, ?, ?, ?, ?)",
            params![
                record.timestamp.to_rfc3339(),
                record.event_type,
                record.run_id,
                record.item_key,
                record.lot_key,
                data_json,
            ],
        )
        .map_err(|e| LedgerError::Database(e.to_string()))?;

        Ok(conn.last_insert_rowid())
    }

    fn query(&self, filter: &LedgerFilter) -> Result<Vec<LedgerRecord>, LedgerError> {
        let conn = self.conn()?;

        let (where_clause, params) = Self::build_where_clause(filter);
        let sql = format!(
            "SELECT id, timestamp, event_type, run_id, item_key, lot_key, data FROM ledger_events {} ORDER BY id ASC LIMIT ? OFFSET ?",
            where_clause
        );

        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| LedgerError::Database(e.to_string()))?;

        let mut all_params = params;
        all_params.push(Box::new(filter.limit));
        all_params.push(Box::new(filter.offset));
        let param_refs: Vec<&dyn rusqlite::ToSql> = all_params.iter().map(|p| p.as_ref()).collect();

        let rows = stmt
            .query_map(param_refs.as_slice(), |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, Option<String>>(4)?,
                    row.get::<_, Option<String>>(5)?,
                    row.get::<_, String>(6)?,
                ))
            })
            .map_err(|e| LedgerError::Database(e.to_string()))?;

        let mut records = Vec::new();
        for row_result in rows {
            let (id, timestamp_str, event_type, run_id, item_key, lot_key, data_json) =
                row_result.map_err(|e| LedgerError::Database(e.to_string()))?;

            let timestamp: DateTime<Utc> = DateTime::parse_from_rfc3339(&timestamp_str)
                .map_err(|e| LedgerError::Database(format!("Invalid timestamp: {}", e)))?
                .into();

            let data: LedgerEvent = serde_json::from_str(&data_json)
                .map_err(|e| LedgerError::Serialization(e.to_string()))?;

            records.push(LedgerRecord {
                id,
                timestamp,
                event_type,
                run_id,
                item_key,
                lot_key,
                data,
            });
        }

        Ok(records)
    }

    fn count(&self, filter: &LedgerFilter) -> Result<i64, LedgerError> {
        let conn = self.conn()?;

        let (where_clause, params) = Self::build_where_clause(filter);
        let sql = format!("SELECT COUNT(*) FROM ledger_events {}", where_clause);
        let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();

        conn.query_row(&sql, param_refs.as_slice(), |row| row.get(0))
            .map_err(|e| LedgerError::Database(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::Stage;

    fn status_changed(run: &str, item: &str, lot: &str, to: &str) -> LedgerRecord {
        LedgerRecord::from_event(
            Utc::now(),
            LedgerEvent::ItemStatusChanged {
                run_id: run.to_string(),
                item_key: item.to_string(),
                lot_key: lot.to_string(),
                from_status: "pending".to_string(),
                to_status: to.to_string(),
                reason: None,
            },
        )
    }

    fn error_recorded(run: &str, item: &str, lot: &str) -> LedgerRecord {
        LedgerRecord::from_event(
            Utc::now(),
            LedgerEvent::ErrorRecorded {
                run_id: run.to_string(),
                item_key: item.to_string(),
                lot_key: lot.to_string(),
                stage: Stage::SubmitDestination,
                message: "save to /out/a.pdf failed".to_string(),
                retryable: false,
            },
        )
    }

    #[test]
    fn test_insert_and_query_in_order() {
        let store = SqliteLedgerStore::in_memory().unwrap();
        let first = store
            .insert(&status_changed("r1", "A", "L1", "searching"))
            .unwrap();
        store.insert(&error_recorded("r1", "A", "L1")).unwrap();

        let records = store.query(&LedgerFilter::new()).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].id, first);
        assert_eq!(records[0].event_type, "item_status_changed");
        assert_eq!(records[1].event_type, "error_recorded");
        assert!(matches!(
            records[1].data,
            LedgerEvent::ErrorRecorded {
                stage: Stage::SubmitDestination,
                ..
            }
        ));
    }

    #[test]
    fn test_query_by_item_and_run() {
        let store = SqliteLedgerStore::in_memory().unwrap();
        store.insert(&status_changed("r1", "A", "L1", "saved")).unwrap();
        store.insert(&status_changed("r1", "B", "L2", "failed")).unwrap();
        store.insert(&status_changed("r2", "A", "L1", "saved")).unwrap();

        let filter = LedgerFilter::new().with_item("A", "L1");
        assert_eq!(store.query(&filter).unwrap().len(), 2);

        let filter = LedgerFilter::new().with_item("A", "L1").with_run_id("r2");
        assert_eq!(store.count(&filter).unwrap(), 1);

        let filter = LedgerFilter::new().with_event_type("error_recorded");
        assert_eq!(store.count(&filter).unwrap(), 0);
    }

    #[test]
    fn test_pagination() {
        let store = SqliteLedgerStore::in_memory().unwrap();
        for i in 0..5 {
            store
                .insert(&status_changed("r1", &format!("I{}", i), "L", "saved"))
                .unwrap();
        }

        let page = store
            .query(&LedgerFilter::new().with_limit(2).with_offset(4))
            .unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].item_key.as_deref(), Some("I4"));
    }

    #[test]
    fn test_file_based_store_persists() {
        let temp_dir = tempfile::tempdir().unwrap();
        let db_path = temp_dir.path().join("nested").join("ledger.db");

        {
            let store = SqliteLedgerStore::new(&db_path).unwrap();
            store.insert(&error_recorded("r1", "A", "L1")).unwrap();
        }

        let reopened = SqliteLedgerStore::new(&db_path).unwrap();
        assert_eq!(reopened.count(&LedgerFilter::new()).unwrap(), 1);
    }
}
