use std::sync::Arc;

use tokio::sync::mpsc;

use super::{LedgerEvent, LedgerEventEnvelope, LedgerHandle, LedgerRecord, LedgerStore};

/// What a [`LedgerWriter`] did before its channel closed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LedgerWriteSummary {
    /// Records appended to the store.
    pub written: usize,
    /// Events the store refused.
    pub failed: usize,
}

/// Appends verification events to the store in the order they were emitted.
pub struct LedgerWriter {
    rx: mpsc::Receiver<LedgerEventEnvelope>,
    store: Arc<dyn LedgerStore>,
}

impl LedgerWriter {
    pub fn new(rx: mpsc::Receiver<LedgerEventEnvelope>, store: Arc<dyn LedgerStore>) -> Self {
        Self { rx, store }
    }

    /// Drain events until every [`LedgerHandle`] is dropped.
    ///
    /// A failed append is logged and counted; later events are still written.
    pub async fn run(mut self) -> LedgerWriteSummary {
        tracing::debug!("Ledger writer started");
        let mut summary = LedgerWriteSummary::default();

        while let Some(envelope) = self.rx.recv().await {
            if let LedgerEvent::RunFinished { ref run_id, saved, exhausted, failed, .. } =
                envelope.event
            {
                tracing::info!(run_id = %run_id, saved, exhausted, failed, "Run closed in ledger");
            }

            let event_type = envelope.event.event_type();
            let record = LedgerRecord::from_event(envelope.timestamp, envelope.event);
            match self.store.insert(&record) {
                Ok(_) => summary.written += 1,
                Err(e) => {
                    summary.failed += 1;
                    tracing::error!(event_type, error = %e, "Failed to append ledger record");
                }
            }
        }

        tracing::debug!(written = summary.written, failed = summary.failed, "Ledger writer stopped");
        summary
    }
}

/// Create the verification ledger channel: a handle for the orchestrator and
/// the writer that drains it into `store`.
///
/// Spawn the writer with `tokio::spawn(writer.run())`; it stops once all
/// handle clones are dropped.
pub fn create_ledger_system(
    store: Arc<dyn LedgerStore>,
    buffer_size: usize,
) -> (LedgerHandle, LedgerWriter) {
    let (tx, rx) = mpsc::channel(buffer_size);
    (LedgerHandle::new(tx), LedgerWriter::new(rx, store))
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::ledger::{LedgerError, LedgerEvent, LedgerFilter};

    struct MockStore {
        records: Mutex<Vec<LedgerRecord>>,
        should_fail: bool,
    }

    impl MockStore {
        fn new(should_fail: bool) -> Self {
            Self {
                records: Mutex::new(Vec::new()),
                should_fail,
            }
        }

        fn get_records(&self) -> Vec<LedgerRecord> {
            self.records.lock().unwrap().clone()
        }
    }

    impl LedgerStore for MockStore {
        fn insert(&self, record: &LedgerRecord) -> Result<i64, LedgerError> {
            if self.should_fail {
                return Err(LedgerError::Database("Mock failure".to_string()));
            }
            let mut records = self.records.lock().unwrap();
            records.push(record.clone());
            Ok(records.len() as i64)
        }

        fn query(&self, _filter: &LedgerFilter) -> Result<Vec<LedgerRecord>, LedgerError> {
            Ok(self.get_records())
        }

        fn count(&self, _filter: &LedgerFilter) -> Result<i64, LedgerError> {
            Ok(self.records.lock().unwrap().len() as i64)
        }
    }

    fn finished(run: &str) -> LedgerEvent {
        LedgerEvent::RunFinished {
            run_id: run.to_string(),
            saved: 0,
            exhausted: 0,
            failed: 0,
            cancelled: false,
        }
    }

    #[tokio::test]
    async fn test_writer_drains_all_handles() {
        let store = Arc::new(MockStore::new(false));
        let (handle, writer) = create_ledger_system(store.clone(), 10);
        let second = handle.clone();
        let task = tokio::spawn(writer.run());

        handle
            .emit(LedgerEvent::RunStarted {
                run_id: "r1".to_string(),
                version: "0.1.0".to_string(),
                config_hash: "abc".to_string(),
                items: 1,
            })
            .await;
        second.emit(finished("r1")).await;
        drop(handle);
        drop(second);

        assert_eq!(
            task.await.unwrap(),
            LedgerWriteSummary {
                written: 2,
                failed: 0
            }
        );
        let records = store.get_records();
        assert_eq!(records[0].event_type, "run_started");
        assert_eq!(records[1].event_type, "run_finished");
    }

    #[tokio::test]
    async fn test_writer_continues_on_insert_failure() {
        let store = Arc::new(MockStore::new(true));
        let (handle, writer) = create_ledger_system(store, 10);
        let task = tokio::spawn(writer.run());

        handle.emit(finished("r1")).await;
        handle.emit(finished("r2")).await;
        drop(handle);

        let summary = task.await.unwrap();
        assert_eq!(summary.written, 0);
        assert_eq!(summary.failed, 2);
    }
}
