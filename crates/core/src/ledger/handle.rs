use chrono::{DateTime, Utc};
use tokio::sync::mpsc;

use super::LedgerEvent;

/// A verification event stamped with the moment it was emitted.
#[derive(Debug, Clone)]
pub struct LedgerEventEnvelope {
    pub timestamp: DateTime<Utc>,
    pub event: LedgerEvent,
}

/// Sender side of the verification ledger.
///
/// The orchestrator holds one per run and emits a record for every status
/// change, rejected candidate, saved label and recorded failure. Appending
/// never fails an item: a closed channel is logged and the event is lost.
#[derive(Clone)]
pub struct LedgerHandle {
    tx: mpsc::Sender<LedgerEventEnvelope>,
}

impl LedgerHandle {
    pub fn new(tx: mpsc::Sender<LedgerEventEnvelope>) -> Self {
        Self { tx }
    }

    /// Queue `event` for the writer, waiting for room when the buffer is full.
    pub async fn emit(&self, event: LedgerEvent) {
        let event_type = event.event_type();
        let envelope = LedgerEventEnvelope {
            timestamp: Utc::now(),
            event,
        };
        if self.tx.send(envelope).await.is_err() {
            tracing::error!(event_type, "Verification ledger closed, event lost");
        }
    }

    /// Whether the writer is still draining events.
    pub fn is_open(&self) -> bool {
        !self.tx.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rejected(candidate: usize) -> LedgerEvent {
        LedgerEvent::CandidateRejected {
            run_id: "r1".to_string(),
            item_key: "NP6MSTGQP1".to_string(),
            lot_key: "UE4376".to_string(),
            candidate,
            missing: vec!["lot".to_string()],
        }
    }

    #[tokio::test]
    async fn test_emit_stamps_event() {
        let (tx, mut rx) = mpsc::channel(10);
        let handle = LedgerHandle::new(tx);

        let before = Utc::now();
        handle.emit(rejected(2)).await;

        let envelope = rx.recv().await.expect("Should receive event");
        assert!(matches!(
            envelope.event,
            LedgerEvent::CandidateRejected { candidate: 2, .. }
        ));
        assert!(envelope.timestamp >= before);
    }

    #[test]
    fn test_emit_keeps_order() {
        let (tx, mut rx) = mpsc::channel(4);
        let handle = LedgerHandle::new(tx);

        tokio_test::block_on(async {
            handle.emit(rejected(1)).await;
            handle.emit(rejected(2)).await;
        });
        let first = tokio_test::assert_ok!(rx.try_recv());
        let second = tokio_test::assert_ok!(rx.try_recv());
        assert!(matches!(first.event, LedgerEvent::CandidateRejected { candidate: 1, .. }));
        assert!(matches!(second.event, LedgerEvent::CandidateRejected { candidate: 2, .. }));
    }

    #[tokio::test]
    async fn test_emit_after_writer_gone() {
        let (tx, rx) = mpsc::channel::<LedgerEventEnvelope>(10);
        let handle = LedgerHandle::new(tx);
        drop(rx);

        assert!(!handle.is_open());
        // Logged, not propagated.
        handle.emit(rejected(1)).await;
    }
}
