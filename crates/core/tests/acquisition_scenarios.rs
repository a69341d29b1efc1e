//! End-to-end acquisition scenarios over the mock portal and desktop.
//!
//! Each test drives the orchestrator through resolve -> search -> preview ->
//! verify -> save and checks the recorded outcome, the files on disk and the
//! ledger.

use std::path::PathBuf;
use std::sync::Arc;

use tempfile::TempDir;

use labelfetch_core::{
    ledger::{LedgerFilter, LedgerStore, SqliteLedgerStore},
    navigator::NavigatorError,
    testing::{fixtures, LabelFixture, MockDesktop, MockPortal, SaveBehavior},
    create_ledger_system, AcquisitionOrchestrator, ItemStatus, OrchestratorError, Session,
    Stage, StageBudget, StageBudgets,
};

const KEY: &str = "123456789";

/// Mocks plus a scratch output directory.
struct TestHarness {
    desktop: MockDesktop,
    portal: MockPortal,
    session: Session,
    output: TempDir,
}

impl TestHarness {
    fn new() -> Self {
        let desktop = MockDesktop::new();
        let portal = MockPortal::new(desktop.clone());
        Self {
            desktop,
            portal,
            session: Session::new("ops"),
            output: TempDir::new().expect("Failed to create temp dir"),
        }
    }

    fn orchestrator(&self) -> AcquisitionOrchestrator {
        fixtures::orchestrator(&self.portal, &self.desktop, self.output.path())
    }

    fn expected_path(&self, item: &str, lot: &str) -> PathBuf {
        self.output.path().join("T-1").join(format!("{}_{}.pdf", item, lot))
    }
}

#[tokio::test]
async fn test_third_candidate_saved_after_two_rejections() {
    let harness = TestHarness::new();
    harness.portal.add_record("UE4376", KEY).await;
    harness
        .portal
        .set_labels(
            KEY,
            vec![
                LabelFixture::new("Item: NP6MSTGQP1 EPA Reg. No. 12345-6"),
                LabelFixture::new(fixtures::label_text("OTHER", "UE4376")),
                LabelFixture::new(fixtures::label_text("NP6MSTGQP1", "ue4376")),
            ],
        )
        .await;

    let report = harness
        .orchestrator()
        .run(&harness.session, vec![fixtures::item("NP6MSTGQP1", "UE4376")])
        .await
        .unwrap();

    let outcome = report.outcome("NP6MSTGQP1", "UE4376").unwrap();
    let path = harness.expected_path("NP6MSTGQP1", "UE4376");
    assert_eq!(outcome.item.status, ItemStatus::Saved);
    assert_eq!(outcome.result.matched_candidate_index, Some(3));
    assert_eq!(outcome.result.production_key.as_deref(), Some(KEY));
    assert_eq!(outcome.result.output_path.as_ref(), Some(&path));
    assert_eq!(outcome.result.sha256.as_ref().map(|s| s.len()), Some(64));
    assert_eq!(outcome.candidates_tried, 3);
    assert!(path.exists());

    // Only the verified candidate reached the save dialog.
    assert_eq!(harness.desktop.saved_files().await, vec![path]);
    let prints = harness
        .desktop
        .recorded_invocations()
        .await
        .into_iter()
        .filter(|i| i.control == "Print")
        .count();
    // Print on the preview, then Print to confirm the target.
    assert_eq!(prints, 2);
    assert!(report.errors.is_empty());
    assert_eq!(harness.portal.recorded_previews().await, vec![1, 2, 3]);
}

#[tokio::test]
async fn test_rejected_previews_are_closed() {
    let harness = TestHarness::new();
    harness
        .portal
        .set_labels(KEY, vec![LabelFixture::new("Item: X Lot: Y EPA")])
        .await;

    let report = harness
        .orchestrator()
        .run(&harness.session, vec![fixtures::item("NP6MSTGQP1", KEY)])
        .await
        .unwrap();

    let outcome = report.outcome("NP6MSTGQP1", KEY).unwrap();
    assert_eq!(outcome.item.status, ItemStatus::VerificationExhausted);
    assert_eq!(
        outcome.result.failure_reason.as_deref(),
        Some("no matching/saveable label among 1 candidates")
    );
    assert!(harness.desktop.open_windows().await.is_empty());
    assert_eq!(harness.desktop.closed_windows().await.len(), 1);
}

#[tokio::test]
async fn test_save_failures_exhaust_item_and_next_item_continues() {
    let harness = TestHarness::new();
    harness.portal.add_record("L1", "111111111").await;
    harness.portal.add_record("L2", "222222222").await;
    harness
        .portal
        .set_labels(
            "111111111",
            vec![
                LabelFixture::new(fixtures::label_text("A1", "L1")).with_save(SaveBehavior::NoFile),
                LabelFixture::new(fixtures::label_text("A1", "L1"))
                    .with_save(SaveBehavior::NoSaveDialog),
            ],
        )
        .await;
    harness
        .portal
        .set_labels(
            "222222222",
            vec![LabelFixture::new(fixtures::label_text("B2", "L2"))],
        )
        .await;

    let report = harness
        .orchestrator()
        .run(
            &harness.session,
            vec![fixtures::item("A1", "L1"), fixtures::item("B2", "L2")],
        )
        .await
        .unwrap();

    let first = report.outcome("A1", "L1").unwrap();
    assert_eq!(first.item.status, ItemStatus::VerificationExhausted);
    assert_eq!(
        first.result.failure_reason.as_deref(),
        Some("no matching/saveable label among 2 candidates (save failed for 2 verified candidate(s))")
    );
    assert!(first.result.output_path.is_none());
    assert!(!harness.expected_path("A1", "L1").exists());

    let stages: Vec<Stage> = report.errors.for_item("A1/L1").map(|r| r.stage).collect();
    assert_eq!(
        stages,
        vec![Stage::SubmitDestination, Stage::SubmitDestination, Stage::Exhaustion]
    );
    let first_message = &report.errors.for_item("A1/L1").next().unwrap().message;
    assert!(first_message.starts_with("candidate 1: "), "{}", first_message);

    let second = report.outcome("B2", "L2").unwrap();
    assert_eq!(second.item.status, ItemStatus::Saved);
    assert_eq!(second.result.matched_candidate_index, Some(1));
    assert!(harness.expected_path("B2", "L2").exists());
    assert_eq!(report.errors.for_item("B2/L2").count(), 0);
}

#[tokio::test]
async fn test_missing_print_target_is_recorded_per_candidate() {
    let harness = TestHarness::new();
    harness
        .portal
        .set_labels(
            KEY,
            vec![
                LabelFixture::new(fixtures::label_text("A1", KEY)).with_save(SaveBehavior::NoTarget),
                LabelFixture::new(fixtures::label_text("A1", KEY)),
            ],
        )
        .await;

    let report = harness
        .orchestrator()
        .run(&harness.session, vec![fixtures::item("A1", KEY)])
        .await
        .unwrap();

    let outcome = report.outcome("A1", KEY).unwrap();
    assert_eq!(outcome.item.status, ItemStatus::Saved);
    assert_eq!(outcome.result.matched_candidate_index, Some(2));

    let reference = format!("A1/{}", KEY);
    let errors: Vec<_> = report.errors.for_item(&reference).collect();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].stage, Stage::SelectTarget);
    // The failed attempt left no dialog behind.
    assert!(harness
        .desktop
        .open_windows()
        .await
        .iter()
        .all(|w| w.class_name != "#32770"));
}

#[tokio::test]
async fn test_production_key_lot_skips_lookup() {
    let harness = TestHarness::new();
    harness
        .portal
        .set_labels(KEY, vec![LabelFixture::new(fixtures::label_text("A1", KEY))])
        .await;

    let report = harness
        .orchestrator()
        .run(&harness.session, vec![fixtures::item("A1", KEY)])
        .await
        .unwrap();

    assert_eq!(report.count(ItemStatus::Saved), 1);
    assert!(harness.portal.recorded_lookups().await.is_empty());
    assert_eq!(harness.portal.recorded_searches().await, vec![KEY.to_string()]);
}

#[tokio::test]
async fn test_hint_skips_lookup() {
    let harness = TestHarness::new();
    harness
        .portal
        .set_labels(KEY, vec![LabelFixture::new(fixtures::label_text("A1", "L1"))])
        .await;

    let item = fixtures::item("A1", "L1").with_hint(KEY);
    let report = harness
        .orchestrator()
        .run(&harness.session, vec![item])
        .await
        .unwrap();

    assert_eq!(report.count(ItemStatus::Saved), 1);
    assert!(harness.portal.recorded_lookups().await.is_empty());
}

#[tokio::test]
async fn test_empty_search_exhausts_item() {
    let harness = TestHarness::new();
    harness.portal.add_record("L1", KEY).await;

    let report = harness
        .orchestrator()
        .run(&harness.session, vec![fixtures::item("A1", "L1")])
        .await
        .unwrap();

    let outcome = report.outcome("A1", "L1").unwrap();
    assert_eq!(outcome.item.status, ItemStatus::VerificationExhausted);
    assert_eq!(
        outcome.result.failure_reason.as_deref(),
        Some("no labels found for production number")
    );
    assert_eq!(outcome.result.production_key.as_deref(), Some(KEY));
    assert!(harness.portal.recorded_previews().await.is_empty());
}

#[tokio::test]
async fn test_unknown_lot_fails_item() {
    let harness = TestHarness::new();

    let report = harness
        .orchestrator()
        .run(&harness.session, vec![fixtures::item("A1", "NOPE")])
        .await
        .unwrap();

    let outcome = report.outcome("A1", "NOPE").unwrap();
    assert_eq!(outcome.item.status, ItemStatus::Failed);
    assert_eq!(
        outcome.result.failure_reason.as_deref(),
        Some("production key not found")
    );
    assert!(harness.portal.recorded_searches().await.is_empty());
}

#[tokio::test]
async fn test_search_timeout_fails_only_that_item() {
    let harness = TestHarness::new();
    harness
        .portal
        .set_next_error(NavigatorError::Timeout {
            what: "label search".to_string(),
            waited_ms: 20_000,
        })
        .await;
    harness
        .portal
        .set_labels("222222222", vec![LabelFixture::new(fixtures::label_text("B2", "222222222"))])
        .await;

    let report = harness
        .orchestrator()
        .run(
            &harness.session,
            vec![fixtures::item("A1", KEY), fixtures::item("B2", "222222222")],
        )
        .await
        .unwrap();

    let first = report.outcome("A1", KEY).unwrap();
    assert_eq!(first.item.status, ItemStatus::Failed);
    assert!(first
        .result
        .failure_reason
        .as_deref()
        .unwrap()
        .contains("label search"));
    let record = report.errors.iter().next().unwrap();
    assert_eq!(record.stage, Stage::SearchLabels);
    assert!(record.retryable);

    assert_eq!(
        report.outcome("B2", "222222222").unwrap().item.status,
        ItemStatus::Saved
    );
}

#[tokio::test]
async fn test_authentication_failure_aborts_before_any_item() {
    let harness = TestHarness::new();
    harness.portal.accept("ops", "right").await;
    let orchestrator = harness.orchestrator();

    let result = orchestrator
        .run_batch(
            &labelfetch_core::StaticCredentials::new(Some("ops".into()), Some("wrong".into())),
            vec![fixtures::item("A1", KEY)],
        )
        .await;

    assert!(matches!(
        result,
        Err(OrchestratorError::Authentication(NavigatorError::AuthRejected { .. }))
    ));
    assert!(harness.portal.recorded_searches().await.is_empty());
}

#[tokio::test]
async fn test_missing_credentials_abort() {
    let harness = TestHarness::new();
    let result = harness
        .orchestrator()
        .run_batch(
            &labelfetch_core::StaticCredentials::new(Some("ops".into()), None),
            vec![fixtures::item("A1", KEY)],
        )
        .await;

    assert!(matches!(
        result,
        Err(OrchestratorError::Authentication(NavigatorError::MissingCredentials(_)))
    ));
}

#[tokio::test]
async fn test_session_loss_aborts_remaining_items() {
    let harness = TestHarness::new();
    harness.portal.add_record("L1", "111111111").await;
    harness.portal.add_record("L2", "222222222").await;
    harness
        .portal
        .set_labels("111111111", vec![LabelFixture::new(fixtures::label_text("A1", "L1"))])
        .await;
    harness.portal.expire_session_after_previews(1).await;

    let result = harness
        .orchestrator()
        .run(
            &harness.session,
            vec![
                fixtures::item("A1", "L1"),
                fixtures::item("B2", "L2"),
                fixtures::item("C3", "L3"),
            ],
        )
        .await;

    let Err(OrchestratorError::SessionLost { source, report }) = result else {
        panic!("expected the run to abort");
    };
    assert!(source.is_auth());
    assert_eq!(report.outcomes.len(), 3);
    assert_eq!(report.outcome("A1", "L1").unwrap().item.status, ItemStatus::Saved);
    assert_eq!(report.outcome("B2", "L2").unwrap().item.status, ItemStatus::Failed);

    let last = report.outcome("C3", "L3").unwrap();
    assert_eq!(last.item.status, ItemStatus::Failed);
    assert!(last
        .result
        .failure_reason
        .as_deref()
        .unwrap()
        .starts_with("run aborted: "));
    assert_eq!(harness.portal.recorded_lookups().await, vec!["L1", "L2"]);
}

#[tokio::test]
async fn test_cancelled_run_fails_items_without_portal_calls() {
    let harness = TestHarness::new();
    let orchestrator = harness.orchestrator();
    orchestrator.cancel_flag().cancel();

    let report = orchestrator
        .run(
            &harness.session,
            vec![fixtures::item("A1", "L1"), fixtures::item("B2", "L2")],
        )
        .await
        .unwrap();

    assert!(report.cancelled);
    assert_eq!(report.count(ItemStatus::Failed), 2);
    for outcome in &report.outcomes {
        assert_eq!(outcome.result.failure_reason.as_deref(), Some("run cancelled"));
    }
    assert!(harness.portal.recorded_lookups().await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_preview_that_never_opens_times_out() {
    let harness = TestHarness::new();
    harness
        .portal
        .set_labels(
            KEY,
            vec![
                LabelFixture::new(fixtures::label_text("A1", KEY)).silent(),
                LabelFixture::new(fixtures::label_text("A1", KEY)).silent(),
            ],
        )
        .await;
    // Default budgets: the virtual clock skips the 30 s preview waits.
    let orchestrator = fixtures::orchestrator_with(
        &harness.portal,
        &harness.desktop,
        harness.output.path(),
        StageBudgets::default(),
    );

    let started = tokio::time::Instant::now();
    let report = orchestrator
        .run(&harness.session, vec![fixtures::item("A1", KEY)])
        .await
        .unwrap();

    assert!(started.elapsed() >= std::time::Duration::from_secs(60));
    let outcome = report.outcome("A1", KEY).unwrap();
    assert_eq!(outcome.item.status, ItemStatus::VerificationExhausted);
    assert_eq!(outcome.candidates_tried, 2);

    let stages: Vec<Stage> = report.errors.iter().map(|r| r.stage).collect();
    assert_eq!(stages, vec![Stage::OpenPreview, Stage::OpenPreview, Stage::Exhaustion]);
}

#[tokio::test(start_paused = true)]
async fn test_preview_retries_trigger_again() {
    let harness = TestHarness::new();
    harness
        .portal
        .set_labels(KEY, vec![LabelFixture::new(fixtures::label_text("A1", KEY)).silent()])
        .await;
    let mut stages = fixtures::fast_stages();
    stages.preview = StageBudget::new(1_000, 100, 3);
    let orchestrator =
        fixtures::orchestrator_with(&harness.portal, &harness.desktop, harness.output.path(), stages);

    let started = tokio::time::Instant::now();
    let report = orchestrator
        .run(&harness.session, vec![fixtures::item("A1", KEY)])
        .await
        .unwrap();

    assert!(started.elapsed() >= std::time::Duration::from_secs(4));
    assert_eq!(harness.portal.recorded_previews().await, vec![1, 1, 1, 1]);
    let outcome = report.outcome("A1", KEY).unwrap();
    assert_eq!(outcome.item.status, ItemStatus::VerificationExhausted);
    assert_eq!(outcome.candidates_tried, 1);
}

#[tokio::test]
async fn test_ledger_records_run() {
    let harness = TestHarness::new();
    harness.portal.add_record("L1", KEY).await;
    harness
        .portal
        .set_labels(
            KEY,
            vec![
                LabelFixture::new("unrelated label EPA"),
                LabelFixture::new(fixtures::label_text("A1", "L1")),
            ],
        )
        .await;

    let store = Arc::new(SqliteLedgerStore::in_memory().unwrap());
    let (ledger, writer) = create_ledger_system(store.clone(), 64);
    let writer_handle = tokio::spawn(writer.run());

    let orchestrator = harness
        .orchestrator()
        .with_ledger(ledger)
        .with_config_hash("abc123");
    let report = orchestrator
        .run(&harness.session, vec![fixtures::item("A1", "L1")])
        .await
        .unwrap();
    drop(orchestrator);
    let summary = writer_handle.await.unwrap();
    assert_eq!(summary.failed, 0);

    let records = store
        .query(&LedgerFilter::new().with_run_id(report.run_id.clone()))
        .unwrap();
    assert_eq!(records.len(), summary.written);

    let types: Vec<&str> = records.iter().map(|r| r.event_type.as_str()).collect();
    assert_eq!(
        types,
        vec![
            "run_started",
            "item_status_changed",
            "item_status_changed",
            "candidate_rejected",
            "label_saved",
            "item_status_changed",
            "run_finished",
        ]
    );

    let saved = store
        .query(&LedgerFilter::new().with_event_type("label_saved"))
        .unwrap();
    assert_eq!(saved[0].item_key.as_deref(), Some("A1"));
    assert_eq!(saved[0].lot_key.as_deref(), Some("L1"));
}

#[tokio::test]
async fn test_export_rows_follow_submission_order() {
    let harness = TestHarness::new();
    harness
        .portal
        .set_labels(KEY, vec![LabelFixture::new(fixtures::label_text("A1", KEY))])
        .await;

    let report = harness
        .orchestrator()
        .run(
            &harness.session,
            vec![fixtures::item("Z9", "NOPE"), fixtures::item("A1", KEY)],
        )
        .await
        .unwrap();

    let rows = report.export_rows();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].item_number, "Z9");
    assert_eq!(rows[0].status, "failed");
    assert_eq!(rows[0].reason, "production key not found");
    assert_eq!(rows[1].item_number, "A1");
    assert_eq!(rows[1].production_number, KEY);
    assert_eq!(rows[1].status, "saved");
    assert_eq!(rows[1].trip, "T-1");
}
