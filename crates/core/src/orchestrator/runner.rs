//! Acquisition orchestrator implementation.
//!
//! Items are processed strictly one after another, and so are the candidates
//! of an item: the browser session and the desktop are single resources.
//! Every failure short of a lost session is recorded and the batch moves on.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::bridge::{PreviewBridge, PreviewError};
use crate::desktop::{DesktopError, Interaction, WindowController};
use crate::ledger::{ErrorLedger, ErrorRecord, LedgerEvent, LedgerHandle, Stage};
use crate::metrics;
use crate::navigator::{
    CandidateRef, CredentialProvider, KeyResolution, NavigatorError, ProductionKey,
    ProductionKeyResolver, Session, WebNavigator,
};
use crate::output::{prepare_destination, sha256_file, OutputPathBuilder};
use crate::polling::CancelFlag;
use crate::verifier::ContentVerifier;

use super::config::OrchestratorConfig;
use super::types::{
    AcquisitionResult, BatchReport, ItemOutcome, ItemStatus, OrchestratorError, ShipmentItem,
};

const REASON_NOT_FOUND: &str = "production key not found";
const REASON_NO_LABELS: &str = "no labels found for production number";
const REASON_CANCELLED: &str = "run cancelled";

/// How one candidate ended.
enum CandidateOutcome {
    Saved {
        path: PathBuf,
        sha256: Option<String>,
    },
    /// Rendered text lacked required tokens. Expected, not an error.
    Rejected { missing: Vec<&'static str> },
    Failed {
        stage: Stage,
        message: String,
        retryable: bool,
        during_save: bool,
    },
    Cancelled,
    /// The portal session is gone; the batch cannot continue.
    SessionLost(NavigatorError),
}

impl CandidateOutcome {
    fn metric_label(&self) -> &'static str {
        match self {
            CandidateOutcome::Saved { .. } => "saved",
            CandidateOutcome::Rejected { .. } => "rejected",
            CandidateOutcome::Failed {
                during_save: true, ..
            } => "save_failed",
            CandidateOutcome::Failed {
                stage: Stage::OpenPreview,
                ..
            } => "preview_failed",
            CandidateOutcome::Failed { .. } => "failed",
            CandidateOutcome::Cancelled => "cancelled",
            CandidateOutcome::SessionLost(_) => "session_lost",
        }
    }
}

/// Stage a desktop failure during the save sequence is attributed to.
fn save_stage(error: &DesktopError) -> Stage {
    match error {
        DesktopError::ControlNotFound { .. } | DesktopError::WindowGone(_) => Stage::ActivateControl,
        DesktopError::TargetNotFound { .. } | DesktopError::WindowNotFound { .. } => {
            Stage::SelectTarget
        }
        DesktopError::SaveIo { .. } => Stage::SubmitDestination,
        _ => Stage::ActivateControl,
    }
}

/// Per-item working state while candidates are attempted.
struct ItemRun<'a> {
    run_id: &'a str,
    item: ShipmentItem,
    candidates_tried: usize,
}

/// Drives shipment items through key resolution, search, preview,
/// verification and save.
pub struct AcquisitionOrchestrator {
    config: OrchestratorConfig,
    navigator: Arc<dyn WebNavigator>,
    controller: Arc<WindowController>,
    bridge: PreviewBridge,
    verifier: ContentVerifier,
    resolver: ProductionKeyResolver,
    paths: Arc<dyn OutputPathBuilder>,
    ledger: Option<LedgerHandle>,
    cancel: CancelFlag,
    config_hash: String,
}

impl AcquisitionOrchestrator {
    pub fn new(
        config: OrchestratorConfig,
        navigator: Arc<dyn WebNavigator>,
        controller: Arc<WindowController>,
        verifier: ContentVerifier,
        resolver: ProductionKeyResolver,
        paths: Arc<dyn OutputPathBuilder>,
    ) -> Self {
        let bridge = PreviewBridge::new(Arc::clone(&navigator), Arc::clone(&controller));
        Self {
            config,
            navigator,
            controller,
            bridge,
            verifier,
            resolver,
            paths,
            ledger: None,
            cancel: CancelFlag::new(),
            config_hash: String::new(),
        }
    }

    /// Record events in the verification ledger.
    pub fn with_ledger(mut self, ledger: LedgerHandle) -> Self {
        self.ledger = Some(ledger);
        self
    }

    /// Share a cancellation flag. Pass the same flag to the
    /// [`WindowController`] so dialog sequences stop between steps.
    pub fn with_cancel_flag(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_config_hash(mut self, hash: impl Into<String>) -> Self {
        self.config_hash = hash.into();
        self
    }

    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    async fn emit(&self, event: LedgerEvent) {
        if let Some(ref ledger) = self.ledger {
            ledger.emit(event).await;
        }
    }

    /// Log in with credentials from `provider`.
    pub async fn authenticate(
        &self,
        provider: &dyn CredentialProvider,
    ) -> Result<Session, OrchestratorError> {
        let credentials = provider
            .credentials()
            .map_err(OrchestratorError::Authentication)?;
        info!(navigator = self.navigator.name(), username = %credentials.username, "Authenticating");

        match self.navigator.authenticate(&credentials).await {
            Ok(session) => {
                info!(session = %session.id, "Authenticated");
                Ok(session)
            }
            Err(e) => {
                error!(error = %e, "Authentication failed, aborting run");
                metrics::STAGE_FAILURES
                    .with_label_values(&[Stage::Authenticate.as_str()])
                    .inc();
                Err(OrchestratorError::Authentication(e))
            }
        }
    }

    /// Authenticate, then process every item.
    pub async fn run_batch(
        &self,
        provider: &dyn CredentialProvider,
        items: Vec<ShipmentItem>,
    ) -> Result<BatchReport, OrchestratorError> {
        let session = self.authenticate(provider).await?;
        self.run(&session, items).await
    }

    /// Process `items` in order, producing exactly one outcome per item.
    ///
    /// Only a lost portal session ends the run early; the error then carries
    /// the report with the remaining items marked failed.
    pub async fn run(
        &self,
        session: &Session,
        items: Vec<ShipmentItem>,
    ) -> Result<BatchReport, OrchestratorError> {
        let run_id = Uuid::new_v4().to_string();
        let mut report = BatchReport::new(run_id.clone());
        let total = items.len();
        info!(run_id = %run_id, items = total, "Run started");

        self.emit(LedgerEvent::RunStarted {
            run_id: run_id.clone(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            config_hash: self.config_hash.clone(),
            items: total,
        })
        .await;

        let mut lost: Option<NavigatorError> = None;

        for (index, item) in items.into_iter().enumerate() {
            if self.cancel.is_cancelled() {
                if !report.cancelled {
                    warn!(remaining = total - index, "Run cancelled");
                    report.cancelled = true;
                }
                let outcome = self
                    .abandon(&run_id, item, REASON_CANCELLED, &mut report.errors)
                    .await;
                report.outcomes.push(outcome);
                continue;
            }
            if let Some(ref e) = lost {
                let reason = format!("run aborted: {}", e);
                let outcome = self.abandon(&run_id, item, &reason, &mut report.errors).await;
                report.outcomes.push(outcome);
                continue;
            }

            info!(
                item = %item.item_key,
                lot = %item.lot_key,
                position = index + 1,
                total,
                "Processing item"
            );
            let (outcome, session_error) = self
                .process_item(&run_id, session, item, &mut report.errors)
                .await;
            report.outcomes.push(outcome);
            if let Some(e) = session_error {
                error!(error = %e, "Portal session lost, abandoning remaining items");
                lost = Some(e);
            }
        }

        report.finished_at = Some(Utc::now());
        self.emit(LedgerEvent::RunFinished {
            run_id: run_id.clone(),
            saved: report.count(ItemStatus::Saved),
            exhausted: report.count(ItemStatus::VerificationExhausted),
            failed: report.count(ItemStatus::Failed),
            cancelled: report.cancelled,
        })
        .await;

        info!(
            run_id = %run_id,
            saved = report.count(ItemStatus::Saved),
            exhausted = report.count(ItemStatus::VerificationExhausted),
            failed = report.count(ItemStatus::Failed),
            "Run finished"
        );

        match lost {
            Some(source) => Err(OrchestratorError::SessionLost {
                source,
                report: Box::new(report),
            }),
            None => Ok(report),
        }
    }

    /// Mark an unprocessed item failed without touching the portal.
    async fn abandon(
        &self,
        run_id: &str,
        item: ShipmentItem,
        reason: &str,
        errors: &mut ErrorLedger,
    ) -> ItemOutcome {
        let mut run = ItemRun {
            run_id,
            item,
            candidates_tried: 0,
        };
        self.record_error(&run, errors, Stage::Exhaustion, reason, false)
            .await;
        self.finish(
            &mut run,
            ItemStatus::Failed,
            AcquisitionResult::failed(None, reason),
            Instant::now(),
        )
        .await
    }

    /// Run the per-item algorithm. The second value is set when the portal
    /// session was lost while processing this item.
    async fn process_item(
        &self,
        run_id: &str,
        session: &Session,
        item: ShipmentItem,
        errors: &mut ErrorLedger,
    ) -> (ItemOutcome, Option<NavigatorError>) {
        let started = Instant::now();
        let mut run = ItemRun {
            run_id,
            item,
            candidates_tried: 0,
        };
        self.transition(&mut run, ItemStatus::Searching, None).await;

        let resolution = self
            .resolver
            .resolve(
                self.navigator.as_ref(),
                session,
                &run.item.item_key,
                &run.item.lot_key,
                run.item.production_key_hint.as_deref(),
            )
            .await;

        let key = match resolution {
            Ok(KeyResolution::Resolved { key, source }) => {
                info!(item = %run.item.item_key, key = %key, ?source, "Production key resolved");
                key
            }
            Ok(KeyResolution::NotFound) => {
                self.record_error(&run, errors, Stage::ResolveProductionKey, REASON_NOT_FOUND, false)
                    .await;
                let outcome = self
                    .finish(
                        &mut run,
                        ItemStatus::Failed,
                        AcquisitionResult::failed(None, REASON_NOT_FOUND),
                        started,
                    )
                    .await;
                return (outcome, None);
            }
            Err(e) => {
                return self
                    .fail_on_portal_error(run, errors, Stage::ResolveProductionKey, None, e, started)
                    .await;
            }
        };

        let candidates = match self.navigator.search_labels(session, &key).await {
            Ok(candidates) => candidates,
            Err(e) => {
                return self
                    .fail_on_portal_error(
                        run,
                        errors,
                        Stage::SearchLabels,
                        Some(key.to_string()),
                        e,
                        started,
                    )
                    .await;
            }
        };

        if candidates.is_empty() {
            self.record_error(&run, errors, Stage::Exhaustion, REASON_NO_LABELS, false)
                .await;
            let outcome = self
                .finish(
                    &mut run,
                    ItemStatus::VerificationExhausted,
                    AcquisitionResult::failed(Some(key.to_string()), REASON_NO_LABELS),
                    started,
                )
                .await;
            return (outcome, None);
        }

        self.transition(&mut run, ItemStatus::Found, None).await;
        self.try_candidates(run, session, &key, candidates, errors, started)
            .await
    }

    async fn try_candidates(
        &self,
        mut run: ItemRun<'_>,
        session: &Session,
        key: &ProductionKey,
        mut candidates: Vec<CandidateRef>,
        errors: &mut ErrorLedger,
        started: Instant,
    ) -> (ItemOutcome, Option<NavigatorError>) {
        if candidates.len() > self.config.max_candidates_per_item {
            warn!(
                found = candidates.len(),
                limit = self.config.max_candidates_per_item,
                "Too many candidates, ignoring the rest"
            );
            candidates.truncate(self.config.max_candidates_per_item);
        }
        let total = candidates.len();
        let destination = self.paths.build(&run.item.item_key, &run.item.lot_key);
        let mut save_failures = 0usize;

        for candidate in &candidates {
            if self.cancel.is_cancelled() {
                return self
                    .end_cancelled(run, errors, Some(key.to_string()), started)
                    .await;
            }

            run.candidates_tried += 1;
            debug!(candidate = candidate.index(), total, "Trying candidate");
            let outcome = self
                .attempt(session, &run.item, candidate, &destination)
                .await;
            metrics::CANDIDATES
                .with_label_values(&[outcome.metric_label()])
                .inc();

            match outcome {
                CandidateOutcome::Saved { path, sha256 } => {
                    self.emit(LedgerEvent::LabelSaved {
                        run_id: run.run_id.to_string(),
                        item_key: run.item.item_key.clone(),
                        lot_key: run.item.lot_key.clone(),
                        production_key: key.to_string(),
                        candidate: candidate.index(),
                        output_path: path.display().to_string(),
                        sha256: sha256.clone(),
                    })
                    .await;
                    let result = AcquisitionResult {
                        production_key: Some(key.to_string()),
                        matched_candidate_index: Some(candidate.index()),
                        output_path: Some(path),
                        sha256,
                        failure_reason: None,
                    };
                    let outcome = self.finish(&mut run, ItemStatus::Saved, result, started).await;
                    return (outcome, None);
                }
                CandidateOutcome::Rejected { missing } => {
                    info!(
                        candidate = candidate.index(),
                        missing = ?missing,
                        "Candidate rejected by verification"
                    );
                    self.emit(LedgerEvent::CandidateRejected {
                        run_id: run.run_id.to_string(),
                        item_key: run.item.item_key.clone(),
                        lot_key: run.item.lot_key.clone(),
                        candidate: candidate.index(),
                        missing: missing.iter().map(|m| m.to_string()).collect(),
                    })
                    .await;
                }
                CandidateOutcome::Failed {
                    stage,
                    message,
                    retryable,
                    during_save,
                } => {
                    if during_save {
                        save_failures += 1;
                    }
                    let message = format!("candidate {}: {}", candidate.index(), message);
                    self.record_error(&run, errors, stage, &message, retryable)
                        .await;
                }
                CandidateOutcome::Cancelled => {
                    return self
                        .end_cancelled(run, errors, Some(key.to_string()), started)
                        .await;
                }
                CandidateOutcome::SessionLost(e) => {
                    return self
                        .fail_on_portal_error(
                            run,
                            errors,
                            Stage::OpenPreview,
                            Some(key.to_string()),
                            e,
                            started,
                        )
                        .await;
                }
            }
        }

        let mut reason = format!("no matching/saveable label among {} candidates", total);
        if save_failures > 0 {
            reason.push_str(&format!(
                " (save failed for {} verified candidate(s))",
                save_failures
            ));
        }
        self.record_error(&run, errors, Stage::Exhaustion, &reason, false)
            .await;
        let outcome = self
            .finish(
                &mut run,
                ItemStatus::VerificationExhausted,
                AcquisitionResult::failed(Some(key.to_string()), reason),
                started,
            )
            .await;
        (outcome, None)
    }

    /// Open, verify and, on a match, save one candidate. The preview window
    /// is always closed before returning.
    async fn attempt(
        &self,
        session: &Session,
        item: &ShipmentItem,
        candidate: &CandidateRef,
        destination: &Path,
    ) -> CandidateOutcome {
        let mut preview = match self.bridge.open(session, candidate).await {
            Ok(preview) => preview,
            Err(PreviewError::Trigger(e)) if e.is_auth() => {
                return CandidateOutcome::SessionLost(e);
            }
            Err(e) => {
                warn!(candidate = candidate.index(), error = %e, "Preview did not open");
                let retryable = matches!(&e, PreviewError::Trigger(inner) if inner.is_retryable());
                return CandidateOutcome::Failed {
                    stage: Stage::OpenPreview,
                    message: e.to_string(),
                    retryable,
                    during_save: false,
                };
            }
        };

        let outcome = self
            .verify_and_save(&mut preview, item, destination)
            .await;

        let keep_open = matches!(outcome, CandidateOutcome::Saved { .. })
            && !self.config.close_preview_after_save;
        if !keep_open {
            self.controller.close(&mut preview).await;
        }
        outcome
    }

    async fn verify_and_save(
        &self,
        preview: &mut Interaction,
        item: &ShipmentItem,
        destination: &Path,
    ) -> CandidateOutcome {
        let text = match self.controller.extract_text(preview).await {
            Ok(text) => text,
            Err(e) => {
                warn!(window = %preview.handle(), error = %e, "No text from preview");
                return CandidateOutcome::Failed {
                    stage: Stage::ExtractText,
                    message: e.to_string(),
                    retryable: e.is_retryable(),
                    during_save: false,
                };
            }
        };

        let report = self
            .verifier
            .inspect(&text, &item.item_key, &item.lot_key);
        if !report.passed() {
            return CandidateOutcome::Rejected {
                missing: report.missing(),
            };
        }
        info!(window = %preview.handle(), "Label verified, saving");

        if let Err(e) = prepare_destination(destination).await {
            return CandidateOutcome::Failed {
                stage: Stage::SubmitDestination,
                message: e.to_string(),
                retryable: false,
                during_save: true,
            };
        }

        let saved = match self.controller.make_ready(preview).await {
            Ok(()) => self.controller.save_sequence(preview, destination).await,
            Err(e) => Err(e),
        };

        match saved {
            Ok(()) => {
                let sha256 = match sha256_file(destination).await {
                    Ok(digest) => Some(digest),
                    Err(e) => {
                        warn!(path = %destination.display(), error = %e, "Checksum failed");
                        None
                    }
                };
                CandidateOutcome::Saved {
                    path: destination.to_path_buf(),
                    sha256,
                }
            }
            Err(DesktopError::Cancelled) => {
                discard_partial(destination).await;
                CandidateOutcome::Cancelled
            }
            Err(e) => {
                warn!(path = %destination.display(), error = %e, "Save sequence failed");
                discard_partial(destination).await;
                CandidateOutcome::Failed {
                    stage: save_stage(&e),
                    message: e.to_string(),
                    retryable: false,
                    during_save: true,
                }
            }
        }
    }

    /// Finish an item after a portal error. Auth errors also end the run.
    async fn fail_on_portal_error(
        &self,
        mut run: ItemRun<'_>,
        errors: &mut ErrorLedger,
        stage: Stage,
        production_key: Option<String>,
        error: NavigatorError,
        started: Instant,
    ) -> (ItemOutcome, Option<NavigatorError>) {
        let message = error.to_string();
        self.record_error(&run, errors, stage, &message, error.is_retryable())
            .await;
        let outcome = self
            .finish(
                &mut run,
                ItemStatus::Failed,
                AcquisitionResult::failed(production_key, message),
                started,
            )
            .await;
        let lost = error.is_auth().then_some(error);
        (outcome, lost)
    }

    async fn end_cancelled(
        &self,
        mut run: ItemRun<'_>,
        errors: &mut ErrorLedger,
        production_key: Option<String>,
        started: Instant,
    ) -> (ItemOutcome, Option<NavigatorError>) {
        self.record_error(&run, errors, Stage::Exhaustion, REASON_CANCELLED, false)
            .await;
        let outcome = self
            .finish(
                &mut run,
                ItemStatus::Failed,
                AcquisitionResult::failed(production_key, REASON_CANCELLED),
                started,
            )
            .await;
        (outcome, None)
    }

    async fn record_error(
        &self,
        run: &ItemRun<'_>,
        errors: &mut ErrorLedger,
        stage: Stage,
        message: &str,
        retryable: bool,
    ) {
        warn!(item = %run.item.reference(), %stage, message, "Recorded failure");
        metrics::STAGE_FAILURES
            .with_label_values(&[stage.as_str()])
            .inc();
        errors.record(ErrorRecord {
            item_reference: run.item.reference(),
            stage,
            message: message.to_string(),
            retryable,
        });
        self.emit(LedgerEvent::ErrorRecorded {
            run_id: run.run_id.to_string(),
            item_key: run.item.item_key.clone(),
            lot_key: run.item.lot_key.clone(),
            stage,
            message: message.to_string(),
            retryable,
        })
        .await;
    }

    async fn transition(&self, run: &mut ItemRun<'_>, next: ItemStatus, reason: Option<&str>) {
        match run.item.advance(next) {
            Ok(previous) => {
                debug!(item = %run.item.reference(), from = %previous, to = %next, "Item status");
                self.emit(LedgerEvent::ItemStatusChanged {
                    run_id: run.run_id.to_string(),
                    item_key: run.item.item_key.clone(),
                    lot_key: run.item.lot_key.clone(),
                    from_status: previous.to_string(),
                    to_status: next.to_string(),
                    reason: reason.map(String::from),
                })
                .await;
            }
            Err(e) => warn!(item = %run.item.reference(), error = %e, "Status not changed"),
        }
    }

    async fn finish(
        &self,
        run: &mut ItemRun<'_>,
        status: ItemStatus,
        result: AcquisitionResult,
        started: Instant,
    ) -> ItemOutcome {
        self.transition(run, status, result.failure_reason.as_deref())
            .await;

        let elapsed = started.elapsed();
        metrics::ITEMS.with_label_values(&[status.as_str()]).inc();
        metrics::ITEM_DURATION
            .with_label_values(&[status.as_str()])
            .observe(elapsed.as_secs_f64());

        match status {
            ItemStatus::Saved => info!(
                item = %run.item.reference(),
                candidate = ?result.matched_candidate_index,
                "Item saved"
            ),
            _ => warn!(
                item = %run.item.reference(),
                %status,
                reason = result.failure_reason.as_deref().unwrap_or(""),
                "Item not saved"
            ),
        }

        ItemOutcome {
            item: run.item.clone(),
            result,
            candidates_tried: run.candidates_tried,
            duration_ms: elapsed.as_millis() as u64,
        }
    }
}

/// Remove whatever a failed save left behind.
async fn discard_partial(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!(path = %path.display(), "Removed partial file"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "Could not remove partial file"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_save_stage_mapping() {
        assert_eq!(
            save_stage(&DesktopError::save_io("/x.pdf", "gone")),
            Stage::SubmitDestination
        );
        assert_eq!(
            save_stage(&DesktopError::TargetNotFound {
                target: "Microsoft Print to PDF".into(),
                available: vec![],
            }),
            Stage::SelectTarget
        );
        assert_eq!(
            save_stage(&DesktopError::ControlNotFound {
                control: "Print".into(),
                window: crate::desktop::WindowHandle(1),
            }),
            Stage::ActivateControl
        );
    }

    #[test]
    fn test_candidate_metric_labels() {
        let saved = CandidateOutcome::Saved {
            path: PathBuf::from("a.pdf"),
            sha256: None,
        };
        assert_eq!(saved.metric_label(), "saved");

        let save_failed = CandidateOutcome::Failed {
            stage: Stage::SubmitDestination,
            message: String::new(),
            retryable: false,
            during_save: true,
        };
        assert_eq!(save_failed.metric_label(), "save_failed");

        let preview = CandidateOutcome::Failed {
            stage: Stage::OpenPreview,
            message: String::new(),
            retryable: false,
            during_save: false,
        };
        assert_eq!(preview.metric_label(), "preview_failed");
    }
}
