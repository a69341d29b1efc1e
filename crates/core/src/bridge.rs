//! Handshake between the web channel and the desktop channel.
//!
//! The preview action is triggered through the browser, but the rendering
//! surface it opens lives outside the browser's reach. [`PreviewBridge`]
//! records which matching windows already exist, triggers the preview, and
//! hands a [`PreviewToken`] to the window controller, which polls for a new
//! window. Nothing else is shared between the two channels.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::desktop::{DesktopError, Interaction, WindowController, WindowHandle, WindowPattern};
use crate::navigator::{CandidateRef, NavigatorError, Session, WebNavigator};
use crate::polling::StageBudget;

/// Errors from opening a candidate's preview.
#[derive(Debug, Clone, Error)]
pub enum PreviewError {
    /// The preview action itself failed on the page.
    #[error("preview trigger failed: {0}")]
    Trigger(#[from] NavigatorError),

    /// No rendering window appeared in time.
    #[error("no preview window for candidate {candidate} within {waited_ms} ms")]
    Timeout { candidate: usize, waited_ms: u64 },

    #[error(transparent)]
    Desktop(DesktopError),
}

impl PreviewError {
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Trigger(e) if e.is_auth())
    }
}

/// Correlates one preview trigger with the window it is expected to open.
#[derive(Debug, Clone)]
pub struct PreviewToken {
    /// 1-based candidate position, for logs and errors.
    pub candidate: usize,
    pub pattern: WindowPattern,
    /// Matching windows that were open before the trigger.
    pub preexisting: Vec<WindowHandle>,
}

/// Opens label previews and waits for their rendering windows.
pub struct PreviewBridge {
    navigator: Arc<dyn WebNavigator>,
    controller: Arc<WindowController>,
}

impl PreviewBridge {
    pub fn new(navigator: Arc<dyn WebNavigator>, controller: Arc<WindowController>) -> Self {
        Self {
            navigator,
            controller,
        }
    }

    /// Trigger the preview of `candidate` and return the token to wait on.
    pub async fn trigger(
        &self,
        session: &Session,
        candidate: &CandidateRef,
    ) -> Result<PreviewToken, PreviewError> {
        let pattern = self.controller.config().preview_window.clone();
        let preexisting = self
            .controller
            .snapshot(&pattern)
            .await
            .map_err(PreviewError::Desktop)?;
        if !preexisting.is_empty() {
            debug!(count = preexisting.len(), "Preview windows already open");
        }

        self.navigator.trigger_preview(session, candidate).await?;

        Ok(PreviewToken {
            candidate: candidate.index(),
            pattern,
            preexisting,
        })
    }

    /// Wait for the window announced by `token` and start tracking it.
    ///
    /// Waits one preview timeout; re-triggering is left to [`Self::open`].
    pub async fn await_surface(&self, token: &PreviewToken) -> Result<Interaction, PreviewError> {
        let budget = StageBudget {
            retries: 0,
            ..self.controller.stages().preview
        };
        let handle = self
            .controller
            .locate(&token.pattern, &budget, &token.preexisting)
            .await
            .map_err(|e| match e {
                DesktopError::WindowNotFound { waited_ms, .. } => PreviewError::Timeout {
                    candidate: token.candidate,
                    waited_ms,
                },
                other => PreviewError::Desktop(other),
            })?;

        info!(candidate = token.candidate, window = %handle, "Preview window open");
        self.controller
            .attach(handle, "preview")
            .map_err(PreviewError::Desktop)
    }

    /// Trigger the preview and wait for its window, triggering again after
    /// each timeout while the preview budget has retries left.
    pub async fn open(
        &self,
        session: &Session,
        candidate: &CandidateRef,
    ) -> Result<Interaction, PreviewError> {
        let attempts = self.controller.stages().preview.attempts();
        let mut attempt = 1;
        loop {
            let token = self.trigger(session, candidate).await?;
            match self.await_surface(&token).await {
                Err(PreviewError::Timeout { waited_ms, .. }) if attempt < attempts => {
                    warn!(
                        candidate = token.candidate,
                        attempt, attempts, waited_ms, "Preview window did not open, triggering again"
                    );
                    attempt += 1;
                }
                other => return other,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::navigator::ProductionKey;
    use crate::testing::{fixtures, LabelFixture, MockDesktop, MockPortal};

    async fn bridge_with(preview: StageBudget, labels: Vec<LabelFixture>) -> (PreviewBridge, MockPortal, Vec<CandidateRef>) {
        let desktop = MockDesktop::new();
        let portal = MockPortal::new(desktop.clone());
        portal.set_labels("123456789", labels).await;
        let candidates = portal
            .search_labels(&Session::new("ops"), &ProductionKey::new("123456789"))
            .await
            .unwrap();

        let mut stages = fixtures::fast_stages();
        stages.preview = preview;
        let controller = Arc::new(fixtures::controller(&desktop, stages));
        let bridge = PreviewBridge::new(Arc::new(portal.clone()), controller);
        (bridge, portal, candidates)
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_triggers_again_on_timeout() {
        let (bridge, portal, candidates) =
            bridge_with(StageBudget::new(1_000, 100, 3), vec![LabelFixture::new("x").silent()]).await;
        let started = tokio::time::Instant::now();

        let err = bridge.open(&Session::new("ops"), &candidates[0]).await.unwrap_err();

        assert!(matches!(err, PreviewError::Timeout { candidate: 1, .. }));
        assert_eq!(portal.recorded_previews().await, vec![1, 1, 1, 1]);
        assert!(started.elapsed() >= std::time::Duration::from_millis(4_000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_without_retries_triggers_once() {
        let (bridge, portal, candidates) =
            bridge_with(StageBudget::new(1_000, 100, 0), vec![LabelFixture::new("x").silent()]).await;

        let err = bridge.open(&Session::new("ops"), &candidates[0]).await.unwrap_err();

        assert!(matches!(err, PreviewError::Timeout { .. }));
        assert_eq!(portal.recorded_previews().await, vec![1]);
    }

    #[tokio::test]
    async fn test_open_returns_new_window() {
        let (bridge, portal, candidates) =
            bridge_with(StageBudget::new(1_000, 5, 2), vec![LabelFixture::new("x")]).await;

        let preview = bridge.open(&Session::new("ops"), &candidates[0]).await.unwrap();

        assert_eq!(preview.label(), "preview");
        assert_eq!(portal.recorded_previews().await, vec![1]);
    }

    #[test]
    fn test_auth_errors_detected_through_trigger() {
        let err = PreviewError::from(NavigatorError::NotAuthenticated);
        assert!(err.is_auth());

        let err = PreviewError::Timeout {
            candidate: 2,
            waited_ms: 30000,
        };
        assert!(!err.is_auth());
        assert_eq!(
            err.to_string(),
            "no preview window for candidate 2 within 30000 ms"
        );
    }
}
