//! Window controller: bounded waits and the interaction state machine on top
//! of a [`DesktopBackend`].

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::{
    ControlOutcome, ControlRole, DesktopBackend, DesktopConfig, DesktopError, WindowHandle,
    WindowPattern,
};
use crate::polling::{
    poll_until, poll_with_retries, retry, CancelFlag, InteractionPhase, PhaseTracker, StageBudget,
    StageBudgets, WaitError,
};

/// One automated interaction with a native window.
#[derive(Debug)]
pub struct Interaction {
    handle: WindowHandle,
    label: &'static str,
    tracker: PhaseTracker,
}

impl Interaction {
    pub fn handle(&self) -> WindowHandle {
        self.handle
    }

    pub fn label(&self) -> &'static str {
        self.label
    }

    pub fn phase(&self) -> InteractionPhase {
        self.tracker.phase()
    }

    fn advance(&mut self, next: InteractionPhase) -> Result<(), DesktopError> {
        self.tracker.advance(next)?;
        debug!(window = %self.handle, label = self.label, phase = %next, "Interaction phase");
        Ok(())
    }
}

/// Drives native windows: locating them, activating controls and walking
/// the print/save dialog sequence, each step under its own budget.
pub struct WindowController {
    backend: Arc<dyn DesktopBackend>,
    config: DesktopConfig,
    stages: StageBudgets,
    cancel: CancelFlag,
}

impl WindowController {
    pub fn new(backend: Arc<dyn DesktopBackend>, config: DesktopConfig, stages: StageBudgets) -> Self {
        Self {
            backend,
            config,
            stages,
            cancel: CancelFlag::new(),
        }
    }

    pub fn with_cancel_flag(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn config(&self) -> &DesktopConfig {
        &self.config
    }

    pub fn stages(&self) -> &StageBudgets {
        &self.stages
    }

    fn check_cancelled(&self) -> Result<(), DesktopError> {
        if self.cancel.is_cancelled() {
            Err(DesktopError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Handles of currently open windows matching `pattern`.
    pub async fn snapshot(&self, pattern: &WindowPattern) -> Result<Vec<WindowHandle>, DesktopError> {
        Ok(self
            .backend
            .list_windows()
            .await?
            .into_iter()
            .filter(|w| pattern.matches(w))
            .map(|w| w.handle)
            .collect())
    }

    /// Poll for a window matching `pattern` that is not in `exclude`, once per
    /// attempt of `budget`.
    pub async fn locate(
        &self,
        pattern: &WindowPattern,
        budget: &StageBudget,
        exclude: &[WindowHandle],
    ) -> Result<WindowHandle, DesktopError> {
        let what = pattern.to_string();
        let found = poll_with_retries(&what, budget, move || async move {
            let windows = self.backend.list_windows().await?;
            Ok::<_, DesktopError>(
                windows
                    .into_iter()
                    .find(|w| pattern.matches(w) && !exclude.contains(&w.handle))
                    .map(|w| (w.handle, w.title)),
            )
        })
        .await
        .map_err(|e| match e {
            WaitError::TimedOut { waited_ms, .. } => DesktopError::WindowNotFound {
                pattern: what.clone(),
                waited_ms,
            },
            WaitError::Probe(inner) => inner,
        })?;

        info!(window = %found.0, title = %found.1, "Window located");
        Ok(found.0)
    }

    /// Start tracking a located window.
    pub fn attach(&self, handle: WindowHandle, label: &'static str) -> Result<Interaction, DesktopError> {
        let mut interaction = Interaction {
            handle,
            label,
            tracker: PhaseTracker::new(),
        };
        interaction.advance(InteractionPhase::Found)?;
        Ok(interaction)
    }

    /// Bring a found window to the foreground and mark it ready.
    pub async fn make_ready(&self, interaction: &mut Interaction) -> Result<(), DesktopError> {
        if !self.backend.is_alive(interaction.handle).await {
            return Err(DesktopError::WindowGone(interaction.handle));
        }
        self.backend.focus(interaction.handle).await?;
        interaction.advance(InteractionPhase::Ready)
    }

    /// Find and invoke the control configured for `role`.
    pub async fn activate_control(
        &self,
        interaction: &mut Interaction,
        role: ControlRole,
    ) -> Result<(), DesktopError> {
        interaction.advance(InteractionPhase::Busy)?;
        self.invoke_role(interaction.handle, role, &self.stages.control)
            .await?;
        interaction.advance(InteractionPhase::Ready)
    }

    async fn invoke_role(
        &self,
        handle: WindowHandle,
        role: ControlRole,
        budget: &StageBudget,
    ) -> Result<String, DesktopError> {
        let names = self.config.control_names(role);
        let label = names.join("|");
        let label = label.as_str();

        retry(role.as_str(), budget, DesktopError::is_retryable, move |_| async move {
            poll_until(role.as_str(), budget, move || async move {
                if !self.backend.is_alive(handle).await {
                    return Err(DesktopError::WindowGone(handle));
                }
                for name in names {
                    match self.backend.invoke_control(handle, name).await? {
                        ControlOutcome::Invoked => return Ok(Some(name.clone())),
                        ControlOutcome::Disabled => debug!(control = %name, "Control disabled"),
                        ControlOutcome::Missing => {}
                    }
                }
                Ok(None)
            })
            .await
            .map_err(|e| match e {
                WaitError::TimedOut { .. } => DesktopError::ControlNotFound {
                    control: label.to_string(),
                    window: handle,
                },
                WaitError::Probe(inner) => inner,
            })
        })
        .await
    }

    /// Select `target` in a selection dialog and confirm it.
    pub async fn resolve_target_selection(
        &self,
        dialog: &mut Interaction,
        target: &str,
    ) -> Result<(), DesktopError> {
        if dialog.phase() == InteractionPhase::Found {
            self.make_ready(dialog).await?;
        }
        dialog.advance(InteractionPhase::Busy)?;

        let handle = dialog.handle;
        let budget = self.stages.target_selection;

        let chosen = poll_with_retries("target selection", &budget, move || async move {
            let targets = self.backend.list_targets(handle).await?;
            Ok::<_, DesktopError>(
                targets
                    .into_iter()
                    .find(|t| t.trim().eq_ignore_ascii_case(target.trim())),
            )
        })
        .await;

        let chosen = match chosen {
            Ok(name) => name,
            Err(WaitError::TimedOut { .. }) => {
                let available = self.backend.list_targets(handle).await.unwrap_or_default();
                return Err(DesktopError::TargetNotFound {
                    target: target.to_string(),
                    available,
                });
            }
            Err(WaitError::Probe(e)) => return Err(e),
        };

        if !self.backend.select_target(handle, &chosen).await? {
            let available = self.backend.list_targets(handle).await.unwrap_or_default();
            return Err(DesktopError::TargetNotFound {
                target: chosen,
                available,
            });
        }
        info!(target = %chosen, "Target selected");

        self.invoke_role(handle, ControlRole::ConfirmTarget, &budget)
            .await?;
        dialog.advance(InteractionPhase::Ready)
    }

    /// Fill the file-save dialog with `path`, confirm, and wait for the file.
    pub async fn submit_destination(
        &self,
        dialog: &mut Interaction,
        path: &Path,
    ) -> Result<(), DesktopError> {
        if dialog.phase() == InteractionPhase::Found {
            self.make_ready(dialog)
                .await
                .map_err(|e| DesktopError::save_io(path, e.to_string()))?;
        }
        dialog.advance(InteractionPhase::Busy)?;

        let handle = dialog.handle;
        let destination = path.display().to_string();
        let filled = self
            .backend
            .set_field(handle, &self.config.filename_field, &destination)
            .await
            .map_err(|e| DesktopError::save_io(path, e.to_string()))?;
        if !filled {
            return Err(DesktopError::save_io(
                path,
                format!("field {:?} not found", self.config.filename_field),
            ));
        }

        self.invoke_role(handle, ControlRole::Save, &self.stages.control)
            .await
            .map_err(|e| DesktopError::save_io(path, format!("confirmation failed: {}", e)))?;

        let size = wait_for_stable_file(path, &self.stages.file_appear).await?;

        info!(path = %path.display(), bytes = size, "File saved");
        dialog.advance(InteractionPhase::Closed)
    }

    /// Print the rendering window's content to `path`.
    ///
    /// Activates the print control, selects the configured virtual target,
    /// and completes the file-save dialog. Dialogs left open by a failure are
    /// closed before returning.
    pub async fn save_sequence(
        &self,
        preview: &mut Interaction,
        path: &Path,
    ) -> Result<(), DesktopError> {
        self.check_cancelled()?;
        self.activate_control(preview, ControlRole::Print).await?;
        self.check_cancelled()?;

        let print_handle = self
            .locate(&self.config.print_dialog, &self.stages.target_selection, &[])
            .await?;
        let mut print_dialog = self.attach(print_handle, "print dialog")?;

        let result = self.finish_save(&mut print_dialog, path).await;
        if result.is_err() {
            self.close(&mut print_dialog).await;
        }
        result
    }

    async fn finish_save(&self, print_dialog: &mut Interaction, path: &Path) -> Result<(), DesktopError> {
        let target = self.config.print_target.clone();
        self.resolve_target_selection(print_dialog, &target).await?;
        self.check_cancelled()?;

        let save_handle = self
            .locate(&self.config.save_dialog, &self.stages.save_dialog, &[])
            .await
            .map_err(|e| match e {
                DesktopError::WindowNotFound { waited_ms, .. } => DesktopError::save_io(
                    path,
                    format!("save dialog did not appear within {} ms", waited_ms),
                ),
                other => other,
            })?;
        let mut save_dialog = self.attach(save_handle, "save dialog")?;

        let result = self.submit_destination(&mut save_dialog, path).await;
        if result.is_err() {
            self.close(&mut save_dialog).await;
        }
        result
    }

    /// Visible text of the window, waiting for it to render.
    pub async fn extract_text(&self, interaction: &Interaction) -> Result<String, DesktopError> {
        let handle = interaction.handle;
        poll_with_retries("rendered text", &self.stages.render, move || async move {
            if !self.backend.is_alive(handle).await {
                return Err(DesktopError::WindowGone(handle));
            }
            let text = self.backend.read_text(handle).await?;
            Ok((!text.trim().is_empty()).then_some(text))
        })
        .await
        .map_err(|e| match e {
            WaitError::TimedOut { waited_ms, .. } => DesktopError::TextUnavailable {
                window: handle,
                waited_ms,
            },
            WaitError::Probe(inner) => inner,
        })
    }

    /// Close the window. Best-effort: failures are logged, never returned.
    pub async fn close(&self, interaction: &mut Interaction) {
        if interaction.phase() == InteractionPhase::Closed {
            return;
        }

        let handle = interaction.handle;
        let budget = self.stages.close;
        let mut attempt = 0;
        while self.backend.is_alive(handle).await {
            attempt += 1;
            if attempt > budget.attempts() {
                warn!(window = %handle, label = interaction.label, "Window still open after close");
                break;
            }
            if let Err(e) = self.backend.close_window(handle).await {
                warn!(window = %handle, label = interaction.label, attempt, error = %e, "Close request failed");
            }
            let gone = poll_until("window closed", &budget, move || async move {
                Ok::<_, DesktopError>((!self.backend.is_alive(handle).await).then_some(()))
            })
            .await;
            if gone.is_ok() {
                break;
            }
        }

        if let Err(e) = interaction.advance(InteractionPhase::Closed) {
            debug!(window = %handle, error = %e, "Close on untracked phase");
        }
    }
}

/// Wait until `path` exists with a non-empty size that held still between
/// two polls. Returns the final size.
pub(crate) async fn wait_for_stable_file(path: &Path, budget: &StageBudget) -> Result<u64, DesktopError> {
    let last_size = AtomicU64::new(0);
    let last_size = &last_size;

    poll_with_retries("file on disk", budget, move || async move {
        let size = match tokio::fs::metadata(path).await {
            Ok(meta) => meta.len(),
            Err(_) => 0,
        };
        let previous = last_size.swap(size, Ordering::SeqCst);
        Ok::<_, DesktopError>((size > 0 && size == previous).then_some(size))
    })
    .await
    .map_err(|e| match e {
        WaitError::TimedOut { waited_ms, .. } => DesktopError::save_io(
            path,
            format!("file did not appear within {} ms", waited_ms),
        ),
        WaitError::Probe(inner) => inner,
    })
}
