//! Simulated desktop for testing.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::desktop::{ControlOutcome, DesktopBackend, DesktopError, WindowHandle, WindowInfo};

const DIALOG_CLASS: &str = "#32770";
const PDF_TARGET: &str = "Microsoft Print to PDF";

/// How the print/save sequence of a preview behaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SaveBehavior {
    /// Dialogs appear and the file is written.
    #[default]
    Succeed,
    /// The save dialog confirms but no file is ever written.
    NoFile,
    /// Confirming the print dialog never opens a save dialog.
    NoSaveDialog,
    /// The print dialog does not offer the file target.
    NoTarget,
}

#[derive(Debug, Clone)]
enum WindowKind {
    Preview { text: String },
    PrintDialog { selected: Option<String> },
    SaveDialog { filename: Option<String> },
    Other,
}

#[derive(Debug, Clone)]
struct MockWindow {
    info: WindowInfo,
    kind: WindowKind,
    save: SaveBehavior,
    alive: bool,
}

#[derive(Debug)]
struct DesktopState {
    windows: Vec<MockWindow>,
    next_handle: isize,
    invocations: Vec<(WindowHandle, String)>,
    closed: Vec<WindowHandle>,
    saved: Vec<PathBuf>,
    next_error: Option<DesktopError>,
}

/// A recorded control invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedInvocation {
    pub window: WindowHandle,
    pub control: String,
}

/// In-memory desktop implementing [`DesktopBackend`].
///
/// Previews are opened by [`super::MockPortal`]; invoking their print
/// control walks a print dialog and a save dialog like the real target.
/// A successful save writes a small PDF to the requested path.
#[derive(Debug, Clone)]
pub struct MockDesktop {
    state: Arc<RwLock<DesktopState>>,
}

impl Default for MockDesktop {
    fn default() -> Self {
        Self::new()
    }
}

impl MockDesktop {
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(DesktopState {
                windows: Vec::new(),
                next_handle: 0x100,
                invocations: Vec::new(),
                closed: Vec::new(),
                saved: Vec::new(),
                next_error: None,
            })),
        }
    }

    fn push(state: &mut DesktopState, title: &str, class: &str, kind: WindowKind, save: SaveBehavior) -> WindowHandle {
        let handle = WindowHandle(state.next_handle);
        state.next_handle += 0x10;
        state.windows.push(MockWindow {
            info: WindowInfo {
                handle,
                title: title.to_string(),
                class_name: class.to_string(),
                visible: true,
            },
            kind,
            save,
            alive: true,
        });
        handle
    }

    /// Open a label preview window showing `text`.
    pub async fn open_preview(&self, text: &str, save: SaveBehavior) -> WindowHandle {
        let mut state = self.state.write().await;
        Self::push(
            &mut state,
            "enLabel Global Services - Label Preview",
            "IEFrame",
            WindowKind::Preview {
                text: text.to_string(),
            },
            save,
        )
    }

    /// Open an unrelated window.
    pub async fn open_window(&self, title: &str, class: &str) -> WindowHandle {
        let mut state = self.state.write().await;
        Self::push(&mut state, title, class, WindowKind::Other, SaveBehavior::Succeed)
    }

    /// Fail the next backend call with `error`.
    pub async fn set_next_error(&self, error: DesktopError) {
        self.state.write().await.next_error = Some(error);
    }

    pub async fn open_windows(&self) -> Vec<WindowInfo> {
        self.state
            .read()
            .await
            .windows
            .iter()
            .filter(|w| w.alive)
            .map(|w| w.info.clone())
            .collect()
    }

    pub async fn recorded_invocations(&self) -> Vec<RecordedInvocation> {
        self.state
            .read()
            .await
            .invocations
            .iter()
            .map(|(window, control)| RecordedInvocation {
                window: *window,
                control: control.clone(),
            })
            .collect()
    }

    pub async fn closed_windows(&self) -> Vec<WindowHandle> {
        self.state.read().await.closed.clone()
    }

    /// Paths written by successful saves, in order.
    pub async fn saved_files(&self) -> Vec<PathBuf> {
        self.state.read().await.saved.clone()
    }

    async fn take_error(&self) -> Result<(), DesktopError> {
        match self.state.write().await.next_error.take() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

fn find(state: &mut DesktopState, handle: WindowHandle) -> Result<&mut MockWindow, DesktopError> {
    state
        .windows
        .iter_mut()
        .find(|w| w.info.handle == handle && w.alive)
        .ok_or(DesktopError::WindowGone(handle))
}

fn offered_targets(save: SaveBehavior) -> Vec<String> {
    let mut targets = vec!["Fax".to_string(), "OneNote (Desktop)".to_string()];
    if save != SaveBehavior::NoTarget {
        targets.push(PDF_TARGET.to_string());
    }
    targets
}

#[async_trait]
impl DesktopBackend for MockDesktop {
    fn name(&self) -> &str {
        "mock"
    }

    async fn list_windows(&self) -> Result<Vec<WindowInfo>, DesktopError> {
        self.take_error().await?;
        Ok(self.open_windows().await)
    }

    async fn is_alive(&self, handle: WindowHandle) -> bool {
        self.state
            .read()
            .await
            .windows
            .iter()
            .any(|w| w.info.handle == handle && w.alive)
    }

    async fn focus(&self, handle: WindowHandle) -> Result<(), DesktopError> {
        self.take_error().await?;
        let mut state = self.state.write().await;
        find(&mut state, handle).map(|_| ())
    }

    async fn invoke_control(
        &self,
        handle: WindowHandle,
        name: &str,
    ) -> Result<ControlOutcome, DesktopError> {
        self.take_error().await?;
        let mut state = self.state.write().await;
        let window = find(&mut state, handle)?.clone();
        state.invocations.push((handle, name.to_string()));

        match (&window.kind, name) {
            (WindowKind::Preview { .. }, "Print") => {
                Self::push(
                    &mut state,
                    "Print",
                    DIALOG_CLASS,
                    WindowKind::PrintDialog { selected: None },
                    window.save,
                );
                Ok(ControlOutcome::Invoked)
            }
            (WindowKind::PrintDialog { selected }, "Print" | "OK") => {
                if selected.is_none() {
                    return Ok(ControlOutcome::Disabled);
                }
                find(&mut state, handle)?.alive = false;
                if window.save != SaveBehavior::NoSaveDialog {
                    Self::push(
                        &mut state,
                        "Save Print Output As",
                        DIALOG_CLASS,
                        WindowKind::SaveDialog { filename: None },
                        window.save,
                    );
                }
                Ok(ControlOutcome::Invoked)
            }
            (WindowKind::SaveDialog { filename }, "Save") => {
                let Some(filename) = filename.clone() else {
                    return Ok(ControlOutcome::Disabled);
                };
                find(&mut state, handle)?.alive = false;
                if window.save == SaveBehavior::Succeed {
                    let path = PathBuf::from(filename);
                    std::fs::write(&path, b"%PDF-1.4\n% mock label\n%%EOF\n")
                        .map_err(|e| DesktopError::save_io(&path, e.to_string()))?;
                    state.saved.push(path);
                }
                Ok(ControlOutcome::Invoked)
            }
            _ => Ok(ControlOutcome::Missing),
        }
    }

    async fn list_targets(&self, handle: WindowHandle) -> Result<Vec<String>, DesktopError> {
        let mut state = self.state.write().await;
        let window = find(&mut state, handle)?;
        Ok(match window.kind {
            WindowKind::PrintDialog { .. } => offered_targets(window.save),
            _ => Vec::new(),
        })
    }

    async fn select_target(&self, handle: WindowHandle, name: &str) -> Result<bool, DesktopError> {
        let mut state = self.state.write().await;
        let window = find(&mut state, handle)?;
        let offered = offered_targets(window.save);
        match window.kind {
            WindowKind::PrintDialog { ref mut selected } if offered.iter().any(|t| t == name) => {
                *selected = Some(name.to_string());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn set_field(
        &self,
        handle: WindowHandle,
        field: &str,
        text: &str,
    ) -> Result<bool, DesktopError> {
        let mut state = self.state.write().await;
        let window = find(&mut state, handle)?;
        match window.kind {
            WindowKind::SaveDialog { ref mut filename } if field == "File name:" => {
                *filename = Some(text.to_string());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn read_text(&self, handle: WindowHandle) -> Result<String, DesktopError> {
        let mut state = self.state.write().await;
        let window = find(&mut state, handle)?;
        Ok(match window.kind {
            WindowKind::Preview { ref text } => text.clone(),
            _ => String::new(),
        })
    }

    async fn close_window(&self, handle: WindowHandle) -> Result<(), DesktopError> {
        let mut state = self.state.write().await;
        find(&mut state, handle)?.alive = false;
        state.closed.push(handle);
        Ok(())
    }
}
