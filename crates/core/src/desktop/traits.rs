//! Desktop backend trait definition.

use async_trait::async_trait;

use super::{ControlOutcome, DesktopError, WindowHandle, WindowInfo};

/// Primitive operations on native windows.
///
/// Backends answer immediately; all waiting and retrying happens in
/// [`super::WindowController`].
#[async_trait]
pub trait DesktopBackend: Send + Sync {
    /// Name of this backend, for logs.
    fn name(&self) -> &str;

    /// Enumerate top-level windows.
    async fn list_windows(&self) -> Result<Vec<WindowInfo>, DesktopError>;

    /// Whether the window still exists.
    async fn is_alive(&self, handle: WindowHandle) -> bool;

    /// Bring the window to the foreground.
    async fn focus(&self, handle: WindowHandle) -> Result<(), DesktopError>;

    /// Find a control by name inside the window and invoke it.
    async fn invoke_control(
        &self,
        handle: WindowHandle,
        name: &str,
    ) -> Result<ControlOutcome, DesktopError>;

    /// Names of the selectable targets offered by a selection dialog.
    async fn list_targets(&self, handle: WindowHandle) -> Result<Vec<String>, DesktopError>;

    /// Select a target by exact name. Returns `false` when it is not offered.
    async fn select_target(&self, handle: WindowHandle, name: &str) -> Result<bool, DesktopError>;

    /// Fill a named text field. Returns `false` when the field is absent.
    async fn set_field(
        &self,
        handle: WindowHandle,
        field: &str,
        text: &str,
    ) -> Result<bool, DesktopError>;

    /// Visible text of the window.
    async fn read_text(&self, handle: WindowHandle) -> Result<String, DesktopError>;

    /// Ask the window to close.
    async fn close_window(&self, handle: WindowHandle) -> Result<(), DesktopError>;
}
