//! Error types for the desktop automation channel.

use std::path::PathBuf;

use thiserror::Error;

use super::WindowHandle;
use crate::polling::IllegalTransition;

/// Errors raised while driving native windows and dialogs.
#[derive(Debug, Clone, Error)]
pub enum DesktopError {
    /// No window matching the pattern appeared in time.
    #[error("no window matching {pattern} within {waited_ms} ms")]
    WindowNotFound { pattern: String, waited_ms: u64 },

    /// A named control was absent or never became actionable.
    #[error("control {control:?} not actionable on window {window}")]
    ControlNotFound {
        control: String,
        window: WindowHandle,
    },

    /// The selection dialog does not offer the requested target.
    #[error("target {target:?} not offered (available: {available:?})")]
    TargetNotFound {
        target: String,
        available: Vec<String>,
    },

    /// The file-save step failed or the file never appeared.
    #[error("save to {path} failed: {reason}")]
    SaveIo { path: PathBuf, reason: String },

    /// The rendering surface never produced readable text.
    #[error("no readable text on window {window} within {waited_ms} ms")]
    TextUnavailable { window: WindowHandle, waited_ms: u64 },

    /// The window disappeared while in use.
    #[error("window {0} is gone")]
    WindowGone(WindowHandle),

    #[error(transparent)]
    IllegalTransition(#[from] IllegalTransition),

    /// The run was cancelled between dialog steps.
    #[error("cancelled")]
    Cancelled,

    /// Native automation is not available on this platform.
    #[error("desktop automation unsupported: {0}")]
    Unsupported(String),

    /// The native automation layer reported an error.
    #[error("desktop backend error: {0}")]
    Backend(String),
}

impl DesktopError {
    pub fn save_io(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::SaveIo {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn backend(e: impl std::fmt::Display) -> Self {
        Self::Backend(e.to_string())
    }

    /// Errors worth another attempt at the same step.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ControlNotFound { .. } | Self::TargetNotFound { .. } | Self::Backend(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::polling::InteractionPhase;

    #[test]
    fn test_display() {
        let err = DesktopError::save_io("/out/a.pdf", "dialog vanished");
        assert_eq!(err.to_string(), "save to /out/a.pdf failed: dialog vanished");

        let err = DesktopError::ControlNotFound {
            control: "Print".into(),
            window: WindowHandle(16),
        };
        assert_eq!(err.to_string(), "control \"Print\" not actionable on window 0x10");
    }

    #[test]
    fn test_transition_conversion() {
        let err: DesktopError = IllegalTransition {
            from: InteractionPhase::Closed,
            to: InteractionPhase::Busy,
        }
        .into();
        assert_eq!(err.to_string(), "illegal transition closed -> busy");
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_save_errors_not_retryable() {
        assert!(!DesktopError::save_io("/x", "y").is_retryable());
        assert!(DesktopError::Backend("com".into()).is_retryable());
    }
}
