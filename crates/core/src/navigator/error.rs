//! Error types for the web navigation channel.

use thiserror::Error;

/// Errors raised while driving the label portal.
#[derive(Debug, Clone, Error)]
pub enum NavigatorError {
    /// The portal rejected the credentials.
    #[error("authentication rejected for user {username}")]
    AuthRejected { username: String },

    /// The portal could not be reached at all.
    #[error("portal unreachable at {url}: {reason}")]
    Unreachable { url: String, reason: String },

    /// No credentials were available.
    #[error("credentials unavailable: {0}")]
    MissingCredentials(String),

    /// An operation was attempted before authenticating.
    #[error("not authenticated")]
    NotAuthenticated,

    /// A bounded wait expired.
    #[error("timed out waiting for {what} after {waited_ms} ms")]
    Timeout { what: String, waited_ms: u64 },

    /// An element kept disappearing between resolution and use.
    #[error("element {locator} went stale after {attempts} attempts")]
    StaleReference { locator: String, attempts: u32 },

    /// A required element is not on the page.
    #[error("element not found: {0}")]
    ElementNotFound(String),

    /// The browser or devtools connection failed.
    #[error("browser error: {0}")]
    Browser(String),
}

impl NavigatorError {
    pub fn timeout(what: impl Into<String>, waited_ms: u64) -> Self {
        Self::Timeout {
            what: what.into(),
            waited_ms,
        }
    }

    pub fn browser(e: impl std::fmt::Display) -> Self {
        Self::Browser(e.to_string())
    }

    /// Errors that abort the whole run.
    pub fn is_auth(&self) -> bool {
        matches!(
            self,
            Self::AuthRejected { .. }
                | Self::Unreachable { .. }
                | Self::MissingCredentials(_)
                | Self::NotAuthenticated
        )
    }

    /// Errors worth another attempt at the same step.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::StaleReference { .. })
    }
}
