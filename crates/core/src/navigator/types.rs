//! Types exchanged with the label portal.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::NavigatorError;

/// Portal login credentials.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Source of portal credentials.
pub trait CredentialProvider: Send + Sync {
    fn credentials(&self) -> Result<Credentials, NavigatorError>;
}

/// Credentials held in memory, typically read from configuration.
#[derive(Debug, Clone)]
pub struct StaticCredentials {
    username: Option<String>,
    password: Option<String>,
}

impl StaticCredentials {
    pub fn new(username: Option<String>, password: Option<String>) -> Self {
        Self { username, password }
    }
}

impl CredentialProvider for StaticCredentials {
    fn credentials(&self) -> Result<Credentials, NavigatorError> {
        let username = self.username.as_deref().unwrap_or_default();
        if username.is_empty() {
            return Err(NavigatorError::MissingCredentials(
                "username is not configured".to_string(),
            ));
        }
        let password = self.password.as_deref().unwrap_or_default();
        if password.is_empty() {
            return Err(NavigatorError::MissingCredentials(
                "password is not configured".to_string(),
            ));
        }
        Ok(Credentials::new(username, password))
    }
}

/// An authenticated portal session.
///
/// Created once by [`super::WebNavigator::authenticate`] and passed by
/// reference to every later portal call of the run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub username: String,
    pub authenticated_at: DateTime<Utc>,
}

impl Session {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            username: username.into(),
            authenticated_at: Utc::now(),
        }
    }
}

/// Key under which the portal files a product's labels.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductionKey(String);

impl ProductionKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into().trim().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProductionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// How a production key was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeySource {
    /// The lot key already had the production-key format.
    LotKey,
    /// The input row carried a usable key.
    Hint,
    /// Found through the portal's record lookup.
    Lookup,
}

/// Outcome of resolving an item's production key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyResolution {
    Resolved { key: ProductionKey, source: KeySource },
    NotFound,
}

impl KeyResolution {
    pub fn key(&self) -> Option<&ProductionKey> {
        match self {
            KeyResolution::Resolved { key, .. } => Some(key),
            KeyResolution::NotFound => None,
        }
    }
}

/// One row of a label search, in portal order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateRef {
    /// Zero-based row position in the result grid.
    pub ordinal: usize,
    /// Opaque reference to the row, used for diagnostics.
    pub row_ref: String,
}

impl CandidateRef {
    pub fn new(ordinal: usize, row_ref: impl Into<String>) -> Self {
        Self {
            ordinal,
            row_ref: row_ref.into(),
        }
    }

    /// One-based position, as reported in results.
    pub fn index(&self) -> usize {
        self.ordinal + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credentials_debug_redacts_password() {
        let creds = Credentials::new("ops", "hunter2");
        let debug = format!("{:?}", creds);
        assert!(debug.contains("ops"));
        assert!(!debug.contains("hunter2"));
    }

    #[test]
    fn test_session_serialization() {
        let session = Session::new("ops");
        let json = serde_json::to_string(&session).unwrap();
        assert!(json.contains(&session.id.to_string()));

        let back: Session = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, session.id);
        assert_eq!(back.username, "ops");
    }

    #[test]
    fn test_static_credentials() {
        let ok = StaticCredentials::new(Some("ops".into()), Some("pw".into()));
        assert_eq!(ok.credentials().unwrap().username, "ops");

        let no_user = StaticCredentials::new(None, Some("pw".into()));
        assert!(matches!(
            no_user.credentials(),
            Err(NavigatorError::MissingCredentials(msg)) if msg.contains("username")
        ));

        let no_pass = StaticCredentials::new(Some("ops".into()), Some(String::new()));
        assert!(matches!(
            no_pass.credentials(),
            Err(NavigatorError::MissingCredentials(msg)) if msg.contains("password")
        ));
    }

    #[test]
    fn test_production_key_trims() {
        let key = ProductionKey::new(" 123456789 \n");
        assert_eq!(key.as_str(), "123456789");
        assert_eq!(key.to_string(), "123456789");
    }

    #[test]
    fn test_candidate_index_is_one_based() {
        let candidate = CandidateRef::new(2, "row-2");
        assert_eq!(candidate.index(), 3);
    }
}
