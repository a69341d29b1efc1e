//! Mock label portal for testing.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::navigator::{
    CandidateRef, Credentials, NavigatorError, ProductionKey, Session, WebNavigator,
};

use super::{MockDesktop, SaveBehavior};

/// One label as the portal lists it.
#[derive(Debug, Clone)]
pub struct LabelFixture {
    /// Text the preview window renders.
    pub text: String,
    pub save: SaveBehavior,
    /// Whether triggering the preview opens a window at all.
    pub opens: bool,
}

impl LabelFixture {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            save: SaveBehavior::Succeed,
            opens: true,
        }
    }

    pub fn with_save(mut self, save: SaveBehavior) -> Self {
        self.save = save;
        self
    }

    /// The preview never appears.
    pub fn silent(mut self) -> Self {
        self.opens = false;
        self
    }
}

#[derive(Debug, Default)]
struct PortalState {
    accepted: Option<(String, String)>,
    unreachable: bool,
    records: HashMap<String, String>,
    labels: HashMap<String, Vec<LabelFixture>>,
    last_search: Vec<LabelFixture>,
    lookups: Vec<String>,
    searches: Vec<String>,
    previews: Vec<usize>,
    next_error: Option<NavigatorError>,
    expire_after_previews: Option<usize>,
}

/// Mock implementation of [`WebNavigator`].
///
/// Triggering a preview opens a window on the shared [`MockDesktop`].
#[derive(Debug, Clone)]
pub struct MockPortal {
    state: Arc<RwLock<PortalState>>,
    desktop: MockDesktop,
}

impl MockPortal {
    pub fn new(desktop: MockDesktop) -> Self {
        Self {
            state: Arc::new(RwLock::new(PortalState::default())),
            desktop,
        }
    }

    /// Only these credentials log in. Unset means any credentials do.
    pub async fn accept(&self, username: &str, password: &str) {
        self.state.write().await.accepted = Some((username.to_string(), password.to_string()));
    }

    pub async fn set_unreachable(&self) {
        self.state.write().await.unreachable = true;
    }

    /// Record `production_key` for `lot_key` in the lookup table.
    pub async fn add_record(&self, lot_key: &str, production_key: &str) {
        self.state
            .write()
            .await
            .records
            .insert(lot_key.to_string(), production_key.to_string());
    }

    /// Labels filed under `production_key`, in result order.
    pub async fn set_labels(&self, production_key: &str, labels: Vec<LabelFixture>) {
        self.state
            .write()
            .await
            .labels
            .insert(production_key.to_string(), labels);
    }

    /// Fail the next lookup, search or preview with `error`.
    pub async fn set_next_error(&self, error: NavigatorError) {
        self.state.write().await.next_error = Some(error);
    }

    /// After `count` previews every portal call reports a lost session.
    pub async fn expire_session_after_previews(&self, count: usize) {
        self.state.write().await.expire_after_previews = Some(count);
    }

    pub async fn recorded_lookups(&self) -> Vec<String> {
        self.state.read().await.lookups.clone()
    }

    pub async fn recorded_searches(&self) -> Vec<String> {
        self.state.read().await.searches.clone()
    }

    /// 1-based indices of previewed candidates, in order.
    pub async fn recorded_previews(&self) -> Vec<usize> {
        self.state.read().await.previews.clone()
    }

    async fn check(&self) -> Result<(), NavigatorError> {
        let mut state = self.state.write().await;
        if let Some(limit) = state.expire_after_previews {
            if state.previews.len() >= limit {
                return Err(NavigatorError::NotAuthenticated);
            }
        }
        match state.next_error.take() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl WebNavigator for MockPortal {
    fn name(&self) -> &str {
        "mock"
    }

    async fn authenticate(&self, credentials: &Credentials) -> Result<Session, NavigatorError> {
        let state = self.state.read().await;
        if state.unreachable {
            return Err(NavigatorError::Unreachable {
                url: "mock://portal/login".to_string(),
                reason: "connection refused".to_string(),
            });
        }
        if let Some((ref user, ref pass)) = state.accepted {
            if *user != credentials.username || *pass != credentials.password {
                return Err(NavigatorError::AuthRejected {
                    username: credentials.username.clone(),
                });
            }
        }
        Ok(Session::new(credentials.username.clone()))
    }

    async fn lookup_production_key(
        &self,
        _session: &Session,
        lot_key: &str,
    ) -> Result<Option<ProductionKey>, NavigatorError> {
        self.state.write().await.lookups.push(lot_key.to_string());
        self.check().await?;
        Ok(self
            .state
            .read()
            .await
            .records
            .get(lot_key)
            .map(ProductionKey::new))
    }

    async fn search_labels(
        &self,
        _session: &Session,
        key: &ProductionKey,
    ) -> Result<Vec<CandidateRef>, NavigatorError> {
        self.state.write().await.searches.push(key.to_string());
        self.check().await?;

        let mut state = self.state.write().await;
        let labels = state.labels.get(key.as_str()).cloned().unwrap_or_default();
        let candidates = (0..labels.len())
            .map(|i| CandidateRef::new(i, format!("gridLabels__{}", i)))
            .collect();
        state.last_search = labels;
        Ok(candidates)
    }

    async fn trigger_preview(
        &self,
        _session: &Session,
        candidate: &CandidateRef,
    ) -> Result<(), NavigatorError> {
        self.check().await?;

        let fixture = {
            let mut state = self.state.write().await;
            state.previews.push(candidate.index());
            state
                .last_search
                .get(candidate.ordinal)
                .cloned()
                .ok_or_else(|| NavigatorError::ElementNotFound(candidate.row_ref.clone()))?
        };

        if fixture.opens {
            self.desktop.open_preview(&fixture.text, fixture.save).await;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_authentication_rules() {
        let portal = MockPortal::new(MockDesktop::new());
        portal.accept("ops", "pw").await;

        assert!(portal.authenticate(&Credentials::new("ops", "pw")).await.is_ok());
        assert!(matches!(
            portal.authenticate(&Credentials::new("ops", "nope")).await,
            Err(NavigatorError::AuthRejected { .. })
        ));

        portal.set_unreachable().await;
        assert!(matches!(
            portal.authenticate(&Credentials::new("ops", "pw")).await,
            Err(NavigatorError::Unreachable { .. })
        ));
    }

    #[tokio::test]
    async fn test_preview_opens_window() {
        let desktop = MockDesktop::new();
        let portal = MockPortal::new(desktop.clone());
        let session = Session::new("ops");
        portal
            .set_labels(
                "123456789",
                vec![LabelFixture::new("a"), LabelFixture::new("b").silent()],
            )
            .await;

        let candidates = portal
            .search_labels(&session, &ProductionKey::new("123456789"))
            .await
            .unwrap();
        assert_eq!(candidates.len(), 2);

        portal.trigger_preview(&session, &candidates[0]).await.unwrap();
        portal.trigger_preview(&session, &candidates[1]).await.unwrap();
        assert_eq!(desktop.open_windows().await.len(), 1);
        assert_eq!(portal.recorded_previews().await, vec![1, 2]);
    }
}
