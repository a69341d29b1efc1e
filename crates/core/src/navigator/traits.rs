//! Navigator trait definition.

use async_trait::async_trait;

use super::{CandidateRef, Credentials, NavigatorError, ProductionKey, Session};

/// The web channel: everything done through the portal's pages.
///
/// Implementations own the browser session exclusively and are driven
/// strictly sequentially.
#[async_trait]
pub trait WebNavigator: Send + Sync {
    /// Name of this implementation, for logs.
    fn name(&self) -> &str;

    /// Log in. Any error returned here is fatal for the run.
    async fn authenticate(&self, credentials: &Credentials) -> Result<Session, NavigatorError>;

    /// Look up the production key recorded for a lot.
    ///
    /// Returns `Ok(None)` when the portal has no matching record. Callers
    /// normally go through [`super::ProductionKeyResolver`], which skips this
    /// call when the key is already known.
    async fn lookup_production_key(
        &self,
        session: &Session,
        lot_key: &str,
    ) -> Result<Option<ProductionKey>, NavigatorError>;

    /// Search labels filed under a production key, in portal order.
    async fn search_labels(
        &self,
        session: &Session,
        key: &ProductionKey,
    ) -> Result<Vec<CandidateRef>, NavigatorError>;

    /// Trigger the preview action of a candidate from the latest search.
    async fn trigger_preview(
        &self,
        session: &Session,
        candidate: &CandidateRef,
    ) -> Result<(), NavigatorError>;
}
