//! Chrome DevTools Protocol implementation of [`WebNavigator`].

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use headless_chrome::{Browser, LaunchOptions, Tab};
use serde_json::Value;
use tracing::{debug, info, warn};

use super::reachability::check_reachable;
use super::scripts::{self, MISSING};
use super::{
    BrowserConfig, CandidateRef, Credentials, Locator, LocatorConfig, NavigatorError,
    PortalConfig, ProductionKey, Session, WebNavigator,
};
use crate::polling::{poll_until, retry, StageBudget, StageBudgets, WaitError};

/// Drives the label portal through a Chromium-family browser.
pub struct CdpNavigator {
    #[allow(dead_code)]
    browser: Browser,
    tab: Arc<Tab>,
    portal: PortalConfig,
    locators: LocatorConfig,
    stages: StageBudgets,
    http: reqwest::Client,
    authenticated: AtomicBool,
    lookup_pane_ready: AtomicBool,
}

impl CdpNavigator {
    /// Launch a browser, or attach to one when `debugger_url` is set.
    pub fn launch(
        portal: PortalConfig,
        browser_config: &BrowserConfig,
        locators: LocatorConfig,
        stages: StageBudgets,
    ) -> Result<Self, NavigatorError> {
        let browser = match &browser_config.debugger_url {
            Some(url) => {
                info!(url = %url, "Attaching to running browser");
                Browser::connect(url.clone()).map_err(NavigatorError::browser)?
            }
            None => {
                info!(
                    headless = browser_config.headless,
                    width = browser_config.window_width,
                    height = browser_config.window_height,
                    "Launching browser"
                );
                let options = LaunchOptions::default_builder()
                    .headless(browser_config.headless)
                    .window_size(Some((
                        browser_config.window_width,
                        browser_config.window_height,
                    )))
                    .path(browser_config.executable_path.clone())
                    .idle_browser_timeout(Duration::from_secs(
                        browser_config.idle_browser_timeout_secs,
                    ))
                    .build()
                    .map_err(NavigatorError::browser)?;
                Browser::new(options).map_err(NavigatorError::browser)?
            }
        };

        let tab = browser.new_tab().map_err(NavigatorError::browser)?;

        Ok(Self {
            browser,
            tab,
            portal,
            locators,
            stages,
            http: reqwest::Client::new(),
            authenticated: AtomicBool::new(false),
            lookup_pane_ready: AtomicBool::new(false),
        })
    }

    fn eval(&self, script: &str) -> Result<Value, NavigatorError> {
        let result = self
            .tab
            .evaluate(script, false)
            .map_err(NavigatorError::browser)?;
        Ok(result.value.unwrap_or(Value::Null))
    }

    fn ensure_authenticated(&self) -> Result<(), NavigatorError> {
        if self.authenticated.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(NavigatorError::NotAuthenticated)
        }
    }

    async fn wait_page_ready(&self) -> Result<(), NavigatorError> {
        let budget = self.stages.page_ready;
        retry("page ready", &budget, NavigatorError::is_retryable, move |_| async move {
            poll_until("page ready", &budget, move || async move {
                match self.eval(scripts::PAGE_READY) {
                    Ok(value) => Ok::<_, NavigatorError>(value.as_bool().unwrap_or(false).then_some(())),
                    Err(e) => {
                        // Evaluation fails while a navigation swaps the document.
                        debug!(error = %e, "Readiness probe failed, still loading");
                        Ok(None)
                    }
                }
            })
            .await
            .map_err(|e| wait_error("page ready", e))
        })
        .await
    }

    async fn navigate(&self, url: &str) -> Result<(), NavigatorError> {
        debug!(url, "Navigating");
        self.tab.navigate_to(url).map_err(NavigatorError::browser)?;
        self.wait_page_ready().await
    }

    fn is_present(&self, locator: &Locator) -> Result<bool, NavigatorError> {
        Ok(self.eval(&scripts::is_present(locator))?.as_bool().unwrap_or(false))
    }

    async fn wait_for(&self, locator: &Locator, budget: &StageBudget) -> Result<(), NavigatorError> {
        let what = locator.to_string();
        poll_until(&what, budget, move || async move {
            Ok::<_, NavigatorError>(self.is_present(locator)?.then_some(()))
        })
        .await
        .map_err(|e| wait_error(&what, e))
    }

    /// Resolve `locator` and run an element script on it under the
    /// `element` budget.
    async fn act(&self, locator: &Locator, script: &str) -> Result<Value, NavigatorError> {
        let budget = self.stages.element;
        with_fresh_element(locator, &budget, move || async move {
            self.wait_for(locator, &budget).await?;
            self.eval(script)
        })
        .await
    }

    async fn click(&self, locator: &Locator) -> Result<(), NavigatorError> {
        debug!(locator = %locator, "Clicking");
        self.act(locator, &scripts::click(locator)).await.map(|_| ())
    }

    async fn read_text(&self, locator: &Locator) -> Result<String, NavigatorError> {
        let value = self.act(locator, &scripts::read_text(locator)).await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    /// Type through the devtools input pipeline; fall back to setting the
    /// value by script when the typed text does not stick.
    async fn type_text(&self, locator: &Locator, text: &str) -> Result<(), NavigatorError> {
        self.act(locator, &scripts::clear_value(locator)).await?;

        if let Err(e) = self.type_native(locator, text) {
            debug!(locator = %locator, error = %e, "Native typing unavailable");
        }

        let typed = self.act(locator, &scripts::read_value(locator)).await?;
        if typed.as_str().map(str::trim) == Some(text.trim()) {
            return Ok(());
        }

        warn!(locator = %locator, "Typed value did not stick, setting it by script");
        let set = self.act(locator, &scripts::set_value(locator, text)).await?;
        if set.as_str().map(str::trim) == Some(text.trim()) {
            Ok(())
        } else {
            Err(NavigatorError::Browser(format!(
                "could not set value of {}",
                locator
            )))
        }
    }

    fn type_native(&self, locator: &Locator, text: &str) -> Result<(), NavigatorError> {
        let element = match scripts::css_selector(locator) {
            Some(selector) => self.tab.find_element(&selector),
            None => self.tab.find_element_by_xpath(&locator.value),
        }
        .map_err(NavigatorError::browser)?;
        element.click().map_err(NavigatorError::browser)?;
        element.type_into(text).map_err(NavigatorError::browser)?;
        Ok(())
    }

    async fn select_index(&self, locator: &Locator, index: u32) -> Result<(), NavigatorError> {
        let value = self.act(locator, &scripts::select_index(locator, index)).await?;
        match value.as_str() {
            Some("ok") => Ok(()),
            _ => Err(NavigatorError::ElementNotFound(format!(
                "option {} of {}",
                index, locator
            ))),
        }
    }

    async fn open_lookup_pane(&self) -> Result<(), NavigatorError> {
        info!("Opening production-key lookup pane");
        let l = &self.locators;

        self.navigate(&self.portal.records_url).await?;
        self.click(&l.records_table_link).await?;
        self.wait_page_ready().await?;

        if let Some(toggle) = &l.filter_toggle {
            if self.is_present(toggle)? {
                self.click(toggle).await?;
                self.wait_page_ready().await?;
            } else {
                debug!("No filter toggle, filters assumed visible");
            }
        }

        self.select_index(&l.operand_dropdown, l.operand_index).await?;
        self.select_index(&l.column_dropdown, l.column_index).await?;
        self.wait_page_ready().await
    }

    async fn lookup_once(&self, lot_key: &str) -> Result<Option<ProductionKey>, NavigatorError> {
        if !self.lookup_pane_ready.load(Ordering::SeqCst) {
            self.open_lookup_pane().await?;
            self.lookup_pane_ready.store(true, Ordering::SeqCst);
        }

        let l = &self.locators;
        self.type_text(&l.filter_value_input, lot_key).await?;
        self.click(&l.filter_find_button).await?;
        self.wait_page_ready().await?;

        let budget = self.stages.lookup;
        poll_until("lookup result", &budget, move || async move {
            if self.is_present(&l.production_key_cell)? {
                let text = self.read_text(&l.production_key_cell).await?;
                if !text.is_empty() {
                    return Ok(Some(Some(ProductionKey::new(text))));
                }
            }
            if self.is_present(&l.no_records)? {
                return Ok(Some(None));
            }
            Ok::<_, NavigatorError>(None)
        })
        .await
        .map_err(|e| wait_error("lookup result", e))
    }

    async fn search_once(&self, key: &ProductionKey) -> Result<Vec<CandidateRef>, NavigatorError> {
        let l = &self.locators;
        self.navigate(&self.portal.label_search_url).await?;
        self.type_text(&l.search_input, key.as_str()).await?;
        self.click(&l.search_button).await?;
        self.wait_page_ready().await?;

        match self.wait_for(&l.results_grid, &self.stages.search).await {
            Ok(()) => {}
            Err(NavigatorError::Timeout { .. }) => {
                debug!(key = %key, "No results grid rendered");
                return Ok(Vec::new());
            }
            Err(e) => return Err(e),
        }

        let mut candidates = Vec::new();
        for row in 0..l.max_result_rows {
            let locator = l.result_row.render(row);
            if !self.is_present(&locator)? {
                break;
            }
            candidates.push(CandidateRef::new(row, locator.to_string()));
        }
        Ok(candidates)
    }
}

/// Run `attempt_once` until it acts on a live element.
///
/// Each attempt resolves the element again. A [`MISSING`] result means the
/// element went away between resolution and use. Stale results and presence
/// timeouts are retried within `budget`; the last stale result is reported
/// with the number of attempts made.
async fn with_fresh_element<F, Fut>(
    locator: &Locator,
    budget: &StageBudget,
    attempt_once: F,
) -> Result<Value, NavigatorError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<Value, NavigatorError>>,
{
    let attempt_once = &attempt_once;
    retry(
        "element action",
        budget,
        NavigatorError::is_retryable,
        move |attempt| async move {
            let value = attempt_once().await?;
            if value.as_str() == Some(MISSING) {
                return Err(NavigatorError::StaleReference {
                    locator: locator.to_string(),
                    attempts: attempt,
                });
            }
            Ok(value)
        },
    )
    .await
}

fn wait_error(what: &str, e: WaitError<NavigatorError>) -> NavigatorError {
    match e {
        WaitError::TimedOut { waited_ms, .. } => NavigatorError::timeout(what, waited_ms),
        WaitError::Probe(inner) => inner,
    }
}

#[async_trait]
impl WebNavigator for CdpNavigator {
    fn name(&self) -> &str {
        "cdp"
    }

    async fn authenticate(&self, credentials: &Credentials) -> Result<Session, NavigatorError> {
        let login_url = self.portal.login_url.as_str();

        if self.portal.reachability_check {
            check_reachable(&self.http, login_url, self.stages.page_ready.timeout()).await?;
        }

        info!(url = login_url, user = %credentials.username, "Logging in");
        self.navigate(login_url).await.map_err(|e| match e {
            NavigatorError::Timeout { .. } | NavigatorError::Browser(_) => {
                NavigatorError::Unreachable {
                    url: login_url.to_string(),
                    reason: e.to_string(),
                }
            }
            other => other,
        })?;

        let l = &self.locators;
        self.type_text(&l.username_field, &credentials.username).await?;
        self.type_text(&l.password_field, &credentials.password).await?;
        self.click(&l.login_button).await?;
        self.wait_page_ready().await?;

        let rejected = match &l.login_error {
            Some(error) if self.is_present(error)? => true,
            _ => self.is_present(&l.password_field)?,
        };
        if rejected {
            return Err(NavigatorError::AuthRejected {
                username: credentials.username.clone(),
            });
        }

        self.authenticated.store(true, Ordering::SeqCst);
        self.lookup_pane_ready.store(false, Ordering::SeqCst);
        info!(user = %credentials.username, "Logged in");
        Ok(Session::new(credentials.username.clone()))
    }

    async fn lookup_production_key(
        &self,
        _session: &Session,
        lot_key: &str,
    ) -> Result<Option<ProductionKey>, NavigatorError> {
        self.ensure_authenticated()?;
        let budget = self.stages.lookup;
        let result = retry("production key lookup", &budget, NavigatorError::is_retryable, move |_| {
            self.lookup_once(lot_key)
        })
        .await;

        if result.is_err() {
            // Force the pane to be rebuilt on the next lookup.
            self.lookup_pane_ready.store(false, Ordering::SeqCst);
        }
        result
    }

    async fn search_labels(
        &self,
        _session: &Session,
        key: &ProductionKey,
    ) -> Result<Vec<CandidateRef>, NavigatorError> {
        self.ensure_authenticated()?;
        // The search page replaces the lookup pane.
        self.lookup_pane_ready.store(false, Ordering::SeqCst);

        let budget = self.stages.search;
        let candidates = retry("label search", &budget, NavigatorError::is_retryable, move |_| {
            self.search_once(key)
        })
        .await?;
        info!(key = %key, candidates = candidates.len(), "Label search finished");
        Ok(candidates)
    }

    async fn trigger_preview(
        &self,
        _session: &Session,
        candidate: &CandidateRef,
    ) -> Result<(), NavigatorError> {
        self.ensure_authenticated()?;
        let locator = self.locators.preview_button.render(candidate.ordinal);
        info!(index = candidate.index(), locator = %locator, "Triggering preview");
        self.click(&locator).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicU32;

    use super::*;

    fn grid() -> Locator {
        Locator::id("gridLabels__ctl03_btnPreview")
    }

    /// Attempts returning `script[n]` on the n-th call, the last entry after that.
    async fn act_with(
        budget: StageBudget,
        script: Vec<Result<Value, NavigatorError>>,
    ) -> (Result<Value, NavigatorError>, u32) {
        let calls = AtomicU32::new(0);
        let locator = grid();
        let result = with_fresh_element(&locator, &budget, || {
            let n = calls.fetch_add(1, Ordering::SeqCst) as usize;
            let outcome = script[n.min(script.len() - 1)].clone();
            async move { outcome }
        })
        .await;
        (result, calls.load(Ordering::SeqCst))
    }

    fn stale() -> Result<Value, NavigatorError> {
        Ok(Value::String(MISSING.to_string()))
    }

    #[tokio::test(start_paused = true)]
    async fn test_element_found_again_after_stale_results() {
        let (result, calls) = act_with(
            StageBudget::new(1_000, 50, 3),
            vec![stale(), stale(), stale(), Ok(Value::Bool(true))],
        )
        .await;

        assert_eq!(result.unwrap(), Value::Bool(true));
        assert_eq!(calls, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_reference_after_budget_spent() {
        let (result, calls) = act_with(StageBudget::new(1_000, 50, 2), vec![stale()]).await;

        match result {
            Err(NavigatorError::StaleReference { locator, attempts }) => {
                assert_eq!(locator, grid().to_string());
                assert_eq!(attempts, 3);
            }
            other => panic!("expected StaleReference, got {:?}", other),
        }
        assert_eq!(calls, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_presence_timeout_is_retried() {
        let (result, calls) = act_with(
            StageBudget::new(1_000, 50, 1),
            vec![
                Err(NavigatorError::timeout("id=btnPreview", 1_000)),
                Ok(Value::Null),
            ],
        )
        .await;

        assert_eq!(result.unwrap(), Value::Null);
        assert_eq!(calls, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_returned_once_retries_run_out() {
        let (result, calls) = act_with(
            StageBudget::new(1_000, 50, 1),
            vec![Err(NavigatorError::timeout("id=btnPreview", 1_000))],
        )
        .await;

        assert!(matches!(result, Err(NavigatorError::Timeout { .. })));
        assert_eq!(calls, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_browser_errors_are_not_retried() {
        let (result, calls) = act_with(
            StageBudget::new(1_000, 50, 3),
            vec![Err(NavigatorError::Browser("target closed".to_string()))],
        )
        .await;

        assert!(matches!(result, Err(NavigatorError::Browser(_))));
        assert_eq!(calls, 1);
    }
}
