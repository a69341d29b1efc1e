//! Stage budgets and the bounded polling loop shared by both automation channels.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Timing budget for one pipeline step.
///
/// `retries` counts additional attempts after the first one, so a budget with
/// `retries = 2` runs the step at most three times.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageBudget {
    pub timeout_ms: u64,
    pub poll_interval_ms: u64,
    pub retries: u32,
}

impl StageBudget {
    pub const fn new(timeout_ms: u64, poll_interval_ms: u64, retries: u32) -> Self {
        Self {
            timeout_ms,
            poll_interval_ms,
            retries,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Total number of attempts this budget allows.
    pub fn attempts(&self) -> u32 {
        self.retries.saturating_add(1)
    }
}

/// Error returned by [`poll_until`].
#[derive(Debug, Error)]
pub enum WaitError<E> {
    /// The predicate never became ready inside the budget.
    #[error("timed out after {waited_ms} ms ({polls} polls)")]
    TimedOut { waited_ms: u64, polls: u32 },

    /// The probe itself failed; polling stops immediately.
    #[error("probe failed: {0}")]
    Probe(E),
}

impl<E> WaitError<E> {
    pub fn is_timeout(&self) -> bool {
        matches!(self, WaitError::TimedOut { .. })
    }
}

/// Poll `probe` every `budget.poll_interval()` until it yields a value or the
/// budget's timeout elapses.
///
/// The probe always runs at least once. `Ok(None)` means "not ready yet";
/// `Err` aborts the wait. All sleeping goes through `tokio::time`, so tests can
/// drive it with a paused clock.
pub async fn poll_until<T, E, F, Fut>(
    what: &str,
    budget: &StageBudget,
    mut probe: F,
) -> Result<T, WaitError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>, E>>,
{
    let started = Instant::now();
    let deadline = started + budget.timeout();
    let mut polls: u32 = 0;

    loop {
        polls += 1;
        match probe().await {
            Ok(Some(value)) => {
                debug!(what, polls, "Wait satisfied");
                return Ok(value);
            }
            Ok(None) => {}
            Err(e) => return Err(WaitError::Probe(e)),
        }

        let now = Instant::now();
        if now >= deadline {
            let waited_ms = now.duration_since(started).as_millis() as u64;
            debug!(what, polls, waited_ms, "Wait timed out");
            return Err(WaitError::TimedOut { waited_ms, polls });
        }

        let remaining = deadline - now;
        tokio::time::sleep(budget.poll_interval().min(remaining)).await;
    }
}

/// [`poll_until`] for each attempt the budget allows.
///
/// A timed-out wait starts over with a fresh timeout until the retries are
/// spent. Probe errors end the wait at once.
pub async fn poll_with_retries<T, E, F, Fut>(
    what: &str,
    budget: &StageBudget,
    probe: F,
) -> Result<T, WaitError<E>>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<Option<T>, E>>,
    E: std::fmt::Display,
{
    let probe = &probe;
    retry(
        what,
        budget,
        |e: &WaitError<E>| e.is_timeout(),
        move |_| poll_until(what, budget, probe),
    )
    .await
}

/// Run `op` up to `budget.attempts()` times, sleeping one poll interval
/// between attempts. Only errors accepted by `is_retryable` are retried.
pub async fn retry<T, E, F, Fut, R>(
    what: &str,
    budget: &StageBudget,
    is_retryable: R,
    mut op: F,
) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    R: Fn(&E) -> bool,
    E: std::fmt::Display,
{
    let attempts = budget.attempts();
    let mut attempt = 1;

    loop {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < attempts && is_retryable(&e) => {
                warn!(what, attempt, attempts, error = %e, "Step failed, retrying");
                attempt += 1;
                tokio::time::sleep(budget.poll_interval()).await;
            }
            Err(e) => return Err(e),
        }
    }
}
