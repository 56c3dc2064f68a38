//! Retry with exponential back-off for every outbound request.
//!
//! [`retry`] wraps any fallible async operation and retries failures the
//! caller classifies as retryable, sleeping between attempts through an
//! injectable [`Sleeper`] so delays can be asserted in tests without waiting.
//! [`RetryExecutor`] bundles a policy, a sleeper and a cancellation token and
//! is what the market clients actually use.

use std::fmt::Display;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::BoxFuture;
use shelfscan_core::AppConfig;
use tokio_util::sync::CancellationToken;

use crate::error::ScraperError;

/// Upper bound for any single back-off delay.
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(60);

/// Marker error produced when a cancellation token fires between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cancelled;

impl Display for Cancelled {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("operation cancelled")
    }
}

impl std::error::Error for Cancelled {}

/// Abstraction over "wait for this long".
pub trait Sleeper: Send + Sync {
    fn sleep(&self, delay: Duration) -> BoxFuture<'_, ()>;
}

/// Production sleeper backed by the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

impl Sleeper for TokioSleeper {
    fn sleep(&self, delay: Duration) -> BoxFuture<'_, ()> {
        Box::pin(tokio::time::sleep(delay))
    }
}

/// Sleeper that returns immediately and records every requested delay.
#[derive(Debug, Default)]
pub struct RecordingSleeper {
    delays: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Delays requested so far, in call order.
    #[must_use]
    pub fn delays(&self) -> Vec<Duration> {
        self.delays
            .lock()
            .map(|d| d.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, delay: Duration) -> BoxFuture<'_, ()> {
        match self.delays.lock() {
            Ok(mut d) => d.push(delay),
            Err(poisoned) => poisoned.into_inner().push(delay),
        }
        Box::pin(std::future::ready(()))
    }
}

/// Back-off parameters.
///
/// `max_attempts` counts every call of the operation, including the first.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub backoff_factor: f64,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(6, Duration::from_secs(1), 2.0)
    }
}

impl RetryPolicy {
    #[must_use]
    pub fn new(max_attempts: u32, initial_delay: Duration, backoff_factor: f64) -> Self {
        Self {
            max_attempts,
            initial_delay,
            backoff_factor,
            max_delay: DEFAULT_MAX_DELAY,
        }
    }

    /// A policy that calls the operation once and never sleeps.
    #[must_use]
    pub fn no_retry() -> Self {
        Self::new(1, Duration::ZERO, 1.0)
    }

    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self::new(
            config.retry_max_attempts,
            Duration::from_millis(config.retry_initial_delay_ms),
            config.retry_backoff_factor,
        )
    }

    /// Delay that follows `current` in the geometric schedule, capped at `max_delay`.
    fn next_delay(&self, current: Duration) -> Duration {
        Duration::try_from_secs_f64(current.as_secs_f64() * self.backoff_factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

/// Runs `operation` until it succeeds, fails with a non-retryable error, or
/// `policy.max_attempts` calls have been made.
///
/// With `initial_delay = 1s` and `backoff_factor = 2` the sleeps between
/// attempts are 1s, 2s, 4s, ... On exhaustion the last error is returned
/// unchanged.
///
/// # Errors
///
/// Returns the operation's error when it is not retryable or when every
/// attempt has failed.
pub async fn retry<T, E, F, Fut, P>(
    policy: &RetryPolicy,
    sleeper: &dyn Sleeper,
    is_retryable: P,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
    E: Display,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut delay = policy.initial_delay.min(policy.max_delay);
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if !is_retryable(&err) {
                    tracing::debug!(attempt, error = %err, "non-retryable error; giving up");
                    return Err(err);
                }
                if attempt >= max_attempts {
                    tracing::warn!(attempt, max_attempts, error = %err, "retries exhausted");
                    return Err(err);
                }
                let delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
                tracing::warn!(
                    attempt,
                    max_attempts,
                    delay_ms,
                    error = %err,
                    "transient error; retrying after back-off"
                );
                sleeper.sleep(delay).await;
                delay = policy.next_delay(delay);
            }
        }
    }
}

/// Sleeper wrapper that wakes early when the token is cancelled.
struct CancellableSleeper<'a> {
    inner: &'a dyn Sleeper,
    cancel: &'a CancellationToken,
}

impl Sleeper for CancellableSleeper<'_> {
    fn sleep(&self, delay: Duration) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            tokio::select! {
                () = self.inner.sleep(delay) => {}
                () = self.cancel.cancelled() => {}
            }
        })
    }
}

/// A retry policy bound to a sleeper and a cancellation token.
///
/// Cloning is cheap; clones share the sleeper and observe the same token.
#[derive(Clone)]
pub struct RetryExecutor {
    policy: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
    cancel: CancellationToken,
}

impl std::fmt::Debug for RetryExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryExecutor")
            .field("policy", &self.policy)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl RetryExecutor {
    #[must_use]
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            sleeper: Arc::new(TokioSleeper),
            cancel: CancellationToken::new(),
        }
    }

    #[must_use]
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    #[must_use]
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    #[must_use]
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Sleeps for `delay` unless cancellation fires first.
    pub async fn pause(&self, delay: Duration) {
        if delay.is_zero() {
            return;
        }
        self.cancellable_sleeper().sleep(delay).await;
    }

    /// Runs `operation`, retrying transient [`ScraperError`]s.
    ///
    /// # Errors
    ///
    /// Returns [`ScraperError::Cancelled`] if the token fires before an
    /// attempt or during a transient failure, otherwise the error of the last
    /// attempt.
    pub async fn run<T, F, Fut>(&self, operation: F) -> Result<T, ScraperError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ScraperError>>,
    {
        self.run_with(ScraperError::is_transient, operation).await
    }

    /// Like [`Self::run`] with a caller-supplied retry classification.
    ///
    /// # Errors
    ///
    /// Returns `E::from(Cancelled)` if the token fires before an attempt or
    /// while a retryable attempt is failing, otherwise the error of the last
    /// attempt.
    pub async fn run_with<T, E, F, Fut, P>(&self, is_retryable: P, mut operation: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: Fn(&E) -> bool,
        E: Display + From<Cancelled>,
    {
        let cancel = &self.cancel;
        let sleeper = self.cancellable_sleeper();
        let retryable = |err: &E| !cancel.is_cancelled() && is_retryable(err);
        let result = retry(&self.policy, &sleeper, retryable, || {
            let attempt = operation();
            async move {
                if cancel.is_cancelled() {
                    return Err(E::from(Cancelled));
                }
                attempt.await
            }
        })
        .await;

        // A retryable failure seen after the token fired is the cancellation
        // surfacing through the attempt, not a final answer.
        match result {
            Err(err) if cancel.is_cancelled() && is_retryable(&err) => {
                tracing::debug!(error = %err, "attempt failed after cancellation");
                Err(E::from(Cancelled))
            }
            other => other,
        }
    }

    fn cancellable_sleeper(&self) -> CancellableSleeper<'_> {
        CancellableSleeper {
            inner: self.sleeper.as_ref(),
            cancel: &self.cancel,
        }
    }
}

#[cfg(test)]
#[path = "retry_test.rs"]
mod tests;
