//! Bounded retry with exponential backoff
//!
//! [`RetryExecutor`] runs a fallible async operation up to `max_attempts`
//! times, sleeping between attempts. It knows nothing about caching and is
//! used by [`ExplanationCache`](crate::core::ExplanationCache) to make
//! population resilient to transient store failures.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::RetryConfig;

/// Callback invoked after every failed attempt with the error and the
/// 1-based attempt number
pub type ErrorCallback<E> = Arc<dyn Fn(&E, u32) + Send + Sync>;

/// Error returned once every attempt has failed
#[derive(Debug, Error)]
pub enum RetryError<E> {
    #[error("operation failed after {attempts} attempts: {source}")]
    ExhaustedRetries {
        attempts: u32,
        #[source]
        source: E,
    },
}

impl<E> RetryError<E> {
    /// Number of attempts that were made
    pub fn attempts(&self) -> u32 {
        match self {
            Self::ExhaustedRetries { attempts, .. } => *attempts,
        }
    }

    /// The error of the final attempt
    pub fn into_source(self) -> E {
        match self {
            Self::ExhaustedRetries { source, .. } => source,
        }
    }
}

/// Retry configuration for a single executor
pub struct RetryOptions<E> {
    /// Maximum number of attempts (values below 1 are treated as 1)
    pub max_attempts: u32,
    /// Delay before the second attempt
    pub base_delay: Duration,
    /// Double the delay after every failed attempt
    pub use_backoff: bool,
    /// Optional per-failure callback
    pub on_error: Option<ErrorCallback<E>>,
}

impl<E> RetryOptions<E> {
    pub fn new() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(1000),
            use_backoff: true,
            on_error: None,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    pub fn with_backoff(mut self, use_backoff: bool) -> Self {
        self.use_backoff = use_backoff;
        self
    }

    pub fn with_on_error<F>(mut self, callback: F) -> Self
    where
        F: Fn(&E, u32) + Send + Sync + 'static,
    {
        self.on_error = Some(Arc::new(callback));
        self
    }

    /// Delay to wait after the given failed attempt
    pub fn delay_after(&self, attempt: u32) -> Duration {
        if !self.use_backoff {
            return self.base_delay;
        }
        let factor = 1u32
            .checked_shl(attempt.saturating_sub(1))
            .unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor)
    }
}

impl<E> Default for RetryOptions<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> Clone for RetryOptions<E> {
    fn clone(&self) -> Self {
        Self {
            max_attempts: self.max_attempts,
            base_delay: self.base_delay,
            use_backoff: self.use_backoff,
            on_error: self.on_error.clone(),
        }
    }
}

impl<E> fmt::Debug for RetryOptions<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryOptions")
            .field("max_attempts", &self.max_attempts)
            .field("base_delay", &self.base_delay)
            .field("use_backoff", &self.use_backoff)
            .field("on_error", &self.on_error.is_some())
            .finish()
    }
}

impl<E> From<&RetryConfig> for RetryOptions<E> {
    fn from(config: &RetryConfig) -> Self {
        Self::new()
            .with_max_attempts(config.max_attempts)
            .with_base_delay(Duration::from_millis(config.base_delay_ms))
            .with_backoff(config.use_backoff)
    }
}

/// Runs operations with bounded attempts and exposes progress for UI feedback
pub struct RetryExecutor<E> {
    options: RetryOptions<E>,
    attempts: AtomicU32,
    retrying: AtomicBool,
}

impl<E: fmt::Display> RetryExecutor<E> {
    pub fn new(options: RetryOptions<E>) -> Self {
        Self {
            options,
            attempts: AtomicU32::new(0),
            retrying: AtomicBool::new(false),
        }
    }

    pub fn options(&self) -> &RetryOptions<E> {
        &self.options
    }

    /// Attempt number currently in progress (0 when idle)
    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Whether a run is in progress
    pub fn is_retrying(&self) -> bool {
        self.retrying.load(Ordering::SeqCst)
    }

    /// Force the observable state back to idle
    pub fn reset(&self) {
        self.attempts.store(0, Ordering::SeqCst);
        self.retrying.store(false, Ordering::SeqCst);
    }

    /// Run `operation` until it succeeds or the attempt budget is spent
    pub async fn run<T, F, Fut>(&self, mut operation: F) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let max_attempts = self.options.max_attempts.max(1);
        self.retrying.store(true, Ordering::SeqCst);

        let mut attempt = 0;
        loop {
            attempt += 1;
            self.attempts.store(attempt, Ordering::SeqCst);

            match operation().await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!("Operation succeeded on attempt {}/{}", attempt, max_attempts);
                    }
                    self.reset();
                    return Ok(value);
                }
                Err(err) => {
                    warn!(
                        attempt = attempt,
                        max_attempts = max_attempts,
                        error = %err,
                        "Operation attempt failed"
                    );

                    if let Some(callback) = &self.options.on_error {
                        callback(&err, attempt);
                    }

                    if attempt >= max_attempts {
                        self.reset();
                        return Err(RetryError::ExhaustedRetries {
                            attempts: attempt,
                            source: err,
                        });
                    }

                    let delay = self.options.delay_after(attempt);
                    debug!("Retrying in {:?}", delay);
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

impl<E: fmt::Display> Default for RetryExecutor<E> {
    fn default() -> Self {
        Self::new(RetryOptions::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use tokio::time::Instant;

    #[derive(Debug, PartialEq)]
    struct Flaky(u32);

    impl fmt::Display for Flaky {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "flaky failure #{}", self.0)
        }
    }

    #[test]
    fn test_default_options() {
        let options: RetryOptions<Flaky> = RetryOptions::default();
        assert_eq!(options.max_attempts, 3);
        assert_eq!(options.base_delay, Duration::from_millis(1000));
        assert!(options.use_backoff);
        assert!(options.on_error.is_none());
    }

    #[test]
    fn test_backoff_delays_double() {
        let options: RetryOptions<Flaky> = RetryOptions::new();
        assert_eq!(options.delay_after(1), Duration::from_millis(1000));
        assert_eq!(options.delay_after(2), Duration::from_millis(2000));
        assert_eq!(options.delay_after(3), Duration::from_millis(4000));
    }

    #[test]
    fn test_flat_delay_without_backoff() {
        let options: RetryOptions<Flaky> = RetryOptions::new().with_backoff(false);
        assert_eq!(options.delay_after(1), Duration::from_millis(1000));
        assert_eq!(options.delay_after(5), Duration::from_millis(1000));
    }

    #[test]
    fn test_huge_attempt_saturates() {
        let options: RetryOptions<Flaky> = RetryOptions::new();
        assert_eq!(options.delay_after(64), Duration::from_millis(1000) * u32::MAX);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_retries_with_backoff() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();
        let executor = RetryExecutor::new(
            RetryOptions::new()
                .with_max_attempts(3)
                .with_on_error(move |_: &Flaky, _| {
                    seen.fetch_add(1, Ordering::SeqCst);
                }),
        );

        let started = Instant::now();
        let result: Result<(), _> = executor.run(|| async { Err(Flaky(1)) }).await;

        let err = result.unwrap_err();
        assert!(matches!(err, RetryError::ExhaustedRetries { attempts: 3, .. }));
        assert_eq!(err.into_source(), Flaky(1));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(started.elapsed() >= Duration::from_millis(3000));
        assert!(!executor.is_retrying());
        assert_eq!(executor.attempts(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_on_last_attempt() {
        let executor: RetryExecutor<Flaky> =
            RetryExecutor::new(RetryOptions::new().with_max_attempts(3));
        let counter = AtomicU32::new(0);

        let value = executor
            .run(|| {
                let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                async move { if n < 3 { Err(Flaky(n)) } else { Ok("done") } }
            })
            .await
            .unwrap();

        assert_eq!(value, "done");
        assert_eq!(counter.load(Ordering::SeqCst), 3);
        assert!(!executor.is_retrying());
        assert_eq!(executor.attempts(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_attempt_numbers_passed_to_callback() {
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let sink = seen.clone();
        let executor = RetryExecutor::new(
            RetryOptions::new()
                .with_max_attempts(4)
                .with_backoff(false)
                .with_base_delay(Duration::from_millis(10))
                .with_on_error(move |err: &Flaky, attempt| sink.lock().push((err.0, attempt))),
        );

        let counter = AtomicU32::new(0);
        let _ = executor
            .run(|| {
                let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                async move { Err::<(), _>(Flaky(n)) }
            })
            .await;

        assert_eq!(*seen.lock(), vec![(1, 1), (2, 2), (3, 3), (4, 4)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_state_visible_during_run() {
        let executor: RetryExecutor<Flaky> = RetryExecutor::new(RetryOptions::new());

        let exec = &executor;
        let observed = executor
            .run(|| async move { Ok::<_, Flaky>((exec.is_retrying(), exec.attempts())) })
            .await
            .unwrap();

        assert_eq!(observed, (true, 1));
        assert!(!executor.is_retrying());
    }

    #[tokio::test]
    async fn test_zero_attempts_runs_once() {
        let executor: RetryExecutor<Flaky> =
            RetryExecutor::new(RetryOptions::new().with_max_attempts(0));
        let counter = AtomicU32::new(0);

        let err = executor
            .run(|| {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(Flaky(0)) }
            })
            .await
            .unwrap_err();

        assert_eq!(err.attempts(), 1);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_force_reset() {
        let executor: RetryExecutor<Flaky> = RetryExecutor::default();
        executor.attempts.store(2, Ordering::SeqCst);
        executor.retrying.store(true, Ordering::SeqCst);
        executor.reset();
        assert_eq!(executor.attempts(), 0);
        assert!(!executor.is_retrying());
    }
}
