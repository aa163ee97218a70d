//! Exponential backoff around a fallible async attempt.
//!
//! The attempt signals "transient, retry me" by returning
//! [`Attempt::Retry`] and "fatal, stop now" by returning `Err` directly;
//! the two channels are intentionally separate so the generic error path
//! stays reserved for non-retryable faults.
//!
//! Delays double starting from the base: with a 10ms base the waits are
//! 10, 20, 40, … There is no delay before the first attempt. When the
//! accumulated retryable-error count reaches `max_retries`, every error is
//! bundled into [`FetchError::RetriesExhausted`] in attempt order.
//! `max_retries = 0` fails after exactly one attempt.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::error::FetchError;

/// Outcome of a single backoff attempt.
#[derive(Debug)]
pub enum Attempt<T> {
    /// The attempt succeeded; the retry loop returns this value.
    Success(T),
    /// Transient failure; the loop records the error and retries after a
    /// delay (or fails with the accumulated errors once the budget is
    /// spent).
    Retry(FetchError),
}

/// Retry-with-backoff driver for a single logical operation.
///
/// Each [`run`](Backoff::run) invocation is independent; there is no
/// shared retry budget across calls.
#[derive(Debug, Clone)]
pub struct Backoff {
    base_delay: Duration,
    max_retries: u32,
    cancel: Option<CancellationToken>,
}

impl Backoff {
    /// Creates a backoff driver with the given base delay and retry budget.
    #[must_use]
    pub fn new(base_delay: Duration, max_retries: u32) -> Self {
        Self {
            base_delay,
            max_retries,
            cancel: None,
        }
    }

    /// Attaches a cancellation token observed before every attempt and
    /// during every backoff delay.
    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Runs the attempt until success, a fatal error, cancellation, or an
    /// exhausted retry budget.
    ///
    /// # Errors
    ///
    /// - [`FetchError::Cancelled`] if the token is already cancelled when
    ///   `run` starts (the attempt is never invoked) or fires during a
    ///   backoff delay.
    /// - [`FetchError::RetriesExhausted`] once `max_retries` retryable
    ///   errors have accumulated.
    /// - Any error returned directly by the attempt, unchanged.
    pub async fn run<T, F, Fut>(&self, mut attempt: F) -> Result<T, FetchError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Attempt<T>, FetchError>>,
    {
        let mut errors: Vec<FetchError> = Vec::new();

        loop {
            if let Some(cancel) = &self.cancel {
                if cancel.is_cancelled() {
                    return Err(FetchError::Cancelled);
                }
            }

            match attempt().await? {
                Attempt::Success(value) => return Ok(value),
                Attempt::Retry(error) => {
                    debug!(attempt = errors.len() + 1, error = %error, "retryable failure");
                    errors.push(error);
                    let failures = u64::try_from(errors.len()).unwrap_or(u64::MAX);
                    if failures >= u64::from(self.max_retries) {
                        return Err(FetchError::retries_exhausted(errors));
                    }
                    let exponent = u32::try_from(errors.len() - 1).unwrap_or(u32::MAX);
                    let delay = self
                        .base_delay
                        .saturating_mul(2u32.saturating_pow(exponent));
                    self.sleep(delay).await?;
                }
            }
        }
    }

    /// Sleeps for `delay`, racing the cancellation token when present.
    async fn sleep(&self, delay: Duration) -> Result<(), FetchError> {
        match &self.cancel {
            Some(cancel) => tokio::select! {
                () = cancel.cancelled() => Err(FetchError::Cancelled),
                () = tokio::time::sleep(delay) => Ok(()),
            },
            None => {
                tokio::time::sleep(delay).await;
                Ok(())
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    fn always_retry(
        calls: &Arc<AtomicU32>,
    ) -> impl FnMut() -> std::future::Ready<Result<Attempt<u32>, FetchError>> {
        let calls = Arc::clone(calls);
        move || {
            calls.fetch_add(1, Ordering::SeqCst);
            std::future::ready(Ok(Attempt::Retry(FetchError::service_unavailable(
                "https://example.com",
            ))))
        }
    }

    #[tokio::test]
    async fn test_success_short_circuit_invokes_once() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let backoff = Backoff::new(Duration::from_millis(100), 3);

        let result = backoff
            .run(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                std::future::ready(Ok(Attempt::Success(42u32)))
            })
            .await
            .unwrap();

        assert_eq!(result, 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_always_failing_invokes_max_retries_times() {
        let calls = Arc::new(AtomicU32::new(0));
        let backoff = Backoff::new(Duration::from_millis(100), 3);

        let result = backoff.run(always_retry(&calls)).await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        match result {
            Err(FetchError::RetriesExhausted { errors }) => assert_eq!(errors.len(), 3),
            other => panic!("expected RetriesExhausted, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_max_retries_zero_fails_after_one_attempt() {
        let calls = Arc::new(AtomicU32::new(0));
        let backoff = Backoff::new(Duration::from_millis(100), 0);

        let result = backoff.run(always_retry(&calls)).await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(result, Err(FetchError::RetriesExhausted { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_delay_sequence_doubles_from_base() {
        let calls = Arc::new(AtomicU32::new(0));
        let backoff = Backoff::new(Duration::from_millis(10), 4);
        let start = tokio::time::Instant::now();

        let _ = backoff.run(always_retry(&calls)).await;

        // Three delays before the fourth (final) attempt: 10 + 20 + 40.
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(start.elapsed(), Duration::from_millis(70));
    }

    #[tokio::test(start_paused = true)]
    async fn test_eventual_success_after_retries() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let backoff = Backoff::new(Duration::from_millis(100), 5);

        let result = backoff
            .run(move || {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                if n < 2 {
                    std::future::ready(Ok(Attempt::Retry(FetchError::service_unavailable("u"))))
                } else {
                    std::future::ready(Ok(Attempt::Success("done")))
                }
            })
            .await
            .unwrap();

        assert_eq!(result, "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_fatal_error_propagates_without_retry() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let backoff = Backoff::new(Duration::from_millis(100), 5);

        let result: Result<u32, FetchError> = backoff
            .run(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                std::future::ready(Err(FetchError::http_status("https://example.com", 404)))
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(result, Err(FetchError::HttpStatus { status: 404, .. })));
    }

    #[tokio::test]
    async fn test_pre_cancelled_token_skips_attempt() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let calls = Arc::new(AtomicU32::new(0));
        let backoff = Backoff::new(Duration::from_millis(100), 3).with_cancellation(cancel);

        let result = backoff.run(always_retry(&calls)).await;

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(matches!(result, Err(FetchError::Cancelled)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_backoff_delay_fails_with_cancellation() {
        let cancel = CancellationToken::new();
        let calls = Arc::new(AtomicU32::new(0));
        let backoff =
            Backoff::new(Duration::from_secs(60), 10).with_cancellation(cancel.clone());

        let counter = Arc::clone(&calls);
        let run = tokio::spawn(async move {
            backoff
                .run(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                    std::future::ready(Ok(Attempt::Retry(FetchError::service_unavailable("u"))))
                })
                .await
        });

        // Let the first attempt fail and the delay begin, then cancel.
        tokio::time::sleep(Duration::from_millis(1)).await;
        cancel.cancel();
        let result: Result<u32, FetchError> = run.await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(result, Err(FetchError::Cancelled)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_checked_at_top_of_each_iteration() {
        let cancel = CancellationToken::new();
        let calls = Arc::new(AtomicU32::new(0));
        let backoff =
            Backoff::new(Duration::from_millis(1), 10).with_cancellation(cancel.clone());

        let counter = Arc::clone(&calls);
        let token = cancel.clone();
        let result: Result<u32, FetchError> = backoff
            .run(move || {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                if n == 1 {
                    token.cancel();
                }
                std::future::ready(Ok(Attempt::Retry(FetchError::service_unavailable("u"))))
            })
            .await;

        // Cancelled during the second attempt; the loop notices before a third.
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(matches!(result, Err(FetchError::Cancelled)));
    }
}
