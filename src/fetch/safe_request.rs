//! Rate-safe request pipeline: concurrency cap + backoff + status triage.
//!
//! Every request to the host runs through a shared [`Limiter`] and a fresh
//! [`Backoff`]. The status triage is deliberately narrow: the host answers
//! 503 when it is throttling, which is worth waiting out, while any other
//! non-success status almost always means a dead URL or an access problem
//! that a retry cannot fix.

use std::future::Future;
use std::time::Duration;

use reqwest::{Response, StatusCode};
use tokio_util::sync::CancellationToken;

use super::backoff::{Attempt, Backoff};
use super::error::FetchError;
use super::limiter::Limiter;

/// Width of the shared request limiter.
pub const DEFAULT_REQUEST_WIDTH: usize = 5;

/// Base delay for the retry backoff.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(500);

/// Retryable-error budget per request.
pub const DEFAULT_MAX_RETRIES: u32 = 10;

/// Composed request pipeline shared across one run.
///
/// Cloning shares the limiter (and with it the global in-flight cap);
/// each [`send`](SafeRequest::send) call gets its own independent backoff
/// state.
#[derive(Debug, Clone)]
pub struct SafeRequest {
    limiter: Limiter,
    base_delay: Duration,
    max_retries: u32,
    cancel: Option<CancellationToken>,
}

impl Default for SafeRequest {
    fn default() -> Self {
        Self::new()
    }
}

impl SafeRequest {
    /// Creates a pipeline with the default width/delay/retry parameters.
    #[must_use]
    pub fn new() -> Self {
        Self::with_limits(DEFAULT_REQUEST_WIDTH, DEFAULT_BASE_DELAY, DEFAULT_MAX_RETRIES)
    }

    /// Creates a pipeline with explicit parameters.
    #[must_use]
    pub fn with_limits(width: usize, base_delay: Duration, max_retries: u32) -> Self {
        Self {
            limiter: Limiter::new(width),
            base_delay,
            max_retries,
            cancel: None,
        }
    }

    /// Attaches an external cancellation token (e.g. scheduler shutdown)
    /// observed by every retry loop started from this pipeline.
    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Returns the shared limiter width.
    #[must_use]
    pub fn width(&self) -> usize {
        self.limiter.width()
    }

    /// Runs one HTTP attempt through the limiter and the backoff loop.
    ///
    /// The attempt is re-invoked on every retry, so it must be safe to call
    /// repeatedly. The limiter permit is held across the whole retry loop,
    /// delays included, keeping a struggling host's slot occupied rather
    /// than letting queued work pile onto it.
    ///
    /// # Errors
    ///
    /// - [`FetchError::HttpStatus`] for any non-2xx/206 status other than 503.
    /// - [`FetchError::RetriesExhausted`] after `max_retries` 503 responses.
    /// - [`FetchError::Cancelled`] when the attached token fires.
    /// - Transport errors from the attempt itself, unchanged.
    pub async fn send<F, Fut>(&self, mut attempt: F) -> Result<Response, FetchError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Response, FetchError>>,
    {
        let mut backoff = Backoff::new(self.base_delay, self.max_retries);
        if let Some(cancel) = &self.cancel {
            backoff = backoff.with_cancellation(cancel.clone());
        }

        self.limiter
            .run(backoff.run(move || {
                let response = attempt();
                async move { classify(response.await?) }
            }))
            .await
    }
}

/// Sorts a response into success / retryable / fatal.
fn classify(response: Response) -> Result<Attempt<Response>, FetchError> {
    let status = response.status();
    if status == StatusCode::SERVICE_UNAVAILABLE {
        return Ok(Attempt::Retry(FetchError::service_unavailable(
            response.url().as_str(),
        )));
    }
    if status.is_success() || status == StatusCode::PARTIAL_CONTENT {
        return Ok(Attempt::Success(response));
    }
    Err(FetchError::http_status(response.url().as_str(), status.as_u16()))
}
