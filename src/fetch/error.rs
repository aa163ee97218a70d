//! Error types for the request pipeline.
//!
//! The pipeline deliberately distinguishes "retry me" from "fail now": a
//! retryable condition travels as an [`Attempt::Retry`](super::Attempt)
//! value through the backoff loop, while everything in this enum that is
//! not [`FetchError::RetriesExhausted`] propagates immediately.

use thiserror::Error;

/// Errors that can occur while fetching a remote resource.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network-level error (DNS resolution, connection refused, TLS errors, etc.)
    #[error("network error requesting {url}: {source}")]
    Network {
        /// The URL that failed.
        url: String,
        /// The underlying transport error.
        #[source]
        source: reqwest::Error,
    },

    /// Non-success HTTP response other than 503 (bad URL, gone, auth walls).
    /// Never retried.
    #[error("HTTP {status} requesting {url}")]
    HttpStatus {
        /// The URL that returned the status.
        url: String,
        /// The HTTP status code.
        status: u16,
    },

    /// HTTP 503 from the remote host. The host uses it for rate limiting,
    /// so this is the one status worth backing off and retrying.
    #[error("service unavailable (503) at {url}")]
    ServiceUnavailable {
        /// The URL that returned 503.
        url: String,
    },

    /// All retry attempts produced a retryable error.
    #[error("maximum retry attempts exceeded after {} errors", errors.len())]
    RetriesExhausted {
        /// Every accumulated retryable error, in attempt order.
        errors: Vec<FetchError>,
    },

    /// The operation was cancelled via its cancellation token.
    ///
    /// Distinguished from [`FetchError::RetriesExhausted`] so callers can
    /// tell "aborted by policy" from "failed after retries".
    #[error("request cancelled")]
    Cancelled,

    /// The concurrency limiter was closed while requests were queued.
    #[error("request limiter closed unexpectedly")]
    LimiterClosed,
}

impl FetchError {
    /// Creates a network error from a reqwest error.
    pub fn network(url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Network {
            url: url.into(),
            source,
        }
    }

    /// Creates a fatal HTTP status error.
    pub fn http_status(url: impl Into<String>, status: u16) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
        }
    }

    /// Creates a retryable 503 error.
    pub fn service_unavailable(url: impl Into<String>) -> Self {
        Self::ServiceUnavailable { url: url.into() }
    }

    /// Bundles accumulated retryable errors, preserving attempt order.
    #[must_use]
    pub fn retries_exhausted(errors: Vec<FetchError>) -> Self {
        Self::RetriesExhausted { errors }
    }

    /// Returns true for cancellation errors.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
