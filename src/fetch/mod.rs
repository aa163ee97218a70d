//! Request pipeline: concurrency cap, exponential backoff, status triage.
//!
//! The pieces compose bottom-up: [`Limiter`] bounds in-flight requests,
//! [`Backoff`] retries an attempt that reports transient failures as
//! [`Attempt::Retry`] values, and [`SafeRequest`] wires both around a
//! single HTTP attempt with the host-specific 503 classification.

mod backoff;
mod error;
mod limiter;
mod safe_request;

pub use backoff::{Attempt, Backoff};
pub use error::FetchError;
pub use limiter::Limiter;
pub use safe_request::{
    DEFAULT_BASE_DELAY, DEFAULT_MAX_RETRIES, DEFAULT_REQUEST_WIDTH, SafeRequest,
};
