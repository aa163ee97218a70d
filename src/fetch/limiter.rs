//! Fixed-width concurrency cap for in-flight requests.
//!
//! One [`Limiter`] instance is shared across an entire run so the cap
//! bounds load on the remote host regardless of how many galleries or
//! assets are queued. Excess submissions queue in FIFO order and run as
//! permits free up (RAII release).

use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;

use super::error::FetchError;

/// Caps the number of concurrently executing tasks at a fixed width.
///
/// Cloning shares the underlying permit pool.
#[derive(Debug, Clone)]
pub struct Limiter {
    semaphore: Arc<Semaphore>,
    width: usize,
}

impl Limiter {
    /// Creates a limiter admitting at most `width` concurrent tasks.
    /// A zero width is clamped to one.
    #[must_use]
    pub fn new(width: usize) -> Self {
        let width = width.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(width)),
            width,
        }
    }

    /// Returns the configured width.
    #[must_use]
    pub fn width(&self) -> usize {
        self.width
    }

    /// Runs `task` once a permit is available, holding the permit until it
    /// completes.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::LimiterClosed`] if the permit pool was closed,
    /// plus whatever the task itself returns.
    pub async fn run<T, Fut>(&self, task: Fut) -> Result<T, FetchError>
    where
        Fut: Future<Output = Result<T, FetchError>>,
    {
        let _permit = Arc::clone(&self.semaphore)
            .acquire_owned()
            .await
            .map_err(|_| FetchError::LimiterClosed)?;
        task.await
    }
}
