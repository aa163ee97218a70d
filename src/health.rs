//! Liveness timestamps for external health probes.
//!
//! Two files, each holding a newline-terminated Unix timestamp in
//! seconds: a heartbeat refreshed on an interval while the scheduler is
//! alive, and a last-success marker written after each completed tick.
//! The `healthcheck` binary compares both against their maximum ages.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::task::JoinHandle;
use tracing::warn;

/// Heartbeat refresh interval.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(60);

/// Maximum heartbeat age before the probe reports unhealthy.
pub const MAX_HEARTBEAT_AGE: Duration = Duration::from_secs(120);

/// Maximum last-success age before the probe reports unhealthy.
pub const MAX_SUCCESS_AGE: Duration = Duration::from_secs(300);

/// Current Unix time in whole seconds.
#[must_use]
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

/// Writes the current timestamp to `path`, creating parent directories.
///
/// # Errors
///
/// Returns the underlying IO error.
pub async fn write_timestamp(path: &Path) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }
    tokio::fs::write(path, format!("{}\n", unix_now())).await
}

/// Spawns the heartbeat task: refreshes `path` immediately and then on
/// every interval tick until the handle is aborted. Write failures are
/// logged, not fatal: a failing probe file must not take the scheduler
/// down with it.
#[must_use]
pub fn spawn_heartbeat(path: PathBuf) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(HEARTBEAT_INTERVAL);
        loop {
            interval.tick().await;
            if let Err(e) = write_timestamp(&path).await {
                warn!(path = %path.display(), error = %e, "heartbeat write failed");
            }
        }
    })
}

/// Reads a timestamp file and checks it is no older than `max_age`.
/// Missing or unparseable files are unhealthy, not errors.
#[must_use]
pub fn probe(path: &Path, max_age: Duration) -> bool {
    let Ok(contents) = std::fs::read_to_string(path) else {
        return false;
    };
    let Ok(then) = contents.trim().parse::<f64>() else {
        return false;
    };
    #[allow(clippy::cast_precision_loss)]
    let age = unix_now() as f64 - then;
    age >= 0.0 && age <= max_age.as_secs_f64()
}
