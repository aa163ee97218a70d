//! CLI command handlers.

mod download;
mod regenerate;
mod schedule;

pub use download::run_download_command;
pub use regenerate::run_regenerate_command;
pub use schedule::run_schedule_command;

use std::time::Duration;

use crate::environment::Environment;
use crate::proxy;

/// Connect timeout for site requests.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Read timeout; generous because video assets can be large.
const READ_TIMEOUT: Duration = Duration::from_secs(300);

/// Builds the shared HTTP client, wiring in the environment's proxy when
/// one is configured.
pub(crate) fn build_http_client(env: &Environment) -> anyhow::Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .read_timeout(READ_TIMEOUT)
        .cookie_store(true);
    if let Some(proxy) = proxy::proxy_from_env(env)? {
        builder = builder.proxy(proxy);
    }
    Ok(builder.build()?)
}
