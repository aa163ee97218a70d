//! Container liveness probe.
//!
//! Exits 0 when both the heartbeat and last-success timestamp files are
//! fresh enough, 1 otherwise (including when either path is unset). Meant
//! to be wired as the container runtime's healthcheck command alongside
//! the `schedule` subcommand.

use std::path::PathBuf;
use std::process::ExitCode;

use hitomi_dl::health::{MAX_HEARTBEAT_AGE, MAX_SUCCESS_AGE, probe};

fn main() -> ExitCode {
    let heartbeat = std::env::var("HEARTBEAT_PATH").ok().map(PathBuf::from);
    let last_success = std::env::var("LAST_SUCCESS_PATH").ok().map(PathBuf::from);

    let healthy = match (heartbeat, last_success) {
        (Some(heartbeat), Some(last_success)) => {
            probe(&heartbeat, MAX_HEARTBEAT_AGE) && probe(&last_success, MAX_SUCCESS_AGE)
        }
        _ => false,
    };

    if healthy {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
