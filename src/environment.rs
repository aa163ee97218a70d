//! Process environment parsing.
//!
//! Everything the tool reads from the environment is collected here once
//! at startup: timezone, log settings, health-check paths, and proxy
//! URLs. Modules receive the parsed struct instead of poking at
//! `std::env` themselves.

use std::path::PathBuf;
use std::str::FromStr;

use chrono_tz::Tz;
use thiserror::Error;

/// Errors from environment parsing.
#[derive(Debug, Error)]
pub enum EnvError {
    /// `TZ` names an unknown timezone.
    #[error("invalid TZ value {value:?}")]
    InvalidTimezone {
        /// The offending value.
        value: String,
    },
}

/// Parsed process environment.
#[derive(Debug, Clone, Default)]
pub struct Environment {
    /// Timezone for cron fire-time computation (`TZ`).
    pub tz: Option<Tz>,
    /// Log filter default (`LOG_LEVEL`), overridden by `RUST_LOG`.
    pub log_level: Option<String>,
    /// ANSI colors in log output (`LOG_COLOR`, default on).
    pub log_color: bool,
    /// Heartbeat timestamp file (`HEARTBEAT_PATH`).
    pub heartbeat_path: Option<PathBuf>,
    /// Last-success timestamp file (`LAST_SUCCESS_PATH`).
    pub last_success_path: Option<PathBuf>,
    /// `ALL_PROXY`, preferred over the scheme-specific variables.
    pub all_proxy: Option<String>,
    /// `HTTPS_PROXY`.
    pub https_proxy: Option<String>,
    /// `HTTP_PROXY`.
    pub http_proxy: Option<String>,
}

impl Environment {
    /// Reads and validates the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`EnvError::InvalidTimezone`] for an unparseable `TZ`;
    /// invalid configuration is fatal, not silently defaulted.
    pub fn from_env() -> Result<Self, EnvError> {
        let tz = match std::env::var("TZ") {
            Ok(value) if !value.is_empty() => Some(
                Tz::from_str(&value).map_err(|_| EnvError::InvalidTimezone { value })?,
            ),
            _ => None,
        };

        Ok(Self {
            tz,
            log_level: std::env::var("LOG_LEVEL").ok().filter(|v| !v.is_empty()),
            log_color: std::env::var("LOG_COLOR")
                .map(|value| !matches!(value.to_ascii_lowercase().as_str(), "0" | "false" | "off"))
                .unwrap_or(true),
            heartbeat_path: std::env::var("HEARTBEAT_PATH").ok().map(PathBuf::from),
            last_success_path: std::env::var("LAST_SUCCESS_PATH").ok().map(PathBuf::from),
            all_proxy: std::env::var("ALL_PROXY").ok().filter(|v| !v.is_empty()),
            https_proxy: std::env::var("HTTPS_PROXY").ok().filter(|v| !v.is_empty()),
            http_proxy: std::env::var("HTTP_PROXY").ok().filter(|v| !v.is_empty()),
        })
    }

    /// Proxy candidates in precedence order.
    #[must_use]
    pub fn proxy_candidates(&self) -> Vec<&str> {
        [&self.all_proxy, &self.https_proxy, &self.http_proxy]
            .into_iter()
            .flatten()
            .map(String::as_str)
            .collect()
    }
}
