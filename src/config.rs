//! Schedule configuration file.
//!
//! A JSON document driving the `schedule` command: a cron cadence plus
//! the same knobs the `download` command takes on its command line. Field
//! names are camelCase to match the documented file format.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::Deserialize;
use thiserror::Error;

use crate::hitomi::SearchQuery;
use crate::pipeline::IfExists;

/// Errors from loading a schedule configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("cannot read config {path}: {source}")]
    Io {
        /// The config path.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The document is not valid JSON or does not match the schema.
    #[error("invalid config {path}: {message}")]
    Parse {
        /// The config path.
        path: PathBuf,
        /// The deserializer's issue description.
        message: String,
    },

    /// The document parsed but violates a semantic constraint.
    #[error("invalid config {path}: {message}")]
    Validation {
        /// The config path.
        path: PathBuf,
        /// What constraint failed.
        message: String,
    },
}

/// One input to resolve per scheduled tick.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum QueryEntry {
    /// A fixed gallery ID.
    Id {
        /// The gallery ID.
        id: u32,
    },
    /// A site URL resolved like command-line input.
    Url {
        /// The URL.
        url: String,
    },
    /// A structured search query.
    Query {
        /// The query terms.
        query: SearchQuery,
    },
}

/// Parsed schedule configuration with documented defaults applied.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ScheduleConfig {
    /// Cron expression for the run cadence. Required.
    pub cron: String,
    /// Run one tick immediately at startup.
    pub run_on_init: bool,
    /// Inputs resolved each tick. At least one required.
    pub queries: Vec<QueryEntry>,
    /// Skip video assets.
    pub video_skip: bool,
    /// Output path template.
    pub output: String,
    /// Per-asset filename template.
    pub filename: String,
    /// Write the raw metadata sidecar.
    pub metadata: bool,
    /// Write the ComicInfo.xml sidecar.
    pub comic_info: bool,
    /// Conflict policy for existing destinations.
    pub if_exists: IfExists,
    /// Checkpoint log path.
    pub checkpoint: Option<PathBuf>,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            cron: String::new(),
            run_on_init: false,
            queries: Vec::new(),
            video_skip: true,
            output: "output/{id}".to_string(),
            filename: "{no}{ext}".to_string(),
            metadata: false,
            comic_info: true,
            if_exists: IfExists::Error,
            checkpoint: None,
        }
    }
}

impl ScheduleConfig {
    /// Loads and validates a configuration file.
    ///
    /// # Errors
    ///
    /// Any shape or constraint violation is fatal: an unattended scheduler
    /// must not start with a half-understood config.
    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| ConfigError::Io {
                path: path.to_path_buf(),
                source: e,
            })?;
        let config: Self =
            serde_json::from_str(&contents).map_err(|e| ConfigError::Parse {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;
        config.validate(path)?;
        Ok(config)
    }

    fn validate(&self, path: &Path) -> Result<(), ConfigError> {
        if self.cron.trim().is_empty() {
            return Err(ConfigError::Validation {
                path: path.to_path_buf(),
                message: "cron expression is required".to_string(),
            });
        }
        if self.queries.is_empty() {
            return Err(ConfigError::Validation {
                path: path.to_path_buf(),
                message: "at least one query is required".to_string(),
            });
        }
        cron::Schedule::from_str(&self.normalized_cron()).map_err(|e| {
            ConfigError::Validation {
                path: path.to_path_buf(),
                message: format!("invalid cron expression {:?}: {e}", self.cron),
            }
        })?;
        Ok(())
    }

    /// The cron expression in the parser's 6/7-field form: conventional
    /// 5-field expressions get a seconds field of `0` prepended.
    #[must_use]
    pub fn normalized_cron(&self) -> String {
        let trimmed = self.cron.trim();
        if trimmed.split_whitespace().count() == 5 {
            format!("0 {trimmed}")
        } else {
            trimmed.to_string()
        }
    }
}
