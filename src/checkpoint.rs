//! Append-only log of fully downloaded gallery IDs.
//!
//! One decimal ID per line. The log is read at startup and subtracted
//! from the resolved ID list, making reruns resumable; it grows by one
//! appended line per committed gallery and is never rewritten or
//! compacted. Blank and unparseable lines are dropped at load time rather
//! than leaking junk entries into the resume set.

use std::path::{Path, PathBuf};

use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::debug;

/// Errors from checkpoint log operations.
#[derive(Debug, Error)]
pub enum CheckpointError {
    /// Filesystem error reading or appending the log.
    #[error("checkpoint IO error at {path}: {source}")]
    Io {
        /// The log path.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },
}

impl CheckpointError {
    fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Loads the set of already-completed gallery IDs.
///
/// `None` and a missing file both yield an empty set (a fresh run).
///
/// # Errors
///
/// Returns [`CheckpointError::Io`] when an existing file cannot be read.
pub async fn load(path: Option<&Path>) -> Result<Vec<u32>, CheckpointError> {
    let Some(path) = path else {
        return Ok(Vec::new());
    };
    if !path.exists() {
        return Ok(Vec::new());
    }

    let contents = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| CheckpointError::io(path, e))?;
    let ids: Vec<u32> = contents
        .lines()
        .filter_map(|line| line.trim().parse::<u32>().ok())
        .collect();
    debug!(path = %path.display(), entries = ids.len(), "checkpoint loaded");
    Ok(ids)
}

/// Appending writer for the checkpoint log.
///
/// Each [`line`](CheckpointWriter::line) flushes before returning:
/// durability is worth more than batching here, since a crash mid-run must
/// not lose already-confirmed completions.
#[derive(Debug)]
pub struct CheckpointWriter {
    path: PathBuf,
    file: tokio::fs::File,
}

impl CheckpointWriter {
    /// Opens the log for appending, creating it (and parent directories)
    /// when missing.
    ///
    /// # Errors
    ///
    /// Returns [`CheckpointError::Io`] on open failure.
    pub async fn append(path: impl Into<PathBuf>) -> Result<Self, CheckpointError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| CheckpointError::io(&path, e))?;
            }
        }
        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| CheckpointError::io(&path, e))?;
        Ok(Self { path, file })
    }

    /// Appends one committed gallery ID and flushes.
    ///
    /// # Errors
    ///
    /// Returns [`CheckpointError::Io`] on write or flush failure.
    pub async fn line(&mut self, id: u32) -> Result<(), CheckpointError> {
        self.file
            .write_all(format!("{id}\n").as_bytes())
            .await
            .map_err(|e| CheckpointError::io(&self.path, e))?;
        self.file
            .flush()
            .await
            .map_err(|e| CheckpointError::io(&self.path, e))
    }
}
