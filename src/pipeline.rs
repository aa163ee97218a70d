//! Download orchestration.
//!
//! Per gallery the flow is: fetch metadata and tasks, apply the video
//! filter, expand the destination template, apply the conflict policy,
//! then open a write session that streams every asset through the shared
//! request pipeline. Galleries run strictly sequentially (the concurrent
//! unit is the asset, bounded globally by the pipeline's limiter) and a
//! gallery is checkpointed only after its session fully commits, so a
//! partially written gallery is never skipped on the next run.

use std::path::PathBuf;

use serde::Deserialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::checkpoint::{self, CheckpointError, CheckpointWriter};
use crate::comic_info::{self, ComicInfoError};
use crate::hitomi::{HitomiClient, HitomiError, SearchQuery, TaskKind};
use crate::fetch::SafeRequest;
use crate::idset;
use crate::output::{OutputDescriptor, SinkError};
use crate::progress::Progress;
use crate::template;

/// Behavior when a gallery's destination already exists.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum IfExists {
    /// Abort the whole run with a fatal error.
    #[default]
    Error,
    /// Log and move on to the next gallery.
    Skip,
    /// Remove the existing destination, then proceed.
    Overwrite,
}

/// How gallery-level failures are handled.
///
/// One-shot runs abort on the first failure; scheduled runs log and keep
/// going, since unattended throughput beats fail-fast there.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureMode {
    /// Fail the run on the first gallery-level error.
    Abort,
    /// Log gallery-level errors and continue with the next ID.
    Continue,
}

/// Options for one download run.
#[derive(Debug, Clone)]
pub struct DownloadOptions {
    /// Destination path template (gallery-level tokens).
    pub output: String,
    /// Per-asset filename template (file-level tokens).
    pub filename: String,
    /// Write the raw metadata sidecar (`galleries.json`).
    pub metadata: bool,
    /// Write the `ComicInfo.xml` sidecar.
    pub comic_info: bool,
    /// Drop video tasks before downloading.
    pub video_skip: bool,
    /// Conflict policy for existing destinations.
    pub if_exists: IfExists,
    /// Checkpoint log path; `None` disables checkpointing.
    pub checkpoint: Option<PathBuf>,
}

impl Default for DownloadOptions {
    fn default() -> Self {
        Self {
            output: "output/{id}".to_string(),
            filename: "{no}{ext}".to_string(),
            metadata: false,
            comic_info: true,
            video_skip: true,
            if_exists: IfExists::Error,
            checkpoint: None,
        }
    }
}

/// Counters for one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunStats {
    /// Galleries fully committed.
    pub completed: usize,
    /// Galleries skipped via the checkpoint log.
    pub skipped_checkpoint: usize,
    /// Galleries skipped by the `skip` conflict policy.
    pub skipped_existing: usize,
    /// Galleries that failed (only non-zero under [`FailureMode::Continue`]).
    pub failed: usize,
}

/// Errors from the orchestrator.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Destination exists under the `error` conflict policy.
    #[error("destination already exists: {path}")]
    AlreadyExists {
        /// The conflicting path.
        path: PathBuf,
    },

    /// Resolution or gallery fetch failed.
    #[error(transparent)]
    Hitomi(#[from] HitomiError),

    /// A write session failed.
    #[error(transparent)]
    Sink(#[from] SinkError),

    /// Checkpoint log failure.
    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),

    /// Sidecar generation failed.
    #[error("failed to generate ComicInfo.xml: {0}")]
    ComicInfo(#[from] ComicInfoError),

    /// Raw metadata sidecar serialization failed.
    #[error("failed to serialize gallery metadata: {0}")]
    Metadata(#[from] serde_json::Error),
}

enum GalleryOutcome {
    Committed,
    SkippedExisting,
}

/// The top-level download orchestrator.
#[derive(Debug, Clone)]
pub struct Pipeline {
    client: HitomiClient,
    safe: SafeRequest,
}

impl Pipeline {
    /// Creates an orchestrator over a site client and a shared request
    /// pipeline.
    #[must_use]
    pub fn new(client: HitomiClient, safe: SafeRequest) -> Self {
        Self { client, safe }
    }

    /// Resolves raw input into gallery IDs.
    ///
    /// # Errors
    ///
    /// See [`HitomiClient::resolve`].
    pub async fn resolve(&self, input: &str) -> Result<Vec<u32>, PipelineError> {
        Ok(self.client.resolve(input, &self.safe).await?)
    }

    /// Resolves a structured search query into gallery IDs.
    ///
    /// # Errors
    ///
    /// See [`HitomiClient::search`].
    pub async fn search(&self, query: &SearchQuery) -> Result<Vec<u32>, PipelineError> {
        Ok(self.client.search(query, &self.safe).await?)
    }

    /// Downloads every resolved gallery not already checkpointed.
    ///
    /// # Errors
    ///
    /// Under [`FailureMode::Abort`], the first gallery-level failure ends
    /// the run. Checkpoint IO failures are always fatal; losing the
    /// resume log silently would redownload everything next run.
    pub async fn run(
        &self,
        resolved: &[u32],
        options: &DownloadOptions,
        mode: FailureMode,
        progress: &Progress,
    ) -> Result<RunStats, PipelineError> {
        let checkpoint_ids = checkpoint::load(options.checkpoint.as_deref()).await?;
        let resolved_set = idset::difference(&[resolved.to_vec()]);
        let ids = idset::difference(&[resolved_set.clone(), checkpoint_ids.clone()]);

        let mut stats = RunStats::default();
        if !checkpoint_ids.is_empty() {
            stats.skipped_checkpoint = resolved_set.len() - ids.len();
            info!(
                "Skipping {} already downloaded galleries via checkpoint",
                stats.skipped_checkpoint
            );
        }

        let mut checkpoint_writer = match &options.checkpoint {
            Some(path) => Some(CheckpointWriter::append(path).await?),
            None => None,
        };

        let overall = progress.overall(ids.len());
        for id in ids {
            let outcome = self
                .download_gallery(id, options, checkpoint_writer.as_mut(), progress)
                .await;
            match outcome {
                Ok(GalleryOutcome::Committed) => stats.completed += 1,
                Ok(GalleryOutcome::SkippedExisting) => stats.skipped_existing += 1,
                Err(error) => match mode {
                    FailureMode::Abort => return Err(error),
                    FailureMode::Continue => {
                        warn!(id, error = %error, "gallery failed; continuing");
                        stats.failed += 1;
                    }
                },
            }
            overall.inc(1);
        }
        overall.finish_and_clear();

        Ok(stats)
    }

    async fn download_gallery(
        &self,
        id: u32,
        options: &DownloadOptions,
        checkpoint: Option<&mut CheckpointWriter>,
        progress: &Progress,
    ) -> Result<GalleryOutcome, PipelineError> {
        let (record, all_tasks) = self.client.fetch_gallery(id).await?;
        let tasks: Vec<_> = if options.video_skip {
            all_tasks
                .into_iter()
                .filter(|task| task.kind != TaskKind::Video)
                .collect()
        } else {
            all_tasks
        };

        let pathname = template::fill_gallery_placeholders(&options.output, &record.info);
        let descriptor = OutputDescriptor::open(&pathname);

        if descriptor.exists() {
            match options.if_exists {
                IfExists::Error => {
                    return Err(PipelineError::AlreadyExists {
                        path: descriptor.path().to_path_buf(),
                    });
                }
                IfExists::Skip => {
                    warn!(path = %pathname, "skipping existing destination");
                    return Ok(GalleryOutcome::SkippedExisting);
                }
                IfExists::Overwrite => {
                    warn!(path = %pathname, "overwriting existing destination");
                    descriptor.remove().await?;
                }
            }
        }

        // Sidecars are rendered up front so template and serialization
        // problems fail the gallery before anything touches disk.
        let metadata_json = if options.metadata {
            Some(serde_json::to_string_pretty(&record.raw)?)
        } else {
            None
        };
        let comic_info_xml = if options.comic_info {
            Some(comic_info::from_gallery(&record.info).to_xml()?)
        } else {
            None
        };

        let bar = progress.gallery(record.info.display_title(), tasks.len());
        let safe = &self.safe;
        let filename_template = options.filename.as_str();
        let total = tasks.len();

        descriptor
            .create(|session| {
                let bar = bar.clone();
                async move {
                    if let Some(json) = metadata_json {
                        session.write_text("galleries.json", json);
                    }
                    if let Some(xml) = comic_info_xml {
                        session.write_text("ComicInfo.xml", xml);
                    }

                    let downloads = tasks.iter().enumerate().map(|(index, task)| {
                        let session = session.clone();
                        let bar = bar.clone();
                        async move {
                            let name = template::fill_filename_placeholders(
                                filename_template,
                                index,
                                total,
                                &task.file,
                            );
                            match safe.send(|| task.fetch()).await {
                                Ok(response) => session.write_stream(&name, response),
                                Err(error) => {
                                    session.record_failure(SinkError::asset(&name, error));
                                }
                            }
                            bar.inc(1);
                        }
                    });
                    futures_util::future::join_all(downloads).await;
                }
            })
            .await?;
        bar.finish_and_clear();

        if let Some(writer) = checkpoint {
            writer.line(id).await?;
        }
        info!(id, path = %pathname, assets = total, "gallery committed");
        Ok(GalleryOutcome::Committed)
    }
}
