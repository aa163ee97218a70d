//! One-shot download command.

use anyhow::bail;
use tracing::info;

use crate::cli::DownloadArgs;
use crate::environment::Environment;
use crate::fetch::SafeRequest;
use crate::hitomi::{Endpoints, HitomiClient};
use crate::pipeline::{DownloadOptions, FailureMode, Pipeline};
use crate::progress::Progress;

use super::build_http_client;

/// Resolves the input and downloads every matching gallery, aborting on
/// the first gallery-level failure.
///
/// # Errors
///
/// Any resolution, conflict, or download failure terminates the command
/// with a non-zero exit.
pub async fn run_download_command(args: DownloadArgs, env: &Environment) -> anyhow::Result<()> {
    let http = build_http_client(env)?;
    let client = HitomiClient::new(http, Endpoints::default());
    let pipeline = Pipeline::new(client, SafeRequest::new());
    let progress = Progress::new(args.quiet);

    let resolved = pipeline.resolve(&args.input).await?;
    if resolved.is_empty() {
        bail!("no galleries matched input {:?}", args.input);
    }
    info!(galleries = resolved.len(), "input resolved");

    let options = DownloadOptions {
        output: args.output,
        filename: args.filename,
        metadata: args.metadata,
        comic_info: args.comic_info,
        video_skip: args.video_skip,
        if_exists: args.if_exists,
        checkpoint: args.checkpoint,
    };

    let stats = pipeline
        .run(&resolved, &options, FailureMode::Abort, &progress)
        .await?;

    info!(
        completed = stats.completed,
        skipped_checkpoint = stats.skipped_checkpoint,
        skipped_existing = stats.skipped_existing,
        "download complete"
    );
    Ok(())
}
