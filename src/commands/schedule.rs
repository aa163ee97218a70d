//! Cron-scheduled download command.
//!
//! Each tick re-resolves the configured queries and runs the same
//! pipeline as the one-shot command, but with per-gallery failures
//! caught and logged: an unattended job should keep draining the queue
//! rather than dying on the first bad gallery. The checkpoint log is the
//! recovery boundary: whatever a failed tick did commit is skipped on
//! the next one.

use std::str::FromStr;
use std::time::{Duration, Instant};

use chrono::Utc;
use chrono_tz::Tz;
use tracing::{error, info};

use crate::cli::ScheduleArgs;
use crate::config::{QueryEntry, ScheduleConfig};
use crate::environment::Environment;
use crate::fetch::SafeRequest;
use crate::health;
use crate::hitomi::{Endpoints, HitomiClient};
use crate::pipeline::{DownloadOptions, FailureMode, Pipeline, PipelineError};
use crate::progress::Progress;

use super::build_http_client;

/// Loads the config and either runs one tick (`--run-once`) or installs
/// the cron loop.
///
/// # Errors
///
/// Config problems and `--run-once` tick failures are fatal; in loop mode
/// only setup fails the command, tick failures are logged and the loop
/// continues.
pub async fn run_schedule_command(args: ScheduleArgs, env: &Environment) -> anyhow::Result<()> {
    let config = ScheduleConfig::load(&args.config).await?;
    let http = build_http_client(env)?;
    let client = HitomiClient::new(http, Endpoints::default());
    let pipeline = Pipeline::new(client, SafeRequest::new());

    let heartbeat = env
        .heartbeat_path
        .clone()
        .map(health::spawn_heartbeat);

    let options = DownloadOptions {
        output: config.output.clone(),
        filename: config.filename.clone(),
        metadata: config.metadata,
        comic_info: config.comic_info,
        video_skip: config.video_skip,
        if_exists: config.if_exists,
        checkpoint: config.checkpoint.clone(),
    };

    let result = if args.run_once {
        run_tick(&pipeline, &config, &options, env).await
    } else {
        run_loop(&pipeline, &config, &options, env).await
    };

    if let Some(heartbeat) = heartbeat {
        heartbeat.abort();
    }
    result
}

async fn run_loop(
    pipeline: &Pipeline,
    config: &ScheduleConfig,
    options: &DownloadOptions,
    env: &Environment,
) -> anyhow::Result<()> {
    // Validated at config load; re-parsed here for the loop.
    let schedule = cron::Schedule::from_str(&config.normalized_cron())?;

    if config.run_on_init {
        if let Err(e) = run_tick(pipeline, config, options, env).await {
            error!(error = %format!("{e:#}"), "initial scheduled run failed");
        }
    }

    loop {
        let Some(delay) = until_next_fire(&schedule, env.tz) else {
            info!("cron schedule has no future fire times; stopping");
            return Ok(());
        };
        info!(seconds = delay.as_secs(), "waiting for next scheduled run");
        tokio::time::sleep(delay).await;

        if let Err(e) = run_tick(pipeline, config, options, env).await {
            error!(error = %format!("{e:#}"), "scheduled run failed");
        }
    }
}

async fn run_tick(
    pipeline: &Pipeline,
    config: &ScheduleConfig,
    options: &DownloadOptions,
    env: &Environment,
) -> anyhow::Result<()> {
    let start = Instant::now();
    info!("starting scheduled download run");

    let mut resolved: Vec<u32> = Vec::new();
    for entry in &config.queries {
        resolved.extend(resolve_entry(pipeline, entry).await?);
    }

    // No bars under the scheduler; structured logs carry the progress.
    let progress = Progress::new(true);
    let stats = pipeline
        .run(&resolved, options, FailureMode::Continue, &progress)
        .await?;

    if let Some(path) = &env.last_success_path {
        health::write_timestamp(path).await?;
    }

    let elapsed = start.elapsed();
    info!(
        completed = stats.completed,
        failed = stats.failed,
        skipped_checkpoint = stats.skipped_checkpoint,
        skipped_existing = stats.skipped_existing,
        "scheduled run completed in {}m {}s",
        elapsed.as_secs() / 60,
        elapsed.as_secs() % 60
    );
    Ok(())
}

async fn resolve_entry(
    pipeline: &Pipeline,
    entry: &QueryEntry,
) -> Result<Vec<u32>, PipelineError> {
    match entry {
        QueryEntry::Id { id } => Ok(vec![*id]),
        QueryEntry::Url { url } => pipeline.resolve(url).await,
        QueryEntry::Query { query } => pipeline.search(query).await,
    }
}

/// Time until the schedule's next fire, computed in the configured
/// timezone (host-local when `TZ` is unset). `None` when the schedule has
/// no future fire times.
fn until_next_fire(schedule: &cron::Schedule, tz: Option<Tz>) -> Option<Duration> {
    let next_utc = match tz {
        Some(tz) => schedule.upcoming(tz).next()?.with_timezone(&Utc),
        None => schedule.upcoming(chrono::Local).next()?.with_timezone(&Utc),
    };
    Some((next_utc - Utc::now()).to_std().unwrap_or_default())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_until_next_fire_is_in_the_future() {
        let schedule = cron::Schedule::from_str("0 0 3 * * *").unwrap();
        let delay = until_next_fire(&schedule, None).unwrap();
        assert!(delay <= Duration::from_secs(24 * 60 * 60));
    }

    #[test]
    fn test_until_next_fire_respects_timezone() {
        let schedule = cron::Schedule::from_str("0 0 3 * * *").unwrap();
        let tokyo = until_next_fire(&schedule, Some(chrono_tz::Asia::Tokyo)).unwrap();
        let utc = until_next_fire(&schedule, Some(chrono_tz::UTC)).unwrap();
        // 03:00 Tokyo and 03:00 UTC are nine hours apart modulo a day.
        let diff = tokyo.abs_diff(utc);
        let nine_hours = Duration::from_secs(9 * 3600);
        let fifteen_hours = Duration::from_secs(15 * 3600);
        assert!(
            diff.abs_diff(nine_hours) < Duration::from_secs(60)
                || diff.abs_diff(fifteen_hours) < Duration::from_secs(60),
            "unexpected timezone offset: {diff:?}"
        );
    }
}
