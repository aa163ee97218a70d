//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::pipeline::IfExists;

/// Gallery downloader with checkpointed resume and CBZ output.
#[derive(Parser, Debug)]
#[command(name = "hitomi-dl")]
#[command(author, version, about)]
pub struct Cli {
    /// The subcommand to run.
    #[command(subcommand)]
    pub command: Command,
}

/// Top-level subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Download galleries by ID, URL, or search query
    Download(DownloadArgs),
    /// Run downloads on a cron cadence from a config file
    Schedule(ScheduleArgs),
    /// Re-derive ComicInfo.xml across an existing library
    Regenerate(RegenerateArgs),
}

/// Arguments for the `download` subcommand.
#[derive(Args, Debug)]
pub struct DownloadArgs {
    /// Gallery ID, gallery URL, or list/search URL to download
    pub input: String,

    /// Output path template; a .zip/.cbz extension selects archive output
    #[arg(default_value = "output/{id}")]
    pub output: String,

    /// Per-asset filename template
    #[arg(default_value = "{no}{ext}")]
    pub filename: String,

    /// Write the raw metadata sidecar (galleries.json)
    #[arg(long)]
    pub metadata: bool,

    /// Write the ComicInfo.xml sidecar
    #[arg(
        long,
        default_value_t = true,
        action = clap::ArgAction::Set,
        num_args = 0..=1,
        default_missing_value = "true"
    )]
    pub comic_info: bool,

    /// Skip video assets
    #[arg(
        long,
        default_value_t = true,
        action = clap::ArgAction::Set,
        num_args = 0..=1,
        default_missing_value = "true"
    )]
    pub video_skip: bool,

    /// Suppress non-error output
    #[arg(short, long)]
    pub quiet: bool,

    /// Path to the checkpoint log for resumable runs
    #[arg(long)]
    pub checkpoint: Option<PathBuf>,

    /// Behavior when the destination already exists
    #[arg(long, value_enum, default_value_t = IfExists::Error)]
    pub if_exists: IfExists,
}

/// Arguments for the `schedule` subcommand.
#[derive(Args, Debug)]
pub struct ScheduleArgs {
    /// Path to the schedule configuration file
    #[arg(default_value = "schedule.json")]
    pub config: PathBuf,

    /// Execute a single run immediately instead of installing the cron loop
    #[arg(long)]
    pub run_once: bool,
}

/// Arguments for the `regenerate` subcommand.
#[derive(Args, Debug)]
pub struct RegenerateArgs {
    /// Library root to scan for galleries.json files and archives
    pub input: PathBuf,

    /// Root to write refreshed copies into
    pub output: PathBuf,

    /// Suppress non-error output
    #[arg(short, long)]
    pub quiet: bool,
}
