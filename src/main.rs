//! CLI entry point for the gallery downloader.

use anyhow::Result;
use clap::Parser;
use hitomi_dl::cli::{Cli, Command};
use hitomi_dl::commands;
use hitomi_dl::environment::Environment;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let cli = Cli::parse();
    let env = Environment::from_env()?;

    // Log filter priority: RUST_LOG env var > quiet flag > LOG_LEVEL > info
    let quiet = match &cli.command {
        Command::Download(args) => args.quiet,
        Command::Regenerate(args) => args.quiet,
        Command::Schedule(_) => false,
    };
    let default_level = if quiet {
        "error"
    } else {
        env.log_level.as_deref().unwrap_or("info")
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(env.log_color)
        .init();

    match cli.command {
        Command::Download(args) => commands::run_download_command(args, &env).await,
        Command::Schedule(args) => commands::run_schedule_command(args, &env).await,
        Command::Regenerate(args) => commands::run_regenerate_command(&args),
    }
}
