//! reel-send - Background daemon for scheduled reels
//!
//! Runs the scheduler loop: every check interval it publishes the reels
//! whose time has come.

use anyhow::Context;
use clap::Parser;
use libreelcast::logging::{format_from_env, level_from_env, LogFormat, LoggingConfig};
use libreelcast::{Config, ReelcastError, Scheduler};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "reel-send")]
#[command(version)]
#[command(about = "Background daemon for scheduled reels")]
#[command(long_about = "\
reel-send - Background daemon for scheduled reels

DESCRIPTION:
    reel-send is a long-running daemon that watches the Reelcast queue and
    publishes scheduled reels when they are due.

    Each check loads the queue, claims every due post and publishes them
    concurrently: upload to Cloudinary, create an Instagram media container,
    wait for processing, publish. Failed posts are marked failed and are
    not retried.

USAGE:
    # Run in foreground (logs to stderr)
    reel-send

    # Check every 5 minutes
    reel-send --check-interval 5

    # Publish whatever is due right now and exit
    reel-send --once

SIGNALS:
    SIGTERM, SIGINT - Graceful shutdown (waits for the current check)

CONFIGURATION:
    Configuration file: ~/.config/reelcast/config.toml
    Database location: ~/.local/share/reelcast/posts.db

    [scheduler]
    check_interval_minutes = 1  # minutes between checks
    poll_interval_secs = 5      # seconds between processing checks
    max_poll_attempts = 30      # processing checks before giving up

ENVIRONMENT:
    REELCAST_CONFIG           - Path to config file
    REELCAST_DB_PATH          - Path to database file
    REELCAST_INSTAGRAM_TOKEN  - Instagram access token
    REELCAST_LOG_FORMAT       - text, json or pretty
    REELCAST_LOG_LEVEL        - Default log level

EXIT CODES:
    0 - Clean shutdown
    1 - Runtime error
    2 - Configuration or database error
    3 - Invalid input
")]
struct Cli {
    /// Minutes between checks (overrides config)
    #[arg(long, value_name = "MINUTES")]
    check_interval: Option<u64>,

    /// Enable verbose logging to stderr
    #[arg(short, long)]
    verbose: bool,

    /// Log format: text, json or pretty
    #[arg(long, value_name = "FORMAT")]
    log_format: Option<LogFormat>,

    /// Run a single check and exit
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    LoggingConfig::new(
        cli.log_format.unwrap_or_else(format_from_env),
        level_from_env(),
        cli.verbose,
    )
    .init();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {}", e);
        std::process::exit(exit_code(&e));
    }
}

fn exit_code(error: &anyhow::Error) -> i32 {
    error
        .downcast_ref::<ReelcastError>()
        .map(ReelcastError::exit_code)
        .unwrap_or(1)
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = Config::load()?;
    if let Some(minutes) = cli.check_interval {
        config.scheduler.check_interval_minutes = minutes;
    }

    let scheduler = Scheduler::from_config(&config).await?;

    if cli.once {
        let summary = scheduler.run_tick().await?;
        println!("{}", serde_json::to_string(&summary)?);
        info!("reel-send: processed due posts once, exiting");
        return Ok(());
    }

    info!(
        check_interval_minutes = config.scheduler.check_interval_minutes,
        "reel-send daemon starting"
    );
    scheduler.start()?;

    wait_for_shutdown().await?;
    info!("Received shutdown signal, stopping gracefully...");
    scheduler.shutdown().await;

    info!("reel-send daemon stopped");
    Ok(())
}

#[cfg(unix)]
async fn wait_for_shutdown() -> anyhow::Result<()> {
    use futures::stream::StreamExt;
    use signal_hook::consts::{SIGINT, SIGTERM};
    use signal_hook_tokio::Signals;

    let mut signals = Signals::new([SIGINT, SIGTERM]).context("Signal setup failed")?;
    let handle = signals.handle();

    if let Some(signal) = signals.next().await {
        info!(signal, "Shutdown signal received");
    }

    handle.close();
    Ok(())
}

#[cfg(not(unix))]
async fn wait_for_shutdown() -> anyhow::Result<()> {
    tokio::signal::ctrl_c()
        .await
        .context("Signal setup failed")
}
