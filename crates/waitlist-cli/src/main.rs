//! Waitlist console - staff-facing shell over the waitlist engine.
//!
//! Reads one command per line from stdin, so it works both interactively
//! and with a piped script.

mod commands;

use std::io;
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use waitlist_core::{Waitlist, WaitlistConfig};

use commands::{Command, HELP};

// ============================================================================
// Constants
// ============================================================================

/// Overrides `offer_window_secs` from the config file
const ENV_OFFER_WINDOW: &str = "WAITLIST_OFFER_WINDOW_SECS";

/// Overrides `data_dir` from the config file
const ENV_DATA_DIR: &str = "WAITLIST_DATA_DIR";

/// When set, logs go to a daily rolling file in this directory
const ENV_LOG_DIR: &str = "WAITLIST_LOG_DIR";

const LOG_FILE_PREFIX: &str = "waitlist.log";

const PROMPT: &str = "waitlist> ";

/// Initialize the tracing subscriber for logging.
///
/// Use RUST_LOG to control the level (e.g., RUST_LOG=waitlist_core=debug).
/// The returned guard must outlive every log call when writing to a file.
fn init_tracing() -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    match std::env::var_os(ENV_LOG_DIR) {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(PathBuf::from(dir), LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(fmt::layer().with_writer(writer).with_ansi(false))
                .with(filter)
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry()
                .with(fmt::layer().with_writer(io::stderr))
                .with(filter)
                .init();
            None
        }
    }
}

/// Config file values, then environment overrides, then the default
/// data directory.
fn load_config() -> Result<WaitlistConfig> {
    let mut config = WaitlistConfig::load()?;

    if let Ok(raw) = std::env::var(ENV_OFFER_WINDOW) {
        let secs: i64 = raw
            .trim()
            .parse()
            .with_context(|| format!("{} must be a number of seconds, got '{}'", ENV_OFFER_WINDOW, raw))?;
        config = config.with_offer_window(Duration::seconds(secs));
    }
    if let Some(dir) = std::env::var_os(ENV_DATA_DIR) {
        config = config.with_data_dir(PathBuf::from(dir));
    }

    // The console always persists; fall back to the platform data directory.
    let data_dir = config.data_dir_or_default()?;
    info!(data_dir = %data_dir.display(), "Using data directory");
    Ok(config.with_data_dir(data_dir))
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let _log_guard = init_tracing();
    info!("Waitlist console starting");

    let config = load_config()?;

    let list = Waitlist::builder(config)
        .start()
        .await
        .map_err(|e| anyhow::anyhow!(e.user_message()))
        .context("Failed to start waitlist")?;

    run(&list).await?;

    info!("Waitlist console exiting");
    Ok(())
}

async fn run(list: &Waitlist) -> Result<()> {
    let mut stdout = tokio::io::stdout();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    stdout.write_all(b"Type 'help' for commands.\n").await?;
    loop {
        stdout.write_all(PROMPT.as_bytes()).await?;
        stdout.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };

        let reply = match Command::parse(&line) {
            Ok(None) => continue,
            Ok(Some(Command::Quit)) => break,
            Ok(Some(Command::Help)) => HELP.to_string(),
            Ok(Some(command)) => match commands::execute(list, command).await {
                Ok(output) => output,
                Err(e) => {
                    warn!(error = %e, "Command failed");
                    format!("error: {}", e.user_message())
                }
            },
            Err(e) => format!("error: {:#}", e),
        };

        stdout.write_all(reply.as_bytes()).await?;
        stdout.write_all(b"\n").await?;
    }
    Ok(())
}
