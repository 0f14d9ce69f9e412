//! asegurados - a roster of insured people and whether each has paid.
//!
//! The roster lives in local storage and keeps working offline: the bundled
//! dataset and app assets are cached by a background worker.

mod app;
mod cli;
mod commands;
mod prompt;

use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use app::App;
use asegurados_core::Config;
use cli::{Cli, Command};

/// When set, logs go to a daily rolling file with this name in the data
/// directory instead of stderr
const LOG_FILE_ENV: &str = "ASEGURADOS_LOG_FILE";

/// Directory and file name prefix for the rolling log. Only the final path
/// component of `value` is used.
fn log_file_target(config: &Config, value: &str) -> Option<(PathBuf, OsString)> {
    let file_name = Path::new(value.trim()).file_name()?.to_os_string();
    let dir = config.data_dir().ok()?;
    Some((dir, file_name))
}

/// Initialize the tracing subscriber for logging.
/// The returned guard flushes the log file and must live until exit.
fn init_tracing(config: &Config) -> Option<WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let target = std::env::var(LOG_FILE_ENV)
        .ok()
        .and_then(|value| log_file_target(config, &value))
        .filter(|(dir, _)| std::fs::create_dir_all(dir).is_ok());
    if let Some((dir, file_name)) = target {
        let (writer, guard) =
            tracing_appender::non_blocking(tracing_appender::rolling::daily(dir, file_name));
        tracing_subscriber::registry()
            .with(fmt::layer().with_writer(writer).with_ansi(false))
            .with(filter)
            .init();
        return Some(guard);
    }

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();
    None
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let config = Config::load()?;
    let _log_guard = init_tracing(&config);
    info!("asegurados starting");

    let app = App::new(config)?;

    let result = run(&app, cli).await;
    app.shutdown().await;
    result
}

async fn run(app: &App, cli: Cli) -> Result<()> {
    match cli.command {
        Command::Cache { command } => commands::cache(app, command, cli.yes).await,
        command => {
            app.register().await;
            let mut store = app.load_store().await?;
            commands::run(&mut store, command, cli.yes).await
        }
    }
}
