//! authkeep - keep a backend session alive from the command line.
//!
//! Logs in against the configured auth service, keeps the resulting session
//! in the configured storage backend between runs and renews the access
//! token when it expires.

mod commands;
mod display;

use std::io;

use anyhow::Result;
use tracing::{debug, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use authkeep_core::{Config, SessionManager};

use commands::Command;

/// Log file name inside the data directory
const LOG_FILE: &str = "authkeep.log";

/// Initialize the tracing subscriber for logging.
///
/// Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug). Logs go
/// to stderr and, when the data directory is available, to a log file.
fn init_tracing() -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match Config::data_dir() {
        Ok(dir) if std::fs::create_dir_all(&dir).is_ok() => {
            let appender = tracing_appender::rolling::never(dir, LOG_FILE);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_writer(writer).with_ansi(false);
            (Some(layer), Some(guard))
        }
        _ => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();

    guard
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = match Command::parse(&args) {
        Ok(command) => command,
        Err(e) => {
            eprintln!("{}\n\n{}", e, commands::USAGE);
            std::process::exit(2);
        }
    };
    if command == Command::Help {
        println!("{}", commands::USAGE);
        return Ok(());
    }

    let _log_guard = init_tracing();
    info!("authkeep starting");
    let mut config = Config::load_or_default();
    debug!(api = %config.api_base_url, storage = ?config.storage, "Configuration loaded");

    let manager = SessionManager::from_config(&config)?;

    if let Err(e) = commands::run(command, &manager, &mut config).await {
        eprintln!("Error: {}", e);
        if let Some(session_err) = e.downcast_ref::<authkeep_core::SessionError>() {
            if session_err.requires_login() {
                eprintln!("Run `authkeep login` to sign in again.");
            }
        }
        std::process::exit(1);
    }

    Ok(())
}
