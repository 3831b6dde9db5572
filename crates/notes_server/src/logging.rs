use std::fs;
use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

/// JSON lines to a daily rolling file under `log_dir`, plain text to stdout.
/// Keep the returned guard alive for the lifetime of the process.
pub fn init_logging(log_dir: &Path) -> WorkerGuard {
    if let Err(err) = fs::create_dir_all(log_dir) {
        eprintln!("failed to create log dir `{}`: {err}", log_dir.display());
    }
    let file_appender = tracing_appender::rolling::daily(log_dir, "notes-server.log");
    let (writer, guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,notes_server=debug,tower_http=debug"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().json().with_writer(writer))
        .with(fmt::layer().with_target(false))
        .init();

    guard
}
