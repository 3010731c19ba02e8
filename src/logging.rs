// Tracing setup: console output plus an optional daily-rotated log file

use std::fs;
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;

const LOG_FILE_NAME: &str = "dca_bot.log";

/// Install the global subscriber. `RUST_LOG` wins over the configured level.
///
/// The returned guard flushes the file writer on drop and must be held by `main`.
pub fn init_logging(config: &LoggingConfig, verbose: bool) -> Option<WorkerGuard> {
    let level = if verbose { "debug" } else { config.level.as_str() };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{},hyper=warn,reqwest=warn", level)));

    let mut guard = None;
    let file_layer = if config.log_to_file && log_dir_writable(&config.log_directory) {
        let file_appender = tracing_appender::rolling::daily(&config.log_directory, LOG_FILE_NAME);
        let (non_blocking, worker_guard) = tracing_appender::non_blocking(file_appender);
        guard = Some(worker_guard);

        Some(
            tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_target(true),
        )
    } else {
        None
    };

    let console_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_thread_ids(false);

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    guard
}

// rolling::daily panics if the first file cannot be created
fn log_dir_writable(dir: &str) -> bool {
    if fs::create_dir_all(dir).is_err() {
        eprintln!("Warning: could not create log directory {}, file logging disabled", dir);
        return false;
    }

    let marker = Path::new(dir).join(".dca_write_test");
    match fs::OpenOptions::new().create(true).append(true).open(&marker) {
        Ok(_) => {
            let _ = fs::remove_file(&marker);
            true
        }
        Err(e) => {
            eprintln!("Warning: log directory {} not writable ({}), file logging disabled", dir, e);
            false
        }
    }
}
