use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

use crate::model::config::LogConfig;

/// Error type for logging setup
#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("invalid log level {level:?}: {source}")]
    Filter {
        level: String,
        source: tracing_subscriber::filter::ParseError,
    },
    #[error("could not open log file {path}: {source}")]
    File { path: PathBuf, source: io::Error },
    #[error("logging already initialized: {0}")]
    Init(#[from] tracing_subscriber::util::TryInitError),
}

/// Install the global subscriber: stderr always, plus a dated file under
/// `config.dir` when `config.to_file` is set. `RUST_LOG` overrides the
/// configured level.
pub fn init_logging(config: &LogConfig) -> Result<(), LoggingError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.level).map_err(|e| LoggingError::Filter {
            level: config.level.clone(),
            source: e,
        })?,
    };

    let file_layer = if config.to_file {
        let file = open_log_file(&config.dir)?;
        Some(
            fmt::layer()
                .with_ansi(false)
                .with_writer(Mutex::new(file)),
        )
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .try_init()?;
    Ok(())
}

/// `<dir>/<YYYY-MM-DD>.log` for today, in local time.
pub fn log_file_path(dir: &Path) -> PathBuf {
    dir.join(format!("{}.log", chrono::Local::now().format("%Y-%m-%d")))
}

fn open_log_file(dir: &Path) -> Result<File, LoggingError> {
    let path = log_file_path(dir);
    fs::create_dir_all(dir)
        .and_then(|_| OpenOptions::new().create(true).append(true).open(&path))
        .map_err(|e| LoggingError::File { path, source: e })
}
