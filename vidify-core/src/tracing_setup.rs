//! Tracing setup for Vidify
//!
//! Console output at the level the user picks, plus a full trace of the run
//! written to disk so every chunk fetch and playback step can be inspected
//! afterwards.

use std::fs::{File, create_dir_all};
use std::path::{Path, PathBuf};

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, fmt};

use crate::VidifyError;

/// File name of the per-run trace log, overwritten on every run.
pub const LOG_FILE_NAME: &str = "vidify-last-run.log";

/// Path of the trace log inside `logs_dir` (defaults to `./logs`).
pub fn log_file_path(logs_dir: Option<&Path>) -> PathBuf {
    logs_dir
        .unwrap_or_else(|| Path::new("logs"))
        .join(LOG_FILE_NAME)
}

/// Initialize tracing with dual output: console (user level) + file (full trace)
///
/// `RUST_LOG` overrides `console_level` for the console layer when set.
///
/// # Errors
///
/// - `VidifyError::Io` - If the logs directory or log file cannot be created
/// - `VidifyError::Tracing` - If a global subscriber is already installed
pub fn init_tracing(console_level: Level, logs_dir: Option<&Path>) -> crate::Result<()> {
    let log_path = log_file_path(logs_dir);
    if let Some(parent) = log_path.parent() {
        create_dir_all(parent)?;
    }
    let log_file = File::create(&log_path)?;

    let console_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(console_level.to_string()));

    let console_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_filter(console_filter);

    let file_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_ansi(false)
        .with_writer(log_file)
        .with_filter(EnvFilter::new("trace"));

    tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| VidifyError::Tracing {
            reason: e.to_string(),
        })?;

    tracing::info!(
        "Tracing initialized: console={}, trace_file={}",
        console_level,
        log_path.display()
    );

    Ok(())
}

/// CLI log levels for user control
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum CliLogLevel {
    /// Only error messages
    Error,
    /// Warnings and errors, including invariant violations
    Warn,
    /// Run lifecycle and report
    Info,
    /// Load task and visibility changes
    Debug,
    /// Every chunk and playback step
    Trace,
}

impl CliLogLevel {
    pub fn as_tracing_level(self) -> Level {
        match self {
            CliLogLevel::Error => Level::ERROR,
            CliLogLevel::Warn => Level::WARN,
            CliLogLevel::Info => Level::INFO,
            CliLogLevel::Debug => Level::DEBUG,
            CliLogLevel::Trace => Level::TRACE,
        }
    }
}

impl std::str::FromStr for CliLogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "error" => Ok(CliLogLevel::Error),
            "warn" => Ok(CliLogLevel::Warn),
            "info" => Ok(CliLogLevel::Info),
            "debug" => Ok(CliLogLevel::Debug),
            "trace" => Ok(CliLogLevel::Trace),
            _ => Err(format!("Invalid log level: {s}")),
        }
    }
}

impl std::fmt::Display for CliLogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            CliLogLevel::Error => "error",
            CliLogLevel::Warn => "warn",
            CliLogLevel::Info => "info",
            CliLogLevel::Debug => "debug",
            CliLogLevel::Trace => "trace",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_parsing() {
        assert_eq!("WARN".parse::<CliLogLevel>(), Ok(CliLogLevel::Warn));
        assert_eq!("trace".parse::<CliLogLevel>(), Ok(CliLogLevel::Trace));
        assert!("verbose".parse::<CliLogLevel>().is_err());
        assert_eq!(CliLogLevel::Debug.as_tracing_level(), Level::DEBUG);
        assert_eq!(CliLogLevel::Info.to_string(), "info");
    }

    #[test]
    fn test_log_file_location() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(
            log_file_path(Some(dir.path())),
            dir.path().join("vidify-last-run.log")
        );
        assert_eq!(
            log_file_path(None),
            PathBuf::from("logs").join(LOG_FILE_NAME)
        );
    }

    #[test]
    fn test_init_creates_log_file() {
        let dir = tempfile::tempdir().unwrap();
        let logs = dir.path().join("nested");

        // A second init in the same process reports an error instead of panicking
        let first = init_tracing(Level::WARN, Some(&logs));
        let second = init_tracing(Level::WARN, Some(&logs));

        assert!(logs.join(LOG_FILE_NAME).exists());
        assert!(first.is_ok() || matches!(first, Err(VidifyError::Tracing { .. })));
        assert!(matches!(second, Err(VidifyError::Tracing { .. })));
    }
}
