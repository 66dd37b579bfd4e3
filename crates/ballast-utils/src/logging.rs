//! # Logging Utilities
//!
//! Logging infrastructure for ballast using `tracing`.
//!
//! Command output (sizes, type names, trace summaries) goes to stdout, so log
//! records are written to stderr and, optionally, to a file. Both sinks share
//! one `EnvFilter`.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ballast_utils::{init_logging, LoggingConfig};
//!
//! // Keep the guard alive for as long as the program logs.
//! let _guard = init_logging(&LoggingConfig::from_env()).expect("Failed to initialize logging");
//!
//! tracing::info!("Attached");
//! ```
//!
//! ## Environment Variables
//!
//! - `RUST_LOG`: Filter directives (e.g. `RUST_LOG=debug`, `RUST_LOG=ballast_core::walker=trace`)
//! - `BALLAST_LOG_FORMAT`: Output format (`json` or `pretty`, default: `pretty`)
//! - `BALLAST_LOG_FILE`: Optional log file; if it names a directory, a dated
//!   `YYYY-MM-DD-ballast.log` is created inside it

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::{env, io};

use chrono::Utc;
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::time::ChronoUtc;
use tracing_subscriber::fmt::{self};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat
{
    /// Human-readable lines (default)
    #[default]
    Pretty,
    /// One JSON object per record
    Json,
}

impl FromStr for LogFormat
{
    type Err = LoggingError;

    fn from_str(s: &str) -> Result<Self, Self::Err>
    {
        match s.to_lowercase().as_str() {
            "pretty" | "text" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            _ => Err(LoggingError::InvalidFormat(format!("{s} (use 'pretty' or 'json')"))),
        }
    }
}

/// Log level
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel
{
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for Level
{
    fn from(level: LogLevel) -> Self
    {
        match level {
            LogLevel::Error => Level::ERROR,
            LogLevel::Warn => Level::WARN,
            LogLevel::Info => Level::INFO,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Trace => Level::TRACE,
        }
    }
}

impl FromStr for LogLevel
{
    type Err = LoggingError;

    fn from_str(s: &str) -> Result<Self, Self::Err>
    {
        match s.to_lowercase().as_str() {
            "error" => Ok(LogLevel::Error),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            "trace" => Ok(LogLevel::Trace),
            _ => Err(LoggingError::InvalidLevel(format!(
                "{s} (use 'error', 'warn', 'info', 'debug' or 'trace')"
            ))),
        }
    }
}

/// Where and how to log.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoggingConfig
{
    /// Overrides `RUST_LOG` when set.
    pub level: Option<LogLevel>,
    pub format: LogFormat,
    /// Extra file sink.
    pub file: Option<PathBuf>,
}

impl LoggingConfig
{
    /// Read `BALLAST_LOG_FORMAT` and `BALLAST_LOG_FILE`.
    ///
    /// An unparsable format falls back to pretty output.
    pub fn from_env() -> Self
    {
        Self {
            level: None,
            format: env::var("BALLAST_LOG_FORMAT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or_default(),
            file: env::var_os("BALLAST_LOG_FILE").map(PathBuf::from),
        }
    }

    #[must_use]
    pub fn with_level(mut self, level: Option<LogLevel>) -> Self
    {
        if level.is_some() {
            self.level = level;
        }
        self
    }

    /// Filter from the explicit level, else `RUST_LOG`, else `warn`.
    fn filter(&self) -> EnvFilter
    {
        match self.level {
            Some(level) => EnvFilter::new(Level::from(level).to_string()),
            None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(Level::WARN.to_string())),
        }
    }
}

/// Flushes the file sink when dropped.
#[must_use = "dropping the guard stops file logging"]
pub struct LoggingGuard
{
    _file: Option<WorkerGuard>,
}

/// Resolve the configured file path, expanding a directory to a dated file.
pub fn log_file_path(configured: &Path) -> PathBuf
{
    if configured.is_dir() {
        let today = Utc::now().format("%Y-%m-%d");
        configured.join(format!("{today}-ballast.log"))
    } else {
        configured.to_path_buf()
    }
}

/// Install the global subscriber.
///
/// ## Errors
///
/// Returns an error if a subscriber is already installed or the log file
/// directory cannot be created.
pub fn init_logging(config: &LoggingConfig) -> Result<LoggingGuard, LoggingError>
{
    let filter = config.filter();

    let (file_writer, guard) = match &config.file {
        Some(configured) => {
            let path = log_file_path(configured);
            let dir = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
            std::fs::create_dir_all(dir)?;
            let name = path
                .file_name()
                .ok_or_else(|| LoggingError::InitializationFailed(format!("{} is not a file path", path.display())))?;
            let appender = tracing_appender::rolling::never(dir, name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(writer), Some(guard))
        }
        None => (None, None),
    };

    let result = match config.format {
        LogFormat::Pretty => {
            let console = fmt::layer()
                .with_target(true)
                .with_timer(ChronoUtc::rfc_3339())
                .with_ansi(true)
                .with_writer(io::stderr);
            let file = file_writer.map(|writer| {
                fmt::layer()
                    .with_writer(writer)
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_file(true)
                    .with_line_number(true)
                    .with_timer(ChronoUtc::rfc_3339())
                    .with_ansi(false)
            });
            Registry::default()
                .with(console.and_then(file).with_filter(filter))
                .try_init()
        }
        LogFormat::Json => {
            let console = fmt::layer()
                .json()
                .with_target(true)
                .with_timer(ChronoUtc::rfc_3339())
                .with_current_span(true)
                .with_writer(io::stderr);
            let file = file_writer.map(|writer| {
                fmt::layer()
                    .json()
                    .with_writer(writer)
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_file(true)
                    .with_line_number(true)
                    .with_timer(ChronoUtc::rfc_3339())
                    .with_current_span(true)
                    .with_span_list(true)
            });
            Registry::default()
                .with(console.and_then(file).with_filter(filter))
                .try_init()
        }
    };
    result.map_err(|err| LoggingError::InitializationFailed(err.to_string()))?;

    Ok(LoggingGuard { _file: guard })
}

/// Logging initialization error
#[derive(Debug, thiserror::Error)]
pub enum LoggingError
{
    /// Invalid log format
    #[error("Invalid log format: {0}")]
    InvalidFormat(String),

    /// Invalid log level
    #[error("Invalid log level: {0}")]
    InvalidLevel(String),

    /// Failed to initialize logging
    #[error("Failed to initialize logging: {0}")]
    InitializationFailed(String),

    /// File logging error
    #[error("File logging error: {0}")]
    FileError(#[from] io::Error),
}
