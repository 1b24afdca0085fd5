//! # Logging Utilities
//!
//! Logging setup for the debugsym tools, built on `tracing`.
//!
//! Console output goes to **stderr**: the `resolve` command writes its
//! module JSON to stdout, and log lines must never mix into it.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use debugsym_utils::init_logging;
//!
//! init_logging().expect("Failed to initialize logging");
//! tracing::info!("Resolving debug symbols");
//! ```
//!
//! ## Environment Variables
//!
//! - `RUST_LOG`: Level filter (e.g. `RUST_LOG=debug`, `RUST_LOG=debugsym_core=trace`)
//! - `DEBUGSYM_LOG_FORMAT`: Output format (`json` or `pretty`, default: `pretty`)
//! - `DEBUGSYM_LOG_FILE`: Optional path of an extra, daily-rolled log file
//!
//! ## Unattended Runs
//!
//! When the resolver runs as part of a batch pipeline, [`init_logging_to_file`]
//! keeps the console clean and writes everything to
//! `~/.debugsym/YYYY-MM-DD-debugsym.log`.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::{env, io};

use chrono::{NaiveDate, Utc};
use tracing::Level;
use tracing_appender::non_blocking::NonBlocking;
use tracing_subscriber::fmt::time::ChronoUtc;
use tracing_subscriber::fmt::{self, MakeWriter};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

/// Environment variable selecting the output format.
pub const LOG_FORMAT_ENV: &str = "DEBUGSYM_LOG_FORMAT";

/// Environment variable naming an extra log file.
pub const LOG_FILE_ENV: &str = "DEBUGSYM_LOG_FILE";

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat
{
    /// Human-readable lines (default)
    #[default]
    Pretty,
    /// One JSON object per event, for log shippers
    Json,
}

impl FromStr for LogFormat
{
    type Err = LoggingError;

    fn from_str(s: &str) -> Result<Self, Self::Err>
    {
        match s.to_lowercase().as_str() {
            "pretty" | "text" | "dev" => Ok(LogFormat::Pretty),
            "json" | "prod" => Ok(LogFormat::Json),
            _ => Err(LoggingError::InvalidFormat(s.to_string())),
        }
    }
}

/// Log level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel
{
    /// Error level
    Error,
    /// Warning level
    Warn,
    /// Info level (default)
    Info,
    /// Debug level
    Debug,
    /// Trace level (most verbose)
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
            "error" | "err" => Ok(LogLevel::Error),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" | "dbg" => Ok(LogLevel::Debug),
            "trace" => Ok(LogLevel::Trace),
            _ => Err(LoggingError::InvalidLevel(s.to_string())),
        }
    }
}

/// Initialize console logging from the environment.
///
/// Reads `RUST_LOG`, `DEBUGSYM_LOG_FORMAT` and `DEBUGSYM_LOG_FILE`. An
/// unparsable format falls back to [`LogFormat::Pretty`].
///
/// ## Errors
///
/// Returns an error if a global subscriber is already installed or the
/// log file directory cannot be created.
pub fn init_logging() -> Result<(), LoggingError>
{
    let format = env::var(LOG_FORMAT_ENV)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or_default();
    install_console(format, None)
}

/// Initialize console logging with an explicit level.
///
/// The level overrides `RUST_LOG`. `DEBUGSYM_LOG_FILE` is still honored.
///
/// ```rust,no_run
/// use debugsym_utils::{init_logging_with_level, LogFormat, LogLevel};
///
/// init_logging_with_level(LogLevel::Debug, LogFormat::Pretty).expect("Failed to initialize logging");
/// ```
///
/// ## Errors
///
/// Same as [`init_logging`].
pub fn init_logging_with_level(level: LogLevel, format: LogFormat) -> Result<(), LoggingError>
{
    install_console(format, Some(level.into()))
}

/// Initialize file-only logging under `~/.debugsym`.
///
/// Falls back to the system temp directory when `HOME` is unset. Returns
/// the path of the log file.
///
/// ## Errors
///
/// Returns an error if the log directory cannot be created or a global
/// subscriber is already installed.
pub fn init_logging_to_file(level: Option<LogLevel>, format: LogFormat) -> Result<PathBuf, LoggingError>
{
    let dir = match env::var_os("HOME") {
        Some(home) => PathBuf::from(home).join(".debugsym"),
        None => env::temp_dir(),
    };
    std::fs::create_dir_all(&dir)?;
    let log_file = dir.join(log_file_name(Utc::now().date_naive()));

    let appender = tracing_appender::rolling::never(&dir, log_file.file_name().unwrap_or_default());
    let layer = format_layer(format, leak_guard(appender), false, build_filter(level.map(Into::into)));
    Registry::default()
        .with(layer)
        .try_init()
        .map_err(|err| LoggingError::InitializationFailed(err.to_string()))?;
    Ok(log_file)
}

/// Dated log file name, e.g. `2024-03-01-debugsym.log`.
pub fn log_file_name(date: NaiveDate) -> String
{
    format!("{}-debugsym.log", date.format("%Y-%m-%d"))
}

fn install_console(format: LogFormat, explicit: Option<Level>) -> Result<(), LoggingError>
{
    let mut layers: Vec<BoxedLayer> = vec![format_layer(format, io::stderr, true, build_filter(explicit))];

    if let Some(path) = env::var_os(LOG_FILE_ENV).map(PathBuf::from) {
        let dir = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
        std::fs::create_dir_all(dir)?;
        let appender = tracing_appender::rolling::daily(dir, path.file_name().unwrap_or_default());
        layers.push(format_layer(format, leak_guard(appender), false, build_filter(explicit)));
    }

    Registry::default()
        .with(layers)
        .try_init()
        .map_err(|err| LoggingError::InitializationFailed(err.to_string()))
}

/// Level filter. An explicit level wins, then `RUST_LOG`, then INFO.
fn build_filter(explicit: Option<Level>) -> EnvFilter
{
    if let Some(level) = explicit {
        return EnvFilter::new(level.to_string());
    }
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(Level::INFO.to_string()))
}

/// Wrap a file appender in a background writer that lives for the rest of
/// the process.
fn leak_guard(appender: tracing_appender::rolling::RollingFileAppender) -> NonBlocking
{
    let (writer, guard) = tracing_appender::non_blocking(appender);
    std::mem::forget(guard);
    writer
}

fn format_layer<W>(format: LogFormat, writer: W, ansi: bool, filter: EnvFilter) -> BoxedLayer
where
    W: for<'writer> MakeWriter<'writer> + Send + Sync + 'static,
{
    let base = fmt::layer()
        .with_writer(writer)
        .with_target(true)
        .with_thread_names(true)
        .with_timer(ChronoUtc::rfc_3339());

    match format {
        LogFormat::Pretty => base.with_ansi(ansi).with_filter(filter).boxed(),
        LogFormat::Json => base
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_filter(filter)
            .boxed(),
    }
}

/// Logging initialization error
#[derive(Debug, thiserror::Error)]
pub enum LoggingError
{
    /// Invalid log format
    #[error("Invalid log format: {0}. Use 'pretty' or 'json'")]
    InvalidFormat(String),

    /// Invalid log level
    #[error("Invalid log level: {0}. Use 'error', 'warn', 'info', 'debug', or 'trace'")]
    InvalidLevel(String),

    /// A global subscriber was already installed
    #[error("Failed to initialize logging: {0}")]
    InitializationFailed(String),

    /// File logging error
    #[error("File logging error: {0}")]
    FileError(#[from] io::Error),
}
