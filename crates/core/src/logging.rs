//! Logging setup for hosts embedding the engine
//!
//! The engine itself only emits `tracing` events. A host (batch indexer, test harness, editor
//! integration) calls [`init`] once to route them to:
//! - a daily rotating file (`logs/lantern.log` by default)
//! - optionally stderr
//!
//! Levels come from `RUST_LOG` unless an explicit filter is configured.

use std::{
    io,
    path::{Path, PathBuf},
};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Clone)]
pub struct LogConfig {
    pub log_dir: PathBuf,
    pub log_filename: String,
    pub format: LogFormat,
    /// Mirror events to stderr as well as the file
    pub stderr: bool,
    /// Filter directive; falls back to `RUST_LOG`, then `info`
    pub env_filter: Option<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            log_dir: PathBuf::from("logs"),
            log_filename: "lantern.log".to_string(),
            format: LogFormat::Text,
            stderr: false,
            env_filter: None,
        }
    }
}

impl LogConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_log_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.log_dir = dir.into();
        self
    }

    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.log_filename = filename.into();
        self
    }

    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_stderr(mut self, stderr: bool) -> Self {
        self.stderr = stderr;
        self
    }

    pub fn with_env_filter(mut self, filter: impl Into<String>) -> Self {
        self.env_filter = Some(filter.into());
        self
    }

    pub fn log_path(&self) -> PathBuf {
        self.log_dir.join(&self.log_filename)
    }

    fn filter(&self) -> Result<EnvFilter, Box<dyn std::error::Error>> {
        match &self.env_filter {
            Some(filter) => Ok(EnvFilter::try_new(filter)?),
            None => Ok(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))),
        }
    }
}

/// Keeps the background log writer alive; events are flushed when it is dropped
pub struct LogGuard {
    _worker: WorkerGuard,
}

/// Install the global subscriber described by `config`.
///
/// Fails if a global subscriber is already installed or the log directory cannot be created.
pub fn init(config: &LogConfig) -> Result<LogGuard, Box<dyn std::error::Error>> {
    if !config.log_dir.exists() {
        std::fs::create_dir_all(&config.log_dir)?;
    }

    let env_filter = config.filter()?;
    let file_appender = tracing_appender::rolling::daily(&config.log_dir, &config.log_filename);
    let (non_blocking, worker) = tracing_appender::non_blocking(file_appender);

    let file_layer = match config.format {
        LogFormat::Text => fmt::layer()
            .with_writer(non_blocking)
            .with_ansi(false)
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .boxed(),
        LogFormat::Json => fmt::layer()
            .json()
            .with_writer(non_blocking)
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .boxed(),
    };

    let stderr_layer = config
        .stderr
        .then(|| fmt::layer().with_writer(io::stderr).with_target(true).boxed());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(stderr_layer)
        .try_init()?;

    Ok(LogGuard { _worker: worker })
}

/// Route panics through tracing before the default hook prints them
pub fn install_panic_hook() {
    let previous = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        let payload = panic_info
            .payload()
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| panic_info.payload().downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "Unknown panic payload".to_string());

        let location = panic_info
            .location()
            .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()))
            .unwrap_or_else(|| "Unknown location".to_string());

        tracing::error!(panic.payload = %payload, panic.location = %location, "lantern panicked");
        previous(panic_info);
    }));
}

/// Log file location, honouring `$LANTERN_LOG_PATH`
pub fn default_log_path() -> PathBuf {
    std::env::var("LANTERN_LOG_PATH")
        .ok()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("logs/lantern.log"))
}

pub fn read_log_file(path: &Path) -> io::Result<Vec<String>> {
    let content = std::fs::read_to_string(path)?;
    Ok(content.lines().map(|s| s.to_string()).collect())
}
