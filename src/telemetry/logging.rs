//! Logging configuration and initialization
//!
//! One `tracing-subscriber` registry with an env filter and up to three
//! layers: compact or JSON console output, and an optional plain-text log
//! file written through a non-blocking `tracing-appender` worker.

use std::fs::File;
use std::path::{Path, PathBuf};

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

/// Log level filter variable, checked before `RUST_LOG`
pub const LOG_ENV: &str = "OMNI_LOG";

/// Console format override (`compact` or `json`)
pub const LOG_FORMAT_ENV: &str = "OMNI_LOG_FORMAT";

/// Log file used when file output is on and no path is configured
pub const DEFAULT_LOG_FILE: &str = "omni-render.log";

/// Console output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Single-line human readable output
    #[default]
    Compact,
    /// One JSON object per event
    Json,
}

impl LogFormat {
    /// Parse a format name, ignoring case
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "compact" | "text" => Some(LogFormat::Compact),
            "json" => Some(LogFormat::Json),
            _ => None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LogError {
    #[error("couldn't create log file {path}: {source}")]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("logging already initialized: {0}")]
    Init(#[from] TryInitError),
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Write events to stderr
    pub console_enabled: bool,
    pub format: LogFormat,
    /// Also write events to a log file
    pub file_enabled: bool,
    /// Log file path, [`DEFAULT_LOG_FILE`] when unset
    pub file_path: Option<PathBuf>,
    /// Filter used when neither `OMNI_LOG` nor `RUST_LOG` is set
    pub default_level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            console_enabled: true,
            format: LogFormat::Compact,
            file_enabled: false,
            file_path: None,
            default_level: "info".to_string(),
        }
    }
}

impl LogConfig {
    /// Console format after applying `OMNI_LOG_FORMAT`
    pub fn effective_format(&self) -> LogFormat {
        std::env::var(LOG_FORMAT_ENV)
            .ok()
            .and_then(|name| LogFormat::parse(&name))
            .unwrap_or(self.format)
    }

    /// Path the file layer writes to
    pub fn log_file_path(&self) -> PathBuf {
        self.file_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_LOG_FILE))
    }
}

fn open_log_file(path: &Path) -> Result<File, LogError> {
    File::create(path).map_err(|source| LogError::File {
        path: path.to_path_buf(),
        source,
    })
}

/// Install the global subscriber
///
/// Returns the file writer's guard when file output is enabled; buffered
/// lines are flushed when it drops, so keep it alive until exit.
///
/// ```no_run
/// use omni_render::telemetry::{init_logging, LogConfig};
///
/// let _guard = init_logging(&LogConfig::default()).expect("Failed to initialize logging");
/// ```
pub fn init_logging(config: &LogConfig) -> Result<Option<WorkerGuard>, LogError> {
    let env_filter = EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(&config.default_level));

    let format = config.effective_format();

    let (file_writer, guard) = if config.file_enabled {
        let path = config.log_file_path();
        let (writer, guard) = tracing_appender::non_blocking(open_log_file(&path)?);
        (Some((writer, path)), Some(guard))
    } else {
        (None, None)
    };
    let file_path = file_writer.as_ref().map(|(_, path)| path.clone());

    let file_layer = file_writer.map(|(writer, _)| {
        fmt::layer()
            .with_writer(writer)
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .with_ansi(false)
    });

    let console = config.console_enabled;
    let json_layer = (console && format == LogFormat::Json).then(|| {
        fmt::layer()
            .json()
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
    });
    let compact_layer =
        (console && format == LogFormat::Compact).then(|| fmt::layer().with_target(true).compact());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(json_layer)
        .with(compact_layer)
        .try_init()?;

    tracing::info!(
        target: "omni_render",
        version = env!("CARGO_PKG_VERSION"),
        format = ?format,
        log_file = ?file_path,
        "Logging initialized"
    );

    Ok(guard)
}

/// Initialize logging from the environment with default settings
pub fn init_logging_default() -> Result<Option<WorkerGuard>, LogError> {
    init_logging(&LogConfig::default())
}

pub use tracing_appender::non_blocking::WorkerGuard as LogGuard;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_config_default() {
        let config = LogConfig::default();
        assert!(config.console_enabled);
        assert!(!config.file_enabled);
        assert_eq!(config.format, LogFormat::Compact);
        assert_eq!(config.default_level, "info");
        assert_eq!(config.log_file_path(), PathBuf::from(DEFAULT_LOG_FILE));
    }

    #[test]
    fn test_log_format_parse() {
        assert_eq!(LogFormat::parse("json"), Some(LogFormat::Json));
        assert_eq!(LogFormat::parse(" JSON\n"), Some(LogFormat::Json));
        assert_eq!(LogFormat::parse("compact"), Some(LogFormat::Compact));
        assert_eq!(LogFormat::parse("pretty"), None);
    }

    #[test]
    fn test_unwritable_log_file() {
        // A directory can't be opened as a log file
        let dir = std::env::temp_dir();
        match open_log_file(&dir) {
            Err(LogError::File { path, .. }) => assert_eq!(path, dir),
            other => panic!("expected file error, got {:?}", other.map(|_| ())),
        }
    }
}
