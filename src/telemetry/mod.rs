//! Telemetry and logging infrastructure

pub mod logging;

pub use logging::{init_logging, init_logging_default, LogConfig, LogError, LogFormat, LogGuard};
