//! Tracing/logging initialization.

use core::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing_subscriber::EnvFilter;

/// Env var selecting the output format (`json` or `pretty`).
pub const LOG_FORMAT_ENV: &str = "SPLITLEDGER_LOG_FORMAT";

/// Output format for log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

impl FromStr for LogFormat {
    type Err = ObservabilityConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "pretty" | "text" => Ok(LogFormat::Pretty),
            other => Err(ObservabilityConfigError::InvalidFormat(other.to_string())),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ObservabilityConfigError {
    #[error("unknown log format '{0}' (expected json or pretty)")]
    InvalidFormat(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    pub format: LogFormat,
    /// Filter used when `RUST_LOG` is unset.
    pub default_filter: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Json,
            default_filter: "info".to_string(),
        }
    }
}

impl ObservabilityConfig {
    /// Read `SPLITLEDGER_LOG_FORMAT`; everything else keeps its default.
    pub fn from_env() -> Result<Self, ObservabilityConfigError> {
        let mut config = Self::default();
        if let Ok(raw) = std::env::var(LOG_FORMAT_ENV) {
            config.format = raw.parse()?;
        }
        Ok(config)
    }
}

/// Initialize tracing/logging for the process from the environment.
///
/// An invalid `SPLITLEDGER_LOG_FORMAT` falls back to JSON.
pub fn init() {
    let config = ObservabilityConfig::from_env().unwrap_or_default();
    init_with(&config);
}

/// Initialize tracing/logging with an explicit configuration.
///
/// Safe to call multiple times (subsequent calls are no-ops).
pub fn init_with(config: &ObservabilityConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.default_filter));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(tracing_subscriber::fmt::time::SystemTime)
        .with_target(false);

    let installed = match config.format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
    };
    if installed.is_ok() {
        ::tracing::debug!(format = ?config.format, "tracing initialized");
    }
}
