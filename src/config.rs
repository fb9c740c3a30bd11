//! Runtime configuration loaded from environment variables.
//!
//! Follows 12-factor style: all settings come from environment variables
//! (or a `.env` file via `dotenvy`).

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::AdmissionError;

/// Output format of the tracing subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable multi-line output.
    #[default]
    Pretty,
    /// One JSON object per line.
    Json,
}

impl FromStr for LogFormat {
    type Err = AdmissionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(AdmissionError::Config(format!(
                "LOG_FORMAT must be `pretty` or `json`, got `{other}`"
            ))),
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pretty => f.write_str("pretty"),
            Self::Json => f.write_str("json"),
        }
    }
}

/// Top-level configuration.
///
/// Loaded once at startup via [`AdmissionConfig::from_env`].
#[derive(Debug, Clone)]
pub struct AdmissionConfig {
    /// Tracing output format.
    pub log_format: LogFormat,

    /// Master switch for the persistence layer.
    pub persistence_enabled: bool,

    /// Whether to append domain events to the store's log.
    pub event_log_enabled: bool,

    /// Capacity of the EventBus broadcast channel.
    pub event_bus_capacity: usize,

    /// JSON seed file applied at startup.
    pub seed_path: Option<PathBuf>,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            log_format: LogFormat::Pretty,
            persistence_enabled: true,
            event_log_enabled: true,
            event_bus_capacity: 10_000,
            seed_path: None,
        }
    }
}

impl AdmissionConfig {
    /// Loads configuration from environment variables.
    ///
    /// Falls back to defaults when a variable is missing or unparsable.
    /// Calls `dotenvy::dotenv().ok()` to optionally load a `.env` file.
    ///
    /// # Errors
    ///
    /// Returns [`AdmissionError::Config`] if `LOG_FORMAT` is set to an
    /// unknown value.
    pub fn from_env() -> Result<Self, AdmissionError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Returns [`AdmissionError::Config`] if `LOG_FORMAT` is set to an
    /// unknown value.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AdmissionError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let log_format = match lookup("LOG_FORMAT") {
            Some(raw) => raw.parse()?,
            None => defaults.log_format,
        };

        Ok(Self {
            log_format,
            persistence_enabled: parse_bool(
                lookup("PERSISTENCE_ENABLED"),
                defaults.persistence_enabled,
            ),
            event_log_enabled: parse_bool(
                lookup("PERSISTENCE_EVENT_LOG_ENABLED"),
                defaults.event_log_enabled,
            ),
            event_bus_capacity: parse_or(
                lookup("EVENT_BUS_CAPACITY"),
                defaults.event_bus_capacity,
            ),
            seed_path: lookup("SEED_PATH")
                .filter(|path| !path.trim().is_empty())
                .map(PathBuf::from),
        })
    }
}

/// Parses `raw` as `T`, returning `default` on missing or invalid values.
fn parse_or<T: FromStr>(raw: Option<String>, default: T) -> T {
    raw.and_then(|v| v.trim().parse().ok()).unwrap_or(default)
}

/// Parses a boolean. Accepts `"true"`, `"1"`, `"false"`, `"0"`
/// (case-insensitive). Returns `default` otherwise.
fn parse_bool(raw: Option<String>, default: bool) -> bool {
    match raw.map(|v| v.trim().to_ascii_lowercase()).as_deref() {
        Some("true" | "1") => true,
        Some("false" | "0") => false,
        _ => default,
    }
}
