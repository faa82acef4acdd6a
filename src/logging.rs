//! Logging setup.
//!
//! kiln logs through `tracing` and never installs a subscriber on its own.
//! Call [`init`] once at process start:
//!
//! ```rust,no_run
//! let log = kiln::logging::LogConfig::from_env();
//! kiln::logging::init(&log).expect("logging already initialised");
//! ```

use std::str::FromStr;

use tracing::warn;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::error::ConfigError;

/// Output format.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    #[default]
    Text,
}

impl FromStr for LogFormat {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, ()> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "text" => Ok(Self::Text),
            _ => Err(()),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogConfig {
    /// `TRACE`, `DEBUG`, `INFO`, `WARN` or `ERROR`.
    pub level: String,
    pub format: LogFormat,
    /// Include file and line of the call site.
    pub with_caller: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self { level: "INFO".to_owned(), format: LogFormat::Text, with_caller: false }
    }
}

const LEVELS: [&str; 5] = ["TRACE", "DEBUG", "INFO", "WARN", "ERROR"];

impl LogConfig {
    /// Reads `LOG_LEVEL`, `LOG_FORMAT` and `LOG_CALLER`.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`from_env`](Self::from_env) with any key lookup. Invalid values
    /// fall back to their default with a warning.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(level) = lookup("LOG_LEVEL") {
            let level = level.trim().to_ascii_uppercase();
            if LEVELS.contains(&level.as_str()) {
                config.level = level;
            } else {
                warn!(value = %level, "invalid LOG_LEVEL, defaulting to INFO");
            }
        }
        if let Some(format) = lookup("LOG_FORMAT") {
            match format.trim().parse() {
                Ok(f) => config.format = f,
                Err(()) => warn!(value = %format, "invalid LOG_FORMAT, defaulting to text"),
            }
        }
        if let Some(caller) = lookup("LOG_CALLER") {
            config.with_caller = matches!(caller.trim(), "1" | "true" | "TRUE" | "True");
        }
        config
    }

    fn filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(self.level.to_ascii_lowercase()))
    }
}

/// Installs the global subscriber. A second call fails.
///
/// `RUST_LOG`, when set, takes precedence over [`LogConfig::level`].
pub fn init(config: &LogConfig) -> Result<(), ConfigError> {
    let layer = match config.format {
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .with_file(config.with_caller)
            .with_line_number(config.with_caller)
            .with_filter(config.filter())
            .boxed(),
        LogFormat::Text => tracing_subscriber::fmt::layer()
            .with_file(config.with_caller)
            .with_line_number(config.with_caller)
            .with_filter(config.filter())
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(layer)
        .try_init()
        .map_err(|e| ConfigError::Logging(e.to_string()))
}
