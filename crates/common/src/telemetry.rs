//! Logging initialisation
//!
//! Service scripts call [`init_tracing`] once at startup. `RUST_LOG`, when
//! set, overrides `LOG_LEVEL` so operators can raise verbosity for a single
//! module (`RUST_LOG=common_db=debug`).

use std::fmt;

use serde::Deserialize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use validator::{Validate, ValidationError};

use crate::error::CommonError;

/// Prefix of the logging environment variables
pub const LOG_ENV_PREFIX: &str = "LOG";

/// Output format of the log subscriber
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines with ANSI colours
    #[default]
    Colored,
    /// Human-readable lines without colours
    Text,
    /// One JSON object per event, for log aggregation
    Json,
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Colored => write!(f, "colored"),
            Self::Text => write!(f, "text"),
            Self::Json => write!(f, "json"),
        }
    }
}

/// `LOG_*` settings
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct LogSettings {
    #[serde(default = "default_level")]
    #[validate(custom(function = "validate_level"))]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

fn default_level() -> String {
    "info".to_string()
}

fn validate_level(level: &str) -> Result<(), ValidationError> {
    if filter_directive(level).is_some() {
        Ok(())
    } else {
        let mut error = ValidationError::new("log_level");
        error.message = Some(
            format!(
                "log level must be one of trace, debug, info, warning, error, critical; got '{}'",
                level
            )
            .into(),
        );
        Err(error)
    }
}

/// Maps a level name, including the `WARNING`/`CRITICAL` spellings, to a
/// filter directive
fn filter_directive(level: &str) -> Option<&'static str> {
    match level.trim().to_ascii_lowercase().as_str() {
        "trace" => Some("trace"),
        "debug" => Some("debug"),
        "info" => Some("info"),
        "warn" | "warning" => Some("warn"),
        "error" | "critical" => Some("error"),
        _ => None,
    }
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: default_level(),
            format: LogFormat::default(),
        }
    }
}

impl LogSettings {
    /// Filter directive for the configured level
    ///
    /// # Errors
    ///
    /// Returns `CommonError::Configuration` for an unknown level name.
    pub fn directive(&self) -> Result<&'static str, CommonError> {
        self.validate()
            .map_err(|e| CommonError::Configuration(e.to_string()))?;
        filter_directive(&self.level).ok_or_else(|| {
            CommonError::Configuration(format!("unknown log level '{}'", self.level))
        })
    }
}

/// Installs the global tracing subscriber
///
/// # Errors
///
/// Returns `CommonError::Configuration` if the level is unknown or a global
/// subscriber is already installed.
pub fn init_tracing(settings: &LogSettings) -> Result<(), CommonError> {
    let directive = settings.directive()?;
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directive));

    let registry = tracing_subscriber::registry().with(filter);
    let installed = match settings.format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_target(true))
            .try_init(),
        LogFormat::Text => registry
            .with(tracing_subscriber::fmt::layer().with_target(true).with_ansi(false))
            .try_init(),
        LogFormat::Colored => registry
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .try_init(),
    };

    installed.map_err(|e| CommonError::Configuration(format!("tracing subscriber: {}", e)))
}
