//! Combined service settings
//!
//! Reads the `.env` file (if present) and then three groups of environment
//! variables: `APP_ENV` for the deployment environment, `DB_*` for the
//! database, and `LOG_*` for logging.

use std::fmt;

use common_db::config::{mask, ENV_PREFIX as DB_ENV_PREFIX};
use common_db::PoolSettings;
use serde::Deserialize;
use tracing::debug;

use crate::error::CommonError;
use crate::telemetry::{LogSettings, LOG_ENV_PREFIX};

/// Prefix of application-level variables
pub const APP_ENV_PREFIX: &str = "APP";

/// Deployment environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Staging,
    Production,
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Development => write!(f, "development"),
            Self::Staging => write!(f, "staging"),
            Self::Production => write!(f, "production"),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct AppSettings {
    #[serde(default)]
    env: Environment,
}

/// Everything a service script needs to start
#[derive(Debug, Clone)]
pub struct Settings {
    pub env: Environment,
    pub db: PoolSettings,
    pub logging: LogSettings,
}

impl Settings {
    /// Loads `.env` and reads the process environment
    pub fn load() -> Result<Self, CommonError> {
        if let Ok(path) = dotenvy::dotenv() {
            debug!(path = %path.display(), "Loaded .env file");
        }

        Self::from_sources(
            config::Environment::with_prefix(APP_ENV_PREFIX),
            config::Environment::with_prefix(DB_ENV_PREFIX),
            config::Environment::with_prefix(LOG_ENV_PREFIX),
        )
    }

    /// Reads settings from explicit sources
    ///
    /// Database values are only parsed here; required-value and range
    /// checks run when the connection manager first needs the database.
    pub fn from_sources(
        app: config::Environment,
        db: config::Environment,
        logging: config::Environment,
    ) -> Result<Self, CommonError> {
        let app: AppSettings = config::Config::builder()
            .add_source(app)
            .build()?
            .try_deserialize()?;

        let logging: LogSettings = config::Config::builder()
            .add_source(logging)
            .build()?
            .try_deserialize()?;

        Ok(Self {
            env: app.env,
            db: PoolSettings::from_environment(db)?,
            logging,
        })
    }

    pub fn is_development(&self) -> bool {
        self.env == Environment::Development
    }

    pub fn is_staging(&self) -> bool {
        self.env == Environment::Staging
    }

    pub fn is_production(&self) -> bool {
        self.env == Environment::Production
    }

    /// Human-readable configuration summary with the password masked
    pub fn display(&self) -> String {
        let db = &self.db;
        let unset = "(not set)";
        format!(
            "======== Common Configuration ========\n\
             Environment: {}\n\
             Database:\n    \
             Host: {}\n    \
             Name: {}\n    \
             User: {}\n    \
             Password: {}\n    \
             Port: {}\n    \
             Pool: {}..{} connections, {}s acquire timeout, {}s query timeout\n    \
             Connect: {}s per attempt\n    \
             Retry: {} attempts, backoff {}ms..{}ms\n\
             Logging:\n    \
             Level: {}\n    \
             Format: {}\n",
            self.env,
            db.host.as_deref().unwrap_or(unset),
            db.name.as_deref().unwrap_or(unset),
            db.user.as_deref().unwrap_or(unset),
            mask(&db.password),
            db.port,
            db.pool_min,
            db.pool_max,
            db.pool_timeout,
            db.query_timeout,
            db.connect_timeout,
            db.retry_attempts,
            db.retry_backoff_ms,
            db.retry_backoff_max_ms,
            self.logging.level,
            self.logging.format,
        )
    }
}
