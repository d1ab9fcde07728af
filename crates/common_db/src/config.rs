//! Pool configuration
//!
//! Connection parameters arrive in two steps. [`PoolSettings`] is the raw,
//! possibly incomplete record read from `DB_*` environment variables (and a
//! `.env` file when the caller loaded one). [`PoolSettings::to_config`]
//! validates it into an immutable [`PoolConfig`], which is what the
//! connection manager shares between acquisitions. The manager performs that
//! validation on first acquisition, so a missing `DB_HOST` surfaces as a
//! [`DatabaseError::Configuration`] exactly where the caller first needs the
//! database.
//!
//! | Variable                 | Default | Notes                          |
//! |--------------------------|---------|--------------------------------|
//! | `DB_HOST`                | -       | required                       |
//! | `DB_PORT`                | 5432    |                                |
//! | `DB_USER`                | -       | required                       |
//! | `DB_PASSWORD`            | empty   |                                |
//! | `DB_NAME`                | -       | required                       |
//! | `DB_POOL_MIN`            | 1       | >= 1                           |
//! | `DB_POOL_MAX`            | 10      | 1..=100, >= `DB_POOL_MIN`      |
//! | `DB_POOL_TIMEOUT`        | 30      | seconds to wait for a slot, >= 5 |
//! | `DB_CONNECT_TIMEOUT`     | 10      | seconds per connection attempt, >= 1 |
//! | `DB_QUERY_TIMEOUT`       | 30      | seconds, session `statement_timeout` |
//! | `DB_RETRY_ATTEMPTS`      | 5       | connection attempts, >= 1      |
//! | `DB_RETRY_BACKOFF_MS`    | 500     | first backoff delay            |
//! | `DB_RETRY_BACKOFF_MAX_MS`| 5000    | cap on a single delay          |
//!
//! A failing establishment blocks its caller for at most
//! [`PoolConfig::max_establishment_time`]: every attempt is cut off after
//! the connect timeout, and the backoff delays between attempts add up to
//! [`RetryPolicy::max_total_wait`].

use std::fmt;
use std::time::Duration;

use serde::Deserialize;
use sqlx::postgres::PgConnectOptions;
use validator::{Validate, ValidationError};

use crate::error::DatabaseError;
use crate::retry::{
    BackoffStrategy, RetryPolicy, DEFAULT_BACKOFF_BASE, DEFAULT_BACKOFF_MAX, DEFAULT_RETRY_ATTEMPTS,
};

/// Prefix of every database environment variable
pub const ENV_PREFIX: &str = "DB";

/// `application_name` reported to the server
pub const APPLICATION_NAME: &str = "common-db";

const DEFAULT_PORT: u16 = 5432;
const DEFAULT_POOL_MIN: u32 = 1;
const DEFAULT_POOL_MAX: u32 = 10;
const DEFAULT_POOL_TIMEOUT_SECS: u64 = 30;
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
const DEFAULT_QUERY_TIMEOUT_SECS: u64 = 30;

/// Raw database settings as read from the environment
#[derive(Clone, Deserialize, Validate)]
#[validate(schema(function = "validate_pool_bounds"))]
pub struct PoolSettings {
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default = "default_pool_min")]
    #[validate(range(min = 1))]
    pub pool_min: u32,
    #[serde(default = "default_pool_max")]
    #[validate(range(min = 1, max = 100))]
    pub pool_max: u32,
    #[serde(default = "default_pool_timeout")]
    #[validate(range(min = 5))]
    pub pool_timeout: u64,
    #[serde(default = "default_connect_timeout")]
    #[validate(range(min = 1))]
    pub connect_timeout: u64,
    #[serde(default = "default_query_timeout")]
    #[validate(range(min = 1))]
    pub query_timeout: u64,
    #[serde(default = "default_retry_attempts")]
    #[validate(range(min = 1))]
    pub retry_attempts: u32,
    #[serde(default = "default_backoff_ms")]
    pub retry_backoff_ms: u64,
    #[serde(default = "default_backoff_max_ms")]
    pub retry_backoff_max_ms: u64,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_pool_min() -> u32 {
    DEFAULT_POOL_MIN
}

fn default_pool_max() -> u32 {
    DEFAULT_POOL_MAX
}

fn default_pool_timeout() -> u64 {
    DEFAULT_POOL_TIMEOUT_SECS
}

fn default_connect_timeout() -> u64 {
    DEFAULT_CONNECT_TIMEOUT_SECS
}

fn default_query_timeout() -> u64 {
    DEFAULT_QUERY_TIMEOUT_SECS
}

fn default_retry_attempts() -> u32 {
    DEFAULT_RETRY_ATTEMPTS
}

fn default_backoff_ms() -> u64 {
    DEFAULT_BACKOFF_BASE.as_millis() as u64
}

fn default_backoff_max_ms() -> u64 {
    DEFAULT_BACKOFF_MAX.as_millis() as u64
}

fn validate_pool_bounds(settings: &PoolSettings) -> Result<(), ValidationError> {
    if settings.pool_max < settings.pool_min {
        let mut error = ValidationError::new("pool_bounds");
        error.message = Some(
            format!(
                "pool_max ({}) must be >= pool_min ({})",
                settings.pool_max, settings.pool_min
            )
            .into(),
        );
        return Err(error);
    }
    Ok(())
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            host: None,
            port: DEFAULT_PORT,
            user: None,
            password: String::new(),
            name: None,
            pool_min: DEFAULT_POOL_MIN,
            pool_max: DEFAULT_POOL_MAX,
            pool_timeout: DEFAULT_POOL_TIMEOUT_SECS,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT_SECS,
            query_timeout: DEFAULT_QUERY_TIMEOUT_SECS,
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
            retry_backoff_ms: default_backoff_ms(),
            retry_backoff_max_ms: default_backoff_max_ms(),
        }
    }
}

impl fmt::Debug for PoolSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolSettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &mask(&self.password))
            .field("name", &self.name)
            .field("pool_min", &self.pool_min)
            .field("pool_max", &self.pool_max)
            .field("pool_timeout", &self.pool_timeout)
            .field("connect_timeout", &self.connect_timeout)
            .field("query_timeout", &self.query_timeout)
            .field("retry_attempts", &self.retry_attempts)
            .field("retry_backoff_ms", &self.retry_backoff_ms)
            .field("retry_backoff_max_ms", &self.retry_backoff_max_ms)
            .finish()
    }
}

impl PoolSettings {
    /// Reads `DB_*` variables from the process environment
    ///
    /// Only malformed values (e.g. `DB_PORT=abc`) fail here; missing
    /// required values are reported by [`PoolSettings::to_config`].
    pub fn from_env() -> Result<Self, DatabaseError> {
        Self::from_environment(config::Environment::with_prefix(ENV_PREFIX))
    }

    /// Reads settings from an explicit environment source
    pub fn from_environment(source: config::Environment) -> Result<Self, DatabaseError> {
        config::Config::builder()
            .add_source(source)
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| DatabaseError::configuration(e.to_string()))
    }

    /// Validates the settings into an immutable pool configuration
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError::Configuration` naming the first missing
    /// variable, or describing the range violation.
    pub fn to_config(&self) -> Result<PoolConfig, DatabaseError> {
        let host = required(&self.host, "DB_HOST")?;
        let user = required(&self.user, "DB_USER")?;
        let database = required(&self.name, "DB_NAME")?;

        self.validate()
            .map_err(|e| DatabaseError::configuration(e.to_string()))?;

        let base = Duration::from_millis(self.retry_backoff_ms);
        let max = Duration::from_millis(self.retry_backoff_max_ms).max(base);
        let retry = RetryPolicy::new(self.retry_attempts)
            .with_backoff(BackoffStrategy::Exponential { base, max });

        Ok(PoolConfig::new(host, user, database)
            .port(self.port)
            .password(self.password.clone())
            .min_connections(self.pool_min)
            .max_connections(self.pool_max)
            .acquire_timeout(Duration::from_secs(self.pool_timeout))
            .connect_timeout(Duration::from_secs(self.connect_timeout))
            .statement_timeout(Duration::from_secs(self.query_timeout))
            .retry(retry))
    }
}

fn required(value: &Option<String>, variable: &str) -> Result<String, DatabaseError> {
    match value.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v.to_string()),
        _ => Err(DatabaseError::configuration(format!(
            "required variable {} is not set",
            variable
        ))),
    }
}

/// Renders a secret for display: `***` when set, `(not set)` otherwise
pub fn mask(secret: &str) -> &'static str {
    if secret.is_empty() {
        "(not set)"
    } else {
        "***"
    }
}

/// Immutable connection parameters shared by every acquisition
///
/// # Example
///
/// ```rust
/// use common_db::PoolConfig;
/// use std::time::Duration;
///
/// let config = PoolConfig::new("localhost", "cipuser", "cipdb")
///     .password("secret")
///     .max_connections(20)
///     .acquire_timeout(Duration::from_secs(10));
///
/// assert_eq!(config.identity(), "cipuser@localhost:5432/cipdb");
/// ```
#[derive(Clone)]
pub struct PoolConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    password: String,
    pub database: String,
    /// Minimum number of connections to maintain
    pub min_connections: u32,
    /// Maximum number of connections in the pool
    pub max_connections: u32,
    /// How long an acquisition waits for a free slot
    pub acquire_timeout: Duration,
    /// Upper bound on a single connection attempt
    pub connect_timeout: Duration,
    /// Server-side limit on a single statement
    pub statement_timeout: Duration,
    /// Establishment retry policy
    pub retry: RetryPolicy,
}

impl PoolConfig {
    /// Creates a configuration with default pool sizing and retry policy
    pub fn new(
        host: impl Into<String>,
        user: impl Into<String>,
        database: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_PORT,
            user: user.into(),
            password: String::new(),
            database: database.into(),
            min_connections: DEFAULT_POOL_MIN,
            max_connections: DEFAULT_POOL_MAX,
            acquire_timeout: Duration::from_secs(DEFAULT_POOL_TIMEOUT_SECS),
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            statement_timeout: Duration::from_secs(DEFAULT_QUERY_TIMEOUT_SECS),
            retry: RetryPolicy::default(),
        }
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = password.into();
        self
    }

    pub fn min_connections(mut self, min: u32) -> Self {
        self.min_connections = min;
        self
    }

    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    pub fn acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn statement_timeout(mut self, timeout: Duration) -> Self {
        self.statement_timeout = timeout;
        self
    }

    pub fn retry(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }

    /// Longest a caller can be held by one failing establishment
    ///
    /// Every attempt may run up to `connect_timeout`, followed by the
    /// backoff delays of the retry policy. With the defaults this is
    /// 5 x 10s + 7.5s.
    pub fn max_establishment_time(&self) -> Duration {
        self.connect_timeout * self.retry.max_attempts + self.retry.max_total_wait()
    }

    /// Credential-free identity used in logs and errors: `user@host:port/db`
    pub fn identity(&self) -> String {
        format!("{}@{}:{}/{}", self.user, self.host, self.port, self.database)
    }

    /// Builds SQLx connect options without going through a URL string
    pub fn connect_options(&self) -> PgConnectOptions {
        PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .username(&self.user)
            .password(&self.password)
            .database(&self.database)
            .application_name(APPLICATION_NAME)
            .options([(
                "statement_timeout",
                format!("{}ms", self.statement_timeout.as_millis()),
            )])
    }
}

impl fmt::Debug for PoolConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolConfig")
            .field("identity", &self.identity())
            .field("password", &mask(&self.password))
            .field("min_connections", &self.min_connections)
            .field("max_connections", &self.max_connections)
            .field("acquire_timeout", &self.acquire_timeout)
            .field("connect_timeout", &self.connect_timeout)
            .field("statement_timeout", &self.statement_timeout)
            .field("retry", &self.retry)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(vars: &[(&str, &str)]) -> config::Environment {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        config::Environment::with_prefix(ENV_PREFIX).source(Some(map))
    }

    #[test]
    fn test_reads_prefixed_variables() {
        let settings = PoolSettings::from_environment(env(&[
            ("DB_HOST", "db"),
            ("DB_PORT", "6543"),
            ("DB_USER", "cipuser"),
            ("DB_PASSWORD", "0123"),
            ("DB_NAME", "cipdb"),
            ("DB_POOL_MAX", "20"),
        ]))
        .unwrap();

        assert_eq!(settings.host.as_deref(), Some("db"));
        assert_eq!(settings.port, 6543);
        assert_eq!(settings.password, "0123");
        assert_eq!(settings.pool_max, 20);
        assert_eq!(settings.pool_min, DEFAULT_POOL_MIN);
    }

    #[test]
    fn test_malformed_port_is_configuration_error() {
        let result = PoolSettings::from_environment(env(&[("DB_PORT", "not-a-port")]));
        assert!(matches!(result, Err(DatabaseError::Configuration(_))));
    }

    #[test]
    fn test_missing_host_names_variable() {
        let settings = PoolSettings {
            user: Some("u".into()),
            name: Some("d".into()),
            ..PoolSettings::default()
        };

        let err = settings.to_config().unwrap_err();
        assert!(err.to_string().contains("DB_HOST"));
    }

    #[test]
    fn test_blank_required_value_is_missing() {
        let settings = PoolSettings {
            host: Some("  ".into()),
            user: Some("u".into()),
            name: Some("d".into()),
            ..PoolSettings::default()
        };

        assert!(settings.to_config().unwrap_err().is_configuration_error());
    }

    #[test]
    fn test_pool_max_below_min_is_rejected() {
        let settings = PoolSettings {
            host: Some("h".into()),
            user: Some("u".into()),
            name: Some("d".into()),
            pool_min: 5,
            pool_max: 2,
            ..PoolSettings::default()
        };

        assert!(settings.to_config().unwrap_err().is_configuration_error());
    }

    #[test]
    fn test_pool_max_upper_bound() {
        let settings = PoolSettings {
            host: Some("h".into()),
            user: Some("u".into()),
            name: Some("d".into()),
            pool_max: 101,
            ..PoolSettings::default()
        };

        assert!(settings.to_config().is_err());
    }

    #[test]
    fn test_to_config_carries_overrides() {
        let settings = PoolSettings {
            host: Some("h".into()),
            user: Some("u".into()),
            name: Some("d".into()),
            retry_attempts: 3,
            retry_backoff_ms: 10,
            retry_backoff_max_ms: 1,
            ..PoolSettings::default()
        };

        let config = settings.to_config().unwrap();
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(
            config.retry.backoff,
            BackoffStrategy::Exponential {
                base: Duration::from_millis(10),
                max: Duration::from_millis(10),
            }
        );
    }

    #[test]
    fn test_connect_timeout_from_environment() {
        let settings = PoolSettings::from_environment(env(&[("DB_CONNECT_TIMEOUT", "3")])).unwrap();
        assert_eq!(settings.connect_timeout, 3);

        let zero = PoolSettings {
            host: Some("h".into()),
            user: Some("u".into()),
            name: Some("d".into()),
            connect_timeout: 0,
            ..PoolSettings::default()
        };
        assert!(zero.to_config().unwrap_err().is_configuration_error());
    }

    #[test]
    fn test_establishment_time_is_bounded() {
        let config = PoolConfig::new("h", "u", "d");
        assert_eq!(config.max_establishment_time(), Duration::from_millis(57_500));

        let single = PoolConfig::new("h", "u", "d")
            .connect_timeout(Duration::from_secs(2))
            .retry(RetryPolicy::none());
        assert_eq!(single.max_establishment_time(), Duration::from_secs(2));
    }

    #[test]
    fn test_debug_masks_password() {
        let config = PoolConfig::new("h", "u", "d").password("hunter2");
        let rendered = format!("{:?}", config);

        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("***"));

        let settings = PoolSettings {
            password: "hunter2".into(),
            ..PoolSettings::default()
        };
        assert!(!format!("{:?}", settings).contains("hunter2"));
    }
}
