//! Common library for service scripts
//!
//! Service scripts share two things: a fault-tolerant PostgreSQL
//! connection and a single way of turning epoch values into UTC instants.
//! This crate is the versioned surface over both; the crates behind it
//! ([`common_db`], [`common_time`]) are implementation detail.
//!
//! # Example
//!
//! ```rust,ignore
//! use common::{telemetry, Common, Settings};
//!
//! let settings = Settings::load()?;
//! telemetry::init_tracing(&settings.logging)?;
//!
//! let common = Common::init(settings.db);
//! let observed_at = common::to_timestamp(payload["ts"].clone())?;
//! let mut conn = common.get_connection().await?;
//! sqlx::query("INSERT INTO readings (observed_at) VALUES ($1)")
//!     .bind(observed_at.as_datetime())
//!     .execute(&mut **conn)
//!     .await?;
//! drop(conn);
//!
//! common.shutdown().await;
//! ```

pub mod error;
pub mod settings;
pub mod telemetry;

pub use common_db::{
    BoxFuture, ConnectionHandle, ConnectionManager, Connector, DatabaseError, ManagerState,
    ManagerStatus, PgConnector, PoolConfig, PoolSettings, RetryPolicy, SessionOf, Transport,
};
pub use common_time::{
    parse_datetime, to_timestamp, to_timestamp_opt, ts_gap, CanonicalTimestamp, InvalidReason,
    TimestampError, TimestampValue, SECONDS_MAGNITUDE_LIMIT,
};
pub use error::CommonError;
pub use settings::{Environment, Settings};
pub use telemetry::{init_tracing, LogFormat, LogSettings};

use tracing::info;

/// Version of the caller-facing interface
///
/// Bumped on any breaking change to the items re-exported here.
pub const INTERFACE_VERSION: &str = "1.0.0";

/// Entry point owned by a service script for its whole lifetime
///
/// Wraps one [`ConnectionManager`]: created at start-up with
/// [`Common::init`], shared by reference, and closed with
/// [`Common::shutdown`] before exit.
pub struct Common<C: Connector = PgConnector> {
    connections: ConnectionManager<C>,
}

impl Common<PgConnector> {
    /// Creates the facade for a PostgreSQL database; nothing is opened yet
    pub fn init(settings: PoolSettings) -> Self {
        Self::with_manager(ConnectionManager::init(settings))
    }

    /// Loads [`Settings`] and creates the facade from their database section
    pub fn from_env() -> Result<Self, CommonError> {
        Ok(Self::init(Settings::load()?.db))
    }
}

impl<C: Connector> Common<C> {
    /// Wraps an existing manager
    pub fn with_manager(connections: ConnectionManager<C>) -> Self {
        info!(interface_version = INTERFACE_VERSION, "Common library initialised");
        Self { connections }
    }

    /// Scoped acquisition of a database session
    pub async fn get_connection(&self) -> Result<ConnectionHandle<SessionOf<C>>, CommonError> {
        Ok(self.connections.get_connection().await?)
    }

    /// Normalizes an epoch value, date/time text or chrono value into a UTC instant
    pub fn to_timestamp<V: Into<TimestampValue>>(
        &self,
        value: V,
    ) -> Result<CanonicalTimestamp, CommonError> {
        Ok(to_timestamp(value)?)
    }

    /// The underlying manager, for transactions, status and re-initialisation
    pub fn connections(&self) -> &ConnectionManager<C> {
        &self.connections
    }

    /// Closes the database transport; safe to call more than once
    pub async fn shutdown(&self) {
        self.connections.shutdown().await;
    }
}
