//! Connection manager
//!
//! [`ConnectionManager`] owns the single underlying transport for one
//! configuration. It is created explicitly at process start, shared by
//! reference (or `Arc`) with every caller, and shut down explicitly at exit.
//!
//! # Lifecycle
//!
//! - The transport is opened lazily on the first [`get_connection`] and
//!   reused afterwards. Every acquisition checks out a session and pings it;
//!   the transport is only replaced when that session cannot reach the
//!   server. A busy pool (`PoolExhausted`) is reported to the caller and
//!   never triggers a reconnect.
//! - Establishment runs under the manager's mutex. Callers arriving while
//!   another caller is connecting wait for that attempt instead of racing it.
//!   Each attempt is cut off after the configured connect timeout, so the
//!   wait is bounded by [`PoolConfig::max_establishment_time`].
//! - Transient failures are retried per the configuration's
//!   [`RetryPolicy`](crate::retry::RetryPolicy); once the budget is spent the
//!   manager is `Failed` and every acquisition returns
//!   [`DatabaseError::ConnectionUnavailable`] until [`reinitialize`].
//! - A replaced transport is closed in the background, and `shutdown` closes
//!   outside the mutex. Closing waits for borrowed sessions to come back, so
//!   a long-held handle never stalls other callers or status queries.
//!
//! # Scoped release
//!
//! A [`ConnectionHandle`] releases its session (back to the pool) when it is
//! dropped, on every exit path including errors, panics and cancelled
//! futures. The transport itself stays open.
//!
//! ```rust,ignore
//! let manager = ConnectionManager::from_env()?;
//!
//! let count: i64 = manager
//!     .with_connection(|conn| Box::pin(async move {
//!         let row: (i64,) = sqlx::query_as("SELECT count(*) FROM runs")
//!             .fetch_one(&mut ***conn)
//!             .await
//!             .map_err(DatabaseError::from)?;
//!         Ok::<_, DatabaseError>(row.0)
//!     }))
//!     .await?;
//!
//! manager.shutdown().await;
//! ```
//!
//! [`get_connection`]: ConnectionManager::get_connection
//! [`reinitialize`]: ConnectionManager::reinitialize

use std::future::Future;
use std::ops::{Deref, DerefMut};
use std::pin::Pin;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use once_cell::sync::OnceCell;
use serde::Serialize;
use sqlx::postgres::{PgArguments, PgRow};
use sqlx::query::{Query, QueryAs};
use sqlx::{FromRow, PgConnection, Postgres};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::{PoolConfig, PoolSettings};
use crate::error::DatabaseError;
use crate::state::ManagerState;
use crate::transport::{Connector, PgConnector, Transport};

/// Boxed future returned by scoped-work closures
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Session type handed out by a manager using connector `C`
pub type SessionOf<C> = <<C as Connector>::Transport as Transport>::Session;

/// A session checked out for one unit of work
///
/// Dereferences to the driver session (for PostgreSQL, a pooled
/// `PoolConnection<Postgres>`). Dropping the handle returns the session.
#[derive(Debug)]
pub struct ConnectionHandle<S> {
    session: S,
    transport_id: Uuid,
}

impl<S> ConnectionHandle<S> {
    /// Identity of the transport this session was drawn from
    pub fn transport_id(&self) -> Uuid {
        self.transport_id
    }
}

impl<S> Deref for ConnectionHandle<S> {
    type Target = S;

    fn deref(&self) -> &S {
        &self.session
    }
}

impl<S> DerefMut for ConnectionHandle<S> {
    fn deref_mut(&mut self) -> &mut S {
        &mut self.session
    }
}

/// Snapshot of a manager for diagnostics
#[derive(Debug, Clone, Serialize)]
pub struct ManagerStatus {
    pub state: ManagerState,
    /// `user@host:port/db`, when the configuration is valid
    pub identity: Option<String>,
    pub transport_id: Option<Uuid>,
    pub established_at: Option<DateTime<Utc>>,
    /// Transports replaced after a failed liveness check
    pub reconnects: u64,
}

struct Live<T> {
    id: Uuid,
    transport: Arc<T>,
    established_at: DateTime<Utc>,
}

impl<T> Clone for Live<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            transport: Arc::clone(&self.transport),
            established_at: self.established_at,
        }
    }
}

struct Inner<T> {
    state: ManagerState,
    live: Option<Live<T>>,
    reconnects: u64,
    /// Attempts and last error of the establishment that ended in `Failed`
    last_failure: Option<(u32, String)>,
}

/// Owner of the reusable transport for one database configuration
pub struct ConnectionManager<C: Connector = PgConnector> {
    settings: PoolSettings,
    config: OnceCell<Arc<PoolConfig>>,
    connector: C,
    inner: Mutex<Inner<C::Transport>>,
}

impl<C: Connector> ConnectionManager<C> {
    /// Creates a manager that validates `settings` on first acquisition
    pub fn new(settings: PoolSettings, connector: C) -> Self {
        Self::assemble(settings, OnceCell::new(), connector)
    }

    /// Creates a manager from an already validated configuration
    pub fn with_config(config: PoolConfig, connector: C) -> Self {
        Self::assemble(
            PoolSettings::default(),
            OnceCell::with_value(Arc::new(config)),
            connector,
        )
    }

    fn assemble(settings: PoolSettings, config: OnceCell<Arc<PoolConfig>>, connector: C) -> Self {
        Self {
            settings,
            config,
            connector,
            inner: Mutex::new(Inner {
                state: ManagerState::Uninitialized,
                live: None,
                reconnects: 0,
                last_failure: None,
            }),
        }
    }

    /// Returns the validated pool configuration
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError::Configuration` when a required value is
    /// missing or out of range.
    pub fn config(&self) -> Result<Arc<PoolConfig>, DatabaseError> {
        self.config
            .get_or_try_init(|| {
                self.settings.to_config().map(Arc::new).map_err(|e| {
                    error!(error = %e, "Invalid database configuration");
                    e
                })
            })
            .cloned()
    }

    /// Borrows the connector (tests use it to inject faults)
    pub fn connector(&self) -> &C {
        &self.connector
    }

    /// Acquires a session from the live transport
    ///
    /// Opens the transport on first use and pings the checked-out session
    /// on every call. When the session cannot reach the server the transport
    /// is re-established once and the acquisition repeated on the new one.
    ///
    /// # Errors
    ///
    /// - `Configuration` if the settings are incomplete (not retried)
    /// - `ConnectionUnavailable` once the retry budget is exhausted
    /// - `Shutdown` after [`shutdown`](Self::shutdown)
    /// - `PoolExhausted` if no session frees up within the acquire timeout;
    ///   the transport is kept
    pub async fn get_connection(&self) -> Result<ConnectionHandle<SessionOf<C>>, DatabaseError> {
        let config = self.config()?;
        let mut live = self.current_transport(&config).await?;
        let mut replaced = false;

        loop {
            match Self::checkout(&live).await {
                Ok(session) => {
                    return Ok(ConnectionHandle {
                        session,
                        transport_id: live.id,
                    })
                }
                Err(e) if !replaced && transport_lost(&e) => {
                    warn!(
                        identity = %config.identity(),
                        transport_id = %live.id,
                        error = %e,
                        "Liveness check failed, re-establishing transport"
                    );
                    live = self.establish(&config, Some(live.id)).await?;
                    replaced = true;
                }
                Err(e) => {
                    warn!(
                        identity = %config.identity(),
                        transport_id = %live.id,
                        error = %e,
                        "Failed to acquire session from transport"
                    );
                    return Err(e);
                }
            }
        }
    }

    /// Runs one unit of work on a scoped session
    ///
    /// The session is released when `work` completes, whether it succeeded
    /// or failed.
    pub async fn with_connection<F, T, E>(&self, work: F) -> Result<T, E>
    where
        F: for<'c> FnOnce(&'c mut ConnectionHandle<SessionOf<C>>) -> BoxFuture<'c, Result<T, E>>,
        E: From<DatabaseError>,
    {
        let mut handle = self.get_connection().await?;
        let result = work(&mut handle).await;
        drop(handle);
        result
    }

    /// Current lifecycle state
    pub async fn state(&self) -> ManagerState {
        self.inner.lock().await.state
    }

    /// Diagnostic snapshot; never exposes credentials
    pub async fn status(&self) -> ManagerStatus {
        let inner = self.inner.lock().await;
        ManagerStatus {
            state: inner.state,
            identity: self.config.get().map(|c| c.identity()),
            transport_id: inner.live.as_ref().map(|l| l.id),
            established_at: inner.live.as_ref().map(|l| l.established_at),
            reconnects: inner.reconnects,
        }
    }

    /// Closes the transport. Calling it again is a no-op.
    ///
    /// The manager is `Closed` as soon as this is called; the transport is
    /// then closed without holding the manager's lock, waiting for sessions
    /// still borrowed to be returned.
    pub async fn shutdown(&self) {
        let identity = self.identity_for_logs();
        let live = {
            let mut inner = self.inner.lock().await;
            if inner.state == ManagerState::Closed {
                debug!(%identity, "Connection manager already shut down");
                return;
            }
            inner.state = ManagerState::Closed;
            inner.live.take()
        };

        if let Some(live) = live {
            live.transport.close().await;
            info!(%identity, transport_id = %live.id, "Database transport closed");
        }
    }

    /// Returns a `Failed` or shut-down manager to `Uninitialized`
    ///
    /// Any live transport is closed first. The next acquisition starts a
    /// fresh establishment with a full retry budget.
    pub async fn reinitialize(&self) -> Result<(), DatabaseError> {
        let stale = {
            let mut inner = self.inner.lock().await;
            let stale = inner.live.take();
            if inner.state != ManagerState::Uninitialized {
                inner.state.transition(ManagerState::Closed)?;
                inner.state.transition(ManagerState::Uninitialized)?;
            }
            inner.last_failure = None;
            stale
        };

        if let Some(live) = stale {
            live.transport.close().await;
        }
        info!(identity = %self.identity_for_logs(), "Connection manager re-initialised");
        Ok(())
    }

    async fn current_transport(
        &self,
        config: &PoolConfig,
    ) -> Result<Live<C::Transport>, DatabaseError> {
        let current = {
            let inner = self.inner.lock().await;
            Self::ensure_usable(&inner, config)?;
            inner.live.clone()
        };

        match current {
            Some(live) => Ok(live),
            None => self.establish(config, None).await,
        }
    }

    /// Checks out a session and verifies it reaches the server
    async fn checkout(live: &Live<C::Transport>) -> Result<SessionOf<C>, DatabaseError> {
        let mut session = live.transport.acquire().await?;
        live.transport.ping(&mut session).await?;
        Ok(session)
    }

    /// Opens a new transport, replacing `stale` if it is still the live one
    async fn establish(
        &self,
        config: &PoolConfig,
        stale: Option<Uuid>,
    ) -> Result<Live<C::Transport>, DatabaseError> {
        let mut inner = self.inner.lock().await;
        Self::ensure_usable(&inner, config)?;
        let identity = config.identity();

        if let Some(live) = inner.live.take() {
            if Some(live.id) != stale {
                // established by another caller while we waited for the lock
                inner.live = Some(live.clone());
                return Ok(live);
            }
            inner.reconnects += 1;
            Self::retire(identity.clone(), live);
        }

        inner.state.transition(ManagerState::Connecting)?;

        let policy = config.retry;
        let mut attempt = 0;
        loop {
            attempt += 1;
            debug!(
                %identity,
                attempt,
                max_attempts = policy.max_attempts,
                "Connecting to database"
            );

            match self.connect_once(config).await {
                Ok(transport) => {
                    let live = Live {
                        id: Uuid::new_v4(),
                        transport: Arc::new(transport),
                        established_at: Utc::now(),
                    };
                    inner.state.transition(ManagerState::Ready)?;
                    inner.live = Some(live.clone());
                    inner.last_failure = None;
                    info!(
                        %identity,
                        transport_id = %live.id,
                        attempt,
                        "Database transport established"
                    );
                    return Ok(live);
                }
                Err(e) if e.is_transient() && policy.should_retry(attempt) => {
                    let delay = policy.delay_after_attempt(attempt);
                    warn!(
                        %identity,
                        attempt,
                        max_attempts = policy.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Database connection attempt failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) if e.is_transient() => {
                    let last_error = e.to_string();
                    error!(
                        %identity,
                        attempts = attempt,
                        error = %last_error,
                        "Database connection retries exhausted"
                    );
                    inner.state.transition(ManagerState::Failed)?;
                    inner.last_failure = Some((attempt, last_error.clone()));
                    return Err(DatabaseError::ConnectionUnavailable {
                        identity,
                        attempts: attempt,
                        last_error,
                    });
                }
                Err(e) => {
                    error!(
                        %identity,
                        attempt,
                        error = %e,
                        "Database connection failed with a non-retryable error"
                    );
                    inner.state.transition(ManagerState::Uninitialized)?;
                    return Err(e);
                }
            }
        }
    }

    /// One connection attempt, cut off after the connect timeout
    async fn connect_once(&self, config: &PoolConfig) -> Result<C::Transport, DatabaseError> {
        match tokio::time::timeout(config.connect_timeout, self.connector.connect(config)).await {
            Ok(result) => result,
            Err(_) => Err(DatabaseError::ConnectionFailed(format!(
                "connection attempt timed out after {}ms",
                config.connect_timeout.as_millis()
            ))),
        }
    }

    /// Closes a replaced transport in the background
    fn retire(identity: String, live: Live<C::Transport>) {
        tokio::spawn(async move {
            live.transport.close().await;
            info!(%identity, transport_id = %live.id, "Closed stale transport");
        });
    }

    fn ensure_usable(
        inner: &Inner<C::Transport>,
        config: &PoolConfig,
    ) -> Result<(), DatabaseError> {
        match inner.state {
            ManagerState::Failed => {
                let (attempts, last_error) = inner
                    .last_failure
                    .clone()
                    .unwrap_or_else(|| {
                        (config.retry.max_attempts, "retries exhausted".to_string())
                    });
                Err(DatabaseError::ConnectionUnavailable {
                    identity: config.identity(),
                    attempts,
                    last_error,
                })
            }
            ManagerState::Closed => Err(DatabaseError::Shutdown(config.identity())),
            _ => Ok(()),
        }
    }

    fn identity_for_logs(&self) -> String {
        self.config
            .get()
            .map(|c| c.identity())
            .unwrap_or_else(|| "<unconfigured>".to_string())
    }
}

impl ConnectionManager<PgConnector> {
    /// Creates a PostgreSQL manager; nothing is opened until first use
    pub fn init(settings: PoolSettings) -> Self {
        Self::new(settings, PgConnector)
    }

    /// Creates a PostgreSQL manager from `DB_*` environment variables
    pub fn from_env() -> Result<Self, DatabaseError> {
        Ok(Self::init(PoolSettings::from_env()?))
    }

    /// Runs `work` inside a transaction
    ///
    /// Commits when `work` returns `Ok`, rolls back when it returns `Err`.
    /// A transaction dropped mid-flight (cancelled caller, panic) is rolled
    /// back by the driver when the connection goes back to the pool.
    pub async fn with_transaction<F, T, E>(&self, work: F) -> Result<T, E>
    where
        F: for<'c> FnOnce(&'c mut PgConnection) -> BoxFuture<'c, Result<T, E>>,
        E: From<DatabaseError>,
    {
        let mut handle = self.get_connection().await?;
        let transport_id = handle.transport_id();
        let mut tx = sqlx::Connection::begin(&mut **handle)
            .await
            .map_err(|e| DatabaseError::TransactionFailed(e.to_string()))?;

        match work(&mut *tx).await {
            Ok(value) => {
                tx.commit()
                    .await
                    .map_err(|e| DatabaseError::TransactionFailed(e.to_string()))?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback) = tx.rollback().await {
                    warn!(
                        %transport_id,
                        error = %rollback,
                        "Transaction rollback failed"
                    );
                }
                Err(err)
            }
        }
    }

    /// Executes a statement on an auto-acquired session, returning rows affected
    pub async fn execute(&self, sql: &str) -> Result<u64, DatabaseError> {
        self.execute_with(sqlx::query(sql)).await
    }

    /// Executes a statement with bound parameters, returning rows affected
    ///
    /// ```rust,ignore
    /// let rows = manager
    ///     .execute_with(sqlx::query("DELETE FROM runs WHERE id = $1").bind(run_id))
    ///     .await?;
    /// ```
    pub async fn execute_with<'q>(
        &self,
        query: Query<'q, Postgres, PgArguments>,
    ) -> Result<u64, DatabaseError> {
        let mut handle = self.get_connection().await?;
        let result = query.execute(&mut **handle).await?;

        debug!(rows_affected = result.rows_affected(), "Statement executed");
        Ok(result.rows_affected())
    }

    /// Runs a typed query with bound parameters and collects every row
    pub async fn fetch_all<'q, O>(
        &self,
        query: QueryAs<'q, Postgres, O, PgArguments>,
    ) -> Result<Vec<O>, DatabaseError>
    where
        O: Send + Unpin + for<'r> FromRow<'r, PgRow>,
    {
        let mut handle = self.get_connection().await?;
        let rows = query.fetch_all(&mut **handle).await?;

        debug!(rows = rows.len(), "Query returned rows");
        Ok(rows)
    }

    /// Runs a typed query and returns its first row, if any
    ///
    /// Suits `INSERT ... RETURNING` as well as lookups.
    pub async fn fetch_optional<'q, O>(
        &self,
        query: QueryAs<'q, Postgres, O, PgArguments>,
    ) -> Result<Option<O>, DatabaseError>
    where
        O: Send + Unpin + for<'r> FromRow<'r, PgRow>,
    {
        let mut handle = self.get_connection().await?;
        Ok(query.fetch_optional(&mut **handle).await?)
    }
}

/// Errors meaning the transport can no longer reach the server
fn transport_lost(error: &DatabaseError) -> bool {
    matches!(
        error,
        DatabaseError::HealthCheckFailed(_) | DatabaseError::ConnectionFailed(_)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_configuration_fails_at_first_acquisition() {
        let manager = ConnectionManager::init(PoolSettings::default());

        let err = manager.get_connection().await.unwrap_err();

        assert!(err.is_configuration_error());
        assert_eq!(manager.state().await, ManagerState::Uninitialized);
    }

    #[tokio::test]
    async fn test_shutdown_is_idempotent_without_transport() {
        let config = PoolConfig::new("localhost", "u", "d");
        let manager = ConnectionManager::with_config(config, PgConnector);

        manager.shutdown().await;
        manager.shutdown().await;

        assert_eq!(manager.state().await, ManagerState::Closed);
        assert!(matches!(
            manager.get_connection().await,
            Err(DatabaseError::Shutdown(_))
        ));
    }

    #[tokio::test]
    async fn test_status_reports_identity_without_password() {
        let config = PoolConfig::new("db", "cipuser", "cipdb").password("hunter2");
        let manager = ConnectionManager::with_config(config, PgConnector);

        let status = manager.status().await;
        let rendered = format!("{:?}", status);

        assert_eq!(status.identity.as_deref(), Some("cipuser@db:5432/cipdb"));
        assert_eq!(status.transport_id, None);
        assert!(!rendered.contains("hunter2"));
    }

    #[test]
    fn test_exhausted_pool_keeps_transport() {
        assert!(!transport_lost(&DatabaseError::PoolExhausted));
        assert!(!transport_lost(&DatabaseError::QueryFailed("syntax".into())));
        assert!(transport_lost(&DatabaseError::HealthCheckFailed("eof".into())));
        assert!(transport_lost(&DatabaseError::ConnectionFailed("pool closed".into())));
    }
}
