//! Transport seam between the connection manager and the database driver
//!
//! The manager owns lifecycle, retries and health bookkeeping; a
//! [`Connector`] knows how to open one underlying [`Transport`] (for
//! PostgreSQL, a SQLx pool), and the transport hands out per-use sessions.
//! Tests plug in an in-memory connector to simulate outages.

use async_trait::async_trait;
use sqlx::pool::PoolConnection;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Connection, Postgres};
use tracing::debug;

use crate::config::PoolConfig;
use crate::error::DatabaseError;

/// Opens the underlying transport for a configuration
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    type Transport: Transport;

    /// One establishment attempt; retries are the manager's business
    async fn connect(&self, config: &PoolConfig) -> Result<Self::Transport, DatabaseError>;
}

/// A live transport that hands out per-use sessions
///
/// Dropping a session must release its per-use resources (return it to the
/// pool, close its cursor) without closing the transport.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    type Session: Send;

    /// Checks out a session for one unit of work
    ///
    /// A full pool must be reported as `DatabaseError::PoolExhausted`, which
    /// the manager passes to the caller without touching the transport.
    async fn acquire(&self) -> Result<Self::Session, DatabaseError>;

    /// Lightweight liveness check on a checked-out session
    async fn ping(&self, session: &mut Self::Session) -> Result<(), DatabaseError>;

    /// Closes the transport, waiting for borrowed sessions to be returned
    async fn close(&self);

    fn is_closed(&self) -> bool;
}

/// Connector for PostgreSQL backed by a SQLx connection pool
#[derive(Debug, Clone, Copy, Default)]
pub struct PgConnector;

#[async_trait]
impl Connector for PgConnector {
    type Transport = PgPool;

    async fn connect(&self, config: &PoolConfig) -> Result<PgPool, DatabaseError> {
        debug!(
            identity = %config.identity(),
            max_connections = config.max_connections,
            min_connections = config.min_connections,
            "Opening PostgreSQL pool"
        );

        PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.acquire_timeout)
            .test_before_acquire(true)
            .connect_with(config.connect_options())
            .await
            .map_err(|e| DatabaseError::from_connect_error(&e))
    }
}

#[async_trait]
impl Transport for PgPool {
    type Session = PoolConnection<Postgres>;

    async fn acquire(&self) -> Result<Self::Session, DatabaseError> {
        PgPool::acquire(self).await.map_err(DatabaseError::from)
    }

    async fn ping(&self, session: &mut Self::Session) -> Result<(), DatabaseError> {
        session
            .ping()
            .await
            .map_err(|e| DatabaseError::HealthCheckFailed(e.to_string()))
    }

    async fn close(&self) {
        PgPool::close(self).await;
    }

    fn is_closed(&self) -> bool {
        PgPool::is_closed(self)
    }
}
