//! Common Database Layer
//!
//! This crate provides the shared, fault-tolerant PostgreSQL access used by
//! every service script: one lazily opened, health-checked, reused transport
//! per configuration, with bounded retry on transient connect failures.
//!
//! # Architecture
//!
//! - [`config`]: raw `DB_*` settings and the validated, immutable [`PoolConfig`]
//! - [`retry`]: bounded attempts with exponential backoff
//! - [`state`]: the manager's lifecycle state machine
//! - [`transport`]: the seam to the driver; [`PgConnector`] opens a SQLx pool
//! - [`manager`]: [`ConnectionManager`], scoped acquisition and teardown
//!
//! # Example
//!
//! ```rust,ignore
//! use common_db::ConnectionManager;
//!
//! let manager = ConnectionManager::from_env()?;
//! let mut conn = manager.get_connection().await?;
//! sqlx::query("SELECT 1").execute(&mut **conn).await?;
//! drop(conn);
//! manager.shutdown().await;
//! ```

pub mod config;
pub mod error;
pub mod manager;
pub mod retry;
pub mod state;
pub mod transport;

pub use config::{PoolConfig, PoolSettings};
pub use error::DatabaseError;
pub use manager::{BoxFuture, ConnectionHandle, ConnectionManager, ManagerStatus, SessionOf};
pub use retry::{BackoffStrategy, RetryPolicy};
pub use state::ManagerState;
pub use transport::{Connector, PgConnector, Transport};
