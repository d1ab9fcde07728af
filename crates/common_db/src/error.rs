//! Database error types
//!
//! This module defines the errors raised by the connection layer. Messages
//! carry the connection identity (`user@host:port/db`) and attempt counts,
//! never the password.

use thiserror::Error;

/// Errors that can occur while configuring, establishing or using a connection
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// A required connection parameter is missing or invalid. Never retried.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A single connection attempt failed; may succeed on retry
    #[error("Failed to connect to database: {0}")]
    ConnectionFailed(String),

    /// The retry budget was exhausted without establishing a transport
    #[error("Database {identity} unavailable after {attempts} attempt(s): {last_error}")]
    ConnectionUnavailable {
        identity: String,
        attempts: u32,
        last_error: String,
    },

    /// The liveness check against an established transport failed
    #[error("Health check failed: {0}")]
    HealthCheckFailed(String),

    /// The manager was shut down and must be re-initialised before use
    #[error("Connection manager for {0} has been shut down")]
    Shutdown(String),

    /// A lifecycle transition that the state machine does not allow
    #[error("Invalid state transition: {0}")]
    InvalidStateTransition(String),

    /// Query execution failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Transaction error
    #[error("Transaction failed: {0}")]
    TransactionFailed(String),

    /// Pool exhaustion - no available connections
    #[error("Connection pool exhausted")]
    PoolExhausted,
}

impl DatabaseError {
    pub fn configuration(message: impl Into<String>) -> Self {
        DatabaseError::Configuration(message.into())
    }

    pub fn invalid_state(message: impl Into<String>) -> Self {
        DatabaseError::InvalidStateTransition(message.into())
    }

    /// Classifies an error raised while opening a connection
    ///
    /// Authentication failures (SQLSTATE class 28), unknown databases
    /// (3D000) and client-side configuration problems are fatal; everything
    /// else (refused sockets, timeouts, "starting up") is treated as transient.
    pub fn from_connect_error(error: &sqlx::Error) -> Self {
        match error {
            sqlx::Error::Configuration(e) => DatabaseError::Configuration(e.to_string()),
            sqlx::Error::Database(db_err) => match db_err.code().as_deref() {
                Some(code) if code.starts_with("28") || code == "3D000" => {
                    DatabaseError::Configuration(db_err.message().to_string())
                }
                _ => DatabaseError::ConnectionFailed(db_err.message().to_string()),
            },
            _ => DatabaseError::ConnectionFailed(error.to_string()),
        }
    }

    /// Returns true if the connection layer should retry after this error
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            DatabaseError::ConnectionFailed(_)
                | DatabaseError::HealthCheckFailed(_)
                | DatabaseError::PoolExhausted
        )
    }

    /// Returns true for errors produced by misconfiguration
    pub fn is_configuration_error(&self) -> bool {
        matches!(self, DatabaseError::Configuration(_))
    }

    /// Checks if this error is a connection-related issue
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            DatabaseError::ConnectionFailed(_)
                | DatabaseError::ConnectionUnavailable { .. }
                | DatabaseError::HealthCheckFailed(_)
                | DatabaseError::Shutdown(_)
                | DatabaseError::PoolExhausted
        )
    }
}

/// Maps errors raised while using an established pool
impl From<&sqlx::Error> for DatabaseError {
    fn from(error: &sqlx::Error) -> Self {
        match error {
            sqlx::Error::PoolTimedOut => DatabaseError::PoolExhausted,
            sqlx::Error::PoolClosed => DatabaseError::ConnectionFailed("pool closed".to_string()),
            sqlx::Error::Io(e) => DatabaseError::ConnectionFailed(e.to_string()),
            sqlx::Error::Database(db_err) => {
                let message = db_err.message().to_string();
                match db_err.code().as_deref() {
                    // connection_exception and admin/crash shutdown
                    Some(code) if code.starts_with("08") || code.starts_with("57P0") => {
                        DatabaseError::ConnectionFailed(message)
                    }
                    _ => DatabaseError::QueryFailed(message),
                }
            }
            _ => DatabaseError::QueryFailed(error.to_string()),
        }
    }
}

impl From<sqlx::Error> for DatabaseError {
    fn from(error: sqlx::Error) -> Self {
        DatabaseError::from(&error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(DatabaseError::ConnectionFailed("refused".into()).is_transient());
        assert!(DatabaseError::PoolExhausted.is_transient());
        assert!(!DatabaseError::configuration("missing DB_HOST").is_transient());
        assert!(!DatabaseError::Shutdown("app@db:5432/cip".into()).is_transient());
    }

    #[test]
    fn test_unavailable_message_carries_context() {
        let error = DatabaseError::ConnectionUnavailable {
            identity: "cipuser@db:5432/cipdb".to_string(),
            attempts: 5,
            last_error: "connection refused".to_string(),
        };
        let message = error.to_string();

        assert!(message.contains("cipuser@db:5432/cipdb"));
        assert!(message.contains("5 attempt"));
        assert!(error.is_connection_error());
    }

    #[test]
    fn test_connect_error_configuration_is_fatal() {
        let bad_url = sqlx::Error::Configuration("bad url".into());
        let error = DatabaseError::from_connect_error(&bad_url);
        assert!(error.is_configuration_error());
    }

    #[test]
    fn test_connect_error_io_is_transient() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let error = DatabaseError::from_connect_error(&sqlx::Error::Io(io));
        assert!(error.is_transient());
    }

    #[test]
    fn test_pool_timeout_maps_to_exhausted() {
        assert!(matches!(
            DatabaseError::from(&sqlx::Error::PoolTimedOut),
            DatabaseError::PoolExhausted
        ));
    }

    #[test]
    fn test_owned_errors_share_classification() {
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "broken pipe");

        let dropped = DatabaseError::from(sqlx::Error::Io(io));
        let timed_out = DatabaseError::from(sqlx::Error::PoolTimedOut);
        let closed = DatabaseError::from(sqlx::Error::PoolClosed);

        assert!(dropped.is_connection_error());
        assert!(matches!(timed_out, DatabaseError::PoolExhausted));
        assert!(closed.is_connection_error());
    }

    #[test]
    fn test_row_errors_are_query_failures() {
        let error = DatabaseError::from(sqlx::Error::RowNotFound);

        assert!(matches!(error, DatabaseError::QueryFailed(_)));
        assert!(!error.is_transient());
    }
}
