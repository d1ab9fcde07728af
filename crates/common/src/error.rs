//! Facade error type

use common_db::DatabaseError;
use common_time::TimestampError;
use thiserror::Error;

/// Errors surfaced through the [`Common`](crate::Common) facade
#[derive(Debug, Error)]
pub enum CommonError {
    #[error(transparent)]
    Database(#[from] DatabaseError),

    #[error(transparent)]
    Timestamp(#[from] TimestampError),

    /// Settings that are not database settings (environment, logging)
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl CommonError {
    /// Returns true for any misconfiguration, whichever layer detected it
    pub fn is_configuration_error(&self) -> bool {
        match self {
            CommonError::Configuration(_) => true,
            CommonError::Database(e) => e.is_configuration_error(),
            CommonError::Timestamp(_) => false,
        }
    }
}

impl From<config::ConfigError> for CommonError {
    fn from(error: config::ConfigError) -> Self {
        CommonError::Configuration(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common_time::to_timestamp;

    #[test]
    fn test_configuration_detected_through_database_layer() {
        let missing = DatabaseError::configuration("required variable DB_HOST is not set");
        let error = CommonError::from(missing);

        assert!(error.is_configuration_error());
        assert!(error.to_string().contains("DB_HOST"));
    }

    #[test]
    fn test_timestamp_error_is_not_configuration() {
        let error = CommonError::from(to_timestamp(f64::NAN).unwrap_err());

        assert!(!error.is_configuration_error());
        assert!(matches!(error, CommonError::Timestamp(_)));
    }
}
