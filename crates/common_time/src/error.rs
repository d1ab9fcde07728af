//! Timestamp error types

use std::fmt;
use thiserror::Error;

/// Why a value could not be turned into a canonical timestamp
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidReason {
    /// The value is of a kind that cannot hold a time (a boolean, a JSON object)
    NotNumeric,
    /// The value is `NaN` or infinite
    NotFinite,
    /// The value is numeric but lies outside the representable date range
    OutOfRange,
    /// The text is neither a number nor a recognised date/time layout
    Unparseable,
}

impl fmt::Display for InvalidReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotNumeric => write!(f, "value is not numeric"),
            Self::NotFinite => write!(f, "value is not finite"),
            Self::OutOfRange => write!(f, "value is outside the representable date range"),
            Self::Unparseable => write!(f, "text is not a recognised date/time"),
        }
    }
}

/// Errors raised by the timestamp normalizer
///
/// Normalization is a pure function, so none of these are worth retrying:
/// the same input will always fail the same way.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TimestampError {
    #[error("Invalid timestamp {input:?}: {reason}")]
    InvalidTimestamp {
        /// Rendering of the rejected input
        input: String,
        reason: InvalidReason,
    },
}

impl TimestampError {
    pub fn invalid(input: impl fmt::Display, reason: InvalidReason) -> Self {
        TimestampError::InvalidTimestamp {
            input: input.to_string(),
            reason,
        }
    }

    /// Returns the rejection reason
    pub fn reason(&self) -> InvalidReason {
        match self {
            TimestampError::InvalidTimestamp { reason, .. } => *reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_includes_input_and_reason() {
        let error = TimestampError::invalid("abc", InvalidReason::NotNumeric);

        assert_eq!(error.reason(), InvalidReason::NotNumeric);
        assert!(error.to_string().contains("\"abc\""));
        assert!(error.to_string().contains("not numeric"));
    }
}
