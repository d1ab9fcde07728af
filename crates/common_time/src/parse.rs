//! Date/time text parsing
//!
//! Accepts RFC 3339 and the usual ISO-8601 variants found in CSV exports and
//! database dumps. Text without an offset is taken to be UTC, so the result
//! is never naive.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};

use crate::error::{InvalidReason, TimestampError};
use crate::timestamp::CanonicalTimestamp;

const OFFSET_LAYOUTS: &[&str] = &["%Y-%m-%d %H:%M:%S%.f%:z", "%Y-%m-%d %H:%M:%S%.f%#z"];

const NAIVE_LAYOUTS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// Parses date/time text into a canonical UTC timestamp
///
/// Tried in order: RFC 3339, space-separated with offset, naive date-time
/// (assumed UTC), bare date (midnight UTC).
///
/// # Errors
///
/// Returns [`TimestampError::InvalidTimestamp`] with
/// [`InvalidReason::Unparseable`] when no layout matches.
pub fn parse_datetime(text: &str) -> Result<CanonicalTimestamp, TimestampError> {
    let trimmed = text.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(CanonicalTimestamp::new(dt.with_timezone(&Utc)));
    }

    for layout in OFFSET_LAYOUTS {
        if let Ok(dt) = DateTime::parse_from_str(trimmed, layout) {
            return Ok(CanonicalTimestamp::new(dt.with_timezone(&Utc)));
        }
    }

    for layout in NAIVE_LAYOUTS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, layout) {
            return Ok(CanonicalTimestamp::new(Utc.from_utc_datetime(&naive)));
        }
    }

    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| CanonicalTimestamp::new(Utc.from_utc_datetime(&naive)))
        .ok_or_else(|| TimestampError::invalid(text, InvalidReason::Unparseable))
}
