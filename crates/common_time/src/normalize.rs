//! Timestamp normalization
//!
//! Payloads from devices and services carry timestamps as epoch seconds,
//! epoch milliseconds, floats, numeric strings or date/time text, and database
//! rows hand back chrono values. [`to_timestamp`] folds all of them into one
//! [`CanonicalTimestamp`] in UTC.
//!
//! Text is read as a number first; anything else goes through
//! [`parse_datetime`](crate::parse::parse_datetime). Naive values, textual or
//! chrono, are taken to be UTC.
//!
//! # Unit policy
//!
//! The unit is inferred from magnitude. Any value whose absolute value is at
//! most [`SECONDS_MAGNITUDE_LIMIT`] (10^12) is read as seconds; anything larger
//! is read as milliseconds and divided by 1000. 10^12 seconds lies roughly
//! 31,000 years in the future, while 10^12 milliseconds is September 2001, so
//! every realistic millisecond timestamp lands above the cut and every
//! realistic second timestamp lands below it. This is a policy, not a
//! standard: seconds values beyond year ~33,600 and millisecond values before
//! 2001 are misread.
//!
//! # Precision
//!
//! Integer inputs are exact. Float inputs are rounded to the nearest
//! microsecond before conversion.

use chrono::DateTime;

use crate::error::{InvalidReason, TimestampError};
use crate::parse::parse_datetime;
use crate::timestamp::{CanonicalTimestamp, TimestampValue};

/// Largest magnitude still interpreted as epoch seconds
pub const SECONDS_MAGNITUDE_LIMIT: i64 = 1_000_000_000_000;

const MILLIS_PER_SECOND: f64 = 1_000.0;
const MICROS_PER_SECOND: i64 = 1_000_000;

/// Converts an epoch value into a canonical UTC timestamp
///
/// # Errors
///
/// Returns [`TimestampError::InvalidTimestamp`] when the value is of a kind
/// that cannot hold a time, is `NaN` or infinite, is text that is neither a
/// number nor a date/time, or lies outside the representable date range.
///
/// # Example
///
/// ```rust
/// use common_time::to_timestamp;
///
/// let ts = to_timestamp(1690000000).unwrap();
/// assert_eq!(ts.to_string(), "2023-07-22T04:26:40Z");
///
/// // milliseconds are recognised by magnitude
/// assert_eq!(to_timestamp(1690000000000i64).unwrap(), ts);
/// assert_eq!(to_timestamp("2023-07-22T11:26:40+07:00").unwrap(), ts);
/// ```
pub fn to_timestamp<V: Into<TimestampValue>>(
    value: V,
) -> Result<CanonicalTimestamp, TimestampError> {
    match value.into() {
        TimestampValue::Integer(v) => from_integer(v),
        TimestampValue::Float(v) => from_float(v),
        TimestampValue::Text(text) => from_text(&text),
        TimestampValue::Instant(instant) => Ok(CanonicalTimestamp::new(instant)),
        TimestampValue::Naive(naive) => Ok(CanonicalTimestamp::new(naive.and_utc())),
        TimestampValue::Unsupported(kind) => Err(TimestampError::invalid(
            format!("<{}>", kind),
            InvalidReason::NotNumeric,
        )),
    }
}

/// Like [`to_timestamp`], passing an absent value through as `None`
///
/// Present values that fail to convert still produce an error.
pub fn to_timestamp_opt<V: Into<TimestampValue>>(
    value: Option<V>,
) -> Result<Option<CanonicalTimestamp>, TimestampError> {
    value.map(to_timestamp).transpose()
}

/// Whole seconds elapsed from `from` to `to` (negative when `to` is earlier)
///
/// Sub-second remainders are truncated toward zero.
pub fn ts_gap<A, B>(from: A, to: B) -> Result<i64, TimestampError>
where
    A: Into<TimestampValue>,
    B: Into<TimestampValue>,
{
    let from = to_timestamp(from)?;
    let to = to_timestamp(to)?;
    Ok((to.as_datetime() - from.as_datetime()).num_seconds())
}

/// Returns true when a value of this magnitude is read as milliseconds
pub fn is_millisecond_magnitude(value: f64) -> bool {
    value.abs() > SECONDS_MAGNITUDE_LIMIT as f64
}

fn from_integer(value: i64) -> Result<CanonicalTimestamp, TimestampError> {
    let instant = if value.unsigned_abs() > SECONDS_MAGNITUDE_LIMIT as u64 {
        DateTime::from_timestamp_millis(value)
    } else {
        DateTime::from_timestamp(value, 0)
    };

    instant
        .map(CanonicalTimestamp::new)
        .ok_or_else(|| TimestampError::invalid(value, InvalidReason::OutOfRange))
}

fn from_float(value: f64) -> Result<CanonicalTimestamp, TimestampError> {
    if !value.is_finite() {
        return Err(TimestampError::invalid(value, InvalidReason::NotFinite));
    }

    let seconds = if is_millisecond_magnitude(value) {
        value / MILLIS_PER_SECOND
    } else {
        value
    };

    let micros = (seconds * MICROS_PER_SECOND as f64).round();
    if micros >= i64::MAX as f64 || micros <= i64::MIN as f64 {
        return Err(TimestampError::invalid(value, InvalidReason::OutOfRange));
    }

    let micros = micros as i64;
    let secs = micros.div_euclid(MICROS_PER_SECOND);
    let nanos = (micros.rem_euclid(MICROS_PER_SECOND) * 1_000) as u32;

    DateTime::from_timestamp(secs, nanos)
        .map(CanonicalTimestamp::new)
        .ok_or_else(|| TimestampError::invalid(value, InvalidReason::OutOfRange))
}

fn from_text(text: &str) -> Result<CanonicalTimestamp, TimestampError> {
    let trimmed = text.trim();

    if let Ok(v) = trimmed.parse::<i64>() {
        return from_integer(v);
    }
    match trimmed.parse::<f64>() {
        Ok(v) => from_float(v),
        Err(_) => parse_datetime(text),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Timelike, Utc};

    #[test]
    fn test_seconds_reference_instant() {
        let ts = to_timestamp(1690000000).unwrap();

        assert_eq!(ts.as_datetime(), Utc.with_ymd_and_hms(2023, 7, 22, 4, 26, 40).unwrap());
    }

    #[test]
    fn test_threshold_boundary_is_seconds() {
        let ts = to_timestamp(SECONDS_MAGNITUDE_LIMIT).unwrap();
        assert_eq!(ts.epoch_seconds(), SECONDS_MAGNITUDE_LIMIT);

        let ts = to_timestamp(SECONDS_MAGNITUDE_LIMIT + 1).unwrap();
        assert_eq!(ts.epoch_millis(), SECONDS_MAGNITUDE_LIMIT + 1);
    }

    #[test]
    fn test_float_keeps_microseconds() {
        let ts = to_timestamp(1690000000.25).unwrap();

        assert_eq!(ts.epoch_seconds(), 1690000000);
        assert_eq!(ts.as_datetime().nanosecond(), 250_000_000);
    }

    #[test]
    fn test_negative_float_rounds_down_correctly() {
        let ts = to_timestamp(-1.5).unwrap();

        assert_eq!(ts.epoch_seconds(), -2);
        assert_eq!(ts.as_datetime().nanosecond(), 500_000_000);
    }

    #[test]
    fn test_text_is_number_or_datetime() {
        let err = to_timestamp("yesterday").unwrap_err();
        assert_eq!(err.reason(), InvalidReason::Unparseable);

        assert_eq!(to_timestamp(" 1690000000 ").unwrap().epoch_seconds(), 1690000000);
        assert_eq!(to_timestamp("2023-07-22T04:26:40Z").unwrap().epoch_seconds(), 1690000000);
    }

    #[test]
    fn test_naive_datetime_is_utc() {
        let naive = Utc
            .with_ymd_and_hms(2023, 7, 22, 4, 26, 40)
            .unwrap()
            .naive_utc();

        assert_eq!(to_timestamp(naive).unwrap().epoch_seconds(), 1690000000);
    }

    #[test]
    fn test_huge_millis_out_of_range() {
        let err = to_timestamp(i64::MAX).unwrap_err();
        assert_eq!(err.reason(), InvalidReason::OutOfRange);
    }
}
