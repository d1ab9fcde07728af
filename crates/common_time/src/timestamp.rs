//! Canonical timestamp value and the inputs the normalizer accepts

use std::fmt;

use chrono::{DateTime, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

/// A timezone-aware instant, always designated UTC
///
/// This is the single representation every consumer stores and compares.
/// It is a plain value: two timestamps built from the same input are equal
/// and interchangeable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CanonicalTimestamp(DateTime<Utc>);

impl CanonicalTimestamp {
    pub fn new(instant: DateTime<Utc>) -> Self {
        Self(instant)
    }

    /// Returns the underlying UTC datetime
    pub fn as_datetime(&self) -> DateTime<Utc> {
        self.0
    }

    /// Whole seconds since the Unix epoch
    pub fn epoch_seconds(&self) -> i64 {
        self.0.timestamp()
    }

    /// Milliseconds since the Unix epoch
    pub fn epoch_millis(&self) -> i64 {
        self.0.timestamp_millis()
    }

    /// Renders the same instant in another zone (e.g. a plant's local time)
    ///
    /// The canonical value is untouched; only the wall-clock view changes.
    pub fn in_timezone(&self, tz: Tz) -> DateTime<Tz> {
        self.0.with_timezone(&tz)
    }

    /// RFC 3339 rendering with a `Z` designator
    pub fn to_rfc3339(&self) -> String {
        self.0.to_rfc3339_opts(SecondsFormat::AutoSi, true)
    }
}

impl From<DateTime<Utc>> for CanonicalTimestamp {
    fn from(instant: DateTime<Utc>) -> Self {
        Self(instant)
    }
}

impl From<CanonicalTimestamp> for DateTime<Utc> {
    fn from(ts: CanonicalTimestamp) -> Self {
        ts.0
    }
}

impl fmt::Display for CanonicalTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_rfc3339())
    }
}

/// Raw timestamp input as it arrives from payloads and database rows
#[derive(Debug, Clone, PartialEq)]
pub enum TimestampValue {
    Integer(i64),
    Float(f64),
    /// Text holding a number (`"1690000000"`) or a date/time (`"2023-07-22T04:26:40Z"`)
    Text(String),
    /// An instant that already carries its zone, converted to UTC
    Instant(DateTime<Utc>),
    /// A wall-clock value without a zone, e.g. a `timestamp` column; taken as UTC
    Naive(NaiveDateTime),
    /// A value of a kind that can never be a timestamp (bool, array, object...)
    Unsupported(&'static str),
}

impl fmt::Display for TimestampValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer(v) => write!(f, "{}", v),
            Self::Float(v) => write!(f, "{}", v),
            Self::Text(v) => f.write_str(v),
            Self::Instant(v) => write!(f, "{}", v.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
            Self::Naive(v) => write!(f, "{}", v),
            Self::Unsupported(kind) => write!(f, "<{}>", kind),
        }
    }
}

impl From<i64> for TimestampValue {
    fn from(v: i64) -> Self {
        Self::Integer(v)
    }
}

impl From<i32> for TimestampValue {
    fn from(v: i32) -> Self {
        Self::Integer(v.into())
    }
}

impl From<u32> for TimestampValue {
    fn from(v: u32) -> Self {
        Self::Integer(v.into())
    }
}

impl From<u64> for TimestampValue {
    fn from(v: u64) -> Self {
        match i64::try_from(v) {
            Ok(v) => Self::Integer(v),
            Err(_) => Self::Float(v as f64),
        }
    }
}

impl From<f64> for TimestampValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<f32> for TimestampValue {
    fn from(v: f32) -> Self {
        Self::Float(v.into())
    }
}

impl From<&str> for TimestampValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for TimestampValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl<Z: TimeZone> From<DateTime<Z>> for TimestampValue {
    fn from(v: DateTime<Z>) -> Self {
        Self::Instant(v.with_timezone(&Utc))
    }
}

impl From<NaiveDateTime> for TimestampValue {
    fn from(v: NaiveDateTime) -> Self {
        Self::Naive(v)
    }
}

impl From<CanonicalTimestamp> for TimestampValue {
    fn from(v: CanonicalTimestamp) -> Self {
        Self::Instant(v.as_datetime())
    }
}

impl From<&serde_json::Value> for TimestampValue {
    fn from(value: &serde_json::Value) -> Self {
        use serde_json::Value;

        match value {
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Self::Integer(i)
                } else if let Some(u) = n.as_u64() {
                    Self::from(u)
                } else {
                    // as_f64 is always Some for a non-integer Number
                    Self::Float(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            Value::String(s) => Self::Text(s.clone()),
            Value::Null => Self::Unsupported("null"),
            Value::Bool(_) => Self::Unsupported("bool"),
            Value::Array(_) => Self::Unsupported("array"),
            Value::Object(_) => Self::Unsupported("object"),
        }
    }
}

impl From<serde_json::Value> for TimestampValue {
    fn from(value: serde_json::Value) -> Self {
        Self::from(&value)
    }
}
