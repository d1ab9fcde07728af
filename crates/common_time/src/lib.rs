//! Common Time - canonical timestamps for every service
//!
//! Devices, brokers and databases disagree on how to write down "when":
//! epoch seconds, epoch milliseconds, floats, numeric strings, ISO text.
//! This crate turns all of them into a single UTC-aware
//! [`CanonicalTimestamp`]:
//!
//! - [`to_timestamp`]: numeric input (seconds or milliseconds, by magnitude),
//!   date/time text and chrono values
//! - [`parse_datetime`]: RFC 3339 / ISO-8601 text, naive text assumed UTC
//! - [`ts_gap`]: whole seconds between two inputs
//!
//! All functions are pure and need no synchronization.

pub mod error;
pub mod normalize;
pub mod parse;
pub mod timestamp;

pub use error::{InvalidReason, TimestampError};
pub use normalize::{to_timestamp, to_timestamp_opt, ts_gap, SECONDS_MAGNITUDE_LIMIT};
pub use parse::parse_datetime;
pub use timestamp::{CanonicalTimestamp, TimestampValue};
