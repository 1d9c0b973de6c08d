//! The remote store's native timestamp type.
//!
//! Documents carry dates as `{"seconds": .., "nanoseconds": ..}` objects.
//! Records carry them as `chrono::DateTime<Utc>`. Conversion happens at the
//! schema boundary, never inside the services.

use crate::{error::Result, Error};
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

const NANOS_PER_SECOND: u32 = 1_000_000_000;

/// A point in time as stored by the remote document store.
///
/// Ordering is by seconds, then nanoseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreTimestamp {
    /// Whole seconds since the Unix epoch
    pub seconds: i64,
    /// Sub-second part, always below one billion
    pub nanoseconds: u32,
}

impl StoreTimestamp {
    /// Create a timestamp, rejecting out-of-range nanoseconds.
    pub fn new(seconds: i64, nanoseconds: u32) -> Result<Self> {
        if nanoseconds >= NANOS_PER_SECOND {
            return Err(Error::InvalidTimestamp(format!(
                "nanoseconds out of range: {}",
                nanoseconds
            )));
        }
        Ok(Self {
            seconds,
            nanoseconds,
        })
    }

    /// The current time.
    pub fn now() -> Self {
        Self::from_datetime(Utc::now())
    }

    pub fn from_datetime(date: DateTime<Utc>) -> Self {
        Self {
            seconds: date.timestamp(),
            nanoseconds: date.timestamp_subsec_nanos(),
        }
    }

    pub fn from_millis(millis: i64) -> Self {
        Self {
            seconds: millis.div_euclid(1000),
            nanoseconds: (millis.rem_euclid(1000) as u32) * 1_000_000,
        }
    }

    /// Convert back into a UTC date.
    pub fn to_datetime(&self) -> Result<DateTime<Utc>> {
        if self.nanoseconds >= NANOS_PER_SECOND {
            return Err(Error::InvalidTimestamp(format!(
                "nanoseconds out of range: {}",
                self.nanoseconds
            )));
        }
        Utc.timestamp_opt(self.seconds, self.nanoseconds)
            .single()
            .ok_or_else(|| Error::InvalidTimestamp(format!("seconds out of range: {}", self.seconds)))
    }

    /// Parse a timestamp out of a document field.
    ///
    /// Besides the native object form this accepts an RFC 3339 string or
    /// integer milliseconds, which older clients wrote for `date`.
    pub fn from_value(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Object(_) => {
                let ts: Self = serde_json::from_value(value.clone()).ok()?;
                (ts.nanoseconds < NANOS_PER_SECOND).then_some(ts)
            }
            serde_json::Value::String(s) => DateTime::parse_from_rfc3339(s)
                .ok()
                .map(|d| Self::from_datetime(d.with_timezone(&Utc))),
            serde_json::Value::Number(n) => n.as_i64().map(Self::from_millis),
            _ => None,
        }
    }

    /// Render as a document field value.
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::json!({
            "seconds": self.seconds,
            "nanoseconds": self.nanoseconds,
        })
    }
}

impl From<DateTime<Utc>> for StoreTimestamp {
    fn from(date: DateTime<Utc>) -> Self {
        Self::from_datetime(date)
    }
}
