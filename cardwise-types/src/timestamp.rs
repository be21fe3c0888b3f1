//! Timestamp helpers.
//!
//! Remote documents carry their `modified` field either as RFC 3339 text or
//! as integer epoch milliseconds depending on which client wrote them.

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;

/// Reads a timestamp from a JSON value (RFC 3339 string or epoch millis).
pub fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
        Value::Number(n) => {
            let millis = n.as_i64().or_else(|| n.as_f64().map(|f| f as i64))?;
            from_millis(millis)
        }
        _ => None,
    }
}

/// Encodes a timestamp the way this crate writes `modified` fields.
pub fn timestamp_value(ts: DateTime<Utc>) -> Value {
    Value::String(ts.to_rfc3339_opts(SecondsFormat::Millis, true))
}

pub fn from_millis(millis: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis)
}
