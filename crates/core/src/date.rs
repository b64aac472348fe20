//! Date values, encoded as `{"$date": <epoch milliseconds>}`.
//!
//! JSON has no date type, so dates travel as single-key sentinel objects.
//! In memory the sentinel object *is* the value, which makes the line
//! codec a pure JSON round-trip; these helpers convert to and from
//! [`chrono::DateTime`] at the application boundary.

use chrono::{DateTime, Utc};
use serde_json::Value;

/// The sentinel key marking a date object.
pub const DATE_KEY: &str = "$date";

/// Wrap a timestamp as a date value. Sub-millisecond precision is dropped.
pub fn to_value(dt: DateTime<Utc>) -> Value {
    let mut map = serde_json::Map::new();
    map.insert(DATE_KEY.to_string(), Value::from(dt.timestamp_millis()));
    Value::Object(map)
}

/// Unwrap a date value. Returns `None` for anything that is not a
/// well-formed single-key date sentinel.
pub fn from_value(value: &Value) -> Option<DateTime<Utc>> {
    let obj = value.as_object()?;
    if obj.len() != 1 {
        return None;
    }
    let millis = obj.get(DATE_KEY)?.as_i64()?;
    DateTime::from_timestamp_millis(millis)
}

/// Whether a value is a date sentinel.
pub fn is_date(value: &Value) -> bool {
    from_value(value).is_some()
}
