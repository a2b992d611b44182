//! Timestamp utilities

use chrono::{DateTime, Utc};

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Parse an RFC 3339 timestamp into UTC
///
/// Returns `None` for empty or unparseable input.
pub fn parse_rfc3339(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value.trim())
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Parse an optional RFC 3339 timestamp, falling back to the current time
pub fn parse_or_now(value: Option<&str>) -> DateTime<Utc> {
    value.and_then(parse_rfc3339).unwrap_or_else(now)
}
