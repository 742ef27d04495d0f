//! Timestamp utilities

use chrono::{DateTime, NaiveDate, Utc};

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Current time as epoch seconds, the unit used by artifact `expires` fields
pub fn epoch_seconds(at: DateTime<Utc>) -> i64 {
    at.timestamp()
}

/// RFC 3339 rendering used for every `updated`/`cached_at` string field
pub fn timestamp_string(at: DateTime<Utc>) -> String {
    at.to_rfc3339()
}

/// Parse an upstream `YYYY-MM-DD` date; anything else yields `None`
pub fn parse_vote_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").ok()
}
