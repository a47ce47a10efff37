//! Timestamps are stored as fixed-width RFC 3339 text so that SQL string
//! comparison orders them chronologically.

use chrono::{DateTime, SecondsFormat, Utc};

pub fn timestamp(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(value).map(|parsed| parsed.with_timezone(&Utc))
}
