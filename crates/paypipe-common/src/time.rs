//! UTC time helpers

use chrono::{DateTime, SecondsFormat, TimeZone, Utc};

pub fn utc_now() -> DateTime<Utc> {
    Utc::now()
}

/// RFC 3339 with microseconds and a `+00:00` offset.
pub fn to_iso(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, false)
}

/// Parse an RFC 3339 timestamp; naive timestamps are treated as UTC.
pub fn parse_iso(value: &str) -> Option<DateTime<Utc>> {
    let normalized = value.trim().replace('Z', "+00:00");
    if let Ok(ts) = DateTime::parse_from_rfc3339(&normalized) {
        return Some(ts.with_timezone(&Utc));
    }
    chrono::NaiveDateTime::parse_from_str(&normalized, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

pub fn from_unix(seconds: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_opt(seconds, 0).single()
}

/// Date partition value (`YYYY-MM-DD`) for a timestamp.
pub fn dt_partition(ts: DateTime<Utc>) -> String {
    ts.date_naive().format("%Y-%m-%d").to_string()
}
