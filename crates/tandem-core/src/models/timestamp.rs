//! Lenient `updatedAt` decoding.
//!
//! Records written by older clients (or by hand) carry `updatedAt` either as
//! an RFC 3339 string or as integer Unix milliseconds. Both are coerced into
//! `DateTime<Utc>`; values are always written back as RFC 3339.

use chrono::{DateTime, TimeZone, Utc};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer};

#[derive(Deserialize)]
#[serde(untagged)]
enum RawTimestamp {
    Millis(i64),
    Text(String),
}

pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    match RawTimestamp::deserialize(deserializer)? {
        RawTimestamp::Millis(millis) => Utc
            .timestamp_millis_opt(millis)
            .single()
            .ok_or_else(|| D::Error::custom(format!("timestamp out of range: {millis}"))),
        RawTimestamp::Text(text) => parse_text(&text).map_err(D::Error::custom),
    }
}

fn parse_text(text: &str) -> Result<DateTime<Utc>, String> {
    let text = text.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
        return Ok(parsed.with_timezone(&Utc));
    }
    text.parse::<i64>()
        .ok()
        .and_then(|millis| Utc.timestamp_millis_opt(millis).single())
        .ok_or_else(|| format!("invalid timestamp: {text}"))
}
