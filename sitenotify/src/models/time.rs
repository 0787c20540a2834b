//! Lenient timestamp (de)serialization.
//!
//! The API emits RFC 3339 strings, but older endpoints and some broadcast
//! payloads use `YYYY-MM-DD HH:MM:SS` or Unix seconds.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serializer};

#[derive(Deserialize)]
#[serde(untagged)]
enum RawTime {
    Text(String),
    Seconds(i64),
}

/// Parse a timestamp in any of the accepted wire forms.
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S") {
        return Some(Utc.from_utc_datetime(&naive));
    }
    value
        .parse::<i64>()
        .ok()
        .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
}

fn from_raw<E: serde::de::Error>(raw: RawTime) -> Result<DateTime<Utc>, E> {
    match raw {
        RawTime::Text(s) => {
            parse_timestamp(&s).ok_or_else(|| E::custom(format!("invalid timestamp: {s}")))
        }
        RawTime::Seconds(secs) => Utc
            .timestamp_opt(secs, 0)
            .single()
            .ok_or_else(|| E::custom(format!("timestamp out of range: {secs}"))),
    }
}

pub fn serialize<S: Serializer>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&value.to_rfc3339())
}

pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
    from_raw(RawTime::deserialize(deserializer)?)
}

/// Same as the parent module, for nullable fields.
pub mod option {
    use super::*;

    pub fn serialize<S: Serializer>(
        value: &Option<DateTime<Utc>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(dt) => serializer.serialize_str(&dt.to_rfc3339()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<DateTime<Utc>>, D::Error> {
        Option::<RawTime>::deserialize(deserializer)?
            .map(from_raw)
            .transpose()
    }
}
