//! Timestamp parsing and serialization helpers.
//!
//! Timestamps are written as RFC 3339 strings. Older snapshots contain
//! naive ISO 8601 values without an offset, which are read as UTC.

use serde::{de, Deserialize, Deserializer, Serializer};
use time::{
    format_description::well_known::{Iso8601, Rfc3339},
    OffsetDateTime, PrimitiveDateTime,
};

/// Parse an ISO 8601 timestamp that carries an explicit offset.
pub fn parse_with_offset(value: &str) -> Option<OffsetDateTime> {
    OffsetDateTime::parse(value, &Rfc3339)
        .or_else(|_| OffsetDateTime::parse(value, &Iso8601::DEFAULT))
        .ok()
}

/// Parse an ISO 8601 timestamp, treating values without an offset as UTC.
pub fn parse_lenient(value: &str) -> Option<OffsetDateTime> {
    parse_with_offset(value).or_else(|| {
        PrimitiveDateTime::parse(value, &Iso8601::DEFAULT)
            .ok()
            .map(PrimitiveDateTime::assume_utc)
    })
}

pub fn serialize<S: Serializer>(value: &OffsetDateTime, serializer: S) -> Result<S::Ok, S::Error> {
    time::serde::rfc3339::serialize(value, serializer)
}

pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<OffsetDateTime, D::Error> {
    let value = String::deserialize(deserializer)?;

    parse_lenient(&value)
        .ok_or_else(|| de::Error::custom(format_args!("invalid timestamp: {value}")))
}
