//! Timestamp helpers shared by every stage.
//!
//! Persisted timestamps are ISO-8601 UTC with a `Z` suffix and microsecond
//! precision (`2025-01-01T08:30:00.123456Z`).

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serializer};

/// Format used for archive build timestamps: `20250101083000`.
pub const BUILD_TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

/// Render `timestamp` the way the metadata store persists it.
pub fn to_iso(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Compact age of a timestamp, e.g. `42s`, `5m`, `3h`, `12d`.
pub fn format_age(timestamp: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let seconds = now.signed_duration_since(timestamp).num_seconds().max(0) as u64;
    if seconds < 60 {
        return format!("{seconds}s");
    }
    if seconds < 60 * 60 {
        return format!("{}m", seconds / 60);
    }
    if seconds < 60 * 60 * 24 {
        return format!("{}h", seconds / (60 * 60));
    }
    format!("{}d", seconds / (60 * 60 * 24))
}

/// Serde adapter for `last_sync`: `""` and `null` mean "never synced".
pub mod last_sync {
    use super::*;

    pub fn serialize<S>(value: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(ts) => serializer.serialize_str(&to_iso(*ts)),
            None => serializer.serialize_str(""),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw: Option<String> = Option::deserialize(deserializer)?;
        match raw.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(text) => DateTime::parse_from_rfc3339(text)
                .map(|ts| Some(ts.with_timezone(&Utc)))
                .map_err(serde::de::Error::custom),
        }
    }
}

/// Serde adapter for an optional `last_build`, persisted with the store's
/// precision. Pair with `skip_serializing_if = "Option::is_none"`.
pub mod iso {
    use super::*;

    pub fn serialize<S>(value: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(ts) => serializer.serialize_str(&to_iso(*ts)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw: Option<String> = Option::deserialize(deserializer)?;
        match raw.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(text) => DateTime::parse_from_rfc3339(text)
                .map(|ts| Some(ts.with_timezone(&Utc)))
                .map_err(serde::de::Error::custom),
        }
    }
}
