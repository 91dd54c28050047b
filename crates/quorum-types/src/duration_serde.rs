//! Serde helpers for `Duration` config fields.
//!
//! Durations serialize as `"<n>ms"` and deserialize from either a bare
//! integer (milliseconds) or a suffixed string: `"250ms"`, `"10s"`, `"1m"`.
//! Use with `#[serde(with = "quorum_types::duration_serde")]`.

use serde::{self, Deserialize, Deserializer, Serializer};
use std::time::Duration;

pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&format!("{}ms", duration.as_millis()))
}

pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Millis(u64),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Millis(ms) => Ok(Duration::from_millis(ms)),
        Raw::Text(s) => parse_duration(&s).map_err(serde::de::Error::custom),
    }
}

/// Parse `"<n>ms" | "<n>s" | "<n>m"`, or a bare integer as milliseconds.
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    let parse = |val: &str| {
        val.trim()
            .parse::<u64>()
            .map_err(|e| format!("invalid duration '{s}': {e}"))
    };

    if let Some(val) = s.strip_suffix("ms") {
        Ok(Duration::from_millis(parse(val)?))
    } else if let Some(val) = s.strip_suffix('s') {
        Ok(Duration::from_secs(parse(val)?))
    } else if let Some(val) = s.strip_suffix('m') {
        parse(val)?
            .checked_mul(60)
            .map(Duration::from_secs)
            .ok_or_else(|| format!("duration '{s}' is too large"))
    } else if s.chars().all(|c| c.is_ascii_digit()) && !s.is_empty() {
        Ok(Duration::from_millis(parse(s)?))
    } else {
        Err(format!("unknown duration format: {s}"))
    }
}
