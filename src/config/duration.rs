//! Serde helpers for human-readable durations.
//!
//! A duration is either a plain integer (seconds) or a string with a unit
//! suffix: `500ms`, `10s`, `5m`, `1h`. Fractions are allowed (`1.5s`).

use serde::{Deserialize, Deserializer, Serializer};
use std::time::Duration;

/// Parses a duration string such as `"10s"` or `"500ms"`.
pub fn parse(s: &str) -> Result<Duration, String> {
    let t = s.trim();
    if t.is_empty() {
        return Err("empty duration".to_string());
    }
    let idx = t
        .char_indices()
        .find(|(_, ch)| !(ch.is_ascii_digit() || *ch == '.'))
        .map(|(i, _)| i)
        .unwrap_or(t.len());
    if idx == 0 {
        return Err(format!("invalid duration: {s}"));
    }
    let (num_s, unit_s) = t.split_at(idx);
    let num: f64 = num_s
        .parse()
        .map_err(|e| format!("invalid duration number {num_s:?}: {e}"))?;
    let unit = unit_s.trim().to_ascii_lowercase();
    let millis: f64 = match unit.as_str() {
        "ms" => 1.0,
        "" | "s" => 1000.0,
        "m" => 60_000.0,
        "h" => 3_600_000.0,
        _ => return Err(format!("unknown duration unit {unit_s:?} (use ms/s/m/h)")),
    };
    Ok(Duration::from_millis((num * millis).round() as u64))
}

/// Formats a duration the way [`parse`] reads it back.
pub fn format(d: &Duration) -> String {
    let ms = d.as_millis();
    if ms % 1000 != 0 {
        format!("{ms}ms")
    } else if ms % 3_600_000 == 0 && ms != 0 {
        format!("{}h", ms / 3_600_000)
    } else if ms % 60_000 == 0 && ms != 0 {
        format!("{}m", ms / 60_000)
    } else {
        format!("{}s", ms / 1000)
    }
}

pub fn serialize<S>(d: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&format(d))
}

pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error as _;
    let v = serde_yaml::Value::deserialize(deserializer)?;
    match v {
        serde_yaml::Value::Number(n) => n
            .as_u64()
            .map(Duration::from_secs)
            .ok_or_else(|| D::Error::custom("duration must be a positive integer (seconds)")),
        serde_yaml::Value::String(s) => parse(&s).map_err(D::Error::custom),
        _ => Err(D::Error::custom(
            "duration must be integer seconds or a string like \"1m\"",
        )),
    }
}
