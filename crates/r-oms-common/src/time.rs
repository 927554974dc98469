//! ---
//! oms_section: "01-core-functionality"
//! oms_subsection: "module"
//! oms_type: "source"
//! oms_scope: "code"
//! oms_description: "Shared primitives and utilities for the pipeline runtime."
//! oms_version: "v0.0.0-prealpha"
//! oms_owner: "tbd"
//! ---
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde_json::Value as JsonValue;

// Epoch values at or above this are interpreted as milliseconds.
const EPOCH_MILLIS_CUTOVER: i64 = 100_000_000_000;

/// Parse a timestamp out of a JSON value.
///
/// Accepts RFC 3339 strings (with or without an offset), the space-separated
/// `YYYY-MM-DD HH:MM:SS[.fff]` form interpreted as UTC, and integer epoch
/// seconds or milliseconds. Returns `None` for anything ambiguous.
pub fn parse_timestamp(value: &JsonValue) -> Option<DateTime<Utc>> {
    match value {
        JsonValue::String(text) => parse_timestamp_str(text),
        JsonValue::Number(number) => number.as_i64().and_then(parse_epoch),
        _ => None,
    }
}

/// Parse a timestamp from its textual representation.
pub fn parse_timestamp_str(text: &str) -> Option<DateTime<Utc>> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(parsed.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    trimmed.parse::<i64>().ok().and_then(parse_epoch)
}

fn parse_epoch(raw: i64) -> Option<DateTime<Utc>> {
    if raw >= EPOCH_MILLIS_CUTOVER {
        Utc.timestamp_millis_opt(raw).single()
    } else {
        Utc.timestamp_opt(raw, 0).single()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_rfc3339_with_offset() {
        let parsed = parse_timestamp_str("2024-06-01T12:00:00+02:00").expect("parses");
        assert_eq!(parsed.to_rfc3339(), "2024-06-01T10:00:00+00:00");
    }

    #[test]
    fn parses_zulu_and_space_separated() {
        assert!(parse_timestamp_str("2024-06-01T12:00:00Z").is_some());
        assert!(parse_timestamp_str("2024-06-01 12:00:00").is_some());
        assert!(parse_timestamp_str("2024-06-01 12:00:00.250").is_some());
    }

    #[test]
    fn parses_epoch_seconds_and_millis() {
        let seconds = parse_timestamp(&json!(1_717_243_200)).expect("seconds");
        let millis = parse_timestamp(&json!(1_717_243_200_000i64)).expect("millis");
        assert_eq!(seconds, millis);
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_timestamp_str("yesterday-ish").is_none());
        assert!(parse_timestamp(&json!(true)).is_none());
        assert!(parse_timestamp(&json!("")).is_none());
    }
}
