use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::Value;
use thiserror::Error;

const START_TIME_KEYS: [&str; 3] = ["start_time", "startTime", "date"];
const NAIVE_FORMATS: [&str; 3] = ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S"];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EventTimeError {
    #[error("event start time is missing")]
    Missing,

    #[error("event start time is not a valid timestamp: {0}")]
    Unparseable(String),
}

/// Read-only view over the reminder payload.
///
/// The payload itself stays schema-less JSON; only rendering and fire-time
/// resolution look inside it, and neither fails on absent fields.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContestEvent {
    pub name: Option<String>,
    pub starts_at: Option<DateTime<Utc>>,
    pub url: Option<String>,
    pub platform: Option<String>,
}

impl ContestEvent {
    pub fn from_payload(payload: &Value) -> Self {
        Self {
            name: non_empty_str(payload, "name"),
            starts_at: event_start_time(payload).ok(),
            url: non_empty_str(payload, "url"),
            platform: non_empty_str(payload, "platform"),
        }
    }
}

/// Resolves the event timestamp from the first present of `start_time`,
/// `startTime` or `date`. Accepts RFC 3339 strings, naive ISO strings (taken
/// as UTC) and epoch milliseconds.
pub fn event_start_time(payload: &Value) -> Result<DateTime<Utc>, EventTimeError> {
    let raw = START_TIME_KEYS
        .iter()
        .filter_map(|key| payload.get(*key))
        .find(|value| !value.is_null())
        .ok_or(EventTimeError::Missing)?;

    match raw {
        Value::String(s) => parse_timestamp(s.trim()),
        Value::Number(n) => n
            .as_i64()
            .and_then(DateTime::from_timestamp_millis)
            .ok_or_else(|| EventTimeError::Unparseable(n.to_string())),
        other => Err(EventTimeError::Unparseable(other.to_string())),
    }
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, EventTimeError> {
    if raw.is_empty() {
        return Err(EventTimeError::Missing);
    }

    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Ok(parsed.with_timezone(&Utc));
    }

    NAIVE_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .map(|naive| naive.and_utc())
        .ok_or_else(|| EventTimeError::Unparseable(raw.to_string()))
}

fn non_empty_str(payload: &Value, key: &str) -> Option<String> {
    payload
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn resolves_rfc3339_start_time() {
        let payload = json!({ "name": "Round 1", "startTime": "2026-03-01T14:35:00+02:00" });

        let start = event_start_time(&payload).unwrap();

        assert_eq!(start, Utc.with_ymd_and_hms(2026, 3, 1, 12, 35, 0).unwrap());
    }

    #[test]
    fn prefers_start_time_over_date() {
        let payload = json!({
            "start_time": "2026-03-01T10:00:00Z",
            "date": "2027-01-01T00:00:00Z",
        });

        let start = event_start_time(&payload).unwrap();

        assert_eq!(start, Utc.with_ymd_and_hms(2026, 3, 1, 10, 0, 0).unwrap());
    }

    #[test]
    fn accepts_epoch_millis_and_naive_strings() {
        let millis = json!({ "date": 1_767_225_600_000_i64 });
        let naive = json!({ "date": "2026-01-01 00:00:00" });

        assert_eq!(
            event_start_time(&millis).unwrap(),
            Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap()
        );
        assert_eq!(
            event_start_time(&naive).unwrap(),
            Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn missing_and_garbage_timestamps_are_rejected() {
        assert_eq!(
            event_start_time(&json!({ "name": "x" })),
            Err(EventTimeError::Missing)
        );
        assert_eq!(
            event_start_time(&json!({ "date": null })),
            Err(EventTimeError::Missing)
        );
        assert!(matches!(
            event_start_time(&json!({ "date": "next tuesday" })),
            Err(EventTimeError::Unparseable(_))
        ));
        assert!(matches!(
            event_start_time(&json!({ "date": true })),
            Err(EventTimeError::Unparseable(_))
        ));
    }

    #[test]
    fn event_view_tolerates_sparse_payloads() {
        let event = ContestEvent::from_payload(&json!({ "name": "  ", "platform": "codeforces" }));

        assert_eq!(event.name, None);
        assert_eq!(event.starts_at, None);
        assert_eq!(event.platform.as_deref(), Some("codeforces"));
    }
}
