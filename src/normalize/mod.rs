//! Per-service normalization into the unified data model.
//!
//! Each service module owns the raw payload shapes of that service and
//! exposes one adapter function per record kind it supports. The
//! dispatchers below select an adapter with an exhaustive match over
//! [`ServiceType`], so adding a service forces a decision for every kind.

pub mod chatwork;
pub mod discord;
pub mod google;
pub mod line_works;
pub mod slack;
pub mod teams;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::error::NormalizeError;
use crate::models::{
    Dataset, RecordKind, ServiceType, UnifiedActivity, UnifiedMeeting, UnifiedMessage,
};

pub type MessageAdapter = fn(&Value) -> Result<UnifiedMessage, NormalizeError>;
pub type MeetingAdapter = fn(&Value) -> Result<UnifiedMeeting, NormalizeError>;
pub type ActivityAdapter = fn(&Value) -> Result<UnifiedActivity, NormalizeError>;

/// Message adapter for a service, if the service has messages.
pub fn message_adapter(service: ServiceType) -> Option<MessageAdapter> {
    match service {
        ServiceType::Slack => Some(slack::normalize_message),
        ServiceType::Discord => Some(discord::normalize_message),
        ServiceType::Teams => Some(teams::normalize_message),
        ServiceType::Google => Some(google::normalize_message),
        ServiceType::Chatwork => Some(chatwork::normalize_message),
        ServiceType::LineWorks => Some(line_works::normalize_message),
    }
}

/// Meeting adapter for a service, if the service has meetings.
pub fn meeting_adapter(service: ServiceType) -> Option<MeetingAdapter> {
    match service {
        ServiceType::Teams => Some(teams::normalize_meeting),
        ServiceType::Google => Some(google::normalize_meeting),
        ServiceType::Slack
        | ServiceType::Discord
        | ServiceType::Chatwork
        | ServiceType::LineWorks => None,
    }
}

/// Activity adapter for a service, if the service has an activity feed.
pub fn activity_adapter(service: ServiceType) -> Option<ActivityAdapter> {
    match service {
        ServiceType::Slack => Some(slack::normalize_activity),
        ServiceType::Teams => Some(teams::normalize_activity),
        ServiceType::Google => Some(google::normalize_activity),
        ServiceType::Discord | ServiceType::Chatwork | ServiceType::LineWorks => None,
    }
}

/// Normalize one raw message payload.
pub fn normalize_message(service: ServiceType, raw: &Value) -> Result<UnifiedMessage, NormalizeError> {
    let adapter = message_adapter(service).ok_or(NormalizeError::UnsupportedService {
        service,
        kind: RecordKind::Message,
    })?;
    adapter(raw)
}

/// Normalize one raw meeting payload.
pub fn normalize_meeting(service: ServiceType, raw: &Value) -> Result<UnifiedMeeting, NormalizeError> {
    let adapter = meeting_adapter(service).ok_or(NormalizeError::UnsupportedService {
        service,
        kind: RecordKind::Meeting,
    })?;
    adapter(raw)
}

/// Normalize one raw activity payload.
pub fn normalize_activity(
    service: ServiceType,
    raw: &Value,
) -> Result<UnifiedActivity, NormalizeError> {
    let adapter = activity_adapter(service).ok_or(NormalizeError::UnsupportedService {
        service,
        kind: RecordKind::Activity,
    })?;
    adapter(raw)
}

/// One already-fetched record tagged with the service it came from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawRecord {
    pub service: String,
    pub payload: Value,
}

/// The input file format: raw records grouped by kind.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawBundle {
    #[serde(default)]
    pub messages: Vec<RawRecord>,
    #[serde(default)]
    pub meetings: Vec<RawRecord>,
    #[serde(default)]
    pub activities: Vec<RawRecord>,
}

/// Normalize a whole bundle. The first failing record aborts.
pub fn normalize_bundle(bundle: &RawBundle) -> Result<Dataset, NormalizeError> {
    let mut dataset = Dataset::default();

    for (index, record) in bundle.messages.iter().enumerate() {
        let service: ServiceType = record.service.parse()?;
        let message = normalize_message(service, &record.payload).inspect_err(|e| {
            debug!("Message #{} failed to normalize: {}", index, e);
        })?;
        dataset.messages.push(message);
    }

    for (index, record) in bundle.meetings.iter().enumerate() {
        let service: ServiceType = record.service.parse()?;
        let meeting = normalize_meeting(service, &record.payload).inspect_err(|e| {
            debug!("Meeting #{} failed to normalize: {}", index, e);
        })?;
        dataset.meetings.push(meeting);
    }

    for (index, record) in bundle.activities.iter().enumerate() {
        let service: ServiceType = record.service.parse()?;
        let activity = normalize_activity(service, &record.payload).inspect_err(|e| {
            debug!("Activity #{} failed to normalize: {}", index, e);
        })?;
        dataset.activities.push(activity);
    }

    info!(
        "Normalized {} messages, {} meetings, {} activities",
        dataset.messages.len(),
        dataset.meetings.len(),
        dataset.activities.len()
    );

    Ok(dataset)
}

// ---------------------------------------------------------------------------
// Shared helpers for the service modules
// ---------------------------------------------------------------------------

/// Deserialize a raw payload into a service-specific shape.
pub(crate) fn decode<T: DeserializeOwned>(
    service: ServiceType,
    kind: RecordKind,
    raw: &Value,
) -> Result<T, NormalizeError> {
    T::deserialize(raw).map_err(|source| NormalizeError::MalformedPayload {
        service,
        kind,
        source,
    })
}

/// Unwrap a required field, treating empty strings as absent.
pub(crate) fn required(
    value: Option<String>,
    service: ServiceType,
    kind: RecordKind,
    field: &'static str,
) -> Result<String, NormalizeError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(NormalizeError::MissingField {
            service,
            kind,
            field,
        }),
    }
}

/// First non-empty candidate, or the fallback.
pub(crate) fn first_non_empty(candidates: &[Option<&String>], fallback: &str) -> String {
    candidates
        .iter()
        .flatten()
        .find(|s| !s.trim().is_empty())
        .map(|s| s.to_string())
        .unwrap_or_else(|| fallback.to_string())
}

pub(crate) fn parse_rfc3339(service: ServiceType, value: &str) -> Result<DateTime<Utc>, NormalizeError> {
    DateTime::parse_from_rfc3339(value.trim())
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| invalid_timestamp(service, value))
}

/// Parse an offset-less date-time that is known to be UTC.
pub(crate) fn parse_naive_utc(service: ServiceType, value: &str) -> Result<DateTime<Utc>, NormalizeError> {
    if let Ok(dt) = parse_rfc3339(service, value) {
        return Ok(dt);
    }
    NaiveDateTime::parse_from_str(value.trim(), "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(|_| invalid_timestamp(service, value))
}

pub(crate) fn parse_epoch_seconds(service: ServiceType, secs: i64) -> Result<DateTime<Utc>, NormalizeError> {
    if secs <= 0 {
        return Err(invalid_timestamp(service, &secs.to_string()));
    }
    DateTime::<Utc>::from_timestamp(secs, 0).ok_or_else(|| invalid_timestamp(service, &secs.to_string()))
}

pub(crate) fn parse_epoch_millis(service: ServiceType, millis: i64) -> Result<DateTime<Utc>, NormalizeError> {
    if millis <= 0 {
        return Err(invalid_timestamp(service, &millis.to_string()));
    }
    DateTime::<Utc>::from_timestamp_millis(millis)
        .ok_or_else(|| invalid_timestamp(service, &millis.to_string()))
}

/// Slack-style `"<seconds>.<micros>"` timestamps.
pub(crate) fn parse_decimal_seconds(service: ServiceType, value: &str) -> Result<DateTime<Utc>, NormalizeError> {
    let trimmed = value.trim();
    let mut parts = trimmed.splitn(2, '.');
    let secs = parts
        .next()
        .and_then(|s| s.parse::<i64>().ok())
        .filter(|s| *s > 0)
        .ok_or_else(|| invalid_timestamp(service, value))?;
    let fraction = parts.next().unwrap_or("0");
    if !fraction.chars().all(|c| c.is_ascii_digit()) {
        return Err(invalid_timestamp(service, value));
    }
    // Right-pad to nanoseconds, ignoring anything past nanosecond precision.
    let mut digits: String = fraction.chars().take(9).collect();
    while digits.len() < 9 {
        digits.push('0');
    }
    let nanos = digits.parse::<u32>().unwrap_or(0);
    DateTime::<Utc>::from_timestamp(secs, nanos).ok_or_else(|| invalid_timestamp(service, value))
}

/// Timestamps that may arrive as epoch seconds, epoch millis, decimal
/// seconds or RFC 3339 depending on the endpoint.
pub(crate) fn parse_flexible(service: ServiceType, value: &Value) -> Result<DateTime<Utc>, NormalizeError> {
    match value {
        Value::Number(n) => {
            let raw = n
                .as_i64()
                .or_else(|| n.as_f64().map(|f| f.round() as i64))
                .ok_or_else(|| invalid_timestamp(service, &n.to_string()))?;
            if raw <= 0 {
                return Err(invalid_timestamp(service, &n.to_string()));
            }
            // Epoch seconds stay below 1e11 until the year 5138.
            if raw >= 100_000_000_000 {
                parse_epoch_millis(service, raw)
            } else {
                parse_epoch_seconds(service, raw)
            }
        }
        Value::String(s) if s.trim().chars().all(|c| c.is_ascii_digit() || c == '.') => {
            if s.contains('.') {
                parse_decimal_seconds(service, s)
            } else {
                let raw = s
                    .trim()
                    .parse::<i64>()
                    .map_err(|_| invalid_timestamp(service, s))?;
                parse_flexible(service, &Value::from(raw))
            }
        }
        Value::String(s) => parse_rfc3339(service, s),
        other => Err(invalid_timestamp(service, &other.to_string())),
    }
}

/// Whole minutes between two instants, rounded to nearest.
pub fn duration_minutes(start: DateTime<Utc>, end: DateTime<Utc>) -> i64 {
    let millis = (end - start).num_milliseconds();
    (millis as f64 / 60_000.0).round() as i64
}

/// Check ordering and compute the meeting duration.
pub(crate) fn meeting_duration(
    service: ServiceType,
    id: &str,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Result<i64, NormalizeError> {
    if end < start {
        return Err(NormalizeError::InvalidTimeRange {
            service,
            id: id.to_string(),
        });
    }
    Ok(duration_minutes(start, end))
}

/// Reduce HTML message bodies to plain text.
pub(crate) fn strip_html(input: &str) -> String {
    let mut output = String::with_capacity(input.len());
    let mut in_tag = false;
    for c in input.chars() {
        match c {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            _ if !in_tag => output.push(c),
            _ => {}
        }
    }
    output
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
        .trim()
        .to_string()
}

fn invalid_timestamp(service: ServiceType, value: &str) -> NormalizeError {
    NormalizeError::InvalidTimestamp {
        service,
        value: value.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn test_every_service_has_a_message_adapter() {
        for service in ServiceType::ALL {
            assert!(message_adapter(service).is_some(), "{service}");
        }
    }

    #[test]
    fn test_unsupported_meeting_service_is_typed_error() {
        let err = normalize_meeting(ServiceType::Slack, &json!({"id": "1"})).unwrap_err();
        assert!(matches!(
            err,
            NormalizeError::UnsupportedService {
                service: ServiceType::Slack,
                kind: RecordKind::Meeting
            }
        ));
    }

    #[test]
    fn test_unsupported_activity_service_is_typed_error() {
        let err = normalize_activity(ServiceType::Chatwork, &json!({})).unwrap_err();
        assert!(matches!(err, NormalizeError::UnsupportedService { .. }));
    }

    #[test]
    fn test_parse_decimal_seconds() {
        let dt = parse_decimal_seconds(ServiceType::Slack, "1700000000.000200").unwrap();
        assert_eq!(dt.timestamp(), 1_700_000_000);
        assert_eq!(dt.timestamp_subsec_micros(), 200);
        assert!(parse_decimal_seconds(ServiceType::Slack, "abc").is_err());
        assert!(parse_decimal_seconds(ServiceType::Slack, "").is_err());
    }

    #[test]
    fn test_parse_flexible_encodings() {
        let expected = Utc.with_ymd_and_hms(2023, 11, 14, 22, 13, 20).unwrap();
        let service = ServiceType::LineWorks;
        assert_eq!(parse_flexible(service, &json!(1_700_000_000)).unwrap(), expected);
        assert_eq!(
            parse_flexible(service, &json!(1_700_000_000_000i64)).unwrap(),
            expected
        );
        assert_eq!(
            parse_flexible(service, &json!("1700000000")).unwrap(),
            expected
        );
        assert_eq!(
            parse_flexible(service, &json!("2023-11-14T22:13:20Z")).unwrap(),
            expected
        );
        assert!(parse_flexible(service, &json!("yesterday")).is_err());
        assert!(parse_flexible(service, &json!(null)).is_err());
        assert!(parse_flexible(service, &json!(0)).is_err());
        assert!(parse_flexible(service, &json!(i64::MIN)).is_err());
        assert!(parse_flexible(service, &json!(-1.0e300)).is_err());
        assert!(parse_flexible(service, &json!(1.0e300)).is_err());
    }

    #[test]
    fn test_parse_naive_utc() {
        let dt = parse_naive_utc(ServiceType::Teams, "2024-03-01T09:30:00.0000000").unwrap();
        assert_eq!(dt, Utc.with_ymd_and_hms(2024, 3, 1, 9, 30, 0).unwrap());
    }

    #[test]
    fn test_duration_rounds_to_nearest_minute() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap();
        assert_eq!(duration_minutes(start, start + chrono::Duration::seconds(89)), 1);
        assert_eq!(duration_minutes(start, start + chrono::Duration::seconds(90)), 2);
        assert_eq!(duration_minutes(start, start), 0);
    }

    #[test]
    fn test_meeting_duration_rejects_reversed_range() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap();
        let end = start - chrono::Duration::minutes(5);
        assert!(matches!(
            meeting_duration(ServiceType::Google, "m1", start, end),
            Err(NormalizeError::InvalidTimeRange { .. })
        ));
    }

    #[test]
    fn test_strip_html() {
        assert_eq!(
            strip_html("<p>Hello&nbsp;<b>team</b> &amp; friends</p>"),
            "Hello team & friends"
        );
    }

    #[test]
    fn test_normalize_bundle() {
        let bundle: RawBundle = serde_json::from_value(json!({
            "messages": [
                {"service": "slack", "payload": {"ts": "1700000000.000100", "user": "U1", "text": "hi", "channel": "C1"}},
                {"service": "chatwork", "payload": {"message_id": "9", "account": {"account_id": 7, "name": "Aki"}, "body": "yo", "send_time": 1700000100}}
            ],
            "meetings": [
                {"service": "google", "payload": {
                    "id": "ev1", "summary": "Sync",
                    "start": {"dateTime": "2024-01-01T10:00:00Z"},
                    "end": {"dateTime": "2024-01-01T10:30:00Z"},
                    "organizer": {"email": "a@example.com"}
                }}
            ]
        }))
        .unwrap();

        let dataset = normalize_bundle(&bundle).unwrap();
        assert_eq!(dataset.messages.len(), 2);
        assert_eq!(dataset.meetings.len(), 1);
        assert_eq!(dataset.meetings[0].duration, 30);
        assert_eq!(
            dataset.services(),
            vec![ServiceType::Slack, ServiceType::Google, ServiceType::Chatwork]
        );
    }

    #[test]
    fn test_normalize_bundle_rejects_unknown_service() {
        let bundle: RawBundle = serde_json::from_value(json!({
            "messages": [{"service": "myspace", "payload": {}}]
        }))
        .unwrap();
        assert!(matches!(
            normalize_bundle(&bundle),
            Err(NormalizeError::UnknownService(_))
        ));
    }
}
