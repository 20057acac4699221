//! Microsoft Teams: Graph `chatMessage`, calendar `event` and activity
//! feed payloads.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{Map, Value};

use super::{decode, first_non_empty, meeting_duration, parse_naive_utc, parse_rfc3339, required, strip_html};
use crate::error::NormalizeError;
use crate::models::{
    Attachment, Author, ChannelRef, Organizer, Participant, Reaction, RecordKind, RecordMetadata,
    Recording, ServiceType, ThreadRef, UnifiedActivity, UnifiedMeeting, UnifiedMessage,
};

const SERVICE: ServiceType = ServiceType::Teams;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphIdentitySet {
    #[serde(default)]
    user: Option<GraphIdentity>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphIdentity {
    id: String,
    #[serde(default)]
    display_name: Option<String>,
}

impl GraphIdentity {
    fn into_author(self) -> Author {
        Author {
            name: first_non_empty(&[self.display_name.as_ref()], &self.id),
            id: self.id,
            email: None,
            avatar: None,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChatMessage {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    created_date_time: Option<String>,
    #[serde(default)]
    from: Option<GraphIdentitySet>,
    #[serde(default)]
    body: Option<ItemBody>,
    #[serde(default)]
    channel_identity: Option<ChannelIdentity>,
    /// Exporter-provided display name for the channel.
    #[serde(default)]
    channel_name: Option<String>,
    #[serde(default)]
    chat_id: Option<String>,
    #[serde(default)]
    reply_to_id: Option<String>,
    #[serde(default)]
    reactions: Vec<ChatReaction>,
    #[serde(default)]
    attachments: Vec<ChatAttachment>,
    #[serde(default)]
    importance: Option<String>,
    #[serde(default)]
    subject: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ItemBody {
    #[serde(default)]
    content_type: Option<String>,
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChannelIdentity {
    #[serde(default)]
    team_id: Option<String>,
    channel_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChatReaction {
    reaction_type: String,
    #[serde(default)]
    user: Option<GraphIdentitySet>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChatAttachment {
    #[serde(default)]
    content_type: Option<String>,
    #[serde(default)]
    content_url: Option<String>,
    #[serde(default)]
    name: Option<String>,
}

pub fn normalize_message(raw: &Value) -> Result<UnifiedMessage, NormalizeError> {
    let msg: ChatMessage = decode(SERVICE, RecordKind::Message, raw)?;

    let id = required(msg.id, SERVICE, RecordKind::Message, "id")?;
    let created = required(
        msg.created_date_time,
        SERVICE,
        RecordKind::Message,
        "createdDateTime",
    )?;
    let timestamp = parse_rfc3339(SERVICE, &created)?;
    let author = msg
        .from
        .and_then(|from| from.user)
        .map(GraphIdentity::into_author)
        .ok_or(NormalizeError::MissingField {
            service: SERVICE,
            kind: RecordKind::Message,
            field: "from.user",
        })?;

    let content = match msg.body {
        Some(ItemBody {
            content_type,
            content: Some(content),
        }) => {
            if content_type.as_deref().map(str::to_lowercase).as_deref() == Some("html") {
                strip_html(&content)
            } else {
                content
            }
        }
        _ => String::new(),
    };

    let mut metadata = RecordMetadata::from_raw(raw);
    let channel = match (msg.channel_identity, msg.chat_id) {
        (Some(identity), _) => {
            if let Some(team_id) = identity.team_id {
                metadata = metadata.with("teamId", team_id);
            }
            Some(ChannelRef {
                name: msg
                    .channel_name
                    .unwrap_or_else(|| identity.channel_id.clone()),
                id: identity.channel_id,
            })
        }
        (None, Some(chat_id)) => Some(ChannelRef {
            name: msg.channel_name.unwrap_or_else(|| chat_id.clone()),
            id: chat_id,
        }),
        (None, None) => None,
    };

    let thread = msg.reply_to_id.map(|parent| ThreadRef {
        id: parent.clone(),
        parent_id: Some(parent),
    });

    // Graph lists one entry per (user, reaction); fold them per reaction in
    // first-seen order.
    let mut order: Vec<String> = Vec::new();
    let mut grouped: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for reaction in msg.reactions {
        if !grouped.contains_key(&reaction.reaction_type) {
            order.push(reaction.reaction_type.clone());
        }
        let users = grouped.entry(reaction.reaction_type).or_default();
        if let Some(user) = reaction.user.and_then(|u| u.user) {
            users.push(user.id);
        }
    }
    let reactions = order
        .into_iter()
        .map(|emoji| {
            let users = grouped.remove(&emoji).unwrap_or_default();
            Reaction {
                count: users.len().max(1) as u32,
                emoji,
                users,
            }
        })
        .collect();

    let attachments = msg
        .attachments
        .into_iter()
        .map(|a| Attachment {
            kind: a.content_type.unwrap_or_else(|| "file".to_string()),
            url: a.content_url.unwrap_or_default(),
            name: a.name.unwrap_or_default(),
        })
        .collect();

    if let Some(importance) = msg.importance {
        metadata = metadata.with("importance", importance);
    }
    if let Some(subject) = msg.subject {
        metadata = metadata.with("subject", subject);
    }

    Ok(UnifiedMessage {
        id,
        service: SERVICE,
        timestamp,
        author,
        content,
        channel,
        thread,
        reactions,
        attachments,
        metadata,
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CalendarEvent {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    subject: Option<String>,
    #[serde(default)]
    start: Option<DateTimeTimeZone>,
    #[serde(default)]
    end: Option<DateTimeTimeZone>,
    #[serde(default)]
    organizer: Option<Recipient>,
    #[serde(default)]
    attendees: Vec<Recipient>,
    #[serde(default)]
    attendance_records: Vec<AttendanceRecord>,
    #[serde(default)]
    is_online_meeting: Option<bool>,
    #[serde(default)]
    recording: Option<TeamsRecording>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DateTimeTimeZone {
    date_time: String,
    #[serde(default)]
    time_zone: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Recipient {
    email_address: EmailAddress,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EmailAddress {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    address: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AttendanceRecord {
    #[serde(default)]
    email_address: Option<String>,
    #[serde(default)]
    identity: Option<GraphIdentity>,
    #[serde(default)]
    attendance_intervals: Vec<AttendanceInterval>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AttendanceInterval {
    #[serde(default)]
    join_date_time: Option<String>,
    #[serde(default)]
    leave_date_time: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TeamsRecording {
    #[serde(default)]
    content_url: Option<String>,
    #[serde(default)]
    duration_minutes: Option<i64>,
}

/// Graph `dateTimeTimeZone`. Only UTC is accepted; callers request UTC with
/// the `Prefer: outlook.timezone="UTC"` header.
fn parse_graph_time(value: &DateTimeTimeZone) -> Result<DateTime<Utc>, NormalizeError> {
    match value.time_zone.as_deref() {
        None | Some("UTC") | Some("Etc/UTC") | Some("GMT") => parse_naive_utc(SERVICE, &value.date_time),
        Some(zone) => Err(NormalizeError::InvalidTimestamp {
            service: SERVICE,
            value: format!("{} ({zone})", value.date_time),
        }),
    }
}

fn address_identity(email: &EmailAddress) -> (String, String) {
    let address = email.address.clone().unwrap_or_default();
    let name = first_non_empty(&[email.name.as_ref()], &address);
    (address, name)
}

fn optional_time(value: Option<&String>) -> Option<DateTime<Utc>> {
    value.and_then(|v| parse_rfc3339(SERVICE, v).ok())
}

pub fn normalize_meeting(raw: &Value) -> Result<UnifiedMeeting, NormalizeError> {
    let event: CalendarEvent = decode(SERVICE, RecordKind::Meeting, raw)?;

    let id = required(event.id, SERVICE, RecordKind::Meeting, "id")?;
    let start = event.start.ok_or(NormalizeError::MissingField {
        service: SERVICE,
        kind: RecordKind::Meeting,
        field: "start",
    })?;
    let end = event.end.ok_or(NormalizeError::MissingField {
        service: SERVICE,
        kind: RecordKind::Meeting,
        field: "end",
    })?;
    let start_time = parse_graph_time(&start)?;
    let end_time = parse_graph_time(&end)?;
    let duration = meeting_duration(SERVICE, &id, start_time, end_time)?;

    let organizer = event
        .organizer
        .map(|o| {
            let (address, name) = address_identity(&o.email_address);
            Organizer {
                id: address.clone(),
                name,
                email: (!address.is_empty()).then_some(address),
            }
        })
        .ok_or(NormalizeError::MissingField {
            service: SERVICE,
            kind: RecordKind::Meeting,
            field: "organizer",
        })?;

    // Attendance reports describe who actually joined; fall back to the
    // invitation list when no report is attached.
    let participants = if event.attendance_records.is_empty() {
        event
            .attendees
            .iter()
            .map(|a| {
                let (address, name) = address_identity(&a.email_address);
                Participant {
                    id: address.clone(),
                    name,
                    email: (!address.is_empty()).then_some(address),
                    join_time: None,
                    leave_time: None,
                    speaking_time: None,
                }
            })
            .collect()
    } else {
        event
            .attendance_records
            .into_iter()
            .map(|record| {
                let join_time = record
                    .attendance_intervals
                    .first()
                    .and_then(|i| optional_time(i.join_date_time.as_ref()));
                let leave_time = record
                    .attendance_intervals
                    .last()
                    .and_then(|i| optional_time(i.leave_date_time.as_ref()));
                let (id, name) = match record.identity {
                    Some(identity) => {
                        let author = identity.into_author();
                        (author.id, author.name)
                    }
                    None => {
                        let address = record.email_address.clone().unwrap_or_default();
                        (address.clone(), address)
                    }
                };
                Participant {
                    id,
                    name,
                    email: record.email_address,
                    join_time,
                    leave_time,
                    speaking_time: None,
                }
            })
            .collect()
    };

    let recording = event.recording.map(|r| Recording {
        available: r.content_url.is_some(),
        url: r.content_url,
        duration: r.duration_minutes,
    });

    let mut metadata = RecordMetadata::from_raw(raw);
    if let Some(online) = event.is_online_meeting {
        metadata = metadata.with("isOnlineMeeting", online);
    }

    Ok(UnifiedMeeting {
        id,
        service: SERVICE,
        title: event.subject.unwrap_or_default(),
        start_time,
        end_time,
        duration,
        participants,
        organizer,
        recording,
        metadata,
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ActivityEntry {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    activity_type: Option<String>,
    #[serde(default)]
    created_date_time: Option<String>,
    #[serde(default)]
    actor: Option<GraphIdentitySet>,
    #[serde(flatten)]
    rest: Map<String, Value>,
}

/// Activity feed entries (presence changes, file shares, mentions).
pub fn normalize_activity(raw: &Value) -> Result<UnifiedActivity, NormalizeError> {
    let entry: ActivityEntry = decode(SERVICE, RecordKind::Activity, raw)?;

    let id = required(entry.id, SERVICE, RecordKind::Activity, "id")?;
    let kind = required(entry.activity_type, SERVICE, RecordKind::Activity, "activityType")?;
    let created = required(
        entry.created_date_time,
        SERVICE,
        RecordKind::Activity,
        "createdDateTime",
    )?;
    let user = entry
        .actor
        .and_then(|a| a.user)
        .map(GraphIdentity::into_author)
        .ok_or(NormalizeError::MissingField {
            service: SERVICE,
            kind: RecordKind::Activity,
            field: "actor.user",
        })?;

    Ok(UnifiedActivity {
        id,
        service: SERVICE,
        kind,
        timestamp: parse_rfc3339(SERVICE, &created)?,
        user,
        details: Value::Object(entry.rest),
        metadata: RecordMetadata::from_raw(raw),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_minimal_message() {
        let raw = json!({
            "id": "m1",
            "createdDateTime": "2024-03-01T09:00:00Z",
            "from": {"user": {"id": "u1"}}
        });
        let msg = normalize_message(&raw).unwrap();
        assert_eq!(msg.author.name, "u1");
        assert_eq!(msg.content, "");
        assert!(msg.channel.is_none());
    }

    #[test]
    fn test_html_body_and_grouped_reactions() {
        let raw = json!({
            "id": "m2",
            "createdDateTime": "2024-03-01T09:05:00Z",
            "from": {"user": {"id": "u1", "displayName": "Kim"}},
            "body": {"contentType": "html", "content": "<div>Ship <b>it</b></div>"},
            "channelIdentity": {"teamId": "t1", "channelId": "19:abc"},
            "channelName": "General",
            "replyToId": "m1",
            "reactions": [
                {"reactionType": "like", "user": {"user": {"id": "u2"}}},
                {"reactionType": "heart", "user": {"user": {"id": "u3"}}},
                {"reactionType": "like", "user": {"user": {"id": "u3"}}}
            ]
        });
        let msg = normalize_message(&raw).unwrap();
        assert_eq!(msg.content, "Ship it");
        assert_eq!(msg.channel.as_ref().unwrap().name, "General");
        assert_eq!(msg.thread.as_ref().unwrap().parent_id.as_deref(), Some("m1"));
        assert_eq!(msg.reactions.len(), 2);
        assert_eq!(msg.reactions[0].emoji, "like");
        assert_eq!(msg.reactions[0].count, 2);
        assert_eq!(msg.reactions[1].emoji, "heart");
        assert_eq!(msg.metadata.extra["teamId"], "t1");
    }

    #[test]
    fn test_system_message_without_sender_is_flagged() {
        let raw = json!({"id": "m3", "createdDateTime": "2024-03-01T09:00:00Z", "from": null});
        assert!(matches!(
            normalize_message(&raw),
            Err(NormalizeError::MissingField { field: "from.user", .. })
        ));
    }

    #[test]
    fn test_meeting_duration_is_recomputed() {
        let raw = json!({
            "id": "ev1",
            "subject": "Planning",
            "start": {"dateTime": "2024-03-01T10:00:00.0000000", "timeZone": "UTC"},
            "end": {"dateTime": "2024-03-01T10:45:30.0000000", "timeZone": "UTC"},
            "duration": 999,
            "organizer": {"emailAddress": {"name": "Kim", "address": "kim@example.com"}},
            "attendees": [
                {"emailAddress": {"name": "Lee", "address": "lee@example.com"}},
                {"emailAddress": {"address": "park@example.com"}}
            ]
        });
        let meeting = normalize_meeting(&raw).unwrap();
        assert_eq!(meeting.duration, 46);
        assert_eq!(meeting.organizer.email.as_deref(), Some("kim@example.com"));
        assert_eq!(meeting.participants.len(), 2);
        assert_eq!(meeting.participants[1].name, "park@example.com");
    }

    #[test]
    fn test_meeting_attendance_records() {
        let raw = json!({
            "id": "ev2",
            "start": {"dateTime": "2024-03-01T10:00:00Z"},
            "end": {"dateTime": "2024-03-01T11:00:00Z"},
            "organizer": {"emailAddress": {"address": "kim@example.com"}},
            "attendanceRecords": [{
                "emailAddress": "lee@example.com",
                "identity": {"id": "u2", "displayName": "Lee"},
                "attendanceIntervals": [
                    {"joinDateTime": "2024-03-01T10:02:00Z", "leaveDateTime": "2024-03-01T10:20:00Z"},
                    {"joinDateTime": "2024-03-01T10:30:00Z", "leaveDateTime": "2024-03-01T10:58:00Z"}
                ]
            }],
            "recording": {"contentUrl": "https://example.com/rec", "durationMinutes": 55}
        });
        let meeting = normalize_meeting(&raw).unwrap();
        let p = &meeting.participants[0];
        assert_eq!(p.id, "u2");
        assert_eq!(p.join_time.unwrap().to_rfc3339(), "2024-03-01T10:02:00+00:00");
        assert_eq!(p.leave_time.unwrap().to_rfc3339(), "2024-03-01T10:58:00+00:00");
        assert!(meeting.recording.as_ref().unwrap().available);
        assert_eq!(meeting.title, "");
    }

    #[test]
    fn test_meeting_non_utc_zone_is_rejected() {
        let raw = json!({
            "id": "ev3",
            "start": {"dateTime": "2024-03-01T10:00:00", "timeZone": "Pacific Standard Time"},
            "end": {"dateTime": "2024-03-01T11:00:00", "timeZone": "Pacific Standard Time"},
            "organizer": {"emailAddress": {"address": "kim@example.com"}}
        });
        assert!(matches!(
            normalize_meeting(&raw),
            Err(NormalizeError::InvalidTimestamp { .. })
        ));
    }

    #[test]
    fn test_activity_entry() {
        let raw = json!({
            "id": "a1",
            "activityType": "fileShared",
            "createdDateTime": "2024-03-01T12:00:00Z",
            "actor": {"user": {"id": "u1", "displayName": "Kim"}},
            "file": {"name": "spec.docx"}
        });
        let activity = normalize_activity(&raw).unwrap();
        assert_eq!(activity.kind, "fileShared");
        assert_eq!(activity.user.name, "Kim");
        assert_eq!(activity.details["file"]["name"], "spec.docx");
    }
}
