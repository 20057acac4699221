//! Google Workspace: Chat messages, Calendar (Meet) events and Admin SDK
//! activity reports.

use serde::Deserialize;
use serde_json::{json, Value};

use super::{decode, first_non_empty, meeting_duration, parse_rfc3339, required};
use crate::error::NormalizeError;
use crate::models::{
    Attachment, Author, ChannelRef, Organizer, Participant, Reaction, RecordKind, RecordMetadata,
    Recording, ServiceType, ThreadRef, UnifiedActivity, UnifiedMeeting, UnifiedMessage,
};

const SERVICE: ServiceType = ServiceType::Google;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChatMessage {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    sender: Option<ChatUser>,
    #[serde(default)]
    create_time: Option<String>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    argument_text: Option<String>,
    #[serde(default)]
    space: Option<ChatSpace>,
    #[serde(default)]
    thread: Option<ChatThread>,
    #[serde(default)]
    thread_reply: bool,
    #[serde(default)]
    emoji_reaction_summaries: Vec<ReactionSummary>,
    #[serde(default)]
    attachment: Vec<ChatAttachment>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChatUser {
    name: String,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    avatar_url: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChatSpace {
    name: String,
    #[serde(default)]
    display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatThread {
    name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReactionSummary {
    emoji: ChatEmoji,
    #[serde(default)]
    reaction_count: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChatEmoji {
    #[serde(default)]
    unicode: Option<String>,
    #[serde(default)]
    custom_emoji: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChatAttachment {
    #[serde(default)]
    content_name: Option<String>,
    #[serde(default)]
    content_type: Option<String>,
    #[serde(default)]
    download_uri: Option<String>,
}

pub fn normalize_message(raw: &Value) -> Result<UnifiedMessage, NormalizeError> {
    let msg: ChatMessage = decode(SERVICE, RecordKind::Message, raw)?;

    let id = required(msg.name, SERVICE, RecordKind::Message, "name")?;
    let created = required(msg.create_time, SERVICE, RecordKind::Message, "createTime")?;
    let timestamp = parse_rfc3339(SERVICE, &created)?;
    let sender = msg.sender.ok_or(NormalizeError::MissingField {
        service: SERVICE,
        kind: RecordKind::Message,
        field: "sender",
    })?;

    let author = Author {
        name: first_non_empty(&[sender.display_name.as_ref()], &sender.name),
        id: sender.name,
        email: sender.email,
        avatar: sender.avatar_url,
    };

    let channel = msg.space.map(|space| ChannelRef {
        name: space.display_name.unwrap_or_else(|| space.name.clone()),
        id: space.name,
    });

    let thread = msg.thread.map(|thread| ThreadRef {
        parent_id: msg.thread_reply.then(|| thread.name.clone()),
        id: thread.name,
    });

    let reactions = msg
        .emoji_reaction_summaries
        .into_iter()
        .map(|summary| Reaction {
            emoji: summary
                .emoji
                .unicode
                .or_else(|| summary.emoji.custom_emoji.map(|c| c.to_string()))
                .unwrap_or_else(|| "unknown".to_string()),
            count: summary.reaction_count,
            users: Vec::new(),
        })
        .collect();

    let attachments = msg
        .attachment
        .into_iter()
        .map(|a| Attachment {
            kind: a.content_type.unwrap_or_else(|| "file".to_string()),
            url: a.download_uri.unwrap_or_default(),
            name: a.content_name.unwrap_or_default(),
        })
        .collect();

    Ok(UnifiedMessage {
        id,
        service: SERVICE,
        timestamp,
        author,
        // `argumentText` strips the leading bot mention; prefer the full text.
        content: msg.text.or(msg.argument_text).unwrap_or_default(),
        channel,
        thread,
        reactions,
        attachments,
        metadata: RecordMetadata::from_raw(raw),
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CalendarEvent {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    start: Option<EventTime>,
    #[serde(default)]
    end: Option<EventTime>,
    #[serde(default)]
    organizer: Option<EventPerson>,
    #[serde(default)]
    attendees: Vec<EventPerson>,
    #[serde(default)]
    hangout_link: Option<String>,
    #[serde(default)]
    attachments: Vec<EventAttachment>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventTime {
    /// Absent for all-day events.
    #[serde(default)]
    date_time: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventPerson {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    response_status: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventAttachment {
    #[serde(default)]
    file_url: Option<String>,
    #[serde(default)]
    mime_type: Option<String>,
}

fn event_time(
    value: Option<EventTime>,
    field: &'static str,
) -> Result<chrono::DateTime<chrono::Utc>, NormalizeError> {
    let raw = value.and_then(|t| t.date_time);
    let raw = required(raw, SERVICE, RecordKind::Meeting, field)?;
    parse_rfc3339(SERVICE, &raw)
}

fn person_identity(person: &EventPerson) -> (String, String) {
    let id = first_non_empty(&[person.email.as_ref(), person.id.as_ref()], "");
    let name = first_non_empty(&[person.display_name.as_ref()], &id);
    (id, name)
}

pub fn normalize_meeting(raw: &Value) -> Result<UnifiedMeeting, NormalizeError> {
    let event: CalendarEvent = decode(SERVICE, RecordKind::Meeting, raw)?;

    let id = required(event.id, SERVICE, RecordKind::Meeting, "id")?;
    let start_time = event_time(event.start, "start.dateTime")?;
    let end_time = event_time(event.end, "end.dateTime")?;
    let duration = meeting_duration(SERVICE, &id, start_time, end_time)?;

    let organizer = event
        .organizer
        .as_ref()
        .map(|person| {
            let (id, name) = person_identity(person);
            Organizer {
                id,
                name,
                email: person.email.clone(),
            }
        })
        .ok_or(NormalizeError::MissingField {
            service: SERVICE,
            kind: RecordKind::Meeting,
            field: "organizer",
        })?;

    // Declined invitees never attended.
    let participants = event
        .attendees
        .iter()
        .filter(|a| a.response_status.as_deref() != Some("declined"))
        .map(|person| {
            let (id, name) = person_identity(person);
            Participant {
                id,
                name,
                email: person.email.clone(),
                join_time: None,
                leave_time: None,
                speaking_time: None,
            }
        })
        .collect();

    // Meet stores recordings as video attachments on the event.
    let recording = event
        .attachments
        .iter()
        .find(|a| a.mime_type.as_deref().is_some_and(|m| m.starts_with("video/")))
        .map(|a| Recording {
            available: true,
            url: a.file_url.clone(),
            duration: None,
        });

    let mut metadata = RecordMetadata::from_raw(raw);
    if let Some(link) = event.hangout_link {
        metadata = metadata.with("conferenceLink", link);
    }

    Ok(UnifiedMeeting {
        id,
        service: SERVICE,
        title: event.summary.unwrap_or_default(),
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
struct ReportActivity {
    #[serde(default)]
    id: Option<ReportActivityId>,
    #[serde(default)]
    actor: Option<ReportActor>,
    #[serde(default)]
    events: Vec<ReportEvent>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReportActivityId {
    #[serde(default)]
    time: Option<String>,
    #[serde(default)]
    unique_qualifier: Option<String>,
    #[serde(default)]
    application_name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReportActor {
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    profile_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ReportEvent {
    #[serde(default)]
    name: Option<String>,
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    parameters: Vec<Value>,
}

/// Admin SDK Reports `activity` resources (Drive, Meet, Chat audit).
pub fn normalize_activity(raw: &Value) -> Result<UnifiedActivity, NormalizeError> {
    let activity: ReportActivity = decode(SERVICE, RecordKind::Activity, raw)?;

    let activity_id = activity.id.ok_or(NormalizeError::MissingField {
        service: SERVICE,
        kind: RecordKind::Activity,
        field: "id",
    })?;
    let id = required(
        activity_id.unique_qualifier,
        SERVICE,
        RecordKind::Activity,
        "id.uniqueQualifier",
    )?;
    let time = required(activity_id.time, SERVICE, RecordKind::Activity, "id.time")?;
    let actor = activity.actor.ok_or(NormalizeError::MissingField {
        service: SERVICE,
        kind: RecordKind::Activity,
        field: "actor",
    })?;
    let user_id = required(
        actor.email.clone().or(actor.profile_id),
        SERVICE,
        RecordKind::Activity,
        "actor.email",
    )?;

    let first = activity.events.first();
    let kind = first
        .and_then(|e| e.name.clone())
        .or_else(|| activity_id.application_name.clone())
        .unwrap_or_else(|| "activity".to_string());
    let details = json!({
        "application": activity_id.application_name,
        "eventType": first.and_then(|e| e.kind.clone()),
        "parameters": first.map(|e| e.parameters.clone()).unwrap_or_default(),
    });

    Ok(UnifiedActivity {
        id,
        service: SERVICE,
        kind,
        timestamp: parse_rfc3339(SERVICE, &time)?,
        user: Author {
            id: user_id.clone(),
            name: user_id,
            email: actor.email,
            avatar: None,
        },
        details,
        metadata: RecordMetadata::from_raw(raw),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_chat_message() {
        let raw = json!({
            "name": "spaces/A/messages/B",
            "createTime": "2024-04-02T08:00:00.123456Z",
            "sender": {"name": "users/1"}
        });
        let msg = normalize_message(&raw).unwrap();
        assert_eq!(msg.id, "spaces/A/messages/B");
        assert_eq!(msg.author.name, "users/1");
        assert_eq!(msg.content, "");
    }

    #[test]
    fn test_threaded_chat_message() {
        let raw = json!({
            "name": "spaces/A/messages/C",
            "createTime": "2024-04-02T08:01:00Z",
            "sender": {"name": "users/2", "displayName": "Mia", "email": "mia@example.com"},
            "text": "On it",
            "space": {"name": "spaces/A", "displayName": "Ops"},
            "thread": {"name": "spaces/A/threads/T"},
            "threadReply": true,
            "emojiReactionSummaries": [{"emoji": {"unicode": "👍"}, "reactionCount": 4}]
        });
        let msg = normalize_message(&raw).unwrap();
        assert_eq!(msg.channel.as_ref().unwrap().name, "Ops");
        assert_eq!(
            msg.thread.as_ref().unwrap().parent_id.as_deref(),
            Some("spaces/A/threads/T")
        );
        assert_eq!(msg.reactions[0].count, 4);
    }

    #[test]
    fn test_calendar_meeting() {
        let raw = json!({
            "id": "evt1",
            "summary": "Retro",
            "start": {"dateTime": "2024-04-02T15:00:00+02:00"},
            "end": {"dateTime": "2024-04-02T16:00:00+02:00"},
            "organizer": {"email": "lead@example.com", "displayName": "Lead"},
            "attendees": [
                {"email": "a@example.com", "responseStatus": "accepted"},
                {"email": "b@example.com", "responseStatus": "declined"},
                {"email": "c@example.com", "displayName": "Cy"}
            ],
            "hangoutLink": "https://meet.google.com/abc",
            "attachments": [{"fileUrl": "https://drive/rec.mp4", "mimeType": "video/mp4"}]
        });
        let meeting = normalize_meeting(&raw).unwrap();
        assert_eq!(meeting.duration, 60);
        assert_eq!(meeting.start_time.to_rfc3339(), "2024-04-02T13:00:00+00:00");
        assert_eq!(meeting.participants.len(), 2);
        assert_eq!(meeting.participants[1].name, "Cy");
        assert_eq!(meeting.organizer.name, "Lead");
        assert!(meeting.recording.unwrap().available);
    }

    #[test]
    fn test_all_day_event_is_not_a_meeting() {
        let raw = json!({
            "id": "evt2",
            "start": {"date": "2024-04-02"},
            "end": {"date": "2024-04-03"},
            "organizer": {"email": "lead@example.com"}
        });
        assert!(matches!(
            normalize_meeting(&raw),
            Err(NormalizeError::MissingField { field: "start.dateTime", .. })
        ));
    }

    #[test]
    fn test_admin_report_activity() {
        let raw = json!({
            "id": {"time": "2024-04-02T09:00:00Z", "uniqueQualifier": "-123", "applicationName": "drive"},
            "actor": {"email": "mia@example.com", "profileId": "42"},
            "events": [{"type": "access", "name": "edit", "parameters": [{"name": "doc_title", "value": "Roadmap"}]}]
        });
        let activity = normalize_activity(&raw).unwrap();
        assert_eq!(activity.kind, "edit");
        assert_eq!(activity.user.id, "mia@example.com");
        assert_eq!(activity.details["application"], "drive");
    }
}
