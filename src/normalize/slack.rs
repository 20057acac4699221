//! Slack: `conversations.history` messages and Events API activity.

use serde::Deserialize;
use serde_json::{Map, Value};

use super::{decode, first_non_empty, parse_decimal_seconds, required};
use crate::error::NormalizeError;
use crate::models::{
    Attachment, Author, ChannelRef, Reaction, RecordKind, RecordMetadata, ServiceType, ThreadRef,
    UnifiedActivity, UnifiedMessage,
};

const SERVICE: ServiceType = ServiceType::Slack;

#[derive(Debug, Deserialize)]
struct SlackMessage {
    #[serde(default)]
    ts: Option<String>,
    #[serde(default)]
    client_msg_id: Option<String>,
    #[serde(default)]
    user: Option<String>,
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    user_profile: Option<SlackProfile>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    channel: Option<String>,
    #[serde(default)]
    channel_name: Option<String>,
    #[serde(default)]
    thread_ts: Option<String>,
    #[serde(default)]
    reactions: Vec<SlackReaction>,
    #[serde(default)]
    files: Vec<SlackFile>,
    #[serde(default)]
    subtype: Option<String>,
    #[serde(default)]
    team: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct SlackProfile {
    #[serde(default)]
    real_name: Option<String>,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    image_72: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SlackReaction {
    name: String,
    #[serde(default)]
    count: u32,
    #[serde(default)]
    users: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct SlackFile {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    filetype: Option<String>,
    #[serde(default)]
    url_private: Option<String>,
}

pub fn normalize_message(raw: &Value) -> Result<UnifiedMessage, NormalizeError> {
    let msg: SlackMessage = decode(SERVICE, RecordKind::Message, raw)?;

    let ts = required(msg.ts, SERVICE, RecordKind::Message, "ts")?;
    let timestamp = parse_decimal_seconds(SERVICE, &ts)?;
    let user = required(msg.user, SERVICE, RecordKind::Message, "user")?;

    let profile = msg.user_profile.unwrap_or_default();
    let author = Author {
        name: first_non_empty(
            &[
                profile.real_name.as_ref(),
                profile.display_name.as_ref(),
                msg.username.as_ref(),
            ],
            &user,
        ),
        id: user,
        email: profile.email,
        avatar: profile.image_72,
    };

    let channel = msg.channel.map(|id| ChannelRef {
        name: msg.channel_name.unwrap_or_else(|| id.clone()),
        id,
    });

    // A thread root carries thread_ts == ts; replies point at the root.
    let thread = msg.thread_ts.map(|thread_ts| ThreadRef {
        parent_id: (thread_ts != ts).then(|| thread_ts.clone()),
        id: thread_ts,
    });

    let reactions = msg
        .reactions
        .into_iter()
        .map(|r| Reaction {
            count: r.count.max(r.users.len() as u32),
            emoji: r.name,
            users: r.users,
        })
        .collect();

    let attachments = msg
        .files
        .into_iter()
        .map(|f| Attachment {
            kind: f.filetype.unwrap_or_else(|| "file".to_string()),
            url: f.url_private.unwrap_or_default(),
            name: f.name.or(f.title).unwrap_or_default(),
        })
        .collect();

    let mut metadata = RecordMetadata::from_raw(raw);
    if let Some(subtype) = msg.subtype {
        metadata = metadata.with("subtype", subtype);
    }
    if let Some(team) = msg.team {
        metadata = metadata.with("team", team);
    }

    Ok(UnifiedMessage {
        id: msg.client_msg_id.unwrap_or(ts),
        service: SERVICE,
        timestamp,
        author,
        content: msg.text.unwrap_or_default(),
        channel,
        thread,
        reactions,
        attachments,
        metadata,
    })
}

#[derive(Debug, Deserialize)]
struct SlackEvent {
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    event_id: Option<String>,
    #[serde(default)]
    event_ts: Option<String>,
    #[serde(default)]
    user: Option<Value>,
    #[serde(flatten)]
    rest: Map<String, Value>,
}

/// Events API payloads (`reaction_added`, `file_shared`, `user_change`, ...).
pub fn normalize_activity(raw: &Value) -> Result<UnifiedActivity, NormalizeError> {
    let event: SlackEvent = decode(SERVICE, RecordKind::Activity, raw)?;

    let kind = required(event.kind, SERVICE, RecordKind::Activity, "type")?;
    let event_ts = required(event.event_ts, SERVICE, RecordKind::Activity, "event_ts")?;
    let timestamp = parse_decimal_seconds(SERVICE, &event_ts)?;

    // `user` is an id for most events and a full profile for `user_change`.
    let user = match event.user {
        Some(Value::String(id)) if !id.is_empty() => Author {
            name: id.clone(),
            id,
            email: None,
            avatar: None,
        },
        Some(Value::Object(obj)) => {
            let id = obj
                .get("id")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let profile = obj.get("profile");
            let text = |key: &str| {
                profile
                    .and_then(|p| p.get(key))
                    .and_then(Value::as_str)
                    .map(str::to_string)
            };
            let real_name = text("real_name");
            Author {
                name: first_non_empty(&[real_name.as_ref()], &id),
                email: text("email"),
                avatar: text("image_72"),
                id,
            }
        }
        _ => {
            return Err(NormalizeError::MissingField {
                service: SERVICE,
                kind: RecordKind::Activity,
                field: "user",
            })
        }
    };

    Ok(UnifiedActivity {
        id: event
            .event_id
            .unwrap_or_else(|| format!("{kind}:{event_ts}")),
        service: SERVICE,
        kind,
        timestamp,
        user,
        details: Value::Object(event.rest),
        metadata: RecordMetadata::from_raw(raw),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_minimal_message() {
        let raw = json!({"ts": "1700000000.000100", "user": "U1"});
        let msg = normalize_message(&raw).unwrap();

        assert_eq!(msg.id, "1700000000.000100");
        assert_eq!(msg.author.id, "U1");
        assert_eq!(msg.author.name, "U1");
        assert_eq!(msg.content, "");
        assert!(msg.reactions.is_empty());
        assert!(msg.attachments.is_empty());
        assert!(msg.channel.is_none());
        assert_eq!(msg.metadata.original_data, raw);
    }

    #[test]
    fn test_full_message() {
        let raw = json!({
            "ts": "1700000050.000200",
            "client_msg_id": "abc-123",
            "user": "U1",
            "user_profile": {"real_name": "Ada Lovelace", "email": "ada@example.com"},
            "text": "Deploy is done",
            "channel": "C42",
            "channel_name": "releases",
            "thread_ts": "1700000000.000100",
            "reactions": [{"name": "tada", "count": 2, "users": ["U2", "U3"]}],
            "files": [{"name": "log.txt", "filetype": "text", "url_private": "https://files.slack.com/log.txt"}]
        });
        let msg = normalize_message(&raw).unwrap();

        assert_eq!(msg.id, "abc-123");
        assert_eq!(msg.author.name, "Ada Lovelace");
        assert_eq!(msg.author.email.as_deref(), Some("ada@example.com"));
        assert_eq!(msg.channel.as_ref().unwrap().name, "releases");
        let thread = msg.thread.as_ref().unwrap();
        assert_eq!(thread.id, "1700000000.000100");
        assert_eq!(thread.parent_id.as_deref(), Some("1700000000.000100"));
        assert_eq!(msg.reactions[0].emoji, "tada");
        assert_eq!(msg.reactions[0].count, 2);
        assert_eq!(msg.attachments[0].name, "log.txt");
    }

    #[test]
    fn test_thread_root_has_no_parent() {
        let raw = json!({"ts": "1700000000.000100", "thread_ts": "1700000000.000100", "user": "U1"});
        let msg = normalize_message(&raw).unwrap();
        assert!(msg.thread.unwrap().parent_id.is_none());
    }

    #[test]
    fn test_missing_ts_is_flagged() {
        let err = normalize_message(&json!({"user": "U1", "text": "hi"})).unwrap_err();
        assert!(matches!(err, NormalizeError::MissingField { field: "ts", .. }));
    }

    #[test]
    fn test_invalid_ts_is_not_coerced() {
        let err = normalize_message(&json!({"ts": "soon", "user": "U1"})).unwrap_err();
        assert!(matches!(err, NormalizeError::InvalidTimestamp { .. }));
    }

    #[test]
    fn test_deterministic() {
        let raw = json!({"ts": "1700000000.000100", "user": "U1", "text": "same"});
        assert_eq!(normalize_message(&raw).unwrap(), normalize_message(&raw).unwrap());
    }

    #[test]
    fn test_reaction_event() {
        let raw = json!({
            "type": "reaction_added",
            "user": "U2",
            "reaction": "thumbsup",
            "item": {"type": "message", "channel": "C1", "ts": "1700000000.000100"},
            "event_ts": "1700000300.000400"
        });
        let activity = normalize_activity(&raw).unwrap();
        assert_eq!(activity.kind, "reaction_added");
        assert_eq!(activity.user.id, "U2");
        assert_eq!(activity.id, "reaction_added:1700000300.000400");
        assert_eq!(activity.details["reaction"], "thumbsup");
    }

    #[test]
    fn test_user_change_event_with_profile() {
        let raw = json!({
            "type": "user_change",
            "event_ts": "1700000300.000400",
            "user": {"id": "U9", "profile": {"real_name": "Grace", "status_text": "Vacation"}}
        });
        let activity = normalize_activity(&raw).unwrap();
        assert_eq!(activity.user.id, "U9");
        assert_eq!(activity.user.name, "Grace");
    }
}
