//! Chatwork: `GET /rooms/{room_id}/messages` entries.

use serde::Deserialize;
use serde_json::Value;

use super::{decode, first_non_empty, parse_flexible, required};
use crate::error::NormalizeError;
use crate::models::{
    Author, ChannelRef, RecordKind, RecordMetadata, ServiceType, ThreadRef, UnifiedMessage,
};

const SERVICE: ServiceType = ServiceType::Chatwork;

#[derive(Debug, Deserialize)]
struct ChatworkMessage {
    #[serde(default)]
    message_id: Option<Value>,
    #[serde(default)]
    account: Option<ChatworkAccount>,
    #[serde(default)]
    body: Option<String>,
    #[serde(default)]
    send_time: Option<Value>,
    #[serde(default)]
    update_time: Option<i64>,
    /// Room context, added by the exporter since messages omit it.
    #[serde(default)]
    room_id: Option<Value>,
    #[serde(default)]
    room_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatworkAccount {
    account_id: Value,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    avatar_image_url: Option<String>,
}

/// Chatwork ids arrive as numbers or strings depending on the endpoint.
fn id_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Extract the replied-to message id from `[rp aid=1 to=ROOM-MESSAGE]`.
fn reply_target(body: &str) -> Option<String> {
    let start = body.find("[rp ")?;
    let tag = &body[start..];
    let end = tag.find(']')?;
    let to = tag[..end].split_whitespace().find_map(|part| part.strip_prefix("to="))?;
    let (_, message) = to.split_once('-')?;
    (!message.is_empty()).then(|| message.to_string())
}

pub fn normalize_message(raw: &Value) -> Result<UnifiedMessage, NormalizeError> {
    let msg: ChatworkMessage = decode(SERVICE, RecordKind::Message, raw)?;

    let id = required(
        msg.message_id.as_ref().and_then(id_string),
        SERVICE,
        RecordKind::Message,
        "message_id",
    )?;
    let send_time = msg.send_time.ok_or(NormalizeError::MissingField {
        service: SERVICE,
        kind: RecordKind::Message,
        field: "send_time",
    })?;
    let timestamp = parse_flexible(SERVICE, &send_time)?;
    let account = msg.account.ok_or(NormalizeError::MissingField {
        service: SERVICE,
        kind: RecordKind::Message,
        field: "account",
    })?;
    let account_id = required(
        id_string(&account.account_id),
        SERVICE,
        RecordKind::Message,
        "account.account_id",
    )?;

    let content = msg.body.unwrap_or_default();
    let thread = reply_target(&content).map(|parent| ThreadRef {
        id: parent.clone(),
        parent_id: Some(parent),
    });

    let channel = msg.room_id.as_ref().and_then(id_string).map(|id| ChannelRef {
        name: msg.room_name.clone().unwrap_or_else(|| id.clone()),
        id,
    });

    let mut metadata = RecordMetadata::from_raw(raw);
    if msg.update_time.is_some_and(|t| t > 0) {
        metadata = metadata.with("edited", true);
    }

    Ok(UnifiedMessage {
        id,
        service: SERVICE,
        timestamp,
        author: Author {
            name: first_non_empty(&[account.name.as_ref()], &account_id),
            id: account_id,
            email: None,
            avatar: account.avatar_image_url,
        },
        content,
        channel,
        thread,
        reactions: Vec::new(),
        attachments: Vec::new(),
        metadata,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_minimal_message() {
        let raw = json!({
            "message_id": "5",
            "account": {"account_id": 123},
            "send_time": 1384242850
        });
        let msg = normalize_message(&raw).unwrap();
        assert_eq!(msg.author.id, "123");
        assert_eq!(msg.author.name, "123");
        assert_eq!(msg.timestamp.timestamp(), 1_384_242_850);
        assert_eq!(msg.content, "");
    }

    #[test]
    fn test_reply_markup_becomes_thread() {
        let raw = json!({
            "message_id": 6,
            "account": {"account_id": 123, "name": "Bob"},
            "body": "[rp aid=456 to=99-5]Bob\nSounds good",
            "send_time": 1384242900,
            "room_id": 99,
            "room_name": "Project X"
        });
        let msg = normalize_message(&raw).unwrap();
        assert_eq!(msg.id, "6");
        assert_eq!(msg.thread.unwrap().parent_id.as_deref(), Some("5"));
        assert_eq!(msg.channel.unwrap().name, "Project X");
    }

    #[test]
    fn test_reply_target_parsing() {
        assert_eq!(reply_target("[rp aid=1 to=10-20] hi").as_deref(), Some("20"));
        assert_eq!(reply_target("no reply here"), None);
        assert_eq!(reply_target("[rp aid=1] broken"), None);
    }

    #[test]
    fn test_missing_send_time() {
        let raw = json!({"message_id": "5", "account": {"account_id": 1}});
        assert!(matches!(
            normalize_message(&raw),
            Err(NormalizeError::MissingField { field: "send_time", .. })
        ));
    }

    #[test]
    fn test_out_of_range_send_time() {
        for send_time in [json!(i64::MIN), json!(-1.0e300)] {
            let raw = json!({
                "message_id": "1",
                "account": {"account_id": 7},
                "send_time": send_time
            });
            assert!(matches!(
                normalize_message(&raw),
                Err(NormalizeError::InvalidTimestamp { .. })
            ));
        }
    }
}
