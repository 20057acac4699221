//! LINE WORKS: bot message callbacks.

use serde::Deserialize;
use serde_json::Value;

use super::{decode, first_non_empty, parse_flexible, required};
use crate::error::NormalizeError;
use crate::models::{
    Attachment, Author, ChannelRef, RecordKind, RecordMetadata, ServiceType, UnifiedMessage,
};

const SERVICE: ServiceType = ServiceType::LineWorks;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CallbackMessage {
    #[serde(default)]
    message_id: Option<String>,
    #[serde(default)]
    source: Option<Source>,
    /// RFC 3339 on callbacks, epoch millis on the history export.
    #[serde(default)]
    issued_time: Option<Value>,
    #[serde(default)]
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Source {
    #[serde(default)]
    user_id: Option<String>,
    #[serde(default)]
    user_name: Option<String>,
    #[serde(default)]
    channel_id: Option<String>,
    #[serde(default)]
    channel_name: Option<String>,
    #[serde(default)]
    domain_id: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Content {
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    file_id: Option<String>,
    #[serde(default)]
    file_name: Option<String>,
    #[serde(default)]
    resource_url: Option<String>,
}

pub fn normalize_message(raw: &Value) -> Result<UnifiedMessage, NormalizeError> {
    let msg: CallbackMessage = decode(SERVICE, RecordKind::Message, raw)?;

    let id = required(msg.message_id, SERVICE, RecordKind::Message, "messageId")?;
    let issued = msg.issued_time.ok_or(NormalizeError::MissingField {
        service: SERVICE,
        kind: RecordKind::Message,
        field: "issuedTime",
    })?;
    let timestamp = parse_flexible(SERVICE, &issued)?;
    let source = msg.source.ok_or(NormalizeError::MissingField {
        service: SERVICE,
        kind: RecordKind::Message,
        field: "source",
    })?;
    let user_id = required(source.user_id, SERVICE, RecordKind::Message, "source.userId")?;

    let channel = source.channel_id.map(|id| ChannelRef {
        name: source.channel_name.unwrap_or_else(|| id.clone()),
        id,
    });

    // Only text content carries a body; images and files become attachments.
    let (content, attachments) = match msg.content {
        Some(content) if content.kind.as_deref().unwrap_or("text") == "text" => {
            (content.text.unwrap_or_default(), Vec::new())
        }
        Some(content) => {
            let kind = content.kind.unwrap_or_else(|| "file".to_string());
            let attachment = Attachment {
                url: content.resource_url.unwrap_or_default(),
                name: content.file_name.or(content.file_id).unwrap_or_default(),
                kind,
            };
            (String::new(), vec![attachment])
        }
        None => (String::new(), Vec::new()),
    };

    let mut metadata = RecordMetadata::from_raw(raw);
    if let Some(domain_id) = source.domain_id {
        metadata = metadata.with("domainId", domain_id);
    }

    Ok(UnifiedMessage {
        id,
        service: SERVICE,
        timestamp,
        author: Author {
            name: first_non_empty(&[source.user_name.as_ref()], &user_id),
            id: user_id,
            email: None,
            avatar: None,
        },
        content,
        channel,
        thread: None,
        reactions: Vec::new(),
        attachments,
        metadata,
    })
}
