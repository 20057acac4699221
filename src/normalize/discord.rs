//! Discord: channel message objects from the REST API.

use serde::Deserialize;
use serde_json::Value;

use super::{decode, first_non_empty, parse_rfc3339, required};
use crate::error::NormalizeError;
use crate::models::{
    Attachment, Author, ChannelRef, Reaction, RecordKind, RecordMetadata, ServiceType, ThreadRef,
    UnifiedMessage,
};

const SERVICE: ServiceType = ServiceType::Discord;
const CDN: &str = "https://cdn.discordapp.com";

#[derive(Debug, Deserialize)]
struct DiscordMessage {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    channel_id: Option<String>,
    /// Not part of the message object; exporters add it when known.
    #[serde(default)]
    channel_name: Option<String>,
    #[serde(default)]
    guild_id: Option<String>,
    #[serde(default)]
    author: Option<DiscordUser>,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    timestamp: Option<String>,
    #[serde(default)]
    edited_timestamp: Option<String>,
    #[serde(default)]
    message_reference: Option<DiscordReference>,
    #[serde(default)]
    thread: Option<DiscordThread>,
    #[serde(default)]
    reactions: Vec<DiscordReaction>,
    #[serde(default)]
    attachments: Vec<DiscordAttachment>,
}

#[derive(Debug, Deserialize)]
struct DiscordUser {
    id: String,
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    global_name: Option<String>,
    #[serde(default)]
    avatar: Option<String>,
    #[serde(default)]
    email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DiscordReference {
    #[serde(default)]
    message_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DiscordThread {
    id: String,
}

#[derive(Debug, Deserialize)]
struct DiscordReaction {
    #[serde(default)]
    count: u32,
    emoji: DiscordEmoji,
}

#[derive(Debug, Deserialize)]
struct DiscordEmoji {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DiscordAttachment {
    #[serde(default)]
    filename: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    content_type: Option<String>,
}

pub fn normalize_message(raw: &Value) -> Result<UnifiedMessage, NormalizeError> {
    let msg: DiscordMessage = decode(SERVICE, RecordKind::Message, raw)?;

    let id = required(msg.id, SERVICE, RecordKind::Message, "id")?;
    let timestamp = required(msg.timestamp, SERVICE, RecordKind::Message, "timestamp")?;
    let timestamp = parse_rfc3339(SERVICE, &timestamp)?;
    let user = msg.author.ok_or(NormalizeError::MissingField {
        service: SERVICE,
        kind: RecordKind::Message,
        field: "author",
    })?;

    let author = Author {
        name: first_non_empty(&[user.global_name.as_ref(), user.username.as_ref()], &user.id),
        avatar: user
            .avatar
            .as_ref()
            .map(|hash| format!("{CDN}/avatars/{}/{hash}.png", user.id)),
        email: user.email,
        id: user.id,
    };

    let channel = msg.channel_id.map(|id| ChannelRef {
        name: msg.channel_name.unwrap_or_else(|| id.clone()),
        id,
    });

    // A started thread is keyed by its own id; a reply points at the
    // referenced message.
    let thread = match (msg.thread, msg.message_reference) {
        (Some(thread), _) => Some(ThreadRef {
            id: thread.id,
            parent_id: None,
        }),
        (None, Some(DiscordReference {
            message_id: Some(parent),
        })) => Some(ThreadRef {
            id: parent.clone(),
            parent_id: Some(parent),
        }),
        _ => None,
    };

    let reactions = msg
        .reactions
        .into_iter()
        .map(|r| Reaction {
            emoji: r
                .emoji
                .name
                .or(r.emoji.id)
                .unwrap_or_else(|| "unknown".to_string()),
            count: r.count,
            users: Vec::new(),
        })
        .collect();

    let attachments = msg
        .attachments
        .into_iter()
        .map(|a| Attachment {
            kind: a.content_type.unwrap_or_else(|| "file".to_string()),
            url: a.url.unwrap_or_default(),
            name: a.filename.unwrap_or_default(),
        })
        .collect();

    let mut metadata = RecordMetadata::from_raw(raw);
    if let Some(guild_id) = msg.guild_id {
        metadata = metadata.with("guildId", guild_id);
    }
    if msg.edited_timestamp.is_some() {
        metadata = metadata.with("edited", true);
    }

    Ok(UnifiedMessage {
        id,
        service: SERVICE,
        timestamp,
        author,
        content: msg.content.unwrap_or_default(),
        channel,
        thread,
        reactions,
        attachments,
        metadata,
    })
}
