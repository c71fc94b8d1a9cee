// models/chatmodels.rs
use std::{fmt, str::FromStr};

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use sqlx::types::Json;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "conversation_kind", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ConversationKind {
    Direct,
    Group,
    Project,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, sqlx::Type, PartialEq, Eq, Default)]
#[sqlx(type_name = "message_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    #[default]
    Text,
    System,
    Image,
    File,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub url: String,
    pub name: Option<String>,
    #[serde(alias = "mimeType")]
    pub mime_type: Option<String>,
    pub size: Option<i64>,
}

#[derive(Debug, Serialize, Clone, Deserialize, sqlx::FromRow)]
pub struct Conversation {
    pub id: Uuid,
    pub kind: ConversationKind,
    pub title: Option<String>,
    pub project_id: Option<Uuid>,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Clone, Deserialize, sqlx::FromRow)]
pub struct ConversationParticipant {
    pub conversation_id: Uuid,
    pub user_id: Uuid,
    pub joined_at: DateTime<Utc>,
    pub last_read_at: Option<DateTime<Utc>>,
}

/// Roster entry: a participant with the profile fields clients render.
#[derive(Debug, Serialize, Clone, Deserialize, sqlx::FromRow, PartialEq)]
pub struct ParticipantProfile {
    pub user_id: Uuid,
    pub name: String,
    pub avatar_url: Option<String>,
    pub last_read_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct Message {
    pub id: i64,
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    pub content: Option<String>,
    pub message_type: MessageType,
    pub attachments: Json<Vec<Attachment>>,
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A message enriched with its sender's profile, as pushed over `message:new`.
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct MessageWithSender {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub message: Message,
    pub sender_name: String,
    pub sender_avatar_url: Option<String>,
}

#[derive(Debug, Serialize, Clone)]
pub struct ConversationSummary {
    pub conversation: Conversation,
    pub participants: Vec<ParticipantProfile>,
    pub last_message: Option<MessageWithSender>,
    pub unread_count: i64,
}

#[derive(Debug, Serialize, Clone)]
pub struct MessagePage {
    pub messages: Vec<MessageWithSender>,
    pub next_cursor: Option<MessageCursor>,
}

/// Position in a conversation's history, ordered by `(created_at, id)`.
/// Pages hold only messages strictly older than the cursor.
///
/// Travels as `<rfc3339>_<id>`. A bare RFC3339 timestamp is also accepted and
/// means "everything created before this instant".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct MessageCursor {
    pub created_at: DateTime<Utc>,
    pub id: i64,
}

#[derive(Debug, Error, PartialEq)]
#[error("Invalid message cursor: {0}")]
pub struct InvalidCursor(String);

impl MessageCursor {
    pub fn of(message: &Message) -> Self {
        MessageCursor {
            created_at: message.created_at,
            id: message.id,
        }
    }

    pub fn is_before(&self, message: &Message) -> bool {
        (message.created_at, message.id) < (self.created_at, self.id)
    }
}

impl fmt::Display for MessageCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}_{}",
            self.created_at.to_rfc3339_opts(SecondsFormat::AutoSi, true),
            self.id
        )
    }
}

impl FromStr for MessageCursor {
    type Err = InvalidCursor;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let (timestamp, id) = match raw.rsplit_once('_') {
            Some((timestamp, id)) => (
                timestamp,
                id.parse::<i64>().map_err(|_| InvalidCursor(raw.to_string()))?,
            ),
            None => (raw, 0),
        };
        let created_at = DateTime::parse_from_rfc3339(timestamp)
            .map_err(|_| InvalidCursor(raw.to_string()))?
            .with_timezone(&Utc);
        Ok(MessageCursor { created_at, id })
    }
}

impl Serialize for MessageCursor {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for MessageCursor {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(de::Error::custom)
    }
}

/// Message insert payload shared by the HTTP and socket paths.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    pub content: Option<String>,
    pub message_type: MessageType,
    pub attachments: Vec<Attachment>,
}

/// Stored participants of a direct conversation are keyed by the sorted pair.
pub fn direct_key(a: Uuid, b: Uuid) -> String {
    if a <= b {
        format!("{}:{}", a, b)
    } else {
        format!("{}:{}", b, a)
    }
}
