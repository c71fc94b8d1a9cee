// realtime/events.rs
//! Socket wire format: `{"event": "<name>", "data": {...}}` in both directions.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    dtos::chatdtos::SendMessageDto,
    models::{bidmodel::BidStatus, chatmodels::MessageWithSender},
};

pub fn conversation_room(conversation_id: Uuid) -> String {
    format!("conversation:{}", conversation_id)
}

pub fn user_room(user_id: Uuid) -> String {
    format!("user:{}", user_id)
}

/// Server → client.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerEvent {
    #[serde(rename = "message:new")]
    MessageNew(MessageWithSender),

    #[serde(rename = "message:deleted")]
    MessageDeleted {
        conversation_id: Uuid,
        message_id: i64,
    },

    #[serde(rename = "conversation:updated")]
    ConversationUpdated {
        conversation_id: Uuid,
        updated_at: DateTime<Utc>,
        #[serde(skip_serializing_if = "Option::is_none")]
        last_read_at: Option<DateTime<Utc>>,
    },

    #[serde(rename = "conversation:joined")]
    ConversationJoined { conversation_id: Uuid },

    #[serde(rename = "participant:added")]
    ParticipantAdded {
        conversation_id: Uuid,
        user_ids: Vec<Uuid>,
        added_by: Uuid,
    },

    #[serde(rename = "participant:removed")]
    ParticipantRemoved {
        conversation_id: Uuid,
        user_id: Uuid,
        removed_by: Uuid,
    },

    #[serde(rename = "bid:updated")]
    BidUpdated {
        bid_id: Uuid,
        project_id: Uuid,
        status: BidStatus,
        previous_status: Option<BidStatus>,
    },

    #[serde(rename = "error")]
    Error { message: String },

    #[serde(rename = "pong")]
    Pong,
}

impl ServerEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::MessageNew(_) => "message:new",
            ServerEvent::MessageDeleted { .. } => "message:deleted",
            ServerEvent::ConversationUpdated { .. } => "conversation:updated",
            ServerEvent::ConversationJoined { .. } => "conversation:joined",
            ServerEvent::ParticipantAdded { .. } => "participant:added",
            ServerEvent::ParticipantRemoved { .. } => "participant:removed",
            ServerEvent::BidUpdated { .. } => "bid:updated",
            ServerEvent::Error { .. } => "error",
            ServerEvent::Pong => "pong",
        }
    }
}

/// Client → server. Field names are snake_case; camelCase spellings are accepted too.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ClientEvent {
    #[serde(rename = "conversation:join")]
    Join {
        #[serde(alias = "conversationId")]
        conversation_id: Uuid,
    },

    #[serde(rename = "conversation:leave")]
    Leave {
        #[serde(alias = "conversationId")]
        conversation_id: Uuid,
    },

    #[serde(rename = "message:send")]
    SendMessage {
        #[serde(alias = "conversationId")]
        conversation_id: Uuid,
        #[serde(flatten)]
        message: SendMessageDto,
    },

    #[serde(rename = "message:delete")]
    DeleteMessage {
        #[serde(alias = "messageId")]
        message_id: i64,
    },

    #[serde(rename = "conversation:read")]
    MarkRead {
        #[serde(alias = "conversationId")]
        conversation_id: Uuid,
    },

    #[serde(rename = "ping")]
    Ping,
}
