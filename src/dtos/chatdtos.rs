use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::models::chatmodels::{Attachment, MessageCursor, MessageType};

pub const DEFAULT_PAGE_SIZE: i64 = 50;
pub const MAX_PAGE_SIZE: i64 = 100;

#[derive(Debug, Deserialize, Validate)]
pub struct CreateDirectConversationDto {
    pub other_user_id: Uuid,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateGroupConversationDto {
    #[validate(length(min = 1, max = 120, message = "Title must be between 1 and 120 characters"))]
    pub title: String,

    #[validate(length(min = 1, message = "A group needs at least one other participant"))]
    pub participant_ids: Vec<Uuid>,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct CreateProjectConversationDto {
    #[serde(default)]
    pub participant_ids: Vec<Uuid>,
}

fn validate_attachments(attachments: &[Attachment]) -> Result<(), ValidationError> {
    if attachments.len() > 10 {
        return Err(ValidationError::new("too_many_attachments"));
    }
    if attachments.iter().any(|a| a.url.trim().is_empty()) {
        return Err(ValidationError::new("attachment_url_required"));
    }
    Ok(())
}

fn validate_message_body(dto: &SendMessageDto) -> Result<(), ValidationError> {
    let has_text = dto
        .content
        .as_deref()
        .map(|c| !c.trim().is_empty())
        .unwrap_or(false);

    if !has_text && dto.attachments.is_empty() {
        let mut error = ValidationError::new("empty_message");
        error.message = Some("Message needs content or at least one attachment".into());
        return Err(error);
    }
    Ok(())
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[validate(schema(function = "validate_message_body"))]
pub struct SendMessageDto {
    #[validate(length(max = 5000, message = "Message must be at most 5000 characters"))]
    pub content: Option<String>,

    #[serde(default)]
    #[validate(custom = "validate_attachments")]
    pub attachments: Vec<Attachment>,

    #[serde(alias = "messageType")]
    pub message_type: Option<MessageType>,
}

impl SendMessageDto {
    /// Clients may send text, image or file messages; system messages are server-authored.
    pub fn message_type(&self) -> MessageType {
        match self.message_type {
            Some(MessageType::System) | None => MessageType::Text,
            Some(other) => other,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct MessagesQuery {
    pub cursor: Option<MessageCursor>,
    pub limit: Option<i64>,
}

pub fn clamp_page_size(limit: Option<i64>) -> i64 {
    limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE)
}

#[derive(Debug, Deserialize, Validate)]
pub struct AddParticipantsDto {
    #[validate(length(min = 1, message = "Provide at least one user to add"))]
    pub user_ids: Vec<Uuid>,
}
