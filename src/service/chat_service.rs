// service/chat_service.rs
use std::{collections::HashSet, sync::Arc};

use chrono::{DateTime, Utc};
use tracing::{debug, info};
use uuid::Uuid;
use validator::Validate;

use crate::{
    db::chatdb::ChatExt,
    dtos::chatdtos::{clamp_page_size, CreateGroupConversationDto, SendMessageDto},
    models::chatmodels::*,
    realtime::{
        events::{conversation_room, user_room, ServerEvent},
        hub::EventBroadcaster,
    },
    service::error::ServiceError,
};

/// Conversation and messaging rules shared by the HTTP handlers and the socket gateway.
#[derive(Clone)]
pub struct ChatService {
    store: Arc<dyn ChatExt>,
    events: Arc<dyn EventBroadcaster>,
}

impl ChatService {
    pub fn new(store: Arc<dyn ChatExt>, events: Arc<dyn EventBroadcaster>) -> Self {
        Self { store, events }
    }

    pub async fn create_direct(
        &self,
        caller_id: Uuid,
        other_user_id: Uuid,
    ) -> Result<ConversationSummary, ServiceError> {
        if caller_id == other_user_id {
            return Err(ServiceError::Validation(
                "Cannot start a conversation with yourself".to_string(),
            ));
        }
        self.require_user(other_user_id).await?;

        let conversation = match self
            .store
            .find_direct_conversation(caller_id, other_user_id)
            .await?
        {
            Some(existing) => existing,
            None => {
                let created = self
                    .store
                    .create_direct_conversation(caller_id, other_user_id)
                    .await?;
                let room = conversation_room(created.id);
                self.events.join_user(&room, caller_id).await;
                self.events.join_user(&room, other_user_id).await;
                info!("Direct conversation {} opened by {}", created.id, caller_id);
                created
            }
        };

        self.summarize(conversation, caller_id).await
    }

    pub async fn create_group(
        &self,
        caller_id: Uuid,
        body: CreateGroupConversationDto,
    ) -> Result<ConversationSummary, ServiceError> {
        body.validate()
            .map_err(|e| ServiceError::Validation(e.to_string()))?;

        let title = body.title.trim().to_string();
        if title.is_empty() {
            return Err(ServiceError::Validation("Title is required".to_string()));
        }

        let members = dedup_with(caller_id, &body.participant_ids);
        if members.len() < 2 {
            return Err(ServiceError::Validation(
                "A group needs at least one other participant".to_string(),
            ));
        }
        for user_id in &members {
            self.require_user(*user_id).await?;
        }

        let conversation = self
            .store
            .create_group_conversation(caller_id, title, members.clone())
            .await?;

        let room = conversation_room(conversation.id);
        for user_id in &members {
            self.events.join_user(&room, *user_id).await;
        }
        info!(
            "Group conversation {} created by {} with {} members",
            conversation.id,
            caller_id,
            members.len()
        );

        self.summarize(conversation, caller_id).await
    }

    /// One conversation per project. Reuses it when it exists, as long as the caller is in it.
    pub async fn create_project_conversation(
        &self,
        caller_id: Uuid,
        project_id: Uuid,
        participant_ids: Vec<Uuid>,
    ) -> Result<ConversationSummary, ServiceError> {
        if let Some(existing) = self.store.find_project_conversation(project_id).await? {
            self.ensure_participant(existing.id, caller_id).await?;
            return self.summarize(existing, caller_id).await;
        }

        let project = self
            .store
            .get_project(project_id)
            .await?
            .ok_or(ServiceError::ProjectNotFound(project_id))?;

        let mut requested = vec![project.owner_id];
        requested.extend(participant_ids);
        let members = dedup_with(caller_id, &requested);
        for user_id in &members {
            self.require_user(*user_id).await?;
        }

        let conversation = self
            .store
            .create_project_conversation(&project, caller_id, members.clone())
            .await?;

        // A concurrent request may have won the race with a different roster.
        self.ensure_participant(conversation.id, caller_id).await?;

        let room = conversation_room(conversation.id);
        for user_id in &members {
            self.events.join_user(&room, *user_id).await;
        }
        info!("Project conversation {} ready for project {}", conversation.id, project_id);

        self.summarize(conversation, caller_id).await
    }

    pub async fn list_conversations(&self, user_id: Uuid) -> Result<Vec<ConversationSummary>, ServiceError> {
        let conversations = self.store.get_user_conversations(user_id).await?;

        let mut summaries = Vec::with_capacity(conversations.len());
        for conversation in conversations {
            summaries.push(self.summarize(conversation, user_id).await?);
        }
        Ok(summaries)
    }

    pub async fn get_conversation(
        &self,
        user_id: Uuid,
        conversation_id: Uuid,
    ) -> Result<ConversationSummary, ServiceError> {
        let conversation = self.ensure_participant(conversation_id, user_id).await?;
        self.summarize(conversation, user_id).await
    }

    /// NotFound before Authorization: a missing conversation is reported as missing.
    pub async fn ensure_participant(
        &self,
        conversation_id: Uuid,
        user_id: Uuid,
    ) -> Result<Conversation, ServiceError> {
        let conversation = self
            .store
            .get_conversation(conversation_id)
            .await?
            .ok_or(ServiceError::ConversationNotFound(conversation_id))?;

        if !self.store.is_participant(conversation_id, user_id).await? {
            return Err(ServiceError::NotAParticipant(user_id, conversation_id));
        }
        Ok(conversation)
    }

    pub async fn conversation_ids_for(&self, user_id: Uuid) -> Result<Vec<Uuid>, ServiceError> {
        Ok(self.store.get_user_conversation_ids(user_id).await?)
    }

    pub async fn send_message(
        &self,
        sender_id: Uuid,
        conversation_id: Uuid,
        body: SendMessageDto,
    ) -> Result<MessageWithSender, ServiceError> {
        self.ensure_participant(conversation_id, sender_id).await?;
        body.validate()
            .map_err(|e| ServiceError::Validation(e.to_string()))?;

        let message_type = body.message_type();
        let message = self
            .store
            .insert_message(NewMessage {
                conversation_id,
                sender_id,
                content: body.content.filter(|c| !c.trim().is_empty()),
                message_type,
                attachments: body.attachments,
            })
            .await?;

        debug!(
            "Message {} stored in conversation {} by {}",
            message.message.id, conversation_id, sender_id
        );
        self.publish_message(&message).await;
        Ok(message)
    }

    /// Newest page first from the store, handed back oldest-to-newest.
    pub async fn get_messages(
        &self,
        user_id: Uuid,
        conversation_id: Uuid,
        cursor: Option<MessageCursor>,
        limit: Option<i64>,
    ) -> Result<MessagePage, ServiceError> {
        self.ensure_participant(conversation_id, user_id).await?;

        let limit = clamp_page_size(limit);
        let mut messages = self.store.get_messages(conversation_id, cursor, limit).await?;

        let next_cursor = if messages.len() as i64 == limit {
            messages.last().map(|m| MessageCursor::of(&m.message))
        } else {
            None
        };
        messages.reverse();

        Ok(MessagePage {
            messages,
            next_cursor,
        })
    }

    /// Sender-only soft delete. Deleting twice returns the tombstone without a second event.
    pub async fn delete_message(&self, user_id: Uuid, message_id: i64) -> Result<Message, ServiceError> {
        let message = self
            .store
            .get_message(message_id)
            .await?
            .ok_or(ServiceError::MessageNotFound(message_id))?;

        if message.sender_id != user_id {
            return Err(ServiceError::Forbidden(
                "Only the sender can delete this message".to_string(),
            ));
        }
        if message.is_deleted {
            return Ok(message);
        }

        let deleted = self.store.soft_delete_message(message_id).await?;
        self.events
            .to_room(
                &conversation_room(deleted.conversation_id),
                ServerEvent::MessageDeleted {
                    conversation_id: deleted.conversation_id,
                    message_id,
                },
            )
            .await;

        Ok(deleted)
    }

    pub async fn mark_read(
        &self,
        user_id: Uuid,
        conversation_id: Uuid,
    ) -> Result<DateTime<Utc>, ServiceError> {
        let conversation = self.ensure_participant(conversation_id, user_id).await?;
        let read_at = self.store.mark_conversation_read(conversation_id, user_id).await?;

        self.events
            .to_room(
                &user_room(user_id),
                ServerEvent::ConversationUpdated {
                    conversation_id,
                    updated_at: conversation.updated_at,
                    last_read_at: Some(read_at),
                },
            )
            .await;

        Ok(read_at)
    }

    pub async fn unread_count(&self, user_id: Uuid) -> Result<i64, ServiceError> {
        Ok(self.store.get_total_unread_count(user_id).await?)
    }

    /// Returns the users that were actually added; members already present are skipped.
    pub async fn add_participants(
        &self,
        caller_id: Uuid,
        conversation_id: Uuid,
        user_ids: Vec<Uuid>,
    ) -> Result<Vec<Uuid>, ServiceError> {
        let conversation = self.ensure_participant(conversation_id, caller_id).await?;
        if conversation.kind == ConversationKind::Direct {
            return Err(ServiceError::Validation(
                "Participants of a direct conversation cannot change".to_string(),
            ));
        }

        let current: HashSet<Uuid> = self
            .store
            .get_participants(conversation_id)
            .await?
            .into_iter()
            .map(|p| p.user_id)
            .collect();

        let mut newcomers = Vec::new();
        for user_id in dedup(&user_ids) {
            let profile = self.require_user(user_id).await?;
            if !current.contains(&user_id) {
                newcomers.push(profile);
            }
        }
        if newcomers.is_empty() {
            return Ok(Vec::new());
        }

        let actor = self.require_user(caller_id).await?;
        let names: Vec<&str> = newcomers.iter().map(|p| p.name.as_str()).collect();
        let ids: Vec<Uuid> = newcomers.iter().map(|p| p.user_id).collect();
        let notice = system_notice(
            conversation_id,
            caller_id,
            format!("{} added {}", actor.name, names.join(", ")),
        );

        let (added, message) = self
            .store
            .add_participants(conversation_id, &ids, notice)
            .await?;

        let room = conversation_room(conversation_id);
        for user_id in &added {
            self.events.join_user(&room, *user_id).await;
        }
        self.events
            .to_room(
                &room,
                ServerEvent::ParticipantAdded {
                    conversation_id,
                    user_ids: added.clone(),
                    added_by: caller_id,
                },
            )
            .await;
        self.publish_message(&message).await;

        info!(
            "{} added {} participants to conversation {}",
            caller_id,
            added.len(),
            conversation_id
        );
        Ok(added)
    }

    /// Self-leave, or removal by the conversation creator or the project owner.
    pub async fn remove_participant(
        &self,
        caller_id: Uuid,
        conversation_id: Uuid,
        user_id: Uuid,
    ) -> Result<(), ServiceError> {
        let conversation = self
            .store
            .get_conversation(conversation_id)
            .await?
            .ok_or(ServiceError::ConversationNotFound(conversation_id))?;

        if conversation.kind == ConversationKind::Direct {
            return Err(ServiceError::Validation(
                "Participants of a direct conversation cannot change".to_string(),
            ));
        }
        if !self.may_remove(caller_id, user_id, &conversation).await? {
            return Err(ServiceError::Forbidden(
                "You are not allowed to remove this participant".to_string(),
            ));
        }

        let target = self.require_user(user_id).await?;
        let text = if caller_id == user_id {
            format!("{} left the conversation", target.name)
        } else {
            let actor = self.require_user(caller_id).await?;
            format!("{} removed {}", actor.name, target.name)
        };

        let message = self
            .store
            .remove_participant(conversation_id, user_id, system_notice(conversation_id, caller_id, text))
            .await?
            .ok_or(ServiceError::ParticipantNotFound(user_id, conversation_id))?;

        let room = conversation_room(conversation_id);
        let event = ServerEvent::ParticipantRemoved {
            conversation_id,
            user_id,
            removed_by: caller_id,
        };
        self.events.evict_user(&room, user_id).await;
        self.events.to_room(&user_room(user_id), event.clone()).await;
        self.events.to_room(&room, event).await;
        self.publish_message(&message).await;

        info!("{} removed {} from conversation {}", caller_id, user_id, conversation_id);
        Ok(())
    }

    async fn may_remove(
        &self,
        caller_id: Uuid,
        user_id: Uuid,
        conversation: &Conversation,
    ) -> Result<bool, ServiceError> {
        if caller_id == user_id || conversation.created_by == caller_id {
            return Ok(true);
        }
        if let Some(project_id) = conversation.project_id {
            if let Some(project) = self.store.get_project(project_id).await? {
                return Ok(project.owner_id == caller_id);
            }
        }
        Ok(false)
    }

    async fn publish_message(&self, message: &MessageWithSender) {
        let room = conversation_room(message.message.conversation_id);
        self.events
            .to_room(&room, ServerEvent::MessageNew(message.clone()))
            .await;
        self.events
            .to_room(
                &room,
                ServerEvent::ConversationUpdated {
                    conversation_id: message.message.conversation_id,
                    updated_at: message.message.created_at,
                    last_read_at: None,
                },
            )
            .await;
    }

    async fn require_user(&self, user_id: Uuid) -> Result<ParticipantProfile, ServiceError> {
        self.store
            .get_user_profile(user_id)
            .await?
            .ok_or(ServiceError::UserNotFound(user_id))
    }

    async fn summarize(
        &self,
        conversation: Conversation,
        viewer_id: Uuid,
    ) -> Result<ConversationSummary, ServiceError> {
        let participants = self.store.get_participants(conversation.id).await?;
        let last_message = self.store.get_last_message(conversation.id).await?;
        let unread_count = self.store.get_unread_count(conversation.id, viewer_id).await?;

        Ok(ConversationSummary {
            conversation,
            participants,
            last_message,
            unread_count,
        })
    }
}

fn dedup(ids: &[Uuid]) -> Vec<Uuid> {
    let mut seen = HashSet::new();
    ids.iter().copied().filter(|id| seen.insert(*id)).collect()
}

/// `first` leads, followed by the distinct remaining ids in request order.
fn dedup_with(first: Uuid, ids: &[Uuid]) -> Vec<Uuid> {
    let mut all = Vec::with_capacity(ids.len() + 1);
    all.push(first);
    all.extend_from_slice(ids);
    dedup(&all)
}

fn system_notice(conversation_id: Uuid, actor_id: Uuid, text: String) -> NewMessage {
    NewMessage {
        conversation_id,
        sender_id: actor_id,
        content: Some(text),
        message_type: MessageType::System,
        attachments: Vec::new(),
    }
}
