// db/memory.rs
//! In-memory stand-in for the Postgres store, used by service and gateway tests.
//! A single mutex serializes every call the way the bid row lock serializes transitions.
use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::types::{BigDecimal, Json};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{biddb::BidExt, chatdb::ChatExt, projectdb::ProjectExt};
use crate::{
    dtos::biddtos::BidPatch,
    models::{
        bidmodel::*,
        chatmodels::*,
        usermodel::{User, UserRole},
    },
    service::{
        bid_rules::{self, BidAction},
        error::ServiceError,
    },
};

#[derive(Default)]
struct State {
    users: HashMap<Uuid, User>,
    projects: HashMap<Uuid, ProjectRef>,
    bids: HashMap<Uuid, Bid>,
    items: Vec<BidItem>,
    logs: Vec<BidStatusLog>,
    conversations: HashMap<Uuid, (Conversation, Option<String>)>,
    participants: Vec<ConversationParticipant>,
    messages: Vec<Message>,
    next_log_id: i64,
    next_message_id: i64,
    clock: Option<DateTime<Utc>>,
}

impl State {
    /// Strictly increasing timestamps so ordering never depends on wall-clock resolution.
    fn tick(&mut self) -> DateTime<Utc> {
        let next = match self.clock {
            Some(last) => last + Duration::milliseconds(1),
            None => Utc::now(),
        };
        self.clock = Some(next);
        next
    }

    fn with_owner(&self, bid_id: Uuid) -> Option<BidWithOwner> {
        let bid = self.bids.get(&bid_id)?;
        let project = self.projects.get(&bid.project_id)?;
        Some(BidWithOwner {
            bid: bid.clone(),
            project_owner_id: project.owner_id,
        })
    }

    fn log(&mut self, bid_id: Uuid, old_status: Option<BidStatus>, new_status: BidStatus, changed_by: Uuid) {
        self.next_log_id += 1;
        let created_at = self.tick();
        self.logs.push(BidStatusLog {
            id: self.next_log_id,
            bid_id,
            old_status,
            new_status,
            changed_by,
            created_at,
        });
    }

    fn insert_items(&mut self, bid_id: Uuid, items: &[NewBidItem]) -> Vec<BidItem> {
        let mut inserted = Vec::with_capacity(items.len());
        for item in items {
            let created_at = self.tick();
            let row = BidItem {
                id: Uuid::new_v4(),
                bid_id,
                name: item.name.clone(),
                description: item.description.clone(),
                price: item.price.clone(),
                created_at,
            };
            self.items.push(row.clone());
            inserted.push(row);
        }
        inserted
    }

    fn is_member(&self, conversation_id: Uuid, user_id: Uuid) -> bool {
        self.participants
            .iter()
            .any(|p| p.conversation_id == conversation_id && p.user_id == user_id)
    }

    fn add_members(&mut self, conversation_id: Uuid, user_ids: &[Uuid]) -> Vec<Uuid> {
        let mut added = Vec::new();
        for user_id in user_ids {
            if self.is_member(conversation_id, *user_id) || added.contains(user_id) {
                continue;
            }
            let joined_at = self.tick();
            self.participants.push(ConversationParticipant {
                conversation_id,
                user_id: *user_id,
                joined_at,
                last_read_at: None,
            });
            added.push(*user_id);
        }
        added
    }

    fn create_conversation(
        &mut self,
        kind: ConversationKind,
        title: Option<String>,
        project_id: Option<Uuid>,
        created_by: Uuid,
        direct_key: Option<String>,
    ) -> Conversation {
        let now = self.tick();
        let conversation = Conversation {
            id: Uuid::new_v4(),
            kind,
            title,
            project_id,
            created_by,
            created_at: now,
            updated_at: now,
        };
        self.conversations
            .insert(conversation.id, (conversation.clone(), direct_key));
        conversation
    }

    fn enrich(&self, message: &Message) -> MessageWithSender {
        let sender = self.users.get(&message.sender_id);
        MessageWithSender {
            message: message.clone(),
            sender_name: sender.map(|u| u.name.clone()).unwrap_or_default(),
            sender_avatar_url: sender.and_then(|u| u.avatar_url.clone()),
        }
    }

    fn insert_message(&mut self, new: &NewMessage) -> MessageWithSender {
        self.next_message_id += 1;
        let now = self.tick();
        let message = Message {
            id: self.next_message_id,
            conversation_id: new.conversation_id,
            sender_id: new.sender_id,
            content: new.content.clone(),
            message_type: new.message_type,
            attachments: Json(new.attachments.clone()),
            is_deleted: false,
            created_at: now,
            updated_at: now,
        };
        self.messages.push(message.clone());
        if let Some((conversation, _)) = self.conversations.get_mut(&new.conversation_id) {
            conversation.updated_at = now;
        }
        self.enrich(&message)
    }

    fn unread(&self, conversation_id: Uuid, user_id: Uuid) -> i64 {
        let Some(member) = self
            .participants
            .iter()
            .find(|p| p.conversation_id == conversation_id && p.user_id == user_id)
        else {
            return 0;
        };

        self.messages
            .iter()
            .filter(|m| m.conversation_id == conversation_id)
            .filter(|m| m.sender_id != user_id && !m.is_deleted)
            .filter(|m| member.last_read_at.map_or(true, |read| m.created_at > read))
            .count() as i64
    }
}

#[derive(Default)]
pub struct InMemoryStore {
    state: Mutex<State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_user(&self, name: &str, role: UserRole) -> User {
        let mut state = self.state.lock().await;
        let now = state.tick();
        let id = Uuid::new_v4();
        let user = User {
            id,
            name: name.to_string(),
            email: format!("{}@example.com", id.simple()),
            role,
            avatar_url: None,
            created_at: now,
            updated_at: now,
        };
        state.users.insert(user.id, user.clone());
        user
    }

    pub async fn add_project(&self, owner_id: Uuid, name: &str) -> ProjectRef {
        let mut state = self.state.lock().await;
        let project = ProjectRef {
            id: Uuid::new_v4(),
            owner_id,
            name: name.to_string(),
            status: ProjectStatus::Open,
        };
        state.projects.insert(project.id, project.clone());
        project
    }

    /// Gives every message in the conversation the same timestamp, as a batch committed together would get.
    pub async fn restamp_messages(&self, conversation_id: Uuid, at: DateTime<Utc>) {
        let mut state = self.state.lock().await;
        for message in state
            .messages
            .iter_mut()
            .filter(|m| m.conversation_id == conversation_id)
        {
            message.created_at = at;
        }
    }
}

#[async_trait]
impl ProjectExt for InMemoryStore {
    async fn get_project(&self, project_id: Uuid) -> Result<Option<ProjectRef>, sqlx::Error> {
        Ok(self.state.lock().await.projects.get(&project_id).cloned())
    }
}

#[async_trait]
impl BidExt for InMemoryStore {
    async fn create_bid(&self, new_bid: NewBid) -> Result<(Bid, Vec<BidItem>), ServiceError> {
        let mut state = self.state.lock().await;

        let duplicate = state
            .bids
            .values()
            .any(|b| b.project_id == new_bid.project_id && b.contractor_id == new_bid.contractor_id);
        if duplicate {
            return Err(ServiceError::DuplicateBid {
                project_id: new_bid.project_id,
                contractor_id: new_bid.contractor_id,
            });
        }

        let now = state.tick();
        let bid = Bid {
            id: Uuid::new_v4(),
            project_id: new_bid.project_id,
            contractor_id: new_bid.contractor_id,
            contractor_type: new_bid.contractor_type,
            total_price: new_bid.total_price.clone(),
            start_date: new_bid.start_date,
            end_date: new_bid.end_date,
            notes: new_bid.notes.clone(),
            highlights: new_bid.highlights.clone(),
            experience: new_bid.experience.clone(),
            credentials: new_bid.credentials.clone(),
            status: BidStatus::Draft,
            created_at: now,
            updated_at: now,
        };
        state.bids.insert(bid.id, bid.clone());
        let items = state.insert_items(bid.id, &new_bid.items);
        state.log(bid.id, None, BidStatus::Draft, new_bid.contractor_id);

        Ok((bid, items))
    }

    async fn get_bid(&self, bid_id: Uuid) -> Result<Option<BidWithOwner>, sqlx::Error> {
        Ok(self.state.lock().await.with_owner(bid_id))
    }

    async fn get_bid_items(&self, bid_id: Uuid) -> Result<Vec<BidItem>, sqlx::Error> {
        let state = self.state.lock().await;
        Ok(state.items.iter().filter(|i| i.bid_id == bid_id).cloned().collect())
    }

    async fn get_bid_history(&self, bid_id: Uuid) -> Result<Vec<BidStatusLog>, sqlx::Error> {
        let state = self.state.lock().await;
        Ok(state.logs.iter().filter(|l| l.bid_id == bid_id).cloned().collect())
    }

    async fn get_project_bids(&self, project_id: Uuid) -> Result<Vec<Bid>, sqlx::Error> {
        let state = self.state.lock().await;
        let mut bids: Vec<Bid> = state
            .bids
            .values()
            .filter(|b| b.project_id == project_id && b.status != BidStatus::Draft)
            .cloned()
            .collect();
        bids.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(bids)
    }

    async fn get_contractor_bids(&self, contractor_id: Uuid) -> Result<Vec<Bid>, sqlx::Error> {
        let state = self.state.lock().await;
        let mut bids: Vec<Bid> = state
            .bids
            .values()
            .filter(|b| b.contractor_id == contractor_id)
            .cloned()
            .collect();
        bids.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(bids)
    }

    async fn transition_bid(
        &self,
        bid_id: Uuid,
        actor_id: Uuid,
        action: BidAction,
    ) -> Result<BidTransition, ServiceError> {
        let mut state = self.state.lock().await;

        let locked = state.with_owner(bid_id).ok_or(ServiceError::BidNotFound(bid_id))?;
        let Some(next) = action.apply(actor_id, &locked)? else {
            return Ok(BidTransition {
                bid: locked.bid,
                project_owner_id: locked.project_owner_id,
                previous: None,
            });
        };

        let now = state.tick();
        let bid = {
            let bid = state
                .bids
                .get_mut(&bid_id)
                .ok_or(ServiceError::BidNotFound(bid_id))?;
            bid.status = next;
            bid.updated_at = now;
            bid.clone()
        };
        state.log(bid_id, Some(locked.bid.status), next, actor_id);

        if action == BidAction::Start {
            if let Some(project) = state.projects.get_mut(&bid.project_id) {
                project.status = ProjectStatus::Active;
            }
        }

        Ok(BidTransition {
            bid,
            project_owner_id: locked.project_owner_id,
            previous: Some(locked.bid.status),
        })
    }

    async fn replace_bid_items(
        &self,
        bid_id: Uuid,
        actor_id: Uuid,
        items: Vec<NewBidItem>,
    ) -> Result<ItemsReplaced, ServiceError> {
        let mut state = self.state.lock().await;

        let locked = state.with_owner(bid_id).ok_or(ServiceError::BidNotFound(bid_id))?;
        bid_rules::ensure_editable(actor_id, &locked)?;

        state.items.retain(|i| i.bid_id != bid_id);
        let inserted = state.insert_items(bid_id, &items);
        let total: BigDecimal = sum_item_prices(&items);

        let now = state.tick();
        if let Some(bid) = state.bids.get_mut(&bid_id) {
            bid.total_price = total.clone();
            bid.updated_at = now;
        }

        Ok(ItemsReplaced {
            count: inserted.len(),
            total_calculated: total,
        })
    }

    async fn update_bid(
        &self,
        bid_id: Uuid,
        actor_id: Uuid,
        patch: BidPatch,
    ) -> Result<Bid, ServiceError> {
        if patch.is_empty() {
            return Err(ServiceError::Validation("No fields to update".to_string()));
        }
        let mut state = self.state.lock().await;

        let locked = state.with_owner(bid_id).ok_or(ServiceError::BidNotFound(bid_id))?;
        bid_rules::ensure_editable(actor_id, &locked)?;

        let now = state.tick();
        let bid = state
            .bids
            .get_mut(&bid_id)
            .ok_or(ServiceError::BidNotFound(bid_id))?;
        patch.apply_to(bid);
        bid.updated_at = now;
        Ok(bid.clone())
    }

    async fn delete_bid(&self, bid_id: Uuid, actor_id: Uuid) -> Result<BidWithOwner, ServiceError> {
        let mut state = self.state.lock().await;

        let locked = state.with_owner(bid_id).ok_or(ServiceError::BidNotFound(bid_id))?;
        bid_rules::party_of(actor_id, &locked)?;

        state.bids.remove(&bid_id);
        state.items.retain(|i| i.bid_id != bid_id);
        Ok(locked)
    }
}

#[async_trait]
impl ChatExt for InMemoryStore {
    async fn get_user_profile(&self, user_id: Uuid) -> Result<Option<ParticipantProfile>, sqlx::Error> {
        let state = self.state.lock().await;
        Ok(state.users.get(&user_id).map(|u| ParticipantProfile {
            user_id: u.id,
            name: u.name.clone(),
            avatar_url: u.avatar_url.clone(),
            last_read_at: None,
        }))
    }

    async fn find_direct_conversation(
        &self,
        user_one_id: Uuid,
        user_two_id: Uuid,
    ) -> Result<Option<Conversation>, sqlx::Error> {
        let key = direct_key(user_one_id, user_two_id);
        let state = self.state.lock().await;
        Ok(state
            .conversations
            .values()
            .find(|(_, k)| k.as_deref() == Some(key.as_str()))
            .map(|(c, _)| c.clone()))
    }

    async fn create_direct_conversation(
        &self,
        creator_id: Uuid,
        other_user_id: Uuid,
    ) -> Result<Conversation, ServiceError> {
        let key = direct_key(creator_id, other_user_id);
        let mut state = self.state.lock().await;

        if let Some((existing, _)) = state
            .conversations
            .values()
            .find(|(_, k)| k.as_deref() == Some(key.as_str()))
        {
            return Ok(existing.clone());
        }

        let conversation =
            state.create_conversation(ConversationKind::Direct, None, None, creator_id, Some(key));
        state.add_members(conversation.id, &[creator_id, other_user_id]);
        Ok(conversation)
    }

    async fn create_group_conversation(
        &self,
        creator_id: Uuid,
        title: String,
        participant_ids: Vec<Uuid>,
    ) -> Result<Conversation, ServiceError> {
        let mut state = self.state.lock().await;
        let conversation =
            state.create_conversation(ConversationKind::Group, Some(title), None, creator_id, None);
        state.add_members(conversation.id, &participant_ids);
        Ok(conversation)
    }

    async fn find_project_conversation(
        &self,
        project_id: Uuid,
    ) -> Result<Option<Conversation>, sqlx::Error> {
        let state = self.state.lock().await;
        Ok(state
            .conversations
            .values()
            .find(|(c, _)| c.kind == ConversationKind::Project && c.project_id == Some(project_id))
            .map(|(c, _)| c.clone()))
    }

    async fn create_project_conversation(
        &self,
        project: &ProjectRef,
        creator_id: Uuid,
        participant_ids: Vec<Uuid>,
    ) -> Result<Conversation, ServiceError> {
        let mut state = self.state.lock().await;

        if let Some((existing, _)) = state
            .conversations
            .values()
            .find(|(c, _)| c.kind == ConversationKind::Project && c.project_id == Some(project.id))
        {
            return Ok(existing.clone());
        }

        let conversation = state.create_conversation(
            ConversationKind::Project,
            Some(project.name.clone()),
            Some(project.id),
            creator_id,
            None,
        );
        state.add_members(conversation.id, &participant_ids);
        Ok(conversation)
    }

    async fn get_conversation(&self, conversation_id: Uuid) -> Result<Option<Conversation>, sqlx::Error> {
        let state = self.state.lock().await;
        Ok(state.conversations.get(&conversation_id).map(|(c, _)| c.clone()))
    }

    async fn is_participant(&self, conversation_id: Uuid, user_id: Uuid) -> Result<bool, sqlx::Error> {
        Ok(self.state.lock().await.is_member(conversation_id, user_id))
    }

    async fn get_user_conversations(&self, user_id: Uuid) -> Result<Vec<Conversation>, sqlx::Error> {
        let state = self.state.lock().await;
        let mut conversations: Vec<Conversation> = state
            .conversations
            .values()
            .filter(|(c, _)| state.is_member(c.id, user_id))
            .map(|(c, _)| c.clone())
            .collect();
        conversations.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(conversations)
    }

    async fn get_user_conversation_ids(&self, user_id: Uuid) -> Result<Vec<Uuid>, sqlx::Error> {
        let state = self.state.lock().await;
        Ok(state
            .participants
            .iter()
            .filter(|p| p.user_id == user_id)
            .map(|p| p.conversation_id)
            .collect())
    }

    async fn get_participants(&self, conversation_id: Uuid) -> Result<Vec<ParticipantProfile>, sqlx::Error> {
        let state = self.state.lock().await;
        Ok(state
            .participants
            .iter()
            .filter(|p| p.conversation_id == conversation_id)
            .filter_map(|p| {
                state.users.get(&p.user_id).map(|u| ParticipantProfile {
                    user_id: u.id,
                    name: u.name.clone(),
                    avatar_url: u.avatar_url.clone(),
                    last_read_at: p.last_read_at,
                })
            })
            .collect())
    }

    async fn get_last_message(&self, conversation_id: Uuid) -> Result<Option<MessageWithSender>, sqlx::Error> {
        let state = self.state.lock().await;
        Ok(state
            .messages
            .iter()
            .filter(|m| m.conversation_id == conversation_id)
            .max_by(|a, b| (a.created_at, a.id).cmp(&(b.created_at, b.id)))
            .map(|m| state.enrich(m)))
    }

    async fn get_unread_count(&self, conversation_id: Uuid, user_id: Uuid) -> Result<i64, sqlx::Error> {
        Ok(self.state.lock().await.unread(conversation_id, user_id))
    }

    async fn get_total_unread_count(&self, user_id: Uuid) -> Result<i64, sqlx::Error> {
        let state = self.state.lock().await;
        Ok(state
            .participants
            .iter()
            .filter(|p| p.user_id == user_id)
            .map(|p| state.unread(p.conversation_id, user_id))
            .sum())
    }

    async fn insert_message(&self, message: NewMessage) -> Result<MessageWithSender, ServiceError> {
        Ok(self.state.lock().await.insert_message(&message))
    }

    async fn get_messages(
        &self,
        conversation_id: Uuid,
        before: Option<MessageCursor>,
        limit: i64,
    ) -> Result<Vec<MessageWithSender>, sqlx::Error> {
        let state = self.state.lock().await;
        let mut page: Vec<&Message> = state
            .messages
            .iter()
            .filter(|m| m.conversation_id == conversation_id)
            .filter(|m| before.map_or(true, |cursor| cursor.is_before(m)))
            .collect();
        page.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
        Ok(page
            .into_iter()
            .take(limit.max(0) as usize)
            .map(|m| state.enrich(m))
            .collect())
    }

    async fn get_message(&self, message_id: i64) -> Result<Option<Message>, sqlx::Error> {
        let state = self.state.lock().await;
        Ok(state.messages.iter().find(|m| m.id == message_id).cloned())
    }

    async fn soft_delete_message(&self, message_id: i64) -> Result<Message, sqlx::Error> {
        let mut state = self.state.lock().await;
        let now = state.tick();
        let message = state
            .messages
            .iter_mut()
            .find(|m| m.id == message_id)
            .ok_or(sqlx::Error::RowNotFound)?;
        message.content = None;
        message.attachments = Json(Vec::new());
        message.is_deleted = true;
        message.updated_at = now;
        Ok(message.clone())
    }

    async fn mark_conversation_read(
        &self,
        conversation_id: Uuid,
        user_id: Uuid,
    ) -> Result<DateTime<Utc>, sqlx::Error> {
        let mut state = self.state.lock().await;
        let now = state.tick();
        let member = state
            .participants
            .iter_mut()
            .find(|p| p.conversation_id == conversation_id && p.user_id == user_id)
            .ok_or(sqlx::Error::RowNotFound)?;
        member.last_read_at = Some(now);
        Ok(now)
    }

    async fn add_participants(
        &self,
        conversation_id: Uuid,
        user_ids: &[Uuid],
        notice: NewMessage,
    ) -> Result<(Vec<Uuid>, MessageWithSender), ServiceError> {
        let mut state = self.state.lock().await;
        let added = state.add_members(conversation_id, user_ids);
        let message = state.insert_message(&notice);
        Ok((added, message))
    }

    async fn remove_participant(
        &self,
        conversation_id: Uuid,
        user_id: Uuid,
        notice: NewMessage,
    ) -> Result<Option<MessageWithSender>, ServiceError> {
        let mut state = self.state.lock().await;
        if !state.is_member(conversation_id, user_id) {
            return Ok(None);
        }
        state
            .participants
            .retain(|p| !(p.conversation_id == conversation_id && p.user_id == user_id));
        Ok(Some(state.insert_message(&notice)))
    }
}
