// db/chatdb.rs
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{types::Json, PgConnection};
use uuid::Uuid;

use super::{db::DBClient, projectdb::ProjectExt};
use crate::{
    models::{bidmodel::ProjectRef, chatmodels::*},
    service::error::ServiceError,
};

const CONVERSATION_COLUMNS: &str =
    "c.id, c.kind, c.title, c.project_id, c.created_by, c.created_at, c.updated_at";

const CONVERSATION_RETURNING: &str =
    "id, kind, title, project_id, created_by, created_at, updated_at";

const MESSAGE_WITH_SENDER_COLUMNS: &str = "m.id, m.conversation_id, m.sender_id, m.content, \
     m.message_type, m.attachments, m.is_deleted, m.created_at, m.updated_at, \
     u.name AS sender_name, u.avatar_url AS sender_avatar_url";

const MESSAGE_RETURNING: &str = "id, conversation_id, sender_id, content, message_type, \
     attachments, is_deleted, created_at, updated_at";

#[async_trait]
pub trait ChatExt: ProjectExt + Send + Sync {
    async fn get_user_profile(&self, user_id: Uuid) -> Result<Option<ParticipantProfile>, sqlx::Error>;

    async fn find_direct_conversation(
        &self,
        user_one_id: Uuid,
        user_two_id: Uuid,
    ) -> Result<Option<Conversation>, sqlx::Error>;

    /// Creates the pair's conversation, or returns the one a concurrent request just created.
    async fn create_direct_conversation(
        &self,
        creator_id: Uuid,
        other_user_id: Uuid,
    ) -> Result<Conversation, ServiceError>;

    async fn create_group_conversation(
        &self,
        creator_id: Uuid,
        title: String,
        participant_ids: Vec<Uuid>,
    ) -> Result<Conversation, ServiceError>;

    async fn find_project_conversation(
        &self,
        project_id: Uuid,
    ) -> Result<Option<Conversation>, sqlx::Error>;

    async fn create_project_conversation(
        &self,
        project: &ProjectRef,
        creator_id: Uuid,
        participant_ids: Vec<Uuid>,
    ) -> Result<Conversation, ServiceError>;

    async fn get_conversation(&self, conversation_id: Uuid) -> Result<Option<Conversation>, sqlx::Error>;

    async fn is_participant(&self, conversation_id: Uuid, user_id: Uuid) -> Result<bool, sqlx::Error>;

    async fn get_user_conversations(&self, user_id: Uuid) -> Result<Vec<Conversation>, sqlx::Error>;

    async fn get_user_conversation_ids(&self, user_id: Uuid) -> Result<Vec<Uuid>, sqlx::Error>;

    async fn get_participants(&self, conversation_id: Uuid) -> Result<Vec<ParticipantProfile>, sqlx::Error>;

    async fn get_last_message(&self, conversation_id: Uuid) -> Result<Option<MessageWithSender>, sqlx::Error>;

    async fn get_unread_count(&self, conversation_id: Uuid, user_id: Uuid) -> Result<i64, sqlx::Error>;

    async fn get_total_unread_count(&self, user_id: Uuid) -> Result<i64, sqlx::Error>;

    /// Inserts the message and stamps the conversation's `updated_at` with its creation time.
    async fn insert_message(&self, message: NewMessage) -> Result<MessageWithSender, ServiceError>;

    /// Newest first, strictly older than `before` in `(created_at, id)` order.
    async fn get_messages(
        &self,
        conversation_id: Uuid,
        before: Option<MessageCursor>,
        limit: i64,
    ) -> Result<Vec<MessageWithSender>, sqlx::Error>;

    async fn get_message(&self, message_id: i64) -> Result<Option<Message>, sqlx::Error>;

    async fn soft_delete_message(&self, message_id: i64) -> Result<Message, sqlx::Error>;

    async fn mark_conversation_read(
        &self,
        conversation_id: Uuid,
        user_id: Uuid,
    ) -> Result<DateTime<Utc>, sqlx::Error>;

    /// Adds members (existing ones are skipped) and posts the notice in the same transaction.
    async fn add_participants(
        &self,
        conversation_id: Uuid,
        user_ids: &[Uuid],
        notice: NewMessage,
    ) -> Result<(Vec<Uuid>, MessageWithSender), ServiceError>;

    /// `None` when the user was not a member; nothing is written in that case.
    async fn remove_participant(
        &self,
        conversation_id: Uuid,
        user_id: Uuid,
        notice: NewMessage,
    ) -> Result<Option<MessageWithSender>, ServiceError>;
}

async fn insert_participants(
    conn: &mut PgConnection,
    conversation_id: Uuid,
    user_ids: &[Uuid],
) -> Result<Vec<Uuid>, sqlx::Error> {
    sqlx::query_scalar::<_, Uuid>(
        r#"
        INSERT INTO conversation_participants (conversation_id, user_id)
        SELECT $1, UNNEST($2::uuid[])
        ON CONFLICT (conversation_id, user_id) DO NOTHING
        RETURNING user_id
        "#,
    )
    .bind(conversation_id)
    .bind(user_ids)
    .fetch_all(conn)
    .await
}

async fn insert_message_row(
    conn: &mut PgConnection,
    message: &NewMessage,
) -> Result<MessageWithSender, sqlx::Error> {
    let sql = format!(
        r#"
        WITH inserted AS (
            INSERT INTO messages (conversation_id, sender_id, content, message_type, attachments)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {}
        )
        SELECT {}
        FROM inserted m
        JOIN users u ON u.id = m.sender_id
        "#,
        MESSAGE_RETURNING, MESSAGE_WITH_SENDER_COLUMNS
    );

    let inserted = sqlx::query_as::<_, MessageWithSender>(&sql)
        .bind(message.conversation_id)
        .bind(message.sender_id)
        .bind(&message.content)
        .bind(message.message_type)
        .bind(Json(&message.attachments))
        .fetch_one(&mut *conn)
        .await?;

    sqlx::query(
        r#"
        UPDATE conversations
        SET updated_at = $2
        WHERE id = $1
        "#,
    )
    .bind(message.conversation_id)
    .bind(inserted.message.created_at)
    .execute(&mut *conn)
    .await?;

    Ok(inserted)
}

#[async_trait]
impl ChatExt for DBClient {
    async fn get_user_profile(&self, user_id: Uuid) -> Result<Option<ParticipantProfile>, sqlx::Error> {
        sqlx::query_as::<_, ParticipantProfile>(
            r#"
            SELECT id AS user_id, name, avatar_url, NULL::timestamptz AS last_read_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
    }

    async fn find_direct_conversation(
        &self,
        user_one_id: Uuid,
        user_two_id: Uuid,
    ) -> Result<Option<Conversation>, sqlx::Error> {
        sqlx::query_as::<_, Conversation>(&format!(
            r#"
            SELECT {}
            FROM conversations c
            WHERE c.kind = 'direct'::conversation_kind AND c.direct_key = $1
            "#,
            CONVERSATION_COLUMNS
        ))
        .bind(direct_key(user_one_id, user_two_id))
        .fetch_optional(&self.pool)
        .await
    }

    async fn create_direct_conversation(
        &self,
        creator_id: Uuid,
        other_user_id: Uuid,
    ) -> Result<Conversation, ServiceError> {
        let mut tx = self.pool.begin().await?;

        let created = sqlx::query_as::<_, Conversation>(&format!(
            r#"
            INSERT INTO conversations (kind, created_by, direct_key)
            VALUES ('direct'::conversation_kind, $1, $2)
            ON CONFLICT (direct_key) DO NOTHING
            RETURNING {}
            "#,
            CONVERSATION_RETURNING
        ))
        .bind(creator_id)
        .bind(direct_key(creator_id, other_user_id))
        .fetch_optional(&mut *tx)
        .await?;

        let Some(conversation) = created else {
            tx.rollback().await?;
            return self
                .find_direct_conversation(creator_id, other_user_id)
                .await?
                .ok_or_else(|| ServiceError::Other("direct conversation vanished after conflict".to_string()));
        };

        insert_participants(&mut tx, conversation.id, &[creator_id, other_user_id]).await?;
        tx.commit().await?;

        Ok(conversation)
    }

    async fn create_group_conversation(
        &self,
        creator_id: Uuid,
        title: String,
        participant_ids: Vec<Uuid>,
    ) -> Result<Conversation, ServiceError> {
        let mut tx = self.pool.begin().await?;

        let conversation = sqlx::query_as::<_, Conversation>(&format!(
            r#"
            INSERT INTO conversations (kind, title, created_by)
            VALUES ('group'::conversation_kind, $1, $2)
            RETURNING {}
            "#,
            CONVERSATION_RETURNING
        ))
        .bind(title)
        .bind(creator_id)
        .fetch_one(&mut *tx)
        .await?;

        insert_participants(&mut tx, conversation.id, &participant_ids).await?;
        tx.commit().await?;

        Ok(conversation)
    }

    async fn find_project_conversation(
        &self,
        project_id: Uuid,
    ) -> Result<Option<Conversation>, sqlx::Error> {
        sqlx::query_as::<_, Conversation>(&format!(
            r#"
            SELECT {}
            FROM conversations c
            WHERE c.kind = 'project'::conversation_kind AND c.project_id = $1
            "#,
            CONVERSATION_COLUMNS
        ))
        .bind(project_id)
        .fetch_optional(&self.pool)
        .await
    }

    async fn create_project_conversation(
        &self,
        project: &ProjectRef,
        creator_id: Uuid,
        participant_ids: Vec<Uuid>,
    ) -> Result<Conversation, ServiceError> {
        let mut tx = self.pool.begin().await?;

        let created = sqlx::query_as::<_, Conversation>(&format!(
            r#"
            INSERT INTO conversations (kind, title, project_id, created_by)
            VALUES ('project'::conversation_kind, $1, $2, $3)
            ON CONFLICT (project_id) WHERE kind = 'project' DO NOTHING
            RETURNING {}
            "#,
            CONVERSATION_RETURNING
        ))
        .bind(&project.name)
        .bind(project.id)
        .bind(creator_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(conversation) = created else {
            tx.rollback().await?;
            return self
                .find_project_conversation(project.id)
                .await?
                .ok_or_else(|| ServiceError::Other("project conversation vanished after conflict".to_string()));
        };

        insert_participants(&mut tx, conversation.id, &participant_ids).await?;
        tx.commit().await?;

        Ok(conversation)
    }

    async fn get_conversation(&self, conversation_id: Uuid) -> Result<Option<Conversation>, sqlx::Error> {
        sqlx::query_as::<_, Conversation>(&format!(
            "SELECT {} FROM conversations c WHERE c.id = $1",
            CONVERSATION_COLUMNS
        ))
        .bind(conversation_id)
        .fetch_optional(&self.pool)
        .await
    }

    async fn is_participant(&self, conversation_id: Uuid, user_id: Uuid) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM conversation_participants
                WHERE conversation_id = $1 AND user_id = $2
            )
            "#,
        )
        .bind(conversation_id)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
    }

    async fn get_user_conversations(&self, user_id: Uuid) -> Result<Vec<Conversation>, sqlx::Error> {
        sqlx::query_as::<_, Conversation>(&format!(
            r#"
            SELECT {}
            FROM conversations c
            JOIN conversation_participants cp ON cp.conversation_id = c.id
            WHERE cp.user_id = $1
            ORDER BY c.updated_at DESC, c.id
            "#,
            CONVERSATION_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
    }

    async fn get_user_conversation_ids(&self, user_id: Uuid) -> Result<Vec<Uuid>, sqlx::Error> {
        sqlx::query_scalar::<_, Uuid>(
            "SELECT conversation_id FROM conversation_participants WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
    }

    async fn get_participants(&self, conversation_id: Uuid) -> Result<Vec<ParticipantProfile>, sqlx::Error> {
        sqlx::query_as::<_, ParticipantProfile>(
            r#"
            SELECT u.id AS user_id, u.name, u.avatar_url, cp.last_read_at
            FROM conversation_participants cp
            JOIN users u ON u.id = cp.user_id
            WHERE cp.conversation_id = $1
            ORDER BY cp.joined_at ASC, u.name ASC
            "#,
        )
        .bind(conversation_id)
        .fetch_all(&self.pool)
        .await
    }

    async fn get_last_message(&self, conversation_id: Uuid) -> Result<Option<MessageWithSender>, sqlx::Error> {
        sqlx::query_as::<_, MessageWithSender>(&format!(
            r#"
            SELECT {}
            FROM messages m
            JOIN users u ON u.id = m.sender_id
            WHERE m.conversation_id = $1
            ORDER BY m.created_at DESC, m.id DESC
            LIMIT 1
            "#,
            MESSAGE_WITH_SENDER_COLUMNS
        ))
        .bind(conversation_id)
        .fetch_optional(&self.pool)
        .await
    }

    async fn get_unread_count(&self, conversation_id: Uuid, user_id: Uuid) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*)
            FROM messages m
            JOIN conversation_participants cp
              ON cp.conversation_id = m.conversation_id AND cp.user_id = $2
            WHERE m.conversation_id = $1
              AND m.sender_id <> $2
              AND m.is_deleted = false
              AND (cp.last_read_at IS NULL OR m.created_at > cp.last_read_at)
            "#,
        )
        .bind(conversation_id)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
    }

    async fn get_total_unread_count(&self, user_id: Uuid) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*)
            FROM messages m
            JOIN conversation_participants cp
              ON cp.conversation_id = m.conversation_id AND cp.user_id = $1
            WHERE m.sender_id <> $1
              AND m.is_deleted = false
              AND (cp.last_read_at IS NULL OR m.created_at > cp.last_read_at)
            "#,
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
    }

    async fn insert_message(&self, message: NewMessage) -> Result<MessageWithSender, ServiceError> {
        let mut tx = self.pool.begin().await?;
        let inserted = insert_message_row(&mut tx, &message).await?;
        tx.commit().await?;
        Ok(inserted)
    }

    async fn get_messages(
        &self,
        conversation_id: Uuid,
        before: Option<MessageCursor>,
        limit: i64,
    ) -> Result<Vec<MessageWithSender>, sqlx::Error> {
        sqlx::query_as::<_, MessageWithSender>(&format!(
            r#"
            SELECT {}
            FROM messages m
            JOIN users u ON u.id = m.sender_id
            WHERE m.conversation_id = $1
              AND ($2::timestamptz IS NULL OR (m.created_at, m.id) < ($2::timestamptz, $3::bigint))
            ORDER BY m.created_at DESC, m.id DESC
            LIMIT $4
            "#,
            MESSAGE_WITH_SENDER_COLUMNS
        ))
        .bind(conversation_id)
        .bind(before.map(|c| c.created_at))
        .bind(before.map(|c| c.id))
        .bind(limit)
        .fetch_all(&self.pool)
        .await
    }

    async fn get_message(&self, message_id: i64) -> Result<Option<Message>, sqlx::Error> {
        sqlx::query_as::<_, Message>(&format!(
            "SELECT {} FROM messages WHERE id = $1",
            MESSAGE_RETURNING
        ))
        .bind(message_id)
        .fetch_optional(&self.pool)
        .await
    }

    async fn soft_delete_message(&self, message_id: i64) -> Result<Message, sqlx::Error> {
        sqlx::query_as::<_, Message>(&format!(
            r#"
            UPDATE messages
            SET content = NULL, attachments = '[]'::jsonb, is_deleted = true, updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            MESSAGE_RETURNING
        ))
        .bind(message_id)
        .fetch_one(&self.pool)
        .await
    }

    async fn mark_conversation_read(
        &self,
        conversation_id: Uuid,
        user_id: Uuid,
    ) -> Result<DateTime<Utc>, sqlx::Error> {
        sqlx::query_scalar::<_, DateTime<Utc>>(
            r#"
            UPDATE conversation_participants
            SET last_read_at = clock_timestamp()
            WHERE conversation_id = $1 AND user_id = $2
            RETURNING last_read_at
            "#,
        )
        .bind(conversation_id)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
    }

    async fn add_participants(
        &self,
        conversation_id: Uuid,
        user_ids: &[Uuid],
        notice: NewMessage,
    ) -> Result<(Vec<Uuid>, MessageWithSender), ServiceError> {
        let mut tx = self.pool.begin().await?;
        let added = insert_participants(&mut tx, conversation_id, user_ids).await?;
        let message = insert_message_row(&mut tx, &notice).await?;
        tx.commit().await?;
        Ok((added, message))
    }

    async fn remove_participant(
        &self,
        conversation_id: Uuid,
        user_id: Uuid,
        notice: NewMessage,
    ) -> Result<Option<MessageWithSender>, ServiceError> {
        let mut tx = self.pool.begin().await?;

        let removed = sqlx::query(
            r#"
            DELETE FROM conversation_participants
            WHERE conversation_id = $1 AND user_id = $2
            "#,
        )
        .bind(conversation_id)
        .bind(user_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if removed == 0 {
            tx.rollback().await?;
            return Ok(None);
        }

        let message = insert_message_row(&mut tx, &notice).await?;
        tx.commit().await?;
        Ok(Some(message))
    }
}
