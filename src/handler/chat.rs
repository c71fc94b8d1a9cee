use std::sync::Arc;

use axum::{
    extract::{Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post},
    Extension, Json, Router,
};
use uuid::Uuid;
use validator::Validate;

use crate::{
    dtos::{
        chatdtos::{
            AddParticipantsDto, CreateDirectConversationDto, CreateGroupConversationDto,
            CreateProjectConversationDto, MessagesQuery, SendMessageDto,
        },
        ApiResponse,
    },
    error::HttpError,
    middleware::JWTAuthMiddeware,
    AppState,
};

pub fn chat_handler() -> Router {
    Router::new()
        .route("/conversations", get(get_conversations))
        .route("/conversations/direct", post(create_direct_conversation))
        .route("/conversations/group", post(create_group_conversation))
        .route("/conversations/:id", get(get_conversation))
        .route(
            "/conversations/:id/messages",
            get(get_messages).post(send_message),
        )
        .route("/conversations/:id/read", post(mark_conversation_read))
        .route("/conversations/:id/participants", post(add_participants))
        .route(
            "/conversations/:id/participants/:user_id",
            delete(remove_participant),
        )
        .route("/messages/:id", delete(delete_message))
        .route(
            "/projects/:project_id/conversation",
            post(create_project_conversation),
        )
        .route("/unread-count", get(get_unread_count))
}

pub async fn get_conversations(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
) -> Result<impl IntoResponse, HttpError> {
    let conversations = app_state
        .chat_service
        .list_conversations(auth.user.id)
        .await?;

    Ok(Json(ApiResponse::success("Conversations retrieved", conversations)))
}

pub async fn get_conversation(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Path(conversation_id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpError> {
    let conversation = app_state
        .chat_service
        .get_conversation(auth.user.id, conversation_id)
        .await?;

    Ok(Json(ApiResponse::success("Conversation retrieved", conversation)))
}

pub async fn create_direct_conversation(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Json(body): Json<CreateDirectConversationDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let conversation = app_state
        .chat_service
        .create_direct(auth.user.id, body.other_user_id)
        .await?;

    Ok(Json(ApiResponse::success("Conversation ready", conversation)))
}

pub async fn create_group_conversation(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Json(body): Json<CreateGroupConversationDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let conversation = app_state
        .chat_service
        .create_group(auth.user.id, body)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success("Group conversation created", conversation)),
    ))
}

pub async fn create_project_conversation(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Path(project_id): Path<Uuid>,
    body: Option<Json<CreateProjectConversationDto>>,
) -> Result<impl IntoResponse, HttpError> {
    let body = body.map(|Json(body)| body).unwrap_or_default();

    let conversation = app_state
        .chat_service
        .create_project_conversation(auth.user.id, project_id, body.participant_ids)
        .await?;

    Ok(Json(ApiResponse::success("Project conversation ready", conversation)))
}

pub async fn get_messages(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Path(conversation_id): Path<Uuid>,
    Query(query): Query<MessagesQuery>,
) -> Result<impl IntoResponse, HttpError> {
    let page = app_state
        .chat_service
        .get_messages(auth.user.id, conversation_id, query.cursor, query.limit)
        .await?;

    Ok(Json(ApiResponse::success("Messages retrieved", page)))
}

pub async fn send_message(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Path(conversation_id): Path<Uuid>,
    Json(body): Json<SendMessageDto>,
) -> Result<impl IntoResponse, HttpError> {
    let message = app_state
        .chat_service
        .send_message(auth.user.id, conversation_id, body)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success("Message sent", message)),
    ))
}

pub async fn delete_message(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Path(message_id): Path<i64>,
) -> Result<impl IntoResponse, HttpError> {
    let message = app_state
        .chat_service
        .delete_message(auth.user.id, message_id)
        .await?;

    Ok(Json(ApiResponse::success("Message deleted", message)))
}

pub async fn mark_conversation_read(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Path(conversation_id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpError> {
    let read_at = app_state
        .chat_service
        .mark_read(auth.user.id, conversation_id)
        .await?;

    Ok(Json(ApiResponse::success(
        "Conversation marked as read",
        serde_json::json!({ "conversation_id": conversation_id, "last_read_at": read_at }),
    )))
}

pub async fn get_unread_count(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
) -> Result<impl IntoResponse, HttpError> {
    let unread_count = app_state.chat_service.unread_count(auth.user.id).await?;

    Ok(Json(ApiResponse::success(
        "Unread count retrieved",
        serde_json::json!({ "unread_count": unread_count }),
    )))
}

pub async fn add_participants(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Path(conversation_id): Path<Uuid>,
    Json(body): Json<AddParticipantsDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let added = app_state
        .chat_service
        .add_participants(auth.user.id, conversation_id, body.user_ids)
        .await?;

    Ok(Json(ApiResponse::success(
        "Participants added",
        serde_json::json!({ "added": added }),
    )))
}

pub async fn remove_participant(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Path((conversation_id, user_id)): Path<(Uuid, Uuid)>,
) -> Result<impl IntoResponse, HttpError> {
    app_state
        .chat_service
        .remove_participant(auth.user.id, conversation_id, user_id)
        .await?;

    Ok(Json(ApiResponse::success(
        "Participant removed",
        serde_json::json!({ "conversation_id": conversation_id, "user_id": user_id }),
    )))
}
