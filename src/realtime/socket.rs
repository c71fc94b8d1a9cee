// realtime/socket.rs
//! WebSocket gateway: authenticate the handshake, then relay client events into the
//! messaging core and push hub events back out.
use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Query, WebSocketUpgrade,
    },
    http::HeaderMap,
    response::IntoResponse,
    Extension,
};
use axum_extra::extract::cookie::CookieJar;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{
    events::{conversation_room, user_room, ClientEvent, ServerEvent},
    hub::{ClientId, RealtimeHub},
};
use crate::{
    error::{ErrorMessage, HttpError},
    middleware::{authenticate_token, extract_token},
    models::usermodel::User,
    service::{chat_service::ChatService, error::ServiceError},
    AppState,
};

#[derive(Debug, Deserialize)]
pub struct SocketAuthQuery {
    pub token: Option<String>,
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Extension(app_state): Extension<Arc<AppState>>,
    Query(query): Query<SocketAuthQuery>,
    cookie_jar: CookieJar,
    headers: HeaderMap,
) -> Result<impl IntoResponse, HttpError> {
    let token = extract_token(query.token.as_deref(), &headers, &cookie_jar)
        .ok_or_else(|| HttpError::unauthorized(ErrorMessage::TokenNotProvided.to_string()))?;

    let user = authenticate_token(&app_state, token).await?;

    Ok(ws.on_upgrade(move |socket| handle_socket(socket, app_state, user)))
}

async fn handle_socket(socket: WebSocket, app_state: Arc<AppState>, user: User) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerEvent>();

    let hub = app_state.hub.clone();
    let chat = app_state.chat_service.clone();
    let client_id = hub.register(user.id, tx).await;

    hub.join(client_id, &user_room(user.id)).await;
    match chat.conversation_ids_for(user.id).await {
        Ok(conversation_ids) => {
            for conversation_id in conversation_ids {
                hub.join(client_id, &conversation_room(conversation_id)).await;
            }
        }
        Err(e) => warn!("Could not load conversations for {}: {}", user.id, e),
    }

    info!(
        "Socket {} connected for user {} ({} online)",
        client_id,
        user.id,
        hub.client_count().await
    );

    let mut send_task = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let text = match serde_json::to_string(&event) {
                Ok(text) => text,
                Err(e) => {
                    warn!("Could not encode {}: {}", event.name(), e);
                    continue;
                }
            };
            if ws_tx.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    loop {
        tokio::select! {
            incoming = ws_rx.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        handle_text(&chat, &hub, client_id, user.id, &text).await;
                    }
                    Some(Ok(Message::Binary(data))) => match String::from_utf8(data) {
                        Ok(text) => handle_text(&chat, &hub, client_id, user.id, &text).await,
                        Err(_) => reply_error(&hub, client_id, "Binary frames must be UTF-8 JSON").await,
                    },
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!("Socket error for {}: {}", client_id, e);
                        break;
                    }
                }
            }
            _ = &mut send_task => break,
        }
    }

    hub.unregister(client_id).await;
    send_task.abort();

    info!("Socket {} disconnected for user {}", client_id, user.id);
}

async fn handle_text(chat: &ChatService, hub: &RealtimeHub, client_id: ClientId, user_id: Uuid, text: &str) {
    let event = match serde_json::from_str::<ClientEvent>(text) {
        Ok(event) => event,
        Err(e) => {
            debug!("Unreadable frame from {}: {}", client_id, e);
            reply_error(hub, client_id, &format!("Invalid event: {}", e)).await;
            return;
        }
    };

    if let Err(e) = handle_client_event(chat, hub, client_id, user_id, event).await {
        debug!("Event from {} failed: {}", client_id, e);
        let message = if e.status_code().is_server_error() {
            ErrorMessage::ServerError.to_string()
        } else {
            e.to_string()
        };
        reply_error(hub, client_id, &message).await;
    }
}

/// Errors go back to the originating socket only; the caller turns them into an `error` event.
pub async fn handle_client_event(
    chat: &ChatService,
    hub: &RealtimeHub,
    client_id: ClientId,
    user_id: Uuid,
    event: ClientEvent,
) -> Result<(), ServiceError> {
    match event {
        ClientEvent::Join { conversation_id } => {
            chat.ensure_participant(conversation_id, user_id).await?;
            let room = conversation_room(conversation_id);
            hub.join(client_id, &room).await;
            debug!("{} joined {} ({} sockets)", client_id, room, hub.room_size(&room).await);
            hub.send_to_client(client_id, ServerEvent::ConversationJoined { conversation_id })
                .await;
        }
        ClientEvent::Leave { conversation_id } => {
            let room = conversation_room(conversation_id);
            if hub.is_in_room(client_id, &room).await {
                hub.leave(client_id, &room).await;
                debug!("{} left {}", client_id, room);
            }
        }
        ClientEvent::SendMessage {
            conversation_id,
            message,
        } => {
            chat.send_message(user_id, conversation_id, message).await?;
        }
        ClientEvent::DeleteMessage { message_id } => {
            chat.delete_message(user_id, message_id).await?;
        }
        ClientEvent::MarkRead { conversation_id } => {
            chat.mark_read(user_id, conversation_id).await?;
        }
        ClientEvent::Ping => {
            hub.send_to_client(client_id, ServerEvent::Pong).await;
        }
    }
    Ok(())
}

async fn reply_error(hub: &RealtimeHub, client_id: ClientId, message: &str) {
    hub.send_to_client(
        client_id,
        ServerEvent::Error {
            message: message.to_string(),
        },
    )
    .await;
}
