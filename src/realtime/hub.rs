// realtime/hub.rs
use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info};
use uuid::Uuid;

use super::events::ServerEvent;

pub type ClientId = Uuid;

struct ClientHandle {
    user_id: Uuid,
    tx: mpsc::UnboundedSender<ServerEvent>,
    rooms: HashSet<String>,
}

#[derive(Default)]
struct HubState {
    clients: HashMap<ClientId, ClientHandle>,
    rooms: HashMap<String, HashSet<ClientId>>,
}

impl HubState {
    fn join(&mut self, client_id: ClientId, room: &str) -> bool {
        let Some(client) = self.clients.get_mut(&client_id) else {
            return false;
        };
        client.rooms.insert(room.to_string());
        self.rooms
            .entry(room.to_string())
            .or_default()
            .insert(client_id);
        true
    }

    fn leave(&mut self, client_id: ClientId, room: &str) {
        if let Some(client) = self.clients.get_mut(&client_id) {
            client.rooms.remove(room);
        }
        if let Some(members) = self.rooms.get_mut(room) {
            members.remove(&client_id);
            if members.is_empty() {
                self.rooms.remove(room);
            }
        }
    }

    fn clients_of(&self, user_id: Uuid) -> Vec<ClientId> {
        self.clients
            .iter()
            .filter(|(_, c)| c.user_id == user_id)
            .map(|(id, _)| *id)
            .collect()
    }
}

/// Connected sockets and the rooms they listen on.
///
/// Room membership here only routes pushes. Whether a user may act on a
/// conversation is always decided against the database.
#[derive(Default)]
pub struct RealtimeHub {
    state: RwLock<HubState>,
}

impl RealtimeHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, user_id: Uuid, tx: mpsc::UnboundedSender<ServerEvent>) -> ClientId {
        let client_id = Uuid::new_v4();
        self.state.write().await.clients.insert(
            client_id,
            ClientHandle {
                user_id,
                tx,
                rooms: HashSet::new(),
            },
        );
        info!("Client {} registered for user {}", client_id, user_id);
        client_id
    }

    pub async fn unregister(&self, client_id: ClientId) {
        let mut state = self.state.write().await;
        let Some(client) = state.clients.remove(&client_id) else {
            return;
        };
        for room in &client.rooms {
            if let Some(members) = state.rooms.get_mut(room) {
                members.remove(&client_id);
                if members.is_empty() {
                    state.rooms.remove(room);
                }
            }
        }
        info!("Client {} unregistered", client_id);
    }

    pub async fn join(&self, client_id: ClientId, room: &str) -> bool {
        self.state.write().await.join(client_id, room)
    }

    pub async fn leave(&self, client_id: ClientId, room: &str) {
        self.state.write().await.leave(client_id, room);
    }

    /// Delivers to one socket. `false` when it is gone.
    pub async fn send_to_client(&self, client_id: ClientId, event: ServerEvent) -> bool {
        let state = self.state.read().await;
        state
            .clients
            .get(&client_id)
            .map(|c| c.tx.send(event).is_ok())
            .unwrap_or(false)
    }

    /// Number of sockets that accepted the event.
    pub async fn emit(&self, room: &str, event: &ServerEvent) -> usize {
        let state = self.state.read().await;
        let Some(members) = state.rooms.get(room) else {
            return 0;
        };

        let mut delivered = 0;
        for client_id in members {
            if let Some(client) = state.clients.get(client_id) {
                if client.tx.send(event.clone()).is_ok() {
                    delivered += 1;
                } else {
                    debug!("Dropping {} for closed client {}", event.name(), client_id);
                }
            }
        }
        delivered
    }

    pub async fn client_count(&self) -> usize {
        self.state.read().await.clients.len()
    }

    pub async fn room_size(&self, room: &str) -> usize {
        self.state
            .read()
            .await
            .rooms
            .get(room)
            .map(|m| m.len())
            .unwrap_or(0)
    }

    pub async fn is_in_room(&self, client_id: ClientId, room: &str) -> bool {
        self.state
            .read()
            .await
            .rooms
            .get(room)
            .map(|m| m.contains(&client_id))
            .unwrap_or(false)
    }
}

/// Outbound side of the gateway as seen by the services.
#[async_trait]
pub trait EventBroadcaster: Send + Sync {
    async fn to_room(&self, room: &str, event: ServerEvent);

    /// Subscribes every live socket of `user_id` to `room`.
    async fn join_user(&self, room: &str, user_id: Uuid);

    /// Unsubscribes every live socket of `user_id` from `room`.
    async fn evict_user(&self, room: &str, user_id: Uuid);
}

#[async_trait]
impl EventBroadcaster for RealtimeHub {
    async fn to_room(&self, room: &str, event: ServerEvent) {
        let delivered = self.emit(room, &event).await;
        debug!("{} -> {} ({} sockets)", event.name(), room, delivered);
    }

    async fn join_user(&self, room: &str, user_id: Uuid) {
        let mut state = self.state.write().await;
        for client_id in state.clients_of(user_id) {
            state.join(client_id, room);
        }
    }

    async fn evict_user(&self, room: &str, user_id: Uuid) {
        let mut state = self.state.write().await;
        for client_id in state.clients_of(user_id) {
            state.leave(client_id, room);
        }
    }
}
