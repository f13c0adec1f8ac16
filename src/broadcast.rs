use crate::protocol::ServerMessage;
use crate::types::PlayerId;
use std::collections::HashMap;
use tokio::sync::{mpsc, RwLock};

/// Outbound queue of one socket
pub type Outbound = mpsc::UnboundedSender<ServerMessage>;

struct Client {
    conn_id: String,
    tx: Outbound,
}

/// Routes server messages to joined players. Each player has at most one live connection;
/// a rejoin from another socket replaces the previous one.
#[derive(Default)]
pub struct Broadcaster {
    clients: RwLock<HashMap<PlayerId, Client>>,
}

impl Broadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, player_id: &str, conn_id: &str, tx: Outbound) {
        let previous = self.clients.write().await.insert(
            player_id.to_string(),
            Client {
                conn_id: conn_id.to_string(),
                tx,
            },
        );
        if let Some(previous) = previous {
            tracing::debug!(
                "Player {} moved from connection {} to {}",
                player_id,
                previous.conn_id,
                conn_id
            );
        }
    }

    /// Remove the player's route if it still belongs to `conn_id`.
    /// Returns false when a newer connection has taken over.
    pub async fn unregister(&self, player_id: &str, conn_id: &str) -> bool {
        let mut clients = self.clients.write().await;
        match clients.get(player_id) {
            Some(client) if client.conn_id == conn_id => {
                clients.remove(player_id);
                true
            }
            _ => false,
        }
    }

    pub async fn send_to(&self, player_id: &str, msg: ServerMessage) -> bool {
        let delivered = match self.clients.read().await.get(player_id) {
            Some(client) => client.tx.send(msg).is_ok(),
            None => return false,
        };
        if !delivered {
            tracing::debug!("Dropping dead connection for player {}", player_id);
            self.clients.write().await.remove(player_id);
        }
        delivered
    }

    /// Deliver to every registered player; recipients whose socket is gone are dropped
    pub async fn broadcast(&self, msg: ServerMessage) {
        let dead: Vec<PlayerId> = {
            let clients = self.clients.read().await;
            clients
                .iter()
                .filter(|(_, client)| client.tx.send(msg.clone()).is_err())
                .map(|(player_id, _)| player_id.clone())
                .collect()
        };

        if !dead.is_empty() {
            let mut clients = self.clients.write().await;
            for player_id in dead {
                tracing::debug!("Dropping dead connection for player {}", player_id);
                clients.remove(&player_id);
            }
        }
    }

    pub async fn connected_count(&self) -> usize {
        self.clients.read().await.len()
    }
}
