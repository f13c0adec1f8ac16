pub mod handlers;
mod host;
mod player;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures::{sink::SinkExt, stream::StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::broadcast::Outbound;
use crate::protocol::{ClientMessage, ServerMessage};
use crate::state::AppState;
use crate::types::PlayerId;

/// Per-connection state
#[derive(Debug)]
pub struct Session {
    pub conn_id: String,
    /// Set once `join` succeeded
    pub player_id: Option<PlayerId>,
    /// This connection's own outbound queue
    pub tx: Outbound,
}

impl Session {
    pub fn new(tx: Outbound) -> Self {
        Self {
            conn_id: ulid::Ulid::new().to_string(),
            player_id: None,
            tx,
        }
    }

    /// Queue a message for this connection only
    pub fn send(&self, msg: ServerMessage) {
        if self.tx.send(msg).is_err() {
            tracing::debug!("Connection {} already closed", self.conn_id);
        }
    }
}

/// WebSocket upgrade handler
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handle individual WebSocket connection
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut session = Session::new(tx);

    tracing::info!("WebSocket connected: {}", session.conn_id);

    loop {
        tokio::select! {
            // Broadcasts and direct replies, in the order they were queued
            outbound = rx.recv() => {
                let Some(msg) = outbound else { break };
                match serde_json::to_string(&msg) {
                    Ok(json) => {
                        if sender.send(Message::Text(json.into())).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => tracing::error!("Failed to serialize {:?}: {}", msg, e),
                }
            }

            // Handle client messages
            ws_msg = receiver.next() => {
                match ws_msg {
                    Some(Ok(Message::Text(text))) => {
                        tracing::debug!("Received message: {}", text);

                        match serde_json::from_str::<ClientMessage>(&text) {
                            Ok(client_msg) => {
                                let leaving = matches!(client_msg, ClientMessage::Leave);
                                if let Some(response) =
                                    handlers::handle_message(client_msg, &mut session, &state).await
                                {
                                    session.send(response);
                                }
                                if leaving {
                                    // Flush the acknowledgement before closing
                                    while let Ok(msg) = rx.try_recv() {
                                        if let Ok(json) = serde_json::to_string(&msg) {
                                            let _ = sender.send(Message::Text(json.into())).await;
                                        }
                                    }
                                    break;
                                }
                            }
                            Err(e) => {
                                tracing::warn!("Failed to parse client message: {}", e);
                                session.send(ServerMessage::error(
                                    "PARSE_ERROR",
                                    format!("Invalid message format: {}", e),
                                ));
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) => {
                        tracing::info!("WebSocket closed");
                        break;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::warn!("WebSocket error: {}", e);
                        break;
                    }
                    None => break,
                }
            }
        }
    }

    if let Some(player_id) = session.player_id.take() {
        // A rejoin from another socket owns the player now
        if state
            .connections
            .unregister(&player_id, &session.conn_id)
            .await
        {
            state.player_disconnected(&player_id).await;
        }
    }
    tracing::info!("WebSocket connection {} closed", session.conn_id);
}
