//! Player message handlers

use crate::protocol::ServerMessage;
use crate::state::AppState;
use crate::types::{GameError, PlayerId};
use std::sync::Arc;

use super::Session;

pub async fn handle_join(
    state: &Arc<AppState>,
    session: &mut Session,
    name: String,
    existing_id: Option<PlayerId>,
) -> Option<ServerMessage> {
    if session.player_id.is_some() {
        return Some(GameError::AlreadyJoined.into());
    }

    let player = match state.add_player(&name, existing_id.as_deref()).await {
        Ok(player) => player,
        Err(e) => {
            tracing::info!("Join of {:?} refused: {}", name, e);
            return Some(e.into());
        }
    };

    // `joined` must reach this socket before any room broadcast
    session.send(ServerMessage::Joined {
        player_id: player.id.clone(),
        name: player.name.clone(),
        is_host: player.is_host,
    });
    state
        .connections
        .register(&player.id, &session.conn_id, session.tx.clone())
        .await;
    session.player_id = Some(player.id);

    state.broadcast_state().await;
    None
}

pub async fn handle_ready_toggle(state: &Arc<AppState>, player_id: &str) -> Option<ServerMessage> {
    match state.set_ready(player_id).await {
        Ok(ready) => {
            tracing::debug!("Player {} ready={}", player_id, ready);
            None
        }
        Err(e) => Some(e.into()),
    }
}

pub async fn handle_submit_word(
    state: &Arc<AppState>,
    player_id: &str,
    word: String,
) -> Option<ServerMessage> {
    match state.submit_word(player_id, &word).await {
        Ok(round) => {
            tracing::debug!("Round {}: word accepted from {}", round, player_id);
            None
        }
        Err(e) => Some(e.into()),
    }
}

pub async fn handle_chat(
    state: &Arc<AppState>,
    player_id: &str,
    message: String,
) -> Option<ServerMessage> {
    state.chat(player_id, &message).await.err().map(Into::into)
}

/// Free the seat and detach this connection from the room
pub async fn handle_leave(state: &Arc<AppState>, session: &mut Session) -> Option<ServerMessage> {
    let player_id = session.player_id.take()?;
    state
        .connections
        .unregister(&player_id, &session.conn_id)
        .await;
    state.player_left(&player_id).await;
    Some(ServerMessage::Left)
}
