//! Host-only command handlers

use crate::protocol::ServerMessage;
use crate::state::AppState;
use std::sync::Arc;

pub async fn handle_start_game(state: &Arc<AppState>, player_id: &str) -> Option<ServerMessage> {
    tracing::info!("Start requested by {}", player_id);
    match state.start_game(player_id).await {
        Ok(()) => None,
        Err(e) => {
            tracing::debug!("Start refused: {}", e);
            Some(e.into())
        }
    }
}
