//! WebSocket message dispatch
//!
//! Every message except `join` and `ping` needs a joined session; that is checked here before
//! handing off to the player or host handlers.

use crate::protocol::{ClientMessage, ServerMessage};
use crate::state::AppState;
use crate::types::GameError;
use std::sync::Arc;

use super::{host, player, Session};

/// Resolve the session's player id or return a NOT_JOINED error early
macro_rules! require_joined {
    ($session:expr) => {
        match $session.player_id.clone() {
            Some(id) => id,
            None => return Some(GameError::NotJoined.into()),
        }
    };
}

/// Handle a client message and return an optional direct reply
pub async fn handle_message(
    msg: ClientMessage,
    session: &mut Session,
    state: &Arc<AppState>,
) -> Option<ServerMessage> {
    match msg {
        ClientMessage::Join { name, player_id } => {
            player::handle_join(state, session, name, player_id).await
        }

        ClientMessage::Ping => Some(ServerMessage::Pong),

        ClientMessage::ReadyToggle => {
            let player_id = require_joined!(session);
            player::handle_ready_toggle(state, &player_id).await
        }

        ClientMessage::SubmitWord { word } => {
            let player_id = require_joined!(session);
            player::handle_submit_word(state, &player_id, word).await
        }

        ClientMessage::ChatSay { message } => {
            let player_id = require_joined!(session);
            player::handle_chat(state, &player_id, message).await
        }

        ClientMessage::StatsRequest => {
            require_joined!(session);
            Some(ServerMessage::StatsOpen {
                stats: state.build_stats().await,
            })
        }

        ClientMessage::Leave => {
            require_joined!(session);
            player::handle_leave(state, session).await
        }

        // Host-only; the host check lives with the state so it sees the same lock
        ClientMessage::StartGame => {
            let player_id = require_joined!(session);
            host::handle_start_game(state, &player_id).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{GameConfig, GamePhase};
    use tokio::sync::mpsc;

    fn session() -> (Session, mpsc::UnboundedReceiver<ServerMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Session::new(tx), rx)
    }

    fn error_code(msg: Option<ServerMessage>) -> String {
        match msg {
            Some(ServerMessage::Error { code, .. }) => code,
            other => panic!("Expected error, got {:?}", other),
        }
    }

    async fn join(state: &Arc<AppState>, session: &mut Session, name: &str) {
        let reply = handle_message(
            ClientMessage::Join {
                name: name.to_string(),
                player_id: None,
            },
            session,
            state,
        )
        .await;
        assert!(reply.is_none());
    }

    #[tokio::test]
    async fn test_actions_require_join() {
        let state = Arc::new(AppState::new(GameConfig::default()));
        let (mut session, _rx) = session();

        for msg in [
            ClientMessage::ReadyToggle,
            ClientMessage::StartGame,
            ClientMessage::StatsRequest,
            ClientMessage::Leave,
            ClientMessage::SubmitWord {
                word: "tail".to_string(),
            },
        ] {
            let reply = handle_message(msg, &mut session, &state).await;
            assert_eq!(error_code(reply), "NOT_JOINED");
        }
    }

    #[tokio::test]
    async fn test_ping_works_without_join() {
        let state = Arc::new(AppState::new(GameConfig::default()));
        let (mut session, _rx) = session();

        let reply = handle_message(ClientMessage::Ping, &mut session, &state).await;
        assert_eq!(reply, Some(ServerMessage::Pong));
    }

    #[tokio::test]
    async fn test_join_sends_joined_before_state() {
        let state = Arc::new(AppState::new(GameConfig::default()));
        let (mut session, mut rx) = session();

        join(&state, &mut session, "Alice").await;
        assert!(session.player_id.is_some());

        match rx.recv().await {
            Some(ServerMessage::Joined { name, is_host, .. }) => {
                assert_eq!(name, "Alice");
                assert!(is_host);
            }
            other => panic!("Expected joined, got {:?}", other),
        }
        assert!(matches!(
            rx.recv().await,
            Some(ServerMessage::RoomState { .. })
        ));
    }

    #[tokio::test]
    async fn test_second_join_on_same_connection() {
        let state = Arc::new(AppState::new(GameConfig::default()));
        let (mut session, _rx) = session();
        join(&state, &mut session, "Alice").await;

        let reply = handle_message(
            ClientMessage::Join {
                name: "Again".to_string(),
                player_id: None,
            },
            &mut session,
            &state,
        )
        .await;
        assert_eq!(error_code(reply), "ALREADY_JOINED");
    }

    #[tokio::test]
    async fn test_room_full() {
        let config = GameConfig {
            max_players: 1,
            ..GameConfig::default()
        };
        let state = Arc::new(AppState::new(config));
        let (mut first, _rx1) = session();
        let (mut second, _rx2) = session();
        join(&state, &mut first, "Alice").await;

        let reply = handle_message(
            ClientMessage::Join {
                name: "Bob".to_string(),
                player_id: None,
            },
            &mut second,
            &state,
        )
        .await;
        assert_eq!(error_code(reply), "ROOM_FULL");
        assert!(second.player_id.is_none());
    }

    #[tokio::test]
    async fn test_start_game_requires_host() {
        let state = Arc::new(AppState::new(GameConfig::default()));
        let (mut host, _rx1) = session();
        let (mut guest, _rx2) = session();
        join(&state, &mut host, "Alice").await;
        join(&state, &mut guest, "Bob").await;

        let reply = handle_message(ClientMessage::StartGame, &mut guest, &state).await;
        assert_eq!(error_code(reply), "NOT_HOST");

        let reply = handle_message(ClientMessage::StartGame, &mut host, &state).await;
        assert_eq!(error_code(reply), "NOT_ALL_READY");
        assert_eq!(state.phase().await, GamePhase::Lobby);
    }

    #[tokio::test]
    async fn test_submit_outside_submission() {
        let state = Arc::new(AppState::new(GameConfig::default()));
        let (mut session, _rx) = session();
        join(&state, &mut session, "Alice").await;

        let reply = handle_message(
            ClientMessage::SubmitWord {
                word: "tail".to_string(),
            },
            &mut session,
            &state,
        )
        .await;
        assert_eq!(error_code(reply), "WRONG_PHASE");
    }

    #[tokio::test]
    async fn test_leave_frees_seat() {
        let state = Arc::new(AppState::new(GameConfig::default()));
        let (mut session, _rx) = session();
        join(&state, &mut session, "Alice").await;

        let reply = handle_message(ClientMessage::Leave, &mut session, &state).await;
        assert_eq!(reply, Some(ServerMessage::Left));
        assert!(session.player_id.is_none());
        assert!(state.public_snapshot().await.players.is_empty());
        assert_eq!(state.connections.connected_count().await, 0);
    }
}
