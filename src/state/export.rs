//! Read-only projections of the room.
//!
//! `public_snapshot` is what every client sees in `room.state`. `diagnostic_snapshot` is the
//! full dump served at `/db`, secrets included, for operators watching a live session.

use super::{AppState, Room};
use crate::protocol::{PublicPlayer, PublicState};
use crate::types::*;
use serde::Serialize;

/// Full room dump for diagnostics
#[derive(Debug, Clone, Serialize)]
pub struct RoomSnapshot {
    pub phase: GamePhase,
    pub round: RoundIndex,
    pub max_rounds: u32,
    pub remaining_ms: u64,
    /// In join order
    pub players: Vec<Player>,
    pub rounds: Vec<Round>,
    pub used_secrets: Vec<String>,
    pub config: GameConfig,
    /// Snapshot time (ISO8601)
    pub taken_at: String,
}

impl Room {
    pub fn public_snapshot(&self) -> PublicState {
        PublicState {
            phase: self.phase,
            round: self.round,
            max_rounds: self.config.max_rounds,
            timer_ms: self.remaining_ms,
            players: self
                .players_in_order()
                .map(|p| PublicPlayer {
                    id: p.id.clone(),
                    name: p.name.clone(),
                    score: p.score,
                    last_word: p.last_word.clone(),
                    is_host: p.is_host,
                    ready: p.ready,
                    connected: p.connected,
                    submitted: self.has_submitted(&p.id),
                })
                .collect(),
        }
    }

    pub fn diagnostic_snapshot(&self) -> RoomSnapshot {
        RoomSnapshot {
            phase: self.phase,
            round: self.round,
            max_rounds: self.config.max_rounds,
            remaining_ms: self.remaining_ms,
            players: self.players_in_order().cloned().collect(),
            rounds: self.rounds.values().cloned().collect(),
            used_secrets: self.used_secrets.clone(),
            config: self.config.clone(),
            taken_at: chrono::Utc::now().to_rfc3339(),
        }
    }
}

impl AppState {
    pub async fn public_snapshot(&self) -> PublicState {
        self.room.lock().await.public_snapshot()
    }

    pub async fn diagnostic_snapshot(&self) -> RoomSnapshot {
        self.room.lock().await.diagnostic_snapshot()
    }
}
