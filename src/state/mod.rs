mod export;
mod flow;
mod player;
mod round;
mod score;
mod submission;
mod timer;

pub use export::RoomSnapshot;
pub use submission::{PendingRound, SubmitOutcome};
pub use timer::{PhaseTimer, TimerExpiry};

use crate::broadcast::Broadcaster;
use crate::corpus::{CorpusConfig, CorpusIndex};
use crate::llm::Evaluator;
use crate::types::*;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::Mutex;
use tokio::time::Instant;

/// The authoritative game state of the single room.
///
/// Only reachable through `AppState::room`, so every read and write happens under one lock
/// and nobody observes a half-applied change.
#[derive(Debug)]
pub struct Room {
    players: HashMap<PlayerId, Player>,
    /// Join order, never reordered
    player_order: Vec<PlayerId>,
    phase: GamePhase,
    round: RoundIndex,
    /// Set exactly while a timed phase is active
    deadline: Option<Instant>,
    remaining_ms: u64,
    rounds: BTreeMap<RoundIndex, Round>,
    /// Every secret used since startup; survives game resets
    used_secrets: Vec<String>,
    config: GameConfig,
}

impl Room {
    pub fn new(config: GameConfig) -> Self {
        Self {
            players: HashMap::new(),
            player_order: Vec::new(),
            phase: GamePhase::Lobby,
            round: 0,
            deadline: None,
            remaining_ms: 0,
            rounds: BTreeMap::new(),
            used_secrets: Vec::new(),
            config,
        }
    }

    pub fn phase(&self) -> GamePhase {
        self.phase
    }

    pub fn round(&self) -> RoundIndex {
        self.round
    }

    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn remaining_ms(&self) -> u64 {
        self.remaining_ms
    }

    pub fn is_at(&self, phase: GamePhase, round: RoundIndex) -> bool {
        self.phase == phase && self.round == round
    }

    pub fn round_data(&self, round: RoundIndex) -> Option<&Round> {
        self.rounds.get(&round)
    }
}

/// Shared application state
pub struct AppState {
    pub room: Mutex<Room>,
    /// Running phase timer. Held for the whole of every phase transition.
    pub(crate) phase_timer: Mutex<Option<PhaseTimer>>,
    pub connections: Broadcaster,
    pub evaluator: Evaluator,
    pub config: GameConfig,
    /// Where corpus reloads read from
    pub corpus_source: CorpusConfig,
}

impl AppState {
    /// State with an empty corpus and no remote evaluator
    pub fn new(config: GameConfig) -> Self {
        Self::with_evaluator(config, Evaluator::fallback_only(CorpusIndex::empty()))
    }

    pub fn with_evaluator(config: GameConfig, evaluator: Evaluator) -> Self {
        Self {
            room: Mutex::new(Room::new(config.clone())),
            phase_timer: Mutex::new(None),
            connections: Broadcaster::new(),
            evaluator,
            config,
            corpus_source: CorpusConfig::default(),
        }
    }

    pub fn with_corpus_source(mut self, source: CorpusConfig) -> Self {
        self.corpus_source = source;
        self
    }

    pub async fn phase(&self) -> GamePhase {
        self.room.lock().await.phase()
    }

    pub async fn round(&self) -> RoundIndex {
        self.room.lock().await.round()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_new_room_starts_in_lobby() {
        let state = AppState::new(GameConfig::default());

        assert_eq!(state.phase().await, GamePhase::Lobby);
        assert_eq!(state.round().await, 0);

        let room = state.room.lock().await;
        assert!(room.deadline().is_none());
        assert_eq!(room.remaining_ms(), 0);
        assert_eq!(room.config().max_players, 5);
        assert!(room.round_data(1).is_none());
    }
}
