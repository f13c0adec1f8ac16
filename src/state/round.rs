use super::{AppState, Room};
use crate::types::*;
use std::time::Duration;
use tokio::time::Instant;

impl Room {
    /// Switch phase. Timed phases get a deadline (`duration`, or the configured length);
    /// all other phases clear it.
    pub fn set_phase(&mut self, phase: GamePhase, duration: Option<Duration>) {
        self.phase = phase;

        let duration = if phase.is_timed() {
            duration.or_else(|| self.config.phase_duration(phase))
        } else {
            None
        };
        match duration {
            Some(duration) => {
                self.deadline = Some(Instant::now() + duration);
                self.remaining_ms = duration.as_millis() as u64;
            }
            None => {
                self.deadline = None;
                self.remaining_ms = 0;
            }
        }
        tracing::debug!("Phase -> {:?} (round {})", phase, self.round);
    }

    /// Recompute the remaining time from the deadline, clamped at zero
    pub fn update_remaining_ms(&mut self) -> u64 {
        self.remaining_ms = self
            .deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()).as_millis() as u64)
            .unwrap_or(0);
        self.remaining_ms
    }

    /// Open the next round with its secret. Clears every player's last word.
    pub fn start_new_round(&mut self, secret: String) -> RoundIndex {
        self.round += 1;
        self.used_secrets.push(secret.clone());
        self.rounds
            .insert(self.round, Round::new(self.round, secret));
        for player in self.players.values_mut() {
            player.last_word = None;
        }
        self.round
    }

    pub fn secret(&self, round: RoundIndex) -> Option<&str> {
        self.rounds.get(&round).map(|r| r.secret.as_str())
    }

    pub fn used_secrets(&self) -> Vec<String> {
        self.used_secrets.clone()
    }

    /// Back to round zero for a fresh game. The secret history is kept so a new game does not
    /// replay old secrets.
    pub fn reset_game(&mut self) {
        self.round = 0;
        self.rounds.clear();
        for player in self.players.values_mut() {
            player.score = 0;
            player.ready = false;
            player.last_word = None;
        }
    }
}

impl AppState {
    pub async fn used_secrets(&self) -> Vec<String> {
        self.room.lock().await.used_secrets()
    }
}
