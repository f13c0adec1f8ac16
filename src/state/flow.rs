//! Round orchestration.
//!
//! Phase order: `lobby/ready/end -> submission -> resolution -> discussion -> transition ->
//! submission | end -> ready`. Every transition runs while holding `AppState::phase_timer`,
//! which doubles as the transition lock: cancel the old countdown, mutate the room, broadcast,
//! start the next countdown. Handlers triggered by a timer or by the last submission re-check
//! the (phase, round) they were issued for, so a late or duplicate trigger does nothing.

use super::timer::cancel_timer;
use super::{AppState, PhaseTimer, TimerExpiry};
use crate::llm::PlayerResult;
use crate::protocol::ServerMessage;
use crate::types::*;
use futures::future::BoxFuture;
use std::sync::Arc;

impl AppState {
    pub async fn broadcast_state(&self) {
        let state = self.public_snapshot().await;
        self.connections
            .broadcast(ServerMessage::RoomState { state })
            .await;
    }

    /// Host starts a fresh game from lobby, ready or end
    pub async fn start_game(self: &Arc<Self>, player_id: &str) -> Result<(), GameError> {
        let mut timer = self.phase_timer.lock().await;
        {
            let room = self.room.lock().await;
            let player = room.player(player_id).ok_or(GameError::NotJoined)?;
            if !player.is_host {
                return Err(GameError::NotHost);
            }
            if !room.phase().accepts_start() {
                return Err(GameError::WrongPhase(room.phase()));
            }
            if !room.all_ready() {
                return Err(GameError::NotAllReady);
            }
        }

        cancel_timer(&mut timer).await;
        self.room.lock().await.reset_game();
        tracing::info!("Game started by {}", player_id);
        self.broadcast_state().await;
        self.begin_round(&mut timer).await;
        Ok(())
    }

    /// Pick a secret, open the next round and start collecting words
    async fn begin_round(self: &Arc<Self>, timer: &mut Option<PhaseTimer>) {
        let (next, used) = {
            let room = self.room.lock().await;
            (room.round() + 1, room.used_secrets())
        };
        let choice = self.evaluator.choose_secret(next, &used).await;

        let round = self
            .room
            .lock()
            .await
            .start_new_round(choice.secret.clone());
        tracing::info!("Round {} begins (secret from {})", round, choice.source);

        self.connections
            .broadcast(ServerMessage::RoundPrep {
                round,
                theme: choice.theme,
                source: choice.source,
                rationale: choice.rationale,
            })
            .await;
        self.enter_timed_phase(timer, GamePhase::Submission, round, None)
            .await;
    }

    async fn enter_timed_phase(
        self: &Arc<Self>,
        timer: &mut Option<PhaseTimer>,
        phase: GamePhase,
        round: RoundIndex,
        prompt: Option<String>,
    ) {
        cancel_timer(timer).await;
        self.room.lock().await.set_phase(phase, None);
        self.broadcast_state().await;
        self.connections
            .broadcast(ServerMessage::PhaseChanged {
                phase,
                round,
                reason: None,
                prompt,
            })
            .await;
        self.start_timer(timer, phase, round);
    }

    /// Resolve `round` exactly once. Stale calls (round already resolved, or a newer round
    /// running) return without touching anything.
    pub async fn finalize_round(self: &Arc<Self>, round: RoundIndex, reason: FinalizeReason) {
        let mut timer = self.phase_timer.lock().await;
        if !self.room.lock().await.is_at(GamePhase::Submission, round) {
            tracing::debug!("Ignoring finalize of round {} ({:?})", round, reason);
            return;
        }

        cancel_timer(&mut timer).await;
        let Some(pending) = self.room.lock().await.begin_resolution(round) else {
            return;
        };
        tracing::info!("Round {} closed ({:?})", round, reason);

        self.broadcast_state().await;
        self.connections
            .broadcast(ServerMessage::PhaseChanged {
                phase: GamePhase::Resolution,
                round,
                reason: Some(reason),
                prompt: None,
            })
            .await;

        let evaluation = self
            .evaluator
            .evaluate(round, &pending.secret, pending.entries.clone())
            .await;

        let mut personal = Vec::with_capacity(pending.entries.len());
        let summary = {
            let mut room = self.room.lock().await;
            for entry in &pending.entries {
                let result = evaluation
                    .results
                    .get(&entry.player_id)
                    .cloned()
                    .unwrap_or_else(PlayerResult::missing);
                if let Some(stored) = room.store_result(round, &entry.player_id, result) {
                    personal.push((entry.player_id.clone(), stored));
                }
            }
            room.round_summary(round)
        };

        for (player_id, stored) in personal {
            self.connections
                .send_to(
                    &player_id,
                    ServerMessage::RoundResult {
                        round,
                        hint: stored.hint.unwrap_or_default(),
                        score: stored.score,
                        flags: stored.flags,
                        meta: stored.meta,
                    },
                )
                .await;
        }
        self.connections
            .broadcast(ServerMessage::RoundSummary {
                round,
                source: evaluation.source.as_str().to_string(),
                entries: summary,
            })
            .await;

        self.enter_timed_phase(
            &mut timer,
            GamePhase::Discussion,
            round,
            Some(evaluation.discussion),
        )
        .await;
    }

    /// Entry point for expired countdowns. Boxed so the timer task can spawn it.
    pub fn on_timer_expired(self: Arc<Self>, expiry: TimerExpiry) -> BoxFuture<'static, ()> {
        Box::pin(async move {
            match expiry {
                TimerExpiry::FinalizeRound { round } => {
                    self.finalize_round(round, FinalizeReason::Timer).await
                }
                TimerExpiry::EnterTransition { round } => self.enter_transition(round).await,
                TimerExpiry::AdvanceRound { round } => self.advance_round(round).await,
            }
        })
    }

    async fn enter_transition(self: &Arc<Self>, round: RoundIndex) {
        let mut timer = self.phase_timer.lock().await;
        if !self.room.lock().await.is_at(GamePhase::Discussion, round) {
            return;
        }
        self.enter_timed_phase(&mut timer, GamePhase::Transition, round, None)
            .await;
    }

    async fn advance_round(self: &Arc<Self>, round: RoundIndex) {
        let mut timer = self.phase_timer.lock().await;
        let max_rounds = {
            let room = self.room.lock().await;
            if !room.is_at(GamePhase::Transition, round) {
                return;
            }
            room.config().max_rounds
        };

        cancel_timer(&mut timer).await;
        if round >= max_rounds {
            self.conclude_game().await;
        } else {
            self.begin_round(&mut timer).await;
        }
    }

    /// Announce the winner and statistics, then return everyone to `ready`
    async fn conclude_game(self: &Arc<Self>) {
        let (winner, stats) = {
            let mut room = self.room.lock().await;
            room.set_phase(GamePhase::End, None);
            (room.winner(), room.build_stats())
        };
        self.broadcast_state().await;

        if let Some(winner) = winner {
            tracing::info!("Game over, {} wins with {}", winner.name, winner.score);
            self.connections
                .broadcast(ServerMessage::EndWinner {
                    player_id: winner.id,
                    name: winner.name,
                    score: winner.score,
                })
                .await;
        }
        self.connections
            .broadcast(ServerMessage::StatsOpen { stats })
            .await;

        {
            let mut room = self.room.lock().await;
            room.reset_ready();
            room.set_phase(GamePhase::Ready, None);
        }
        self.broadcast_state().await;
    }

    /// Record a word; resolves the round in the background once everyone is in
    pub async fn submit_word(
        self: &Arc<Self>,
        player_id: &str,
        word: &str,
    ) -> Result<RoundIndex, GameError> {
        let outcome = self.room.lock().await.submit_word(player_id, word)?;
        self.broadcast_state().await;

        if outcome.everyone_submitted {
            self.spawn_finalize(outcome.round, FinalizeReason::AllSubmitted);
        }
        Ok(outcome.round)
    }

    pub async fn set_ready(self: &Arc<Self>, player_id: &str) -> Result<bool, GameError> {
        let ready = self.toggle_ready(player_id).await?;
        self.connections
            .broadcast(ServerMessage::PlayerReady {
                player_id: player_id.to_string(),
                ready,
            })
            .await;
        self.broadcast_state().await;
        Ok(ready)
    }

    /// Socket gone without `leave`: keep the seat, and resolve the round if this player was
    /// the last one it was waiting for
    pub async fn player_disconnected(self: &Arc<Self>, player_id: &str) {
        let finalize = {
            let mut room = self.room.lock().await;
            if !room.mark_disconnected(player_id) {
                return;
            }
            (room.phase() == GamePhase::Submission && room.everyone_submitted())
                .then(|| room.round())
        };
        tracing::info!("Player {} disconnected", player_id);
        self.broadcast_state().await;

        if let Some(round) = finalize {
            self.spawn_finalize(round, FinalizeReason::Disconnect);
        }
    }

    /// Explicit leave: the seat is freed
    pub async fn player_left(self: &Arc<Self>, player_id: &str) {
        let finalize = {
            let mut room = self.room.lock().await;
            if !room.remove_player(player_id) {
                return;
            }
            (room.phase() == GamePhase::Submission && room.everyone_submitted())
                .then(|| room.round())
        };
        self.broadcast_state().await;

        if let Some(round) = finalize {
            self.spawn_finalize(round, FinalizeReason::Disconnect);
        }
    }

    /// Relay a chat line with forbidden and spoiler terms masked. Blank lines are dropped.
    pub async fn chat(&self, player_id: &str, message: &str) -> Result<(), GameError> {
        let name = {
            let room = self.room.lock().await;
            let player = room.player(player_id).ok_or(GameError::NotJoined)?;
            if !room.phase().accepts_chat() {
                return Err(GameError::WrongPhase(room.phase()));
            }
            player.name.clone()
        };

        let message = message.trim();
        if message.is_empty() {
            return Ok(());
        }
        let message = self.evaluator.fallback().corpus().mask_chat(message);
        self.connections
            .broadcast(ServerMessage::ChatMessage {
                player_id: player_id.to_string(),
                name,
                message,
                ts: chrono::Utc::now().timestamp_millis(),
            })
            .await;
        Ok(())
    }

    fn spawn_finalize(self: &Arc<Self>, round: RoundIndex, reason: FinalizeReason) {
        let state = Arc::clone(self);
        tokio::spawn(async move { state.finalize_round(round, reason).await });
    }
}
