use super::AppState;
use crate::protocol::ServerMessage;
use crate::types::*;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Longest sleep between two ticks
const TICK_INTERVAL: Duration = Duration::from_secs(1);

/// What happens when a phase's countdown reaches zero
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerExpiry {
    /// Submission over: resolve the round
    FinalizeRound { round: RoundIndex },
    /// Discussion over: move to transition
    EnterTransition { round: RoundIndex },
    /// Transition over: next round or game end
    AdvanceRound { round: RoundIndex },
}

impl TimerExpiry {
    pub fn for_phase(phase: GamePhase, round: RoundIndex) -> Option<Self> {
        match phase {
            GamePhase::Submission => Some(TimerExpiry::FinalizeRound { round }),
            GamePhase::Discussion => Some(TimerExpiry::EnterTransition { round }),
            GamePhase::Transition => Some(TimerExpiry::AdvanceRound { round }),
            _ => None,
        }
    }
}

/// Countdown task of the active timed phase
#[derive(Debug)]
pub struct PhaseTimer {
    pub phase: GamePhase,
    pub round: RoundIndex,
    handle: JoinHandle<()>,
}

impl PhaseTimer {
    /// Stop the countdown and wait until its task is gone
    pub async fn cancel(self) {
        self.handle.abort();
        match self.handle.await {
            Ok(()) => {}
            Err(e) if e.is_cancelled() => {}
            Err(e) => tracing::error!("Phase timer task failed: {}", e),
        }
    }
}

/// Cancel whatever timer occupies the slot. No-op when empty.
pub(super) async fn cancel_timer(slot: &mut Option<PhaseTimer>) {
    if let Some(timer) = slot.take() {
        tracing::debug!(
            "Cancelling {:?} timer of round {}",
            timer.phase,
            timer.round
        );
        timer.cancel().await;
    }
}

impl AppState {
    /// Start the countdown for a timed phase. The caller holds the transition lock and has
    /// already emptied the slot.
    pub(super) fn start_timer(
        self: &Arc<Self>,
        slot: &mut Option<PhaseTimer>,
        phase: GamePhase,
        round: RoundIndex,
    ) {
        let Some(expiry) = TimerExpiry::for_phase(phase, round) else {
            return;
        };
        let state = Arc::clone(self);
        let handle = tokio::spawn(async move { state.run_timer(phase, round, expiry).await });
        *slot = Some(PhaseTimer {
            phase,
            round,
            handle,
        });
    }

    async fn run_timer(self: Arc<Self>, phase: GamePhase, round: RoundIndex, expiry: TimerExpiry) {
        loop {
            let remaining = self.room.lock().await.update_remaining_ms();
            self.connections
                .broadcast(ServerMessage::Tick {
                    phase,
                    round,
                    timer_ms: remaining,
                })
                .await;
            if remaining == 0 {
                break;
            }
            tokio::time::sleep(TICK_INTERVAL.min(Duration::from_millis(remaining))).await;
        }

        tracing::debug!("{:?} timer of round {} expired", phase, round);
        // Handled in its own task: the handler cancels this timer, which must not wait on
        // itself.
        tokio::spawn(self.on_timer_expired(expiry));
    }
}
