use super::{AppState, Room};
use crate::llm::{EvaluationEntry, PlayerResult};
use crate::types::*;

/// Result of an accepted submission
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmitOutcome {
    pub round: RoundIndex,
    /// Every connected player now has a submission
    pub everyone_submitted: bool,
}

/// A round that has just left submission and waits for evaluation
#[derive(Debug, Clone)]
pub struct PendingRound {
    pub round: RoundIndex,
    pub secret: String,
    /// One entry per roster player, in join order
    pub entries: Vec<EvaluationEntry>,
}

impl Room {
    /// Validate and record a word in one step
    pub fn submit_word(&mut self, player_id: &str, word: &str) -> Result<SubmitOutcome, GameError> {
        if !self.players.contains_key(player_id) {
            return Err(GameError::NotJoined);
        }
        if self.phase != GamePhase::Submission {
            return Err(GameError::WrongPhase(self.phase));
        }

        let word = word.trim();
        if word.is_empty() {
            return Err(GameError::EmptyWord);
        }
        if word.split_whitespace().nth(1).is_some() {
            return Err(GameError::MultiTokenWord);
        }

        let duplicate = self
            .rounds
            .get(&self.round)
            .and_then(|round| round.submissions.get(player_id))
            .is_some_and(|previous| previous.word.to_lowercase() == word.to_lowercase());
        if duplicate {
            return Err(GameError::DuplicateWord);
        }

        self.record_submission(player_id, word);
        Ok(SubmitOutcome {
            round: self.round,
            everyone_submitted: self.everyone_submitted(),
        })
    }

    /// Insert or overwrite the player's submission for the current round
    pub fn record_submission(&mut self, player_id: &str, word: &str) -> bool {
        let Some(round) = self.rounds.get_mut(&self.round) else {
            return false;
        };
        round
            .submissions
            .insert(player_id.to_string(), Submission::new(player_id, word));

        if let Some(player) = self.players.get_mut(player_id) {
            player.last_word = Some(word.to_string());
        }
        tracing::debug!("Round {}: {} submitted", self.round, player_id);
        true
    }

    /// Give every roster player without a submission a `timeout` placeholder
    pub fn ensure_missed_submissions(&mut self) {
        let Some(round) = self.rounds.get_mut(&self.round) else {
            return;
        };
        for player_id in &self.player_order {
            round
                .submissions
                .entry(player_id.clone())
                .or_insert_with(|| Submission::placeholder(player_id, &[SubmissionFlag::Timeout]));
        }
    }

    /// True when at least one player is connected and all connected players have submitted
    pub fn everyone_submitted(&self) -> bool {
        let Some(round) = self.rounds.get(&self.round) else {
            return false;
        };
        let mut connected = self
            .players
            .values()
            .filter(|p| p.connected)
            .peekable();
        connected.peek().is_some()
            && connected.all(|p| round.submissions.contains_key(&p.id))
    }

    pub fn has_submitted(&self, player_id: &str) -> bool {
        self.rounds
            .get(&self.round)
            .is_some_and(|round| round.submissions.contains_key(player_id))
    }

    /// Move `expected` from submission into resolution, filling in missed submissions.
    /// Returns `None` when the room is no longer in that round's submission phase.
    pub fn begin_resolution(&mut self, expected: RoundIndex) -> Option<PendingRound> {
        if !self.is_at(GamePhase::Submission, expected) {
            return None;
        }
        self.set_phase(GamePhase::Resolution, None);
        self.ensure_missed_submissions();

        let round = self.rounds.get(&expected)?;
        let entries = self
            .players_in_order()
            .map(|player| EvaluationEntry {
                player_id: player.id.clone(),
                name: player.name.clone(),
                connected: player.connected,
                word: round
                    .submissions
                    .get(&player.id)
                    .map(|s| s.word.clone())
                    .unwrap_or_default(),
            })
            .collect();

        Some(PendingRound {
            round: expected,
            secret: round.secret.clone(),
            entries,
        })
    }

    /// Attach an evaluation result to a submission and add its score to the player's total.
    /// Flags are merged. A submission that already holds a result is left untouched, so a
    /// result can never be counted twice.
    pub fn store_result(
        &mut self,
        round: RoundIndex,
        player_id: &str,
        result: PlayerResult,
    ) -> Option<Submission> {
        let submissions = &mut self.rounds.get_mut(&round)?.submissions;
        let submission = submissions
            .entry(player_id.to_string())
            .or_insert_with(|| Submission::placeholder(player_id, &[]));
        if submission.hint.is_some() {
            tracing::warn!("Round {}: result for {} already stored", round, player_id);
            return None;
        }

        submission.hint = Some(result.hint);
        submission.score = result.score;
        submission.flags.extend(result.flags);
        submission.meta = result.meta;
        let stored = submission.clone();

        if let Some(player) = self.players.get_mut(player_id) {
            player.score = player.score.saturating_add(stored.score);
        }
        Some(stored)
    }
}

impl AppState {
    pub async fn everyone_submitted(&self) -> bool {
        self.room.lock().await.everyone_submitted()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn room_in_submission(players: &[&str]) -> (Room, Vec<PlayerId>) {
        let mut room = Room::new(GameConfig::default());
        let ids = players
            .iter()
            .map(|name| room.add_player(name, None).unwrap().id)
            .collect();
        room.start_new_round("comet".to_string());
        room.set_phase(GamePhase::Submission, None);
        (room, ids)
    }

    fn result(score: u32, flags: &[SubmissionFlag]) -> PlayerResult {
        PlayerResult {
            hint: "hint".to_string(),
            score,
            flags: flags.iter().copied().collect(),
            meta: serde_json::Value::Null,
        }
    }

    #[test]
    fn test_submit_validation() {
        let (mut room, ids) = room_in_submission(&["Alice"]);

        assert_eq!(room.submit_word("ghost", "tail"), Err(GameError::NotJoined));
        assert_eq!(room.submit_word(&ids[0], "   "), Err(GameError::EmptyWord));
        assert_eq!(
            room.submit_word(&ids[0], "two words"),
            Err(GameError::MultiTokenWord)
        );
        assert!(!room.has_submitted(&ids[0]));

        room.set_phase(GamePhase::Discussion, None);
        assert_eq!(
            room.submit_word(&ids[0], "tail"),
            Err(GameError::WrongPhase(GamePhase::Discussion))
        );
    }

    #[test]
    fn test_resubmission_overwrites_but_rejects_duplicate() {
        let (mut room, ids) = room_in_submission(&["Alice", "Bob"]);

        let outcome = room.submit_word(&ids[0], " tail ").unwrap();
        assert_eq!(outcome.round, 1);
        assert!(!outcome.everyone_submitted);

        assert_eq!(room.submit_word(&ids[0], "TAIL"), Err(GameError::DuplicateWord));
        room.submit_word(&ids[0], "ice").unwrap();

        let submissions = &room.round_data(1).unwrap().submissions;
        assert_eq!(submissions.len(), 1);
        assert_eq!(submissions[&ids[0]].word, "ice");
        assert_eq!(submissions[&ids[0]].score, 0);
        assert!(submissions[&ids[0]].flags.is_empty());
    }

    #[test]
    fn test_everyone_submitted_ignores_disconnected() {
        let (mut room, ids) = room_in_submission(&["Alice", "Bob", "Cara"]);

        room.submit_word(&ids[0], "tail").unwrap();
        room.mark_disconnected(&ids[2]);
        assert!(!room.everyone_submitted());

        let outcome = room.submit_word(&ids[1], "ice").unwrap();
        assert!(outcome.everyone_submitted);

        let cara = &room.round_data(1).unwrap().submissions[&ids[2]];
        assert_eq!(cara.word, "");
        assert!(cara.flags.contains(&SubmissionFlag::Timeout));
        assert!(cara.flags.contains(&SubmissionFlag::Disconnected));
    }

    #[test]
    fn test_nobody_connected_is_not_everyone_submitted() {
        let (mut room, ids) = room_in_submission(&["Alice"]);
        room.mark_disconnected(&ids[0]);
        assert!(!room.everyone_submitted());
    }

    #[test]
    fn test_begin_resolution_fills_missed_submissions() {
        let (mut room, ids) = room_in_submission(&["Alice", "Bob"]);
        room.submit_word(&ids[0], "tail").unwrap();

        assert!(room.begin_resolution(2).is_none());
        let pending = room.begin_resolution(1).unwrap();

        assert_eq!(room.phase(), GamePhase::Resolution);
        assert!(room.deadline().is_none());
        assert_eq!(pending.secret, "comet");
        assert_eq!(pending.entries.len(), 2);
        assert_eq!(pending.entries[0].word, "tail");
        assert_eq!(pending.entries[1].word, "");

        let bob = &room.round_data(1).unwrap().submissions[&ids[1]];
        assert_eq!(
            bob.flags,
            [SubmissionFlag::Timeout].into_iter().collect::<FlagSet>()
        );

        // Already resolving: a second finalize finds nothing to do
        assert!(room.begin_resolution(1).is_none());
    }

    #[test]
    fn test_store_result_counts_once_and_merges_flags() {
        let (mut room, ids) = room_in_submission(&["Alice"]);
        room.begin_resolution(1).unwrap();

        let stored = room
            .store_result(1, &ids[0], result(2, &[SubmissionFlag::OffTopic]))
            .unwrap();
        assert_eq!(stored.score, 2);
        assert_eq!(
            stored.flags,
            [SubmissionFlag::Timeout, SubmissionFlag::OffTopic]
                .into_iter()
                .collect::<FlagSet>()
        );
        assert_eq!(room.player(&ids[0]).unwrap().score, 2);

        assert!(room.store_result(1, &ids[0], result(3, &[])).is_none());
        assert_eq!(room.player(&ids[0]).unwrap().score, 2);
        assert!(room.store_result(9, &ids[0], result(3, &[])).is_none());
    }

    #[test]
    fn test_huge_scores_saturate_total() {
        let (mut room, ids) = room_in_submission(&["Alice"]);
        room.begin_resolution(1).unwrap();
        room.store_result(1, &ids[0], result(u32::MAX, &[])).unwrap();

        room.start_new_round("nebula".to_string());
        room.set_phase(GamePhase::Submission, None);
        room.begin_resolution(2).unwrap();
        room.store_result(2, &ids[0], result(u32::MAX, &[])).unwrap();

        assert_eq!(room.player(&ids[0]).unwrap().score, u32::MAX);
    }
}
