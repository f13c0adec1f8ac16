use super::{AppState, Room};
use crate::protocol::{GameStats, PlayerStats, RoundStat, SummaryEntry};
use crate::types::*;
use std::collections::BTreeMap;

impl Room {
    /// Highest cumulative score; ties go to whoever joined first
    pub fn winner(&self) -> Option<Player> {
        let mut best: Option<&Player> = None;
        for player in self.players_in_order() {
            if best.map_or(true, |b| player.score > b.score) {
                best = Some(player);
            }
        }
        best.cloned()
    }

    /// Public per-player line-up of a resolved round, in join order
    pub fn round_summary(&self, round: RoundIndex) -> Vec<SummaryEntry> {
        let Some(data) = self.rounds.get(&round) else {
            return Vec::new();
        };
        self.players_in_order()
            .filter_map(|player| {
                data.submissions.get(&player.id).map(|s| SummaryEntry {
                    player_id: player.id.clone(),
                    name: player.name.clone(),
                    word: s.word.clone(),
                    score: s.score,
                    flags: s.flags.clone(),
                })
            })
            .collect()
    }

    /// Per-round, per-player statistics for every configured round, ranked by total
    pub fn build_stats(&self) -> GameStats {
        let rounds: Vec<BTreeMap<PlayerId, RoundStat>> = (1..=self.config.max_rounds)
            .map(|index| {
                self.rounds
                    .get(&index)
                    .map(|round| {
                        round
                            .submissions
                            .iter()
                            .map(|(id, s)| (id.clone(), RoundStat::from(s)))
                            .collect()
                    })
                    .unwrap_or_default()
            })
            .collect();

        let mut players: Vec<PlayerStats> = self
            .players_in_order()
            .map(|player| PlayerStats {
                id: player.id.clone(),
                name: player.name.clone(),
                total: player.score,
                per_round: rounds
                    .iter()
                    .map(|round| round.get(&player.id).cloned().unwrap_or_default())
                    .collect(),
                rank: 0,
            })
            .collect();

        // Stable sort keeps join order among equal totals
        players.sort_by(|a, b| b.total.cmp(&a.total));
        for (idx, player) in players.iter_mut().enumerate() {
            player.rank = idx + 1;
        }

        GameStats { rounds, players }
    }
}

impl AppState {
    pub async fn winner(&self) -> Option<Player> {
        self.room.lock().await.winner()
    }

    pub async fn build_stats(&self) -> GameStats {
        self.room.lock().await.build_stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::PlayerResult;

    fn scored_room(scores: &[(&str, u32)]) -> (Room, Vec<PlayerId>) {
        let mut room = Room::new(GameConfig::default());
        let ids: Vec<PlayerId> = scores
            .iter()
            .map(|(name, _)| room.add_player(name, None).unwrap().id)
            .collect();

        room.start_new_round("comet".to_string());
        room.set_phase(GamePhase::Submission, None);
        for id in &ids {
            room.submit_word(id, "tail").unwrap();
        }
        room.begin_resolution(1).unwrap();
        for (id, (_, score)) in ids.iter().zip(scores) {
            room.store_result(
                1,
                id,
                PlayerResult {
                    hint: String::new(),
                    score: *score,
                    flags: FlagSet::new(),
                    meta: serde_json::Value::Null,
                },
            );
        }
        (room, ids)
    }

    #[test]
    fn test_winner_is_highest_scorer() {
        let (room, ids) = scored_room(&[("Alice", 1), ("Bob", 3), ("Cara", 2)]);
        assert_eq!(room.winner().unwrap().id, ids[1]);
    }

    #[test]
    fn test_winner_tie_goes_to_earliest_joiner() {
        let (room, ids) = scored_room(&[("Alice", 2), ("Bob", 3), ("Cara", 3)]);
        assert_eq!(room.winner().unwrap().id, ids[1]);
    }

    #[test]
    fn test_no_winner_in_empty_room() {
        assert!(Room::new(GameConfig::default()).winner().is_none());
    }

    #[test]
    fn test_stats_cover_every_configured_round() {
        let (room, ids) = scored_room(&[("Alice", 1), ("Bob", 3)]);
        let stats = room.build_stats();

        assert_eq!(stats.rounds.len(), 3);
        assert_eq!(stats.rounds[0].len(), 2);
        assert!(stats.rounds[1].is_empty());

        assert_eq!(stats.players.len(), 2);
        assert_eq!(stats.players[0].id, ids[1]);
        assert_eq!(stats.players[0].rank, 1);
        assert_eq!(stats.players[1].rank, 2);
        for player in &stats.players {
            assert_eq!(player.per_round.len(), 3);
            assert_eq!(player.per_round[0].word, "tail");
            assert_eq!(player.per_round[2], RoundStat::default());
        }
    }

    #[test]
    fn test_round_summary_in_join_order() {
        let (room, ids) = scored_room(&[("Alice", 1), ("Bob", 3)]);
        let summary = room.round_summary(1);

        assert_eq!(summary.len(), 2);
        assert_eq!(summary[0].player_id, ids[0]);
        assert_eq!(summary[1].score, 3);
        assert!(room.round_summary(2).is_empty());
    }
}
