use super::{AppState, Room};
use crate::types::*;

/// Display name used when a player joins without one
const DEFAULT_PLAYER_NAME: &str = "Player";

impl Room {
    /// Add a player, or reactivate one rejoining with a known id
    pub fn add_player(&mut self, name: &str, existing_id: Option<&str>) -> Result<Player, GameError> {
        let name = name.trim();

        if let Some(player) = existing_id.and_then(|id| self.players.get_mut(id)) {
            player.connected = true;
            if !name.is_empty() {
                player.name = name.to_string();
            }
            tracing::info!("Player {} ({}) reconnected", player.name, player.id);
            return Ok(player.clone());
        }

        if self.players.len() >= self.config.max_players {
            return Err(GameError::RoomFull);
        }

        let player = Player {
            id: ulid::Ulid::new().to_string(),
            name: if name.is_empty() {
                DEFAULT_PLAYER_NAME.to_string()
            } else {
                name.to_string()
            },
            is_host: false,
            ready: false,
            score: 0,
            last_word: None,
            connected: true,
            joined_at: chrono::Utc::now(),
        };
        let id = player.id.clone();

        self.player_order.push(id.clone());
        self.players.insert(id.clone(), player);
        self.recompute_host();

        let player = self.players.get(&id).cloned().ok_or(GameError::NotJoined)?;
        tracing::info!("Player {} ({}) joined, host={}", player.name, player.id, player.is_host);
        Ok(player)
    }

    /// Delete a player for good. Unknown ids are ignored.
    pub fn remove_player(&mut self, player_id: &str) -> bool {
        if self.players.remove(player_id).is_none() {
            return false;
        }
        self.player_order.retain(|id| id != player_id);
        self.recompute_host();
        tracing::info!("Player {} left the room", player_id);
        true
    }

    /// Keep the seat but mark the player away. A player who vanishes mid-submission gets an
    /// empty placeholder so the round can still resolve.
    pub fn mark_disconnected(&mut self, player_id: &str) -> bool {
        let Some(player) = self.players.get_mut(player_id) else {
            return false;
        };
        player.connected = false;
        player.ready = false;

        if self.phase == GamePhase::Submission {
            if let Some(round) = self.rounds.get_mut(&self.round) {
                round
                    .submissions
                    .entry(player_id.to_string())
                    .or_insert_with(|| {
                        Submission::placeholder(
                            player_id,
                            &[SubmissionFlag::Timeout, SubmissionFlag::Disconnected],
                        )
                    });
            }
        }
        true
    }

    /// Host follows the configured host name if there is one, otherwise the earliest-joined
    /// player keeps or inherits the role.
    fn recompute_host(&mut self) {
        if let Some(host_name) = &self.config.host_name {
            let host_name = host_name.trim().to_lowercase();
            for player in self.players.values_mut() {
                player.is_host = player.name.trim().to_lowercase() == host_name;
            }
            return;
        }

        if self.players.values().any(|p| p.is_host) {
            return;
        }
        if let Some(first) = self
            .player_order
            .first()
            .and_then(|id| self.players.get_mut(id))
        {
            first.is_host = true;
            tracing::info!("{} is now the host", first.name);
        }
    }

    pub fn player(&self, player_id: &str) -> Option<&Player> {
        self.players.get(player_id)
    }

    /// Players in join order
    pub fn players_in_order(&self) -> impl Iterator<Item = &Player> {
        self.player_order
            .iter()
            .filter_map(|id| self.players.get(id))
    }

    pub fn toggle_ready(&mut self, player_id: &str) -> Result<bool, GameError> {
        if !self.phase.accepts_ready_toggle() {
            return Err(GameError::WrongPhase(self.phase));
        }
        let player = self
            .players
            .get_mut(player_id)
            .ok_or(GameError::NotJoined)?;
        player.ready = !player.ready;
        Ok(player.ready)
    }

    /// At least one connected player, and every connected player is READY
    pub fn all_ready(&self) -> bool {
        let mut connected = self.players.values().filter(|p| p.connected).peekable();
        connected.peek().is_some() && connected.all(|p| p.ready)
    }

    pub fn reset_ready(&mut self) {
        for player in self.players.values_mut() {
            player.ready = false;
        }
    }
}

impl AppState {
    pub async fn add_player(
        &self,
        name: &str,
        existing_id: Option<&str>,
    ) -> Result<Player, GameError> {
        self.room.lock().await.add_player(name, existing_id)
    }

    pub async fn get_player(&self, player_id: &str) -> Option<Player> {
        self.room.lock().await.player(player_id).cloned()
    }

    pub async fn toggle_ready(&self, player_id: &str) -> Result<bool, GameError> {
        self.room.lock().await.toggle_ready(player_id)
    }

    pub async fn all_ready(&self) -> bool {
        self.room.lock().await.all_ready()
    }
}
