use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

/// Opaque ID types for type safety
pub type PlayerId = String;
pub type RoundIndex = u32;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum GamePhase {
    Lobby,
    Ready,
    Submission,
    Resolution,
    Discussion,
    Transition,
    End,
}

impl GamePhase {
    /// Phases that run a countdown and own a deadline
    pub fn is_timed(&self) -> bool {
        matches!(
            self,
            GamePhase::Submission | GamePhase::Discussion | GamePhase::Transition
        )
    }

    /// Phases from which the host may start a fresh game
    pub fn accepts_start(&self) -> bool {
        matches!(self, GamePhase::Lobby | GamePhase::Ready | GamePhase::End)
    }

    /// Phases in which players may toggle READY
    pub fn accepts_ready_toggle(&self) -> bool {
        self.accepts_start()
    }

    /// Phases in which chat is open
    pub fn accepts_chat(&self) -> bool {
        matches!(
            self,
            GamePhase::Lobby | GamePhase::Ready | GamePhase::Discussion
        )
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionFlag {
    Forbidden,
    TooDirect,
    OffTopic,
    Timeout,
    Disconnected,
    AiMissing,
}

impl SubmissionFlag {
    /// Parse a loosely formatted tag ("too-direct", "TooDirect", "too_direct")
    pub fn parse(raw: &str) -> Option<Self> {
        let normalized: String = raw
            .trim()
            .chars()
            .filter(|c| c.is_alphanumeric())
            .flat_map(|c| c.to_lowercase())
            .collect();
        match normalized.as_str() {
            "forbidden" => Some(Self::Forbidden),
            "toodirect" => Some(Self::TooDirect),
            "offtopic" => Some(Self::OffTopic),
            "timeout" => Some(Self::Timeout),
            "disconnected" => Some(Self::Disconnected),
            "aimissing" => Some(Self::AiMissing),
            _ => None,
        }
    }
}

pub type FlagSet = BTreeSet<SubmissionFlag>;

/// Why a round left the submission phase
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FinalizeReason {
    Timer,
    AllSubmitted,
    Disconnect,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameConfig {
    pub max_rounds: u32,
    pub submission_seconds: u64,
    pub discussion_seconds: u64,
    pub transition_seconds: u64,
    pub max_players: usize,
    /// When set, host status follows this display name instead of join order
    pub host_name: Option<String>,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            max_rounds: 3,
            submission_seconds: 45,
            discussion_seconds: 45,
            transition_seconds: 12,
            max_players: 5,
            host_name: None,
        }
    }
}

impl GameConfig {
    /// Load game timing and roster settings from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_rounds: env_parse("MAX_ROUNDS")
                .filter(|rounds| *rounds > 0)
                .unwrap_or(defaults.max_rounds),
            submission_seconds: env_parse("SUBMISSION_SECONDS")
                .unwrap_or(defaults.submission_seconds),
            discussion_seconds: env_parse("DISCUSSION_SECONDS")
                .unwrap_or(defaults.discussion_seconds),
            transition_seconds: env_parse("TRANSITION_SECONDS")
                .unwrap_or(defaults.transition_seconds),
            max_players: env_parse("MAX_PLAYERS")
                .filter(|max| *max > 0)
                .unwrap_or(defaults.max_players),
            host_name: std::env::var("HOST_NAME")
                .ok()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty()),
        }
    }

    pub fn phase_duration(&self, phase: GamePhase) -> Option<Duration> {
        match phase {
            GamePhase::Submission => Some(Duration::from_secs(self.submission_seconds)),
            GamePhase::Discussion => Some(Duration::from_secs(self.discussion_seconds)),
            GamePhase::Transition => Some(Duration::from_secs(self.transition_seconds)),
            _ => None,
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.trim().parse().ok())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Player {
    pub id: PlayerId,
    pub name: String,
    pub is_host: bool,
    pub ready: bool,
    pub score: u32,
    pub last_word: Option<String>,
    pub connected: bool,
    pub joined_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Submission {
    pub player_id: PlayerId,
    pub word: String,
    pub flags: FlagSet,
    pub score: u32,
    pub hint: Option<String>,
    #[serde(default)]
    pub meta: serde_json::Value,
}

impl Submission {
    pub fn new(player_id: &str, word: &str) -> Self {
        Self {
            player_id: player_id.to_string(),
            word: word.to_string(),
            flags: FlagSet::new(),
            score: 0,
            hint: None,
            meta: serde_json::Value::Null,
        }
    }

    /// Empty submission standing in for a player who never submitted
    pub fn placeholder(player_id: &str, flags: &[SubmissionFlag]) -> Self {
        Self {
            flags: flags.iter().copied().collect(),
            ..Self::new(player_id, "")
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Round {
    pub index: RoundIndex,
    pub secret: String,
    pub submissions: HashMap<PlayerId, Submission>,
}

impl Round {
    pub fn new(index: RoundIndex, secret: String) -> Self {
        Self {
            index,
            secret,
            submissions: HashMap::new(),
        }
    }
}

/// Business and validation errors surfaced to the requesting client only
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GameError {
    #[error("The room is full")]
    RoomFull,
    #[error("This connection already joined the room")]
    AlreadyJoined,
    #[error("Join the room first")]
    NotJoined,
    #[error("Not allowed during the {0:?} phase")]
    WrongPhase(GamePhase),
    #[error("Enter a word")]
    EmptyWord,
    #[error("Only a single word without spaces can be submitted")]
    MultiTokenWord,
    #[error("You already submitted that word this round")]
    DuplicateWord,
    #[error("Only the host can do that")]
    NotHost,
    #[error("Every connected player must be READY")]
    NotAllReady,
}

impl GameError {
    pub fn code(&self) -> &'static str {
        match self {
            GameError::RoomFull => "ROOM_FULL",
            GameError::AlreadyJoined => "ALREADY_JOINED",
            GameError::NotJoined => "NOT_JOINED",
            GameError::WrongPhase(_) => "WRONG_PHASE",
            GameError::EmptyWord => "EMPTY_WORD",
            GameError::MultiTokenWord => "MULTI_TOKEN_WORD",
            GameError::DuplicateWord => "DUPLICATE_WORD",
            GameError::NotHost => "NOT_HOST",
            GameError::NotAllReady => "NOT_ALL_READY",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_timed_phases() {
        assert!(GamePhase::Submission.is_timed());
        assert!(GamePhase::Discussion.is_timed());
        assert!(GamePhase::Transition.is_timed());
        assert!(!GamePhase::Resolution.is_timed());
        assert!(!GamePhase::Lobby.is_timed());
        assert!(!GamePhase::End.is_timed());
    }

    #[test]
    fn test_flag_parse_is_lenient() {
        assert_eq!(SubmissionFlag::parse("too_direct"), Some(SubmissionFlag::TooDirect));
        assert_eq!(SubmissionFlag::parse("Too-Direct"), Some(SubmissionFlag::TooDirect));
        assert_eq!(SubmissionFlag::parse(" OFF_TOPIC "), Some(SubmissionFlag::OffTopic));
        assert_eq!(SubmissionFlag::parse("spicy"), None);
    }

    #[test]
    fn test_flags_serialize_snake_case() {
        let flags: FlagSet = [SubmissionFlag::Timeout, SubmissionFlag::AiMissing]
            .into_iter()
            .collect();
        let json = serde_json::to_string(&flags).unwrap();
        assert_eq!(json, r#"["timeout","ai_missing"]"#);
    }

    #[test]
    #[serial]
    fn test_game_config_from_env() {
        std::env::set_var("MAX_ROUNDS", "5");
        std::env::set_var("SUBMISSION_SECONDS", " 30 ");
        std::env::set_var("HOST_NAME", "  ");
        std::env::remove_var("MAX_PLAYERS");

        let config = GameConfig::from_env();
        assert_eq!(config.max_rounds, 5);
        assert_eq!(config.submission_seconds, 30);
        assert_eq!(config.max_players, 5);
        assert!(config.host_name.is_none());

        std::env::remove_var("MAX_ROUNDS");
        std::env::remove_var("SUBMISSION_SECONDS");
        std::env::remove_var("HOST_NAME");
    }

    #[test]
    #[serial]
    fn test_game_config_rejects_zero_rounds() {
        std::env::set_var("MAX_ROUNDS", "0");
        assert_eq!(GameConfig::from_env().max_rounds, 3);
        std::env::remove_var("MAX_ROUNDS");
    }
}
