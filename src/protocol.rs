use crate::types::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "t")]
pub enum ClientMessage {
    /// Join the room, or rejoin with a previously issued id
    #[serde(rename = "join")]
    Join {
        #[serde(default)]
        name: String,
        #[serde(default)]
        player_id: Option<PlayerId>,
    },
    #[serde(rename = "player.readyToggle")]
    ReadyToggle,
    #[serde(rename = "host.startGame")]
    StartGame,
    #[serde(rename = "submit.word")]
    SubmitWord {
        #[serde(default)]
        word: String,
    },
    #[serde(rename = "chat.say")]
    ChatSay {
        #[serde(default)]
        message: String,
    },
    #[serde(rename = "statsRequest")]
    StatsRequest,
    #[serde(rename = "ping")]
    Ping,
    /// Leave the room for good; the seat is freed
    #[serde(rename = "leave")]
    Leave,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "t")]
pub enum ServerMessage {
    /// Sent to the joining connection only
    #[serde(rename = "joined")]
    Joined {
        player_id: PlayerId,
        name: String,
        is_host: bool,
    },
    #[serde(rename = "room.state")]
    RoomState { state: PublicState },
    #[serde(rename = "phase.changed")]
    PhaseChanged {
        phase: GamePhase,
        round: RoundIndex,
        #[serde(skip_serializing_if = "Option::is_none")]
        reason: Option<FinalizeReason>,
        /// Discussion prompt, present when entering discussion
        #[serde(skip_serializing_if = "Option::is_none")]
        prompt: Option<String>,
    },
    #[serde(rename = "tick")]
    Tick {
        phase: GamePhase,
        round: RoundIndex,
        timer_ms: u64,
    },
    /// Announces the next round before submission opens; never carries the secret
    #[serde(rename = "round.prep")]
    RoundPrep {
        round: RoundIndex,
        theme: String,
        source: String,
        rationale: String,
    },
    #[serde(rename = "round.summary")]
    RoundSummary {
        round: RoundIndex,
        source: String,
        entries: Vec<SummaryEntry>,
    },
    /// Private per-player result of a round
    #[serde(rename = "round.result:me")]
    RoundResult {
        round: RoundIndex,
        hint: String,
        score: u32,
        flags: FlagSet,
        meta: serde_json::Value,
    },
    #[serde(rename = "player.ready")]
    PlayerReady { player_id: PlayerId, ready: bool },
    #[serde(rename = "end.winner")]
    EndWinner {
        player_id: PlayerId,
        name: String,
        score: u32,
    },
    #[serde(rename = "stats.open")]
    StatsOpen { stats: GameStats },
    #[serde(rename = "chat.message")]
    ChatMessage {
        player_id: PlayerId,
        name: String,
        message: String,
        /// Unix milliseconds
        ts: i64,
    },
    #[serde(rename = "pong")]
    Pong,
    #[serde(rename = "left")]
    Left,
    #[serde(rename = "error")]
    Error { code: String, msg: String },
}

impl ServerMessage {
    pub fn error(code: &str, msg: impl Into<String>) -> Self {
        ServerMessage::Error {
            code: code.to_string(),
            msg: msg.into(),
        }
    }
}

impl From<GameError> for ServerMessage {
    fn from(e: GameError) -> Self {
        ServerMessage::error(e.code(), e.to_string())
    }
}

/// Room snapshot every client may see
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PublicState {
    pub phase: GamePhase,
    pub round: RoundIndex,
    pub max_rounds: u32,
    pub timer_ms: u64,
    /// In join order
    pub players: Vec<PublicPlayer>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PublicPlayer {
    pub id: PlayerId,
    pub name: String,
    pub score: u32,
    pub last_word: Option<String>,
    pub is_host: bool,
    pub ready: bool,
    pub connected: bool,
    /// Whether this player has a submission in the current round
    pub submitted: bool,
}

/// One line of the public round summary
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SummaryEntry {
    pub player_id: PlayerId,
    pub name: String,
    pub word: String,
    pub score: u32,
    pub flags: FlagSet,
}

/// End-of-game statistics table
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct GameStats {
    /// One entry per round, keyed by player id
    pub rounds: Vec<std::collections::BTreeMap<PlayerId, RoundStat>>,
    /// Sorted by total, highest first
    pub players: Vec<PlayerStats>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RoundStat {
    pub word: String,
    pub flags: FlagSet,
    pub score: u32,
}

impl From<&Submission> for RoundStat {
    fn from(s: &Submission) -> Self {
        Self {
            word: s.word.clone(),
            flags: s.flags.clone(),
            score: s.score,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlayerStats {
    pub id: PlayerId,
    pub name: String,
    pub total: u32,
    pub per_round: Vec<RoundStat>,
    /// 1-based
    pub rank: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_message_tags() {
        let join: ClientMessage =
            serde_json::from_str(r#"{"t":"join","name":"Alice"}"#).unwrap();
        assert!(matches!(join, ClientMessage::Join { ref name, player_id: None } if name == "Alice"));

        let rejoin: ClientMessage =
            serde_json::from_str(r#"{"t":"join","name":"","player_id":"01ABC"}"#).unwrap();
        assert!(matches!(rejoin, ClientMessage::Join { player_id: Some(_), .. }));

        let ready: ClientMessage = serde_json::from_str(r#"{"t":"player.readyToggle"}"#).unwrap();
        assert!(matches!(ready, ClientMessage::ReadyToggle));

        let submit: ClientMessage =
            serde_json::from_str(r#"{"t":"submit.word","word":"comet"}"#).unwrap();
        assert!(matches!(submit, ClientMessage::SubmitWord { ref word } if word == "comet"));

        let stats: ClientMessage = serde_json::from_str(r#"{"t":"statsRequest"}"#).unwrap();
        assert!(matches!(stats, ClientMessage::StatsRequest));

        assert!(serde_json::from_str::<ClientMessage>(r#"{"t":"host.explode"}"#).is_err());
    }

    #[test]
    fn test_server_message_tags() {
        let result = ServerMessage::RoundResult {
            round: 2,
            hint: "Look up".to_string(),
            score: 3,
            flags: FlagSet::new(),
            meta: serde_json::Value::Null,
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["t"], "round.result:me");
        assert_eq!(json["score"], 3);

        let phase = ServerMessage::PhaseChanged {
            phase: GamePhase::Resolution,
            round: 1,
            reason: Some(FinalizeReason::AllSubmitted),
            prompt: None,
        };
        let json = serde_json::to_value(&phase).unwrap();
        assert_eq!(json["t"], "phase.changed");
        assert_eq!(json["reason"], "all_submitted");
        assert!(json.get("prompt").is_none());
    }

    #[test]
    fn test_game_error_into_message() {
        let msg: ServerMessage = GameError::WrongPhase(GamePhase::Discussion).into();
        match msg {
            ServerMessage::Error { code, .. } => assert_eq!(code, "WRONG_PHASE"),
            other => panic!("unexpected {:?}", other),
        }
    }
}
