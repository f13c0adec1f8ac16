mod azure;
pub mod fallback;
mod gemini;
pub mod parse;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::time::Duration;

use crate::corpus::{CorpusIndex, Rules};
use crate::types::{FlagSet, PlayerId, RoundIndex, SubmissionFlag};

pub use azure::AzureProvider;
pub use fallback::FallbackEvaluator;
pub use gemini::GeminiProvider;

/// Result type for LLM operations
pub type LlmResult<T> = Result<T, LlmError>;

/// Errors that can occur during remote evaluation
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("API request failed: {0}")]
    ApiError(String),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    #[error("Response parsing failed: {0}")]
    ParseError(String),
}

/// Number of leading corpus sentences sent to remote evaluators as context
const CONTEXT_SENTENCES: usize = 16;
/// Number of pool keywords offered to a remote evaluator when it picks a secret
const KEYWORD_SAMPLE: usize = 40;

/// Highest score a remote evaluator may award per submission
const MAX_REMOTE_SCORE: i64 = 3;

const DEFAULT_REMOTE_DISCUSSION: &str = "Share your hints and discuss what the secret might be.";
const MISSING_REMOTE_HINT: &str = "No hint arrived for this word.";

/// Used when the corpus has no usable keywords
const DEFAULT_SECRETS: &[&str] = &[
    "apple",
    "banana",
    "cherry",
    "date",
    "elderberry",
    "fig",
    "grape",
];

/// One player's contribution to a round, as handed to an evaluator
#[derive(Debug, Clone, Serialize)]
pub struct EvaluationEntry {
    pub player_id: PlayerId,
    pub name: String,
    pub connected: bool,
    pub word: String,
}

/// Everything an evaluator needs to score one round
#[derive(Debug, Clone)]
pub struct EvaluationRequest {
    pub round: RoundIndex,
    pub secret: String,
    pub entries: Vec<EvaluationEntry>,
    pub rules: Rules,
    pub context: Vec<String>,
}

impl EvaluationRequest {
    /// JSON body sent to remote evaluators
    pub fn payload(&self) -> serde_json::Value {
        let players: Vec<_> = self
            .entries
            .iter()
            .map(|e| serde_json::json!({ "id": e.player_id, "name": e.name, "connected": e.connected }))
            .collect();
        let submissions: serde_json::Map<String, serde_json::Value> = self
            .entries
            .iter()
            .map(|e| (e.player_id.clone(), serde_json::json!({ "word": e.word })))
            .collect();

        serde_json::json!({
            "round": self.round,
            "secret": self.secret,
            "rules": self.rules,
            "context": self.context,
            "players": players,
            "submissions": submissions,
        })
    }
}

/// Request for a remote evaluator to pick the next secret
#[derive(Debug, Clone)]
pub struct SecretRequest {
    pub round: RoundIndex,
    pub used_secrets: Vec<String>,
    pub rules: Rules,
    pub context: Vec<String>,
    pub keyword_sample: Vec<String>,
}

impl SecretRequest {
    pub fn payload(&self) -> serde_json::Value {
        serde_json::json!({
            "round": self.round,
            "usedSecrets": self.used_secrets,
            "rules": {
                "forbidden": self.rules.forbidden,
                "spoilers": self.rules.spoilers,
            },
            "context": self.context,
            "keywordPool": self.keyword_sample,
        })
    }
}

/// Normalized evaluation of one player's submission
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlayerResult {
    pub hint: String,
    pub score: u32,
    pub flags: FlagSet,
    pub meta: serde_json::Value,
}

impl PlayerResult {
    /// Stand-in for a player the evaluator returned nothing for
    pub fn missing() -> Self {
        Self {
            hint: String::new(),
            score: 0,
            flags: [SubmissionFlag::AiMissing].into_iter().collect(),
            meta: serde_json::Value::Null,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EvaluationSource {
    Remote,
    Fallback,
}

impl EvaluationSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            EvaluationSource::Remote => "remote",
            EvaluationSource::Fallback => "fallback",
        }
    }
}

#[derive(Debug, Clone)]
pub struct EvaluationResult {
    pub results: HashMap<PlayerId, PlayerResult>,
    pub discussion: String,
    pub source: EvaluationSource,
}

/// A secret picked for a round, with presentation metadata
#[derive(Debug, Clone, Serialize)]
pub struct SecretChoice {
    pub secret: String,
    pub theme: String,
    pub rationale: String,
    pub source: String,
}

/// One per-player record from a remote response; every field may be absent
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RemoteEntry {
    /// Player id or display name, whichever the remote echoed back
    pub player_ref: Option<String>,
    pub word: Option<String>,
    pub hint: Option<String>,
    pub score: Option<i64>,
    pub flags: Option<Vec<String>>,
    pub meta: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RemoteEvaluation {
    pub entries: Vec<RemoteEntry>,
    pub discussion: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RemoteSecret {
    pub secret: Option<String>,
    pub theme: Option<String>,
    pub rationale: Option<String>,
}

/// Trait that every remote evaluator provider implements
#[async_trait]
pub trait RemoteEvaluator: Send + Sync {
    /// Score and hint every submission of a round
    async fn evaluate(&self, request: &EvaluationRequest) -> LlmResult<RemoteEvaluation>;

    /// Pick a secret for the next round
    async fn choose_secret(&self, request: &SecretRequest) -> LlmResult<RemoteSecret>;

    /// Get the name of this provider
    fn name(&self) -> &str;
}

/// Wraps an optional remote evaluator and always produces a usable result
pub struct Evaluator {
    remote: Option<Box<dyn RemoteEvaluator>>,
    fallback: FallbackEvaluator,
    hints_enabled: bool,
    timeout: Duration,
}

impl Evaluator {
    pub fn new(
        remote: Option<Box<dyn RemoteEvaluator>>,
        fallback: FallbackEvaluator,
        config: &LlmConfig,
    ) -> Self {
        Self {
            remote,
            fallback,
            hints_enabled: config.hints_enabled,
            timeout: config.timeout,
        }
    }

    /// Evaluator that never leaves the process
    pub fn fallback_only(corpus: CorpusIndex) -> Self {
        Self::new(None, FallbackEvaluator::new(corpus), &LlmConfig::default())
    }

    pub fn fallback(&self) -> &FallbackEvaluator {
        &self.fallback
    }

    pub fn remote_name(&self) -> Option<&str> {
        self.remote.as_ref().map(|r| r.name())
    }

    pub fn hints_enabled(&self) -> bool {
        self.hints_enabled
    }

    /// Replace the corpus used for fallback hints and remote context
    pub fn reload_corpus(&self, corpus: CorpusIndex) {
        self.fallback.reload(corpus);
    }

    /// Evaluate a round. Remote failures of any kind are logged and replaced by the
    /// fallback result, so callers always get one.
    pub async fn evaluate(
        &self,
        round: RoundIndex,
        secret: &str,
        entries: Vec<EvaluationEntry>,
    ) -> EvaluationResult {
        let corpus = self.fallback.corpus();
        let request = EvaluationRequest {
            round,
            secret: secret.to_string(),
            entries,
            rules: corpus.rules().clone(),
            context: corpus.context(CONTEXT_SENTENCES).to_vec(),
        };

        if let Some(remote) = self.remote.as_ref().filter(|_| self.hints_enabled) {
            match tokio::time::timeout(self.timeout, remote.evaluate(&request)).await {
                Ok(Ok(evaluation)) => {
                    match match_remote_results(&request, &corpus, remote.name(), evaluation) {
                        Some(result) => return result,
                        None => tracing::warn!(
                            "{} returned no usable results for round {}",
                            remote.name(),
                            round
                        ),
                    }
                }
                Ok(Err(e)) => {
                    tracing::warn!("{} round evaluation failed: {}", remote.name(), e)
                }
                Err(_) => tracing::warn!(
                    "{} round evaluation failed: {}",
                    remote.name(),
                    LlmError::Timeout(self.timeout)
                ),
            }
        }

        tracing::info!("Using fallback hint engine for round {}", round);
        self.fallback.evaluate(&request)
    }

    /// Pick the next secret, avoiding anything in `used_secrets`
    pub async fn choose_secret(&self, round: RoundIndex, used_secrets: &[String]) -> SecretChoice {
        let corpus = self.fallback.corpus();

        if let Some(remote) = &self.remote {
            let request = SecretRequest {
                round,
                used_secrets: used_secrets.to_vec(),
                rules: corpus.rules().clone(),
                context: corpus.context(CONTEXT_SENTENCES + 2).to_vec(),
                keyword_sample: sample_keywords(corpus.keyword_pool(), KEYWORD_SAMPLE),
            };

            match tokio::time::timeout(self.timeout, remote.choose_secret(&request)).await {
                Ok(Ok(choice)) => {
                    let secret = choice.secret.as_deref().map(str::trim).unwrap_or("");
                    if !secret.is_empty() && !is_used(secret, used_secrets) {
                        tracing::info!("{} selected secret for round {}", remote.name(), round);
                        return SecretChoice {
                            secret: secret.to_string(),
                            theme: choice.theme.unwrap_or_else(|| "Mystery".to_string()),
                            rationale: choice.rationale.unwrap_or_default(),
                            source: remote.name().to_string(),
                        };
                    }
                    tracing::warn!(
                        "{} proposed an empty or repeated secret for round {}",
                        remote.name(),
                        round
                    );
                }
                Ok(Err(e)) => tracing::warn!("{} secret selection failed: {}", remote.name(), e),
                Err(_) => tracing::warn!(
                    "{} secret selection failed: {}",
                    remote.name(),
                    LlmError::Timeout(self.timeout)
                ),
            }
        }

        let secret = fallback_secret(corpus.keyword_pool(), used_secrets);
        tracing::info!("Fallback secret selected for round {}", round);
        SecretChoice {
            secret,
            theme: "Fallback".to_string(),
            rationale: "Random keyword from the reference material".to_string(),
            source: "fallback".to_string(),
        }
    }
}

fn is_used(secret: &str, used_secrets: &[String]) -> bool {
    used_secrets
        .iter()
        .any(|used| used.trim().to_lowercase() == secret.to_lowercase())
}

fn sample_keywords(pool: &[String], amount: usize) -> Vec<String> {
    use rand::seq::IndexedRandom;
    let mut rng = rand::rng();
    pool.choose_multiple(&mut rng, amount).cloned().collect()
}

fn fallback_secret(pool: &[String], used_secrets: &[String]) -> String {
    use rand::seq::IndexedRandom;
    let mut rng = rand::rng();

    let fresh: Vec<&str> = pool
        .iter()
        .map(String::as_str)
        .filter(|k| !is_used(k, used_secrets))
        .collect();
    if let Some(secret) = fresh.choose(&mut rng) {
        return secret.to_string();
    }

    let defaults: Vec<&str> = DEFAULT_SECRETS
        .iter()
        .copied()
        .filter(|k| !is_used(k, used_secrets))
        .collect();
    defaults
        .choose(&mut rng)
        .or_else(|| DEFAULT_SECRETS.choose(&mut rng))
        .map(|s| s.to_string())
        .unwrap_or_else(|| DEFAULT_SECRETS[0].to_string())
}

/// Map remote entries back onto players: by id or name first, then pair the leftovers by
/// position so partial or reordered output still reaches someone. Returns `None` when the
/// remote produced nothing usable.
fn match_remote_results(
    request: &EvaluationRequest,
    corpus: &CorpusIndex,
    provider: &str,
    evaluation: RemoteEvaluation,
) -> Option<EvaluationResult> {
    if evaluation.entries.is_empty() {
        return None;
    }

    let mut assigned: HashMap<PlayerId, RemoteEntry> = HashMap::new();
    let mut leftovers = Vec::new();

    for entry in evaluation.entries {
        let target = entry.player_ref.as_deref().and_then(|reference| {
            let reference = reference.trim();
            request.entries.iter().find(|p| {
                !assigned.contains_key(&p.player_id)
                    && (p.player_id == reference || p.name.trim().eq_ignore_ascii_case(reference))
            })
        });
        match target {
            Some(player) => {
                assigned.insert(player.player_id.clone(), entry);
            }
            None => leftovers.push(entry),
        }
    }

    let unmatched: Vec<&EvaluationEntry> = request
        .entries
        .iter()
        .filter(|p| !assigned.contains_key(&p.player_id))
        .collect();
    for (player, entry) in unmatched.into_iter().zip(leftovers) {
        assigned.insert(player.player_id.clone(), entry);
    }

    let results = assigned
        .into_iter()
        .map(|(player_id, entry)| {
            let result = normalize_remote_entry(entry, &request.secret, corpus, provider);
            (player_id, result)
        })
        .collect();

    Some(EvaluationResult {
        results,
        discussion: evaluation
            .discussion
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty())
            .unwrap_or_else(|| DEFAULT_REMOTE_DISCUSSION.to_string()),
        source: EvaluationSource::Remote,
    })
}

fn normalize_remote_entry(
    entry: RemoteEntry,
    secret: &str,
    corpus: &CorpusIndex,
    provider: &str,
) -> PlayerResult {
    let hint = entry
        .hint
        .map(|h| h.trim().to_string())
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| MISSING_REMOTE_HINT.to_string());

    let mut flags = FlagSet::new();
    let mut unknown = HashSet::new();
    for raw in entry.flags.unwrap_or_default() {
        match SubmissionFlag::parse(&raw) {
            Some(flag) => {
                flags.insert(flag);
            }
            None => {
                unknown.insert(raw);
            }
        }
    }
    if !unknown.is_empty() {
        tracing::debug!("Dropping unknown flags from {}: {:?}", provider, unknown);
    }

    let meta = match entry.meta {
        Some(serde_json::Value::Object(mut map)) => {
            map.entry("source")
                .or_insert_with(|| serde_json::Value::String(provider.to_string()));
            serde_json::Value::Object(map)
        }
        _ => serde_json::json!({ "source": provider }),
    };

    PlayerResult {
        hint: fallback::redact_hint(&hint, secret, corpus),
        score: entry.score.unwrap_or(0).clamp(0, MAX_REMOTE_SCORE) as u32,
        flags,
        meta,
    }
}

/// Which remote provider to build
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderSelection {
    /// Azure when fully configured, otherwise Gemini when configured
    Auto,
    Azure,
    Gemini,
    Disabled,
}

/// Configuration for remote evaluators
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub provider: ProviderSelection,
    pub azure_endpoint: Option<String>,
    pub azure_deployment: Option<String>,
    pub azure_api_key: Option<String>,
    pub azure_api_version: String,
    pub azure_temperature: f32,
    pub gemini_endpoint: Option<String>,
    pub gemini_api_key: Option<String>,
    pub gemini_temperature: f32,
    /// Upper bound for every remote call
    pub timeout: Duration,
    /// When false, rounds are always scored by the fallback engine
    pub hints_enabled: bool,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: ProviderSelection::Auto,
            azure_endpoint: None,
            azure_deployment: None,
            azure_api_key: None,
            azure_api_version: "2024-02-15-preview".to_string(),
            azure_temperature: 0.2,
            gemini_endpoint: None,
            gemini_api_key: None,
            gemini_temperature: 0.2,
            timeout: Duration::from_secs(20),
            hints_enabled: true,
        }
    }
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    })
}

impl LlmConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let provider = match env_string("EVALUATOR_PROVIDER")
            .map(|p| p.to_lowercase())
            .as_deref()
        {
            Some("azure") => ProviderSelection::Azure,
            Some("gemini") => ProviderSelection::Gemini,
            Some("none") | Some("off") | Some("fallback") => ProviderSelection::Disabled,
            Some(other) => {
                tracing::warn!("Unknown EVALUATOR_PROVIDER '{}', using auto", other);
                ProviderSelection::Auto
            }
            None => ProviderSelection::Auto,
        };

        Self {
            provider,
            azure_endpoint: env_string("AZURE_OPENAI_ENDPOINT")
                .map(|e| e.trim_end_matches('/').to_string()),
            azure_deployment: env_string("AZURE_OPENAI_DEPLOYMENT"),
            azure_api_key: env_string("AZURE_OPENAI_KEY"),
            azure_api_version: env_string("AZURE_OPENAI_API_VERSION")
                .unwrap_or(defaults.azure_api_version),
            azure_temperature: env_string("AZURE_OPENAI_TEMPERATURE")
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.azure_temperature),
            gemini_endpoint: env_string("GEMINI_API_ENDPOINT")
                .map(|e| e.trim_end_matches('/').to_string()),
            gemini_api_key: env_string("GEMINI_API_KEY"),
            gemini_temperature: env_string("GEMINI_TEMPERATURE")
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.gemini_temperature),
            timeout: env_string("LLM_TIMEOUT")
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
            hints_enabled: env_string("AI_HINTS_ENABLED")
                .map(|v| !matches!(v.to_lowercase().as_str(), "0" | "false" | "off"))
                .unwrap_or(defaults.hints_enabled),
        }
    }

    fn azure_ready(&self) -> bool {
        self.azure_endpoint.is_some()
            && self.azure_deployment.is_some()
            && self.azure_api_key.is_some()
    }

    fn gemini_ready(&self) -> bool {
        self.gemini_endpoint.is_some() && self.gemini_api_key.is_some()
    }

    /// Build the configured remote evaluator
    pub fn build_remote(&self) -> LlmResult<Box<dyn RemoteEvaluator>> {
        let selection = match self.provider {
            ProviderSelection::Auto if self.azure_ready() => ProviderSelection::Azure,
            ProviderSelection::Auto if self.gemini_ready() => ProviderSelection::Gemini,
            other => other,
        };

        match selection {
            ProviderSelection::Azure => {
                let (Some(endpoint), Some(deployment), Some(api_key)) = (
                    &self.azure_endpoint,
                    &self.azure_deployment,
                    &self.azure_api_key,
                ) else {
                    return Err(LlmError::ConfigError(
                        "Azure needs AZURE_OPENAI_ENDPOINT, AZURE_OPENAI_DEPLOYMENT and AZURE_OPENAI_KEY"
                            .to_string(),
                    ));
                };
                Ok(Box::new(AzureProvider::new(
                    endpoint.clone(),
                    deployment.clone(),
                    api_key.clone(),
                    self.azure_api_version.clone(),
                    self.azure_temperature,
                    self.timeout,
                )))
            }
            ProviderSelection::Gemini => {
                let (Some(endpoint), Some(api_key)) = (&self.gemini_endpoint, &self.gemini_api_key)
                else {
                    return Err(LlmError::ConfigError(
                        "Gemini needs GEMINI_API_ENDPOINT and GEMINI_API_KEY".to_string(),
                    ));
                };
                Ok(Box::new(GeminiProvider::new(
                    endpoint.clone(),
                    api_key.clone(),
                    self.gemini_temperature,
                    self.timeout,
                )?))
            }
            ProviderSelection::Disabled => Err(LlmError::ConfigError(
                "Remote evaluation disabled by EVALUATOR_PROVIDER".to_string(),
            )),
            ProviderSelection::Auto => Err(LlmError::ConfigError(
                "No remote evaluator configured. Set AZURE_OPENAI_* or GEMINI_* variables"
                    .to_string(),
            )),
        }
    }
}

/// System prompt for round evaluation
pub(crate) const EVALUATION_PROMPT: &str = "You are the game master of a word-association party game. \
    Given the secret keyword and each player's single-word submission, evaluate every player. \
    Never reveal the secret or any spoiler term in a hint. \
    Respond ONLY with JSON of the form \
    {\"players\": {\"<player id>\": {\"hint\": string, \"score\": 0-3, \"flags\": [string], \"meta\": object}}, \
    \"discussion\": string}. Allowed flags: forbidden, too_direct, off_topic.";

/// System prompt for secret selection
pub(crate) const SECRET_PROMPT: &str = "You are the game master of a word-association party game. \
    Pick a single secret keyword from the provided reference excerpts. \
    Avoid words already used in previous rounds and any forbidden or spoiler term. \
    Respond ONLY with JSON of the form {\"secret\": string, \"theme\": string, \"rationale\": string}.";
