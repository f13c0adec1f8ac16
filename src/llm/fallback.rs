//! Offline hint engine.
//!
//! Picks the reference sentence most related to the secret and the submitted word, redacts the
//! secret and spoiler terms from it and derives flags and a score. The output only depends on
//! the corpus and the inputs, so identical rounds always produce identical hints.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

use super::{EvaluationRequest, EvaluationResult, EvaluationSource, PlayerResult};
use crate::corpus::{contains_ignore_case, replace_ignore_case, tokenize, CorpusIndex};
use crate::types::{FlagSet, SubmissionFlag};

const SUBMITTED_TEMPLATE: &str = "Take another look at the themes around '{word}'. \
    An indirect clue is hiding in a different part of the material.";
const MISSED_TEMPLATE: &str =
    "No clue surfaced this time. Next turn, pick a core idea that stands out in the material.";
/// Used when a redacted hint would still give the secret away
const NEUTRAL_HINT: &str = "The material holds a clue, but it is too revealing to share. \
    Try a different angle next round.";
const FALLBACK_DISCUSSION: &str =
    "Compare your hints and talk through which ideas point toward the secret.";

/// Outcome of hint generation for one word
#[derive(Debug, Clone, PartialEq)]
pub struct Hint {
    pub text: String,
    /// Score of the chosen sentence, 0 when a template was used
    pub relevance: u32,
    pub flags: FlagSet,
}

/// Deterministic evaluator over a swappable corpus snapshot
pub struct FallbackEvaluator {
    corpus: RwLock<Arc<CorpusIndex>>,
}

impl FallbackEvaluator {
    pub fn new(corpus: CorpusIndex) -> Self {
        Self {
            corpus: RwLock::new(Arc::new(corpus)),
        }
    }

    /// Current corpus snapshot. Readers keep their snapshot across a reload.
    pub fn corpus(&self) -> Arc<CorpusIndex> {
        match self.corpus.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Swap in a freshly built corpus
    pub fn reload(&self, corpus: CorpusIndex) {
        let corpus = Arc::new(corpus);
        match self.corpus.write() {
            Ok(mut guard) => *guard = corpus,
            Err(poisoned) => *poisoned.into_inner() = corpus,
        }
        tracing::info!("Fallback corpus reloaded");
    }

    pub fn generate_hint(&self, secret: &str, word: &str) -> Hint {
        generate_hint(&self.corpus(), secret, word)
    }

    /// Evaluate every entry of a round
    pub fn evaluate(&self, request: &EvaluationRequest) -> EvaluationResult {
        let corpus = self.corpus();

        let mut counts: HashMap<String, usize> = HashMap::new();
        for entry in &request.entries {
            let normalized = entry.word.trim().to_lowercase();
            if !normalized.is_empty() {
                *counts.entry(normalized).or_default() += 1;
            }
        }

        let results = request
            .entries
            .iter()
            .map(|entry| {
                let hint = generate_hint(&corpus, &request.secret, &entry.word);
                let normalized = entry.word.trim().to_lowercase();
                let unique = counts.get(&normalized).copied().unwrap_or(0) == 1;
                let score = score_submission(!normalized.is_empty(), unique, &hint.flags);

                let result = PlayerResult {
                    hint: hint.text,
                    score,
                    flags: hint.flags,
                    meta: serde_json::json!({
                        "source": "fallback",
                        "relevance": hint.relevance,
                    }),
                };
                (entry.player_id.clone(), result)
            })
            .collect();

        EvaluationResult {
            results,
            discussion: FALLBACK_DISCUSSION.to_string(),
            source: EvaluationSource::Fallback,
        }
    }
}

/// 1 for submitting, +1 unique word, +1 not too direct, -1 forbidden; never negative
pub fn score_submission(submitted: bool, unique: bool, flags: &FlagSet) -> u32 {
    if !submitted {
        return 0;
    }
    let mut score: i32 = 1;
    if unique {
        score += 1;
    }
    if !flags.contains(&SubmissionFlag::TooDirect) {
        score += 1;
    }
    if flags.contains(&SubmissionFlag::Forbidden) {
        score -= 1;
    }
    score.max(0) as u32
}

pub fn generate_hint(corpus: &CorpusIndex, secret: &str, word: &str) -> Hint {
    let secret_tokens: HashSet<String> = tokenize(secret).into_iter().collect();
    let word_tokens: HashSet<String> = tokenize(word).into_iter().collect();

    let mut candidates: Vec<usize> = secret_tokens
        .iter()
        .chain(word_tokens.iter())
        .flat_map(|token| corpus.indices_for(token).iter().copied())
        .collect();
    candidates.sort_unstable();
    candidates.dedup();

    let best = pick_best_sentence(corpus, &candidates, &secret_tokens, &word_tokens);

    let (raw, relevance) = match best {
        Some((sentence, relevance)) => (sentence.to_string(), relevance),
        None if word.trim().is_empty() => (MISSED_TEMPLATE.to_string(), 0),
        None => (SUBMITTED_TEMPLATE.replace("{word}", word.trim()), 0),
    };
    let text = redact_hint(&raw, secret, corpus);
    let flags = derive_flags(corpus, &secret_tokens, &word_tokens, &text);

    Hint {
        text,
        relevance,
        flags,
    }
}

/// Highest scoring sentence that mentions neither a secret token nor a spoiler.
/// Ties keep the earlier candidate.
fn pick_best_sentence<'a>(
    corpus: &'a CorpusIndex,
    candidates: &[usize],
    secret_tokens: &HashSet<String>,
    word_tokens: &HashSet<String>,
) -> Option<(&'a str, u32)> {
    let mut best = None;
    let mut best_score = 0;

    for &idx in candidates {
        let Some(sentence) = corpus.sentence(idx) else {
            continue;
        };
        let tokens: HashSet<String> = tokenize(sentence).into_iter().collect();
        if tokens
            .iter()
            .any(|t| secret_tokens.contains(t) || corpus.spoiler_terms().contains(t))
        {
            continue;
        }

        let word_overlap = tokens.intersection(word_tokens).count() as u32;
        let secret_overlap = tokens.intersection(secret_tokens).count() as u32;
        let positional = 5u32.saturating_sub((idx as u64 + 2).ilog2());
        let score = word_overlap + secret_overlap * 3 / 2 + positional;

        if score > best_score {
            best_score = score;
            best = Some((sentence, score));
        }
    }

    best
}

fn derive_flags(
    corpus: &CorpusIndex,
    secret_tokens: &HashSet<String>,
    word_tokens: &HashSet<String>,
    hint: &str,
) -> FlagSet {
    let mut flags = FlagSet::new();

    if !word_tokens.is_disjoint(secret_tokens) {
        flags.insert(SubmissionFlag::TooDirect);
    }
    if !word_tokens.is_disjoint(corpus.spoiler_terms()) {
        flags.insert(SubmissionFlag::TooDirect);
    }
    if !word_tokens.is_disjoint(corpus.forbidden_terms()) {
        flags.insert(SubmissionFlag::Forbidden);
    }
    if word_tokens.is_empty() || !word_tokens.iter().any(|t| corpus.contains_token(t)) {
        flags.insert(SubmissionFlag::OffTopic);
    }

    let lowered = hint.to_lowercase();
    if corpus
        .spoiler_terms()
        .iter()
        .any(|term| lowered.contains(term.as_str()))
    {
        flags.insert(SubmissionFlag::TooDirect);
    }

    flags
}

/// Mask the secret and every spoiler term, falling back to a neutral message if anything still
/// leaks afterwards.
pub fn redact_hint(hint: &str, secret: &str, corpus: &CorpusIndex) -> String {
    let mut terms: Vec<&str> = vec![secret.trim()];
    terms.extend(corpus.rules().spoilers.iter().map(|s| s.trim()));
    terms.retain(|t| !t.is_empty());

    let mut redacted = hint.to_string();
    for term in &terms {
        let mask = "?".repeat(term.chars().count().min(3));
        redacted = replace_ignore_case(&redacted, term, &mask);
    }

    if terms.iter().any(|term| contains_ignore_case(&redacted, term)) {
        return NEUTRAL_HINT.to_string();
    }
    redacted
}
