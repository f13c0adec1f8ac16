//! Reference corpus for the offline hint engine
//!
//! Sentences come from an already-extracted plain-text document. They are indexed by
//! lowercase keyword so the fallback evaluator can find sentences related to a secret or a
//! submitted word without any network access.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};

/// Minimum length (in chars) of a sentence worth indexing
const MIN_SENTENCE_CHARS: usize = 10;
/// Minimum length (in chars) of a keyword offered as a secret
const MIN_SECRET_CHARS: usize = 3;
const SENTENCE_TERMINATORS: &[char] = &['.', '!', '?', '。', '？', '！'];

#[derive(Debug, thiserror::Error)]
pub enum CorpusError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid rules file: {0}")]
    Rules(#[from] serde_json::Error),
}

/// Word lists that steer hint selection and flagging
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Rules {
    #[serde(default)]
    pub forbidden: Vec<String>,
    #[serde(default)]
    pub spoilers: Vec<String>,
    #[serde(default)]
    pub noise: Vec<String>,
    #[serde(default)]
    pub penalties: HashMap<String, serde_json::Value>,
}

impl Rules {
    pub fn from_json(raw: &str) -> Result<Self, CorpusError> {
        Ok(serde_json::from_str(raw)?)
    }
}

/// Split text into lowercase alphanumeric tokens of at least two characters.
///
/// Word boundaries are any non-alphanumeric character, so Latin, Hangul, kana and digits are
/// all handled the same way.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|token| token.chars().count() >= 2)
        .map(|token| token.to_lowercase())
        .collect()
}

/// Split extracted document text into sentences, dropping fragments that are too short
pub fn split_sentences(text: &str) -> Vec<String> {
    let text = text.replace('\u{200b}', " ");
    let mut sentences = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        current.push(c);
        let boundary = SENTENCE_TERMINATORS.contains(&c)
            && chars.peek().map(|next| next.is_whitespace()).unwrap_or(true);
        if boundary {
            sentences.push(std::mem::take(&mut current));
        }
    }
    sentences.push(current);

    sentences
        .into_iter()
        .map(|s| s.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|s| s.chars().count() >= MIN_SENTENCE_CHARS)
        .collect()
}

fn chars_match(a: &[char], b: &[char]) -> bool {
    a.len() == b.len()
        && a
            .iter()
            .zip(b)
            .all(|(x, y)| x == y || x.to_lowercase().eq(y.to_lowercase()))
}

/// Replace every case-insensitive occurrence of `term` with `mask`
pub fn replace_ignore_case(text: &str, term: &str, mask: &str) -> String {
    let needle: Vec<char> = term.chars().collect();
    let haystack: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut i = 0;

    while i < haystack.len() {
        let end = i + needle.len();
        if !needle.is_empty() && end <= haystack.len() && chars_match(&haystack[i..end], &needle) {
            out.push_str(mask);
            i = end;
        } else {
            out.push(haystack[i]);
            i += 1;
        }
    }
    out
}

pub fn contains_ignore_case(text: &str, term: &str) -> bool {
    let needle: Vec<char> = term.chars().collect();
    let haystack: Vec<char> = text.chars().collect();
    !needle.is_empty()
        && haystack
            .windows(needle.len())
            .any(|window| chars_match(window, &needle))
}

fn normalize_terms(terms: &[String]) -> HashSet<String> {
    terms
        .iter()
        .map(|t| t.trim().to_lowercase())
        .filter(|t| !t.is_empty())
        .collect()
}

/// Immutable keyword index over the reference sentences
#[derive(Debug, Clone, Default)]
pub struct CorpusIndex {
    sentences: Vec<String>,
    rules: Rules,
    keyword_index: HashMap<String, Vec<usize>>,
    forbidden: HashSet<String>,
    spoilers: HashSet<String>,
    keyword_pool: Vec<String>,
}

impl CorpusIndex {
    pub fn new(sentences: Vec<String>, rules: Rules) -> Self {
        let mut keyword_index: HashMap<String, Vec<usize>> = HashMap::new();
        for (idx, sentence) in sentences.iter().enumerate() {
            let unique: HashSet<String> = tokenize(sentence).into_iter().collect();
            for word in unique {
                keyword_index.entry(word).or_default().push(idx);
            }
        }

        let forbidden = normalize_terms(&rules.forbidden);
        let spoilers = normalize_terms(&rules.spoilers);
        let noise = normalize_terms(&rules.noise);

        let keyword_pool: BTreeSet<String> = keyword_index
            .keys()
            .filter(|k| k.chars().count() >= MIN_SECRET_CHARS)
            .filter(|k| !k.chars().all(|c| c.is_numeric()))
            .filter(|k| !forbidden.contains(*k) && !spoilers.contains(*k) && !noise.contains(*k))
            .cloned()
            .collect();

        Self {
            sentences,
            rules,
            keyword_index,
            forbidden,
            spoilers,
            keyword_pool: keyword_pool.into_iter().collect(),
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn sentences(&self) -> &[String] {
        &self.sentences
    }

    pub fn sentence(&self, idx: usize) -> Option<&str> {
        self.sentences.get(idx).map(String::as_str)
    }

    pub fn rules(&self) -> &Rules {
        &self.rules
    }

    /// Sentence indices that contain the given (lowercase) token, ascending
    pub fn indices_for(&self, token: &str) -> &[usize] {
        self.keyword_index
            .get(token)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn contains_token(&self, token: &str) -> bool {
        self.keyword_index.contains_key(token)
    }

    /// Lowercased forbidden terms
    pub fn forbidden_terms(&self) -> &HashSet<String> {
        &self.forbidden
    }

    /// Lowercased spoiler terms
    pub fn spoiler_terms(&self) -> &HashSet<String> {
        &self.spoilers
    }

    /// Sorted, deduplicated keywords that may serve as secrets
    pub fn keyword_pool(&self) -> &[String] {
        &self.keyword_pool
    }

    /// Leading sentences used as context for remote evaluators
    pub fn context(&self, max_sentences: usize) -> &[String] {
        &self.sentences[..self.sentences.len().min(max_sentences)]
    }

    pub fn is_empty(&self) -> bool {
        self.sentences.is_empty()
    }

    /// Mask forbidden and spoiler terms in a chat line with `***`
    pub fn mask_chat(&self, message: &str) -> String {
        self.rules
            .forbidden
            .iter()
            .chain(self.rules.spoilers.iter())
            .map(|term| term.trim())
            .filter(|term| !term.is_empty())
            .fold(message.to_string(), |text, term| {
                replace_ignore_case(&text, term, "***")
            })
    }
}

/// Where the corpus and its rules are loaded from
#[derive(Debug, Clone, Default)]
pub struct CorpusConfig {
    pub sentences_path: Option<PathBuf>,
    pub rules_path: Option<PathBuf>,
}

impl CorpusConfig {
    /// Load paths from CORPUS_SENTENCES_PATH and CORPUS_RULES_PATH
    pub fn from_env() -> Self {
        let path = |key: &str| {
            std::env::var(key)
                .ok()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .map(PathBuf::from)
        };
        Self {
            sentences_path: path("CORPUS_SENTENCES_PATH"),
            rules_path: path("CORPUS_RULES_PATH"),
        }
    }

    /// Read both files and build a fresh index. Missing paths yield empty defaults.
    pub fn load(&self) -> Result<CorpusIndex, CorpusError> {
        let sentences = match &self.sentences_path {
            Some(path) => split_sentences(&read(path)?),
            None => Vec::new(),
        };
        let rules = match &self.rules_path {
            Some(path) => Rules::from_json(&read(path)?)?,
            None => Rules::default(),
        };

        tracing::info!(
            "Corpus loaded: {} sentences, {} forbidden, {} spoiler terms",
            sentences.len(),
            rules.forbidden.len(),
            rules.spoilers.len()
        );
        Ok(CorpusIndex::new(sentences, rules))
    }
}

fn read(path: &Path) -> Result<String, CorpusError> {
    std::fs::read_to_string(path).map_err(|source| CorpusError::Io {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn sample_index() -> CorpusIndex {
        CorpusIndex::new(
            vec![
                "Fusion reactors combine light nuclei at extreme pressure.".to_string(),
                "Stars shine because their cores are hot and dense.".to_string(),
                "A reactor needs careful cooling to stay safe.".to_string(),
            ],
            Rules {
                forbidden: vec!["Cheat".to_string()],
                spoilers: vec![" Tokamak ".to_string()],
                noise: vec!["the".to_string()],
                penalties: HashMap::new(),
            },
        )
    }

    #[test]
    fn test_tokenize_lowercases_and_drops_short_tokens() {
        assert_eq!(
            tokenize("A Fusion-reactor, 2x hot!"),
            vec!["fusion", "reactor", "2x", "hot"]
        );
        assert_eq!(tokenize("핵융합 반응"), vec!["핵융합", "반응"]);
        assert!(tokenize("  ").is_empty());
    }

    #[test]
    fn test_split_sentences_keeps_long_sentences() {
        let text = "Short. This sentence is long enough! Is this one too? Yes.";
        assert_eq!(
            split_sentences(text),
            vec!["This sentence is long enough!", "Is this one too?"]
        );
    }

    #[test]
    fn test_split_sentences_ignores_decimal_points() {
        let text = "The value 3.14 is a famous constant. Another sentence here.";
        assert_eq!(
            split_sentences(text),
            vec!["The value 3.14 is a famous constant.", "Another sentence here."]
        );
    }

    #[test]
    fn test_index_maps_keywords_to_sentences() {
        let index = sample_index();
        assert_eq!(index.indices_for("fusion"), &[0]);
        assert_eq!(index.indices_for("are"), &[1]);
        assert_eq!(index.indices_for("reactor"), &[2]);
        assert!(index.indices_for("missing").is_empty());
        assert!(index.contains_token("cooling"));
    }

    #[test]
    fn test_rule_terms_are_normalized() {
        let index = sample_index();
        assert!(index.forbidden_terms().contains("cheat"));
        assert!(index.spoiler_terms().contains("tokamak"));
    }

    #[test]
    fn test_keyword_pool_excludes_short_and_noise_terms() {
        let index = sample_index();
        let pool = index.keyword_pool();
        assert!(pool.contains(&"fusion".to_string()));
        assert!(!pool.contains(&"at".to_string()));
        assert!(!pool.contains(&"the".to_string()));
        let mut sorted = pool.to_vec();
        sorted.sort();
        assert_eq!(sorted, pool);
    }

    #[test]
    fn test_context_is_bounded() {
        let index = sample_index();
        assert_eq!(index.context(2).len(), 2);
        assert_eq!(index.context(10).len(), 3);
    }

    #[test]
    fn test_case_insensitive_helpers() {
        assert_eq!(replace_ignore_case("Ünïcode ünÏCODE", "ünïcode", "#"), "# #");
        assert_eq!(replace_ignore_case("abc", "", "#"), "abc");
        assert!(contains_ignore_case("A Tokamak here", "TOKAMAK"));
        assert!(!contains_ignore_case("short", "much longer term"));
    }

    #[test]
    fn test_mask_chat() {
        let index = sample_index();
        assert_eq!(
            index.mask_chat("No CHEATING near the tokamak!"),
            "No ***ING near the ***!"
        );
        assert_eq!(index.mask_chat("all clear"), "all clear");
    }

    #[test]
    fn test_load_from_files() {
        let mut sentences = tempfile::NamedTempFile::new().unwrap();
        write!(
            sentences,
            "Plasma is the fourth state of matter. Magnets confine the hot plasma."
        )
        .unwrap();
        let mut rules = tempfile::NamedTempFile::new().unwrap();
        write!(rules, r#"{{"forbidden": ["magnet"], "spoilers": ["plasma"]}}"#).unwrap();

        let config = CorpusConfig {
            sentences_path: Some(sentences.path().to_path_buf()),
            rules_path: Some(rules.path().to_path_buf()),
        };
        let index = config.load().unwrap();

        assert_eq!(index.sentences().len(), 2);
        assert!(index.spoiler_terms().contains("plasma"));
        assert!(index.rules().noise.is_empty());
    }

    #[test]
    fn test_load_without_paths_is_empty() {
        let index = CorpusConfig::default().load().unwrap();
        assert!(index.is_empty());
        assert!(index.keyword_pool().is_empty());
    }

    #[test]
    fn test_load_reports_missing_file() {
        let config = CorpusConfig {
            sentences_path: Some(PathBuf::from("/definitely/not/here.txt")),
            rules_path: None,
        };
        assert!(matches!(config.load(), Err(CorpusError::Io { .. })));
    }

    #[test]
    fn test_invalid_rules_json() {
        assert!(matches!(
            Rules::from_json("{not json"),
            Err(CorpusError::Rules(_))
        ));
    }
}
