//! Defensive parsing of remote evaluator output.
//!
//! Models answer with JSON of uncertain shape, sometimes wrapped in markdown fences or
//! surrounded by prose. Two layouts are understood:
//!
//! - `{"players": {"<id>": {"hint", "score", "flags", "meta"}}, "discussion": "..."}`
//! - `{"results": [{"user", "input", "score", "hint"}]}`
//!
//! Every field is optional; unusable values become `None` rather than errors.

use super::{LlmError, LlmResult, RemoteEntry, RemoteEvaluation, RemoteSecret};
use serde_json::Value;

/// Extract the first JSON object from free-form model output
pub fn extract_json(text: &str) -> LlmResult<Value> {
    let trimmed = strip_fences(text.trim());

    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        return Ok(value);
    }

    let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}')) else {
        return Err(LlmError::ParseError("No JSON object in response".to_string()));
    };
    if end < start {
        return Err(LlmError::ParseError("No JSON object in response".to_string()));
    }

    serde_json::from_str(&trimmed[start..=end]).map_err(|e| LlmError::ParseError(e.to_string()))
}

fn strip_fences(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    // Drop the language tag line, if any
    let body = match rest.find('\n') {
        Some(newline) => &rest[newline + 1..],
        None => rest,
    };
    body.trim_end().trim_end_matches("```").trim()
}

pub fn parse_evaluation(text: &str) -> LlmResult<RemoteEvaluation> {
    evaluation_from_value(&extract_json(text)?)
}

pub fn evaluation_from_value(value: &Value) -> LlmResult<RemoteEvaluation> {
    let object = value
        .as_object()
        .ok_or_else(|| LlmError::ParseError("Expected a JSON object".to_string()))?;

    let entries = match (object.get("players"), object.get("results")) {
        (Some(Value::Object(players)), _) => players
            .iter()
            .map(|(key, entry)| entry_from_value(Some(key), entry))
            .collect(),
        (Some(Value::Array(players)), _) | (_, Some(Value::Array(players))) => players
            .iter()
            .map(|entry| entry_from_value(None, entry))
            .collect(),
        _ => Vec::new(),
    };

    Ok(RemoteEvaluation {
        entries,
        discussion: string_field(value, &["discussion", "summary"]),
    })
}

fn entry_from_value(key: Option<&str>, value: &Value) -> RemoteEntry {
    let player_ref = key
        .map(str::to_string)
        .or_else(|| string_field(value, &["playerId", "player_id", "id", "user", "name"]));

    RemoteEntry {
        player_ref,
        word: string_field(value, &["input", "word"]),
        hint: string_field(value, &["hint"]),
        score: value.get("score").and_then(score_value),
        flags: value.get("flags").and_then(flags_value),
        meta: value.get("meta").filter(|m| !m.is_null()).cloned(),
    }
}

fn string_field(value: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|key| value.get(*key))
        .find_map(|v| match v {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
}

fn score_value(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.round() as i64)),
        Value::String(s) => s.trim().parse::<f64>().ok().map(|f| f.round() as i64),
        _ => None,
    }
}

fn flags_value(value: &Value) -> Option<Vec<String>> {
    match value {
        Value::Array(items) => Some(
            items
                .iter()
                .filter_map(|item| item.as_str().map(str::to_string))
                .collect(),
        ),
        Value::String(s) if !s.trim().is_empty() => Some(vec![s.clone()]),
        _ => None,
    }
}

pub fn parse_secret(text: &str) -> LlmResult<RemoteSecret> {
    let value = extract_json(text)?;
    if !value.is_object() {
        return Err(LlmError::ParseError("Expected a JSON object".to_string()));
    }
    Ok(RemoteSecret {
        secret: string_field(&value, &["secret", "keyword"]),
        theme: string_field(&value, &["theme"]),
        rationale: string_field(&value, &["rationale", "reason"]),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_players_map() {
        let text = r#"{
            "players": {
                "p1": {"hint": "Look up", "score": 2, "flags": ["too_direct"], "meta": {"why": "x"}},
                "p2": {"hint": "Warm", "score": "1.6"}
            },
            "discussion": "Compare notes"
        }"#;
        let evaluation = parse_evaluation(text).unwrap();

        assert_eq!(evaluation.entries.len(), 2);
        assert_eq!(evaluation.discussion.as_deref(), Some("Compare notes"));

        let p1 = evaluation
            .entries
            .iter()
            .find(|e| e.player_ref.as_deref() == Some("p1"))
            .unwrap();
        assert_eq!(p1.score, Some(2));
        assert_eq!(p1.flags, Some(vec!["too_direct".to_string()]));
        assert_eq!(p1.meta.as_ref().unwrap()["why"], "x");

        let p2 = evaluation
            .entries
            .iter()
            .find(|e| e.player_ref.as_deref() == Some("p2"))
            .unwrap();
        assert_eq!(p2.score, Some(2));
        assert!(p2.flags.is_none());
    }

    #[test]
    fn test_parse_results_list_in_fences() {
        let text = "```json\n{\"results\": [{\"user\": \"Alice\", \"input\": \"sun\", \"score\": 3, \"hint\": \"Bright\"}, {\"score\": null}]}\n```";
        let evaluation = parse_evaluation(text).unwrap();

        assert_eq!(evaluation.entries.len(), 2);
        assert_eq!(evaluation.entries[0].player_ref.as_deref(), Some("Alice"));
        assert_eq!(evaluation.entries[0].word.as_deref(), Some("sun"));
        assert_eq!(evaluation.entries[0].hint.as_deref(), Some("Bright"));
        assert_eq!(evaluation.entries[1], RemoteEntry::default());
        assert!(evaluation.discussion.is_none());
    }

    #[test]
    fn test_extract_json_from_prose() {
        let value = extract_json("Sure! Here you go: {\"secret\": \"comet\"} Enjoy.").unwrap();
        assert_eq!(value["secret"], "comet");
    }

    #[test]
    fn test_unusable_output_is_an_error() {
        assert!(matches!(
            parse_evaluation("no json here"),
            Err(LlmError::ParseError(_))
        ));
        assert!(matches!(
            parse_evaluation("[1, 2, 3]"),
            Err(LlmError::ParseError(_))
        ));
    }

    #[test]
    fn test_unknown_shape_yields_no_entries() {
        let evaluation = parse_evaluation(r#"{"verdict": "great"}"#).unwrap();
        assert!(evaluation.entries.is_empty());
    }

    #[test]
    fn test_parse_secret() {
        let secret =
            parse_secret(r#"{"secret": "nebula", "theme": "Space", "rationale": "Appears often"}"#)
                .unwrap();
        assert_eq!(secret.secret.as_deref(), Some("nebula"));
        assert_eq!(secret.theme.as_deref(), Some("Space"));

        let empty = parse_secret(r#"{"theme": 5}"#).unwrap();
        assert!(empty.secret.is_none());
        assert_eq!(empty.theme.as_deref(), Some("5"));
    }
}
