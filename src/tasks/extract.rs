//! JSON payload extraction from raw AI responses.
//!
//! Models wrap their JSON in prose, markdown fences, or label prefixes.
//! Extraction runs an ordered list of pure strategies and short-circuits at
//! the first candidate that parses as JSON:
//!
//! 1. substring from the first `{` to the last `}`
//! 2. content of a fenced code block
//! 3. content after a recognized label prefix
//! 4. the raw text verbatim
//!
//! If every strategy fails, the raw text is preserved inside the error for
//! diagnostics.

use crate::error::{Result, TaskForgeError};
use regex::Regex;
use std::sync::OnceLock;
use tracing::debug;

/// One extraction attempt: a candidate substring, or `None` when the
/// strategy does not apply.
type Strategy = fn(&str) -> Option<String>;

const STRATEGIES: [(&str, Strategy); 4] = [
    ("brace-span", brace_span),
    ("fenced-block", fenced_block),
    ("label-prefix", label_prefix),
    ("verbatim", verbatim),
];

/// Extract the first parseable JSON payload from a raw response.
pub fn extract_json(raw: &str) -> Result<serde_json::Value> {
    for (name, strategy) in STRATEGIES {
        let Some(candidate) = strategy(raw) else {
            continue;
        };
        match serde_json::from_str(candidate.trim()) {
            Ok(value) => {
                debug!(strategy = name, "extracted JSON payload");
                return Ok(value);
            }
            Err(e) => debug!(strategy = name, error = %e, "extraction candidate did not parse"),
        }
    }

    Err(TaskForgeError::parse_failure(
        "no extraction strategy produced valid JSON",
        raw,
    ))
}

/// Substring from the first `{` to the last `}`, inclusive.
fn brace_span(raw: &str) -> Option<String> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    if end < start {
        return None;
    }
    Some(raw[start..=end].to_string())
}

/// Content of the first fenced code block, with or without a language tag.
fn fenced_block(raw: &str) -> Option<String> {
    static FENCE: OnceLock<Regex> = OnceLock::new();
    let fence = FENCE.get_or_init(|| {
        Regex::new(r"(?s)```[a-zA-Z]*\s*\n?(.*?)```").expect("fence regex is valid")
    });
    fence
        .captures(raw)
        .map(|caps| caps[1].to_string())
}

/// Content after a recognized label prefix such as `JSON:` or `Output:`.
///
/// Matched case-insensitively in `raw` itself; offsets from a lowercased
/// copy would not be valid byte indices into the original text.
fn label_prefix(raw: &str) -> Option<String> {
    static LABEL: OnceLock<Regex> = OnceLock::new();
    let label = LABEL.get_or_init(|| {
        Regex::new(r"(?i)(?:json|output|response|result):").expect("label regex is valid")
    });
    label.find(raw).map(|m| raw[m.end()..].to_string())
}

/// The raw text as-is, for responses that are already bare JSON.
fn verbatim(raw: &str) -> Option<String> {
    Some(raw.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_brace_span_ignores_surrounding_prose() {
        let raw = r#"Sure, here are your tasks: {"tasks": []} — let me know!"#;
        let value = extract_json(raw).unwrap();
        assert!(value["tasks"].is_array());
    }

    #[test]
    fn test_fenced_block_with_language_tag() {
        let raw = "Here you go:\n```json\n[1, 2, 3]\n```\nDone.";
        let value = extract_json(raw).unwrap();
        assert_eq!(value, serde_json::json!([1, 2, 3]));
    }

    #[test]
    fn test_fenced_block_without_language_tag() {
        let raw = "```\n[true]\n```";
        let value = extract_json(raw).unwrap();
        assert_eq!(value, serde_json::json!([true]));
    }

    #[test]
    fn test_label_prefix() {
        let raw = "Output: [\"a\", \"b\"]";
        let value = extract_json(raw).unwrap();
        assert_eq!(value, serde_json::json!(["a", "b"]));
    }

    #[test]
    fn test_verbatim_bare_json() {
        let value = extract_json("  [42]  ").unwrap();
        assert_eq!(value, serde_json::json!([42]));
    }

    #[test]
    fn test_brace_span_wins_over_fence_for_objects() {
        // Both strategies apply; the brace span is tried first.
        let raw = "```json\n{\"a\": 1}\n```";
        let value = extract_json(raw).unwrap();
        assert_eq!(value["a"], 1);
    }

    #[test]
    fn test_label_prefix_is_case_insensitive() {
        let raw = "RESULT: [9]";
        let value = extract_json(raw).unwrap();
        assert_eq!(value, serde_json::json!([9]));
    }

    #[test]
    fn test_label_prefix_survives_multibyte_text() {
        // Lowercasing can change byte lengths ('İ' becomes two chars), so
        // label offsets must come from the original text.
        let raw = "İoutput:☃[1]";
        let err = extract_json(raw).unwrap_err();
        assert!(matches!(err, TaskForgeError::ParseFailure { .. }));

        let raw = "Résumé - Output: [1]";
        let value = extract_json(raw).unwrap();
        assert_eq!(value, serde_json::json!([1]));
    }

    #[test]
    fn test_exhaustion_preserves_raw_text() {
        let raw = "I'm sorry, I cannot produce tasks for that request.";
        let err = extract_json(raw).unwrap_err();
        match err {
            TaskForgeError::ParseFailure { raw: preserved, .. } => {
                assert_eq!(preserved, raw);
            }
            other => panic!("expected ParseFailure, got {other:?}"),
        }
    }

    #[test]
    fn test_malformed_braces_fall_through_to_next_strategy() {
        // The brace span is unbalanced JSON, but a fenced block parses.
        let raw = "oops } stray brace\n```json\n[7]\n```";
        let value = extract_json(raw).unwrap();
        assert_eq!(value, serde_json::json!([7]));
    }
}
