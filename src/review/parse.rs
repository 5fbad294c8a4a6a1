//! Turns free-form model text into a [`ModerationVerdict`].
//!
//! Models wrap their JSON in prose or markdown fences often enough that a
//! plain `serde_json::from_str` is not sufficient. Extraction tries the whole
//! text, then every `{` in order (fenced blocks included), and keeps the
//! first candidate that is a well-formed JSON object.

use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;

use super::verdict::{ModerationVerdict, ReviewOutcome};

const DESCRIPTION_KEYS: &[&str] = &["description", "mediaDescription", "media_description"];
const FAILURE_REASON_KEYS: &[&str] = &["failure_reason", "failureReason"];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("no JSON object found in model output: {0}")]
    Malformed(String),
    #[error("model output does not match the verdict schema: {0}")]
    Schema(String),
}

pub fn parse_verdict(text: &str) -> Result<ModerationVerdict, ParseError> {
    let payload = extract_json_payload(text)?;
    let Value::Object(fields) = payload else {
        return Err(ParseError::Schema("payload is not an object".to_string()));
    };
    verdict_from_fields(&fields)
}

/// `outcome` is required; the other fields are read by name, first present
/// spelling wins, and anything else in the object is ignored.
fn verdict_from_fields(fields: &Map<String, Value>) -> Result<ModerationVerdict, ParseError> {
    let outcome = fields
        .get("outcome")
        .filter(|value| !value.is_null())
        .ok_or_else(|| ParseError::Schema("missing field `outcome`".to_string()))?;
    let outcome = ReviewOutcome::deserialize(outcome)
        .map_err(|err| ParseError::Schema(format!("outcome: {err}")))?;

    Ok(ModerationVerdict {
        outcome,
        description: first_string(fields, DESCRIPTION_KEYS),
        failure_reason: first_string(fields, FAILURE_REASON_KEYS),
    })
}

fn first_string(fields: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|key| fields.get(*key).and_then(Value::as_str))
        .map(str::to_string)
}

pub fn extract_json_payload(text: &str) -> Result<Value, ParseError> {
    let raw = text.trim();
    if raw.is_empty() {
        return Err(ParseError::Malformed("model output is empty".to_string()));
    }

    if let Some(value) = parse_object(raw) {
        return Ok(value);
    }

    for (start, _) in raw.match_indices('{') {
        let Some(candidate) = balanced_object_at(raw, start) else {
            continue;
        };
        if let Some(value) = parse_object(candidate) {
            return Ok(value);
        }
    }

    Err(ParseError::Malformed(format!(
        "output starts with {:?}",
        raw.chars().take(120).collect::<String>()
    )))
}

fn parse_object(text: &str) -> Option<Value> {
    match serde_json::from_str::<Value>(text.trim()) {
        Ok(value @ Value::Object(_)) => Some(value),
        _ => None,
    }
}

/// Returns the `{...}` span starting at `start` whose braces balance, skipping
/// brackets inside string literals.
fn balanced_object_at(text: &str, start: usize) -> Option<&str> {
    let bytes = text.as_bytes();
    let mut in_string = false;
    let mut escape = false;
    let mut stack: Vec<u8> = Vec::new();

    for (offset, &b) in bytes[start..].iter().enumerate() {
        if in_string {
            if escape {
                escape = false;
                continue;
            }
            match b {
                b'\\' => escape = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match b {
            b'"' => in_string = true,
            b'{' => stack.push(b'}'),
            b'[' => stack.push(b']'),
            b'}' | b']' => {
                if stack.last() != Some(&b) {
                    return None;
                }
                stack.pop();
                if stack.is_empty() {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::review::ReviewOutcome;

    #[test]
    fn parses_bare_object() -> Result<(), ParseError> {
        let verdict =
            parse_verdict(r#"{"outcome":"APPROVED","mediaDescription":"a cat photo"}"#)?;
        assert_eq!(verdict.outcome, ReviewOutcome::Approved);
        assert_eq!(verdict.description(), Some("a cat photo"));
        assert_eq!(verdict.failure_reason, None);
        Ok(())
    }

    #[test]
    fn strips_surrounding_prose() -> Result<(), ParseError> {
        let text = "Sure! Here is my review:\n{\"outcome\": \"REJECTED\", \"failure_reason\": \"gore {graphic}\"}\nLet me know if you need more.";
        let verdict = parse_verdict(text)?;
        assert_eq!(verdict.outcome, ReviewOutcome::Rejected);
        assert_eq!(verdict.failure_reason.as_deref(), Some("gore {graphic}"));
        Ok(())
    }

    #[test]
    fn reads_fenced_block() -> Result<(), ParseError> {
        let text = "```json\n{\"outcome\": \"flagged\", \"failureReason\": \"borderline\"}\n```";
        let verdict = parse_verdict(text)?;
        assert_eq!(verdict.outcome, ReviewOutcome::Flagged);
        assert_eq!(verdict.failure_reason.as_deref(), Some("borderline"));
        Ok(())
    }

    #[test]
    fn earlier_bare_object_beats_later_fence() -> Result<(), ParseError> {
        let text = "{\"outcome\":\"APPROVED\",\"mediaDescription\":\"a cat photo\"}\nalternatively:\n```json\n{\"outcome\":\"FLAGGED\"}\n```";
        let verdict = parse_verdict(text)?;
        assert_eq!(verdict.outcome, ReviewOutcome::Approved);
        assert_eq!(verdict.description(), Some("a cat photo"));
        Ok(())
    }

    #[test]
    fn first_valid_fragment_wins() -> Result<(), ParseError> {
        let text = "draft {outcome: APPROVED} then {\"outcome\":\"FLAGGED\"} and {\"outcome\":\"APPROVED\"}";
        let payload = extract_json_payload(text)?;
        assert_eq!(payload, serde_json::json!({ "outcome": "FLAGGED" }));
        Ok(())
    }

    #[test]
    fn unknown_fields_are_ignored() -> Result<(), ParseError> {
        let verdict = parse_verdict(r#"{"outcome":"APPROVED","confidence":0.93,"tags":["cat"]}"#)?;
        assert_eq!(verdict.outcome, ReviewOutcome::Approved);
        Ok(())
    }

    #[test]
    fn both_description_spellings_are_tolerated() -> Result<(), ParseError> {
        let verdict = parse_verdict(
            r#"{"outcome":"APPROVED","description":"a cat","mediaDescription":"a cat photo","failureReason":"none","failure_reason":null}"#,
        )?;
        assert_eq!(verdict.outcome, ReviewOutcome::Approved);
        assert_eq!(verdict.description(), Some("a cat"));
        assert_eq!(verdict.failure_reason.as_deref(), Some("none"));
        Ok(())
    }

    #[test]
    fn non_string_outcome_is_schema_error() {
        for text in [r#"{"outcome": 3}"#, r#"{"outcome": null}"#] {
            assert!(
                matches!(parse_verdict(text), Err(ParseError::Schema(_))),
                "{text:?}"
            );
        }
    }

    #[test]
    fn text_without_object_is_malformed() {
        for text in ["", "   ", "I cannot review this image.", "[1, 2, 3]", "{\"outcome\": "] {
            assert!(
                matches!(parse_verdict(text), Err(ParseError::Malformed(_))),
                "{text:?}"
            );
        }
    }

    #[test]
    fn missing_outcome_is_schema_error() {
        let err = parse_verdict("result: {\"mediaDescription\": \"a dog\"}").expect_err("schema");
        assert!(matches!(err, ParseError::Schema(_)));
    }

    #[test]
    fn parsing_is_repeatable() {
        let text = "ok {\"outcome\":\"UNKNOWN\",\"failure_reason\":\"blurry\"} done";
        assert_eq!(parse_verdict(text), parse_verdict(text));
    }
}
