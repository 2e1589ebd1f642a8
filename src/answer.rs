//! Answer extraction from raw model replies.
//!
//! Models are asked to reply with `{"answer": ["a"]}`, and most do, but a
//! long-context benchmark cannot afford to discard a correct answer wrapped
//! in prose. Strategies are applied in order and the first that yields a
//! list wins:
//!
//! 1. direct JSON parse of the whole reply;
//! 2. JSON parse of the first balanced `{...}` substring;
//! 3. a single clearly-asserted choice letter ("The answer is (b).");
//! 4. give up with `parsing_error`.

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use crate::question::ParsingStatus;

/// `The answer is (b)` / `answer: c` style assertions.
static ASSERTED_LETTER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)\banswers?\s*(?:is|are|:)\s*\(?([a-z])\)?(?:[^a-z]|$)"#).unwrap());

/// Stand-alone quoted letters: `"a"`, `'b'`, `(c)`.
static QUOTED_LETTER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"["'(]([a-z])[")']"#).unwrap());

/// Parse a raw model reply into answer keys.
///
/// Returned keys are unnormalized; run them through [`normalize_answer`]
/// before scoring. The status distinguishes a clean JSON reply from one that
/// needed a fallback, which downstream reporting keeps visible.
#[must_use]
pub fn parse_answer(reply: &str) -> (Vec<String>, ParsingStatus) {
    let trimmed = reply.trim();
    if trimmed.is_empty() {
        return (Vec::new(), ParsingStatus::ParsingError);
    }

    // Strategy 1: the whole reply is JSON.
    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        if let Some(keys) = extract_answer(&value) {
            return (keys, ParsingStatus::Success);
        }
    }

    // Strategy 2: first balanced JSON object embedded in prose.
    if let Some(object) = first_balanced_object(trimmed) {
        if let Ok(value) = serde_json::from_str::<Value>(object) {
            if let Some(keys) = extract_answer(&value) {
                return (keys, ParsingStatus::RegexExtracted);
            }
        }
    }

    // Strategy 3: exactly one letter asserted in prose.
    if let Some(letter) = single_asserted_letter(trimmed) {
        return (vec![letter], ParsingStatus::RegexExtracted);
    }

    (Vec::new(), ParsingStatus::ParsingError)
}

/// Lowercase, trim, drop keys absent from `choices`, dedupe, and sort.
///
/// Unknown keys are dropped silently: a model inventing option "e" is wrong,
/// not malformed.
#[must_use]
pub fn normalize_answer(keys: &[String], choices: &BTreeMap<String, String>) -> Vec<String> {
    let mut normalized: Vec<String> = keys
        .iter()
        .map(|k| k.trim().to_lowercase())
        .filter(|k| choices.contains_key(k))
        .collect();
    normalized.sort();
    normalized.dedup();
    normalized
}

/// Pull the `answer` field out of a parsed JSON value.
///
/// A scalar answer (`"answer": "a"`) is accepted as a one-element list.
fn extract_answer(value: &Value) -> Option<Vec<String>> {
    let answer = value.get("answer")?;
    match answer {
        Value::Array(items) => Some(
            items
                .iter()
                .filter_map(|item| match item {
                    Value::String(s) => Some(s.clone()),
                    Value::Number(n) => Some(n.to_string()),
                    _ => None,
                })
                .collect(),
        ),
        Value::String(s) => Some(vec![s.clone()]),
        Value::Null => Some(Vec::new()),
        _ => None,
    }
}

/// Find the first balanced `{...}` substring, respecting JSON strings.
fn first_balanced_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let bytes = text.as_bytes();
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, &b) in bytes[start..].iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..=start + offset]);
                }
            }
            _ => {}
        }
    }
    None
}

/// The single choice letter asserted by the reply, if unambiguous.
fn single_asserted_letter(text: &str) -> Option<String> {
    let lowered = text.to_lowercase();
    let mut letters: Vec<String> = ASSERTED_LETTER
        .captures_iter(&lowered)
        .chain(QUOTED_LETTER.captures_iter(&lowered))
        .map(|c| c[1].to_string())
        .collect();
    letters.sort();
    letters.dedup();
    match letters.as_slice() {
        [only] => Some(only.clone()),
        _ => None,
    }
}
