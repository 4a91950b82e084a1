//! Recover a JSON object from model output.
//!
//! Models are asked for a bare JSON object and mostly comply, but the
//! failures are predictable: code fences, a sentence of preamble, `//`
//! comments, trailing commas. Each recovery step is tried in order and the
//! first that parses to an object wins.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};

static RE_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```(?:json|JSON)?\s*\n?(.*?)\n?\s*```").unwrap());
static RE_LINE_COMMENT: Lazy<Regex> = Lazy::new(|| Regex::new(r#"(?m)^((?:[^"\n]|"(?:[^"\\\n]|\\.)*")*?)\s*//.*$"#).unwrap());
static RE_TRAILING_COMMA: Lazy<Regex> = Lazy::new(|| Regex::new(r",(\s*[}\]])").unwrap());

/// Parse `raw` into a JSON object, or `None` if nothing usable is found.
pub fn parse_json_object(raw: &str) -> Option<Map<String, Value>> {
    let body = strip_fences(raw);

    if let Some(obj) = as_object(&body) {
        return Some(obj);
    }
    let span = outer_braces(&body)?;
    if let Some(obj) = as_object(span) {
        return Some(obj);
    }
    let repaired = drop_trailing_commas(&strip_line_comments(span));
    as_object(&repaired)
}

// ── Step 1: code fences ──────────────────────────────────────────────────────

fn strip_fences(raw: &str) -> String {
    match RE_FENCE.captures(raw) {
        Some(caps) => caps[1].trim().to_string(),
        None => raw.trim().to_string(),
    }
}

// ── Step 2: direct parse ─────────────────────────────────────────────────────

fn as_object(text: &str) -> Option<Map<String, Value>> {
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

// ── Step 3: first `{` to last `}` ────────────────────────────────────────────

fn outer_braces(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

// ── Step 4: comments and trailing commas ─────────────────────────────────────

fn strip_line_comments(text: &str) -> String {
    RE_LINE_COMMENT.replace_all(text, "$1").into_owned()
}

fn drop_trailing_commas(text: &str) -> String {
    RE_TRAILING_COMMA.replace_all(text, "$1").into_owned()
}
