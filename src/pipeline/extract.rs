//! Candidate extraction from remote responses of unknown shape.
//!
//! The remote service has no fixed response schema: depending on deployment
//! it answers with a bare string, `{"output": …}`, `{"compressedFile": …}`,
//! `{"results": {"compressed_prompt": …}}` or a chat-completion envelope.
//! This module is the only place that knows about those shapes. It works in
//! two steps, each driven by an ordered table rather than nested branches:
//!
//! 1. [`locate`] walks [`CANDIDATE_FIELDS`] then [`NESTED_CANDIDATE_PATHS`]
//!    and returns the first non-empty value.
//! 2. [`interpret`] tries each [`DecodeStrategy`] in [`DECODE_ORDER`]:
//!    binary-looking before generic text, so a base64 payload is never
//!    mistaken for a textual summary.
//!
//! Extraction only reads the response body.

use crate::error::StageError;
use crate::output::TokenUsage;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};

/// Top-level fields probed, highest priority first.
pub const CANDIDATE_FIELDS: &[&str] = &[
    "output",
    "result",
    "response",
    "compressed",
    "file",
    "compressedFile",
    "reply",
    "summary",
];

/// Nested shapes probed (JSON pointers) when no top-level field matches.
pub const NESTED_CANDIDATE_PATHS: &[&str] = &[
    "/results/compressed_prompt",
    "/message/content",
    "/choices/0/message/content",
    "/choices/0/text",
];

/// Fields of an object candidate that carry base64 binary, in priority order.
pub const NESTED_BINARY_FIELDS: &[&str] = &["compressedFile", "file"];

/// Label used for the candidate when the whole body is a string.
pub const BODY_FIELD: &str = "<body>";

/// Shortest string treated as base64.
const MIN_BASE64_LEN: usize = 4;

/// An interpreted candidate.
#[derive(Debug, Clone, PartialEq)]
pub enum Candidate {
    /// Decoded base64 bytes.
    Binary(Vec<u8>),
    /// Literal text.
    Text(String),
    /// An object without a binary field.
    Structured(Map<String, Value>),
}

impl Candidate {
    fn kind(&self) -> &'static str {
        match self {
            Candidate::Binary(_) => "binary",
            Candidate::Text(_) => "text",
            Candidate::Structured(_) => "object",
        }
    }
}

/// How a located value may be turned into a [`Candidate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeStrategy {
    /// A string in the base64 alphabet with valid padding.
    Base64String,
    /// An object exposing one of [`NESTED_BINARY_FIELDS`].
    NestedBinary,
    /// Any other string, or an array of strings joined by newlines.
    LiteralText,
    /// Any other object.
    Structured,
}

/// Strategies in the order they are tried.
pub const DECODE_ORDER: [DecodeStrategy; 4] = [
    DecodeStrategy::Base64String,
    DecodeStrategy::NestedBinary,
    DecodeStrategy::LiteralText,
    DecodeStrategy::Structured,
];

/// Find the first non-empty candidate value and the field it came from.
pub fn locate(body: &Value) -> Option<(&str, &Value)> {
    if body.is_string() {
        return is_non_empty(body).then_some((BODY_FIELD, body));
    }
    let obj = body.as_object()?;

    CANDIDATE_FIELDS
        .iter()
        .find_map(|&field| obj.get(field).filter(|v| is_non_empty(v)).map(|v| (field, v)))
        .or_else(|| {
            NESTED_CANDIDATE_PATHS.iter().find_map(|&path| {
                body.pointer(path)
                    .filter(|v| is_non_empty(v))
                    .map(|v| (path, v))
            })
        })
}

/// Interpret a located value. `Ok(None)` when no strategy applies.
pub fn interpret(field: &str, value: &Value) -> Result<Option<Candidate>, StageError> {
    for strategy in DECODE_ORDER {
        if let Some(candidate) = apply(strategy, field, value)? {
            return Ok(Some(candidate));
        }
    }
    Ok(None)
}

/// [`locate`] then [`interpret`].
pub fn extract(body: &Value) -> Result<Option<Candidate>, StageError> {
    match locate(body) {
        Some((field, value)) => interpret(field, value),
        None => Ok(None),
    }
}

/// Extract a binary payload, for the image path.
///
/// A text or object candidate is reported as [`StageError::NoUsableCandidate`].
pub fn extract_binary(body: &Value) -> Result<Vec<u8>, StageError> {
    match extract(body)? {
        Some(Candidate::Binary(bytes)) => Ok(bytes),
        Some(other) => Err(StageError::NoUsableCandidate {
            detail: format!("expected binary payload, found {}", other.kind()),
        }),
        None => Err(no_candidate()),
    }
}

/// Extract a textual payload, for the document and context paths.
///
/// Strings are returned verbatim, without base64 decoding: a summary that
/// happens to look like base64 is still a summary. Objects are returned as
/// [`Candidate::Structured`].
pub fn extract_textual(body: &Value) -> Result<Candidate, StageError> {
    let (_, value) = locate(body).ok_or_else(no_candidate)?;
    match value {
        Value::String(s) => Ok(Candidate::Text(s.clone())),
        Value::Array(items) => join_strings(items)
            .map(Candidate::Text)
            .ok_or_else(|| StageError::NoUsableCandidate {
                detail: "array candidate is not all strings".into(),
            }),
        Value::Object(map) => Ok(Candidate::Structured(map.clone())),
        other => Ok(Candidate::Text(other.to_string())),
    }
}

/// Token counts under `results.{original,compressed}_prompt_tokens`.
pub fn token_usage(body: &Value) -> Option<TokenUsage> {
    let results = body.get("results")?;
    let original = results.get("original_prompt_tokens")?.as_u64()?;
    let compressed = results.get("compressed_prompt_tokens")?.as_u64()?;
    Some(TokenUsage {
        original_tokens: original,
        compressed_tokens: compressed,
    })
}

// ── Strategies ───────────────────────────────────────────────────────────

fn apply(
    strategy: DecodeStrategy,
    field: &str,
    value: &Value,
) -> Result<Option<Candidate>, StageError> {
    match strategy {
        DecodeStrategy::Base64String => Ok(value
            .as_str()
            .filter(|s| looks_like_base64(s))
            .and_then(|s| decode_base64(s).ok())
            .map(Candidate::Binary)),

        DecodeStrategy::NestedBinary => {
            let Some(obj) = value.as_object() else {
                return Ok(None);
            };
            let Some((inner, encoded)) = NESTED_BINARY_FIELDS
                .iter()
                .find_map(|&f| obj.get(f).filter(|v| is_non_empty(v)).map(|v| (f, v)))
            else {
                return Ok(None);
            };
            let nested = format!("{field}.{inner}");
            let text = encoded.as_str().ok_or_else(|| StageError::MalformedCandidate {
                field: nested.clone(),
                detail: format!("expected base64 string, found {}", json_type(encoded)),
            })?;
            decode_base64(text)
                .map(|bytes| Some(Candidate::Binary(bytes)))
                .map_err(|e| StageError::MalformedCandidate {
                    field: nested,
                    detail: e.to_string(),
                })
        }

        DecodeStrategy::LiteralText => Ok(match value {
            Value::String(s) => Some(Candidate::Text(s.clone())),
            Value::Array(items) => join_strings(items).map(Candidate::Text),
            _ => None,
        }),

        DecodeStrategy::Structured => Ok(value.as_object().cloned().map(Candidate::Structured)),
    }
}

static RE_BASE64_ALPHABET: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9+/=\s]+$").unwrap());

/// `true` when `s` is plausibly base64 rather than prose.
///
/// Beyond the alphabet check the compacted string must be at least
/// [`MIN_BASE64_LEN`] long, a multiple of four, and carry `=` only as up to
/// two trailing padding characters. Plain words like `"Done"` still pass the
/// shape test; [`DecodeStrategy::LiteralText`] catches whatever fails it.
pub fn looks_like_base64(s: &str) -> bool {
    let trimmed = s.trim();
    if !RE_BASE64_ALPHABET.is_match(trimmed) {
        return false;
    }
    let compact: String = trimmed.chars().filter(|c| !c.is_whitespace()).collect();
    if compact.len() < MIN_BASE64_LEN || compact.len() % 4 != 0 {
        return false;
    }
    let body = compact.trim_end_matches('=');
    compact.len() - body.len() <= 2 && !body.contains('=')
}

fn decode_base64(s: &str) -> Result<Vec<u8>, base64::DecodeError> {
    let compact: String = s.chars().filter(|c| !c.is_whitespace()).collect();
    STANDARD.decode(compact)
}

// ── Helpers ──────────────────────────────────────────────────────────────

fn is_non_empty(v: &Value) -> bool {
    match v {
        Value::Null | Value::Bool(false) => false,
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
        Value::Number(n) => n.as_f64() != Some(0.0),
        Value::Bool(true) => true,
    }
}

fn join_strings(items: &[Value]) -> Option<String> {
    items
        .iter()
        .map(|v| v.as_str())
        .collect::<Option<Vec<_>>>()
        .map(|parts| parts.join("\n"))
}

fn json_type(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn no_candidate() -> StageError {
    StageError::NoUsableCandidate {
        detail: "no known candidate field in response".into(),
    }
}
