//! Request and result types.
//!
//! [`CompressionResult`] is the single contract every pipeline path returns:
//! remote delegation, local image re-encoding, document segmentation, the
//! generic text excerpt and the identity fallback all produce one fully
//! populated value. Nothing is partial.

use crate::error::StageError;
use crate::pipeline::ratio::{format_bytes, reduction_ratio};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

// ── Request ──────────────────────────────────────────────────────────────

/// Raw bytes plus the media type the caller declared for them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompressionRequest {
    pub content: Vec<u8>,
    pub media_type: String,
}

impl CompressionRequest {
    pub fn new(content: impl Into<Vec<u8>>, media_type: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            media_type: media_type.into(),
        }
    }

    /// Which pipeline this request is routed to.
    pub fn kind(&self) -> MediaKind {
        MediaKind::from_media_type(&self.media_type)
    }
}

/// Pipeline selected by the declared media type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    /// `application/pdf`, `application/x-pdf`.
    Pdf,
    /// Any `image/*`.
    Image,
    /// Everything else.
    Text,
}

impl MediaKind {
    /// Classify a media type, ignoring case and parameters (`; charset=…`).
    pub fn from_media_type(media_type: &str) -> Self {
        let essence = media_type
            .split(';')
            .next()
            .unwrap_or("")
            .trim()
            .to_ascii_lowercase();
        match essence.as_str() {
            "application/pdf" | "application/x-pdf" => MediaKind::Pdf,
            m if m.starts_with("image/") => MediaKind::Image,
            _ => MediaKind::Text,
        }
    }
}

// ── Summary ──────────────────────────────────────────────────────────────

/// Ordered mapping of section name → excerpt text.
///
/// Inserting a name that already exists replaces its excerpt but keeps the
/// position where the name first appeared. Serialises as a JSON object in
/// insertion order.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct Summary {
    entries: IndexMap<String, String>,
}

impl Summary {
    pub fn new() -> Self {
        Self::default()
    }

    /// A single-entry summary.
    pub fn single(name: impl Into<String>, excerpt: impl Into<String>) -> Self {
        let mut s = Self::new();
        s.insert(name, excerpt);
        s
    }

    pub fn insert(&mut self, name: impl Into<String>, excerpt: impl Into<String>) {
        self.entries.insert(name.into(), excerpt.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries.get(name).map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(n, e)| (n.as_str(), e.as_str()))
    }

    /// Compact JSON encoding; its byte length is the summary's compressed size.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

// Order is part of the value: two summaries with the same entries in a
// different order serialise differently.
impl PartialEq for Summary {
    fn eq(&self, other: &Self) -> bool {
        self.entries.iter().eq(other.entries.iter())
    }
}

impl Eq for Summary {}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Summary {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut s = Summary::new();
        for (k, v) in iter {
            s.insert(k, v);
        }
        s
    }
}

// ── Result ───────────────────────────────────────────────────────────────

/// The reduced representation: either bytes or a section summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "payload_kind", rename_all = "snake_case")]
pub enum Payload {
    /// Compressed (or, for the identity fallback, original) bytes.
    Binary {
        #[serde(serialize_with = "serialize_base64")]
        data: Vec<u8>,
    },
    /// Section name → excerpt mapping.
    Summary { summary: Summary },
}

fn serialize_base64<S: Serializer>(data: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&STANDARD.encode(data))
}

impl Payload {
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Payload::Binary { data } => Some(data),
            Payload::Summary { .. } => None,
        }
    }

    pub fn as_summary(&self) -> Option<&Summary> {
        match self {
            Payload::Summary { summary } => Some(summary),
            Payload::Binary { .. } => None,
        }
    }

    /// Bytes to write when persisting the payload: the binary data itself, or
    /// the summary as pretty-printed JSON.
    pub fn to_file_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        match self {
            Payload::Binary { data } => Ok(data.clone()),
            Payload::Summary { summary } => serde_json::to_vec_pretty(summary),
        }
    }
}

/// Which path produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// The remote service returned a usable candidate.
    Remote,
    /// Local image re-encoding or document segmentation.
    Local,
    /// Generic text truncated to a fixed excerpt.
    Excerpt,
    /// Every attempt failed; the input is returned unchanged.
    Identity,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Strategy::Remote => "remote",
            Strategy::Local => "local",
            Strategy::Excerpt => "excerpt",
            Strategy::Identity => "identity",
        };
        f.write_str(s)
    }
}

/// Token counts reported by the remote service, when present.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub original_tokens: u64,
    pub compressed_tokens: u64,
}

/// Outcome of compressing one request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompressionResult {
    #[serde(flatten)]
    pub payload: Payload,
    /// Size of the request content in bytes.
    pub original_size: usize,
    /// Size of the payload in bytes (serialized JSON length for summaries).
    pub compressed_size: usize,
    /// Percentage reduction; negative when the payload is larger.
    pub ratio: i64,
    /// Text extracted from a document, capped.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extracted_text: Option<String>,
    /// Estimated page count for documents.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_count: Option<usize>,
    pub strategy: Strategy,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_tokens: Option<TokenUsage>,
    /// Non-fatal reasons earlier paths were abandoned, in order.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fallbacks: Vec<StageError>,
}

impl CompressionResult {
    /// A binary result with sizes and ratio filled in.
    pub fn binary(original_size: usize, data: Vec<u8>, strategy: Strategy) -> Self {
        let compressed_size = data.len();
        Self {
            payload: Payload::Binary { data },
            original_size,
            compressed_size,
            ratio: reduction_ratio(original_size, compressed_size),
            extracted_text: None,
            page_count: None,
            strategy,
            remote_tokens: None,
            fallbacks: Vec::new(),
        }
    }

    /// A summary result whose compressed size is supplied by the caller.
    pub fn summary(
        original_size: usize,
        summary: Summary,
        compressed_size: usize,
        strategy: Strategy,
    ) -> Self {
        Self {
            payload: Payload::Summary { summary },
            original_size,
            compressed_size,
            ratio: reduction_ratio(original_size, compressed_size),
            extracted_text: None,
            page_count: None,
            strategy,
            remote_tokens: None,
            fallbacks: Vec::new(),
        }
    }

    /// The original bytes unchanged, zero reduction.
    pub fn identity(content: &[u8]) -> Self {
        Self::binary(content.len(), content.to_vec(), Strategy::Identity)
    }

    pub fn with_fallbacks(mut self, fallbacks: Vec<StageError>) -> Self {
        self.fallbacks = fallbacks;
        self
    }

    /// One-line description used in logs and CLI output.
    pub fn describe(&self) -> String {
        format!(
            "{} → {} ({}% reduction, {})",
            format_bytes(self.original_size),
            format_bytes(self.compressed_size),
            self.ratio,
            self.strategy
        )
    }
}

/// A compressed input loaded from a path or URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompressedFile {
    /// File name of the input.
    pub name: String,
    /// Media type the request was dispatched with.
    pub media_type: String,
    #[serde(flatten)]
    pub result: CompressionResult,
}

/// Outcome of compressing a context/prompt pair before an LLM call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContextCompression {
    /// Compressed text, or `context + "\n\n" + prompt` when not delegated.
    pub text: String,
    pub original_tokens: u64,
    pub compressed_tokens: u64,
    /// `true` when the text came from the remote service.
    pub delegated: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fallbacks: Vec<StageError>,
}
