//! Context strings and prompt builders for the remote compression endpoint.
//!
//! Centralising every string sent upstream keeps the wire contract in one
//! place: the dispatcher decides *what* to send, this module decides *how it
//! is shaped* (truncation, base64 wrapping, probe body).

use base64::{engine::general_purpose::STANDARD, Engine as _};

/// Default context sent with document and image prompts.
///
/// Overridable via [`crate::config::CompressionConfig::context`].
pub const DEFAULT_CONTEXT: &str = "Compress and summarize this document";

/// Context of the start-up health probe.
pub const PROBE_CONTEXT: &str = "test";

/// Prompt of the start-up health probe.
pub const PROBE_PROMPT: &str = "ping";

/// Compression rate requested from the remote service.
pub const RATE_AUTO: &str = "auto";

/// Truncate `text` to at most `max_chars` characters, on a char boundary.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Truncate `text` to at most `max_bytes` bytes without splitting a char.
pub fn truncate_bytes(text: &str, max_bytes: usize) -> &str {
    if text.len() <= max_bytes {
        return text;
    }
    let mut end = max_bytes;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

/// Prompt for a document: its extracted text, capped for upstream limits.
pub fn document_prompt(text: &str, max_chars: usize) -> &str {
    truncate_chars(text, max_chars)
}

/// Prompt for an image: the raw bytes as standard base64.
pub fn image_prompt(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}
