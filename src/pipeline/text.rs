//! Text extraction for document-like payloads.
//!
//! PDF bytes go through pdfium when a library can be bound; anything else,
//! or any pdfium failure, falls back to decoding the raw bytes as lossy
//! UTF-8. Extraction therefore always produces *some* text, possibly empty.
//!
//! ## Why spawn_blocking?
//!
//! pdfium is a C++ library with thread-local state and CPU-heavy parsing.
//! [`extract_text`] runs it on the blocking pool so Tokio workers never stall.
//!
//! ## Locating pdfium
//!
//! `PDFIUM_LIB_PATH` (a file or a directory containing the platform library)
//! is tried first, then the system library search path. No download is
//! attempted here.

use crate::error::StageError;
use crate::prompts::truncate_chars;
use pdfium_render::prelude::*;
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// Environment variable pointing at a pdfium shared library.
pub const PDFIUM_LIB_PATH_ENV: &str = "PDFIUM_LIB_PATH";

/// Codec name reported in [`StageError::CodecUnavailable`].
pub const PDFIUM_CODEC: &str = "pdfium";

/// Which engine produced the text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextEngine {
    Pdfium,
    RawBytes,
}

/// Text pulled out of a document payload.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedText {
    pub text: String,
    pub engine: TextEngine,
    /// Why pdfium was skipped or failed on a `%PDF` payload.
    pub fallback: Option<StageError>,
}

/// `true` when `bytes` start with the PDF magic number.
pub fn is_pdf(bytes: &[u8]) -> bool {
    bytes.starts_with(b"%PDF")
}

/// Extract text off the async runtime.
///
/// `max_raw_chars` caps the raw-byte fallback only; pdfium text is returned
/// whole.
pub async fn extract_text(bytes: &[u8], max_raw_chars: usize) -> ExtractedText {
    let owned = bytes.to_vec();
    match tokio::task::spawn_blocking(move || extract_text_blocking(&owned, max_raw_chars)).await
    {
        Ok(extracted) => extracted,
        Err(e) => {
            warn!("Text extraction task panicked: {}", e);
            ExtractedText {
                text: decode_raw(bytes, max_raw_chars),
                engine: TextEngine::RawBytes,
                fallback: Some(pdfium_error(format!("extraction task panicked: {e}"))),
            }
        }
    }
}

/// Blocking implementation of [`extract_text`].
pub fn extract_text_blocking(bytes: &[u8], max_raw_chars: usize) -> ExtractedText {
    if !is_pdf(bytes) {
        return ExtractedText {
            text: decode_raw(bytes, max_raw_chars),
            engine: TextEngine::RawBytes,
            fallback: None,
        };
    }

    match extract_with_pdfium(bytes) {
        Ok(text) => {
            info!("Extracted {} chars of text with pdfium", text.chars().count());
            ExtractedText {
                text,
                engine: TextEngine::Pdfium,
                fallback: None,
            }
        }
        Err(e) => {
            warn!("pdfium extraction unavailable, decoding raw bytes: {}", e);
            ExtractedText {
                text: decode_raw(bytes, max_raw_chars),
                engine: TextEngine::RawBytes,
                fallback: Some(e),
            }
        }
    }
}

/// Lossy UTF-8 decoding capped at `max_chars` characters.
pub fn decode_raw(bytes: &[u8], max_chars: usize) -> String {
    let text = String::from_utf8_lossy(bytes);
    truncate_chars(&text, max_chars).to_string()
}

fn extract_with_pdfium(bytes: &[u8]) -> Result<String, StageError> {
    let pdfium = bind_pdfium()?;
    let document = pdfium
        .load_pdf_from_byte_slice(bytes, None)
        .map_err(|e| pdfium_error(format!("{e:?}")))?;

    let pages = document.pages();
    debug!("PDF loaded: {} pages", pages.len());

    let mut text = String::new();
    for (idx, page) in pages.iter().enumerate() {
        let page_text = page
            .text()
            .map_err(|e| pdfium_error(format!("page {}: {e:?}", idx + 1)))?;
        if !text.is_empty() {
            text.push('\n');
        }
        text.push_str(&page_text.all());
    }
    Ok(text)
}

fn bind_pdfium() -> Result<Pdfium, StageError> {
    let bindings = match std::env::var_os(PDFIUM_LIB_PATH_ENV) {
        Some(raw) => {
            let mut path = PathBuf::from(raw);
            if path.is_dir() {
                path = Pdfium::pdfium_platform_library_name_at_path(&path);
            }
            Pdfium::bind_to_library(&path)
                .map_err(|e| pdfium_error(format!("{}: {e}", path.display())))?
        }
        None => Pdfium::bind_to_system_library().map_err(|e| pdfium_error(e.to_string()))?,
    };
    Ok(Pdfium::new(bindings))
}

fn pdfium_error(detail: String) -> StageError {
    StageError::CodecUnavailable {
        codec: PDFIUM_CODEC.into(),
        detail,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_bytes_are_decoded_directly() {
        let out = extract_text_blocking(b"HEADING\nbody text", 20_000);
        assert_eq!(out.text, "HEADING\nbody text");
        assert_eq!(out.engine, TextEngine::RawBytes);
        assert!(out.fallback.is_none());
    }

    #[test]
    fn raw_decoding_is_lossy_and_capped() {
        let out = decode_raw(&[b'a', 0xff, b'b', b'c'], 3);
        assert_eq!(out, "a\u{fffd}b");
    }

    #[test]
    fn pdf_magic_detection() {
        assert!(is_pdf(b"%PDF-1.7\n..."));
        assert!(!is_pdf(b"%PD"));
        assert!(!is_pdf(b"hello"));
    }

    #[test]
    fn broken_pdf_always_yields_text() {
        // Either pdfium is missing or it rejects the document; both end in
        // raw decoding with the reason recorded.
        let out = extract_text_blocking(b"%PDF-1.4\nINTRODUCTION\nnot really a pdf", 20_000);
        assert_eq!(out.engine, TextEngine::RawBytes);
        assert!(out.text.contains("INTRODUCTION"));
        assert!(matches!(
            out.fallback,
            Some(StageError::CodecUnavailable { .. })
        ));
    }

    #[tokio::test]
    async fn async_extraction_matches_blocking() {
        let out = extract_text(b"DETAILS:\nMore text", 100).await;
        assert_eq!(out.text, "DETAILS:\nMore text");
    }
}
