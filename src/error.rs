//! Error types for the edgequake-compress library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`CompressError`] - **Fatal**: the request cannot enter the pipeline at
//!   all (empty content, unreadable file, invalid configuration). Returned as
//!   `Err(CompressError)` from the top-level `compress*` functions.
//!
//! * [`StageError`] - **Non-fatal**: one stage of the pipeline gave up
//!   (remote call failed, codec missing, response unusable) and the next
//!   fallback took over. Recorded in
//!   [`crate::output::CompressionResult::fallbacks`] so callers can see why
//!   a result came from a local path instead of the remote service.
//!
//! Once a request is accepted the pipeline is total: every stage failure
//! degrades to the next fallback and ultimately to the identity result.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the edgequake-compress library.
#[derive(Debug, Error)]
pub enum CompressError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// The request carried zero bytes of content.
    #[error("Nothing to compress: content is empty")]
    EmptyContent,

    /// Input file was not found at the given path.
    #[error("Input file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The file exists but reading it failed.
    #[error("Failed to read '{path}': {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'\nIncrease --download-timeout.")]
    DownloadTimeout { url: String, secs: u64 },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The HTTP client could not be constructed (TLS backend, proxy config).
    #[error("Failed to initialise HTTP client: {0}")]
    HttpClient(String),

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write the output file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal error from one pipeline stage.
///
/// Stored in [`crate::output::CompressionResult::fallbacks`] in the order the
/// stages were abandoned.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StageError {
    /// The remote call failed: transport error, non-2xx status, or timeout.
    #[error("Remote delegation failed{}: {detail}", status_suffix(.status, .timed_out))]
    Delegation {
        status: Option<u16>,
        timed_out: bool,
        detail: String,
    },

    /// The remote response had no candidate of the kind this path needs.
    #[error("Remote response had no usable candidate: {detail}")]
    NoUsableCandidate { detail: String },

    /// A candidate field was found but could not be decoded.
    #[error("Malformed candidate in field '{field}': {detail}")]
    MalformedCandidate { field: String, detail: String },

    /// A local codec (image decoder/encoder, pdfium) is missing or failed.
    #[error("Local {codec} codec unavailable: {detail}")]
    CodecUnavailable { codec: String, detail: String },
}

fn status_suffix(status: &Option<u16>, timed_out: &bool) -> String {
    match (*status, *timed_out) {
        (_, true) => " (timeout)".to_string(),
        (Some(code), false) => format!(" (HTTP {code})"),
        (None, false) => String::new(),
    }
}

impl StageError {
    /// Build a [`StageError::Delegation`] from a `reqwest` transport error.
    pub fn from_transport(err: &reqwest::Error) -> Self {
        StageError::Delegation {
            status: err.status().map(|s| s.as_u16()),
            timed_out: err.is_timeout(),
            detail: err.to_string(),
        }
    }

    /// `true` for failures that happened before or during the remote call.
    pub fn is_delegation(&self) -> bool {
        matches!(self, StageError::Delegation { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_content_display() {
        assert!(CompressError::EmptyContent.to_string().contains("empty"));
    }

    #[test]
    fn delegation_display_with_status() {
        let e = StageError::Delegation {
            status: Some(503),
            timed_out: false,
            detail: "service unavailable".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("HTTP 503"), "got: {msg}");
        assert!(msg.contains("service unavailable"));
    }

    #[test]
    fn delegation_display_timeout() {
        let e = StageError::Delegation {
            status: None,
            timed_out: true,
            detail: "operation timed out".into(),
        };
        assert!(e.to_string().contains("(timeout)"));
        assert!(e.is_delegation());
    }

    #[test]
    fn codec_display() {
        let e = StageError::CodecUnavailable {
            codec: "pdfium".into(),
            detail: "library not found".into(),
        };
        assert!(e.to_string().contains("pdfium"));
        assert!(!e.is_delegation());
    }

    #[test]
    fn stage_error_serialises_with_kind_tag() {
        let e = StageError::MalformedCandidate {
            field: "compressedFile".into(),
            detail: "not base64".into(),
        };
        let json = serde_json::to_value(&e).unwrap();
        assert_eq!(json["kind"], "malformed_candidate");
        assert_eq!(json["field"], "compressedFile");
    }
}
