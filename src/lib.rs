//! # edgequake-compress
//!
//! Shrink images, PDFs and text: delegate to a remote compression service
//! when one is configured, fall back to deterministic local processing when
//! it is not, and always report how much was saved.
//!
//! ## Pipeline Overview
//!
//! ```text
//! bytes + media type
//!  │
//!  ├─ image/*          remote binary ─▶ local JPEG re-encode ─▶ identity
//!  ├─ application/pdf  remote summary ─▶ section segmentation
//!  └─ anything else    first 1000 bytes as a text excerpt
//!  │
//!  └─▶ CompressionResult { payload, original_size, compressed_size, ratio, … }
//! ```
//!
//! Remote responses have no fixed schema; [`pipeline::extract`] probes a
//! fixed list of fields to find the payload. Nothing after input validation
//! returns an error: failures are recorded in
//! [`CompressionResult::fallbacks`] and the next path takes over.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_compress::{CompressionConfig, CompressionRequest, Compressor};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // API key from SCALEDOWN_API_KEY; runs offline when unset.
//!     let compressor = Compressor::connect(CompressionConfig::from_env()).await?;
//!     let bytes = std::fs::read("photo.png")?;
//!     let result = compressor
//!         .compress(&CompressionRequest::new(bytes, "image/png"))
//!         .await?;
//!     eprintln!("{}", result.describe());
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `edgecompress` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! edgequake-compress = { version = "0.1", default-features = false }
//! ```
//!
//! ## PDF text
//!
//! PDF text is extracted with pdfium when the library can be found
//! (`PDFIUM_LIB_PATH` or the system search path). Without it, PDFs are
//! segmented from their raw bytes, which still works for text-heavy files.

// ── Modules ──────────────────────────────────────────────────────────────

pub mod compress;
pub mod config;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod stream;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use compress::{
    compress, compress_file, compress_sync, compress_to_file, output_file_name, write_payload,
    Compressor,
};
pub use config::{CompressionConfig, CompressionConfigBuilder};
pub use error::{CompressError, StageError};
pub use output::{
    CompressedFile, CompressionRequest, CompressionResult, ContextCompression, MediaKind,
    Payload, Strategy, Summary, TokenUsage,
};
pub use pipeline::ratio::{format_bytes, reduction_ratio};
pub use pipeline::remote::{probe, ConnectionStatus};
pub use progress::{CompressionProgressCallback, NoopProgressCallback, ProgressCallback};
pub use stream::{
    batch_output_names, batch_with, compress_batch, compress_stream, stream_with, BatchItem,
    BatchStream,
};
