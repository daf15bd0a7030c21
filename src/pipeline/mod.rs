//! Pipeline stages for content compression.
//!
//! Each submodule implements exactly one step. The dispatcher in
//! [`crate::compress`] wires them together per media type.
//!
//! ## Data Flow
//!
//! ```text
//!                    ┌─▶ remote ──▶ extract ──┐
//! input ──▶ dispatch ┤                        ├──▶ ratio ──▶ CompressionResult
//!  (path/URL)        └─▶ image │ text+sections┘
//!                        (local fallbacks)
//! ```
//!
//! 1. [`input`]: load a path or URL and detect its media type
//! 2. [`remote`]: POST to the compression service; the only stage with
//!    network I/O, never fatal
//! 3. [`extract`]: find a usable candidate in a response of unknown shape
//! 4. [`image`]: downscale and re-encode images locally in `spawn_blocking`
//! 5. [`text`]: pull text out of PDFs via pdfium, or decode raw bytes
//! 6. [`sections`]: split text into headed sections and excerpt them
//! 7. [`ratio`]: size and reduction-ratio accounting

pub mod extract;
pub mod image;
pub mod input;
pub mod ratio;
pub mod remote;
pub mod sections;
pub mod text;
