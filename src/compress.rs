//! The dispatcher and the eager entry points.
//!
//! [`Compressor`] routes a [`CompressionRequest`] by media type:
//!
//! | Media type | First attempt | Fallbacks |
//! |------------|---------------|-----------|
//! | `application/pdf` | remote summary of the extracted text | section segmentation |
//! | `image/*` | remote binary | local JPEG re-encode, then identity |
//! | anything else | fixed-size text excerpt (never delegated) | none needed |
//!
//! Once a request is accepted nothing in here fails: every stage error is
//! recorded in [`CompressionResult::fallbacks`] and the next path runs. The
//! only `Err` a caller sees from [`Compressor::compress`] is empty content.
//!
//! Use [`crate::stream::compress_stream`] to process many inputs with
//! bounded concurrency.

use crate::config::CompressionConfig;
use crate::error::{CompressError, StageError};
use crate::output::{
    CompressedFile, CompressionRequest, CompressionResult, ContextCompression, MediaKind,
    Payload, Strategy, Summary,
};
use crate::pipeline::extract::{self, Candidate};
use crate::pipeline::remote::{self, ConnectionStatus, RemoteClient};
use crate::pipeline::{image, input, sections, text};
use crate::prompts::{document_prompt, image_prompt, truncate_bytes, truncate_chars};
use serde_json::{Map, Value};
use std::io::Write;
use std::path::Path;
use tracing::{debug, info, warn};

/// Summary key used when the remote service answers with plain text.
pub const REMOTE_SUMMARY_KEY: &str = "summary";

/// Summary key of the generic text excerpt.
pub const TEXT_EXCERPT_KEY: &str = "text";

/// Stem used when an input has no usable file name.
const DEFAULT_STEM: &str = "output";

/// Compresses requests according to a [`CompressionConfig`].
///
/// `Send + Sync`; share one behind an `Arc` to reuse the HTTP connection
/// pool across requests.
#[derive(Debug)]
pub struct Compressor {
    config: CompressionConfig,
    remote: Option<RemoteClient>,
    status: Option<ConnectionStatus>,
}

impl Compressor {
    /// Build a compressor without probing the remote endpoint.
    ///
    /// Delegation is attempted on every request when
    /// [`CompressionConfig::delegation_configured`] holds.
    pub fn new(config: CompressionConfig) -> Result<Self, CompressError> {
        let remote = if config.delegation_configured() {
            Some(RemoteClient::new(&config)?)
        } else {
            None
        };
        Ok(Self {
            config,
            remote,
            status: None,
        })
    }

    /// Build a compressor after probing the remote endpoint once.
    ///
    /// A rejected key or a missing endpoint switches delegation off for this
    /// compressor's lifetime; a transient failure leaves it on.
    pub async fn connect(config: CompressionConfig) -> Result<Self, CompressError> {
        let status = remote::probe(&config).await;
        let mut compressor = Self::new(config)?;
        if status.is_misconfigured() {
            warn!("Disabling remote delegation: {}", status);
            compressor.remote = None;
        }
        compressor.status = Some(status);
        Ok(compressor)
    }

    pub fn config(&self) -> &CompressionConfig {
        &self.config
    }

    /// Probe outcome, when built with [`Compressor::connect`].
    pub fn status(&self) -> Option<&ConnectionStatus> {
        self.status.as_ref()
    }

    /// `true` when requests will try the remote service first.
    pub fn delegation_enabled(&self) -> bool {
        self.remote.is_some()
    }

    /// Compress one request.
    ///
    /// # Errors
    /// [`CompressError::EmptyContent`] when the request has no bytes. Every
    /// other failure degrades to a fallback inside the result.
    pub async fn compress(
        &self,
        request: &CompressionRequest,
    ) -> Result<CompressionResult, CompressError> {
        if request.content.is_empty() {
            return Err(CompressError::EmptyContent);
        }

        let kind = request.kind();
        debug!("Dispatching {} bytes of {} as {:?}", request.content.len(), request.media_type, kind);

        let result = match kind {
            MediaKind::Pdf => self.compress_document(&request.content).await,
            MediaKind::Image => self.compress_image(&request.content).await,
            MediaKind::Text => self.compress_text(&request.content),
        };

        info!("Compressed {}: {}", request.media_type, result.describe());
        Ok(result)
    }

    /// Image path: remote binary, then local re-encode, then identity.
    pub async fn compress_image(&self, bytes: &[u8]) -> CompressionResult {
        let mut fallbacks = Vec::new();

        if let Some(remote) = &self.remote {
            match remote
                .delegate(&self.config.context, &image_prompt(bytes))
                .await
            {
                Ok(envelope) => match extract::extract_binary(&envelope.body) {
                    Ok(data) => {
                        let mut result = CompressionResult::binary(bytes.len(), data, Strategy::Remote);
                        result.remote_tokens = extract::token_usage(&envelope.body);
                        return result;
                    }
                    Err(e) => {
                        debug!("Remote image response unusable: {}", e);
                        fallbacks.push(e);
                    }
                },
                Err(e) => fallbacks.push(e),
            }
        }

        match image::compress_image(bytes, self.config.max_image_width, self.config.image_quality)
            .await
        {
            Ok(data) => CompressionResult::binary(bytes.len(), data, Strategy::Local)
                .with_fallbacks(fallbacks),
            Err(e) => {
                warn!("Local image re-encode failed, returning input unchanged: {}", e);
                fallbacks.push(e);
                CompressionResult::identity(bytes).with_fallbacks(fallbacks)
            }
        }
    }

    /// Document path: remote summary of the extracted text, then local
    /// section segmentation.
    pub async fn compress_document(&self, bytes: &[u8]) -> CompressionResult {
        let mut fallbacks = Vec::new();

        let extracted = text::extract_text(bytes, self.config.max_extracted_chars).await;
        if let Some(e) = extracted.fallback {
            fallbacks.push(e);
        }
        let full_text = extracted.text;
        let page_count = sections::page_count(&full_text, self.config.chars_per_page);
        let extracted_text = truncate_chars(&full_text, self.config.max_extracted_chars).to_string();

        let mut remote_outcome = None;
        if let Some(remote) = &self.remote {
            let prompt = document_prompt(&full_text, self.config.max_prompt_chars);
            match remote.delegate(&self.config.context, prompt).await {
                Ok(envelope) => match remote_summary(&envelope.body) {
                    Ok(summary) => {
                        remote_outcome = Some((summary, extract::token_usage(&envelope.body)))
                    }
                    Err(e) => {
                        debug!("Remote document response unusable: {}", e);
                        fallbacks.push(e);
                    }
                },
                Err(e) => fallbacks.push(e),
            }
        }

        let (summary, strategy, tokens) = match remote_outcome {
            Some((summary, tokens)) => (summary, Strategy::Remote, tokens),
            None => (
                sections::summarize_text(
                    &full_text,
                    self.config.max_section_name_chars,
                    self.config.max_section_lines,
                ),
                Strategy::Local,
                None,
            ),
        };

        let compressed_size = serialized_len(&summary);
        let mut result = CompressionResult::summary(bytes.len(), summary, compressed_size, strategy)
            .with_fallbacks(fallbacks);
        result.extracted_text = Some(extracted_text);
        result.page_count = Some(page_count);
        result.remote_tokens = tokens;
        result
    }

    /// Generic path: the first `text_excerpt_bytes` of the decoded text.
    pub fn compress_text(&self, bytes: &[u8]) -> CompressionResult {
        let decoded = String::from_utf8_lossy(bytes);
        let excerpt = truncate_bytes(&decoded, self.config.text_excerpt_bytes);
        let compressed_size = excerpt.len();
        CompressionResult::summary(
            bytes.len(),
            Summary::single(TEXT_EXCERPT_KEY, excerpt),
            compressed_size,
            Strategy::Excerpt,
        )
    }

    /// Compress a knowledge-base context and prompt before an LLM call.
    ///
    /// Without delegation, or when the remote answer is unusable, returns the
    /// two joined by a blank line with zero token counts.
    pub async fn compress_context(&self, context: &str, prompt: &str) -> ContextCompression {
        let mut fallbacks = Vec::new();

        if let Some(remote) = &self.remote {
            match remote.delegate(context, prompt).await {
                Ok(envelope) => match extract::extract_textual(&envelope.body) {
                    Ok(Candidate::Text(text)) => {
                        let usage = extract::token_usage(&envelope.body).unwrap_or_default();
                        info!(
                            original_tokens = usage.original_tokens,
                            compressed_tokens = usage.compressed_tokens,
                            "Context compressed remotely"
                        );
                        return ContextCompression {
                            text,
                            original_tokens: usage.original_tokens,
                            compressed_tokens: usage.compressed_tokens,
                            delegated: true,
                            fallbacks,
                        };
                    }
                    Ok(other) => fallbacks.push(StageError::NoUsableCandidate {
                        detail: format!("expected text, found {other:?}"),
                    }),
                    Err(e) => fallbacks.push(e),
                },
                Err(e) => fallbacks.push(e),
            }
        }

        ContextCompression {
            text: format!("{context}\n\n{prompt}"),
            original_tokens: 0,
            compressed_tokens: 0,
            delegated: false,
            fallbacks,
        }
    }

    /// Load a path or URL and compress it.
    ///
    /// `media_type` overrides detection when given.
    pub async fn compress_file(
        &self,
        input: &str,
        media_type: Option<&str>,
    ) -> Result<CompressedFile, CompressError> {
        let loaded =
            input::resolve_input(input, media_type, self.config.download_timeout_secs).await?;
        let request = CompressionRequest::new(loaded.bytes, loaded.media_type);
        let result = self.compress(&request).await?;
        Ok(CompressedFile {
            name: loaded.name,
            media_type: request.media_type,
            result,
        })
    }
}

/// Turn a remote document answer into a summary.
///
/// Text becomes `{"summary": text}`; an object becomes the summary itself,
/// with non-string values rendered as JSON.
fn remote_summary(body: &Value) -> Result<Summary, StageError> {
    match extract::extract_textual(body)? {
        Candidate::Text(text) => Ok(Summary::single(REMOTE_SUMMARY_KEY, text)),
        Candidate::Structured(map) => Ok(summary_from_object(map)),
        Candidate::Binary(_) => Err(StageError::NoUsableCandidate {
            detail: "expected a textual summary, found binary".into(),
        }),
    }
}

fn summary_from_object(map: Map<String, Value>) -> Summary {
    map.into_iter()
        .map(|(k, v)| {
            let text = match v {
                Value::String(s) => s,
                other => other.to_string(),
            };
            (k, text)
        })
        .collect()
}

fn serialized_len(summary: &Summary) -> usize {
    summary.to_json().map(|json| json.len()).unwrap_or_default()
}

// ── Free-function entry points ───────────────────────────────────────────

/// Compress one in-memory request with a throwaway [`Compressor`].
pub async fn compress(
    request: &CompressionRequest,
    config: &CompressionConfig,
) -> Result<CompressionResult, CompressError> {
    Compressor::new(config.clone())?.compress(request).await
}

/// Synchronous wrapper around [`compress`].
///
/// Creates a temporary tokio runtime internally; do not call from inside an
/// async context.
pub fn compress_sync(
    request: &CompressionRequest,
    config: &CompressionConfig,
) -> Result<CompressionResult, CompressError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| CompressError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(compress(request, config))
}

/// Load a path or URL and compress it.
pub async fn compress_file(
    input: impl AsRef<str>,
    media_type: Option<&str>,
    config: &CompressionConfig,
) -> Result<CompressedFile, CompressError> {
    Compressor::new(config.clone())?
        .compress_file(input.as_ref(), media_type)
        .await
}

/// Compress a path or URL and write the payload to `output_path`.
///
/// Binary payloads are written as-is, summaries as pretty JSON. The write is
/// atomic: a temp file in the destination directory is renamed into place.
pub async fn compress_to_file(
    input: impl AsRef<str>,
    output_path: impl AsRef<Path>,
    media_type: Option<&str>,
    config: &CompressionConfig,
) -> Result<CompressedFile, CompressError> {
    let compressed = compress_file(input, media_type, config).await?;
    write_payload(output_path.as_ref(), &compressed.result.payload).await?;
    Ok(compressed)
}

/// Atomically write a payload to `path`, creating parent directories.
pub async fn write_payload(path: &Path, payload: &Payload) -> Result<(), CompressError> {
    let write_err = |source: std::io::Error| CompressError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };

    let bytes = payload
        .to_file_bytes()
        .map_err(|e| CompressError::Internal(format!("serialising summary: {e}")))?;

    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => std::path::PathBuf::from("."),
    };
    tokio::fs::create_dir_all(&parent).await.map_err(write_err)?;

    let target = path.to_path_buf();
    tokio::task::spawn_blocking(move || -> std::io::Result<()> {
        let mut tmp = tempfile::NamedTempFile::new_in(&parent)?;
        tmp.write_all(&bytes)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&target).map_err(|e| e.error)?;
        Ok(())
    })
    .await
    .map_err(|e| CompressError::Internal(format!("Write task panicked: {}", e)))?
    .map_err(write_err)?;

    debug!("Wrote {}", path.display());
    Ok(())
}

/// File name for a compressed input.
///
/// `<stem>.summary.json` for summaries; `<stem>.min.<ext>` for binary
/// payloads, where `<ext>` is `jpg` for local re-encodes, the sniffed image
/// format otherwise, or `bin` when the format is unknown.
pub fn output_file_name(input_name: &str, result: &CompressionResult) -> String {
    file_name_for(&output_stem(input_name), result)
}

pub(crate) fn output_stem(input_name: &str) -> String {
    Path::new(input_name)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| DEFAULT_STEM.to_string())
}

pub(crate) fn file_name_for(stem: &str, result: &CompressionResult) -> String {
    match &result.payload {
        Payload::Summary { .. } => format!("{stem}.summary.json"),
        Payload::Binary { data } => {
            let ext = match result.strategy {
                Strategy::Local => image::REENCODED_EXTENSION,
                _ => image::sniff_extension(data).unwrap_or("bin"),
            };
            format!("{stem}.min.{ext}")
        }
    }
}
