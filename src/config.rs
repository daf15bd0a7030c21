//! Configuration types for content compression.
//!
//! All compression behaviour is controlled through [`CompressionConfig`],
//! built via its [`CompressionConfigBuilder`]. Keeping every knob in one
//! struct makes it trivial to share a config across concurrent requests and
//! to log it (the API key is redacted by the `Debug` impl).
//!
//! The defaults reproduce the reference behaviour of the remote compression
//! service integration: 20 s request timeout, 20 000-character prompt cap,
//! 1200 px / quality-60 image fallback, 200-line section excerpts.

use crate::error::CompressError;
use crate::progress::ProgressCallback;
use crate::prompts::DEFAULT_CONTEXT;
use std::fmt;

/// Default remote compression endpoint.
pub const DEFAULT_ENDPOINT: &str = "https://api.scaledown.xyz/compress/raw/";

/// Environment variable holding the remote API key.
pub const API_KEY_ENV: &str = "SCALEDOWN_API_KEY";

/// Environment variable overriding [`DEFAULT_ENDPOINT`].
pub const ENDPOINT_ENV: &str = "SCALEDOWN_API_URL";

/// Configuration for a compression run.
///
/// Built via [`CompressionConfig::builder()`], [`CompressionConfig::from_env()`]
/// or [`CompressionConfig::default()`] (offline: no API key).
///
/// # Example
/// ```rust
/// use edgequake_compress::CompressionConfig;
///
/// let config = CompressionConfig::builder()
///     .api_key("sd-test")
///     .request_timeout_secs(10)
///     .image_quality(70)
///     .build()
///     .unwrap();
/// assert!(config.delegation_configured());
/// ```
#[derive(Clone)]
pub struct CompressionConfig {
    /// API key sent in the `x-api-key` header. `None` disables delegation.
    pub api_key: Option<String>,

    /// Remote compression endpoint. Default: [`DEFAULT_ENDPOINT`].
    pub endpoint: String,

    /// Context string sent alongside every document/image prompt.
    pub context: String,

    /// Master switch for remote delegation. Default: true.
    ///
    /// Even when `true`, delegation only happens if an API key and endpoint
    /// are configured.
    pub delegation: bool,

    /// Timeout for compression calls in seconds. Default: 20.
    pub request_timeout_secs: u64,

    /// Timeout for the start-up health probe in seconds. Default: 8.
    pub probe_timeout_secs: u64,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Maximum characters of document text sent upstream. Default: 20 000.
    pub max_prompt_chars: usize,

    /// Maximum characters kept in `extracted_text` and in the raw-byte
    /// decoding fallback. Default: 20 000.
    pub max_extracted_chars: usize,

    /// Maximum width of locally re-encoded images in pixels. Default: 1200.
    pub max_image_width: u32,

    /// JPEG quality of locally re-encoded images (1–100). Default: 60.
    pub image_quality: u8,

    /// Lines kept per section excerpt. Default: 200.
    pub max_section_lines: usize,

    /// Maximum characters in a section name. Default: 50.
    pub max_section_name_chars: usize,

    /// Characters per page for the page-count estimate. Default: 3000.
    pub chars_per_page: usize,

    /// Bytes kept by the generic text path. Default: 1000.
    pub text_excerpt_bytes: usize,

    /// Number of inputs compressed concurrently in batch mode. Default: 4.
    pub concurrency: usize,

    /// Optional progress callback for batch events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            endpoint: DEFAULT_ENDPOINT.to_string(),
            context: DEFAULT_CONTEXT.to_string(),
            delegation: true,
            request_timeout_secs: 20,
            probe_timeout_secs: 8,
            download_timeout_secs: 120,
            max_prompt_chars: 20_000,
            max_extracted_chars: 20_000,
            max_image_width: 1200,
            image_quality: 60,
            max_section_lines: 200,
            max_section_name_chars: 50,
            chars_per_page: 3000,
            text_excerpt_bytes: 1000,
            concurrency: 4,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for CompressionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompressionConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("endpoint", &self.endpoint)
            .field("delegation", &self.delegation)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("probe_timeout_secs", &self.probe_timeout_secs)
            .field("max_prompt_chars", &self.max_prompt_chars)
            .field("max_image_width", &self.max_image_width)
            .field("image_quality", &self.image_quality)
            .field("max_section_lines", &self.max_section_lines)
            .field("concurrency", &self.concurrency)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn CompressionProgressCallback>"),
            )
            .finish()
    }
}

impl CompressionConfig {
    /// Create a new builder for `CompressionConfig`.
    pub fn builder() -> CompressionConfigBuilder {
        CompressionConfigBuilder {
            config: Self::default(),
        }
    }

    /// Defaults plus API key and endpoint read from the environment.
    ///
    /// Empty variables are treated as unset.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.api_key = env_non_empty(API_KEY_ENV);
        if let Some(url) = env_non_empty(ENDPOINT_ENV) {
            config.endpoint = url;
        }
        config
    }

    /// `true` when delegation is switched on and both key and endpoint are set.
    pub fn delegation_configured(&self) -> bool {
        self.delegation
            && self.api_key.as_deref().is_some_and(|k| !k.trim().is_empty())
            && !self.endpoint.trim().is_empty()
    }
}

fn env_non_empty(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Builder for [`CompressionConfig`].
#[derive(Debug)]
pub struct CompressionConfigBuilder {
    config: CompressionConfig,
}

impl CompressionConfigBuilder {
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config.api_key = Some(key.into());
        self
    }

    pub fn endpoint(mut self, url: impl Into<String>) -> Self {
        self.config.endpoint = url.into();
        self
    }

    pub fn context(mut self, context: impl Into<String>) -> Self {
        self.config.context = context.into();
        self
    }

    pub fn delegation(mut self, enabled: bool) -> Self {
        self.config.delegation = enabled;
        self
    }

    pub fn request_timeout_secs(mut self, secs: u64) -> Self {
        self.config.request_timeout_secs = secs.max(1);
        self
    }

    pub fn probe_timeout_secs(mut self, secs: u64) -> Self {
        self.config.probe_timeout_secs = secs.max(1);
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs.max(1);
        self
    }

    pub fn max_prompt_chars(mut self, n: usize) -> Self {
        self.config.max_prompt_chars = n;
        self
    }

    pub fn max_extracted_chars(mut self, n: usize) -> Self {
        self.config.max_extracted_chars = n;
        self
    }

    pub fn max_image_width(mut self, px: u32) -> Self {
        self.config.max_image_width = px.max(1);
        self
    }

    pub fn image_quality(mut self, q: u8) -> Self {
        self.config.image_quality = q.clamp(1, 100);
        self
    }

    pub fn max_section_lines(mut self, n: usize) -> Self {
        self.config.max_section_lines = n;
        self
    }

    pub fn text_excerpt_bytes(mut self, n: usize) -> Self {
        self.config.text_excerpt_bytes = n;
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<CompressionConfig, CompressError> {
        let c = &self.config;
        if !c.endpoint.trim().is_empty() && reqwest::Url::parse(&c.endpoint).is_err() {
            return Err(CompressError::InvalidConfig(format!(
                "endpoint is not a valid URL: '{}'",
                c.endpoint
            )));
        }
        if c.chars_per_page == 0 {
            return Err(CompressError::InvalidConfig(
                "chars_per_page must be ≥ 1".into(),
            ));
        }
        if c.max_section_name_chars == 0 {
            return Err(CompressError::InvalidConfig(
                "max_section_name_chars must be ≥ 1".into(),
            ));
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_limits() {
        let c = CompressionConfig::default();
        assert_eq!(c.request_timeout_secs, 20);
        assert_eq!(c.probe_timeout_secs, 8);
        assert_eq!(c.max_prompt_chars, 20_000);
        assert_eq!(c.max_image_width, 1200);
        assert_eq!(c.image_quality, 60);
        assert_eq!(c.max_section_lines, 200);
        assert_eq!(c.max_section_name_chars, 50);
        assert_eq!(c.text_excerpt_bytes, 1000);
        assert!(!c.delegation_configured());
    }

    #[test]
    fn builder_clamps_values() {
        let c = CompressionConfig::builder()
            .image_quality(0)
            .concurrency(0)
            .request_timeout_secs(0)
            .build()
            .unwrap();
        assert_eq!(c.image_quality, 1);
        assert_eq!(c.concurrency, 1);
        assert_eq!(c.request_timeout_secs, 1);
    }

    #[test]
    fn invalid_endpoint_rejected() {
        let err = CompressionConfig::builder()
            .endpoint("not a url")
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("endpoint"));
    }

    #[test]
    fn delegation_requires_key_endpoint_and_switch() {
        let c = CompressionConfig::builder().api_key("k").build().unwrap();
        assert!(c.delegation_configured());

        let c = CompressionConfig::builder()
            .api_key("k")
            .delegation(false)
            .build()
            .unwrap();
        assert!(!c.delegation_configured());

        let c = CompressionConfig::builder()
            .api_key("k")
            .endpoint("")
            .build()
            .unwrap();
        assert!(!c.delegation_configured());

        let c = CompressionConfig::builder().api_key("   ").build().unwrap();
        assert!(!c.delegation_configured());
    }

    #[test]
    fn debug_redacts_api_key() {
        let c = CompressionConfig::builder()
            .api_key("super-secret")
            .build()
            .unwrap();
        let dbg = format!("{c:?}");
        assert!(!dbg.contains("super-secret"));
        assert!(dbg.contains("<redacted>"));
    }
}
