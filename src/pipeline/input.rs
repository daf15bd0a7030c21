//! Input resolution: load a user-supplied path or URL into memory and work
//! out what kind of content it is.
//!
//! Everything downstream operates on bytes plus a media type, so there is no
//! temp file here: URL bodies are read straight into memory.
//!
//! ## Media-type precedence
//!
//! 1. the type the caller declared,
//! 2. magic bytes (`%PDF`, image signatures),
//! 3. the file extension,
//! 4. the `Content-Type` the server sent (URLs only),
//! 5. `application/octet-stream`.
//!
//! Sniffing outranks the extension because uploads are routinely misnamed;
//! the server header comes last because many hosts send a generic type.

use crate::error::CompressError;
use crate::pipeline::image::sniff_media_type;
use crate::pipeline::text::is_pdf;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Media type used when nothing else is known.
pub const FALLBACK_MEDIA_TYPE: &str = "application/octet-stream";

/// Media type assigned to `%PDF` payloads.
pub const PDF_MEDIA_TYPE: &str = "application/pdf";

/// Input loaded into memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedInput {
    /// File name (local basename or last URL path segment).
    pub name: String,
    pub bytes: Vec<u8>,
    pub media_type: String,
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Load `input` (path or URL) and determine its media type.
///
/// `declared` wins over every detection rule when given.
pub async fn resolve_input(
    input: &str,
    declared: Option<&str>,
    timeout_secs: u64,
) -> Result<LoadedInput, CompressError> {
    let (name, bytes, header_type) = if is_url(input) {
        download_url(input, timeout_secs).await?
    } else {
        let path = PathBuf::from(input);
        let bytes = read_local(&path).await?;
        (file_name(&path), bytes, None)
    };

    let media_type = detect_media_type(&bytes, &name, declared, header_type.as_deref());
    debug!("Resolved '{}' as {} ({} bytes)", name, media_type, bytes.len());
    Ok(LoadedInput {
        name,
        bytes,
        media_type,
    })
}

/// Pick a media type following the precedence in the module docs.
pub fn detect_media_type(
    bytes: &[u8],
    name: &str,
    declared: Option<&str>,
    header: Option<&str>,
) -> String {
    if let Some(declared) = declared.map(str::trim).filter(|d| !d.is_empty()) {
        return declared.to_string();
    }
    if is_pdf(bytes) {
        return PDF_MEDIA_TYPE.to_string();
    }
    if let Some(mime) = sniff_media_type(bytes) {
        return mime.to_string();
    }
    if let Some(mime) = mime_guess::from_path(name).first() {
        return mime.essence_str().to_string();
    }
    header
        .map(str::trim)
        .filter(|h| !h.is_empty())
        .unwrap_or(FALLBACK_MEDIA_TYPE)
        .to_string()
}

async fn read_local(path: &Path) -> Result<Vec<u8>, CompressError> {
    match tokio::fs::read(path).await {
        Ok(bytes) => {
            debug!("Read local input: {}", path.display());
            Ok(bytes)
        }
        Err(e) => Err(match e.kind() {
            std::io::ErrorKind::NotFound => CompressError::FileNotFound {
                path: path.to_path_buf(),
            },
            std::io::ErrorKind::PermissionDenied => CompressError::PermissionDenied {
                path: path.to_path_buf(),
            },
            _ => CompressError::ReadFailed {
                path: path.to_path_buf(),
                source: e,
            },
        }),
    }
}

/// Download a URL into memory, returning its name, body and `Content-Type`.
async fn download_url(
    url: &str,
    timeout_secs: u64,
) -> Result<(String, Vec<u8>, Option<String>), CompressError> {
    info!("Downloading input from: {}", url);

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| CompressError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let map_send_err = |e: reqwest::Error| {
        if e.is_timeout() {
            CompressError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            CompressError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    };

    let response = client.get(url).send().await.map_err(map_send_err)?;

    if !response.status().is_success() {
        return Err(CompressError::DownloadFailed {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    let header_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let bytes = response.bytes().await.map_err(map_send_err)?;
    info!("Downloaded {} bytes from {}", bytes.len(), url);

    Ok((url_file_name(url), bytes.to_vec(), header_type))
}

/// Last path segment of a URL, or `download` when there is none.
fn url_file_name(url: &str) -> String {
    reqwest::Url::parse(url)
        .ok()
        .and_then(|parsed| {
            parsed
                .path_segments()
                .and_then(|mut segments| segments.next_back().map(str::to_string))
        })
        .filter(|last| !last.is_empty())
        .unwrap_or_else(|| "download".to_string())
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_url() {
        assert!(is_url("https://example.com/doc.pdf"));
        assert!(is_url("http://example.com/doc.pdf"));
        assert!(!is_url("/tmp/doc.pdf"));
        assert!(!is_url("doc.pdf"));
        assert!(!is_url(""));
    }

    #[test]
    fn declared_type_wins() {
        assert_eq!(
            detect_media_type(b"%PDF-1.7", "a.png", Some("text/plain"), None),
            "text/plain"
        );
    }

    #[test]
    fn magic_bytes_beat_extension() {
        assert_eq!(detect_media_type(b"%PDF-1.7", "scan.txt", None, None), PDF_MEDIA_TYPE);
        let png_sig = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR";
        assert_eq!(detect_media_type(png_sig, "photo.jpg", None, None), "image/png");
    }

    #[test]
    fn extension_then_header_then_fallback() {
        assert_eq!(detect_media_type(b"hello", "notes.txt", None, None), "text/plain");
        assert_eq!(
            detect_media_type(b"hello", "download", None, Some("text/markdown")),
            "text/markdown"
        );
        assert_eq!(detect_media_type(b"hello", "download", None, None), FALLBACK_MEDIA_TYPE);
    }

    #[test]
    fn url_names() {
        assert_eq!(url_file_name("https://example.com/files/lease.pdf"), "lease.pdf");
        assert_eq!(url_file_name("https://example.com/"), "download");
    }

    #[tokio::test]
    async fn missing_file_is_reported() {
        let err = resolve_input("/definitely/not/here.pdf", None, 5)
            .await
            .unwrap_err();
        assert!(matches!(err, CompressError::FileNotFound { .. }));
    }

    #[tokio::test]
    async fn local_file_is_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, "INTRODUCTION\nhello").unwrap();
        let input = resolve_input(path.to_str().unwrap(), None, 5).await.unwrap();
        assert_eq!(input.name, "notes.txt");
        assert_eq!(input.media_type, "text/plain");
        assert_eq!(input.bytes, b"INTRODUCTION\nhello");
    }
}
