//! Local image fallback: decode, downscale, re-encode as lossy JPEG.
//!
//! Used when remote delegation is unavailable or returns nothing binary.
//! Images wider than `max_width` are scaled down with their aspect ratio
//! kept; narrower images are never enlarged. Alpha is flattened and EXIF
//! metadata (including orientation) is not carried over.
//!
//! Decoding and encoding are CPU-bound, so [`compress_image`] moves the work
//! onto the blocking pool the same way page extraction does.

use crate::error::StageError;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::DynamicImage;
use tracing::debug;

/// Codec name reported in [`StageError::CodecUnavailable`].
pub const IMAGE_CODEC: &str = "image";

/// File extension of locally re-encoded images.
pub const REENCODED_EXTENSION: &str = "jpg";

/// Re-encode `bytes` off the async runtime.
pub async fn compress_image(
    bytes: &[u8],
    max_width: u32,
    quality: u8,
) -> Result<Vec<u8>, StageError> {
    let owned = bytes.to_vec();
    tokio::task::spawn_blocking(move || compress_image_blocking(&owned, max_width, quality))
        .await
        .map_err(|e| codec_error(format!("image task panicked: {e}")))?
}

/// Blocking implementation of [`compress_image`].
pub fn compress_image_blocking(
    bytes: &[u8],
    max_width: u32,
    quality: u8,
) -> Result<Vec<u8>, StageError> {
    let img = image::load_from_memory(bytes).map_err(|e| codec_error(e.to_string()))?;
    let (width, height) = (img.width(), img.height());

    let img = fit_width(img, max_width);
    let rgb = DynamicImage::ImageRgb8(img.to_rgb8());

    let mut out = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut out, quality.clamp(1, 100));
    rgb.write_with_encoder(encoder)
        .map_err(|e| codec_error(e.to_string()))?;

    debug!(
        "Re-encoded {}x{} image → {}x{} JPEG q{}: {} → {} bytes",
        width,
        height,
        rgb.width(),
        rgb.height(),
        quality,
        bytes.len(),
        out.len()
    );
    Ok(out)
}

/// Scale `img` down to `max_width`, preserving aspect. Never upscales.
fn fit_width(img: DynamicImage, max_width: u32) -> DynamicImage {
    let max_width = max_width.max(1);
    if img.width() <= max_width {
        return img;
    }
    let height = (u64::from(img.height()) * u64::from(max_width) / u64::from(img.width())).max(1);
    img.resize_exact(max_width, height as u32, FilterType::Lanczos3)
}

/// Extension of the image format `bytes` is encoded in, from magic bytes.
pub fn sniff_extension(bytes: &[u8]) -> Option<&'static str> {
    image::guess_format(bytes)
        .ok()
        .and_then(|f| f.extensions_str().first().copied())
}

/// Media type of the image format `bytes` is encoded in, from magic bytes.
pub fn sniff_media_type(bytes: &[u8]) -> Option<&'static str> {
    image::guess_format(bytes).ok().map(|f| f.to_mime_type())
}

fn codec_error(detail: String) -> StageError {
    StageError::CodecUnavailable {
        codec: IMAGE_CODEC.into(),
        detail,
    }
}
