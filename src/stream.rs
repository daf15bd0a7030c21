//! Batch API: compress many inputs, yielding each as it finishes.
//!
//! Inputs are independent, so up to `config.concurrency` of them run at once
//! via `buffer_unordered`. Items arrive in completion order; every
//! [`BatchItem`] carries its `index` in the input list, and
//! [`compress_batch`] sorts by it before returning.
//!
//! A failed input (missing file, empty content, download error) is reported
//! in its own item and never stops the rest of the batch.

use crate::compress::{file_name_for, output_stem, Compressor};
use crate::config::CompressionConfig;
use crate::error::CompressError;
use crate::output::CompressedFile;
use futures::stream::{self, StreamExt};
use std::collections::HashSet;
use std::pin::Pin;
use std::sync::Arc;
use tokio_stream::Stream;
use tracing::{debug, info, warn};

/// Outcome of one input in a batch.
#[derive(Debug)]
pub struct BatchItem {
    /// 0-based position in the input list.
    pub index: usize,
    /// The path or URL as given.
    pub input: String,
    pub outcome: Result<CompressedFile, CompressError>,
}

/// A boxed stream of batch items.
pub type BatchStream = Pin<Box<dyn Stream<Item = BatchItem> + Send>>;

/// Compress `inputs` with a fresh [`Compressor`], streaming items as they
/// complete.
///
/// `media_type` overrides detection for every input when given.
///
/// # Errors
/// Only when the compressor cannot be built (HTTP client construction).
pub fn compress_stream(
    inputs: Vec<String>,
    media_type: Option<String>,
    config: &CompressionConfig,
) -> Result<BatchStream, CompressError> {
    let compressor = Arc::new(Compressor::new(config.clone())?);
    Ok(stream_with(compressor, inputs, media_type))
}

/// Stream `inputs` through an existing, shared [`Compressor`].
pub fn stream_with(
    compressor: Arc<Compressor>,
    inputs: Vec<String>,
    media_type: Option<String>,
) -> BatchStream {
    let total = inputs.len();
    let concurrency = compressor.config().concurrency.max(1);
    info!("Compressing {} inputs, {} at a time", total, concurrency);

    let s = stream::iter(inputs.into_iter().enumerate().map(move |(index, input)| {
        let compressor = Arc::clone(&compressor);
        let media_type = media_type.clone();
        async move {
            let callback = compressor.config().progress_callback.clone();
            if let Some(ref cb) = callback {
                cb.on_item_start(index, total, &input);
            }

            let outcome = compressor.compress_file(&input, media_type.as_deref()).await;

            match &outcome {
                Ok(file) => {
                    if let Some(ref cb) = callback {
                        cb.on_item_complete(
                            index,
                            total,
                            file.result.original_size,
                            file.result.compressed_size,
                        );
                    }
                }
                Err(e) => {
                    warn!("Input {} ('{}') failed: {}", index + 1, input, e);
                    if let Some(ref cb) = callback {
                        cb.on_item_error(index, total, &e.to_string());
                    }
                }
            }

            BatchItem {
                index,
                input,
                outcome,
            }
        }
    }))
    .buffer_unordered(concurrency);

    Box::pin(s)
}

/// Compress `inputs` through a shared [`Compressor`] and return every item
/// in input order.
///
/// Fires `on_batch_start` / `on_batch_complete` around the stream.
pub async fn batch_with(
    compressor: Arc<Compressor>,
    inputs: Vec<String>,
    media_type: Option<String>,
) -> Vec<BatchItem> {
    let total = inputs.len();
    let callback = compressor.config().progress_callback.clone();
    if let Some(ref cb) = callback {
        cb.on_batch_start(total);
    }

    let mut items: Vec<BatchItem> = stream_with(compressor, inputs, media_type)
        .collect()
        .await;
    items.sort_by_key(|item| item.index);

    let success = items.iter().filter(|i| i.outcome.is_ok()).count();
    info!("Batch complete: {}/{} inputs compressed", success, total);
    if let Some(ref cb) = callback {
        cb.on_batch_complete(total, success);
    }
    items
}

/// [`batch_with`] on a fresh [`Compressor`].
pub async fn compress_batch(
    inputs: Vec<String>,
    media_type: Option<String>,
    config: &CompressionConfig,
) -> Result<Vec<BatchItem>, CompressError> {
    let compressor = Arc::new(Compressor::new(config.clone())?);
    Ok(batch_with(compressor, inputs, media_type).await)
}

/// Output file names for a finished batch, one slot per item.
///
/// Failed items get `None`. Names follow [`crate::output_file_name`], except
/// that an item whose name is already taken by an earlier item (compared
/// case-insensitively) gets `-<n>` appended to its stem, where `n` starts at
/// its 1-based position in the batch. No two slots share a name.
pub fn batch_output_names(items: &[BatchItem]) -> Vec<Option<String>> {
    let mut taken = HashSet::new();
    items
        .iter()
        .map(|item| {
            let file = item.outcome.as_ref().ok()?;
            let stem = output_stem(&file.name);
            let mut name = file_name_for(&stem, &file.result);
            let mut n = item.index + 1;
            while !taken.insert(name.to_lowercase()) {
                debug!("Output name '{}' already used, adding suffix", name);
                name = file_name_for(&format!("{stem}-{n}"), &file.result);
                n += 1;
            }
            Some(name)
        })
        .collect()
}
