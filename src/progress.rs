//! Progress-callback trait for batch compression events.
//!
//! Inject an [`Arc<dyn CompressionProgressCallback>`] via
//! [`crate::config::CompressionConfigBuilder::progress_callback`] to receive
//! events as [`crate::stream`] works through a list of inputs.
//!
//! # Example
//!
//! ```rust
//! use edgequake_compress::{CompressionProgressCallback, CompressionConfig};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct SavedBytes {
//!     saved: AtomicUsize,
//! }
//!
//! impl CompressionProgressCallback for SavedBytes {
//!     fn on_item_complete(&self, _index: usize, _total: usize, original: usize, compressed: usize) {
//!         self.saved.fetch_add(original.saturating_sub(compressed), Ordering::SeqCst);
//!     }
//! }
//!
//! let cb = Arc::new(SavedBytes { saved: AtomicUsize::new(0) });
//!
//! let config = CompressionConfig::builder()
//!     .progress_callback(cb as Arc<dyn CompressionProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called as a batch of inputs is compressed.
///
/// Items run concurrently, so `on_item_*` may be called from several tasks
/// at once and in any order. All methods default to no-ops.
pub trait CompressionProgressCallback: Send + Sync {
    /// Called once before any input is loaded.
    fn on_batch_start(&self, total: usize) {
        let _ = total;
    }

    /// Called when an input starts loading.
    ///
    /// * `index` - 0-based position in the input list
    fn on_item_start(&self, index: usize, total: usize, input: &str) {
        let _ = (index, total, input);
    }

    /// Called when an input has been compressed.
    ///
    /// * `original`   - input size in bytes
    /// * `compressed` - payload size in bytes
    fn on_item_complete(&self, index: usize, total: usize, original: usize, compressed: usize) {
        let _ = (index, total, original, compressed);
    }

    /// Called when an input could not be loaded or was empty.
    fn on_item_error(&self, index: usize, total: usize, error: &str) {
        let _ = (index, total, error);
    }

    /// Called once after every input has been attempted.
    fn on_batch_complete(&self, total: usize, success_count: usize) {
        let _ = (total, success_count);
    }
}

/// A no-op implementation, used when no callback is configured.
pub struct NoopProgressCallback;

impl CompressionProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::CompressionConfig`].
pub type ProgressCallback = Arc<dyn CompressionProgressCallback>;
