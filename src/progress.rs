//! Progress-callback trait for per-image extraction events.
//!
//! Inject an [`Arc<dyn ExtractionProgressCallback>`] via
//! [`crate::config::ExtractionConfigBuilder::progress_callback`] to receive
//! events as the extractor processes each embedded image.
//!
//! # Why callbacks instead of channels?
//!
//! Callers can forward events to a broadcast channel, a terminal progress bar
//! or a job record without the library knowing how the host application
//! communicates. Images are processed concurrently, so the trait is
//! `Send + Sync`.
//!
//! # Example
//!
//! ```rust
//! use edgequake_imgextract::{ExtractionProgressCallback, ExtractionConfig};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     completed: Arc<AtomicUsize>,
//! }
//!
//! impl ExtractionProgressCallback for CountingCallback {
//!     fn on_image_complete(&self, index: usize, bytes: usize) {
//!         self.completed.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("Image {} done ({} bytes)", index, bytes);
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback {
//!     completed: Arc::new(AtomicUsize::new(0)),
//! });
//!
//! let config = ExtractionConfig::builder()
//!     .progress_callback(counter as Arc<dyn ExtractionProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the extractor as it processes each image.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. `on_image_start`, `on_image_complete` and
/// `on_image_error` may be called concurrently and out of document order.
pub trait ExtractionProgressCallback: Send + Sync {
    /// Called once before the document is parsed.
    ///
    /// # Arguments
    /// * `base_name` — name the output entries are derived from
    fn on_extraction_start(&self, base_name: &str) {
        let _ = base_name;
    }

    /// Called when an image has been found and a worker picks it up.
    ///
    /// # Arguments
    /// * `index` — 0-based position of the image in the document
    fn on_image_start(&self, index: usize) {
        let _ = index;
    }

    /// Called when an image has been copied or transformed.
    ///
    /// # Arguments
    /// * `index` — 0-based position of the image in the document
    /// * `bytes` — size of the produced image stream
    fn on_image_complete(&self, index: usize, bytes: usize) {
        let _ = (index, bytes);
    }

    /// Called when a single image fails and is dropped from the result.
    fn on_image_error(&self, index: usize, error: &str) {
        let _ = (index, error);
    }

    /// Called once after every found image has been attempted.
    ///
    /// # Arguments
    /// * `found`     — images the parser yielded
    /// * `extracted` — images that made it into the result
    fn on_extraction_complete(&self, found: usize, extracted: usize) {
        let _ = (found, extracted);
    }
}

/// A no-op implementation; the default when no callback is configured.
pub struct NoopProgressCallback;

impl ExtractionProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ExtractionConfig`].
pub type ProgressCallback = Arc<dyn ExtractionProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct TrackingCallback {
        starts: AtomicUsize,
        completes: AtomicUsize,
        errors: AtomicUsize,
        extracted: AtomicUsize,
    }

    impl ExtractionProgressCallback for TrackingCallback {
        fn on_image_start(&self, _index: usize) {
            self.starts.fetch_add(1, Ordering::SeqCst);
        }

        fn on_image_complete(&self, _index: usize, _bytes: usize) {
            self.completes.fetch_add(1, Ordering::SeqCst);
        }

        fn on_image_error(&self, _index: usize, _error: &str) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }

        fn on_extraction_complete(&self, _found: usize, extracted: usize) {
            self.extracted.store(extracted, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_extraction_start("report");
        cb.on_image_start(0);
        cb.on_image_complete(0, 42);
        cb.on_image_error(1, "bad bytes");
        cb.on_extraction_complete(2, 1);
    }

    #[test]
    fn tracking_callback_receives_events() {
        let tracker = TrackingCallback::default();

        tracker.on_image_start(0);
        tracker.on_image_complete(0, 100);
        tracker.on_image_start(1);
        tracker.on_image_error(1, "decode failed");
        tracker.on_extraction_complete(2, 1);

        assert_eq!(tracker.starts.load(Ordering::SeqCst), 2);
        assert_eq!(tracker.completes.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.errors.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.extracted.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn arc_dyn_callback_works() {
        let cb: ProgressCallback = Arc::new(NoopProgressCallback);
        cb.on_extraction_start("doc");
        cb.on_image_complete(3, 512);
    }
}
