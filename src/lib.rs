//! # edgequake-imgextract
//!
//! Pull the embedded images out of documents, optionally letterbox them onto
//! a fixed-size canvas, and ship them as one zip archive. A second pipeline
//! recognises text in batches of images.
//!
//! ## Why this crate?
//!
//! Getting images out of a document is easy one at a time and hard at
//! scale. A brochure with four hundred photos must not decode four hundred
//! bitmaps at once. One corrupt image must not sink the other three hundred
//! ninety-nine, and a user hitting Ctrl-C must not leave a half-written zip
//! entry behind. Every stage here runs under a fixed concurrency limit,
//! isolates per-image failures, and honours a cancellation token.
//!
//! ## Pipeline Overview
//!
//! ```text
//! Document
//!  │
//!  ├─ 1. Input    resolve local file or download from URL
//!  ├─ 2. Parse    walk embedded images via pdfium (spawn_blocking)
//!  ├─ 3. Canvas   optional Fit/Stretch resize onto a transparent canvas
//!  ├─ 4. Extract  K images in flight, pooled buffers, per-image isolation
//!  └─ 5. Archive  K entries prepared at once, one deflate zip out
//!
//! Images ──▶ Recognize (tesseract, one at a time, confidence cutoff)
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_imgextract::{extract_to_file, CanvasRequest, ExtractionConfig};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ExtractionConfig::default();
//!     let output = extract_to_file(
//!         "brochure.pdf",
//!         "brochure.zip",
//!         Some(CanvasRequest::default()),
//!         &config,
//!         &CancellationToken::new(),
//!     )
//!     .await?;
//!     eprintln!("{} images archived", output.archive.entries_written);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `imgextract` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library to avoid pulling in CLI-only deps:
//! ```toml
//! edgequake-imgextract = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod archive;
pub mod config;
pub mod convert;
pub mod error;
pub mod extract;
pub mod output;
pub mod pipeline;
pub mod pool;
pub mod progress;
pub mod recognize;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use archive::ZipArchiver;
pub use config::{
    ArchiveConfig, AspectMode, CanvasRequest, ExtractionConfig, ExtractionConfigBuilder,
    RecognitionConfig,
};
pub use convert::{
    extract_and_archive, extract_from_bytes, extract_to_archive, extract_to_archive_sync,
    extract_to_file, ArchiveOutput,
};
pub use error::{ImgExtractError, ItemError};
pub use extract::{ExtractOptions, ImageExtractor};
pub use output::{
    ArchiveStats, ExtractedImage, ExtractedSet, ExtractionResult, ExtractionStats, ImageSummary,
    RecognizedText,
};
pub use pipeline::ocr::{EngineError, EngineOutput, TesseractEngine, TextEngine};
pub use pipeline::parse::{DocumentParser, ImageSink, PdfiumParser, RawImage};
pub use pool::{BufferPool, PooledBuffer};
pub use progress::{ExtractionProgressCallback, NoopProgressCallback, ProgressCallback};
pub use recognize::{NamedImage, Recognizer, TextStream};
