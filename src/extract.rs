//! Extraction coordinator: document bytes in, named image streams out.
//!
//! ## How the work is spread
//!
//! ```text
//!  spawn_blocking              async coordinator             JoinSet
//! ┌──────────────┐  mpsc(K)  ┌──────────────────┐  spawn   ┌──────────┐
//! │ parser.parse │──────────▶│ permit ▸ recv    │─────────▶│ item × K │
//! └──────────────┘           └──────────────────┘          └──────────┘
//! ```
//!
//! The parser walks the document on a blocking thread and pushes each image
//! into a bounded channel. The coordinator takes a semaphore permit *before*
//! it receives the next image, so at most `K = concurrency` images are held
//! in worker tasks and at most `K` more wait in the channel. The parser
//! blocks once both are full, which keeps memory bounded on documents with
//! thousands of images.
//!
//! ## Failure isolation
//!
//! A document that cannot be opened fails the whole call. A single image that
//! cannot be decoded, resized or copied is logged, recorded in the run's
//! [`ExtractionStats`] and dropped; the rest of the document is unaffected.
//!
//! ## Cancellation
//!
//! The token is checked while waiting for a permit, while waiting for the
//! next image, and just before an image is copied into its output buffer.
//! Once it fires no new image is started; images already past the copy point
//! finish and are returned with `stats.cancelled = true`.

use crate::config::{CanvasRequest, ExtractionConfig};
use crate::error::{ImgExtractError, ItemError};
use crate::output::{ExtractedImage, ExtractedSet, ExtractionResult, ExtractionStats};
use crate::pipeline::parse::{DocumentParser, PdfiumParser, RawImage};
use crate::pipeline::{canvas, encode, naming};
use crate::pool::BufferPool;
use chrono::Utc;
use image::{ImageFormat, ImageReader};
use std::io::{self, Seek, SeekFrom};
use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Per-call extraction options.
#[derive(Debug, Clone, Default)]
pub struct ExtractOptions {
    /// Letterbox/stretch every image onto this canvas. `None` keeps the
    /// images as the parser produced them.
    pub resize: Option<CanvasRequest>,
    /// Name the entry names are derived from (slugged before use).
    pub base_name: String,
}

impl ExtractOptions {
    pub fn new(base_name: impl Into<String>) -> Self {
        Self {
            resize: None,
            base_name: base_name.into(),
        }
    }

    pub fn with_resize(mut self, request: CanvasRequest) -> Self {
        self.resize = Some(request);
        self
    }
}

/// Pulls the embedded images out of documents.
///
/// Holds no per-request state: one extractor can serve concurrent requests
/// from behind an `Arc`.
pub struct ImageExtractor {
    parser: Arc<dyn DocumentParser>,
    pool: BufferPool,
    config: ExtractionConfig,
}

impl ImageExtractor {
    pub fn new(
        parser: Arc<dyn DocumentParser>,
        pool: BufferPool,
        config: ExtractionConfig,
    ) -> Result<Self, ImgExtractError> {
        if config.concurrency == 0 {
            return Err(ImgExtractError::InvalidConfig(
                "Concurrency must be ≥ 1".into(),
            ));
        }
        Ok(Self {
            parser,
            pool,
            config,
        })
    }

    /// An extractor backed by pdfium, configured from `config`.
    pub fn with_pdfium(config: ExtractionConfig) -> Result<Self, ImgExtractError> {
        let parser = PdfiumParser::new(config.pdfium_library_path.clone(), config.password.clone());
        let pool = config.buffer_pool();
        Self::new(Arc::new(parser), pool, config)
    }

    pub fn pool(&self) -> &BufferPool {
        &self.pool
    }

    pub fn config(&self) -> &ExtractionConfig {
        &self.config
    }

    /// Extract every embedded image of `document`.
    ///
    /// Never returns item-level errors: a per-image failure only shows up in
    /// the stats. Returns [`ExtractionResult::Failure`] when the document
    /// itself cannot be parsed; no images are returned in that case.
    pub async fn extract(
        &self,
        document: Vec<u8>,
        options: &ExtractOptions,
        cancel: &CancellationToken,
    ) -> ExtractionResult {
        let start = Instant::now();
        let base_name = naming::slugify(&options.base_name);
        let limit = self.config.concurrency;
        let progress = self.config.progress_callback.clone();

        info!(
            "Extracting images from '{}' ({} bytes, concurrency {})",
            base_name,
            document.len(),
            limit
        );
        if let Some(ref cb) = progress {
            cb.on_extraction_start(&base_name);
        }

        // ── Step 1: Start the parser ─────────────────────────────────────────
        let (tx, mut rx) = mpsc::channel::<Result<RawImage, ItemError>>(limit);
        let parser = Arc::clone(&self.parser);
        let parser_cancel = cancel.clone();
        let parse_task = tokio::task::spawn_blocking(move || {
            parser.parse(&document, &mut |item| {
                if parser_cancel.is_cancelled() {
                    return ControlFlow::Break(());
                }
                match tx.blocking_send(item) {
                    Ok(()) => ControlFlow::Continue(()),
                    Err(_) => ControlFlow::Break(()),
                }
            })
        });

        // ── Step 2: Fan out under the concurrency limit ─────────────────────
        let semaphore = Arc::new(Semaphore::new(limit));
        let mut tasks: JoinSet<(usize, Result<ExtractedImage, ItemError>)> = JoinSet::new();
        let mut stats = ExtractionStats::default();

        loop {
            let permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    stats.cancelled = true;
                    break;
                }
                permit = Arc::clone(&semaphore).acquire_owned() => match permit {
                    Ok(p) => p,
                    Err(_) => break,
                },
            };

            let item = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    stats.cancelled = true;
                    break;
                }
                item = rx.recv() => match item {
                    Some(item) => item,
                    None => break,
                },
            };

            stats.images_found += 1;
            match item {
                Ok(raw) => {
                    let index = raw.index;
                    if let Some(ref cb) = progress {
                        cb.on_image_start(index);
                    }
                    let work = ItemWork {
                        raw,
                        base_name: base_name.clone(),
                        resize: options.resize,
                        pool: self.pool.clone(),
                        cancel: cancel.clone(),
                    };
                    tasks.spawn(async move { (index, work.run(permit).await) });
                }
                Err(e) => {
                    drop(permit);
                    let index = e.index().unwrap_or(stats.images_found - 1);
                    warn!("Image {} skipped: {}", index, e);
                    if let Some(ref cb) = progress {
                        cb.on_image_error(index, &e.to_string());
                    }
                    stats.failures.push(e);
                }
            }
        }

        // ── Step 3: Wait for the parser ──────────────────────────────────────
        drop(rx);
        let parse_outcome = match parse_task.await {
            Ok(outcome) => outcome,
            Err(e) => Err(ImgExtractError::Internal(format!("Parser task panicked: {}", e))),
        };
        if let Err(e) = parse_outcome {
            error!("Extraction of '{}' failed: {}", base_name, e);
            tasks.abort_all();
            while tasks.join_next().await.is_some() {}
            return ExtractionResult::failure(e.to_string());
        }

        // ── Step 4: Collect outcomes in completion order ─────────────────────
        let mut images = Vec::with_capacity(tasks.len());
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, Ok(image))) => {
                    debug!("Image {} → {} ({} bytes)", index, image.name, image.len());
                    if let Some(ref cb) = progress {
                        cb.on_image_complete(index, image.len());
                    }
                    images.push(image);
                }
                Ok((index, Err(ItemError::Cancelled { name }))) => {
                    debug!("Image {} ({}) abandoned: run cancelled", index, name);
                    stats.images_skipped += 1;
                    stats.cancelled = true;
                }
                Ok((index, Err(e))) => {
                    warn!("Image {} failed: {}", index, e);
                    if let Some(ref cb) = progress {
                        cb.on_image_error(index, &e.to_string());
                    }
                    stats.failures.push(e);
                }
                Err(e) => {
                    warn!("Image worker died: {}", e);
                    stats.failures.push(ItemError::TaskFailed {
                        detail: e.to_string(),
                    });
                }
            }
        }

        stats.images_extracted = images.len();
        stats.images_failed = stats.failures.len();
        stats.duration_ms = start.elapsed().as_millis() as u64;

        info!(
            "Extraction of '{}' complete: {}/{} images, {} failed{}, {}ms",
            base_name,
            stats.images_extracted,
            stats.images_found,
            stats.images_failed,
            if stats.cancelled { " (cancelled)" } else { "" },
            stats.duration_ms
        );
        if let Some(ref cb) = progress {
            cb.on_extraction_complete(stats.images_found, stats.images_extracted);
        }

        ExtractionResult::Success(ExtractedSet {
            base_name,
            images,
            stats,
        })
    }
}

/// Everything one worker task needs, moved in by value.
struct ItemWork {
    raw: RawImage,
    base_name: String,
    resize: Option<CanvasRequest>,
    pool: BufferPool,
    cancel: CancellationToken,
}

impl ItemWork {
    /// Process one image while holding `permit`; the slot frees on return.
    async fn run(self, permit: OwnedSemaphorePermit) -> Result<ExtractedImage, ItemError> {
        let _permit = permit;
        match self.resize {
            Some(request) => self.transformed(request).await,
            None => {
                let index = self.raw.index;
                tokio::task::spawn_blocking(move || self.copied())
                    .await
                    .map_err(|e| ItemError::CopyFailed {
                        index,
                        detail: format!("worker panicked: {}", e),
                    })?
            }
        }
    }

    /// Canvas transform on the blocking pool, straight into a pooled buffer.
    async fn transformed(self, request: CanvasRequest) -> Result<ExtractedImage, ItemError> {
        let index = self.raw.index;
        let name = naming::entry_name(&self.base_name, index, encode::extension(ImageFormat::Png));
        let pool = self.pool;
        let cancel = self.cancel;
        let raw = self.raw;
        let entry = name.clone();

        let data = tokio::task::spawn_blocking(move || {
            if cancel.is_cancelled() {
                return Err(ItemError::Cancelled { name: entry });
            }
            let mut out = pool.acquire();
            canvas::transform_into(index, raw.stream.get_ref(), &request, &mut out)?;
            out.seek(SeekFrom::Start(0)).map_err(|e| ItemError::CopyFailed {
                index,
                detail: e.to_string(),
            })?;
            if cancel.is_cancelled() {
                return Err(ItemError::Cancelled { name: entry });
            }
            Ok(out)
        })
        .await
        .map_err(|e| ItemError::TransformFailed {
            index,
            detail: format!("worker panicked: {}", e),
        })??;

        Ok(ExtractedImage {
            name,
            index,
            data,
            format: ImageFormat::Png,
            created_at: Utc::now(),
        })
    }

    /// Decode the image once to validate it, then copy the stream unchanged.
    ///
    /// A header check alone would let a truncated body through. Runs on the
    /// blocking pool.
    fn copied(self) -> Result<ExtractedImage, ItemError> {
        let ItemWork {
            mut raw,
            base_name,
            pool,
            cancel,
            ..
        } = self;
        let index = raw.index;
        let copy_failed = |e: io::Error| ItemError::CopyFailed {
            index,
            detail: e.to_string(),
        };

        raw.stream.seek(SeekFrom::Start(0)).map_err(copy_failed)?;
        let reader = ImageReader::new(&mut raw.stream)
            .with_guessed_format()
            .map_err(|e| ItemError::DecodeFailed {
                index,
                detail: e.to_string(),
            })?;
        let format = reader.format().unwrap_or(raw.format);
        reader.decode().map_err(|e| ItemError::DecodeFailed {
            index,
            detail: e.to_string(),
        })?;

        let name = naming::entry_name(&base_name, index, encode::extension(format));
        if cancel.is_cancelled() {
            return Err(ItemError::Cancelled { name });
        }

        raw.stream.seek(SeekFrom::Start(0)).map_err(copy_failed)?;
        let mut data = pool.acquire();
        io::copy(&mut raw.stream, &mut data).map_err(copy_failed)?;
        data.seek(SeekFrom::Start(0)).map_err(copy_failed)?;

        Ok(ExtractedImage {
            name,
            index,
            data,
            format,
            created_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::parse::ImageSink;

    struct NoImages;

    impl DocumentParser for NoImages {
        fn parse(&self, _doc: &[u8], _sink: &mut ImageSink<'_>) -> Result<(), ImgExtractError> {
            Ok(())
        }
    }

    #[test]
    fn zero_concurrency_is_rejected() {
        let config = ExtractionConfig {
            concurrency: 0,
            ..ExtractionConfig::default()
        };
        let result = ImageExtractor::new(Arc::new(NoImages), BufferPool::default(), config);
        assert!(matches!(result, Err(ImgExtractError::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn document_without_images_is_an_empty_success() {
        let extractor =
            ImageExtractor::new(Arc::new(NoImages), BufferPool::default(), ExtractionConfig::default())
                .unwrap();
        let result = extractor
            .extract(Vec::new(), &ExtractOptions::new("Empty Doc"), &CancellationToken::new())
            .await;
        let set = result.into_result().unwrap();
        assert_eq!(set.base_name, "empty-doc");
        assert!(set.images.is_empty());
        assert_eq!(set.stats.images_found, 0);
        assert!(!set.stats.cancelled);
    }

    #[test]
    fn options_builder() {
        let opts = ExtractOptions::new("x").with_resize(CanvasRequest::default());
        assert_eq!(opts.resize, Some(CanvasRequest::default()));
    }
}
