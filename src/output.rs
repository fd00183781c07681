//! Result types produced by the extraction, archive and recognition runs.

use crate::error::{ImgExtractError, ItemError};
use crate::pipeline::encode;
use crate::pool::PooledBuffer;
use chrono::{DateTime, Utc};
use image::ImageFormat;
use serde::{Deserialize, Serialize};
use std::io::{Seek, SeekFrom};

/// Text reported by a recogniser that could not be initialised.
pub const ENGINE_NOT_CONFIGURED: &str = "OCR engine is not configured";

// ── Extraction ───────────────────────────────────────────────────────────

/// One image pulled out of a document, ready to be archived.
///
/// `data` is a pooled, seekable stream; it may be positioned anywhere when
/// handed to the archiver, which rewinds it before reading.
#[derive(Debug)]
pub struct ExtractedImage {
    /// Destination file name, e.g. `annual-report-003.png`. Unique per result.
    pub name: String,
    /// 0-based position of the image in the source document.
    pub index: usize,
    /// Encoded image bytes.
    pub data: PooledBuffer,
    /// Encoding of `data`.
    pub format: ImageFormat,
    pub created_at: DateTime<Utc>,
}

impl ExtractedImage {
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Rewind the stream so the next reader starts at byte 0.
    pub fn rewind(&mut self) -> std::io::Result<()> {
        self.data.seek(SeekFrom::Start(0)).map(|_| ())
    }

    /// Base64 of the full image, regardless of stream position.
    pub fn to_base64(&self) -> String {
        encode::to_base64(self.data.as_slice())
    }

    /// `data:` URI suitable for an HTML `<img>` preview.
    pub fn to_data_uri(&self) -> String {
        encode::to_data_uri(self.data.as_slice(), self.format)
    }

    pub fn summary(&self) -> ImageSummary {
        ImageSummary {
            name: self.name.clone(),
            index: self.index,
            bytes: self.len(),
            mime_type: encode::mime_type(self.format).to_string(),
            created_at: self.created_at,
        }
    }
}

/// Serializable description of an [`ExtractedImage`] (without its bytes).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageSummary {
    pub name: String,
    pub index: usize,
    pub bytes: usize,
    pub mime_type: String,
    pub created_at: DateTime<Utc>,
}

/// Statistics for one extraction run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractionStats {
    /// Images the parser yielded (including ones that later failed).
    pub images_found: usize,
    /// Images present in the result.
    pub images_extracted: usize,
    /// Images dropped because of an item error.
    pub images_failed: usize,
    /// Images abandoned mid-processing because the run was cancelled.
    pub images_skipped: usize,
    /// The run was cancelled before every image was processed.
    pub cancelled: bool,
    pub duration_ms: u64,
    /// Per-image failures, in completion order.
    pub failures: Vec<ItemError>,
}

/// The images of a successful run.
#[derive(Debug)]
pub struct ExtractedSet {
    /// Name the entry names were derived from.
    pub base_name: String,
    /// Extracted images in completion order (not document order).
    pub images: Vec<ExtractedImage>,
    pub stats: ExtractionStats,
}

impl ExtractedSet {
    pub fn summaries(&self) -> Vec<ImageSummary> {
        self.images.iter().map(ExtractedImage::summary).collect()
    }
}

/// Outcome of [`crate::extract::ImageExtractor::extract`].
///
/// Per-image failures never turn a run into `Failure`; only a document that
/// cannot be opened or parsed does.
#[derive(Debug)]
pub enum ExtractionResult {
    Success(ExtractedSet),
    Failure { error_message: String },
}

impl ExtractionResult {
    pub fn failure(error_message: impl Into<String>) -> Self {
        Self::Failure {
            error_message: error_message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// Images of a successful run; empty for a failure.
    pub fn images(&self) -> &[ExtractedImage] {
        match self {
            Self::Success(set) => &set.images,
            Self::Failure { .. } => &[],
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        match self {
            Self::Success(_) => None,
            Self::Failure { error_message } => Some(error_message),
        }
    }

    pub fn stats(&self) -> Option<&ExtractionStats> {
        match self {
            Self::Success(set) => Some(&set.stats),
            Self::Failure { .. } => None,
        }
    }

    /// Convert to a `Result`, mapping a failure to
    /// [`ImgExtractError::CorruptDocument`].
    pub fn into_result(self) -> Result<ExtractedSet, ImgExtractError> {
        match self {
            Self::Success(set) => Ok(set),
            Self::Failure { error_message } => Err(ImgExtractError::CorruptDocument {
                detail: error_message,
            }),
        }
    }
}

// ── Archive ──────────────────────────────────────────────────────────────

/// Statistics for one archive run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArchiveStats {
    pub entries_written: usize,
    pub entries_skipped: usize,
    pub failures: Vec<ItemError>,
}

// ── Recognition ──────────────────────────────────────────────────────────

/// Text recognised from one image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecognizedText {
    pub text: String,
    /// Name of the image the text came from.
    pub source_name: String,
    /// Mean engine confidence in `[0, 1]`.
    pub confidence: f32,
    pub issued_at: DateTime<Utc>,
}

impl RecognizedText {
    /// The single record yielded when no recognition engine is available.
    pub fn sentinel() -> Self {
        Self {
            text: ENGINE_NOT_CONFIGURED.to_string(),
            source_name: String::new(),
            confidence: 0.0,
            issued_at: Utc::now(),
        }
    }

    pub fn is_sentinel(&self) -> bool {
        self.confidence == 0.0 && self.source_name.is_empty() && self.text == ENGINE_NOT_CONFIGURED
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::BufferPool;
    use std::io::Write;

    fn image_named(pool: &BufferPool, name: &str) -> ExtractedImage {
        let mut data = pool.acquire();
        data.write_all(b"\x89PNG fake").unwrap();
        ExtractedImage {
            name: name.to_string(),
            index: 0,
            data,
            format: ImageFormat::Png,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn failure_result_accessors() {
        let r = ExtractionResult::failure("cannot open");
        assert!(!r.is_success());
        assert!(r.images().is_empty());
        assert_eq!(r.error_message(), Some("cannot open"));
        assert!(matches!(
            r.into_result(),
            Err(ImgExtractError::CorruptDocument { .. })
        ));
    }

    #[test]
    fn success_result_accessors() {
        let pool = BufferPool::default();
        let r = ExtractionResult::Success(ExtractedSet {
            base_name: "doc".into(),
            images: vec![image_named(&pool, "doc-001.png")],
            stats: ExtractionStats::default(),
        });
        assert!(r.is_success());
        assert_eq!(r.images().len(), 1);
        assert!(r.error_message().is_none());
        let set = r.into_result().unwrap();
        assert_eq!(set.summaries()[0].mime_type, "image/png");
    }

    #[test]
    fn data_uri_ignores_stream_position() {
        let pool = BufferPool::default();
        let img = image_named(&pool, "a.png");
        assert!(img.data.position() > 0);
        assert!(img.to_data_uri().starts_with("data:image/png;base64,"));
        assert!(!img.to_base64().is_empty());
    }

    #[test]
    fn sentinel_shape() {
        let s = RecognizedText::sentinel();
        assert_eq!(s.text, ENGINE_NOT_CONFIGURED);
        assert_eq!(s.confidence, 0.0);
        assert!(s.source_name.is_empty());
        assert!(s.is_sentinel());
    }
}
