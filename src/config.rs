//! Configuration types for image extraction, archiving and recognition.
//!
//! Extraction behaviour is controlled through [`ExtractionConfig`], built via
//! its [`ExtractionConfigBuilder`]. Archive and recognition runs have their
//! own small configs ([`ArchiveConfig`], [`RecognitionConfig`]) because they
//! can be driven independently of extraction.
//!
//! # Design choice: builder over constructor
//! Callers set only what they care about and rely on documented defaults for
//! the rest; `build()` is the single place where constraints are checked.

use crate::error::ImgExtractError;
use crate::pool::{BufferPool, DEFAULT_MAX_IDLE_BUFFERS, DEFAULT_MAX_RETAINED_BYTES};
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Default number of images processed (or archive entries written) at once.
pub const DEFAULT_CONCURRENCY: usize = 5;

/// Default canvas width in pixels.
pub const DEFAULT_CANVAS_WIDTH: u32 = 640;

/// Default canvas height in pixels.
pub const DEFAULT_CANVAS_HEIGHT: u32 = 480;

// ── Canvas ───────────────────────────────────────────────────────────────

/// How a source image is scaled onto the canvas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AspectMode {
    /// Preserve the aspect ratio and letterbox the unused axis (default).
    #[default]
    Fit,
    /// Scale both axes independently to fill the canvas exactly.
    Stretch,
}

/// Target geometry for the canvas transform.
///
/// Dimensions are guaranteed positive: the only constructor rejects zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CanvasRequest {
    width: u32,
    height: u32,
    mode: AspectMode,
}

impl CanvasRequest {
    /// Validate and build a canvas request.
    pub fn new(width: u32, height: u32, mode: AspectMode) -> Result<Self, ImgExtractError> {
        if width == 0 || height == 0 {
            return Err(ImgExtractError::InvalidConfig(format!(
                "Canvas dimensions must be positive, got {}x{}",
                width, height
            )));
        }
        Ok(Self {
            width,
            height,
            mode,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn mode(&self) -> AspectMode {
        self.mode
    }
}

impl Default for CanvasRequest {
    fn default() -> Self {
        Self {
            width: DEFAULT_CANVAS_WIDTH,
            height: DEFAULT_CANVAS_HEIGHT,
            mode: AspectMode::Fit,
        }
    }
}

// ── Extraction ───────────────────────────────────────────────────────────

/// Configuration for document image extraction.
///
/// # Example
/// ```rust
/// use edgequake_imgextract::ExtractionConfig;
///
/// let config = ExtractionConfig::builder()
///     .concurrency(8)
///     .download_timeout_secs(30)
///     .build()
///     .unwrap();
/// assert_eq!(config.concurrency, 8);
/// ```
#[derive(Clone)]
pub struct ExtractionConfig {
    /// Maximum number of images decoded/resized at the same time. Default: 5.
    ///
    /// Each in-flight image holds a decoded bitmap in memory, so this is the
    /// knob that bounds peak memory on image-heavy documents. Also used as
    /// the archive entry concurrency by the top-level `extract_*` helpers.
    pub concurrency: usize,

    /// Deflate level for archive entries (0–9). `None` uses the zip default.
    pub compression_level: Option<i64>,

    /// Idle buffers kept by the buffer pool. Default: 16.
    pub max_idle_buffers: usize,

    /// Largest buffer capacity the pool keeps for reuse. Default: 16 MiB.
    pub max_retained_buffer_bytes: usize,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// User password for encrypted documents.
    pub password: Option<String>,

    /// Path to libpdfium (file or containing directory).
    /// Falls back to `PDFIUM_LIB_PATH`, then the system library.
    pub pdfium_library_path: Option<PathBuf>,

    /// Optional per-image progress callback.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            compression_level: None,
            max_idle_buffers: DEFAULT_MAX_IDLE_BUFFERS,
            max_retained_buffer_bytes: DEFAULT_MAX_RETAINED_BYTES,
            download_timeout_secs: 120,
            password: None,
            pdfium_library_path: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ExtractionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractionConfig")
            .field("concurrency", &self.concurrency)
            .field("compression_level", &self.compression_level)
            .field("max_idle_buffers", &self.max_idle_buffers)
            .field("max_retained_buffer_bytes", &self.max_retained_buffer_bytes)
            .field("download_timeout_secs", &self.download_timeout_secs)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("pdfium_library_path", &self.pdfium_library_path)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn ExtractionProgressCallback>"),
            )
            .finish()
    }
}

impl ExtractionConfig {
    /// Create a new builder for `ExtractionConfig`.
    pub fn builder() -> ExtractionConfigBuilder {
        ExtractionConfigBuilder {
            config: Self::default(),
        }
    }

    /// Build a buffer pool sized according to this config.
    pub fn buffer_pool(&self) -> BufferPool {
        BufferPool::new(self.max_idle_buffers, self.max_retained_buffer_bytes)
    }

    /// Archive settings derived from this config.
    pub fn archive_config(&self) -> ArchiveConfig {
        ArchiveConfig {
            concurrency: self.concurrency,
            compression_level: self.compression_level,
        }
    }
}

/// Builder for [`ExtractionConfig`].
#[derive(Debug)]
pub struct ExtractionConfigBuilder {
    config: ExtractionConfig,
}

impl ExtractionConfigBuilder {
    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n;
        self
    }

    pub fn compression_level(mut self, level: i64) -> Self {
        self.config.compression_level = Some(level);
        self
    }

    pub fn max_idle_buffers(mut self, n: usize) -> Self {
        self.config.max_idle_buffers = n;
        self
    }

    pub fn max_retained_buffer_bytes(mut self, bytes: usize) -> Self {
        self.config.max_retained_buffer_bytes = bytes;
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn pdfium_library_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.pdfium_library_path = Some(path.into());
        self
    }

    pub fn progress_callback(mut self, callback: ProgressCallback) -> Self {
        self.config.progress_callback = Some(callback);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ExtractionConfig, ImgExtractError> {
        let c = &self.config;
        if c.concurrency == 0 {
            return Err(ImgExtractError::InvalidConfig(
                "Concurrency must be ≥ 1".into(),
            ));
        }
        if let Some(level) = c.compression_level {
            validate_compression_level(level)?;
        }
        if c.download_timeout_secs == 0 {
            return Err(ImgExtractError::InvalidConfig(
                "Download timeout must be ≥ 1 second".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── Archive ──────────────────────────────────────────────────────────────

/// Configuration for [`crate::archive::ZipArchiver`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveConfig {
    /// Maximum number of entries prepared at the same time. Default: 5.
    pub concurrency: usize,
    /// Deflate level (0–9). `None` uses the zip default.
    pub compression_level: Option<i64>,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            compression_level: None,
        }
    }
}

impl ArchiveConfig {
    /// Check the constraints the builder-less struct can't enforce.
    pub fn validate(&self) -> Result<(), ImgExtractError> {
        if self.concurrency == 0 {
            return Err(ImgExtractError::InvalidConfig(
                "Archive concurrency must be ≥ 1".into(),
            ));
        }
        if let Some(level) = self.compression_level {
            validate_compression_level(level)?;
        }
        Ok(())
    }
}

fn validate_compression_level(level: i64) -> Result<(), ImgExtractError> {
    if !(0..=9).contains(&level) {
        return Err(ImgExtractError::InvalidConfig(format!(
            "Compression level must be 0–9, got {}",
            level
        )));
    }
    Ok(())
}

// ── Recognition ──────────────────────────────────────────────────────────

/// Configuration for the text-recognition pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecognitionConfig {
    /// Minimum mean confidence (0.0–1.0) a record needs to be kept. Default: 0.5.
    pub confidence_threshold: f32,

    /// Directory holding the `*.traineddata` language models. Default: `./tessdata`.
    pub tessdata_dir: PathBuf,

    /// `+`-separated language codes. Default: `eng+por+fra+spa+ita`.
    pub languages: String,

    /// Name or path of the tesseract executable. Default: `tesseract`.
    pub tesseract_binary: PathBuf,

    /// Tesseract page segmentation mode. Default: 1 (automatic with OSD).
    pub page_seg_mode: u8,
}

impl Default for RecognitionConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.5,
            tessdata_dir: PathBuf::from("tessdata"),
            languages: "eng+por+fra+spa+ita".to_string(),
            tesseract_binary: PathBuf::from("tesseract"),
            page_seg_mode: 1,
        }
    }
}

impl RecognitionConfig {
    pub fn validate(&self) -> Result<(), ImgExtractError> {
        validate_threshold(self.confidence_threshold)?;
        if self.languages.trim().is_empty() {
            return Err(ImgExtractError::InvalidConfig(
                "At least one recognition language is required".into(),
            ));
        }
        if self.page_seg_mode > 13 {
            return Err(ImgExtractError::InvalidConfig(format!(
                "Page segmentation mode must be 0–13, got {}",
                self.page_seg_mode
            )));
        }
        Ok(())
    }
}

/// A confidence threshold must be a number in `[0, 1]`.
pub fn validate_threshold(threshold: f32) -> Result<(), ImgExtractError> {
    if !(0.0..=1.0).contains(&threshold) {
        return Err(ImgExtractError::InvalidConfig(format!(
            "Confidence threshold must be within 0.0–1.0, got {}",
            threshold
        )));
    }
    Ok(())
}
