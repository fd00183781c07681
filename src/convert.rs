//! Top-level entry points: document in, zip archive out.
//!
//! These chain input resolution → [`ImageExtractor`] → [`ZipArchiver`] with
//! the pdfium parser. Use the coordinators directly to plug in another
//! parser or to keep the extracted images instead of archiving them.

use crate::archive::ZipArchiver;
use crate::config::{CanvasRequest, ExtractionConfig};
use crate::error::ImgExtractError;
use crate::extract::{ExtractOptions, ImageExtractor};
use crate::output::{ArchiveStats, ExtractionStats, ImageSummary};
use crate::pipeline::input;
use serde::Serialize;
use std::path::Path;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Archive bytes plus what went into them.
#[derive(Debug, Serialize)]
pub struct ArchiveOutput {
    /// Suggested file name, `{base_name}.zip`.
    pub file_name: String,
    #[serde(skip)]
    pub bytes: Vec<u8>,
    pub images: Vec<ImageSummary>,
    pub extraction: ExtractionStats,
    pub archive: ArchiveStats,
}

/// Extract the images of a local file or URL and zip them.
///
/// # Errors
/// Returns `Err` only for fatal problems: the input cannot be read or
/// downloaded, or the document cannot be parsed. Individual images that
/// fail are recorded in `output.extraction.failures`.
pub async fn extract_to_archive(
    input_str: impl AsRef<str>,
    resize: Option<CanvasRequest>,
    config: &ExtractionConfig,
    cancel: &CancellationToken,
) -> Result<ArchiveOutput, ImgExtractError> {
    let input_str = input_str.as_ref();
    info!("Starting extraction: {}", input_str);

    // ── Step 1: Resolve input ────────────────────────────────────────────
    let resolved = input::resolve_input(input_str, config.download_timeout_secs).await?;

    // ── Step 2: Extract + archive ────────────────────────────────────────
    extract_from_bytes(resolved.bytes, &resolved.base_name, resize, config, cancel).await
}

/// Like [`extract_to_archive`] for a document already in memory.
pub async fn extract_from_bytes(
    document: Vec<u8>,
    base_name: &str,
    resize: Option<CanvasRequest>,
    config: &ExtractionConfig,
    cancel: &CancellationToken,
) -> Result<ArchiveOutput, ImgExtractError> {
    let extractor = ImageExtractor::with_pdfium(config.clone())?;
    let options = ExtractOptions {
        resize,
        base_name: base_name.to_string(),
    };
    extract_and_archive(&extractor, document, &options, cancel).await
}

/// Run `extractor` over `document` and zip whatever it produced.
///
/// `cancel` stops the extraction only. Images that were already extracted
/// when it fired are still archived, and `output.extraction.cancelled`
/// tells the caller the archive is a subset.
pub async fn extract_and_archive(
    extractor: &ImageExtractor,
    document: Vec<u8>,
    options: &ExtractOptions,
    cancel: &CancellationToken,
) -> Result<ArchiveOutput, ImgExtractError> {
    let archiver = ZipArchiver::new(extractor.pool().clone(), extractor.config().archive_config())?;
    let set = extractor.extract(document, options, cancel).await.into_result()?;

    if set.stats.cancelled {
        info!(
            "Extraction cancelled; archiving the {} images already extracted",
            set.images.len()
        );
    }
    let images = set.summaries();
    let (bytes, archive) = archiver
        .archive_with_stats(set.images, &CancellationToken::new())
        .await;

    Ok(ArchiveOutput {
        file_name: format!("{}.zip", set.base_name),
        bytes,
        images,
        extraction: set.stats,
        archive,
    })
}

/// Extract and write the archive to `output_path`.
///
/// Uses atomic write (temp file + rename) to prevent partial files. When no
/// image made it into the archive, nothing is written and an existing file
/// at `output_path` is left untouched.
pub async fn extract_to_file(
    input_str: impl AsRef<str>,
    output_path: impl AsRef<Path>,
    resize: Option<CanvasRequest>,
    config: &ExtractionConfig,
    cancel: &CancellationToken,
) -> Result<ArchiveOutput, ImgExtractError> {
    let output = extract_to_archive(input_str, resize, config, cancel).await?;
    write_archive(output_path.as_ref(), &output.bytes).await?;
    Ok(output)
}

/// Write `bytes` unless the archive is empty. Returns whether it wrote.
async fn write_archive(path: &Path, bytes: &[u8]) -> Result<bool, ImgExtractError> {
    if bytes.is_empty() {
        warn!("No images archived; {} not written", path.display());
        return Ok(false);
    }
    write_atomic(path, bytes).await?;
    Ok(true)
}

async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), ImgExtractError> {
    let write_failed = |source| ImgExtractError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(write_failed)?;
    }

    let tmp_path = path.with_extension("zip.tmp");
    tokio::fs::write(&tmp_path, bytes).await.map_err(write_failed)?;
    tokio::fs::rename(&tmp_path, path).await.map_err(write_failed)?;

    info!("Wrote {} bytes to {}", bytes.len(), path.display());
    Ok(())
}

/// Synchronous wrapper around [`extract_to_archive`].
///
/// Creates a temporary tokio runtime internally.
pub fn extract_to_archive_sync(
    input_str: impl AsRef<str>,
    resize: Option<CanvasRequest>,
    config: &ExtractionConfig,
) -> Result<ArchiveOutput, ImgExtractError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| ImgExtractError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(extract_to_archive(input_str, resize, config, &CancellationToken::new()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn atomic_write_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/out.zip");
        write_atomic(&path, b"PK").await.unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"PK");
        assert!(!path.with_extension("zip.tmp").exists());
    }

    #[tokio::test]
    async fn empty_archive_leaves_existing_file_alone() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.zip");
        std::fs::write(&path, b"previous run").unwrap();

        assert!(!write_archive(&path, b"").await.unwrap());
        assert_eq!(std::fs::read(&path).unwrap(), b"previous run");

        assert!(write_archive(&path, b"PK").await.unwrap());
        assert_eq!(std::fs::read(&path).unwrap(), b"PK");
    }

    #[tokio::test]
    async fn missing_input_is_fatal() {
        let err = extract_to_archive(
            "/no/such/document.pdf",
            None,
            &ExtractionConfig::default(),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ImgExtractError::FileNotFound { .. }));
    }
}
