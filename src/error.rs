//! Error types for the edgequake-imgextract library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`ImgExtractError`] — **Fatal**: the request cannot proceed at all
//!   (input missing, document unreadable, parser library absent, bad
//!   configuration). Surfaces as an explicit failure result or as
//!   `Err(ImgExtractError)` from the top-level `extract_*` functions.
//!
//! * [`ItemError`] — **Non-fatal**: a single embedded image or archive entry
//!   failed (corrupt bytes, resize glitch, duplicate entry name) but every
//!   other item is fine. Item errors are logged, counted in the run's stats
//!   and the item is dropped; they never abort the whole request.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the edgequake-imgextract library.
///
/// Item-level failures use [`ItemError`] and are recorded in
/// [`crate::output::ExtractionStats`] rather than propagated here.
#[derive(Debug, Error)]
pub enum ImgExtractError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("Document not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The input string is not a valid file path or URL.
    #[error("Invalid input '{input}': not a file path or a valid HTTP/HTTPS URL")]
    InvalidInput { input: String },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'\nIncrease --download-timeout.")]
    DownloadTimeout { url: String, secs: u64 },

    // ── Document errors ───────────────────────────────────────────────────
    /// The document container is corrupt or in an unsupported format.
    #[error("Document is corrupt or unsupported: {detail}")]
    CorruptDocument { detail: String },

    /// The document requires a password but none was provided.
    #[error("Document is encrypted and requires a password.\nProvide it with --password <PASSWORD>.")]
    PasswordRequired,

    /// A password was provided but it is wrong.
    #[error("Wrong password for the encrypted document")]
    WrongPassword,

    /// The document parser backend could not be loaded.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
Set PDFIUM_LIB_PATH=/path/to/libpdfium (or the directory containing it)\n\
or install pdfium as a system library.\n"
    )]
    ParserUnavailable(String),

    // ── Archive errors ────────────────────────────────────────────────────
    /// The archive container could not be created or finalised.
    #[error("Failed to build archive: {0}")]
    ArchiveFailed(String),

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write the output archive file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder or argument validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal error for a single image or archive entry.
///
/// `index` is the 0-based position of the image inside the source document.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
pub enum ItemError {
    /// The embedded image bytes could not be decoded.
    #[error("Image {index}: decode failed: {detail}")]
    DecodeFailed { index: usize, detail: String },

    /// Resizing onto the canvas failed.
    #[error("Image {index}: canvas transform failed: {detail}")]
    TransformFailed { index: usize, detail: String },

    /// Re-encoding the transformed image failed.
    #[error("Image {index}: encode failed: {detail}")]
    EncodeFailed { index: usize, detail: String },

    /// Copying the image bytes into a pooled buffer failed.
    #[error("Image {index}: copy failed: {detail}")]
    CopyFailed { index: usize, detail: String },

    /// An archive entry could not be created or written.
    #[error("Entry '{name}': {detail}")]
    EntryFailed { name: String, detail: String },

    /// Another entry with the same name is already in the archive.
    #[error("Entry '{name}': duplicate name, skipped")]
    DuplicateName { name: String },

    /// The recognition engine failed on one image.
    #[error("Image '{name}': text recognition failed: {detail}")]
    RecognitionFailed { name: String, detail: String },

    /// A worker task died before reporting an outcome.
    #[error("Worker task failed: {detail}")]
    TaskFailed { detail: String },

    /// The run was cancelled before this item was copied.
    #[error("'{name}': cancelled")]
    Cancelled { name: String },
}

impl ItemError {
    /// Document position of the image, when the error is tied to one.
    pub fn index(&self) -> Option<usize> {
        match self {
            ItemError::DecodeFailed { index, .. }
            | ItemError::TransformFailed { index, .. }
            | ItemError::EncodeFailed { index, .. }
            | ItemError::CopyFailed { index, .. } => Some(*index),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn item_error_display_names_the_image() {
        let e = ItemError::DecodeFailed {
            index: 3,
            detail: "bad magic".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("Image 3"), "got: {msg}");
        assert!(msg.contains("bad magic"));
    }

    #[test]
    fn index_is_only_reported_for_image_errors() {
        let e = ItemError::CopyFailed {
            index: 9,
            detail: "short read".into(),
        };
        assert_eq!(e.index(), Some(9));
        let e = ItemError::DuplicateName { name: "a.png".into() };
        assert_eq!(e.index(), None);
    }

    #[test]
    fn duplicate_name_display() {
        let e = ItemError::DuplicateName {
            name: "report-001.png".into(),
        };
        assert!(e.to_string().contains("report-001.png"));
    }

    #[test]
    fn invalid_config_display() {
        let e = ImgExtractError::InvalidConfig("concurrency must be ≥ 1".into());
        assert!(e.to_string().contains("concurrency"));
    }

    #[test]
    fn item_error_serialises() {
        let e = ItemError::Cancelled {
            name: "image 4".into(),
        };
        let json = serde_json::to_string(&e).unwrap();
        let back: ItemError = serde_json::from_str(&json).unwrap();
        assert_eq!(back, e);
    }
}
