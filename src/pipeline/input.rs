//! Input resolution: normalise a user-supplied path or URL to document bytes.
//!
//! ## Why bytes instead of a path?
//!
//! pdfium can load a document straight from memory, and the extractor hands
//! the document to a blocking parser thread by move. Reading the whole file
//! up front also turns "missing file" and "permission denied" into clean
//! setup errors before any worker is started.

use crate::error::ImgExtractError;
use crate::pipeline::naming;
use std::path::PathBuf;
use tracing::{debug, info};

/// Where the document came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputSource {
    Local(PathBuf),
    Url(String),
}

/// A document loaded into memory.
#[derive(Debug)]
pub struct ResolvedInput {
    pub bytes: Vec<u8>,
    /// Slugged file stem, used for entry and archive names.
    pub base_name: String,
    pub source: InputSource,
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Resolve the input string to document bytes.
///
/// If the input is a URL, download it. If the input is a local file,
/// validate it exists and is readable.
pub async fn resolve_input(input: &str, timeout_secs: u64) -> Result<ResolvedInput, ImgExtractError> {
    if input.trim().is_empty() {
        return Err(ImgExtractError::InvalidInput {
            input: input.to_string(),
        });
    }
    if is_url(input) {
        download_url(input, timeout_secs).await
    } else {
        resolve_local(input).await
    }
}

async fn resolve_local(path_str: &str) -> Result<ResolvedInput, ImgExtractError> {
    let path = PathBuf::from(path_str);

    let bytes = match tokio::fs::read(&path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(ImgExtractError::PermissionDenied { path });
        }
        Err(_) => return Err(ImgExtractError::FileNotFound { path }),
    };

    debug!("Resolved local document: {} ({} bytes)", path.display(), bytes.len());
    Ok(ResolvedInput {
        bytes,
        base_name: naming::base_name_from_path(path_str),
        source: InputSource::Local(path),
    })
}

async fn download_url(url: &str, timeout_secs: u64) -> Result<ResolvedInput, ImgExtractError> {
    info!("Downloading document from: {}", url);

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| ImgExtractError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let map_send_err = |e: reqwest::Error| {
        if e.is_timeout() {
            ImgExtractError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            ImgExtractError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    };

    let response = client.get(url).send().await.map_err(map_send_err)?;

    if !response.status().is_success() {
        return Err(ImgExtractError::DownloadFailed {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    let bytes = response.bytes().await.map_err(map_send_err)?;
    info!("Downloaded {} bytes", bytes.len());

    Ok(ResolvedInput {
        bytes: bytes.to_vec(),
        base_name: naming::base_name_from_path(&filename_from_url(url)),
        source: InputSource::Url(url.to_string()),
    })
}

/// Last path segment of a URL, or `downloaded.pdf` when there is none.
pub fn filename_from_url(url: &str) -> String {
    if let Ok(parsed) = reqwest::Url::parse(url) {
        if let Some(mut segments) = parsed.path_segments() {
            if let Some(last) = segments.next_back() {
                if !last.is_empty() && last.contains('.') {
                    return last.to_string();
                }
            }
        }
    }

    "downloaded.pdf".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_url() {
        assert!(is_url("https://example.com/doc.pdf"));
        assert!(is_url("http://example.com/doc.pdf"));
        assert!(!is_url("/tmp/doc.pdf"));
        assert!(!is_url("doc.pdf"));
        assert!(!is_url(""));
    }

    #[test]
    fn test_filename_from_url() {
        assert_eq!(
            filename_from_url("https://example.com/files/Q3%20Report.pdf?x=1"),
            "Q3%20Report.pdf"
        );
        assert_eq!(filename_from_url("https://example.com/"), "downloaded.pdf");
        assert_eq!(filename_from_url("not a url"), "downloaded.pdf");
    }

    #[tokio::test]
    async fn missing_file_is_file_not_found() {
        let err = resolve_input("/definitely/not/here.pdf", 5).await.unwrap_err();
        assert!(matches!(err, ImgExtractError::FileNotFound { .. }));
    }

    #[tokio::test]
    async fn empty_input_is_invalid() {
        let err = resolve_input("   ", 5).await.unwrap_err();
        assert!(matches!(err, ImgExtractError::InvalidInput { .. }));
    }

    #[tokio::test]
    async fn local_file_is_read_with_base_name() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Field Notes.pdf");
        std::fs::write(&path, b"%PDF-1.7 fake").unwrap();

        let resolved = resolve_input(path.to_str().unwrap(), 5).await.unwrap();
        assert_eq!(resolved.bytes, b"%PDF-1.7 fake");
        assert_eq!(resolved.base_name, "field-notes");
        assert_eq!(resolved.source, InputSource::Local(path));
    }
}
