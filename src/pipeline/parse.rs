//! Document parsing: walk a document and yield its embedded raster images.
//!
//! ## Why a push-style sink?
//!
//! Parsers like pdfium hand out objects that borrow the loaded document, so
//! they cannot be returned as an owning iterator across a thread boundary.
//! The parser instead pushes each image into a caller-supplied sink as soon
//! as it is found. The sink answers with [`ControlFlow`] so the caller can
//! stop the walk early (cancellation, receiver gone) without the parser
//! reading the rest of the document.
//!
//! ## Why spawn_blocking?
//!
//! pdfium is a C++ library with thread-local state and CPU-heavy decoding.
//! The extractor always calls [`DocumentParser::parse`] from
//! `tokio::task::spawn_blocking` so Tokio worker threads never stall.

use crate::error::{ImgExtractError, ItemError};
use crate::pipeline::encode;
use image::ImageFormat;
use pdfium_render::prelude::*;
use std::io::Cursor;
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// One embedded image stream as produced by a parser.
#[derive(Debug)]
pub struct RawImage {
    /// 0-based position of the image in the document.
    pub index: usize,
    pub format: ImageFormat,
    /// Encoded image bytes. May be handed over at any position.
    pub stream: Cursor<Vec<u8>>,
}

impl RawImage {
    pub fn new(index: usize, format: ImageFormat, bytes: Vec<u8>) -> Self {
        Self {
            index,
            format,
            stream: Cursor::new(bytes),
        }
    }
}

/// Sink receiving each image (or per-image failure) in document order.
pub type ImageSink<'a> = dyn FnMut(Result<RawImage, ItemError>) -> ControlFlow<()> + 'a;

/// A document container parser.
///
/// Implementations are called on a blocking thread and must be shareable
/// across concurrent requests. A walk is finite and cannot be restarted.
pub trait DocumentParser: Send + Sync {
    /// Walk `document` and push every embedded image into `sink`.
    ///
    /// Returns `Err` only when the document as a whole cannot be read; a
    /// single unreadable image is reported through the sink as an
    /// [`ItemError`] and the walk continues.
    fn parse(&self, document: &[u8], sink: &mut ImageSink<'_>) -> Result<(), ImgExtractError>;
}

// ── pdfium adapter ───────────────────────────────────────────────────────

/// [`DocumentParser`] backed by pdfium.
///
/// Every image object on every page is decoded with `get_raw_image()` and
/// re-encoded as PNG, so downstream stages see a uniform format.
#[derive(Debug, Clone, Default)]
pub struct PdfiumParser {
    library_path: Option<PathBuf>,
    password: Option<String>,
}

impl PdfiumParser {
    pub fn new(library_path: Option<PathBuf>, password: Option<String>) -> Self {
        Self {
            library_path,
            password,
        }
    }

    /// Bind to libpdfium: configured path, then `PDFIUM_LIB_PATH`, then the
    /// system library.
    pub fn bind(&self) -> Result<Pdfium, ImgExtractError> {
        let explicit = self
            .library_path
            .clone()
            .or_else(|| std::env::var_os("PDFIUM_LIB_PATH").map(PathBuf::from));

        let bindings = match explicit {
            Some(path) => {
                let lib = library_file(&path);
                debug!("Binding to pdfium at {}", lib.display());
                Pdfium::bind_to_library(&lib)
            }
            None => Pdfium::bind_to_system_library(),
        }
        .map_err(|e| ImgExtractError::ParserUnavailable(format!("{:?}", e)))?;

        Ok(Pdfium::new(bindings))
    }
}

/// Resolve a directory to the platform library file inside it.
fn library_file(path: &Path) -> PathBuf {
    if path.is_dir() {
        Pdfium::pdfium_platform_library_name_at_path(path)
    } else {
        path.to_path_buf()
    }
}

impl DocumentParser for PdfiumParser {
    fn parse(&self, document: &[u8], sink: &mut ImageSink<'_>) -> Result<(), ImgExtractError> {
        let pdfium = self.bind()?;
        let password = self.password.as_deref();

        let doc = pdfium
            .load_pdf_from_byte_slice(document, password)
            .map_err(|e| {
                let err_str = format!("{:?}", e);
                if err_str.contains("Password") || err_str.contains("password") {
                    if password.is_some() {
                        ImgExtractError::WrongPassword
                    } else {
                        ImgExtractError::PasswordRequired
                    }
                } else {
                    ImgExtractError::CorruptDocument { detail: err_str }
                }
            })?;

        let pages = doc.pages();
        info!("Document loaded: {} pages", pages.len());

        let mut index = 0usize;
        for (page_idx, page) in pages.iter().enumerate() {
            for object in page.objects().iter() {
                let Some(image_object) = object.as_image_object() else {
                    continue;
                };

                let item = image_object
                    .get_raw_image()
                    .map_err(|e| ItemError::DecodeFailed {
                        index,
                        detail: format!("{:?}", e),
                    })
                    .and_then(|img| {
                        encode::encode_png(&img).map_err(|e| ItemError::EncodeFailed {
                            index,
                            detail: e.to_string(),
                        })
                    })
                    .map(|png| RawImage::new(index, ImageFormat::Png, png));

                match &item {
                    Ok(raw) => debug!(
                        "Page {}: image {} ({} bytes)",
                        page_idx + 1,
                        index,
                        raw.stream.get_ref().len()
                    ),
                    Err(e) => warn!("Page {}: {}", page_idx + 1, e),
                }

                index += 1;
                if sink(item).is_break() {
                    debug!("Parse stopped by consumer after {} images", index);
                    return Ok(());
                }
            }
        }

        info!("Parse complete: {} images found", index);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct TwoImages;

    impl DocumentParser for TwoImages {
        fn parse(&self, _doc: &[u8], sink: &mut ImageSink<'_>) -> Result<(), ImgExtractError> {
            for i in 0..2 {
                if sink(Ok(RawImage::new(i, ImageFormat::Png, vec![i as u8])))
                    .is_break()
                {
                    break;
                }
            }
            Ok(())
        }
    }

    #[test]
    fn sink_break_stops_the_walk() {
        let mut seen = Vec::new();
        TwoImages
            .parse(b"", &mut |item| {
                seen.push(item.unwrap().index);
                ControlFlow::Break(())
            })
            .unwrap();
        assert_eq!(seen, vec![0]);
    }

    #[test]
    fn library_file_keeps_explicit_file_paths() {
        let p = PathBuf::from("/opt/pdfium/libpdfium.so");
        assert_eq!(library_file(&p), p);
    }

    #[test]
    fn missing_library_is_parser_unavailable() {
        let parser = PdfiumParser::new(Some(PathBuf::from("/nonexistent/libpdfium.so")), None);
        let err = parser.parse(b"%PDF-1.4", &mut |_| ControlFlow::Continue(())).unwrap_err();
        assert!(matches!(err, ImgExtractError::ParserUnavailable(_)));
    }
}
