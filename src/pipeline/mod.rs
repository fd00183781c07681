//! Pipeline stages and external collaborators.
//!
//! Each submodule implements one step or one seam. The coordinators in
//! [`crate::extract`], [`crate::archive`] and [`crate::recognize`] drive
//! them; none of these modules knows about concurrency or cancellation.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ parse ──▶ canvas ──▶ (extract) ──▶ (archive)
//! (URL/path) (pdfium) (resize)   naming        zip
//!
//! images ──▶ ocr ──▶ (recognize)
//!           (tesseract)
//! ```
//!
//! 1. [`input`]  — load the user-supplied path or URL into memory
//! 2. [`parse`]  — walk the document and push each embedded image to a sink;
//!    always called from `spawn_blocking` because pdfium is not async-safe
//! 3. [`canvas`] — optional letterbox/stretch onto a fixed transparent canvas
//! 4. [`encode`] — PNG encoding and base64/data-URI helpers
//! 5. [`naming`] — slug the document name and derive entry names
//! 6. [`ocr`]    — the text-recognition engine seam and its tesseract adapter

pub mod canvas;
pub mod encode;
pub mod input;
pub mod naming;
pub mod ocr;
pub mod parse;
