//! Recognition coordinator: a batch of images in, a lazy stream of text out.
//!
//! The OCR engine is stateful and not re-entrant, so images go through it
//! one at a time, in input order. The stream is lazy: nothing runs until it
//! is polled, and the next image is not started until the consumer has
//! taken the previous record. Inside a Tokio runtime the engine runs on the
//! blocking pool; any other executor runs it inline on the polling thread.
//!
//! If the engine could not be initialised the recogniser is *degraded*:
//! every request yields exactly one [`RecognizedText::sentinel`] record
//! instead of failing.

use crate::config::{validate_threshold, RecognitionConfig};
use crate::error::{ImgExtractError, ItemError};
use crate::output::RecognizedText;
use crate::pipeline::ocr::{TesseractEngine, TextEngine};
use chrono::Utc;
use futures::stream::{self, Stream, StreamExt};
use image::DynamicImage;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Finite, non-restartable stream of recognised text records.
pub type TextStream = Pin<Box<dyn Stream<Item = RecognizedText> + Send>>;

type SharedEngine = Arc<Mutex<Box<dyn TextEngine>>>;

/// An image plus the name its text will be attributed to.
#[derive(Debug, Clone)]
pub struct NamedImage {
    pub name: String,
    pub image: DynamicImage,
}

impl NamedImage {
    pub fn new(name: impl Into<String>, image: DynamicImage) -> Self {
        Self {
            name: name.into(),
            image,
        }
    }

    /// Decode `bytes` (any format the `image` crate was built with).
    pub fn from_bytes(name: impl Into<String>, bytes: &[u8]) -> Result<Self, ItemError> {
        let name = name.into();
        let image = image::load_from_memory(bytes).map_err(|e| ItemError::RecognitionFailed {
            name: name.clone(),
            detail: format!("cannot decode image: {}", e),
        })?;
        Ok(Self { name, image })
    }
}

/// Maps image batches to recognised text through one shared engine.
pub struct Recognizer {
    engine: Option<SharedEngine>,
    unavailable_reason: Option<String>,
}

impl Recognizer {
    pub fn new(engine: Box<dyn TextEngine>) -> Self {
        Self {
            engine: Some(Arc::new(Mutex::new(engine))),
            unavailable_reason: None,
        }
    }

    /// A recogniser with no engine; every request yields the sentinel.
    pub fn degraded(reason: impl Into<String>) -> Self {
        Self {
            engine: None,
            unavailable_reason: Some(reason.into()),
        }
    }

    /// Build a tesseract-backed recogniser, degrading if it cannot start.
    pub fn from_config(config: &RecognitionConfig) -> Self {
        match TesseractEngine::new(config) {
            Ok(engine) => Self::new(Box::new(engine)),
            Err(e) => {
                error!("Text recognition disabled: {}", e);
                Self::degraded(e.to_string())
            }
        }
    }

    pub fn is_available(&self) -> bool {
        self.engine.is_some()
    }

    /// Why the engine is missing, for a degraded recogniser.
    pub fn unavailable_reason(&self) -> Option<&str> {
        self.unavailable_reason.as_deref()
    }

    /// Recognise `images` lazily, keeping records with
    /// `confidence >= threshold` and non-blank text.
    ///
    /// # Errors
    /// [`ImgExtractError::InvalidConfig`] if `threshold` is outside `[0, 1]`.
    /// Per-image engine failures are logged and skipped, never returned.
    pub fn recognize(
        &self,
        images: Vec<NamedImage>,
        threshold: f32,
        cancel: &CancellationToken,
    ) -> Result<TextStream, ImgExtractError> {
        validate_threshold(threshold)?;

        let Some(engine) = self.engine.clone() else {
            warn!(
                "Recognition requested for {} images but no engine is configured",
                images.len()
            );
            return Ok(Box::pin(stream::once(async { RecognizedText::sentinel() })));
        };

        info!("Recognising {} images (threshold {:.2})", images.len(), threshold);
        let state = (engine, images.into_iter(), cancel.clone());

        let records = stream::unfold(state, move |(engine, mut images, cancel)| async move {
            loop {
                if cancel.is_cancelled() {
                    debug!("Recognition cancelled with {} images left", images.len());
                    return None;
                }
                let item = images.next()?;
                if let Some(record) = recognize_one(&engine, item, threshold).await {
                    return Some((record, (engine, images, cancel)));
                }
            }
        });

        Ok(Box::pin(records))
    }

    /// [`Recognizer::recognize`] collected into a `Vec`.
    pub async fn recognize_all(
        &self,
        images: Vec<NamedImage>,
        threshold: f32,
        cancel: &CancellationToken,
    ) -> Result<Vec<RecognizedText>, ImgExtractError> {
        Ok(self.recognize(images, threshold, cancel)?.collect().await)
    }
}

/// Run one image through the engine; `None` if it fails or is filtered out.
async fn recognize_one(
    engine: &SharedEngine,
    item: NamedImage,
    threshold: f32,
) -> Option<RecognizedText> {
    let engine = Arc::clone(engine);
    let NamedImage { name, image } = item;

    let run = move || {
        let mut engine = engine.lock().unwrap_or_else(PoisonError::into_inner);
        engine.process(&image)
    };
    let outcome = match tokio::runtime::Handle::try_current() {
        Ok(handle) => handle.spawn_blocking(run).await,
        Err(_) => Ok(run()),
    };

    let output = match outcome {
        Ok(Ok(output)) => output,
        Ok(Err(e)) => {
            let e = ItemError::RecognitionFailed {
                name,
                detail: e.to_string(),
            };
            warn!("{}", e);
            return None;
        }
        Err(e) => {
            warn!("Recognition worker for '{}' died: {}", name, e);
            return None;
        }
    };

    let confidence = if output.mean_confidence.is_nan() {
        0.0
    } else {
        output.mean_confidence.clamp(0.0, 1.0)
    };
    let text = output.text.trim();
    if text.is_empty() {
        debug!("'{}': no text found", name);
        return None;
    }
    if confidence < threshold {
        debug!(
            "'{}': confidence {:.2} below threshold {:.2}",
            name, confidence, threshold
        );
        return None;
    }

    Some(RecognizedText {
        text: text.to_string(),
        source_name: name,
        confidence,
        issued_at: Utc::now(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::ocr::{EngineError, EngineOutput};

    struct Fixed(f32);

    impl TextEngine for Fixed {
        fn process(&mut self, _image: &DynamicImage) -> Result<EngineOutput, EngineError> {
            Ok(EngineOutput {
                text: " hello ".into(),
                mean_confidence: self.0,
            })
        }
    }

    fn blank(name: &str) -> NamedImage {
        NamedImage::new(name, DynamicImage::new_rgba8(4, 4))
    }

    #[tokio::test]
    async fn threshold_out_of_range_is_rejected() {
        let r = Recognizer::new(Box::new(Fixed(0.9)));
        let cancel = CancellationToken::new();
        assert!(matches!(
            r.recognize(vec![], 1.5, &cancel),
            Err(ImgExtractError::InvalidConfig(_))
        ));
        assert!(r.recognize(vec![], f32::NAN, &cancel).is_err());
    }

    #[tokio::test]
    async fn text_is_trimmed_and_attributed() {
        let r = Recognizer::new(Box::new(Fixed(0.9)));
        let out = r
            .recognize_all(vec![blank("scan-1")], 0.5, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].text, "hello");
        assert_eq!(out[0].source_name, "scan-1");
    }

    #[tokio::test]
    async fn out_of_range_engine_confidence_is_clamped() {
        let r = Recognizer::new(Box::new(Fixed(1.7)));
        let out = r
            .recognize_all(vec![blank("a")], 1.0, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(out[0].confidence, 1.0);
    }

    #[test]
    fn from_bytes_rejects_garbage() {
        let err = NamedImage::from_bytes("x.png", b"nope").unwrap_err();
        assert!(matches!(err, ItemError::RecognitionFailed { .. }));
    }

    #[test]
    fn degraded_reports_reason() {
        let r = Recognizer::degraded("tessdata missing");
        assert!(!r.is_available());
        assert_eq!(r.unavailable_reason(), Some("tessdata missing"));
    }

    #[test]
    fn stream_runs_without_a_tokio_runtime() {
        let r = Recognizer::new(Box::new(Fixed(0.9)));
        let cancel = CancellationToken::new();
        let stream = r
            .recognize(vec![blank("a"), blank("b")], 0.5, &cancel)
            .unwrap();

        let out: Vec<_> = futures::executor::block_on(stream.collect());
        let sources: Vec<_> = out.iter().map(|t| t.source_name.as_str()).collect();
        assert_eq!(sources, vec!["a", "b"]);
    }

    #[test]
    fn nothing_runs_until_the_stream_is_polled() {
        struct Counting(Arc<std::sync::atomic::AtomicUsize>);
        impl TextEngine for Counting {
            fn process(&mut self, _image: &DynamicImage) -> Result<EngineOutput, EngineError> {
                self.0.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                Ok(EngineOutput {
                    text: "x".into(),
                    mean_confidence: 1.0,
                })
            }
        }

        let calls = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let r = Recognizer::new(Box::new(Counting(calls.clone())));
        let stream = r
            .recognize(vec![blank("a")], 0.5, &CancellationToken::new())
            .unwrap();
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 0);
        drop(stream);
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 0);
    }
}
