//! Text recognition engines.
//!
//! [`TextEngine`] is the seam between the recognition coordinator and the
//! actual OCR implementation. The shipped [`TesseractEngine`] drives the
//! `tesseract` command-line tool and parses its TSV output, which carries
//! per-word confidences that the plain-text output does not.

use crate::config::RecognitionConfig;
use image::DynamicImage;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;
use thiserror::Error;
use tracing::{debug, info};

/// Text and mean confidence for one image.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineOutput {
    pub text: String,
    /// Mean word confidence in `[0, 1]`.
    pub mean_confidence: f32,
}

#[derive(Debug, Error)]
pub enum EngineError {
    /// The engine cannot run in this environment (binary or models missing).
    #[error("OCR engine unavailable: {0}")]
    Unavailable(String),

    #[error("OCR I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The engine ran but failed on this image.
    #[error("OCR failed: {0}")]
    Failed(String),
}

/// A stateful OCR engine. Never called concurrently.
pub trait TextEngine: Send {
    fn process(&mut self, image: &DynamicImage) -> Result<EngineOutput, EngineError>;
}

// ── Tesseract ────────────────────────────────────────────────────────────

/// [`TextEngine`] backed by the `tesseract` CLI.
pub struct TesseractEngine {
    binary: PathBuf,
    tessdata_dir: PathBuf,
    languages: String,
    page_seg_mode: u8,
    scratch: TempDir,
    processed: usize,
}

impl TesseractEngine {
    /// Check the model directory and binary, then prepare a scratch dir.
    pub fn new(config: &RecognitionConfig) -> Result<Self, EngineError> {
        if !config.tessdata_dir.is_dir() {
            return Err(EngineError::Unavailable(format!(
                "tessdata directory not found: {}",
                config.tessdata_dir.display()
            )));
        }

        let version = Command::new(&config.tesseract_binary)
            .arg("--version")
            .output()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => EngineError::Unavailable(format!(
                    "{} not found (install tesseract-ocr)",
                    config.tesseract_binary.display()
                )),
                _ => EngineError::Io(e),
            })?;
        if !version.status.success() {
            return Err(EngineError::Unavailable(format!(
                "{} --version exited with {}",
                config.tesseract_binary.display(),
                version.status
            )));
        }
        let banner = String::from_utf8_lossy(&version.stdout);
        info!(
            "Tesseract ready: {} (languages: {})",
            banner.lines().next().unwrap_or("unknown version"),
            config.languages
        );

        Ok(Self {
            binary: config.tesseract_binary.clone(),
            tessdata_dir: config.tessdata_dir.clone(),
            languages: config.languages.clone(),
            page_seg_mode: config.page_seg_mode,
            scratch: TempDir::new()?,
            processed: 0,
        })
    }

    fn run(&self, image_path: &Path) -> Result<String, EngineError> {
        let output = Command::new(&self.binary)
            .arg(image_path)
            .arg("stdout")
            .arg("--tessdata-dir")
            .arg(&self.tessdata_dir)
            .args(["-l", &self.languages])
            .args(["--psm", &self.page_seg_mode.to_string()])
            .arg("tsv")
            .output()?;

        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).into_owned())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(EngineError::Failed(format!("tesseract failed: {}", stderr.trim())))
        }
    }
}

impl TextEngine for TesseractEngine {
    fn process(&mut self, image: &DynamicImage) -> Result<EngineOutput, EngineError> {
        let path = self.scratch.path().join(format!("input-{}.png", self.processed));
        self.processed += 1;

        image
            .save_with_format(&path, image::ImageFormat::Png)
            .map_err(|e| EngineError::Failed(format!("cannot write scratch image: {}", e)))?;

        let result = self.run(&path).map(|tsv| parse_tsv(&tsv));
        // The TempDir only cleans up when the engine is dropped.
        if let Err(e) = std::fs::remove_file(&path) {
            debug!("Could not remove scratch image {}: {}", path.display(), e);
        }

        let out = result?;
        debug!(
            "Recognised {} chars at confidence {:.2}",
            out.text.len(),
            out.mean_confidence
        );
        Ok(out)
    }
}

/// Rebuild text and mean confidence from tesseract's TSV output.
///
/// Only level-5 (word) rows with a non-negative confidence count. Words are
/// joined by spaces within a line and lines by `\n`.
pub fn parse_tsv(tsv: &str) -> EngineOutput {
    let mut lines: Vec<String> = Vec::new();
    let mut current_line: Option<(u32, u32, u32, u32)> = None;
    let mut conf_sum = 0.0f64;
    let mut words = 0usize;

    for row in tsv.lines().skip(1) {
        let cols: Vec<&str> = row.split('\t').collect();
        if cols.len() < 12 || cols[0] != "5" {
            continue;
        }
        let Ok(conf) = cols[10].trim().parse::<f64>() else {
            continue;
        };
        let word = cols[11].trim();
        if conf < 0.0 || word.is_empty() {
            continue;
        }

        let key = (
            cols[1].parse().unwrap_or(0),
            cols[2].parse().unwrap_or(0),
            cols[3].parse().unwrap_or(0),
            cols[4].parse().unwrap_or(0),
        );
        match lines.last_mut() {
            Some(line) if current_line == Some(key) => {
                line.push(' ');
                line.push_str(word);
            }
            _ => {
                lines.push(word.to_string());
                current_line = Some(key);
            }
        }

        conf_sum += conf;
        words += 1;
    }

    let mean_confidence = if words == 0 {
        0.0
    } else {
        ((conf_sum / words as f64) / 100.0).clamp(0.0, 1.0) as f32
    };

    EngineOutput {
        text: lines.join("\n"),
        mean_confidence,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str =
        "level\tpage_num\tblock_num\tpar_num\tline_num\tword_num\tleft\ttop\twidth\theight\tconf\ttext";

    fn tsv(rows: &[&str]) -> String {
        let mut s = String::from(HEADER);
        for r in rows {
            s.push('\n');
            s.push_str(r);
        }
        s
    }

    #[test]
    fn words_are_grouped_into_lines() {
        let out = parse_tsv(&tsv(&[
            "1\t1\t0\t0\t0\t0\t0\t0\t100\t100\t-1\t",
            "5\t1\t1\t1\t1\t1\t0\t0\t10\t10\t90\tHello",
            "5\t1\t1\t1\t1\t2\t0\t0\t10\t10\t80\tworld",
            "5\t1\t1\t1\t2\t1\t0\t0\t10\t10\t70\tBye",
        ]));
        assert_eq!(out.text, "Hello world\nBye");
        assert!((out.mean_confidence - 0.8).abs() < 1e-6);
    }

    #[test]
    fn empty_output_has_zero_confidence() {
        let out = parse_tsv(HEADER);
        assert!(out.text.is_empty());
        assert_eq!(out.mean_confidence, 0.0);
    }

    #[test]
    fn blank_words_and_negative_conf_are_ignored() {
        let out = parse_tsv(&tsv(&[
            "5\t1\t1\t1\t1\t1\t0\t0\t10\t10\t-1\tghost",
            "5\t1\t1\t1\t1\t2\t0\t0\t10\t10\t95\t ",
            "5\t1\t1\t1\t1\t3\t0\t0\t10\t10\t60\tok",
        ]));
        assert_eq!(out.text, "ok");
        assert!((out.mean_confidence - 0.6).abs() < 1e-6);
    }

    #[test]
    fn missing_tessdata_is_unavailable() {
        let config = RecognitionConfig {
            tessdata_dir: PathBuf::from("/nonexistent/tessdata"),
            ..RecognitionConfig::default()
        };
        assert!(matches!(
            TesseractEngine::new(&config),
            Err(EngineError::Unavailable(_))
        ));
    }

    #[test]
    fn missing_binary_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let config = RecognitionConfig {
            tessdata_dir: dir.path().to_path_buf(),
            tesseract_binary: PathBuf::from("/nonexistent/bin/tesseract"),
            ..RecognitionConfig::default()
        };
        assert!(matches!(
            TesseractEngine::new(&config),
            Err(EngineError::Unavailable(_))
        ));
    }

    #[test]
    fn scratch_image_is_removed_after_a_failed_run() {
        let tessdata = tempfile::tempdir().unwrap();
        let mut engine = TesseractEngine {
            binary: PathBuf::from("/nonexistent/bin/tesseract"),
            tessdata_dir: tessdata.path().to_path_buf(),
            languages: "eng".into(),
            page_seg_mode: 1,
            scratch: TempDir::new().unwrap(),
            processed: 0,
        };

        let err = engine.process(&DynamicImage::new_rgba8(4, 4)).unwrap_err();
        assert!(matches!(err, EngineError::Io(_)));
        assert_eq!(engine.processed, 1);
        let left = std::fs::read_dir(engine.scratch.path()).unwrap().count();
        assert_eq!(left, 0, "scratch image was left behind");
    }
}
