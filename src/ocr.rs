//! Text extraction engine for images.
//!
//! The [`TextExtractor`] trait returns the recognized text as an ordered
//! sequence of lines. The default implementation shells out to the
//! `tesseract` CLI; orientation correction maps to automatic page
//! segmentation (`--psm 1`).

use async_trait::async_trait;
use std::path::Path;
use tokio::process::Command;

use crate::config::OcrConfig;

/// Extraction error. The image answerer converts these to user-visible
/// answer strings; they never propagate as a crash.
#[derive(Debug)]
pub enum OcrError {
    EngineUnavailable(String),
    Failed(String),
}

impl std::fmt::Display for OcrError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OcrError::EngineUnavailable(e) => write!(f, "OCR engine unavailable: {}", e),
            OcrError::Failed(e) => write!(f, "OCR failed: {}", e),
        }
    }
}

impl std::error::Error for OcrError {}

/// Extracts recognized text lines from an image, in reading order.
#[async_trait]
pub trait TextExtractor: Send + Sync {
    async fn extract(&self, image_path: &Path) -> Result<Vec<String>, OcrError>;
}

/// [`TextExtractor`] backed by the tesseract command-line binary.
pub struct TesseractExtractor {
    command: String,
    lang: String,
    orientation_correction: bool,
}

impl TesseractExtractor {
    pub fn new(config: &OcrConfig) -> Self {
        Self {
            command: config.command.clone(),
            lang: config.lang.clone(),
            orientation_correction: config.orientation_correction,
        }
    }
}

#[async_trait]
impl TextExtractor for TesseractExtractor {
    async fn extract(&self, image_path: &Path) -> Result<Vec<String>, OcrError> {
        let mut cmd = Command::new(&self.command);
        cmd.arg(image_path).arg("stdout").args(["-l", &self.lang]);
        if self.orientation_correction {
            cmd.args(["--psm", "1"]);
        }

        let output = cmd
            .output()
            .await
            .map_err(|e| OcrError::EngineUnavailable(format!("{}: {}", self.command, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(OcrError::Failed(stderr.trim().to_string()));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(split_lines(&stdout))
    }
}

/// Split engine output into non-empty trimmed lines, order preserved.
fn split_lines(raw: &str) -> Vec<String> {
    raw.lines()
        .map(|l| l.trim())
        .filter(|l| !l.is_empty())
        .map(|l| l.to_string())
        .collect()
}
