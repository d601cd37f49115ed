use std::path::{Path, PathBuf};

use image::GrayImage;
use tempfile::NamedTempFile;
use tokio::process::Command;

use crate::error::SheetError;

/// Characters that can legitimately appear on a result sheet.
const CHAR_WHITELIST: &str =
    "ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+-/|. ";

/// Tesseract "single uniform block of text", which keeps table rows intact.
const PAGE_SEG_MODE: &str = "6";

/// Something that can turn a normalized sheet bitmap into raw text.
pub trait Recognizer {
    async fn recognize(&self, image: &GrayImage) -> Result<String, SheetError>;
}

#[derive(Debug, Clone)]
pub struct TesseractRecognizer {
    executable: PathBuf,
    language: String,
}

impl TesseractRecognizer {
    pub fn new(executable: impl Into<PathBuf>, language: impl Into<String>) -> Self {
        Self {
            executable: executable.into(),
            language: language.into(),
        }
    }

    fn args(&self, input: &Path) -> Vec<String> {
        vec![
            input.to_string_lossy().to_string(),
            "stdout".to_string(),
            "-l".to_string(),
            self.language.clone(),
            "--psm".to_string(),
            PAGE_SEG_MODE.to_string(),
            "-c".to_string(),
            "preserve_interword_spaces=1".to_string(),
            "-c".to_string(),
            format!("tessedit_char_whitelist={CHAR_WHITELIST}"),
        ]
    }
}

impl Recognizer for TesseractRecognizer {
    async fn recognize(&self, image: &GrayImage) -> Result<String, SheetError> {
        let input = NamedTempFile::with_suffix(".png")
            .map_err(|e| SheetError::Recognition(format!("failed to create temp file: {e}")))?;
        write_input(image, input.path())?;

        tracing::info!(
            "Running OCR on {}x{} sheet with {}",
            image.width(),
            image.height(),
            self.executable.display()
        );

        let output = Command::new(&self.executable)
            .args(self.args(input.path()))
            .output()
            .await
            .map_err(|e| {
                SheetError::Recognition(format!(
                    "failed to run {}: {e}",
                    self.executable.display()
                ))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(SheetError::Recognition(stderr.trim().to_string()));
        }

        let text = String::from_utf8(output.stdout)
            .map_err(|e| SheetError::Recognition(format!("non UTF-8 OCR output: {e}")))?;
        tracing::info!("OCR produced {} lines", text.lines().count());

        Ok(text)
    }
}

/// Saves the bitmap the engine reads. Failure here is an OCR-side problem, not
/// a bad upload.
fn write_input(image: &GrayImage, path: &Path) -> Result<(), SheetError> {
    image.save(path).map_err(|e| {
        SheetError::Recognition(format!("failed to write OCR input {}: {e}", path.display()))
    })
}
