use anyhow::{Context, Result};
use std::path::Path;
use std::process::Command;

/// Text extraction from a saved screenshot.
pub trait Ocr: Send + Sync {
    fn recognize(&self, image: &Path, language: &str) -> Result<String>;
}

/// Shells out to the tesseract CLI. Output goes to stdout so no sidecar
/// files are created next to the screenshot.
pub struct TesseractOcr;

impl Ocr for TesseractOcr {
    fn recognize(&self, image: &Path, language: &str) -> Result<String> {
        let output = Command::new("tesseract")
            .arg(image)
            .arg("stdout")
            .arg("-l")
            .arg(language)
            .output()
            .context("Failed to run tesseract; is it installed?")?;

        if !output.status.success() {
            anyhow::bail!(
                "tesseract exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}
