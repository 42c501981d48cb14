pub mod grabber;
pub mod ocr;

use chrono::Local;
use image::RgbaImage;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::CaptureConfig;
use crate::transcript::{Category, TranscriptStore};

pub use grabber::{ScreenGrabber, SystemGrabber};
pub use ocr::{Ocr, TesseractOcr};

#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("No secondary display available")]
    NoSecondaryDisplay,
    #[error("Screen grab failed: {0}")]
    Grab(String),
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
    #[error("Filesystem error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

/// Grabs pixels, enhances them for text legibility, writes a timestamped
/// PNG, and feeds OCR output into the transcript store. OCR failures are
/// recovered; only the grab itself can fail the operation.
pub struct CaptureCoordinator {
    grabber: Box<dyn ScreenGrabber>,
    ocr: Box<dyn Ocr>,
    store: Arc<TranscriptStore>,
    screenshots_dir: PathBuf,
    config: CaptureConfig,
}

impl CaptureCoordinator {
    pub fn new(
        grabber: Box<dyn ScreenGrabber>,
        ocr: Box<dyn Ocr>,
        store: Arc<TranscriptStore>,
        screenshots_dir: PathBuf,
        config: CaptureConfig,
    ) -> Self {
        Self {
            grabber,
            ocr,
            store,
            screenshots_dir,
            config,
        }
    }

    /// Capture the secondary display. Returns the saved PNG path.
    pub fn capture_display(&self) -> Result<PathBuf, CaptureError> {
        let image = self.grabber.grab_secondary_display()?;
        self.process(image, "monitor2", self.config.display_contrast)
    }

    /// Capture an arbitrary screen region. Regions get a stronger contrast
    /// boost because snips tend to be small UI text.
    pub fn capture_region(&self, region: Region) -> Result<PathBuf, CaptureError> {
        let image = self.grabber.grab_region(region)?;
        self.process(image, "snip", self.config.region_contrast)
    }

    fn process(&self, image: RgbaImage, label: &str, contrast: f32) -> Result<PathBuf, CaptureError> {
        let adjusted = adjust_contrast_brightness(&image, contrast, self.config.brightness);

        std::fs::create_dir_all(&self.screenshots_dir)?;
        let timestamp = Local::now().format("%Y%m%d_%H%M%S");
        let path = self
            .screenshots_dir
            .join(format!("screenshot_{label}_{timestamp}.png"));
        adjusted.save(&path)?;
        info!("Screenshot saved to {:?}", path);

        match self.ocr.recognize(&path, &self.config.ocr_language) {
            Ok(text) => {
                if self.store.append(Category::Ocr, &text) {
                    info!("OCR text added to transcript ({} chars)", text.trim().len());
                } else {
                    info!("OCR produced no text");
                }
            }
            Err(e) => warn!("OCR failed, screenshot kept without text: {}", e),
        }
        Ok(path)
    }
}

/// Per-channel linear adjustment. With contrast c and brightness b each
/// channel v in [0,1] maps to c*v + (b + 0.5*(1-c)), clamped; alpha is
/// left alone.
pub fn adjust_contrast_brightness(image: &RgbaImage, contrast: f32, brightness: f32) -> RgbaImage {
    let offset = brightness + 0.5 * (1.0 - contrast);
    let mut out = image.clone();
    for pixel in out.pixels_mut() {
        for channel in 0..3 {
            let v = pixel.0[channel] as f32 / 255.0;
            let adjusted = (contrast * v + offset).clamp(0.0, 1.0);
            pixel.0[channel] = (adjusted * 255.0).round() as u8;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CaptureConfig;
    use image::Rgba;
    use std::path::Path;
    use std::sync::Mutex;

    fn path_file_name(path: &Path) -> &str {
        path.file_name().and_then(|n| n.to_str()).unwrap()
    }

    struct FakeGrabber {
        result: Mutex<Option<Result<RgbaImage, CaptureError>>>,
    }

    impl FakeGrabber {
        fn returning(result: Result<RgbaImage, CaptureError>) -> Box<Self> {
            Box::new(Self {
                result: Mutex::new(Some(result)),
            })
        }
    }

    impl ScreenGrabber for FakeGrabber {
        fn grab_secondary_display(&self) -> Result<RgbaImage, CaptureError> {
            self.result.lock().unwrap().take().unwrap()
        }

        fn grab_region(&self, _region: Region) -> Result<RgbaImage, CaptureError> {
            self.result.lock().unwrap().take().unwrap()
        }
    }

    struct FakeOcr {
        text: Result<String, String>,
    }

    impl Ocr for FakeOcr {
        fn recognize(&self, _image: &Path, _language: &str) -> anyhow::Result<String> {
            self.text.clone().map_err(|e| anyhow::anyhow!(e))
        }
    }

    fn test_image() -> RgbaImage {
        RgbaImage::from_pixel(4, 4, Rgba([128, 64, 200, 255]))
    }

    fn coordinator(
        grabber: Box<dyn ScreenGrabber>,
        ocr_text: Result<String, String>,
        dir: &Path,
    ) -> (CaptureCoordinator, Arc<TranscriptStore>) {
        let store = Arc::new(TranscriptStore::new());
        let coordinator = CaptureCoordinator::new(
            grabber,
            Box::new(FakeOcr { text: ocr_text }),
            Arc::clone(&store),
            dir.to_path_buf(),
            CaptureConfig::default(),
        );
        (coordinator, store)
    }

    #[test]
    fn test_identity_transform_leaves_pixels_alone() {
        let image = test_image();
        let out = adjust_contrast_brightness(&image, 1.0, 0.0);
        assert_eq!(out.get_pixel(0, 0), image.get_pixel(0, 0));
    }

    #[test]
    fn test_transform_applies_contrast_formula() {
        let image = RgbaImage::from_pixel(1, 1, Rgba([128, 0, 255, 200]));
        let out = adjust_contrast_brightness(&image, 2.0, 0.5);
        let pixel = out.get_pixel(0, 0);
        // v=128/255: 2*0.502 + (0.5 - 0.5) = 1.004 -> clamps to 255.
        assert_eq!(pixel.0[0], 255);
        // v=0: 0 + 0 = 0.
        assert_eq!(pixel.0[1], 0);
        assert_eq!(pixel.0[2], 255);
        // Alpha untouched.
        assert_eq!(pixel.0[3], 200);
    }

    #[test]
    fn test_capture_appends_trimmed_ocr_text() {
        let dir = tempfile::tempdir().unwrap();
        let (coordinator, store) = coordinator(
            FakeGrabber::returning(Ok(test_image())),
            Ok("  recognized text  \n".to_string()),
            dir.path(),
        );

        let path = coordinator.capture_display().unwrap();
        assert!(path.exists());
        assert!(path_file_name(&path).starts_with("screenshot_monitor2_"));
        assert_eq!(store.aggregate(), "recognized text");
    }

    #[test]
    fn test_region_capture_uses_snip_label() {
        let dir = tempfile::tempdir().unwrap();
        let (coordinator, _store) = coordinator(
            FakeGrabber::returning(Ok(test_image())),
            Ok("snip".to_string()),
            dir.path(),
        );

        let region = Region { x: 0, y: 0, width: 4, height: 4 };
        let path = coordinator.capture_region(region).unwrap();
        assert!(path_file_name(&path).starts_with("screenshot_snip_"));
    }

    #[test]
    fn test_ocr_failure_is_recovered() {
        let dir = tempfile::tempdir().unwrap();
        let (coordinator, store) = coordinator(
            FakeGrabber::returning(Ok(test_image())),
            Err("tesseract not installed".to_string()),
            dir.path(),
        );

        // Screenshot still succeeds; nothing lands in the store.
        let path = coordinator.capture_display().unwrap();
        assert!(path.exists());
        assert!(store.is_empty());
    }

    #[test]
    fn test_empty_ocr_output_appends_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let (coordinator, store) = coordinator(
            FakeGrabber::returning(Ok(test_image())),
            Ok("   ".to_string()),
            dir.path(),
        );

        coordinator.capture_display().unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn test_missing_display_propagates() {
        let dir = tempfile::tempdir().unwrap();
        let (coordinator, store) = coordinator(
            FakeGrabber::returning(Err(CaptureError::NoSecondaryDisplay)),
            Ok("unused".to_string()),
            dir.path(),
        );

        let result = coordinator.capture_display();
        assert!(matches!(result, Err(CaptureError::NoSecondaryDisplay)));
        assert!(store.is_empty());
    }
}
