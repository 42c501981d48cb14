use image::RgbaImage;
use std::path::PathBuf;
use std::process::Command;

use super::{CaptureError, Region};

/// Raw pixel acquisition. Implementations shell out to the platform
/// screenshot tool; tests swap in fakes.
pub trait ScreenGrabber: Send + Sync {
    fn grab_secondary_display(&self) -> Result<RgbaImage, CaptureError>;
    fn grab_region(&self, region: Region) -> Result<RgbaImage, CaptureError>;
}

/// Platform screenshot tool wrapper. Captures to a scratch PNG and loads
/// it back, leaving the saved-artifact naming to the coordinator.
pub struct SystemGrabber;

impl SystemGrabber {
    fn scratch_path() -> PathBuf {
        std::env::temp_dir().join(format!("promptdeck_grab_{}.png", std::process::id()))
    }

    fn load_and_remove(path: &PathBuf) -> Result<RgbaImage, CaptureError> {
        let image = image::open(path)?.to_rgba8();
        let _ = std::fs::remove_file(path);
        Ok(image)
    }
}

#[cfg(target_os = "macos")]
impl ScreenGrabber for SystemGrabber {
    fn grab_secondary_display(&self) -> Result<RgbaImage, CaptureError> {
        let path = Self::scratch_path();
        let status = Command::new("screencapture")
            .args(["-x", "-t", "png", "-D", "2"])
            .arg(&path)
            .status()
            .map_err(|e| CaptureError::Grab(e.to_string()))?;
        if !status.success() || !path.exists() {
            return Err(CaptureError::NoSecondaryDisplay);
        }
        Self::load_and_remove(&path)
    }

    fn grab_region(&self, region: Region) -> Result<RgbaImage, CaptureError> {
        let path = Self::scratch_path();
        let rect = format!("{},{},{},{}", region.x, region.y, region.width, region.height);
        let status = Command::new("screencapture")
            .args(["-x", "-t", "png", "-R", &rect])
            .arg(&path)
            .status()
            .map_err(|e| CaptureError::Grab(e.to_string()))?;
        if !status.success() || !path.exists() {
            return Err(CaptureError::Grab(format!(
                "screencapture failed for region {rect}"
            )));
        }
        Self::load_and_remove(&path)
    }
}

#[cfg(not(target_os = "macos"))]
impl ScreenGrabber for SystemGrabber {
    fn grab_secondary_display(&self) -> Result<RgbaImage, CaptureError> {
        let output = secondary_output_name()?;
        let path = Self::scratch_path();
        let status = Command::new("grim")
            .args(["-o", &output])
            .arg(&path)
            .status()
            .map_err(|e| CaptureError::Grab(e.to_string()))?;
        if !status.success() || !path.exists() {
            return Err(CaptureError::Grab(format!("grim failed for output {output}")));
        }
        Self::load_and_remove(&path)
    }

    fn grab_region(&self, region: Region) -> Result<RgbaImage, CaptureError> {
        let path = Self::scratch_path();
        let geometry = format!(
            "{},{} {}x{}",
            region.x, region.y, region.width, region.height
        );
        let status = Command::new("grim")
            .args(["-g", &geometry])
            .arg(&path)
            .status()
            .map_err(|e| CaptureError::Grab(e.to_string()))?;
        if !status.success() || !path.exists() {
            return Err(CaptureError::Grab(format!("grim failed for region {geometry}")));
        }
        Self::load_and_remove(&path)
    }
}

/// Ask the compositor for its outputs and pick the one without focus.
/// A single-monitor setup has no secondary display to capture.
#[cfg(not(target_os = "macos"))]
fn secondary_output_name() -> Result<String, CaptureError> {
    let output = Command::new("swaymsg")
        .args(["-t", "get_outputs"])
        .output()
        .map_err(|e| CaptureError::Grab(e.to_string()))?;
    if !output.status.success() {
        return Err(CaptureError::Grab("swaymsg -t get_outputs failed".to_string()));
    }
    let outputs: serde_json::Value = serde_json::from_slice(&output.stdout)
        .map_err(|e| CaptureError::Grab(e.to_string()))?;
    let list = outputs.as_array().ok_or(CaptureError::NoSecondaryDisplay)?;
    if list.len() < 2 {
        return Err(CaptureError::NoSecondaryDisplay);
    }
    list.iter()
        .find(|o| o.get("focused").and_then(|f| f.as_bool()) == Some(false))
        .and_then(|o| o.get("name").and_then(|n| n.as_str()))
        .map(str::to_string)
        .ok_or(CaptureError::NoSecondaryDisplay)
}
