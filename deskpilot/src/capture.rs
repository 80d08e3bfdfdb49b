//! Screenshot provider for the planning and validation steps.

use crate::errors::AutomationError;
use async_trait::async_trait;
use image::{DynamicImage, ImageFormat};
use std::io::Cursor;
use tokio::task;
use tracing::debug;

/// Supplies the screenshots fed to the planner and validator.
///
/// A capture failure is a hard error for the current state transition;
/// the engine never proceeds on a stale or missing frame.
#[async_trait]
pub trait ScreenSource: Send + Sync {
    /// Capture the primary display as encoded PNG bytes.
    async fn capture(&self) -> Result<Vec<u8>, AutomationError>;
}

/// Captures the primary monitor via `xcap`.
pub struct PrimaryScreen;

impl PrimaryScreen {
    fn capture_blocking() -> Result<Vec<u8>, AutomationError> {
        let monitors = xcap::Monitor::all()
            .map_err(|e| AutomationError::Resource(format!("failed to enumerate monitors: {e}")))?;

        let primary = monitors
            .into_iter()
            .find(|m| m.is_primary().unwrap_or(false))
            .ok_or_else(|| AutomationError::Resource("no primary monitor found".to_string()))?;

        let image = primary
            .capture_image()
            .map_err(|e| AutomationError::Resource(format!("failed to capture screen: {e}")))?;

        let mut png = Vec::new();
        DynamicImage::ImageRgba8(image)
            .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
            .map_err(|e| AutomationError::Resource(format!("failed to encode screenshot: {e}")))?;

        debug!(bytes = png.len(), "captured primary screen");
        Ok(png)
    }
}

#[async_trait]
impl ScreenSource for PrimaryScreen {
    async fn capture(&self) -> Result<Vec<u8>, AutomationError> {
        // Monitor enumeration and capture are blocking platform calls.
        task::spawn_blocking(Self::capture_blocking)
            .await
            .map_err(|e| AutomationError::Resource(format!("capture task join error: {e}")))?
    }
}
