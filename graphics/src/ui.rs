//! UI overlay interface.
//!
//! The overlay is recorded by the UI pass on top of the presented image.
//! What it draws is up to the application.

use crate::error::GraphicsError;
use crate::renderer::FrameInfo;

/// Something drawn over the final image every frame.
pub trait UiOverlay {
    /// Skip recording while hidden.
    fn is_visible(&self) -> bool {
        true
    }

    /// Record the overlay's draws into `frame.cmd`.
    fn record(&self, frame: &FrameInfo<'_>) -> Result<(), GraphicsError>;
}

/// Overlay that draws nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoUi;

impl UiOverlay for NoUi {
    fn is_visible(&self) -> bool {
        false
    }

    fn record(&self, _frame: &FrameInfo<'_>) -> Result<(), GraphicsError> {
        Ok(())
    }
}
