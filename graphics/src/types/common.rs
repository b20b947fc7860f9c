//! Common types shared across the graphics system.

/// Pixel extent of a surface or a surface-sized attachment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Extent2d {
    pub width: u32,
    pub height: u32,
}

impl Extent2d {
    /// Create a new extent.
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// A minimized window reports a zero extent on at least one axis.
    pub const fn is_zero(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Width divided by height, or `1.0` for a zero-height extent.
    pub fn aspect_ratio(&self) -> f32 {
        if self.height == 0 {
            1.0
        } else {
            self.width as f32 / self.height as f32
        }
    }

    /// Extent of mip level `level`, clamped to at least 1x1.
    pub fn mip(&self, level: u32) -> Self {
        Self {
            width: (self.width >> level).max(1),
            height: (self.height >> level).max(1),
        }
    }
}

impl From<(u32, u32)> for Extent2d {
    fn from((width, height): (u32, u32)) -> Self {
        Self { width, height }
    }
}
