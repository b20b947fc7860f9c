//! Texture types and descriptors.

use bitflags::bitflags;

use super::Extent2d;

/// Formats used by the frame graph attachments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TextureFormat {
    /// 8-bit RGBA channels, unsigned normalized.
    #[default]
    Rgba8Unorm,
    /// 8-bit BGRA channels, sRGB. Typical presentation format.
    Bgra8UnormSrgb,
    /// 16-bit RGBA channels, float. HDR lighting targets.
    Rgba16Float,
    /// 10-bit RGB with 2-bit alpha, normalized. G-buffer normals.
    Rgb10a2Unorm,
    /// 32-bit float depth.
    Depth32Float,
}

impl TextureFormat {
    /// Returns true for depth formats.
    pub fn is_depth(&self) -> bool {
        matches!(self, Self::Depth32Float)
    }
}

bitflags! {
    /// Usage flags for textures.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct TextureUsage: u32 {
        /// Texture can be copied from.
        const COPY_SRC = 1 << 0;
        /// Texture can be sampled in a shader.
        const TEXTURE_BINDING = 1 << 1;
        /// Texture can be used as a storage texture.
        const STORAGE_BINDING = 1 << 2;
        /// Texture can be used as a render attachment.
        const RENDER_ATTACHMENT = 1 << 3;
    }
}

impl Default for TextureUsage {
    fn default() -> Self {
        Self::empty()
    }
}

/// Descriptor for creating a 2D texture.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct TextureDescriptor {
    /// Debug label for the texture.
    pub label: Option<String>,
    /// Size of mip level 0.
    pub size: Extent2d,
    /// Mip level count.
    pub mip_level_count: u32,
    /// Texture format.
    pub format: TextureFormat,
    /// Usage flags.
    pub usage: TextureUsage,
}

impl TextureDescriptor {
    /// Single-mip render attachment that can also be sampled by later passes.
    pub fn attachment(size: Extent2d, format: TextureFormat) -> Self {
        Self {
            label: None,
            size,
            mip_level_count: 1,
            format,
            usage: TextureUsage::RENDER_ATTACHMENT | TextureUsage::TEXTURE_BINDING,
        }
    }

    /// Set the debug label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Set the mip level count.
    pub fn with_mip_levels(mut self, count: u32) -> Self {
        self.mip_level_count = count;
        self
    }
}
