//! Surface-sized render targets.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::backend::{GraphicsDevice, TextureHandle};
use crate::deletion::{DeletionQueue, RetiredResource};
use crate::error::{BackendResultExt, GraphicsError};
use crate::graph::PassContext;
use crate::types::{Extent2d, TextureDescriptor, TextureFormat};

/// A texture that follows the surface extent.
///
/// Recreating it retires the previous texture through the deletion queue,
/// since frames still in flight may sample it.
#[derive(Debug)]
pub(crate) struct Attachment {
    label: &'static str,
    format: TextureFormat,
    max_mip_levels: u32,
    texture: Option<TextureHandle>,
    extent: Extent2d,
}

impl Attachment {
    pub(crate) fn new(label: &'static str, format: TextureFormat) -> Self {
        Self {
            label,
            format,
            max_mip_levels: 1,
            texture: None,
            extent: Extent2d::default(),
        }
    }

    /// Allocate a mip chain of up to `levels` levels.
    pub(crate) fn with_mip_levels(mut self, levels: u32) -> Self {
        self.max_mip_levels = levels.max(1);
        self
    }

    /// Make sure the texture matches `ctx.extent`.
    pub(crate) fn ensure(&mut self, ctx: &PassContext<'_>) -> Result<(), GraphicsError> {
        if ctx.extent.is_zero() {
            log::debug!("Skipping attachment '{}' for zero extent", self.label);
            return Ok(());
        }
        if self.texture.is_some() && self.extent == ctx.extent {
            return Ok(());
        }

        self.retire(ctx.deletion_queue);
        let descriptor = TextureDescriptor::attachment(ctx.extent, self.format)
            .with_label(self.label)
            .with_mip_levels(self.mip_levels_for(ctx.extent));
        let texture = ctx
            .device
            .create_texture(&descriptor)
            .during("create attachment")?;
        log::debug!(
            "Attachment '{}' allocated at {}x{} ({} mips)",
            self.label,
            ctx.extent.width,
            ctx.extent.height,
            descriptor.mip_level_count
        );
        self.texture = Some(texture);
        self.extent = ctx.extent;
        Ok(())
    }

    pub(crate) fn handle(&self) -> Option<TextureHandle> {
        self.texture
    }

    pub(crate) fn extent(&self) -> Extent2d {
        self.extent
    }

    /// Number of mip levels of the current texture.
    pub(crate) fn mip_levels(&self) -> u32 {
        if self.texture.is_some() {
            self.mip_levels_for(self.extent)
        } else {
            0
        }
    }

    fn mip_levels_for(&self, extent: Extent2d) -> u32 {
        let full_chain = 32 - extent.width.min(extent.height).max(1).leading_zeros();
        full_chain.min(self.max_mip_levels)
    }

    fn retire(&mut self, deletion_queue: &DeletionQueue) {
        if let Some(texture) = self.texture.take() {
            deletion_queue.push(self.label, RetiredResource::Texture(texture));
        }
    }

    /// Destroy the texture now. The device must be idle.
    pub(crate) fn release(&mut self, device: &dyn GraphicsDevice) {
        if let Some(texture) = self.texture.take() {
            device.destroy_texture(texture);
        }
    }
}

/// G-buffer and HDR targets shared by the geometry, lighting and
/// post-processing passes.
#[derive(Debug)]
pub struct RenderTargets {
    pub(crate) albedo: Attachment,
    pub(crate) normal: Attachment,
    pub(crate) depth: Attachment,
    pub(crate) hdr: Attachment,
}

/// Shared handle to [`RenderTargets`].
pub type SharedRenderTargets = Arc<Mutex<RenderTargets>>;

impl RenderTargets {
    pub fn new() -> Self {
        Self {
            albedo: Attachment::new("gbuffer albedo", TextureFormat::Rgba8Unorm),
            normal: Attachment::new("gbuffer normal", TextureFormat::Rgb10a2Unorm),
            depth: Attachment::new("depth", TextureFormat::Depth32Float),
            hdr: Attachment::new("hdr color", TextureFormat::Rgba16Float),
        }
    }

    pub fn shared() -> SharedRenderTargets {
        Arc::new(Mutex::new(Self::new()))
    }

    /// Allocate or resize every target. Calling it again at the same extent
    /// does nothing, so every pass sharing the targets may call it.
    pub fn ensure(&mut self, ctx: &PassContext<'_>) -> Result<(), GraphicsError> {
        self.albedo.ensure(ctx)?;
        self.normal.ensure(ctx)?;
        self.depth.ensure(ctx)?;
        self.hdr.ensure(ctx)
    }

    pub fn gbuffer(&self) -> Vec<TextureHandle> {
        [self.albedo.handle(), self.normal.handle()]
            .into_iter()
            .flatten()
            .collect()
    }

    pub fn depth(&self) -> Option<TextureHandle> {
        self.depth.handle()
    }

    pub fn hdr(&self) -> Option<TextureHandle> {
        self.hdr.handle()
    }

    pub fn extent(&self) -> Extent2d {
        self.hdr.extent()
    }

    /// Destroy every target now. Safe to call more than once.
    pub fn release(&mut self, device: &dyn GraphicsDevice) {
        self.albedo.release(device);
        self.normal.release(device);
        self.depth.release(device);
        self.hdr.release(device);
    }
}

impl Default for RenderTargets {
    fn default() -> Self {
        Self::new()
    }
}
