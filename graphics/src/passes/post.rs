//! Presentation, UI, post-processing, bloom and transparent passes.

use crate::backend::{GpuCommand, GraphicsDevice, TextureHandle};
use crate::error::GraphicsError;
use crate::graph::{Pass, PassContext, PassRole, RenderSystem};
use crate::renderer::FrameInfo;
use crate::types::TextureFormat;

use super::attachments::{Attachment, SharedRenderTargets};
use super::systems::RenderSystems;

/// Bloom mip chain length at full resolution.
pub const BLOOM_MIP_LEVELS: u32 = 6;

const BLOOM_WORKGROUP_SIZE: u32 = 8;

fn fullscreen_draw(frame: &FrameInfo<'_>, label: &'static str, target: Option<TextureHandle>) {
    frame.record(GpuCommand::BeginRendering {
        label,
        color: target.into_iter().collect(),
        depth: None,
    });
    frame.record(GpuCommand::Draw {
        vertex_count: 3,
        instance_count: 1,
    });
    frame.record(GpuCommand::EndRendering);
}

/// Tonemaps the HDR target into the image handed to the swapchain.
pub struct PresentPass {
    output: Attachment,
}

impl PresentPass {
    pub fn new() -> Self {
        Self {
            output: Attachment::new("present color", TextureFormat::Bgra8UnormSrgb),
        }
    }
}

impl Default for PresentPass {
    fn default() -> Self {
        Self::new()
    }
}

impl Pass for PresentPass {
    fn name(&self) -> &'static str {
        "PresentPass"
    }

    fn role(&self) -> PassRole {
        PassRole::Present
    }

    fn compile(&mut self, ctx: &PassContext<'_>) -> Result<(), GraphicsError> {
        self.output.ensure(ctx)
    }

    fn execute(&mut self, frame: &FrameInfo<'_>) -> Result<(), GraphicsError> {
        if self.output.extent() != frame.swap_chain_extent {
            log::warn!(
                "PresentPass output is {:?} but the swapchain is {:?}",
                self.output.extent(),
                frame.swap_chain_extent
            );
        }
        fullscreen_draw(frame, "present", self.output.handle());
        Ok(())
    }

    fn swap_chain_resized(&mut self, ctx: &PassContext<'_>) -> Result<(), GraphicsError> {
        self.output.ensure(ctx)
    }

    fn release(&mut self, device: &dyn GraphicsDevice) {
        self.output.release(device);
    }
}

/// Records the application's UI overlay.
#[derive(Debug, Default)]
pub struct UiPass;

impl UiPass {
    pub fn new() -> Self {
        Self
    }
}

impl Pass for UiPass {
    fn name(&self) -> &'static str {
        "UiPass"
    }

    fn role(&self) -> PassRole {
        PassRole::Ui
    }

    fn execute(&mut self, frame: &FrameInfo<'_>) -> Result<(), GraphicsError> {
        if !frame.ui.is_visible() {
            return Ok(());
        }
        frame.ui.record(frame)
    }
}

/// Color grading of the HDR target.
pub struct PostProcessingPass {
    targets: SharedRenderTargets,
    output: Attachment,
}

impl PostProcessingPass {
    pub fn new(targets: SharedRenderTargets) -> Self {
        Self {
            targets,
            output: Attachment::new("post color", TextureFormat::Rgba16Float),
        }
    }
}

impl Pass for PostProcessingPass {
    fn name(&self) -> &'static str {
        "PostProcessingPass"
    }

    fn role(&self) -> PassRole {
        PassRole::PostProcessing
    }

    fn compile(&mut self, ctx: &PassContext<'_>) -> Result<(), GraphicsError> {
        self.targets.lock().ensure(ctx)?;
        self.output.ensure(ctx)
    }

    fn execute(&mut self, frame: &FrameInfo<'_>) -> Result<(), GraphicsError> {
        if self.targets.lock().hdr().is_none() {
            return Err(GraphicsError::pass(self.name(), "HDR target not allocated"));
        }
        fullscreen_draw(frame, "post processing", self.output.handle());
        Ok(())
    }

    fn swap_chain_resized(&mut self, ctx: &PassContext<'_>) -> Result<(), GraphicsError> {
        self.targets.lock().ensure(ctx)?;
        self.output.ensure(ctx)
    }

    fn release(&mut self, device: &dyn GraphicsDevice) {
        self.output.release(device);
        self.targets.lock().release(device);
    }
}

/// Downsamples bright areas into a mip chain and blends it back up.
pub struct BloomPass {
    chain: Attachment,
}

impl BloomPass {
    pub fn new() -> Self {
        Self {
            chain: Attachment::new("bloom chain", TextureFormat::Rgba16Float)
                .with_mip_levels(BLOOM_MIP_LEVELS),
        }
    }

    /// Mip levels of the current chain, 0 before compilation.
    pub fn mip_levels(&self) -> u32 {
        self.chain.mip_levels()
    }

    fn dispatch_mip(&self, frame: &FrameInfo<'_>, level: u32) {
        let extent = self.chain.extent().mip(level);
        frame.record(GpuCommand::Dispatch {
            x: extent.width.div_ceil(BLOOM_WORKGROUP_SIZE),
            y: extent.height.div_ceil(BLOOM_WORKGROUP_SIZE),
            z: 1,
        });
    }
}

impl Default for BloomPass {
    fn default() -> Self {
        Self::new()
    }
}

impl Pass for BloomPass {
    fn name(&self) -> &'static str {
        "BloomPass"
    }

    fn role(&self) -> PassRole {
        PassRole::Bloom
    }

    fn compile(&mut self, ctx: &PassContext<'_>) -> Result<(), GraphicsError> {
        self.chain.ensure(ctx)
    }

    fn execute(&mut self, frame: &FrameInfo<'_>) -> Result<(), GraphicsError> {
        let levels = self.chain.mip_levels();
        if levels < 2 {
            return Ok(());
        }
        for level in 1..levels {
            self.dispatch_mip(frame, level);
        }
        for level in (0..levels - 1).rev() {
            self.dispatch_mip(frame, level);
        }
        Ok(())
    }

    fn swap_chain_resized(&mut self, ctx: &PassContext<'_>) -> Result<(), GraphicsError> {
        self.chain.ensure(ctx)
    }

    fn release(&mut self, device: &dyn GraphicsDevice) {
        self.chain.release(device);
    }
}

/// Forward-shaded transparent geometry on top of the lit image.
pub struct TransparentPass {
    targets: SharedRenderTargets,
    systems: RenderSystems,
}

impl TransparentPass {
    pub fn new(targets: SharedRenderTargets) -> Self {
        Self {
            targets,
            systems: RenderSystems::default(),
        }
    }

    /// Register a render system. Systems render in registration order.
    pub fn add_render_system(&mut self, system: impl RenderSystem + 'static) -> &mut Self {
        self.systems.add(system);
        self
    }

    pub fn render_system_names(&self) -> Vec<&'static str> {
        self.systems.names()
    }
}

impl Pass for TransparentPass {
    fn name(&self) -> &'static str {
        "TransparentPass"
    }

    fn role(&self) -> PassRole {
        PassRole::Transparent
    }

    fn compile(&mut self, ctx: &PassContext<'_>) -> Result<(), GraphicsError> {
        self.targets.lock().ensure(ctx)?;
        self.systems.compile(ctx)
    }

    fn execute(&mut self, frame: &FrameInfo<'_>) -> Result<(), GraphicsError> {
        let (hdr, depth) = {
            let targets = self.targets.lock();
            (targets.hdr(), targets.depth())
        };
        frame.record(GpuCommand::BeginRendering {
            label: "transparent",
            color: hdr.into_iter().collect(),
            depth,
        });
        let result = self.systems.render(frame);
        frame.record(GpuCommand::EndRendering);
        result
    }

    fn swap_chain_resized(&mut self, ctx: &PassContext<'_>) -> Result<(), GraphicsError> {
        self.targets.lock().ensure(ctx)
    }

    fn release(&mut self, device: &dyn GraphicsDevice) {
        self.systems.release(device);
        self.targets.lock().release(device);
    }
}
