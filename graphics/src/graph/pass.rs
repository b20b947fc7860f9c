//! Pass and render system interfaces.

use std::any::Any;
use std::sync::Arc;

use crate::backend::GraphicsDevice;
use crate::batch::DrawBatchRegistry;
use crate::deletion::DeletionQueue;
use crate::error::GraphicsError;
use crate::renderer::FrameInfo;
use crate::scene::Scene;
use crate::types::Extent2d;

/// How geometry reaches the G-buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum GeometrySubmission {
    /// One draw per batch, issued by the CPU every frame.
    CpuDriven,
    /// Culling and draw compaction on the GPU from the bulk instance buffer.
    #[default]
    GpuDriven,
}

/// What a pass contributes to the frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PassRole {
    SceneUpdate,
    Culling,
    Geometry(GeometrySubmission),
    Skybox,
    Lighting,
    Present,
    Ui,
    PostProcessing,
    Bloom,
    Transparent,
    /// Application-defined work outside the built-in roster.
    Custom,
}

/// Everything a pass may touch outside of frame recording.
pub struct PassContext<'a> {
    pub device: &'a Arc<dyn GraphicsDevice>,
    pub draw_batcher: &'a DrawBatchRegistry,
    pub deletion_queue: &'a DeletionQueue,
    /// Current surface extent.
    pub extent: Extent2d,
    pub frames_in_flight: usize,
}

#[doc(hidden)]
pub trait AsAny: Any {
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// A unit of GPU work in the [`FrameGraph`](super::FrameGraph).
///
/// Only [`execute`](Self::execute) is required. Lifecycle hooks default to
/// doing nothing; passes owning surface-sized resources implement
/// [`swap_chain_resized`](Self::swap_chain_resized).
pub trait Pass: AsAny {
    /// Unique name, also used as the debug label of the pass.
    fn name(&self) -> &'static str;

    fn role(&self) -> PassRole;

    /// Label of the CPU and GPU scopes the graph opens around [`execute`](Self::execute).
    fn timing_label(&self) -> Option<&'static str> {
        None
    }

    /// Create long-lived resources. Called once, when the graph compiles.
    fn compile(&mut self, _ctx: &PassContext<'_>) -> Result<(), GraphicsError> {
        Ok(())
    }

    /// Record this frame's commands.
    fn execute(&mut self, frame: &FrameInfo<'_>) -> Result<(), GraphicsError>;

    /// The scene finished loading.
    fn scene_initialized(
        &mut self,
        _ctx: &PassContext<'_>,
        _scene: &dyn Scene,
    ) -> Result<(), GraphicsError> {
        Ok(())
    }

    /// The scene was replaced or its entity set changed.
    fn scene_changed(
        &mut self,
        _ctx: &PassContext<'_>,
        _scene: &dyn Scene,
    ) -> Result<(), GraphicsError> {
        Ok(())
    }

    /// The swapchain was recreated at `ctx.extent`.
    fn swap_chain_resized(&mut self, _ctx: &PassContext<'_>) -> Result<(), GraphicsError> {
        Ok(())
    }

    /// Destroy owned resources immediately. The device is idle.
    fn release(&mut self, _device: &dyn GraphicsDevice) {}
}

/// Draw logic plugged into a pass that renders several kinds of objects.
pub trait RenderSystem {
    fn name(&self) -> &'static str;

    /// Create long-lived resources. Called when the owning pass compiles.
    fn compile(&mut self, _ctx: &PassContext<'_>) -> Result<(), GraphicsError> {
        Ok(())
    }

    /// Record draws into the owning pass's rendering scope.
    fn render(&mut self, frame: &FrameInfo<'_>) -> Result<(), GraphicsError>;

    /// Destroy owned resources immediately. The device is idle.
    fn release(&mut self, _device: &dyn GraphicsDevice) {}
}
