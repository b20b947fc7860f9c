//! CPU-driven G-buffer pass.

use crate::backend::{GpuCommand, GraphicsDevice};
use crate::error::GraphicsError;
use crate::graph::{GeometrySubmission, Pass, PassContext, PassRole, RenderSystem};
use crate::profiling::labels;
use crate::renderer::FrameInfo;

use super::attachments::SharedRenderTargets;
use super::systems::RenderSystems;

/// Fills the G-buffer with draws issued by its render systems.
pub struct GeometryPass {
    targets: SharedRenderTargets,
    systems: RenderSystems,
}

impl GeometryPass {
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

impl Pass for GeometryPass {
    fn name(&self) -> &'static str {
        "GeometryPass"
    }

    fn role(&self) -> PassRole {
        PassRole::Geometry(GeometrySubmission::CpuDriven)
    }

    fn timing_label(&self) -> Option<&'static str> {
        Some(labels::GEOMETRY)
    }

    fn compile(&mut self, ctx: &PassContext<'_>) -> Result<(), GraphicsError> {
        self.targets.lock().ensure(ctx)?;
        self.systems.compile(ctx)
    }

    fn execute(&mut self, frame: &FrameInfo<'_>) -> Result<(), GraphicsError> {
        let (color, depth) = {
            let targets = self.targets.lock();
            (targets.gbuffer(), targets.depth())
        };
        frame.record(GpuCommand::BeginRendering {
            label: "gbuffer",
            color,
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
