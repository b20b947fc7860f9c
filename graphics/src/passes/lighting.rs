//! Skybox and deferred lighting.

use crate::backend::{GpuCommand, GraphicsDevice};
use crate::error::GraphicsError;
use crate::graph::{Pass, PassContext, PassRole};
use crate::profiling::labels;
use crate::renderer::FrameInfo;
use crate::types::BufferUsage;

use super::attachments::SharedRenderTargets;
use super::buffers::PerFrameBuffer;

/// Fullscreen triangle.
const FULLSCREEN_VERTICES: u32 = 3;

/// Draws the environment cube behind the scene.
pub struct SkyboxPass {
    targets: SharedRenderTargets,
}

impl SkyboxPass {
    pub fn new(targets: SharedRenderTargets) -> Self {
        Self { targets }
    }
}

impl Pass for SkyboxPass {
    fn name(&self) -> &'static str {
        "SkyboxPass"
    }

    fn role(&self) -> PassRole {
        PassRole::Skybox
    }

    fn compile(&mut self, ctx: &PassContext<'_>) -> Result<(), GraphicsError> {
        self.targets.lock().ensure(ctx)
    }

    fn execute(&mut self, frame: &FrameInfo<'_>) -> Result<(), GraphicsError> {
        if !frame.scene.environment().has_skybox {
            return Ok(());
        }
        let (hdr, depth) = {
            let targets = self.targets.lock();
            (targets.hdr(), targets.depth())
        };
        frame.record(GpuCommand::BeginRendering {
            label: "skybox",
            color: hdr.into_iter().collect(),
            depth,
        });
        frame.record(GpuCommand::Draw {
            vertex_count: 36,
            instance_count: 1,
        });
        frame.record(GpuCommand::EndRendering);
        Ok(())
    }

    fn swap_chain_resized(&mut self, ctx: &PassContext<'_>) -> Result<(), GraphicsError> {
        self.targets.lock().ensure(ctx)
    }

    fn release(&mut self, device: &dyn GraphicsDevice) {
        self.targets.lock().release(device);
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct LightingUniforms {
    inverse_view_projection: [[f32; 4]; 4],
    camera_position: [f32; 4],
    sun_direction: [f32; 4],
    /// `rgb` sun color, `a` ambient intensity.
    sun_color_ambient: [f32; 4],
    point_light_count: u32,
    _padding: [u32; 3],
}

static_assertions::const_assert_eq!(std::mem::size_of::<LightingUniforms>(), 128);

/// Resolves the G-buffer into the HDR target.
pub struct LightingPass {
    targets: SharedRenderTargets,
    uniforms: PerFrameBuffer,
}

impl LightingPass {
    pub fn new(targets: SharedRenderTargets) -> Self {
        Self {
            targets,
            uniforms: PerFrameBuffer::new("lighting uniforms", BufferUsage::UNIFORM),
        }
    }
}

impl Pass for LightingPass {
    fn name(&self) -> &'static str {
        "LightingPass"
    }

    fn role(&self) -> PassRole {
        PassRole::Lighting
    }

    fn timing_label(&self) -> Option<&'static str> {
        Some(labels::LIGHTING)
    }

    fn compile(&mut self, ctx: &PassContext<'_>) -> Result<(), GraphicsError> {
        self.targets.lock().ensure(ctx)
    }

    fn execute(&mut self, frame: &FrameInfo<'_>) -> Result<(), GraphicsError> {
        let camera = frame.scene.camera();
        let environment = frame.scene.environment();
        let uniforms = LightingUniforms {
            inverse_view_projection: camera
                .view_projection(frame.aspect_ratio)
                .inverse()
                .to_cols_array_2d(),
            camera_position: camera.position.extend(1.0).to_array(),
            sun_direction: environment.sun_direction.normalize_or_zero().extend(0.0).to_array(),
            sun_color_ambient: environment
                .sun_color
                .extend(environment.ambient_intensity)
                .to_array(),
            point_light_count: frame.scene.point_lights().len() as u32,
            _padding: [0; 3],
        };
        self.uniforms.write(frame, bytemuck::bytes_of(&uniforms))?;

        let hdr = self.targets.lock().hdr();
        let Some(hdr) = hdr else {
            return Err(GraphicsError::pass(self.name(), "HDR target not allocated"));
        };
        frame.record(GpuCommand::BeginRendering {
            label: "lighting",
            color: vec![hdr],
            depth: None,
        });
        frame.record(GpuCommand::Draw {
            vertex_count: FULLSCREEN_VERTICES,
            instance_count: 1,
        });
        frame.record(GpuCommand::EndRendering);
        Ok(())
    }

    fn swap_chain_resized(&mut self, ctx: &PassContext<'_>) -> Result<(), GraphicsError> {
        self.targets.lock().ensure(ctx)
    }

    fn release(&mut self, device: &dyn GraphicsDevice) {
        self.uniforms.release(device);
        self.targets.lock().release(device);
    }
}
