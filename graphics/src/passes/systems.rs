//! Render systems plugged into the geometry and transparent passes.

use crate::backend::{GpuCommand, GraphicsDevice};
use crate::batch::InstanceData;
use crate::error::{BackendResultExt, GraphicsError};
use crate::graph::{PassContext, RenderSystem};
use crate::renderer::FrameInfo;
use crate::scene::MaterialType;
use crate::types::BufferUsage;

use super::buffers::PerFrameBuffer;

/// Ordered render systems of one pass.
#[derive(Default)]
pub(crate) struct RenderSystems {
    systems: Vec<Box<dyn RenderSystem>>,
}

impl RenderSystems {
    pub(crate) fn add(&mut self, system: impl RenderSystem + 'static) {
        log::trace!("Registering render system '{}'", system.name());
        self.systems.push(Box::new(system));
    }

    pub(crate) fn names(&self) -> Vec<&'static str> {
        self.systems.iter().map(|system| system.name()).collect()
    }

    pub(crate) fn compile(&mut self, ctx: &PassContext<'_>) -> Result<(), GraphicsError> {
        for system in &mut self.systems {
            system.compile(ctx)?;
        }
        Ok(())
    }

    /// Render every system. A failing system does not stop the others; the
    /// first error is returned.
    pub(crate) fn render(&mut self, frame: &FrameInfo<'_>) -> Result<(), GraphicsError> {
        let mut first_error = None;
        for system in &mut self.systems {
            if let Err(err) = system.render(frame) {
                log::warn!("Render system '{}' failed: {}", system.name(), err);
                first_error.get_or_insert(err);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    pub(crate) fn release(&mut self, device: &dyn GraphicsDevice) {
        for system in &mut self.systems {
            system.release(device);
        }
    }
}

/// CPU-driven mesh drawing: issues one indexed draw per batch region.
///
/// Each slot's instance buffer keeps the static prefix `[0, S)` of the
/// registry generation it was last uploaded for; only the dynamic region
/// `[S, S + D)` is rewritten every frame.
#[derive(Debug)]
pub struct StaticMeshRenderSystem {
    material_type: MaterialType,
    instances: PerFrameBuffer,
    /// Registry generation whose statics each slot's buffer holds.
    static_generations: Vec<Option<u64>>,
    scratch: Vec<InstanceData>,
}

impl StaticMeshRenderSystem {
    pub fn new(material_type: MaterialType) -> Self {
        Self {
            material_type,
            instances: PerFrameBuffer::new("cpu-driven instances", BufferUsage::STORAGE),
            static_generations: Vec::new(),
            scratch: Vec::new(),
        }
    }

    pub fn material_type(&self) -> MaterialType {
        self.material_type
    }

    fn upload(&mut self, frame: &FrameInfo<'_>) -> Result<(), GraphicsError> {
        let registry = frame.draw_batcher;
        let static_bytes = u64::from(registry.static_instance_count()) * InstanceData::SIZE;
        let dynamic_bytes = u64::from(registry.dynamic_instance_count()) * InstanceData::SIZE;
        let reserved = self.instances.reserve(frame, static_bytes + dynamic_bytes)?;

        let slot = frame.frame_index;
        if self.static_generations.len() <= slot {
            self.static_generations.resize(slot + 1, None);
        }
        let generation = registry.generation();
        if reserved.fresh || self.static_generations[slot] != Some(generation) {
            registry.write_static_instances(frame.scene, &mut self.scratch);
            if !self.scratch.is_empty() {
                frame
                    .device
                    .write_buffer(reserved.buffer, 0, bytemuck::cast_slice(&self.scratch))
                    .during("upload static instances")?;
            }
            log::trace!("Slot {} static instances uploaded for generation {}", slot, generation);
            self.static_generations[slot] = Some(generation);
        }

        if dynamic_bytes > 0 {
            registry.write_dynamic_instances(frame.scene, &mut self.scratch);
            frame
                .device
                .write_buffer(reserved.buffer, static_bytes, bytemuck::cast_slice(&self.scratch))
                .during("write dynamic instances")?;
        }
        Ok(())
    }
}

impl RenderSystem for StaticMeshRenderSystem {
    fn name(&self) -> &'static str {
        "StaticMeshRenderSystem"
    }

    fn render(&mut self, frame: &FrameInfo<'_>) -> Result<(), GraphicsError> {
        let registry = frame.draw_batcher;
        if registry.is_empty() {
            return Ok(());
        }
        self.upload(frame)?;

        for batch in registry.batches() {
            if batch.material_type != self.material_type {
                continue;
            }
            for range in [&batch.static_range, &batch.dynamic_range] {
                if range.is_empty() {
                    continue;
                }
                frame.record(GpuCommand::DrawIndexed {
                    mesh: batch.key.mesh,
                    material: batch.key.material,
                    first_instance: range.start,
                    instance_count: range.end - range.start,
                });
            }
        }
        Ok(())
    }

    fn release(&mut self, device: &dyn GraphicsDevice) {
        self.instances.release(device);
        self.static_generations.clear();
    }
}

/// GPU layout of one point light.
#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct PointLightData {
    position_radius: [f32; 4],
    color_intensity: [f32; 4],
}

/// Draws the scene's point lights as camera-facing quads.
#[derive(Debug)]
pub struct PointLightRenderSystem {
    lights: PerFrameBuffer,
    scratch: Vec<PointLightData>,
}

impl PointLightRenderSystem {
    pub fn new() -> Self {
        Self {
            lights: PerFrameBuffer::new("point lights", BufferUsage::STORAGE),
            scratch: Vec::new(),
        }
    }
}

impl Default for PointLightRenderSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderSystem for PointLightRenderSystem {
    fn name(&self) -> &'static str {
        "PointLightRenderSystem"
    }

    fn render(&mut self, frame: &FrameInfo<'_>) -> Result<(), GraphicsError> {
        let lights = frame.scene.point_lights();
        if lights.is_empty() {
            return Ok(());
        }

        self.scratch.clear();
        self.scratch.extend(lights.iter().map(|light| PointLightData {
            position_radius: light.position.extend(light.radius).to_array(),
            color_intensity: light.color.extend(light.intensity).to_array(),
        }));
        self.lights.write(frame, bytemuck::cast_slice(&self.scratch))?;

        frame.record(GpuCommand::Draw {
            vertex_count: 6,
            instance_count: lights.len() as u32,
        });
        Ok(())
    }

    fn release(&mut self, device: &dyn GraphicsDevice) {
        self.lights.release(device);
    }
}
