//! GPU-driven geometry: culling, dynamic instance update and indirect draws.
//!
//! All three passes share one set of buffers:
//!
//! | Buffer | Contents | Written |
//! |--------|----------|---------|
//! | instances | [`InstanceData`], static region then dynamic region | static: scene change, dynamic: every frame by copy |
//! | indirect | one [`DrawIndexedIndirectArgs`] per batch | scene change; instance counts by the culling shader |
//! | visible | compacted instance indices, batch-major | culling shader |
//!
//! The CPU never touches static instances after a scene change, so the
//! per-frame upload is bounded by the dynamic instance count.

use std::sync::Arc;

use glam::{Mat4, Vec4};
use parking_lot::Mutex;

use crate::backend::{BufferHandle, GpuCommand, GraphicsDevice};
use crate::batch::{DrawBatchRegistry, InstanceData};
use crate::deletion::{DeletionQueue, RetiredResource};
use crate::error::{BackendResultExt, GraphicsError};
use crate::graph::{GeometrySubmission, Pass, PassContext, PassRole};
use crate::profiling::labels;
use crate::renderer::FrameInfo;
use crate::scene::Scene;
use crate::types::{BufferDescriptor, BufferUsage, DrawIndexedIndirectArgs};

use super::attachments::SharedRenderTargets;
use super::buffers::PerFrameBuffer;

/// Threads per culling workgroup.
const CULLING_WORKGROUP_SIZE: u32 = 64;

/// Buffers shared by the GPU-driven passes. Rebuilt on every scene change.
#[derive(Debug, Default)]
pub struct GpuDrivenBuffers {
    instances: Option<BufferHandle>,
    indirect: Option<BufferHandle>,
    visible: Option<BufferHandle>,
    static_count: u32,
    dynamic_count: u32,
    batch_count: u32,
}

/// Shared handle to [`GpuDrivenBuffers`].
pub type SharedGpuDrivenBuffers = Arc<Mutex<GpuDrivenBuffers>>;

impl GpuDrivenBuffers {
    pub fn shared() -> SharedGpuDrivenBuffers {
        Arc::new(Mutex::new(Self::default()))
    }

    pub fn instance_buffer(&self) -> Option<BufferHandle> {
        self.instances
    }

    pub fn indirect_buffer(&self) -> Option<BufferHandle> {
        self.indirect
    }

    pub fn instance_count(&self) -> u32 {
        self.static_count + self.dynamic_count
    }

    pub fn batch_count(&self) -> u32 {
        self.batch_count
    }

    fn rebuild(
        &mut self,
        ctx: &PassContext<'_>,
        scene: &dyn Scene,
    ) -> Result<(), GraphicsError> {
        self.retire(ctx.deletion_queue);

        let registry = ctx.draw_batcher;
        if registry.is_empty() {
            log::debug!("GPU-driven buffers cleared: scene has no instances");
            return Ok(());
        }

        let device = ctx.device.as_ref();
        let instance_count = u64::from(registry.instance_count());
        let instances = device
            .create_buffer(
                &BufferDescriptor::new(
                    instance_count * InstanceData::SIZE,
                    BufferUsage::STORAGE | BufferUsage::COPY_DST | BufferUsage::HOST_WRITE,
                )
                .with_label("instances"),
            )
            .during("create instance buffer")?;
        self.instances = Some(instances);

        let mut records = Vec::new();
        registry.write_static_instances(scene, &mut records);
        if !records.is_empty() {
            device
                .write_buffer(instances, 0, bytemuck::cast_slice(&records))
                .during("upload static instances")?;
        }

        let args = indirect_args(registry);
        let indirect = device
            .create_buffer(
                &BufferDescriptor::new(
                    args.len() as u64 * DrawIndexedIndirectArgs::SIZE,
                    BufferUsage::INDIRECT | BufferUsage::STORAGE | BufferUsage::HOST_WRITE,
                )
                .with_label("indirect args"),
            )
            .during("create indirect buffer")?;
        self.indirect = Some(indirect);
        device
            .write_buffer(indirect, 0, bytemuck::cast_slice(&args))
            .during("upload indirect args")?;

        let visible = device
            .create_buffer(
                &BufferDescriptor::new(instance_count * 4, BufferUsage::STORAGE)
                    .with_label("visible instances"),
            )
            .during("create visible instance buffer")?;
        self.visible = Some(visible);

        self.static_count = registry.static_instance_count();
        self.dynamic_count = registry.dynamic_instance_count();
        self.batch_count = args.len() as u32;
        log::debug!(
            "GPU-driven buffers rebuilt: {} static, {} dynamic instances in {} batches",
            self.static_count,
            self.dynamic_count,
            self.batch_count
        );
        Ok(())
    }

    fn retire(&mut self, deletion_queue: &DeletionQueue) {
        let buffers = [
            ("instances", self.instances.take()),
            ("indirect args", self.indirect.take()),
            ("visible instances", self.visible.take()),
        ];
        for (label, buffer) in buffers {
            if let Some(buffer) = buffer {
                deletion_queue.push(label, RetiredResource::Buffer(buffer));
            }
        }
        self.static_count = 0;
        self.dynamic_count = 0;
        self.batch_count = 0;
    }

    fn release(&mut self, device: &dyn GraphicsDevice) {
        for buffer in [self.instances.take(), self.indirect.take(), self.visible.take()]
            .into_iter()
            .flatten()
        {
            device.destroy_buffer(buffer);
        }
    }
}

/// One draw per batch. Visible instances are compacted batch-major, so each
/// batch starts where the previous one's worst case ends.
fn indirect_args(registry: &DrawBatchRegistry) -> Vec<DrawIndexedIndirectArgs> {
    let mut first_instance = 0;
    registry
        .batches()
        .iter()
        .map(|batch| {
            let args = DrawIndexedIndirectArgs {
                index_count: batch.mesh_info.index_count,
                instance_count: 0,
                first_index: batch.mesh_info.first_index,
                base_vertex: batch.mesh_info.base_vertex,
                first_instance,
            };
            first_instance += batch.instance_count();
            args
        })
        .collect()
}

/// Per-frame culling parameters.
#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct CullingUniforms {
    view_projection: [[f32; 4]; 4],
    frustum_planes: [[f32; 4]; 6],
    /// Instance count, batch count, static count, unused.
    counts: [u32; 4],
}

static_assertions::const_assert_eq!(std::mem::size_of::<CullingUniforms>(), 176);

/// Normalized frustum planes of a `[0, 1]` depth projection, `xyz` pointing inward.
fn frustum_planes(view_projection: Mat4) -> [[f32; 4]; 6] {
    let rows = [0, 1, 2, 3].map(|i| view_projection.row(i));
    let planes: [Vec4; 6] = [
        rows[3] + rows[0],
        rows[3] - rows[0],
        rows[3] + rows[1],
        rows[3] - rows[1],
        rows[2],
        rows[3] - rows[2],
    ];
    planes.map(|plane| {
        let length = plane.truncate().length();
        if length > 0.0 {
            (plane / length).to_array()
        } else {
            plane.to_array()
        }
    })
}

/// Builds the shared buffers on scene events and dispatches the culling
/// shader every frame.
pub struct CullingPass {
    buffers: SharedGpuDrivenBuffers,
    uniforms: PerFrameBuffer,
}

impl CullingPass {
    pub fn new(buffers: SharedGpuDrivenBuffers) -> Self {
        Self {
            buffers,
            uniforms: PerFrameBuffer::new("culling uniforms", BufferUsage::UNIFORM),
        }
    }
}

impl Pass for CullingPass {
    fn name(&self) -> &'static str {
        "CullingPass"
    }

    fn role(&self) -> PassRole {
        PassRole::Culling
    }

    fn timing_label(&self) -> Option<&'static str> {
        Some(labels::CULLING)
    }

    fn execute(&mut self, frame: &FrameInfo<'_>) -> Result<(), GraphicsError> {
        let (instance_count, batch_count, static_count) = {
            let buffers = self.buffers.lock();
            (buffers.instance_count(), buffers.batch_count, buffers.static_count)
        };
        if instance_count == 0 {
            return Ok(());
        }

        let view_projection = frame.scene.camera().view_projection(frame.aspect_ratio);
        let uniforms = CullingUniforms {
            view_projection: view_projection.to_cols_array_2d(),
            frustum_planes: frustum_planes(view_projection),
            counts: [instance_count, batch_count, static_count, 0],
        };
        self.uniforms.write(frame, bytemuck::bytes_of(&uniforms))?;

        frame.record(GpuCommand::Dispatch {
            x: instance_count.div_ceil(CULLING_WORKGROUP_SIZE),
            y: 1,
            z: 1,
        });
        Ok(())
    }

    fn scene_initialized(
        &mut self,
        ctx: &PassContext<'_>,
        scene: &dyn Scene,
    ) -> Result<(), GraphicsError> {
        self.buffers.lock().rebuild(ctx, scene)
    }

    fn scene_changed(
        &mut self,
        ctx: &PassContext<'_>,
        scene: &dyn Scene,
    ) -> Result<(), GraphicsError> {
        self.buffers.lock().rebuild(ctx, scene)
    }

    fn release(&mut self, device: &dyn GraphicsDevice) {
        self.uniforms.release(device);
        self.buffers.lock().release(device);
    }
}

/// Copies this frame's dynamic transforms into the dynamic region of the
/// instance buffer.
pub struct SceneUpdatePass {
    buffers: SharedGpuDrivenBuffers,
    staging: PerFrameBuffer,
    scratch: Vec<InstanceData>,
}

impl SceneUpdatePass {
    pub fn new(buffers: SharedGpuDrivenBuffers) -> Self {
        Self {
            buffers,
            staging: PerFrameBuffer::new("dynamic instance staging", BufferUsage::COPY_SRC),
            scratch: Vec::new(),
        }
    }
}

impl Pass for SceneUpdatePass {
    fn name(&self) -> &'static str {
        "SceneUpdatePass"
    }

    fn role(&self) -> PassRole {
        PassRole::SceneUpdate
    }

    fn timing_label(&self) -> Option<&'static str> {
        Some(labels::INSTANCE_UPDATE)
    }

    fn execute(&mut self, frame: &FrameInfo<'_>) -> Result<(), GraphicsError> {
        let (instances, static_count, dynamic_count) = {
            let buffers = self.buffers.lock();
            (buffers.instances, buffers.static_count, buffers.dynamic_count)
        };
        if dynamic_count == 0 {
            return Ok(());
        }
        let Some(instances) = instances else {
            return Err(GraphicsError::pass(self.name(), "instance buffer not built"));
        };

        frame
            .draw_batcher
            .write_dynamic_instances(frame.scene, &mut self.scratch);
        let Some(staging) = self.staging.write(frame, bytemuck::cast_slice(&self.scratch))? else {
            return Ok(());
        };

        frame.record(GpuCommand::CopyBuffer {
            src: staging,
            dst: instances,
            src_offset: 0,
            dst_offset: u64::from(static_count) * InstanceData::SIZE,
            size: self.scratch.len() as u64 * InstanceData::SIZE,
        });
        Ok(())
    }

    fn release(&mut self, device: &dyn GraphicsDevice) {
        self.staging.release(device);
    }
}

/// Draws every batch with one indirect call into the G-buffer.
pub struct GpuDrivenGeometryPass {
    targets: SharedRenderTargets,
    buffers: SharedGpuDrivenBuffers,
}

impl GpuDrivenGeometryPass {
    pub fn new(targets: SharedRenderTargets, buffers: SharedGpuDrivenBuffers) -> Self {
        Self { targets, buffers }
    }
}

impl Pass for GpuDrivenGeometryPass {
    fn name(&self) -> &'static str {
        "GpuDrivenGeometryPass"
    }

    fn role(&self) -> PassRole {
        PassRole::Geometry(GeometrySubmission::GpuDriven)
    }

    fn timing_label(&self) -> Option<&'static str> {
        Some(labels::GPU_DRIVEN_GEOMETRY)
    }

    fn compile(&mut self, ctx: &PassContext<'_>) -> Result<(), GraphicsError> {
        self.targets.lock().ensure(ctx)
    }

    fn execute(&mut self, frame: &FrameInfo<'_>) -> Result<(), GraphicsError> {
        let (color, depth) = {
            let targets = self.targets.lock();
            (targets.gbuffer(), targets.depth())
        };
        let (indirect, batch_count) = {
            let buffers = self.buffers.lock();
            (buffers.indirect, buffers.batch_count)
        };

        frame.record(GpuCommand::BeginRendering {
            label: "gbuffer",
            color,
            depth,
        });
        if let Some(buffer) = indirect
            && batch_count > 0
        {
            frame.record(GpuCommand::DrawIndexedIndirect {
                buffer,
                offset: 0,
                draw_count: batch_count,
                stride: DrawIndexedIndirectArgs::SIZE as u32,
            });
        }
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
