//! Per-slot frame resources and the per-frame view handed to passes.

use crate::backend::{
    BackendResult, CommandBufferHandle, FenceHandle, GpuCommand, GraphicsDevice, SemaphoreHandle,
};
use crate::batch::DrawBatchRegistry;
use crate::deletion::DeletionQueue;
use crate::profiling::{CpuScope, GpuScope, Telemetry};
use crate::scene::Scene;
use crate::types::Extent2d;
use crate::ui::UiOverlay;

/// Synchronization objects and command buffer of one frame slot.
///
/// Owned by the renderer and reused round-robin. The CPU touches a slot only
/// after waiting on its `in_flight` fence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameContext {
    pub command_buffer: CommandBufferHandle,
    /// Signaled when the acquired image can be written.
    pub image_available: SemaphoreHandle,
    /// Signaled when the slot's submission completed. Created signaled.
    pub in_flight: FenceHandle,
}

impl FrameContext {
    /// Create the slot's objects. Anything created before a failure is released.
    pub fn create(device: &dyn GraphicsDevice) -> BackendResult<Self> {
        let command_buffer = device.allocate_command_buffer()?;

        let image_available = match device.create_semaphore() {
            Ok(semaphore) => semaphore,
            Err(err) => {
                device.free_command_buffer(command_buffer);
                return Err(err);
            }
        };

        let in_flight = match device.create_fence(true) {
            Ok(fence) => fence,
            Err(err) => {
                device.destroy_semaphore(image_available);
                device.free_command_buffer(command_buffer);
                return Err(err);
            }
        };

        Ok(Self {
            command_buffer,
            image_available,
            in_flight,
        })
    }

    /// Release the slot's objects. The device must be idle.
    pub fn destroy(&self, device: &dyn GraphicsDevice) {
        device.destroy_fence(self.in_flight);
        device.destroy_semaphore(self.image_available);
        device.free_command_buffer(self.command_buffer);
    }
}

/// Everything a pass sees while recording one frame.
///
/// Built by [`Renderer::render_frame`](super::Renderer::render_frame) and
/// shared by every pass of the graph. Lives for one frame only.
pub struct FrameInfo<'a> {
    pub scene: &'a dyn Scene,
    pub ui: &'a dyn UiOverlay,
    pub draw_batcher: &'a DrawBatchRegistry,
    /// Command buffer being recorded.
    pub cmd: CommandBufferHandle,
    /// Frame slot, in `0..frames_in_flight`.
    pub frame_index: usize,
    pub swap_chain_extent: Extent2d,
    pub aspect_ratio: f32,
    pub device: &'a dyn GraphicsDevice,
    pub telemetry: &'a Telemetry,
    /// Retire resources replaced while recording.
    pub deletion_queue: &'a DeletionQueue,
}

impl FrameInfo<'_> {
    /// Record a command into this frame's command buffer.
    pub fn record(&self, command: GpuCommand) {
        self.device.record(self.cmd, command);
    }

    /// Time GPU work recorded until the guard drops.
    pub fn gpu_scope(&self, name: &'static str) -> GpuScope<'_> {
        self.telemetry.gpu_scope(self.device, self.cmd, name)
    }

    /// Time CPU work until the guard drops.
    pub fn cpu_scope(&self, name: &'static str) -> CpuScope<'_> {
        self.telemetry.cpu_scope(name)
    }
}

impl std::fmt::Debug for FrameInfo<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameInfo")
            .field("cmd", &self.cmd)
            .field("frame_index", &self.frame_index)
            .field("swap_chain_extent", &self.swap_chain_extent)
            .field("aspect_ratio", &self.aspect_ratio)
            .finish_non_exhaustive()
    }
}
