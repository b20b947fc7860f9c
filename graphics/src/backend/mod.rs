//! Interfaces to the GPU, the presentation surface and the window.
//!
//! The renderer only talks to these three collaborators:
//!
//! | Trait | Role |
//! |-------|------|
//! | [`GraphicsDevice`] | Synchronization objects, command buffers, submission, resources, timestamp queries |
//! | [`PresentationSurface`] | Swapchain: acquire, image-in-flight tracking, present, resize |
//! | [`SurfaceOwner`] | Window: pixel extent, resize flag, blocking event wait |
//!
//! # Available Backends
//!
//! - [`headless`]: in-process implementation of all three traits for tests,
//!   benchmarks and CI machines without a GPU.
//!
//! # Surface Status
//!
//! Acquire and present succeed with a [`SurfaceStatus`]. `OutOfDate` and
//! `Suboptimal` are expected states handled inside the renderer. Any
//! `Err(BackendError)` from these calls is fatal.

mod command;
mod error;
pub mod headless;

use std::time::Duration;

pub use command::{
    BufferHandle, CommandBufferHandle, FenceHandle, GpuCommand, QueryPoolHandle, SemaphoreHandle,
    SubmitInfo, TextureHandle,
};
pub use error::{BackendError, BackendResult};

use crate::types::{BufferDescriptor, Extent2d, TextureDescriptor};

/// Outcome of a successful acquire or present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SurfaceStatus {
    /// The surface matches the window.
    #[default]
    Optimal,
    /// Usable, but no longer matches the window exactly.
    Suboptimal,
    /// Unusable until the swapchain is recreated.
    OutOfDate,
}

impl SurfaceStatus {
    /// Whether the swapchain should be recreated after presenting.
    pub fn needs_recreation(&self) -> bool {
        !matches!(self, Self::Optimal)
    }
}

/// Device and graphics queue.
///
/// All methods take `&self`; implementations synchronize internally so the
/// device can be shared with passes through an `Arc`.
pub trait GraphicsDevice: Send + Sync {
    /// Human-readable backend name.
    fn name(&self) -> &str;

    // Synchronization

    fn create_fence(&self, signaled: bool) -> BackendResult<FenceHandle>;
    fn destroy_fence(&self, fence: FenceHandle);
    /// Block until the fence is signaled or `timeout` elapses.
    fn wait_for_fence(&self, fence: FenceHandle, timeout: Duration) -> BackendResult<()>;
    fn reset_fence(&self, fence: FenceHandle) -> BackendResult<()>;
    fn is_fence_signaled(&self, fence: FenceHandle) -> BackendResult<bool>;
    fn create_semaphore(&self) -> BackendResult<SemaphoreHandle>;
    fn destroy_semaphore(&self, semaphore: SemaphoreHandle);

    // Command recording and submission

    fn allocate_command_buffer(&self) -> BackendResult<CommandBufferHandle>;
    fn free_command_buffer(&self, command_buffer: CommandBufferHandle);
    fn reset_command_buffer(&self, command_buffer: CommandBufferHandle) -> BackendResult<()>;
    fn begin_command_buffer(&self, command_buffer: CommandBufferHandle) -> BackendResult<()>;
    fn end_command_buffer(&self, command_buffer: CommandBufferHandle) -> BackendResult<()>;
    /// Append a command. Recording into a buffer that is not recording is a
    /// programming error and may panic.
    fn record(&self, command_buffer: CommandBufferHandle, command: GpuCommand);
    fn submit(&self, submit: &SubmitInfo) -> BackendResult<()>;
    /// Block until all submitted work has finished.
    fn wait_idle(&self) -> BackendResult<()>;

    // Resources

    fn create_buffer(&self, descriptor: &BufferDescriptor) -> BackendResult<BufferHandle>;
    /// Write host data into a buffer created with `HOST_WRITE`.
    fn write_buffer(&self, buffer: BufferHandle, offset: u64, data: &[u8]) -> BackendResult<()>;
    fn destroy_buffer(&self, buffer: BufferHandle);
    fn create_texture(&self, descriptor: &TextureDescriptor) -> BackendResult<TextureHandle>;
    fn destroy_texture(&self, texture: TextureHandle);

    // Timestamp queries

    fn create_query_pool(&self, count: u32) -> BackendResult<QueryPoolHandle>;
    fn destroy_query_pool(&self, pool: QueryPoolHandle);
    /// Raw timestamps of `count` queries starting at `first`, or `None` while
    /// any of them is still pending on the GPU.
    fn query_results(
        &self,
        pool: QueryPoolHandle,
        first: u32,
        count: u32,
    ) -> BackendResult<Option<Vec<u64>>>;
    /// Nanoseconds per timestamp tick.
    fn timestamp_period_ns(&self) -> f64;
}

/// Swapchain bound to a window surface.
pub trait PresentationSurface: Send {
    /// Current image extent.
    fn extent(&self) -> Extent2d;

    /// Width over height of the current extent.
    fn aspect_ratio(&self) -> f32 {
        self.extent().aspect_ratio()
    }

    /// Number of presentable images.
    fn image_count(&self) -> u32;

    /// Semaphore signaled by the frame's submission and waited on by present.
    fn present_ready_semaphore(&self) -> SemaphoreHandle;

    /// Acquire the next image, signaling `image_available` when it can be written.
    fn acquire_next_image(&mut self, image_available: SemaphoreHandle)
    -> BackendResult<SurfaceStatus>;

    /// Wait until the acquired image is no longer used by an earlier frame,
    /// then mark it as used by the frame guarded by `frame_fence`.
    fn wait_for_image_in_flight(
        &mut self,
        device: &dyn GraphicsDevice,
        frame_fence: FenceHandle,
    ) -> BackendResult<()>;

    /// Queue the acquired image for presentation.
    fn present(&mut self) -> BackendResult<SurfaceStatus>;

    /// Recreate the swapchain images at `extent`.
    fn resize(&mut self, extent: Extent2d) -> BackendResult<()>;
}

/// The window that owns the presentation surface.
pub trait SurfaceOwner: Send + Sync {
    /// Current framebuffer size in pixels; zero while minimized.
    fn extent(&self) -> Extent2d;
    /// Whether the window was resized since the flag was last reset.
    fn was_resized(&self) -> bool;
    /// Clear the resized flag once the renderer has handled it.
    fn reset_resized_flag(&self);
    /// Block until the window system delivers at least one event.
    fn wait_events(&self);
}
