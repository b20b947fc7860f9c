//! Headless backend for tests, benchmarks and machines without a GPU.
//!
//! Nothing is rendered. Submitted work completes immediately: the submission
//! fence is signaled and timestamp queries resolve from a monotonic clock
//! during [`GraphicsDevice::submit`]. Every object is validated the way a
//! driver validation layer would, so misuse of handles or command buffer
//! states surfaces as [`BackendError`]s.
//!
//! The surface and the window can be scripted: acquire/present outcomes are
//! queued through a [`SurfaceController`], and a sequence of window extents
//! is replayed one entry per [`SurfaceOwner::wait_events`] call.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use super::{
    BackendError, BackendResult, BufferHandle, CommandBufferHandle, FenceHandle, GpuCommand,
    GraphicsDevice, PresentationSurface, QueryPoolHandle, SemaphoreHandle, SubmitInfo,
    SurfaceOwner, SurfaceStatus, TextureHandle,
};
use crate::types::{BufferDescriptor, Extent2d, TextureDescriptor};

/// Counters describing what the headless device has been asked to do.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceStats {
    pub submissions: u64,
    pub fence_waits: u64,
    pub idle_waits: u64,
    pub draw_calls: u64,
    pub indirect_draws: u64,
    pub dispatches: u64,
    pub bytes_written: u64,
    pub live_fences: usize,
    pub live_semaphores: usize,
    pub live_command_buffers: usize,
    pub live_buffers: usize,
    pub live_textures: usize,
    pub live_query_pools: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CommandBufferPhase {
    Initial,
    Recording,
    Executable,
}

#[derive(Debug)]
struct CommandBufferState {
    phase: CommandBufferPhase,
    commands: Vec<GpuCommand>,
}

#[derive(Debug, Default)]
struct DeviceState {
    next_handle: u64,
    fences: HashMap<u64, bool>,
    semaphores: HashSet<u64>,
    command_buffers: HashMap<u64, CommandBufferState>,
    buffers: HashMap<u64, u64>,
    textures: HashMap<u64, TextureDescriptor>,
    query_pools: HashMap<u64, Vec<Option<u64>>>,
    last_submission: Vec<GpuCommand>,
    stats: DeviceStats,
    fail_submit: bool,
    fail_resource_creation: bool,
    /// Creations that still succeed before every later one fails.
    creations_before_failure: Option<u32>,
}

impl DeviceState {
    fn allocate_handle(&mut self) -> u64 {
        self.next_handle += 1;
        self.next_handle
    }

    fn check_creation(&mut self, what: &str) -> BackendResult<()> {
        match self.creations_before_failure {
            Some(0) => self.fail_resource_creation = true,
            Some(remaining) => self.creations_before_failure = Some(remaining - 1),
            None => {}
        }
        if self.fail_resource_creation {
            return Err(BackendError::ResourceCreationFailed(format!(
                "injected failure creating {what}"
            )));
        }
        Ok(())
    }

    fn command_buffer(
        &mut self,
        handle: CommandBufferHandle,
    ) -> BackendResult<&mut CommandBufferState> {
        self.command_buffers
            .get_mut(&handle.raw())
            .ok_or_else(|| BackendError::InvalidHandle(format!("{handle:?}")))
    }
}

/// In-process [`GraphicsDevice`].
#[derive(Debug)]
pub struct HeadlessDevice {
    state: Mutex<DeviceState>,
    epoch: Instant,
}

impl Default for HeadlessDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl HeadlessDevice {
    /// Create a new headless device.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(DeviceState::default()),
            epoch: Instant::now(),
        }
    }

    /// Snapshot of the device counters.
    pub fn stats(&self) -> DeviceStats {
        let state = self.state.lock();
        DeviceStats {
            live_fences: state.fences.len(),
            live_semaphores: state.semaphores.len(),
            live_command_buffers: state.command_buffers.len(),
            live_buffers: state.buffers.len(),
            live_textures: state.textures.len(),
            live_query_pools: state.query_pools.len(),
            ..state.stats.clone()
        }
    }

    /// Commands of the most recent submission.
    pub fn last_submission(&self) -> Vec<GpuCommand> {
        self.state.lock().last_submission.clone()
    }

    /// Make every following submission fail with [`BackendError::DeviceLost`].
    pub fn set_fail_submit(&self, fail: bool) {
        self.state.lock().fail_submit = fail;
    }

    /// Make every following object creation fail.
    pub fn set_fail_resource_creation(&self, fail: bool) {
        let mut state = self.state.lock();
        state.fail_resource_creation = fail;
        state.creations_before_failure = None;
    }

    /// Let `count` more object creations succeed, then fail every one after.
    pub fn fail_resource_creation_after(&self, count: u32) {
        let mut state = self.state.lock();
        state.fail_resource_creation = false;
        state.creations_before_failure = Some(count);
    }

    fn now_ticks(&self) -> u64 {
        self.epoch.elapsed().as_nanos() as u64
    }
}

impl GraphicsDevice for HeadlessDevice {
    fn name(&self) -> &str {
        "Headless"
    }

    fn create_fence(&self, signaled: bool) -> BackendResult<FenceHandle> {
        let mut state = self.state.lock();
        state.check_creation("fence")?;
        let raw = state.allocate_handle();
        state.fences.insert(raw, signaled);
        log::trace!("HeadlessDevice: created fence {raw} (signaled: {signaled})");
        Ok(FenceHandle::from_raw(raw))
    }

    fn destroy_fence(&self, fence: FenceHandle) {
        self.state.lock().fences.remove(&fence.raw());
    }

    fn wait_for_fence(&self, fence: FenceHandle, _timeout: Duration) -> BackendResult<()> {
        let mut state = self.state.lock();
        state.stats.fence_waits += 1;
        match state.fences.get(&fence.raw()) {
            Some(true) => Ok(()),
            // Work completes at submit, so an unsignaled fence has nothing
            // pending that could ever signal it.
            Some(false) => Err(BackendError::Timeout),
            None => Err(BackendError::InvalidHandle(format!("{fence:?}"))),
        }
    }

    fn reset_fence(&self, fence: FenceHandle) -> BackendResult<()> {
        let mut state = self.state.lock();
        let signaled = state
            .fences
            .get_mut(&fence.raw())
            .ok_or_else(|| BackendError::InvalidHandle(format!("{fence:?}")))?;
        *signaled = false;
        Ok(())
    }

    fn is_fence_signaled(&self, fence: FenceHandle) -> BackendResult<bool> {
        self.state
            .lock()
            .fences
            .get(&fence.raw())
            .copied()
            .ok_or_else(|| BackendError::InvalidHandle(format!("{fence:?}")))
    }

    fn create_semaphore(&self) -> BackendResult<SemaphoreHandle> {
        let mut state = self.state.lock();
        state.check_creation("semaphore")?;
        let raw = state.allocate_handle();
        state.semaphores.insert(raw);
        Ok(SemaphoreHandle::from_raw(raw))
    }

    fn destroy_semaphore(&self, semaphore: SemaphoreHandle) {
        self.state.lock().semaphores.remove(&semaphore.raw());
    }

    fn allocate_command_buffer(&self) -> BackendResult<CommandBufferHandle> {
        let mut state = self.state.lock();
        state.check_creation("command buffer")?;
        let raw = state.allocate_handle();
        state.command_buffers.insert(
            raw,
            CommandBufferState {
                phase: CommandBufferPhase::Initial,
                commands: Vec::new(),
            },
        );
        Ok(CommandBufferHandle::from_raw(raw))
    }

    fn free_command_buffer(&self, command_buffer: CommandBufferHandle) {
        self.state.lock().command_buffers.remove(&command_buffer.raw());
    }

    fn reset_command_buffer(&self, command_buffer: CommandBufferHandle) -> BackendResult<()> {
        let mut state = self.state.lock();
        let cmd = state.command_buffer(command_buffer)?;
        cmd.phase = CommandBufferPhase::Initial;
        cmd.commands.clear();
        Ok(())
    }

    fn begin_command_buffer(&self, command_buffer: CommandBufferHandle) -> BackendResult<()> {
        let mut state = self.state.lock();
        let cmd = state.command_buffer(command_buffer)?;
        if cmd.phase != CommandBufferPhase::Initial {
            return Err(BackendError::InvalidState(format!(
                "{command_buffer:?} must be reset before recording"
            )));
        }
        cmd.phase = CommandBufferPhase::Recording;
        Ok(())
    }

    fn end_command_buffer(&self, command_buffer: CommandBufferHandle) -> BackendResult<()> {
        let mut state = self.state.lock();
        let cmd = state.command_buffer(command_buffer)?;
        if cmd.phase != CommandBufferPhase::Recording {
            return Err(BackendError::InvalidState(format!(
                "{command_buffer:?} is not recording"
            )));
        }
        cmd.phase = CommandBufferPhase::Executable;
        Ok(())
    }

    fn record(&self, command_buffer: CommandBufferHandle, command: GpuCommand) {
        let mut state = self.state.lock();
        let cmd = state
            .command_buffers
            .get_mut(&command_buffer.raw())
            .unwrap_or_else(|| panic!("recording into unknown {command_buffer:?}"));
        assert!(
            cmd.phase == CommandBufferPhase::Recording,
            "recording into {command_buffer:?} outside begin/end"
        );
        cmd.commands.push(command);
    }

    fn submit(&self, submit: &SubmitInfo) -> BackendResult<()> {
        let now = self.now_ticks();
        let mut state = self.state.lock();
        if state.fail_submit {
            return Err(BackendError::DeviceLost);
        }
        for semaphore in submit.wait_semaphore.iter().chain(&submit.signal_semaphore) {
            if !state.semaphores.contains(&semaphore.raw()) {
                return Err(BackendError::InvalidHandle(format!("{semaphore:?}")));
            }
        }

        let cmd = state.command_buffer(submit.command_buffer)?;
        if cmd.phase != CommandBufferPhase::Executable {
            return Err(BackendError::InvalidState(format!(
                "{:?} submitted without being ended",
                submit.command_buffer
            )));
        }
        let commands = std::mem::take(&mut cmd.commands);

        for command in &commands {
            match *command {
                GpuCommand::Draw { .. } | GpuCommand::DrawIndexed { .. } => {
                    state.stats.draw_calls += 1
                }
                GpuCommand::DrawIndexedIndirect { .. } => state.stats.indirect_draws += 1,
                GpuCommand::Dispatch { .. } => state.stats.dispatches += 1,
                GpuCommand::ResetQueries { pool, first, count } => {
                    if let Some(queries) = state.query_pools.get_mut(&pool.raw()) {
                        let end = (first + count).min(queries.len() as u32) as usize;
                        queries[first as usize..end].fill(None);
                    }
                }
                GpuCommand::WriteTimestamp { pool, query } => {
                    if let Some(slot) = state
                        .query_pools
                        .get_mut(&pool.raw())
                        .and_then(|queries| queries.get_mut(query as usize))
                    {
                        *slot = Some(now);
                    }
                }
                _ => {}
            }
        }

        if let Some(fence) = submit.fence {
            let signaled = state
                .fences
                .get_mut(&fence.raw())
                .ok_or_else(|| BackendError::InvalidHandle(format!("{fence:?}")))?;
            *signaled = true;
        }
        state.stats.submissions += 1;
        state.last_submission = commands;
        log::trace!(
            "HeadlessDevice: submission {} complete",
            state.stats.submissions
        );
        Ok(())
    }

    fn wait_idle(&self) -> BackendResult<()> {
        self.state.lock().stats.idle_waits += 1;
        Ok(())
    }

    fn create_buffer(&self, descriptor: &BufferDescriptor) -> BackendResult<BufferHandle> {
        let mut state = self.state.lock();
        state.check_creation("buffer")?;
        let raw = state.allocate_handle();
        state.buffers.insert(raw, descriptor.size);
        log::trace!(
            "HeadlessDevice: creating buffer {:?} (size: {})",
            descriptor.label,
            descriptor.size
        );
        Ok(BufferHandle::from_raw(raw))
    }

    fn write_buffer(&self, buffer: BufferHandle, offset: u64, data: &[u8]) -> BackendResult<()> {
        let mut state = self.state.lock();
        let size = *state
            .buffers
            .get(&buffer.raw())
            .ok_or_else(|| BackendError::InvalidHandle(format!("{buffer:?}")))?;
        let end = offset + data.len() as u64;
        if end > size {
            return Err(BackendError::InvalidState(format!(
                "write of {} bytes at {offset} overflows {buffer:?} of size {size}",
                data.len()
            )));
        }
        state.stats.bytes_written += data.len() as u64;
        Ok(())
    }

    fn destroy_buffer(&self, buffer: BufferHandle) {
        self.state.lock().buffers.remove(&buffer.raw());
    }

    fn create_texture(&self, descriptor: &TextureDescriptor) -> BackendResult<TextureHandle> {
        let mut state = self.state.lock();
        state.check_creation("texture")?;
        if descriptor.size.is_zero() {
            return Err(BackendError::ResourceCreationFailed(format!(
                "texture {:?} has zero extent",
                descriptor.label
            )));
        }
        let raw = state.allocate_handle();
        log::trace!(
            "HeadlessDevice: creating texture {:?} ({}x{})",
            descriptor.label,
            descriptor.size.width,
            descriptor.size.height
        );
        state.textures.insert(raw, descriptor.clone());
        Ok(TextureHandle::from_raw(raw))
    }

    fn destroy_texture(&self, texture: TextureHandle) {
        self.state.lock().textures.remove(&texture.raw());
    }

    fn create_query_pool(&self, count: u32) -> BackendResult<QueryPoolHandle> {
        let mut state = self.state.lock();
        state.check_creation("query pool")?;
        let raw = state.allocate_handle();
        state.query_pools.insert(raw, vec![None; count as usize]);
        Ok(QueryPoolHandle::from_raw(raw))
    }

    fn destroy_query_pool(&self, pool: QueryPoolHandle) {
        self.state.lock().query_pools.remove(&pool.raw());
    }

    fn query_results(
        &self,
        pool: QueryPoolHandle,
        first: u32,
        count: u32,
    ) -> BackendResult<Option<Vec<u64>>> {
        let state = self.state.lock();
        let queries = state
            .query_pools
            .get(&pool.raw())
            .ok_or_else(|| BackendError::InvalidHandle(format!("{pool:?}")))?;
        let range = first as usize..(first + count) as usize;
        let slice = queries.get(range).ok_or_else(|| {
            BackendError::InvalidState(format!("queries {first}..{} out of range", first + count))
        })?;
        Ok(slice.iter().copied().collect())
    }

    fn timestamp_period_ns(&self) -> f64 {
        1.0
    }
}

#[derive(Debug)]
struct SurfaceState {
    extent: Extent2d,
    image_count: u32,
    next_image: u32,
    acquired_image: Option<u32>,
    images_in_flight: Vec<Option<FenceHandle>>,
    acquire_script: VecDeque<BackendResult<SurfaceStatus>>,
    present_script: VecDeque<BackendResult<SurfaceStatus>>,
    acquire_count: u64,
    present_count: u64,
    resize_count: u64,
}

/// In-process [`PresentationSurface`].
#[derive(Debug)]
pub struct HeadlessSurface {
    state: Arc<Mutex<SurfaceState>>,
    present_ready: SemaphoreHandle,
}

impl HeadlessSurface {
    /// Create a surface with `image_count` presentable images.
    pub fn new(
        device: &dyn GraphicsDevice,
        extent: Extent2d,
        image_count: u32,
    ) -> BackendResult<Self> {
        if image_count == 0 {
            return Err(BackendError::InitializationFailed(
                "surface needs at least one image".to_string(),
            ));
        }
        Ok(Self {
            state: Arc::new(Mutex::new(SurfaceState {
                extent,
                image_count,
                next_image: 0,
                acquired_image: None,
                images_in_flight: vec![None; image_count as usize],
                acquire_script: VecDeque::new(),
                present_script: VecDeque::new(),
                acquire_count: 0,
                present_count: 0,
                resize_count: 0,
            })),
            present_ready: device.create_semaphore()?,
        })
    }

    /// Handle for scripting and inspecting the surface after it has been
    /// moved into the renderer.
    pub fn controller(&self) -> SurfaceController {
        SurfaceController {
            state: Arc::clone(&self.state),
        }
    }
}

impl PresentationSurface for HeadlessSurface {
    fn extent(&self) -> Extent2d {
        self.state.lock().extent
    }

    fn image_count(&self) -> u32 {
        self.state.lock().image_count
    }

    fn present_ready_semaphore(&self) -> SemaphoreHandle {
        self.present_ready
    }

    fn acquire_next_image(
        &mut self,
        _image_available: SemaphoreHandle,
    ) -> BackendResult<SurfaceStatus> {
        let mut state = self.state.lock();
        state.acquire_count += 1;
        let status = state
            .acquire_script
            .pop_front()
            .unwrap_or(Ok(SurfaceStatus::Optimal))?;
        if status != SurfaceStatus::OutOfDate {
            let image = state.next_image;
            state.acquired_image = Some(image);
            state.next_image = (image + 1) % state.image_count;
        }
        Ok(status)
    }

    fn wait_for_image_in_flight(
        &mut self,
        device: &dyn GraphicsDevice,
        frame_fence: FenceHandle,
    ) -> BackendResult<()> {
        let mut state = self.state.lock();
        let image = state
            .acquired_image
            .ok_or_else(|| BackendError::InvalidState("no image acquired".to_string()))?
            as usize;
        if let Some(previous) = state.images_in_flight[image] {
            device.wait_for_fence(previous, Duration::MAX)?;
        }
        state.images_in_flight[image] = Some(frame_fence);
        Ok(())
    }

    fn present(&mut self) -> BackendResult<SurfaceStatus> {
        let mut state = self.state.lock();
        if state.acquired_image.take().is_none() {
            return Err(BackendError::InvalidState(
                "present without an acquired image".to_string(),
            ));
        }
        state.present_count += 1;
        state
            .present_script
            .pop_front()
            .unwrap_or(Ok(SurfaceStatus::Optimal))
    }

    fn resize(&mut self, extent: Extent2d) -> BackendResult<()> {
        let mut state = self.state.lock();
        log::debug!(
            "HeadlessSurface: resizing {}x{} -> {}x{}",
            state.extent.width,
            state.extent.height,
            extent.width,
            extent.height
        );
        state.extent = extent;
        state.next_image = 0;
        state.acquired_image = None;
        state.images_in_flight.iter_mut().for_each(|fence| *fence = None);
        state.resize_count += 1;
        Ok(())
    }
}

/// Scripting and inspection handle of a [`HeadlessSurface`].
#[derive(Debug, Clone)]
pub struct SurfaceController {
    state: Arc<Mutex<SurfaceState>>,
}

impl SurfaceController {
    /// Queue the outcome of a future acquire.
    pub fn push_acquire_result(&self, result: BackendResult<SurfaceStatus>) {
        self.state.lock().acquire_script.push_back(result);
    }

    /// Queue the outcome of a future present.
    pub fn push_present_result(&self, result: BackendResult<SurfaceStatus>) {
        self.state.lock().present_script.push_back(result);
    }

    pub fn acquire_count(&self) -> u64 {
        self.state.lock().acquire_count
    }

    pub fn present_count(&self) -> u64 {
        self.state.lock().present_count
    }

    pub fn resize_count(&self) -> u64 {
        self.state.lock().resize_count
    }

    pub fn extent(&self) -> Extent2d {
        self.state.lock().extent
    }
}

#[derive(Debug)]
struct WindowState {
    extent: Extent2d,
    pending_extents: VecDeque<Extent2d>,
    resized: bool,
    wait_events_calls: u64,
}

/// In-process [`SurfaceOwner`].
#[derive(Debug)]
pub struct HeadlessWindow {
    state: Mutex<WindowState>,
}

impl HeadlessWindow {
    /// Create a window of the given size.
    pub fn new(extent: Extent2d) -> Self {
        Self {
            state: Mutex::new(WindowState {
                extent,
                pending_extents: VecDeque::new(),
                resized: false,
                wait_events_calls: 0,
            }),
        }
    }

    /// Resize immediately and raise the resized flag.
    pub fn resize(&self, extent: Extent2d) {
        let mut state = self.state.lock();
        state.extent = extent;
        state.resized = true;
    }

    /// Replay a sequence of extents: the first applies now, each following
    /// one after a call to [`SurfaceOwner::wait_events`]. Raises the resized flag.
    ///
    /// A script that ends on a zero extent leaves the renderer waiting forever.
    pub fn script_extents(&self, extents: impl IntoIterator<Item = Extent2d>) {
        let mut state = self.state.lock();
        let mut extents: VecDeque<_> = extents.into_iter().collect();
        if let Some(first) = extents.pop_front() {
            state.extent = first;
        }
        state.pending_extents = extents;
        state.resized = true;
    }

    /// Number of times the renderer blocked on window events.
    pub fn wait_events_calls(&self) -> u64 {
        self.state.lock().wait_events_calls
    }
}

impl SurfaceOwner for HeadlessWindow {
    fn extent(&self) -> Extent2d {
        self.state.lock().extent
    }

    fn was_resized(&self) -> bool {
        self.state.lock().resized
    }

    fn reset_resized_flag(&self) {
        self.state.lock().resized = false;
    }

    fn wait_events(&self) {
        let mut state = self.state.lock();
        state.wait_events_calls += 1;
        if let Some(next) = state.pending_extents.pop_front() {
            state.extent = next;
        }
    }
}

/// Device, surface and window wired together.
pub struct HeadlessBackend {
    pub device: Arc<HeadlessDevice>,
    pub surface: HeadlessSurface,
    pub window: Arc<HeadlessWindow>,
}

impl HeadlessBackend {
    /// Default swapchain length of the headless surface.
    pub const IMAGE_COUNT: u32 = 3;

    /// Create a headless backend presenting at `extent`.
    pub fn new(extent: Extent2d) -> BackendResult<Self> {
        let device = Arc::new(HeadlessDevice::new());
        let surface = HeadlessSurface::new(device.as_ref(), extent, Self::IMAGE_COUNT)?;
        Ok(Self {
            device,
            surface,
            window: Arc::new(HeadlessWindow::new(extent)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recorded(device: &HeadlessDevice) -> CommandBufferHandle {
        let cmd = device.allocate_command_buffer().unwrap();
        device.begin_command_buffer(cmd).unwrap();
        cmd
    }

    #[test]
    fn test_submit_signals_fence() {
        let device = HeadlessDevice::new();
        let fence = device.create_fence(false).unwrap();
        let cmd = recorded(&device);
        device.record(cmd, GpuCommand::Dispatch { x: 1, y: 1, z: 1 });
        device.end_command_buffer(cmd).unwrap();

        assert!(!device.is_fence_signaled(fence).unwrap());
        device
            .submit(&SubmitInfo {
                command_buffer: cmd,
                wait_semaphore: None,
                signal_semaphore: None,
                fence: Some(fence),
            })
            .unwrap();

        assert!(device.is_fence_signaled(fence).unwrap());
        assert_eq!(device.stats().dispatches, 1);
        assert_eq!(device.last_submission().len(), 1);
    }

    #[test]
    fn test_wait_on_unsubmitted_fence_times_out() {
        let device = HeadlessDevice::new();
        let fence = device.create_fence(false).unwrap();
        assert_eq!(
            device.wait_for_fence(fence, Duration::MAX),
            Err(BackendError::Timeout)
        );
    }

    #[test]
    fn test_submit_requires_ended_buffer() {
        let device = HeadlessDevice::new();
        let cmd = recorded(&device);
        let result = device.submit(&SubmitInfo {
            command_buffer: cmd,
            wait_semaphore: None,
            signal_semaphore: None,
            fence: None,
        });
        assert!(matches!(result, Err(BackendError::InvalidState(_))));
    }

    #[test]
    fn test_begin_requires_reset() {
        let device = HeadlessDevice::new();
        let cmd = recorded(&device);
        device.end_command_buffer(cmd).unwrap();
        assert!(device.begin_command_buffer(cmd).is_err());
        device.reset_command_buffer(cmd).unwrap();
        assert!(device.begin_command_buffer(cmd).is_ok());
    }

    #[test]
    fn test_timestamps_resolve_on_submit() {
        let device = HeadlessDevice::new();
        let pool = device.create_query_pool(4).unwrap();
        let cmd = recorded(&device);
        device.record(cmd, GpuCommand::WriteTimestamp { pool, query: 0 });
        device.record(cmd, GpuCommand::WriteTimestamp { pool, query: 1 });
        device.end_command_buffer(cmd).unwrap();

        assert_eq!(device.query_results(pool, 0, 2).unwrap(), None);
        device
            .submit(&SubmitInfo {
                command_buffer: cmd,
                wait_semaphore: None,
                signal_semaphore: None,
                fence: None,
            })
            .unwrap();

        let values = device.query_results(pool, 0, 2).unwrap().unwrap();
        assert!(values[1] >= values[0]);
        assert_eq!(device.query_results(pool, 0, 3).unwrap(), None);
    }

    #[test]
    fn test_write_buffer_bounds() {
        let device = HeadlessDevice::new();
        let buffer = device.create_buffer(&BufferDescriptor::new(16, Default::default())).unwrap();
        assert!(device.write_buffer(buffer, 8, &[0; 8]).is_ok());
        assert!(device.write_buffer(buffer, 12, &[0; 8]).is_err());
        assert_eq!(device.stats().bytes_written, 8);
    }

    #[test]
    fn test_fault_injection() {
        let device = HeadlessDevice::new();
        device.set_fail_resource_creation(true);
        assert!(matches!(
            device.create_fence(true),
            Err(BackendError::ResourceCreationFailed(_))
        ));
    }

    #[test]
    fn test_fault_injection_after_count() {
        let device = HeadlessDevice::new();
        device.fail_resource_creation_after(2);
        device.create_fence(true).unwrap();
        device.create_semaphore().unwrap();
        assert!(device.allocate_command_buffer().is_err());
        assert!(device.create_fence(false).is_err());
        assert_eq!(device.stats().live_fences, 1);

        device.set_fail_resource_creation(false);
        device.create_fence(false).unwrap();
    }

    #[test]
    fn test_surface_script() {
        let backend = HeadlessBackend::new(Extent2d::new(800, 600)).unwrap();
        let mut surface = backend.surface;
        let controller = surface.controller();
        let semaphore = backend.device.create_semaphore().unwrap();

        controller.push_acquire_result(Ok(SurfaceStatus::OutOfDate));
        assert_eq!(
            surface.acquire_next_image(semaphore).unwrap(),
            SurfaceStatus::OutOfDate
        );
        assert!(surface.present().is_err());
        assert_eq!(
            surface.acquire_next_image(semaphore).unwrap(),
            SurfaceStatus::Optimal
        );
        assert_eq!(surface.present().unwrap(), SurfaceStatus::Optimal);
        assert_eq!(controller.acquire_count(), 2);
        assert_eq!(controller.present_count(), 1);
    }

    #[test]
    fn test_window_replays_extents() {
        let window = HeadlessWindow::new(Extent2d::new(800, 600));
        window.script_extents([Extent2d::new(0, 0), Extent2d::new(640, 480)]);
        assert!(window.was_resized());
        assert!(window.extent().is_zero());

        window.wait_events();
        assert_eq!(window.extent(), Extent2d::new(640, 480));
        window.wait_events();
        assert_eq!(window.extent(), Extent2d::new(640, 480));
        assert_eq!(window.wait_events_calls(), 2);
    }
}
