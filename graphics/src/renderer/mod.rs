//! Frame orchestration.
//!
//! [`Renderer`] owns one [`FrameContext`] per frame in flight and drives a
//! single begin / execute / end state machine over them, one slot at a time.
//!
//! # Frame Lifecycle
//!
//! ```text
//!          begin_frame()              end_frame()
//!   Idle ───────────────▶ Recording ───────────────▶ Submitted ──▶ Idle
//!    ▲   wait slot fence              wait image in flight           │
//!    │   acquire image                submit, present                │
//!    │   resolve GPU timers           advance slot, flush deletions  │
//!    └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! [`Renderer::render_frame`] runs the whole cycle once and executes the
//! [`FrameGraph`] in between.
//!
//! # Synchronization Model
//!
//! | Wait | Where | Guards |
//! |------|-------|--------|
//! | Slot fence | `begin_frame` | The slot's command buffer and semaphores |
//! | Image in flight | `end_frame` | A presentable image still used by an older slot |
//! | Next slot fence | `end_frame` | Resources retired into that slot's deletion queue |
//! | Device idle | `recreate_swap_chain`, teardown | Everything |
//!
//! Every wait is unbounded. A wait that fails is fatal.
//!
//! # Errors
//!
//! Out-of-date and suboptimal surfaces are handled internally. Every other
//! failure is returned as a [`GraphicsError`]; the application is expected to
//! log it and stop. Calling [`Renderer::begin_frame`] twice, or
//! [`Renderer::end_frame`] without a frame, panics.
//!
//! # Example
//!
//! ```
//! use ember_graphics::backend::headless::HeadlessBackend;
//! use ember_graphics::renderer::{Renderer, RendererConfig};
//! use ember_graphics::scene::SceneWorld;
//! use ember_graphics::types::Extent2d;
//! use ember_graphics::ui::NoUi;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let backend = HeadlessBackend::new(Extent2d::new(1280, 720))?;
//! let mut renderer = Renderer::new(
//!     RendererConfig::default(),
//!     backend.device.clone(),
//!     Box::new(backend.surface),
//!     backend.window.clone(),
//! )?;
//!
//! let scene = SceneWorld::new();
//! renderer.scene_initialized(&scene)?;
//! for _ in 0..3 {
//!     renderer.render_frame(&scene, &NoUi)?;
//! }
//! assert_eq!(renderer.current_frame_index(), 1);
//! # Ok(())
//! # }
//! ```

mod config;
mod frame;

pub use config::{
    DEFAULT_FRAMES_IN_FLIGHT, DEFAULT_GPU_TIMER_CAPACITY, RenderScopeBoundary, RendererConfig,
};
pub use frame::{FrameContext, FrameInfo};

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::backend::{
    CommandBufferHandle, GraphicsDevice, PresentationSurface, SubmitInfo, SurfaceOwner,
    SurfaceStatus,
};
use crate::batch::DrawBatchRegistry;
use crate::benchmark::BenchmarkCapture;
use crate::deletion::DeletionQueue;
use crate::error::{BackendResultExt, GraphicsError};
use crate::graph::{FrameGraph, PassContext};
use crate::passes;
use crate::profiling::{GpuTimerManager, Telemetry, frame_mark, labels, profile_function};
use crate::scene::Scene;
use crate::types::Extent2d;
use crate::ui::UiOverlay;

/// Where the renderer is in its frame cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FrameState {
    #[default]
    Idle,
    /// Between `begin_frame` and `end_frame`, and after an `end_frame` that
    /// failed before the queue accepted the work.
    Recording,
    /// The frame was submitted; presentation and slot advance are pending.
    Submitted,
}

/// Top-level frame orchestrator.
///
/// Owns the frame slots, the [`FrameGraph`], the [`DrawBatchRegistry`], the
/// [`DeletionQueue`] and the [`Telemetry`] collector. Not thread-safe: drive
/// it from the render thread only.
pub struct Renderer {
    config: RendererConfig,
    device: Arc<dyn GraphicsDevice>,
    surface: Box<dyn PresentationSurface>,
    window: Arc<dyn SurfaceOwner>,
    frames: Vec<FrameContext>,
    current_frame: usize,
    state: FrameState,
    frame_graph: FrameGraph,
    draw_batcher: DrawBatchRegistry,
    deletion_queue: DeletionQueue,
    telemetry: Telemetry,
    frames_rendered: u64,
}

impl Renderer {
    /// Create the frame slots and timers.
    ///
    /// The frame graph stays empty until the first
    /// [`scene_initialized`](Self::scene_initialized), which builds the
    /// default roster unless passes were added through
    /// [`frame_graph_mut`](Self::frame_graph_mut).
    ///
    /// # Panics
    ///
    /// Panics if `config.frames_in_flight` is 0.
    pub fn new(
        config: RendererConfig,
        device: Arc<dyn GraphicsDevice>,
        surface: Box<dyn PresentationSurface>,
        window: Arc<dyn SurfaceOwner>,
    ) -> Result<Self, GraphicsError> {
        assert!(
            config.frames_in_flight > 0,
            "frames_in_flight must be at least 1"
        );

        let mut frames = Vec::with_capacity(config.frames_in_flight);
        for _ in 0..config.frames_in_flight {
            match FrameContext::create(device.as_ref()) {
                Ok(frame) => frames.push(frame),
                Err(err) => {
                    frames.iter().for_each(|frame| frame.destroy(device.as_ref()));
                    return Err(err).during("create frame context");
                }
            }
        }

        let gpu_timers = match GpuTimerManager::new(
            device.as_ref(),
            config.frames_in_flight,
            config.gpu_timer_capacity,
        ) {
            Ok(timers) => timers,
            Err(err) => {
                frames.iter().for_each(|frame| frame.destroy(device.as_ref()));
                return Err(err).during("create GPU timestamp queries");
            }
        };
        let benchmark = config.benchmark.clone().map(BenchmarkCapture::new);

        log::info!(
            "Renderer created on '{}': {} frames in flight, {:?} geometry, surface {}x{} ({} images)",
            device.name(),
            config.frames_in_flight,
            config.geometry_submission,
            surface.extent().width,
            surface.extent().height,
            surface.image_count()
        );

        Ok(Self {
            deletion_queue: DeletionQueue::new(config.frames_in_flight),
            telemetry: Telemetry::new(gpu_timers, benchmark),
            config,
            device,
            surface,
            window,
            frames,
            current_frame: 0,
            state: FrameState::Idle,
            frame_graph: FrameGraph::new(),
            draw_batcher: DrawBatchRegistry::new(),
            frames_rendered: 0,
        })
    }

    /// The scene finished loading.
    ///
    /// Rebuilds the draw batches, builds and compiles the frame graph if
    /// needed, then lets every pass build its scene-derived GPU state.
    pub fn scene_initialized(&mut self, scene: &dyn Scene) -> Result<(), GraphicsError> {
        profile_function!();
        self.draw_batcher.scene_changed(scene);

        if self.frame_graph.is_empty() {
            passes::build_default_frame_graph(
                &mut self.frame_graph,
                self.config.geometry_submission,
            );
        }

        let ctx = PassContext {
            device: &self.device,
            draw_batcher: &self.draw_batcher,
            deletion_queue: &self.deletion_queue,
            extent: self.surface.extent(),
            frames_in_flight: self.config.frames_in_flight,
        };
        self.frame_graph.compile(&ctx)?;
        self.frame_graph.scene_initialized(&ctx, scene)
    }

    /// The scene's entity set changed.
    pub fn scene_changed(&mut self, scene: &dyn Scene) -> Result<(), GraphicsError> {
        profile_function!();
        self.draw_batcher.scene_changed(scene);
        if !self.frame_graph.is_compiled() {
            return Ok(());
        }

        let ctx = PassContext {
            device: &self.device,
            draw_batcher: &self.draw_batcher,
            deletion_queue: &self.deletion_queue,
            extent: self.surface.extent(),
            frames_in_flight: self.config.frames_in_flight,
        };
        self.frame_graph.scene_changed(&ctx, scene)
    }

    /// Render one frame: begin, execute the frame graph, end, then feed the
    /// benchmark capture.
    ///
    /// A benchmark write failure comes back as a non-fatal
    /// [`GraphicsError::Io`] after the frame was presented.
    pub fn render_frame(
        &mut self,
        scene: &dyn Scene,
        ui: &dyn UiOverlay,
    ) -> Result<(), GraphicsError> {
        profile_function!();
        self.telemetry.tick();
        let frame_started = Instant::now();

        let cmd = self.begin_frame()?;

        let execute_started = Instant::now();
        let extent = self.surface.extent();
        let failures = {
            let frame = FrameInfo {
                scene,
                ui,
                draw_batcher: &self.draw_batcher,
                cmd,
                frame_index: self.current_frame,
                swap_chain_extent: extent,
                aspect_ratio: extent.aspect_ratio(),
                device: self.device.as_ref(),
                telemetry: &self.telemetry,
                deletion_queue: &self.deletion_queue,
            };
            let _gpu_frame = frame.gpu_scope(labels::GPU_FRAME_TIME);
            self.frame_graph.execute(&frame)
        };
        if failures > 0 {
            log::trace!("{} passes failed this frame", failures);
        }
        if self.config.render_scope == RenderScopeBoundary::ExecuteOnly {
            self.telemetry
                .cpu()
                .record(labels::CPU_RENDER_FRAME, execute_started.elapsed());
        }

        self.end_frame()?;

        if self.config.render_scope == RenderScopeBoundary::FullFrame {
            self.telemetry
                .cpu()
                .record(labels::CPU_RENDER_FRAME, frame_started.elapsed());
        }
        frame_mark!();
        // The frame is complete; a failed benchmark write is reported after it.
        self.telemetry.sample_benchmark(&self.draw_batcher)
    }

    /// Wait for the current slot, acquire an image and start recording.
    ///
    /// Returns the command buffer of the frame.
    ///
    /// # Panics
    ///
    /// Panics if a frame is already being recorded.
    pub fn begin_frame(&mut self) -> Result<CommandBufferHandle, GraphicsError> {
        assert!(
            self.state != FrameState::Recording,
            "Cannot call begin_frame while a frame is already in progress"
        );
        let frame = self.frames[self.current_frame];

        self.device
            .wait_for_fence(frame.in_flight, Duration::MAX)
            .during("wait for frame fence")?;

        let mut status = self
            .surface
            .acquire_next_image(frame.image_available)
            .during("acquire swapchain image")?;
        if status == SurfaceStatus::OutOfDate {
            log::warn!("Swapchain out of date on acquire, recreating");
            self.recreate_swap_chain()?;
            status = self
                .surface
                .acquire_next_image(frame.image_available)
                .during("acquire swapchain image")?;
            if status == SurfaceStatus::OutOfDate {
                log::error!("Swapchain still out of date after recreation");
                return Err(GraphicsError::SurfaceOutOfDate);
            }
        }
        if status == SurfaceStatus::Suboptimal {
            log::debug!("Swapchain suboptimal on acquire, continuing");
        }

        let cmd = frame.command_buffer;
        self.device
            .reset_command_buffer(cmd)
            .during("reset command buffer")?;
        self.device
            .begin_command_buffer(cmd)
            .during("begin command buffer")?;
        self.telemetry
            .gpu()
            .begin_frame(self.device.as_ref(), cmd, self.current_frame)
            .during("resolve GPU timestamps")?;

        self.state = FrameState::Recording;
        log::trace!(
            "Begin frame {} (slot {})",
            self.frames_rendered,
            self.current_frame
        );
        Ok(cmd)
    }

    /// Submit and present the frame, then advance to the next slot.
    ///
    /// # Panics
    ///
    /// Panics if no frame is being recorded.
    pub fn end_frame(&mut self) -> Result<(), GraphicsError> {
        assert!(
            self.state == FrameState::Recording,
            "Cannot call end_frame while frame is not in progress"
        );
        let frame = self.frames[self.current_frame];

        self.device
            .end_command_buffer(frame.command_buffer)
            .during("end command buffer")?;

        {
            let _sync = self.telemetry.cpu_scope(labels::GPU_SYNC);
            self.surface
                .wait_for_image_in_flight(self.device.as_ref(), frame.in_flight)
                .during("wait for image in flight")?;
        }

        self.device
            .reset_fence(frame.in_flight)
            .during("reset frame fence")?;
        self.device
            .submit(&SubmitInfo {
                command_buffer: frame.command_buffer,
                wait_semaphore: Some(frame.image_available),
                signal_semaphore: Some(self.surface.present_ready_semaphore()),
                fence: Some(frame.in_flight),
            })
            .during("submit frame")?;
        self.state = FrameState::Submitted;

        let status = self.surface.present().during("present swapchain image")?;
        if status.needs_recreation() || self.window.was_resized() {
            log::debug!("Recreating swapchain after present ({:?})", status);
            self.recreate_swap_chain()?;
        }

        let next = (self.current_frame + 1) % self.frames.len();
        self.device
            .wait_for_fence(self.frames[next].in_flight, Duration::MAX)
            .during("wait for frame fence")?;
        self.deletion_queue.flush(next, self.device.as_ref());
        self.deletion_queue.set_current_slot(next);

        log::trace!(
            "End frame {} (slot {} -> {})",
            self.frames_rendered,
            self.current_frame,
            next
        );
        self.current_frame = next;
        self.frames_rendered += 1;
        self.state = FrameState::Idle;
        Ok(())
    }

    /// Resize the swapchain to the window's extent.
    ///
    /// Blocks on window events while the window is minimized. Waits for the
    /// device to go idle before resizing.
    pub fn recreate_swap_chain(&mut self) -> Result<(), GraphicsError> {
        profile_function!();
        let mut extent = self.window.extent();
        while extent.is_zero() {
            log::debug!("Surface has zero extent, waiting for window events");
            self.window.wait_events();
            extent = self.window.extent();
        }

        self.wait_idle()?;
        self.surface.resize(extent).during("resize swapchain")?;
        log::info!("Swapchain recreated at {}x{}", extent.width, extent.height);

        let ctx = PassContext {
            device: &self.device,
            draw_batcher: &self.draw_batcher,
            deletion_queue: &self.deletion_queue,
            extent,
            frames_in_flight: self.config.frames_in_flight,
        };
        self.frame_graph.swap_chain_resized(&ctx)?;
        self.window.reset_resized_flag();
        Ok(())
    }

    /// Block until the device finished all submitted work.
    pub fn wait_idle(&self) -> Result<(), GraphicsError> {
        self.device.wait_idle().during("wait for device idle")
    }

    /// Frame slot that the next `begin_frame` uses.
    pub fn current_frame_index(&self) -> usize {
        self.current_frame
    }

    pub fn frames_in_flight(&self) -> usize {
        self.frames.len()
    }

    /// Whether a frame is being recorded.
    pub fn is_frame_started(&self) -> bool {
        self.state == FrameState::Recording
    }

    pub fn frame_state(&self) -> FrameState {
        self.state
    }

    /// Number of frames that completed `end_frame`.
    pub fn frames_rendered(&self) -> u64 {
        self.frames_rendered
    }

    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    pub fn device(&self) -> &Arc<dyn GraphicsDevice> {
        &self.device
    }

    pub fn surface_extent(&self) -> Extent2d {
        self.surface.extent()
    }

    pub fn frame_graph(&self) -> &FrameGraph {
        &self.frame_graph
    }

    /// Mutable access to the frame graph, e.g. to register a custom roster
    /// before the first `scene_initialized`.
    pub fn frame_graph_mut(&mut self) -> &mut FrameGraph {
        &mut self.frame_graph
    }

    pub fn draw_batches(&self) -> &DrawBatchRegistry {
        &self.draw_batcher
    }

    pub fn telemetry(&self) -> &Telemetry {
        &self.telemetry
    }

    pub fn deletion_queue(&self) -> &DeletionQueue {
        &self.deletion_queue
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        if let Err(err) = self.device.wait_idle() {
            log::error!("Failed to wait for device idle during teardown: {}", err);
        }

        let device = self.device.as_ref();
        let flushed = self.deletion_queue.flush_all(device);
        self.frame_graph.release(device);
        self.telemetry.destroy(device);
        for frame in &self.frames {
            frame.destroy(device);
        }
        log::debug!(
            "Renderer destroyed after {} frames ({} retired resources flushed)",
            self.frames_rendered,
            flushed
        );
    }
}

impl std::fmt::Debug for Renderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Renderer")
            .field("config", &self.config)
            .field("current_frame", &self.current_frame)
            .field("state", &self.state)
            .field("frame_graph", &self.frame_graph)
            .field("frames_rendered", &self.frames_rendered)
            .finish_non_exhaustive()
    }
}
