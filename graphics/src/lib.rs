//! # Ember Graphics
//!
//! Frame orchestration core of the Ember renderer.
//!
//! ## Overview
//!
//! This crate provides:
//! - [`Renderer`] - begin / execute / end state machine over N frames in flight
//! - [`FrameGraph`] - ordered passes with scene and resize notifications
//! - [`DrawBatchRegistry`] - `(mesh, material)` batches with static and dynamic instances
//! - [`Telemetry`] - matched CPU and GPU timings plus the one-shot benchmark capture
//! - [`backend`] - device, surface and window interfaces, and an in-process headless backend
//!
//! ## Example
//!
//! ```ignore
//! use ember_graphics::{Renderer, RendererConfig, NoUi};
//!
//! let mut renderer = Renderer::new(RendererConfig::default(), device, surface, window)?;
//! renderer.scene_initialized(&scene)?;
//! while running {
//!     renderer.render_frame(&scene, &NoUi)?;
//! }
//! renderer.wait_idle()?;
//! ```

pub mod backend;
pub mod batch;
pub mod benchmark;
pub mod deletion;
pub mod error;
pub mod graph;
pub mod passes;
pub mod profiling;
pub mod renderer;
pub mod scene;
pub mod types;
pub mod ui;

// Re-export main types for convenience
pub use backend::{
    BackendError, GraphicsDevice, PresentationSurface, SurfaceOwner, SurfaceStatus,
};
pub use batch::{DrawBatch, DrawBatchKey, DrawBatchRegistry, InstanceData};
pub use benchmark::{BenchmarkCapture, BenchmarkConfig, CaptureState};
pub use deletion::{DeletionQueue, RetiredResource};
pub use error::{ErrorKind, GraphicsError};
pub use graph::{
    FrameGraph, GeometrySubmission, GraphError, Pass, PassContext, PassRole, RenderSystem,
};
pub use profiling::Telemetry;
pub use renderer::{FrameInfo, FrameState, RenderScopeBoundary, Renderer, RendererConfig};
pub use scene::{Scene, SceneWorld};
pub use types::Extent2d;
pub use ui::{NoUi, UiOverlay};

/// Graphics library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Log the graphics crate version. Call once at startup.
pub fn init() {
    ember_core::init();
    log::info!("Ember Graphics v{} initialized", VERSION);
}
