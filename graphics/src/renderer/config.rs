//! Renderer configuration.

use crate::benchmark::BenchmarkConfig;
use crate::graph::GeometrySubmission;

/// Default number of frames the CPU may record ahead of the GPU.
pub const DEFAULT_FRAMES_IN_FLIGHT: usize = 2;

/// Default maximum number of GPU timestamp scopes per frame.
pub const DEFAULT_GPU_TIMER_CAPACITY: u32 = 32;

/// Which part of [`Renderer::render_frame`](super::Renderer::render_frame) the
/// "CPU Render Frame" timer covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RenderScopeBoundary {
    /// Begin, graph execution and end, including the fence and image waits.
    #[default]
    FullFrame,
    /// Graph execution only.
    ExecuteOnly,
}

/// Settings fixed for the lifetime of a [`Renderer`](super::Renderer).
///
/// # Example
///
/// ```
/// use ember_graphics::renderer::{RenderScopeBoundary, RendererConfig};
/// use ember_graphics::graph::GeometrySubmission;
///
/// let config = RendererConfig::default()
///     .with_frames_in_flight(3)
///     .with_geometry_submission(GeometrySubmission::CpuDriven)
///     .with_render_scope(RenderScopeBoundary::ExecuteOnly);
/// assert_eq!(config.frames_in_flight, 3);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct RendererConfig {
    /// Number of frame slots. Must be at least 1.
    pub frames_in_flight: usize,
    /// Geometry strategy of the default frame graph.
    pub geometry_submission: GeometrySubmission,
    pub render_scope: RenderScopeBoundary,
    /// Maximum GPU timestamp scopes per frame; extra scopes are not timed.
    pub gpu_timer_capacity: u32,
    /// One-shot frame timing capture.
    pub benchmark: Option<BenchmarkConfig>,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            frames_in_flight: DEFAULT_FRAMES_IN_FLIGHT,
            geometry_submission: GeometrySubmission::default(),
            render_scope: RenderScopeBoundary::default(),
            gpu_timer_capacity: DEFAULT_GPU_TIMER_CAPACITY,
            benchmark: None,
        }
    }
}

impl RendererConfig {
    pub fn with_frames_in_flight(mut self, frames_in_flight: usize) -> Self {
        self.frames_in_flight = frames_in_flight;
        self
    }

    pub fn with_geometry_submission(mut self, geometry_submission: GeometrySubmission) -> Self {
        self.geometry_submission = geometry_submission;
        self
    }

    pub fn with_render_scope(mut self, render_scope: RenderScopeBoundary) -> Self {
        self.render_scope = render_scope;
        self
    }

    pub fn with_gpu_timer_capacity(mut self, capacity: u32) -> Self {
        self.gpu_timer_capacity = capacity;
        self
    }

    pub fn with_benchmark(mut self, benchmark: BenchmarkConfig) -> Self {
        self.benchmark = Some(benchmark);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RendererConfig::default();
        assert_eq!(config.frames_in_flight, 2);
        assert_eq!(config.geometry_submission, GeometrySubmission::GpuDriven);
        assert_eq!(config.render_scope, RenderScopeBoundary::FullFrame);
        assert_eq!(config.gpu_timer_capacity, 32);
        assert!(config.benchmark.is_none());
    }

    #[test]
    fn test_with_benchmark() {
        let config = RendererConfig::default().with_benchmark(BenchmarkConfig::default());
        assert_eq!(config.benchmark, Some(BenchmarkConfig::default()));
    }
}
