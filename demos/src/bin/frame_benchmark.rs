//! # Frame Benchmark
//!
//! Drives the renderer on the headless backend over a procedural scene and
//! writes the one-shot benchmark CSV.
//!
//! ```bash
//! # 1000 warm-up and 1000 measured frames of the default scene, GPU-driven
//! frame_benchmark
//!
//! # CPU-driven submission of the mixed scene with three frames in flight
//! frame_benchmark --scene mixed --cpu-driven --frames-in-flight 3
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use ember_demos::DemoScene;
use ember_graphics::backend::headless::HeadlessBackend;
use ember_graphics::benchmark::BenchmarkConfig;
use ember_graphics::profiling::labels;
use ember_graphics::{
    CaptureState, Extent2d, GeometrySubmission, GraphicsError, NoUi, RenderScopeBoundary,
    Renderer, RendererConfig,
};

/// Placement of the "CPU Render Frame" scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
enum CliRenderScope {
    /// Whole tick: begin, graph execution and end.
    #[default]
    FullFrame,
    /// Frame graph execution only.
    ExecuteOnly,
}

impl From<CliRenderScope> for RenderScopeBoundary {
    fn from(cli: CliRenderScope) -> Self {
        match cli {
            CliRenderScope::FullFrame => RenderScopeBoundary::FullFrame,
            CliRenderScope::ExecuteOnly => RenderScopeBoundary::ExecuteOnly,
        }
    }
}

/// Ember frame benchmark arguments.
#[derive(Parser, Debug)]
#[command(
    name = "frame_benchmark",
    about = "Headless frame benchmark of the Ember renderer",
    long_about = "Renders a procedural scene on the headless backend and writes \
        per-frame CPU and GPU timings of the measured window to a CSV file."
)]
struct Args {
    /// Scene to render.
    #[arg(long, value_enum, default_value_t = DemoScene::default())]
    scene: DemoScene,

    /// Cull and draw on the GPU from the bulk instance buffer (default).
    #[arg(long, conflicts_with = "cpu_driven")]
    gpu_driven: bool,

    /// Issue one draw per batch from the CPU.
    #[arg(long)]
    cpu_driven: bool,

    /// Ticks to run. Defaults to warm-up + measured + 1 so the CSV gets written.
    #[arg(long)]
    frames: Option<u64>,

    /// Frames the CPU may record ahead of the GPU.
    #[arg(long, default_value_t = 2, value_parser = clap::value_parser!(u64).range(1..=8))]
    frames_in_flight: u64,

    /// Ticks ignored before capture starts.
    #[arg(long, default_value_t = 1000)]
    warmup: u32,

    /// Ticks captured.
    #[arg(long, default_value_t = 1000)]
    measured: u32,

    /// Benchmark CSV destination.
    #[arg(long, default_value = "frame_times.csv")]
    output: PathBuf,

    /// Placement of the "CPU Render Frame" scope.
    #[arg(long, value_enum, default_value_t = CliRenderScope::default())]
    render_scope: CliRenderScope,

    /// Surface width.
    #[arg(long, default_value_t = 1920)]
    width: u32,

    /// Surface height.
    #[arg(long, default_value_t = 1080)]
    height: u32,
}

impl Args {
    fn geometry_submission(&self) -> GeometrySubmission {
        if self.cpu_driven {
            GeometrySubmission::CpuDriven
        } else {
            GeometrySubmission::GpuDriven
        }
    }

    fn frame_count(&self) -> u64 {
        self.frames
            .unwrap_or(u64::from(self.warmup) + u64::from(self.measured) + 1)
    }

    fn renderer_config(&self) -> RendererConfig {
        RendererConfig::default()
            .with_frames_in_flight(self.frames_in_flight as usize)
            .with_geometry_submission(self.geometry_submission())
            .with_render_scope(self.render_scope.into())
            .with_benchmark(BenchmarkConfig {
                warmup_frames: self.warmup,
                measured_frames: self.measured,
                output_path: self.output.clone(),
            })
    }
}

/// Frame interval statistics in milliseconds.
#[derive(Debug, Default)]
struct FrameStats {
    count: u64,
    total: f64,
    min: f64,
    max: f64,
}

impl FrameStats {
    fn add(&mut self, ms: f64) {
        if self.count == 0 {
            self.min = ms;
            self.max = ms;
        } else {
            self.min = self.min.min(ms);
            self.max = self.max.max(ms);
        }
        self.count += 1;
        self.total += ms;
    }

    fn average(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.total / self.count as f64
        }
    }
}

fn run(args: &Args) -> Result<(), GraphicsError> {
    ember_graphics::init();

    let extent = Extent2d::new(args.width, args.height);
    let backend = HeadlessBackend::new(extent).map_err(|source| GraphicsError::Backend {
        operation: "create headless backend",
        source,
    })?;
    let device = backend.device.clone();

    let mut renderer = Renderer::new(
        args.renderer_config(),
        backend.device,
        Box::new(backend.surface),
        backend.window,
    )?;

    let mut world = args.scene.build();
    renderer.scene_initialized(&world)?;

    let frames = args.frame_count();
    let mut slot_counts = vec![0u64; renderer.frames_in_flight()];
    let mut frame_times = FrameStats::default();
    log::info!(
        "Rendering {} frames of {:?} ({:?}, {} frames in flight)",
        frames,
        args.scene,
        args.geometry_submission(),
        renderer.frames_in_flight()
    );

    for _ in 0..frames {
        args.scene.animate(&mut world);
        slot_counts[renderer.current_frame_index()] += 1;
        if let Err(err) = renderer.render_frame(&world, &NoUi) {
            if err.is_fatal() {
                return Err(err);
            }
            log::warn!("Continuing after {:?} error: {}", err.kind(), err);
        }
        if let Some(ms) = renderer.telemetry().cpu().last_time(labels::FRAME_TIME) {
            frame_times.add(ms);
        }
    }
    renderer.wait_idle()?;

    let stats = device.stats();
    log::info!(
        "{} frames: CPU frame time avg {:.3} ms, min {:.3} ms, max {:.3} ms",
        renderer.frames_rendered(),
        frame_times.average(),
        frame_times.min,
        frame_times.max
    );
    if let Some(gpu_ms) = renderer.telemetry().gpu().last_time(labels::GPU_FRAME_TIME) {
        log::info!("Last GPU frame time {:.3} ms", gpu_ms);
    }
    for (slot, count) in slot_counts.iter().enumerate() {
        log::info!("Frame slot {}: {} frames", slot, count);
    }
    log::info!(
        "Device: {} submissions, {} draws, {} indirect draws, {} dispatches, {} bytes uploaded",
        stats.submissions,
        stats.draw_calls,
        stats.indirect_draws,
        stats.dispatches,
        stats.bytes_written
    );

    match renderer.telemetry().benchmark().map(|capture| capture.state()) {
        Some(CaptureState::Written) => {
            log::info!("Benchmark written to {}", args.output.display());
        }
        Some(CaptureState::Failed) => {
            log::warn!("Benchmark capture failed, see the errors above");
        }
        Some(state) => {
            log::warn!(
                "Benchmark incomplete ({:?}): run at least {} frames",
                state,
                u64::from(args.warmup) + u64::from(args.measured) + 1
            );
        }
        None => {}
    }
    Ok(())
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            log::error!("Frame benchmark failed ({:?}): {}", err.kind(), err);
            ExitCode::FAILURE
        }
    }
}
