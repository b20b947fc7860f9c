//! Renderer integration tests on the headless backend.
//!
//! # Test Categories
//!
//! - **Frame Cycle**: slot rotation and begin/end contract
//! - **Surface**: out-of-date, suboptimal, resize and minimized handling
//! - **Deletion Queue**: retired resources outlive every frame that may use them
//! - **Frame Graph**: default rosters, custom graphs, FrameInfo contents
//! - **Telemetry**: GPU timer resolution and the one-shot benchmark artifact
//! - **Errors and Teardown**: fatal errors and resource release

mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use rstest::rstest;

use common::{DEFAULT_EXTENT, TestContext, grid_scene};
use ember_graphics::backend::{BackendError, GpuCommand, SurfaceStatus};
use ember_graphics::benchmark::{BenchmarkConfig, CaptureState};
use ember_graphics::deletion::RetiredResource;
use ember_graphics::graph::{GeometrySubmission, GraphError, Pass, PassRole};
use ember_graphics::passes::{GeometryPass, GpuDrivenBuffers, GpuDrivenGeometryPass, RenderTargets};
use ember_graphics::profiling::labels;
use ember_graphics::scene::SceneWorld;
use ember_graphics::{
    ErrorKind, Extent2d, FrameInfo, FrameState, GraphicsError, NoUi, RenderScopeBoundary,
    RendererConfig,
};

// ============================================================================
// Frame Cycle
// ============================================================================

#[rstest]
#[case::single(1)]
#[case::double(2)]
#[case::triple(3)]
fn test_frame_slot_follows_frame_count(#[case] frames_in_flight: usize) {
    let mut ctx =
        TestContext::new(RendererConfig::default().with_frames_in_flight(frames_in_flight));
    let scene = grid_scene(10, 5, 2);
    ctx.renderer.scene_initialized(&scene).unwrap();

    for n in 0..10 {
        assert_eq!(ctx.renderer.current_frame_index(), n % frames_in_flight);
        ctx.renderer.render_frame(&scene, &NoUi).unwrap();
    }
    assert_eq!(ctx.renderer.frames_rendered(), 10);
    assert_eq!(ctx.device.stats().submissions, 10);
    assert_eq!(ctx.surface.present_count(), 10);
}

#[test]
fn test_begin_end_state_machine() {
    let mut ctx = TestContext::new(RendererConfig::default());
    assert_eq!(ctx.renderer.frame_state(), FrameState::Idle);

    ctx.renderer.begin_frame().unwrap();
    assert!(ctx.renderer.is_frame_started());
    assert_eq!(ctx.renderer.frame_state(), FrameState::Recording);

    ctx.renderer.end_frame().unwrap();
    assert!(!ctx.renderer.is_frame_started());
    assert_eq!(ctx.renderer.frame_state(), FrameState::Idle);
    assert_eq!(ctx.renderer.current_frame_index(), 1);
}

#[test]
#[should_panic(expected = "Cannot call begin_frame while a frame is already in progress")]
fn test_begin_twice_panics() {
    let mut ctx = TestContext::new(RendererConfig::default());
    ctx.renderer.begin_frame().unwrap();
    let _ = ctx.renderer.begin_frame();
}

#[test]
#[should_panic(expected = "Cannot call end_frame while frame is not in progress")]
fn test_end_without_begin_panics() {
    let mut ctx = TestContext::new(RendererConfig::default());
    let _ = ctx.renderer.end_frame();
}

// ============================================================================
// Surface
// ============================================================================

#[test]
fn test_out_of_date_acquire_is_retried_once() {
    let mut ctx = TestContext::new(RendererConfig::default());
    let scene = grid_scene(4, 0, 1);
    ctx.renderer.scene_initialized(&scene).unwrap();
    ctx.surface.push_acquire_result(Ok(SurfaceStatus::OutOfDate));

    ctx.renderer.render_frame(&scene, &NoUi).unwrap();

    assert_eq!(ctx.surface.acquire_count(), 2);
    assert_eq!(ctx.surface.resize_count(), 1);
    assert_eq!(ctx.surface.present_count(), 1);
    assert_eq!(ctx.device.stats().idle_waits, 1);
}

#[test]
fn test_second_out_of_date_acquire_is_fatal() {
    let mut ctx = TestContext::new(RendererConfig::default());
    ctx.surface.push_acquire_result(Ok(SurfaceStatus::OutOfDate));
    ctx.surface.push_acquire_result(Ok(SurfaceStatus::OutOfDate));

    let err = ctx.renderer.render_frame(&SceneWorld::new(), &NoUi).unwrap_err();

    assert!(matches!(err, GraphicsError::SurfaceOutOfDate));
    assert_eq!(err.kind(), ErrorKind::Surface);
    assert!(err.is_fatal());
    assert!(!ctx.renderer.is_frame_started());
}

#[test]
fn test_suboptimal_acquire_is_tolerated() {
    let mut ctx = TestContext::new(RendererConfig::default());
    ctx.surface.push_acquire_result(Ok(SurfaceStatus::Suboptimal));
    ctx.renderer.render_frame(&SceneWorld::new(), &NoUi).unwrap();
    assert_eq!(ctx.surface.resize_count(), 0);
}

#[rstest]
#[case::suboptimal(SurfaceStatus::Suboptimal)]
#[case::out_of_date(SurfaceStatus::OutOfDate)]
fn test_present_status_triggers_recreation(#[case] status: SurfaceStatus) {
    let mut ctx = TestContext::new(RendererConfig::default());
    ctx.surface.push_present_result(Ok(status));

    ctx.renderer.render_frame(&SceneWorld::new(), &NoUi).unwrap();

    assert_eq!(ctx.surface.resize_count(), 1);
    assert_eq!(ctx.renderer.current_frame_index(), 1);
}

#[test]
fn test_window_resize_flag_recreates_and_clears() {
    use ember_graphics::SurfaceOwner;

    let mut ctx = TestContext::new(RendererConfig::default());
    let scene = grid_scene(4, 0, 1);
    ctx.renderer.scene_initialized(&scene).unwrap();
    let textures_before = ctx.device.stats().live_textures;

    ctx.window.resize(Extent2d::new(800, 600));
    ctx.renderer.render_frame(&scene, &NoUi).unwrap();

    assert_eq!(ctx.surface.resize_count(), 1);
    assert_eq!(ctx.surface.extent(), Extent2d::new(800, 600));
    assert_eq!(ctx.renderer.surface_extent(), Extent2d::new(800, 600));
    assert!(!ctx.window.was_resized());

    // Old attachments wait in the deletion queue until their slot comes back.
    assert!(ctx.renderer.deletion_queue().pending_count() > 0);
    ctx.render_frames(&scene, 2);
    assert_eq!(ctx.renderer.deletion_queue().pending_count(), 0);
    assert_eq!(ctx.device.stats().live_textures, textures_before);
}

#[test]
fn test_minimized_window_waits_for_nonzero_extent() {
    let mut ctx = TestContext::new(RendererConfig::default());
    ctx.window.script_extents([
        Extent2d::new(0, 0),
        Extent2d::new(0, 0),
        Extent2d::new(1920, 1080),
    ]);

    ctx.renderer.render_frame(&SceneWorld::new(), &NoUi).unwrap();

    assert_eq!(ctx.window.wait_events_calls(), 2);
    assert_eq!(ctx.surface.resize_count(), 1);
    assert_eq!(ctx.surface.extent(), Extent2d::new(1920, 1080));
}

// ============================================================================
// Deletion Queue
// ============================================================================

#[rstest]
#[case::single(1)]
#[case::double(2)]
#[case::triple(3)]
fn test_retired_resource_survives_full_cycle(#[case] frames_in_flight: usize) {
    let mut ctx =
        TestContext::new(RendererConfig::default().with_frames_in_flight(frames_in_flight));
    let destroyed = Arc::new(AtomicBool::new(false));

    ctx.renderer.begin_frame().unwrap();
    let slot = ctx.renderer.current_frame_index();
    let flag = Arc::clone(&destroyed);
    ctx.renderer.deletion_queue().push(
        "retired marker",
        RetiredResource::Custom(Box::new(move |_| flag.store(true, Ordering::SeqCst))),
    );
    assert_eq!(ctx.renderer.deletion_queue().pending_in_slot(slot), 1);
    ctx.renderer.end_frame().unwrap();

    for _ in 1..frames_in_flight {
        assert!(!destroyed.load(Ordering::SeqCst));
        ctx.renderer.begin_frame().unwrap();
        ctx.renderer.end_frame().unwrap();
    }
    assert!(destroyed.load(Ordering::SeqCst));
    assert_eq!(ctx.renderer.current_frame_index(), slot);
}

#[test]
fn test_scene_change_retires_gpu_driven_buffers() {
    let mut ctx = TestContext::new(RendererConfig::default());
    let scene = grid_scene(20, 5, 3);
    ctx.renderer.scene_initialized(&scene).unwrap();
    ctx.render_frames(&scene, 3);
    let live_buffers = ctx.device.stats().live_buffers;

    let bigger = grid_scene(200, 50, 3);
    ctx.renderer.scene_changed(&bigger).unwrap();
    assert_eq!(ctx.renderer.draw_batches().instance_count(), 250);
    assert_eq!(ctx.renderer.deletion_queue().pending_count(), 3);

    // The dynamic staging buffers grow once per slot and retire the old ones too.
    ctx.render_frames(&bigger, 3);
    assert_eq!(ctx.renderer.deletion_queue().pending_count(), 0);
    assert!(ctx.device.stats().live_buffers >= live_buffers);
}

// ============================================================================
// Frame Graph
// ============================================================================

#[test]
fn test_scene_initialized_twice_keeps_graph() {
    let mut ctx = TestContext::new(RendererConfig::default());
    let scene = grid_scene(10, 0, 1);

    ctx.renderer.scene_initialized(&scene).unwrap();
    let names = ctx.renderer.frame_graph().pass_names();
    let textures = ctx.device.stats().live_textures;
    ctx.renderer.scene_initialized(&scene).unwrap();

    assert_eq!(ctx.renderer.frame_graph().pass_names(), names);
    assert_eq!(ctx.device.stats().live_textures, textures);
    assert!(ctx.renderer.frame_graph().is_compiled());
}

#[test]
fn test_cpu_driven_frame_draws_every_batch_region() {
    let mut ctx = TestContext::new(
        RendererConfig::default().with_geometry_submission(GeometrySubmission::CpuDriven),
    );
    let scene = grid_scene(30, 10, 4);
    ctx.renderer.scene_initialized(&scene).unwrap();
    ctx.renderer.render_frame(&scene, &NoUi).unwrap();

    let indexed: u32 = ctx
        .device
        .last_submission()
        .iter()
        .filter_map(|command| match command {
            GpuCommand::DrawIndexed { instance_count, .. } => Some(*instance_count),
            _ => None,
        })
        .sum();
    assert_eq!(indexed, 40);
    assert_eq!(ctx.device.stats().indirect_draws, 0);
}

#[test]
fn test_cpu_driven_frame_uploads_only_dynamic_instances() {
    let mut ctx = TestContext::new(
        RendererConfig::default().with_geometry_submission(GeometrySubmission::CpuDriven),
    );
    let scene = grid_scene(30, 10, 4);
    ctx.renderer.scene_initialized(&scene).unwrap();
    // Every slot holds the static prefix after one full rotation.
    ctx.render_frames(&scene, 3);

    let before = ctx.device.stats().bytes_written;
    ctx.renderer.render_frame(&scene, &NoUi).unwrap();
    let steady = ctx.device.stats().bytes_written - before;
    assert!(steady >= 10 * 80, "dynamic instances missing: {steady} bytes");
    assert!(steady < 30 * 80, "static instances re-uploaded: {steady} bytes");

    // A scene change invalidates the static prefix of the next slot.
    ctx.renderer.scene_changed(&scene).unwrap();
    let before = ctx.device.stats().bytes_written;
    ctx.renderer.render_frame(&scene, &NoUi).unwrap();
    assert!(ctx.device.stats().bytes_written - before >= 40 * 80);

    let indexed: u32 = ctx
        .device
        .last_submission()
        .iter()
        .filter_map(|command| match command {
            GpuCommand::DrawIndexed { instance_count, .. } => Some(*instance_count),
            _ => None,
        })
        .sum();
    assert_eq!(indexed, 40);
}

#[test]
fn test_gpu_driven_frame_uploads_only_dynamic_instances() {
    let mut ctx = TestContext::new(RendererConfig::default());
    let scene = grid_scene(30, 10, 4);
    ctx.renderer.scene_initialized(&scene).unwrap();
    ctx.renderer.render_frame(&scene, &NoUi).unwrap();

    let commands = ctx.device.last_submission();
    let copy = commands
        .iter()
        .find_map(|command| match command {
            GpuCommand::CopyBuffer {
                dst_offset, size, ..
            } => Some((*dst_offset, *size)),
            _ => None,
        })
        .expect("dynamic instance copy");
    assert_eq!(copy, (30 * 80, 10 * 80));

    let indirect = commands.iter().find_map(|command| match command {
        GpuCommand::DrawIndexedIndirect { draw_count, .. } => Some(*draw_count),
        _ => None,
    });
    assert_eq!(indirect, Some(4));
    assert!(commands.iter().any(|command| matches!(command, GpuCommand::Dispatch { .. })));
}

#[test]
fn test_conflicting_custom_graph_is_rejected() {
    let mut ctx = TestContext::new(RendererConfig::default());
    let targets = RenderTargets::shared();
    let graph = ctx.renderer.frame_graph_mut();
    graph.add(GeometryPass::new(targets.clone()));
    graph.add(GpuDrivenGeometryPass::new(targets, GpuDrivenBuffers::shared()));

    let err = ctx.renderer.scene_initialized(&SceneWorld::new()).unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Graph);
    assert!(matches!(
        err,
        GraphicsError::Graph(GraphError::ConflictingGeometrySubmission { .. })
    ));
    assert!(!ctx.renderer.frame_graph().is_compiled());
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct SeenFrame {
    frame_index: usize,
    extent: Extent2d,
    aspect_ratio: f32,
    static_instances: u32,
}

struct FrameInfoRecorder {
    seen: Arc<Mutex<Vec<SeenFrame>>>,
}

impl Pass for FrameInfoRecorder {
    fn name(&self) -> &'static str {
        "FrameInfoRecorder"
    }

    fn role(&self) -> PassRole {
        PassRole::Custom
    }

    fn execute(&mut self, frame: &FrameInfo<'_>) -> Result<(), GraphicsError> {
        self.seen.lock().push(SeenFrame {
            frame_index: frame.frame_index,
            extent: frame.swap_chain_extent,
            aspect_ratio: frame.aspect_ratio,
            static_instances: frame.draw_batcher.static_instance_count(),
        });
        Ok(())
    }
}

#[test]
fn test_frame_info_reaches_custom_pass() {
    let mut ctx = TestContext::new(RendererConfig::default());
    let seen = Arc::new(Mutex::new(Vec::new()));
    ctx.renderer.frame_graph_mut().add(FrameInfoRecorder {
        seen: Arc::clone(&seen),
    });

    let scene = grid_scene(7, 3, 1);
    ctx.renderer.scene_initialized(&scene).unwrap();
    assert_eq!(ctx.renderer.frame_graph().pass_names(), ["FrameInfoRecorder"]);
    ctx.render_frames(&scene, 3);

    let seen = seen.lock();
    let indices: Vec<usize> = seen.iter().map(|frame| frame.frame_index).collect();
    assert_eq!(indices, [0, 1, 0]);
    for frame in seen.iter() {
        assert_eq!(frame.extent, DEFAULT_EXTENT);
        assert!((frame.aspect_ratio - 1280.0 / 720.0).abs() < f32::EPSILON);
        assert_eq!(frame.static_instances, 7);
    }
}

// ============================================================================
// Telemetry
// ============================================================================

#[rstest]
#[case::full_frame(RenderScopeBoundary::FullFrame)]
#[case::execute_only(RenderScopeBoundary::ExecuteOnly)]
fn test_timings_are_collected(#[case] render_scope: RenderScopeBoundary) {
    let mut ctx = TestContext::new(RendererConfig::default().with_render_scope(render_scope));
    let scene = grid_scene(10, 10, 2);
    ctx.renderer.scene_initialized(&scene).unwrap();
    ctx.render_frames(&scene, 3);

    let telemetry = ctx.renderer.telemetry();
    for label in [
        labels::FRAME_TIME,
        labels::CPU_RENDER_FRAME,
        labels::GPU_SYNC,
        labels::CULLING,
        labels::INSTANCE_UPDATE,
        labels::GPU_DRIVEN_GEOMETRY,
        labels::LIGHTING,
    ] {
        assert!(telemetry.cpu().last_time(label).is_some(), "CPU {label}");
    }
    for label in [labels::GPU_FRAME_TIME, labels::CULLING, labels::LIGHTING] {
        assert!(telemetry.gpu().last_time(label).is_some(), "GPU {label}");
    }
    assert_eq!(telemetry.cpu().last_time(labels::GEOMETRY), None);
}

#[test]
fn test_benchmark_writes_one_artifact() {
    let dir = tempfile::tempdir().unwrap();
    let output_path = dir.path().join("frame_times.csv");
    let mut ctx = TestContext::new(RendererConfig::default().with_benchmark(BenchmarkConfig {
        warmup_frames: 1000,
        measured_frames: 1000,
        output_path: output_path.clone(),
    }));
    let scene = grid_scene(12, 4, 3);
    ctx.renderer.scene_initialized(&scene).unwrap();

    ctx.render_frames(&scene, 2000);
    assert!(!output_path.exists());
    ctx.render_frames(&scene, 1);

    let capture = ctx.renderer.telemetry().benchmark().unwrap();
    assert_eq!(capture.state(), CaptureState::Written);
    let contents = std::fs::read_to_string(&output_path).unwrap();
    let lines: Vec<&str> = contents.lines().collect();
    assert_eq!(lines[0], "Total instance count,16");
    assert_eq!(lines[1], "Static instances,12");
    assert_eq!(lines[2], "Dynamic instances,4");
    assert_eq!(lines[3], "");
    assert!(lines[4].starts_with("Frame,CPU Total Frame Time (ms),GPU Frame Time (ms),"));
    assert_eq!(lines.len() - 5, 1000);
    assert!(lines[5].starts_with("1,"));
    assert!(lines[1004].starts_with("1000,"));
    assert!(lines[5..].iter().all(|line| line.split(',').count() == 15));

    std::fs::remove_file(&output_path).unwrap();
    ctx.render_frames(&scene, 10);
    assert!(!output_path.exists());
}

#[test]
fn test_benchmark_write_failure_is_not_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let mut ctx = TestContext::new(RendererConfig::default().with_benchmark(BenchmarkConfig {
        warmup_frames: 2,
        measured_frames: 3,
        output_path: dir.path().join("missing").join("frame_times.csv"),
    }));
    let scene = grid_scene(12, 4, 3);
    ctx.renderer.scene_initialized(&scene).unwrap();
    ctx.render_frames(&scene, 5);

    let err = ctx.renderer.render_frame(&scene, &NoUi).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Io);
    assert!(!err.is_fatal());
    assert!(matches!(err, GraphicsError::Io(_)));
    assert_eq!(ctx.renderer.frames_rendered(), 6);

    let capture = ctx.renderer.telemetry().benchmark().unwrap();
    assert_eq!(capture.state(), CaptureState::Failed);
    ctx.render_frames(&scene, 3);
    assert_eq!(ctx.renderer.frames_rendered(), 9);
}

// ============================================================================
// Errors and Teardown
// ============================================================================

#[test]
fn test_submit_failure_is_fatal_device_error() {
    let mut ctx = TestContext::new(RendererConfig::default());
    let scene = grid_scene(4, 1, 1);
    ctx.renderer.scene_initialized(&scene).unwrap();
    ctx.device.set_fail_submit(true);

    let err = ctx.renderer.render_frame(&scene, &NoUi).unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Device);
    assert!(err.is_fatal());
    assert!(matches!(
        err,
        GraphicsError::Backend {
            operation: "submit frame",
            source: BackendError::DeviceLost
        }
    ));
    // The queue never accepted the frame.
    assert_eq!(ctx.renderer.frame_state(), FrameState::Recording);
    assert_eq!(ctx.renderer.frames_rendered(), 0);
}

#[test]
fn test_renderer_creation_failure() {
    use ember_graphics::backend::headless::HeadlessBackend;
    use ember_graphics::Renderer;

    common::init_logging();
    let backend = HeadlessBackend::new(DEFAULT_EXTENT).unwrap();
    backend.device.set_fail_resource_creation(true);
    let result = Renderer::new(
        RendererConfig::default(),
        backend.device.clone(),
        Box::new(backend.surface),
        backend.window.clone(),
    );
    let err = result.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Device);
    assert_eq!(backend.device.stats().live_command_buffers, 0);
}

// Each slot creates a command buffer, a semaphore and a fence; the query
// pool comes after the last slot.
#[rstest]
#[case::second_slot_command_buffer(3)]
#[case::second_slot_semaphore(4)]
#[case::second_slot_fence(5)]
#[case::query_pool(9)]
fn test_partial_creation_failure_releases_created_slots(#[case] successful_creations: u32) {
    use ember_graphics::backend::headless::HeadlessBackend;
    use ember_graphics::Renderer;

    common::init_logging();
    let backend = HeadlessBackend::new(DEFAULT_EXTENT).unwrap();
    let baseline = backend.device.stats();
    backend.device.fail_resource_creation_after(successful_creations);
    let result = Renderer::new(
        RendererConfig::default().with_frames_in_flight(3),
        backend.device.clone(),
        Box::new(backend.surface),
        backend.window.clone(),
    );

    let err = result.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Device);
    let stats = backend.device.stats();
    assert_eq!(stats.live_command_buffers, 0);
    assert_eq!(stats.live_fences, 0);
    assert_eq!(stats.live_semaphores, baseline.live_semaphores);
    assert_eq!(stats.live_query_pools, 0);
}

#[rstest]
#[case::cpu_driven(GeometrySubmission::CpuDriven)]
#[case::gpu_driven(GeometrySubmission::GpuDriven)]
fn test_drop_releases_every_object(#[case] submission: GeometrySubmission) {
    let ctx = {
        let mut ctx =
            TestContext::new(RendererConfig::default().with_geometry_submission(submission));
        let scene = grid_scene(50, 10, 2);
        ctx.renderer.scene_initialized(&scene).unwrap();
        ctx.render_frames(&scene, 4);
        ctx.window.resize(Extent2d::new(640, 480));
        ctx.render_frames(&scene, 1);
        ctx
    };
    let device = Arc::clone(&ctx.device);
    drop(ctx);

    let stats = device.stats();
    assert_eq!(stats.live_fences, 0);
    assert_eq!(stats.live_command_buffers, 0);
    assert_eq!(stats.live_buffers, 0);
    assert_eq!(stats.live_textures, 0);
    assert_eq!(stats.live_query_pools, 0);
    // The surface's present semaphore belongs to the surface, not the renderer.
    assert_eq!(stats.live_semaphores, 1);
}
