//! Common utilities for renderer integration tests.
//!
//! Every test drives a real [`Renderer`] on the headless backend and keeps
//! handles to the device, surface and window to observe what it did.

#![allow(dead_code)]

use std::sync::Arc;

use glam::{Mat4, Vec3};

use ember_graphics::backend::headless::{
    HeadlessBackend, HeadlessDevice, HeadlessWindow, SurfaceController,
};
use ember_graphics::scene::{MaterialId, MaterialType, PointLight, SceneWorld};
use ember_graphics::{Extent2d, Renderer, RendererConfig};

pub const DEFAULT_EXTENT: Extent2d = Extent2d::new(1280, 720);

/// Install a test logger once per test binary.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

// ============================================================================
// Test Context
// ============================================================================

/// A renderer plus handles to its headless collaborators.
pub struct TestContext {
    pub renderer: Renderer,
    pub device: Arc<HeadlessDevice>,
    pub surface: SurfaceController,
    pub window: Arc<HeadlessWindow>,
}

impl TestContext {
    pub fn new(config: RendererConfig) -> Self {
        Self::with_extent(config, DEFAULT_EXTENT)
    }

    pub fn with_extent(config: RendererConfig, extent: Extent2d) -> Self {
        init_logging();
        let backend = HeadlessBackend::new(extent).expect("headless backend");
        let surface = backend.surface.controller();
        let renderer = Renderer::new(
            config,
            backend.device.clone(),
            Box::new(backend.surface),
            backend.window.clone(),
        )
        .expect("renderer creation");

        Self {
            renderer,
            device: backend.device,
            surface,
            window: backend.window,
        }
    }

    /// Render `count` frames of `scene`, panicking on the first error.
    pub fn render_frames(&mut self, scene: &SceneWorld, count: usize) {
        for frame in 0..count {
            if let Err(err) = self.renderer.render_frame(scene, &ember_graphics::NoUi) {
                panic!("frame {frame} failed: {err}");
            }
        }
    }
}

// ============================================================================
// Scenes
// ============================================================================

/// `static_count` static and `dynamic_count` dynamic cubes over `materials`
/// materials, plus two point lights.
pub fn grid_scene(static_count: u32, dynamic_count: u32, materials: u32) -> SceneWorld {
    let mut world = SceneWorld::new();
    let cube = world.add_mesh(36);
    let materials = materials.max(1);

    for i in 0..static_count + dynamic_count {
        let transform = Mat4::from_translation(Vec3::new((i % 100) as f32, 0.0, (i / 100) as f32));
        let material = MaterialId(i % materials);
        if i < static_count {
            world.spawn(cube, material, MaterialType::Opaque, transform);
        } else {
            world.spawn_dynamic(cube, material, MaterialType::Opaque, transform);
        }
    }

    for x in [-5.0, 5.0] {
        world.add_point_light(PointLight {
            position: Vec3::new(x, 3.0, 0.0),
            ..Default::default()
        });
    }
    world
}
