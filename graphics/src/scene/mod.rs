//! The scene as seen by the renderer.
//!
//! The renderer never owns or mutates the scene. It reads it through the
//! [`Scene`] trait:
//!
//! - camera, environment and point lights for the lighting-related passes
//! - an entity query ([`Scene::for_each_renderable`]) for the
//!   [`DrawBatchRegistry`](crate::batch::DrawBatchRegistry)
//! - per-entity transforms, re-read every frame for dynamic instances
//!
//! [`SceneWorld`] is a plain Vec-backed implementation for applications that
//! do not bring their own.

mod world;

use glam::{Mat4, Vec3};

pub use world::SceneWorld;

/// Stable identifier of a scene entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId(pub u32);

/// Identifier of a mesh resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MeshId(pub u32);

/// Identifier of a material resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MaterialId(pub u32);

/// Which pass family draws a material.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum MaterialType {
    #[default]
    Opaque,
    Transparent,
}

/// Index range of a mesh inside the shared geometry buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct MeshInfo {
    pub index_count: u32,
    pub first_index: u32,
    pub base_vertex: i32,
}

/// One drawable entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Renderable {
    pub entity: EntityId,
    pub mesh: MeshId,
    pub material: MaterialId,
    pub material_type: MaterialType,
    /// Entities tagged dynamic may move every tick and are re-uploaded every frame.
    pub dynamic: bool,
}

/// Viewer parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Camera {
    pub position: Vec3,
    pub target: Vec3,
    pub fov_y_radians: f32,
    pub near: f32,
    pub far: f32,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            position: Vec3::new(0.0, 2.0, 10.0),
            target: Vec3::ZERO,
            fov_y_radians: 60f32.to_radians(),
            near: 0.1,
            far: 1000.0,
        }
    }
}

impl Camera {
    /// World-to-view matrix.
    pub fn view(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.target, Vec3::Y)
    }

    /// View-to-clip matrix with `[0, 1]` depth.
    pub fn projection(&self, aspect_ratio: f32) -> Mat4 {
        Mat4::perspective_rh(self.fov_y_radians, aspect_ratio, self.near, self.far)
    }

    /// World-to-clip matrix.
    pub fn view_projection(&self, aspect_ratio: f32) -> Mat4 {
        self.projection(aspect_ratio) * self.view()
    }
}

/// Global lighting parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Environment {
    pub sun_direction: Vec3,
    pub sun_color: Vec3,
    pub ambient_intensity: f32,
    /// Whether a skybox cubemap is bound.
    pub has_skybox: bool,
}

impl Default for Environment {
    fn default() -> Self {
        Self {
            sun_direction: Vec3::new(-0.3, -1.0, -0.2).normalize(),
            sun_color: Vec3::ONE,
            ambient_intensity: 0.1,
            has_skybox: true,
        }
    }
}

/// Point light drawn by the transparent pass and accumulated by lighting.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointLight {
    pub position: Vec3,
    pub color: Vec3,
    pub intensity: f32,
    pub radius: f32,
}

impl Default for PointLight {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            color: Vec3::ONE,
            intensity: 1.0,
            radius: 10.0,
        }
    }
}

/// Read-only access to the active scene.
pub trait Scene {
    fn camera(&self) -> &Camera;
    fn environment(&self) -> &Environment;
    fn point_lights(&self) -> &[PointLight];

    /// Visit every drawable entity in a stable order.
    fn for_each_renderable(&self, visit: &mut dyn FnMut(&Renderable));

    /// World transform of an entity.
    fn transform(&self, entity: EntityId) -> Option<Mat4>;

    /// Geometry range of a mesh.
    fn mesh_info(&self, mesh: MeshId) -> Option<MeshInfo>;
}
