//! Procedural benchmark scenes.

use glam::{Mat4, Quat, Vec3};

use ember_graphics::scene::{Camera, MaterialId, MaterialType, MeshId, PointLight, SceneWorld};

/// Index count of a unit cube.
const CUBE_INDICES: u32 = 36;
/// Index count of a 128x128 UV sphere.
const SPHERE_INDICES: u32 = 128 * 128 * 6;
/// Distance between neighbouring instances.
const SPACING: f32 = 2.5;
/// Rotation applied to dynamic entities every tick, in radians.
const SPIN_PER_TICK: f32 = 0.01;

/// Scene populated by the benchmark binary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum DemoScene {
    /// 10 000 static instances of one dense mesh with one material.
    #[default]
    HighPolyHighObject,
    /// 1 000 000 static cubes over 10 materials.
    LowPolyHighObject,
    /// 10 000 cubes spinning every tick.
    DynamicObjects,
    /// 100 000 static and 10 000 dynamic cubes over 4 materials.
    Mixed,
}

impl DemoScene {
    /// `(static, dynamic, materials)` instance layout.
    pub fn layout(self) -> (u32, u32, u32) {
        match self {
            Self::HighPolyHighObject => (10_000, 0, 1),
            Self::LowPolyHighObject => (1_000_000, 0, 10),
            Self::DynamicObjects => (0, 10_000, 1),
            Self::Mixed => (100_000, 10_000, 4),
        }
    }

    fn mesh_indices(self) -> u32 {
        match self {
            Self::HighPolyHighObject => SPHERE_INDICES,
            _ => CUBE_INDICES,
        }
    }

    /// Build the scene: a square grid of instances, a light over each corner
    /// and a camera looking at the grid.
    pub fn build(self) -> SceneWorld {
        let (static_count, dynamic_count, materials) = self.layout();
        let total = static_count + dynamic_count;
        let side = (total as f32).sqrt().ceil().max(1.0) as u32;
        let half = side as f32 * SPACING * 0.5;

        let mut world = SceneWorld::new();
        let mesh = world.add_mesh(self.mesh_indices());
        for i in 0..total {
            let position = Vec3::new(
                (i % side) as f32 * SPACING - half,
                0.0,
                (i / side) as f32 * SPACING - half,
            );
            spawn(&mut world, mesh, i, materials, position, i >= static_count);
        }

        for (x, z) in [(-1.0, -1.0), (1.0, -1.0), (-1.0, 1.0), (1.0, 1.0)] {
            world.add_point_light(PointLight {
                position: Vec3::new(x * half, 10.0, z * half),
                radius: half.max(10.0),
                ..Default::default()
            });
        }

        *world.camera_mut() = Camera {
            position: Vec3::new(0.0, half.max(5.0), half.max(5.0) * 1.5),
            target: Vec3::ZERO,
            far: half * 4.0 + 100.0,
            ..Default::default()
        };

        log::info!(
            "Built {:?}: {} static, {} dynamic instances over {} materials",
            self,
            static_count,
            dynamic_count,
            materials
        );
        world
    }

    /// Advance dynamic entities by one tick.
    pub fn animate(self, world: &mut SceneWorld) {
        if self.layout().1 == 0 {
            return;
        }
        let spin = Mat4::from_quat(Quat::from_rotation_y(SPIN_PER_TICK));
        world.update_dynamic(|_, transform| *transform *= spin);
    }
}

fn spawn(
    world: &mut SceneWorld,
    mesh: MeshId,
    index: u32,
    materials: u32,
    position: Vec3,
    dynamic: bool,
) {
    let material = MaterialId(index % materials);
    let transform = Mat4::from_translation(position);
    if dynamic {
        world.spawn_dynamic(mesh, material, MaterialType::Opaque, transform);
    } else {
        world.spawn(mesh, material, MaterialType::Opaque, transform);
    }
}
