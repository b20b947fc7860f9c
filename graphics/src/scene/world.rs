//! Vec-backed scene.

use glam::Mat4;

use super::{
    Camera, EntityId, Environment, MaterialId, MaterialType, MeshId, MeshInfo, PointLight,
    Renderable, Scene,
};

#[derive(Debug, Clone)]
struct Entity {
    renderable: Renderable,
    transform: Mat4,
}

/// A flat list of entities plus the global scene parameters.
///
/// Entity ids are indices into the list and stay valid for the lifetime of
/// the world; entities are never removed.
///
/// ```
/// use ember_graphics::scene::{MaterialId, MaterialType, Scene, SceneWorld};
/// use glam::Mat4;
///
/// let mut world = SceneWorld::new();
/// let cube = world.add_mesh(36);
/// world.spawn(cube, MaterialId(0), MaterialType::Opaque, Mat4::IDENTITY);
/// world.spawn_dynamic(cube, MaterialId(0), MaterialType::Opaque, Mat4::IDENTITY);
/// assert_eq!(world.entity_count(), 2);
/// ```
#[derive(Debug, Clone, Default)]
pub struct SceneWorld {
    camera: Camera,
    environment: Environment,
    point_lights: Vec<PointLight>,
    meshes: Vec<MeshInfo>,
    entities: Vec<Entity>,
}

impl SceneWorld {
    /// Creates an empty world with a default camera and environment.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a mesh and return its id. Meshes are packed back to back in
    /// the shared index buffer.
    pub fn add_mesh(&mut self, index_count: u32) -> MeshId {
        let first_index = self
            .meshes
            .last()
            .map_or(0, |mesh| mesh.first_index + mesh.index_count);
        self.meshes.push(MeshInfo {
            index_count,
            first_index,
            base_vertex: 0,
        });
        MeshId(self.meshes.len() as u32 - 1)
    }

    /// Add a static entity.
    pub fn spawn(
        &mut self,
        mesh: MeshId,
        material: MaterialId,
        material_type: MaterialType,
        transform: Mat4,
    ) -> EntityId {
        self.push(mesh, material, material_type, transform, false)
    }

    /// Add an entity tagged dynamic.
    pub fn spawn_dynamic(
        &mut self,
        mesh: MeshId,
        material: MaterialId,
        material_type: MaterialType,
        transform: Mat4,
    ) -> EntityId {
        self.push(mesh, material, material_type, transform, true)
    }

    fn push(
        &mut self,
        mesh: MeshId,
        material: MaterialId,
        material_type: MaterialType,
        transform: Mat4,
        dynamic: bool,
    ) -> EntityId {
        let entity = EntityId(self.entities.len() as u32);
        self.entities.push(Entity {
            renderable: Renderable {
                entity,
                mesh,
                material,
                material_type,
                dynamic,
            },
            transform,
        });
        entity
    }

    /// Replace an entity's transform. Returns false for unknown ids.
    pub fn set_transform(&mut self, entity: EntityId, transform: Mat4) -> bool {
        match self.entities.get_mut(entity.0 as usize) {
            Some(slot) => {
                slot.transform = transform;
                true
            }
            None => false,
        }
    }

    /// Apply `update` to the transform of every dynamic entity.
    pub fn update_dynamic(&mut self, mut update: impl FnMut(EntityId, &mut Mat4)) {
        for entity in self.entities.iter_mut().filter(|e| e.renderable.dynamic) {
            update(entity.renderable.entity, &mut entity.transform);
        }
    }

    pub fn add_point_light(&mut self, light: PointLight) {
        self.point_lights.push(light);
    }

    pub fn camera_mut(&mut self) -> &mut Camera {
        &mut self.camera
    }

    pub fn environment_mut(&mut self) -> &mut Environment {
        &mut self.environment
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }
}

impl Scene for SceneWorld {
    fn camera(&self) -> &Camera {
        &self.camera
    }

    fn environment(&self) -> &Environment {
        &self.environment
    }

    fn point_lights(&self) -> &[PointLight] {
        &self.point_lights
    }

    fn for_each_renderable(&self, visit: &mut dyn FnMut(&Renderable)) {
        for entity in &self.entities {
            visit(&entity.renderable);
        }
    }

    fn transform(&self, entity: EntityId) -> Option<Mat4> {
        self.entities.get(entity.0 as usize).map(|e| e.transform)
    }

    fn mesh_info(&self, mesh: MeshId) -> Option<MeshInfo> {
        self.meshes.get(mesh.0 as usize).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    #[test]
    fn test_meshes_are_packed() {
        let mut world = SceneWorld::new();
        let a = world.add_mesh(36);
        let b = world.add_mesh(6);
        assert_eq!(world.mesh_info(a).unwrap().first_index, 0);
        assert_eq!(world.mesh_info(b).unwrap().first_index, 36);
        assert!(world.mesh_info(MeshId(7)).is_none());
    }

    #[test]
    fn test_update_dynamic_only_touches_dynamic() {
        let mut world = SceneWorld::new();
        let mesh = world.add_mesh(36);
        let still = world.spawn(mesh, MaterialId(0), MaterialType::Opaque, Mat4::IDENTITY);
        let moving = world.spawn_dynamic(mesh, MaterialId(0), MaterialType::Opaque, Mat4::IDENTITY);

        let offset = Mat4::from_translation(Vec3::X);
        world.update_dynamic(|_, transform| *transform = offset * *transform);

        assert_eq!(world.transform(still), Some(Mat4::IDENTITY));
        assert_eq!(world.transform(moving), Some(offset));
    }

    #[test]
    fn test_set_transform_unknown_entity() {
        let mut world = SceneWorld::new();
        assert!(!world.set_transform(EntityId(3), Mat4::IDENTITY));
    }

    #[test]
    fn test_renderables_visit_in_spawn_order() {
        let mut world = SceneWorld::new();
        let mesh = world.add_mesh(3);
        for material in 0..4 {
            world.spawn(mesh, MaterialId(material), MaterialType::Opaque, Mat4::IDENTITY);
        }
        let mut seen = Vec::new();
        world.for_each_renderable(&mut |r| seen.push(r.entity.0));
        assert_eq!(seen, vec![0, 1, 2, 3]);
    }
}
