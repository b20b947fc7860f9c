//! Draw batching.
//!
//! The [`DrawBatchRegistry`] groups every drawable entity of the scene by
//! `(mesh, material)` and splits each group into static and dynamic
//! instances. It is rebuilt from scratch on every scene change; per-frame
//! work only re-reads the transforms of dynamic instances.
//!
//! # Instance Buffer Layout
//!
//! Passes upload instances into one bulk buffer laid out as:
//!
//! ```text
//! | static: batch 0 | batch 1 | ... | dynamic: batch 0 | batch 1 | ... |
//! 0                                 S                                 S + D
//! ```
//!
//! The static region is written once per scene change. The dynamic region
//! is contiguous, so the per-frame upload is a single write of `D` records.

use std::collections::HashMap;
use std::ops::Range;

use glam::Mat4;

use crate::scene::{EntityId, MaterialId, MaterialType, MeshId, MeshInfo, Scene};

/// Key identifying a draw batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DrawBatchKey {
    pub mesh: MeshId,
    pub material: MaterialId,
}

/// Instances sharing a mesh and a material.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrawBatch {
    pub key: DrawBatchKey,
    pub material_type: MaterialType,
    pub mesh_info: MeshInfo,
    /// Static instances, as indices into the bulk instance buffer.
    pub static_range: Range<u32>,
    /// Dynamic instances, as indices into the bulk instance buffer.
    pub dynamic_range: Range<u32>,
}

impl DrawBatch {
    pub fn static_count(&self) -> u32 {
        self.static_range.len() as u32
    }

    pub fn dynamic_count(&self) -> u32 {
        self.dynamic_range.len() as u32
    }

    pub fn instance_count(&self) -> u32 {
        self.static_count() + self.dynamic_count()
    }
}

/// Per-instance record as stored in the bulk instance buffer.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct InstanceData {
    pub model: [[f32; 4]; 4],
    pub batch_index: u32,
    pub entity: u32,
    pub _padding: [u32; 2],
}

static_assertions::const_assert_eq!(std::mem::size_of::<InstanceData>(), 80);

impl InstanceData {
    /// Size of one record in bytes.
    pub const SIZE: u64 = std::mem::size_of::<Self>() as u64;

    fn new(model: Mat4, batch_index: u32, entity: EntityId) -> Self {
        Self {
            model: model.to_cols_array_2d(),
            batch_index,
            entity: entity.0,
            _padding: [0; 2],
        }
    }
}

/// Groups scene entities into draw batches.
#[derive(Debug, Default)]
pub struct DrawBatchRegistry {
    batches: Vec<DrawBatch>,
    static_entities: Vec<EntityId>,
    dynamic_entities: Vec<EntityId>,
    generation: u64,
}

impl DrawBatchRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Recompute every batch from `scene`, replacing the previous contents.
    pub fn scene_changed(&mut self, scene: &dyn Scene) {
        let mut lookup: HashMap<DrawBatchKey, usize> = HashMap::new();
        let mut batches: Vec<(DrawBatchKey, MaterialType, MeshInfo)> = Vec::new();
        let mut members: Vec<(Vec<EntityId>, Vec<EntityId>)> = Vec::new();

        scene.for_each_renderable(&mut |renderable| {
            let key = DrawBatchKey {
                mesh: renderable.mesh,
                material: renderable.material,
            };
            let index = *lookup.entry(key).or_insert_with(|| {
                let mesh_info = scene.mesh_info(key.mesh).unwrap_or_else(|| {
                    log::warn!("Mesh {:?} has no geometry info; drawing nothing", key.mesh);
                    MeshInfo::default()
                });
                batches.push((key, renderable.material_type, mesh_info));
                members.push((Vec::new(), Vec::new()));
                batches.len() - 1
            });
            let (statics, dynamics) = &mut members[index];
            if renderable.dynamic {
                dynamics.push(renderable.entity);
            } else {
                statics.push(renderable.entity);
            }
        });

        let static_total: usize = members.iter().map(|(s, _)| s.len()).sum();
        let dynamic_total: usize = members.iter().map(|(_, d)| d.len()).sum();

        self.batches.clear();
        self.static_entities = Vec::with_capacity(static_total);
        self.dynamic_entities = Vec::with_capacity(dynamic_total);

        let mut static_offset = 0u32;
        let mut dynamic_offset = static_total as u32;
        for ((key, material_type, mesh_info), (statics, dynamics)) in
            batches.into_iter().zip(members)
        {
            let static_end = static_offset + statics.len() as u32;
            let dynamic_end = dynamic_offset + dynamics.len() as u32;
            self.batches.push(DrawBatch {
                key,
                material_type,
                mesh_info,
                static_range: static_offset..static_end,
                dynamic_range: dynamic_offset..dynamic_end,
            });
            self.static_entities.extend(statics);
            self.dynamic_entities.extend(dynamics);
            static_offset = static_end;
            dynamic_offset = dynamic_end;
        }

        self.generation += 1;
        log::debug!(
            "Draw batches rebuilt: {} batches, {} instances ({} static, {} dynamic)",
            self.batches.len(),
            self.instance_count(),
            self.static_instance_count(),
            self.dynamic_instance_count()
        );
    }

    /// All batches, in the order their first instance was seen.
    pub fn batches(&self) -> &[DrawBatch] {
        &self.batches
    }

    pub fn batch_count(&self) -> usize {
        self.batches.len()
    }

    pub fn instance_count(&self) -> u32 {
        self.static_instance_count() + self.dynamic_instance_count()
    }

    pub fn static_instance_count(&self) -> u32 {
        self.static_entities.len() as u32
    }

    pub fn dynamic_instance_count(&self) -> u32 {
        self.dynamic_entities.len() as u32
    }

    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }

    /// Incremented by every [`scene_changed`](Self::scene_changed).
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Static entities in bulk-buffer order.
    pub fn static_entities(&self) -> &[EntityId] {
        &self.static_entities
    }

    /// Dynamic entities in bulk-buffer order.
    pub fn dynamic_entities(&self) -> &[EntityId] {
        &self.dynamic_entities
    }

    /// Fill `out` with the static region of the bulk instance buffer.
    pub fn write_static_instances(&self, scene: &dyn Scene, out: &mut Vec<InstanceData>) {
        out.clear();
        out.reserve(self.static_entities.len());
        for (batch_index, batch) in self.batches.iter().enumerate() {
            let range = batch.static_range.start as usize..batch.static_range.end as usize;
            write_records(scene, &self.static_entities[range], batch_index as u32, out);
        }
    }

    /// Fill `out` with the dynamic region of the bulk instance buffer.
    pub fn write_dynamic_instances(&self, scene: &dyn Scene, out: &mut Vec<InstanceData>) {
        out.clear();
        out.reserve(self.dynamic_entities.len());
        let base = self.static_entities.len();
        for (batch_index, batch) in self.batches.iter().enumerate() {
            let range = (batch.dynamic_range.start as usize - base)
                ..(batch.dynamic_range.end as usize - base);
            write_records(scene, &self.dynamic_entities[range], batch_index as u32, out);
        }
    }
}

fn write_records(
    scene: &dyn Scene,
    entities: &[EntityId],
    batch_index: u32,
    out: &mut Vec<InstanceData>,
) {
    out.extend(entities.iter().map(|&entity| {
        let model = scene.transform(entity).unwrap_or(Mat4::IDENTITY);
        InstanceData::new(model, batch_index, entity)
    }));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::SceneWorld;
    use glam::Vec3;
    use rstest::rstest;

    fn world(statics: u32, dynamics: u32, materials: u32) -> SceneWorld {
        let mut world = SceneWorld::new();
        let mesh = world.add_mesh(36);
        for i in 0..statics {
            let transform = Mat4::from_translation(Vec3::new(i as f32, 0.0, 0.0));
            world.spawn(mesh, MaterialId(i % materials), MaterialType::Opaque, transform);
        }
        for i in 0..dynamics {
            world.spawn_dynamic(
                mesh,
                MaterialId(i % materials),
                MaterialType::Opaque,
                Mat4::IDENTITY,
            );
        }
        world
    }

    #[rstest]
    #[case(0, 0, 1)]
    #[case(10, 0, 1)]
    #[case(0, 10, 3)]
    #[case(100, 37, 10)]
    fn test_static_plus_dynamic_equals_total(
        #[case] statics: u32,
        #[case] dynamics: u32,
        #[case] materials: u32,
    ) {
        let mut registry = DrawBatchRegistry::new();
        registry.scene_changed(&world(statics, dynamics, materials));

        assert_eq!(registry.static_instance_count(), statics);
        assert_eq!(registry.dynamic_instance_count(), dynamics);
        assert_eq!(
            registry.static_instance_count() + registry.dynamic_instance_count(),
            registry.instance_count()
        );
        let per_batch: u32 = registry.batches().iter().map(DrawBatch::instance_count).sum();
        assert_eq!(per_batch, registry.instance_count());
    }

    #[test]
    fn test_empty_registry() {
        let registry = DrawBatchRegistry::new();
        assert!(registry.is_empty());
        assert_eq!(registry.instance_count(), 0);
        assert_eq!(registry.generation(), 0);
    }

    #[test]
    fn test_batches_in_first_seen_order() {
        let mut world = SceneWorld::new();
        let cube = world.add_mesh(36);
        let quad = world.add_mesh(6);
        world.spawn(quad, MaterialId(2), MaterialType::Opaque, Mat4::IDENTITY);
        world.spawn(cube, MaterialId(1), MaterialType::Transparent, Mat4::IDENTITY);
        world.spawn(quad, MaterialId(2), MaterialType::Opaque, Mat4::IDENTITY);

        let mut registry = DrawBatchRegistry::new();
        registry.scene_changed(&world);

        let keys: Vec<_> = registry.batches().iter().map(|b| b.key).collect();
        assert_eq!(
            keys,
            vec![
                DrawBatchKey { mesh: quad, material: MaterialId(2) },
                DrawBatchKey { mesh: cube, material: MaterialId(1) },
            ]
        );
        assert_eq!(registry.batches()[0].static_count(), 2);
        assert_eq!(registry.batches()[1].material_type, MaterialType::Transparent);
        assert_eq!(registry.batches()[1].mesh_info.index_count, 36);
    }

    #[test]
    fn test_ranges_partition_bulk_buffer() {
        let mut registry = DrawBatchRegistry::new();
        registry.scene_changed(&world(7, 5, 3));

        let statics = registry.static_instance_count();
        let mut next_static = 0;
        let mut next_dynamic = statics;
        for batch in registry.batches() {
            assert_eq!(batch.static_range.start, next_static);
            assert_eq!(batch.dynamic_range.start, next_dynamic);
            next_static = batch.static_range.end;
            next_dynamic = batch.dynamic_range.end;
        }
        assert_eq!(next_static, statics);
        assert_eq!(next_dynamic, registry.instance_count());
    }

    #[test]
    fn test_scene_changed_replaces_previous_state() {
        let mut registry = DrawBatchRegistry::new();
        registry.scene_changed(&world(50, 50, 5));
        registry.scene_changed(&world(3, 1, 1));

        assert_eq!(registry.batch_count(), 1);
        assert_eq!(registry.instance_count(), 4);
        assert_eq!(registry.generation(), 2);
    }

    #[test]
    fn test_write_instances() {
        let scene = world(4, 2, 2);
        let mut registry = DrawBatchRegistry::new();
        registry.scene_changed(&scene);

        let mut statics = Vec::new();
        registry.write_static_instances(&scene, &mut statics);
        assert_eq!(statics.len(), 4);
        // Material 0 batch first: entities 0 and 2.
        assert_eq!(statics[0].entity, 0);
        assert_eq!(statics[1].entity, 2);
        assert_eq!(statics[2].batch_index, 1);
        assert_eq!(statics[1].model[3][0], 2.0);

        let mut dynamics = Vec::new();
        registry.write_dynamic_instances(&scene, &mut dynamics);
        assert_eq!(dynamics.len(), 2);
        assert_eq!(dynamics[0].batch_index, 0);
        assert_eq!(dynamics[1].batch_index, 1);

        let bytes: &[u8] = bytemuck::cast_slice(&dynamics);
        assert_eq!(bytes.len() as u64, 2 * InstanceData::SIZE);
    }
}
