//! Per-mesh instance batching.
//!
//! Instances are grouped by mesh in geometry-store order so every mesh is
//! drawn with one instanced call reading a contiguous run of the dynamic
//! instance array.

use tracing::{debug, warn};

use forward_resources::MaterialIndexTable;
use forward_rhi::vertex::InstanceAttributes;
use forward_scene::Scene;

use crate::geometry::MeshRecord;

/// One instanced draw.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DrawBatch {
    pub mesh: MeshRecord,
    /// Index of the batch's first record in the instance array.
    pub first_instance: u32,
    pub instance_count: u32,
}

/// Instance attributes of one frame together with the draws that read them.
#[derive(Clone, Debug, Default)]
pub struct InstanceBatches {
    pub attributes: Vec<InstanceAttributes>,
    pub batches: Vec<DrawBatch>,
}

impl InstanceBatches {
    /// Number of instance records.
    #[inline]
    pub fn instance_count(&self) -> u32 {
        self.attributes.len() as u32
    }
}

/// Number of scene instances that reference a mesh of `records`.
pub fn instance_capacity<S: Scene + ?Sized>(records: &[MeshRecord], scene: &S) -> u32 {
    records
        .iter()
        .map(|record| scene.instances_by_mesh(record.id).len() as u32)
        .sum()
}

/// Groups the scene's instances per mesh.
///
/// At most `capacity` instances are emitted; the rest are dropped with a
/// warning. Instances of meshes missing from `records` are not drawn.
pub fn gather_instances<S: Scene + ?Sized>(
    records: &[MeshRecord],
    scene: &S,
    materials: &MaterialIndexTable,
    capacity: u32,
) -> InstanceBatches {
    let mut out = InstanceBatches::default();
    let mut dropped = 0usize;

    for record in records {
        let instances = scene.instances_by_mesh(record.id);
        if instances.is_empty() {
            continue;
        }

        let room = capacity as usize - out.attributes.len();
        let taken = instances.len().min(room);
        dropped += instances.len() - taken;
        if taken == 0 {
            continue;
        }

        let first_instance = out.attributes.len() as u32;
        out.attributes.extend(instances[..taken].iter().map(|instance| {
            InstanceAttributes::new(materials.lookup(instance.material_id), &instance.transform)
        }));
        out.batches.push(DrawBatch {
            mesh: *record,
            first_instance,
            instance_count: taken as u32,
        });
    }

    if dropped > 0 {
        warn!(
            "Instance capacity {} exceeded, {} instance(s) not drawn",
            capacity, dropped
        );
    }

    let orphaned = scene
        .instances()
        .len()
        .saturating_sub(out.attributes.len() + dropped);
    if orphaned > 0 {
        debug!("{} instance(s) reference meshes without geometry", orphaned);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use forward_resources::Material;
    use forward_scene::{Instance, SceneData};
    use glam::{Mat4, Vec3};

    fn records() -> Vec<MeshRecord> {
        vec![
            MeshRecord {
                id: 10,
                index_count: 3,
                first_index: 0,
                vertex_offset: 0,
            },
            MeshRecord {
                id: 20,
                index_count: 6,
                first_index: 3,
                vertex_offset: 3,
            },
        ]
    }

    fn scene() -> SceneData {
        SceneData {
            instances: vec![
                Instance::new(20, 1, Mat4::from_translation(Vec3::X)),
                Instance::new(10, 1, Mat4::IDENTITY),
                Instance::new(20, 2, Mat4::from_translation(Vec3::Y)),
                Instance::new(99, 1, Mat4::IDENTITY),
            ],
            ..Default::default()
        }
    }

    fn materials() -> MaterialIndexTable {
        let mut textured = Material::new(2);
        textured.albedo_texture = Some("albedo.png".into());
        MaterialIndexTable::build(&[Material::new(1), textured])
    }

    #[test]
    fn test_capacity_counts_known_meshes_only() {
        assert_eq!(instance_capacity(&records(), &scene()), 3);
    }

    #[test]
    fn test_batches_follow_record_order() {
        let out = gather_instances(&records(), &scene(), &materials(), 16);

        assert_eq!(out.instance_count(), 3);
        assert_eq!(out.batches.len(), 2);
        assert_eq!(out.batches[0].mesh.id, 10);
        assert_eq!(out.batches[0].first_instance, 0);
        assert_eq!(out.batches[0].instance_count, 1);
        assert_eq!(out.batches[1].mesh.id, 20);
        assert_eq!(out.batches[1].first_instance, 1);
        assert_eq!(out.batches[1].instance_count, 2);
    }

    #[test]
    fn test_attributes_carry_material_slots_and_transform() {
        let out = gather_instances(&records(), &scene(), &materials(), 16);

        assert_eq!(out.attributes[1].material.to_array(), [-1, -1, -1]);
        assert_eq!(out.attributes[2].material.to_array(), [-1, 0, -1]);
        // Translation sits in the last column of each row
        assert_eq!(out.attributes[1].transform[0][3], 1.0);
        assert_eq!(out.attributes[2].transform[1][3], 1.0);
    }

    #[test]
    fn test_capacity_truncates() {
        let out = gather_instances(&records(), &scene(), &materials(), 2);

        assert_eq!(out.instance_count(), 2);
        assert_eq!(out.batches[1].instance_count, 1);
    }

    #[test]
    fn test_zero_capacity_draws_nothing() {
        let out = gather_instances(&records(), &scene(), &materials(), 0);
        assert!(out.batches.is_empty());
        assert!(out.attributes.is_empty());
    }
}
