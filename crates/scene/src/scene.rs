//! The scene interface consumed by the renderer.

use glam::Vec3;

use crate::camera::CameraParams;
use crate::instance::{Instance, MeshId};
use crate::light::{DirectionalLight, PointLight, SpotLight};

/// Everything the renderer reads from a scene each frame.
///
/// Only the camera, ambient term and instance list are required. Light
/// lists default to empty and [`Scene::instances_by_mesh`] defaults to a
/// linear filter over [`Scene::instances`].
pub trait Scene {
    fn camera(&self) -> CameraParams;

    fn ambient_light(&self) -> Vec3;

    fn instances(&self) -> &[Instance];

    /// Instances drawing `mesh_id`, in scene order.
    fn instances_by_mesh(&self, mesh_id: MeshId) -> Vec<&Instance> {
        self.instances()
            .iter()
            .filter(|instance| instance.mesh_id == mesh_id)
            .collect()
    }

    fn directional_lights(&self) -> &[DirectionalLight] {
        &[]
    }

    fn point_lights(&self) -> &[PointLight] {
        &[]
    }

    fn spot_lights(&self) -> &[SpotLight] {
        &[]
    }
}

/// A plain in-memory scene.
#[derive(Clone, Debug, Default)]
pub struct SceneData {
    pub camera: CameraParams,
    pub ambient: Vec3,
    pub instances: Vec<Instance>,
    pub directional_lights: Vec<DirectionalLight>,
    pub point_lights: Vec<PointLight>,
    pub spot_lights: Vec<SpotLight>,
}

impl Scene for SceneData {
    fn camera(&self) -> CameraParams {
        self.camera
    }

    fn ambient_light(&self) -> Vec3 {
        self.ambient
    }

    fn instances(&self) -> &[Instance] {
        &self.instances
    }

    fn directional_lights(&self) -> &[DirectionalLight] {
        &self.directional_lights
    }

    fn point_lights(&self) -> &[PointLight] {
        &self.point_lights
    }

    fn spot_lights(&self) -> &[SpotLight] {
        &self.spot_lights
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::{Mat4, Vec3};

    fn scene() -> SceneData {
        SceneData {
            instances: vec![
                Instance::new(1, 0, Mat4::IDENTITY),
                Instance::new(2, 0, Mat4::IDENTITY),
                Instance::new(1, 3, Mat4::from_translation(Vec3::X)).with_static(true),
            ],
            ..SceneData::default()
        }
    }

    #[test]
    fn test_instances_by_mesh_filters_in_order() {
        let scene = scene();
        let by_mesh = scene.instances_by_mesh(1);
        assert_eq!(by_mesh.len(), 2);
        assert_eq!(by_mesh[0].material_id, 0);
        assert_eq!(by_mesh[1].material_id, 3);
        assert!(by_mesh[1].is_static);
    }

    #[test]
    fn test_unknown_mesh_has_no_instances() {
        assert!(scene().instances_by_mesh(42).is_empty());
    }

    #[test]
    fn test_default_light_lists_are_empty() {
        struct Bare(Vec<Instance>);
        impl Scene for Bare {
            fn camera(&self) -> CameraParams {
                CameraParams::default()
            }
            fn ambient_light(&self) -> Vec3 {
                Vec3::ZERO
            }
            fn instances(&self) -> &[Instance] {
                &self.0
            }
        }

        let bare = Bare(Vec::new());
        assert!(bare.directional_lights().is_empty());
        assert!(bare.point_lights().is_empty());
        assert!(bare.spot_lights().is_empty());
    }
}
