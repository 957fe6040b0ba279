//! Drawn mesh instances.

use glam::Mat4;

/// Identifier of a mesh in the asset set.
pub type MeshId = u32;
/// Identifier of a material in the asset set.
pub type MaterialId = u32;

/// One drawn occurrence of a mesh.
#[derive(Clone, Debug, PartialEq)]
pub struct Instance {
    /// Mesh this instance draws
    pub mesh_id: MeshId,
    /// Material used for shading
    pub material_id: MaterialId,
    /// Whether the transform never changes after load
    pub is_static: bool,
    /// Model matrix (object to world space)
    pub transform: Mat4,
}

impl Instance {
    pub fn new(mesh_id: MeshId, material_id: MaterialId, transform: Mat4) -> Self {
        Self {
            mesh_id,
            material_id,
            is_static: false,
            transform,
        }
    }

    /// Marks the instance as static.
    pub fn with_static(mut self, is_static: bool) -> Self {
        self.is_static = is_static;
        self
    }
}
