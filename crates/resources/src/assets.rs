//! The asset interface consumed by the renderer.

use std::collections::HashSet;

use crate::error::{ResourceError, ResourceResult};
use crate::material::Material;
use crate::mesh::{Mesh, MeshData};

/// Meshes and materials loaded by the host application.
pub trait Assets {
    type Mesh: MeshData;

    fn meshes(&self) -> &[Self::Mesh];

    fn materials(&self) -> &[Material];

    /// Looks a mesh up by identifier.
    fn mesh(&self, id: u32) -> Option<&Self::Mesh> {
        self.meshes().iter().find(|mesh| mesh.id() == id)
    }

    /// Validates every mesh and checks identifiers are unique.
    fn validate(&self) -> ResourceResult<()> {
        let mut mesh_ids = HashSet::new();
        for mesh in self.meshes() {
            mesh.validate()?;
            if !mesh_ids.insert(mesh.id()) {
                return Err(ResourceError::DuplicateMesh(mesh.id()));
            }
        }

        let mut material_ids = HashSet::new();
        for material in self.materials() {
            if !material_ids.insert(material.id) {
                return Err(ResourceError::DuplicateMaterial(material.id));
            }
        }
        Ok(())
    }
}

/// A plain in-memory asset set.
#[derive(Clone, Debug, Default)]
pub struct AssetSet {
    pub meshes: Vec<Mesh>,
    pub materials: Vec<Material>,
}

impl AssetSet {
    pub fn new(meshes: Vec<Mesh>, materials: Vec<Material>) -> Self {
        Self { meshes, materials }
    }
}

impl Assets for AssetSet {
    type Mesh = Mesh;

    fn meshes(&self) -> &[Mesh] {
        &self.meshes
    }

    fn materials(&self) -> &[Material] {
        &self.materials
    }
}
