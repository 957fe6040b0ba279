//! Mesh data as provided by an asset loader.

use glam::{Vec2, Vec3};

use crate::error::{ResourceError, ResourceResult};

/// Vertex streams of one mesh.
///
/// Streams may be shorter than [`MeshData::positions`]; the renderer pads the
/// missing entries with default attributes. Longer streams are truncated.
pub trait MeshData {
    /// Stable identifier referenced by scene instances.
    fn id(&self) -> u32;

    fn positions(&self) -> &[Vec3];

    fn normals(&self) -> &[Vec3];

    fn tangents(&self) -> &[Vec3];

    fn uvs(&self) -> &[Vec2];

    fn indices(&self) -> &[u32];

    /// Number of vertices this mesh emits.
    fn vertex_count(&self) -> usize {
        self.positions().len()
    }

    fn index_count(&self) -> usize {
        self.indices().len()
    }

    /// Checks that the mesh has positions and every index is in range.
    fn validate(&self) -> ResourceResult<()> {
        let vertex_count = self.vertex_count();
        if vertex_count == 0 {
            return Err(ResourceError::NoPositionData(self.id()));
        }
        if let Some(&index) = self
            .indices()
            .iter()
            .find(|&&index| index as usize >= vertex_count)
        {
            return Err(ResourceError::IndexOutOfRange {
                mesh: self.id(),
                index,
                vertex_count,
            });
        }
        Ok(())
    }
}

/// An owned mesh.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Mesh {
    pub id: u32,
    pub positions: Vec<Vec3>,
    pub normals: Vec<Vec3>,
    pub tangents: Vec<Vec3>,
    pub uvs: Vec<Vec2>,
    /// Index data
    pub indices: Vec<u32>,
}

impl Mesh {
    /// Creates a mesh with positions and indices only.
    pub fn new(id: u32, positions: Vec<Vec3>, indices: Vec<u32>) -> Self {
        Self {
            id,
            positions,
            indices,
            ..Self::default()
        }
    }

    pub fn with_normals(mut self, normals: Vec<Vec3>) -> Self {
        self.normals = normals;
        self
    }

    pub fn with_tangents(mut self, tangents: Vec<Vec3>) -> Self {
        self.tangents = tangents;
        self
    }

    pub fn with_uvs(mut self, uvs: Vec<Vec2>) -> Self {
        self.uvs = uvs;
        self
    }
}

impl MeshData for Mesh {
    fn id(&self) -> u32 {
        self.id
    }

    fn positions(&self) -> &[Vec3] {
        &self.positions
    }

    fn normals(&self) -> &[Vec3] {
        &self.normals
    }

    fn tangents(&self) -> &[Vec3] {
        &self.tangents
    }

    fn uvs(&self) -> &[Vec2] {
        &self.uvs
    }

    fn indices(&self) -> &[u32] {
        &self.indices
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quad(id: u32) -> Mesh {
        Mesh::new(
            id,
            vec![Vec3::ZERO, Vec3::X, Vec3::new(1.0, 1.0, 0.0), Vec3::Y],
            vec![0, 1, 2, 2, 3, 0],
        )
    }

    #[test]
    fn test_counts() {
        let mesh = quad(7);
        assert_eq!(mesh.vertex_count(), 4);
        assert_eq!(mesh.index_count(), 6);
        assert!(mesh.validate().is_ok());
    }

    #[test]
    fn test_index_out_of_range() {
        let mut mesh = quad(7);
        mesh.indices.push(4);
        assert!(matches!(
            mesh.validate(),
            Err(ResourceError::IndexOutOfRange {
                mesh: 7,
                index: 4,
                vertex_count: 4
            })
        ));
    }

    #[test]
    fn test_empty_mesh_rejected() {
        let mesh = Mesh::new(1, Vec::new(), Vec::new());
        assert!(matches!(mesh.validate(), Err(ResourceError::NoPositionData(1))));
    }
}
