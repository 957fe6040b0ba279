//! Material definitions and texture-array slot assignment.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use glam::Vec4;
use tracing::debug;

/// Texture slot meaning "no texture, use the scalar fallback".
pub const NO_TEXTURE: i32 = -1;

/// PBR material properties.
#[derive(Debug, Clone, PartialEq)]
pub struct Material {
    /// Identifier referenced by scene instances
    pub id: u32,
    /// Base color (albedo)
    pub base_color: Vec4,
    /// Metallic factor (0.0 = dielectric, 1.0 = metal)
    pub metallic: f32,
    /// Roughness factor (0.0 = smooth, 1.0 = rough)
    pub roughness: f32,
    /// Ambient occlusion factor
    pub ao: f32,
    /// Packed metallic/roughness/ao texture
    pub physics_texture: Option<PathBuf>,
    pub albedo_texture: Option<PathBuf>,
    pub normal_texture: Option<PathBuf>,
}

impl Default for Material {
    fn default() -> Self {
        Self::new(0)
    }
}

impl Material {
    /// Creates an untextured white material.
    pub fn new(id: u32) -> Self {
        Self {
            id,
            base_color: Vec4::ONE,
            metallic: 0.0,
            roughness: 0.5,
            ao: 1.0,
            physics_texture: None,
            albedo_texture: None,
            normal_texture: None,
        }
    }

    /// Returns the texture path for `kind`, if any.
    pub fn texture(&self, kind: TextureKind) -> Option<&Path> {
        match kind {
            TextureKind::Physics => self.physics_texture.as_deref(),
            TextureKind::Albedo => self.albedo_texture.as_deref(),
            TextureKind::Normal => self.normal_texture.as_deref(),
        }
    }
}

/// The three texture arrays a material can index into.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TextureKind {
    Physics,
    Albedo,
    Normal,
}

impl TextureKind {
    pub const ALL: [TextureKind; 3] = [Self::Physics, Self::Albedo, Self::Normal];

    fn slot(self) -> usize {
        match self {
            Self::Physics => 0,
            Self::Albedo => 1,
            Self::Normal => 2,
        }
    }
}

/// Maps material ids to (physics, albedo, normal) texture-array indices.
///
/// Each kind has its own array. Paths get slots in first-seen order and a
/// path used by several materials shares one slot.
#[derive(Debug, Default, Clone)]
pub struct MaterialIndexTable {
    indices: HashMap<u32, [i32; 3]>,
    layers: [Vec<PathBuf>; 3],
}

impl MaterialIndexTable {
    /// Assigns texture-array slots for every material.
    pub fn build(materials: &[Material]) -> Self {
        let mut table = Self::default();
        let mut seen: [HashMap<PathBuf, i32>; 3] = Default::default();

        for material in materials {
            let mut slots = [NO_TEXTURE; 3];
            for kind in TextureKind::ALL {
                let Some(path) = material.texture(kind) else {
                    continue;
                };
                let layers = &mut table.layers[kind.slot()];
                let slot = *seen[kind.slot()]
                    .entry(path.to_path_buf())
                    .or_insert_with(|| {
                        layers.push(path.to_path_buf());
                        (layers.len() - 1) as i32
                    });
                slots[kind.slot()] = slot;
            }
            table.indices.insert(material.id, slots);
        }

        debug!(
            "Material index table: {} material(s), {}/{}/{} physics/albedo/normal layer(s)",
            table.indices.len(),
            table.layers[0].len(),
            table.layers[1].len(),
            table.layers[2].len()
        );

        table
    }

    /// Texture slots for `material_id`; unknown ids get no textures.
    pub fn lookup(&self, material_id: u32) -> [i32; 3] {
        self.indices
            .get(&material_id)
            .copied()
            .unwrap_or([NO_TEXTURE; 3])
    }

    /// Paths of the array layers for `kind`, in slot order.
    pub fn layers(&self, kind: TextureKind) -> &[PathBuf] {
        &self.layers[kind.slot()]
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}
