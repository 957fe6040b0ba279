//! Vertex and instance data structures and input descriptions.
//!
//! The forward pipeline reads two vertex streams:
//!
//! | Binding | Rate | Type | Locations |
//! |---------|------|------|-----------|
//! | 0 | per vertex | [`Vertex`] | 0-3 |
//! | 1 | per instance | [`InstanceAttributes`] | 4-7 |
//!
//! Binding 0 comes from the static geometry buffer, binding 1 from the
//! active virtual frame's slice of the dynamic buffer.

use ash::vk;
use bytemuck::{Pod, Zeroable};
use glam::{IVec3, Mat4, Vec2, Vec3};

/// Tangent used when a mesh provides no tangent stream.
pub const DEFAULT_TANGENT: Vec3 = Vec3::Z;
/// Normal used when a mesh provides no normal stream.
pub const DEFAULT_NORMAL: Vec3 = Vec3::Y;
/// Texture coordinate used when a mesh provides no uv stream.
pub const DEFAULT_UV: Vec2 = Vec2::ZERO;

/// Vertex input binding of [`Vertex`].
pub const VERTEX_BINDING: u32 = 0;
/// Vertex input binding of [`InstanceAttributes`].
pub const INSTANCE_BINDING: u32 = 1;

/// Static mesh vertex.
///
/// # Memory Layout
///
/// The struct uses `#[repr(C)]` to ensure predictable memory layout:
/// - Offset 0: position (12 bytes)
/// - Offset 12: normal (12 bytes)
/// - Offset 24: tangent (12 bytes)
/// - Offset 36: uv (8 bytes)
/// - Total size: 44 bytes
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    /// 3D position in object space.
    pub position: Vec3,
    /// Surface normal vector.
    pub normal: Vec3,
    /// Tangent vector.
    pub tangent: Vec3,
    /// Texture coordinates.
    pub uv: Vec2,
}

impl Default for Vertex {
    fn default() -> Self {
        Self::at(Vec3::ZERO)
    }
}

impl Vertex {
    /// Size of one vertex in the geometry buffer.
    pub const STRIDE: u32 = std::mem::size_of::<Self>() as u32;

    /// Creates a new vertex with the specified attributes.
    #[inline]
    pub const fn new(position: Vec3, normal: Vec3, tangent: Vec3, uv: Vec2) -> Self {
        Self {
            position,
            normal,
            tangent,
            uv,
        }
    }

    /// A vertex at `position` with every other attribute defaulted.
    #[inline]
    pub const fn at(position: Vec3) -> Self {
        Self::new(position, DEFAULT_NORMAL, DEFAULT_TANGENT, DEFAULT_UV)
    }

    /// Get the vertex input binding description.
    pub fn binding_description() -> vk::VertexInputBindingDescription {
        vk::VertexInputBindingDescription {
            binding: VERTEX_BINDING,
            stride: Self::STRIDE,
            input_rate: vk::VertexInputRate::VERTEX,
        }
    }

    /// Get the vertex attribute descriptions.
    pub fn attribute_descriptions() -> [vk::VertexInputAttributeDescription; 4] {
        [
            // Position at location 0
            vk::VertexInputAttributeDescription {
                binding: VERTEX_BINDING,
                location: 0,
                format: vk::Format::R32G32B32_SFLOAT,
                offset: 0,
            },
            // Normal at location 1
            vk::VertexInputAttributeDescription {
                binding: VERTEX_BINDING,
                location: 1,
                format: vk::Format::R32G32B32_SFLOAT,
                offset: 12,
            },
            // Tangent at location 2
            vk::VertexInputAttributeDescription {
                binding: VERTEX_BINDING,
                location: 2,
                format: vk::Format::R32G32B32_SFLOAT,
                offset: 24,
            },
            // UV at location 3
            vk::VertexInputAttributeDescription {
                binding: VERTEX_BINDING,
                location: 3,
                format: vk::Format::R32G32_SFLOAT,
                offset: 36,
            },
        ]
    }
}

/// Per-instance attributes.
///
/// `material` holds the (physics, albedo, normal) texture-array indices,
/// `-1` meaning the material's scalar fallback. `transform` holds the first
/// three rows of the model matrix; the shader rebuilds the fourth as
/// `(0, 0, 0, 1)`.
///
/// # Memory Layout
///
/// - Offset 0: material (12 bytes)
/// - Offset 12: transform rows (3 x 16 bytes)
/// - Total size: 60 bytes
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct InstanceAttributes {
    pub material: IVec3,
    pub transform: [[f32; 4]; 3],
}

impl InstanceAttributes {
    /// Size of one instance record in the dynamic buffer.
    pub const STRIDE: u32 = std::mem::size_of::<Self>() as u32;

    /// Packs `model` row-wise next to the material slots.
    pub fn new(material: [i32; 3], model: &Mat4) -> Self {
        Self {
            material: IVec3::from_array(material),
            transform: [
                model.row(0).to_array(),
                model.row(1).to_array(),
                model.row(2).to_array(),
            ],
        }
    }

    /// Get the instance input binding description.
    pub fn binding_description() -> vk::VertexInputBindingDescription {
        vk::VertexInputBindingDescription {
            binding: INSTANCE_BINDING,
            stride: Self::STRIDE,
            input_rate: vk::VertexInputRate::INSTANCE,
        }
    }

    /// Get the instance attribute descriptions.
    pub fn attribute_descriptions() -> [vk::VertexInputAttributeDescription; 4] {
        [
            // Material slots at location 4
            vk::VertexInputAttributeDescription {
                binding: INSTANCE_BINDING,
                location: 4,
                format: vk::Format::R32G32B32_SINT,
                offset: 0,
            },
            // Transform rows at locations 5-7
            vk::VertexInputAttributeDescription {
                binding: INSTANCE_BINDING,
                location: 5,
                format: vk::Format::R32G32B32A32_SFLOAT,
                offset: 12,
            },
            vk::VertexInputAttributeDescription {
                binding: INSTANCE_BINDING,
                location: 6,
                format: vk::Format::R32G32B32A32_SFLOAT,
                offset: 28,
            },
            vk::VertexInputAttributeDescription {
                binding: INSTANCE_BINDING,
                location: 7,
                format: vk::Format::R32G32B32A32_SFLOAT,
                offset: 44,
            },
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem::offset_of;

    #[test]
    fn test_vertex_size() {
        assert_eq!(std::mem::size_of::<Vertex>(), 44);
        assert_eq!(Vertex::STRIDE, 44);
    }

    #[test]
    fn test_vertex_offsets() {
        let attrs = Vertex::attribute_descriptions();
        assert_eq!(attrs[0].offset as usize, offset_of!(Vertex, position));
        assert_eq!(attrs[1].offset as usize, offset_of!(Vertex, normal));
        assert_eq!(attrs[2].offset as usize, offset_of!(Vertex, tangent));
        assert_eq!(attrs[3].offset as usize, offset_of!(Vertex, uv));
    }

    #[test]
    fn test_vertex_binding_description() {
        let binding = Vertex::binding_description();
        assert_eq!(binding.binding, 0);
        assert_eq!(binding.stride, 44);
        assert_eq!(binding.input_rate, vk::VertexInputRate::VERTEX);
    }

    #[test]
    fn test_vertex_defaults() {
        let vertex = Vertex::at(Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(vertex.normal, Vec3::new(0.0, 1.0, 0.0));
        assert_eq!(vertex.tangent, Vec3::new(0.0, 0.0, 1.0));
        assert_eq!(vertex.uv, Vec2::ZERO);
        assert_eq!(Vertex::default().position, Vec3::ZERO);
    }

    #[test]
    fn test_vertex_pod_cast() {
        let vertices = [Vertex::at(Vec3::X), Vertex::at(Vec3::Y)];
        let bytes: &[u8] = bytemuck::cast_slice(&vertices);
        assert_eq!(bytes.len(), 88);
    }

    #[test]
    fn test_instance_size_and_offsets() {
        assert_eq!(std::mem::size_of::<InstanceAttributes>(), 60);
        let attrs = InstanceAttributes::attribute_descriptions();
        assert_eq!(attrs[0].offset as usize, offset_of!(InstanceAttributes, material));
        assert_eq!(attrs[1].offset as usize, offset_of!(InstanceAttributes, transform));
        assert_eq!(attrs[2].offset - attrs[1].offset, 16);
        assert_eq!(attrs[3].offset - attrs[2].offset, 16);
        assert_eq!(
            attrs.iter().map(|a| a.location).collect::<Vec<_>>(),
            vec![4, 5, 6, 7]
        );
    }

    #[test]
    fn test_instance_binding_is_per_instance() {
        let binding = InstanceAttributes::binding_description();
        assert_eq!(binding.binding, 1);
        assert_eq!(binding.stride, 60);
        assert_eq!(binding.input_rate, vk::VertexInputRate::INSTANCE);
    }

    #[test]
    fn test_instance_transform_rows() {
        let model = Mat4::from_translation(Vec3::new(5.0, 6.0, 7.0));
        let instance = InstanceAttributes::new([0, -1, 2], &model);

        assert_eq!(instance.material, IVec3::new(0, -1, 2));
        assert_eq!(instance.transform[0], [1.0, 0.0, 0.0, 5.0]);
        assert_eq!(instance.transform[1], [0.0, 1.0, 0.0, 6.0]);
        assert_eq!(instance.transform[2], [0.0, 0.0, 1.0, 7.0]);
    }
}
