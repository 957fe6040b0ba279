//! Uniform block layouts for shader data.
//!
//! All structures use `#[repr(C)]` and implement `bytemuck::Pod` so they can
//! be copied into the mapped uniform buffer as bytes.
//!
//! # Overview
//!
//! - [`SceneBlock`] holds camera matrices, camera position and ambient light
//! - [`LightBlock`] describes a count followed by a fixed-capacity light array
//!
//! # GPU Memory Layout
//!
//! All structures follow std140 layout rules for uniform buffers:
//! - `Mat4` is 64 bytes (16 floats)
//! - `Vec3` is 12 bytes but must be aligned to 16 bytes
//! - Array elements are padded to a multiple of 16 bytes
//!
//! # Example
//!
//! ```
//! use forward_resources::uniform::{LightBlock, SceneBlock};
//! use glam::{Mat4, Vec3};
//!
//! let scene = SceneBlock::new(Mat4::IDENTITY, Mat4::IDENTITY, Vec3::ZERO, Vec3::splat(0.1));
//! let bytes: &[u8] = bytemuck::bytes_of(&scene);
//! assert_eq!(bytes.len(), SceneBlock::SIZE);
//!
//! // Four 32-byte lights after the 16-byte header
//! assert_eq!(LightBlock::<[f32; 8]>::block_size(4), 16 + 4 * 32);
//! ```

use std::marker::PhantomData;

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};
use tracing::warn;

use crate::error::{ResourceError, ResourceResult};

/// Scene uniform block.
///
/// # Memory Layout (std140)
///
/// | Offset | Size | Field |
/// |--------|------|-------|
/// | 0      | 64   | view |
/// | 64     | 64   | projection |
/// | 128    | 64   | view_projection |
/// | 192    | 12   | camera_position |
/// | 204    | 4    | _pad0 |
/// | 208    | 12   | ambient |
/// | 220    | 4    | _pad1 |
///
/// Total size: 224 bytes
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct SceneBlock {
    /// View matrix (world space to camera space transformation).
    pub view: Mat4,
    /// Projection matrix (camera space to clip space transformation).
    pub projection: Mat4,
    /// Combined view-projection matrix, `projection * view`.
    pub view_projection: Mat4,
    /// Camera position in world space.
    pub camera_position: Vec3,
    pub _pad0: f32,
    /// Ambient light color.
    pub ambient: Vec3,
    pub _pad1: f32,
}

impl SceneBlock {
    /// Size of the block in bytes.
    pub const SIZE: usize = std::mem::size_of::<Self>();

    /// Creates a scene block; the view-projection matrix is computed here.
    #[inline]
    pub fn new(view: Mat4, projection: Mat4, camera_position: Vec3, ambient: Vec3) -> Self {
        Self {
            view,
            projection,
            view_projection: projection * view,
            camera_position,
            _pad0: 0.0,
            ambient,
            _pad1: 0.0,
        }
    }
}

/// Header preceding the light array of a [`LightBlock`].
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct LightBlockHeader {
    /// Number of valid array entries.
    pub count: u32,
    pub _pad: [u32; 3],
}

/// A uniform block holding a count and up to `capacity` lights of type `T`.
///
/// `T` must already be std140-compatible (size a multiple of 16).
pub struct LightBlock<T>(PhantomData<T>);

impl<T: Pod> LightBlock<T> {
    /// Size of the count header.
    pub const HEADER_SIZE: usize = std::mem::size_of::<LightBlockHeader>();

    /// Size of one array element.
    pub const ELEMENT_SIZE: usize = std::mem::size_of::<T>();

    /// Size of a block able to hold `capacity` lights.
    pub const fn block_size(capacity: u32) -> usize {
        Self::HEADER_SIZE + capacity as usize * Self::ELEMENT_SIZE
    }

    /// Writes the header and lights into `dst`.
    ///
    /// Lights beyond `capacity` are dropped with a warning. Unused array
    /// entries are left untouched; shaders only read `count` entries.
    /// Returns the number of lights written.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::BlockTooSmall`] if `dst` cannot hold a block
    /// of `capacity` lights.
    pub fn encode_into(dst: &mut [u8], lights: &[T], capacity: u32) -> ResourceResult<u32> {
        let needed = Self::block_size(capacity);
        if dst.len() < needed {
            return Err(ResourceError::BlockTooSmall {
                needed,
                available: dst.len(),
            });
        }

        let count = lights.len().min(capacity as usize);
        if count < lights.len() {
            warn!(
                "Light block holds {} of {} lights; the rest are dropped",
                capacity,
                lights.len()
            );
        }

        let header = LightBlockHeader {
            count: count as u32,
            _pad: [0; 3],
        };
        dst[..Self::HEADER_SIZE].copy_from_slice(bytemuck::bytes_of(&header));

        let body: &[u8] = bytemuck::cast_slice(&lights[..count]);
        dst[Self::HEADER_SIZE..Self::HEADER_SIZE + body.len()].copy_from_slice(body);

        Ok(count as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem::{align_of, size_of};

    #[repr(C)]
    #[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
    struct TestLight {
        position: [f32; 4],
        color: [f32; 4],
    }

    fn light(v: f32) -> TestLight {
        TestLight {
            position: [v; 4],
            color: [v; 4],
        }
    }

    #[test]
    fn test_scene_block_size() {
        assert_eq!(size_of::<SceneBlock>(), 224);
        assert_eq!(SceneBlock::SIZE % 16, 0);
        assert!(align_of::<SceneBlock>() >= 4);
    }

    #[test]
    fn test_scene_block_new() {
        let view = Mat4::look_at_rh(Vec3::new(0.0, 0.0, 5.0), Vec3::ZERO, Vec3::Y);
        let projection = Mat4::perspective_rh(45.0_f32.to_radians(), 1.5, 0.1, 100.0);
        let block = SceneBlock::new(view, projection, Vec3::new(0.0, 0.0, 5.0), Vec3::ONE);

        assert_eq!(block.view_projection, projection * view);
        assert_eq!(block.ambient, Vec3::ONE);
        assert_eq!(block._pad0, 0.0);
    }

    #[test]
    fn test_light_block_size() {
        assert_eq!(LightBlock::<TestLight>::HEADER_SIZE, 16);
        assert_eq!(LightBlock::<TestLight>::block_size(0), 16);
        assert_eq!(LightBlock::<TestLight>::block_size(8), 16 + 8 * 32);
    }

    #[test]
    fn test_encode_writes_header_and_lights() {
        let mut dst = vec![0xffu8; LightBlock::<TestLight>::block_size(4)];
        let written =
            LightBlock::encode_into(&mut dst, &[light(1.0), light(2.0)], 4).unwrap();

        assert_eq!(written, 2);
        let header: LightBlockHeader = bytemuck::pod_read_unaligned(&dst[..16]);
        assert_eq!(header.count, 2);
        let second: TestLight = bytemuck::pod_read_unaligned(&dst[48..80]);
        assert_eq!(second, light(2.0));
    }

    #[test]
    fn test_encode_truncates_to_capacity() {
        let mut dst = vec![0u8; LightBlock::<TestLight>::block_size(1)];
        let written =
            LightBlock::encode_into(&mut dst, &[light(1.0), light(2.0), light(3.0)], 1).unwrap();
        assert_eq!(written, 1);
    }

    #[test]
    fn test_encode_rejects_small_destination() {
        let mut dst = vec![0u8; 20];
        assert!(matches!(
            LightBlock::<TestLight>::encode_into(&mut dst, &[], 1),
            Err(ResourceError::BlockTooSmall {
                needed: 48,
                available: 20
            })
        ));
    }
}
