//! Per-frame dynamic and uniform data.
//!
//! One host-visible buffer holds a region per virtual frame. Each region
//! starts with the instance attributes (vertex binding 1), followed by the
//! four uniform blocks:
//!
//! ```text
//! frame i base = i * per_frame_size
//! | instances | scene | directional | point | spot | pad |
//!             ^ every block starts on minUniformBufferOffsetAlignment
//! ```
//!
//! The buffer stays mapped for its whole lifetime. Descriptor sets are
//! allocated and written once per virtual frame at creation, so per-frame
//! work only writes bytes.

use std::ptr::NonNull;
use std::sync::Arc;

use ash::vk;
use tracing::{debug, info, warn};

use forward_core::LightCapacity;
use forward_resources::uniform::{LightBlock, SceneBlock};
use forward_rhi::buffer::{Buffer, BufferUsage, align_up};
use forward_rhi::descriptor::{
    DescriptorPool, DescriptorSetLayout, UniformRange, write_uniform_ranges,
};
use forward_rhi::device::Device;
use forward_rhi::vertex::InstanceAttributes;
use forward_rhi::{RhiError, RhiResult};
use forward_scene::{DirectionalLight, PointLight, SpotLight};

pub type DirectionalLightBlock = LightBlock<DirectionalLight>;
pub type PointLightBlock = LightBlock<PointLight>;
pub type SpotLightBlock = LightBlock<SpotLight>;

/// The four uniform blocks, in layout and binding order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UniformBlock {
    Scene,
    DirectionalLights,
    PointLights,
    SpotLights,
}

impl UniformBlock {
    pub const ALL: [UniformBlock; 4] = [
        Self::Scene,
        Self::DirectionalLights,
        Self::PointLights,
        Self::SpotLights,
    ];

    /// Descriptor binding of the block.
    #[inline]
    pub fn binding(self) -> u32 {
        self as u32
    }

    /// Size of the block for the given light capacities.
    pub fn size(self, lights: &LightCapacity) -> vk::DeviceSize {
        let bytes = match self {
            Self::Scene => SceneBlock::SIZE,
            Self::DirectionalLights => DirectionalLightBlock::block_size(lights.directional),
            Self::PointLights => PointLightBlock::block_size(lights.point),
            Self::SpotLights => SpotLightBlock::block_size(lights.spot),
        };
        bytes as vk::DeviceSize
    }
}

/// A byte range relative to the start of a frame region.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Region {
    pub offset: vk::DeviceSize,
    pub size: vk::DeviceSize,
}

impl Region {
    #[inline]
    pub fn end(&self) -> vk::DeviceSize {
        self.offset + self.size
    }
}

/// Offsets of everything inside one frame region.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameLayout {
    /// Instance attribute array at offset 0.
    pub instances: Region,
    /// Uniform blocks indexed by [`UniformBlock::binding`].
    pub blocks: [Region; 4],
    /// Size of one frame region, a multiple of the uniform alignment.
    pub per_frame_size: vk::DeviceSize,
    pub instance_capacity: u32,
}

impl FrameLayout {
    /// Lays out one frame region.
    ///
    /// `alignment` is the device's `minUniformBufferOffsetAlignment`.
    pub fn new(instance_capacity: u32, lights: &LightCapacity, alignment: vk::DeviceSize) -> Self {
        let instances = Region {
            offset: 0,
            size: instance_capacity as vk::DeviceSize * InstanceAttributes::STRIDE as vk::DeviceSize,
        };

        let mut blocks = [Region::default(); 4];
        let mut cursor = instances.end();
        for block in UniformBlock::ALL {
            let offset = align_up(cursor, alignment);
            let size = block.size(lights);
            blocks[block.binding() as usize] = Region { offset, size };
            cursor = offset + size;
        }

        Self {
            instances,
            blocks,
            per_frame_size: align_up(cursor, alignment),
            instance_capacity,
        }
    }

    #[inline]
    pub fn block(&self, block: UniformBlock) -> Region {
        self.blocks[block.binding() as usize]
    }

    /// Offset of virtual frame `index`'s region within the buffer.
    #[inline]
    pub fn frame_offset(&self, index: usize) -> vk::DeviceSize {
        index as vk::DeviceSize * self.per_frame_size
    }
}

/// The persistently mapped per-frame buffer with its descriptor sets.
pub struct DynamicBufferSet {
    buffer: Buffer,
    layout: FrameLayout,
    lights: LightCapacity,
    frames_in_flight: usize,
    descriptor_set_layout: DescriptorSetLayout,
    descriptor_pool: DescriptorPool,
    descriptor_sets: Vec<vk::DescriptorSet>,
    current_frame: usize,
}

impl DynamicBufferSet {
    /// Allocates the buffer for `instance_capacity` instances per frame and
    /// writes the descriptor sets of every virtual frame.
    ///
    /// # Errors
    ///
    /// Returns an error if buffer, descriptor layout, pool or set creation
    /// fails. Everything created so far is released.
    pub fn new(
        device: Arc<Device>,
        instance_capacity: u32,
        lights: &LightCapacity,
        frames_in_flight: usize,
    ) -> RhiResult<Self> {
        if frames_in_flight == 0 {
            return Err(RhiError::InvalidHandle(
                "frames_in_flight must be at least 1".to_string(),
            ));
        }

        let alignment = device.limits().min_uniform_buffer_offset_alignment;
        let layout = FrameLayout::new(instance_capacity, lights, alignment);
        let total_size = layout.per_frame_size * frames_in_flight as vk::DeviceSize;

        let buffer = Buffer::new(device.clone(), BufferUsage::DynamicHostVisible, total_size)?;

        let block_count = UniformBlock::ALL.len() as u32;
        let stages = vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT;
        let descriptor_set_layout = DescriptorSetLayout::uniform_blocks(device.clone(), block_count, stages)?;
        let descriptor_pool =
            DescriptorPool::for_uniform_sets(device.clone(), frames_in_flight as u32, block_count)?;
        let descriptor_sets = descriptor_pool.allocate(&descriptor_set_layout, frames_in_flight as u32)?;

        for (frame, &set) in descriptor_sets.iter().enumerate() {
            let base = layout.frame_offset(frame);
            let ranges = UniformBlock::ALL.map(|block| {
                let region = layout.block(block);
                UniformRange {
                    binding: block.binding(),
                    offset: base + region.offset,
                    size: region.size,
                }
            });
            write_uniform_ranges(&device, set, buffer.handle(), &ranges);
        }

        info!(
            "Dynamic buffer set: {} frame(s) x {} bytes, {} instance slot(s)",
            frames_in_flight, layout.per_frame_size, instance_capacity
        );

        Ok(Self {
            buffer,
            layout,
            lights: *lights,
            frames_in_flight,
            descriptor_set_layout,
            descriptor_pool,
            descriptor_sets,
            current_frame: 0,
        })
    }

    /// Selects virtual frame `frame_index` for subsequent writes and returns
    /// the base of its region.
    ///
    /// # Errors
    ///
    /// Returns an error if the index is out of range or the set is cleared.
    pub fn update_mappings(&mut self, frame_index: usize) -> RhiResult<NonNull<u8>> {
        if frame_index >= self.frames_in_flight {
            return Err(RhiError::InvalidHandle(format!(
                "virtual frame {} out of {}",
                frame_index, self.frames_in_flight
            )));
        }
        self.current_frame = frame_index;
        self.write_ptr()
            .ok_or_else(|| RhiError::InvalidHandle("dynamic buffer is cleared".to_string()))
    }

    /// Write pointer of the current virtual frame, `None` once cleared.
    pub fn write_ptr(&self) -> Option<NonNull<u8>> {
        let base = self.buffer.mapped_ptr()?;
        // In bounds: frame_offset(frames_in_flight - 1) + per_frame_size == buffer size
        Some(unsafe { base.add(self.current_base() as usize) })
    }

    #[inline]
    pub fn current_frame(&self) -> usize {
        self.current_frame
    }

    /// Writes instance attributes into the current frame.
    ///
    /// Instances beyond the capacity are dropped with a warning.
    /// Returns the number written.
    ///
    /// # Errors
    ///
    /// Returns an error if the buffer write fails.
    pub fn write_instances(&self, instances: &[InstanceAttributes]) -> RhiResult<u32> {
        let capacity = self.layout.instance_capacity as usize;
        let count = instances.len().min(capacity);
        if count < instances.len() {
            warn!(
                "Dynamic buffer holds {} instances, {} requested",
                capacity,
                instances.len()
            );
        }
        self.buffer
            .write_pod(self.current_base() + self.layout.instances.offset, &instances[..count])?;
        Ok(count as u32)
    }

    /// Writes the scene block into the current frame.
    ///
    /// # Errors
    ///
    /// Returns an error if the buffer write fails.
    pub fn write_scene(&self, scene: &SceneBlock) -> RhiResult<()> {
        let region = self.layout.block(UniformBlock::Scene);
        self.buffer
            .write_pod(self.current_base() + region.offset, std::slice::from_ref(scene))
    }

    /// Writes the three light blocks into the current frame.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding or the buffer write fails.
    pub fn write_lights(
        &mut self,
        directional: &[DirectionalLight],
        point: &[PointLight],
        spot: &[SpotLight],
    ) -> RhiResult<()> {
        self.write_light_block(UniformBlock::DirectionalLights, directional, self.lights.directional)?;
        self.write_light_block(UniformBlock::PointLights, point, self.lights.point)?;
        self.write_light_block(UniformBlock::SpotLights, spot, self.lights.spot)
    }

    /// Encodes straight into the mapped block; no per-frame allocation.
    fn write_light_block<T: bytemuck::Pod>(
        &mut self,
        block: UniformBlock,
        lights: &[T],
        capacity: u32,
    ) -> RhiResult<()> {
        let region = self.layout.block(block);
        let offset = self.current_base() + region.offset;
        let dst = self.buffer.mapped_bytes_mut(offset, region.size as usize)?;
        LightBlock::encode_into(dst, lights, capacity)
            .map_err(|e| RhiError::InvalidHandle(e.to_string()))?;
        Ok(())
    }

    /// Makes the current frame's writes visible to the device.
    ///
    /// # Errors
    ///
    /// Returns an error if the flush fails.
    pub fn flush_current(&self) -> RhiResult<()> {
        self.buffer
            .flush(self.current_base(), self.layout.per_frame_size)
    }

    #[inline]
    fn current_base(&self) -> vk::DeviceSize {
        self.layout.frame_offset(self.current_frame)
    }

    /// Offset of virtual frame `index`'s instance array, for vertex binding 1.
    #[inline]
    pub fn instance_offset(&self, index: usize) -> vk::DeviceSize {
        self.layout.frame_offset(index) + self.layout.instances.offset
    }

    #[inline]
    pub fn buffer(&self) -> &Buffer {
        &self.buffer
    }

    #[inline]
    pub fn layout(&self) -> &FrameLayout {
        &self.layout
    }

    #[inline]
    pub fn descriptor_set_layout(&self) -> vk::DescriptorSetLayout {
        self.descriptor_set_layout.handle()
    }

    /// Descriptor set of virtual frame `index`.
    #[inline]
    pub fn descriptor_set(&self, index: usize) -> Option<vk::DescriptorSet> {
        self.descriptor_sets.get(index).copied()
    }

    #[inline]
    pub fn frames_in_flight(&self) -> usize {
        self.frames_in_flight
    }

    /// Releases the descriptors and the buffer. Safe to call repeatedly.
    pub fn clear(&mut self) {
        if self.buffer.is_cleared() {
            return;
        }
        self.descriptor_sets.clear();
        self.descriptor_pool.clear();
        self.descriptor_set_layout.clear();
        self.buffer.clear();
        debug!("Dynamic buffer set cleared");
    }
}

impl Drop for DynamicBufferSet {
    fn drop(&mut self) {
        self.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lights() -> LightCapacity {
        LightCapacity {
            directional: 4,
            point: 16,
            spot: 8,
        }
    }

    #[test]
    fn test_block_sizes() {
        let lights = lights();
        assert_eq!(UniformBlock::Scene.size(&lights), 224);
        assert_eq!(UniformBlock::DirectionalLights.size(&lights), 16 + 4 * 32);
        assert_eq!(UniformBlock::PointLights.size(&lights), 16 + 16 * 32);
        assert_eq!(UniformBlock::SpotLights.size(&lights), 16 + 8 * 64);
    }

    #[test]
    fn test_blocks_are_aligned_and_disjoint() {
        for alignment in [16u64, 64, 256] {
            for instances in [0u32, 1, 3, 100] {
                let layout = FrameLayout::new(instances, &lights(), alignment);
                let mut previous = layout.instances;
                for block in UniformBlock::ALL {
                    let region = layout.block(block);
                    assert_eq!(region.offset % alignment, 0);
                    assert!(region.offset >= previous.end());
                    previous = region;
                }
                assert!(layout.per_frame_size >= previous.end());
                assert_eq!(layout.per_frame_size % alignment, 0);
            }
        }
    }

    #[test]
    fn test_instance_region_at_start() {
        let layout = FrameLayout::new(3, &lights(), 256);
        assert_eq!(layout.instances, Region { offset: 0, size: 180 });
        assert_eq!(layout.block(UniformBlock::Scene).offset, 256);
    }

    #[test]
    fn test_frame_regions_do_not_overlap() {
        let layout = FrameLayout::new(10, &lights(), 64);
        for i in 0..3 {
            assert_eq!(layout.frame_offset(i), i as u64 * layout.per_frame_size);
            assert_eq!(
                layout.frame_offset(i) + layout.per_frame_size,
                layout.frame_offset(i + 1)
            );
        }
    }

    #[test]
    fn test_bindings_follow_block_order() {
        let bindings: Vec<u32> = UniformBlock::ALL.iter().map(|b| b.binding()).collect();
        assert_eq!(bindings, vec![0, 1, 2, 3]);
    }
}
