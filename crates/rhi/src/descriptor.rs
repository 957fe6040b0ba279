//! Descriptor sets for uniform blocks.
//!
//! Every descriptor in the forward pass is a uniform buffer range inside the
//! per-frame dynamic buffer. One set per virtual frame is allocated and
//! written once; per-frame work only selects which set to bind.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use ash::vk;
//! use forward_rhi::device::Device;
//! use forward_rhi::descriptor::{DescriptorPool, DescriptorSetLayout, UniformRange, write_uniform_ranges};
//!
//! # fn example(device: Arc<Device>, buffer: vk::Buffer) -> Result<(), forward_rhi::RhiError> {
//! let stages = vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT;
//! let layout = DescriptorSetLayout::uniform_blocks(device.clone(), 2, stages)?;
//! let pool = DescriptorPool::for_uniform_sets(device.clone(), 3, 2)?;
//! let sets = pool.allocate(&layout, 3)?;
//!
//! let ranges = [
//!     UniformRange { binding: 0, offset: 0, size: 256 },
//!     UniformRange { binding: 1, offset: 256, size: 512 },
//! ];
//! write_uniform_ranges(&device, sets[0], buffer, &ranges);
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// Layout binding for one uniform block at `binding`.
#[inline]
pub fn uniform_binding(
    binding: u32,
    stages: vk::ShaderStageFlags,
) -> vk::DescriptorSetLayoutBinding<'static> {
    vk::DescriptorSetLayoutBinding::default()
        .binding(binding)
        .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
        .descriptor_count(1)
        .stage_flags(stages)
}

/// Owned descriptor set layout.
pub struct DescriptorSetLayout {
    device: Arc<Device>,
    layout: vk::DescriptorSetLayout,
    binding_count: u32,
}

impl DescriptorSetLayout {
    /// Creates a layout from explicit bindings.
    ///
    /// # Errors
    ///
    /// Returns an error if layout creation fails.
    pub fn new(device: Arc<Device>, bindings: &[vk::DescriptorSetLayoutBinding]) -> RhiResult<Self> {
        let create_info = vk::DescriptorSetLayoutCreateInfo::default().bindings(bindings);
        let layout = unsafe {
            device
                .handle()
                .create_descriptor_set_layout(&create_info, None)?
        };

        debug!("Descriptor set layout created: {} binding(s)", bindings.len());

        Ok(Self {
            device,
            layout,
            binding_count: bindings.len() as u32,
        })
    }

    /// Creates a layout of `count` uniform blocks at bindings `0..count`.
    ///
    /// # Errors
    ///
    /// Returns an error if layout creation fails.
    pub fn uniform_blocks(
        device: Arc<Device>,
        count: u32,
        stages: vk::ShaderStageFlags,
    ) -> RhiResult<Self> {
        let bindings: Vec<_> = (0..count)
            .map(|binding| uniform_binding(binding, stages))
            .collect();
        Self::new(device, &bindings)
    }

    #[inline]
    pub fn handle(&self) -> vk::DescriptorSetLayout {
        self.layout
    }

    #[inline]
    pub fn binding_count(&self) -> u32 {
        self.binding_count
    }

    /// Destroys the layout. Safe to call repeatedly.
    pub fn clear(&mut self) {
        if self.layout == vk::DescriptorSetLayout::null() {
            return;
        }
        unsafe {
            self.device
                .handle()
                .destroy_descriptor_set_layout(self.layout, None);
        }
        self.layout = vk::DescriptorSetLayout::null();
    }
}

impl Drop for DescriptorSetLayout {
    fn drop(&mut self) {
        self.clear();
    }
}

/// Descriptor pool whose sets live as long as the pool.
///
/// The pool is created without `FREE_DESCRIPTOR_SET`; sets are never freed
/// individually.
pub struct DescriptorPool {
    device: Arc<Device>,
    pool: vk::DescriptorPool,
    max_sets: u32,
}

impl DescriptorPool {
    /// Creates a pool for `max_sets` sets drawing from `pool_sizes`.
    ///
    /// # Errors
    ///
    /// Returns an error if pool creation fails.
    pub fn new(
        device: Arc<Device>,
        max_sets: u32,
        pool_sizes: &[vk::DescriptorPoolSize],
    ) -> RhiResult<Self> {
        let create_info = vk::DescriptorPoolCreateInfo::default()
            .max_sets(max_sets)
            .pool_sizes(pool_sizes);
        let pool = unsafe { device.handle().create_descriptor_pool(&create_info, None)? };

        debug!("Descriptor pool created: {} set(s)", max_sets);

        Ok(Self {
            device,
            pool,
            max_sets,
        })
    }

    /// Creates a pool for `set_count` sets of `blocks_per_set` uniform blocks.
    ///
    /// # Errors
    ///
    /// Returns an error if pool creation fails.
    pub fn for_uniform_sets(device: Arc<Device>, set_count: u32, blocks_per_set: u32) -> RhiResult<Self> {
        let size = vk::DescriptorPoolSize::default()
            .ty(vk::DescriptorType::UNIFORM_BUFFER)
            .descriptor_count(set_count * blocks_per_set);
        Self::new(device, set_count, &[size])
    }

    /// Allocates `count` sets of `layout`.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::DescriptorError`] if the pool is cleared or too
    /// small, or a Vulkan error if allocation fails.
    pub fn allocate(&self, layout: &DescriptorSetLayout, count: u32) -> RhiResult<Vec<vk::DescriptorSet>> {
        if self.pool == vk::DescriptorPool::null() {
            return Err(RhiError::DescriptorError("pool has been cleared".to_string()));
        }
        if count > self.max_sets {
            return Err(RhiError::DescriptorError(format!(
                "requested {} sets from a pool of {}",
                count, self.max_sets
            )));
        }

        let layouts = vec![layout.handle(); count as usize];
        let alloc_info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(self.pool)
            .set_layouts(&layouts);

        Ok(unsafe { self.device.handle().allocate_descriptor_sets(&alloc_info)? })
    }

    #[inline]
    pub fn handle(&self) -> vk::DescriptorPool {
        self.pool
    }

    #[inline]
    pub fn max_sets(&self) -> u32 {
        self.max_sets
    }

    /// Destroys the pool and every set allocated from it. Safe to call
    /// repeatedly.
    pub fn clear(&mut self) {
        if self.pool == vk::DescriptorPool::null() {
            return;
        }
        unsafe {
            self.device
                .handle()
                .destroy_descriptor_pool(self.pool, None);
        }
        self.pool = vk::DescriptorPool::null();
    }
}

impl Drop for DescriptorPool {
    fn drop(&mut self) {
        self.clear();
    }
}

/// A byte range of a buffer bound as a uniform block.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UniformRange {
    pub binding: u32,
    pub offset: vk::DeviceSize,
    pub size: vk::DeviceSize,
}

impl UniformRange {
    fn buffer_info(&self, buffer: vk::Buffer) -> vk::DescriptorBufferInfo {
        vk::DescriptorBufferInfo::default()
            .buffer(buffer)
            .offset(self.offset)
            .range(self.size)
    }
}

/// Points each binding of `set` at its range of `buffer`.
pub fn write_uniform_ranges(device: &Device, set: vk::DescriptorSet, buffer: vk::Buffer, ranges: &[UniformRange]) {
    if ranges.is_empty() {
        return;
    }

    let infos: Vec<[vk::DescriptorBufferInfo; 1]> =
        ranges.iter().map(|range| [range.buffer_info(buffer)]).collect();
    let writes: Vec<vk::WriteDescriptorSet> = ranges
        .iter()
        .zip(&infos)
        .map(|(range, info)| {
            vk::WriteDescriptorSet::default()
                .dst_set(set)
                .dst_binding(range.binding)
                .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
                .buffer_info(info)
        })
        .collect();

    unsafe {
        device.handle().update_descriptor_sets(&writes, &[]);
    }
}
