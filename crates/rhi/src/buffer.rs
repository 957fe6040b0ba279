//! Buffers backed by `gpu-allocator`.
//!
//! The renderer needs three kinds, see [`BufferUsage`]. Host-visible buffers
//! are mapped once at allocation and stay mapped; writes go straight through
//! the mapping and [`Buffer::flush`] publishes them on non-coherent memory.

use std::ptr::NonNull;
use std::sync::Arc;

use ash::vk;
use gpu_allocator::MemoryLocation;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use tracing::{debug, error};

use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// Rounds `value` up to the next multiple of `alignment`.
///
/// An alignment of zero or one leaves the value unchanged.
#[inline]
pub const fn align_up(value: u64, alignment: u64) -> u64 {
    if alignment <= 1 {
        value
    } else {
        value.div_ceil(alignment) * alignment
    }
}

/// What a buffer holds, which fixes its usage flags and memory location.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BufferUsage {
    /// Host-written source of the one-time geometry copy.
    Staging,
    /// Vertices followed by indices, filled by a transfer.
    GeometryDeviceLocal,
    /// Per-frame instance attributes and uniform blocks.
    DynamicHostVisible,
}

impl BufferUsage {
    pub fn to_vk_usage(self) -> vk::BufferUsageFlags {
        use vk::BufferUsageFlags as F;
        match self {
            Self::Staging => F::TRANSFER_SRC,
            Self::GeometryDeviceLocal => F::VERTEX_BUFFER | F::INDEX_BUFFER | F::TRANSFER_DST,
            Self::DynamicHostVisible => F::VERTEX_BUFFER | F::UNIFORM_BUFFER,
        }
    }

    pub fn memory_location(self) -> MemoryLocation {
        match self {
            Self::GeometryDeviceLocal => MemoryLocation::GpuOnly,
            Self::Staging | Self::DynamicHostVisible => MemoryLocation::CpuToGpu,
        }
    }

    #[inline]
    pub fn is_host_visible(self) -> bool {
        self.memory_location() != MemoryLocation::GpuOnly
    }

    /// Allocation name, also used in log lines.
    pub fn name(self) -> &'static str {
        match self {
            Self::Staging => "staging",
            Self::GeometryDeviceLocal => "geometry",
            Self::DynamicHostVisible => "dynamic",
        }
    }
}

/// Computes the `(offset, size)` of a flush covering `[offset, offset + size)`
/// inside an allocation, expanded to `atom` boundaries.
///
/// When the rounded end passes the allocation's end the memory object's size
/// is unknown here, so the size becomes [`vk::WHOLE_SIZE`].
pub fn flush_range(
    allocation_offset: u64,
    allocation_size: u64,
    offset: u64,
    size: u64,
    atom: u64,
) -> (u64, u64) {
    let atom = atom.max(1);
    let start = allocation_offset + offset;
    let aligned_start = start / atom * atom;
    let aligned_end = align_up(start + size, atom);
    if aligned_end > allocation_offset + allocation_size {
        (aligned_start, vk::WHOLE_SIZE)
    } else {
        (aligned_start, aligned_end - aligned_start)
    }
}

/// A buffer and its allocation. Written only from the render thread.
pub struct Buffer {
    device: Arc<Device>,
    /// Null after [`Buffer::clear`].
    buffer: vk::Buffer,
    allocation: Option<Allocation>,
    size: vk::DeviceSize,
    usage: BufferUsage,
}

impl Buffer {
    /// Creates a `size`-byte buffer for `usage`.
    ///
    /// # Errors
    ///
    /// [`RhiError::InvalidHandle`] for a zero size or a host-visible buffer
    /// that did not get a mapping; otherwise the creation, allocation or
    /// bind error. Nothing is leaked on failure.
    pub fn new(device: Arc<Device>, usage: BufferUsage, size: vk::DeviceSize) -> RhiResult<Self> {
        if size == 0 {
            return Err(RhiError::InvalidHandle(format!("empty {} buffer", usage.name())));
        }

        let create_info = vk::BufferCreateInfo::default()
            .size(size)
            .usage(usage.to_vk_usage());
        let buffer = unsafe { device.handle().create_buffer(&create_info, None)? };

        // Dropping `this` on an early return releases the handle
        let mut this = Self {
            device,
            buffer,
            allocation: None,
            size,
            usage,
        };

        let requirements = unsafe { this.device.handle().get_buffer_memory_requirements(buffer) };

        let allocation = this
            .device
            .allocator()
            .lock()
            .map_err(|_| RhiError::InvalidHandle("GPU allocator mutex poisoned".to_string()))?
            .allocate(&AllocationCreateDesc {
                name: usage.name(),
                requirements,
                location: usage.memory_location(),
                linear: true,
                allocation_scheme: AllocationScheme::GpuAllocatorManaged,
            })?;

        let (memory, memory_offset) = unsafe { (allocation.memory(), allocation.offset()) };
        this.allocation = Some(allocation);

        unsafe {
            this.device
                .handle()
                .bind_buffer_memory(buffer, memory, memory_offset)?;
        }

        if usage.is_host_visible() && this.mapped_ptr().is_none() {
            return Err(RhiError::InvalidHandle(format!(
                "{} buffer memory is not host mapped",
                usage.name()
            )));
        }

        debug!("{} buffer: {} bytes", usage.name(), size);
        Ok(this)
    }

    /// Creates a host-visible buffer holding `data`, flushed.
    ///
    /// # Errors
    ///
    /// See [`Buffer::new`] and [`Buffer::write_data`].
    pub fn new_with_data(device: Arc<Device>, usage: BufferUsage, data: &[u8]) -> RhiResult<Self> {
        let buffer = Self::new(device, usage, data.len() as vk::DeviceSize)?;
        buffer.write_data(0, data)?;
        buffer.flush(0, data.len() as vk::DeviceSize)?;
        Ok(buffer)
    }

    /// Copies `data` into the mapping at `offset`.
    ///
    /// # Errors
    ///
    /// [`RhiError::InvalidHandle`] if the write runs past the end or the
    /// buffer is not mapped.
    pub fn write_data(&self, offset: vk::DeviceSize, data: &[u8]) -> RhiResult<()> {
        if data.is_empty() {
            return Ok(());
        }

        let base = self.mapped_span(offset, data.len())?;

        // SAFETY: `mapped_span` checked `offset + len <= size` and the
        // mapping spans the buffer
        unsafe {
            std::ptr::copy_nonoverlapping(data.as_ptr(), base.as_ptr().add(offset as usize), data.len());
        }

        Ok(())
    }

    /// Borrows `len` mapped bytes at `offset` for in-place encoding.
    ///
    /// # Errors
    ///
    /// Same as [`Buffer::write_data`].
    pub fn mapped_bytes_mut(&mut self, offset: vk::DeviceSize, len: usize) -> RhiResult<&mut [u8]> {
        let base = self.mapped_span(offset, len)?;

        // SAFETY: in bounds of the mapping, and `&mut self` keeps every other
        // host access to this buffer out for the borrow's lifetime
        Ok(unsafe { std::slice::from_raw_parts_mut(base.as_ptr().add(offset as usize), len) })
    }

    /// Mapping base, after checking `[offset, offset + len)` fits.
    fn mapped_span(&self, offset: vk::DeviceSize, len: usize) -> RhiResult<NonNull<u8>> {
        let end = offset + len as vk::DeviceSize;
        if end > self.size {
            return Err(RhiError::InvalidHandle(format!(
                "{}-byte access at {} overruns {} buffer of {} bytes",
                len,
                offset,
                self.usage.name(),
                self.size
            )));
        }

        self.mapped_ptr()
            .ok_or_else(|| RhiError::InvalidHandle(format!("{} buffer is not mapped", self.usage.name())))
    }

    /// Writes a slice of plain-old-data values at `offset`.
    ///
    /// # Errors
    ///
    /// Same as [`Buffer::write_data`].
    pub fn write_pod<T: bytemuck::Pod>(&self, offset: vk::DeviceSize, values: &[T]) -> RhiResult<()> {
        self.write_data(offset, bytemuck::cast_slice(values))
    }

    /// Start of the persistent mapping, `None` for device-local memory.
    #[inline]
    pub fn mapped_ptr(&self) -> Option<NonNull<u8>> {
        self.allocation
            .as_ref()
            .and_then(Allocation::mapped_ptr)
            .map(NonNull::cast)
    }

    /// Makes host writes in `[offset, offset + size)` visible to the device.
    ///
    /// No-op on host-coherent memory. Otherwise the range is widened to
    /// `nonCoherentAtomSize` boundaries.
    ///
    /// # Errors
    ///
    /// Returns an error if the range is out of bounds or the flush fails.
    pub fn flush(&self, offset: vk::DeviceSize, size: vk::DeviceSize) -> RhiResult<()> {
        if offset + size > self.size {
            return Err(RhiError::InvalidHandle(format!(
                "flush of {} bytes at {} overruns {} buffer of {} bytes",
                size,
                offset,
                self.usage.name(),
                self.size
            )));
        }

        let Some(allocation) = self.allocation.as_ref() else {
            return Ok(());
        };

        if allocation
            .memory_properties()
            .contains(vk::MemoryPropertyFlags::HOST_COHERENT)
        {
            return Ok(());
        }

        let atom = self.device.limits().non_coherent_atom_size;
        let (range_offset, range_size) =
            flush_range(allocation.offset(), allocation.size(), offset, size, atom);

        let range = vk::MappedMemoryRange::default()
            .memory(unsafe { allocation.memory() })
            .offset(range_offset)
            .size(range_size);

        unsafe {
            self.device
                .handle()
                .flush_mapped_memory_ranges(std::slice::from_ref(&range))
                .map_err(RhiError::from_vk)?;
        }

        Ok(())
    }

    #[inline]
    pub fn handle(&self) -> vk::Buffer {
        self.buffer
    }

    #[inline]
    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }

    #[inline]
    pub fn usage(&self) -> BufferUsage {
        self.usage
    }

    /// `true` once [`Buffer::clear`] ran.
    #[inline]
    pub fn is_cleared(&self) -> bool {
        self.buffer == vk::Buffer::null()
    }

    /// Frees the allocation and destroys the buffer. Safe to call repeatedly.
    pub fn clear(&mut self) {
        if let Some(allocation) = self.allocation.take() {
            match self.device.allocator().lock() {
                Ok(mut allocator) => {
                    if let Err(e) = allocator.free(allocation) {
                        error!("Failed to free {} buffer allocation: {:?}", self.usage.name(), e);
                    }
                }
                Err(_) => error!("GPU allocator mutex poisoned, leaking allocation"),
            }
        }

        if self.buffer != vk::Buffer::null() {
            unsafe {
                self.device.handle().destroy_buffer(self.buffer, None);
            }
            self.buffer = vk::Buffer::null();
            debug!("Destroyed {} buffer", self.usage.name());
        }
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        self.clear();
    }
}
