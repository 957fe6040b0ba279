//! The depth target of the forward pass.
//!
//! A single-sample device-local image matching the swapchain extent, in the
//! format the device picked at creation. It is never sampled and its
//! contents are discarded after each pass.

use std::sync::Arc;

use ash::vk;
use gpu_allocator::MemoryLocation;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use tracing::{debug, error};

use forward_rhi::device::Device;
use forward_rhi::{RhiError, RhiResult};

/// Depth image, its memory and its view.
pub struct DepthBuffer {
    device: Arc<Device>,
    image: vk::Image,
    view: vk::ImageView,
    allocation: Option<Allocation>,
    format: vk::Format,
    extent: vk::Extent2D,
}

impl DepthBuffer {
    /// Creates a depth target of `extent` in [`Device::depth_format`].
    ///
    /// # Errors
    ///
    /// [`RhiError::InvalidHandle`] for a zero-sized extent; otherwise the
    /// image, allocation or view creation error. Whatever was created before
    /// the failure is released.
    pub fn new(device: Arc<Device>, extent: vk::Extent2D) -> RhiResult<Self> {
        if extent.width == 0 || extent.height == 0 {
            return Err(RhiError::InvalidHandle(format!(
                "depth target of {}x{}",
                extent.width, extent.height
            )));
        }

        let format = device.depth_format();
        let image = unsafe { device.handle().create_image(&image_info(format, extent), None)? };

        // From here on `clear` releases whatever exists if a step fails
        let mut target = Self {
            device,
            image,
            view: vk::ImageView::null(),
            allocation: None,
            format,
            extent,
        };
        target.bind_memory()?;

        let view_info = vk::ImageViewCreateInfo::default()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(format)
            .subresource_range(
                vk::ImageSubresourceRange::default()
                    .aspect_mask(depth_aspect(format))
                    .level_count(1)
                    .layer_count(1),
            );
        target.view = unsafe { target.device.handle().create_image_view(&view_info, None)? };

        debug!("Depth target {}x{} ({:?})", extent.width, extent.height, format);
        Ok(target)
    }

    fn bind_memory(&mut self) -> RhiResult<()> {
        let requirements = unsafe { self.device.handle().get_image_memory_requirements(self.image) };
        let allocation = self
            .device
            .allocator()
            .lock()
            .map_err(|_| RhiError::InvalidHandle("GPU allocator mutex poisoned".to_string()))?
            .allocate(&AllocationCreateDesc {
                name: "depth target",
                requirements,
                location: MemoryLocation::GpuOnly,
                linear: false,
                allocation_scheme: AllocationScheme::GpuAllocatorManaged,
            })?;

        let (memory, offset) = unsafe { (allocation.memory(), allocation.offset()) };
        self.allocation = Some(allocation);
        unsafe {
            self.device
                .handle()
                .bind_image_memory(self.image, memory, offset)?;
        }
        Ok(())
    }

    #[inline]
    pub fn image(&self) -> vk::Image {
        self.image
    }

    #[inline]
    pub fn image_view(&self) -> vk::ImageView {
        self.view
    }

    #[inline]
    pub fn format(&self) -> vk::Format {
        self.format
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    /// Releases view, image and memory. Safe to call repeatedly.
    pub fn clear(&mut self) {
        let device = self.device.handle();
        unsafe {
            if self.view != vk::ImageView::null() {
                device.destroy_image_view(self.view, None);
                self.view = vk::ImageView::null();
            }
            if self.image != vk::Image::null() {
                device.destroy_image(self.image, None);
                self.image = vk::Image::null();
            }
        }

        let Some(allocation) = self.allocation.take() else {
            return;
        };
        match self.device.allocator().lock() {
            Ok(mut allocator) => {
                if let Err(e) = allocator.free(allocation) {
                    error!("Failed to free depth target memory: {:?}", e);
                }
            }
            Err(_) => error!("GPU allocator mutex poisoned, depth target memory leaked"),
        }
    }
}

impl Drop for DepthBuffer {
    fn drop(&mut self) {
        self.clear();
    }
}

fn image_info(format: vk::Format, extent: vk::Extent2D) -> vk::ImageCreateInfo<'static> {
    vk::ImageCreateInfo::default()
        .image_type(vk::ImageType::TYPE_2D)
        .format(format)
        .extent(vk::Extent3D {
            width: extent.width,
            height: extent.height,
            depth: 1,
        })
        .mip_levels(1)
        .array_layers(1)
        .samples(vk::SampleCountFlags::TYPE_1)
        .tiling(vk::ImageTiling::OPTIMAL)
        .usage(vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT)
        .initial_layout(vk::ImageLayout::UNDEFINED)
}

/// Aspect of a depth format; combined formats include stencil.
pub fn depth_aspect(format: vk::Format) -> vk::ImageAspectFlags {
    match format {
        vk::Format::D16_UNORM_S8_UINT
        | vk::Format::D24_UNORM_S8_UINT
        | vk::Format::D32_SFLOAT_S8_UINT => {
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        }
        _ => vk::ImageAspectFlags::DEPTH,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use forward_rhi::device::DEPTH_FORMAT_CANDIDATES;

    #[test]
    fn test_every_candidate_has_a_depth_aspect() {
        for format in DEPTH_FORMAT_CANDIDATES {
            assert!(depth_aspect(format).contains(vk::ImageAspectFlags::DEPTH));
        }
        assert_eq!(depth_aspect(vk::Format::D32_SFLOAT), vk::ImageAspectFlags::DEPTH);
        assert!(depth_aspect(vk::Format::D24_UNORM_S8_UINT).contains(vk::ImageAspectFlags::STENCIL));
    }

    #[test]
    fn test_image_info_is_a_single_sample_attachment() {
        let info = image_info(
            vk::Format::D32_SFLOAT,
            vk::Extent2D {
                width: 320,
                height: 200,
            },
        );
        assert_eq!(info.extent.depth, 1);
        assert_eq!(info.samples, vk::SampleCountFlags::TYPE_1);
        assert_eq!(info.usage, vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT);
    }

    #[test]
    fn test_depth_buffer_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<DepthBuffer>();
    }
}
