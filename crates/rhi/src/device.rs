//! Vulkan logical device and queue management.
//!
//! This module handles VkDevice creation, queue retrieval per role, and
//! gpu-allocator initialization.
//!
//! # Overview
//!
//! The [`Device`] struct owns:
//! - The logical device and its function table
//! - One queue per [`QueueRole`], each tagged with its family index
//! - The gpu-allocator used by every buffer and image
//!
//! Roles without a family of their own use the render queue and family.
//! Queue creation requests each distinct family exactly once.
//!
//! # Example
//!
//! ```no_run
//! use forward_rhi::device::Device;
//! use forward_rhi::instance::{Instance, InstanceDesc};
//! use forward_rhi::physical_device::{QueueRole, select_physical_device};
//!
//! let instance = Instance::new(&InstanceDesc::default()).expect("Failed to create instance");
//! let info = select_physical_device(&instance, None).expect("No suitable GPU found");
//! let device = Device::new(&instance, &info).expect("Failed to create logical device");
//!
//! let transfer_queue = device.queue(QueueRole::Transfer);
//! let transfer_family = device.queue_family(QueueRole::Transfer);
//! ```

use std::ffi::{CStr, c_char};
use std::mem::ManuallyDrop;
use std::sync::{Arc, Mutex};

use ash::vk;
use gpu_allocator::vulkan::{Allocator, AllocatorCreateDesc};
use tracing::{debug, error, info};

use crate::error::{RhiError, RhiResult};
use crate::instance::Instance;
use crate::physical_device::{PRESENT_EXTENSIONS, PhysicalDeviceInfo, QueueFamilyIndices, QueueRole};

/// A queue handle together with the family it was retrieved from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Queue {
    pub handle: vk::Queue,
    pub family: u32,
}

/// Vulkan logical device wrapper.
///
/// # Thread Safety
///
/// The [`Device`] is shared through `Arc`. The allocator is protected by a
/// `Mutex`. Queue submission is externally synchronized by the single thread
/// that drives frames.
pub struct Device {
    /// Vulkan logical device handle.
    device: ash::Device,
    /// Physical device handle.
    physical_device: vk::PhysicalDevice,
    /// Properties of the physical device (limits used for alignment).
    properties: vk::PhysicalDeviceProperties,
    /// GPU memory allocator, released before the device is destroyed.
    allocator: ManuallyDrop<Mutex<Allocator>>,
    render_queue: Queue,
    compute_queue: Queue,
    transfer_queue: Queue,
    present_queue: Queue,
    /// Raw family assignment, including unavailable roles.
    queue_families: QueueFamilyIndices,
    depth_format: vk::Format,
}

/// Depth formats in order of preference.
pub const DEPTH_FORMAT_CANDIDATES: [vk::Format; 3] = [
    vk::Format::D32_SFLOAT,
    vk::Format::D32_SFLOAT_S8_UINT,
    vk::Format::D24_UNORM_S8_UINT,
];

/// First candidate usable as an optimal-tiling depth attachment.
fn pick_depth_format(instance: &Instance, physical_device: vk::PhysicalDevice) -> Option<vk::Format> {
    DEPTH_FORMAT_CANDIDATES.into_iter().find(|&format| {
        let properties = unsafe {
            instance
                .handle()
                .get_physical_device_format_properties(physical_device, format)
        };
        properties
            .optimal_tiling_features
            .contains(vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT)
    })
}

impl Device {
    /// Creates a new logical device.
    ///
    /// The swapchain extension is enabled only when the physical device was
    /// selected for presentation.
    ///
    /// # Errors
    ///
    /// Any failure is fatal for initialization:
    /// - Device creation fails (unsupported hardware, not transient)
    /// - Allocator initialization fails
    pub fn new(instance: &Instance, info: &PhysicalDeviceInfo) -> RhiResult<Arc<Self>> {
        let queue_families = info.queue_families;
        let depth_format = pick_depth_format(instance, info.device).ok_or_else(|| {
            RhiError::UnsupportedHardware("no supported depth attachment format".to_string())
        })?;

        let unique_families = queue_families.unique_families();
        let queue_priorities = [1.0f32];

        let queue_create_infos: Vec<vk::DeviceQueueCreateInfo> = unique_families
            .iter()
            .map(|&family| {
                vk::DeviceQueueCreateInfo::default()
                    .queue_family_index(family)
                    .queue_priorities(&queue_priorities)
            })
            .collect();

        debug!(
            "Creating {} queue(s) for families: {:?}",
            queue_create_infos.len(),
            unique_families
        );

        let extensions: &[&CStr] = if info.presents {
            PRESENT_EXTENSIONS
        } else {
            &[]
        };
        let extension_names: Vec<*const c_char> =
            extensions.iter().map(|ext| ext.as_ptr()).collect();

        let features = vk::PhysicalDeviceFeatures::default();

        let create_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(&queue_create_infos)
            .enabled_extension_names(&extension_names)
            .enabled_features(&features);

        let device = unsafe {
            instance
                .handle()
                .create_device(info.device, &create_info, None)?
        };

        info!(
            "Logical device created with {} extension(s)",
            extension_names.len()
        );

        let fetch = |role: QueueRole| {
            let family = queue_families.resolve(role);
            let handle = unsafe { device.get_device_queue(family, 0) };
            debug!("{} queue retrieved from family {}", role.name(), family);
            Queue { handle, family }
        };
        let render_queue = fetch(QueueRole::Render);
        let compute_queue = fetch(QueueRole::Compute);
        let transfer_queue = fetch(QueueRole::Transfer);
        let present_queue = fetch(QueueRole::Present);

        let allocator = match Allocator::new(&AllocatorCreateDesc {
            instance: instance.handle().clone(),
            device: device.clone(),
            physical_device: info.device,
            debug_settings: Default::default(),
            buffer_device_address: false,
            allocation_sizes: Default::default(),
        }) {
            Ok(allocator) => allocator,
            Err(e) => {
                unsafe { device.destroy_device(None) };
                return Err(e.into());
            }
        };

        info!("GPU memory allocator initialized");

        Ok(Arc::new(Self {
            device,
            physical_device: info.device,
            properties: info.properties,
            allocator: ManuallyDrop::new(Mutex::new(allocator)),
            render_queue,
            compute_queue,
            transfer_queue,
            present_queue,
            queue_families,
            depth_format,
        }))
    }

    /// Depth attachment format chosen for this device.
    #[inline]
    pub fn depth_format(&self) -> vk::Format {
        self.depth_format
    }

    /// Returns the Vulkan logical device handle.
    #[inline]
    pub fn handle(&self) -> &ash::Device {
        &self.device
    }

    /// Returns the physical device handle.
    #[inline]
    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.physical_device
    }

    /// Returns the physical device limits.
    #[inline]
    pub fn limits(&self) -> &vk::PhysicalDeviceLimits {
        &self.properties.limits
    }

    /// Returns the queue serving `role` (the render queue if none is dedicated).
    #[inline]
    pub fn queue(&self, role: QueueRole) -> Queue {
        match role {
            QueueRole::Render => self.render_queue,
            QueueRole::Compute => self.compute_queue,
            QueueRole::Transfer => self.transfer_queue,
            QueueRole::Present => self.present_queue,
        }
    }

    /// Returns the family index serving `role` after render fallback.
    #[inline]
    pub fn queue_family(&self, role: QueueRole) -> u32 {
        self.queue(role).family
    }

    /// Returns the raw family assignment, which may contain the unavailable sentinel.
    #[inline]
    pub fn queue_families(&self) -> &QueueFamilyIndices {
        &self.queue_families
    }

    /// Returns a reference to the GPU memory allocator.
    #[inline]
    pub fn allocator(&self) -> &Mutex<Allocator> {
        &self.allocator
    }

    /// Waits for the device to become idle.
    ///
    /// # Errors
    ///
    /// Returns an error if the wait fails (for example, device lost).
    pub fn wait_idle(&self) -> RhiResult<()> {
        unsafe { self.device.device_wait_idle().map_err(RhiError::from_vk) }
    }

    /// Submits command buffers to the queue serving `role`.
    ///
    /// # Safety
    ///
    /// The caller must ensure:
    /// - All command buffers are valid and recorded
    /// - Every referenced semaphore and the fence are in the right state
    ///
    /// # Errors
    ///
    /// Returns a classified error if the submission fails.
    pub unsafe fn submit(
        &self,
        role: QueueRole,
        submit_infos: &[vk::SubmitInfo],
        fence: vk::Fence,
    ) -> RhiResult<()> {
        unsafe {
            self.device
                .queue_submit(self.queue(role).handle, submit_infos, fence)
                .map_err(RhiError::from_vk)
        }
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        unsafe {
            if let Err(e) = self.device.device_wait_idle() {
                error!("Failed to wait for device idle during drop: {:?}", e);
            }

            // Allocator memory blocks are freed through the device.
            ManuallyDrop::drop(&mut self.allocator);

            self.device.destroy_device(None);
        }
        info!("Logical device destroyed");
    }
}

// Safety: ash::Device is Send+Sync, queues and the physical device are plain
// handles, and the allocator is behind a Mutex.
unsafe impl Send for Device {}
unsafe impl Sync for Device {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_present_extensions_include_swapchain() {
        assert!(PRESENT_EXTENSIONS.contains(&ash::khr::swapchain::NAME));
    }

    #[test]
    fn test_device_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Device>();
    }
}
