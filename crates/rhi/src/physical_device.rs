//! Physical device (GPU) selection and queue-family assignment.
//!
//! # Overview
//!
//! The selection process involves:
//! 1. Enumerating all available GPUs
//! 2. Assigning a queue family to each [`QueueRole`]
//! 3. Checking required extensions and, when presenting, surface adequacy
//! 4. Scoring the remaining GPUs (preferring discrete GPUs)
//!
//! # Queue roles
//!
//! Each role first looks for a family whose capability bits are exactly the
//! role's bits (a dedicated family), remembering the first family that merely
//! includes them. A dedicated family wins; otherwise the shared one is used.
//! A role with neither gets [`QUEUE_FAMILY_UNAVAILABLE`], and
//! [`QueueFamilyIndices::resolve`] substitutes the render family for it.
//! The render role is mandatory.
//!
//! # Example
//!
//! ```no_run
//! use forward_rhi::instance::{Instance, InstanceDesc};
//! use forward_rhi::physical_device::select_physical_device;
//!
//! let instance = Instance::new(&InstanceDesc::default()).expect("Failed to create instance");
//! let device_info = select_physical_device(&instance, None).expect("No suitable GPU found");
//! println!("Selected GPU: {}", device_info.device_name());
//! ```

use std::ffi::CStr;

use ash::vk;
use tracing::{debug, info, warn};

use crate::error::{RhiError, RhiResult};
use crate::instance::Instance;
use crate::surface::Surface;

/// Sentinel family index for a role no family can serve.
pub const QUEUE_FAMILY_UNAVAILABLE: u32 = u32::MAX;

/// Capability bits considered when matching a family to a role.
const CAPABILITY_MASK: vk::QueueFlags = vk::QueueFlags::from_raw(
    vk::QueueFlags::GRAPHICS.as_raw()
        | vk::QueueFlags::COMPUTE.as_raw()
        | vk::QueueFlags::TRANSFER.as_raw(),
);

/// The queue roles the renderer uses.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum QueueRole {
    Render,
    Compute,
    Transfer,
    Present,
}

impl QueueRole {
    /// Capability bits a family must carry for this role.
    ///
    /// Presentation is not a capability bit; it is queried against a surface.
    pub fn required_flags(self) -> vk::QueueFlags {
        match self {
            QueueRole::Render => vk::QueueFlags::GRAPHICS,
            QueueRole::Compute => vk::QueueFlags::COMPUTE,
            QueueRole::Transfer => vk::QueueFlags::TRANSFER,
            QueueRole::Present => vk::QueueFlags::empty(),
        }
    }

    /// Human-readable role name.
    pub fn name(self) -> &'static str {
        match self {
            QueueRole::Render => "render",
            QueueRole::Compute => "compute",
            QueueRole::Transfer => "transfer",
            QueueRole::Present => "present",
        }
    }
}

/// Queue family indices per role.
///
/// Roles that no family can serve hold [`QUEUE_FAMILY_UNAVAILABLE`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QueueFamilyIndices {
    pub render: u32,
    pub compute: u32,
    pub transfer: u32,
    pub present: u32,
}

impl Default for QueueFamilyIndices {
    fn default() -> Self {
        Self {
            render: QUEUE_FAMILY_UNAVAILABLE,
            compute: QUEUE_FAMILY_UNAVAILABLE,
            transfer: QUEUE_FAMILY_UNAVAILABLE,
            present: QUEUE_FAMILY_UNAVAILABLE,
        }
    }
}

impl QueueFamilyIndices {
    /// Returns the raw index assigned to `role`, which may be the sentinel.
    #[inline]
    pub fn get(&self, role: QueueRole) -> u32 {
        match role {
            QueueRole::Render => self.render,
            QueueRole::Compute => self.compute,
            QueueRole::Transfer => self.transfer,
            QueueRole::Present => self.present,
        }
    }

    /// Returns whether a family was found for `role`.
    #[inline]
    pub fn is_available(&self, role: QueueRole) -> bool {
        self.get(role) != QUEUE_FAMILY_UNAVAILABLE
    }

    /// Returns the family to use for `role`, falling back to the render family.
    #[inline]
    pub fn resolve(&self, role: QueueRole) -> u32 {
        let index = self.get(role);
        if index == QUEUE_FAMILY_UNAVAILABLE {
            self.render
        } else {
            index
        }
    }

    /// Returns the distinct family indices that need queues, render first.
    ///
    /// A family is never listed twice, and the sentinel is never listed.
    pub fn unique_families(&self) -> Vec<u32> {
        let mut families = Vec::with_capacity(4);

        for index in [self.render, self.present, self.compute, self.transfer] {
            if index != QUEUE_FAMILY_UNAVAILABLE && !families.contains(&index) {
                families.push(index);
            }
        }

        families
    }
}

/// Finds the family for a capability set.
///
/// Returns the first family whose masked flags equal `required` exactly, or
/// else the first family whose flags include `required`, or else
/// [`QUEUE_FAMILY_UNAVAILABLE`].
pub fn select_queue_family(families: &[vk::QueueFamilyProperties], required: vk::QueueFlags) -> u32 {
    let mut shared = None;

    for (i, family) in families.iter().enumerate() {
        if family.queue_count == 0 {
            continue;
        }

        let flags = family.queue_flags & CAPABILITY_MASK;
        if flags == required {
            return i as u32;
        }
        if shared.is_none() && flags.contains(required) {
            shared = Some(i as u32);
        }
    }

    shared.unwrap_or(QUEUE_FAMILY_UNAVAILABLE)
}

/// Assigns a family to every role.
///
/// `present_support` is queried per family; pass `None` for headless use,
/// which leaves the present role unavailable. The render family is preferred
/// for presentation when it can present.
///
/// # Errors
///
/// Returns [`RhiError::UnsupportedHardware`] if no family supports rendering,
/// or propagates a failing presentation query.
pub fn select_queue_families<F>(
    families: &[vk::QueueFamilyProperties],
    present_support: Option<F>,
) -> RhiResult<QueueFamilyIndices>
where
    F: Fn(u32) -> RhiResult<bool>,
{
    let render = select_queue_family(families, QueueRole::Render.required_flags());
    if render == QUEUE_FAMILY_UNAVAILABLE {
        return Err(RhiError::UnsupportedHardware(
            "no queue family supports graphics".to_string(),
        ));
    }

    let mut indices = QueueFamilyIndices {
        render,
        compute: select_queue_family(families, QueueRole::Compute.required_flags()),
        transfer: select_queue_family(families, QueueRole::Transfer.required_flags()),
        present: QUEUE_FAMILY_UNAVAILABLE,
    };

    if let Some(supports) = present_support {
        if supports(render)? {
            indices.present = render;
        } else {
            for (i, family) in families.iter().enumerate() {
                let i = i as u32;
                if family.queue_count > 0 && supports(i)? {
                    indices.present = i;
                    break;
                }
            }
        }
    }

    Ok(indices)
}

/// Information about a physical device (GPU).
#[derive(Clone)]
pub struct PhysicalDeviceInfo {
    /// Vulkan physical device handle.
    pub device: vk::PhysicalDevice,
    /// Device properties (name, limits, API version, etc.).
    pub properties: vk::PhysicalDeviceProperties,
    /// Supported device features.
    pub features: vk::PhysicalDeviceFeatures,
    /// Memory properties (heap sizes, memory types).
    pub memory_properties: vk::PhysicalDeviceMemoryProperties,
    /// Queue family assignment per role.
    pub queue_families: QueueFamilyIndices,
    /// Whether this device was selected for presentation.
    pub presents: bool,
}

impl PhysicalDeviceInfo {
    /// Returns the device name as a string.
    pub fn device_name(&self) -> &str {
        self.properties
            .device_name_as_c_str()
            .ok()
            .and_then(|name| name.to_str().ok())
            .unwrap_or("Unknown Device")
    }

    /// Returns a human-readable string for the device type.
    pub fn device_type_name(&self) -> &'static str {
        match self.properties.device_type {
            vk::PhysicalDeviceType::DISCRETE_GPU => "Discrete GPU",
            vk::PhysicalDeviceType::INTEGRATED_GPU => "Integrated GPU",
            vk::PhysicalDeviceType::VIRTUAL_GPU => "Virtual GPU",
            vk::PhysicalDeviceType::CPU => "CPU",
            _ => "Other",
        }
    }

    /// Returns the Vulkan API version supported by the device.
    pub fn api_version(&self) -> (u32, u32, u32) {
        let version = self.properties.api_version;
        (
            vk::api_version_major(version),
            vk::api_version_minor(version),
            vk::api_version_patch(version),
        )
    }

    /// Returns the total device local memory in bytes.
    pub fn device_local_memory(&self) -> u64 {
        self.memory_properties
            .memory_heaps
            .iter()
            .take(self.memory_properties.memory_heap_count as usize)
            .filter(|heap| heap.flags.contains(vk::MemoryHeapFlags::DEVICE_LOCAL))
            .map(|heap| heap.size)
            .sum()
    }
}

impl std::fmt::Debug for PhysicalDeviceInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (major, minor, patch) = self.api_version();
        f.debug_struct("PhysicalDeviceInfo")
            .field("name", &self.device_name())
            .field("type", &self.device_type_name())
            .field("api_version", &format!("{}.{}.{}", major, minor, patch))
            .field("queue_families", &self.queue_families)
            .finish()
    }
}

/// Device extensions required when presenting.
pub const PRESENT_EXTENSIONS: &[&CStr] = &[ash::khr::swapchain::NAME];

/// Selects the most suitable physical device.
///
/// With a surface, only devices that can present to it and expose the
/// swapchain extension qualify. Without one, any device with a render family
/// does (headless use).
///
/// # Errors
///
/// Returns [`RhiError::NoSuitableGpu`] if no suitable GPU is found.
pub fn select_physical_device(
    instance: &Instance,
    surface: Option<&Surface>,
) -> RhiResult<PhysicalDeviceInfo> {
    let devices = unsafe { instance.handle().enumerate_physical_devices()? };

    if devices.is_empty() {
        warn!("No Vulkan-capable GPUs found");
        return Err(RhiError::NoSuitableGpu);
    }

    info!("Found {} GPU(s)", devices.len());

    let mut suitable_devices: Vec<(PhysicalDeviceInfo, u32)> = Vec::new();

    for device in devices {
        if let Some(info) = check_device_suitability(instance.handle(), device, surface)? {
            let score = rate_device(&info);
            debug!(
                "GPU '{}' ({}) - Score: {}",
                info.device_name(),
                info.device_type_name(),
                score
            );
            suitable_devices.push((info, score));
        }
    }

    let Some((selected_device, score)) = suitable_devices.into_iter().max_by_key(|(_, s)| *s)
    else {
        warn!("No suitable GPU found with required capabilities");
        return Err(RhiError::NoSuitableGpu);
    };

    let (major, minor, patch) = selected_device.api_version();
    info!(
        "Selected GPU: '{}' ({}) - Vulkan {}.{}.{}, {} MiB device-local, Score: {}",
        selected_device.device_name(),
        selected_device.device_type_name(),
        major,
        minor,
        patch,
        selected_device.device_local_memory() / (1024 * 1024),
        score
    );
    let families = selected_device.queue_families;
    for role in [QueueRole::Compute, QueueRole::Transfer] {
        if families.get(role) == families.render {
            debug!("No dedicated {} family, sharing the render family", role.name());
        }
    }

    Ok(selected_device)
}

/// Checks if a physical device is suitable.
///
/// Returns `Ok(None)` when the device is rejected.
fn check_device_suitability(
    instance: &ash::Instance,
    device: vk::PhysicalDevice,
    surface: Option<&Surface>,
) -> RhiResult<Option<PhysicalDeviceInfo>> {
    let properties = unsafe { instance.get_physical_device_properties(device) };
    let features = unsafe { instance.get_physical_device_features(device) };
    let memory_properties = unsafe { instance.get_physical_device_memory_properties(device) };
    let families = unsafe { instance.get_physical_device_queue_family_properties(device) };

    let device_name = properties
        .device_name_as_c_str()
        .ok()
        .and_then(|name| name.to_str().ok())
        .unwrap_or("Unknown")
        .to_owned();

    let present_support = surface.map(|surface| move |family: u32| surface.supports_queue_family(device, family));
    let queue_families = match select_queue_families(&families, present_support) {
        Ok(indices) => indices,
        Err(RhiError::UnsupportedHardware(reason)) => {
            debug!("GPU '{}' skipped: {}", device_name, reason);
            return Ok(None);
        }
        Err(e) => return Err(e),
    };

    if let Some(surface) = surface {
        if !queue_families.is_available(QueueRole::Present) {
            debug!("GPU '{}' skipped: cannot present to surface", device_name);
            return Ok(None);
        }

        let available = unsafe { instance.enumerate_device_extension_properties(device)? };
        let missing = PRESENT_EXTENSIONS.iter().find(|required| {
            !available
                .iter()
                .any(|ext| ext.extension_name_as_c_str().is_ok_and(|name| name == **required))
        });
        if let Some(missing) = missing {
            debug!("GPU '{}' skipped: missing extension {:?}", device_name, missing);
            return Ok(None);
        }

        if !surface.query_support(device)?.is_adequate() {
            debug!("GPU '{}' skipped: inadequate swapchain support", device_name);
            return Ok(None);
        }
    }

    Ok(Some(PhysicalDeviceInfo {
        device,
        properties,
        features,
        memory_properties,
        queue_families,
        presents: surface.is_some(),
    }))
}

/// Rates a physical device based on its capabilities.
///
/// Higher scores indicate more desirable devices.
fn rate_device(info: &PhysicalDeviceInfo) -> u32 {
    let mut score = match info.properties.device_type {
        vk::PhysicalDeviceType::DISCRETE_GPU => 10000,
        vk::PhysicalDeviceType::INTEGRATED_GPU => 1000,
        vk::PhysicalDeviceType::VIRTUAL_GPU => 100,
        vk::PhysicalDeviceType::CPU => 10,
        _ => 1,
    };

    score += info.properties.limits.max_image_dimension2_d;

    let families = info.queue_families;
    if families.compute != families.render && families.is_available(QueueRole::Compute) {
        score += 100;
    }
    if families.transfer != families.render && families.is_available(QueueRole::Transfer) {
        score += 100;
    }

    score
}
