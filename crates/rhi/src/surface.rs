//! Presentation surface ownership and capability queries.
//!
//! Surfaces are created by windowing code. [`Surface::from_raw`] takes
//! ownership of the handle so it is destroyed after the swapchain that
//! presents to it and before the instance.

use ash::vk;
use tracing::debug;

use crate::error::{RhiError, RhiResult};
use crate::instance::Instance;

/// Capabilities, formats and present modes reported for a surface.
#[derive(Debug, Clone, Default)]
pub struct SurfaceSupport {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SurfaceSupport {
    /// A surface is usable if it reports at least one format and one present mode.
    #[inline]
    pub fn is_adequate(&self) -> bool {
        !self.formats.is_empty() && !self.present_modes.is_empty()
    }
}

/// RAII wrapper for a Vulkan surface handed over by windowing code.
///
/// # Ownership
///
/// The wrapper destroys the surface on drop. It must be dropped before the
/// [`Instance`] it was created from.
pub struct Surface {
    handle: vk::SurfaceKHR,
    loader: ash::khr::surface::Instance,
}

impl Surface {
    /// Takes ownership of an existing surface handle.
    ///
    /// # Safety
    ///
    /// `handle` must have been created from `instance` and must not be
    /// destroyed by anyone else.
    pub unsafe fn from_raw(instance: &Instance, handle: vk::SurfaceKHR) -> Self {
        let loader = ash::khr::surface::Instance::new(instance.entry(), instance.handle());
        Self { handle, loader }
    }

    /// Get the raw Vulkan surface handle.
    #[inline]
    pub fn handle(&self) -> vk::SurfaceKHR {
        self.handle
    }

    /// Get the surface extension loader.
    #[inline]
    pub fn loader(&self) -> &ash::khr::surface::Instance {
        &self.loader
    }

    /// Returns whether `queue_family` on `physical_device` can present here.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails (for example, surface lost).
    pub fn supports_queue_family(
        &self,
        physical_device: vk::PhysicalDevice,
        queue_family: u32,
    ) -> RhiResult<bool> {
        unsafe {
            self.loader
                .get_physical_device_surface_support(physical_device, queue_family, self.handle)
                .map_err(RhiError::from_vk)
        }
    }

    /// Queries capabilities, formats and present modes.
    ///
    /// # Errors
    ///
    /// Returns an error if any of the three queries fails.
    pub fn query_support(&self, physical_device: vk::PhysicalDevice) -> RhiResult<SurfaceSupport> {
        let support = unsafe {
            SurfaceSupport {
                capabilities: self
                    .loader
                    .get_physical_device_surface_capabilities(physical_device, self.handle)
                    .map_err(RhiError::from_vk)?,
                formats: self
                    .loader
                    .get_physical_device_surface_formats(physical_device, self.handle)
                    .map_err(RhiError::from_vk)?,
                present_modes: self
                    .loader
                    .get_physical_device_surface_present_modes(physical_device, self.handle)
                    .map_err(RhiError::from_vk)?,
            }
        };

        debug!(
            "Surface support: {} formats, {} present modes, images {}..{}",
            support.formats.len(),
            support.present_modes.len(),
            support.capabilities.min_image_count,
            support.capabilities.max_image_count
        );

        Ok(support)
    }
}

impl Drop for Surface {
    fn drop(&mut self) {
        unsafe {
            self.loader.destroy_surface(self.handle, None);
        }
        debug!("Surface destroyed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_support_adequacy() {
        let mut support = SurfaceSupport::default();
        assert!(!support.is_adequate());

        support.formats.push(vk::SurfaceFormatKHR::default());
        assert!(!support.is_adequate());

        support.present_modes.push(vk::PresentModeKHR::FIFO);
        assert!(support.is_adequate());
    }
}
