//! Swapchain management.
//!
//! This module handles VkSwapchainKHR creation, image acquisition, and presentation.
//!
//! # Overview
//!
//! The [`Swapchain`] struct provides a safe abstraction over the Vulkan swapchain,
//! including:
//! - Vsync negotiation through [`VsyncMode`] and its fallback chain
//! - Format and image count selection
//! - Image view creation and management
//! - Recreation that hands the old swapchain to the driver before destroying it
//!
//! # Vsync fallback
//!
//! | Mode | Present mode | Images | Falls back to |
//! |------|--------------|--------|---------------|
//! | `TripleBuffering` | MAILBOX | 3 | `Relaxed` |
//! | `Relaxed` | FIFO_RELAXED | 2 | `On` |
//! | `On` | FIFO | 2 | `Off` |
//! | `Off` | IMMEDIATE | 2 | - |
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use forward_rhi::device::Device;
//! use forward_rhi::surface::Surface;
//! use forward_rhi::swapchain::{Swapchain, VsyncMode};
//!
//! use forward_rhi::instance::Instance;
//!
//! # fn example(instance: &Instance, device: Arc<Device>, surface: &Surface, semaphore: ash::vk::Semaphore)
//! #     -> Result<(), forward_rhi::RhiError> {
//! let swapchain = Swapchain::new(instance, device, surface, VsyncMode::TripleBuffering, 1280, 720)?;
//!
//! let (image_index, suboptimal) = swapchain.acquire_next_image(semaphore, u64::MAX)?;
//! assert!(image_index < swapchain.image_count());
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use forward_core::VsyncPreference;
use tracing::{debug, info, warn};

use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::instance::Instance;
use crate::physical_device::QueueRole;
use crate::surface::{Surface, SurfaceSupport};

/// Canonical 8-bit-per-channel surface format.
pub const CANONICAL_SURFACE_FORMAT: vk::SurfaceFormatKHR = vk::SurfaceFormatKHR {
    format: vk::Format::B8G8R8A8_SRGB,
    color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
};

/// Presentation behavior requested for a swapchain.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum VsyncMode {
    /// Present immediately; may tear.
    Off,
    /// Wait for vertical blank.
    On,
    /// Wait for vertical blank unless the frame is late.
    Relaxed,
    /// Mailbox presentation; newest frame replaces a queued one.
    TripleBuffering,
}

impl VsyncMode {
    /// All modes, from most to fewest buffers.
    pub const ALL: [VsyncMode; 4] = [
        VsyncMode::TripleBuffering,
        VsyncMode::Relaxed,
        VsyncMode::On,
        VsyncMode::Off,
    ];

    /// Number of swapchain images this mode needs.
    #[inline]
    pub fn required_buffers(self) -> u32 {
        match self {
            VsyncMode::TripleBuffering => 3,
            VsyncMode::Off | VsyncMode::On | VsyncMode::Relaxed => 2,
        }
    }

    /// The Vulkan present mode implementing this mode.
    #[inline]
    pub fn present_mode(self) -> vk::PresentModeKHR {
        match self {
            VsyncMode::Off => vk::PresentModeKHR::IMMEDIATE,
            VsyncMode::On => vk::PresentModeKHR::FIFO,
            VsyncMode::Relaxed => vk::PresentModeKHR::FIFO_RELAXED,
            VsyncMode::TripleBuffering => vk::PresentModeKHR::MAILBOX,
        }
    }

    /// The next mode to try when this one is unsupported.
    #[inline]
    pub fn fallback(self) -> Option<VsyncMode> {
        match self {
            VsyncMode::TripleBuffering => Some(VsyncMode::Relaxed),
            VsyncMode::Relaxed => Some(VsyncMode::On),
            VsyncMode::On => Some(VsyncMode::Off),
            VsyncMode::Off => None,
        }
    }
}

impl From<VsyncPreference> for VsyncMode {
    fn from(preference: VsyncPreference) -> Self {
        match preference {
            VsyncPreference::Off => VsyncMode::Off,
            VsyncPreference::On => VsyncMode::On,
            VsyncPreference::Relaxed => VsyncMode::Relaxed,
            VsyncPreference::TripleBuffering => VsyncMode::TripleBuffering,
        }
    }
}

/// Picks the first mode along `desired`'s fallback chain that the surface
/// supports, both in present mode and in image count.
///
/// FIFO is always available, so if the chain runs out [`VsyncMode::On`] is
/// returned.
pub fn negotiate_vsync(
    desired: VsyncMode,
    present_modes: &[vk::PresentModeKHR],
    capabilities: &vk::SurfaceCapabilitiesKHR,
) -> VsyncMode {
    let mut candidate = Some(desired);

    while let Some(mode) = candidate {
        let mode_supported = present_modes.contains(&mode.present_mode());
        let count_supported = capabilities.max_image_count == 0
            || mode.required_buffers() <= capabilities.max_image_count;

        if mode_supported && count_supported {
            if mode != desired {
                warn!("Vsync mode {:?} unsupported, using {:?}", desired, mode);
            }
            return mode;
        }
        candidate = mode.fallback();
    }

    warn!(
        "No mode in the fallback chain of {:?} is supported, using FIFO",
        desired
    );
    VsyncMode::On
}

/// Clamps the requested image count into the surface's `[min, max]` range.
///
/// A `max_image_count` of zero means there is no upper bound.
pub fn determine_image_count(required: u32, capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let count = required.max(capabilities.min_image_count);
    if capabilities.max_image_count > 0 {
        count.min(capabilities.max_image_count)
    } else {
        count
    }
}

/// Chooses the surface format.
///
/// A single UNDEFINED entry means the surface accepts anything, so the
/// canonical format is used. Otherwise the canonical format is preferred and
/// the first reported format is the fallback.
///
/// # Errors
///
/// Returns [`RhiError::SwapchainError`] if the surface reports no formats.
pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> RhiResult<vk::SurfaceFormatKHR> {
    let Some(&first) = formats.first() else {
        return Err(RhiError::SwapchainError(
            "surface reports no formats".to_string(),
        ));
    };

    if formats.len() == 1 && first.format == vk::Format::UNDEFINED {
        debug!("Surface has no preferred format, using canonical format");
        return Ok(CANONICAL_SURFACE_FORMAT);
    }

    if formats.contains(&CANONICAL_SURFACE_FORMAT) {
        return Ok(CANONICAL_SURFACE_FORMAT);
    }

    warn!("Canonical surface format unavailable, using {:?}", first.format);
    Ok(first)
}

/// Chooses the swapchain extent (resolution).
///
/// If the current extent is not set (width/height are u32::MAX),
/// clamps the requested size to the surface's min/max extents.
pub fn choose_extent(
    capabilities: &vk::SurfaceCapabilitiesKHR,
    width: u32,
    height: u32,
) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        return capabilities.current_extent;
    }

    vk::Extent2D {
        width: width.clamp(
            capabilities.min_image_extent.width,
            capabilities.max_image_extent.width,
        ),
        height: height.clamp(
            capabilities.min_image_extent.height,
            capabilities.max_image_extent.height,
        ),
    }
}

/// Vulkan swapchain wrapper.
///
/// Owns the swapchain handle and one view per image. The images themselves
/// belong to the swapchain.
///
/// # Thread Safety
///
/// The swapchain is driven by the single render thread.
pub struct Swapchain {
    device: Arc<Device>,
    loader: ash::khr::swapchain::Device,
    swapchain: vk::SwapchainKHR,
    images: Vec<vk::Image>,
    image_views: Vec<vk::ImageView>,
    format: vk::Format,
    color_space: vk::ColorSpaceKHR,
    extent: vk::Extent2D,
    /// Mode requested by the caller, kept for recreation.
    desired_mode: VsyncMode,
    /// Mode actually negotiated.
    vsync_mode: VsyncMode,
}

/// The swapchain state produced by one creation.
struct SwapchainParts {
    swapchain: vk::SwapchainKHR,
    images: Vec<vk::Image>,
    image_views: Vec<vk::ImageView>,
    format: vk::SurfaceFormatKHR,
    extent: vk::Extent2D,
    vsync_mode: VsyncMode,
}

impl Swapchain {
    /// Creates a new swapchain.
    ///
    /// # Arguments
    ///
    /// * `instance` - The instance the device and surface belong to
    /// * `device` - The logical device (created with presentation enabled)
    /// * `surface` - The presentation surface
    /// * `desired` - Requested vsync mode; negotiated down if unsupported
    /// * `width`, `height` - Window size used when the surface has no fixed extent
    ///
    /// # Errors
    ///
    /// Returns an error if surface queries fail, no format is reported,
    /// or swapchain or view creation fails.
    pub fn new(
        instance: &Instance,
        device: Arc<Device>,
        surface: &Surface,
        desired: VsyncMode,
        width: u32,
        height: u32,
    ) -> RhiResult<Self> {
        let loader = ash::khr::swapchain::Device::new(instance.handle(), device.handle());

        let parts = create_parts(
            &device,
            &loader,
            surface,
            desired,
            width,
            height,
            vk::SwapchainKHR::null(),
        )?;

        Ok(Self {
            device,
            loader,
            swapchain: parts.swapchain,
            images: parts.images,
            image_views: parts.image_views,
            format: parts.format.format,
            color_space: parts.format.color_space,
            extent: parts.extent,
            desired_mode: desired,
            vsync_mode: parts.vsync_mode,
        })
    }

    /// Recreates the swapchain for a new surface size.
    ///
    /// The caller must have drained every in-flight frame first. The old
    /// handle is passed to the driver and destroyed only after the new
    /// swapchain exists; on failure the old swapchain stays intact.
    ///
    /// # Errors
    ///
    /// Returns an error if creation of the new swapchain fails.
    pub fn recreate(&mut self, surface: &Surface, width: u32, height: u32) -> RhiResult<()> {
        info!("Recreating swapchain for new size: {}x{}", width, height);

        let parts = create_parts(
            &self.device,
            &self.loader,
            surface,
            self.desired_mode,
            width,
            height,
            self.swapchain,
        )?;

        self.destroy_resources();

        self.swapchain = parts.swapchain;
        self.images = parts.images;
        self.image_views = parts.image_views;
        self.format = parts.format.format;
        self.color_space = parts.format.color_space;
        self.extent = parts.extent;
        self.vsync_mode = parts.vsync_mode;

        Ok(())
    }

    /// Acquires the next swapchain image for rendering.
    ///
    /// # Returns
    ///
    /// `(image_index, suboptimal)`; the index is always below [`Swapchain::image_count`].
    ///
    /// # Errors
    ///
    /// - [`RhiError::SwapchainOutOfDate`] when the swapchain must be recreated
    /// - [`RhiError::SurfaceLost`] / [`RhiError::DeviceLost`] (fatal)
    /// - `VulkanError(TIMEOUT)` if `timeout` expires
    pub fn acquire_next_image(&self, semaphore: vk::Semaphore, timeout: u64) -> RhiResult<(u32, bool)> {
        let (index, suboptimal) = unsafe {
            self.loader
                .acquire_next_image(self.swapchain, timeout, semaphore, vk::Fence::null())
                .map_err(RhiError::from_vk)?
        };

        if index >= self.image_count() {
            return Err(RhiError::SwapchainError(format!(
                "acquired image {} out of {}",
                index,
                self.image_count()
            )));
        }

        Ok((index, suboptimal))
    }

    /// Presents an image, waiting on `wait_semaphore`.
    ///
    /// # Returns
    ///
    /// `true` if the swapchain is suboptimal and should be recreated.
    ///
    /// # Errors
    ///
    /// Same classification as [`Swapchain::acquire_next_image`].
    pub fn present(&self, queue: vk::Queue, image_index: u32, wait_semaphore: vk::Semaphore) -> RhiResult<bool> {
        let swapchains = [self.swapchain];
        let image_indices = [image_index];
        let wait_semaphores = [wait_semaphore];

        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        unsafe {
            self.loader
                .queue_present(queue, &present_info)
                .map_err(RhiError::from_vk)
        }
    }

    /// Returns the swapchain handle.
    #[inline]
    pub fn handle(&self) -> vk::SwapchainKHR {
        self.swapchain
    }

    /// Returns the swapchain image format.
    #[inline]
    pub fn format(&self) -> vk::Format {
        self.format
    }

    /// Returns the swapchain color space.
    #[inline]
    pub fn color_space(&self) -> vk::ColorSpaceKHR {
        self.color_space
    }

    /// Returns the swapchain extent (resolution).
    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    /// Returns the negotiated vsync mode.
    #[inline]
    pub fn vsync_mode(&self) -> VsyncMode {
        self.vsync_mode
    }

    /// Returns the number of swapchain images.
    #[inline]
    pub fn image_count(&self) -> u32 {
        self.images.len() as u32
    }

    /// Returns the swapchain image at the given index.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of bounds.
    #[inline]
    pub fn image(&self, index: usize) -> vk::Image {
        self.images[index]
    }

    /// Returns all image views.
    #[inline]
    pub fn image_views(&self) -> &[vk::ImageView] {
        &self.image_views
    }

    /// Destroys the views and the swapchain. Safe to call repeatedly.
    pub fn clear(&mut self) {
        if self.swapchain == vk::SwapchainKHR::null() && self.image_views.is_empty() {
            return;
        }
        let image_count = self.images.len();
        self.destroy_resources();
        info!(
            "Swapchain destroyed (was {}x{}, {} images)",
            self.extent.width, self.extent.height, image_count
        );
    }

    fn destroy_resources(&mut self) {
        for &image_view in &self.image_views {
            unsafe {
                self.device.handle().destroy_image_view(image_view, None);
            }
        }
        self.image_views.clear();
        self.images.clear();

        if self.swapchain != vk::SwapchainKHR::null() {
            unsafe {
                self.loader.destroy_swapchain(self.swapchain, None);
            }
            self.swapchain = vk::SwapchainKHR::null();
        }
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        self.clear();
    }
}

fn create_parts(
    device: &Device,
    loader: &ash::khr::swapchain::Device,
    surface: &Surface,
    desired: VsyncMode,
    width: u32,
    height: u32,
    old_swapchain: vk::SwapchainKHR,
) -> RhiResult<SwapchainParts> {
    let support: SurfaceSupport = surface.query_support(device.physical_device())?;
    let capabilities = &support.capabilities;

    let format = choose_surface_format(&support.formats)?;
    let vsync_mode = negotiate_vsync(desired, &support.present_modes, capabilities);
    let image_count = determine_image_count(vsync_mode.required_buffers(), capabilities);
    let extent = choose_extent(capabilities, width, height);

    if extent.width == 0 || extent.height == 0 {
        return Err(RhiError::SwapchainError(
            "surface extent is zero (window minimized?)".to_string(),
        ));
    }

    info!(
        "Creating swapchain: {}x{}, format {:?}, {:?} ({:?}), {} images",
        extent.width,
        extent.height,
        format.format,
        vsync_mode,
        vsync_mode.present_mode(),
        image_count
    );

    let render_family = device.queue_family(QueueRole::Render);
    let present_family = device.queue_family(QueueRole::Present);
    let queue_family_indices = [render_family, present_family];

    let (sharing_mode, family_slice) = if render_family != present_family {
        debug!(
            "Using CONCURRENT sharing between render ({}) and present ({}) families",
            render_family, present_family
        );
        (vk::SharingMode::CONCURRENT, queue_family_indices.as_slice())
    } else {
        (vk::SharingMode::EXCLUSIVE, &[][..])
    };

    let create_info = vk::SwapchainCreateInfoKHR::default()
        .surface(surface.handle())
        .min_image_count(image_count)
        .image_format(format.format)
        .image_color_space(format.color_space)
        .image_extent(extent)
        .image_array_layers(1)
        .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
        .image_sharing_mode(sharing_mode)
        .queue_family_indices(family_slice)
        .pre_transform(capabilities.current_transform)
        .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
        .present_mode(vsync_mode.present_mode())
        .clipped(true)
        .old_swapchain(old_swapchain);

    let swapchain = unsafe {
        loader
            .create_swapchain(&create_info, None)
            .map_err(RhiError::from_vk)?
    };

    let images = match unsafe { loader.get_swapchain_images(swapchain) } {
        Ok(images) => images,
        Err(e) => {
            unsafe { loader.destroy_swapchain(swapchain, None) };
            return Err(RhiError::from_vk(e));
        }
    };

    let image_views = match create_image_views(device, &images, format.format) {
        Ok(views) => views,
        Err(e) => {
            unsafe { loader.destroy_swapchain(swapchain, None) };
            return Err(e);
        }
    };

    info!("Swapchain created with {} images", images.len());

    Ok(SwapchainParts {
        swapchain,
        images,
        image_views,
        format,
        extent,
        vsync_mode,
    })
}

/// Creates image views for swapchain images, releasing partial work on failure.
fn create_image_views(
    device: &Device,
    images: &[vk::Image],
    format: vk::Format,
) -> RhiResult<Vec<vk::ImageView>> {
    let mut image_views = Vec::with_capacity(images.len());

    for (i, &image) in images.iter().enumerate() {
        let create_info = vk::ImageViewCreateInfo::default()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(format)
            .components(vk::ComponentMapping::default())
            .subresource_range(
                vk::ImageSubresourceRange::default()
                    .aspect_mask(vk::ImageAspectFlags::COLOR)
                    .level_count(1)
                    .layer_count(1),
            );

        match unsafe { device.handle().create_image_view(&create_info, None) } {
            Ok(view) => image_views.push(view),
            Err(e) => {
                for view in image_views {
                    unsafe { device.handle().destroy_image_view(view, None) };
                }
                return Err(RhiError::SwapchainError(format!(
                    "Failed to create image view {}: {:?}",
                    i, e
                )));
            }
        }
    }

    Ok(image_views)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caps(min: u32, max: u32) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            min_image_count: min,
            max_image_count: max,
            ..Default::default()
        }
    }

    const ALL_MODES: [vk::PresentModeKHR; 4] = [
        vk::PresentModeKHR::IMMEDIATE,
        vk::PresentModeKHR::FIFO,
        vk::PresentModeKHR::FIFO_RELAXED,
        vk::PresentModeKHR::MAILBOX,
    ];

    #[test]
    fn test_required_buffers_are_two_or_three() {
        for mode in VsyncMode::ALL {
            assert!(matches!(mode.required_buffers(), 2 | 3));
        }
        assert_eq!(VsyncMode::TripleBuffering.required_buffers(), 3);
    }

    #[test]
    fn test_fallback_never_increases_buffers_and_ends_at_off() {
        for mode in VsyncMode::ALL {
            let mut current = mode;
            let mut steps = 0;
            while let Some(next) = current.fallback() {
                assert!(next.required_buffers() <= current.required_buffers());
                current = next;
                steps += 1;
                assert!(steps <= VsyncMode::ALL.len());
            }
            assert_eq!(current, VsyncMode::Off);
        }
        let minimum = VsyncMode::ALL
            .iter()
            .map(|m| m.required_buffers())
            .min()
            .unwrap();
        assert_eq!(VsyncMode::Off.required_buffers(), minimum);
    }

    #[test]
    fn test_fallback_chain_order() {
        assert_eq!(VsyncMode::TripleBuffering.fallback(), Some(VsyncMode::Relaxed));
        assert_eq!(VsyncMode::Relaxed.fallback(), Some(VsyncMode::On));
        assert_eq!(VsyncMode::On.fallback(), Some(VsyncMode::Off));
        assert_eq!(VsyncMode::Off.fallback(), None);
    }

    #[test]
    fn test_negotiate_exact_mode() {
        let mode = negotiate_vsync(VsyncMode::TripleBuffering, &ALL_MODES, &caps(2, 8));
        assert_eq!(mode, VsyncMode::TripleBuffering);
    }

    #[test]
    fn test_triple_buffering_falls_back_when_max_is_two() {
        let capabilities = caps(2, 2);
        let mode = negotiate_vsync(VsyncMode::TripleBuffering, &ALL_MODES, &capabilities);

        assert!(mode.required_buffers() <= 2);
        assert_eq!(mode, VsyncMode::Relaxed);

        let count = determine_image_count(mode.required_buffers(), &capabilities);
        assert_eq!(count, 2);
    }

    #[test]
    fn test_on_falls_back_to_off_when_fifo_missing() {
        let modes = [vk::PresentModeKHR::IMMEDIATE];
        assert_eq!(negotiate_vsync(VsyncMode::On, &modes, &caps(2, 0)), VsyncMode::Off);
    }

    #[test]
    fn test_unsupported_mailbox_skips_to_fifo() {
        let modes = [vk::PresentModeKHR::FIFO];
        assert_eq!(
            negotiate_vsync(VsyncMode::TripleBuffering, &modes, &caps(2, 0)),
            VsyncMode::On
        );
    }

    #[test]
    fn test_exhausted_chain_uses_fifo() {
        let modes = [vk::PresentModeKHR::FIFO];
        assert_eq!(negotiate_vsync(VsyncMode::Off, &modes, &caps(2, 0)), VsyncMode::On);
    }

    #[test]
    fn test_determine_image_count_clamps() {
        assert_eq!(determine_image_count(3, &caps(2, 8)), 3);
        assert_eq!(determine_image_count(2, &caps(3, 8)), 3);
        assert_eq!(determine_image_count(3, &caps(1, 2)), 2);
        assert_eq!(determine_image_count(3, &caps(2, 0)), 3);
    }

    #[test]
    fn test_canonical_format_is_bgra_srgb() {
        assert_eq!(CANONICAL_SURFACE_FORMAT.format, vk::Format::B8G8R8A8_SRGB);
        assert_eq!(
            CANONICAL_SURFACE_FORMAT.color_space,
            vk::ColorSpaceKHR::SRGB_NONLINEAR
        );
    }

    #[test]
    fn test_choose_surface_format_prefers_canonical() {
        let formats = [
            vk::SurfaceFormatKHR {
                format: vk::Format::R8G8B8A8_UNORM,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
            CANONICAL_SURFACE_FORMAT,
        ];

        assert_eq!(choose_surface_format(&formats).unwrap(), CANONICAL_SURFACE_FORMAT);
    }

    #[test]
    fn test_choose_surface_format_falls_back_to_first() {
        let first = vk::SurfaceFormatKHR {
            format: vk::Format::R8G8B8A8_UNORM,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        };
        let formats = [
            first,
            vk::SurfaceFormatKHR {
                format: vk::Format::A2B10G10R10_UNORM_PACK32,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
        ];

        assert_eq!(choose_surface_format(&formats).unwrap(), first);
    }

    #[test]
    fn test_choose_surface_format_undefined_means_canonical() {
        let formats = [vk::SurfaceFormatKHR {
            format: vk::Format::UNDEFINED,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        }];

        assert_eq!(choose_surface_format(&formats).unwrap(), CANONICAL_SURFACE_FORMAT);
    }

    #[test]
    fn test_choose_surface_format_empty_is_error() {
        assert!(matches!(
            choose_surface_format(&[]),
            Err(RhiError::SwapchainError(_))
        ));
    }

    #[test]
    fn test_choose_extent_uses_current() {
        let capabilities = vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: 1920,
                height: 1080,
            },
            ..Default::default()
        };

        let extent = choose_extent(&capabilities, 800, 600);
        assert_eq!((extent.width, extent.height), (1920, 1080));
    }

    #[test]
    fn test_choose_extent_clamps_to_limits() {
        let capabilities = vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: u32::MAX,
                height: u32::MAX,
            },
            min_image_extent: vk::Extent2D {
                width: 100,
                height: 100,
            },
            max_image_extent: vk::Extent2D {
                width: 2000,
                height: 2000,
            },
            ..Default::default()
        };

        let extent = choose_extent(&capabilities, 3000, 50);
        assert_eq!((extent.width, extent.height), (2000, 100));

        let extent = choose_extent(&capabilities, 800, 600);
        assert_eq!((extent.width, extent.height), (800, 600));
    }

    #[test]
    fn test_vsync_from_preference() {
        assert_eq!(VsyncMode::from(VsyncPreference::Off), VsyncMode::Off);
        assert_eq!(
            VsyncMode::from(VsyncPreference::TripleBuffering),
            VsyncMode::TripleBuffering
        );
    }
}
