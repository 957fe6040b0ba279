//! RHI-specific error types.

use ash::vk;
use thiserror::Error;

/// Errors raised by the Vulkan layer.
///
/// Raw `vk::Result`s that carry a recovery meaning are mapped to their own
/// variant by [`RhiError::from_vk`].
#[derive(Error, Debug)]
pub enum RhiError {
    #[error("Vulkan error: {0}")]
    VulkanError(#[from] vk::Result),

    #[error("Failed to load Vulkan: {0}")]
    LoadingError(#[from] ash::LoadingError),

    #[error("Allocator error: {0}")]
    AllocatorError(#[from] gpu_allocator::AllocationError),

    #[error("No suitable GPU found")]
    NoSuitableGpu,

    /// A required queue family, format or extension is missing.
    #[error("Unsupported hardware: {0}")]
    UnsupportedHardware(String),

    #[error("Device lost")]
    DeviceLost,

    #[error("Surface lost")]
    SurfaceLost,

    /// Recreate the swapchain and continue.
    #[error("Swapchain out of date")]
    SwapchainOutOfDate,

    #[error("Shader error: {0}")]
    ShaderError(String),

    #[error("Surface error: {0}")]
    SurfaceError(String),

    #[error("Swapchain error: {0}")]
    SwapchainError(String),

    /// Use of a cleared object, an out-of-range index or invalid input.
    #[error("Invalid handle: {0}")]
    InvalidHandle(String),

    #[error("Pipeline error: {0}")]
    PipelineError(String),

    #[error("Descriptor error: {0}")]
    DescriptorError(String),
}

/// Coarse classification used by callers to decide how to react.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Missing queue family, memory type, extension or layer.
    UnsupportedHardware,
    /// Suboptimal or out-of-date swapchain; recreate and continue.
    TransientPresentation,
    /// Device or surface lost; tear down the whole context.
    Lost,
    /// Memory, descriptor or handle allocation failed.
    ResourceExhaustion,
    /// Anything else (invalid input, driver error).
    Other,
}

impl RhiError {
    /// Converts a raw Vulkan result into the most specific error variant.
    pub fn from_vk(result: vk::Result) -> Self {
        match result {
            vk::Result::ERROR_DEVICE_LOST => Self::DeviceLost,
            vk::Result::ERROR_SURFACE_LOST_KHR => Self::SurfaceLost,
            vk::Result::ERROR_OUT_OF_DATE_KHR => Self::SwapchainOutOfDate,
            other => Self::VulkanError(other),
        }
    }

    /// Returns the taxonomy this error belongs to.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::SwapchainOutOfDate => ErrorKind::TransientPresentation,
            Self::DeviceLost | Self::SurfaceLost => ErrorKind::Lost,
            Self::NoSuitableGpu | Self::UnsupportedHardware(_) | Self::LoadingError(_) => {
                ErrorKind::UnsupportedHardware
            }
            Self::AllocatorError(_) | Self::DescriptorError(_) => ErrorKind::ResourceExhaustion,
            Self::VulkanError(result) => match *result {
                vk::Result::ERROR_OUT_OF_HOST_MEMORY
                | vk::Result::ERROR_OUT_OF_DEVICE_MEMORY
                | vk::Result::ERROR_OUT_OF_POOL_MEMORY
                | vk::Result::ERROR_FRAGMENTED_POOL
                | vk::Result::ERROR_TOO_MANY_OBJECTS => ErrorKind::ResourceExhaustion,
                vk::Result::ERROR_EXTENSION_NOT_PRESENT
                | vk::Result::ERROR_LAYER_NOT_PRESENT
                | vk::Result::ERROR_FEATURE_NOT_PRESENT
                | vk::Result::ERROR_INCOMPATIBLE_DRIVER
                | vk::Result::ERROR_INITIALIZATION_FAILED => ErrorKind::UnsupportedHardware,
                vk::Result::ERROR_DEVICE_LOST | vk::Result::ERROR_SURFACE_LOST_KHR => {
                    ErrorKind::Lost
                }
                vk::Result::ERROR_OUT_OF_DATE_KHR | vk::Result::SUBOPTIMAL_KHR => {
                    ErrorKind::TransientPresentation
                }
                _ => ErrorKind::Other,
            },
            _ => ErrorKind::Other,
        }
    }

    /// Returns `false` only for signals that swapchain recreation resolves.
    #[inline]
    pub fn is_fatal(&self) -> bool {
        self.kind() != ErrorKind::TransientPresentation
    }
}

/// Result type alias for RHI operations.
pub type RhiResult<T> = std::result::Result<T, RhiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_vk_classifies_lost_and_out_of_date() {
        assert!(matches!(
            RhiError::from_vk(vk::Result::ERROR_DEVICE_LOST),
            RhiError::DeviceLost
        ));
        assert!(matches!(
            RhiError::from_vk(vk::Result::ERROR_SURFACE_LOST_KHR),
            RhiError::SurfaceLost
        ));
        assert!(matches!(
            RhiError::from_vk(vk::Result::ERROR_OUT_OF_DATE_KHR),
            RhiError::SwapchainOutOfDate
        ));
        assert!(matches!(
            RhiError::from_vk(vk::Result::TIMEOUT),
            RhiError::VulkanError(vk::Result::TIMEOUT)
        ));
    }

    #[test]
    fn test_only_out_of_date_is_not_fatal() {
        assert!(!RhiError::SwapchainOutOfDate.is_fatal());
        assert!(RhiError::DeviceLost.is_fatal());
        assert!(RhiError::SurfaceLost.is_fatal());
        assert!(RhiError::NoSuitableGpu.is_fatal());
        assert!(RhiError::VulkanError(vk::Result::TIMEOUT).is_fatal());
    }

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            RhiError::UnsupportedHardware("no render family".into()).kind(),
            ErrorKind::UnsupportedHardware
        );
        assert_eq!(
            RhiError::VulkanError(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY).kind(),
            ErrorKind::ResourceExhaustion
        );
        assert_eq!(
            RhiError::DescriptorError("pool exhausted".into()).kind(),
            ErrorKind::ResourceExhaustion
        );
        assert_eq!(RhiError::DeviceLost.kind(), ErrorKind::Lost);
        assert_eq!(
            RhiError::ShaderError("bad".into()).kind(),
            ErrorKind::Other
        );
    }
}
