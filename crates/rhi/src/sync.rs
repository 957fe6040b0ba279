//! Synchronization primitives for Vulkan.
//!
//! This module provides wrappers for Vulkan synchronization objects:
//! - [`Semaphore`] - GPU-to-GPU synchronization (between queue operations)
//! - [`Fence`] - GPU-to-CPU synchronization (for host waiting)
//! - [`FrameSync`] - The primitives owned by one virtual frame
//! - [`SyncSet`] - All virtual frames plus the per-image fence table
//!
//! # Virtual frames
//!
//! The CPU may prepare up to `F` frames ahead of the GPU. Frame number `n`
//! uses virtual frame `n mod F`. Each virtual frame owns one fence, created
//! signaled so the first wait returns immediately, and the pair of
//! semaphores that chain acquire → render → present on the GPU.
//!
//! Waiting on a virtual frame's fence and then resetting it before recording
//! is what bounds the GPU queue depth to `F` frames.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use forward_rhi::device::Device;
//! use forward_rhi::sync::SyncSet;
//!
//! # fn example(device: Arc<Device>) -> Result<(), forward_rhi::RhiError> {
//! let mut sync = SyncSet::new(device, 3)?;
//!
//! let frame_count = 7u64;
//! let frame = sync.advance(frame_count);
//! assert_eq!(frame, 1);
//!
//! sync.wait_and_reset(frame, u64::MAX)?;
//! // ... record, then submit signaling sync.frame(frame).in_flight_fence_handle()
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info};

use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// Vulkan semaphore wrapper.
///
/// Semaphores are used for GPU-to-GPU synchronization between queue operations.
pub struct Semaphore {
    /// Reference to the logical device.
    device: Arc<Device>,
    /// Vulkan semaphore handle.
    semaphore: vk::Semaphore,
}

impl Semaphore {
    /// Creates a new semaphore in the unsignaled state.
    ///
    /// # Errors
    ///
    /// Returns an error if semaphore creation fails.
    pub fn new(device: Arc<Device>) -> RhiResult<Self> {
        let create_info = vk::SemaphoreCreateInfo::default();

        let semaphore = unsafe { device.handle().create_semaphore(&create_info, None)? };

        Ok(Self { device, semaphore })
    }

    /// Returns the Vulkan semaphore handle.
    #[inline]
    pub fn handle(&self) -> vk::Semaphore {
        self.semaphore
    }
}

impl Drop for Semaphore {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_semaphore(self.semaphore, None);
        }
    }
}

/// Vulkan fence wrapper.
///
/// Fences are used for GPU-to-CPU synchronization, allowing the host to wait
/// for GPU operations to complete. Common use cases include:
/// - Virtual-frame fence: wait before reusing a frame's buffers and commands
/// - Upload fence: wait for a one-time staging transfer
pub struct Fence {
    /// Reference to the logical device.
    device: Arc<Device>,
    /// Vulkan fence handle.
    fence: vk::Fence,
}

impl Fence {
    /// Creates a new fence.
    ///
    /// # Arguments
    ///
    /// * `device` - The logical device
    /// * `signaled` - If true, creates the fence in the signaled state so the
    ///   first wait does not block on a fence nobody will signal.
    ///
    /// # Errors
    ///
    /// Returns an error if fence creation fails.
    pub fn new(device: Arc<Device>, signaled: bool) -> RhiResult<Self> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };

        let create_info = vk::FenceCreateInfo::default().flags(flags);

        let fence = unsafe { device.handle().create_fence(&create_info, None)? };

        debug!(
            "Created fence ({})",
            if signaled { "signaled" } else { "unsignaled" }
        );

        Ok(Self { device, fence })
    }

    /// Returns the Vulkan fence handle.
    #[inline]
    pub fn handle(&self) -> vk::Fence {
        self.fence
    }

    /// Waits for the fence to become signaled.
    ///
    /// Returns immediately if the fence is already signaled.
    ///
    /// # Arguments
    ///
    /// * `timeout` - Timeout in nanoseconds. Use `u64::MAX` for infinite wait.
    ///
    /// # Errors
    ///
    /// Returns `VulkanError(TIMEOUT)` if the timeout expires, or a classified
    /// error such as [`RhiError::DeviceLost`].
    pub fn wait(&self, timeout: u64) -> RhiResult<()> {
        wait_for_fences(&self.device, &[self.fence], timeout)
    }

    /// Resets the fence to the unsignaled state.
    ///
    /// The fence must not be in use by any queue operation when this is called.
    ///
    /// # Errors
    ///
    /// Returns an error if the reset operation fails.
    pub fn reset(&self) -> RhiResult<()> {
        let fences = [self.fence];
        unsafe { self.device.handle().reset_fences(&fences)? };
        Ok(())
    }

    /// Checks if the fence is currently signaled without blocking.
    pub fn is_signaled(&self) -> bool {
        let result = unsafe { self.device.handle().get_fence_status(self.fence) };
        matches!(result, Ok(true))
    }
}

impl Drop for Fence {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_fence(self.fence, None);
        }
    }
}

/// Waits for all `fences`, classifying failures.
fn wait_for_fences(device: &Device, fences: &[vk::Fence], timeout: u64) -> RhiResult<()> {
    if fences.is_empty() {
        return Ok(());
    }
    unsafe {
        device
            .handle()
            .wait_for_fences(fences, true, timeout)
            .map_err(RhiError::from_vk)
    }
}

/// Returns the virtual frame that frame number `frame_count` uses.
#[inline]
pub fn virtual_frame_index(frame_count: u64, frames_in_flight: usize) -> usize {
    (frame_count % frames_in_flight as u64) as usize
}

/// Synchronization primitives owned by one virtual frame.
///
/// ```text
/// 1. Wait for in_flight_fence, then reset it
/// 2. Acquire swapchain image (signals image_available)
/// 3. Submit: wait image_available, signal frame_complete + in_flight_fence
/// 4. Present: wait frame_complete
/// ```
pub struct FrameSync {
    /// Semaphore signaled when a swapchain image is available.
    image_available: Semaphore,
    /// Semaphore signaled when the frame's commands finished executing.
    frame_complete: Semaphore,
    /// Fence used to wait for frame completion before reusing resources.
    in_flight_fence: Fence,
}

impl FrameSync {
    /// Creates the primitives for one virtual frame.
    ///
    /// The in-flight fence is created in the signaled state.
    ///
    /// # Errors
    ///
    /// Returns an error if any synchronization object creation fails.
    pub fn new(device: Arc<Device>) -> RhiResult<Self> {
        Ok(Self {
            image_available: Semaphore::new(device.clone())?,
            frame_complete: Semaphore::new(device.clone())?,
            in_flight_fence: Fence::new(device, true)?,
        })
    }

    /// Returns the semaphore signaled by image acquisition.
    #[inline]
    pub fn image_available(&self) -> &Semaphore {
        &self.image_available
    }

    /// Returns the semaphore signaled when rendering completes.
    #[inline]
    pub fn frame_complete(&self) -> &Semaphore {
        &self.frame_complete
    }

    /// Returns the virtual frame's fence.
    #[inline]
    pub fn in_flight_fence(&self) -> &Fence {
        &self.in_flight_fence
    }

    #[inline]
    pub fn image_available_handle(&self) -> vk::Semaphore {
        self.image_available.handle()
    }

    #[inline]
    pub fn frame_complete_handle(&self) -> vk::Semaphore {
        self.frame_complete.handle()
    }

    #[inline]
    pub fn in_flight_fence_handle(&self) -> vk::Fence {
        self.in_flight_fence.handle()
    }
}

/// Synchronization state for all virtual frames.
///
/// Besides the per-frame primitives, the set remembers which fence last
/// covered each swapchain image. Command buffers are indexed by image, so
/// an image must not be re-recorded while a different virtual frame that
/// used it is still executing.
pub struct SyncSet {
    device: Arc<Device>,
    frames: Vec<FrameSync>,
    /// Fence of the virtual frame that last rendered each swapchain image.
    image_fences: Vec<vk::Fence>,
}

impl SyncSet {
    /// Creates primitives for `frames_in_flight` virtual frames.
    ///
    /// # Errors
    ///
    /// Returns an error if `frames_in_flight` is zero or any object creation
    /// fails; objects created so far are released.
    pub fn new(device: Arc<Device>, frames_in_flight: usize) -> RhiResult<Self> {
        if frames_in_flight == 0 {
            return Err(RhiError::InvalidHandle(
                "frames_in_flight must be at least 1".to_string(),
            ));
        }

        let frames = (0..frames_in_flight)
            .map(|_| FrameSync::new(device.clone()))
            .collect::<RhiResult<Vec<_>>>()?;

        info!("Created synchronization for {} virtual frames", frames_in_flight);

        Ok(Self {
            device,
            frames,
            image_fences: Vec::new(),
        })
    }

    /// Number of virtual frames.
    #[inline]
    pub fn frames_in_flight(&self) -> usize {
        self.frames.len()
    }

    /// Returns the virtual frame index for `frame_count`.
    #[inline]
    pub fn advance(&self, frame_count: u64) -> usize {
        virtual_frame_index(frame_count, self.frames.len())
    }

    /// Returns the primitives of virtual frame `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of range.
    #[inline]
    pub fn frame(&self, index: usize) -> &FrameSync {
        &self.frames[index]
    }

    /// Blocks until virtual frame `index` is no longer in flight, then resets
    /// its fence for the next submission.
    ///
    /// # Errors
    ///
    /// Returns a classified error if the wait or reset fails.
    pub fn wait_and_reset(&self, index: usize, timeout: u64) -> RhiResult<()> {
        let fence = self.frames[index].in_flight_fence();
        fence.wait(timeout)?;
        fence.reset()
    }

    /// Forgets per-image fences and sizes the table for `image_count` images.
    ///
    /// Call after the swapchain is (re)created.
    pub fn reset_images(&mut self, image_count: usize) {
        self.image_fences.clear();
        self.image_fences.resize(image_count, vk::Fence::null());
    }

    /// Waits until swapchain image `image_index` is not used by another
    /// virtual frame, then records that `frame_index` now owns it.
    ///
    /// # Errors
    ///
    /// Returns a classified error if the wait fails.
    pub fn claim_image(&mut self, image_index: usize, frame_index: usize, timeout: u64) -> RhiResult<()> {
        if image_index >= self.image_fences.len() {
            self.image_fences.resize(image_index + 1, vk::Fence::null());
        }

        let own = self.frames[frame_index].in_flight_fence_handle();
        let previous = self.image_fences[image_index];
        if previous != vk::Fence::null() && previous != own {
            wait_for_fences(&self.device, &[previous], timeout)?;
        }
        self.image_fences[image_index] = own;
        Ok(())
    }

    /// Blocks until every virtual frame's last submission completed.
    ///
    /// # Errors
    ///
    /// Returns a classified error if the wait fails.
    pub fn wait_all(&self, timeout: u64) -> RhiResult<()> {
        let fences: Vec<vk::Fence> = self
            .frames
            .iter()
            .map(|frame| frame.in_flight_fence_handle())
            .collect();
        wait_for_fences(&self.device, &fences, timeout)
    }

    /// Releases every primitive. Safe to call repeatedly.
    pub fn clear(&mut self) {
        if self.frames.is_empty() {
            return;
        }
        self.frames.clear();
        self.image_fences.clear();
        debug!("Synchronization set cleared");
    }

    /// Returns whether [`SyncSet::clear`] has released the primitives.
    #[inline]
    pub fn is_cleared(&self) -> bool {
        self.frames.is_empty()
    }
}

impl Drop for SyncSet {
    fn drop(&mut self) {
        self.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_virtual_frame_index_wraps() {
        let indices: Vec<usize> = (0..7).map(|n| virtual_frame_index(n, 3)).collect();
        assert_eq!(indices, vec![0, 1, 2, 0, 1, 2, 0]);
    }

    #[test]
    fn test_virtual_frame_index_single_frame() {
        assert_eq!(virtual_frame_index(0, 1), 0);
        assert_eq!(virtual_frame_index(41, 1), 0);
    }

    #[test]
    fn test_virtual_frame_index_large_counter() {
        assert_eq!(virtual_frame_index(u64::MAX, 3), (u64::MAX % 3) as usize);
        assert!(virtual_frame_index(u64::MAX, 2) < 2);
    }

    #[test]
    fn test_semaphore_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Semaphore>();
    }

    #[test]
    fn test_fence_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Fence>();
    }

    #[test]
    fn test_sync_set_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<SyncSet>();
    }
}
