//! Command pools and recording.
//!
//! Two kinds of pool exist: a resettable pool on the render queue holding one
//! primary buffer per swapchain image, and short-lived transient pools used
//! by [`OneShotCommands`] for the geometry upload.
//!
//! [`CommandBuffer`] exposes only the commands the forward renderer records,
//! phrased in its own terms (a full-extent viewport, a uniform set, a vertex
//! stream) rather than raw `vkCmd*` parameter lists.

use std::sync::Arc;

use ash::vk;
use tracing::{debug, error, warn};

use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::physical_device::QueueRole;
use crate::sync::Fence;

/// Command pool bound to the queue family of one [`QueueRole`].
///
/// Not thread-safe; every buffer is recorded on the render thread.
pub struct CommandPool {
    device: Arc<Device>,
    pool: vk::CommandPool,
    role: QueueRole,
}

impl CommandPool {
    /// Pool whose buffers are reset and re-recorded every frame.
    ///
    /// # Errors
    ///
    /// Returns the Vulkan error if creation fails.
    pub fn new(device: Arc<Device>, role: QueueRole) -> RhiResult<Self> {
        Self::create(device, role, vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER)
    }

    /// Pool for buffers recorded and submitted once.
    ///
    /// # Errors
    ///
    /// Returns the Vulkan error if creation fails.
    pub fn new_transient(device: Arc<Device>, role: QueueRole) -> RhiResult<Self> {
        Self::create(device, role, vk::CommandPoolCreateFlags::TRANSIENT)
    }

    fn create(device: Arc<Device>, role: QueueRole, flags: vk::CommandPoolCreateFlags) -> RhiResult<Self> {
        let family = device.queue_family(role);
        let pool = unsafe {
            device.handle().create_command_pool(
                &vk::CommandPoolCreateInfo::default()
                    .queue_family_index(family)
                    .flags(flags),
                None,
            )?
        };
        debug!("{} command pool on family {} ({:?})", role.name(), family, flags);

        Ok(Self { device, pool, role })
    }

    #[inline]
    pub fn handle(&self) -> vk::CommandPool {
        self.pool
    }

    #[inline]
    pub fn role(&self) -> QueueRole {
        self.role
    }

    /// Allocates `count` primary buffers.
    ///
    /// # Errors
    ///
    /// [`RhiError::InvalidHandle`] after [`CommandPool::clear`], otherwise
    /// the Vulkan error if allocation fails.
    pub fn allocate(&self, count: u32) -> RhiResult<Vec<CommandBuffer>> {
        if self.pool == vk::CommandPool::null() {
            return Err(RhiError::InvalidHandle("command pool has been cleared".to_string()));
        }

        let handles = unsafe {
            self.device.handle().allocate_command_buffers(
                &vk::CommandBufferAllocateInfo::default()
                    .command_pool(self.pool)
                    .level(vk::CommandBufferLevel::PRIMARY)
                    .command_buffer_count(count),
            )?
        };

        Ok(handles
            .into_iter()
            .map(|buffer| CommandBuffer {
                device: self.device.clone(),
                buffer,
            })
            .collect())
    }

    /// Returns buffers to the pool. The buffers must not be pending.
    pub fn free(&self, buffers: &[CommandBuffer]) {
        if buffers.is_empty() || self.pool == vk::CommandPool::null() {
            return;
        }
        let handles: Vec<_> = buffers.iter().map(CommandBuffer::handle).collect();
        unsafe {
            self.device.handle().free_command_buffers(self.pool, &handles);
        }
    }

    /// Destroys the pool, implicitly freeing its buffers. Safe to call
    /// repeatedly.
    pub fn clear(&mut self) {
        if self.pool != vk::CommandPool::null() {
            unsafe {
                self.device.handle().destroy_command_pool(self.pool, None);
            }
            self.pool = vk::CommandPool::null();
        }
    }
}

impl Drop for CommandPool {
    fn drop(&mut self) {
        self.clear();
    }
}

/// A primary command buffer. The handle belongs to its [`CommandPool`].
pub struct CommandBuffer {
    device: Arc<Device>,
    buffer: vk::CommandBuffer,
}

impl CommandBuffer {
    #[inline]
    pub fn handle(&self) -> vk::CommandBuffer {
        self.buffer
    }

    fn raw(&self) -> &ash::Device {
        self.device.handle()
    }

    /// Resets the buffer and begins a single-submission recording.
    ///
    /// # Errors
    ///
    /// Returns the Vulkan error if the reset or begin fails.
    pub fn restart(&self) -> RhiResult<()> {
        unsafe {
            self.raw()
                .reset_command_buffer(self.buffer, vk::CommandBufferResetFlags::empty())?;
        }
        self.begin()
    }

    /// Begins a single-submission recording.
    ///
    /// # Errors
    ///
    /// Returns the Vulkan error, e.g. when already recording.
    pub fn begin(&self) -> RhiResult<()> {
        let info = vk::CommandBufferBeginInfo::default()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        unsafe { self.raw().begin_command_buffer(self.buffer, &info)? };
        Ok(())
    }

    /// # Errors
    ///
    /// Returns the Vulkan error, e.g. when not recording.
    pub fn end(&self) -> RhiResult<()> {
        unsafe { self.raw().end_command_buffer(self.buffer)? };
        Ok(())
    }

    /// Begins `render_pass` over the whole of `extent`, with inline contents.
    pub fn begin_render_pass(
        &self,
        render_pass: vk::RenderPass,
        framebuffer: vk::Framebuffer,
        extent: vk::Extent2D,
        clear_values: &[vk::ClearValue],
    ) {
        let info = vk::RenderPassBeginInfo::default()
            .render_pass(render_pass)
            .framebuffer(framebuffer)
            .render_area(full_rect(extent))
            .clear_values(clear_values);
        unsafe {
            self.raw()
                .cmd_begin_render_pass(self.buffer, &info, vk::SubpassContents::INLINE);
        }
    }

    pub fn end_render_pass(&self) {
        unsafe { self.raw().cmd_end_render_pass(self.buffer) };
    }

    pub fn bind_graphics_pipeline(&self, pipeline: vk::Pipeline) {
        unsafe {
            self.raw()
                .cmd_bind_pipeline(self.buffer, vk::PipelineBindPoint::GRAPHICS, pipeline);
        }
    }

    /// Sets viewport and scissor to cover `extent`, depth range `0..1`.
    pub fn set_full_viewport(&self, extent: vk::Extent2D) {
        let viewport = vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: extent.width as f32,
            height: extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        };
        unsafe {
            self.raw().cmd_set_viewport(self.buffer, 0, &[viewport]);
            self.raw().cmd_set_scissor(self.buffer, 0, &[full_rect(extent)]);
        }
    }

    /// Binds `set` as set 0 of a graphics pipeline layout.
    pub fn bind_uniform_set(&self, layout: vk::PipelineLayout, set: vk::DescriptorSet) {
        unsafe {
            self.raw().cmd_bind_descriptor_sets(
                self.buffer,
                vk::PipelineBindPoint::GRAPHICS,
                layout,
                0,
                &[set],
                &[],
            );
        }
    }

    /// Binds `buffer` from `offset` as vertex stream `binding`.
    pub fn bind_vertex_stream(&self, binding: u32, buffer: vk::Buffer, offset: vk::DeviceSize) {
        unsafe {
            self.raw()
                .cmd_bind_vertex_buffers(self.buffer, binding, &[buffer], &[offset]);
        }
    }

    /// Binds 32-bit indices starting at `offset`.
    pub fn bind_u32_indices(&self, buffer: vk::Buffer, offset: vk::DeviceSize) {
        unsafe {
            self.raw()
                .cmd_bind_index_buffer(self.buffer, buffer, offset, vk::IndexType::UINT32);
        }
    }

    pub fn draw_indexed(
        &self,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    ) {
        unsafe {
            self.raw().cmd_draw_indexed(
                self.buffer,
                index_count,
                instance_count,
                first_index,
                vertex_offset,
                first_instance,
            );
        }
    }

    pub fn image_barrier(
        &self,
        src_stage: vk::PipelineStageFlags,
        dst_stage: vk::PipelineStageFlags,
        barrier: vk::ImageMemoryBarrier,
    ) {
        unsafe {
            self.raw().cmd_pipeline_barrier(
                self.buffer,
                src_stage,
                dst_stage,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                &[barrier],
            );
        }
    }

    pub fn buffer_barrier(
        &self,
        src_stage: vk::PipelineStageFlags,
        dst_stage: vk::PipelineStageFlags,
        barrier: vk::BufferMemoryBarrier,
    ) {
        unsafe {
            self.raw().cmd_pipeline_barrier(
                self.buffer,
                src_stage,
                dst_stage,
                vk::DependencyFlags::empty(),
                &[],
                &[barrier],
                &[],
            );
        }
    }

    /// Copies the first `size` bytes of `src` to the start of `dst`.
    pub fn copy_buffer(&self, src: vk::Buffer, dst: vk::Buffer, size: vk::DeviceSize) {
        let region = vk::BufferCopy::default().size(size);
        unsafe {
            self.raw().cmd_copy_buffer(self.buffer, src, dst, &[region]);
        }
    }
}

fn full_rect(extent: vk::Extent2D) -> vk::Rect2D {
    vk::Rect2D {
        offset: vk::Offset2D::default(),
        extent,
    }
}

/// A command buffer recorded once, submitted, and waited on.
///
/// The buffer goes back to its pool on drop. If it was never waited on, the
/// device is drained first since the submission may still be executing.
pub struct OneShotCommands<'pool> {
    pool: &'pool CommandPool,
    commands: CommandBuffer,
    completed: bool,
}

impl<'pool> OneShotCommands<'pool> {
    /// Allocates from `pool` and begins recording.
    ///
    /// # Errors
    ///
    /// Returns an error if allocation or begin fails.
    pub fn begin(pool: &'pool CommandPool) -> RhiResult<Self> {
        let commands = pool
            .allocate(1)?
            .pop()
            .ok_or_else(|| RhiError::InvalidHandle("command pool returned no buffer".to_string()))?;
        commands.begin()?;

        Ok(Self {
            pool,
            commands,
            completed: false,
        })
    }

    #[inline]
    pub fn commands(&self) -> &CommandBuffer {
        &self.commands
    }

    /// Ends recording, submits to the pool's queue and blocks until done.
    ///
    /// # Errors
    ///
    /// Returns an error if ending, submission or the fence wait fails.
    pub fn submit_and_wait(mut self, timeout: u64) -> RhiResult<()> {
        self.commands.end()?;

        let device = self.commands.device.clone();
        let fence = Fence::new(device.clone(), false)?;
        let buffers = [self.commands.handle()];
        let submit = vk::SubmitInfo::default().command_buffers(&buffers);

        unsafe { device.submit(self.pool.role(), &[submit], fence.handle())? };
        // The fence and the buffer must outlive the submission even when the
        // wait fails
        drain_on_failure(fence.wait(timeout), || device.wait_idle())?;
        self.completed = true;
        Ok(())
    }
}

/// Passes `waited` through, running `drain` first if it failed.
///
/// A failed drain is logged; the wait error is the one reported.
fn drain_on_failure<F>(waited: RhiResult<()>, drain: F) -> RhiResult<()>
where
    F: FnOnce() -> RhiResult<()>,
{
    if let Err(e) = &waited {
        warn!("One-shot submission wait failed ({}), draining the device", e);
        if let Err(drain_error) = drain() {
            error!("Device drain after a failed wait also failed: {}", drain_error);
        }
    }
    waited
}

impl Drop for OneShotCommands<'_> {
    fn drop(&mut self) {
        if !self.completed
            && let Err(e) = self.commands.device.wait_idle()
        {
            error!("Device wait before freeing a one-shot buffer failed: {}", e);
        }
        self.pool.free(std::slice::from_ref(&self.commands));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_rect_starts_at_origin() {
        let rect = full_rect(vk::Extent2D {
            width: 800,
            height: 600,
        });
        assert_eq!(rect.offset.x, 0);
        assert_eq!(rect.offset.y, 0);
        assert_eq!(rect.extent.width, 800);
        assert_eq!(rect.extent.height, 600);
    }

    #[test]
    fn test_failed_wait_drains_before_returning() {
        let mut drained = 0;
        let result = drain_on_failure(Err(RhiError::VulkanError(vk::Result::TIMEOUT)), || {
            drained += 1;
            Ok(())
        });
        assert!(matches!(result, Err(RhiError::VulkanError(vk::Result::TIMEOUT))));
        assert_eq!(drained, 1);
    }

    #[test]
    fn test_failed_drain_keeps_wait_error() {
        let result = drain_on_failure(Err(RhiError::DeviceLost), || Err(RhiError::DeviceLost));
        assert!(matches!(result, Err(RhiError::DeviceLost)));
    }

    #[test]
    fn test_successful_wait_skips_drain() {
        let mut drained = false;
        let result = drain_on_failure(Ok(()), || {
            drained = true;
            Ok(())
        });
        assert!(result.is_ok());
        assert!(!drained);
    }

    #[test]
    fn test_recording_types_are_send() {
        fn assert_send<T: Send>() {}
        assert_send::<CommandBuffer>();
        assert_send::<CommandPool>();
    }
}
