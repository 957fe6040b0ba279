//! Frame orchestration.
//!
//! The [`FrameOrchestrator`] drives one frame through
//!
//! ```text
//! Idle -> Acquiring -> Recording -> Submitted -> Presenting -> Idle
//! ```
//!
//! Virtual frames (`frame_count % frames_in_flight`) own the fence and
//! semaphores; command buffers are indexed by the acquired swapchain image.
//! The two rings have different sizes, so an image is claimed through the
//! sync set before its command buffer is re-recorded.
//!
//! # Synchronization Flow
//!
//! ```text
//! 1. Wait on the virtual frame's fence (CPU back-pressure)
//! 2. Acquire a swapchain image (signals image_available)
//! 3. Reset the fence, record the image's command buffer
//! 4. Submit: wait image_available, signal frame_complete + fence
//! 5. Present: wait frame_complete
//! ```
//!
//! The fence is reset only after a successful acquire, so an out-of-date
//! swapchain leaves it signaled and the next attempt does not deadlock.

use std::fmt;
use std::sync::Arc;

use ash::vk;
use tracing::{debug, info, warn};

use forward_rhi::command::{CommandBuffer, CommandPool};
use forward_rhi::device::Device;
use forward_rhi::physical_device::QueueRole;
use forward_rhi::swapchain::Swapchain;
use forward_rhi::sync::SyncSet;
use forward_rhi::vertex::{INSTANCE_BINDING, VERTEX_BINDING};
use forward_rhi::{RhiError, RhiResult};

use crate::batch::DrawBatch;
use crate::forward_pass::ForwardPass;
use crate::geometry::StaticGeometryStore;
use crate::uniforms::DynamicBufferSet;

/// Where the orchestrator is within a frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameState {
    Idle,
    Acquiring,
    Recording,
    Submitted,
    Presenting,
}

impl FrameState {
    /// Whether `self -> next` is a legal transition.
    ///
    /// Acquiring may fall back to Idle when the swapchain is out of date.
    pub fn can_transition_to(self, next: FrameState) -> bool {
        matches!(
            (self, next),
            (FrameState::Idle, FrameState::Acquiring)
                | (FrameState::Acquiring, FrameState::Recording)
                | (FrameState::Acquiring, FrameState::Idle)
                | (FrameState::Recording, FrameState::Submitted)
                | (FrameState::Submitted, FrameState::Presenting)
                | (FrameState::Presenting, FrameState::Idle)
        )
    }
}

impl fmt::Display for FrameState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FrameState::Idle => "idle",
            FrameState::Acquiring => "acquiring",
            FrameState::Recording => "recording",
            FrameState::Submitted => "submitted",
            FrameState::Presenting => "presenting",
        };
        f.write_str(name)
    }
}

/// Outcome of one frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameStatus {
    /// The image was presented and the swapchain matches the surface.
    Presented,
    /// The image was presented but the swapchain should be recreated.
    Suboptimal,
    /// Nothing or a stale image was presented; the swapchain must be recreated.
    OutOfDate,
}

impl FrameStatus {
    /// Whether the caller should recreate the swapchain.
    #[inline]
    pub fn needs_recreate(self) -> bool {
        !matches!(self, FrameStatus::Presented)
    }
}

/// Image and virtual frame in use by the frame being built.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AcquiredImage {
    pub image_index: u32,
    pub frame_index: usize,
    pub suboptimal: bool,
}

/// Everything a frame's command buffer reads.
pub struct FrameInputs<'a> {
    pub swapchain: &'a Swapchain,
    pub pass: &'a ForwardPass,
    pub geometry: &'a StaticGeometryStore,
    pub dynamic: &'a DynamicBufferSet,
    pub batches: &'a [DrawBatch],
    pub clear_color: [f32; 4],
}

/// Barrier taking a swapchain image from presentation to color output.
pub fn acquire_barrier(image: vk::Image) -> vk::ImageMemoryBarrier<'static> {
    color_barrier(image)
        .old_layout(vk::ImageLayout::UNDEFINED)
        .new_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
        .src_access_mask(vk::AccessFlags::empty())
        .dst_access_mask(vk::AccessFlags::COLOR_ATTACHMENT_WRITE)
}

/// Barrier handing a rendered swapchain image to presentation.
pub fn present_barrier(image: vk::Image) -> vk::ImageMemoryBarrier<'static> {
    color_barrier(image)
        .old_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
        .new_layout(vk::ImageLayout::PRESENT_SRC_KHR)
        .src_access_mask(vk::AccessFlags::COLOR_ATTACHMENT_WRITE)
        .dst_access_mask(vk::AccessFlags::empty())
}

fn color_barrier(image: vk::Image) -> vk::ImageMemoryBarrier<'static> {
    vk::ImageMemoryBarrier::default()
        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .image(image)
        .subresource_range(
            vk::ImageSubresourceRange::default()
                .aspect_mask(vk::ImageAspectFlags::COLOR)
                .base_mip_level(0)
                .level_count(1)
                .base_array_layer(0)
                .layer_count(1),
        )
}

/// Clear values of the forward pass, color then depth.
pub fn clear_values(color: [f32; 4]) -> [vk::ClearValue; 2] {
    [
        vk::ClearValue {
            color: vk::ClearColorValue { float32: color },
        },
        vk::ClearValue {
            depth_stencil: vk::ClearDepthStencilValue {
                depth: 1.0,
                stencil: 0,
            },
        },
    ]
}

/// Where frames are acquired from and presented to.
///
/// Implemented by [`Swapchain`]. Acquire signals `semaphore` once the image
/// is ready; present waits on `wait_semaphore`. Both report suboptimal
/// results as `true` and an out-of-date target as
/// [`RhiError::SwapchainOutOfDate`].
pub trait PresentTarget {
    fn acquire_next_image(&self, semaphore: vk::Semaphore, timeout: u64) -> RhiResult<(u32, bool)>;

    fn present(&self, queue: vk::Queue, image_index: u32, wait_semaphore: vk::Semaphore) -> RhiResult<bool>;
}

impl PresentTarget for Swapchain {
    fn acquire_next_image(&self, semaphore: vk::Semaphore, timeout: u64) -> RhiResult<(u32, bool)> {
        Swapchain::acquire_next_image(self, semaphore, timeout)
    }

    fn present(&self, queue: vk::Queue, image_index: u32, wait_semaphore: vk::Semaphore) -> RhiResult<bool> {
        Swapchain::present(self, queue, image_index, wait_semaphore)
    }
}

/// Drives the per-frame acquire, record, submit and present sequence.
///
/// # Thread Safety
///
/// The orchestrator is driven by a single thread. It is `Send` so the render
/// loop can live on a thread of its own.
pub struct FrameOrchestrator {
    device: Arc<Device>,
    sync: SyncSet,
    command_pool: CommandPool,
    /// One primary command buffer per swapchain image.
    command_buffers: Vec<CommandBuffer>,
    frame_count: u64,
    state: FrameState,
    acquire_timeout: u64,
}

impl FrameOrchestrator {
    /// Creates synchronization for `frames_in_flight` virtual frames and one
    /// command buffer per swapchain image.
    ///
    /// # Errors
    ///
    /// Returns an error if any synchronization object, the render command
    /// pool or its buffers cannot be created.
    pub fn new(
        device: Arc<Device>,
        image_count: usize,
        frames_in_flight: usize,
        acquire_timeout: u64,
    ) -> RhiResult<Self> {
        let mut sync = SyncSet::new(device.clone(), frames_in_flight)?;
        sync.reset_images(image_count);

        let command_pool = CommandPool::new(device.clone(), QueueRole::Render)?;
        let command_buffers = command_pool.allocate(image_count as u32)?;

        info!(
            "Frame orchestrator created: {} virtual frame(s), {} image(s)",
            frames_in_flight, image_count
        );

        Ok(Self {
            device,
            sync,
            command_pool,
            command_buffers,
            frame_count: 0,
            state: FrameState::Idle,
            acquire_timeout,
        })
    }

    #[inline]
    pub fn state(&self) -> FrameState {
        self.state
    }

    /// Number of frames presented so far.
    #[inline]
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Virtual frame the next frame will use.
    #[inline]
    pub fn virtual_frame(&self) -> usize {
        self.sync.advance(self.frame_count)
    }

    #[inline]
    pub fn frames_in_flight(&self) -> usize {
        self.sync.frames_in_flight()
    }

    fn transition(&mut self, next: FrameState) -> RhiResult<()> {
        if !self.state.can_transition_to(next) {
            return Err(RhiError::InvalidHandle(format!(
                "invalid frame transition {} -> {}",
                self.state, next
            )));
        }
        self.state = next;
        Ok(())
    }

    /// Blocks until the next virtual frame's previous submission completed.
    ///
    /// After this returns, its region of the dynamic buffer may be written.
    /// The fence stays signaled.
    ///
    /// # Errors
    ///
    /// Returns an error if called mid-frame or the wait fails.
    pub fn wait_for_frame(&self) -> RhiResult<usize> {
        if self.state != FrameState::Idle {
            return Err(RhiError::InvalidHandle(format!(
                "cannot wait for a frame while {}",
                self.state
            )));
        }
        let frame_index = self.virtual_frame();
        self.sync
            .frame(frame_index)
            .in_flight_fence()
            .wait(u64::MAX)?;
        Ok(frame_index)
    }

    /// Acquires the next swapchain image.
    ///
    /// Returns `None` when the swapchain is out of date; the orchestrator is
    /// back in [`FrameState::Idle`] and the frame counter is unchanged.
    ///
    /// # Errors
    ///
    /// Lost surface or device, a timeout and any other failure are returned
    /// as errors.
    pub fn acquire<T: PresentTarget + ?Sized>(&mut self, target: &T) -> RhiResult<Option<AcquiredImage>> {
        self.transition(FrameState::Acquiring)?;
        let frame_index = self.virtual_frame();
        let frame = self.sync.frame(frame_index);

        frame.in_flight_fence().wait(u64::MAX)?;

        let (image_index, suboptimal) = match target
            .acquire_next_image(frame.image_available_handle(), self.acquire_timeout)
        {
            Ok(acquired) => acquired,
            Err(RhiError::SwapchainOutOfDate) => {
                debug!("Swapchain out of date during acquire");
                self.transition(FrameState::Idle)?;
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        // Work will be submitted, so the fence may be reset now
        frame.in_flight_fence().reset()?;
        self.sync
            .claim_image(image_index as usize, frame_index, u64::MAX)?;

        if suboptimal {
            debug!("Acquired image {} from a suboptimal swapchain", image_index);
        }

        self.transition(FrameState::Recording)?;
        Ok(Some(AcquiredImage {
            image_index,
            frame_index,
            suboptimal,
        }))
    }

    /// Records the forward pass into the acquired image's command buffer.
    ///
    /// # Errors
    ///
    /// Returns an error if not recording, if the image has no command
    /// buffer or framebuffer, or if beginning or ending the buffer fails.
    pub fn record(&self, acquired: &AcquiredImage, inputs: &FrameInputs<'_>) -> RhiResult<()> {
        let image_index = acquired.image_index as usize;
        let framebuffer = inputs.pass.framebuffer(image_index).ok_or_else(|| {
            RhiError::InvalidHandle(format!("no framebuffer for image {}", image_index))
        })?;
        let descriptor_set = inputs
            .dynamic
            .descriptor_set(acquired.frame_index)
            .ok_or_else(|| {
                RhiError::InvalidHandle(format!(
                    "no descriptor set for virtual frame {}",
                    acquired.frame_index
                ))
            })?;

        self.record_with(acquired, |cmd| {
            encode_forward_pass(cmd, acquired, inputs, framebuffer, descriptor_set);
            Ok(())
        })
    }

    /// Restarts the acquired image's command buffer, lets `encode` fill it
    /// and ends it.
    ///
    /// # Errors
    ///
    /// Returns an error if not recording, if the image has no command
    /// buffer, or if `encode`, beginning or ending fails.
    pub fn record_with<F>(&self, acquired: &AcquiredImage, encode: F) -> RhiResult<()>
    where
        F: FnOnce(&CommandBuffer) -> RhiResult<()>,
    {
        if self.state != FrameState::Recording {
            return Err(RhiError::InvalidHandle(format!(
                "cannot record while {}",
                self.state
            )));
        }

        let image_index = acquired.image_index as usize;
        let cmd = self.command_buffers.get(image_index).ok_or_else(|| {
            RhiError::InvalidHandle(format!("no command buffer for image {}", image_index))
        })?;

        cmd.restart()?;
        encode(cmd)?;
        cmd.end()
    }

    /// Submits the recorded command buffer to the render queue.
    ///
    /// # Errors
    ///
    /// Returns an error if not recording or the submission fails.
    pub fn submit(&mut self, acquired: &AcquiredImage) -> RhiResult<()> {
        self.transition(FrameState::Submitted)?;

        let frame = self.sync.frame(acquired.frame_index);
        let cmd = self
            .command_buffers
            .get(acquired.image_index as usize)
            .ok_or_else(|| {
                RhiError::InvalidHandle(format!(
                    "no command buffer for image {}",
                    acquired.image_index
                ))
            })?;

        let wait_semaphores = [frame.image_available_handle()];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let signal_semaphores = [frame.frame_complete_handle()];
        let command_buffers = [cmd.handle()];

        let submit_info = vk::SubmitInfo::default()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        unsafe {
            self.device.submit(
                QueueRole::Render,
                &[submit_info],
                frame.in_flight_fence_handle(),
            )
        }
    }

    /// Presents the acquired image and finishes the frame.
    ///
    /// # Errors
    ///
    /// Returns an error if not submitted or presentation fails for any
    /// reason other than an out-of-date or suboptimal swapchain.
    pub fn present<T: PresentTarget + ?Sized>(
        &mut self,
        target: &T,
        acquired: &AcquiredImage,
    ) -> RhiResult<FrameStatus> {
        self.transition(FrameState::Presenting)?;

        let wait = self.sync.frame(acquired.frame_index).frame_complete_handle();
        let queue = self.device.queue(QueueRole::Present).handle;

        let status = match target.present(queue, acquired.image_index, wait) {
            Ok(false) if !acquired.suboptimal => FrameStatus::Presented,
            Ok(_) => {
                debug!("Present reported a suboptimal swapchain");
                FrameStatus::Suboptimal
            }
            Err(RhiError::SwapchainOutOfDate) => {
                debug!("Swapchain out of date during present");
                FrameStatus::OutOfDate
            }
            Err(e) => return Err(e),
        };

        self.frame_count += 1;
        self.transition(FrameState::Idle)?;
        Ok(status)
    }

    /// Runs one whole frame.
    ///
    /// # Errors
    ///
    /// Returns the first failing step's error. Such errors are fatal for
    /// the orchestrator.
    pub fn run_frame(&mut self, inputs: &FrameInputs<'_>) -> RhiResult<FrameStatus> {
        let Some(acquired) = self.acquire(inputs.swapchain)? else {
            return Ok(FrameStatus::OutOfDate);
        };
        self.record(&acquired, inputs)?;
        self.submit(&acquired)?;
        self.present(inputs.swapchain, &acquired)
    }

    /// Blocks until every virtual frame's last submission completed.
    ///
    /// # Errors
    ///
    /// Returns an error if the wait fails.
    pub fn wait_all(&self) -> RhiResult<()> {
        self.sync.wait_all(u64::MAX)
    }

    /// Adapts to a recreated swapchain with `image_count` images.
    ///
    /// The caller must have called [`FrameOrchestrator::wait_all`].
    ///
    /// # Errors
    ///
    /// Returns an error if mid-frame or command buffer allocation fails.
    pub fn resize(&mut self, image_count: usize) -> RhiResult<()> {
        if self.state != FrameState::Idle {
            return Err(RhiError::InvalidHandle(format!(
                "cannot resize while {}",
                self.state
            )));
        }

        if image_count != self.command_buffers.len() {
            self.command_pool.free(&self.command_buffers);
            self.command_buffers = self.command_pool.allocate(image_count as u32)?;
            debug!("Reallocated {} command buffer(s)", image_count);
        }
        self.sync.reset_images(image_count);
        Ok(())
    }

    /// Releases command buffers and synchronization. Safe to call repeatedly.
    ///
    /// The caller must have waited for device idle.
    pub fn clear(&mut self) {
        if self.sync.is_cleared() {
            return;
        }
        if self.state != FrameState::Idle {
            warn!("Frame orchestrator cleared while {}", self.state);
            self.state = FrameState::Idle;
        }
        self.command_pool.free(&self.command_buffers);
        self.command_buffers.clear();
        self.command_pool.clear();
        self.sync.clear();
        debug!("Frame orchestrator cleared after {} frame(s)", self.frame_count);
    }
}

impl Drop for FrameOrchestrator {
    fn drop(&mut self) {
        self.clear();
    }
}

/// Barriers, render pass and draws of one forward frame.
fn encode_forward_pass(
    cmd: &CommandBuffer,
    acquired: &AcquiredImage,
    inputs: &FrameInputs<'_>,
    framebuffer: vk::Framebuffer,
    descriptor_set: vk::DescriptorSet,
) {
    let extent = inputs.pass.extent();
    let color_image = inputs.swapchain.image(acquired.image_index as usize);

    cmd.image_barrier(
        vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
        vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
        acquire_barrier(color_image),
    );

    cmd.begin_render_pass(
        inputs.pass.render_pass(),
        framebuffer,
        extent,
        &clear_values(inputs.clear_color),
    );
    cmd.bind_graphics_pipeline(inputs.pass.pipeline());
    cmd.set_full_viewport(extent);
    cmd.bind_uniform_set(inputs.pass.pipeline_layout(), descriptor_set);

    if let Some(geometry) = inputs.geometry.buffer()
        && !inputs.batches.is_empty()
    {
        cmd.bind_vertex_stream(VERTEX_BINDING, geometry.handle(), 0);
        cmd.bind_vertex_stream(
            INSTANCE_BINDING,
            inputs.dynamic.buffer().handle(),
            inputs.dynamic.instance_offset(acquired.frame_index),
        );
        cmd.bind_u32_indices(geometry.handle(), inputs.geometry.index_offset());

        for batch in inputs.batches {
            cmd.draw_indexed(
                batch.mesh.index_count,
                batch.instance_count,
                batch.mesh.first_index,
                batch.mesh.vertex_offset,
                batch.first_instance,
            );
        }
    }

    cmd.end_render_pass();

    cmd.image_barrier(
        vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
        vk::PipelineStageFlags::BOTTOM_OF_PIPE,
        present_barrier(color_image),
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [FrameState; 5] = [
        FrameState::Idle,
        FrameState::Acquiring,
        FrameState::Recording,
        FrameState::Submitted,
        FrameState::Presenting,
    ];

    #[test]
    fn test_frame_cycle_is_legal() {
        let cycle = [
            FrameState::Idle,
            FrameState::Acquiring,
            FrameState::Recording,
            FrameState::Submitted,
            FrameState::Presenting,
            FrameState::Idle,
        ];
        for pair in cycle.windows(2) {
            assert!(pair[0].can_transition_to(pair[1]), "{} -> {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn test_out_of_date_acquire_returns_to_idle() {
        assert!(FrameState::Acquiring.can_transition_to(FrameState::Idle));
    }

    #[test]
    fn test_steps_cannot_be_skipped() {
        assert!(!FrameState::Idle.can_transition_to(FrameState::Recording));
        assert!(!FrameState::Recording.can_transition_to(FrameState::Presenting));
        assert!(!FrameState::Submitted.can_transition_to(FrameState::Idle));
        assert!(!FrameState::Presenting.can_transition_to(FrameState::Acquiring));
    }

    #[test]
    fn test_no_self_transitions() {
        for state in ALL {
            assert!(!state.can_transition_to(state), "{}", state);
        }
    }

    #[test]
    fn test_every_state_has_exactly_one_forward_step() {
        for state in ALL {
            let forward = ALL
                .iter()
                .filter(|&&next| next != FrameState::Idle && state.can_transition_to(next))
                .count();
            let expected = if state == FrameState::Presenting { 0 } else { 1 };
            assert_eq!(forward, expected, "{}", state);
        }
    }

    #[test]
    fn test_frame_status_recreate_signal() {
        assert!(!FrameStatus::Presented.needs_recreate());
        assert!(FrameStatus::Suboptimal.needs_recreate());
        assert!(FrameStatus::OutOfDate.needs_recreate());
    }

    #[test]
    fn test_layout_barriers() {
        let image = vk::Image::null();
        let to_draw = acquire_barrier(image);
        assert_eq!(to_draw.old_layout, vk::ImageLayout::UNDEFINED);
        assert_eq!(to_draw.new_layout, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);

        let to_present = present_barrier(image);
        assert_eq!(to_present.old_layout, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);
        assert_eq!(to_present.new_layout, vk::ImageLayout::PRESENT_SRC_KHR);
        assert_eq!(
            to_present.subresource_range.aspect_mask,
            vk::ImageAspectFlags::COLOR
        );
    }

    #[test]
    fn test_clear_values() {
        let values = clear_values([0.1, 0.2, 0.3, 1.0]);
        unsafe {
            assert_eq!(values[0].color.float32, [0.1, 0.2, 0.3, 1.0]);
            assert_eq!(values[1].depth_stencil.depth, 1.0);
        }
    }

    #[test]
    fn test_orchestrator_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<FrameOrchestrator>();
    }
}
