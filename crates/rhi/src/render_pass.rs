//! Render pass and framebuffer objects.
//!
//! The forward pass has a single subpass writing one color attachment (the
//! swapchain image) and one depth attachment. The color attachment enters and
//! leaves the pass in `COLOR_ATTACHMENT_OPTIMAL`; transitions from and to
//! `PRESENT_SRC_KHR` are explicit barriers recorded around the pass.

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info};

use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// Attachment index of the color target.
pub const COLOR_ATTACHMENT: u32 = 0;
/// Attachment index of the depth target.
pub const DEPTH_ATTACHMENT: u32 = 1;

/// Builds the two attachment descriptions of the forward pass.
pub fn forward_attachments(
    color_format: vk::Format,
    depth_format: vk::Format,
) -> [vk::AttachmentDescription; 2] {
    let color = vk::AttachmentDescription::default()
        .format(color_format)
        .samples(vk::SampleCountFlags::TYPE_1)
        .load_op(vk::AttachmentLoadOp::CLEAR)
        .store_op(vk::AttachmentStoreOp::STORE)
        .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
        .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
        .initial_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
        .final_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);

    // Depth is cleared every frame and never read back
    let depth = vk::AttachmentDescription::default()
        .format(depth_format)
        .samples(vk::SampleCountFlags::TYPE_1)
        .load_op(vk::AttachmentLoadOp::CLEAR)
        .store_op(vk::AttachmentStoreOp::DONT_CARE)
        .stencil_load_op(vk::AttachmentLoadOp::CLEAR)
        .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
        .initial_layout(vk::ImageLayout::UNDEFINED)
        .final_layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL);

    [color, depth]
}

/// The external dependency ordering earlier attachment writes before the
/// subpass.
///
/// Every frame in flight clears the same depth image, so the previous
/// frame's late depth stores must complete before this frame's clear.
pub fn forward_dependency() -> vk::SubpassDependency {
    let dst_stages = vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
        | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS;
    vk::SubpassDependency::default()
        .src_subpass(vk::SUBPASS_EXTERNAL)
        .dst_subpass(0)
        .src_stage_mask(dst_stages | vk::PipelineStageFlags::LATE_FRAGMENT_TESTS)
        .src_access_mask(vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE)
        .dst_stage_mask(dst_stages)
        .dst_access_mask(
            vk::AccessFlags::COLOR_ATTACHMENT_WRITE
                | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
        )
}

/// Vulkan render pass wrapper.
pub struct RenderPass {
    device: Arc<Device>,
    render_pass: vk::RenderPass,
    color_format: vk::Format,
    depth_format: vk::Format,
}

impl RenderPass {
    /// Creates the forward render pass.
    ///
    /// # Errors
    ///
    /// Returns an error if render pass creation fails.
    pub fn forward(
        device: Arc<Device>,
        color_format: vk::Format,
        depth_format: vk::Format,
    ) -> RhiResult<Self> {
        let attachments = forward_attachments(color_format, depth_format);

        let color_refs = [vk::AttachmentReference::default()
            .attachment(COLOR_ATTACHMENT)
            .layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)];
        let depth_ref = vk::AttachmentReference::default()
            .attachment(DEPTH_ATTACHMENT)
            .layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL);

        let subpasses = [vk::SubpassDescription::default()
            .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
            .color_attachments(&color_refs)
            .depth_stencil_attachment(&depth_ref)];
        let dependencies = [forward_dependency()];

        let create_info = vk::RenderPassCreateInfo::default()
            .attachments(&attachments)
            .subpasses(&subpasses)
            .dependencies(&dependencies);

        let render_pass = unsafe { device.handle().create_render_pass(&create_info, None)? };

        info!(
            "Forward render pass created: color={:?}, depth={:?}",
            color_format, depth_format
        );

        Ok(Self {
            device,
            render_pass,
            color_format,
            depth_format,
        })
    }

    /// Returns the Vulkan render pass handle.
    #[inline]
    pub fn handle(&self) -> vk::RenderPass {
        self.render_pass
    }

    #[inline]
    pub fn color_format(&self) -> vk::Format {
        self.color_format
    }

    #[inline]
    pub fn depth_format(&self) -> vk::Format {
        self.depth_format
    }

    /// Destroys the render pass. Safe to call repeatedly.
    pub fn clear(&mut self) {
        if self.render_pass == vk::RenderPass::null() {
            return;
        }
        unsafe {
            self.device
                .handle()
                .destroy_render_pass(self.render_pass, None);
        }
        self.render_pass = vk::RenderPass::null();
        debug!("Render pass destroyed");
    }
}

impl Drop for RenderPass {
    fn drop(&mut self) {
        self.clear();
    }
}

/// One framebuffer per swapchain image, all sharing the depth view.
pub struct Framebuffers {
    device: Arc<Device>,
    framebuffers: Vec<vk::Framebuffer>,
    extent: vk::Extent2D,
}

impl Framebuffers {
    /// Creates a framebuffer for every color view.
    ///
    /// # Errors
    ///
    /// Returns an error if the render pass has been cleared or framebuffer
    /// creation fails. Framebuffers created before the failure are destroyed.
    pub fn new(
        device: Arc<Device>,
        render_pass: &RenderPass,
        color_views: &[vk::ImageView],
        depth_view: vk::ImageView,
        extent: vk::Extent2D,
    ) -> RhiResult<Self> {
        if render_pass.handle() == vk::RenderPass::null() {
            return Err(RhiError::InvalidHandle(
                "framebuffers need a live render pass".to_string(),
            ));
        }

        let mut this = Self {
            device,
            framebuffers: Vec::with_capacity(color_views.len()),
            extent,
        };

        for &view in color_views {
            let attachments = [view, depth_view];
            let create_info = vk::FramebufferCreateInfo::default()
                .render_pass(render_pass.handle())
                .attachments(&attachments)
                .width(extent.width)
                .height(extent.height)
                .layers(1);

            // Dropping `this` on error destroys the ones already created
            let framebuffer = unsafe { this.device.handle().create_framebuffer(&create_info, None)? };
            this.framebuffers.push(framebuffer);
        }

        debug!(
            "Created {} framebuffer(s) at {}x{}",
            this.framebuffers.len(),
            extent.width,
            extent.height
        );

        Ok(this)
    }

    /// Returns the framebuffer for a swapchain image.
    #[inline]
    pub fn get(&self, image_index: usize) -> Option<vk::Framebuffer> {
        self.framebuffers.get(image_index).copied()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.framebuffers.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.framebuffers.is_empty()
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    /// Destroys every framebuffer. Safe to call repeatedly.
    pub fn clear(&mut self) {
        if self.framebuffers.is_empty() {
            return;
        }
        for framebuffer in self.framebuffers.drain(..) {
            unsafe {
                self.device.handle().destroy_framebuffer(framebuffer, None);
            }
        }
        debug!("Framebuffers destroyed");
    }
}

impl Drop for Framebuffers {
    fn drop(&mut self) {
        self.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_color_attachment_is_cleared_and_stored() {
        let [color, _] = forward_attachments(vk::Format::B8G8R8A8_SRGB, vk::Format::D32_SFLOAT);
        assert_eq!(color.load_op, vk::AttachmentLoadOp::CLEAR);
        assert_eq!(color.store_op, vk::AttachmentStoreOp::STORE);
        assert_eq!(color.initial_layout, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);
        assert_eq!(color.final_layout, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);
    }

    #[test]
    fn test_depth_attachment_is_discarded() {
        let [_, depth] = forward_attachments(vk::Format::B8G8R8A8_SRGB, vk::Format::D32_SFLOAT);
        assert_eq!(depth.format, vk::Format::D32_SFLOAT);
        assert_eq!(depth.load_op, vk::AttachmentLoadOp::CLEAR);
        assert_eq!(depth.store_op, vk::AttachmentStoreOp::DONT_CARE);
        assert_eq!(depth.stencil_store_op, vk::AttachmentStoreOp::DONT_CARE);
    }

    #[test]
    fn test_dependency_orders_previous_depth_writes() {
        let dependency = forward_dependency();
        assert!(
            dependency
                .src_stage_mask
                .contains(vk::PipelineStageFlags::LATE_FRAGMENT_TESTS)
        );
        assert!(
            dependency
                .src_stage_mask
                .contains(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
        );
        assert_eq!(
            dependency.src_access_mask,
            vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE
        );
        assert!(
            dependency
                .dst_stage_mask
                .contains(vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS)
        );
    }

    #[test]
    fn test_dependency_is_external() {
        let dependency = forward_dependency();
        assert_eq!(dependency.src_subpass, vk::SUBPASS_EXTERNAL);
        assert_eq!(dependency.dst_subpass, 0);
        assert!(
            dependency
                .dst_access_mask
                .contains(vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE)
        );
    }
}
