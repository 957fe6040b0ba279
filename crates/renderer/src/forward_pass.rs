//! The forward render pass, its pipeline and per-image framebuffers.
//!
//! The render pass and pipeline depend only on the swapchain format and
//! survive a resize. The depth target and framebuffers follow the swapchain
//! extent and are rebuilt by [`ForwardPass::recreate`].

use std::path::Path;
use std::sync::Arc;

use ash::vk;
use tracing::{debug, info};

use forward_core::ShaderPaths;
use forward_rhi::RhiResult;
use forward_rhi::device::Device;
use forward_rhi::pipeline::{DepthState, GraphicsPipelineBuilder, Pipeline, PipelineLayout};
use forward_rhi::render_pass::{Framebuffers, RenderPass};
use forward_rhi::shader::{Shader, ShaderStage};
use forward_rhi::vertex::{InstanceAttributes, Vertex};

use crate::depth_buffer::DepthBuffer;

/// Shader entry point of both stages.
const ENTRY_POINT: &str = "main";

/// Render pass, pipeline, depth target and framebuffers of the forward pass.
///
/// # Resource Destruction
///
/// [`ForwardPass::clear`] releases, in order: framebuffers, depth target,
/// pipeline, pipeline layout, render pass.
pub struct ForwardPass {
    device: Arc<Device>,
    render_pass: RenderPass,
    pipeline_layout: PipelineLayout,
    pipeline: Pipeline,
    depth_buffer: DepthBuffer,
    framebuffers: Framebuffers,
}

impl ForwardPass {
    /// Builds the forward pass for the swapchain's current state.
    ///
    /// # Arguments
    ///
    /// * `color_format` - Swapchain image format
    /// * `extent` - Swapchain extent
    /// * `color_views` - One view per swapchain image
    /// * `descriptor_set_layout` - Layout of the per-frame uniform set
    /// * `shaders` - SPIR-V files of the vertex and fragment stages
    ///
    /// # Errors
    ///
    /// Shader load failures are fatal and returned as
    /// [`forward_rhi::RhiError::ShaderError`]. Any other creation failure is
    /// returned as well; objects created so far are released.
    pub fn new(
        device: Arc<Device>,
        color_format: vk::Format,
        extent: vk::Extent2D,
        color_views: &[vk::ImageView],
        descriptor_set_layout: vk::DescriptorSetLayout,
        shaders: &ShaderPaths,
    ) -> RhiResult<Self> {
        let render_pass = RenderPass::forward(device.clone(), color_format, device.depth_format())?;
        let pipeline_layout = PipelineLayout::new(device.clone(), &[descriptor_set_layout])?;
        let pipeline = create_pipeline(&device, &render_pass, &pipeline_layout, shaders)?;

        let depth_buffer = DepthBuffer::new(device.clone(), extent)?;
        let framebuffers = Framebuffers::new(
            device.clone(),
            &render_pass,
            color_views,
            depth_buffer.image_view(),
            extent,
        )?;

        info!(
            "Forward pass ready: {}x{}, {} framebuffer(s)",
            extent.width,
            extent.height,
            framebuffers.len()
        );

        Ok(Self {
            device,
            render_pass,
            pipeline_layout,
            pipeline,
            depth_buffer,
            framebuffers,
        })
    }

    /// Rebuilds the depth target and framebuffers for a new swapchain.
    ///
    /// The caller must have drained every in-flight frame.
    ///
    /// # Errors
    ///
    /// Returns an error if the depth target or a framebuffer cannot be
    /// created. The previous targets are already released at that point.
    pub fn recreate(&mut self, extent: vk::Extent2D, color_views: &[vk::ImageView]) -> RhiResult<()> {
        self.framebuffers.clear();
        self.depth_buffer.clear();

        self.depth_buffer = DepthBuffer::new(self.device.clone(), extent)?;
        self.framebuffers = Framebuffers::new(
            self.device.clone(),
            &self.render_pass,
            color_views,
            self.depth_buffer.image_view(),
            extent,
        )?;

        debug!(
            "Forward pass targets recreated at {}x{}",
            extent.width, extent.height
        );
        Ok(())
    }

    #[inline]
    pub fn render_pass(&self) -> vk::RenderPass {
        self.render_pass.handle()
    }

    /// Color format the render pass was built for.
    #[inline]
    pub fn color_format(&self) -> vk::Format {
        self.render_pass.color_format()
    }

    #[inline]
    pub fn pipeline(&self) -> vk::Pipeline {
        self.pipeline.handle()
    }

    #[inline]
    pub fn pipeline_layout(&self) -> vk::PipelineLayout {
        self.pipeline_layout.handle()
    }

    /// Framebuffer of swapchain image `image_index`.
    #[inline]
    pub fn framebuffer(&self, image_index: usize) -> Option<vk::Framebuffer> {
        self.framebuffers.get(image_index)
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.framebuffers.extent()
    }

    #[inline]
    pub fn depth_buffer(&self) -> &DepthBuffer {
        &self.depth_buffer
    }

    /// Releases every object of the pass. Safe to call repeatedly.
    pub fn clear(&mut self) {
        self.framebuffers.clear();
        self.depth_buffer.clear();
        self.pipeline.clear();
        self.pipeline_layout.clear();
        self.render_pass.clear();
    }
}

impl Drop for ForwardPass {
    fn drop(&mut self) {
        self.clear();
    }
}

fn create_pipeline(
    device: &Arc<Device>,
    render_pass: &RenderPass,
    layout: &PipelineLayout,
    shaders: &ShaderPaths,
) -> RhiResult<Pipeline> {
    let vertex_shader = load_stage(device, &shaders.vertex, ShaderStage::Vertex)?;
    let fragment_shader = load_stage(device, &shaders.fragment, ShaderStage::Fragment)?;

    let pipeline = GraphicsPipelineBuilder::new()
        .shaders(&vertex_shader, &fragment_shader)
        .vertex_stream(Vertex::binding_description(), &Vertex::attribute_descriptions())
        .vertex_stream(
            InstanceAttributes::binding_description(),
            &InstanceAttributes::attribute_descriptions(),
        )
        .cull(vk::CullModeFlags::BACK, vk::FrontFace::COUNTER_CLOCKWISE)
        .depth(DepthState::LESS)
        .render_pass(render_pass.handle(), 0)
        .build(device.clone(), layout)?;

    info!("Forward pipeline created");
    Ok(pipeline)
}

fn load_stage(device: &Arc<Device>, path: &Path, stage: ShaderStage) -> RhiResult<Shader> {
    Shader::from_spirv_file(device.clone(), path, stage, ENTRY_POINT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_pass_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<ForwardPass>();
    }
}
