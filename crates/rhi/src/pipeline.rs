//! Pipeline layouts and render-pass graphics pipelines.
//!
//! The forward renderer builds exactly one pipeline: triangle lists, filled,
//! opaque, with viewport and scissor left dynamic so a resize never rebuilds
//! it. [`GraphicsPipelineBuilder`] only exposes the state that pipeline
//! varies.

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info};

use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::shader::Shader;

/// Viewport and scissor are set while recording.
const DYNAMIC_STATES: [vk::DynamicState; 2] = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];

/// Owned pipeline layout.
pub struct PipelineLayout {
    device: Arc<Device>,
    layout: vk::PipelineLayout,
}

impl PipelineLayout {
    /// Creates a layout over `set_layouts`, with no push constants.
    ///
    /// # Errors
    ///
    /// Returns the Vulkan error if creation fails.
    pub fn new(device: Arc<Device>, set_layouts: &[vk::DescriptorSetLayout]) -> RhiResult<Self> {
        let layout = unsafe {
            device.handle().create_pipeline_layout(
                &vk::PipelineLayoutCreateInfo::default().set_layouts(set_layouts),
                None,
            )?
        };
        Ok(Self { device, layout })
    }

    #[inline]
    pub fn handle(&self) -> vk::PipelineLayout {
        self.layout
    }

    /// Destroys the layout. Safe to call repeatedly.
    pub fn clear(&mut self) {
        if self.layout != vk::PipelineLayout::null() {
            unsafe {
                self.device
                    .handle()
                    .destroy_pipeline_layout(self.layout, None);
            }
            self.layout = vk::PipelineLayout::null();
        }
    }
}

impl Drop for PipelineLayout {
    fn drop(&mut self) {
        self.clear();
    }
}

/// Owned graphics pipeline.
pub struct Pipeline {
    device: Arc<Device>,
    pipeline: vk::Pipeline,
}

impl Pipeline {
    #[inline]
    pub fn handle(&self) -> vk::Pipeline {
        self.pipeline
    }

    /// Destroys the pipeline. Safe to call repeatedly.
    pub fn clear(&mut self) {
        if self.pipeline != vk::Pipeline::null() {
            unsafe {
                self.device.handle().destroy_pipeline(self.pipeline, None);
            }
            self.pipeline = vk::Pipeline::null();
            debug!("Graphics pipeline destroyed");
        }
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        self.clear();
    }
}

/// Depth test configuration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DepthState {
    pub test: bool,
    pub write: bool,
    pub compare: vk::CompareOp,
}

impl DepthState {
    /// Nearer fragments win and are written.
    pub const LESS: Self = Self {
        test: true,
        write: true,
        compare: vk::CompareOp::LESS,
    };

    pub const DISABLED: Self = Self {
        test: false,
        write: false,
        compare: vk::CompareOp::ALWAYS,
    };

    fn create_info(&self) -> vk::PipelineDepthStencilStateCreateInfo<'static> {
        vk::PipelineDepthStencilStateCreateInfo::default()
            .depth_test_enable(self.test)
            .depth_write_enable(self.write)
            .depth_compare_op(self.compare)
    }
}

/// Builder for a graphics pipeline used inside a render pass.
///
/// Starts from back-face culling, counter-clockwise front faces and
/// [`DepthState::LESS`].
pub struct GraphicsPipelineBuilder<'a> {
    vertex_shader: Option<&'a Shader>,
    fragment_shader: Option<&'a Shader>,
    bindings: Vec<vk::VertexInputBindingDescription>,
    attributes: Vec<vk::VertexInputAttributeDescription>,
    cull_mode: vk::CullModeFlags,
    front_face: vk::FrontFace,
    depth: DepthState,
    render_pass: vk::RenderPass,
    subpass: u32,
}

impl Default for GraphicsPipelineBuilder<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a> GraphicsPipelineBuilder<'a> {
    pub fn new() -> Self {
        Self {
            vertex_shader: None,
            fragment_shader: None,
            bindings: Vec::new(),
            attributes: Vec::new(),
            cull_mode: vk::CullModeFlags::BACK,
            front_face: vk::FrontFace::COUNTER_CLOCKWISE,
            depth: DepthState::LESS,
            render_pass: vk::RenderPass::null(),
            subpass: 0,
        }
    }

    pub fn shaders(mut self, vertex: &'a Shader, fragment: &'a Shader) -> Self {
        self.vertex_shader = Some(vertex);
        self.fragment_shader = Some(fragment);
        self
    }

    /// Adds a vertex stream with its attributes.
    pub fn vertex_stream(
        mut self,
        binding: vk::VertexInputBindingDescription,
        attributes: &[vk::VertexInputAttributeDescription],
    ) -> Self {
        self.bindings.push(binding);
        self.attributes.extend_from_slice(attributes);
        self
    }

    pub fn cull(mut self, mode: vk::CullModeFlags, front_face: vk::FrontFace) -> Self {
        self.cull_mode = mode;
        self.front_face = front_face;
        self
    }

    pub fn depth(mut self, depth: DepthState) -> Self {
        self.depth = depth;
        self
    }

    pub fn render_pass(mut self, render_pass: vk::RenderPass, subpass: u32) -> Self {
        self.render_pass = render_pass;
        self.subpass = subpass;
        self
    }

    /// Attribute locations must be unique and every attribute must come
    /// from a declared stream.
    fn check_vertex_input(&self) -> RhiResult<()> {
        for (i, attribute) in self.attributes.iter().enumerate() {
            if !self.bindings.iter().any(|b| b.binding == attribute.binding) {
                return Err(RhiError::PipelineError(format!(
                    "location {} reads undeclared binding {}",
                    attribute.location, attribute.binding
                )));
            }
            if self.attributes[..i].iter().any(|a| a.location == attribute.location) {
                return Err(RhiError::PipelineError(format!(
                    "location {} is declared twice",
                    attribute.location
                )));
            }
        }
        Ok(())
    }

    /// Creates the pipeline.
    ///
    /// # Errors
    ///
    /// [`RhiError::PipelineError`] if a shader or the render pass is missing
    /// or the vertex input is inconsistent, otherwise the Vulkan error from
    /// pipeline creation.
    pub fn build(self, device: Arc<Device>, layout: &PipelineLayout) -> RhiResult<Pipeline> {
        let (Some(vertex), Some(fragment)) = (self.vertex_shader, self.fragment_shader) else {
            return Err(RhiError::PipelineError(
                "both vertex and fragment shaders are required".to_string(),
            ));
        };
        if self.render_pass == vk::RenderPass::null() {
            return Err(RhiError::PipelineError("no render pass".to_string()));
        }
        self.check_vertex_input()?;

        let stages = [vertex.stage_create_info(), fragment.stage_create_info()];
        let vertex_input = vk::PipelineVertexInputStateCreateInfo::default()
            .vertex_binding_descriptions(&self.bindings)
            .vertex_attribute_descriptions(&self.attributes);
        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::default()
            .topology(vk::PrimitiveTopology::TRIANGLE_LIST);
        let viewport = vk::PipelineViewportStateCreateInfo::default()
            .viewport_count(1)
            .scissor_count(1);
        let rasterization = vk::PipelineRasterizationStateCreateInfo::default()
            .polygon_mode(vk::PolygonMode::FILL)
            .line_width(1.0)
            .cull_mode(self.cull_mode)
            .front_face(self.front_face);
        let multisample = vk::PipelineMultisampleStateCreateInfo::default()
            .rasterization_samples(vk::SampleCountFlags::TYPE_1);
        let depth_stencil = self.depth.create_info();
        let blend_attachments = [vk::PipelineColorBlendAttachmentState::default()
            .color_write_mask(vk::ColorComponentFlags::RGBA)];
        let color_blend =
            vk::PipelineColorBlendStateCreateInfo::default().attachments(&blend_attachments);
        let dynamic = vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&DYNAMIC_STATES);

        let create_info = vk::GraphicsPipelineCreateInfo::default()
            .stages(&stages)
            .vertex_input_state(&vertex_input)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport)
            .rasterization_state(&rasterization)
            .multisample_state(&multisample)
            .depth_stencil_state(&depth_stencil)
            .color_blend_state(&color_blend)
            .dynamic_state(&dynamic)
            .layout(layout.handle())
            .render_pass(self.render_pass)
            .subpass(self.subpass);

        let pipeline = unsafe {
            device
                .handle()
                .create_graphics_pipelines(vk::PipelineCache::null(), &[create_info], None)
                .map_err(|(_, result)| RhiError::from_vk(result))?
        }
        .pop()
        .ok_or_else(|| RhiError::PipelineError("driver returned no pipeline".to_string()))?;

        info!(
            "Graphics pipeline created: {} stream(s), {} attribute(s)",
            self.bindings.len(),
            self.attributes.len()
        );

        Ok(Pipeline { device, pipeline })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vertex::{InstanceAttributes, Vertex};

    fn two_streams() -> GraphicsPipelineBuilder<'static> {
        GraphicsPipelineBuilder::new()
            .vertex_stream(Vertex::binding_description(), &Vertex::attribute_descriptions())
            .vertex_stream(
                InstanceAttributes::binding_description(),
                &InstanceAttributes::attribute_descriptions(),
            )
    }

    #[test]
    fn test_defaults() {
        let builder = GraphicsPipelineBuilder::new();
        assert_eq!(builder.cull_mode, vk::CullModeFlags::BACK);
        assert_eq!(builder.front_face, vk::FrontFace::COUNTER_CLOCKWISE);
        assert_eq!(builder.depth, DepthState::LESS);
    }

    #[test]
    fn test_depth_state_info() {
        let info = DepthState::LESS.create_info();
        assert_eq!(info.depth_test_enable, vk::TRUE);
        assert_eq!(info.depth_compare_op, vk::CompareOp::LESS);
        assert_eq!(DepthState::DISABLED.create_info().depth_write_enable, vk::FALSE);
    }

    #[test]
    fn test_vertex_and_instance_streams_validate() {
        let builder = two_streams();
        assert_eq!(builder.bindings.len(), 2);
        assert_eq!(builder.attributes.len(), 8);
        assert!(builder.check_vertex_input().is_ok());
    }

    #[test]
    fn test_missing_stream_is_rejected() {
        let mut builder = two_streams();
        builder.bindings.pop();
        assert!(matches!(
            builder.check_vertex_input(),
            Err(RhiError::PipelineError(_))
        ));
    }

    #[test]
    fn test_duplicate_location_is_rejected() {
        let builder = GraphicsPipelineBuilder::new().vertex_stream(
            Vertex::binding_description(),
            &[Vertex::attribute_descriptions()[0], Vertex::attribute_descriptions()[0]],
        );
        assert!(builder.check_vertex_input().is_err());
    }
}
