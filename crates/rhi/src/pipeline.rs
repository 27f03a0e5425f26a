//! Graphics pipeline management.
//!
//! - [`PipelineLayout`] is the fixed, swapchain-independent binding layout.
//! - [`PipelineConfig`] is a value describing the fixed-function state for one
//!   render pass and extent.
//! - [`Pipeline`] is the compiled pipeline. It is immutable; a new extent or
//!   render pass means building a new one.

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info};

use crate::command::{CommandBuffer, full_scissor, full_viewport};
use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::shader::{Shader, ShaderStage};
use crate::vertex::Vertex;

/// Vulkan pipeline layout wrapper.
pub struct PipelineLayout {
    device: Arc<Device>,
    layout: vk::PipelineLayout,
}

impl PipelineLayout {
    pub fn new(
        device: Arc<Device>,
        descriptor_set_layouts: &[vk::DescriptorSetLayout],
        push_constant_ranges: &[vk::PushConstantRange],
    ) -> RhiResult<Self> {
        let create_info = vk::PipelineLayoutCreateInfo::default()
            .set_layouts(descriptor_set_layouts)
            .push_constant_ranges(push_constant_ranges);

        let layout = unsafe {
            device
                .handle()
                .create_pipeline_layout(&create_info, None)
                .map_err(|e| RhiError::PipelineCreation(format!("pipeline layout: {}", e)))?
        };

        debug!(
            "Created pipeline layout with {} set layout(s) and {} push constant range(s)",
            descriptor_set_layouts.len(),
            push_constant_ranges.len()
        );

        Ok(Self { device, layout })
    }

    #[inline]
    pub fn handle(&self) -> vk::PipelineLayout {
        self.layout
    }
}

impl Drop for PipelineLayout {
    fn drop(&mut self) {
        unsafe {
            self.device
                .handle()
                .destroy_pipeline_layout(self.layout, None);
        }
        debug!("Pipeline layout destroyed");
    }
}

/// Fixed-function state for one pipeline.
///
/// Consumed by [`Pipeline::new`]; the pipeline keeps nothing from it but the extent.
#[derive(Clone, Debug)]
pub struct PipelineConfig {
    pub extent: vk::Extent2D,
    pub render_pass: vk::RenderPass,
    pub subpass: u32,
    pub layout: vk::PipelineLayout,
    pub topology: vk::PrimitiveTopology,
    pub polygon_mode: vk::PolygonMode,
    pub cull_mode: vk::CullModeFlags,
    pub front_face: vk::FrontFace,
    pub samples: vk::SampleCountFlags,
    pub blend_enable: bool,
    pub color_write_mask: vk::ColorComponentFlags,
    pub depth_test: bool,
    pub depth_write: bool,
    pub depth_compare_op: vk::CompareOp,
    pub dynamic_states: Vec<vk::DynamicState>,
    pub vertex_bindings: Vec<vk::VertexInputBindingDescription>,
    pub vertex_attributes: Vec<vk::VertexInputAttributeDescription>,
}

impl PipelineConfig {
    /// Defaults for drawing [`Vertex`] triangles into subpass 0 of `render_pass`.
    pub fn new(
        extent: vk::Extent2D,
        render_pass: vk::RenderPass,
        layout: vk::PipelineLayout,
    ) -> Self {
        Self {
            extent,
            render_pass,
            subpass: 0,
            layout,
            topology: vk::PrimitiveTopology::TRIANGLE_LIST,
            polygon_mode: vk::PolygonMode::FILL,
            cull_mode: vk::CullModeFlags::NONE,
            front_face: vk::FrontFace::CLOCKWISE,
            samples: vk::SampleCountFlags::TYPE_1,
            blend_enable: false,
            color_write_mask: vk::ColorComponentFlags::RGBA,
            depth_test: true,
            depth_write: true,
            depth_compare_op: vk::CompareOp::LESS,
            dynamic_states: vec![vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR],
            vertex_bindings: Vertex::binding_descriptions().to_vec(),
            vertex_attributes: Vertex::attribute_descriptions().to_vec(),
        }
    }

    pub fn with_cull_mode(mut self, cull_mode: vk::CullModeFlags) -> Self {
        self.cull_mode = cull_mode;
        self
    }

    pub fn with_front_face(mut self, front_face: vk::FrontFace) -> Self {
        self.front_face = front_face;
        self
    }

    pub fn with_polygon_mode(mut self, polygon_mode: vk::PolygonMode) -> Self {
        self.polygon_mode = polygon_mode;
        self
    }

    pub fn with_topology(mut self, topology: vk::PrimitiveTopology) -> Self {
        self.topology = topology;
        self
    }

    /// Viewport covering the whole extent.
    pub fn viewport(&self) -> vk::Viewport {
        full_viewport(self.extent)
    }

    fn color_blend_attachment(&self) -> vk::PipelineColorBlendAttachmentState {
        vk::PipelineColorBlendAttachmentState {
            blend_enable: self.blend_enable.into(),
            src_color_blend_factor: vk::BlendFactor::ONE,
            dst_color_blend_factor: vk::BlendFactor::ZERO,
            color_blend_op: vk::BlendOp::ADD,
            src_alpha_blend_factor: vk::BlendFactor::ONE,
            dst_alpha_blend_factor: vk::BlendFactor::ZERO,
            alpha_blend_op: vk::BlendOp::ADD,
            color_write_mask: self.color_write_mask,
        }
    }
}

/// A compiled graphics pipeline.
pub struct Pipeline {
    device: Arc<Device>,
    pipeline: vk::Pipeline,
    extent: vk::Extent2D,
}

impl Pipeline {
    /// Compiles `vertex_code` and `fragment_code` with `config` into a pipeline.
    ///
    /// # Errors
    ///
    /// - [`RhiError::ShaderCompile`] if either shader module cannot be built
    /// - [`RhiError::PipelineCreation`] if the driver rejects the pipeline
    pub fn new(
        device: Arc<Device>,
        vertex_code: &[u8],
        fragment_code: &[u8],
        config: PipelineConfig,
    ) -> RhiResult<Self> {
        let vertex_shader = Shader::from_spirv_bytes(device.clone(), vertex_code, ShaderStage::Vertex)?;
        let fragment_shader =
            Shader::from_spirv_bytes(device.clone(), fragment_code, ShaderStage::Fragment)?;

        let shader_stages = [
            vertex_shader.stage_create_info(),
            fragment_shader.stage_create_info(),
        ];

        let vertex_input_state = vk::PipelineVertexInputStateCreateInfo::default()
            .vertex_binding_descriptions(&config.vertex_bindings)
            .vertex_attribute_descriptions(&config.vertex_attributes);

        let input_assembly_state = vk::PipelineInputAssemblyStateCreateInfo::default()
            .topology(config.topology)
            .primitive_restart_enable(false);

        let viewports = [config.viewport()];
        let scissors = [full_scissor(config.extent)];
        let viewport_state = vk::PipelineViewportStateCreateInfo::default()
            .viewports(&viewports)
            .scissors(&scissors);

        let rasterization_state = vk::PipelineRasterizationStateCreateInfo::default()
            .depth_clamp_enable(false)
            .rasterizer_discard_enable(false)
            .polygon_mode(config.polygon_mode)
            .line_width(1.0)
            .cull_mode(config.cull_mode)
            .front_face(config.front_face)
            .depth_bias_enable(false);

        let multisample_state = vk::PipelineMultisampleStateCreateInfo::default()
            .sample_shading_enable(false)
            .rasterization_samples(config.samples)
            .min_sample_shading(1.0);

        let depth_stencil_state = vk::PipelineDepthStencilStateCreateInfo::default()
            .depth_test_enable(config.depth_test)
            .depth_write_enable(config.depth_write)
            .depth_compare_op(config.depth_compare_op)
            .depth_bounds_test_enable(false)
            .min_depth_bounds(0.0)
            .max_depth_bounds(1.0)
            .stencil_test_enable(false);

        let color_blend_attachments = [config.color_blend_attachment()];
        let color_blend_state = vk::PipelineColorBlendStateCreateInfo::default()
            .logic_op_enable(false)
            .logic_op(vk::LogicOp::COPY)
            .attachments(&color_blend_attachments)
            .blend_constants([0.0; 4]);

        let dynamic_state =
            vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&config.dynamic_states);

        let pipeline_info = vk::GraphicsPipelineCreateInfo::default()
            .stages(&shader_stages)
            .vertex_input_state(&vertex_input_state)
            .input_assembly_state(&input_assembly_state)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterization_state)
            .multisample_state(&multisample_state)
            .depth_stencil_state(&depth_stencil_state)
            .color_blend_state(&color_blend_state)
            .dynamic_state(&dynamic_state)
            .layout(config.layout)
            .render_pass(config.render_pass)
            .subpass(config.subpass);

        let pipeline = unsafe {
            device
                .handle()
                .create_graphics_pipelines(
                    vk::PipelineCache::null(),
                    std::slice::from_ref(&pipeline_info),
                    None,
                )
                .map_err(|(_, e)| RhiError::PipelineCreation(format!("vkCreateGraphicsPipelines: {}", e)))?
        };
        let pipeline = pipeline
            .into_iter()
            .next()
            .ok_or_else(|| RhiError::PipelineCreation("driver returned no pipeline".to_string()))?;

        // Shader modules drop here; the pipeline no longer needs them.
        info!(
            "Graphics pipeline created for {}x{}",
            config.extent.width, config.extent.height
        );

        Ok(Self {
            device,
            pipeline,
            extent: config.extent,
        })
    }

    /// Records a bind of this pipeline. Must precede any draw in the same recording.
    pub fn bind(&self, command_buffer: &CommandBuffer) {
        command_buffer.bind_graphics_pipeline(self.pipeline);
    }

    #[inline]
    pub fn handle(&self) -> vk::Pipeline {
        self.pipeline
    }

    /// Extent the pipeline was built for.
    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_pipeline(self.pipeline, None);
        }
        info!("Graphics pipeline destroyed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> PipelineConfig {
        PipelineConfig::new(
            vk::Extent2D {
                width: 800,
                height: 600,
            },
            vk::RenderPass::null(),
            vk::PipelineLayout::null(),
        )
    }

    #[test]
    fn test_config_defaults() {
        let config = config();
        assert_eq!(config.subpass, 0);
        assert_eq!(config.topology, vk::PrimitiveTopology::TRIANGLE_LIST);
        assert_eq!(config.polygon_mode, vk::PolygonMode::FILL);
        assert_eq!(config.cull_mode, vk::CullModeFlags::NONE);
        assert_eq!(config.front_face, vk::FrontFace::CLOCKWISE);
        assert_eq!(config.samples, vk::SampleCountFlags::TYPE_1);
        assert!(!config.blend_enable);
        assert_eq!(config.color_write_mask, vk::ColorComponentFlags::RGBA);
        assert!(config.depth_test);
        assert!(config.depth_write);
        assert_eq!(config.depth_compare_op, vk::CompareOp::LESS);
        assert_eq!(
            config.dynamic_states,
            vec![vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR]
        );
    }

    #[test]
    fn test_config_vertex_input_matches_vertex() {
        let config = config();
        assert_eq!(config.vertex_bindings.len(), 1);
        assert_eq!(config.vertex_bindings[0].stride, Vertex::size() as u32);
        assert_eq!(config.vertex_attributes.len(), 2);
    }

    #[test]
    fn test_config_viewport_follows_extent() {
        let viewport = config().viewport();
        assert_eq!(viewport.width, 800.0);
        assert_eq!(viewport.height, 600.0);
        assert_eq!(viewport.max_depth, 1.0);
    }

    #[test]
    fn test_config_modifiers() {
        let config = config()
            .with_cull_mode(vk::CullModeFlags::BACK)
            .with_front_face(vk::FrontFace::COUNTER_CLOCKWISE)
            .with_polygon_mode(vk::PolygonMode::LINE)
            .with_topology(vk::PrimitiveTopology::LINE_LIST);

        assert_eq!(config.cull_mode, vk::CullModeFlags::BACK);
        assert_eq!(config.front_face, vk::FrontFace::COUNTER_CLOCKWISE);
        assert_eq!(config.polygon_mode, vk::PolygonMode::LINE);
        assert_eq!(config.topology, vk::PrimitiveTopology::LINE_LIST);
    }

    #[test]
    fn test_color_blend_attachment_disabled() {
        let attachment = config().color_blend_attachment();
        assert_eq!(attachment.blend_enable, vk::FALSE);
        assert_eq!(attachment.color_write_mask, vk::ColorComponentFlags::RGBA);
    }
}
