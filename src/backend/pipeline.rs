// Graphics pipeline creation and management
//
// The graphics pipeline defines how vertices are processed and rasterized.
// It includes: vertex input, shaders, rasterization, depth/stencil, blending.
// Viewport and scissor are dynamic so the pipeline survives swapchain resizes.

use super::shader::ShaderModule;
use super::GpuDevice;
use crate::error::Result;
use ash::vk;
use std::path::Path;
use std::sync::Arc;

/// Fixed-function state for a graphics pipeline
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub vertex_bindings: Vec<vk::VertexInputBindingDescription>,
    pub vertex_attributes: Vec<vk::VertexInputAttributeDescription>,
    pub topology: vk::PrimitiveTopology,
    pub polygon_mode: vk::PolygonMode,
    pub cull_mode: vk::CullModeFlags,
    pub front_face: vk::FrontFace,
    pub samples: vk::SampleCountFlags,
    pub depth_test: bool,
    pub depth_write: bool,
    pub depth_compare_op: vk::CompareOp,
    pub blend_enable: bool,
    pub dynamic_states: Vec<vk::DynamicState>,
    pub subpass: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            vertex_bindings: Vec::new(),
            vertex_attributes: Vec::new(),
            topology: vk::PrimitiveTopology::TRIANGLE_LIST,
            polygon_mode: vk::PolygonMode::FILL,
            cull_mode: vk::CullModeFlags::NONE,
            front_face: vk::FrontFace::CLOCKWISE,
            samples: vk::SampleCountFlags::TYPE_1,
            depth_test: true,
            depth_write: true,
            depth_compare_op: vk::CompareOp::LESS,
            blend_enable: false,
            dynamic_states: vec![vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR],
            subpass: 0,
        }
    }
}

/// Handles and state a device needs to build one graphics pipeline
pub struct GraphicsPipelineDesc<'a> {
    pub vertex_shader: vk::ShaderModule,
    pub fragment_shader: vk::ShaderModule,
    pub layout: vk::PipelineLayout,
    pub render_pass: vk::RenderPass,
    pub config: &'a PipelineConfig,
}

/// Pipeline layout with a single push constant range
pub struct PipelineLayout<D: GpuDevice> {
    layout: vk::PipelineLayout,
    device: Arc<D>,
}

impl<D: GpuDevice> PipelineLayout<D> {
    pub fn new(device: &Arc<D>, push_constant_size: u32, stages: vk::ShaderStageFlags) -> Result<Self> {
        let layout = device.create_pipeline_layout(push_constant_size, stages)?;
        Ok(Self {
            layout,
            device: device.clone(),
        })
    }

    pub fn handle(&self) -> vk::PipelineLayout {
        self.layout
    }
}

impl<D: GpuDevice> Drop for PipelineLayout<D> {
    fn drop(&mut self) {
        self.device.destroy_pipeline_layout(self.layout);
    }
}

/// A graphics pipeline built from a vertex and a fragment shader on disk
pub struct Pipeline<D: GpuDevice> {
    pipeline: vk::Pipeline,
    device: Arc<D>,
}

impl<D: GpuDevice> Pipeline<D> {
    /// # Panics
    /// If `layout` or `render_pass` is a null handle.
    pub fn new(
        device: &Arc<D>,
        vertex_path: &Path,
        fragment_path: &Path,
        layout: vk::PipelineLayout,
        render_pass: vk::RenderPass,
        config: &PipelineConfig,
    ) -> Result<Self> {
        assert!(
            layout != vk::PipelineLayout::null(),
            "Cannot create graphics pipeline: no pipeline layout provided"
        );
        assert!(
            render_pass != vk::RenderPass::null(),
            "Cannot create graphics pipeline: no render pass provided"
        );

        let vertex_shader = ShaderModule::load(device, vertex_path)?;
        let fragment_shader = ShaderModule::load(device, fragment_path)?;

        let pipeline = device.create_graphics_pipeline(&GraphicsPipelineDesc {
            vertex_shader: vertex_shader.handle(),
            fragment_shader: fragment_shader.handle(),
            layout,
            render_pass,
            config,
        })?;

        log::debug!(
            "Created graphics pipeline from {} and {}",
            vertex_path.display(),
            fragment_path.display()
        );

        // Shader modules are released here, the pipeline keeps its own copy
        Ok(Self {
            pipeline,
            device: device.clone(),
        })
    }

    pub fn bind(&self, cmd: vk::CommandBuffer) {
        self.device.cmd_bind_pipeline(cmd, self.pipeline);
    }

    pub fn handle(&self) -> vk::Pipeline {
        self.pipeline
    }
}

impl<D: GpuDevice> Drop for Pipeline<D> {
    fn drop(&mut self) {
        self.device.destroy_pipeline(self.pipeline);
    }
}
