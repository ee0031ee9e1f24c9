// Backend module - Vulkan abstraction layer
//
// Thin RAII wrappers around ash, plus the traits the frame loop is written
// against. `VulkanDevice` and `Swapchain` are the real implementations; the
// renderer and render system only see `GpuDevice`, `CommandRecorder` and
// `PresentationSurface`.

pub mod buffer;
pub mod command;
pub mod device;
pub mod pipeline;
pub mod shader;
pub mod swapchain;
pub mod sync;

use crate::error::Result;
use ash::vk;
use std::sync::Arc;

pub use device::VulkanDevice;
pub use swapchain::Swapchain;

use pipeline::GraphicsPipelineDesc;

/// Number of frames the CPU may record ahead of the GPU.
pub const MAX_FRAMES_IN_FLIGHT: usize = 2;

/// Outcome of acquiring or presenting a swapchain image.
///
/// Fatal conditions are reported as `Err`, never as a status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapchainStatus {
    Optimal,
    /// Still usable, but no longer matches the surface exactly.
    Suboptimal,
    /// Unusable; the swapchain must be recreated before the next frame.
    OutOfDate,
}

/// Everything needed to begin the single render pass of a frame.
#[derive(Debug, Clone, Copy)]
pub struct RenderPassBegin {
    pub render_pass: vk::RenderPass,
    pub framebuffer: vk::Framebuffer,
    pub extent: vk::Extent2D,
    pub clear_color: [f32; 4],
    pub clear_depth: f32,
}

/// Command recording operations.
///
/// Object safe so meshes can record through `&dyn CommandRecorder`.
pub trait CommandRecorder {
    fn cmd_begin_render_pass(&self, cmd: vk::CommandBuffer, begin: &RenderPassBegin);
    fn cmd_end_render_pass(&self, cmd: vk::CommandBuffer);
    fn cmd_set_viewport(&self, cmd: vk::CommandBuffer, viewport: vk::Viewport);
    fn cmd_set_scissor(&self, cmd: vk::CommandBuffer, scissor: vk::Rect2D);
    fn cmd_bind_pipeline(&self, cmd: vk::CommandBuffer, pipeline: vk::Pipeline);
    fn cmd_push_constants(
        &self,
        cmd: vk::CommandBuffer,
        layout: vk::PipelineLayout,
        stages: vk::ShaderStageFlags,
        data: &[u8],
    );
    fn cmd_bind_vertex_buffer(&self, cmd: vk::CommandBuffer, buffer: vk::Buffer);
    /// Binds a `u32` index buffer.
    fn cmd_bind_index_buffer(&self, cmd: vk::CommandBuffer, buffer: vk::Buffer);
    fn cmd_draw(&self, cmd: vk::CommandBuffer, vertex_count: u32);
    fn cmd_draw_indexed(&self, cmd: vk::CommandBuffer, index_count: u32);
}

/// Device operations used by the renderer and render system.
pub trait GpuDevice: CommandRecorder + Sized {
    type Swapchain: PresentationSurface;

    /// Build a swapchain for `extent`. When `previous` is given the new
    /// swapchain retires it and continues its frame-in-flight cursor.
    fn create_swapchain(
        device: &Arc<Self>,
        extent: vk::Extent2D,
        previous: Option<&Self::Swapchain>,
    ) -> Result<Self::Swapchain>;

    /// Extent a swapchain built for `requested` would get right now. The
    /// surface has the final say and reports 0x0 on some platforms while
    /// minimized.
    fn surface_extent(&self, requested: vk::Extent2D) -> Result<vk::Extent2D>;

    fn wait_idle(&self) -> Result<()>;

    fn allocate_command_buffers(&self, count: u32) -> Result<Vec<vk::CommandBuffer>>;
    fn free_command_buffers(&self, buffers: &[vk::CommandBuffer]);
    fn begin_command_buffer(&self, cmd: vk::CommandBuffer) -> Result<()>;
    fn end_command_buffer(&self, cmd: vk::CommandBuffer) -> Result<()>;

    fn create_shader_module(&self, code: &[u32]) -> Result<vk::ShaderModule>;
    fn destroy_shader_module(&self, module: vk::ShaderModule);

    /// Layout with no descriptor sets and a single push constant range at offset 0.
    fn create_pipeline_layout(
        &self,
        push_constant_size: u32,
        stages: vk::ShaderStageFlags,
    ) -> Result<vk::PipelineLayout>;
    fn destroy_pipeline_layout(&self, layout: vk::PipelineLayout);

    fn create_graphics_pipeline(&self, desc: &GraphicsPipelineDesc<'_>) -> Result<vk::Pipeline>;
    fn destroy_pipeline(&self, pipeline: vk::Pipeline);
}

/// The presentation side of a swapchain.
pub trait PresentationSurface {
    /// Wait for the current frame slot to be free, then acquire an image.
    ///
    /// On `OutOfDate` the returned index must not be used.
    fn acquire_next_image(&mut self) -> Result<(u32, SwapchainStatus)>;

    /// Submit `cmd` for `image_index`, present it and move to the next frame slot.
    fn submit_command_buffer(
        &mut self,
        cmd: vk::CommandBuffer,
        image_index: u32,
    ) -> Result<SwapchainStatus>;

    fn render_pass(&self) -> vk::RenderPass;
    fn framebuffer(&self, image_index: usize) -> vk::Framebuffer;
    fn extent(&self) -> vk::Extent2D;
    fn image_count(&self) -> usize;
    fn image_format(&self) -> vk::Format;
    fn depth_format(&self) -> vk::Format;

    /// Frame-in-flight slot the next acquire will use.
    fn current_frame(&self) -> usize;

    fn compare_formats(&self, other: &Self) -> bool
    where
        Self: Sized,
    {
        self.image_format() == other.image_format() && self.depth_format() == other.depth_format()
    }

    fn extent_aspect_ratio(&self) -> f32 {
        let extent = self.extent();
        extent.width as f32 / extent.height as f32
    }
}
