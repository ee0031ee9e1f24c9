// Command buffers and command recording
//
// `CommandBuffers` owns primary buffers allocated from the device pool.
// `VulkanDevice` implements `CommandRecorder` by forwarding to ash.

use super::{CommandRecorder, GpuDevice, RenderPassBegin, VulkanDevice};
use crate::error::Result;
use ash::vk;
use std::sync::Arc;

/// Primary command buffers, freed back to the pool on drop
pub struct CommandBuffers<D: GpuDevice> {
    buffers: Vec<vk::CommandBuffer>,
    device: Arc<D>,
}

impl<D: GpuDevice> CommandBuffers<D> {
    pub fn allocate(device: &Arc<D>, count: usize) -> Result<Self> {
        let buffers = device.allocate_command_buffers(count as u32)?;
        log::debug!("Allocated {} command buffers", buffers.len());
        Ok(Self {
            buffers,
            device: device.clone(),
        })
    }

    pub fn get(&self, index: usize) -> vk::CommandBuffer {
        self.buffers[index]
    }

    pub fn len(&self) -> usize {
        self.buffers.len()
    }
}

impl<D: GpuDevice> Drop for CommandBuffers<D> {
    fn drop(&mut self) {
        if !self.buffers.is_empty() {
            self.device.free_command_buffers(&self.buffers);
        }
    }
}

impl CommandRecorder for VulkanDevice {
    fn cmd_begin_render_pass(&self, cmd: vk::CommandBuffer, begin: &RenderPassBegin) {
        // Order matches the render pass attachments: color, then depth
        let clear_values = [
            vk::ClearValue {
                color: vk::ClearColorValue {
                    float32: begin.clear_color,
                },
            },
            vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue {
                    depth: begin.clear_depth,
                    stencil: 0,
                },
            },
        ];

        let begin_info = vk::RenderPassBeginInfo::default()
            .render_pass(begin.render_pass)
            .framebuffer(begin.framebuffer)
            .render_area(vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent: begin.extent,
            })
            .clear_values(&clear_values);

        unsafe {
            self.device
                .cmd_begin_render_pass(cmd, &begin_info, vk::SubpassContents::INLINE);
        }
    }

    fn cmd_end_render_pass(&self, cmd: vk::CommandBuffer) {
        unsafe { self.device.cmd_end_render_pass(cmd) };
    }

    fn cmd_set_viewport(&self, cmd: vk::CommandBuffer, viewport: vk::Viewport) {
        unsafe { self.device.cmd_set_viewport(cmd, 0, &[viewport]) };
    }

    fn cmd_set_scissor(&self, cmd: vk::CommandBuffer, scissor: vk::Rect2D) {
        unsafe { self.device.cmd_set_scissor(cmd, 0, &[scissor]) };
    }

    fn cmd_bind_pipeline(&self, cmd: vk::CommandBuffer, pipeline: vk::Pipeline) {
        unsafe {
            self.device
                .cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, pipeline);
        }
    }

    fn cmd_push_constants(
        &self,
        cmd: vk::CommandBuffer,
        layout: vk::PipelineLayout,
        stages: vk::ShaderStageFlags,
        data: &[u8],
    ) {
        unsafe { self.device.cmd_push_constants(cmd, layout, stages, 0, data) };
    }

    fn cmd_bind_vertex_buffer(&self, cmd: vk::CommandBuffer, buffer: vk::Buffer) {
        unsafe { self.device.cmd_bind_vertex_buffers(cmd, 0, &[buffer], &[0]) };
    }

    fn cmd_bind_index_buffer(&self, cmd: vk::CommandBuffer, buffer: vk::Buffer) {
        unsafe {
            self.device
                .cmd_bind_index_buffer(cmd, buffer, 0, vk::IndexType::UINT32);
        }
    }

    fn cmd_draw(&self, cmd: vk::CommandBuffer, vertex_count: u32) {
        unsafe { self.device.cmd_draw(cmd, vertex_count, 1, 0, 0) };
    }

    fn cmd_draw_indexed(&self, cmd: vk::CommandBuffer, index_count: u32) {
        unsafe { self.device.cmd_draw_indexed(cmd, index_count, 1, 0, 0, 0) };
    }
}
