// Test doubles - fake GPU, swapchain, window and mesh
//
// FakeDevice records every call it receives so tests can assert on
// ordering without a Vulkan driver.

use crate::backend::pipeline::GraphicsPipelineDesc;
use crate::backend::sync::FrameSlots;
use crate::backend::{
    CommandRecorder, GpuDevice, PresentationSurface, RenderPassBegin, SwapchainStatus,
};
use crate::error::{GpuError, Result};
use crate::model::Drawable;
use crate::window::FrameWindow;
use ash::vk::{self, Handle};
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

const FRAMEBUFFER_BASE: u64 = 0x1000;

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    CreateSwapchain {
        id: u64,
        width: u32,
        height: u32,
        start_frame: usize,
        retired: Option<u64>,
    },
    DestroySwapchain(u64),
    WaitIdle,
    AllocateCommandBuffers(u32),
    FreeCommandBuffers(usize),
    BeginCommandBuffer(vk::CommandBuffer),
    EndCommandBuffer(vk::CommandBuffer),
    Acquire {
        swapchain: u64,
        frame: usize,
    },
    Submit {
        swapchain: u64,
        cmd: vk::CommandBuffer,
        image_index: u32,
        frame: usize,
    },
    CreateShaderModule(vk::ShaderModule),
    DestroyShaderModule(vk::ShaderModule),
    CreatePipelineLayout(vk::PipelineLayout),
    DestroyPipelineLayout(vk::PipelineLayout),
    CreatePipeline(vk::Pipeline),
    DestroyPipeline(vk::Pipeline),
    BeginRenderPass {
        render_pass: vk::RenderPass,
        framebuffer: vk::Framebuffer,
        width: u32,
        height: u32,
        clear_color: [f32; 4],
        clear_depth: f32,
    },
    EndRenderPass,
    SetViewport {
        width: u32,
        height: u32,
        min_depth: f32,
        max_depth: f32,
    },
    SetScissor {
        width: u32,
        height: u32,
    },
    BindPipeline(vk::Pipeline),
    PushConstants(Vec<u8>),
    BindVertexBuffer(vk::Buffer),
    BindIndexBuffer(vk::Buffer),
    Draw(u32),
    DrawIndexed(u32),
}

type Scripted = VecDeque<std::result::Result<SwapchainStatus, vk::Result>>;

/// Records calls and hands out fresh handles. Acquire and present results
/// are scripted; unscripted calls report `Optimal`.
pub struct FakeDevice {
    calls: RefCell<Vec<Call>>,
    next_handle: Cell<u64>,
    acquire_results: RefCell<Scripted>,
    submit_results: RefCell<Scripted>,
    image_format: Cell<vk::Format>,
    image_count: Cell<usize>,
    surface_extents: RefCell<VecDeque<vk::Extent2D>>,
}

impl FakeDevice {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: RefCell::new(Vec::new()),
            next_handle: Cell::new(1),
            acquire_results: RefCell::new(VecDeque::new()),
            submit_results: RefCell::new(VecDeque::new()),
            image_format: Cell::new(vk::Format::B8G8R8A8_SRGB),
            image_count: Cell::new(3),
            surface_extents: RefCell::new(VecDeque::new()),
        })
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.borrow().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.borrow_mut().clear();
    }

    pub fn script_acquire(
        &self,
        results: impl IntoIterator<Item = std::result::Result<SwapchainStatus, vk::Result>>,
    ) {
        self.acquire_results.borrow_mut().extend(results);
    }

    pub fn script_submit(
        &self,
        results: impl IntoIterator<Item = std::result::Result<SwapchainStatus, vk::Result>>,
    ) {
        self.submit_results.borrow_mut().extend(results);
    }

    /// Extents the surface reports before it starts agreeing with the window
    pub fn script_surface_extents(&self, extents: &[(u32, u32)]) {
        self.surface_extents.borrow_mut().extend(
            extents
                .iter()
                .map(|&(width, height)| vk::Extent2D { width, height }),
        );
    }

    /// Format reported by swapchains created from now on
    pub fn set_image_format(&self, format: vk::Format) {
        self.image_format.set(format);
    }

    pub fn framebuffer_for_image(&self, image_index: u32) -> vk::Framebuffer {
        vk::Framebuffer::from_raw(FRAMEBUFFER_BASE + image_index as u64)
    }

    fn record(&self, call: Call) {
        self.calls.borrow_mut().push(call);
    }

    fn handle(&self) -> u64 {
        let handle = self.next_handle.get();
        self.next_handle.set(handle + 1);
        handle
    }

    fn next_result(queue: &RefCell<Scripted>) -> Result<SwapchainStatus> {
        match queue.borrow_mut().pop_front() {
            Some(Ok(status)) => Ok(status),
            Some(Err(e)) => Err(GpuError::Vulkan(e)),
            None => Ok(SwapchainStatus::Optimal),
        }
    }
}

impl CommandRecorder for FakeDevice {
    fn cmd_begin_render_pass(&self, _cmd: vk::CommandBuffer, begin: &RenderPassBegin) {
        self.record(Call::BeginRenderPass {
            render_pass: begin.render_pass,
            framebuffer: begin.framebuffer,
            width: begin.extent.width,
            height: begin.extent.height,
            clear_color: begin.clear_color,
            clear_depth: begin.clear_depth,
        });
    }

    fn cmd_end_render_pass(&self, _cmd: vk::CommandBuffer) {
        self.record(Call::EndRenderPass);
    }

    fn cmd_set_viewport(&self, _cmd: vk::CommandBuffer, viewport: vk::Viewport) {
        self.record(Call::SetViewport {
            width: viewport.width as u32,
            height: viewport.height as u32,
            min_depth: viewport.min_depth,
            max_depth: viewport.max_depth,
        });
    }

    fn cmd_set_scissor(&self, _cmd: vk::CommandBuffer, scissor: vk::Rect2D) {
        self.record(Call::SetScissor {
            width: scissor.extent.width,
            height: scissor.extent.height,
        });
    }

    fn cmd_bind_pipeline(&self, _cmd: vk::CommandBuffer, pipeline: vk::Pipeline) {
        self.record(Call::BindPipeline(pipeline));
    }

    fn cmd_push_constants(
        &self,
        _cmd: vk::CommandBuffer,
        _layout: vk::PipelineLayout,
        _stages: vk::ShaderStageFlags,
        data: &[u8],
    ) {
        self.record(Call::PushConstants(data.to_vec()));
    }

    fn cmd_bind_vertex_buffer(&self, _cmd: vk::CommandBuffer, buffer: vk::Buffer) {
        self.record(Call::BindVertexBuffer(buffer));
    }

    fn cmd_bind_index_buffer(&self, _cmd: vk::CommandBuffer, buffer: vk::Buffer) {
        self.record(Call::BindIndexBuffer(buffer));
    }

    fn cmd_draw(&self, _cmd: vk::CommandBuffer, vertex_count: u32) {
        self.record(Call::Draw(vertex_count));
    }

    fn cmd_draw_indexed(&self, _cmd: vk::CommandBuffer, index_count: u32) {
        self.record(Call::DrawIndexed(index_count));
    }
}

impl GpuDevice for FakeDevice {
    type Swapchain = FakeSwapchain;

    fn create_swapchain(
        device: &Arc<Self>,
        extent: vk::Extent2D,
        previous: Option<&FakeSwapchain>,
    ) -> Result<FakeSwapchain> {
        if extent.width == 0 || extent.height == 0 {
            return Err(GpuError::SwapchainCreation(
                "surface has no drawable area".to_string(),
            ));
        }

        let id = device.handle();
        let start_frame = previous.map_or(0, |p| p.current_frame());
        let image_count = device.image_count.get();

        device.record(Call::CreateSwapchain {
            id,
            width: extent.width,
            height: extent.height,
            start_frame,
            retired: previous.map(|p| p.id),
        });

        Ok(FakeSwapchain {
            id,
            render_pass: vk::RenderPass::from_raw(device.handle()),
            extent,
            image_format: device.image_format.get(),
            depth_format: vk::Format::D32_SFLOAT,
            image_count,
            next_image: 0,
            slots: FrameSlots::new(image_count, start_frame),
            device: device.clone(),
        })
    }

    fn surface_extent(&self, requested: vk::Extent2D) -> Result<vk::Extent2D> {
        Ok(self
            .surface_extents
            .borrow_mut()
            .pop_front()
            .unwrap_or(requested))
    }

    fn wait_idle(&self) -> Result<()> {
        self.record(Call::WaitIdle);
        Ok(())
    }

    fn allocate_command_buffers(&self, count: u32) -> Result<Vec<vk::CommandBuffer>> {
        self.record(Call::AllocateCommandBuffers(count));
        Ok((0..count)
            .map(|_| vk::CommandBuffer::from_raw(self.handle()))
            .collect())
    }

    fn free_command_buffers(&self, buffers: &[vk::CommandBuffer]) {
        self.record(Call::FreeCommandBuffers(buffers.len()));
    }

    fn begin_command_buffer(&self, cmd: vk::CommandBuffer) -> Result<()> {
        self.record(Call::BeginCommandBuffer(cmd));
        Ok(())
    }

    fn end_command_buffer(&self, cmd: vk::CommandBuffer) -> Result<()> {
        self.record(Call::EndCommandBuffer(cmd));
        Ok(())
    }

    fn create_shader_module(&self, _code: &[u32]) -> Result<vk::ShaderModule> {
        let module = vk::ShaderModule::from_raw(self.handle());
        self.record(Call::CreateShaderModule(module));
        Ok(module)
    }

    fn destroy_shader_module(&self, module: vk::ShaderModule) {
        self.record(Call::DestroyShaderModule(module));
    }

    fn create_pipeline_layout(
        &self,
        _push_constant_size: u32,
        _stages: vk::ShaderStageFlags,
    ) -> Result<vk::PipelineLayout> {
        let layout = vk::PipelineLayout::from_raw(self.handle());
        self.record(Call::CreatePipelineLayout(layout));
        Ok(layout)
    }

    fn destroy_pipeline_layout(&self, layout: vk::PipelineLayout) {
        self.record(Call::DestroyPipelineLayout(layout));
    }

    fn create_graphics_pipeline(&self, _desc: &GraphicsPipelineDesc<'_>) -> Result<vk::Pipeline> {
        let pipeline = vk::Pipeline::from_raw(self.handle());
        self.record(Call::CreatePipeline(pipeline));
        Ok(pipeline)
    }

    fn destroy_pipeline(&self, pipeline: vk::Pipeline) {
        self.record(Call::DestroyPipeline(pipeline));
    }
}

/// Swapchain that hands out images round-robin
pub struct FakeSwapchain {
    id: u64,
    render_pass: vk::RenderPass,
    extent: vk::Extent2D,
    image_format: vk::Format,
    depth_format: vk::Format,
    image_count: usize,
    next_image: u32,
    slots: FrameSlots<u64>,
    device: Arc<FakeDevice>,
}

impl PresentationSurface for FakeSwapchain {
    fn acquire_next_image(&mut self) -> Result<(u32, SwapchainStatus)> {
        self.device.record(Call::Acquire {
            swapchain: self.id,
            frame: self.slots.current_frame(),
        });

        let status = FakeDevice::next_result(&self.device.acquire_results)?;
        if status == SwapchainStatus::OutOfDate {
            return Ok((0, status));
        }

        let index = self.next_image;
        self.next_image = (self.next_image + 1) % self.image_count as u32;
        Ok((index, status))
    }

    fn submit_command_buffer(
        &mut self,
        cmd: vk::CommandBuffer,
        image_index: u32,
    ) -> Result<SwapchainStatus> {
        let frame = self.slots.current_frame();
        self.device.record(Call::Submit {
            swapchain: self.id,
            cmd,
            image_index,
            frame,
        });
        self.slots.claim_image(image_index, frame as u64);
        self.slots.advance();

        FakeDevice::next_result(&self.device.submit_results)
    }

    fn render_pass(&self) -> vk::RenderPass {
        self.render_pass
    }

    fn framebuffer(&self, image_index: usize) -> vk::Framebuffer {
        assert!(image_index < self.image_count, "framebuffer index out of range");
        self.device.framebuffer_for_image(image_index as u32)
    }

    fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    fn image_count(&self) -> usize {
        self.image_count
    }

    fn image_format(&self) -> vk::Format {
        self.image_format
    }

    fn depth_format(&self) -> vk::Format {
        self.depth_format
    }

    fn current_frame(&self) -> usize {
        self.slots.current_frame()
    }
}

impl Drop for FakeSwapchain {
    fn drop(&mut self) {
        self.device.record(Call::DestroySwapchain(self.id));
    }
}

/// Scripted window. `wait_events` moves to the next queued extent, the
/// last one stays put.
pub struct FakeWindow {
    extents: VecDeque<vk::Extent2D>,
    resized: bool,
    close_requested: bool,
    close_after_polls: Option<usize>,
    close_after_waits: Option<usize>,
    pub polls: usize,
    pub waits: usize,
    pub titles: Vec<String>,
}

impl FakeWindow {
    pub fn new(width: u32, height: u32) -> Self {
        Self::with_extents(&[(width, height)])
    }

    pub fn with_extents(extents: &[(u32, u32)]) -> Self {
        let mut window = Self {
            extents: VecDeque::new(),
            resized: false,
            close_requested: false,
            close_after_polls: None,
            close_after_waits: None,
            polls: 0,
            waits: 0,
            titles: Vec::new(),
        };
        window.set_extents(extents);
        window
    }

    pub fn set_extents(&mut self, extents: &[(u32, u32)]) {
        self.extents = extents
            .iter()
            .map(|&(width, height)| vk::Extent2D { width, height })
            .collect();
    }

    /// Change size and raise the resized flag, as a window event would
    pub fn resize(&mut self, width: u32, height: u32) {
        self.set_extents(&[(width, height)]);
        self.resized = true;
    }

    pub fn request_close(&mut self) {
        self.close_requested = true;
    }

    pub fn close_after_polls(&mut self, polls: usize) {
        self.close_after_polls = Some(polls);
    }

    pub fn close_after_waits(&mut self, waits: usize) {
        self.close_after_waits = Some(waits);
    }
}

impl FrameWindow for FakeWindow {
    fn extent(&self) -> vk::Extent2D {
        self.extents.front().copied().unwrap_or_default()
    }

    fn should_close(&self) -> bool {
        self.close_requested
    }

    fn was_resized(&self) -> bool {
        self.resized
    }

    fn reset_resized_flag(&mut self) {
        self.resized = false;
    }

    fn poll_events(&mut self) {
        self.polls += 1;
        if self.close_after_polls.is_some_and(|n| self.polls >= n) {
            self.close_requested = true;
        }
    }

    fn wait_events(&mut self) {
        self.waits += 1;
        if self.extents.len() > 1 {
            self.extents.pop_front();
        }
        if self.close_after_waits.is_some_and(|n| self.waits >= n) {
            self.close_requested = true;
        }
    }

    fn set_title(&mut self, title: &str) {
        self.titles.push(title.to_string());
    }
}

/// Non-indexed mesh with a fixed vertex buffer handle
pub struct FakeMesh {
    buffer: vk::Buffer,
    vertex_count: u32,
}

impl FakeMesh {
    pub fn new(buffer: u64, vertex_count: u32) -> Self {
        Self {
            buffer: vk::Buffer::from_raw(buffer),
            vertex_count,
        }
    }
}

impl Drawable for FakeMesh {
    fn bind(&self, recorder: &dyn CommandRecorder, cmd: vk::CommandBuffer) {
        recorder.cmd_bind_vertex_buffer(cmd, self.buffer);
    }

    fn draw(&self, recorder: &dyn CommandRecorder, cmd: vk::CommandBuffer) {
        recorder.cmd_draw(cmd, self.vertex_count);
    }
}

static TEMP_FILES: AtomicUsize = AtomicUsize::new(0);

/// Write `bytes` to a fresh file in the temp directory
pub fn write_temp_file(name: &str, bytes: &[u8]) -> PathBuf {
    let n = TEMP_FILES.fetch_add(1, Ordering::Relaxed);
    let path = std::env::temp_dir().join(format!(
        "cube_renderer_{}_{}_{}",
        std::process::id(),
        n,
        name
    ));
    std::fs::write(&path, bytes).unwrap();
    path
}

/// Smallest binary that passes the SPIR-V header checks
pub fn write_spirv(name: &str) -> PathBuf {
    let words: [u32; 5] = [0x0723_0203, 0x0001_0000, 0, 1, 0];
    let bytes: Vec<u8> = words.iter().flat_map(|w| w.to_le_bytes()).collect();
    write_temp_file(name, &bytes)
}
