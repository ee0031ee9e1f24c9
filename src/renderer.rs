// =============================================================================
// RENDERER - Frame orchestration
// =============================================================================
//
// A frame is begin_frame -> begin_render_pass -> draws -> end_render_pass
// -> end_frame. The renderer owns the swapchain and recreates it whenever
// acquire or present report it stale, or the window was resized.
//
//            begin_frame (image acquired)
//   Idle ─────────────────────────────────▶ Recording
//    ▲  ◀── begin_frame → None (out of date,     │
//    │       swapchain recreated)                │
//    └───────────────────────────────────────────┘
//            end_frame (submitted + presented)

use crate::backend::command::CommandBuffers;
use crate::backend::{
    GpuDevice, PresentationSurface, RenderPassBegin, SwapchainStatus, MAX_FRAMES_IN_FLIGHT,
};
use crate::error::{GpuError, Result};
use crate::window::FrameWindow;
use ash::vk;
use std::sync::Arc;

/// Drives the acquire → record → submit → present cycle
///
/// Field order matters for Drop: command buffers and swapchain are released
/// before the last device reference held here.
pub struct Renderer<D: GpuDevice> {
    command_buffers: CommandBuffers<D>,
    swapchain: D::Swapchain,
    device: Arc<D>,
    clear_color: [f32; 4],
    current_image_index: u32,
    current_frame_index: usize,
    is_frame_started: bool,
    recreations: usize,
}

impl<D: GpuDevice> Renderer<D> {
    /// Create the first swapchain and the per-frame command buffers.
    ///
    /// Blocks while the window has no drawable area.
    pub fn new<W: FrameWindow>(device: Arc<D>, window: &mut W, clear_color: [f32; 4]) -> Result<Self> {
        let extent = wait_for_drawable_extent(&*device, window)?.ok_or_else(|| {
            GpuError::InvalidState("window closed before the swapchain was created".to_string())
        })?;

        let swapchain = D::create_swapchain(&device, extent, None)?;
        let command_buffers = CommandBuffers::allocate(&device, MAX_FRAMES_IN_FLIGHT)?;

        log::info!(
            "Renderer ready: {} swapchain images, {} command buffers",
            swapchain.image_count(),
            command_buffers.len()
        );

        Ok(Self {
            command_buffers,
            swapchain,
            device,
            clear_color,
            current_image_index: 0,
            current_frame_index: 0,
            is_frame_started: false,
            recreations: 0,
        })
    }

    /// Acquire the next image and start recording.
    ///
    /// Returns `None` when the swapchain was out of date; it has been
    /// recreated and the caller should skip this frame.
    ///
    /// # Panics
    /// If a frame is already in progress.
    pub fn begin_frame<W: FrameWindow>(&mut self, window: &mut W) -> Result<Option<vk::CommandBuffer>> {
        assert!(
            !self.is_frame_started,
            "Can't call begin_frame while already in progress"
        );
        debug_assert_eq!(self.swapchain.current_frame(), self.current_frame_index);

        let (image_index, status) = self.swapchain.acquire_next_image()?;
        if status == SwapchainStatus::OutOfDate {
            log::debug!("Swapchain out of date on acquire");
            self.recreate_swapchain(window)?;
            return Ok(None);
        }

        self.current_image_index = image_index;
        self.is_frame_started = true;

        let cmd = self.current_command_buffer();
        self.device.begin_command_buffer(cmd)?;
        Ok(Some(cmd))
    }

    /// Finish recording, submit and present.
    ///
    /// # Panics
    /// If no frame is in progress.
    pub fn end_frame<W: FrameWindow>(&mut self, window: &mut W) -> Result<()> {
        assert!(
            self.is_frame_started,
            "Can't call end_frame while frame is not in progress"
        );

        let cmd = self.current_command_buffer();
        self.device.end_command_buffer(cmd)?;

        let status = self
            .swapchain
            .submit_command_buffer(cmd, self.current_image_index)?;
        self.is_frame_started = false;

        if status != SwapchainStatus::Optimal || window.was_resized() {
            log::debug!("Recreating swapchain after present ({:?})", status);
            window.reset_resized_flag();
            self.recreate_swapchain(window)?;
        }

        self.current_frame_index = (self.current_frame_index + 1) % MAX_FRAMES_IN_FLIGHT;
        Ok(())
    }

    /// Begin the render pass on the current image, clearing color and depth
    /// and setting a full-extent viewport and scissor.
    ///
    /// # Panics
    /// If no frame is in progress or `cmd` is not this frame's command buffer.
    pub fn begin_render_pass(&self, cmd: vk::CommandBuffer) {
        assert!(
            self.is_frame_started,
            "Can't call begin_render_pass if frame is not in progress"
        );
        assert_eq!(
            cmd,
            self.current_command_buffer(),
            "Can't begin render pass on command buffer from a different frame"
        );

        let extent = self.swapchain.extent();
        self.device.cmd_begin_render_pass(
            cmd,
            &RenderPassBegin {
                render_pass: self.swapchain.render_pass(),
                framebuffer: self.swapchain.framebuffer(self.current_image_index as usize),
                extent,
                clear_color: self.clear_color,
                clear_depth: 1.0,
            },
        );

        self.device.cmd_set_viewport(
            cmd,
            vk::Viewport {
                x: 0.0,
                y: 0.0,
                width: extent.width as f32,
                height: extent.height as f32,
                min_depth: 0.0,
                max_depth: 1.0,
            },
        );
        self.device.cmd_set_scissor(
            cmd,
            vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent,
            },
        );
    }

    /// # Panics
    /// If no frame is in progress or `cmd` is not this frame's command buffer.
    pub fn end_render_pass(&self, cmd: vk::CommandBuffer) {
        assert!(
            self.is_frame_started,
            "Can't call end_render_pass if frame is not in progress"
        );
        assert_eq!(
            cmd,
            self.current_command_buffer(),
            "Can't end render pass on command buffer from a different frame"
        );

        self.device.cmd_end_render_pass(cmd);
    }

    /// # Panics
    /// If no frame is in progress.
    pub fn current_command_buffer(&self) -> vk::CommandBuffer {
        assert!(
            self.is_frame_started,
            "Cannot get command buffer when frame not in progress"
        );
        self.command_buffers.get(self.current_frame_index)
    }

    /// Frame-in-flight slot of the open frame
    ///
    /// # Panics
    /// If no frame is in progress.
    pub fn frame_index(&self) -> usize {
        assert!(
            self.is_frame_started,
            "Cannot get frame index when frame not in progress"
        );
        self.current_frame_index
    }

    pub fn is_frame_in_progress(&self) -> bool {
        self.is_frame_started
    }

    pub fn aspect_ratio(&self) -> f32 {
        self.swapchain.extent_aspect_ratio()
    }

    /// Render pass of the current swapchain. It stays compatible across
    /// recreations because the formats may not change.
    pub fn render_pass(&self) -> vk::RenderPass {
        self.swapchain.render_pass()
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.swapchain.extent()
    }

    pub fn image_count(&self) -> usize {
        self.swapchain.image_count()
    }

    pub fn swapchain_recreations(&self) -> usize {
        self.recreations
    }

    pub fn wait_idle(&self) -> Result<()> {
        self.device.wait_idle()
    }

    fn recreate_swapchain<W: FrameWindow>(&mut self, window: &mut W) -> Result<()> {
        let Some(extent) = wait_for_drawable_extent(&*self.device, window)? else {
            log::info!("Window closed while minimized, keeping the old swapchain");
            return Ok(());
        };

        self.device.wait_idle()?;

        let swapchain = D::create_swapchain(&self.device, extent, Some(&self.swapchain))?;
        let old_swapchain = std::mem::replace(&mut self.swapchain, swapchain);
        self.recreations += 1;

        if !old_swapchain.compare_formats(&self.swapchain) {
            return Err(GpuError::FormatMismatch {
                previous_image: old_swapchain.image_format(),
                previous_depth: old_swapchain.depth_format(),
                image: self.swapchain.image_format(),
                depth: self.swapchain.depth_format(),
            });
        }

        log::info!(
            "Recreated swapchain at {}x{} ({} so far)",
            extent.width,
            extent.height,
            self.recreations
        );
        Ok(())
    }
}

impl<D: GpuDevice> Drop for Renderer<D> {
    fn drop(&mut self) {
        // Nothing owned here may be destroyed while the GPU still uses it
        if let Err(e) = self.device.wait_idle() {
            log::error!("Failed to wait for device idle: {}", e);
        }
    }
}

/// Block on window events until both the window and the surface have a
/// non-zero drawable area.
///
/// Returns `None` if the window is closed while waiting.
fn wait_for_drawable_extent<D: GpuDevice, W: FrameWindow>(
    device: &D,
    window: &mut W,
) -> Result<Option<vk::Extent2D>> {
    loop {
        let window_extent = window.extent();
        if !is_zero(window_extent) {
            let extent = device.surface_extent(window_extent)?;
            if !is_zero(extent) {
                return Ok(Some(extent));
            }
            log::debug!("Surface reports no drawable area, waiting for events");
        } else {
            log::debug!("Window has no drawable area, waiting for events");
        }

        if window.should_close() {
            return Ok(None);
        }
        window.wait_events();
    }
}

fn is_zero(extent: vk::Extent2D) -> bool {
    extent.width == 0 || extent.height == 0
}
