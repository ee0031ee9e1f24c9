// Swapchain - Window presentation
//
// Owns the presentable images together with everything that is sized or
// formatted after them: image views, depth attachments, the render pass,
// framebuffers and the per-frame synchronization objects.

use super::buffer::GpuImage;
use super::sync::{FrameSlots, FrameSync};
use super::{PresentationSurface, SwapchainStatus, VulkanDevice, MAX_FRAMES_IN_FLIGHT};
use crate::error::{GpuError, Result};
use ash::vk;
use std::sync::Arc;

/// What the window surface supports on the selected GPU
pub struct SurfaceSupport {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SurfaceSupport {
    pub fn query(
        surface_loader: &ash::khr::surface::Instance,
        physical_device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
    ) -> Result<Self> {
        unsafe {
            Ok(Self {
                capabilities: surface_loader
                    .get_physical_device_surface_capabilities(physical_device, surface)?,
                formats: surface_loader.get_physical_device_surface_formats(physical_device, surface)?,
                present_modes: surface_loader
                    .get_physical_device_surface_present_modes(physical_device, surface)?,
            })
        }
    }
}

/// Prefer SRGB, otherwise take whatever the surface lists first
pub fn select_surface_format(formats: &[vk::SurfaceFormatKHR]) -> Option<vk::SurfaceFormatKHR> {
    formats
        .iter()
        .find(|f| {
            f.format == vk::Format::B8G8R8A8_SRGB
                && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
        })
        .or_else(|| formats.first())
        .copied()
}

/// Use the preferred mode when supported. FIFO is always available.
pub fn select_present_mode(
    available: &[vk::PresentModeKHR],
    preferred: vk::PresentModeKHR,
) -> vk::PresentModeKHR {
    if available.contains(&preferred) {
        preferred
    } else {
        vk::PresentModeKHR::FIFO
    }
}

pub fn choose_extent(
    capabilities: &vk::SurfaceCapabilitiesKHR,
    requested: vk::Extent2D,
) -> vk::Extent2D {
    // u32::MAX means the surface lets the swapchain pick
    if capabilities.current_extent.width != u32::MAX {
        return capabilities.current_extent;
    }

    vk::Extent2D {
        width: requested.width.clamp(
            capabilities.min_image_extent.width,
            capabilities.max_image_extent.width,
        ),
        height: requested.height.clamp(
            capabilities.min_image_extent.height,
            capabilities.max_image_extent.height,
        ),
    }
}

/// One more than the minimum, capped by the maximum (0 = no maximum)
pub fn choose_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let image_count = capabilities.min_image_count + 1;
    if capabilities.max_image_count > 0 && image_count > capabilities.max_image_count {
        capabilities.max_image_count
    } else {
        image_count
    }
}

/// Create the render pass: one color attachment presented at the end, one
/// depth attachment that is cleared and discarded
pub fn create_render_pass(
    device: &VulkanDevice,
    color_format: vk::Format,
    depth_format: vk::Format,
) -> Result<vk::RenderPass> {
    let color_attachment = vk::AttachmentDescription::default()
        .format(color_format)
        .samples(vk::SampleCountFlags::TYPE_1)
        .load_op(vk::AttachmentLoadOp::CLEAR)
        .store_op(vk::AttachmentStoreOp::STORE)
        .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
        .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
        .initial_layout(vk::ImageLayout::UNDEFINED)
        .final_layout(vk::ImageLayout::PRESENT_SRC_KHR);

    let depth_attachment = vk::AttachmentDescription::default()
        .format(depth_format)
        .samples(vk::SampleCountFlags::TYPE_1)
        .load_op(vk::AttachmentLoadOp::CLEAR)
        .store_op(vk::AttachmentStoreOp::DONT_CARE)
        .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
        .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
        .initial_layout(vk::ImageLayout::UNDEFINED)
        .final_layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL);

    let color_attachment_refs = [vk::AttachmentReference::default()
        .attachment(0)
        .layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)];

    let depth_attachment_ref = vk::AttachmentReference::default()
        .attachment(1)
        .layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL);

    let subpasses = [vk::SubpassDescription::default()
        .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
        .color_attachments(&color_attachment_refs)
        .depth_stencil_attachment(&depth_attachment_ref)];

    let stages = vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
        | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS;
    let dependencies = [vk::SubpassDependency::default()
        .src_subpass(vk::SUBPASS_EXTERNAL)
        .dst_subpass(0)
        .src_stage_mask(stages)
        .src_access_mask(vk::AccessFlags::empty())
        .dst_stage_mask(stages)
        .dst_access_mask(
            vk::AccessFlags::COLOR_ATTACHMENT_WRITE
                | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
        )];

    let attachments = [color_attachment, depth_attachment];
    let render_pass_info = vk::RenderPassCreateInfo::default()
        .attachments(&attachments)
        .subpasses(&subpasses)
        .dependencies(&dependencies);

    unsafe { device.device.create_render_pass(&render_pass_info, None) }
        .map_err(|e| GpuError::SwapchainCreation(format!("render pass: {e}")))
}

/// Vulkan swapchain and its per-image resources
///
/// Handles are destroyed in `Drop`; depth images and sync objects clean up
/// after themselves once the handles are gone.
pub struct Swapchain {
    frame_sync: Vec<FrameSync>,
    depth_images: Vec<GpuImage>,
    framebuffers: Vec<vk::Framebuffer>,
    render_pass: vk::RenderPass,
    image_views: Vec<vk::ImageView>,
    images: Vec<vk::Image>,
    swapchain: vk::SwapchainKHR,
    slots: FrameSlots<vk::Fence>,
    image_format: vk::Format,
    depth_format: vk::Format,
    extent: vk::Extent2D,
    device: Arc<VulkanDevice>,
}

impl Swapchain {
    /// Build a swapchain for `extent`, retiring `previous` if given
    pub fn new(
        device: Arc<VulkanDevice>,
        extent: vk::Extent2D,
        previous: Option<&Swapchain>,
    ) -> Result<Self> {
        let support = device.surface_support()?;

        let surface_format = select_surface_format(&support.formats).ok_or_else(|| {
            GpuError::SwapchainCreation("surface reports no formats".to_string())
        })?;
        let present_mode =
            select_present_mode(&support.present_modes, device.preferred_present_mode);
        let extent = choose_extent(&support.capabilities, extent);
        if extent.width == 0 || extent.height == 0 {
            return Err(GpuError::SwapchainCreation(
                "surface has no drawable area".to_string(),
            ));
        }
        let image_count = choose_image_count(&support.capabilities);

        let families = device.queue_families;
        let family_indices = [families.graphics, families.present];

        let create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(device.surface)
            .min_image_count(image_count)
            .image_format(surface_format.format)
            .image_color_space(surface_format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .pre_transform(support.capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true)
            .old_swapchain(previous.map_or(vk::SwapchainKHR::null(), |p| p.swapchain));

        let create_info = if families.graphics != families.present {
            create_info
                .image_sharing_mode(vk::SharingMode::CONCURRENT)
                .queue_family_indices(&family_indices)
        } else {
            create_info.image_sharing_mode(vk::SharingMode::EXCLUSIVE)
        };

        let handle = unsafe { device.swapchain_loader.create_swapchain(&create_info, None) }
            .map_err(|e| GpuError::SwapchainCreation(e.to_string()))?;

        // Continue the previous frame cursor so slots stay in step with the renderer
        let start_frame = previous.map_or(0, |p| p.slots.current_frame());

        // Partially built resources are released by Drop if a step fails
        let mut swapchain = Self {
            frame_sync: Vec::new(),
            depth_images: Vec::new(),
            framebuffers: Vec::new(),
            render_pass: vk::RenderPass::null(),
            image_views: Vec::new(),
            images: Vec::new(),
            swapchain: handle,
            slots: FrameSlots::new(0, start_frame),
            image_format: surface_format.format,
            depth_format: device.depth_format,
            extent,
            device: device.clone(),
        };

        swapchain.images = unsafe { device.swapchain_loader.get_swapchain_images(handle) }?;
        swapchain.create_image_views()?;
        swapchain.create_depth_resources()?;
        swapchain.render_pass =
            create_render_pass(&device, swapchain.image_format, swapchain.depth_format)?;
        swapchain.create_framebuffers()?;
        swapchain.frame_sync = (0..MAX_FRAMES_IN_FLIGHT)
            .map(|_| FrameSync::new(&device))
            .collect::<Result<Vec<_>>>()?;
        swapchain.slots = FrameSlots::new(swapchain.images.len(), start_frame);

        log::info!(
            "Created swapchain: {}x{}, {} images, {:?}, {:?}",
            extent.width,
            extent.height,
            swapchain.images.len(),
            swapchain.image_format,
            present_mode
        );

        Ok(swapchain)
    }

    fn create_image_views(&mut self) -> Result<()> {
        for &image in &self.images {
            let create_info = vk::ImageViewCreateInfo::default()
                .image(image)
                .view_type(vk::ImageViewType::TYPE_2D)
                .format(self.image_format)
                .components(vk::ComponentMapping::default())
                .subresource_range(vk::ImageSubresourceRange {
                    aspect_mask: vk::ImageAspectFlags::COLOR,
                    base_mip_level: 0,
                    level_count: 1,
                    base_array_layer: 0,
                    layer_count: 1,
                });

            let view = unsafe { self.device.device.create_image_view(&create_info, None) }?;
            self.image_views.push(view);
        }
        Ok(())
    }

    fn create_depth_resources(&mut self) -> Result<()> {
        for index in 0..self.images.len() {
            let depth = GpuImage::depth(
                &self.device,
                self.extent,
                self.depth_format,
                &format!("swapchain depth {index}"),
            )?;
            self.depth_images.push(depth);
        }
        Ok(())
    }

    fn create_framebuffers(&mut self) -> Result<()> {
        for (&view, depth) in self.image_views.iter().zip(&self.depth_images) {
            let attachments = [view, depth.view];
            let framebuffer_info = vk::FramebufferCreateInfo::default()
                .render_pass(self.render_pass)
                .attachments(&attachments)
                .width(self.extent.width)
                .height(self.extent.height)
                .layers(1);

            let framebuffer =
                unsafe { self.device.device.create_framebuffer(&framebuffer_info, None) }?;
            self.framebuffers.push(framebuffer);
        }
        Ok(())
    }
}

impl PresentationSurface for Swapchain {
    fn acquire_next_image(&mut self) -> Result<(u32, SwapchainStatus)> {
        let sync = &self.frame_sync[self.slots.current_frame()];

        unsafe {
            self.device
                .device
                .wait_for_fences(&[sync.in_flight_fence], true, u64::MAX)
        }?;

        let result = unsafe {
            self.device.swapchain_loader.acquire_next_image(
                self.swapchain,
                u64::MAX,
                sync.image_available,
                vk::Fence::null(),
            )
        };

        match result {
            Ok((index, false)) => Ok((index, SwapchainStatus::Optimal)),
            Ok((index, true)) => Ok((index, SwapchainStatus::Suboptimal)),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok((0, SwapchainStatus::OutOfDate)),
            Err(e) => Err(e.into()),
        }
    }

    fn submit_command_buffer(
        &mut self,
        cmd: vk::CommandBuffer,
        image_index: u32,
    ) -> Result<SwapchainStatus> {
        let frame = self.slots.current_frame();
        let sync = &self.frame_sync[frame];
        let device = &self.device;

        // Another slot may still be rendering into this image
        if let Some(fence) = self.slots.fence_for_image(image_index) {
            unsafe { device.device.wait_for_fences(&[fence], true, u64::MAX) }?;
        }
        self.slots.claim_image(image_index, sync.in_flight_fence);

        let wait_semaphores = [sync.image_available];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let signal_semaphores = [sync.render_finished];
        let command_buffers = [cmd];

        let submit_info = vk::SubmitInfo::default()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        unsafe {
            device.device.reset_fences(&[sync.in_flight_fence])?;
            device.device.queue_submit(
                device.graphics_queue,
                std::slice::from_ref(&submit_info),
                sync.in_flight_fence,
            )?;
        }

        let swapchains = [self.swapchain];
        let image_indices = [image_index];
        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&signal_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        let result = unsafe {
            device
                .swapchain_loader
                .queue_present(device.present_queue, &present_info)
        };

        self.slots.advance();

        match result {
            Ok(false) => Ok(SwapchainStatus::Optimal),
            Ok(true) => Ok(SwapchainStatus::Suboptimal),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(SwapchainStatus::OutOfDate),
            Err(e) => Err(e.into()),
        }
    }

    fn render_pass(&self) -> vk::RenderPass {
        self.render_pass
    }

    fn framebuffer(&self, image_index: usize) -> vk::Framebuffer {
        self.framebuffers[image_index]
    }

    fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    fn image_count(&self) -> usize {
        self.images.len()
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

impl Drop for Swapchain {
    fn drop(&mut self) {
        unsafe {
            for &framebuffer in &self.framebuffers {
                self.device.device.destroy_framebuffer(framebuffer, None);
            }
            self.device.device.destroy_render_pass(self.render_pass, None);
            for &view in &self.image_views {
                self.device.device.destroy_image_view(view, None);
            }
            self.device
                .swapchain_loader
                .destroy_swapchain(self.swapchain, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn surface_format(format: vk::Format, color_space: vk::ColorSpaceKHR) -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR { format, color_space }
    }

    fn capabilities(current: (u32, u32), min: (u32, u32), max: (u32, u32)) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D { width: current.0, height: current.1 },
            min_image_extent: vk::Extent2D { width: min.0, height: min.1 },
            max_image_extent: vk::Extent2D { width: max.0, height: max.1 },
            ..Default::default()
        }
    }

    #[test]
    fn test_prefers_srgb_surface_format() {
        let formats = [
            surface_format(vk::Format::B8G8R8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            surface_format(vk::Format::B8G8R8A8_SRGB, vk::ColorSpaceKHR::SRGB_NONLINEAR),
        ];
        let chosen = select_surface_format(&formats).unwrap();
        assert_eq!(chosen.format, vk::Format::B8G8R8A8_SRGB);
    }

    #[test]
    fn test_falls_back_to_first_surface_format() {
        let formats = [
            surface_format(vk::Format::R8G8B8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            surface_format(vk::Format::B8G8R8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
        ];
        let chosen = select_surface_format(&formats).unwrap();
        assert_eq!(chosen.format, vk::Format::R8G8B8A8_UNORM);
        assert!(select_surface_format(&[]).is_none());
    }

    #[test]
    fn test_present_mode_preference() {
        let available = [vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX];
        assert_eq!(
            select_present_mode(&available, vk::PresentModeKHR::MAILBOX),
            vk::PresentModeKHR::MAILBOX
        );
        assert_eq!(
            select_present_mode(&available, vk::PresentModeKHR::IMMEDIATE),
            vk::PresentModeKHR::FIFO
        );
    }

    #[test]
    fn test_extent_uses_surface_extent_when_fixed() {
        let caps = capabilities((1024, 768), (1, 1), (4096, 4096));
        let extent = choose_extent(&caps, vk::Extent2D { width: 800, height: 600 });
        assert_eq!((extent.width, extent.height), (1024, 768));
    }

    #[test]
    fn test_extent_clamps_requested_size() {
        let caps = capabilities((u32::MAX, u32::MAX), (100, 100), (1920, 1080));
        let extent = choose_extent(&caps, vk::Extent2D { width: 4000, height: 50 });
        assert_eq!((extent.width, extent.height), (1920, 100));
    }

    #[test]
    fn test_image_count_respects_maximum() {
        let mut caps = vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 0,
            ..Default::default()
        };
        assert_eq!(choose_image_count(&caps), 3);

        caps.max_image_count = 2;
        assert_eq!(choose_image_count(&caps), 2);
    }
}
