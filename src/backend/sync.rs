// Synchronization primitives
//
// One FrameSync per frame in flight, plus the per-image fence bookkeeping
// that keeps two slots from rendering into the same swapchain image.

use super::{VulkanDevice, MAX_FRAMES_IN_FLIGHT};
use crate::error::Result;
use ash::vk;
use std::sync::Arc;

/// Frame synchronization - one per frame in flight
pub struct FrameSync {
    pub image_available: vk::Semaphore,
    pub render_finished: vk::Semaphore,
    pub in_flight_fence: vk::Fence,
    device: Arc<VulkanDevice>,
}

impl FrameSync {
    pub fn new(device: &Arc<VulkanDevice>) -> Result<Self> {
        let semaphore_info = vk::SemaphoreCreateInfo::default();
        // Signaled so the first wait on each slot returns immediately
        let fence_info = vk::FenceCreateInfo::default().flags(vk::FenceCreateFlags::SIGNALED);

        let mut sync = Self {
            image_available: vk::Semaphore::null(),
            render_finished: vk::Semaphore::null(),
            in_flight_fence: vk::Fence::null(),
            device: device.clone(),
        };

        unsafe {
            sync.image_available = device.device.create_semaphore(&semaphore_info, None)?;
            sync.render_finished = device.device.create_semaphore(&semaphore_info, None)?;
            sync.in_flight_fence = device.device.create_fence(&fence_info, None)?;
        }

        Ok(sync)
    }
}

impl Drop for FrameSync {
    fn drop(&mut self) {
        unsafe {
            self.device.device.destroy_semaphore(self.image_available, None);
            self.device.device.destroy_semaphore(self.render_finished, None);
            self.device.device.destroy_fence(self.in_flight_fence, None);
        }
    }
}

/// Tracks which frame slot is current and which fence last claimed each
/// swapchain image.
///
/// Generic over the fence type so the bookkeeping does not need a GPU.
#[derive(Debug, Clone)]
pub struct FrameSlots<F> {
    images_in_flight: Vec<Option<F>>,
    current_frame: usize,
}

impl<F: Copy> FrameSlots<F> {
    pub fn new(image_count: usize, start_frame: usize) -> Self {
        Self {
            images_in_flight: vec![None; image_count],
            current_frame: start_frame % MAX_FRAMES_IN_FLIGHT,
        }
    }

    pub fn current_frame(&self) -> usize {
        self.current_frame
    }

    /// Fence of the submission still using `image_index`, if any.
    pub fn fence_for_image(&self, image_index: u32) -> Option<F> {
        self.images_in_flight
            .get(image_index as usize)
            .copied()
            .flatten()
    }

    pub fn claim_image(&mut self, image_index: u32, fence: F) {
        if let Some(slot) = self.images_in_flight.get_mut(image_index as usize) {
            *slot = Some(fence);
        }
    }

    pub fn advance(&mut self) {
        self.current_frame = (self.current_frame + 1) % MAX_FRAMES_IN_FLIGHT;
    }
}
