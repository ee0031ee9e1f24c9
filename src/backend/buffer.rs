// GPU buffers and images backed by gpu-allocator
//
// Both types hold an Arc to the device and free their allocation on drop.

use super::VulkanDevice;
use crate::error::{GpuError, Result};
use ash::vk;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use gpu_allocator::MemoryLocation;
use std::sync::Arc;

/// A buffer with its memory allocation
pub struct GpuBuffer {
    buffer: vk::Buffer,
    allocation: Option<Allocation>,
    size: vk::DeviceSize,
    device: Arc<VulkanDevice>,
}

impl GpuBuffer {
    pub fn new(
        device: &Arc<VulkanDevice>,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        location: MemoryLocation,
        name: &str,
    ) -> Result<Self> {
        let buffer_info = vk::BufferCreateInfo::default()
            .size(size)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer = unsafe { device.device.create_buffer(&buffer_info, None) }?;

        // From here on Drop cleans up whatever was created
        let mut gpu_buffer = Self {
            buffer,
            allocation: None,
            size,
            device: device.clone(),
        };

        let requirements = unsafe { device.device.get_buffer_memory_requirements(buffer) };
        let allocation = device
            .allocator()
            .lock()
            .allocate(&AllocationCreateDesc {
                name,
                requirements,
                location,
                linear: true,
                allocation_scheme: AllocationScheme::GpuAllocatorManaged,
            })
            .map_err(|e| GpuError::AllocationFailed(e.to_string()))?;

        unsafe {
            device
                .device
                .bind_buffer_memory(buffer, allocation.memory(), allocation.offset())
        }?;
        gpu_buffer.allocation = Some(allocation);

        Ok(gpu_buffer)
    }

    /// Create a host-visible buffer holding `data`
    pub fn with_data<T: bytemuck::Pod>(
        device: &Arc<VulkanDevice>,
        usage: vk::BufferUsageFlags,
        data: &[T],
        name: &str,
    ) -> Result<Self> {
        let size = std::mem::size_of_val(data) as vk::DeviceSize;
        let mut buffer = Self::new(device, size, usage, MemoryLocation::CpuToGpu, name)?;
        buffer.write(data)?;
        Ok(buffer)
    }

    /// Copy `data` to the start of the mapped buffer
    pub fn write<T: bytemuck::Pod>(&mut self, data: &[T]) -> Result<()> {
        let bytes: &[u8] = bytemuck::cast_slice(data);
        if bytes.len() as vk::DeviceSize > self.size {
            return Err(GpuError::InvalidState(format!(
                "write of {} bytes into a {} byte buffer",
                bytes.len(),
                self.size
            )));
        }

        let mapped = self
            .allocation
            .as_mut()
            .and_then(|allocation| allocation.mapped_slice_mut())
            .ok_or_else(|| GpuError::InvalidState("buffer is not host visible".to_string()))?;
        mapped[..bytes.len()].copy_from_slice(bytes);

        Ok(())
    }

    pub fn handle(&self) -> vk::Buffer {
        self.buffer
    }

    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }
}

impl Drop for GpuBuffer {
    fn drop(&mut self) {
        if let Some(allocation) = self.allocation.take() {
            if let Err(e) = self.device.allocator().lock().free(allocation) {
                log::error!("Failed to free buffer memory: {}", e);
            }
        }
        unsafe { self.device.device.destroy_buffer(self.buffer, None) };
    }
}

/// An image with its memory allocation and a default view
pub struct GpuImage {
    pub image: vk::Image,
    pub view: vk::ImageView,
    pub format: vk::Format,
    allocation: Option<Allocation>,
    device: Arc<VulkanDevice>,
}

impl GpuImage {
    /// Create a device-local depth attachment
    pub fn depth(
        device: &Arc<VulkanDevice>,
        extent: vk::Extent2D,
        format: vk::Format,
        name: &str,
    ) -> Result<Self> {
        let image_info = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .extent(vk::Extent3D {
                width: extent.width,
                height: extent.height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .format(format)
            .tiling(vk::ImageTiling::OPTIMAL)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .usage(vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT)
            .samples(vk::SampleCountFlags::TYPE_1)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let image = unsafe { device.device.create_image(&image_info, None) }?;

        let mut gpu_image = Self {
            image,
            view: vk::ImageView::null(),
            format,
            allocation: None,
            device: device.clone(),
        };

        let requirements = unsafe { device.device.get_image_memory_requirements(image) };
        let allocation = device
            .allocator()
            .lock()
            .allocate(&AllocationCreateDesc {
                name,
                requirements,
                location: MemoryLocation::GpuOnly,
                linear: false,
                allocation_scheme: AllocationScheme::GpuAllocatorManaged,
            })
            .map_err(|e| GpuError::AllocationFailed(e.to_string()))?;

        unsafe {
            device
                .device
                .bind_image_memory(image, allocation.memory(), allocation.offset())
        }?;
        gpu_image.allocation = Some(allocation);

        let view_info = vk::ImageViewCreateInfo::default()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(format)
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: vk::ImageAspectFlags::DEPTH,
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: 1,
            });

        gpu_image.view = unsafe { device.device.create_image_view(&view_info, None) }?;

        Ok(gpu_image)
    }
}

impl Drop for GpuImage {
    fn drop(&mut self) {
        unsafe {
            self.device.device.destroy_image_view(self.view, None);
        }
        if let Some(allocation) = self.allocation.take() {
            if let Err(e) = self.device.allocator().lock().free(allocation) {
                log::error!("Failed to free image memory: {}", e);
            }
        }
        unsafe { self.device.device.destroy_image(self.image, None) };
    }
}
