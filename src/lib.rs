// =============================================================================
// CUBE RENDERER - Minimal Vulkan rendering engine
// =============================================================================
//
// ARCHITECTURE OVERVIEW:
// ┌─────────────────────────────────────────────────────────────────┐
// │  App (window, config, scene, camera)                            │
// │    └── Renderer (frame lifecycle, swapchain recreation)         │
// │          ├── Swapchain (images, depth, render pass, sync)       │
// │          └── Command buffers (one per frame in flight)          │
// │    └── RenderSystem (pipeline + push constants per object)      │
// │    └── VulkanDevice (instance, surface, queues, allocator)      │
// └─────────────────────────────────────────────────────────────────┘
//
// FRAME FLOW:
// 1. Pump window events
// 2. Acquire swapchain image (waits on the frame slot's fence)
// 3. Record: begin render pass, draw every scene object, end render pass
// 4. Submit + present
// 5. Recreate the swapchain if it went stale or the window was resized
//
// =============================================================================

pub mod app;
pub mod backend;
pub mod camera;
pub mod config;
pub mod error;
pub mod model;
pub mod render_system;
pub mod renderer;
pub mod scene;
pub mod window;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{GpuError, Result};
