// Error types - everything the GPU layer can fail with

use ash::vk;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the GPU-facing parts of the renderer.
#[derive(Error, Debug)]
pub enum GpuError {
    /// Vulkan error.
    #[error("Vulkan error: {0}")]
    Vulkan(#[from] vk::Result),

    /// The Vulkan library could not be loaded.
    #[error("Failed to load Vulkan: {0}")]
    Loading(String),

    /// No GPU can render and present to the window surface.
    #[error("No suitable GPU found")]
    NoSuitableDevice,

    #[error("Surface creation failed: {0}")]
    SurfaceCreation(String),

    #[error("Swapchain creation failed: {0}")]
    SwapchainCreation(String),

    /// A recreated swapchain came back with different image or depth formats.
    #[error(
        "Swap chain image (or depth) format has changed: {previous_image:?}/{previous_depth:?} -> {image:?}/{depth:?}"
    )]
    FormatMismatch {
        previous_image: vk::Format,
        previous_depth: vk::Format,
        image: vk::Format,
        depth: vk::Format,
    },

    /// A shader binary is missing, unreadable or not SPIR-V.
    #[error("Failed to load shader {}: {source}", path.display())]
    ShaderLoad {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Pipeline creation failed: {0}")]
    PipelineCreation(String),

    #[error("Memory allocation failed: {0}")]
    AllocationFailed(String),

    /// Mesh data that cannot be drawn.
    #[error("Invalid model data: {0}")]
    InvalidModel(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, GpuError>;
