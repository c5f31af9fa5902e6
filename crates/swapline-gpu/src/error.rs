//! GPU error types.

use ash::vk;
use thiserror::Error;

/// GPU-related errors.
#[derive(Error, Debug)]
pub enum GpuError {
    /// Vulkan error.
    #[error("Vulkan error: {0}")]
    Vulkan(#[from] vk::Result),

    /// No suitable GPU found.
    #[error("No suitable GPU found")]
    NoSuitableDevice,

    /// Required extension not supported.
    #[error("Required extension not supported: {0}")]
    ExtensionNotSupported(String),

    /// Memory allocation failed.
    #[error("Memory allocation failed: {0}")]
    AllocationFailed(String),

    /// Surface creation failed.
    #[error("Surface creation failed: {0}")]
    SurfaceCreation(String),

    /// Swapchain creation failed.
    #[error("Swapchain creation failed: {0}")]
    SwapchainCreation(String),

    /// Shader module creation failed.
    #[error("Shader module creation failed: {0}")]
    ShaderCompilation(String),

    /// Pipeline creation failed.
    #[error("Pipeline creation failed: {0}")]
    PipelineCreation(String),

    /// Vertex layout rejected.
    #[error("Invalid vertex layout: {0}")]
    VertexLayout(String),

    /// Invalid state.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Other error.
    #[error("{0}")]
    Other(String),
}

impl GpuError {
    /// Closest raw Vulkan code, for callers that speak `VkResult`.
    pub fn vk_result(&self) -> vk::Result {
        match self {
            Self::Vulkan(result) => *result,
            Self::AllocationFailed(_) => vk::Result::ERROR_OUT_OF_DEVICE_MEMORY,
            Self::ExtensionNotSupported(_) => vk::Result::ERROR_EXTENSION_NOT_PRESENT,
            Self::SurfaceCreation(_) => vk::Result::ERROR_INITIALIZATION_FAILED,
            _ => vk::Result::ERROR_UNKNOWN,
        }
    }
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, GpuError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vulkan_codes_pass_through() {
        let err = GpuError::from(vk::Result::ERROR_DEVICE_LOST);
        assert_eq!(err.vk_result(), vk::Result::ERROR_DEVICE_LOST);
        assert_eq!(
            GpuError::AllocationFailed("heap".to_string()).vk_result(),
            vk::Result::ERROR_OUT_OF_DEVICE_MEMORY
        );
        assert_eq!(
            GpuError::Other("x".to_string()).vk_result(),
            vk::Result::ERROR_UNKNOWN
        );
    }
}
