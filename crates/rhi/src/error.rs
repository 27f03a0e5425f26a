//! RHI-specific error types.

use thiserror::Error;

/// RHI-specific error type.
#[derive(Error, Debug)]
pub enum RhiError {
    /// Vulkan API error
    #[error("Vulkan error: {0}")]
    VulkanError(#[from] ash::vk::Result),

    /// Failed to load Vulkan
    #[error("Failed to load Vulkan: {0}")]
    LoadingError(#[from] ash::LoadingError),

    /// GPU allocator error
    #[error("Allocator error: {0}")]
    AllocatorError(#[from] gpu_allocator::AllocationError),

    /// No suitable GPU found
    #[error("No suitable GPU found")]
    NoSuitableGpu,

    /// A shader file is missing or its bytecode could not become a module
    #[error("Shader compile error: {0}")]
    ShaderCompile(String),

    /// The graphics pipeline object could not be created
    #[error("Pipeline creation error: {0}")]
    PipelineCreation(String),

    /// The surface offers no formats or present modes
    #[error("Surface unavailable: {0}")]
    SurfaceUnavailable(String),

    /// Swapchain or one of its attachments could not be created
    #[error("Swapchain creation error: {0}")]
    SwapchainCreation(String),

    /// A GPU buffer could not be created or filled
    #[error("Buffer creation error: {0}")]
    BufferCreation(String),

    /// Geometry with fewer vertices than one triangle
    #[error("Invalid geometry: {count} vertices, at least 3 required")]
    InvalidGeometry { count: usize },

    /// Command buffer begin or end failed
    #[error("Command recording error: {0}")]
    Recording(String),

    /// Failure reported by the window system
    #[error("Platform error: {0}")]
    Platform(String),
}

/// Broad classification of an [`RhiError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Pipeline, swapchain or buffer build failure
    ResourceCreation,
    /// Vertex data that cannot form a triangle
    InvalidGeometry,
    /// Command buffer begin/end failure
    Recording,
    /// Everything else: loader, device, allocator or platform failures
    Other,
}

impl RhiError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RhiError::ShaderCompile(_)
            | RhiError::PipelineCreation(_)
            | RhiError::SurfaceUnavailable(_)
            | RhiError::SwapchainCreation(_)
            | RhiError::BufferCreation(_) => ErrorKind::ResourceCreation,
            RhiError::InvalidGeometry { .. } => ErrorKind::InvalidGeometry,
            RhiError::Recording(_) => ErrorKind::Recording,
            RhiError::VulkanError(_)
            | RhiError::LoadingError(_)
            | RhiError::AllocatorError(_)
            | RhiError::NoSuitableGpu
            | RhiError::Platform(_) => ErrorKind::Other,
        }
    }
}

/// Result type alias for RHI operations.
pub type RhiResult<T> = std::result::Result<T, RhiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk;

    #[test]
    fn test_resource_creation_kinds() {
        for err in [
            RhiError::ShaderCompile("x".into()),
            RhiError::PipelineCreation("x".into()),
            RhiError::SurfaceUnavailable("x".into()),
            RhiError::SwapchainCreation("x".into()),
            RhiError::BufferCreation("x".into()),
        ] {
            assert_eq!(err.kind(), ErrorKind::ResourceCreation, "{err}");
        }
    }

    #[test]
    fn test_other_kinds() {
        assert_eq!(
            RhiError::InvalidGeometry { count: 2 }.kind(),
            ErrorKind::InvalidGeometry
        );
        assert_eq!(RhiError::Recording("x".into()).kind(), ErrorKind::Recording);
        assert_eq!(
            RhiError::from(vk::Result::ERROR_DEVICE_LOST).kind(),
            ErrorKind::Other
        );
        assert_eq!(RhiError::NoSuitableGpu.kind(), ErrorKind::Other);
    }

    #[test]
    fn test_invalid_geometry_message() {
        let msg = RhiError::InvalidGeometry { count: 2 }.to_string();
        assert!(msg.contains("2 vertices"));
    }
}
