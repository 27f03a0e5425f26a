//! Vulkan abstraction layer (Render Hardware Interface).
//!
//! Thin RAII wrappers over `ash` for everything the frame loop touches:
//! - Instance, physical device selection and logical device
//! - Swapchain with its render pass, depth buffers and framebuffers
//! - Command pools and command buffer recording
//! - Graphics pipeline, shader loading and vertex buffers
//! - Frame synchronization

mod error;

pub mod buffer;
pub mod command;
pub mod depth;
pub mod device;
pub mod instance;
pub mod physical_device;
pub mod pipeline;
pub mod render_pass;
pub mod shader;
pub mod swapchain;
pub mod sync;
pub mod vertex;

pub use error::{ErrorKind, RhiError, RhiResult};
pub use swapchain::{SurfaceStatus, SwapChain};

// Re-export ash types that users might need
pub use ash::vk;
