//! Frame loop for trirender.
//!
//! - [`Geometry`] and [`GeometryBuffer`]: validated vertices and their GPU copy
//! - [`RenderBackend`] and [`FrameTarget`]: what the loop needs from the GPU
//! - [`VulkanBackend`]: the Vulkan implementation
//! - [`FrameOrchestrator`]: acquire, record, submit, present and recreate

pub mod backend;
pub mod geometry;
pub mod orchestrator;

pub use backend::{CLEAR_COLOR, FrameTarget, RenderBackend, VulkanBackend};
pub use geometry::{DrawCall, Geometry, GeometryBuffer, sierpinski};
pub use orchestrator::{FrameOrchestrator, FrameState, FrameStats};
