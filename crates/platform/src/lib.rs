//! Platform layer for trirender.
//!
//! - [`Window`]: a winit window driven by an application-owned pump loop
//! - [`Surface`]: RAII wrapper for the presentable Vulkan surface
//! - [`ResizeFlag`]: one-shot resize notification shared with event delivery
//! - [`WindowSystem`]: what the frame loop needs from a window

mod resize;
mod system;
mod window;

pub use resize::ResizeFlag;
pub use system::WindowSystem;
pub use window::{Surface, Window, get_required_extensions};
