use ash::vk;

/// Window operations the frame loop depends on.
///
/// Implemented by [`crate::Window`]; tests substitute scripted windows.
pub trait WindowSystem {
    /// Current drawable size in pixels. Either dimension may be zero while minimized.
    fn current_extent(&self) -> vk::Extent2D;

    /// Whether the user asked to close the window.
    fn should_close(&self) -> bool;

    /// Process pending events without blocking.
    fn poll_events(&mut self);

    /// Block until at least one event arrives, then process it.
    fn wait_events(&mut self);

    /// Return whether a resize happened since the last call, clearing the flag.
    fn consume_resize_flag(&mut self) -> bool;
}
