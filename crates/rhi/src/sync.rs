//! Synchronization primitives for Vulkan.
//!
//! - [`Semaphore`] orders GPU work: acquire before render, render before present.
//! - [`Fence`] lets the host wait for GPU completion.
//! - [`FrameSlot`] groups the per-in-flight-frame objects.
//! - [`ImageFences`] tracks which frame fence last used each swapchain image.

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::device::Device;
use crate::error::RhiResult;

/// Maximum number of frames the host may record ahead of the GPU.
pub const MAX_FRAMES_IN_FLIGHT: usize = 2;

/// Vulkan semaphore wrapper.
pub struct Semaphore {
    device: Arc<Device>,
    semaphore: vk::Semaphore,
}

impl Semaphore {
    /// Creates an unsignaled binary semaphore.
    pub fn new(device: Arc<Device>) -> RhiResult<Self> {
        let create_info = vk::SemaphoreCreateInfo::default();
        let semaphore = unsafe { device.handle().create_semaphore(&create_info, None)? };
        Ok(Self { device, semaphore })
    }

    #[inline]
    pub fn handle(&self) -> vk::Semaphore {
        self.semaphore
    }
}

impl Drop for Semaphore {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_semaphore(self.semaphore, None);
        }
    }
}

/// Vulkan fence wrapper.
pub struct Fence {
    device: Arc<Device>,
    fence: vk::Fence,
}

impl Fence {
    /// Creates a fence, optionally already signaled so the first wait returns at once.
    pub fn new(device: Arc<Device>, signaled: bool) -> RhiResult<Self> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };

        let create_info = vk::FenceCreateInfo::default().flags(flags);
        let fence = unsafe { device.handle().create_fence(&create_info, None)? };

        Ok(Self { device, fence })
    }

    #[inline]
    pub fn handle(&self) -> vk::Fence {
        self.fence
    }

    /// Blocks until the fence is signaled or `timeout` nanoseconds pass.
    pub fn wait(&self, timeout: u64) -> RhiResult<()> {
        wait_for_fence(&self.device, self.fence, timeout)
    }

    /// Returns the fence to the unsignaled state.
    ///
    /// The fence must not be pending on any queue.
    pub fn reset(&self) -> RhiResult<()> {
        let fences = [self.fence];
        unsafe { self.device.handle().reset_fences(&fences)? };
        Ok(())
    }
}

impl Drop for Fence {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_fence(self.fence, None);
        }
    }
}

/// Waits on a raw fence handle owned elsewhere.
pub(crate) fn wait_for_fence(device: &Device, fence: vk::Fence, timeout: u64) -> RhiResult<()> {
    let fences = [fence];
    unsafe { device.handle().wait_for_fences(&fences, true, timeout)? };
    Ok(())
}

/// Synchronization owned by one in-flight frame slot.
///
/// ```text
/// 1. wait in_flight            (slot's previous submission finished)
/// 2. acquire -> image_available
/// 3. reset in_flight, submit   (waits image_available, signals in_flight)
/// ```
pub struct FrameSlot {
    image_available: Semaphore,
    in_flight: Fence,
}

impl FrameSlot {
    /// The fence starts signaled so the first frame does not block.
    pub fn new(device: Arc<Device>) -> RhiResult<Self> {
        Ok(Self {
            image_available: Semaphore::new(device.clone())?,
            in_flight: Fence::new(device, true)?,
        })
    }

    #[inline]
    pub fn image_available(&self) -> &Semaphore {
        &self.image_available
    }

    #[inline]
    pub fn in_flight(&self) -> &Fence {
        &self.in_flight
    }
}

/// Creates [`MAX_FRAMES_IN_FLIGHT`] frame slots.
pub fn create_frame_slots(device: &Arc<Device>) -> RhiResult<Vec<FrameSlot>> {
    let slots = (0..MAX_FRAMES_IN_FLIGHT)
        .map(|_| FrameSlot::new(device.clone()))
        .collect::<RhiResult<Vec<_>>>()?;
    debug!("Created {} frame slots", slots.len());
    Ok(slots)
}

/// Index of the slot used after `current`.
#[inline]
pub fn next_frame_slot(current: usize) -> usize {
    (current + 1) % MAX_FRAMES_IN_FLIGHT
}

/// For each swapchain image, the frame fence of the last submission that
/// rendered to it.
///
/// Keeps a second frame slot from touching an image that is still being
/// rendered by the first.
#[derive(Debug, Clone)]
pub struct ImageFences {
    fences: Vec<vk::Fence>,
}

impl ImageFences {
    pub fn new(image_count: usize) -> Self {
        Self {
            fences: vec![vk::Fence::null(); image_count],
        }
    }

    /// Fence to wait on before reusing `image_index`, if one is recorded.
    pub fn pending(&self, image_index: usize) -> Option<vk::Fence> {
        self.fences
            .get(image_index)
            .copied()
            .filter(|fence| *fence != vk::Fence::null())
    }

    /// Record that `fence` now guards `image_index`.
    pub fn assign(&mut self, image_index: usize, fence: vk::Fence) {
        if let Some(slot) = self.fences.get_mut(image_index) {
            *slot = fence;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;

    #[test]
    fn test_frame_slot_cycles() {
        let mut slot = 0;
        let mut seen = Vec::new();
        for _ in 0..(MAX_FRAMES_IN_FLIGHT * 2) {
            seen.push(slot);
            slot = next_frame_slot(slot);
        }
        assert_eq!(seen, vec![0, 1, 0, 1]);
    }

    #[test]
    fn test_image_fences_start_empty() {
        let fences = ImageFences::new(3);
        assert_eq!(fences.fences.len(), 3);
        assert!((0..3).all(|i| fences.pending(i).is_none()));
    }

    #[test]
    fn test_image_fences_assign_and_replace() {
        let mut fences = ImageFences::new(3);
        let a = vk::Fence::from_raw(0xA);
        let b = vk::Fence::from_raw(0xB);

        fences.assign(1, a);
        assert_eq!(fences.pending(1), Some(a));
        assert_eq!(fences.pending(0), None);

        fences.assign(1, b);
        assert_eq!(fences.pending(1), Some(b));
    }

    #[test]
    fn test_image_fences_out_of_range_is_ignored() {
        let mut fences = ImageFences::new(2);
        fences.assign(5, vk::Fence::from_raw(1));
        assert_eq!(fences.pending(5), None);
        assert_eq!(fences.fences, vec![vk::Fence::null(); 2]);
    }

    #[test]
    fn test_sync_types_are_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Semaphore>();
        assert_send_sync::<Fence>();
        assert_send_sync::<FrameSlot>();
    }
}
