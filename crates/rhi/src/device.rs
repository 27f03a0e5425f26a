//! Logical device, its two queues and the memory allocator.

use std::ffi::{CStr, c_char};
use std::mem::ManuallyDrop;
use std::sync::{Arc, Mutex};

use ash::vk;
use gpu_allocator::vulkan::{Allocator, AllocatorCreateDesc};
use tracing::{debug, error, info};

use crate::error::{RhiError, RhiResult};
use crate::instance::Instance;
use crate::physical_device::{PhysicalDeviceInfo, QueueFamilyIndices};

const SWAPCHAIN_EXTENSIONS: [&CStr; 1] = [ash::khr::swapchain::NAME];

const QUEUE_PRIORITY: [f32; 1] = [1.0];

/// A queue together with the family it was taken from.
#[derive(Debug, Clone, Copy)]
pub struct Queue {
    pub handle: vk::Queue,
    pub family: u32,
}

/// The logical device, shared through `Arc` by everything that owns a
/// device-level handle.
pub struct Device {
    device: ash::Device,
    physical_device: vk::PhysicalDevice,
    allocator: ManuallyDrop<Mutex<Allocator>>,
    graphics: Queue,
    present: Queue,
    queue_families: QueueFamilyIndices,
}

impl Device {
    pub fn new(instance: &Instance, gpu: &PhysicalDeviceInfo) -> RhiResult<Arc<Self>> {
        let families = gpu.queue_families;
        let (Some(graphics_family), Some(present_family)) =
            (families.graphics_family, families.present_family)
        else {
            return Err(RhiError::NoSuitableGpu);
        };

        let unique = families.unique_families();
        let queue_infos = queue_create_infos(&unique);
        let extensions: Vec<*const c_char> =
            SWAPCHAIN_EXTENSIONS.iter().map(|name| name.as_ptr()).collect();
        let features = vk::PhysicalDeviceFeatures::default();

        let device = unsafe {
            instance.handle().create_device(
                gpu.device,
                &vk::DeviceCreateInfo::default()
                    .queue_create_infos(&queue_infos)
                    .enabled_extension_names(&extensions)
                    .enabled_features(&features),
                None,
            )?
        };

        let graphics = Queue {
            handle: unsafe { device.get_device_queue(graphics_family, 0) },
            family: graphics_family,
        };
        let present = Queue {
            handle: unsafe { device.get_device_queue(present_family, 0) },
            family: present_family,
        };
        debug!(
            "Device queues: graphics family {}, present family {} ({} distinct)",
            graphics.family,
            present.family,
            unique.len()
        );

        let allocator = match Allocator::new(&AllocatorCreateDesc {
            instance: instance.handle().clone(),
            device: device.clone(),
            physical_device: gpu.device,
            debug_settings: Default::default(),
            buffer_device_address: false,
            allocation_sizes: Default::default(),
        }) {
            Ok(allocator) => allocator,
            Err(e) => {
                unsafe { device.destroy_device(None) };
                return Err(e.into());
            }
        };

        info!("Logical device ready on {}", gpu.device_name());

        Ok(Arc::new(Self {
            device,
            physical_device: gpu.device,
            allocator: ManuallyDrop::new(Mutex::new(allocator)),
            graphics,
            present,
            queue_families: families,
        }))
    }

    #[inline]
    pub fn handle(&self) -> &ash::Device {
        &self.device
    }

    #[inline]
    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.physical_device
    }

    /// Family index command pools for the graphics queue must use.
    #[inline]
    pub fn graphics_family(&self) -> u32 {
        self.graphics.family
    }

    #[inline]
    pub fn present_queue(&self) -> vk::Queue {
        self.present.handle
    }

    #[inline]
    pub fn queue_families(&self) -> &QueueFamilyIndices {
        &self.queue_families
    }

    #[inline]
    pub fn allocator(&self) -> &Mutex<Allocator> {
        &self.allocator
    }

    pub fn wait_idle(&self) -> RhiResult<()> {
        unsafe { self.device.device_wait_idle() }.map_err(RhiError::from)
    }

    /// # Safety
    ///
    /// Every command buffer in `submits` must be fully recorded and `fence`
    /// must be unsignaled.
    pub unsafe fn submit_graphics(
        &self,
        submits: &[vk::SubmitInfo<'_>],
        fence: vk::Fence,
    ) -> RhiResult<()> {
        unsafe { self.device.queue_submit(self.graphics.handle, submits, fence) }
            .map_err(RhiError::from)
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        if let Err(e) = self.wait_idle() {
            error!("Device not idle at teardown: {}", e);
        }
        unsafe {
            // Memory blocks are freed through the device handle.
            ManuallyDrop::drop(&mut self.allocator);
            self.device.destroy_device(None);
        }
        info!("Logical device destroyed");
    }
}

// SAFETY: the remaining fields are plain handles and the allocator is
// guarded by a Mutex.
unsafe impl Send for Device {}
unsafe impl Sync for Device {}

/// One queue of priority 1.0 per distinct family.
fn queue_create_infos(families: &[u32]) -> Vec<vk::DeviceQueueCreateInfo<'static>> {
    families
        .iter()
        .map(|&family| {
            vk::DeviceQueueCreateInfo::default()
                .queue_family_index(family)
                .queue_priorities(&QUEUE_PRIORITY)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_one_queue_info_per_family() {
        let infos = queue_create_infos(&[0, 2]);
        assert_eq!(infos.len(), 2);
        assert_eq!(infos[0].queue_family_index, 0);
        assert_eq!(infos[1].queue_family_index, 2);
        assert!(infos.iter().all(|info| info.queue_count == 1));
    }

    #[test]
    fn test_only_swapchain_extension_requested() {
        assert_eq!(SWAPCHAIN_EXTENSIONS, [ash::khr::swapchain::NAME]);
    }

    #[test]
    fn test_device_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Device>();
    }
}
