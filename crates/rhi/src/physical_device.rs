//! Physical device (GPU) selection.
//!
//! A device qualifies when it has a graphics queue family, a family that
//! can present to the window surface, the swapchain extension, and at least
//! one surface format and present mode. Among qualifying devices discrete
//! GPUs win.

use ash::vk;
use tracing::{debug, info, warn};

use crate::error::{RhiError, RhiResult};
use crate::swapchain::SurfaceSupport;

/// Queue family indices for graphics and presentation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QueueFamilyIndices {
    pub graphics_family: Option<u32>,
    pub present_family: Option<u32>,
}

impl QueueFamilyIndices {
    /// Both graphics and present families were found.
    #[inline]
    pub fn is_complete(&self) -> bool {
        self.graphics_family.is_some() && self.present_family.is_some()
    }

    /// Distinct family indices, graphics first.
    pub fn unique_families(&self) -> Vec<u32> {
        let mut families = Vec::with_capacity(2);
        if let Some(graphics) = self.graphics_family {
            families.push(graphics);
        }
        if let Some(present) = self.present_family
            && !families.contains(&present)
        {
            families.push(present);
        }
        families
    }
}

/// A GPU that can drive the window surface.
#[derive(Clone)]
pub struct PhysicalDeviceInfo {
    pub device: vk::PhysicalDevice,
    pub properties: vk::PhysicalDeviceProperties,
    pub queue_families: QueueFamilyIndices,
}

impl PhysicalDeviceInfo {
    pub fn device_name(&self) -> &str {
        self.properties
            .device_name_as_c_str()
            .ok()
            .and_then(|name| name.to_str().ok())
            .unwrap_or("<unnamed>")
    }

    pub fn device_type_name(&self) -> &'static str {
        device_rank(self.properties.device_type).1
    }
}

/// Picks the highest ranked GPU that can present to `surface`.
///
/// # Errors
///
/// [`RhiError::NoSuitableGpu`] if none qualifies.
pub fn select_physical_device(
    instance: &ash::Instance,
    surface: vk::SurfaceKHR,
    surface_loader: &ash::khr::surface::Instance,
) -> RhiResult<PhysicalDeviceInfo> {
    let candidates = unsafe { instance.enumerate_physical_devices()? };
    debug!("{} physical device(s) enumerated", candidates.len());

    let best = candidates
        .into_iter()
        .filter_map(|device| inspect(instance, device, surface, surface_loader))
        .max_by_key(|gpu| device_rank(gpu.properties.device_type).0)
        .ok_or_else(|| {
            warn!("No GPU offers graphics, presentation and a usable surface");
            RhiError::NoSuitableGpu
        })?;

    info!("Using GPU '{}' ({})", best.device_name(), best.device_type_name());
    Ok(best)
}

fn inspect(
    instance: &ash::Instance,
    device: vk::PhysicalDevice,
    surface: vk::SurfaceKHR,
    surface_loader: &ash::khr::surface::Instance,
) -> Option<PhysicalDeviceInfo> {
    let properties = unsafe { instance.get_physical_device_properties(device) };
    let gpu = PhysicalDeviceInfo {
        device,
        properties,
        queue_families: QueueFamilyIndices::default(),
    };

    let families = unsafe { instance.get_physical_device_queue_family_properties(device) };
    let queue_families = pick_queue_families(&families, |index| unsafe {
        surface_loader
            .get_physical_device_surface_support(device, index, surface)
            .unwrap_or(false)
    });

    let rejection = if !queue_families.is_complete() {
        Some("no graphics or present queue family")
    } else if !supports_swapchain(instance, device) {
        Some("VK_KHR_swapchain missing")
    } else if !SurfaceSupport::query(device, surface, surface_loader)
        .is_ok_and(|support| support.is_adequate())
    {
        Some("surface offers no format or present mode")
    } else {
        None
    };

    if let Some(reason) = rejection {
        debug!("Skipping GPU '{}': {}", gpu.device_name(), reason);
        return None;
    }

    Some(PhysicalDeviceInfo {
        queue_families,
        ..gpu
    })
}

fn supports_swapchain(instance: &ash::Instance, device: vk::PhysicalDevice) -> bool {
    let Ok(extensions) = (unsafe { instance.enumerate_device_extension_properties(device) }) else {
        return false;
    };
    extensions.iter().any(|ext| {
        ext.extension_name_as_c_str()
            .is_ok_and(|name| name == ash::khr::swapchain::NAME)
    })
}

/// Finds graphics and present families.
///
/// A single family that does both is preferred over a split pair.
fn pick_queue_families(
    families: &[vk::QueueFamilyProperties],
    supports_present: impl Fn(u32) -> bool,
) -> QueueFamilyIndices {
    let mut indices = QueueFamilyIndices::default();

    for (i, family) in families.iter().enumerate() {
        let i = i as u32;
        if family.queue_count == 0 {
            continue;
        }

        let has_graphics = family.queue_flags.contains(vk::QueueFlags::GRAPHICS);
        let has_present = supports_present(i);

        if has_graphics && has_present {
            return QueueFamilyIndices {
                graphics_family: Some(i),
                present_family: Some(i),
            };
        }
        if has_graphics && indices.graphics_family.is_none() {
            indices.graphics_family = Some(i);
        }
        if has_present && indices.present_family.is_none() {
            indices.present_family = Some(i);
        }
    }

    indices
}

/// Preference order and display name of a device type.
fn device_rank(device_type: vk::PhysicalDeviceType) -> (u8, &'static str) {
    match device_type {
        vk::PhysicalDeviceType::DISCRETE_GPU => (4, "discrete"),
        vk::PhysicalDeviceType::INTEGRATED_GPU => (3, "integrated"),
        vk::PhysicalDeviceType::VIRTUAL_GPU => (2, "virtual"),
        vk::PhysicalDeviceType::CPU => (1, "cpu"),
        _ => (0, "other"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn family(flags: vk::QueueFlags) -> vk::QueueFamilyProperties {
        vk::QueueFamilyProperties {
            queue_flags: flags,
            queue_count: 1,
            ..Default::default()
        }
    }

    #[test]
    fn test_queue_family_indices_default() {
        let indices = QueueFamilyIndices::default();
        assert!(!indices.is_complete());
        assert!(indices.unique_families().is_empty());
    }

    #[test]
    fn test_unique_families_shared() {
        let indices = QueueFamilyIndices {
            graphics_family: Some(0),
            present_family: Some(0),
        };
        assert!(indices.is_complete());
        assert_eq!(indices.unique_families(), vec![0]);
    }

    #[test]
    fn test_unique_families_split() {
        let indices = QueueFamilyIndices {
            graphics_family: Some(0),
            present_family: Some(2),
        };
        assert_eq!(indices.unique_families(), vec![0, 2]);
    }

    #[test]
    fn test_pick_prefers_combined_family() {
        let families = [
            family(vk::QueueFlags::GRAPHICS),
            family(vk::QueueFlags::TRANSFER),
            family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE),
        ];
        let indices = pick_queue_families(&families, |i| i == 1 || i == 2);
        assert_eq!(indices.graphics_family, Some(2));
        assert_eq!(indices.present_family, Some(2));
    }

    #[test]
    fn test_pick_split_families() {
        let families = [family(vk::QueueFlags::GRAPHICS), family(vk::QueueFlags::TRANSFER)];
        let indices = pick_queue_families(&families, |i| i == 1);
        assert_eq!(indices.graphics_family, Some(0));
        assert_eq!(indices.present_family, Some(1));
    }

    #[test]
    fn test_pick_skips_empty_families() {
        let mut empty = family(vk::QueueFlags::GRAPHICS);
        empty.queue_count = 0;
        let families = [empty, family(vk::QueueFlags::GRAPHICS)];
        let indices = pick_queue_families(&families, |_| true);
        assert_eq!(indices.graphics_family, Some(1));
    }

    #[test]
    fn test_pick_without_present() {
        let families = [family(vk::QueueFlags::GRAPHICS)];
        let indices = pick_queue_families(&families, |_| false);
        assert!(!indices.is_complete());
    }

    #[test]
    fn test_discrete_ranks_first() {
        let order = [
            vk::PhysicalDeviceType::DISCRETE_GPU,
            vk::PhysicalDeviceType::INTEGRATED_GPU,
            vk::PhysicalDeviceType::VIRTUAL_GPU,
            vk::PhysicalDeviceType::CPU,
            vk::PhysicalDeviceType::OTHER,
        ];
        let ranks: Vec<u8> = order.iter().map(|&ty| device_rank(ty).0).collect();
        assert!(ranks.windows(2).all(|pair| pair[0] > pair[1]));
        assert_eq!(device_rank(vk::PhysicalDeviceType::DISCRETE_GPU).1, "discrete");
    }
}
