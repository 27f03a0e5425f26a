//! The `VkInstance`, created with whatever surface extensions the window
//! reports. With validation requested and the Khronos layer installed, a
//! debug messenger forwards layer output into `tracing`.

use std::borrow::Cow;
use std::ffi::{CStr, c_char, c_void};

use ash::ext::debug_utils;
use ash::{Entry, vk};
use tracing::{debug, error, info, warn};

use crate::error::RhiResult;

const KHRONOS_VALIDATION: &CStr = c"VK_LAYER_KHRONOS_validation";

struct Validation {
    loader: debug_utils::Instance,
    messenger: vk::DebugUtilsMessengerEXT,
}

pub struct Instance {
    entry: Entry,
    instance: ash::Instance,
    validation: Option<Validation>,
}

impl Instance {
    /// Missing validation layers are reported with a warning, not an error.
    pub fn new(
        app_name: &CStr,
        surface_extensions: &[*const c_char],
        validation: bool,
    ) -> RhiResult<Self> {
        let entry = unsafe { Entry::load()? };

        let validation = validation && {
            let present = validation_layer_present(&entry)?;
            if !present {
                warn!("{:?} not installed, running without validation", KHRONOS_VALIDATION);
            }
            present
        };

        let version = vk::make_api_version(0, 0, 1, 0);
        let app_info = vk::ApplicationInfo::default()
            .application_name(app_name)
            .application_version(version)
            .engine_name(c"trirender")
            .engine_version(version)
            .api_version(vk::API_VERSION_1_1);

        let extensions = instance_extensions(surface_extensions, validation);
        let layers: Vec<*const c_char> = if validation {
            vec![KHRONOS_VALIDATION.as_ptr()]
        } else {
            Vec::new()
        };

        let instance = unsafe {
            entry.create_instance(
                &vk::InstanceCreateInfo::default()
                    .application_info(&app_info)
                    .enabled_extension_names(&extensions)
                    .enabled_layer_names(&layers),
                None,
            )?
        };

        let validation = if validation {
            let loader = debug_utils::Instance::new(&entry, &instance);
            match unsafe { loader.create_debug_utils_messenger(&messenger_create_info(), None) } {
                Ok(messenger) => Some(Validation { loader, messenger }),
                Err(e) => {
                    unsafe { instance.destroy_instance(None) };
                    return Err(e.into());
                }
            }
        } else {
            None
        };

        info!(
            "Vulkan instance created: {} extension(s), validation {}",
            extensions.len(),
            if validation.is_some() { "on" } else { "off" }
        );

        Ok(Self {
            entry,
            instance,
            validation,
        })
    }

    #[inline]
    pub fn handle(&self) -> &ash::Instance {
        &self.instance
    }

    #[inline]
    pub fn entry(&self) -> &Entry {
        &self.entry
    }

    #[inline]
    pub fn has_validation(&self) -> bool {
        self.validation.is_some()
    }
}

impl Drop for Instance {
    fn drop(&mut self) {
        unsafe {
            if let Some(validation) = self.validation.take() {
                validation
                    .loader
                    .destroy_debug_utils_messenger(validation.messenger, None);
            }
            self.instance.destroy_instance(None);
        }
        debug!("Vulkan instance destroyed");
    }
}

fn validation_layer_present(entry: &Entry) -> RhiResult<bool> {
    let layers = unsafe { entry.enumerate_instance_layer_properties()? };
    Ok(layers
        .iter()
        .filter_map(|layer| layer.layer_name_as_c_str().ok())
        .any(|name| name == KHRONOS_VALIDATION))
}

fn instance_extensions(surface_extensions: &[*const c_char], validation: bool) -> Vec<*const c_char> {
    let mut extensions = surface_extensions.to_vec();
    if validation {
        extensions.push(debug_utils::NAME.as_ptr());
    }
    extensions
}

fn messenger_create_info() -> vk::DebugUtilsMessengerCreateInfoEXT<'static> {
    vk::DebugUtilsMessengerCreateInfoEXT::default()
        .message_severity(
            vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
        )
        .message_type(
            vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
        )
        .pfn_user_callback(Some(forward_to_tracing))
}

fn message_label(kind: vk::DebugUtilsMessageTypeFlagsEXT) -> &'static str {
    if kind.contains(vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION) {
        "validation"
    } else if kind.contains(vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE) {
        "performance"
    } else {
        "general"
    }
}

unsafe extern "system" fn forward_to_tracing(
    severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    kind: vk::DebugUtilsMessageTypeFlagsEXT,
    data: *const vk::DebugUtilsMessengerCallbackDataEXT<'_>,
    _user_data: *mut c_void,
) -> vk::Bool32 {
    // SAFETY: the loader passes either null or a pointer valid for this call.
    let message = match unsafe { data.as_ref() } {
        Some(data) if !data.p_message.is_null() => unsafe {
            CStr::from_ptr(data.p_message).to_string_lossy()
        },
        _ => Cow::Borrowed("<empty>"),
    };
    let label = message_label(kind);

    if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
        error!(target: "vulkan", "[{}] {}", label, message);
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
        warn!(target: "vulkan", "[{}] {}", label, message);
    } else {
        debug!(target: "vulkan", "[{}] {}", label, message);
    }

    vk::FALSE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_surface_extensions_pass_through() {
        let surface = [ash::khr::surface::NAME.as_ptr()];
        assert_eq!(instance_extensions(&surface, false), surface.to_vec());
    }

    #[test]
    fn test_validation_adds_debug_utils() {
        let surface = [ash::khr::surface::NAME.as_ptr()];
        let extensions = instance_extensions(&surface, true);
        assert_eq!(extensions.len(), 2);
        assert_eq!(extensions[1], debug_utils::NAME.as_ptr());
    }

    #[test]
    fn test_message_label() {
        let ty = vk::DebugUtilsMessageTypeFlagsEXT::default();
        assert_eq!(message_label(ty), "general");
        assert_eq!(
            message_label(vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION),
            "validation"
        );
        assert_eq!(
            message_label(
                vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE
                    | vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
            ),
            "performance"
        );
    }

    #[test]
    fn test_messenger_routes_warnings_and_errors() {
        let info = messenger_create_info();
        assert!(
            info.message_severity
                .contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING)
        );
        assert!(
            !info
                .message_severity
                .contains(vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE)
        );
        assert!(info.pfn_user_callback.is_some());
    }

    #[test]
    fn test_instance_without_validation() {
        match Instance::new(c"trirender-test", &[], false) {
            Ok(instance) => assert!(!instance.has_validation()),
            Err(e) => eprintln!("Skipping test: Vulkan not available ({e})"),
        }
    }
}
