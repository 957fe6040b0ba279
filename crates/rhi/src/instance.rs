//! The Vulkan instance.
//!
//! Surface extensions are the windowing layer's business: it lists them in
//! [`InstanceDesc::extensions`]. A headless instance (no extensions) is
//! enough for device selection without presentation, which the GPU tests
//! rely on.
//!
//! With [`InstanceDesc::enable_validation`] set and the Khronos layer
//! installed, validation warnings and errors are routed into `tracing`.

use std::borrow::Cow;
use std::ffi::{CStr, CString, c_char, c_void};

use ash::{Entry, vk};
use tracing::{Level, debug, error, info, warn};

use crate::error::{RhiError, RhiResult};
use crate::loader;

const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

/// Parameters of [`Instance::new`].
#[derive(Debug, Clone)]
pub struct InstanceDesc {
    pub application_name: String,
    /// Request the validation layer. Ignored with a warning if the layer is
    /// not installed.
    pub enable_validation: bool,
    /// Additional instance extensions, usually the platform surface ones.
    pub extensions: Vec<&'static CStr>,
}

impl Default for InstanceDesc {
    fn default() -> Self {
        Self {
            application_name: "Forward Renderer".to_string(),
            enable_validation: false,
            extensions: Vec::new(),
        }
    }
}

/// Validation messenger and the extension loader that created it.
struct Messenger {
    loader: ash::ext::debug_utils::Instance,
    handle: vk::DebugUtilsMessengerEXT,
}

pub struct Instance {
    entry: &'static Entry,
    instance: ash::Instance,
    messenger: Option<Messenger>,
}

impl Instance {
    /// Creates the instance, targeting Vulkan 1.2.
    ///
    /// # Errors
    ///
    /// [`RhiError::LoadingError`] without a Vulkan loader,
    /// [`RhiError::InvalidHandle`] for an application name containing NUL,
    /// otherwise the Vulkan error from instance or messenger creation.
    pub fn new(desc: &InstanceDesc) -> RhiResult<Self> {
        let entry = loader::entry()?;

        let validation = desc.enable_validation && has_validation_layer(entry)?;
        if desc.enable_validation && !validation {
            warn!("{} is not installed, continuing without validation", VALIDATION_LAYER.to_string_lossy());
        }

        let application_name = CString::new(desc.application_name.as_str())
            .map_err(|_| RhiError::InvalidHandle("application name contains NUL".to_string()))?;
        let version = vk::make_api_version(0, 1, 0, 0);
        let app_info = vk::ApplicationInfo::default()
            .application_name(&application_name)
            .application_version(version)
            .engine_name(c"forward")
            .engine_version(version)
            .api_version(vk::API_VERSION_1_2);

        let mut extensions: Vec<*const c_char> = desc.extensions.iter().map(|e| e.as_ptr()).collect();
        let mut layers: Vec<*const c_char> = Vec::new();
        if validation {
            extensions.push(ash::ext::debug_utils::NAME.as_ptr());
            layers.push(VALIDATION_LAYER.as_ptr());
        }

        let create_info = vk::InstanceCreateInfo::default()
            .application_info(&app_info)
            .enabled_extension_names(&extensions)
            .enabled_layer_names(&layers);
        let instance = unsafe { entry.create_instance(&create_info, None)? };

        let messenger = if validation {
            match create_messenger(entry, &instance) {
                Ok(messenger) => Some(messenger),
                Err(e) => {
                    unsafe { instance.destroy_instance(None) };
                    return Err(e);
                }
            }
        } else {
            None
        };

        info!(
            "Vulkan instance created: {} extension(s), validation {}",
            extensions.len(),
            if messenger.is_some() { "on" } else { "off" }
        );

        Ok(Self {
            entry,
            instance,
            messenger,
        })
    }

    #[inline]
    pub fn handle(&self) -> &ash::Instance {
        &self.instance
    }

    #[inline]
    pub fn entry(&self) -> &Entry {
        self.entry
    }

    #[inline]
    pub fn has_validation(&self) -> bool {
        self.messenger.is_some()
    }
}

impl Drop for Instance {
    fn drop(&mut self) {
        unsafe {
            if let Some(messenger) = self.messenger.take() {
                messenger
                    .loader
                    .destroy_debug_utils_messenger(messenger.handle, None);
            }
            self.instance.destroy_instance(None);
        }
        debug!("Vulkan instance destroyed");
    }
}

fn has_validation_layer(entry: &Entry) -> RhiResult<bool> {
    let layers = unsafe { entry.enumerate_instance_layer_properties()? };
    Ok(layers
        .iter()
        .any(|layer| layer.layer_name_as_c_str().is_ok_and(|name| name == VALIDATION_LAYER)))
}

fn create_messenger(entry: &Entry, instance: &ash::Instance) -> RhiResult<Messenger> {
    let loader = ash::ext::debug_utils::Instance::new(entry, instance);
    let create_info = vk::DebugUtilsMessengerCreateInfoEXT::default()
        .message_severity(
            vk::DebugUtilsMessageSeverityFlagsEXT::WARNING | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
        )
        .message_type(
            vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
        )
        .pfn_user_callback(Some(on_validation_message));
    let handle = unsafe { loader.create_debug_utils_messenger(&create_info, None)? };

    Ok(Messenger { loader, handle })
}

/// `tracing` level of a validation message severity.
fn severity_level(severity: vk::DebugUtilsMessageSeverityFlagsEXT) -> Level {
    if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
        Level::ERROR
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
        Level::WARN
    } else {
        Level::DEBUG
    }
}

/// # Safety
///
/// Invoked by the loader; `callback_data` is null or valid for the call.
unsafe extern "system" fn on_validation_message(
    severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    _message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _user_data: *mut c_void,
) -> vk::Bool32 {
    let message = match unsafe { callback_data.as_ref() } {
        Some(data) if !data.p_message.is_null() => unsafe { CStr::from_ptr(data.p_message).to_string_lossy() },
        _ => Cow::Borrowed("(no message)"),
    };

    let level = severity_level(severity);
    if level == Level::ERROR {
        error!(target: "vulkan", "{}", message);
    } else if level == Level::WARN {
        warn!(target: "vulkan", "{}", message);
    } else {
        debug!(target: "vulkan", "{}", message);
    }

    vk::FALSE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_desc_is_headless() {
        let desc = InstanceDesc::default();
        assert!(desc.extensions.is_empty());
        assert!(!desc.enable_validation);
    }

    #[test]
    fn test_severity_levels() {
        use vk::DebugUtilsMessageSeverityFlagsEXT as Severity;
        assert_eq!(severity_level(Severity::ERROR), Level::ERROR);
        assert_eq!(severity_level(Severity::WARNING), Level::WARN);
        assert_eq!(severity_level(Severity::INFO), Level::DEBUG);
    }

    #[test]
    fn test_headless_instance_or_missing_driver() {
        match Instance::new(&InstanceDesc::default()) {
            Ok(instance) => assert!(!instance.has_validation()),
            Err(RhiError::LoadingError(_))
            | Err(RhiError::VulkanError(vk::Result::ERROR_INCOMPATIBLE_DRIVER))
            | Err(RhiError::VulkanError(vk::Result::ERROR_INITIALIZATION_FAILED)) => {
                eprintln!("Skipping test: Vulkan not available");
            }
            Err(e) => panic!("Unexpected error: {:?}", e),
        }
    }

    #[test]
    fn test_nul_in_application_name_is_rejected() {
        let desc = InstanceDesc {
            application_name: "bad\0name".to_string(),
            ..Default::default()
        };
        match Instance::new(&desc) {
            Err(RhiError::InvalidHandle(_)) | Err(RhiError::LoadingError(_)) => {}
            other => panic!("Unexpected result: {:?}", other.map(|_| ())),
        }
    }
}
