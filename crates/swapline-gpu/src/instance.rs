//! Vulkan instance creation, validation messages and physical device selection.

use crate::context::{find_queue_families, PresentTarget, QueueFamilies};
use crate::error::{GpuError, Result};
use ash::vk;
use std::ffi::{c_char, c_void, CStr, CString};

/// API version requested from the driver.
pub const API_VERSION: u32 = vk::API_VERSION_1_2;

/// Validation layers to enable in debug builds.
pub fn validation_layers() -> Vec<&'static CStr> {
    vec![c"VK_LAYER_KHRONOS_validation"]
}

/// Create a Vulkan instance.
///
/// `surface_extensions` are the platform extensions reported by
/// `ash_window::enumerate_required_extensions`; headless callers pass an empty slice.
///
/// # Safety
/// The entry must be a valid Vulkan entry point.
pub unsafe fn create_instance(
    entry: &ash::Entry,
    app_name: &str,
    enable_validation: bool,
    surface_extensions: &[*const c_char],
) -> Result<ash::Instance> {
    let app_name = CString::new(app_name)
        .map_err(|e| GpuError::Other(format!("Invalid application name: {e}")))?;

    let app_info = vk::ApplicationInfo::default()
        .application_name(&app_name)
        .application_version(vk::make_api_version(0, 0, 1, 0))
        .engine_name(c"Swapline")
        .engine_version(vk::make_api_version(0, 0, 1, 0))
        .api_version(API_VERSION);

    let mut extension_names: Vec<*const c_char> = surface_extensions.to_vec();
    if enable_validation {
        extension_names.push(ash::ext::debug_utils::NAME.as_ptr());
    }
    #[cfg(target_os = "macos")]
    extension_names.push(ash::khr::portability_enumeration::NAME.as_ptr());

    let layers = if enable_validation {
        validation_layers()
    } else {
        vec![]
    };

    // Missing layers are reported but not fatal
    let available_layers = entry.enumerate_instance_layer_properties()?;
    let layers: Vec<&CStr> = layers
        .into_iter()
        .filter(|layer| {
            let found = available_layers
                .iter()
                .any(|props| CStr::from_ptr(props.layer_name.as_ptr()) == *layer);
            if !found {
                tracing::warn!("Validation layer {:?} not available", layer);
            }
            found
        })
        .collect();

    let layer_names: Vec<*const c_char> = layers.iter().map(|l| l.as_ptr()).collect();

    #[cfg(target_os = "macos")]
    let create_flags = vk::InstanceCreateFlags::ENUMERATE_PORTABILITY_KHR;
    #[cfg(not(target_os = "macos"))]
    let create_flags = vk::InstanceCreateFlags::empty();

    let create_info = vk::InstanceCreateInfo::default()
        .application_info(&app_info)
        .enabled_extension_names(&extension_names)
        .enabled_layer_names(&layer_names)
        .flags(create_flags);

    let instance = entry.create_instance(&create_info, None)?;

    Ok(instance)
}

/// Debug-utils messenger together with the function table it was created from.
///
/// The extension entry points are resolved once per instance and owned here,
/// so nothing about validation output lives in process-wide state.
pub struct DebugMessenger {
    loader: ash::ext::debug_utils::Instance,
    messenger: vk::DebugUtilsMessengerEXT,
}

impl DebugMessenger {
    /// Create a messenger that forwards validation output to `tracing`.
    ///
    /// # Safety
    /// The instance must have been created with the debug-utils extension enabled.
    pub unsafe fn new(entry: &ash::Entry, instance: &ash::Instance) -> Result<Self> {
        let loader = ash::ext::debug_utils::Instance::new(entry, instance);

        let create_info = vk::DebugUtilsMessengerCreateInfoEXT::default()
            .message_severity(
                vk::DebugUtilsMessageSeverityFlagsEXT::ERROR
                    | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                    | vk::DebugUtilsMessageSeverityFlagsEXT::INFO
                    | vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE,
            )
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(debug_callback));

        let messenger = loader.create_debug_utils_messenger(&create_info, None)?;

        Ok(Self { loader, messenger })
    }

    /// Destroy the messenger.
    ///
    /// # Safety
    /// Must be called before the owning instance is destroyed.
    pub unsafe fn destroy(&mut self) {
        if self.messenger != vk::DebugUtilsMessengerEXT::null() {
            self.loader
                .destroy_debug_utils_messenger(self.messenger, None);
            self.messenger = vk::DebugUtilsMessengerEXT::null();
        }
    }
}

unsafe extern "system" fn debug_callback(
    severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT<'_>,
    _user_data: *mut c_void,
) -> vk::Bool32 {
    if callback_data.is_null() || (*callback_data).p_message.is_null() {
        return vk::FALSE;
    }
    let message = CStr::from_ptr((*callback_data).p_message).to_string_lossy();

    if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
        tracing::error!(target: "vulkan", "[{:?}] {}", message_type, message);
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
        tracing::warn!(target: "vulkan", "[{:?}] {}", message_type, message);
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::INFO) {
        tracing::debug!(target: "vulkan", "[{:?}] {}", message_type, message);
    } else {
        tracing::trace!(target: "vulkan", "[{:?}] {}", message_type, message);
    }

    vk::FALSE
}

/// Select the best physical device.
///
/// With a present target, devices that cannot present to the surface, lack the
/// swapchain extension, or report no surface formats or present modes are skipped.
///
/// # Safety
/// The instance (and surface, if any) must be valid.
pub(crate) unsafe fn select_physical_device(
    instance: &ash::Instance,
    target: Option<&PresentTarget<'_>>,
) -> Result<(vk::PhysicalDevice, QueueFamilies)> {
    let devices = instance.enumerate_physical_devices()?;

    let mut best: Option<(u32, vk::PhysicalDevice, QueueFamilies)> = None;

    for device in devices {
        let Some((score, families)) = score_physical_device(instance, device, target) else {
            continue;
        };
        if best.as_ref().map_or(true, |(best_score, _, _)| score > *best_score) {
            best = Some((score, device, families));
        }
    }

    best.map(|(_, device, families)| (device, families))
        .ok_or(GpuError::NoSuitableDevice)
}

/// Score a physical device for selection. `None` means unusable.
unsafe fn score_physical_device(
    instance: &ash::Instance,
    device: vk::PhysicalDevice,
    target: Option<&PresentTarget<'_>>,
) -> Option<(u32, QueueFamilies)> {
    let properties = instance.get_physical_device_properties(device);

    if properties.api_version < API_VERSION {
        return None;
    }

    let families = find_queue_families(instance, device, target).ok()?;

    if let Some(target) = target {
        let extensions = instance
            .enumerate_device_extension_properties(device)
            .unwrap_or_default();
        let has_swapchain = extensions.iter().any(|ext| {
            CStr::from_ptr(ext.extension_name.as_ptr()) == ash::khr::swapchain::NAME
        });
        if !has_swapchain {
            return None;
        }

        let formats = target
            .loader
            .get_physical_device_surface_formats(device, target.surface)
            .unwrap_or_default();
        let present_modes = target
            .loader
            .get_physical_device_surface_present_modes(device, target.surface)
            .unwrap_or_default();
        if formats.is_empty() || present_modes.is_empty() {
            return None;
        }
    }

    let mut score = 1;

    match properties.device_type {
        vk::PhysicalDeviceType::DISCRETE_GPU => score += 1000,
        vk::PhysicalDeviceType::INTEGRATED_GPU => score += 100,
        vk::PhysicalDeviceType::VIRTUAL_GPU => score += 50,
        _ => {}
    }

    // +1 per GB of device-local memory
    let memory = instance.get_physical_device_memory_properties(device);
    let vram_gb: u64 = memory
        .memory_heaps
        .iter()
        .take(memory.memory_heap_count as usize)
        .filter(|h| h.flags.contains(vk::MemoryHeapFlags::DEVICE_LOCAL))
        .map(|h| h.size / (1024 * 1024 * 1024))
        .sum();
    score += u32::try_from(vram_gb).unwrap_or(u32::MAX).min(64);

    Some((score, families))
}

/// Human-readable device name.
///
/// # Safety
/// The instance and physical device must be valid.
pub unsafe fn device_name(instance: &ash::Instance, device: vk::PhysicalDevice) -> String {
    let properties = instance.get_physical_device_properties(device);
    CStr::from_ptr(properties.device_name.as_ptr())
        .to_string_lossy()
        .into_owned()
}
