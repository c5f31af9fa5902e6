//! GPU context management.

use crate::error::{GpuError, Result};
use crate::instance::{create_instance, device_name, select_physical_device, DebugMessenger};
use crate::memory::GpuAllocator;
use crate::surface::SurfaceContext;
use ash::vk;
use parking_lot::Mutex;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use std::ffi::{c_char, CStr};
use std::sync::Arc;

/// Queue family indices chosen for a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueFamilies {
    /// Family used for graphics (and compute when no dedicated family exists).
    pub graphics: u32,
    /// Family able to present to the window surface; `None` for headless contexts.
    pub present: Option<u32>,
    /// Family used for compute work.
    pub compute: u32,
}

impl QueueFamilies {
    /// Whether graphics and presentation share one family.
    pub fn shared_present(&self) -> bool {
        self.present.map_or(true, |present| present == self.graphics)
    }
}

/// Surface a device must be able to present to.
pub(crate) struct PresentTarget<'a> {
    pub(crate) loader: &'a ash::khr::surface::Instance,
    pub(crate) surface: vk::SurfaceKHR,
}

/// Main GPU context holding Vulkan resources.
pub struct GpuContext {
    pub(crate) entry: ash::Entry,
    pub(crate) instance: ash::Instance,
    debug_messenger: Option<DebugMessenger>,
    pub(crate) physical_device: vk::PhysicalDevice,
    pub(crate) device: Arc<ash::Device>,
    pub(crate) allocator: Mutex<GpuAllocator>,
    device_name: String,

    pub(crate) queue_families: QueueFamilies,
    pub(crate) graphics_queue: vk::Queue,
    pub(crate) present_queue: Option<vk::Queue>,
    pub(crate) compute_queue: vk::Queue,
}

impl GpuContext {
    /// Get the Vulkan entry point.
    pub fn entry(&self) -> &ash::Entry {
        &self.entry
    }

    /// Get the Vulkan instance handle.
    pub fn instance(&self) -> &ash::Instance {
        &self.instance
    }

    /// Get the Vulkan device handle.
    pub fn device(&self) -> &ash::Device {
        &self.device
    }

    /// Get the physical device handle.
    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.physical_device
    }

    /// Name of the selected GPU.
    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    /// Get the selected queue families.
    pub fn queue_families(&self) -> QueueFamilies {
        self.queue_families
    }

    /// Get the graphics queue.
    pub fn graphics_queue(&self) -> vk::Queue {
        self.graphics_queue
    }

    /// Get the presentation queue, if this context was built for a window.
    pub fn present_queue(&self) -> Option<vk::Queue> {
        self.present_queue
    }

    /// Get the compute queue.
    pub fn compute_queue(&self) -> vk::Queue {
        self.compute_queue
    }

    /// Get the graphics queue family index.
    pub fn graphics_queue_family(&self) -> u32 {
        self.queue_families.graphics
    }

    /// Get the compute queue family index.
    pub fn compute_queue_family(&self) -> u32 {
        self.queue_families.compute
    }

    /// Get access to the GPU allocator.
    pub fn allocator(&self) -> &Mutex<GpuAllocator> {
        &self.allocator
    }

    /// Wait for device to be idle.
    #[cfg_attr(
        feature = "profiling-tracy",
        tracing::instrument(level = "trace", skip_all)
    )]
    pub fn wait_idle(&self) -> Result<()> {
        unsafe {
            self.device.device_wait_idle()?;
        }
        Ok(())
    }
}

impl Drop for GpuContext {
    fn drop(&mut self) {
        unsafe {
            let _ = self.device.device_wait_idle();

            // Allocator frees its VkDeviceMemory blocks, so it goes before the device
            self.allocator.lock().shutdown();

            self.device.destroy_device(None);
            if let Some(messenger) = self.debug_messenger.as_mut() {
                messenger.destroy();
            }
            self.instance.destroy_instance(None);
        }
    }
}

/// Builder for creating a GPU context.
pub struct GpuContextBuilder {
    app_name: String,
    enable_validation: bool,
}

impl Default for GpuContextBuilder {
    fn default() -> Self {
        Self {
            app_name: "Swapline".to_string(),
            enable_validation: cfg!(debug_assertions),
        }
    }
}

impl GpuContextBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the application name.
    pub fn app_name(mut self, name: impl Into<String>) -> Self {
        self.app_name = name.into();
        self
    }

    /// Enable or disable validation layers.
    pub fn validation(mut self, enable: bool) -> Self {
        self.enable_validation = enable;
        self
    }

    /// Build a headless GPU context (no surface, no presentation queue).
    pub fn build(self) -> Result<GpuContext> {
        let entry = load_entry()?;
        let instance = unsafe { create_instance(&entry, &self.app_name, self.enable_validation, &[]) }?;
        let debug_messenger = self.debug_messenger(&entry, &instance);

        let (physical_device, families) = match unsafe { select_physical_device(&instance, None) } {
            Ok(selected) => selected,
            Err(e) => {
                unsafe { destroy_instance(&instance, debug_messenger) };
                return Err(e);
            }
        };

        finish_context(entry, instance, debug_messenger, physical_device, families)
    }

    /// Build a GPU context able to present to `window`, together with the window's surface.
    ///
    /// The returned [`SurfaceContext`] owns the surface handle; it must be
    /// destroyed before the context is dropped.
    pub fn build_with_window<W>(self, window: &W) -> Result<(GpuContext, SurfaceContext)>
    where
        W: HasDisplayHandle + HasWindowHandle,
    {
        let display = window
            .display_handle()
            .map_err(|e| GpuError::SurfaceCreation(format!("Failed to get display handle: {e}")))?;
        let window_handle = window
            .window_handle()
            .map_err(|e| GpuError::SurfaceCreation(format!("Failed to get window handle: {e}")))?;

        let entry = load_entry()?;
        let surface_extensions = ash_window::enumerate_required_extensions(display.as_raw())
            .map_err(|e| GpuError::ExtensionNotSupported(e.to_string()))?;
        let surface_extensions: Vec<*const c_char> = surface_extensions.to_vec();

        let instance = unsafe {
            create_instance(
                &entry,
                &self.app_name,
                self.enable_validation,
                &surface_extensions,
            )
        }?;
        let debug_messenger = self.debug_messenger(&entry, &instance);

        let surface = match unsafe {
            ash_window::create_surface(
                &entry,
                &instance,
                display.as_raw(),
                window_handle.as_raw(),
                None,
            )
        } {
            Ok(surface) => surface,
            Err(e) => {
                unsafe { destroy_instance(&instance, debug_messenger) };
                return Err(GpuError::SurfaceCreation(e.to_string()));
            }
        };
        let surface_loader = ash::khr::surface::Instance::new(&entry, &instance);

        let target = PresentTarget {
            loader: &surface_loader,
            surface,
        };
        let (physical_device, families) =
            match unsafe { select_physical_device(&instance, Some(&target)) } {
                Ok(selected) => selected,
                Err(e) => {
                    unsafe {
                        surface_loader.destroy_surface(surface, None);
                        destroy_instance(&instance, debug_messenger);
                    }
                    return Err(e);
                }
            };

        let context = finish_context(entry, instance, debug_messenger, physical_device, families)?;
        let swapchain_loader = ash::khr::swapchain::Device::new(&context.instance, &context.device);

        Ok((
            context,
            SurfaceContext::new(surface, surface_loader, swapchain_loader),
        ))
    }

    fn debug_messenger(&self, entry: &ash::Entry, instance: &ash::Instance) -> Option<DebugMessenger> {
        if !self.enable_validation {
            return None;
        }
        match unsafe { DebugMessenger::new(entry, instance) } {
            Ok(messenger) => Some(messenger),
            Err(e) => {
                tracing::warn!("Debug messenger unavailable: {}", e);
                None
            }
        }
    }
}

fn load_entry() -> Result<ash::Entry> {
    unsafe { ash::Entry::load() }.map_err(|e| GpuError::Other(format!("Failed to load Vulkan: {e}")))
}

unsafe fn destroy_instance(instance: &ash::Instance, debug_messenger: Option<DebugMessenger>) {
    if let Some(mut messenger) = debug_messenger {
        messenger.destroy();
    }
    instance.destroy_instance(None);
}

fn finish_context(
    entry: ash::Entry,
    instance: ash::Instance,
    debug_messenger: Option<DebugMessenger>,
    physical_device: vk::PhysicalDevice,
    families: QueueFamilies,
) -> Result<GpuContext> {
    let device_name = unsafe { device_name(&instance, physical_device) };
    tracing::info!("Selected GPU: {}", device_name);

    let (device, graphics_queue, present_queue, compute_queue) =
        match unsafe { create_device(&instance, physical_device, &families) } {
            Ok(created) => created,
            Err(e) => {
                unsafe { destroy_instance(&instance, debug_messenger) };
                return Err(e);
            }
        };
    let device = Arc::new(device);

    let allocator = match unsafe { GpuAllocator::new(&instance, device.clone(), physical_device) } {
        Ok(allocator) => allocator,
        Err(e) => {
            unsafe {
                device.destroy_device(None);
                destroy_instance(&instance, debug_messenger);
            }
            return Err(e);
        }
    };

    Ok(GpuContext {
        entry,
        instance,
        debug_messenger,
        physical_device,
        device,
        allocator: Mutex::new(allocator),
        device_name,
        queue_families: families,
        graphics_queue,
        present_queue,
        compute_queue,
    })
}

/// Find queue families for graphics, compute and (optionally) presentation.
///
/// Presentation prefers the graphics family when it can present, so most
/// devices end up with exclusive swapchain sharing.
///
/// # Safety
/// The instance and physical device (and target surface, if any) must be valid.
pub(crate) unsafe fn find_queue_families(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
    target: Option<&PresentTarget<'_>>,
) -> Result<QueueFamilies> {
    let queue_families = instance.get_physical_device_queue_family_properties(physical_device);

    let mut graphics_family = None;
    let mut compute_family = None;
    let mut present_families = Vec::new();

    for (i, family) in (0u32..).zip(queue_families.iter()) {
        // Dedicated compute queue (no graphics)
        if family.queue_flags.contains(vk::QueueFlags::COMPUTE)
            && !family.queue_flags.contains(vk::QueueFlags::GRAPHICS)
            && compute_family.is_none()
        {
            compute_family = Some(i);
        }

        if family.queue_flags.contains(vk::QueueFlags::GRAPHICS) && graphics_family.is_none() {
            graphics_family = Some(i);
        }

        if let Some(target) = target {
            let supported = target
                .loader
                .get_physical_device_surface_support(physical_device, i, target.surface)
                .unwrap_or(false);
            if supported {
                present_families.push(i);
            }
        }
    }

    let graphics = graphics_family.ok_or(GpuError::NoSuitableDevice)?;
    let compute = compute_family.unwrap_or(graphics);

    let present = match target {
        None => None,
        Some(_) => {
            let family = if present_families.contains(&graphics) {
                graphics
            } else {
                *present_families.first().ok_or(GpuError::NoSuitableDevice)?
            };
            Some(family)
        }
    };

    Ok(QueueFamilies {
        graphics,
        present,
        compute,
    })
}

/// Create the logical device and retrieve queues.
///
/// # Safety
/// The instance and physical device must be valid.
unsafe fn create_device(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
    families: &QueueFamilies,
) -> Result<(ash::Device, vk::Queue, Option<vk::Queue>, vk::Queue)> {
    let mut unique_families = vec![families.graphics, families.compute];
    unique_families.extend(families.present);
    unique_families.sort_unstable();
    unique_families.dedup();

    let queue_priority = 1.0_f32;
    let queue_create_infos: Vec<vk::DeviceQueueCreateInfo> = unique_families
        .iter()
        .map(|&family| {
            vk::DeviceQueueCreateInfo::default()
                .queue_family_index(family)
                .queue_priorities(std::slice::from_ref(&queue_priority))
        })
        .collect();

    let extensions: Vec<&CStr> = if families.present.is_some() {
        vec![ash::khr::swapchain::NAME]
    } else {
        vec![]
    };
    let extension_names: Vec<*const c_char> = extensions.iter().map(|ext| ext.as_ptr()).collect();

    let features = vk::PhysicalDeviceFeatures::default();

    let device_create_info = vk::DeviceCreateInfo::default()
        .queue_create_infos(&queue_create_infos)
        .enabled_extension_names(&extension_names)
        .enabled_features(&features);

    let device = instance
        .create_device(physical_device, &device_create_info, None)
        .map_err(GpuError::from)?;

    let graphics_queue = device.get_device_queue(families.graphics, 0);
    let compute_queue = device.get_device_queue(families.compute, 0);
    let present_queue = families
        .present
        .map(|family| device.get_device_queue(family, 0));

    Ok((device, graphics_queue, present_queue, compute_queue))
}
