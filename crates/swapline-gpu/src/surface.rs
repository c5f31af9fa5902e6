//! Surface management for windowed rendering.
//!
//! Holds the window surface together with the extension loaders needed to
//! query it and to build swapchains against it.

use crate::error::Result;
use ash::vk;

/// Surface context for windowed rendering.
///
/// Created by [`GpuContextBuilder::build_with_window`](crate::GpuContextBuilder::build_with_window).
pub struct SurfaceContext {
    /// The Vulkan surface handle.
    pub surface: vk::SurfaceKHR,
    /// Surface extension loader.
    pub surface_loader: ash::khr::surface::Instance,
    /// Swapchain extension loader.
    pub swapchain_loader: ash::khr::swapchain::Device,
}

impl SurfaceContext {
    pub(crate) fn new(
        surface: vk::SurfaceKHR,
        surface_loader: ash::khr::surface::Instance,
        swapchain_loader: ash::khr::swapchain::Device,
    ) -> Self {
        Self {
            surface,
            surface_loader,
            swapchain_loader,
        }
    }

    /// Query surface capabilities, formats and present modes.
    pub fn capabilities(&self, physical_device: vk::PhysicalDevice) -> Result<SurfaceCapabilities> {
        unsafe {
            let caps = self
                .surface_loader
                .get_physical_device_surface_capabilities(physical_device, self.surface)?;

            let formats = self
                .surface_loader
                .get_physical_device_surface_formats(physical_device, self.surface)?;

            let present_modes = self
                .surface_loader
                .get_physical_device_surface_present_modes(physical_device, self.surface)?;

            Ok(SurfaceCapabilities {
                capabilities: caps,
                formats,
                present_modes,
            })
        }
    }

    /// Whether `queue_family` can present to `surface`.
    pub fn supports_present(
        &self,
        physical_device: vk::PhysicalDevice,
        queue_family: u32,
        surface: vk::SurfaceKHR,
    ) -> Result<bool> {
        let supported = unsafe {
            self.surface_loader.get_physical_device_surface_support(
                physical_device,
                queue_family,
                surface,
            )?
        };
        Ok(supported)
    }

    /// Destroy a surface created from this context's instance.
    ///
    /// # Safety
    /// The surface must not be in use by any swapchain.
    pub unsafe fn destroy_surface(&self, surface: vk::SurfaceKHR) {
        if surface != vk::SurfaceKHR::null() {
            self.surface_loader.destroy_surface(surface, None);
        }
    }
}

/// Surface capabilities query result.
#[derive(Debug, Clone, Default)]
pub struct SurfaceCapabilities {
    /// Raw surface capabilities.
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    /// Supported surface formats.
    pub formats: Vec<vk::SurfaceFormatKHR>,
    /// Supported present modes.
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SurfaceCapabilities {
    /// Whether the surface can back a swapchain at all.
    pub fn is_usable(&self) -> bool {
        !self.formats.is_empty() && !self.present_modes.is_empty()
    }
}
