//! Swapchain creation, rebuild and teardown.

use crate::device::{PresentDevice, SwapchainDesc};
use crate::error::{PresentError, Result};
use ash::vk;
use swapline_gpu::swapchain::{
    calculate_extent, select_composite_alpha, select_image_count, select_pre_transform,
    select_present_mode, select_sharing, select_surface_format,
};
use swapline_gpu::PresentModePolicy;

/// What a teardown releases besides the swapchain itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Teardown {
    /// Keep the surface for a rebuild.
    KeepSurface,
    /// Release the surface too (shutdown).
    ReleaseSurface,
}

/// A swapchain and the per-image objects keyed to it.
///
/// `images`, `views` and `framebuffers` are parallel: index `i` of each
/// refers to the same swapchain image.
#[derive(Debug, Clone, Default)]
pub struct SwapchainState {
    pub(crate) handle: vk::SwapchainKHR,
    pub(crate) format: vk::SurfaceFormatKHR,
    pub(crate) present_mode: vk::PresentModeKHR,
    pub(crate) extent: vk::Extent2D,
    pub(crate) sharing_mode: vk::SharingMode,
    pub(crate) images: Vec<vk::Image>,
    pub(crate) views: Vec<vk::ImageView>,
    pub(crate) framebuffers: Vec<vk::Framebuffer>,
}

impl SwapchainState {
    pub fn handle(&self) -> vk::SwapchainKHR {
        self.handle
    }

    pub fn format(&self) -> vk::SurfaceFormatKHR {
        self.format
    }

    pub fn present_mode(&self) -> vk::PresentModeKHR {
        self.present_mode
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    pub fn sharing_mode(&self) -> vk::SharingMode {
        self.sharing_mode
    }

    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    pub fn images(&self) -> &[vk::Image] {
        &self.images
    }

    pub fn views(&self) -> &[vk::ImageView] {
        &self.views
    }

    pub fn framebuffers(&self) -> &[vk::Framebuffer] {
        &self.framebuffers
    }

    /// Framebuffer for an acquired image index.
    pub fn framebuffer(&self, image_index: u32) -> Option<vk::Framebuffer> {
        self.framebuffers.get(image_index as usize).copied()
    }

    /// Whether everything has been released.
    pub fn is_empty(&self) -> bool {
        self.handle == vk::SwapchainKHR::null()
            && self.images.is_empty()
            && self.views.is_empty()
            && self.framebuffers.is_empty()
    }
}

/// Builds swapchains for one surface and owns the render pass they are bound to.
#[derive(Debug)]
pub struct SwapchainManager {
    surface: vk::SurfaceKHR,
    graphics_family: u32,
    present_family: u32,
    policy: PresentModePolicy,
    render_pass: vk::RenderPass,
    render_format: Option<vk::Format>,
}

impl SwapchainManager {
    pub fn new(
        surface: vk::SurfaceKHR,
        graphics_family: u32,
        present_family: u32,
        policy: PresentModePolicy,
    ) -> Self {
        Self {
            surface,
            graphics_family,
            present_family,
            policy,
            render_pass: vk::RenderPass::null(),
            render_format: None,
        }
    }

    pub fn surface(&self) -> vk::SurfaceKHR {
        self.surface
    }

    /// Render pass every framebuffer is bound to; null until the first `create`.
    pub fn render_pass(&self) -> vk::RenderPass {
        self.render_pass
    }

    /// Queue family presentation was validated against.
    pub fn present_family(&self) -> u32 {
        self.present_family
    }

    /// Check that the surface can still be presented from the chosen family.
    pub fn validate_presentation<D: PresentDevice>(&self, device: &D) -> Result<()> {
        if device.supports_presentation(self.present_family, self.surface)? {
            Ok(())
        } else {
            Err(PresentError::PresentationUnsupported {
                family: self.present_family,
            })
        }
    }

    /// Build a swapchain sized as close to `width` x `height` as the surface allows.
    ///
    /// The render pass is created on the first call from the selected format.
    /// A surface with zero area (e.g. a minimized window) yields
    /// [`PresentError::SwapchainStale`] and nothing is created.
    pub fn create<D: PresentDevice>(
        &mut self,
        device: &D,
        width: u32,
        height: u32,
    ) -> Result<SwapchainState> {
        let caps = device.surface_capabilities(self.surface)?;
        if !caps.is_usable() {
            return Err(PresentError::SurfaceUnsupported);
        }
        let format = select_surface_format(&caps.formats).ok_or(PresentError::SurfaceUnsupported)?;

        match self.render_format {
            Some(old) if old != format.format => {
                return Err(PresentError::SurfaceFormatChanged {
                    old,
                    new: format.format,
                });
            }
            Some(_) => {}
            None => {
                self.render_pass = device.create_render_pass(format.format)?;
                self.render_format = Some(format.format);
            }
        }

        let extent = calculate_extent(&caps.capabilities, width, height);
        if extent.width == 0 || extent.height == 0 {
            return Err(PresentError::SwapchainStale);
        }

        let present_mode = select_present_mode(&caps.present_modes, self.policy);
        let (sharing_mode, queue_families) = select_sharing(self.graphics_family, self.present_family);

        let desc = SwapchainDesc {
            surface: self.surface,
            min_image_count: select_image_count(&caps.capabilities),
            format,
            extent,
            present_mode,
            sharing_mode,
            queue_families: &queue_families,
            pre_transform: select_pre_transform(&caps.capabilities),
            composite_alpha: select_composite_alpha(&caps.capabilities),
        };

        let mut state = SwapchainState {
            handle: device.create_swapchain(&desc)?,
            format,
            present_mode,
            extent,
            sharing_mode,
            ..SwapchainState::default()
        };

        // Release whatever was built so far if a per-image object fails
        if let Err(e) = self.build_image_objects(device, &mut state) {
            self.destroy(device, &mut state, Teardown::KeepSurface);
            return Err(e);
        }

        tracing::info!(
            "Swapchain created: {}x{}, {:?}, {:?}, {} images",
            extent.width,
            extent.height,
            format.format,
            present_mode,
            state.images.len()
        );

        Ok(state)
    }

    fn build_image_objects<D: PresentDevice>(
        &self,
        device: &D,
        state: &mut SwapchainState,
    ) -> Result<()> {
        state.images = device.swapchain_images(state.handle)?;

        for &image in &state.images {
            let view = device.create_image_view(image, state.format.format)?;
            state.views.push(view);
        }
        for &view in &state.views {
            let framebuffer = device.create_framebuffer(self.render_pass, view, state.extent)?;
            state.framebuffers.push(framebuffer);
        }

        Ok(())
    }

    /// Release a swapchain: framebuffers, views, the swapchain, then the
    /// surface if `teardown` says so.
    ///
    /// Each handle is cleared as it is released, so calling this again is a no-op.
    pub fn destroy<D: PresentDevice>(
        &mut self,
        device: &D,
        state: &mut SwapchainState,
        teardown: Teardown,
    ) {
        for framebuffer in state.framebuffers.drain(..) {
            if framebuffer != vk::Framebuffer::null() {
                device.destroy_framebuffer(framebuffer);
            }
        }
        for view in state.views.drain(..) {
            if view != vk::ImageView::null() {
                device.destroy_image_view(view);
            }
        }
        // Images belong to the swapchain
        state.images.clear();

        if state.handle != vk::SwapchainKHR::null() {
            device.destroy_swapchain(state.handle);
            state.handle = vk::SwapchainKHR::null();
        }

        if teardown == Teardown::ReleaseSurface && self.surface != vk::SurfaceKHR::null() {
            device.destroy_surface(self.surface);
            self.surface = vk::SurfaceKHR::null();
        }
    }

    /// Replace `state` with a swapchain for the new size.
    ///
    /// Waits for the device to go idle first so nothing in flight still
    /// references the old images. Presentation support is re-checked before
    /// building again. On error `state` is left empty.
    pub fn recreate<D: PresentDevice>(
        &mut self,
        device: &D,
        state: &mut SwapchainState,
        width: u32,
        height: u32,
    ) -> Result<()> {
        device.wait_idle()?;
        self.destroy(device, state, Teardown::KeepSurface);
        self.validate_presentation(device)?;
        *state = self.create(device, width, height)?;
        Ok(())
    }

    /// Release the render pass. Safe to call more than once.
    pub fn destroy_render_pass<D: PresentDevice>(&mut self, device: &D) {
        if self.render_pass != vk::RenderPass::null() {
            device.destroy_render_pass(self.render_pass);
            self.render_pass = vk::RenderPass::null();
        }
    }
}
