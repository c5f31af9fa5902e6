//! Application context.

use std::sync::Arc;

use ash::vk;
use swapline_gpu::{GpuContext, GpuContextBuilder};
use swapline_platform::ResizeTracker;
use swapline_present::{FramePass, PresentConfig, PresentationLoop, VulkanPresentDevice};
use winit::window::Window;

/// Application context shared across all app methods.
///
/// Fields drop in declaration order: the presentation loop goes first, the
/// window last.
pub struct AppContext {
    /// Presentation loop driving the window surface.
    pub presentation: PresentationLoop<VulkanPresentDevice>,
    /// Device the presentation loop runs on.
    pub device: Arc<VulkanPresentDevice>,
    /// GPU context with device and queues.
    pub gpu: Arc<GpuContext>,
    /// Pending resize, applied at the start of the next frame.
    pub(crate) resize: ResizeTracker,
    /// The window handle.
    pub window: Arc<Window>,
}

impl AppContext {
    /// Create the GPU context, surface and presentation loop for `window`.
    pub(crate) fn new(
        window: Arc<Window>,
        validation: bool,
        app_name: &str,
        config: PresentConfig,
    ) -> anyhow::Result<Self> {
        let (gpu, surface) = GpuContextBuilder::new()
            .app_name(app_name)
            .validation(validation)
            .build_with_window(window.as_ref())?;
        let gpu = Arc::new(gpu);

        tracing::info!("GPU: {}", gpu.device_name());

        let surface_handle = surface.surface;
        let device = Arc::new(VulkanPresentDevice::new(Arc::clone(&gpu), surface)?);

        let size = window.inner_size();
        let presentation = PresentationLoop::initialize(
            Arc::clone(&device),
            surface_handle,
            size.width,
            size.height,
            config,
        )?;

        Ok(Self {
            presentation,
            device,
            gpu,
            resize: ResizeTracker::new(),
            window,
        })
    }

    /// Get the Vulkan device handle.
    pub fn device(&self) -> &ash::Device {
        self.gpu.device()
    }

    /// Render pass pipelines must be built against.
    pub fn render_pass(&self) -> vk::RenderPass {
        self.presentation.render_pass()
    }

    /// Get the current swapchain extent.
    pub fn extent(&self) -> vk::Extent2D {
        self.presentation.extent()
    }

    /// Get the aspect ratio (width / height), 1.0 while there is no swapchain.
    #[allow(clippy::cast_precision_loss)]
    pub fn aspect_ratio(&self) -> f32 {
        let extent = self.extent();
        if extent.height == 0 {
            1.0
        } else {
            extent.width as f32 / extent.height as f32
        }
    }

    /// Frames presented so far.
    pub fn frame_count(&self) -> u64 {
        self.presentation.frame_count()
    }

    /// Replace what gets recorded into each frame.
    pub fn set_frame_pass(&mut self, pass: FramePass) {
        self.presentation.set_frame_pass(pass);
    }
}
