//! Device seam used by the presentation loop.
//!
//! The loop only ever hands an implementation handles that the same
//! implementation created, and never destroys a handle while GPU work that
//! references it may still be pending.

use ash::prelude::VkResult;
use ash::vk;
use swapline_gpu::{FenceWait, SurfaceCapabilities};

/// Queues and families the loop submits and presents on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceQueues {
    pub graphics: vk::Queue,
    pub present: vk::Queue,
    pub graphics_family: u32,
    pub present_family: u32,
}

/// Everything needed to create a swapchain.
#[derive(Debug, Clone, Copy)]
pub struct SwapchainDesc<'a> {
    pub surface: vk::SurfaceKHR,
    pub min_image_count: u32,
    pub format: vk::SurfaceFormatKHR,
    pub extent: vk::Extent2D,
    pub present_mode: vk::PresentModeKHR,
    pub sharing_mode: vk::SharingMode,
    pub queue_families: &'a [u32],
    pub pre_transform: vk::SurfaceTransformFlagsKHR,
    pub composite_alpha: vk::CompositeAlphaFlagsKHR,
}

/// One queue submission: exactly one wait, one signal, one fence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Submission {
    pub command_buffer: vk::CommandBuffer,
    pub wait_semaphore: vk::Semaphore,
    pub wait_stage: vk::PipelineStageFlags,
    pub signal_semaphore: vk::Semaphore,
    pub fence: vk::Fence,
}

/// Command recording calls used by [`CommandSubmitter`](crate::CommandSubmitter).
pub trait CommandEncoder {
    fn reset_command_buffer(&self, cmd: vk::CommandBuffer) -> VkResult<()>;
    fn begin_command_buffer(&self, cmd: vk::CommandBuffer) -> VkResult<()>;
    fn end_command_buffer(&self, cmd: vk::CommandBuffer) -> VkResult<()>;

    fn cmd_begin_render_pass(
        &self,
        cmd: vk::CommandBuffer,
        render_pass: vk::RenderPass,
        framebuffer: vk::Framebuffer,
        render_area: vk::Rect2D,
        clear_values: &[vk::ClearValue],
    );
    fn cmd_end_render_pass(&self, cmd: vk::CommandBuffer);

    fn cmd_bind_pipeline(
        &self,
        cmd: vk::CommandBuffer,
        bind_point: vk::PipelineBindPoint,
        pipeline: vk::Pipeline,
    );
    fn cmd_bind_descriptor_sets(
        &self,
        cmd: vk::CommandBuffer,
        bind_point: vk::PipelineBindPoint,
        layout: vk::PipelineLayout,
        sets: &[vk::DescriptorSet],
    );
    fn cmd_bind_vertex_buffers(&self, cmd: vk::CommandBuffer, buffers: &[vk::Buffer]);

    fn cmd_set_viewport(&self, cmd: vk::CommandBuffer, viewport: vk::Viewport);
    fn cmd_set_scissor(&self, cmd: vk::CommandBuffer, scissor: vk::Rect2D);

    fn cmd_draw(&self, cmd: vk::CommandBuffer, vertex_count: u32, instance_count: u32);
    fn cmd_dispatch(&self, cmd: vk::CommandBuffer, group_count: [u32; 3]);

    /// Make compute shader writes visible to the graphics stages that follow.
    fn cmd_compute_to_graphics_barrier(&self, cmd: vk::CommandBuffer);
}

/// Device operations the presentation loop depends on.
///
/// Errors are raw `vk::Result` codes; the loop maps them onto
/// [`PresentError`](crate::PresentError) kinds depending on the call site.
pub trait PresentDevice: CommandEncoder {
    fn queues(&self) -> DeviceQueues;

    fn surface_capabilities(&self, surface: vk::SurfaceKHR) -> VkResult<SurfaceCapabilities>;
    fn supports_presentation(&self, queue_family: u32, surface: vk::SurfaceKHR) -> VkResult<bool>;
    fn destroy_surface(&self, surface: vk::SurfaceKHR);

    fn create_swapchain(&self, desc: &SwapchainDesc<'_>) -> VkResult<vk::SwapchainKHR>;
    fn swapchain_images(&self, swapchain: vk::SwapchainKHR) -> VkResult<Vec<vk::Image>>;
    fn destroy_swapchain(&self, swapchain: vk::SwapchainKHR);

    fn create_image_view(&self, image: vk::Image, format: vk::Format) -> VkResult<vk::ImageView>;
    fn destroy_image_view(&self, view: vk::ImageView);

    fn create_render_pass(&self, format: vk::Format) -> VkResult<vk::RenderPass>;
    fn destroy_render_pass(&self, render_pass: vk::RenderPass);

    fn create_framebuffer(
        &self,
        render_pass: vk::RenderPass,
        view: vk::ImageView,
        extent: vk::Extent2D,
    ) -> VkResult<vk::Framebuffer>;
    fn destroy_framebuffer(&self, framebuffer: vk::Framebuffer);

    fn create_semaphore(&self) -> VkResult<vk::Semaphore>;
    fn destroy_semaphore(&self, semaphore: vk::Semaphore);

    fn create_fence(&self, signaled: bool) -> VkResult<vk::Fence>;
    fn destroy_fence(&self, fence: vk::Fence);
    /// Bounded wait. `TIMEOUT` is reported as [`FenceWait::TimedOut`], not as an error.
    fn wait_for_fence(&self, fence: vk::Fence, timeout_ns: u64) -> VkResult<FenceWait>;
    fn reset_fence(&self, fence: vk::Fence) -> VkResult<()>;

    fn allocate_command_buffers(&self, count: u32) -> VkResult<Vec<vk::CommandBuffer>>;
    fn free_command_buffers(&self, buffers: &[vk::CommandBuffer]);

    /// Returns the image index and whether the swapchain is suboptimal.
    fn acquire_next_image(
        &self,
        swapchain: vk::SwapchainKHR,
        timeout_ns: u64,
        signal: vk::Semaphore,
    ) -> VkResult<(u32, bool)>;
    fn submit(&self, queue: vk::Queue, submission: &Submission) -> VkResult<()>;
    /// Returns whether the swapchain is suboptimal.
    fn present(
        &self,
        queue: vk::Queue,
        swapchain: vk::SwapchainKHR,
        image_index: u32,
        wait: vk::Semaphore,
    ) -> VkResult<bool>;

    fn wait_idle(&self) -> VkResult<()>;
}
