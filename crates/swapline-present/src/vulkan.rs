//! `ash`-backed [`PresentDevice`].

use crate::device::{CommandEncoder, DeviceQueues, PresentDevice, Submission, SwapchainDesc};
use ash::prelude::VkResult;
use ash::vk;
use std::sync::Arc;
use swapline_gpu::command::{self, CommandPool};
use swapline_gpu::{sync, FenceWait, GpuContext, GpuError, SurfaceCapabilities, SurfaceContext};

fn vk_error(error: GpuError) -> vk::Result {
    error.vk_result()
}

/// Presentation device for a window surface on a [`GpuContext`].
///
/// Owns the command pool frame slots allocate from. The surface itself is
/// released through [`PresentDevice::destroy_surface`] by whoever owns it.
pub struct VulkanPresentDevice {
    gpu: Arc<GpuContext>,
    surface: SurfaceContext,
    command_pool: CommandPool,
    queues: DeviceQueues,
}

impl VulkanPresentDevice {
    /// Wrap a context built with a window. Fails if the context has no
    /// presentation queue.
    pub fn new(gpu: Arc<GpuContext>, surface: SurfaceContext) -> swapline_gpu::Result<Self> {
        let families = gpu.queue_families();
        let (present, present_family) = gpu
            .present_queue()
            .zip(families.present)
            .ok_or_else(|| GpuError::InvalidState("context has no presentation queue".into()))?;

        let queues = DeviceQueues {
            graphics: gpu.graphics_queue(),
            present,
            graphics_family: families.graphics,
            present_family,
        };

        let command_pool = unsafe {
            CommandPool::new(
                gpu.device(),
                families.graphics,
                vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER,
            )?
        };

        Ok(Self {
            gpu,
            surface,
            command_pool,
            queues,
        })
    }

    pub fn gpu(&self) -> &Arc<GpuContext> {
        &self.gpu
    }

    /// The window surface this device was created for.
    pub fn surface_handle(&self) -> vk::SurfaceKHR {
        self.surface.surface
    }

    fn device(&self) -> &ash::Device {
        self.gpu.device()
    }
}

impl Drop for VulkanPresentDevice {
    fn drop(&mut self) {
        unsafe {
            let _ = self.gpu.device().device_wait_idle();
            self.command_pool.destroy(self.gpu.device());
        }
    }
}

impl CommandEncoder for VulkanPresentDevice {
    fn reset_command_buffer(&self, cmd: vk::CommandBuffer) -> VkResult<()> {
        unsafe {
            self.device()
                .reset_command_buffer(cmd, vk::CommandBufferResetFlags::empty())
        }
    }

    fn begin_command_buffer(&self, cmd: vk::CommandBuffer) -> VkResult<()> {
        unsafe {
            command::begin_command_buffer(
                self.device(),
                cmd,
                vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT,
            )
            .map_err(vk_error)
        }
    }

    fn end_command_buffer(&self, cmd: vk::CommandBuffer) -> VkResult<()> {
        unsafe { command::end_command_buffer(self.device(), cmd).map_err(vk_error) }
    }

    fn cmd_begin_render_pass(
        &self,
        cmd: vk::CommandBuffer,
        render_pass: vk::RenderPass,
        framebuffer: vk::Framebuffer,
        render_area: vk::Rect2D,
        clear_values: &[vk::ClearValue],
    ) {
        let begin_info = vk::RenderPassBeginInfo::default()
            .render_pass(render_pass)
            .framebuffer(framebuffer)
            .render_area(render_area)
            .clear_values(clear_values);
        unsafe {
            self.device()
                .cmd_begin_render_pass(cmd, &begin_info, vk::SubpassContents::INLINE);
        }
    }

    fn cmd_end_render_pass(&self, cmd: vk::CommandBuffer) {
        unsafe { self.device().cmd_end_render_pass(cmd) }
    }

    fn cmd_bind_pipeline(
        &self,
        cmd: vk::CommandBuffer,
        bind_point: vk::PipelineBindPoint,
        pipeline: vk::Pipeline,
    ) {
        unsafe { self.device().cmd_bind_pipeline(cmd, bind_point, pipeline) }
    }

    fn cmd_bind_descriptor_sets(
        &self,
        cmd: vk::CommandBuffer,
        bind_point: vk::PipelineBindPoint,
        layout: vk::PipelineLayout,
        sets: &[vk::DescriptorSet],
    ) {
        unsafe {
            self.device()
                .cmd_bind_descriptor_sets(cmd, bind_point, layout, 0, sets, &[]);
        }
    }

    fn cmd_bind_vertex_buffers(&self, cmd: vk::CommandBuffer, buffers: &[vk::Buffer]) {
        let offsets = vec![0; buffers.len()];
        unsafe {
            self.device()
                .cmd_bind_vertex_buffers(cmd, 0, buffers, &offsets);
        }
    }

    fn cmd_set_viewport(&self, cmd: vk::CommandBuffer, viewport: vk::Viewport) {
        unsafe { self.device().cmd_set_viewport(cmd, 0, &[viewport]) }
    }

    fn cmd_set_scissor(&self, cmd: vk::CommandBuffer, scissor: vk::Rect2D) {
        unsafe { self.device().cmd_set_scissor(cmd, 0, &[scissor]) }
    }

    fn cmd_draw(&self, cmd: vk::CommandBuffer, vertex_count: u32, instance_count: u32) {
        unsafe {
            self.device()
                .cmd_draw(cmd, vertex_count, instance_count, 0, 0);
        }
    }

    fn cmd_dispatch(&self, cmd: vk::CommandBuffer, group_count: [u32; 3]) {
        let [x, y, z] = group_count;
        unsafe { self.device().cmd_dispatch(cmd, x, y, z) }
    }

    fn cmd_compute_to_graphics_barrier(&self, cmd: vk::CommandBuffer) {
        let barrier = vk::MemoryBarrier::default()
            .src_access_mask(vk::AccessFlags::SHADER_WRITE)
            .dst_access_mask(vk::AccessFlags::VERTEX_ATTRIBUTE_READ | vk::AccessFlags::SHADER_READ);
        unsafe {
            self.device().cmd_pipeline_barrier(
                cmd,
                vk::PipelineStageFlags::COMPUTE_SHADER,
                vk::PipelineStageFlags::VERTEX_INPUT
                    | vk::PipelineStageFlags::VERTEX_SHADER
                    | vk::PipelineStageFlags::FRAGMENT_SHADER,
                vk::DependencyFlags::empty(),
                &[barrier],
                &[],
                &[],
            );
        }
    }
}

impl PresentDevice for VulkanPresentDevice {
    fn queues(&self) -> DeviceQueues {
        self.queues
    }

    fn surface_capabilities(&self, surface: vk::SurfaceKHR) -> VkResult<SurfaceCapabilities> {
        let loader = &self.surface.surface_loader;
        let physical_device = self.gpu.physical_device();
        unsafe {
            Ok(SurfaceCapabilities {
                capabilities: loader
                    .get_physical_device_surface_capabilities(physical_device, surface)?,
                formats: loader.get_physical_device_surface_formats(physical_device, surface)?,
                present_modes: loader
                    .get_physical_device_surface_present_modes(physical_device, surface)?,
            })
        }
    }

    fn supports_presentation(&self, queue_family: u32, surface: vk::SurfaceKHR) -> VkResult<bool> {
        self.surface
            .supports_present(self.gpu.physical_device(), queue_family, surface)
            .map_err(vk_error)
    }

    fn destroy_surface(&self, surface: vk::SurfaceKHR) {
        unsafe { self.surface.destroy_surface(surface) }
    }

    fn create_swapchain(&self, desc: &SwapchainDesc<'_>) -> VkResult<vk::SwapchainKHR> {
        let create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(desc.surface)
            .min_image_count(desc.min_image_count)
            .image_format(desc.format.format)
            .image_color_space(desc.format.color_space)
            .image_extent(desc.extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(desc.sharing_mode)
            .queue_family_indices(desc.queue_families)
            .pre_transform(desc.pre_transform)
            .composite_alpha(desc.composite_alpha)
            .present_mode(desc.present_mode)
            .clipped(true);

        unsafe {
            self.surface
                .swapchain_loader
                .create_swapchain(&create_info, None)
        }
    }

    fn swapchain_images(&self, swapchain: vk::SwapchainKHR) -> VkResult<Vec<vk::Image>> {
        unsafe { self.surface.swapchain_loader.get_swapchain_images(swapchain) }
    }

    fn destroy_swapchain(&self, swapchain: vk::SwapchainKHR) {
        unsafe {
            self.surface
                .swapchain_loader
                .destroy_swapchain(swapchain, None);
        }
    }

    fn create_image_view(&self, image: vk::Image, format: vk::Format) -> VkResult<vk::ImageView> {
        let create_info = vk::ImageViewCreateInfo::default()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(format)
            .components(vk::ComponentMapping::default())
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: 1,
            });

        unsafe { self.device().create_image_view(&create_info, None) }
    }

    fn destroy_image_view(&self, view: vk::ImageView) {
        unsafe { self.device().destroy_image_view(view, None) }
    }

    fn create_render_pass(&self, format: vk::Format) -> VkResult<vk::RenderPass> {
        unsafe { swapline_gpu::create_render_pass(self.device(), format).map_err(vk_error) }
    }

    fn destroy_render_pass(&self, render_pass: vk::RenderPass) {
        unsafe { self.device().destroy_render_pass(render_pass, None) }
    }

    fn create_framebuffer(
        &self,
        render_pass: vk::RenderPass,
        view: vk::ImageView,
        extent: vk::Extent2D,
    ) -> VkResult<vk::Framebuffer> {
        let attachments = [view];
        let create_info = vk::FramebufferCreateInfo::default()
            .render_pass(render_pass)
            .attachments(&attachments)
            .width(extent.width)
            .height(extent.height)
            .layers(1);

        unsafe { self.device().create_framebuffer(&create_info, None) }
    }

    fn destroy_framebuffer(&self, framebuffer: vk::Framebuffer) {
        unsafe { self.device().destroy_framebuffer(framebuffer, None) }
    }

    fn create_semaphore(&self) -> VkResult<vk::Semaphore> {
        unsafe { sync::create_semaphore(self.device()).map_err(vk_error) }
    }

    fn destroy_semaphore(&self, semaphore: vk::Semaphore) {
        unsafe { self.device().destroy_semaphore(semaphore, None) }
    }

    fn create_fence(&self, signaled: bool) -> VkResult<vk::Fence> {
        unsafe { sync::create_fence(self.device(), signaled).map_err(vk_error) }
    }

    fn destroy_fence(&self, fence: vk::Fence) {
        unsafe { self.device().destroy_fence(fence, None) }
    }

    fn wait_for_fence(&self, fence: vk::Fence, timeout_ns: u64) -> VkResult<FenceWait> {
        unsafe { sync::wait_for_fence(self.device(), fence, timeout_ns).map_err(vk_error) }
    }

    fn reset_fence(&self, fence: vk::Fence) -> VkResult<()> {
        unsafe { sync::reset_fence(self.device(), fence).map_err(vk_error) }
    }

    fn allocate_command_buffers(&self, count: u32) -> VkResult<Vec<vk::CommandBuffer>> {
        unsafe {
            self.command_pool
                .allocate_command_buffers(self.device(), count)
                .map_err(vk_error)
        }
    }

    fn free_command_buffers(&self, buffers: &[vk::CommandBuffer]) {
        unsafe {
            self.command_pool
                .free_command_buffers(self.device(), buffers);
        }
    }

    fn acquire_next_image(
        &self,
        swapchain: vk::SwapchainKHR,
        timeout_ns: u64,
        signal: vk::Semaphore,
    ) -> VkResult<(u32, bool)> {
        unsafe {
            self.surface.swapchain_loader.acquire_next_image(
                swapchain,
                timeout_ns,
                signal,
                vk::Fence::null(),
            )
        }
    }

    fn submit(&self, queue: vk::Queue, submission: &Submission) -> VkResult<()> {
        unsafe {
            command::submit_command_buffers(
                self.device(),
                queue,
                &[submission.command_buffer],
                &[submission.wait_semaphore],
                &[submission.wait_stage],
                &[submission.signal_semaphore],
                submission.fence,
            )
            .map_err(vk_error)
        }
    }

    fn present(
        &self,
        queue: vk::Queue,
        swapchain: vk::SwapchainKHR,
        image_index: u32,
        wait: vk::Semaphore,
    ) -> VkResult<bool> {
        let wait_semaphores = [wait];
        let swapchains = [swapchain];
        let image_indices = [image_index];
        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        unsafe {
            self.surface
                .swapchain_loader
                .queue_present(queue, &present_info)
        }
    }

    fn wait_idle(&self) -> VkResult<()> {
        self.gpu.wait_idle().map_err(vk_error)
    }
}
