//! Scripted in-memory device for exercising the loop without a GPU.
//!
//! Handles are numbered from a single counter and printed as `kind#n` in the
//! event log. Destroying a handle that is not live panics.

use crate::device::{CommandEncoder, DeviceQueues, PresentDevice, Submission, SwapchainDesc};
use ash::prelude::VkResult;
use ash::vk::{self, Handle};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};
use swapline_gpu::{FenceWait, SurfaceCapabilities};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FenceState {
    Signaled,
    /// Reset and not submitted; waiting on it would never return.
    Unsignaled,
    /// Submitted; signals as soon as someone waits on it.
    Pending,
}

/// Scripted acquire result.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Acquire {
    /// Next image in round-robin order.
    Next,
    /// A specific image index.
    Index(u32),
    Suboptimal,
    Fail(vk::Result),
}

struct MockState {
    next_handle: u64,
    kinds: HashMap<u64, &'static str>,
    live: HashSet<u64>,
    events: Vec<String>,

    caps: SurfaceCapabilities,
    presentation_supported: bool,
    last_swapchain_families: Vec<u32>,
    swapchain_images: HashMap<u64, u32>,
    next_image: u32,

    fences: HashMap<u64, FenceState>,
    fence_timeouts: u32,
    acquire_script: VecDeque<Acquire>,
    submit_script: VecDeque<vk::Result>,
    present_script: VecDeque<VkResult<bool>>,

    last_acquired: Option<u32>,
    image_fences: HashMap<u32, u64>,
    overlapping_fences: u32,
}

impl MockState {
    fn handle(&mut self, kind: &'static str) -> u64 {
        let raw = self.next_handle;
        self.next_handle += 1;
        self.kinds.insert(raw, kind);
        self.live.insert(raw);
        raw
    }

    fn name(&self, raw: u64) -> String {
        format!("{}#{raw}", self.kinds.get(&raw).copied().unwrap_or("unknown"))
    }

    fn release(&mut self, op: &str, raw: u64) {
        assert!(self.live.remove(&raw), "{op} on dead handle {}", self.name(raw));
        let event = format!("{op} {}", self.name(raw));
        self.events.push(event);
    }
}

pub(crate) struct MockDevice {
    state: Mutex<MockState>,
}

impl MockDevice {
    pub(crate) const MIN_EXTENT: vk::Extent2D = vk::Extent2D {
        width: 64,
        height: 48,
    };

    pub(crate) fn new() -> Self {
        let caps = SurfaceCapabilities {
            capabilities: vk::SurfaceCapabilitiesKHR {
                min_image_count: 2,
                max_image_count: 3,
                current_extent: vk::Extent2D {
                    width: u32::MAX,
                    height: u32::MAX,
                },
                min_image_extent: Self::MIN_EXTENT,
                max_image_extent: vk::Extent2D {
                    width: 4096,
                    height: 4096,
                },
                max_image_array_layers: 1,
                supported_transforms: vk::SurfaceTransformFlagsKHR::IDENTITY,
                current_transform: vk::SurfaceTransformFlagsKHR::IDENTITY,
                supported_composite_alpha: vk::CompositeAlphaFlagsKHR::OPAQUE,
                ..Default::default()
            },
            formats: vec![vk::SurfaceFormatKHR {
                format: vk::Format::B8G8R8A8_SRGB,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            }],
            present_modes: vec![vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX],
        };

        let mut state = MockState {
            next_handle: 1,
            kinds: HashMap::new(),
            live: HashSet::new(),
            events: Vec::new(),
            caps,
            presentation_supported: true,
            last_swapchain_families: Vec::new(),
            swapchain_images: HashMap::new(),
            next_image: 0,
            fences: HashMap::new(),
            fence_timeouts: 0,
            acquire_script: VecDeque::new(),
            submit_script: VecDeque::new(),
            present_script: VecDeque::new(),
            last_acquired: None,
            image_fences: HashMap::new(),
            overlapping_fences: 0,
        };
        // The surface always comes first
        state.handle("surface");

        Self {
            state: Mutex::new(state),
        }
    }

    pub(crate) fn surface(&self) -> vk::SurfaceKHR {
        vk::SurfaceKHR::from_raw(1)
    }

    pub(crate) fn take_events(&self) -> Vec<String> {
        std::mem::take(&mut self.state.lock().events)
    }

    pub(crate) fn set_formats(&self, formats: &[vk::Format]) {
        self.state.lock().caps.formats = formats
            .iter()
            .map(|&format| vk::SurfaceFormatKHR {
                format,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            })
            .collect();
    }

    pub(crate) fn set_present_modes(&self, modes: &[vk::PresentModeKHR]) {
        self.state.lock().caps.present_modes = modes.to_vec();
    }

    pub(crate) fn set_current_extent(&self, extent: vk::Extent2D) {
        self.state.lock().caps.capabilities.current_extent = extent;
    }

    pub(crate) fn set_image_count_range(&self, min: u32, max: u32) {
        let mut state = self.state.lock();
        state.caps.capabilities.min_image_count = min;
        state.caps.capabilities.max_image_count = max;
    }

    pub(crate) fn set_presentation_supported(&self, supported: bool) {
        self.state.lock().presentation_supported = supported;
    }

    pub(crate) fn last_swapchain_families(&self) -> Vec<u32> {
        self.state.lock().last_swapchain_families.clone()
    }

    /// Make the next `count` fence waits time out.
    pub(crate) fn script_fence_timeouts(&self, count: u32) {
        self.state.lock().fence_timeouts = count;
    }

    pub(crate) fn script_acquire(&self, steps: &[Acquire]) {
        self.state.lock().acquire_script.extend(steps.iter().copied());
    }

    pub(crate) fn fail_next_submit(&self, error: vk::Result) {
        self.state.lock().submit_script.push_back(error);
    }

    pub(crate) fn script_present(&self, result: VkResult<bool>) {
        self.state.lock().present_script.push_back(result);
    }

    /// Submissions that targeted an image while another fence was still pending on it.
    pub(crate) fn overlapping_fences(&self) -> u32 {
        self.state.lock().overlapping_fences
    }

    /// Handles created and not yet destroyed, surface included.
    pub(crate) fn live_handles(&self) -> usize {
        self.state.lock().live.len()
    }
}

impl CommandEncoder for MockDevice {
    fn reset_command_buffer(&self, _cmd: vk::CommandBuffer) -> VkResult<()> {
        Ok(())
    }

    fn begin_command_buffer(&self, cmd: vk::CommandBuffer) -> VkResult<()> {
        let mut state = self.state.lock();
        let event = format!("record {}", state.name(cmd.as_raw()));
        state.events.push(event);
        Ok(())
    }

    fn end_command_buffer(&self, _cmd: vk::CommandBuffer) -> VkResult<()> {
        Ok(())
    }

    fn cmd_begin_render_pass(
        &self,
        _cmd: vk::CommandBuffer,
        _render_pass: vk::RenderPass,
        _framebuffer: vk::Framebuffer,
        _render_area: vk::Rect2D,
        _clear_values: &[vk::ClearValue],
    ) {
    }

    fn cmd_end_render_pass(&self, _cmd: vk::CommandBuffer) {}

    fn cmd_bind_pipeline(
        &self,
        _cmd: vk::CommandBuffer,
        _bind_point: vk::PipelineBindPoint,
        _pipeline: vk::Pipeline,
    ) {
    }

    fn cmd_bind_descriptor_sets(
        &self,
        _cmd: vk::CommandBuffer,
        _bind_point: vk::PipelineBindPoint,
        _layout: vk::PipelineLayout,
        _sets: &[vk::DescriptorSet],
    ) {
    }

    fn cmd_bind_vertex_buffers(&self, _cmd: vk::CommandBuffer, _buffers: &[vk::Buffer]) {}

    fn cmd_set_viewport(&self, _cmd: vk::CommandBuffer, viewport: vk::Viewport) {
        let event = format!("viewport {}x{}", viewport.width, viewport.height);
        self.state.lock().events.push(event);
    }

    fn cmd_set_scissor(&self, _cmd: vk::CommandBuffer, _scissor: vk::Rect2D) {}

    fn cmd_draw(&self, _cmd: vk::CommandBuffer, vertex_count: u32, instance_count: u32) {
        let event = format!("draw {vertex_count}x{instance_count}");
        self.state.lock().events.push(event);
    }

    fn cmd_dispatch(&self, _cmd: vk::CommandBuffer, group_count: [u32; 3]) {
        let [x, y, z] = group_count;
        self.state.lock().events.push(format!("dispatch {x}x{y}x{z}"));
    }

    fn cmd_compute_to_graphics_barrier(&self, _cmd: vk::CommandBuffer) {
        self.state.lock().events.push("barrier".to_string());
    }
}

impl PresentDevice for MockDevice {
    fn queues(&self) -> DeviceQueues {
        DeviceQueues {
            graphics: vk::Queue::null(),
            present: vk::Queue::null(),
            graphics_family: 0,
            present_family: 0,
        }
    }

    fn surface_capabilities(&self, _surface: vk::SurfaceKHR) -> VkResult<SurfaceCapabilities> {
        Ok(self.state.lock().caps.clone())
    }

    fn supports_presentation(&self, _queue_family: u32, _surface: vk::SurfaceKHR) -> VkResult<bool> {
        Ok(self.state.lock().presentation_supported)
    }

    fn destroy_surface(&self, surface: vk::SurfaceKHR) {
        self.state.lock().release("destroy_surface", surface.as_raw());
    }

    fn create_swapchain(&self, desc: &SwapchainDesc<'_>) -> VkResult<vk::SwapchainKHR> {
        let mut state = self.state.lock();
        let raw = state.handle("swapchain");
        state.swapchain_images.insert(raw, desc.min_image_count);
        state.last_swapchain_families = desc.queue_families.to_vec();
        state.next_image = 0;
        let event = format!(
            "create_swapchain {} {}x{}",
            state.name(raw),
            desc.extent.width,
            desc.extent.height
        );
        state.events.push(event);
        Ok(vk::SwapchainKHR::from_raw(raw))
    }

    fn swapchain_images(&self, swapchain: vk::SwapchainKHR) -> VkResult<Vec<vk::Image>> {
        let mut state = self.state.lock();
        let count = state
            .swapchain_images
            .get(&swapchain.as_raw())
            .copied()
            .ok_or(vk::Result::ERROR_UNKNOWN)?;
        let images = (0..count)
            .map(|_| {
                let raw = state.handle("image");
                // Images are owned by the swapchain, never destroyed individually
                state.live.remove(&raw);
                vk::Image::from_raw(raw)
            })
            .collect();
        Ok(images)
    }

    fn destroy_swapchain(&self, swapchain: vk::SwapchainKHR) {
        let mut state = self.state.lock();
        state.release("destroy_swapchain", swapchain.as_raw());
        state.image_fences.clear();
    }

    fn create_image_view(&self, _image: vk::Image, _format: vk::Format) -> VkResult<vk::ImageView> {
        Ok(vk::ImageView::from_raw(self.state.lock().handle("view")))
    }

    fn destroy_image_view(&self, view: vk::ImageView) {
        self.state.lock().release("destroy_image_view", view.as_raw());
    }

    fn create_render_pass(&self, _format: vk::Format) -> VkResult<vk::RenderPass> {
        Ok(vk::RenderPass::from_raw(
            self.state.lock().handle("render_pass"),
        ))
    }

    fn destroy_render_pass(&self, render_pass: vk::RenderPass) {
        self.state
            .lock()
            .release("destroy_render_pass", render_pass.as_raw());
    }

    fn create_framebuffer(
        &self,
        _render_pass: vk::RenderPass,
        _view: vk::ImageView,
        _extent: vk::Extent2D,
    ) -> VkResult<vk::Framebuffer> {
        Ok(vk::Framebuffer::from_raw(
            self.state.lock().handle("framebuffer"),
        ))
    }

    fn destroy_framebuffer(&self, framebuffer: vk::Framebuffer) {
        self.state
            .lock()
            .release("destroy_framebuffer", framebuffer.as_raw());
    }

    fn create_semaphore(&self) -> VkResult<vk::Semaphore> {
        Ok(vk::Semaphore::from_raw(self.state.lock().handle("semaphore")))
    }

    fn destroy_semaphore(&self, semaphore: vk::Semaphore) {
        self.state
            .lock()
            .release("destroy_semaphore", semaphore.as_raw());
    }

    fn create_fence(&self, signaled: bool) -> VkResult<vk::Fence> {
        let mut state = self.state.lock();
        let raw = state.handle("fence");
        let fence_state = if signaled {
            FenceState::Signaled
        } else {
            FenceState::Unsignaled
        };
        state.fences.insert(raw, fence_state);
        Ok(vk::Fence::from_raw(raw))
    }

    fn destroy_fence(&self, fence: vk::Fence) {
        let mut state = self.state.lock();
        if state.fences.get(&fence.as_raw()) == Some(&FenceState::Pending) {
            panic!("{} destroyed while pending", state.name(fence.as_raw()));
        }
        state.release("destroy_fence", fence.as_raw());
    }

    fn wait_for_fence(&self, fence: vk::Fence, _timeout_ns: u64) -> VkResult<FenceWait> {
        let mut state = self.state.lock();
        let raw = fence.as_raw();
        let name = state.name(raw);

        if state.fence_timeouts > 0 {
            state.fence_timeouts -= 1;
            state.events.push(format!("wait_fence {name} [timeout]"));
            return Ok(FenceWait::TimedOut);
        }

        match state.fences.get(&raw).copied() {
            Some(FenceState::Signaled) => {
                state.events.push(format!("wait_fence {name} [signaled]"));
                Ok(FenceWait::Signaled)
            }
            Some(FenceState::Pending) => {
                state.fences.insert(raw, FenceState::Signaled);
                state.events.push(format!("wait_fence {name} [pending]"));
                Ok(FenceWait::Signaled)
            }
            Some(FenceState::Unsignaled) | None => {
                state.events.push(format!("wait_fence {name} [never submitted]"));
                Err(vk::Result::ERROR_DEVICE_LOST)
            }
        }
    }

    fn reset_fence(&self, fence: vk::Fence) -> VkResult<()> {
        let mut state = self.state.lock();
        let raw = fence.as_raw();
        if state.fences.get(&raw) == Some(&FenceState::Pending) {
            panic!("{} reset while pending", state.name(raw));
        }
        state.fences.insert(raw, FenceState::Unsignaled);
        let event = format!("reset_fence {}", state.name(raw));
        state.events.push(event);
        Ok(())
    }

    fn allocate_command_buffers(&self, count: u32) -> VkResult<Vec<vk::CommandBuffer>> {
        let mut state = self.state.lock();
        Ok((0..count)
            .map(|_| vk::CommandBuffer::from_raw(state.handle("cmd")))
            .collect())
    }

    fn free_command_buffers(&self, buffers: &[vk::CommandBuffer]) {
        let mut state = self.state.lock();
        let mut names = Vec::with_capacity(buffers.len());
        for cmd in buffers {
            let raw = cmd.as_raw();
            assert!(state.live.remove(&raw), "double free of {}", state.name(raw));
            names.push(state.name(raw));
        }
        state
            .events
            .push(format!("free_command_buffers {}", names.join(" ")));
    }

    fn acquire_next_image(
        &self,
        swapchain: vk::SwapchainKHR,
        _timeout_ns: u64,
        _signal: vk::Semaphore,
    ) -> VkResult<(u32, bool)> {
        let mut state = self.state.lock();
        let name = state.name(swapchain.as_raw());
        let count = state
            .swapchain_images
            .get(&swapchain.as_raw())
            .copied()
            .unwrap_or(1);

        let step = state.acquire_script.pop_front().unwrap_or(Acquire::Next);
        let mut round_robin = || {
            let index = state.next_image % count;
            state.next_image += 1;
            index
        };
        let result = match step {
            Acquire::Next => Ok((round_robin(), false)),
            Acquire::Suboptimal => Ok((round_robin(), true)),
            Acquire::Index(index) => Ok((index, false)),
            Acquire::Fail(e) => Err(e),
        };

        let event = match result {
            Ok((index, false)) => format!("acquire {name} -> {index}"),
            Ok((index, true)) => format!("acquire {name} -> {index} suboptimal"),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => format!("acquire {name} -> out_of_date"),
            Err(e) => format!("acquire {name} -> {e:?}"),
        };
        state.events.push(event);
        state.last_acquired = result.ok().map(|(index, _)| index);
        result
    }

    fn submit(&self, _queue: vk::Queue, submission: &Submission) -> VkResult<()> {
        let mut state = self.state.lock();
        let fence = submission.fence.as_raw();

        if let Some(e) = state.submit_script.pop_front() {
            state.events.push(format!("submit -> {e:?}"));
            return Err(e);
        }

        if let Some(image) = state.last_acquired {
            let previous = state.image_fences.get(&image).copied();
            if let Some(previous) = previous {
                let still_pending = state.fences.get(&previous) == Some(&FenceState::Pending);
                if previous != fence && still_pending {
                    state.overlapping_fences += 1;
                }
            }
            state.image_fences.insert(image, fence);
        }
        state.fences.insert(fence, FenceState::Pending);

        let event = format!(
            "submit {} wait={} signal={} fence={}",
            state.name(submission.command_buffer.as_raw()),
            state.name(submission.wait_semaphore.as_raw()),
            state.name(submission.signal_semaphore.as_raw()),
            state.name(fence)
        );
        state.events.push(event);
        Ok(())
    }

    fn present(
        &self,
        _queue: vk::Queue,
        swapchain: vk::SwapchainKHR,
        image_index: u32,
        wait: vk::Semaphore,
    ) -> VkResult<bool> {
        let mut state = self.state.lock();
        let event = format!(
            "present {} image={image_index} wait={}",
            state.name(swapchain.as_raw()),
            state.name(wait.as_raw())
        );
        state.events.push(event);
        state.present_script.pop_front().unwrap_or(Ok(false))
    }

    fn wait_idle(&self) -> VkResult<()> {
        let mut state = self.state.lock();
        for fence_state in state.fences.values_mut() {
            if *fence_state == FenceState::Pending {
                *fence_state = FenceState::Signaled;
            }
        }
        state.events.push("wait_idle".to_string());
        Ok(())
    }
}
