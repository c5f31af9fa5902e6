//! The presentation loop: one acquire, record, submit and present per call.

use crate::config::PresentConfig;
use crate::device::{DeviceQueues, PresentDevice};
use crate::error::{PresentError, Result};
use crate::submit::{CommandSubmitter, FramePass};
use crate::swapchain::{SwapchainManager, SwapchainState, Teardown};
use crate::sync::{FrameSynchronizer, PresentStatus};
use ash::vk;
use std::sync::Arc;

/// Loop-level state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    /// No swapchain exists, e.g. the surface has zero area.
    Idle,
    SwapchainValid,
    /// Rebuilt on the next frame.
    SwapchainStale,
    ShuttingDown,
}

/// Result of [`PresentationLoop::run_one_frame`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    Presented {
        slot: usize,
        image_index: u32,
        /// Zero-based count of presented frames, unaffected by rebuilds.
        frame_number: u64,
    },
    /// Nothing to present to right now (zero-sized surface).
    Suspended,
}

/// Drives frames for one surface.
///
/// Single-threaded: resize notifications from other contexts must be
/// funneled to the thread calling [`run_one_frame`](Self::run_one_frame)
/// and passed in through [`handle_resize`](Self::handle_resize).
pub struct PresentationLoop<D: PresentDevice> {
    device: Arc<D>,
    queues: DeviceQueues,
    config: PresentConfig,
    swapchains: SwapchainManager,
    swapchain: SwapchainState,
    sync: FrameSynchronizer,
    submitter: CommandSubmitter,
    frame_pass: FramePass,
    state: LoopState,
    desired_extent: (u32, u32),
    pending_resize: bool,
    frame_count: u64,
    released: bool,
}

impl<D: PresentDevice> PresentationLoop<D> {
    /// Take over `surface` and build frame slots, the render pass and the
    /// first swapchain.
    ///
    /// A surface with zero area is not an error: the loop starts in
    /// [`LoopState::Idle`] and builds the swapchain once the surface has a
    /// size. On error everything created here is released, the surface included.
    pub fn initialize(
        device: Arc<D>,
        surface: vk::SurfaceKHR,
        width: u32,
        height: u32,
        config: PresentConfig,
    ) -> Result<Self> {
        let queues = device.queues();
        let mut presentation = Self {
            swapchains: SwapchainManager::new(
                surface,
                queues.graphics_family,
                queues.present_family,
                config.present_mode,
            ),
            swapchain: SwapchainState::default(),
            sync: FrameSynchronizer::empty(config.fence_timeout_ns, config.max_fence_timeouts),
            submitter: CommandSubmitter::new(config.clear_color),
            frame_pass: FramePass::clear_only(),
            state: LoopState::Idle,
            desired_extent: (width, height),
            pending_resize: false,
            frame_count: 0,
            released: false,
            device,
            queues,
            config,
        };

        // Drop releases whatever was built if this fails
        presentation.start()?;
        Ok(presentation)
    }

    fn start(&mut self) -> Result<()> {
        self.config.validate()?;
        let device = Arc::clone(&self.device);

        self.swapchains.validate_presentation(&*device)?;
        self.sync = FrameSynchronizer::new(
            &*device,
            self.config.max_in_flight,
            self.config.fence_timeout_ns,
            self.config.max_fence_timeouts,
        )?;

        let (width, height) = self.desired_extent;
        match self.swapchains.create(&*device, width, height) {
            Ok(swapchain) => {
                self.swapchain = swapchain;
                self.sync.reset_images(self.swapchain.image_count());
                self.state = LoopState::SwapchainValid;
            }
            Err(PresentError::SwapchainStale) => {
                tracing::debug!("Surface has zero area, deferring swapchain creation");
            }
            Err(e) => return Err(e),
        }

        tracing::info!(
            "Presentation loop ready: {} frames in flight, {:?}",
            self.sync.slot_count(),
            self.config.present_mode
        );
        Ok(())
    }

    /// Acquire, record, submit and present one frame on the current slot.
    ///
    /// A stale swapchain is rebuilt here, at most once per call; everything
    /// else that fails is returned and is fatal.
    #[cfg_attr(
        feature = "profiling-tracy",
        tracing::instrument(level = "trace", skip_all)
    )]
    pub fn run_one_frame(&mut self) -> Result<FrameOutcome> {
        if self.state == LoopState::ShuttingDown {
            return Err(PresentError::InvalidState(
                "run_one_frame after shutdown".to_string(),
            ));
        }

        if std::mem::take(&mut self.pending_resize) && self.state == LoopState::SwapchainValid {
            self.state = LoopState::SwapchainStale;
        }
        if self.state != LoopState::SwapchainValid && !self.rebuild()? {
            return Ok(FrameOutcome::Suspended);
        }

        let device = Arc::clone(&self.device);
        let slot = self.sync.current_slot();

        let image_index = match self.sync.begin_frame(&*device, &self.swapchain) {
            Ok(index) => index,
            Err(PresentError::SwapchainStale) => {
                tracing::debug!("Swapchain out of date on acquire, rebuilding");
                self.state = LoopState::SwapchainStale;
                if !self.rebuild()? {
                    return Ok(FrameOutcome::Suspended);
                }
                match self.sync.begin_frame(&*device, &self.swapchain) {
                    Ok(index) => index,
                    Err(PresentError::SwapchainStale) => {
                        self.state = LoopState::SwapchainStale;
                        return Ok(FrameOutcome::Suspended);
                    }
                    Err(e) => return Err(e),
                }
            }
            Err(e) => return Err(e),
        };

        if let Err(e) = self.record(&*device, slot, image_index) {
            self.sync.abandon_frame();
            return Err(e);
        }

        let status = self.sync.end_frame(
            &*device,
            &self.submitter,
            &self.queues,
            &self.swapchain,
            image_index,
        )?;

        let frame_number = self.frame_count;
        self.frame_count += 1;

        if status == PresentStatus::Stale {
            tracing::debug!("Swapchain out of date on present, rebuilding next frame");
            self.state = LoopState::SwapchainStale;
        }

        tracing::trace!(
            "Frame {} presented: slot {}, image {}",
            frame_number,
            slot,
            image_index
        );

        Ok(FrameOutcome::Presented {
            slot,
            image_index,
            frame_number,
        })
    }

    /// Claim the acquired image for `slot` and record the frame into the
    /// slot's command buffer.
    fn record(&mut self, device: &D, slot: usize, image_index: u32) -> Result<()> {
        self.sync.track_image(device, image_index)?;

        let framebuffer = self.swapchain.framebuffer(image_index).ok_or_else(|| {
            PresentError::InternalConsistency(format!("no framebuffer for image {image_index}"))
        })?;
        let command_buffer = self
            .sync
            .slot(slot)
            .map(|s| s.command_buffer)
            .ok_or_else(|| PresentError::InternalConsistency(format!("no frame slot {slot}")))?;

        self.submitter.record_frame(
            device,
            command_buffer,
            self.swapchains.render_pass(),
            framebuffer,
            self.swapchain.extent(),
            &self.frame_pass,
        )
    }

    /// Returns whether a swapchain exists afterwards.
    fn rebuild(&mut self) -> Result<bool> {
        let (width, height) = self.desired_extent;
        let result = self
            .swapchains
            .recreate(&*self.device, &mut self.swapchain, width, height);
        self.sync.reset_images(self.swapchain.image_count());

        match result {
            Ok(()) => {
                self.state = LoopState::SwapchainValid;
                Ok(true)
            }
            Err(PresentError::SwapchainStale) => {
                tracing::debug!("Surface has zero area, frame suspended");
                self.state = LoopState::Idle;
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    /// Record a new surface size. Takes effect at the next frame.
    pub fn handle_resize(&mut self, width: u32, height: u32) {
        tracing::debug!("Resize requested: {}x{}", width, height);
        self.desired_extent = (width, height);
        self.pending_resize = true;
    }

    /// Replace what gets recorded into each frame.
    pub fn set_frame_pass(&mut self, pass: FramePass) {
        self.frame_pass = pass;
    }

    /// Drain every frame in flight, then release the swapchain, the surface,
    /// the render pass and the frame slots. Calling it again after a
    /// successful shutdown does nothing.
    ///
    /// If draining fails nothing is released, since the GPU may still use
    /// it; the error is returned and a later call retries the drain.
    pub fn shutdown(&mut self) -> Result<()> {
        if self.released {
            return Ok(());
        }
        if self.state != LoopState::ShuttingDown {
            self.state = LoopState::ShuttingDown;
            tracing::info!(
                "Shutting down presentation loop after {} frames",
                self.frame_count
            );
        }

        let device = Arc::clone(&self.device);
        if let Err(e) = self
            .sync
            .drain(&*device)
            .and_then(|()| device.wait_idle().map_err(PresentError::from))
        {
            tracing::error!("Frames still in flight, presentation resources kept: {}", e);
            return Err(e);
        }

        self.swapchains
            .destroy(&*device, &mut self.swapchain, Teardown::ReleaseSurface);
        self.swapchains.destroy_render_pass(&*device);
        self.sync.destroy(&*device);
        self.released = true;

        Ok(())
    }

    pub fn device(&self) -> &Arc<D> {
        &self.device
    }

    pub fn config(&self) -> &PresentConfig {
        &self.config
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn swapchain(&self) -> &SwapchainState {
        &self.swapchain
    }

    /// Render pass pipelines must be compatible with.
    pub fn render_pass(&self) -> vk::RenderPass {
        self.swapchains.render_pass()
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.swapchain.extent()
    }

    pub fn current_slot(&self) -> usize {
        self.sync.current_slot()
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }
}

impl<D: PresentDevice> Drop for PresentationLoop<D> {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            tracing::error!("Presentation loop shutdown failed: {}", e);
        }
    }
}
