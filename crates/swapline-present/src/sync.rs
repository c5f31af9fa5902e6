//! Frame slots and the waits that bound frames in flight.

use crate::device::PresentDevice;
use crate::error::{PresentError, Result};
use crate::submit::CommandSubmitter;
use crate::swapchain::SwapchainState;
use crate::DeviceQueues;
use ash::vk;
use swapline_gpu::FenceWait;

/// Acquire blocks until an image is available.
const ACQUIRE_TIMEOUT_NS: u64 = u64::MAX;

/// Where the current frame is in its cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramePhase {
    Idle,
    Acquiring,
    Recording,
    Submitted,
    Presenting,
}

/// How presentation went for a submitted frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentStatus {
    Presented,
    /// Presented (or dropped) but the swapchain no longer matches the surface.
    Stale,
}

/// Synchronization objects and command buffer for one frame in flight.
#[derive(Debug, Clone, Copy)]
pub struct FrameSlot {
    pub image_acquired: vk::Semaphore,
    pub render_finished: vk::Semaphore,
    pub in_flight: vk::Fence,
    pub command_buffer: vk::CommandBuffer,
    /// The fence was reset but its submission never reached the queue,
    /// so it will not signal.
    awaiting_submit: bool,
}

impl FrameSlot {
    /// Whether waiting on `in_flight` can complete.
    pub fn fence_armed(&self) -> bool {
        self.in_flight != vk::Fence::null() && !self.awaiting_submit
    }
}

/// Swapchain image index to the fence of the frame last rendered into it.
#[derive(Debug, Clone, Default)]
pub struct ImageInFlightTable {
    fences: Vec<Option<vk::Fence>>,
}

impl ImageInFlightTable {
    pub fn new(image_count: usize) -> Self {
        Self {
            fences: vec![None; image_count],
        }
    }

    /// Forget every entry and resize for a new swapchain.
    pub fn reset(&mut self, image_count: usize) {
        self.fences.clear();
        self.fences.resize(image_count, None);
    }

    pub fn len(&self) -> usize {
        self.fences.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fences.is_empty()
    }

    pub fn get(&self, image_index: u32) -> Option<vk::Fence> {
        self.fences.get(image_index as usize).copied().flatten()
    }

    /// Record `fence` against an image, returning the previous entry.
    pub fn record(&mut self, image_index: u32, fence: vk::Fence) -> Result<Option<vk::Fence>> {
        let len = self.fences.len();
        let entry = self.fences.get_mut(image_index as usize).ok_or_else(|| {
            PresentError::InternalConsistency(format!(
                "image index {image_index} outside table of {len}"
            ))
        })?;
        Ok(entry.replace(fence))
    }
}

/// Cycles frame slots and sequences the waits between CPU and GPU.
#[derive(Debug)]
pub struct FrameSynchronizer {
    slots: Vec<FrameSlot>,
    images_in_flight: ImageInFlightTable,
    current: usize,
    phase: FramePhase,
    fence_timeout_ns: u64,
    max_fence_timeouts: Option<u32>,
}

impl FrameSynchronizer {
    /// Create `slot_count` slots with signaled fences so the first wait on
    /// each returns immediately.
    pub fn new<D: PresentDevice>(
        device: &D,
        slot_count: usize,
        fence_timeout_ns: u64,
        max_fence_timeouts: Option<u32>,
    ) -> Result<Self> {
        let mut sync = Self::empty(fence_timeout_ns, max_fence_timeouts);

        if let Err(e) = sync.create_slots(device, slot_count) {
            sync.destroy(device);
            return Err(e);
        }

        Ok(sync)
    }

    /// A synchronizer without slots; every frame operation fails until slots exist.
    pub(crate) fn empty(fence_timeout_ns: u64, max_fence_timeouts: Option<u32>) -> Self {
        Self {
            slots: Vec::new(),
            images_in_flight: ImageInFlightTable::default(),
            current: 0,
            phase: FramePhase::Idle,
            fence_timeout_ns,
            max_fence_timeouts,
        }
    }

    fn create_slots<D: PresentDevice>(&mut self, device: &D, slot_count: usize) -> Result<()> {
        let count = u32::try_from(slot_count)
            .map_err(|_| PresentError::InvalidState(format!("{slot_count} frame slots")))?;
        let command_buffers = device.allocate_command_buffers(count)?;

        // Every slot exists before any object is created so a failure part
        // way through still releases what was made
        self.slots = command_buffers
            .into_iter()
            .map(|command_buffer| FrameSlot {
                image_acquired: vk::Semaphore::null(),
                render_finished: vk::Semaphore::null(),
                in_flight: vk::Fence::null(),
                command_buffer,
                awaiting_submit: false,
            })
            .collect();

        for slot in &mut self.slots {
            slot.image_acquired = device.create_semaphore()?;
            slot.render_finished = device.create_semaphore()?;
            slot.in_flight = device.create_fence(true)?;
        }

        Ok(())
    }

    pub fn current_slot(&self) -> usize {
        self.current
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    pub fn slot(&self, index: usize) -> Option<&FrameSlot> {
        self.slots.get(index)
    }

    pub fn phase(&self) -> FramePhase {
        self.phase
    }

    pub fn images_in_flight(&self) -> &ImageInFlightTable {
        &self.images_in_flight
    }

    /// Drop all image tracking after the swapchain was rebuilt.
    pub fn reset_images(&mut self, image_count: usize) {
        self.images_in_flight.reset(image_count);
    }

    fn expect_phase(&self, expected: FramePhase, operation: &str) -> Result<()> {
        if self.phase == expected {
            Ok(())
        } else {
            Err(PresentError::InvalidState(format!(
                "{operation} called while {:?}, expected {expected:?}",
                self.phase
            )))
        }
    }

    fn current_slot_ref(&self) -> Result<FrameSlot> {
        self.slots
            .get(self.current)
            .copied()
            .ok_or_else(|| PresentError::InvalidState("frame slots released".to_string()))
    }

    /// Wait for the current slot's previous work, then acquire an image with
    /// the slot's `image_acquired` semaphore.
    ///
    /// Out-of-date is reported as [`PresentError::SwapchainStale`]; a
    /// suboptimal acquire still counts as success.
    #[cfg_attr(
        feature = "profiling-tracy",
        tracing::instrument(level = "trace", skip_all)
    )]
    pub fn begin_frame<D: PresentDevice>(
        &mut self,
        device: &D,
        swapchain: &SwapchainState,
    ) -> Result<u32> {
        self.expect_phase(FramePhase::Idle, "begin_frame")?;
        let slot = self.current_slot_ref()?;
        if swapchain.handle() == vk::SwapchainKHR::null() {
            return Err(PresentError::InvalidState(
                "begin_frame without a swapchain".to_string(),
            ));
        }

        self.phase = FramePhase::Acquiring;
        if slot.fence_armed() {
            if let Err(e) = self.wait_fence(device, slot.in_flight) {
                self.phase = FramePhase::Idle;
                return Err(e);
            }
        }

        let acquired = device.acquire_next_image(
            swapchain.handle(),
            ACQUIRE_TIMEOUT_NS,
            slot.image_acquired,
        );
        self.phase = FramePhase::Idle;

        let image_index = match acquired {
            Ok((index, suboptimal)) => {
                if suboptimal {
                    tracing::trace!("Acquired image {} from a suboptimal swapchain", index);
                }
                index
            }
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => return Err(PresentError::SwapchainStale),
            Err(e) => return Err(PresentError::PresentationFailure(e)),
        };

        if image_index as usize >= swapchain.framebuffers().len() {
            return Err(PresentError::InternalConsistency(format!(
                "acquired image {image_index} but swapchain has {} framebuffers",
                swapchain.framebuffers().len()
            )));
        }

        self.phase = FramePhase::Recording;
        Ok(image_index)
    }

    /// Make sure no earlier frame is still rendering into `image_index`, then
    /// claim it for the current slot.
    pub fn track_image<D: PresentDevice>(&mut self, device: &D, image_index: u32) -> Result<()> {
        self.expect_phase(FramePhase::Recording, "track_image")?;
        let slot = self.current_slot_ref()?;

        if let Some(previous) = self.images_in_flight.get(image_index) {
            let armed = self
                .slots
                .iter()
                .find(|s| s.in_flight == previous)
                .map_or(true, FrameSlot::fence_armed);
            if previous != slot.in_flight && armed {
                if let Err(e) = self.wait_fence(device, previous) {
                    self.phase = FramePhase::Idle;
                    return Err(e);
                }
            }
        }
        if let Err(e) = self.images_in_flight.record(image_index, slot.in_flight) {
            self.phase = FramePhase::Idle;
            return Err(e);
        }
        Ok(())
    }

    /// Give up on a frame that was acquired but will not be submitted.
    pub fn abandon_frame(&mut self) {
        if self.phase == FramePhase::Recording {
            self.phase = FramePhase::Idle;
        }
    }

    /// Submit the current slot's command buffer and present `image_index`.
    ///
    /// The fence is reset right before submission. Once the submission is
    /// accepted the slot advances, whatever presentation reports.
    #[cfg_attr(
        feature = "profiling-tracy",
        tracing::instrument(level = "trace", skip_all)
    )]
    pub fn end_frame<D: PresentDevice>(
        &mut self,
        device: &D,
        submitter: &CommandSubmitter,
        queues: &DeviceQueues,
        swapchain: &SwapchainState,
        image_index: u32,
    ) -> Result<PresentStatus> {
        self.expect_phase(FramePhase::Recording, "end_frame")?;
        let slot = self.current_slot_ref()?;

        if let Err(e) = device.reset_fence(slot.in_flight) {
            self.phase = FramePhase::Idle;
            return Err(e.into());
        }
        self.slots[self.current].awaiting_submit = true;

        if let Err(e) = submitter.submit(
            device,
            queues.graphics,
            slot.command_buffer,
            slot.image_acquired,
            slot.render_finished,
            slot.in_flight,
        ) {
            self.phase = FramePhase::Idle;
            return Err(e);
        }
        self.slots[self.current].awaiting_submit = false;
        self.phase = FramePhase::Submitted;

        self.current = (self.current + 1) % self.slots.len();

        self.phase = FramePhase::Presenting;
        let presented = device.present(
            queues.present,
            swapchain.handle(),
            image_index,
            slot.render_finished,
        );
        self.phase = FramePhase::Idle;

        match presented {
            Ok(false) => Ok(PresentStatus::Presented),
            Ok(true) | Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(PresentStatus::Stale),
            Err(e) => Err(PresentError::PresentationFailure(e)),
        }
    }

    /// Wait on every slot fence that can still signal.
    pub fn drain<D: PresentDevice>(&mut self, device: &D) -> Result<()> {
        let armed: Vec<vk::Fence> = self
            .slots
            .iter()
            .filter(|slot| slot.fence_armed())
            .map(|slot| slot.in_flight)
            .collect();
        for fence in armed {
            self.wait_fence(device, fence)?;
        }
        Ok(())
    }

    /// Release all slot objects. Safe to call more than once.
    pub fn destroy<D: PresentDevice>(&mut self, device: &D) {
        let mut command_buffers = Vec::with_capacity(self.slots.len());
        for slot in &mut self.slots {
            if slot.image_acquired != vk::Semaphore::null() {
                device.destroy_semaphore(slot.image_acquired);
                slot.image_acquired = vk::Semaphore::null();
            }
            if slot.render_finished != vk::Semaphore::null() {
                device.destroy_semaphore(slot.render_finished);
                slot.render_finished = vk::Semaphore::null();
            }
            if slot.in_flight != vk::Fence::null() {
                device.destroy_fence(slot.in_flight);
                slot.in_flight = vk::Fence::null();
            }
            if slot.command_buffer != vk::CommandBuffer::null() {
                command_buffers.push(slot.command_buffer);
                slot.command_buffer = vk::CommandBuffer::null();
            }
        }
        if !command_buffers.is_empty() {
            device.free_command_buffers(&command_buffers);
        }
        self.slots.clear();
        self.images_in_flight.reset(0);
        self.current = 0;
        self.phase = FramePhase::Idle;
    }

    /// Bounded wait, re-issued on timeout until the fence signals or the
    /// timeout limit is exceeded.
    fn wait_fence<D: PresentDevice>(&self, device: &D, fence: vk::Fence) -> Result<()> {
        let mut timeouts = 0u32;
        loop {
            match device.wait_for_fence(fence, self.fence_timeout_ns)? {
                FenceWait::Signaled => return Ok(()),
                FenceWait::TimedOut => {
                    timeouts += 1;
                    tracing::trace!("Fence wait timed out ({} in a row)", timeouts);
                    if self.max_fence_timeouts.is_some_and(|max| timeouts > max) {
                        return Err(PresentError::DeviceHung { timeouts });
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{Acquire, MockDevice};
    use crate::swapchain::SwapchainManager;
    use ash::vk::Handle;
    use swapline_gpu::PresentModePolicy;

    struct Fixture {
        mock: MockDevice,
        sync: FrameSynchronizer,
        swapchain: SwapchainState,
        submitter: CommandSubmitter,
    }

    fn fixture(slots: usize, max_fence_timeouts: Option<u32>) -> Fixture {
        fixture_with(slots, max_fence_timeouts, |_| {})
    }

    fn fixture_with(
        slots: usize,
        max_fence_timeouts: Option<u32>,
        setup: impl FnOnce(&MockDevice),
    ) -> Fixture {
        let mock = MockDevice::new();
        setup(&mock);
        let sync = FrameSynchronizer::new(&mock, slots, u64::MAX, max_fence_timeouts).unwrap();
        let mut manager = SwapchainManager::new(mock.surface(), 0, 0, PresentModePolicy::Fifo);
        let swapchain = manager.create(&mock, 800, 600).unwrap();
        let mut fixture = Fixture {
            mock,
            sync,
            swapchain,
            submitter: CommandSubmitter::new([0.0; 4]),
        };
        fixture.sync.reset_images(fixture.swapchain.image_count());
        fixture.mock.take_events();
        fixture
    }

    impl Fixture {
        fn frame(&mut self) -> Result<(usize, u32)> {
            let slot = self.sync.current_slot();
            let image = self.sync.begin_frame(&self.mock, &self.swapchain)?;
            self.sync.track_image(&self.mock, image)?;
            let queues = self.mock.queues();
            self.sync
                .end_frame(&self.mock, &self.submitter, &queues, &self.swapchain, image)?;
            Ok((slot, image))
        }
    }

    #[test]
    fn slots_cycle_modulo_count() {
        let mut f = fixture(2, None);
        let slots: Vec<usize> = (0..5).map(|_| f.frame().unwrap().0).collect();
        assert_eq!(slots, vec![0, 1, 0, 1, 0]);
    }

    #[test]
    fn three_slots_cycle() {
        let mut f = fixture(3, None);
        let slots: Vec<usize> = (0..7).map(|_| f.frame().unwrap().0).collect();
        assert_eq!(slots, vec![0, 1, 2, 0, 1, 2, 0]);
    }

    #[test]
    fn first_frame_ordering() {
        let mut f = fixture(2, None);
        f.frame().unwrap();
        insta::assert_debug_snapshot!(f.mock.take_events(), @r###"
        [
            "wait_fence fence#6 [signaled]",
            "acquire swapchain#11 -> 0",
            "reset_fence fence#6",
            "submit cmd#2 wait=semaphore#4 signal=semaphore#5 fence=fence#6",
            "present swapchain#11 image=0 wait=semaphore#5",
        ]
        "###);
    }

    #[test]
    fn images_never_hold_two_pending_fences() {
        // More slots than images forces image reuse while older frames are pending
        let mut f = fixture_with(3, None, |mock| mock.set_image_count_range(1, 2));
        assert_eq!(f.swapchain.image_count(), 2);
        for _ in 0..12 {
            f.frame().unwrap();
        }
        assert_eq!(f.mock.overlapping_fences(), 0);
    }

    #[test]
    fn reused_image_waits_for_its_previous_fence() {
        let mut f = fixture(3, None);
        // Slot 0 renders image 0, slot 1 renders image 0 again
        f.mock.script_acquire(&[Acquire::Index(0), Acquire::Index(0)]);
        f.frame().unwrap();
        f.mock.take_events();
        f.frame().unwrap();

        let slot0_fence = f.sync.slot(0).unwrap().in_flight.as_raw();
        let events = f.mock.take_events();
        let waited = events
            .iter()
            .position(|e| *e == format!("wait_fence fence#{slot0_fence} [pending]"))
            .expect("slot 0 fence waited");
        let submitted = events
            .iter()
            .position(|e| e.starts_with("submit"))
            .expect("frame submitted");
        assert!(waited < submitted);
        assert_eq!(f.mock.overlapping_fences(), 0);
    }

    #[test]
    fn track_image_records_current_fence() {
        let mut f = fixture(2, None);
        let image = f.sync.begin_frame(&f.mock, &f.swapchain).unwrap();
        f.sync.track_image(&f.mock, image).unwrap();

        let fence = f.sync.slot(0).unwrap().in_flight;
        assert_eq!(f.sync.images_in_flight().get(image), Some(fence));
    }

    #[test]
    fn out_of_date_acquire_is_stale() {
        let mut f = fixture(2, None);
        f.mock
            .script_acquire(&[Acquire::Fail(vk::Result::ERROR_OUT_OF_DATE_KHR)]);
        assert_eq!(f.frame().unwrap_err(), PresentError::SwapchainStale);
        assert_eq!(f.sync.phase(), FramePhase::Idle);
        assert_eq!(f.sync.current_slot(), 0);
    }

    #[test]
    fn suboptimal_acquire_proceeds() {
        let mut f = fixture(2, None);
        f.mock.script_acquire(&[Acquire::Suboptimal]);
        assert_eq!(f.frame().unwrap(), (0, 0));
    }

    #[test]
    fn other_acquire_errors_are_fatal() {
        let mut f = fixture(2, None);
        f.mock
            .script_acquire(&[Acquire::Fail(vk::Result::ERROR_SURFACE_LOST_KHR)]);
        assert_eq!(
            f.frame().unwrap_err(),
            PresentError::PresentationFailure(vk::Result::ERROR_SURFACE_LOST_KHR)
        );
    }

    #[test]
    fn out_of_range_image_is_inconsistent() {
        let mut f = fixture(2, None);
        f.mock.script_acquire(&[Acquire::Index(7)]);
        assert!(matches!(
            f.frame().unwrap_err(),
            PresentError::InternalConsistency(_)
        ));
    }

    #[test]
    fn present_out_of_date_still_advances() {
        let mut f = fixture(2, None);
        f.mock.script_present(Err(vk::Result::ERROR_OUT_OF_DATE_KHR));

        let image = f.sync.begin_frame(&f.mock, &f.swapchain).unwrap();
        f.sync.track_image(&f.mock, image).unwrap();
        let queues = f.mock.queues();
        let status = f
            .sync
            .end_frame(&f.mock, &f.submitter, &queues, &f.swapchain, image)
            .unwrap();

        assert_eq!(status, PresentStatus::Stale);
        assert_eq!(f.sync.current_slot(), 1);
    }

    #[test]
    fn present_suboptimal_is_stale() {
        let mut f = fixture(2, None);
        f.mock.script_present(Ok(true));

        let image = f.sync.begin_frame(&f.mock, &f.swapchain).unwrap();
        f.sync.track_image(&f.mock, image).unwrap();
        let queues = f.mock.queues();
        let status = f
            .sync
            .end_frame(&f.mock, &f.submitter, &queues, &f.swapchain, image)
            .unwrap();
        assert_eq!(status, PresentStatus::Stale);
    }

    #[test]
    fn submit_failure_keeps_slot_and_disarms_fence() {
        let mut f = fixture(2, None);
        f.mock.fail_next_submit(vk::Result::ERROR_DEVICE_LOST);
        assert_eq!(
            f.frame().unwrap_err(),
            PresentError::SubmissionFailure(vk::Result::ERROR_DEVICE_LOST)
        );
        assert_eq!(f.sync.current_slot(), 0);
        assert!(!f.sync.slot(0).unwrap().fence_armed());

        // Draining must not wait on a fence that will never signal
        f.sync.drain(&f.mock).unwrap();
    }

    #[test]
    fn out_of_order_calls_are_rejected() {
        let mut f = fixture(2, None);
        let queues = f.mock.queues();
        assert!(matches!(
            f.sync
                .end_frame(&f.mock, &f.submitter, &queues, &f.swapchain, 0),
            Err(PresentError::InvalidState(_))
        ));
        assert!(matches!(
            f.sync.track_image(&f.mock, 0),
            Err(PresentError::InvalidState(_))
        ));

        f.sync.begin_frame(&f.mock, &f.swapchain).unwrap();
        assert!(matches!(
            f.sync.begin_frame(&f.mock, &f.swapchain),
            Err(PresentError::InvalidState(_))
        ));
    }

    #[test]
    fn failed_frame_returns_to_idle() {
        let mut f = fixture(2, None);
        f.sync.begin_frame(&f.mock, &f.swapchain).unwrap();
        assert!(matches!(
            f.sync.track_image(&f.mock, 99),
            Err(PresentError::InternalConsistency(_))
        ));
        assert_eq!(f.sync.phase(), FramePhase::Idle);

        // The same slot can acquire again
        f.sync.begin_frame(&f.mock, &f.swapchain).unwrap();
        assert_eq!(f.sync.current_slot(), 0);
        f.sync.abandon_frame();
        assert_eq!(f.sync.phase(), FramePhase::Idle);
        f.sync.begin_frame(&f.mock, &f.swapchain).unwrap();
        assert_eq!(f.sync.phase(), FramePhase::Recording);
    }

    #[test]
    fn timeouts_are_retried() {
        let mut f = fixture(2, None);
        f.mock.script_fence_timeouts(3);
        f.frame().unwrap();

        let timeouts = f
            .mock
            .take_events()
            .iter()
            .filter(|e| e.ends_with("[timeout]"))
            .count();
        assert_eq!(timeouts, 3);
    }

    #[test]
    fn timeout_limit_reports_hung_device() {
        let mut f = fixture(2, Some(2));
        f.mock.script_fence_timeouts(3);
        assert_eq!(
            f.frame().unwrap_err(),
            PresentError::DeviceHung { timeouts: 3 }
        );

        let mut f = fixture(2, Some(3));
        f.mock.script_fence_timeouts(3);
        assert!(f.frame().is_ok());
    }

    #[test]
    fn destroy_is_idempotent() {
        let mut f = fixture(2, None);
        f.frame().unwrap();
        f.sync.drain(&f.mock).unwrap();
        f.mock.take_events();

        f.sync.destroy(&f.mock);
        let released = f.mock.take_events();
        f.sync.destroy(&f.mock);

        assert_eq!(released.len(), 2 * 3 + 1);
        assert_eq!(released.last().unwrap(), "free_command_buffers cmd#2 cmd#3");
        assert!(f.mock.take_events().is_empty());
        assert_eq!(f.sync.slot_count(), 0);
    }

    #[test]
    fn image_table_rejects_out_of_range() {
        let mut table = ImageInFlightTable::new(2);
        assert!(table.record(1, vk::Fence::null()).unwrap().is_none());
        match table.record(2, vk::Fence::null()) {
            Err(PresentError::InternalConsistency(message)) => {
                assert_eq!(message, "image index 2 outside table of 2");
            }
            other => panic!("unexpected result: {other:?}"),
        }

        table.reset(3);
        assert_eq!(table.len(), 3);
        assert_eq!(table.get(1), None);
    }
}
