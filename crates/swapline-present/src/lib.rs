//! Presentation loop for Swapline.
//!
//! Drives the acquire, record, submit and present cycle on top of a
//! [`PresentDevice`]:
//! - [`SwapchainManager`] builds, rebuilds and tears down the swapchain
//! - [`FrameSynchronizer`] bounds the number of frames in flight
//! - [`CommandSubmitter`] records and submits one frame of work
//! - [`PresentationLoop`] ties them together and handles resizes
//!
//! [`VulkanPresentDevice`] implements the device seam with `ash`.

pub mod config;
pub mod device;
pub mod error;
pub mod presentation;
pub mod submit;
pub mod swapchain;
pub mod sync;
pub mod vulkan;

#[cfg(test)]
pub(crate) mod mock;

pub use config::{PresentConfig, MAX_IN_FLIGHT};
pub use device::{CommandEncoder, DeviceQueues, PresentDevice, Submission, SwapchainDesc};
pub use error::{PresentError, Result};
pub use presentation::{FrameOutcome, LoopState, PresentationLoop};
pub use submit::{CommandSubmitter, ComputeDispatch, DrawCall, FramePass};
pub use swapchain::{SwapchainManager, SwapchainState, Teardown};
pub use sync::{FramePhase, FrameSlot, FrameSynchronizer, ImageInFlightTable, PresentStatus};
pub use vulkan::VulkanPresentDevice;

pub use swapline_gpu::{FenceWait, PresentModePolicy, SurfaceCapabilities};
