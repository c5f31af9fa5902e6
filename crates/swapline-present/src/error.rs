//! Presentation error types.

use ash::vk;
use thiserror::Error;

/// Errors raised by the presentation loop.
///
/// Everything except [`PresentError::SwapchainStale`] is fatal and stops the loop.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PresentError {
    /// The surface reports no usable format or present mode.
    #[error("Surface reports no usable format or present mode")]
    SurfaceUnsupported,

    /// The swapchain no longer matches the surface. Recovered internally by a rebuild.
    #[error("Swapchain is out of date with its surface")]
    SwapchainStale,

    /// The surface cannot be presented from the queue family chosen at startup.
    #[error("Surface does not support presentation on queue family {family}")]
    PresentationUnsupported { family: u32 },

    /// The device rejected a queue submission.
    #[error("Queue submission failed: {0}")]
    SubmissionFailure(vk::Result),

    /// Acquire or present failed with something other than out-of-date.
    #[error("Presentation failed: {0}")]
    PresentationFailure(vk::Result),

    /// A collaborator broke its contract, e.g. an image index outside the swapchain.
    #[error("Internal consistency violated: {0}")]
    InternalConsistency(String),

    /// A rebuild selected a different surface format than the render pass was made for.
    #[error("Surface format changed from {old:?} to {new:?}")]
    SurfaceFormatChanged { old: vk::Format, new: vk::Format },

    /// A fence wait kept timing out past the configured limit.
    #[error("Fence still unsignaled after {timeouts} consecutive timeouts")]
    DeviceHung { timeouts: u32 },

    /// A frame pass failed validation.
    #[error("Invalid frame pass: {0}")]
    InvalidFramePass(String),

    /// An operation was called out of order.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Any other device error.
    #[error("Device error: {0}")]
    Device(#[from] vk::Result),
}

impl PresentError {
    /// Whether the loop must stop.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::SwapchainStale)
    }
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, PresentError>;
