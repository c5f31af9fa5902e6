//! Presentation loop configuration.

use crate::error::{PresentError, Result};
use swapline_gpu::PresentModePolicy;

/// Default number of frames that may be in flight at once.
pub const MAX_IN_FLIGHT: usize = 2;

/// Configuration for a [`PresentationLoop`](crate::PresentationLoop).
#[derive(Debug, Clone, PartialEq)]
pub struct PresentConfig {
    /// Number of frame slots cycling independently of the swapchain image count.
    pub max_in_flight: usize,
    /// Present mode preference.
    pub present_mode: PresentModePolicy,
    /// Timeout for a single fence wait, in nanoseconds.
    pub fence_timeout_ns: u64,
    /// Consecutive fence timeouts tolerated before the device is declared hung.
    /// `None` keeps re-issuing the wait.
    pub max_fence_timeouts: Option<u32>,
    /// Clear color of the presentation render pass.
    pub clear_color: [f32; 4],
}

impl Default for PresentConfig {
    fn default() -> Self {
        Self {
            max_in_flight: MAX_IN_FLIGHT,
            present_mode: PresentModePolicy::Fifo,
            fence_timeout_ns: u64::MAX,
            max_fence_timeouts: None,
            clear_color: [0.2, 0.2, 0.2, 1.0],
        }
    }
}

impl PresentConfig {
    /// Create a new config with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of frames in flight.
    pub fn with_max_in_flight(mut self, count: usize) -> Self {
        self.max_in_flight = count;
        self
    }

    /// Set the present mode preference.
    pub fn with_present_mode(mut self, policy: PresentModePolicy) -> Self {
        self.present_mode = policy;
        self
    }

    /// Set the per-wait fence timeout.
    pub fn with_fence_timeout_ns(mut self, timeout_ns: u64) -> Self {
        self.fence_timeout_ns = timeout_ns;
        self
    }

    /// Limit consecutive fence timeouts.
    pub fn with_max_fence_timeouts(mut self, limit: Option<u32>) -> Self {
        self.max_fence_timeouts = limit;
        self
    }

    /// Set the clear color.
    pub fn with_clear_color(mut self, color: [f32; 4]) -> Self {
        self.clear_color = color;
        self
    }

    /// Reject settings the loop cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.max_in_flight == 0 {
            return Err(PresentError::InvalidState(
                "max_in_flight must be at least 1".to_string(),
            ));
        }
        if self.fence_timeout_ns == 0 {
            return Err(PresentError::InvalidState(
                "fence timeout must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = PresentConfig::default();
        assert_eq!(config.max_in_flight, 2);
        assert_eq!(config.present_mode, PresentModePolicy::Fifo);
        assert_eq!(config.fence_timeout_ns, u64::MAX);
        assert_eq!(config.max_fence_timeouts, None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn builder_overrides() {
        let config = PresentConfig::new()
            .with_max_in_flight(3)
            .with_present_mode(PresentModePolicy::Mailbox)
            .with_max_fence_timeouts(Some(4))
            .with_clear_color([0.0, 0.0, 0.0, 1.0]);

        assert_eq!(config.max_in_flight, 3);
        assert_eq!(config.present_mode, PresentModePolicy::Mailbox);
        assert_eq!(config.max_fence_timeouts, Some(4));
        assert_eq!(config.clear_color, [0.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn zero_slots_rejected() {
        let config = PresentConfig::new().with_max_in_flight(0);
        assert!(matches!(
            config.validate(),
            Err(PresentError::InvalidState(_))
        ));
    }
}
