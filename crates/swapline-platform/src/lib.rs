//! Platform glue for Swapline.
//!
//! Window configuration via winit, raw handle access for surface creation,
//! and [`ResizeTracker`] for handing resize notifications to the render loop.

use parking_lot::Mutex;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use thiserror::Error;
use winit::dpi::PhysicalSize;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::{Window, WindowAttributes};

#[derive(Error, Debug)]
pub enum PlatformError {
    #[error("Window creation failed: {0}")]
    WindowCreation(String),
    #[error("Event loop error: {0}")]
    EventLoop(String),
    #[error("Window handle unavailable: {0}")]
    Handle(String),
}

pub type Result<T> = std::result::Result<T, PlatformError>;

/// Platform configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
    pub resizable: bool,
    pub vsync: bool,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            title: "Swapline".to_string(),
            width: 800,
            height: 600,
            resizable: true,
            vsync: true,
        }
    }
}

impl PlatformConfig {
    /// Window attributes for this configuration.
    pub fn window_attributes(&self) -> WindowAttributes {
        Window::default_attributes()
            .with_title(self.title.clone())
            .with_inner_size(PhysicalSize::new(self.width, self.height))
            .with_resizable(self.resizable)
    }
}

/// Get raw handles from a window for Vulkan surface creation.
pub fn raw_handles(
    window: &Window,
) -> Result<(
    raw_window_handle::RawDisplayHandle,
    raw_window_handle::RawWindowHandle,
)> {
    let display = window
        .display_handle()
        .map_err(|e| PlatformError::Handle(e.to_string()))?;
    let handle = window
        .window_handle()
        .map_err(|e| PlatformError::Handle(e.to_string()))?;
    Ok((display.as_raw(), handle.as_raw()))
}

/// Create a polling event loop.
pub fn create_event_loop() -> Result<EventLoop<()>> {
    let event_loop = EventLoop::new().map_err(|e| PlatformError::EventLoop(e.to_string()))?;
    event_loop.set_control_flow(ControlFlow::Poll);
    Ok(event_loop)
}

/// Create a window and check it exposes the handles surface creation needs.
pub fn create_window(event_loop: &ActiveEventLoop, config: &PlatformConfig) -> Result<Window> {
    let window = event_loop
        .create_window(config.window_attributes())
        .map_err(|e| PlatformError::WindowCreation(e.to_string()))?;
    let (display_handle, _) = raw_handles(&window)?;
    tracing::debug!(?display_handle, "Window created");
    Ok(window)
}

/// Latest pending surface size.
///
/// Resize callbacks may arrive from another context; the render loop takes
/// the most recent size once per frame. Intermediate sizes are coalesced.
#[derive(Debug, Default)]
pub struct ResizeTracker {
    pending: Mutex<Option<(u32, u32)>>,
}

impl ResizeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new size, replacing any size not yet taken.
    pub fn notify(&self, width: u32, height: u32) {
        tracing::trace!("Resize notified: {}x{}", width, height);
        *self.pending.lock() = Some((width, height));
    }

    /// Take the pending size, if any.
    pub fn take(&self) -> Option<(u32, u32)> {
        self.pending.lock().take()
    }

    pub fn is_pending(&self) -> bool {
        self.pending.lock().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn default_config() {
        let config = PlatformConfig::default();
        assert_eq!((config.width, config.height), (800, 600));
        assert!(config.resizable);
        assert!(config.vsync);
    }

    #[test]
    fn resize_keeps_latest() {
        let tracker = ResizeTracker::new();
        assert_eq!(tracker.take(), None);

        tracker.notify(100, 100);
        tracker.notify(640, 480);
        assert!(tracker.is_pending());
        assert_eq!(tracker.take(), Some((640, 480)));
        assert_eq!(tracker.take(), None);
    }

    #[test]
    fn resize_from_another_thread() {
        let tracker = Arc::new(ResizeTracker::new());
        let remote = Arc::clone(&tracker);
        std::thread::spawn(move || remote.notify(1280, 720))
            .join()
            .unwrap();
        assert_eq!(tracker.take(), Some((1280, 720)));
    }
}
