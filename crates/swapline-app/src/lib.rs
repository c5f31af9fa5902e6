//! Application framework for Swapline.
//!
//! Handles the boilerplate around a [`PresentationLoop`]:
//! - Window creation and management
//! - GPU context and surface initialization
//! - Resize funneling and swapchain rebuilds
//! - Event loop handling and shutdown
//!
//! # Example
//!
//! ```no_run
//! use swapline_app::{run_app, AppConfig, AppContext, SwaplineApp};
//!
//! struct MyApp;
//!
//! impl SwaplineApp for MyApp {
//!     fn init(_ctx: &mut AppContext) -> anyhow::Result<Self> {
//!         Ok(MyApp)
//!     }
//!
//!     fn update(&mut self, _ctx: &mut AppContext, _dt: f32) -> anyhow::Result<()> {
//!         Ok(())
//!     }
//! }
//!
//! fn main() -> anyhow::Result<()> {
//!     run_app::<MyApp>(AppConfig::default())
//! }
//! ```

mod app;
mod context;
mod runner;

pub use app::SwaplineApp;
pub use context::AppContext;
pub use runner::{run_app, AppConfig};

// Re-export commonly used types for convenience
pub use swapline_gpu::{GpuContext, GpuContextBuilder};
pub use swapline_present::{FrameOutcome, FramePass, PresentationLoop, VulkanPresentDevice};
pub use winit::event::WindowEvent;
