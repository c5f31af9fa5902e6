//! `SwaplineApp` trait definition.

use crate::context::AppContext;
use winit::event::WindowEvent;

/// Trait for Swapline applications.
///
/// The framework owns the window, the GPU context and the presentation loop.
/// An application builds its pipelines against
/// [`AppContext::render_pass`] and describes each frame with a
/// [`FramePass`](swapline_present::FramePass).
pub trait SwaplineApp: Sized {
    /// Initialize the application.
    ///
    /// Called once after the window, GPU context and presentation loop exist.
    fn init(ctx: &mut AppContext) -> anyhow::Result<Self>;

    /// Update application state.
    ///
    /// Called every frame before it is recorded.
    ///
    /// # Arguments
    /// * `ctx` - Application context
    /// * `dt` - Delta time in seconds since last frame
    fn update(&mut self, ctx: &mut AppContext, dt: f32) -> anyhow::Result<()>;

    /// Handle window resize.
    ///
    /// Called before the swapchain is rebuilt for the new size. Viewport and
    /// scissor follow the swapchain automatically.
    ///
    /// Default implementation does nothing.
    #[allow(unused_variables)]
    fn on_resize(&mut self, ctx: &mut AppContext, width: u32, height: u32) -> anyhow::Result<()> {
        Ok(())
    }

    /// Handle window events.
    ///
    /// Return `true` if the event was handled and should not be processed further.
    ///
    /// Default implementation does nothing and returns `false`.
    #[allow(unused_variables)]
    fn on_event(&mut self, event: &WindowEvent) -> bool {
        false
    }

    /// Cleanup resources before shutdown.
    ///
    /// Called after the presentation loop has drained, so the GPU is idle.
    ///
    /// Default implementation does nothing.
    #[allow(unused_variables)]
    fn cleanup(&mut self, ctx: &mut AppContext) {}
}
