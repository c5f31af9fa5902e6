//! Application runner and event loop.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use swapline_platform::{create_event_loop, create_window, PlatformConfig};
use swapline_present::{FrameOutcome, PresentConfig, PresentModePolicy, MAX_IN_FLIGHT};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use winit::application::ApplicationHandler;
use winit::event::WindowEvent;
use winit::event_loop::ActiveEventLoop;
use winit::window::WindowId;

use crate::app::SwaplineApp;
use crate::context::AppContext;

/// Application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Window title.
    pub title: String,
    /// Initial window width.
    pub width: u32,
    /// Initial window height.
    pub height: u32,
    /// Whether the window can be resized.
    pub resizable: bool,
    /// Enable vsync.
    pub vsync: bool,
    /// Enable Vulkan validation layers (default: debug builds only).
    pub validation: bool,
    /// Target frames per second (None for unlimited).
    pub target_fps: Option<u32>,
    /// Frames that may be in flight at once.
    pub frames_in_flight: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            title: "Swapline".to_string(),
            width: 800,
            height: 600,
            resizable: true,
            vsync: true,
            validation: cfg!(debug_assertions),
            target_fps: None,
            frames_in_flight: MAX_IN_FLIGHT,
        }
    }
}

impl AppConfig {
    /// Create a new config with the given title.
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }

    /// Set the window dimensions.
    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    /// Allow or forbid resizing the window.
    pub fn with_resizable(mut self, resizable: bool) -> Self {
        self.resizable = resizable;
        self
    }

    /// Enable or disable vsync.
    pub fn with_vsync(mut self, vsync: bool) -> Self {
        self.vsync = vsync;
        self
    }

    /// Enable or disable validation layers.
    pub fn with_validation(mut self, validation: bool) -> Self {
        self.validation = validation;
        self
    }

    /// Set the target FPS.
    pub fn with_target_fps(mut self, fps: u32) -> Self {
        self.target_fps = Some(fps);
        self
    }

    /// Set the number of frames in flight.
    pub fn with_frames_in_flight(mut self, count: usize) -> Self {
        self.frames_in_flight = count;
        self
    }

    /// Window settings.
    pub fn platform(&self) -> PlatformConfig {
        PlatformConfig {
            title: self.title.clone(),
            width: self.width,
            height: self.height,
            resizable: self.resizable,
            vsync: self.vsync,
        }
    }

    /// Presentation loop settings.
    pub fn present(&self) -> PresentConfig {
        PresentConfig::new()
            .with_max_in_flight(self.frames_in_flight)
            .with_present_mode(PresentModePolicy::from_vsync(self.vsync))
    }

    /// Minimum time between frames, if a target rate is set.
    pub fn frame_interval(&self) -> Option<Duration> {
        self.target_fps
            .filter(|&fps| fps > 0)
            .map(|fps| Duration::from_nanos(1_000_000_000 / u64::from(fps)))
    }
}

/// Run a `SwaplineApp` with the given configuration.
///
/// Initializes logging, creates the window, GPU context and presentation
/// loop, and runs the event loop until the window closes or a fatal error
/// occurs. The fatal error, if any, is returned.
pub fn run_app<A: SwaplineApp + 'static>(config: AppConfig) -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("{} starting...", config.title);

    let event_loop = create_event_loop()?;

    let mut runner = AppRunner::<A> {
        config,
        state: None,
        failure: None,
    };

    event_loop.run_app(&mut runner)?;

    match runner.failure {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

/// Internal application runner that implements winit's `ApplicationHandler`.
struct AppRunner<A: SwaplineApp> {
    config: AppConfig,
    state: Option<AppState<A>>,
    failure: Option<anyhow::Error>,
}

/// Internal application state.
struct AppState<A: SwaplineApp> {
    // Dropped before the context so app resources go first
    app: A,
    ctx: AppContext,
    target_frame_time: Option<Duration>,
    last_frame_time: Instant,
    // FPS tracking
    min_fps: f64,
    max_fps: f64,
    fps_sum: f64,
}

impl<A: SwaplineApp + 'static> ApplicationHandler for AppRunner<A> {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.state.is_some() {
            return;
        }

        info!("Creating application state...");

        match self.create_state(event_loop) {
            Ok(state) => {
                self.state = Some(state);
                info!("Application ready!");
            }
            Err(e) => {
                error!("Failed to initialize application: {e:#}");
                self.failure = Some(e);
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        // Let the app handle the event first
        if let Some(state) = &mut self.state {
            if state.app.on_event(&event) {
                return;
            }
        }

        match event {
            WindowEvent::CloseRequested => {
                info!("Close requested");
                self.stop(event_loop);
            }
            WindowEvent::RedrawRequested => {
                let Some(state) = &mut self.state else {
                    return;
                };
                if let Err(e) = state.render_frame() {
                    error!("Fatal frame error: {e:#}");
                    self.failure = Some(e);
                    self.stop(event_loop);
                }
            }
            WindowEvent::Resized(size) => {
                if let Some(state) = &self.state {
                    state.ctx.resize.notify(size.width, size.height);
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(state) = &self.state {
            state.ctx.window.request_redraw();
        }
    }
}

impl<A: SwaplineApp + 'static> AppRunner<A> {
    fn create_state(&self, event_loop: &ActiveEventLoop) -> anyhow::Result<AppState<A>> {
        let window = Arc::new(create_window(event_loop, &self.config.platform())?);

        let mut ctx = AppContext::new(
            window,
            self.config.validation,
            &self.config.title,
            self.config.present(),
        )?;

        let app = A::init(&mut ctx)?;

        Ok(AppState {
            app,
            ctx,
            target_frame_time: self.config.frame_interval(),
            last_frame_time: Instant::now(),
            min_fps: f64::MAX,
            max_fps: 0.0,
            fps_sum: 0.0,
        })
    }

    fn stop(&mut self, event_loop: &ActiveEventLoop) {
        if let Some(mut state) = self.state.take() {
            state.cleanup();
        }
        event_loop.exit();
    }
}

impl<A: SwaplineApp> AppState<A> {
    #[cfg_attr(
        feature = "profiling-tracy",
        tracing::instrument(level = "trace", skip_all)
    )]
    fn render_frame(&mut self) -> anyhow::Result<()> {
        let frame_start = Instant::now();
        let dt = frame_start
            .duration_since(self.last_frame_time)
            .as_secs_f32();
        self.last_frame_time = frame_start;

        if let Some((width, height)) = self.ctx.resize.take() {
            self.ctx.presentation.handle_resize(width, height);
            self.app.on_resize(&mut self.ctx, width, height)?;
        }

        self.app.update(&mut self.ctx, dt)?;

        if let FrameOutcome::Presented { .. } = self.ctx.presentation.run_one_frame()? {
            if dt > 0.0 {
                let fps = 1.0 / f64::from(dt);
                self.min_fps = self.min_fps.min(fps);
                self.max_fps = self.max_fps.max(fps);
                self.fps_sum += fps;
            }
        }

        // Frame pacing
        if let Some(target) = self.target_frame_time {
            let elapsed = frame_start.elapsed();
            if elapsed < target {
                thread::sleep(target - elapsed);
            }
        }

        Ok(())
    }

    fn cleanup(&mut self) {
        let frames = self.ctx.frame_count();
        if frames > 0 {
            #[allow(clippy::cast_precision_loss)]
            let avg_fps = self.fps_sum / frames as f64;
            info!("FPS Statistics:");
            info!("  Min: {:.1}", self.min_fps);
            info!("  Max: {:.1}", self.max_fps);
            info!("  Avg: {:.1}", avg_fps);
            info!("  Total frames: {}", frames);
        }

        info!("Starting cleanup...");
        if let Err(e) = self.ctx.presentation.shutdown() {
            error!("Presentation shutdown failed: {e}");
        }
        if let Err(e) = self.ctx.gpu.wait_idle() {
            error!("Failed to wait idle: {e}");
        }

        self.app.cleanup(&mut self.ctx);
        info!("Cleanup complete");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn present_config_follows_app_config() {
        let config = AppConfig::new("test").with_vsync(false).with_frames_in_flight(3);
        let present = config.present();
        assert_eq!(present.max_in_flight, 3);
        assert_eq!(present.present_mode, PresentModePolicy::Mailbox);

        let present = AppConfig::default().present();
        assert_eq!(present.max_in_flight, MAX_IN_FLIGHT);
        assert_eq!(present.present_mode, PresentModePolicy::Fifo);
    }

    #[test]
    fn platform_config_follows_app_config() {
        let platform = AppConfig::new("Triangle")
            .with_size(1024, 768)
            .with_resizable(false)
            .platform();
        assert_eq!(platform.title, "Triangle");
        assert_eq!((platform.width, platform.height), (1024, 768));
        assert!(!platform.resizable);
    }

    #[test]
    fn frame_interval() {
        assert_eq!(AppConfig::default().frame_interval(), None);
        assert_eq!(
            AppConfig::default().with_target_fps(50).frame_interval(),
            Some(Duration::from_millis(20))
        );
        assert_eq!(AppConfig::default().with_target_fps(0).frame_interval(), None);
    }
}
