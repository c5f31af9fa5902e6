//! Swapline triangle sample.
//!
//! Draws a single colored triangle through the presentation loop. The window
//! can be resized, minimized and restored freely.
//!
//! # Usage
//!
//! ```bash
//! cargo run -p swapline-triangle [OPTIONS]
//! ```
//!
//! # Options
//!
//! - `--size <WxH>`: Initial window size (default: 800x600)
//! - `--no-vsync`: Prefer mailbox presentation over FIFO
//! - `--frames-in-flight <N>`: Frames the CPU may run ahead (default: 2)
//! - `-h, --help`: Print help information
//!
//! # Examples
//!
//! ```bash
//! # Default window
//! cargo run -p swapline-triangle
//!
//! # Large window, no vsync, three frames in flight
//! cargo run -p swapline-triangle -- --size 1920x1080 --no-vsync --frames-in-flight 3
//! ```

mod app;

use app::TriangleApp;
use swapline_app::{run_app, AppConfig};
use swapline_present::MAX_IN_FLIGHT;

/// Command line options.
#[derive(Debug, Clone, PartialEq, Eq)]
struct TriangleArgs {
    width: u32,
    height: u32,
    vsync: bool,
    frames_in_flight: usize,
}

impl Default for TriangleArgs {
    fn default() -> Self {
        Self {
            width: 800,
            height: 600,
            vsync: true,
            frames_in_flight: MAX_IN_FLIGHT,
        }
    }
}

impl TriangleArgs {
    /// Parse from a slice of arguments. Malformed values are ignored.
    fn parse_args(args: &[String]) -> Self {
        let mut parsed = Self::default();

        let mut i = 1;
        while i < args.len() {
            match args[i].as_str() {
                "--size" => {
                    if i + 1 < args.len() {
                        if let Some((width, height)) = parse_size(&args[i + 1]) {
                            parsed.width = width;
                            parsed.height = height;
                        }
                        i += 1;
                    }
                }
                "--no-vsync" => {
                    parsed.vsync = false;
                }
                "--frames-in-flight" => {
                    if i + 1 < args.len() {
                        if let Ok(n) = args[i + 1].parse::<usize>() {
                            if n > 0 {
                                parsed.frames_in_flight = n;
                            }
                        }
                        i += 1;
                    }
                }
                _ => {}
            }
            i += 1;
        }

        parsed
    }

    fn app_config(&self) -> AppConfig {
        AppConfig::new("Swapline Triangle")
            .with_size(self.width, self.height)
            .with_vsync(self.vsync)
            .with_frames_in_flight(self.frames_in_flight)
    }
}

/// Parse a `WxH` size such as `1280x720`.
fn parse_size(s: &str) -> Option<(u32, u32)> {
    let (width, height) = s.split_once(['x', 'X'])?;
    let width = width.trim().parse().ok()?;
    let height = height.trim().parse().ok()?;
    (width > 0 && height > 0).then_some((width, height))
}

fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().collect();
    if args.iter().any(|a| a == "-h" || a == "--help") {
        print_help();
        return Ok(());
    }

    let config = TriangleArgs::parse_args(&args).app_config();
    run_app::<TriangleApp>(config)
}

fn print_help() {
    eprintln!(
        r"Swapline Triangle

Draws a colored triangle through the Swapline presentation loop.

USAGE:
    swapline-triangle [OPTIONS]

OPTIONS:
    --size <WxH>                Initial window size (default: 800x600)
    --no-vsync                  Prefer mailbox presentation over FIFO
    --frames-in-flight <N>      Frames the CPU may run ahead (default: 2)
    -h, --help                  Print help information

EXAMPLES:
    swapline-triangle
    swapline-triangle --size 1920x1080 --no-vsync
    swapline-triangle --frames-in-flight 3

ENVIRONMENT VARIABLES:
    RUST_LOG                    Log filter (default: info), e.g. swapline_present=trace"
    );
}
