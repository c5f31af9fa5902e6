//! Swapline headless compute sample.
//!
//! Fills a storage buffer with a gradient from a compute shader, times a
//! number of dispatches, then writes the last result to a binary PPM file.
//! No window or surface is created.
//!
//! # Usage
//!
//! ```bash
//! cargo run -p swapline-compute [OPTIONS]
//! ```
//!
//! # Options
//!
//! - `--size <WxH>`: Buffer dimensions in pixels (default: 512x512)
//! - `--iterations <N>`: Timed dispatches to run (default: 10)
//! - `--output <PATH>`: PPM output path (default: fill.ppm)
//! - `-h, --help`: Print help information

mod fill;
mod ppm;

use std::path::PathBuf;
use std::time::Duration;

use fill::FillPass;
use swapline_gpu::{GpuContext, GpuContextBuilder};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Command line options.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ComputeArgs {
    width: u32,
    height: u32,
    iterations: u32,
    output: PathBuf,
}

impl Default for ComputeArgs {
    fn default() -> Self {
        Self {
            width: 512,
            height: 512,
            iterations: 10,
            output: PathBuf::from("fill.ppm"),
        }
    }
}

impl ComputeArgs {
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
                "--iterations" => {
                    if i + 1 < args.len() {
                        if let Ok(n) = args[i + 1].parse::<u32>() {
                            if n > 0 {
                                parsed.iterations = n;
                            }
                        }
                        i += 1;
                    }
                }
                "-o" | "--output" => {
                    if i + 1 < args.len() {
                        parsed.output = PathBuf::from(&args[i + 1]);
                        i += 1;
                    }
                }
                _ => {}
            }
            i += 1;
        }

        parsed
    }
}

/// Parse a `WxH` size such as `512x512`.
fn parse_size(s: &str) -> Option<(u32, u32)> {
    let (width, height) = s.split_once(['x', 'X'])?;
    let width = width.trim().parse().ok()?;
    let height = height.trim().parse().ok()?;
    (width > 0 && height > 0).then_some((width, height))
}

/// Average duration and the matching rate per second.
fn average(samples: &[Duration]) -> Option<(Duration, f64)> {
    let count = u32::try_from(samples.len()).ok().filter(|&n| n > 0)?;
    let avg = samples.iter().sum::<Duration>() / count;
    let secs = avg.as_secs_f64();
    let rate = if secs > 0.0 { 1.0 / secs } else { f64::INFINITY };
    Some((avg, rate))
}

fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().collect();
    if args.iter().any(|a| a == "-h" || a == "--help") {
        print_help();
        return Ok(());
    }
    let args = ComputeArgs::parse_args(&args);

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Swapline compute sample starting...");

    let gpu = GpuContextBuilder::new()
        .app_name("swapline-compute")
        .validation(cfg!(debug_assertions))
        .build()?;
    info!("GPU: {}", gpu.device_name());

    let mut pass = FillPass::new(&gpu, args.width, args.height)?;
    let result = run(&gpu, &pass, &args);
    pass.destroy(&gpu);
    result
}

fn run(gpu: &GpuContext, pass: &FillPass, args: &ComputeArgs) -> anyhow::Result<()> {
    info!(
        "Dispatching {}x{} fill, {} iterations",
        args.width, args.height, args.iterations
    );

    let mut samples = Vec::with_capacity(args.iterations as usize);
    for iteration in 0..args.iterations {
        samples.push(pass.dispatch(gpu, iteration)?);
    }

    if let Some((avg, rate)) = average(&samples) {
        info!(
            "Average dispatch: {:.3} ms ({:.1} per second)",
            avg.as_secs_f64() * 1000.0,
            rate
        );
    }

    let pixels = pass.read_pixels()?;
    ppm::save_ppm(&args.output, &pixels, args.width, args.height)?;
    info!("Wrote {}", args.output.display());

    Ok(())
}

fn print_help() {
    eprintln!(
        r"Swapline Compute

Runs a compute shader headlessly and writes the result as a PPM image.

USAGE:
    swapline-compute [OPTIONS]

OPTIONS:
    --size <WxH>            Buffer dimensions in pixels (default: 512x512)
    --iterations <N>        Timed dispatches to run (default: 10)
    -o, --output <PATH>     PPM output path (default: fill.ppm)
    -h, --help              Print help information

EXAMPLES:
    swapline-compute
    swapline-compute --size 1024x768 --iterations 100
    swapline-compute --output gradient.ppm

ENVIRONMENT VARIABLES:
    RUST_LOG                Log filter (default: info), e.g. swapline_compute=debug"
    );
}
