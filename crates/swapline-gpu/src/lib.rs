//! Vulkan abstraction layer for Swapline.
//!
//! This crate provides:
//! - Vulkan instance creation and the debug messenger
//! - Physical device selection and queue family discovery
//! - Surface queries and swapchain parameter selection
//! - Synchronization primitives and command buffer helpers
//! - Render pass, pipeline and descriptor helpers
//! - Memory allocation via gpu-allocator

pub mod command;
pub mod context;
pub mod descriptors;
pub mod error;
pub mod instance;
pub mod memory;
pub mod pipeline;
pub mod surface;
pub mod swapchain;
pub mod sync;
pub mod vertex;

pub use context::{GpuContext, GpuContextBuilder, QueueFamilies};
pub use descriptors::{write_storage_buffer, DescriptorPool, DescriptorSetLayoutBuilder};
pub use error::{GpuError, Result};
pub use instance::DebugMessenger;
pub use memory::{GpuAllocator, GpuBuffer};
pub use pipeline::{create_render_pass, ComputePipeline, GraphicsPipeline, GraphicsPipelineConfig};
pub use surface::{SurfaceCapabilities, SurfaceContext};
pub use swapchain::PresentModePolicy;
pub use sync::{create_fence, create_semaphore, FenceWait};
pub use vertex::VertexLayout;
