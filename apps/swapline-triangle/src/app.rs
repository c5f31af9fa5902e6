//! Triangle application state.

use ash::vk;
use bytemuck::{Pod, Zeroable};
use gpu_allocator::MemoryLocation;
use swapline_app::{AppContext, SwaplineApp};
use swapline_gpu::{GpuBuffer, GraphicsPipeline, GraphicsPipelineConfig, VertexLayout};
use swapline_present::{DrawCall, FramePass};
use tracing::{error, info};

/// Interleaved vertex: clip-space position and RGBA color.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub pos: [f32; 2],
    pub color: [f32; 4],
}

impl Vertex {
    /// Input layout matching `triangle.vert`.
    pub fn layout() -> swapline_gpu::Result<VertexLayout> {
        #[allow(clippy::cast_possible_truncation)]
        let stride = std::mem::size_of::<Self>() as u32;
        VertexLayout::new(
            stride,
            &[vk::Format::R32G32_SFLOAT, vk::Format::R32G32B32A32_SFLOAT],
        )
    }
}

const VERTICES: [Vertex; 3] = [
    Vertex {
        pos: [0.0, -0.5],
        color: [1.0, 0.0, 0.0, 1.0],
    },
    Vertex {
        pos: [0.5, 0.5],
        color: [0.0, 1.0, 0.0, 1.0],
    },
    Vertex {
        pos: [-0.5, 0.5],
        color: [0.0, 0.0, 1.0, 1.0],
    },
];

/// Draws one triangle every frame.
pub struct TriangleApp {
    pipeline: GraphicsPipeline,
    vertex_buffer: GpuBuffer,
}

impl SwaplineApp for TriangleApp {
    fn init(ctx: &mut AppContext) -> anyhow::Result<Self> {
        let mut vertex_buffer = ctx.gpu.allocator().lock().create_buffer(
            std::mem::size_of_val(&VERTICES) as u64,
            vk::BufferUsageFlags::VERTEX_BUFFER,
            MemoryLocation::CpuToGpu,
            "triangle_vertices",
        )?;

        let pipeline = match create_pipeline(ctx, &mut vertex_buffer) {
            Ok(pipeline) => pipeline,
            Err(e) => {
                let _ = ctx.gpu.allocator().lock().free_buffer(&mut vertex_buffer);
                return Err(e);
            }
        };

        #[allow(clippy::cast_possible_truncation)]
        let draw = DrawCall::new(pipeline.pipeline, pipeline.layout, VERTICES.len() as u32)
            .with_vertex_buffer(vertex_buffer.buffer);
        ctx.set_frame_pass(FramePass::draw(draw)?);

        let extent = ctx.extent();
        info!("Triangle ready at {}x{}", extent.width, extent.height);

        Ok(Self {
            pipeline,
            vertex_buffer,
        })
    }

    fn update(&mut self, _ctx: &mut AppContext, _dt: f32) -> anyhow::Result<()> {
        Ok(())
    }

    fn on_resize(&mut self, _ctx: &mut AppContext, width: u32, height: u32) -> anyhow::Result<()> {
        info!("Resized to {}x{}", width, height);
        Ok(())
    }

    fn cleanup(&mut self, ctx: &mut AppContext) {
        unsafe {
            self.pipeline.destroy(ctx.device());
        }
        if let Err(e) = ctx
            .gpu
            .allocator()
            .lock()
            .free_buffer(&mut self.vertex_buffer)
        {
            error!("Failed to free vertex buffer: {e}");
        }
    }
}

/// Upload the vertices and build the pipeline against the loop's render pass.
fn create_pipeline(
    ctx: &AppContext,
    vertex_buffer: &mut GpuBuffer,
) -> anyhow::Result<GraphicsPipeline> {
    vertex_buffer.write(&VERTICES)?;

    let render_pass = ctx.render_pass();
    anyhow::ensure!(
        render_pass != vk::RenderPass::null(),
        "window has zero area, no render pass to build against"
    );

    let config = GraphicsPipelineConfig {
        vertex_shader: swapline_shaders::triangle_vertex_shader()?.to_vec(),
        fragment_shader: swapline_shaders::triangle_fragment_shader()?.to_vec(),
        vertex_layout: Vertex::layout()?,
        ..Default::default()
    };

    let pipeline = unsafe { GraphicsPipeline::new(ctx.device(), &config, render_pass, &[], &[])? };
    Ok(pipeline)
}
