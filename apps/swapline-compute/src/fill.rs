//! Headless compute pass filling a pixel buffer.

use std::time::{Duration, Instant};

use ash::vk;
use bytemuck::{Pod, Zeroable};
use gpu_allocator::MemoryLocation;
use swapline_gpu::command::{begin_command_buffer, end_command_buffer, submit_command_buffers, CommandPool};
use swapline_gpu::sync::{reset_fence, wait_for_fence};
use swapline_gpu::{
    create_fence, write_storage_buffer, ComputePipeline, DescriptorPool, DescriptorSetLayoutBuilder,
    FenceWait, GpuBuffer, GpuContext,
};
use swapline_shaders::FILL_WORKGROUP_SIZE;
use tracing::{debug, error};

/// Push constants of `fill.comp`.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct FillParams {
    pub width: u32,
    pub height: u32,
    pub iteration: u32,
}

/// Workgroups needed to cover `size` invocations.
pub fn group_count(size: u32) -> u32 {
    size.div_ceil(FILL_WORKGROUP_SIZE)
}

/// Storage buffer, pipeline and command resources for the fill shader.
pub struct FillPass {
    width: u32,
    height: u32,
    buffer: GpuBuffer,
    set_layout: vk::DescriptorSetLayout,
    descriptor_pool: Option<DescriptorPool>,
    descriptor_set: vk::DescriptorSet,
    pipeline: Option<ComputePipeline>,
    command_pool: Option<CommandPool>,
    command_buffer: vk::CommandBuffer,
    fence: vk::Fence,
}

impl FillPass {
    /// Allocate a `width * height` pixel buffer and build the pipeline.
    pub fn new(gpu: &GpuContext, width: u32, height: u32) -> anyhow::Result<Self> {
        let size = u64::from(width) * u64::from(height) * std::mem::size_of::<u32>() as u64;
        let buffer = gpu.allocator().lock().create_buffer(
            size,
            vk::BufferUsageFlags::STORAGE_BUFFER,
            MemoryLocation::GpuToCpu,
            "fill_pixels",
        )?;

        let mut pass = Self {
            width,
            height,
            buffer,
            set_layout: vk::DescriptorSetLayout::null(),
            descriptor_pool: None,
            descriptor_set: vk::DescriptorSet::null(),
            pipeline: None,
            command_pool: None,
            command_buffer: vk::CommandBuffer::null(),
            fence: vk::Fence::null(),
        };

        if let Err(e) = unsafe { pass.create_resources(gpu) } {
            pass.destroy(gpu);
            return Err(e);
        }
        Ok(pass)
    }

    unsafe fn create_resources(&mut self, gpu: &GpuContext) -> anyhow::Result<()> {
        let device = gpu.device();

        let layout_builder =
            DescriptorSetLayoutBuilder::new().storage_buffer(0, vk::ShaderStageFlags::COMPUTE);
        let pool_sizes = layout_builder.pool_sizes();
        self.set_layout = unsafe { layout_builder.build(device)? };

        let pool = unsafe { DescriptorPool::new(device, 1, &pool_sizes)? };
        let sets = unsafe { pool.allocate(device, &[self.set_layout])? };
        self.descriptor_pool = Some(pool);
        self.descriptor_set = sets[0];
        unsafe {
            write_storage_buffer(
                device,
                self.descriptor_set,
                0,
                self.buffer.buffer,
                0,
                self.buffer.size,
            );
        }

        #[allow(clippy::cast_possible_truncation)]
        let push_range = vk::PushConstantRange::default()
            .stage_flags(vk::ShaderStageFlags::COMPUTE)
            .offset(0)
            .size(std::mem::size_of::<FillParams>() as u32);
        let shader = swapline_shaders::fill_compute_shader()?;
        self.pipeline = Some(unsafe {
            ComputePipeline::new(
                device,
                shader,
                &[self.set_layout],
                &[push_range],
            )?
        });

        let command_pool = unsafe {
            CommandPool::new(
                device,
                gpu.compute_queue_family(),
                vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER,
            )?
        };
        let buffers = unsafe { command_pool.allocate_command_buffers(device, 1)? };
        self.command_pool = Some(command_pool);
        self.command_buffer = buffers[0];

        self.fence = unsafe { create_fence(device, false)? };
        Ok(())
    }

    /// Record, submit and wait for one dispatch. Returns the wall time taken.
    #[cfg_attr(
        feature = "profiling-tracy",
        tracing::instrument(level = "trace", skip_all)
    )]
    pub fn dispatch(&self, gpu: &GpuContext, iteration: u32) -> anyhow::Result<Duration> {
        let pipeline = self
            .pipeline
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("fill pipeline was destroyed"))?;
        let device = gpu.device();
        let cmd = self.command_buffer;
        let params = FillParams {
            width: self.width,
            height: self.height,
            iteration,
        };

        let start = Instant::now();
        unsafe {
            device.reset_command_buffer(cmd, vk::CommandBufferResetFlags::empty())?;
            begin_command_buffer(device, cmd, vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT)?;

            device.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::COMPUTE, pipeline.pipeline);
            device.cmd_bind_descriptor_sets(
                cmd,
                vk::PipelineBindPoint::COMPUTE,
                pipeline.layout,
                0,
                &[self.descriptor_set],
                &[],
            );
            device.cmd_push_constants(
                cmd,
                pipeline.layout,
                vk::ShaderStageFlags::COMPUTE,
                0,
                bytemuck::bytes_of(&params),
            );
            device.cmd_dispatch(cmd, group_count(self.width), group_count(self.height), 1);

            // Shader writes must be visible to the host readback
            let barrier = vk::MemoryBarrier::default()
                .src_access_mask(vk::AccessFlags::SHADER_WRITE)
                .dst_access_mask(vk::AccessFlags::HOST_READ);
            device.cmd_pipeline_barrier(
                cmd,
                vk::PipelineStageFlags::COMPUTE_SHADER,
                vk::PipelineStageFlags::HOST,
                vk::DependencyFlags::empty(),
                &[barrier],
                &[],
                &[],
            );

            end_command_buffer(device, cmd)?;
            reset_fence(device, self.fence)?;
            submit_command_buffers(device, gpu.compute_queue(), &[cmd], &[], &[], &[], self.fence)?;

            match wait_for_fence(device, self.fence, u64::MAX)? {
                FenceWait::Signaled => {}
                FenceWait::TimedOut => anyhow::bail!("fill dispatch {iteration} never completed"),
            }
        }
        let elapsed = start.elapsed();

        debug!("Dispatch {} took {:.3} ms", iteration, elapsed.as_secs_f64() * 1000.0);
        Ok(elapsed)
    }

    /// Read the packed `0xRRGGBBAA` pixels back from the buffer.
    pub fn read_pixels(&self) -> anyhow::Result<Vec<u32>> {
        let count = self.width as usize * self.height as usize;
        Ok(self.buffer.read::<u32>(count)?)
    }

    /// Release every resource. Safe to call on a partially built pass.
    pub fn destroy(&mut self, gpu: &GpuContext) {
        let device = gpu.device();
        unsafe {
            if self.fence != vk::Fence::null() {
                device.destroy_fence(self.fence, None);
                self.fence = vk::Fence::null();
            }
            if let Some(mut pool) = self.command_pool.take() {
                pool.free_command_buffers(device, &[self.command_buffer]);
                pool.destroy(device);
            }
            self.command_buffer = vk::CommandBuffer::null();
            if let Some(mut pipeline) = self.pipeline.take() {
                pipeline.destroy(device);
            }
            if let Some(mut pool) = self.descriptor_pool.take() {
                pool.destroy(device);
            }
            self.descriptor_set = vk::DescriptorSet::null();
            if self.set_layout != vk::DescriptorSetLayout::null() {
                device.destroy_descriptor_set_layout(self.set_layout, None);
                self.set_layout = vk::DescriptorSetLayout::null();
            }
        }
        if let Err(e) = gpu.allocator().lock().free_buffer(&mut self.buffer) {
            error!("Failed to free pixel buffer: {e}");
        }
    }
}
