//! Per-frame command recording and queue submission.

use crate::device::{CommandEncoder, PresentDevice, Submission};
use crate::error::{PresentError, Result};
use ash::vk;

/// A graphics draw recorded inside the presentation render pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrawCall {
    pub pipeline: vk::Pipeline,
    pub layout: vk::PipelineLayout,
    pub descriptor_sets: Vec<vk::DescriptorSet>,
    pub vertex_buffers: Vec<vk::Buffer>,
    pub vertex_count: u32,
    pub instance_count: u32,
}

impl DrawCall {
    /// A non-instanced draw with no bound resources.
    pub fn new(pipeline: vk::Pipeline, layout: vk::PipelineLayout, vertex_count: u32) -> Self {
        Self {
            pipeline,
            layout,
            descriptor_sets: Vec::new(),
            vertex_buffers: Vec::new(),
            vertex_count,
            instance_count: 1,
        }
    }

    pub fn with_vertex_buffer(mut self, buffer: vk::Buffer) -> Self {
        self.vertex_buffers.push(buffer);
        self
    }

    pub fn with_descriptor_set(mut self, set: vk::DescriptorSet) -> Self {
        self.descriptor_sets.push(set);
        self
    }

    pub fn with_instances(mut self, count: u32) -> Self {
        self.instance_count = count;
        self
    }

    fn validate(&self) -> Result<()> {
        if self.pipeline == vk::Pipeline::null() {
            return Err(PresentError::InvalidFramePass(
                "draw without a pipeline".to_string(),
            ));
        }
        if self.vertex_count == 0 || self.instance_count == 0 {
            return Err(PresentError::InvalidFramePass(format!(
                "empty draw: {} vertices x {} instances",
                self.vertex_count, self.instance_count
            )));
        }
        if !self.descriptor_sets.is_empty() && self.layout == vk::PipelineLayout::null() {
            return Err(PresentError::InvalidFramePass(
                "descriptor sets without a pipeline layout".to_string(),
            ));
        }
        Ok(())
    }
}

/// A compute dispatch recorded before the render pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComputeDispatch {
    pub pipeline: vk::Pipeline,
    pub layout: vk::PipelineLayout,
    pub descriptor_sets: Vec<vk::DescriptorSet>,
    pub group_count: [u32; 3],
}

impl ComputeDispatch {
    fn validate(&self) -> Result<()> {
        if self.pipeline == vk::Pipeline::null() {
            return Err(PresentError::InvalidFramePass(
                "dispatch without a pipeline".to_string(),
            ));
        }
        if self.group_count.contains(&0) {
            return Err(PresentError::InvalidFramePass(format!(
                "empty dispatch: {:?}",
                self.group_count
            )));
        }
        if !self.descriptor_sets.is_empty() && self.layout == vk::PipelineLayout::null() {
            return Err(PresentError::InvalidFramePass(
                "descriptor sets without a pipeline layout".to_string(),
            ));
        }
        Ok(())
    }
}

/// What gets recorded into each frame. Validated on construction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FramePass {
    pre_pass: Option<ComputeDispatch>,
    draw: Option<DrawCall>,
}

impl FramePass {
    pub fn new(pre_pass: Option<ComputeDispatch>, draw: Option<DrawCall>) -> Result<Self> {
        if let Some(dispatch) = &pre_pass {
            dispatch.validate()?;
        }
        if let Some(draw) = &draw {
            draw.validate()?;
        }
        Ok(Self { pre_pass, draw })
    }

    /// Only clears the swapchain image.
    pub fn clear_only() -> Self {
        Self::default()
    }

    pub fn draw(call: DrawCall) -> Result<Self> {
        Self::new(None, Some(call))
    }

    pub fn pre_pass(&self) -> Option<&ComputeDispatch> {
        self.pre_pass.as_ref()
    }

    pub fn draw_call(&self) -> Option<&DrawCall> {
        self.draw.as_ref()
    }
}

/// Records a frame into a command buffer and submits it.
#[derive(Debug, Clone)]
pub struct CommandSubmitter {
    clear_color: [f32; 4],
}

impl CommandSubmitter {
    pub fn new(clear_color: [f32; 4]) -> Self {
        Self { clear_color }
    }

    pub fn clear_color(&self) -> [f32; 4] {
        self.clear_color
    }

    /// Re-record `cmd` from scratch: optional compute pre-pass, then the
    /// render pass with a full-area viewport and scissor.
    #[cfg_attr(
        feature = "profiling-tracy",
        tracing::instrument(level = "trace", skip_all)
    )]
    pub fn record_frame<E: CommandEncoder>(
        &self,
        encoder: &E,
        cmd: vk::CommandBuffer,
        render_pass: vk::RenderPass,
        framebuffer: vk::Framebuffer,
        render_area: vk::Extent2D,
        pass: &FramePass,
    ) -> Result<()> {
        encoder.reset_command_buffer(cmd)?;
        encoder.begin_command_buffer(cmd)?;

        if let Some(dispatch) = &pass.pre_pass {
            encoder.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::COMPUTE, dispatch.pipeline);
            if !dispatch.descriptor_sets.is_empty() {
                encoder.cmd_bind_descriptor_sets(
                    cmd,
                    vk::PipelineBindPoint::COMPUTE,
                    dispatch.layout,
                    &dispatch.descriptor_sets,
                );
            }
            encoder.cmd_dispatch(cmd, dispatch.group_count);
            encoder.cmd_compute_to_graphics_barrier(cmd);
        }

        let area = vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent: render_area,
        };
        let clear_values = [vk::ClearValue {
            color: vk::ClearColorValue {
                float32: self.clear_color,
            },
        }];
        encoder.cmd_begin_render_pass(cmd, render_pass, framebuffer, area, &clear_values);

        if let Some(draw) = &pass.draw {
            encoder.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, draw.pipeline);
            if !draw.descriptor_sets.is_empty() {
                encoder.cmd_bind_descriptor_sets(
                    cmd,
                    vk::PipelineBindPoint::GRAPHICS,
                    draw.layout,
                    &draw.descriptor_sets,
                );
            }
            if !draw.vertex_buffers.is_empty() {
                encoder.cmd_bind_vertex_buffers(cmd, &draw.vertex_buffers);
            }

            #[allow(clippy::cast_precision_loss)]
            let viewport = vk::Viewport {
                x: 0.0,
                y: 0.0,
                width: render_area.width as f32,
                height: render_area.height as f32,
                min_depth: 0.0,
                max_depth: 1.0,
            };
            encoder.cmd_set_viewport(cmd, viewport);
            encoder.cmd_set_scissor(cmd, area);
            encoder.cmd_draw(cmd, draw.vertex_count, draw.instance_count);
        }

        encoder.cmd_end_render_pass(cmd);
        encoder.end_command_buffer(cmd)?;
        Ok(())
    }

    /// Submit `cmd` to `queue`: wait on `wait` at color attachment output,
    /// signal `signal` and `fence` on completion.
    pub fn submit<D: PresentDevice>(
        &self,
        device: &D,
        queue: vk::Queue,
        cmd: vk::CommandBuffer,
        wait: vk::Semaphore,
        signal: vk::Semaphore,
        fence: vk::Fence,
    ) -> Result<()> {
        let submission = Submission {
            command_buffer: cmd,
            wait_semaphore: wait,
            wait_stage: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
            signal_semaphore: signal,
            fence,
        };
        device
            .submit(queue, &submission)
            .map_err(PresentError::SubmissionFailure)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockDevice;
    use ash::vk::Handle;

    fn pipeline() -> vk::Pipeline {
        vk::Pipeline::from_raw(100)
    }

    fn record(mock: &MockDevice, pass: &FramePass) -> Vec<String> {
        let cmd = mock.allocate_command_buffers(1).unwrap()[0];
        mock.take_events();
        CommandSubmitter::new([0.0; 4])
            .record_frame(
                mock,
                cmd,
                vk::RenderPass::null(),
                vk::Framebuffer::null(),
                vk::Extent2D {
                    width: 320,
                    height: 200,
                },
                pass,
            )
            .unwrap();
        mock.take_events()
    }

    #[test]
    fn clear_only_records_no_draw() {
        let mock = MockDevice::new();
        assert_eq!(record(&mock, &FramePass::clear_only()), vec!["record cmd#2"]);
    }

    #[test]
    fn draw_sets_full_viewport() {
        let mock = MockDevice::new();
        let pass = FramePass::draw(DrawCall::new(pipeline(), vk::PipelineLayout::null(), 3)).unwrap();
        insta::assert_debug_snapshot!(record(&mock, &pass), @r###"
        [
            "record cmd#2",
            "viewport 320x200",
            "draw 3x1",
        ]
        "###);
    }

    #[test]
    fn pre_pass_runs_before_draw() {
        let mock = MockDevice::new();
        let dispatch = ComputeDispatch {
            pipeline: pipeline(),
            layout: vk::PipelineLayout::null(),
            descriptor_sets: Vec::new(),
            group_count: [8, 8, 1],
        };
        let draw = DrawCall::new(pipeline(), vk::PipelineLayout::null(), 6).with_instances(2);
        let pass = FramePass::new(Some(dispatch), Some(draw)).unwrap();

        assert_eq!(
            record(&mock, &pass),
            vec![
                "record cmd#2",
                "dispatch 8x8x1",
                "barrier",
                "viewport 320x200",
                "draw 6x2",
            ]
        );
    }

    #[test]
    fn invalid_passes_are_rejected() {
        let layout = vk::PipelineLayout::null();
        let cases = [
            FramePass::draw(DrawCall::new(vk::Pipeline::null(), layout, 3)),
            FramePass::draw(DrawCall::new(pipeline(), layout, 0)),
            FramePass::draw(DrawCall::new(pipeline(), layout, 3).with_instances(0)),
            FramePass::draw(
                DrawCall::new(pipeline(), layout, 3)
                    .with_descriptor_set(vk::DescriptorSet::from_raw(5)),
            ),
            FramePass::new(
                Some(ComputeDispatch {
                    pipeline: pipeline(),
                    layout,
                    descriptor_sets: Vec::new(),
                    group_count: [4, 0, 1],
                }),
                None,
            ),
        ];

        for case in cases {
            assert!(matches!(case, Err(PresentError::InvalidFramePass(_))));
        }
    }

    #[test]
    fn submit_errors_are_submission_failures() {
        let mock = MockDevice::new();
        mock.fail_next_submit(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY);
        let result = CommandSubmitter::new([0.0; 4]).submit(
            &mock,
            vk::Queue::null(),
            vk::CommandBuffer::null(),
            vk::Semaphore::null(),
            vk::Semaphore::null(),
            vk::Fence::null(),
        );
        assert_eq!(
            result,
            Err(PresentError::SubmissionFailure(
                vk::Result::ERROR_OUT_OF_DEVICE_MEMORY
            ))
        );
    }
}
