//! Vertex input description.

use crate::error::{GpuError, Result};
use ash::vk;

/// Vertex input layout for a single interleaved binding.
///
/// Attributes take consecutive shader locations starting at 0 and are packed
/// back to back in the order given.
#[derive(Debug, Clone)]
pub struct VertexLayout {
    binding: vk::VertexInputBindingDescription,
    attributes: Vec<vk::VertexInputAttributeDescription>,
}

impl VertexLayout {
    /// Describe binding 0 with the given stride and attribute formats.
    ///
    /// Only 32-bit component formats with one to four channels are accepted.
    pub fn new(stride: u32, formats: &[vk::Format]) -> Result<Self> {
        let mut attributes = Vec::with_capacity(formats.len());
        let mut offset = 0u32;

        for (location, &format) in (0u32..).zip(formats) {
            let size = format_size(format).ok_or_else(|| {
                GpuError::VertexLayout(format!("unsupported attribute format {format:?}"))
            })?;
            attributes.push(
                vk::VertexInputAttributeDescription::default()
                    .location(location)
                    .binding(0)
                    .format(format)
                    .offset(offset),
            );
            offset += size;
        }

        if offset > stride {
            return Err(GpuError::VertexLayout(format!(
                "attributes span {offset} bytes but stride is {stride}"
            )));
        }

        let binding = vk::VertexInputBindingDescription::default()
            .binding(0)
            .stride(stride)
            .input_rate(vk::VertexInputRate::VERTEX);

        Ok(Self {
            binding,
            attributes,
        })
    }

    /// An empty layout for pipelines that generate vertices in the shader.
    pub fn empty() -> Self {
        Self {
            binding: vk::VertexInputBindingDescription::default(),
            attributes: Vec::new(),
        }
    }

    /// Binding descriptions, empty when there are no attributes.
    pub fn bindings(&self) -> &[vk::VertexInputBindingDescription] {
        if self.attributes.is_empty() {
            &[]
        } else {
            std::slice::from_ref(&self.binding)
        }
    }

    /// Attribute descriptions in location order.
    pub fn attributes(&self) -> &[vk::VertexInputAttributeDescription] {
        &self.attributes
    }

    /// Bytes per vertex.
    pub fn stride(&self) -> u32 {
        self.binding.stride
    }
}

fn format_size(format: vk::Format) -> Option<u32> {
    match format {
        vk::Format::R32_SFLOAT | vk::Format::R32_SINT | vk::Format::R32_UINT => Some(4),
        vk::Format::R32G32_SFLOAT | vk::Format::R32G32_SINT | vk::Format::R32G32_UINT => Some(8),
        vk::Format::R32G32B32_SFLOAT | vk::Format::R32G32B32_SINT | vk::Format::R32G32B32_UINT => {
            Some(12)
        }
        vk::Format::R32G32B32A32_SFLOAT
        | vk::Format::R32G32B32A32_SINT
        | vk::Format::R32G32B32A32_UINT => Some(16),
        _ => None,
    }
}
