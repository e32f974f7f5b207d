// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Vertex input layout and descriptor-set layout descriptions.

use crate::renderer::api::shader::ShaderStage;

/// The scalar type of a shader input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderType {
    /// Signed integer.
    SignedInt,
    /// Unsigned integer.
    UnsignedInt,
    /// Floating point.
    Float,
    /// Half precision floating point.
    HalfFloat,
    /// Signed byte.
    SignedByte,
    /// Unsigned byte.
    UnsignedByte,
}

/// One vertex shader input.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ShaderStageIOSlot {
    /// The input's name, for diagnostics.
    pub name: String,
    /// The shader input location.
    pub location: u32,
    /// The vertex buffer binding this input reads from.
    pub binding: u32,
    /// The scalar type.
    pub shader_type: ShaderType,
    /// The width of one scalar in bits.
    pub bit_width: u32,
    /// The number of scalars (1 to 4).
    pub vec_size: u32,
    /// The byte offset of this input within a vertex.
    pub offset: u32,
}

impl ShaderStageIOSlot {
    /// A `vecN` of 32-bit floats.
    pub fn float_vec(name: &str, location: u32, vec_size: u32, offset: u32) -> Self {
        Self {
            name: name.to_string(),
            location,
            binding: 0,
            shader_type: ShaderType::Float,
            bit_width: 32,
            vec_size,
            offset,
        }
    }

    /// The size of this input in bytes.
    pub fn byte_size(&self) -> u32 {
        self.bit_width / 8 * self.vec_size
    }
}

/// The stride of one vertex buffer binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShaderStageBufferLayout {
    /// The distance in bytes between consecutive vertices.
    pub stride: u32,
    /// The binding index.
    pub binding: u32,
}

/// The kind of resource bound at a descriptor slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DescriptorType {
    /// A uniform buffer.
    UniformBuffer,
    /// A storage buffer.
    StorageBuffer,
    /// A combined image and sampler.
    SampledImage,
    /// A storage image.
    Image,
    /// A standalone sampler.
    Sampler,
    /// An input attachment read in the same subpass.
    InputAttachment,
}

/// One slot of a descriptor-set layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DescriptorSetLayout {
    /// The binding index within the set.
    pub binding: u32,
    /// The kind of resource.
    pub descriptor_type: DescriptorType,
    /// The stage that reads the resource.
    pub shader_stage: ShaderStage,
}

/// The vertex inputs, buffer layouts and descriptor-set layouts of a
/// pipeline.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct VertexDescriptor {
    inputs: Vec<ShaderStageIOSlot>,
    layouts: Vec<ShaderStageBufferLayout>,
    desc_set_layouts: Vec<DescriptorSetLayout>,
}

impl VertexDescriptor {
    /// Creates an empty vertex descriptor.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the stage inputs and buffer layouts.
    pub fn set_stage_inputs(
        &mut self,
        inputs: Vec<ShaderStageIOSlot>,
        layouts: Vec<ShaderStageBufferLayout>,
    ) -> &mut Self {
        self.inputs = inputs;
        self.layouts = layouts;
        self
    }

    /// Registers descriptor-set layout slots. Slots are appended.
    pub fn register_descriptor_set_layouts(
        &mut self,
        layouts: &[DescriptorSetLayout],
    ) -> &mut Self {
        self.desc_set_layouts.extend_from_slice(layouts);
        self
    }

    /// The stage inputs.
    pub fn stage_inputs(&self) -> &[ShaderStageIOSlot] {
        &self.inputs
    }

    /// The buffer layouts.
    pub fn stage_layouts(&self) -> &[ShaderStageBufferLayout] {
        &self.layouts
    }

    /// The descriptor-set layout slots.
    pub fn descriptor_set_layouts(&self) -> &[DescriptorSetLayout] {
        &self.desc_set_layouts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vertex_descriptor_accumulates_set_layouts() {
        let mut vd = VertexDescriptor::new();
        vd.set_stage_inputs(
            vec![ShaderStageIOSlot::float_vec("position", 0, 2, 0)],
            vec![ShaderStageBufferLayout {
                stride: 8,
                binding: 0,
            }],
        );
        vd.register_descriptor_set_layouts(&[DescriptorSetLayout {
            binding: 0,
            descriptor_type: DescriptorType::UniformBuffer,
            shader_stage: ShaderStage::Vertex,
        }]);
        vd.register_descriptor_set_layouts(&[DescriptorSetLayout {
            binding: 1,
            descriptor_type: DescriptorType::SampledImage,
            shader_stage: ShaderStage::Fragment,
        }]);

        assert_eq!(vd.stage_inputs()[0].byte_size(), 8);
        assert_eq!(vd.descriptor_set_layouts().len(), 2);
    }
}
