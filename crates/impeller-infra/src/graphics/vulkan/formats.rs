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

//! Conversions from renderer types to Vulkan types.

use ash::vk;
use impeller_core::renderer::{
    BlendFactor, BlendOperation, ColorAttachmentDescriptor, ColorWriteMask, CompareFunction,
    CullMode, DescriptorType, LoadAction, PixelFormat, PolygonMode, PrimitiveType, SampleCount,
    ShaderStage, ShaderStageIOSlot, ShaderType, StencilAttachmentDescriptor, StencilOperation,
    StoreAction, WindingOrder,
};

/// A local extension trait to convert renderer types into Vulkan types.
/// This avoids Rust's orphan rules while keeping an idiomatic `.into_vk()` syntax.
pub trait IntoVk<T> {
    /// Consumes self and converts it into a Vulkan type.
    fn into_vk(self) -> T;
}

// --- Formats and Samples ---

impl IntoVk<vk::Format> for PixelFormat {
    fn into_vk(self) -> vk::Format {
        match self {
            PixelFormat::Unknown => vk::Format::UNDEFINED,
            // Alpha-only textures are sampled through a swizzled red channel.
            PixelFormat::A8UNormInt | PixelFormat::R8UNormInt => vk::Format::R8_UNORM,
            PixelFormat::R8G8UNormInt => vk::Format::R8G8_UNORM,
            PixelFormat::R8G8B8A8UNormInt => vk::Format::R8G8B8A8_UNORM,
            PixelFormat::R8G8B8A8UNormIntSRGB => vk::Format::R8G8B8A8_SRGB,
            PixelFormat::B8G8R8A8UNormInt => vk::Format::B8G8R8A8_UNORM,
            PixelFormat::B8G8R8A8UNormIntSRGB => vk::Format::B8G8R8A8_SRGB,
            PixelFormat::R32G32B32A32Float => vk::Format::R32G32B32A32_SFLOAT,
            PixelFormat::R16G16B16A16Float => vk::Format::R16G16B16A16_SFLOAT,
            // Extended range formats have no Vulkan equivalent.
            PixelFormat::B10G10R10XR
            | PixelFormat::B10G10R10XRSRGB
            | PixelFormat::B10G10R10A10XR => vk::Format::UNDEFINED,
            PixelFormat::S8UInt => vk::Format::S8_UINT,
            PixelFormat::D24UnormS8Uint => vk::Format::D24_UNORM_S8_UINT,
            PixelFormat::D32FloatS8UInt => vk::Format::D32_SFLOAT_S8_UINT,
            PixelFormat::D32Float => vk::Format::D32_SFLOAT,
        }
    }
}

/// The renderer format for a Vulkan format, if there is one.
pub fn pixel_format_from_vk(format: vk::Format) -> PixelFormat {
    match format {
        vk::Format::R8_UNORM => PixelFormat::R8UNormInt,
        vk::Format::R8G8_UNORM => PixelFormat::R8G8UNormInt,
        vk::Format::R8G8B8A8_UNORM => PixelFormat::R8G8B8A8UNormInt,
        vk::Format::R8G8B8A8_SRGB => PixelFormat::R8G8B8A8UNormIntSRGB,
        vk::Format::B8G8R8A8_UNORM => PixelFormat::B8G8R8A8UNormInt,
        vk::Format::B8G8R8A8_SRGB => PixelFormat::B8G8R8A8UNormIntSRGB,
        vk::Format::R32G32B32A32_SFLOAT => PixelFormat::R32G32B32A32Float,
        vk::Format::R16G16B16A16_SFLOAT => PixelFormat::R16G16B16A16Float,
        vk::Format::S8_UINT => PixelFormat::S8UInt,
        vk::Format::D24_UNORM_S8_UINT => PixelFormat::D24UnormS8Uint,
        vk::Format::D32_SFLOAT_S8_UINT => PixelFormat::D32FloatS8UInt,
        vk::Format::D32_SFLOAT => PixelFormat::D32Float,
        _ => PixelFormat::Unknown,
    }
}

/// The image aspects a format carries.
pub fn aspect_mask(format: vk::Format) -> vk::ImageAspectFlags {
    match format {
        vk::Format::S8_UINT => vk::ImageAspectFlags::STENCIL,
        vk::Format::D32_SFLOAT => vk::ImageAspectFlags::DEPTH,
        vk::Format::D24_UNORM_S8_UINT | vk::Format::D32_SFLOAT_S8_UINT => {
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        }
        _ => vk::ImageAspectFlags::COLOR,
    }
}

impl IntoVk<vk::SampleCountFlags> for SampleCount {
    fn into_vk(self) -> vk::SampleCountFlags {
        match self {
            SampleCount::Count1 => vk::SampleCountFlags::TYPE_1,
            SampleCount::Count4 => vk::SampleCountFlags::TYPE_4,
        }
    }
}

// --- Load and Store ---

impl IntoVk<vk::AttachmentLoadOp> for LoadAction {
    fn into_vk(self) -> vk::AttachmentLoadOp {
        match self {
            LoadAction::DontCare => vk::AttachmentLoadOp::DONT_CARE,
            LoadAction::Load => vk::AttachmentLoadOp::LOAD,
            LoadAction::Clear => vk::AttachmentLoadOp::CLEAR,
        }
    }
}

impl IntoVk<vk::AttachmentStoreOp> for StoreAction {
    /// The store operation of the multisampled attachment. Resolves are
    /// described separately by the resolve attachment.
    fn into_vk(self) -> vk::AttachmentStoreOp {
        match self {
            StoreAction::Store | StoreAction::StoreAndMultisampleResolve => {
                vk::AttachmentStoreOp::STORE
            }
            StoreAction::DontCare | StoreAction::MultisampleResolve => {
                vk::AttachmentStoreOp::DONT_CARE
            }
        }
    }
}

// --- Shaders and Descriptors ---

impl IntoVk<vk::ShaderStageFlags> for ShaderStage {
    fn into_vk(self) -> vk::ShaderStageFlags {
        match self {
            ShaderStage::Vertex => vk::ShaderStageFlags::VERTEX,
            ShaderStage::Fragment => vk::ShaderStageFlags::FRAGMENT,
            ShaderStage::Compute => vk::ShaderStageFlags::COMPUTE,
        }
    }
}

impl IntoVk<vk::DescriptorType> for DescriptorType {
    fn into_vk(self) -> vk::DescriptorType {
        match self {
            DescriptorType::UniformBuffer => vk::DescriptorType::UNIFORM_BUFFER,
            DescriptorType::StorageBuffer => vk::DescriptorType::STORAGE_BUFFER,
            DescriptorType::SampledImage => vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            DescriptorType::Image => vk::DescriptorType::STORAGE_IMAGE,
            DescriptorType::Sampler => vk::DescriptorType::SAMPLER,
            DescriptorType::InputAttachment => vk::DescriptorType::INPUT_ATTACHMENT,
        }
    }
}

/// The Vulkan format of a vertex input, or `None` if it cannot be expressed.
pub fn vertex_format(slot: &ShaderStageIOSlot) -> Option<vk::Format> {
    match (slot.shader_type, slot.bit_width, slot.vec_size) {
        (ShaderType::Float, 32, 1) => Some(vk::Format::R32_SFLOAT),
        (ShaderType::Float, 32, 2) => Some(vk::Format::R32G32_SFLOAT),
        (ShaderType::Float, 32, 3) => Some(vk::Format::R32G32B32_SFLOAT),
        (ShaderType::Float, 32, 4) => Some(vk::Format::R32G32B32A32_SFLOAT),
        (ShaderType::HalfFloat, 16, 4) => Some(vk::Format::R16G16B16A16_SFLOAT),
        (ShaderType::SignedInt, 32, 1) => Some(vk::Format::R32_SINT),
        (ShaderType::UnsignedInt, 32, 1) => Some(vk::Format::R32_UINT),
        (ShaderType::UnsignedByte, 8, 1) => Some(vk::Format::R8_UNORM),
        (ShaderType::UnsignedByte, 8, 2) => Some(vk::Format::R8G8_UNORM),
        (ShaderType::UnsignedByte, 8, 4) => Some(vk::Format::R8G8B8A8_UNORM),
        _ => None,
    }
}

// --- Rasterizer State ---

impl IntoVk<vk::PrimitiveTopology> for PrimitiveType {
    fn into_vk(self) -> vk::PrimitiveTopology {
        match self {
            PrimitiveType::Triangle => vk::PrimitiveTopology::TRIANGLE_LIST,
            PrimitiveType::TriangleStrip => vk::PrimitiveTopology::TRIANGLE_STRIP,
            PrimitiveType::Line => vk::PrimitiveTopology::LINE_LIST,
            PrimitiveType::LineStrip => vk::PrimitiveTopology::LINE_STRIP,
            PrimitiveType::Point => vk::PrimitiveTopology::POINT_LIST,
            PrimitiveType::TriangleFan => vk::PrimitiveTopology::TRIANGLE_FAN,
        }
    }
}

impl IntoVk<vk::PolygonMode> for PolygonMode {
    fn into_vk(self) -> vk::PolygonMode {
        match self {
            PolygonMode::Fill => vk::PolygonMode::FILL,
            PolygonMode::Line => vk::PolygonMode::LINE,
        }
    }
}

impl IntoVk<vk::CullModeFlags> for CullMode {
    fn into_vk(self) -> vk::CullModeFlags {
        match self {
            CullMode::None => vk::CullModeFlags::NONE,
            CullMode::FrontFace => vk::CullModeFlags::FRONT,
            CullMode::BackFace => vk::CullModeFlags::BACK,
        }
    }
}

impl IntoVk<vk::FrontFace> for WindingOrder {
    fn into_vk(self) -> vk::FrontFace {
        match self {
            WindingOrder::Clockwise => vk::FrontFace::CLOCKWISE,
            WindingOrder::CounterClockwise => vk::FrontFace::COUNTER_CLOCKWISE,
        }
    }
}

// --- Blending ---

impl IntoVk<vk::BlendFactor> for BlendFactor {
    fn into_vk(self) -> vk::BlendFactor {
        match self {
            BlendFactor::Zero => vk::BlendFactor::ZERO,
            BlendFactor::One => vk::BlendFactor::ONE,
            BlendFactor::SourceColor => vk::BlendFactor::SRC_COLOR,
            BlendFactor::OneMinusSourceColor => vk::BlendFactor::ONE_MINUS_SRC_COLOR,
            BlendFactor::SourceAlpha => vk::BlendFactor::SRC_ALPHA,
            BlendFactor::OneMinusSourceAlpha => vk::BlendFactor::ONE_MINUS_SRC_ALPHA,
            BlendFactor::DestinationColor => vk::BlendFactor::DST_COLOR,
            BlendFactor::OneMinusDestinationColor => vk::BlendFactor::ONE_MINUS_DST_COLOR,
            BlendFactor::DestinationAlpha => vk::BlendFactor::DST_ALPHA,
            BlendFactor::OneMinusDestinationAlpha => vk::BlendFactor::ONE_MINUS_DST_ALPHA,
            BlendFactor::SourceAlphaSaturated => vk::BlendFactor::SRC_ALPHA_SATURATE,
            BlendFactor::BlendColor => vk::BlendFactor::CONSTANT_COLOR,
            BlendFactor::OneMinusBlendColor => vk::BlendFactor::ONE_MINUS_CONSTANT_COLOR,
            BlendFactor::BlendAlpha => vk::BlendFactor::CONSTANT_ALPHA,
            BlendFactor::OneMinusBlendAlpha => vk::BlendFactor::ONE_MINUS_CONSTANT_ALPHA,
        }
    }
}

impl IntoVk<vk::BlendOp> for BlendOperation {
    fn into_vk(self) -> vk::BlendOp {
        match self {
            BlendOperation::Add => vk::BlendOp::ADD,
            BlendOperation::Subtract => vk::BlendOp::SUBTRACT,
            BlendOperation::ReverseSubtract => vk::BlendOp::REVERSE_SUBTRACT,
        }
    }
}

impl IntoVk<vk::ColorComponentFlags> for ColorWriteMask {
    fn into_vk(self) -> vk::ColorComponentFlags {
        [
            (ColorWriteMask::RED, vk::ColorComponentFlags::R),
            (ColorWriteMask::GREEN, vk::ColorComponentFlags::G),
            (ColorWriteMask::BLUE, vk::ColorComponentFlags::B),
            (ColorWriteMask::ALPHA, vk::ColorComponentFlags::A),
        ]
        .into_iter()
        .filter(|(channel, _)| self.contains(*channel))
        .fold(vk::ColorComponentFlags::empty(), |flags, (_, bit)| flags | bit)
    }
}

impl IntoVk<vk::PipelineColorBlendAttachmentState> for &ColorAttachmentDescriptor {
    fn into_vk(self) -> vk::PipelineColorBlendAttachmentState {
        vk::PipelineColorBlendAttachmentState {
            blend_enable: self.blending_enabled.into(),
            src_color_blend_factor: self.src_color_blend_factor.into_vk(),
            dst_color_blend_factor: self.dst_color_blend_factor.into_vk(),
            color_blend_op: self.color_blend_op.into_vk(),
            src_alpha_blend_factor: self.src_alpha_blend_factor.into_vk(),
            dst_alpha_blend_factor: self.dst_alpha_blend_factor.into_vk(),
            alpha_blend_op: self.alpha_blend_op.into_vk(),
            color_write_mask: self.write_mask.into_vk(),
        }
    }
}

// --- Depth and Stencil ---

impl IntoVk<vk::CompareOp> for CompareFunction {
    fn into_vk(self) -> vk::CompareOp {
        match self {
            CompareFunction::Never => vk::CompareOp::NEVER,
            CompareFunction::Always => vk::CompareOp::ALWAYS,
            CompareFunction::Less => vk::CompareOp::LESS,
            CompareFunction::Equal => vk::CompareOp::EQUAL,
            CompareFunction::LessEqual => vk::CompareOp::LESS_OR_EQUAL,
            CompareFunction::Greater => vk::CompareOp::GREATER,
            CompareFunction::NotEqual => vk::CompareOp::NOT_EQUAL,
            CompareFunction::GreaterEqual => vk::CompareOp::GREATER_OR_EQUAL,
        }
    }
}

impl IntoVk<vk::StencilOp> for StencilOperation {
    fn into_vk(self) -> vk::StencilOp {
        match self {
            StencilOperation::Keep => vk::StencilOp::KEEP,
            StencilOperation::Zero => vk::StencilOp::ZERO,
            StencilOperation::SetToReferenceValue => vk::StencilOp::REPLACE,
            StencilOperation::IncrementClamp => vk::StencilOp::INCREMENT_AND_CLAMP,
            StencilOperation::DecrementClamp => vk::StencilOp::DECREMENT_AND_CLAMP,
            StencilOperation::Invert => vk::StencilOp::INVERT,
            StencilOperation::IncrementWrap => vk::StencilOp::INCREMENT_AND_WRAP,
            StencilOperation::DecrementWrap => vk::StencilOp::DECREMENT_AND_WRAP,
        }
    }
}

impl IntoVk<vk::StencilOpState> for &StencilAttachmentDescriptor {
    fn into_vk(self) -> vk::StencilOpState {
        vk::StencilOpState {
            fail_op: self.stencil_failure.into_vk(),
            pass_op: self.depth_stencil_pass.into_vk(),
            depth_fail_op: self.depth_failure.into_vk(),
            compare_op: self.stencil_compare.into_vk(),
            compare_mask: self.read_mask,
            write_mask: self.write_mask,
            reference: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_vulkan_format_round_trips_through_pixel_format() {
        for format in PixelFormat::ALL {
            let vk_format: vk::Format = format.into_vk();
            if vk_format == vk::Format::UNDEFINED || format == PixelFormat::A8UNormInt {
                continue;
            }
            assert_eq!(
                pixel_format_from_vk(vk_format),
                format,
                "{format} should map back to itself"
            );
        }
    }

    #[test]
    fn test_write_mask_maps_channel_by_channel() {
        let mask = ColorWriteMask::RED | ColorWriteMask::ALPHA;
        let flags: vk::ColorComponentFlags = mask.into_vk();
        assert_eq!(flags, vk::ColorComponentFlags::R | vk::ColorComponentFlags::A);
    }

    #[test]
    fn test_depth_stencil_formats_carry_both_aspects() {
        assert_eq!(
            aspect_mask(vk::Format::D24_UNORM_S8_UINT),
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        );
        assert_eq!(aspect_mask(vk::Format::B8G8R8A8_UNORM), vk::ImageAspectFlags::COLOR);
    }

    #[test]
    fn test_unsupported_vertex_inputs_have_no_format() {
        let mut slot = ShaderStageIOSlot::float_vec("uv", 1, 2, 0);
        assert_eq!(vertex_format(&slot), Some(vk::Format::R32G32_SFLOAT));
        slot.bit_width = 64;
        assert_eq!(vertex_format(&slot), None);
    }
}
