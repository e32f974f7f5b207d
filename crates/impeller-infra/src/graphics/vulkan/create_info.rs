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

//! Owned descriptions of the objects created through the driver.
//!
//! Vulkan create-info structures borrow their arrays. These descriptions own
//! them, so a render pass can be kept around for compatibility checks and a
//! pipeline description can be moved to a worker thread. A
//! [`VulkanDriver`](super::driver::VulkanDriver) lowers them into the real
//! create-info chains.

use ash::vk;

/// A reference to no attachment.
pub const UNUSED_ATTACHMENT: vk::AttachmentReference = vk::AttachmentReference {
    attachment: vk::ATTACHMENT_UNUSED,
    layout: vk::ImageLayout::UNDEFINED,
};

/// Returns `true` if `reference` points to no attachment.
pub fn is_unused(reference: &vk::AttachmentReference) -> bool {
    reference.attachment == vk::ATTACHMENT_UNUSED
}

/// A subpass.
#[derive(Debug, Clone, Default)]
pub struct SubpassDescriptionVK {
    /// Subpass flags.
    pub flags: vk::SubpassDescriptionFlags,
    /// Attachments read as input attachments.
    pub input_attachments: Vec<vk::AttachmentReference>,
    /// Color outputs, indexed by shader output location.
    pub color_attachments: Vec<vk::AttachmentReference>,
    /// Resolve targets, parallel to `color_attachments`. Empty if nothing
    /// resolves.
    pub resolve_attachments: Vec<vk::AttachmentReference>,
    /// The depth-stencil attachment.
    pub depth_stencil_attachment: Option<vk::AttachmentReference>,
}

/// The description of a render pass.
#[derive(Debug, Clone, Default)]
pub struct RenderPassDescriptionVK {
    /// Attachments, referenced by index.
    pub attachments: Vec<vk::AttachmentDescription>,
    /// Subpasses.
    pub subpasses: Vec<SubpassDescriptionVK>,
    /// Dependencies.
    pub dependencies: Vec<vk::SubpassDependency>,
}

fn references_compatible(
    a: &RenderPassDescriptionVK,
    a_ref: Option<&vk::AttachmentReference>,
    b: &RenderPassDescriptionVK,
    b_ref: Option<&vk::AttachmentReference>,
) -> bool {
    let resolve = |info: &RenderPassDescriptionVK, r: Option<&vk::AttachmentReference>| {
        r.filter(|r| !is_unused(r))
            .and_then(|r| info.attachments.get(r.attachment as usize))
            .map(|d| (d.format, d.samples))
    };
    let (a_idx, b_idx) = (
        a_ref.filter(|r| !is_unused(r)).map(|r| r.attachment),
        b_ref.filter(|r| !is_unused(r)).map(|r| r.attachment),
    );
    a_idx == b_idx && resolve(a, a_ref) == resolve(b, b_ref)
}

fn reference_arrays_compatible(
    a: &RenderPassDescriptionVK,
    a_refs: &[vk::AttachmentReference],
    b: &RenderPassDescriptionVK,
    b_refs: &[vk::AttachmentReference],
) -> bool {
    // Shorter arrays behave as if padded with unused references.
    (0..a_refs.len().max(b_refs.len()))
        .all(|i| references_compatible(a, a_refs.get(i), b, b_refs.get(i)))
}

/// Returns `true` if a pipeline created against `a` may be used in a
/// framebuffer created against `b`.
///
/// Attachments must match in count, format and sample count, and every
/// subpass must reference them in the same order and roles. Load and store
/// operations, layouts and dependencies are ignored.
pub fn render_passes_compatible(a: &RenderPassDescriptionVK, b: &RenderPassDescriptionVK) -> bool {
    if a.attachments.len() != b.attachments.len() || a.subpasses.len() != b.subpasses.len() {
        return false;
    }
    let attachments_match = a
        .attachments
        .iter()
        .zip(&b.attachments)
        .all(|(x, y)| x.format == y.format && x.samples == y.samples);
    if !attachments_match {
        return false;
    }
    a.subpasses.iter().zip(&b.subpasses).all(|(sa, sb)| {
        sa.flags == sb.flags
            && reference_arrays_compatible(a, &sa.input_attachments, b, &sb.input_attachments)
            && reference_arrays_compatible(a, &sa.color_attachments, b, &sb.color_attachments)
            && reference_arrays_compatible(
                a,
                &sa.resolve_attachments,
                b,
                &sb.resolve_attachments,
            )
            && references_compatible(
                a,
                sa.depth_stencil_attachment.as_ref(),
                b,
                sb.depth_stencil_attachment.as_ref(),
            )
    })
}

/// One shader stage of a pipeline.
#[derive(Debug, Clone)]
pub struct ShaderStageDescriptionVK {
    /// The stage.
    pub stage: vk::ShaderStageFlags,
    /// The module holding the code.
    pub module: vk::ShaderModule,
    /// The entry point inside the module.
    pub entry_point: String,
}

/// Depth and stencil testing.
#[derive(Debug, Clone, Copy, Default)]
pub struct DepthStencilDescriptionVK {
    pub depth_test_enable: bool,
    pub depth_write_enable: bool,
    pub depth_compare_op: vk::CompareOp,
    pub stencil_test_enable: bool,
    /// Front-face stencil state. Keeps the driver default when `None`.
    pub front: Option<vk::StencilOpState>,
    /// Back-face stencil state. Keeps the driver default when `None`.
    pub back: Option<vk::StencilOpState>,
}

/// The fixed-function and shader state of a graphics pipeline.
///
/// Viewport and scissor are always dynamic.
#[derive(Debug, Clone)]
pub struct GraphicsPipelineDescriptionVK {
    pub stages: Vec<ShaderStageDescriptionVK>,
    pub vertex_bindings: Vec<vk::VertexInputBindingDescription>,
    pub vertex_attributes: Vec<vk::VertexInputAttributeDescription>,
    pub topology: vk::PrimitiveTopology,
    pub polygon_mode: vk::PolygonMode,
    pub cull_mode: vk::CullModeFlags,
    pub front_face: vk::FrontFace,
    pub rasterization_samples: vk::SampleCountFlags,
    /// Set to rasterization-order access when color attachments are read
    /// back as input attachments.
    pub color_blend_flags: vk::PipelineColorBlendStateCreateFlags,
    /// One entry per color attachment slot, holes included.
    pub color_blend_attachments: Vec<vk::PipelineColorBlendAttachmentState>,
    pub depth_stencil: DepthStencilDescriptionVK,
    pub layout: vk::PipelineLayout,
    pub render_pass: vk::RenderPass,
    pub subpass: u32,
}

/// The resource written into a descriptor.
#[derive(Debug, Clone, Copy)]
pub enum DescriptorResourceVK {
    /// A buffer range.
    Buffer(vk::DescriptorBufferInfo),
    /// A whole image, viewed with the driver's default view and sampler.
    Image {
        image: vk::Image,
        /// The layout the image is in when accessed.
        layout: vk::ImageLayout,
    },
}

/// One descriptor update.
#[derive(Debug, Clone, Copy)]
pub struct DescriptorWriteVK {
    pub dst_set: vk::DescriptorSet,
    pub dst_binding: u32,
    pub descriptor_type: vk::DescriptorType,
    pub resource: DescriptorResourceVK,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn color(
        format: vk::Format,
        samples: vk::SampleCountFlags,
        load: vk::AttachmentLoadOp,
    ) -> vk::AttachmentDescription {
        vk::AttachmentDescription::default()
            .format(format)
            .samples(samples)
            .load_op(load)
            .store_op(vk::AttachmentStoreOp::STORE)
            .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
            .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .final_layout(vk::ImageLayout::GENERAL)
    }

    fn pass(attachment: vk::AttachmentDescription) -> RenderPassDescriptionVK {
        RenderPassDescriptionVK {
            attachments: vec![attachment],
            subpasses: vec![SubpassDescriptionVK {
                color_attachments: vec![vk::AttachmentReference {
                    attachment: 0,
                    layout: vk::ImageLayout::GENERAL,
                }],
                ..Default::default()
            }],
            dependencies: Vec::new(),
        }
    }

    #[test]
    fn test_load_ops_do_not_affect_compatibility() {
        let format = vk::Format::R8G8B8A8_UNORM;
        let samples = vk::SampleCountFlags::TYPE_1;
        let a = pass(color(format, samples, vk::AttachmentLoadOp::DONT_CARE));
        let b = pass(color(format, samples, vk::AttachmentLoadOp::CLEAR));
        assert!(render_passes_compatible(&a, &b));
    }

    #[test]
    fn test_sample_count_breaks_compatibility() {
        let format = vk::Format::R8G8B8A8_UNORM;
        let a = pass(color(format, vk::SampleCountFlags::TYPE_1, vk::AttachmentLoadOp::LOAD));
        let b = pass(color(format, vk::SampleCountFlags::TYPE_4, vk::AttachmentLoadOp::LOAD));
        assert!(!render_passes_compatible(&a, &b));
    }

    #[test]
    fn test_trailing_unused_references_are_padding() {
        let a = pass(color(
            vk::Format::B8G8R8A8_UNORM,
            vk::SampleCountFlags::TYPE_1,
            vk::AttachmentLoadOp::LOAD,
        ));
        let mut b = a.clone();
        b.subpasses[0].color_attachments.push(UNUSED_ATTACHMENT);
        assert!(render_passes_compatible(&a, &b));
    }
}
