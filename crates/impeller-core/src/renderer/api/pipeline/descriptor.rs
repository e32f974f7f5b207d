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

//! Main pipeline descriptors.

use super::enums::{CullMode, PolygonMode, PrimitiveType, WindingOrder};
use super::state::{
    ColorAttachmentDescriptor, DepthAttachmentDescriptor, StencilAttachmentDescriptor,
};
use super::vertex::{DescriptorSetLayout, VertexDescriptor};
use crate::renderer::api::formats::{PixelFormat, SampleCount};
use crate::renderer::api::shader::{ShaderFunction, ShaderStage};
use std::collections::BTreeMap;
use std::sync::Arc;

/// The complete, backend independent description of a graphics pipeline.
///
/// This is the key of the pipeline cache. Equality and hashing cover every
/// field, so two descriptors that compare equal always hash identically and
/// collapse into a single cache entry, while any difference in GPU state
/// yields a distinct entry.
///
/// Setters take `&mut self` so that a shared descriptor can be cloned and
/// specialized per draw.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PipelineDescriptor {
    label: String,
    sample_count: SampleCount,
    entrypoints: BTreeMap<ShaderStage, ShaderFunction>,
    color_attachment_descriptors: BTreeMap<usize, ColorAttachmentDescriptor>,
    depth_pixel_format: PixelFormat,
    stencil_pixel_format: PixelFormat,
    vertex_descriptor: Option<Arc<VertexDescriptor>>,
    depth_attachment_descriptor: Option<DepthAttachmentDescriptor>,
    front_stencil_attachment_descriptor: Option<StencilAttachmentDescriptor>,
    back_stencil_attachment_descriptor: Option<StencilAttachmentDescriptor>,
    winding_order: WindingOrder,
    cull_mode: CullMode,
    primitive_type: PrimitiveType,
    polygon_mode: PolygonMode,
}

impl Default for PipelineDescriptor {
    fn default() -> Self {
        Self {
            label: String::new(),
            sample_count: SampleCount::Count1,
            entrypoints: BTreeMap::new(),
            color_attachment_descriptors: BTreeMap::new(),
            depth_pixel_format: PixelFormat::Unknown,
            stencil_pixel_format: PixelFormat::Unknown,
            vertex_descriptor: None,
            depth_attachment_descriptor: None,
            front_stencil_attachment_descriptor: None,
            back_stencil_attachment_descriptor: None,
            winding_order: WindingOrder::CounterClockwise,
            cull_mode: CullMode::None,
            primitive_type: PrimitiveType::Triangle,
            polygon_mode: PolygonMode::Fill,
        }
    }
}

impl PipelineDescriptor {
    /// Creates an empty descriptor.
    pub fn new() -> Self {
        Self::default()
    }

    // --- Setters ---

    /// Sets the debug label.
    pub fn set_label(&mut self, label: impl Into<String>) -> &mut Self {
        self.label = label.into();
        self
    }

    /// Sets the sample count of every attachment.
    pub fn set_sample_count(&mut self, samples: SampleCount) -> &mut Self {
        self.sample_count = samples;
        self
    }

    /// Adds (or replaces) the entry point for the function's stage.
    pub fn add_stage_entrypoint(&mut self, function: ShaderFunction) -> &mut Self {
        self.entrypoints.insert(function.stage(), function);
        self
    }

    /// Sets the color attachment at `index`.
    pub fn set_color_attachment_descriptor(
        &mut self,
        index: usize,
        desc: ColorAttachmentDescriptor,
    ) -> &mut Self {
        self.color_attachment_descriptors.insert(index, desc);
        self
    }

    /// Replaces all color attachments.
    pub fn set_color_attachment_descriptors(
        &mut self,
        descriptors: BTreeMap<usize, ColorAttachmentDescriptor>,
    ) -> &mut Self {
        self.color_attachment_descriptors = descriptors;
        self
    }

    /// Sets the depth format. [`PixelFormat::Unknown`] means no depth.
    pub fn set_depth_pixel_format(&mut self, format: PixelFormat) -> &mut Self {
        self.depth_pixel_format = format;
        self
    }

    /// Sets the stencil format. [`PixelFormat::Unknown`] means no stencil.
    pub fn set_stencil_pixel_format(&mut self, format: PixelFormat) -> &mut Self {
        self.stencil_pixel_format = format;
        self
    }

    /// Sets the vertex input and descriptor-set layout.
    pub fn set_vertex_descriptor(&mut self, vertex_descriptor: VertexDescriptor) -> &mut Self {
        self.vertex_descriptor = Some(Arc::new(vertex_descriptor));
        self
    }

    /// Sets the depth test configuration.
    pub fn set_depth_stencil_attachment_descriptor(
        &mut self,
        desc: Option<DepthAttachmentDescriptor>,
    ) -> &mut Self {
        self.depth_attachment_descriptor = desc;
        self
    }

    /// Sets the same stencil configuration for front and back faces.
    pub fn set_stencil_attachment_descriptors(
        &mut self,
        front_and_back: Option<StencilAttachmentDescriptor>,
    ) -> &mut Self {
        self.front_stencil_attachment_descriptor = front_and_back;
        self.back_stencil_attachment_descriptor = front_and_back;
        self
    }

    /// Sets separate stencil configurations for front and back faces.
    pub fn set_front_and_back_stencil_attachment_descriptors(
        &mut self,
        front: Option<StencilAttachmentDescriptor>,
        back: Option<StencilAttachmentDescriptor>,
    ) -> &mut Self {
        self.front_stencil_attachment_descriptor = front;
        self.back_stencil_attachment_descriptor = back;
        self
    }

    /// Sets the front-face winding.
    pub fn set_winding_order(&mut self, order: WindingOrder) -> &mut Self {
        self.winding_order = order;
        self
    }

    /// Sets the cull mode.
    pub fn set_cull_mode(&mut self, mode: CullMode) -> &mut Self {
        self.cull_mode = mode;
        self
    }

    /// Sets the primitive topology.
    pub fn set_primitive_type(&mut self, ty: PrimitiveType) -> &mut Self {
        self.primitive_type = ty;
        self
    }

    /// Sets the polygon mode.
    pub fn set_polygon_mode(&mut self, mode: PolygonMode) -> &mut Self {
        self.polygon_mode = mode;
        self
    }

    /// Removes every attachment that is not a color attachment.
    pub fn clear_depth_stencil_attachments(&mut self) -> &mut Self {
        self.depth_pixel_format = PixelFormat::Unknown;
        self.stencil_pixel_format = PixelFormat::Unknown;
        self.depth_attachment_descriptor = None;
        self.front_stencil_attachment_descriptor = None;
        self.back_stencil_attachment_descriptor = None;
        self
    }

    // --- Getters ---

    /// The debug label.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// The sample count.
    pub fn sample_count(&self) -> SampleCount {
        self.sample_count
    }

    /// The entry point per stage.
    pub fn stage_entrypoints(&self) -> &BTreeMap<ShaderStage, ShaderFunction> {
        &self.entrypoints
    }

    /// The entry point for `stage`, if any.
    pub fn entrypoint_for_stage(&self, stage: ShaderStage) -> Option<&ShaderFunction> {
        self.entrypoints.get(&stage)
    }

    /// The color attachments by bind index.
    pub fn color_attachment_descriptors(&self) -> &BTreeMap<usize, ColorAttachmentDescriptor> {
        &self.color_attachment_descriptors
    }

    /// The color attachment at `index`, if any.
    pub fn color_attachment_descriptor(&self, index: usize) -> Option<&ColorAttachmentDescriptor> {
        self.color_attachment_descriptors.get(&index)
    }

    /// The highest color bind index in use.
    pub fn max_color_attachment_bind_index(&self) -> Option<usize> {
        self.color_attachment_descriptors.keys().next_back().copied()
    }

    /// The depth format.
    pub fn depth_pixel_format(&self) -> PixelFormat {
        self.depth_pixel_format
    }

    /// The stencil format.
    pub fn stencil_pixel_format(&self) -> PixelFormat {
        self.stencil_pixel_format
    }

    /// The vertex descriptor.
    pub fn vertex_descriptor(&self) -> Option<&VertexDescriptor> {
        self.vertex_descriptor.as_deref()
    }

    /// The descriptor-set layout slots, empty without a vertex descriptor.
    pub fn descriptor_set_layouts(&self) -> &[DescriptorSetLayout] {
        self.vertex_descriptor
            .as_deref()
            .map(VertexDescriptor::descriptor_set_layouts)
            .unwrap_or(&[])
    }

    /// The depth test configuration.
    pub fn depth_stencil_attachment_descriptor(&self) -> Option<&DepthAttachmentDescriptor> {
        self.depth_attachment_descriptor.as_ref()
    }

    /// The front-face stencil configuration.
    pub fn front_stencil_attachment_descriptor(&self) -> Option<&StencilAttachmentDescriptor> {
        self.front_stencil_attachment_descriptor.as_ref()
    }

    /// The back-face stencil configuration.
    pub fn back_stencil_attachment_descriptor(&self) -> Option<&StencilAttachmentDescriptor> {
        self.back_stencil_attachment_descriptor.as_ref()
    }

    /// Returns `true` if either stencil face is configured.
    pub fn has_stencil_attachment_descriptors(&self) -> bool {
        self.front_stencil_attachment_descriptor.is_some()
            || self.back_stencil_attachment_descriptor.is_some()
    }

    /// The front-face winding.
    pub fn winding_order(&self) -> WindingOrder {
        self.winding_order
    }

    /// The cull mode.
    pub fn cull_mode(&self) -> CullMode {
        self.cull_mode
    }

    /// The primitive topology.
    pub fn primitive_type(&self) -> PrimitiveType {
        self.primitive_type
    }

    /// The polygon mode.
    pub fn polygon_mode(&self) -> PolygonMode {
        self.polygon_mode
    }

    /// Returns `true` if any stage uses `function`.
    pub fn uses_entry_point(&self, function: &ShaderFunction) -> bool {
        self.entrypoints.values().any(|f| f == function)
    }
}

/// The description of a compute pipeline.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ComputePipelineDescriptor {
    label: String,
    stage_entrypoint: Option<ShaderFunction>,
    descriptor_set_layouts: Vec<DescriptorSetLayout>,
}

impl ComputePipelineDescriptor {
    /// Creates an empty descriptor.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the debug label.
    pub fn set_label(&mut self, label: impl Into<String>) -> &mut Self {
        self.label = label.into();
        self
    }

    /// Sets the compute entry point.
    pub fn set_stage_entrypoint(&mut self, function: ShaderFunction) -> &mut Self {
        self.stage_entrypoint = Some(function);
        self
    }

    /// Registers descriptor-set layout slots.
    pub fn register_descriptor_set_layouts(
        &mut self,
        layouts: &[DescriptorSetLayout],
    ) -> &mut Self {
        self.descriptor_set_layouts.extend_from_slice(layouts);
        self
    }

    /// The debug label.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// The compute entry point.
    pub fn stage_entrypoint(&self) -> Option<&ShaderFunction> {
        self.stage_entrypoint.as_ref()
    }

    /// The descriptor-set layout slots.
    pub fn descriptor_set_layouts(&self) -> &[DescriptorSetLayout] {
        &self.descriptor_set_layouts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    fn hash_of(desc: &PipelineDescriptor) -> u64 {
        let mut hasher = DefaultHasher::new();
        desc.hash(&mut hasher);
        hasher.finish()
    }

    fn solid_fill() -> PipelineDescriptor {
        let mut desc = PipelineDescriptor::new();
        desc.set_label("SolidFill")
            .add_stage_entrypoint(ShaderFunction::new("solid_fill_vertex", ShaderStage::Vertex))
            .add_stage_entrypoint(ShaderFunction::new("solid_fill_fragment", ShaderStage::Fragment))
            .set_color_attachment_descriptor(
                0,
                ColorAttachmentDescriptor::with_format(PixelFormat::R8G8B8A8UNormInt),
            );
        desc
    }

    #[test]
    fn equal_descriptors_hash_identically() {
        let a = solid_fill();
        let b = solid_fill();
        assert_eq!(a, b);
        assert_eq!(hash_of(&a), hash_of(&b));
        assert_eq!(hash_of(&a), hash_of(&a.clone()), "Hashing must be idempotent");
    }

    #[test]
    fn mutated_copy_differs() {
        let a = solid_fill();
        let mut b = a.clone();
        b.set_sample_count(SampleCount::Count4);
        assert_ne!(a, b);
        assert_ne!(hash_of(&a), hash_of(&b));

        let mut c = a.clone();
        c.set_cull_mode(CullMode::BackFace);
        assert_ne!(a, c);

        let mut d = a.clone();
        let mut blend = ColorAttachmentDescriptor::with_format(PixelFormat::R8G8B8A8UNormInt);
        blend.blending_enabled = true;
        d.set_color_attachment_descriptor(0, blend);
        assert_ne!(a, d);
    }

    #[test]
    fn entrypoint_lookup() {
        let desc = solid_fill();
        assert_eq!(
            desc.entrypoint_for_stage(ShaderStage::Fragment).map(|f| f.name()),
            Some("solid_fill_fragment")
        );
        assert!(desc.entrypoint_for_stage(ShaderStage::Compute).is_none());
        let vertex = ShaderFunction::new("solid_fill_vertex", ShaderStage::Vertex);
        assert!(desc.uses_entry_point(&vertex));
        assert_eq!(desc.max_color_attachment_bind_index(), Some(0));
    }

    #[test]
    fn clearing_depth_stencil() {
        let mut desc = solid_fill();
        desc.set_depth_pixel_format(PixelFormat::D24UnormS8Uint)
            .set_stencil_pixel_format(PixelFormat::D24UnormS8Uint)
            .set_stencil_attachment_descriptors(Some(StencilAttachmentDescriptor::default()));
        assert!(desc.has_stencil_attachment_descriptors());

        desc.clear_depth_stencil_attachments();
        assert!(!desc.has_stencil_attachment_descriptors());
        assert_eq!(desc, solid_fill());
    }
}
