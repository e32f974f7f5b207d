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

//! Graphics pipeline construction.

use super::create_info::{
    DepthStencilDescriptionVK, GraphicsPipelineDescriptionVK, ShaderStageDescriptionVK,
};
use super::device_holder::{with_device, DeviceHolderVK};
use super::formats::{vertex_format, IntoVk};
use super::pipeline_cache::PipelineCacheVK;
use super::render_pass_builder::{RenderPassBuilderVK, RenderPassVK};
use super::shader_library::ShaderLibraryVK;
use ash::vk;
use impeller_core::renderer::{
    ColorAttachmentDescriptor, LoadAction, Pipeline, PipelineDescriptor, PipelineError,
    PixelFormat, SampleCount, ShaderStage, StoreAction,
};
use std::any::Any;
use std::sync::{Arc, Weak};

/// The entry point name inside every module.
const SHADER_ENTRY_POINT: &str = "main";

/// A descriptor-set layout and the pipeline layout built on it.
#[derive(Debug)]
struct PipelineLayoutVK {
    device: Weak<DeviceHolderVK>,
    set_layout: vk::DescriptorSetLayout,
    layout: vk::PipelineLayout,
}

impl PipelineLayoutVK {
    fn create(
        device: &Arc<DeviceHolderVK>,
        descriptor: &PipelineDescriptor,
    ) -> Result<Self, PipelineError> {
        let bindings: Vec<_> = descriptor
            .descriptor_set_layouts()
            .iter()
            .map(|layout| {
                vk::DescriptorSetLayoutBinding::default()
                    .binding(layout.binding)
                    .descriptor_type(layout.descriptor_type.into_vk())
                    .descriptor_count(1)
                    .stage_flags(layout.shader_stage.into_vk())
            })
            .collect();

        let driver = device.driver();
        let set_layout = driver
            .create_descriptor_set_layout(device.device(), &bindings)
            .map_err(|e| PipelineError::DescriptorSetLayoutCreationFailed(e.to_string()))?;
        let mut created = Self {
            device: Arc::downgrade(device),
            set_layout,
            layout: vk::PipelineLayout::null(),
        };
        created.layout = driver
            .create_pipeline_layout(device.device(), &[set_layout])
            .map_err(|e| PipelineError::LayoutCreationFailed(e.to_string()))?;
        Ok(created)
    }
}

impl Drop for PipelineLayoutVK {
    fn drop(&mut self) {
        with_device(&self.device, |device| {
            let driver = device.driver();
            if self.layout != vk::PipelineLayout::null() {
                driver.destroy_pipeline_layout(device.device(), self.layout);
            }
            driver.destroy_descriptor_set_layout(device.device(), self.set_layout);
        });
    }
}

/// A compiled graphics pipeline.
#[derive(Debug)]
pub struct PipelineVK {
    device: Weak<DeviceHolderVK>,
    descriptor: PipelineDescriptor,
    pipeline: vk::Pipeline,
    layout: PipelineLayoutVK,
    render_pass: RenderPassVK,
    cache_hit: bool,
}

impl PipelineVK {
    /// Compiles `descriptor`.
    ///
    /// ## Arguments
    /// * `framebuffer_fetch` - Color attachments are also input attachments.
    ///   Must match the render passes the pipeline is used with.
    ///
    /// ## Errors
    /// Every sub-step maps to its own [`PipelineError`] variant.
    pub fn create(
        device: &Arc<DeviceHolderVK>,
        cache: &PipelineCacheVK,
        shaders: &ShaderLibraryVK,
        descriptor: &PipelineDescriptor,
        framebuffer_fetch: bool,
    ) -> Result<Self, PipelineError> {
        let label = descriptor.label().to_string();

        // Keeps the modules alive until the pipeline exists.
        let mut modules = Vec::new();
        let mut stages = Vec::new();
        for (stage, function) in descriptor.stage_entrypoints() {
            if *stage == ShaderStage::Compute {
                return Err(PipelineError::FeatureNotSupported(format!(
                    "compute stage in graphics pipeline '{label}'"
                )));
            }
            let module = shaders
                .module_for(function)
                .ok_or_else(|| PipelineError::MissingShaderFunction {
                    label: label.clone(),
                    function: function.clone(),
                })?;
            stages.push(ShaderStageDescriptionVK {
                stage: stage.into_vk(),
                module: module.module(),
                entry_point: SHADER_ENTRY_POINT.to_string(),
            });
            modules.push(module);
        }
        if stages.is_empty() {
            return Err(PipelineError::CompilationFailed {
                label,
                details: "no shader stages".to_string(),
            });
        }

        let (vertex_bindings, vertex_attributes) = Self::vertex_input(descriptor)?;
        let color_blend_attachments = Self::color_blend_attachments(descriptor)?;
        let render_pass = Self::compatible_render_pass(device, descriptor, framebuffer_fetch)?;
        let layout = PipelineLayoutVK::create(device, descriptor)?;

        let info = GraphicsPipelineDescriptionVK {
            stages,
            vertex_bindings,
            vertex_attributes,
            topology: descriptor.primitive_type().into_vk(),
            polygon_mode: descriptor.polygon_mode().into_vk(),
            cull_mode: descriptor.cull_mode().into_vk(),
            front_face: descriptor.winding_order().into_vk(),
            rasterization_samples: descriptor.sample_count().into_vk(),
            color_blend_flags: if framebuffer_fetch {
                vk::PipelineColorBlendStateCreateFlags::RASTERIZATION_ORDER_ATTACHMENT_ACCESS_EXT
            } else {
                vk::PipelineColorBlendStateCreateFlags::empty()
            },
            color_blend_attachments,
            depth_stencil: Self::depth_stencil_state(descriptor),
            layout: layout.layout,
            render_pass: render_pass.render_pass(),
            subpass: 0,
        };

        let (pipeline, feedback) = cache.create_pipeline(&info).map_err(|error| match error {
            vk::Result::ERROR_FEATURE_NOT_PRESENT => PipelineError::FeatureNotSupported(format!(
                "topology {:?} in pipeline '{label}'",
                info.topology
            )),
            other => PipelineError::CompilationFailed {
                label: label.clone(),
                details: other.to_string(),
            },
        })?;
        let cache_hit = feedback
            .flags
            .contains(vk::PipelineCreationFeedbackFlags::APPLICATION_PIPELINE_CACHE_HIT);
        log::debug!(
            "Pipeline '{label}' created in {:.3}ms (cache hit: {cache_hit}).",
            feedback.duration as f64 / 1e6,
        );

        Ok(Self {
            device: Arc::downgrade(device),
            descriptor: descriptor.clone(),
            pipeline,
            layout,
            render_pass,
            cache_hit,
        })
    }

    #[allow(clippy::type_complexity)]
    fn vertex_input(
        descriptor: &PipelineDescriptor,
    ) -> Result<
        (Vec<vk::VertexInputBindingDescription>, Vec<vk::VertexInputAttributeDescription>),
        PipelineError,
    > {
        let Some(vertex) = descriptor.vertex_descriptor() else {
            return Ok((Vec::new(), Vec::new()));
        };
        let bindings = vertex
            .stage_layouts()
            .iter()
            .map(|layout| vk::VertexInputBindingDescription {
                binding: layout.binding,
                stride: layout.stride,
                input_rate: vk::VertexInputRate::VERTEX,
            })
            .collect();
        let attributes = vertex
            .stage_inputs()
            .iter()
            .map(|slot| {
                let format = vertex_format(slot).ok_or_else(|| PipelineError::CompilationFailed {
                    label: descriptor.label().to_string(),
                    details: format!("unsupported vertex input '{}'", slot.name),
                })?;
                Ok(vk::VertexInputAttributeDescription {
                    location: slot.location,
                    binding: slot.binding,
                    format,
                    offset: slot.offset,
                })
            })
            .collect::<Result<_, PipelineError>>()?;
        Ok((bindings, attributes))
    }

    fn color_blend_attachments(
        descriptor: &PipelineDescriptor,
    ) -> Result<Vec<vk::PipelineColorBlendAttachmentState>, PipelineError> {
        let Some(max_index) = descriptor.max_color_attachment_bind_index() else {
            return Ok(Vec::new());
        };
        let unused = ColorAttachmentDescriptor::default();
        (0..=max_index)
            .map(|index| match descriptor.color_attachment_descriptor(index) {
                Some(color) if !color.format.is_color() => {
                    Err(PipelineError::IncompatibleColorTarget(format!(
                        "{} at index {index}",
                        color.format
                    )))
                }
                Some(color) => Ok(color.into_vk()),
                None => Ok((&unused).into_vk()),
            })
            .collect()
    }

    fn depth_stencil_state(descriptor: &PipelineDescriptor) -> DepthStencilDescriptionVK {
        let depth = descriptor.depth_stencil_attachment_descriptor();
        DepthStencilDescriptionVK {
            depth_test_enable: depth.is_some(),
            depth_write_enable: depth.is_some_and(|d| d.depth_write_enabled),
            depth_compare_op: depth.map_or(vk::CompareOp::ALWAYS, |d| d.depth_compare.into_vk()),
            stencil_test_enable: descriptor.has_stencil_attachment_descriptors(),
            front: descriptor.front_stencil_attachment_descriptor().map(|s| s.into_vk()),
            back: descriptor.back_stencil_attachment_descriptor().map(|s| s.into_vk()),
        }
    }

    /// Builds the placeholder pass the pipeline is compiled against.
    ///
    /// Multisampled color attachments are assumed to resolve, which is how
    /// every multisampled target is rendered.
    fn compatible_render_pass(
        device: &Arc<DeviceHolderVK>,
        descriptor: &PipelineDescriptor,
        framebuffer_fetch: bool,
    ) -> Result<RenderPassVK, PipelineError> {
        let samples = descriptor.sample_count();
        let store = if samples == SampleCount::Count4 {
            StoreAction::MultisampleResolve
        } else {
            StoreAction::DontCare
        };

        let mut builder = RenderPassBuilderVK::new(framebuffer_fetch);
        for (&index, color) in descriptor.color_attachment_descriptors() {
            builder.set_color_attachment(
                index,
                color.format,
                samples,
                LoadAction::DontCare,
                store,
                vk::ImageLayout::UNDEFINED,
                false,
            );
        }

        let depth = descriptor.depth_pixel_format();
        let stencil = descriptor.stencil_pixel_format();
        if depth != PixelFormat::Unknown {
            if !depth.is_depth_writable() {
                return Err(PipelineError::IncompatibleDepthStencilFormat(depth.to_string()));
            }
            builder.set_depth_stencil_attachment(
                depth,
                samples,
                LoadAction::DontCare,
                StoreAction::DontCare,
            );
        } else if stencil != PixelFormat::Unknown {
            if !stencil.is_stencil_writable() {
                return Err(PipelineError::IncompatibleDepthStencilFormat(stencil.to_string()));
            }
            builder.set_stencil_attachment(
                stencil,
                samples,
                LoadAction::DontCare,
                StoreAction::DontCare,
            );
        }

        builder
            .build(device)
            .map_err(|e| PipelineError::RenderPassCreationFailed(e.to_string()))
    }

    /// The pipeline handle.
    pub fn pipeline(&self) -> vk::Pipeline {
        self.pipeline
    }

    /// The pipeline layout.
    pub fn pipeline_layout(&self) -> vk::PipelineLayout {
        self.layout.layout
    }

    /// The layout of descriptor set 0.
    pub fn descriptor_set_layout(&self) -> vk::DescriptorSetLayout {
        self.layout.set_layout
    }

    /// The placeholder pass the pipeline was compiled against.
    pub fn render_pass(&self) -> &RenderPassVK {
        &self.render_pass
    }

    /// Whether the driver served the pipeline from the pipeline cache.
    pub fn was_cache_hit(&self) -> bool {
        self.cache_hit
    }
}

impl Pipeline for PipelineVK {
    fn descriptor(&self) -> &PipelineDescriptor {
        &self.descriptor
    }

    fn is_valid(&self) -> bool {
        self.pipeline != vk::Pipeline::null() && self.device.strong_count() > 0
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Drop for PipelineVK {
    fn drop(&mut self) {
        with_device(&self.device, |device| {
            device.driver().destroy_pipeline(device.device(), self.pipeline);
        });
    }
}
