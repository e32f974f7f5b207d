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

//! Builds single-subpass render passes.
//!
//! The same builder produces both the placeholder pass a pipeline is
//! compiled against (load and store don't care) and the real pass used to
//! begin rendering into a framebuffer. Both only depend on formats, sample
//! counts and attachment indices for their layout, so they are always
//! compatible with each other.

use super::create_info::{
    render_passes_compatible, RenderPassDescriptionVK, SubpassDescriptionVK, UNUSED_ATTACHMENT,
};
use super::device_holder::{with_device, DeviceHolderVK};
use super::driver::VulkanDriver;
use super::formats::IntoVk;
use ash::vk;
use impeller_core::renderer::{LoadAction, PixelFormat, RenderError, SampleCount, StoreAction};
use std::collections::BTreeMap;
use std::sync::{Arc, Weak};

const SELF_DEPENDENCY_SRC_STAGE: vk::PipelineStageFlags =
    vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT;
const SELF_DEPENDENCY_SRC_ACCESS: vk::AccessFlags = vk::AccessFlags::COLOR_ATTACHMENT_WRITE;
const SELF_DEPENDENCY_DST_STAGE: vk::PipelineStageFlags = vk::PipelineStageFlags::FRAGMENT_SHADER;
const SELF_DEPENDENCY_DST_ACCESS: vk::AccessFlags = vk::AccessFlags::INPUT_ATTACHMENT_READ;

#[derive(Debug, Clone, Copy)]
struct ColorSlot {
    color: vk::AttachmentDescription,
    resolve: Option<vk::AttachmentDescription>,
    is_swapchain: bool,
}

/// A value builder for render pass descriptions.
#[derive(Debug, Clone, Default)]
pub struct RenderPassBuilderVK {
    framebuffer_fetch: bool,
    colors: BTreeMap<usize, ColorSlot>,
    depth_stencil: Option<vk::AttachmentDescription>,
}

impl RenderPassBuilderVK {
    /// Creates an empty builder.
    ///
    /// ## Arguments
    /// * `framebuffer_fetch` - If `true`, color attachments are also input
    ///   attachments and the subpass depends on itself.
    pub fn new(framebuffer_fetch: bool) -> Self {
        Self {
            framebuffer_fetch,
            ..Default::default()
        }
    }

    fn color_layout(&self) -> vk::ImageLayout {
        if self.framebuffer_fetch {
            vk::ImageLayout::GENERAL
        } else {
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL
        }
    }

    /// Sets the color attachment at `index`, replacing any previous one.
    ///
    /// A resolve attachment is recorded alongside if `store` resolves, and
    /// cleared otherwise.
    ///
    /// ## Arguments
    /// * `current_layout` - The layout the image is in. Only used when `load`
    ///   preserves the contents.
    /// * `is_swapchain` - The image will be presented after the pass.
    #[allow(clippy::too_many_arguments)]
    pub fn set_color_attachment(
        &mut self,
        index: usize,
        format: PixelFormat,
        samples: SampleCount,
        load: LoadAction,
        store: StoreAction,
        current_layout: vk::ImageLayout,
        is_swapchain: bool,
    ) -> &mut Self {
        let layout = self.color_layout();
        let initial_layout = if load == LoadAction::Load {
            current_layout
        } else {
            vk::ImageLayout::UNDEFINED
        };
        let color = vk::AttachmentDescription {
            flags: vk::AttachmentDescriptionFlags::empty(),
            format: format.into_vk(),
            samples: samples.into_vk(),
            load_op: load.into_vk(),
            store_op: store.into_vk(),
            stencil_load_op: vk::AttachmentLoadOp::DONT_CARE,
            stencil_store_op: vk::AttachmentStoreOp::DONT_CARE,
            initial_layout,
            final_layout: layout,
        };
        let resolve = store.performs_resolve().then(|| vk::AttachmentDescription {
            samples: vk::SampleCountFlags::TYPE_1,
            load_op: vk::AttachmentLoadOp::DONT_CARE,
            store_op: vk::AttachmentStoreOp::STORE,
            initial_layout: vk::ImageLayout::UNDEFINED,
            ..color
        });
        self.colors.insert(
            index,
            ColorSlot {
                color,
                resolve,
                is_swapchain,
            },
        );
        self
    }

    /// Sets a combined depth-stencil attachment.
    pub fn set_depth_stencil_attachment(
        &mut self,
        format: PixelFormat,
        samples: SampleCount,
        load: LoadAction,
        store: StoreAction,
    ) -> &mut Self {
        self.depth_stencil = Some(vk::AttachmentDescription {
            flags: vk::AttachmentDescriptionFlags::empty(),
            format: format.into_vk(),
            samples: samples.into_vk(),
            load_op: load.into_vk(),
            store_op: store.into_vk(),
            stencil_load_op: load.into_vk(),
            stencil_store_op: store.into_vk(),
            initial_layout: vk::ImageLayout::UNDEFINED,
            final_layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
        });
        self
    }

    /// Sets a stencil-only attachment. Depth load and store are ignored.
    pub fn set_stencil_attachment(
        &mut self,
        format: PixelFormat,
        samples: SampleCount,
        load: LoadAction,
        store: StoreAction,
    ) -> &mut Self {
        self.depth_stencil = Some(vk::AttachmentDescription {
            flags: vk::AttachmentDescriptionFlags::empty(),
            format: format.into_vk(),
            samples: samples.into_vk(),
            load_op: vk::AttachmentLoadOp::DONT_CARE,
            store_op: vk::AttachmentStoreOp::DONT_CARE,
            stencil_load_op: load.into_vk(),
            stencil_store_op: store.into_vk(),
            initial_layout: vk::ImageLayout::UNDEFINED,
            final_layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
        });
        self
    }

    /// Returns `true` if a resolve attachment is recorded at `index`.
    pub fn has_resolve(&self, index: usize) -> bool {
        self.colors.get(&index).is_some_and(|slot| slot.resolve.is_some())
    }

    /// Builds the render pass description without touching the device.
    ///
    /// ## Errors
    /// * `RenderError::RenderPassFailed` - If color attachments are set but
    ///   none at index 0.
    pub fn build_description(&self) -> Result<RenderPassDescriptionVK, RenderError> {
        if !self.colors.is_empty() && !self.colors.contains_key(&0) {
            return Err(RenderError::RenderPassFailed(
                "color attachments must include index 0".to_string(),
            ));
        }

        let layout = self.color_layout();
        let max_index = self.colors.keys().next_back().map_or(0, |i| i + 1);
        let mut attachments = Vec::new();
        let mut color_refs = vec![UNUSED_ATTACHMENT; max_index];
        let mut resolve_refs = vec![UNUSED_ATTACHMENT; max_index];
        let mut has_resolves = false;

        for (&index, slot) in &self.colors {
            color_refs[index] = vk::AttachmentReference {
                attachment: attachments.len() as u32,
                layout,
            };
            attachments.push(slot.color);
            if let Some(resolve) = slot.resolve {
                resolve_refs[index] = vk::AttachmentReference {
                    attachment: attachments.len() as u32,
                    layout,
                };
                attachments.push(resolve);
                has_resolves = true;
            }
        }
        if !has_resolves {
            resolve_refs.clear();
        }

        let depth_stencil_ref = self.depth_stencil.map(|description| {
            let reference = vk::AttachmentReference {
                attachment: attachments.len() as u32,
                layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
            };
            attachments.push(description);
            reference
        });

        let mut subpass = SubpassDescriptionVK {
            color_attachments: color_refs.clone(),
            resolve_attachments: resolve_refs,
            depth_stencil_attachment: depth_stencil_ref,
            ..Default::default()
        };
        if self.framebuffer_fetch {
            subpass.flags =
                vk::SubpassDescriptionFlags::RASTERIZATION_ORDER_ATTACHMENT_COLOR_ACCESS_EXT;
            subpass.input_attachments = color_refs;
        }

        Ok(RenderPassDescriptionVK {
            attachments,
            subpasses: vec![subpass],
            dependencies: self.dependencies(),
        })
    }

    fn dependencies(&self) -> Vec<vk::SubpassDependency> {
        let mut dependencies = vec![vk::SubpassDependency {
            src_subpass: vk::SUBPASS_EXTERNAL,
            dst_subpass: 0,
            src_stage_mask: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
                | vk::PipelineStageFlags::FRAGMENT_SHADER
                | vk::PipelineStageFlags::TRANSFER,
            dst_stage_mask: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
                | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS
                | vk::PipelineStageFlags::LATE_FRAGMENT_TESTS,
            src_access_mask: vk::AccessFlags::COLOR_ATTACHMENT_WRITE
                | vk::AccessFlags::SHADER_READ
                | vk::AccessFlags::TRANSFER_WRITE,
            dst_access_mask: vk::AccessFlags::COLOR_ATTACHMENT_READ
                | vk::AccessFlags::COLOR_ATTACHMENT_WRITE
                | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ
                | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
            dependency_flags: vk::DependencyFlags::empty(),
        }];

        if self.framebuffer_fetch {
            dependencies.push(vk::SubpassDependency {
                src_subpass: 0,
                dst_subpass: 0,
                src_stage_mask: SELF_DEPENDENCY_SRC_STAGE,
                dst_stage_mask: SELF_DEPENDENCY_DST_STAGE,
                src_access_mask: SELF_DEPENDENCY_SRC_ACCESS,
                dst_access_mask: SELF_DEPENDENCY_DST_ACCESS,
                dependency_flags: vk::DependencyFlags::BY_REGION,
            });
        }

        // Presentation synchronizes swapchain images on its own.
        if !self.colors.values().any(|slot| slot.is_swapchain) {
            dependencies.push(vk::SubpassDependency {
                src_subpass: 0,
                dst_subpass: vk::SUBPASS_EXTERNAL,
                src_stage_mask: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
                dst_stage_mask: vk::PipelineStageFlags::FRAGMENT_SHADER
                    | vk::PipelineStageFlags::TRANSFER,
                src_access_mask: vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
                dst_access_mask: vk::AccessFlags::SHADER_READ | vk::AccessFlags::TRANSFER_READ,
                dependency_flags: vk::DependencyFlags::empty(),
            });
        }
        dependencies
    }

    /// Creates the render pass on `device`.
    ///
    /// ## Errors
    /// * `RenderError::RenderPassFailed` - If the description is invalid or
    ///   the driver rejected it.
    pub fn build(&self, device: &Arc<DeviceHolderVK>) -> Result<RenderPassVK, RenderError> {
        let description = self.build_description()?;
        let render_pass = device
            .driver()
            .create_render_pass(device.device(), &description)
            .map_err(|error| {
                log::error!("Could not create render pass: {error}. {description:?}");
                RenderError::RenderPassFailed(error.to_string())
            })?;
        Ok(RenderPassVK {
            device: Arc::downgrade(device),
            render_pass,
            description,
        })
    }
}

/// Records the barrier that makes the previous color writes of `image`
/// visible to input attachment reads in the same subpass.
///
/// The masks equal the subpass self-dependency exactly.
pub fn insert_barrier_for_input_attachment_read(
    driver: &dyn VulkanDriver,
    command_buffer: vk::CommandBuffer,
    image: vk::Image,
) {
    let barrier = vk::ImageMemoryBarrier::default()
        .src_access_mask(SELF_DEPENDENCY_SRC_ACCESS)
        .dst_access_mask(SELF_DEPENDENCY_DST_ACCESS)
        .old_layout(vk::ImageLayout::GENERAL)
        .new_layout(vk::ImageLayout::GENERAL)
        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .image(image)
        .subresource_range(vk::ImageSubresourceRange {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            base_mip_level: 0,
            level_count: 1,
            base_array_layer: 0,
            layer_count: 1,
        });
    driver.cmd_pipeline_barrier(
        command_buffer,
        SELF_DEPENDENCY_SRC_STAGE,
        SELF_DEPENDENCY_DST_STAGE,
        vk::DependencyFlags::BY_REGION,
        &[barrier],
    );
}

/// A render pass object and the description it was created from.
#[derive(Debug)]
pub struct RenderPassVK {
    device: Weak<DeviceHolderVK>,
    render_pass: vk::RenderPass,
    description: RenderPassDescriptionVK,
}

impl RenderPassVK {
    /// The render pass handle.
    pub fn render_pass(&self) -> vk::RenderPass {
        self.render_pass
    }

    /// The description.
    pub fn description(&self) -> &RenderPassDescriptionVK {
        &self.description
    }

    /// Returns `true` if pipelines created against `self` can be used with
    /// framebuffers created against `other`.
    pub fn is_compatible_with(&self, other: &RenderPassVK) -> bool {
        render_passes_compatible(&self.description, &other.description)
    }
}

impl Drop for RenderPassVK {
    fn drop(&mut self) {
        with_device(&self.device, |device| {
            device.driver().destroy_render_pass(device.device(), self.render_pass);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graphics::vulkan::create_info::is_unused;

    fn color(
        builder: &mut RenderPassBuilderVK,
        index: usize,
        samples: SampleCount,
        store: StoreAction,
    ) {
        builder.set_color_attachment(
            index,
            PixelFormat::R8G8B8A8UNormInt,
            samples,
            LoadAction::Clear,
            store,
            vk::ImageLayout::UNDEFINED,
            false,
        );
    }

    #[test]
    fn test_resolves_are_interleaved_and_depth_is_last() {
        // --- 1. ARRANGE ---
        let mut builder = RenderPassBuilderVK::new(false);
        color(&mut builder, 0, SampleCount::Count4, StoreAction::MultisampleResolve);
        color(&mut builder, 1, SampleCount::Count4, StoreAction::MultisampleResolve);
        builder.set_depth_stencil_attachment(
            PixelFormat::D32FloatS8UInt,
            SampleCount::Count4,
            LoadAction::Clear,
            StoreAction::DontCare,
        );

        // --- 2. ACT ---
        let info = builder.build_description().unwrap();

        // --- 3. ASSERT ---
        let subpass = &info.subpasses[0];
        assert_eq!(info.attachments.len(), 5);
        assert_eq!(subpass.color_attachments[0].attachment, 0);
        assert_eq!(
            subpass.resolve_attachments[0].attachment, 1,
            "Resolve follows its color"
        );
        assert_eq!(subpass.color_attachments[1].attachment, 2);
        assert_eq!(subpass.resolve_attachments[1].attachment, 3);
        assert_eq!(subpass.depth_stencil_attachment.unwrap().attachment, 4);
        assert_eq!(info.attachments[1].samples, vk::SampleCountFlags::TYPE_1);
    }

    #[test]
    fn test_sparse_indices_leave_unused_holes() {
        let mut builder = RenderPassBuilderVK::new(false);
        color(&mut builder, 0, SampleCount::Count1, StoreAction::Store);
        color(&mut builder, 2, SampleCount::Count1, StoreAction::Store);

        let info = builder.build_description().unwrap();
        let refs = &info.subpasses[0].color_attachments;

        assert_eq!(refs.len(), 3);
        assert!(is_unused(&refs[1]));
        assert_eq!(refs[2].attachment, 1);
        assert!(info.subpasses[0].resolve_attachments.is_empty());
    }

    #[test]
    fn test_missing_index_zero_is_an_error() {
        let mut builder = RenderPassBuilderVK::new(false);
        color(&mut builder, 1, SampleCount::Count1, StoreAction::Store);
        assert!(matches!(
            builder.build_description(),
            Err(RenderError::RenderPassFailed(_))
        ));
    }

    #[test]
    fn test_overwriting_clears_the_resolve() {
        let mut builder = RenderPassBuilderVK::new(false);
        color(&mut builder, 0, SampleCount::Count4, StoreAction::MultisampleResolve);
        assert!(builder.has_resolve(0));
        color(&mut builder, 0, SampleCount::Count4, StoreAction::Store);
        assert!(!builder.has_resolve(0));
    }

    #[test]
    fn test_self_dependency_follows_framebuffer_fetch() {
        let self_dependency = |info: &RenderPassDescriptionVK| {
            info.dependencies
                .iter()
                .find(|d| d.src_subpass == 0 && d.dst_subpass == 0)
                .copied()
        };

        let mut with_fetch = RenderPassBuilderVK::new(true);
        color(&mut with_fetch, 0, SampleCount::Count1, StoreAction::Store);
        let info = with_fetch.build_description().unwrap();
        let dependency =
            self_dependency(&info).expect("Framebuffer fetch needs a self-dependency");
        assert_eq!(dependency.dependency_flags, vk::DependencyFlags::BY_REGION);
        assert_eq!(dependency.dst_access_mask, vk::AccessFlags::INPUT_ATTACHMENT_READ);
        assert_eq!(info.subpasses[0].input_attachments.len(), 1);

        let mut without = RenderPassBuilderVK::new(false);
        color(&mut without, 0, SampleCount::Count1, StoreAction::Store);
        let info = without.build_description().unwrap();
        assert!(self_dependency(&info).is_none());
        assert!(info.subpasses[0].input_attachments.is_empty());
    }

    #[test]
    fn test_swapchain_pass_omits_the_outgoing_dependency() {
        let mut builder = RenderPassBuilderVK::new(false);
        builder.set_color_attachment(
            0,
            PixelFormat::B8G8R8A8UNormInt,
            SampleCount::Count1,
            LoadAction::Clear,
            StoreAction::Store,
            vk::ImageLayout::UNDEFINED,
            true,
        );
        let info = builder.build_description().unwrap();
        assert!(info
            .dependencies
            .iter()
            .all(|d| d.dst_subpass != vk::SUBPASS_EXTERNAL));
    }

    #[test]
    fn test_load_and_store_do_not_change_compatibility() {
        let mut placeholder = RenderPassBuilderVK::new(true);
        placeholder.set_color_attachment(
            0,
            PixelFormat::R8G8B8A8UNormInt,
            SampleCount::Count1,
            LoadAction::DontCare,
            StoreAction::DontCare,
            vk::ImageLayout::UNDEFINED,
            false,
        );
        let mut real = RenderPassBuilderVK::new(true);
        real.set_color_attachment(
            0,
            PixelFormat::R8G8B8A8UNormInt,
            SampleCount::Count1,
            LoadAction::Load,
            StoreAction::Store,
            vk::ImageLayout::GENERAL,
            true,
        );
        assert!(render_passes_compatible(
            &placeholder.build_description().unwrap(),
            &real.build_description().unwrap()
        ));
    }
}
