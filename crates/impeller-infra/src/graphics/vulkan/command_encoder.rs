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

//! Records render passes into a command buffer.

use super::allocator::{DeviceBufferVK, TextureVK};
use super::create_info::{DescriptorResourceVK, DescriptorWriteVK};
use super::descriptor_pool::DescriptorPoolVK;
use super::device_holder::{with_device, DeviceHolderVK};
use super::fence_waiter::FenceWaiterVK;
use super::formats::IntoVk;
use super::pipeline::PipelineVK;
use super::render_pass_builder::{
    insert_barrier_for_input_attachment_read, RenderPassBuilderVK, RenderPassVK,
};
use ash::vk;
use impeller_core::renderer::{
    Attachment, BufferView, DescriptorType, DeviceBuffer, Pipeline, RenderError, RenderTarget,
    ResourceError, Texture,
};
use std::collections::BTreeMap;
use std::sync::{Arc, Weak};

/// A resource bound to a descriptor slot.
#[derive(Debug, Clone)]
pub enum BoundResource {
    /// A uniform or storage buffer range.
    Buffer(BufferView),
    /// A sampled, storage or input-attachment texture.
    Texture(Arc<dyn Texture>),
}

/// One descriptor write.
#[derive(Debug, Clone)]
pub struct ResourceBinding {
    /// The binding index in set 0.
    pub binding: u32,
    /// What is bound.
    pub resource: BoundResource,
}

#[derive(Debug)]
struct ActivePass {
    render_pass: usize,
    color_images: BTreeMap<usize, vk::Image>,
}

/// Everything the recorded commands reference.
///
/// Released on drop. After a submission that happens on the fence waiter,
/// once the GPU is done with the command buffer.
#[derive(Debug)]
struct TrackedObjectsVK {
    device: Weak<DeviceHolderVK>,
    command_buffer: vk::CommandBuffer,
    descriptor_pool: DescriptorPoolVK,
    render_passes: Vec<RenderPassVK>,
    framebuffers: Vec<vk::Framebuffer>,
    textures: Vec<Arc<dyn Texture>>,
    buffers: Vec<Arc<dyn DeviceBuffer>>,
    pipelines: Vec<Arc<dyn Pipeline>>,
}

impl Drop for TrackedObjectsVK {
    fn drop(&mut self) {
        with_device(&self.device, |device| {
            let driver = device.driver();
            for framebuffer in self.framebuffers.drain(..) {
                driver.destroy_framebuffer(device.device(), framebuffer);
            }
            driver.free_command_buffer(device.device(), self.command_buffer);
        });
    }
}

/// Records one command buffer.
///
/// Every object referenced by the recorded commands is retained until the
/// submission completes, or until the encoder is dropped unsubmitted.
#[derive(Debug)]
pub struct CommandEncoderVK {
    device: Weak<DeviceHolderVK>,
    fence_waiter: Weak<FenceWaiterVK>,
    command_buffer: vk::CommandBuffer,
    framebuffer_fetch: bool,
    active_pass: Option<ActivePass>,
    bound_pipeline: Option<Arc<dyn Pipeline>>,
    tracked: TrackedObjectsVK,
}

fn texture_vk(texture: &Arc<dyn Texture>) -> Result<&TextureVK, RenderError> {
    texture
        .downcast_ref::<TextureVK>()
        .ok_or(RenderError::ResourceError(ResourceError::InvalidHandle))
}

impl CommandEncoderVK {
    /// Allocates a command buffer and begins recording.
    ///
    /// ## Arguments
    /// * `fence_waiter` - Retires the submission.
    /// * `max_sets_per_pool` - Descriptor sets per backing descriptor pool.
    /// * `framebuffer_fetch` - Must match the pipeline library the bound
    ///   pipelines come from.
    pub fn new(
        device: &Arc<DeviceHolderVK>,
        fence_waiter: &Arc<FenceWaiterVK>,
        max_sets_per_pool: u32,
        framebuffer_fetch: bool,
    ) -> Result<Self, RenderError> {
        let command_buffer = device
            .driver()
            .allocate_command_buffer(device.device())
            .map_err(|e| RenderError::InitializationFailed(format!("command buffer: {e}")))?;
        Ok(Self {
            device: Arc::downgrade(device),
            fence_waiter: Arc::downgrade(fence_waiter),
            command_buffer,
            framebuffer_fetch,
            active_pass: None,
            bound_pipeline: None,
            tracked: TrackedObjectsVK {
                device: Arc::downgrade(device),
                command_buffer,
                descriptor_pool: DescriptorPoolVK::new(device, max_sets_per_pool),
                render_passes: Vec::new(),
                framebuffers: Vec::new(),
                textures: Vec::new(),
                buffers: Vec::new(),
                pipelines: Vec::new(),
            },
        })
    }

    fn device(&self) -> Result<Arc<DeviceHolderVK>, RenderError> {
        self.device.upgrade().ok_or(RenderError::DeviceLost)
    }

    fn color_load_layout(&self) -> vk::ImageLayout {
        if self.framebuffer_fetch {
            vk::ImageLayout::GENERAL
        } else {
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL
        }
    }

    /// Begins a render pass into `target`.
    ///
    /// ## Errors
    /// * `RenderError::RenderingFailed` - If a pass is already active.
    /// * `RenderError::RenderPassFailed` - If the target is invalid or the
    ///   framebuffer cannot be created.
    pub fn begin_render_pass(&mut self, target: &RenderTarget) -> Result<(), RenderError> {
        if self.active_pass.is_some() {
            return Err(RenderError::RenderingFailed(
                "a render pass is already active".to_string(),
            ));
        }
        if !target.is_valid() {
            return Err(RenderError::RenderPassFailed("invalid render target".to_string()));
        }
        let device = self.device()?;

        let mut builder = RenderPassBuilderVK::new(self.framebuffer_fetch);
        let mut images = Vec::new();
        let mut clear_values = Vec::new();
        let mut color_images = BTreeMap::new();
        let mut retained = Vec::new();

        for (&index, color) in target.color_attachments() {
            let attachment = &color.attachment;
            let Some(texture) = &attachment.texture else {
                return Err(RenderError::RenderPassFailed(format!(
                    "color attachment {index} has no texture"
                )));
            };
            let texture_desc = texture.descriptor();
            builder.set_color_attachment(
                index,
                texture_desc.format,
                texture_desc.sample_count,
                attachment.load_action,
                attachment.store_action,
                self.color_load_layout(),
                false,
            );
            let image = texture_vk(texture)?.image();
            images.push(image);
            clear_values.push(vk::ClearValue {
                color: vk::ClearColorValue {
                    float32: [
                        color.clear_color.red,
                        color.clear_color.green,
                        color.clear_color.blue,
                        color.clear_color.alpha,
                    ],
                },
            });
            color_images.insert(index, image);
            retained.push(texture.clone());

            if builder.has_resolve(index) {
                let Some(resolve) = &attachment.resolve_texture else {
                    return Err(RenderError::RenderPassFailed(format!(
                        "color attachment {index} resolves without a resolve texture"
                    )));
                };
                images.push(texture_vk(resolve)?.image());
                clear_values.push(vk::ClearValue::default());
                retained.push(resolve.clone());
            }
        }

        let depth_stencil = match (target.depth_attachment(), target.stencil_attachment()) {
            (Some(depth), _) => Some((&depth.attachment, true)),
            (None, Some(stencil)) => Some((&stencil.attachment, false)),
            (None, None) => None,
        };
        if let Some((attachment, has_depth)) = depth_stencil {
            let texture = Self::attachment_texture(attachment)?;
            let texture_desc = texture.descriptor();
            if has_depth {
                builder.set_depth_stencil_attachment(
                    texture_desc.format,
                    texture_desc.sample_count,
                    attachment.load_action,
                    attachment.store_action,
                );
            } else {
                builder.set_stencil_attachment(
                    texture_desc.format,
                    texture_desc.sample_count,
                    attachment.load_action,
                    attachment.store_action,
                );
            }
            images.push(texture_vk(texture)?.image());
            clear_values.push(vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue {
                    depth: target.depth_attachment().map_or(0.0, |d| d.clear_depth as f32),
                    stencil: target.stencil_attachment().map_or(0, |s| s.clear_stencil),
                },
            });
            retained.push(texture.clone());
        }

        let render_pass = builder.build(&device)?;
        let size = target.render_target_size();
        let extent = vk::Extent2D {
            width: size.width as u32,
            height: size.height as u32,
        };
        let framebuffer = device
            .driver()
            .create_framebuffer(device.device(), render_pass.render_pass(), &images, extent)
            .map_err(|e| {
                RenderError::RenderPassFailed(format!("framebuffer creation failed: {e}"))
            })?;

        device.driver().cmd_begin_render_pass(
            self.command_buffer,
            render_pass.render_pass(),
            framebuffer,
            &clear_values,
        );
        self.tracked.framebuffers.push(framebuffer);
        self.tracked.render_passes.push(render_pass);
        self.tracked.textures.extend(retained);
        self.active_pass = Some(ActivePass {
            render_pass: self.tracked.render_passes.len() - 1,
            color_images,
        });
        Ok(())
    }

    fn attachment_texture(attachment: &Attachment) -> Result<&Arc<dyn Texture>, RenderError> {
        attachment
            .texture
            .as_ref()
            .ok_or_else(|| RenderError::RenderPassFailed("attachment has no texture".to_string()))
    }

    fn active_render_pass(&self) -> Result<(&ActivePass, &RenderPassVK), RenderError> {
        let active = self
            .active_pass
            .as_ref()
            .ok_or_else(|| RenderError::RenderingFailed("no active render pass".to_string()))?;
        let pass = self
            .tracked
            .render_passes
            .get(active.render_pass)
            .ok_or_else(|| RenderError::RenderingFailed("no active render pass".to_string()))?;
        Ok((active, pass))
    }

    fn bound_pipeline(&self) -> Result<&PipelineVK, RenderError> {
        self.bound_pipeline
            .as_ref()
            .and_then(|p| p.downcast_ref::<PipelineVK>())
            .ok_or_else(|| RenderError::RenderingFailed("no bound pipeline".to_string()))
    }

    /// Binds `pipeline` for the following draws.
    ///
    /// ## Errors
    /// * `RenderError::IncompatibleRenderPass` - If the pipeline was compiled
    ///   for a render pass incompatible with the active one.
    pub fn bind_pipeline(&mut self, pipeline: &Arc<dyn Pipeline>) -> Result<(), RenderError> {
        let device = self.device()?;
        let (_, pass) = self.active_render_pass()?;
        let pipeline_vk = pipeline
            .downcast_ref::<PipelineVK>()
            .ok_or(RenderError::ResourceError(ResourceError::InvalidHandle))?;
        if !pipeline_vk.render_pass().is_compatible_with(pass) {
            return Err(RenderError::IncompatibleRenderPass(format!(
                "pipeline '{}' does not match the active render pass",
                pipeline.descriptor().label()
            )));
        }

        device
            .driver()
            .cmd_bind_pipeline(self.command_buffer, pipeline_vk.pipeline());
        self.bound_pipeline = Some(pipeline.clone());
        self.tracked.pipelines.push(pipeline.clone());
        Ok(())
    }

    /// Writes `bindings` into a fresh descriptor set and binds it.
    ///
    /// The descriptor type of each binding comes from the bound pipeline's
    /// layout.
    pub fn bind_resources(&mut self, bindings: &[ResourceBinding]) -> Result<(), RenderError> {
        let device = self.device()?;
        let pipeline = self.bound_pipeline()?;
        let set_layout = pipeline.descriptor_set_layout();
        let pipeline_layout = pipeline.pipeline_layout();
        let label = pipeline.descriptor().label().to_string();
        let layouts = pipeline.descriptor().descriptor_set_layouts().to_vec();

        let mut writes = Vec::with_capacity(bindings.len());
        let mut buffers = Vec::new();
        let mut textures = Vec::new();
        for binding in bindings {
            let Some(layout) = layouts.iter().find(|l| l.binding == binding.binding) else {
                return Err(RenderError::RenderingFailed(format!(
                    "binding {} is not declared by pipeline '{label}'",
                    binding.binding
                )));
            };
            let resource = match &binding.resource {
                BoundResource::Buffer(view) => {
                    let buffer = view
                        .buffer
                        .downcast_ref::<DeviceBufferVK>()
                        .ok_or(RenderError::ResourceError(ResourceError::InvalidHandle))?;
                    buffers.push(view.buffer.clone());
                    DescriptorResourceVK::Buffer(vk::DescriptorBufferInfo {
                        buffer: buffer.buffer(),
                        offset: view.range.start as u64,
                        range: view.len() as u64,
                    })
                }
                BoundResource::Texture(texture) => {
                    let image = texture_vk(texture)?.image();
                    textures.push(texture.clone());
                    let layout = match layout.descriptor_type {
                        DescriptorType::InputAttachment if self.framebuffer_fetch => {
                            vk::ImageLayout::GENERAL
                        }
                        DescriptorType::Image => vk::ImageLayout::GENERAL,
                        _ => vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                    };
                    DescriptorResourceVK::Image { image, layout }
                }
            };
            writes.push(DescriptorWriteVK {
                dst_set: vk::DescriptorSet::null(),
                dst_binding: binding.binding,
                descriptor_type: layout.descriptor_type.into_vk(),
                resource,
            });
        }

        let set = self
            .tracked
            .descriptor_pool
            .allocate_descriptor_set(set_layout)
            .map_err(|e| RenderError::ResourceError(ResourceError::BackendError(e.to_string())))?;
        for write in &mut writes {
            write.dst_set = set;
        }
        let driver = device.driver();
        driver.update_descriptor_sets(device.device(), &writes);
        driver.cmd_bind_descriptor_sets(self.command_buffer, pipeline_layout, &[set]);
        self.tracked.buffers.extend(buffers);
        self.tracked.textures.extend(textures);
        Ok(())
    }

    /// Makes prior color writes to attachment `index` visible to input
    /// attachment reads in the active pass.
    ///
    /// ## Errors
    /// * `RenderError::RenderingFailed` - If framebuffer fetch is disabled or
    ///   no color attachment exists at `index`.
    pub fn insert_input_attachment_barrier(&mut self, index: usize) -> Result<(), RenderError> {
        if !self.framebuffer_fetch {
            return Err(RenderError::RenderingFailed(
                "framebuffer fetch is not enabled".to_string(),
            ));
        }
        let device = self.device()?;
        let (active, _) = self.active_render_pass()?;
        let image = *active.color_images.get(&index).ok_or_else(|| {
            RenderError::RenderingFailed(format!("no color attachment at index {index}"))
        })?;
        insert_barrier_for_input_attachment_read(device.driver(), self.command_buffer, image);
        Ok(())
    }

    /// Records a non-indexed draw with the bound pipeline.
    pub fn draw(&mut self, vertex_count: u32, instance_count: u32) -> Result<(), RenderError> {
        let device = self.device()?;
        self.bound_pipeline()?;
        device
            .driver()
            .cmd_draw(self.command_buffer, vertex_count, instance_count);
        Ok(())
    }

    /// Ends the active render pass.
    pub fn end_render_pass(&mut self) -> Result<(), RenderError> {
        let device = self.device()?;
        self.active_render_pass()?;
        device.driver().cmd_end_render_pass(self.command_buffer);
        self.active_pass = None;
        self.bound_pipeline = None;
        Ok(())
    }

    /// Ends recording and submits the command buffer.
    ///
    /// The referenced objects are released by the fence waiter once the
    /// submission completes.
    ///
    /// ## Errors
    /// * `RenderError::RenderingFailed` - If a pass is still active or the
    ///   driver rejected the recorded commands.
    pub fn submit(self) -> Result<(), RenderError> {
        if self.active_pass.is_some() {
            return Err(RenderError::RenderingFailed(
                "submitted inside a render pass".to_string(),
            ));
        }
        let device = self.device()?;
        let fence = device
            .driver()
            .queue_submit(device.device(), self.command_buffer)
            .map_err(|error| match error {
                vk::Result::ERROR_DEVICE_LOST => RenderError::DeviceLost,
                other => {
                    log::error!("Command buffer submission failed: {other}");
                    RenderError::RenderingFailed(other.to_string())
                }
            })?;

        let tracked = self.tracked;
        match self.fence_waiter.upgrade() {
            Some(waiter) => waiter.add_fence(fence, move || drop(tracked)),
            None => {
                log::warn!("Fence waiter is gone, waiting for the submission inline.");
                let driver = device.driver();
                if let Err(error) = driver.wait_for_fence(device.device(), fence) {
                    log::error!("Waiting for fence {fence:?} failed: {error}");
                }
                driver.destroy_fence(device.device(), fence);
                drop(tracked);
            }
        }
        Ok(())
    }
}
