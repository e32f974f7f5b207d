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

//! The driver interface the backend is written against.

use super::create_info::{
    DescriptorWriteVK, GraphicsPipelineDescriptionVK, RenderPassDescriptionVK,
};
use ash::vk;
use std::ffi::{CStr, CString};
use std::fmt::Debug;

pub use ash::prelude::VkResult;

/// The device extension every context requires.
pub const KHR_SWAPCHAIN: &CStr = c"VK_KHR_swapchain";
/// Rasterization order attachment access (framebuffer fetch), EXT flavor.
pub const EXT_RASTERIZATION_ORDER_ATTACHMENT_ACCESS: &CStr =
    c"VK_EXT_rasterization_order_attachment_access";
/// Rasterization order attachment access (framebuffer fetch), ARM flavor.
pub const ARM_RASTERIZATION_ORDER_ATTACHMENT_ACCESS: &CStr =
    c"VK_ARM_rasterization_order_attachment_access";
/// Per-pipeline creation feedback.
pub const EXT_PIPELINE_CREATION_FEEDBACK: &CStr = c"VK_EXT_pipeline_creation_feedback";
/// Marks a non-conformant layered implementation.
pub const KHR_PORTABILITY_SUBSET: &CStr = c"VK_KHR_portability_subset";

/// The Vulkan entry points the backend depends on.
///
/// Every object-creating call is safe to make from any thread, matching
/// Vulkan's external synchronization rules for the objects used here: a
/// pipeline cache may be used by concurrent pipeline creations, while
/// descriptor pools and command buffers are externally synchronized by
/// their owners.
pub trait VulkanDriver: Send + Sync + Debug + 'static {
    // --- Physical device queries ---

    /// Identity and limits of the physical device.
    fn physical_device_properties(&self) -> vk::PhysicalDeviceProperties;

    /// Names of the available device extensions.
    fn enumerate_device_extensions(&self) -> Vec<CString>;

    /// What `format` supports with optimal tiling.
    fn format_features(&self, format: vk::Format) -> vk::FormatFeatureFlags;

    /// The available memory types, indexed by memory type index.
    fn memory_types(&self) -> Vec<vk::MemoryType>;

    // --- Device ---

    /// Creates the logical device with the given extensions enabled.
    /// ## Errors
    /// * `ERROR_EXTENSION_NOT_PRESENT` - If an extension is not available.
    fn create_device(&self, enabled_extensions: &[&CStr]) -> VkResult<vk::Device>;

    /// Destroys the logical device. Every child object must already be gone.
    fn destroy_device(&self, device: vk::Device);

    // --- Memory, buffers and images ---

    /// Creates a buffer without memory.
    fn create_buffer(
        &self,
        device: vk::Device,
        info: &vk::BufferCreateInfo<'_>,
    ) -> VkResult<vk::Buffer>;

    /// Destroys a buffer.
    fn destroy_buffer(&self, device: vk::Device, buffer: vk::Buffer);

    /// The memory a buffer needs.
    fn buffer_memory_requirements(
        &self,
        device: vk::Device,
        buffer: vk::Buffer,
    ) -> vk::MemoryRequirements;

    /// Creates an image without memory.
    fn create_image(&self, device: vk::Device, info: &vk::ImageCreateInfo<'_>)
        -> VkResult<vk::Image>;

    /// Destroys an image and any view the driver made of it.
    fn destroy_image(&self, device: vk::Device, image: vk::Image);

    /// The memory an image needs.
    fn image_memory_requirements(&self, device: vk::Device, image: vk::Image)
        -> vk::MemoryRequirements;

    /// Allocates device memory. Host-visible memory is mapped for its whole
    /// lifetime.
    /// ## Errors
    /// * `ERROR_OUT_OF_DEVICE_MEMORY` - If the heap is exhausted.
    fn allocate_memory(
        &self,
        device: vk::Device,
        size: u64,
        memory_type_index: u32,
    ) -> VkResult<vk::DeviceMemory>;

    /// Frees device memory.
    fn free_memory(&self, device: vk::Device, memory: vk::DeviceMemory);

    /// Binds memory to a buffer.
    /// ## Errors
    /// * `ERROR_VALIDATION_FAILED_EXT` - If the memory type is not allowed by
    ///   the buffer's requirements.
    fn bind_buffer_memory(
        &self,
        device: vk::Device,
        buffer: vk::Buffer,
        memory: vk::DeviceMemory,
        offset: u64,
    ) -> VkResult<()>;

    /// Binds memory to an image.
    fn bind_image_memory(
        &self,
        device: vk::Device,
        image: vk::Image,
        memory: vk::DeviceMemory,
        offset: u64,
    ) -> VkResult<()>;

    /// Writes host-visible memory through its persistent mapping.
    fn write_memory(
        &self,
        device: vk::Device,
        memory: vk::DeviceMemory,
        offset: u64,
        data: &[u8],
    ) -> VkResult<()>;

    /// Reads host-visible memory through its persistent mapping.
    fn read_memory(
        &self,
        device: vk::Device,
        memory: vk::DeviceMemory,
        offset: u64,
        len: u64,
    ) -> VkResult<Vec<u8>>;

    // --- Shaders and pipelines ---

    /// Creates a shader module from SPIR-V.
    fn create_shader_module(&self, device: vk::Device, code: &[u8])
        -> VkResult<vk::ShaderModule>;

    /// Destroys a shader module.
    fn destroy_shader_module(&self, device: vk::Device, module: vk::ShaderModule);

    /// Creates a descriptor-set layout.
    fn create_descriptor_set_layout(
        &self,
        device: vk::Device,
        bindings: &[vk::DescriptorSetLayoutBinding<'_>],
    ) -> VkResult<vk::DescriptorSetLayout>;

    /// Destroys a descriptor-set layout.
    fn destroy_descriptor_set_layout(&self, device: vk::Device, layout: vk::DescriptorSetLayout);

    /// Creates a pipeline layout.
    fn create_pipeline_layout(
        &self,
        device: vk::Device,
        set_layouts: &[vk::DescriptorSetLayout],
    ) -> VkResult<vk::PipelineLayout>;

    /// Destroys a pipeline layout.
    fn destroy_pipeline_layout(&self, device: vk::Device, layout: vk::PipelineLayout);

    /// Creates a render pass.
    fn create_render_pass(
        &self,
        device: vk::Device,
        description: &RenderPassDescriptionVK,
    ) -> VkResult<vk::RenderPass>;

    /// Destroys a render pass.
    fn destroy_render_pass(&self, device: vk::Device, render_pass: vk::RenderPass);

    /// Creates a pipeline cache seeded with `initial_data`.
    /// ## Errors
    /// * `ERROR_INITIALIZATION_FAILED` - If the data was produced by another
    ///   device or driver.
    fn create_pipeline_cache(
        &self,
        device: vk::Device,
        initial_data: &[u8],
    ) -> VkResult<vk::PipelineCache>;

    /// Serializes a pipeline cache.
    fn get_pipeline_cache_data(
        &self,
        device: vk::Device,
        cache: vk::PipelineCache,
    ) -> VkResult<Vec<u8>>;

    /// Destroys a pipeline cache.
    fn destroy_pipeline_cache(&self, device: vk::Device, cache: vk::PipelineCache);

    /// Creates a graphics pipeline. Thread-safe with respect to `cache`.
    fn create_graphics_pipeline(
        &self,
        device: vk::Device,
        cache: vk::PipelineCache,
        description: &GraphicsPipelineDescriptionVK,
    ) -> VkResult<(vk::Pipeline, vk::PipelineCreationFeedback)>;

    /// Destroys a pipeline.
    fn destroy_pipeline(&self, device: vk::Device, pipeline: vk::Pipeline);

    // --- Descriptors ---

    /// Creates a descriptor pool.
    fn create_descriptor_pool(
        &self,
        device: vk::Device,
        max_sets: u32,
        pool_sizes: &[vk::DescriptorPoolSize],
    ) -> VkResult<vk::DescriptorPool>;

    /// Destroys a descriptor pool and frees every set allocated from it.
    fn destroy_descriptor_pool(&self, device: vk::Device, pool: vk::DescriptorPool);

    /// Allocates one descriptor set.
    /// ## Errors
    /// * `ERROR_OUT_OF_POOL_MEMORY` or `ERROR_FRAGMENTED_POOL` - If the pool
    ///   is exhausted.
    fn allocate_descriptor_set(
        &self,
        device: vk::Device,
        pool: vk::DescriptorPool,
        layout: vk::DescriptorSetLayout,
    ) -> VkResult<vk::DescriptorSet>;

    /// Writes descriptors.
    fn update_descriptor_sets(&self, device: vk::Device, writes: &[DescriptorWriteVK]);

    // --- Framebuffers and commands ---

    /// Creates a framebuffer over whole images.
    fn create_framebuffer(
        &self,
        device: vk::Device,
        render_pass: vk::RenderPass,
        attachments: &[vk::Image],
        extent: vk::Extent2D,
    ) -> VkResult<vk::Framebuffer>;

    /// Destroys a framebuffer.
    fn destroy_framebuffer(&self, device: vk::Device, framebuffer: vk::Framebuffer);

    /// Allocates a primary command buffer and begins recording.
    fn allocate_command_buffer(&self, device: vk::Device) -> VkResult<vk::CommandBuffer>;

    /// Frees a command buffer.
    fn free_command_buffer(&self, device: vk::Device, command_buffer: vk::CommandBuffer);

    /// Begins a render pass over the whole framebuffer.
    ///
    /// `clear_values` is indexed by attachment.
    fn cmd_begin_render_pass(
        &self,
        command_buffer: vk::CommandBuffer,
        render_pass: vk::RenderPass,
        framebuffer: vk::Framebuffer,
        clear_values: &[vk::ClearValue],
    );

    /// Binds a graphics pipeline.
    fn cmd_bind_pipeline(&self, command_buffer: vk::CommandBuffer, pipeline: vk::Pipeline);

    /// Binds descriptor sets starting at set 0.
    fn cmd_bind_descriptor_sets(
        &self,
        command_buffer: vk::CommandBuffer,
        layout: vk::PipelineLayout,
        sets: &[vk::DescriptorSet],
    );

    /// Records a pipeline barrier.
    fn cmd_pipeline_barrier(
        &self,
        command_buffer: vk::CommandBuffer,
        src_stage_mask: vk::PipelineStageFlags,
        dst_stage_mask: vk::PipelineStageFlags,
        dependency_flags: vk::DependencyFlags,
        image_barriers: &[vk::ImageMemoryBarrier<'_>],
    );

    /// Records a non-indexed draw.
    fn cmd_draw(&self, command_buffer: vk::CommandBuffer, vertex_count: u32, instance_count: u32);

    /// Ends the current render pass.
    fn cmd_end_render_pass(&self, command_buffer: vk::CommandBuffer);

    /// Ends recording and submits the command buffer.
    ///
    /// Returns a fence that signals once the GPU is done with every object the
    /// command buffer references. The caller owns the fence.
    /// ## Errors
    /// * `ERROR_VALIDATION_FAILED_EXT` - If invalid usage was recorded.
    fn queue_submit(
        &self,
        device: vk::Device,
        command_buffer: vk::CommandBuffer,
    ) -> VkResult<vk::Fence>;

    /// Blocks until `fence` signals.
    fn wait_for_fence(&self, device: vk::Device, fence: vk::Fence) -> VkResult<()>;

    /// Destroys a fence.
    fn destroy_fence(&self, device: vk::Device, fence: vk::Fence);
}
