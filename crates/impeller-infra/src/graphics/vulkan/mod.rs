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

//! The Vulkan-family backend.
//!
//! Every object that owns a driver handle keeps a weak reference to the
//! [`DeviceHolderVK`] and skips its release once the device is gone.

pub mod allocator;
pub mod ash_driver;
pub mod buffer_pool;
pub mod capabilities;
pub mod command_encoder;
pub mod context;
pub mod create_info;
pub mod descriptor_pool;
pub mod device_holder;
pub mod driver;
pub mod fence_waiter;
pub mod formats;
pub mod instance;
pub mod pipeline;
pub mod pipeline_cache;
pub mod pipeline_library;
pub mod render_pass_builder;
pub mod shader_archive;
pub mod shader_library;
#[cfg(any(test, feature = "software-driver"))]
pub mod software_driver;

pub use self::allocator::{AllocatorVK, DeviceBufferVK, TextureVK};
pub use self::ash_driver::{AshDriver, AshDriverError};
pub use self::capabilities::{CapabilitiesVK, OptionalDeviceExtensionVK};
pub use self::command_encoder::{BoundResource, CommandEncoderVK, ResourceBinding};
pub use self::context::ContextVK;
pub use self::descriptor_pool::DescriptorPoolVK;
pub use self::device_holder::DeviceHolderVK;
pub use self::driver::{
    VkResult, VulkanDriver, ARM_RASTERIZATION_ORDER_ATTACHMENT_ACCESS,
    EXT_PIPELINE_CREATION_FEEDBACK, EXT_RASTERIZATION_ORDER_ATTACHMENT_ACCESS,
    KHR_PORTABILITY_SUBSET, KHR_SWAPCHAIN,
};
pub use self::fence_waiter::FenceWaiterVK;
pub use self::instance::{InstanceRegistry, InstanceVK};
pub use self::pipeline::PipelineVK;
pub use self::pipeline_cache::{PipelineCacheError, PipelineCacheVK, PIPELINE_CACHE_FILE_NAME};
pub use self::pipeline_library::PipelineLibraryVK;
pub use self::render_pass_builder::{
    insert_barrier_for_input_attachment_read, RenderPassBuilderVK, RenderPassVK,
};
pub use self::shader_archive::{ShaderArchive, ShaderArchiveError};
pub use self::shader_library::{ShaderLibraryVK, ShaderModuleVK};
#[cfg(any(test, feature = "software-driver"))]
pub use self::software_driver::{DeviceProfile, DriverStats, FaultInjection, SoftwareDriver};
