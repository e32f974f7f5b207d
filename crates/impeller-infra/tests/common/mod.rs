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

//! Shared fixtures for the backend integration tests.

#![allow(dead_code)]

use impeller_core::math::ISize;
use impeller_core::renderer::{
    Allocator, Attachment, ColorAttachment, ColorAttachmentDescriptor, Context, ContextSettings,
    DescriptorSetLayout, DescriptorType, LoadAction, PipelineDescriptor, PixelFormat, SampleCount,
    ShaderFunction, ShaderStage, ShaderStageBufferLayout, ShaderStageIOSlot, StorageMode,
    StoreAction, Texture, TextureDescriptor, TextureType, TextureUsage, VertexDescriptor,
};
use impeller_infra::graphics::vulkan::{InstanceRegistry, SoftwareDriver, VulkanDriver};
use impeller_infra::ContextVK;
use std::sync::Arc;

pub const TARGET_SIZE: ISize = ISize::new(64, 64);
pub const COLOR_FORMAT: PixelFormat = PixelFormat::R8G8B8A8UNormInt;

/// A five-word SPIR-V module header. `seed` makes modules distinguishable.
pub fn spirv_stub(seed: u32) -> Vec<u8> {
    [0x0723_0203, 0x0001_0000, seed, 1, 0]
        .iter()
        .flat_map(|word: &u32| word.to_le_bytes())
        .collect()
}

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn settings() -> ContextSettings {
    ContextSettings {
        worker_count: 2,
        enable_validation: false,
        ..Default::default()
    }
}

/// A context on `driver` with its own instance registry, so tests never
/// share an instance.
pub fn context_with(driver: &Arc<SoftwareDriver>, settings: ContextSettings) -> Arc<ContextVK> {
    init_logging();
    let dyn_driver: Arc<dyn VulkanDriver> = driver.clone();
    let context = ContextVK::create_with_registry(&InstanceRegistry::new(), dyn_driver, settings);
    if context.is_valid() {
        register_solid_fill(&context);
    }
    context
}

pub fn context(driver: &Arc<SoftwareDriver>) -> Arc<ContextVK> {
    context_with(driver, settings())
}

pub fn register_solid_fill(context: &ContextVK) {
    let Some(shaders) = context.shader_library() else {
        return;
    };
    shaders
        .register_function("solid_fill", ShaderStage::Vertex, spirv_stub(1).into())
        .expect("vertex shader registers");
    shaders
        .register_function("solid_fill", ShaderStage::Fragment, spirv_stub(2).into())
        .expect("fragment shader registers");
}

/// A single-color pipeline with a 2D position input and one uniform block.
pub fn solid_fill(label: &str, samples: SampleCount) -> PipelineDescriptor {
    let mut vertex = VertexDescriptor::new();
    vertex.set_stage_inputs(
        vec![ShaderStageIOSlot::float_vec("position", 0, 2, 0)],
        vec![ShaderStageBufferLayout { stride: 8, binding: 0 }],
    );
    vertex.register_descriptor_set_layouts(&[DescriptorSetLayout {
        binding: 0,
        descriptor_type: DescriptorType::UniformBuffer,
        shader_stage: ShaderStage::Vertex,
    }]);

    let mut descriptor = PipelineDescriptor::new();
    descriptor
        .set_label(label)
        .set_sample_count(samples)
        .add_stage_entrypoint(ShaderFunction::new("solid_fill", ShaderStage::Vertex))
        .add_stage_entrypoint(ShaderFunction::new("solid_fill", ShaderStage::Fragment))
        .set_color_attachment_descriptor(0, ColorAttachmentDescriptor::with_format(COLOR_FORMAT))
        .set_vertex_descriptor(vertex);
    descriptor
}

pub fn color_texture(
    allocator: &dyn Allocator,
    samples: SampleCount,
    storage_mode: StorageMode,
) -> Arc<dyn Texture> {
    let texture_type = match samples {
        SampleCount::Count1 => TextureType::Texture2D,
        SampleCount::Count4 => TextureType::Texture2DMultisample,
    };
    allocator
        .create_texture(&TextureDescriptor {
            storage_mode,
            texture_type,
            format: COLOR_FORMAT,
            size: TARGET_SIZE,
            usage: TextureUsage::RENDER_TARGET | TextureUsage::SHADER_READ,
            sample_count: samples,
            ..Default::default()
        })
        .expect("color texture is allocated")
}

/// A one-attachment target that clears and stores.
pub fn simple_target(context: &ContextVK) -> impeller_core::renderer::RenderTarget {
    let allocator = context.resource_allocator().expect("valid context has an allocator");
    let texture =
        color_texture(allocator.as_ref(), SampleCount::Count1, StorageMode::DevicePrivate);
    let mut target = impeller_core::renderer::RenderTarget::new();
    target.set_color_attachment(
        0,
        ColorAttachment {
            attachment: Attachment {
                load_action: LoadAction::Clear,
                store_action: StoreAction::Store,
                ..Attachment::new(texture)
            },
            ..Default::default()
        },
    );
    target
}

/// A 4x target resolving into a single-sample texture.
pub fn msaa_target(context: &ContextVK) -> impeller_core::renderer::RenderTarget {
    let allocator = context.resource_allocator().expect("valid context has an allocator");
    let msaa =
        color_texture(allocator.as_ref(), SampleCount::Count4, StorageMode::DeviceTransient);
    let resolve =
        color_texture(allocator.as_ref(), SampleCount::Count1, StorageMode::DevicePrivate);
    let mut target = impeller_core::renderer::RenderTarget::new();
    target.set_color_attachment(
        0,
        ColorAttachment {
            attachment: Attachment {
                load_action: LoadAction::Clear,
                store_action: StoreAction::MultisampleResolve,
                resolve_texture: Some(resolve),
                ..Attachment::new(msaa)
            },
            ..Default::default()
        },
    );
    target
}
