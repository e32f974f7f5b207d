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

//! Integration tests for recording render passes against compiled pipelines.
//!
//! The software driver checks render pass compatibility and barrier coverage
//! the way validation layers do, so every recorded error fails submission.

mod common;

use common::{context, context_with, msaa_target, settings, simple_target, solid_fill};
use impeller_core::math::Matrix;
use impeller_core::renderer::{
    BufferView, Context, ContextSettings, DeviceBufferDescriptor, Pipeline, RenderError,
    SampleCount, Workarounds,
};
use impeller_infra::graphics::vulkan::{BoundResource, ResourceBinding, SoftwareDriver};
use std::sync::Arc;

fn compile(
    context: &impeller_infra::ContextVK,
    label: &str,
    samples: SampleCount,
) -> Arc<dyn Pipeline> {
    context
        .pipeline_library()
        .unwrap()
        .get_pipeline(solid_fill(label, samples))
        .wait()
        .expect("Pipeline should compile")
}

fn uniform_binding(context: &impeller_infra::ContextVK) -> ResourceBinding {
    let allocator = context.resource_allocator().unwrap();
    let buffer = allocator
        .create_buffer(&DeviceBufferDescriptor::host_visible(std::mem::size_of::<Matrix>()))
        .unwrap();
    buffer.write(0, bytemuck::bytes_of(&Matrix::IDENTITY)).unwrap();
    ResourceBinding {
        binding: 0,
        resource: BoundResource::Buffer(BufferView::whole(buffer)),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Recording
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_draw_a_triangle() {
    // --- 1. ARRANGE ---
    let driver = Arc::new(SoftwareDriver::default());
    let context = context(&driver);
    let pipeline = compile(&context, "triangle", SampleCount::Count1);
    let target = simple_target(&context);
    let uniforms = uniform_binding(&context);

    // --- 2. ACT ---
    let mut encoder = context.create_command_encoder().unwrap();
    encoder.begin_render_pass(&target).unwrap();
    encoder.bind_pipeline(&pipeline).unwrap();
    encoder.bind_resources(&[uniforms]).unwrap();
    encoder.draw(3, 1).unwrap();
    encoder.end_render_pass().unwrap();
    let result = encoder.submit();

    // --- 3. ASSERT ---
    assert!(result.is_ok(), "Submission failed: {result:?}");
    let stats = driver.stats();
    assert!(stats.command_errors.is_empty(), "Unexpected errors: {:?}", stats.command_errors);
    assert_eq!(stats.draws, 1);
    assert_eq!(stats.submissions, 1);
    assert_eq!(stats.descriptor_sets_allocated, 1);
}

#[test]
fn test_multisampled_pass_resolves() {
    let driver = Arc::new(SoftwareDriver::default());
    let context = context(&driver);
    let pipeline = compile(&context, "msaa", SampleCount::Count4);
    let target = msaa_target(&context);

    let mut encoder = context.create_command_encoder().unwrap();
    encoder.begin_render_pass(&target).unwrap();
    encoder.bind_pipeline(&pipeline).unwrap();
    encoder.draw(3, 1).unwrap();
    encoder.end_render_pass().unwrap();

    assert!(encoder.submit().is_ok());
    assert_eq!(driver.stats().draws, 1);
}

#[test]
fn test_sample_count_mismatch_is_rejected() {
    // --- 1. ARRANGE ---
    let driver = Arc::new(SoftwareDriver::default());
    let context = context(&driver);
    let pipeline = compile(&context, "msaa", SampleCount::Count4);
    let target = simple_target(&context);
    let mut encoder = context.create_command_encoder().unwrap();
    encoder.begin_render_pass(&target).unwrap();

    // --- 2. ACT ---
    let result = encoder.bind_pipeline(&pipeline);

    // --- 3. ASSERT ---
    assert!(
        matches!(result, Err(RenderError::IncompatibleRenderPass(_))),
        "A 4x pipeline cannot draw into a 1x target, got {result:?}"
    );
    assert!(encoder.draw(3, 1).is_err(), "Nothing is bound after a rejected bind");
}

#[test]
fn test_submit_inside_a_pass_fails() {
    let driver = Arc::new(SoftwareDriver::default());
    let context = context(&driver);
    let target = simple_target(&context);

    let mut encoder = context.create_command_encoder().unwrap();
    encoder.begin_render_pass(&target).unwrap();

    assert!(matches!(encoder.submit(), Err(RenderError::RenderingFailed(_))));
    assert_eq!(driver.stats().submissions, 0);
}

#[test]
fn test_undeclared_binding_is_rejected() {
    let driver = Arc::new(SoftwareDriver::default());
    let context = context(&driver);
    let pipeline = compile(&context, "triangle", SampleCount::Count1);
    let target = simple_target(&context);
    let mut uniforms = uniform_binding(&context);
    uniforms.binding = 7;

    let mut encoder = context.create_command_encoder().unwrap();
    encoder.begin_render_pass(&target).unwrap();
    encoder.bind_pipeline(&pipeline).unwrap();

    assert!(encoder.bind_resources(&[uniforms]).is_err());
}

// ─────────────────────────────────────────────────────────────────────────────
// Descriptor pools
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_descriptor_pools_grow_with_draws() {
    // --- 1. ARRANGE ---
    let driver = Arc::new(SoftwareDriver::default());
    let context = context_with(
        &driver,
        ContextSettings {
            max_sets_per_pool: 4,
            ..settings()
        },
    );
    let pipeline = compile(&context, "triangle", SampleCount::Count1);
    let target = simple_target(&context);
    let uniforms = uniform_binding(&context);

    // --- 2. ACT ---
    let mut encoder = context.create_command_encoder().unwrap();
    encoder.begin_render_pass(&target).unwrap();
    encoder.bind_pipeline(&pipeline).unwrap();
    for _ in 0..10 {
        encoder.bind_resources(&[uniforms.clone()]).unwrap();
        encoder.draw(3, 1).unwrap();
    }
    encoder.end_render_pass().unwrap();
    encoder.submit().unwrap();

    // --- 3. ASSERT ---
    let stats = driver.stats();
    assert_eq!(stats.descriptor_sets_allocated, 10);
    assert_eq!(
        stats.descriptor_pools_created, 3,
        "Four sets per pool means three pools for ten sets"
    );
    assert_eq!(stats.draws, 10);
}

// ─────────────────────────────────────────────────────────────────────────────
// Framebuffer fetch
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_input_attachment_barrier_is_covered_by_the_pass() {
    // --- 1. ARRANGE ---
    let driver = Arc::new(SoftwareDriver::default());
    let context = context(&driver);
    assert!(context.capabilities().supports_framebuffer_fetch());
    let pipeline = compile(&context, "blend", SampleCount::Count1);
    let target = simple_target(&context);

    // --- 2. ACT ---
    let mut encoder = context.create_command_encoder().unwrap();
    encoder.begin_render_pass(&target).unwrap();
    encoder.bind_pipeline(&pipeline).unwrap();
    encoder.draw(3, 1).unwrap();
    encoder.insert_input_attachment_barrier(0).unwrap();
    encoder.draw(3, 1).unwrap();
    encoder.end_render_pass().unwrap();
    let result = encoder.submit();

    // --- 3. ASSERT ---
    let stats = driver.stats();
    assert!(result.is_ok(), "Barrier was not covered: {:?}", stats.command_errors);
    assert_eq!(stats.pipeline_barriers, 1);
}

#[test]
fn test_broken_self_dependency_disables_framebuffer_fetch() {
    // --- 1. ARRANGE ---
    let driver = Arc::new(SoftwareDriver::default());
    let context = context_with(
        &driver,
        ContextSettings {
            workarounds: Workarounds {
                input_attachment_self_dependency_broken: true,
                ..Default::default()
            },
            ..settings()
        },
    );
    let pipeline = compile(&context, "plain", SampleCount::Count1);
    let target = simple_target(&context);

    // --- 2. ACT ---
    let mut encoder = context.create_command_encoder().unwrap();
    encoder.begin_render_pass(&target).unwrap();
    encoder.bind_pipeline(&pipeline).unwrap();
    let barrier = encoder.insert_input_attachment_barrier(0);

    // --- 3. ASSERT ---
    assert!(!context.capabilities().supports_framebuffer_fetch());
    assert!(barrier.is_err(), "No barrier may be recorded without a self-dependency");
    encoder.draw(3, 1).unwrap();
    encoder.end_render_pass().unwrap();
    assert!(encoder.submit().is_ok());
    assert_eq!(driver.stats().pipeline_barriers, 0);
}
