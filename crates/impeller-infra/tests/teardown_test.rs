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

//! Integration tests for context creation failures and teardown order.

mod common;

use ash::vk;
use common::{context, settings, simple_target, solid_fill};
use impeller_core::renderer::{
    Context, ContextSettings, DeviceBufferDescriptor, InstanceRetention, SampleCount,
};
use impeller_infra::graphics::vulkan::{
    DeviceProfile, FaultInjection, InstanceRegistry, SoftwareDriver, VulkanDriver,
};
use impeller_infra::ContextVK;
use std::sync::Arc;

// ─────────────────────────────────────────────────────────────────────────────
// Invalid contexts
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_device_creation_failure_gives_an_invalid_context() {
    // --- 1. ARRANGE ---
    let driver = Arc::new(SoftwareDriver::default());
    driver.set_faults(FaultInjection {
        fail_device_creation: true,
        ..Default::default()
    });

    // --- 2. ACT ---
    let context = context(&driver);

    // --- 3. ASSERT ---
    assert!(!context.is_valid());
    assert!(context.capabilities().is_valid(), "Capabilities were queried before the device");
    assert!(context.resource_allocator().is_none());
    assert!(context.shader_library().is_none());
    assert!(context.pipeline_library().is_none());
    assert!(context.create_command_encoder().is_err());
}

#[test]
fn test_missing_color_format_gives_an_invalid_context() {
    let profile = DeviceProfile::default()
        .without_format(vk::Format::R8G8B8A8_UNORM)
        .without_format(vk::Format::B8G8R8A8_UNORM);
    let driver = Arc::new(SoftwareDriver::new(profile));

    let context = context(&driver);

    assert!(!context.is_valid());
    assert!(!context.capabilities().is_valid());
    assert_eq!(driver.stats().devices_created, 0);
}

// ─────────────────────────────────────────────────────────────────────────────
// Teardown
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_context_releases_everything_it_created() {
    // --- 1. ARRANGE ---
    let driver = Arc::new(SoftwareDriver::default());
    let context = context(&driver);
    {
        let pipeline = context
            .pipeline_library()
            .unwrap()
            .get_pipeline(solid_fill("teardown", SampleCount::Count1))
            .wait()
            .unwrap();
        let target = simple_target(&context);
        let mut encoder = context.create_command_encoder().unwrap();
        encoder.begin_render_pass(&target).unwrap();
        encoder.bind_pipeline(&pipeline).unwrap();
        encoder.draw(3, 1).unwrap();
        encoder.end_render_pass().unwrap();
        encoder.submit().unwrap();
    }

    // --- 2. ACT ---
    drop(context);

    // --- 3. ASSERT ---
    let stats = driver.stats();
    assert_eq!(
        stats.objects_leaked_at_device_destroy, 0,
        "Every object must die before its device"
    );
    assert_eq!(stats.calls_on_destroyed_device, 0);
    assert_eq!(stats.live_memory_bytes, 0);
}

#[test]
fn test_resources_outliving_the_context_skip_their_release() {
    // --- 1. ARRANGE ---
    let driver = Arc::new(SoftwareDriver::default());
    let context = context(&driver);
    let pipeline = context
        .pipeline_library()
        .unwrap()
        .get_pipeline(solid_fill("survivor", SampleCount::Count1))
        .wait()
        .unwrap();
    let buffer = context
        .resource_allocator()
        .unwrap()
        .create_buffer(&DeviceBufferDescriptor::host_visible(256))
        .unwrap();
    let target = simple_target(&context);

    // --- 2. ACT ---
    drop(context);
    assert!(!pipeline.is_valid(), "A pipeline is invalid once its device is gone");
    assert!(buffer.write(0, &[1, 2, 3]).is_err());
    drop(pipeline);
    drop(buffer);
    drop(target);

    // --- 3. ASSERT ---
    assert_eq!(
        driver.stats().calls_on_destroyed_device,
        0,
        "Releases after device destruction must be skipped"
    );
}

#[test]
fn test_encoder_outliving_the_context_reports_device_lost() {
    let driver = Arc::new(SoftwareDriver::default());
    let context = context(&driver);
    let encoder = context.create_command_encoder().unwrap();

    drop(context);

    assert!(encoder.submit().is_err());
    assert_eq!(driver.stats().calls_on_destroyed_device, 0);
}

// ─────────────────────────────────────────────────────────────────────────────
// Instance retention
// ─────────────────────────────────────────────────────────────────────────────

fn context_in(
    registry: &InstanceRegistry,
    driver: &Arc<SoftwareDriver>,
    retention: InstanceRetention,
) -> Arc<ContextVK> {
    let dyn_driver: Arc<dyn VulkanDriver> = driver.clone();
    ContextVK::create_with_registry(
        registry,
        dyn_driver,
        ContextSettings {
            instance_retention: retention,
            ..settings()
        },
    )
}

#[test]
fn test_contexts_share_one_instance() {
    let registry = InstanceRegistry::new();
    let driver = Arc::new(SoftwareDriver::default());

    let first = context_in(&registry, &driver, InstanceRetention::ReleaseWithLastContext);
    let second = context_in(&registry, &driver, InstanceRetention::ReleaseWithLastContext);

    let instance = |c: &ContextVK| c.device_holder().unwrap().instance().id();
    assert_eq!(instance(&first), instance(&second));
    drop(first);
    assert!(registry.has_live_instance(), "The second context keeps the instance alive");
    drop(second);
    assert!(!registry.has_live_instance());
}

#[test]
fn test_keep_alive_instance_outlives_its_contexts() {
    let registry = InstanceRegistry::new();
    let driver = Arc::new(SoftwareDriver::default());

    let context = context_in(&registry, &driver, InstanceRetention::KeepAliveForProcess);
    drop(context);

    assert!(registry.has_live_instance());
}
