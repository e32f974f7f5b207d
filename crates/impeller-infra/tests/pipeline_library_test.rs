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

//! Integration tests for pipeline compilation through a full context.
//!
//! These drive the pipeline library from several threads, across context
//! restarts and through shader hot-reload.

mod common;

use common::{context, context_with, settings, solid_fill, spirv_stub};
use impeller_core::renderer::{
    ComputePipelineDescriptor, Context, ContextSettings, Pipeline, SampleCount, ShaderFunction,
    ShaderStage,
};
use impeller_core::validation::validation_error_count;
use impeller_infra::graphics::vulkan::{
    FaultInjection, PipelineVK, SoftwareDriver, PIPELINE_CACHE_FILE_NAME,
};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

// ─────────────────────────────────────────────────────────────────────────────
// Deduplication
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_concurrent_requests_compile_once() {
    // --- 1. ARRANGE ---
    const THREADS: usize = 16;
    let driver = Arc::new(SoftwareDriver::default().with_compile_delay(Duration::from_millis(20)));
    let context = context(&driver);
    let library = context.pipeline_library().unwrap();
    let start = Arc::new(Barrier::new(THREADS));

    // --- 2. ACT ---
    // Every thread is spawned before any is joined so the requests overlap.
    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let library = library.clone();
            let start = start.clone();
            thread::spawn(move || {
                start.wait();
                let future = library.get_pipeline(solid_fill("solid", SampleCount::Count1));
                let pipeline = future.wait();
                (future, pipeline)
            })
        })
        .collect();
    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    // --- 3. ASSERT ---
    let (first_future, first_pipeline) = &results[0];
    let first_pipeline = first_pipeline.as_ref().expect("Pipeline should compile");
    assert!(first_pipeline.is_valid());
    for (future, pipeline) in &results[1..] {
        assert!(future.same_as(first_future), "Every request must share one future");
        let pipeline = pipeline.as_ref().expect("Pipeline should compile");
        assert!(Arc::ptr_eq(pipeline, first_pipeline), "Every request must see one pipeline");
    }
    assert_eq!(driver.stats().pipelines_created, 1, "Only one compilation may run");
}

#[test]
fn test_distinct_descriptors_compile_separately() {
    let driver = Arc::new(SoftwareDriver::default());
    let context = context(&driver);
    let library = context.pipeline_library().unwrap();

    let a = library.get_pipeline(solid_fill("a", SampleCount::Count1));
    let b = library.get_pipeline(solid_fill("b", SampleCount::Count1));

    assert!(!a.same_as(&b));
    assert!(a.wait().is_some());
    assert!(b.wait().is_some());
    assert_eq!(driver.stats().pipelines_created, 2);
}

// ─────────────────────────────────────────────────────────────────────────────
// Failure modes
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_driver_failure_resolves_to_none() {
    // --- 1. ARRANGE ---
    let driver = Arc::new(SoftwareDriver::default());
    let context = context(&driver);
    driver.set_faults(FaultInjection {
        fail_pipeline_creation: true,
        ..Default::default()
    });
    let before = validation_error_count();

    // --- 2. ACT ---
    let result = context
        .pipeline_library()
        .unwrap()
        .get_pipeline(solid_fill("broken", SampleCount::Count1))
        .wait();

    // --- 3. ASSERT ---
    assert!(result.is_none());
    assert!(validation_error_count() > before, "The failure must be reported");
}

#[test]
fn test_compute_pipelines_are_unavailable() {
    let driver = Arc::new(SoftwareDriver::default());
    let context = context(&driver);
    assert!(!context.capabilities().supports_compute());

    let mut descriptor = ComputePipelineDescriptor::new();
    descriptor
        .set_label("blur")
        .set_stage_entrypoint(ShaderFunction::new("blur", ShaderStage::Compute));
    let future = context.pipeline_library().unwrap().get_compute_pipeline(descriptor);

    assert!(future.is_ready());
    assert!(future.wait().is_none());
}

#[test]
fn test_shutdown_resolves_pending_futures() {
    // --- 1. ARRANGE ---
    let driver = Arc::new(SoftwareDriver::default().with_compile_delay(Duration::from_millis(50)));
    let context = context_with(
        &driver,
        ContextSettings {
            worker_count: 1,
            ..settings()
        },
    );
    let library = context.pipeline_library().unwrap();
    let futures: Vec<_> = (0..4)
        .map(|i| library.get_pipeline(solid_fill(&format!("pending-{i}"), SampleCount::Count1)))
        .collect();

    // --- 2. ACT ---
    context.shutdown();

    // --- 3. ASSERT ---
    for future in &futures {
        assert!(
            future.wait_timeout(Duration::from_secs(5)).is_some(),
            "Every future must resolve after shutdown"
        );
    }
    assert!(!context.is_valid());
}

// ─────────────────────────────────────────────────────────────────────────────
// Hot reload
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_hot_reload_recompiles_with_new_bytecode() {
    // --- 1. ARRANGE ---
    let driver = Arc::new(SoftwareDriver::default());
    let context = context(&driver);
    let library = context.pipeline_library().unwrap();
    let shaders = context.shader_library().unwrap();
    let first = library.get_pipeline(solid_fill("reload", SampleCount::Count1));
    let old_pipeline = first.wait().unwrap();

    // --- 2. ACT ---
    let fragment = shaders
        .register_function("solid_fill", ShaderStage::Fragment, spirv_stub(99).into())
        .unwrap();
    library.remove_pipelines_with_entry_point(&fragment);
    let second = library.get_pipeline(solid_fill("reload", SampleCount::Count1));

    // --- 3. ASSERT ---
    assert!(!second.same_as(&first), "Eviction must start a new compilation");
    let new_pipeline = second.wait().unwrap();
    assert!(!Arc::ptr_eq(&old_pipeline, &new_pipeline));
    assert!(old_pipeline.is_valid(), "Evicted pipelines stay usable by their holders");
    assert_eq!(driver.stats().pipelines_created, 2);
}

// ─────────────────────────────────────────────────────────────────────────────
// Persistent cache
// ─────────────────────────────────────────────────────────────────────────────

fn cached_settings(dir: &std::path::Path) -> ContextSettings {
    ContextSettings {
        cache_directory: Some(dir.to_path_buf()),
        ..settings()
    }
}

fn was_cache_hit(pipeline: &Arc<dyn Pipeline>) -> bool {
    pipeline
        .downcast_ref::<PipelineVK>()
        .is_some_and(PipelineVK::was_cache_hit)
}

#[test]
fn test_cache_survives_context_restart() {
    // --- 1. ARRANGE ---
    let dir = tempfile::tempdir().unwrap();
    {
        let driver = Arc::new(SoftwareDriver::default());
        let context = context_with(&driver, cached_settings(dir.path()));
        let pipeline = context
            .pipeline_library()
            .unwrap()
            .get_pipeline(solid_fill("cached", SampleCount::Count1))
            .wait()
            .unwrap();
        assert!(!was_cache_hit(&pipeline), "A cold cache cannot hit");
        // Dropping the context persists the cache.
    }
    assert!(dir.path().join(PIPELINE_CACHE_FILE_NAME).exists());

    // --- 2. ACT ---
    let driver = Arc::new(SoftwareDriver::default());
    let context = context_with(&driver, cached_settings(dir.path()));
    let pipeline = context
        .pipeline_library()
        .unwrap()
        .get_pipeline(solid_fill("cached", SampleCount::Count1))
        .wait()
        .unwrap();

    // --- 3. ASSERT ---
    assert!(was_cache_hit(&pipeline), "The restarted context should reuse the cache");
    assert_eq!(driver.stats().pipeline_cache_hits, 1);
}

#[test]
fn test_corrupt_cache_file_is_discarded() {
    // --- 1. ARRANGE ---
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join(PIPELINE_CACHE_FILE_NAME), b"definitely not a cache").unwrap();
    let before = validation_error_count();

    // --- 2. ACT ---
    let driver = Arc::new(SoftwareDriver::default());
    let context = context_with(&driver, cached_settings(dir.path()));

    // --- 3. ASSERT ---
    assert!(context.is_valid(), "A bad cache file must not fail context creation");
    assert!(validation_error_count() > before);
    assert!(context
        .pipeline_library()
        .unwrap()
        .get_pipeline(solid_fill("fresh", SampleCount::Count1))
        .wait()
        .is_some());
}

#[test]
fn test_flipped_byte_in_cache_file_is_detected() {
    // --- 1. ARRANGE ---
    let dir = tempfile::tempdir().unwrap();
    {
        let driver = Arc::new(SoftwareDriver::default());
        let context = context_with(&driver, cached_settings(dir.path()));
        context
            .pipeline_library()
            .unwrap()
            .get_pipeline(solid_fill("cached", SampleCount::Count1))
            .wait()
            .unwrap();
        context.flush_pipeline_cache().unwrap();
    }
    let path = dir.path().join(PIPELINE_CACHE_FILE_NAME);
    let mut bytes = std::fs::read(&path).unwrap();
    let last = bytes.len() - 1;
    bytes[last] ^= 0xFF;
    std::fs::write(&path, bytes).unwrap();
    let before = validation_error_count();

    // --- 2. ACT ---
    let driver = Arc::new(SoftwareDriver::default());
    let context = context_with(&driver, cached_settings(dir.path()));
    let pipeline = context
        .pipeline_library()
        .unwrap()
        .get_pipeline(solid_fill("cached", SampleCount::Count1))
        .wait()
        .unwrap();

    // --- 3. ASSERT ---
    assert!(context.is_valid());
    assert!(validation_error_count() > before, "The digest mismatch must be reported");
    assert!(!was_cache_hit(&pipeline), "A corrupt cache starts empty");
}

#[test]
fn test_cache_from_another_device_is_ignored() {
    let dir = tempfile::tempdir().unwrap();
    {
        let driver = Arc::new(SoftwareDriver::default());
        let context = context_with(&driver, cached_settings(dir.path()));
        context
            .pipeline_library()
            .unwrap()
            .get_pipeline(solid_fill("cached", SampleCount::Count1))
            .wait()
            .unwrap();
        context.flush_pipeline_cache().unwrap();
    }

    let mut profile = impeller_infra::graphics::vulkan::DeviceProfile::default();
    profile.properties.device_id += 1;
    let driver = Arc::new(SoftwareDriver::new(profile));
    let context = context_with(&driver, cached_settings(dir.path()));
    let pipeline = context
        .pipeline_library()
        .unwrap()
        .get_pipeline(solid_fill("cached", SampleCount::Count1))
        .wait()
        .unwrap();

    assert!(!was_cache_hit(&pipeline));
}
