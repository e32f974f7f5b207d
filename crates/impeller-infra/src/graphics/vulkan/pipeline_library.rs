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

//! Asynchronous, deduplicated pipeline compilation.

use super::device_holder::DeviceHolderVK;
use super::pipeline::PipelineVK;
use super::pipeline_cache::{PipelineCacheError, PipelineCacheVK};
use super::shader_library::ShaderLibraryVK;
use impeller_core::renderer::{
    pipeline_promise, ComputePipelineDescriptor, Pipeline, PipelineDescriptor, PipelineFuture,
    PipelineLibrary, PipelinePromise, PipelineResult, ShaderFunction,
};
use impeller_core::{validation_log, TaskRunner};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

/// Resolves the promise to `None` unless it was fulfilled first.
struct FulfillOnDrop(PipelinePromise);

impl Drop for FulfillOnDrop {
    fn drop(&mut self) {
        self.0.fulfill(None);
    }
}

#[derive(Debug)]
struct LibraryInner {
    device: Weak<DeviceHolderVK>,
    cache: Option<PipelineCacheVK>,
    shaders: Arc<ShaderLibraryVK>,
    framebuffer_fetch: bool,
    runner: Arc<dyn TaskRunner>,
    pipelines: Mutex<HashMap<PipelineDescriptor, PipelineFuture>>,
    // Evicted entries whose compilation may still be running.
    evicted: Mutex<HashMap<PipelineDescriptor, PipelineFuture>>,
    pending: Mutex<HashMap<u64, PipelinePromise>>,
    accepting: AtomicBool,
    next_job: AtomicU64,
}

impl LibraryInner {
    fn pipelines(&self) -> MutexGuard<'_, HashMap<PipelineDescriptor, PipelineFuture>> {
        self.pipelines.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn evicted(&self) -> MutexGuard<'_, HashMap<PipelineDescriptor, PipelineFuture>> {
        self.evicted.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn pending(&self) -> MutexGuard<'_, HashMap<u64, PipelinePromise>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn compile(&self, descriptor: &PipelineDescriptor) -> PipelineResult {
        let device = self.device.upgrade()?;
        let cache = self.cache.as_ref()?;
        let framebuffer_fetch = self.framebuffer_fetch;
        match PipelineVK::create(&device, cache, &self.shaders, descriptor, framebuffer_fetch) {
            Ok(pipeline) => Some(Arc::new(pipeline) as Arc<dyn Pipeline>),
            Err(error) => {
                validation_log!("Could not create pipeline '{}': {error}", descriptor.label());
                None
            }
        }
    }

    /// Stops accepting work and resolves every in-flight future to `None`.
    fn shutdown(&self) {
        self.accepting.store(false, Ordering::Release);
        let pending: Vec<_> = self.pending().drain().map(|(_, promise)| promise).collect();
        if !pending.is_empty() {
            log::debug!("Abandoning {} pipeline compilations.", pending.len());
        }
        for promise in pending {
            promise.fulfill(None);
        }
    }
}

impl Drop for LibraryInner {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Compiles pipelines on a task runner and caches the results by descriptor.
///
/// Value-equal descriptors share one [`PipelineFuture`], so at most one
/// compilation runs per descriptor. A descriptor requested again after
/// [`remove_pipelines_with_entry_point`](PipelineLibrary::remove_pipelines_with_entry_point)
/// evicted it mid-compilation recompiles only once the evicted compilation
/// has finished. Compilation tasks only hold a weak reference to the
/// library: dropping the library resolves every pending future to `None`.
#[derive(Debug)]
pub struct PipelineLibraryVK {
    inner: Arc<LibraryInner>,
}

impl PipelineLibraryVK {
    /// Creates the library and its pipeline cache.
    ///
    /// ## Arguments
    /// * `cache_directory` - Where the pipeline cache is read from and
    ///   persisted to. `None` keeps the cache in memory.
    /// * `framebuffer_fetch` - Whether pipelines are compiled for render
    ///   passes that read their color attachments.
    ///
    /// ## Returns
    /// The library. It is invalid if the pipeline cache could not be created.
    pub fn new(
        device: &Arc<DeviceHolderVK>,
        shaders: Arc<ShaderLibraryVK>,
        runner: Arc<dyn TaskRunner>,
        cache_directory: Option<&Path>,
        framebuffer_fetch: bool,
    ) -> Self {
        let cache = match PipelineCacheVK::new(device, cache_directory) {
            Ok(cache) => Some(cache),
            Err(error) => {
                validation_log!("Could not create pipeline cache: {error}");
                None
            }
        };
        Self {
            inner: Arc::new(LibraryInner {
                device: Arc::downgrade(device),
                cache,
                shaders,
                framebuffer_fetch,
                runner,
                pipelines: Mutex::new(HashMap::new()),
                evicted: Mutex::new(HashMap::new()),
                pending: Mutex::new(HashMap::new()),
                accepting: AtomicBool::new(true),
                next_job: AtomicU64::new(0),
            }),
        }
    }

    /// Writes the pipeline cache to disk. Does nothing without a cache
    /// directory.
    pub fn persist_cache(&self) -> Result<(), PipelineCacheError> {
        match &self.inner.cache {
            Some(cache) => cache.persist_to_disk(),
            None => Ok(()),
        }
    }

    /// The pipeline cache, if it could be created.
    pub fn pipeline_cache(&self) -> Option<&PipelineCacheVK> {
        self.inner.cache.as_ref()
    }

    /// The number of cached descriptors, including failed and in-flight ones.
    pub fn pipeline_count(&self) -> usize {
        self.inner.pipelines().len()
    }

    /// Stops accepting work. Every pending future resolves to `None`, and
    /// later requests resolve to `None` immediately.
    pub fn shutdown(&self) {
        self.inner.shutdown();
    }
}

impl PipelineLibrary for PipelineLibraryVK {
    fn is_valid(&self) -> bool {
        self.inner.cache.is_some() && self.inner.device.strong_count() > 0
    }

    fn get_pipeline(&self, descriptor: PipelineDescriptor) -> PipelineFuture {
        let inner = &self.inner;
        let mut pipelines = inner.pipelines();
        if let Some(future) = pipelines.get(&descriptor) {
            return future.clone();
        }
        if !inner.accepting.load(Ordering::Acquire) {
            log::warn!("Pipeline '{}' requested after shutdown.", descriptor.label());
            return PipelineFuture::ready(None);
        }

        let (promise, future) = pipeline_promise();
        pipelines.insert(descriptor.clone(), future.clone());
        let previous = inner
            .evicted()
            .remove(&descriptor)
            .filter(|previous| !previous.is_ready());
        drop(pipelines);

        let job = inner.next_job.fetch_add(1, Ordering::Relaxed);
        inner.pending().insert(job, promise.clone());

        let label = descriptor.label().to_string();
        let weak = Arc::downgrade(inner);
        let guard = FulfillOnDrop(promise);
        let posted = inner.runner.post_task(Box::new(move || {
            if let Some(previous) = previous {
                // Posted earlier, so it is already running on another worker.
                log::debug!(
                    "Pipeline '{}' waits for its evicted compilation.",
                    descriptor.label()
                );
                previous.wait();
            }
            let Some(inner) = weak.upgrade() else {
                return;
            };
            if inner.accepting.load(Ordering::Acquire) {
                let result = inner.compile(&descriptor);
                guard.0.fulfill(result);
            }
            inner.pending().remove(&job);
        }));
        if !posted {
            validation_log!("Could not schedule compilation of pipeline '{label}'.");
            inner.pending().remove(&job);
        }
        future
    }

    fn get_compute_pipeline(&self, descriptor: ComputePipelineDescriptor) -> PipelineFuture {
        log::warn!(
            "Compute pipeline '{}' requested, but compute is not supported.",
            descriptor.label()
        );
        PipelineFuture::ready(None)
    }

    fn remove_pipelines_with_entry_point(&self, function: &ShaderFunction) {
        let mut pipelines = self.inner.pipelines();
        let mut evicted = self.inner.evicted();
        evicted.retain(|_, future| !future.is_ready());
        let before = pipelines.len();
        pipelines.retain(|descriptor, future| {
            if !descriptor.uses_entry_point(function) {
                return true;
            }
            if !future.is_ready() {
                evicted.insert(descriptor.clone(), future.clone());
            }
            false
        });
        log::debug!(
            "Evicted {} pipelines using {function}.",
            before - pipelines.len()
        );
    }
}

impl Drop for PipelineLibraryVK {
    fn drop(&mut self) {
        self.inner.shutdown();
    }
}
