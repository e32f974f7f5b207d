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

//! The rendering context tying the backend together.

use super::allocator::AllocatorVK;
use super::capabilities::CapabilitiesVK;
use super::command_encoder::CommandEncoderVK;
use super::device_holder::DeviceHolderVK;
use super::driver::VulkanDriver;
use super::fence_waiter::FenceWaiterVK;
use super::instance::{InstanceRegistry, InstanceVK};
use super::pipeline_cache::PipelineCacheError;
use super::pipeline_library::PipelineLibraryVK;
use super::shader_library::ShaderLibraryVK;
use anyhow::{bail, Context as _};
use impeller_core::renderer::{
    Allocator, Capabilities, Context, ContextSettings, PipelineLibrary, RenderError, ShaderLibrary,
};
use impeller_core::{validation_log, ConcurrentTaskRunner};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Everything that only exists on a valid context.
///
/// Field order is drop order: the fence waiter retires in-flight work
/// before the device goes.
#[derive(Debug)]
struct Services {
    runner: Arc<ConcurrentTaskRunner>,
    pipeline_library: Arc<PipelineLibraryVK>,
    shader_library: Arc<ShaderLibraryVK>,
    allocator: Arc<AllocatorVK>,
    fence_waiter: Arc<FenceWaiterVK>,
    device: Arc<DeviceHolderVK>,
}

/// The Vulkan-family rendering context.
///
/// Construction never fails outright: if any step goes wrong the context is
/// created invalid, with only its capabilities available.
#[derive(Debug)]
pub struct ContextVK {
    capabilities: Arc<CapabilitiesVK>,
    services: Option<Services>,
    settings: ContextSettings,
    shut_down: AtomicBool,
}

impl ContextVK {
    /// Creates a context on `driver`, sharing the process-wide instance.
    pub fn create(driver: Arc<dyn VulkanDriver>, settings: ContextSettings) -> Arc<Self> {
        Self::create_with_registry(InstanceRegistry::global(), driver, settings)
    }

    /// Creates a context whose instance comes from `registry`.
    pub fn create_with_registry(
        registry: &InstanceRegistry,
        driver: Arc<dyn VulkanDriver>,
        settings: ContextSettings,
    ) -> Arc<Self> {
        log::info!("Initializing Vulkan context...");
        let instance =
            registry.acquire(&driver, settings.enable_validation, settings.instance_retention);
        let capabilities = Arc::new(CapabilitiesVK::new(driver.as_ref(), &settings.workarounds));

        let services = match Self::create_services(instance, &capabilities, &settings) {
            Ok(services) => {
                log::info!("Vulkan context ready on \"{}\".", capabilities.device_name());
                Some(services)
            }
            Err(error) => {
                validation_log!("Could not create Vulkan context: {error:#}");
                None
            }
        };

        Arc::new(Self {
            capabilities,
            services,
            settings,
            shut_down: AtomicBool::new(false),
        })
    }

    fn create_services(
        instance: Arc<InstanceVK>,
        capabilities: &CapabilitiesVK,
        settings: &ContextSettings,
    ) -> anyhow::Result<Services> {
        // --- 1. Check Capabilities ---
        if !capabilities.is_valid() {
            bail!(
                "device \"{}\" lacks a required extension or format",
                capabilities.device_name()
            );
        }

        // --- 2. Create Logical Device ---
        let extensions = capabilities.enabled_device_extensions();
        let device = Arc::new(
            DeviceHolderVK::create(instance, &extensions)
                .context("Failed to create logical device")?,
        );

        // --- 3. Start the Fence Waiter ---
        let fence_waiter = Arc::new(
            FenceWaiterVK::new(&device).context("Failed to start the fence waiter")?,
        );

        // --- 4. Create Allocator ---
        let allocator = Arc::new(AllocatorVK::new(
            &device,
            capabilities.supports_device_transient_textures(),
            capabilities.max_texture_size(),
            settings.buffer_pool_block_size,
        ));

        // --- 5. Create Shader and Pipeline Libraries ---
        let runner = Arc::new(ConcurrentTaskRunner::new(
            "impeller.pipeline",
            settings.worker_count,
        ));
        let shader_library = Arc::new(ShaderLibraryVK::new(&device));
        let pipeline_library = Arc::new(PipelineLibraryVK::new(
            &device,
            shader_library.clone(),
            runner.clone(),
            settings.cache_directory.as_deref(),
            capabilities.supports_framebuffer_fetch(),
        ));
        if !pipeline_library.is_valid() {
            bail!("pipeline library could not be created");
        }

        Ok(Services {
            runner,
            pipeline_library,
            shader_library,
            allocator,
            fence_waiter,
            device,
        })
    }

    fn services(&self) -> Option<&Services> {
        if self.shut_down.load(Ordering::Acquire) {
            return None;
        }
        self.services.as_ref()
    }

    /// The logical device.
    pub fn device_holder(&self) -> Option<&Arc<DeviceHolderVK>> {
        self.services().map(|s| &s.device)
    }

    /// The concrete allocator.
    pub fn allocator_vk(&self) -> Option<&Arc<AllocatorVK>> {
        self.services().map(|s| &s.allocator)
    }

    /// The concrete shader library.
    pub fn shader_library_vk(&self) -> Option<&Arc<ShaderLibraryVK>> {
        self.services().map(|s| &s.shader_library)
    }

    /// The concrete pipeline library.
    pub fn pipeline_library_vk(&self) -> Option<&Arc<PipelineLibraryVK>> {
        self.services().map(|s| &s.pipeline_library)
    }

    /// Retires submitted command buffers.
    pub fn fence_waiter(&self) -> Option<&Arc<FenceWaiterVK>> {
        self.services().map(|s| &s.fence_waiter)
    }

    /// The concrete capabilities.
    pub fn capabilities_vk(&self) -> &Arc<CapabilitiesVK> {
        &self.capabilities
    }

    /// The settings the context was created with.
    pub fn settings(&self) -> &ContextSettings {
        &self.settings
    }

    /// Starts recording a command buffer.
    ///
    /// ## Errors
    /// * `RenderError::InvalidContext` - If the context is invalid or shut down.
    pub fn create_command_encoder(&self) -> Result<CommandEncoderVK, RenderError> {
        let services = self.services().ok_or(RenderError::InvalidContext)?;
        CommandEncoderVK::new(
            &services.device,
            &services.fence_waiter,
            self.settings.max_sets_per_pool,
            self.capabilities.supports_framebuffer_fetch(),
        )
    }

    /// Writes the pipeline cache to the cache directory, if one is configured.
    pub fn flush_pipeline_cache(&self) -> Result<(), PipelineCacheError> {
        match self.services.as_ref() {
            Some(services) => services.pipeline_library.persist_cache(),
            None => Ok(()),
        }
    }
}

impl Context for ContextVK {
    fn is_valid(&self) -> bool {
        self.services().is_some()
    }

    fn describe_gpu_model(&self) -> String {
        self.capabilities.device_name().to_string()
    }

    fn resource_allocator(&self) -> Option<Arc<dyn Allocator>> {
        self.services()
            .map(|s| s.allocator.clone() as Arc<dyn Allocator>)
    }

    fn shader_library(&self) -> Option<Arc<dyn ShaderLibrary>> {
        self.services()
            .map(|s| s.shader_library.clone() as Arc<dyn ShaderLibrary>)
    }

    fn pipeline_library(&self) -> Option<Arc<dyn PipelineLibrary>> {
        self.services()
            .map(|s| s.pipeline_library.clone() as Arc<dyn PipelineLibrary>)
    }

    fn capabilities(&self) -> Arc<dyn Capabilities> {
        self.capabilities.clone()
    }

    fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return;
        }
        let Some(services) = &self.services else {
            return;
        };
        log::info!("Shutting down Vulkan context.");
        if let Err(error) = services.pipeline_library.persist_cache() {
            log::warn!("Could not persist the pipeline cache: {error}");
        }
        services.pipeline_library.shutdown();
        services.runner.shutdown();
        services.fence_waiter.terminate();
    }
}

impl Drop for ContextVK {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graphics::vulkan::driver::KHR_SWAPCHAIN;
    use crate::graphics::vulkan::software_driver::{DeviceProfile, SoftwareDriver};

    fn settings() -> ContextSettings {
        ContextSettings {
            worker_count: 1,
            enable_validation: false,
            ..Default::default()
        }
    }

    #[test]
    fn test_default_device_creates_a_valid_context() {
        let _ = env_logger::builder().is_test(true).try_init();
        let driver: Arc<dyn VulkanDriver> = Arc::new(SoftwareDriver::default());
        let context =
            ContextVK::create_with_registry(&InstanceRegistry::new(), driver, settings());

        assert!(context.is_valid());
        assert!(context.resource_allocator().is_some());
        assert!(context.shader_library().is_some());
        assert!(context.pipeline_library().is_some_and(|l| l.is_valid()));
        assert_eq!(context.describe_gpu_model(), "Impeller Software Rasterizer");
    }

    #[test]
    fn test_missing_swapchain_makes_the_context_invalid() {
        // --- 1. ARRANGE ---
        let profile = DeviceProfile::default().without_extension(KHR_SWAPCHAIN);
        let driver = Arc::new(SoftwareDriver::new(profile));

        // --- 2. ACT ---
        let context =
            ContextVK::create_with_registry(&InstanceRegistry::new(), driver.clone(), settings());

        // --- 3. ASSERT ---
        assert!(!context.is_valid());
        assert!(context.resource_allocator().is_none());
        assert!(context.pipeline_library().is_none());
        assert!(!context.capabilities().is_valid(), "Capabilities stay queryable");
        assert_eq!(driver.stats().devices_created, 0);
        assert!(matches!(
            context.create_command_encoder(),
            Err(RenderError::InvalidContext)
        ));
    }

    #[test]
    fn test_shutdown_is_idempotent_and_invalidates() {
        let driver: Arc<dyn VulkanDriver> = Arc::new(SoftwareDriver::default());
        let context =
            ContextVK::create_with_registry(&InstanceRegistry::new(), driver, settings());
        context.shutdown();
        context.shutdown();
        assert!(!context.is_valid());
        assert!(context.pipeline_library().is_none());
    }

    #[test]
    fn test_submitted_work_is_released_only_after_its_fence() {
        // --- 1. ARRANGE ---
        let driver = Arc::new(SoftwareDriver::default());
        let dyn_driver: Arc<dyn VulkanDriver> = driver.clone();
        let context =
            ContextVK::create_with_registry(&InstanceRegistry::new(), dyn_driver, settings());

        // --- 2. ACT ---
        for _ in 0..3 {
            context.create_command_encoder().unwrap().submit().unwrap();
        }
        context.shutdown();

        // --- 3. ASSERT ---
        let stats = driver.stats();
        assert_eq!(stats.submissions, 3);
        assert_eq!(stats.fences_waited, 3, "Every submission is waited on before release");
        assert_eq!(stats.objects_destroyed_in_flight, 0);
        assert_eq!(driver.pending_submissions(), 0);
    }
}
