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

//! The process-wide Vulkan instance and its retention policy.
//!
//! Contexts created on the same driver share one [`InstanceVK`]. Whether the
//! instance outlives its last context is decided by
//! [`InstanceRetention`]: by default it is released with the last context,
//! and [`InstanceRetention::KeepAliveForProcess`] pins it until the process
//! exits.

use super::driver::VulkanDriver;
use impeller_core::renderer::InstanceRetention;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError, Weak};

static NEXT_INSTANCE_ID: AtomicU64 = AtomicU64::new(1);

/// A loaded driver, shared by every context created on it.
#[derive(Debug)]
pub struct InstanceVK {
    id: u64,
    driver: Arc<dyn VulkanDriver>,
    validation_enabled: bool,
}

impl InstanceVK {
    fn new(driver: Arc<dyn VulkanDriver>, validation_enabled: bool) -> Self {
        let id = NEXT_INSTANCE_ID.fetch_add(1, Ordering::Relaxed);
        log::info!("Created Vulkan instance #{id} (validation: {validation_enabled}).");
        Self {
            id,
            driver,
            validation_enabled,
        }
    }

    /// A process-unique id.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// The driver entry points.
    pub fn driver(&self) -> &Arc<dyn VulkanDriver> {
        &self.driver
    }

    /// Whether validation was requested when the instance was created.
    pub fn validation_enabled(&self) -> bool {
        self.validation_enabled
    }

    fn uses_driver(&self, driver: &Arc<dyn VulkanDriver>) -> bool {
        std::ptr::addr_eq(Arc::as_ptr(&self.driver), Arc::as_ptr(driver))
    }
}

impl Drop for InstanceVK {
    fn drop(&mut self) {
        log::debug!("Released Vulkan instance #{}.", self.id);
    }
}

#[derive(Debug, Default)]
struct RegistryState {
    current: Weak<InstanceVK>,
    pinned: Vec<Arc<InstanceVK>>,
}

/// Hands out the shared instance for a driver.
#[derive(Debug, Default)]
pub struct InstanceRegistry {
    state: Mutex<RegistryState>,
}

impl InstanceRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// The registry used by [`ContextVK::create`](super::ContextVK::create).
    pub fn global() -> &'static InstanceRegistry {
        static GLOBAL: OnceLock<InstanceRegistry> = OnceLock::new();
        GLOBAL.get_or_init(InstanceRegistry::new)
    }

    /// Returns the live instance for `driver`, creating it if needed.
    ///
    /// ## Arguments
    /// * `driver` - The driver the instance wraps.
    /// * `validation` - Requested validation, only honored on creation.
    /// * `retention` - If `KeepAliveForProcess`, the registry keeps a strong
    ///   reference so the instance survives its last context.
    pub fn acquire(
        &self,
        driver: &Arc<dyn VulkanDriver>,
        validation: bool,
        retention: InstanceRetention,
    ) -> Arc<InstanceVK> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);

        let instance = match state.current.upgrade() {
            Some(existing) if existing.uses_driver(driver) => existing,
            _ => {
                let created = Arc::new(InstanceVK::new(driver.clone(), validation));
                state.current = Arc::downgrade(&created);
                created
            }
        };

        if retention == InstanceRetention::KeepAliveForProcess
            && !state.pinned.iter().any(|p| Arc::ptr_eq(p, &instance))
        {
            state.pinned.push(instance.clone());
        }
        instance
    }

    /// Returns `true` if an instance is currently alive.
    pub fn has_live_instance(&self) -> bool {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .current
            .strong_count()
            > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graphics::vulkan::software_driver::SoftwareDriver;

    fn driver() -> Arc<dyn VulkanDriver> {
        Arc::new(SoftwareDriver::default())
    }

    #[test]
    fn test_instance_is_shared_and_released_with_last_user() {
        // --- 1. ARRANGE ---
        let registry = InstanceRegistry::new();
        let driver = driver();

        // --- 2. ACT ---
        let a = registry.acquire(&driver, false, InstanceRetention::ReleaseWithLastContext);
        let b = registry.acquire(&driver, false, InstanceRetention::ReleaseWithLastContext);

        // --- 3. ASSERT ---
        assert_eq!(a.id(), b.id(), "Contexts on one driver should share the instance");
        drop((a, b));
        assert!(!registry.has_live_instance(), "The instance should go away with its users");
    }

    #[test]
    fn test_keep_alive_pins_the_instance() {
        let registry = InstanceRegistry::new();
        let driver = driver();
        let id = registry
            .acquire(&driver, false, InstanceRetention::KeepAliveForProcess)
            .id();

        assert!(registry.has_live_instance());
        let again = registry.acquire(&driver, false, InstanceRetention::ReleaseWithLastContext);
        assert_eq!(again.id(), id);
    }
}
