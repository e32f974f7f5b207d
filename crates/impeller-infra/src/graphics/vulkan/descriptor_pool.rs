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

//! Descriptor set allocation.

use super::device_holder::{with_device, DeviceHolderVK};
use super::driver::VkResult;
use ash::vk;
use std::sync::{Arc, Weak};

/// Descriptors of each type budgeted per set.
const DESCRIPTORS_PER_SET: u32 = 4;

const POOLED_TYPES: [vk::DescriptorType; 6] = [
    vk::DescriptorType::SAMPLER,
    vk::DescriptorType::UNIFORM_BUFFER,
    vk::DescriptorType::STORAGE_BUFFER,
    vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
    vk::DescriptorType::STORAGE_IMAGE,
    vk::DescriptorType::INPUT_ATTACHMENT,
];

/// A growable set of descriptor pools, owned by one command encoder.
///
/// Sets are never freed individually. Every pool is destroyed, with the sets
/// allocated from it, when the `DescriptorPoolVK` is dropped.
#[derive(Debug)]
pub struct DescriptorPoolVK {
    device: Weak<DeviceHolderVK>,
    max_sets_per_pool: u32,
    pools: Vec<vk::DescriptorPool>,
}

impl DescriptorPoolVK {
    /// Creates an empty pool. The first backing pool is created lazily.
    pub fn new(device: &Arc<DeviceHolderVK>, max_sets_per_pool: u32) -> Self {
        Self {
            device: Arc::downgrade(device),
            max_sets_per_pool: max_sets_per_pool.max(1),
            pools: Vec::new(),
        }
    }

    /// Allocates a set for `layout`.
    ///
    /// When the current backing pool is exhausted a new one is created and
    /// the allocation is retried once.
    ///
    /// ## Errors
    /// * `ERROR_DEVICE_LOST` - If the device is gone.
    /// * Any error from the driver on the retry.
    pub fn allocate_descriptor_set(
        &mut self,
        layout: vk::DescriptorSetLayout,
    ) -> VkResult<vk::DescriptorSet> {
        let device = self.device.upgrade().ok_or(vk::Result::ERROR_DEVICE_LOST)?;
        let pool = match self.pools.last() {
            Some(pool) => *pool,
            None => self.grow(&device)?,
        };

        match device.driver().allocate_descriptor_set(device.device(), pool, layout) {
            Err(vk::Result::ERROR_OUT_OF_POOL_MEMORY | vk::Result::ERROR_FRAGMENTED_POOL) => {
                log::debug!("Descriptor pool {pool:?} exhausted, growing.");
                let pool = self.grow(&device)?;
                device.driver().allocate_descriptor_set(device.device(), pool, layout)
            }
            result => result,
        }
    }

    /// The number of backing pools created so far.
    pub fn pool_count(&self) -> usize {
        self.pools.len()
    }

    fn grow(&mut self, device: &DeviceHolderVK) -> VkResult<vk::DescriptorPool> {
        let sizes = POOLED_TYPES.map(|ty| vk::DescriptorPoolSize {
            ty,
            descriptor_count: self.max_sets_per_pool * DESCRIPTORS_PER_SET,
        });
        let pool =
            device
                .driver()
                .create_descriptor_pool(device.device(), self.max_sets_per_pool, &sizes)?;
        self.pools.push(pool);
        Ok(pool)
    }
}

impl Drop for DescriptorPoolVK {
    fn drop(&mut self) {
        with_device(&self.device, |device| {
            for pool in self.pools.drain(..) {
                device.driver().destroy_descriptor_pool(device.device(), pool);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graphics::vulkan::driver::{VulkanDriver, KHR_SWAPCHAIN};
    use crate::graphics::vulkan::instance::InstanceRegistry;
    use crate::graphics::vulkan::software_driver::SoftwareDriver;
    use impeller_core::renderer::InstanceRetention;

    fn setup() -> (Arc<SoftwareDriver>, Arc<DeviceHolderVK>) {
        let driver = Arc::new(SoftwareDriver::default());
        let dyn_driver: Arc<dyn VulkanDriver> = driver.clone();
        let instance = InstanceRegistry::new().acquire(
            &dyn_driver,
            false,
            InstanceRetention::ReleaseWithLastContext,
        );
        let device = Arc::new(DeviceHolderVK::create(instance, &[KHR_SWAPCHAIN]).unwrap());
        (driver, device)
    }

    fn uniform_layout(device: &DeviceHolderVK) -> vk::DescriptorSetLayout {
        device
            .driver()
            .create_descriptor_set_layout(
                device.device(),
                &[vk::DescriptorSetLayoutBinding::default()
                    .binding(0)
                    .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
                    .descriptor_count(1)
                    .stage_flags(vk::ShaderStageFlags::VERTEX)],
            )
            .unwrap()
    }

    #[test]
    fn test_pool_grows_when_exhausted() {
        // --- 1. ARRANGE ---
        let (driver, device) = setup();
        let layout = uniform_layout(&device);
        let mut pool = DescriptorPoolVK::new(&device, 2);

        // --- 2. ACT ---
        let sets: Vec<_> = (0..5)
            .map(|_| pool.allocate_descriptor_set(layout).unwrap())
            .collect();

        // --- 3. ASSERT ---
        assert_eq!(sets.len(), 5);
        assert_eq!(
            pool.pool_count(),
            3,
            "Two sets per pool means three pools for five sets"
        );
        assert_eq!(driver.stats().descriptor_pools_created, 3);
    }

    #[test]
    fn test_first_pool_is_lazy() {
        let (_driver, device) = setup();
        let pool = DescriptorPoolVK::new(&device, 8);
        assert_eq!(pool.pool_count(), 0);
    }

    #[test]
    fn test_dead_device_is_reported() {
        let (driver, device) = setup();
        let layout = uniform_layout(&device);
        let mut pool = DescriptorPoolVK::new(&device, 8);
        pool.allocate_descriptor_set(layout).unwrap();
        device.driver().destroy_descriptor_set_layout(device.device(), layout);
        drop(device);

        assert_eq!(pool.allocate_descriptor_set(layout), Err(vk::Result::ERROR_DEVICE_LOST));
        drop(pool);
        assert_eq!(driver.stats().calls_on_destroyed_device, 0);
    }
}
