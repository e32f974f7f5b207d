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

//! Ownership of the logical device.

use super::driver::VulkanDriver;
use super::instance::InstanceVK;
use ash::vk;
use std::ffi::CStr;
use std::sync::{Arc, Weak};

/// Owns the logical device. The device is destroyed when the last strong
/// reference goes away.
///
/// Resources keep a [`Weak`] reference and skip their own destruction when
/// the device is already gone.
#[derive(Debug)]
pub struct DeviceHolderVK {
    instance: Arc<InstanceVK>,
    device: vk::Device,
}

impl DeviceHolderVK {
    /// Creates the logical device.
    pub fn create(instance: Arc<InstanceVK>, extensions: &[&CStr]) -> Result<Self, vk::Result> {
        let device = instance.driver().create_device(extensions)?;
        log::info!("Logical device {device:?} created with extensions {extensions:?}.");
        Ok(Self { instance, device })
    }

    /// The device handle.
    pub fn device(&self) -> vk::Device {
        self.device
    }

    /// The driver entry points.
    pub fn driver(&self) -> &dyn VulkanDriver {
        self.instance.driver().as_ref()
    }

    /// The owning instance.
    pub fn instance(&self) -> &Arc<InstanceVK> {
        &self.instance
    }
}

impl Drop for DeviceHolderVK {
    fn drop(&mut self) {
        log::debug!("Destroying logical device {:?}.", self.device);
        self.driver().destroy_device(self.device);
    }
}

/// Runs `f` with the device if it is still alive.
pub(crate) fn with_device(holder: &Weak<DeviceHolderVK>, f: impl FnOnce(&DeviceHolderVK)) {
    match holder.upgrade() {
        Some(device) => f(&device),
        None => log::trace!("Device already destroyed, skipping release."),
    }
}
