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

//! SPIR-V shader modules keyed by entry point and stage.

use super::device_holder::{with_device, DeviceHolderVK};
use super::shader_archive::ShaderArchive;
use ash::vk;
use impeller_core::renderer::{ShaderError, ShaderFunction, ShaderLibrary, ShaderStage};
use impeller_core::validation_log;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, Weak};

/// The first word of every SPIR-V module.
pub const SPIRV_MAGIC: u32 = 0x0723_0203;

/// A compiled shader module. Destroyed with the last reference.
#[derive(Debug)]
pub struct ShaderModuleVK {
    device: Weak<DeviceHolderVK>,
    module: vk::ShaderModule,
    code: Arc<[u8]>,
}

impl ShaderModuleVK {
    /// The module handle.
    pub fn module(&self) -> vk::ShaderModule {
        self.module
    }

    /// The SPIR-V the module was created from.
    pub fn code(&self) -> &[u8] {
        &self.code
    }
}

impl Drop for ShaderModuleVK {
    fn drop(&mut self) {
        with_device(&self.device, |device| {
            device.driver().destroy_shader_module(device.device(), self.module);
        });
    }
}

fn is_spirv(code: &[u8]) -> bool {
    code.len() >= 4
        && code.len() % 4 == 0
        && u32::from_le_bytes([code[0], code[1], code[2], code[3]]) == SPIRV_MAGIC
}

/// Registered SPIR-V modules keyed by `(name, stage)`.
#[derive(Debug)]
pub struct ShaderLibraryVK {
    device: Weak<DeviceHolderVK>,
    functions: RwLock<HashMap<(String, ShaderStage), Arc<ShaderModuleVK>>>,
}

impl ShaderLibraryVK {
    /// Creates an empty library.
    pub fn new(device: &Arc<DeviceHolderVK>) -> Self {
        Self {
            device: Arc::downgrade(device),
            functions: RwLock::new(HashMap::new()),
        }
    }

    /// Creates a library from archives. Entries that fail to register are
    /// logged and skipped.
    pub fn with_archives(device: &Arc<DeviceHolderVK>, archives: &[ShaderArchive]) -> Self {
        let library = Self::new(device);
        for archive in archives {
            let registered = library.register_archive(archive);
            log::debug!("Registered {registered} of {} shaders from archive.", archive.len());
        }
        library
    }

    /// Registers every shader of `archive`.
    ///
    /// ## Returns
    /// The number of shaders registered.
    pub fn register_archive(&self, archive: &ShaderArchive) -> usize {
        archive
            .iter()
            .filter(|(name, stage, code)| {
                self.register_function(name, *stage, Arc::clone(code)).is_ok()
            })
            .count()
    }

    /// The module registered for `function`.
    pub fn module_for(&self, function: &ShaderFunction) -> Option<Arc<ShaderModuleVK>> {
        self.functions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(function.name().to_string(), function.stage()))
            .cloned()
    }

    /// The number of registered functions.
    pub fn function_count(&self) -> usize {
        self.functions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl ShaderLibrary for ShaderLibraryVK {
    fn is_valid(&self) -> bool {
        self.device.strong_count() > 0
    }

    fn get_function(&self, name: &str, stage: ShaderStage) -> Option<ShaderFunction> {
        self.functions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&(name.to_string(), stage))
            .then(|| ShaderFunction::new(name, stage))
    }

    fn register_function(
        &self,
        name: &str,
        stage: ShaderStage,
        code: Arc<[u8]>,
    ) -> Result<ShaderFunction, ShaderError> {
        if !is_spirv(&code) {
            validation_log!("Shader '{name}' ({stage}) is not a SPIR-V module.");
            return Err(ShaderError::InvalidBytecode {
                name: name.to_string(),
                stage,
                reason: "missing SPIR-V magic number".to_string(),
            });
        }
        let Some(device) = self.device.upgrade() else {
            return Err(ShaderError::ModuleCreationFailed {
                name: name.to_string(),
                details: vk::Result::ERROR_DEVICE_LOST.to_string(),
            });
        };

        let module = device
            .driver()
            .create_shader_module(device.device(), &code)
            .map_err(|error| {
                validation_log!("Could not create shader module '{name}' ({stage}): {error}");
                ShaderError::ModuleCreationFailed {
                    name: name.to_string(),
                    details: error.to_string(),
                }
            })?;
        let module = Arc::new(ShaderModuleVK {
            device: Arc::downgrade(&device),
            module,
            code,
        });

        let replaced = self
            .functions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert((name.to_string(), stage), module)
            .is_some();
        if replaced {
            log::debug!("Shader '{name}' ({stage}) replaced.");
        }
        Ok(ShaderFunction::new(name, stage))
    }

    fn unregister_function(&self, name: &str, stage: ShaderStage) -> bool {
        self.functions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&(name.to_string(), stage))
            .is_some()
    }
}

/// A five-word module header. `seed` makes modules distinguishable.
#[cfg(test)]
pub(crate) fn spirv_stub(seed: u32) -> Vec<u8> {
    [SPIRV_MAGIC, 0x0001_0000, seed, 1, 0]
        .iter()
        .flat_map(|word| word.to_le_bytes())
        .collect()
}
