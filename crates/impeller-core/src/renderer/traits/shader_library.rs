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

use crate::renderer::api::shader::{ShaderFunction, ShaderStage};
use crate::renderer::error::ShaderError;
use std::fmt::Debug;
use std::sync::Arc;

/// Registered shader bytecode, keyed by `(name, stage)`.
pub trait ShaderLibrary: Send + Sync + Debug + 'static {
    /// Returns `false` if the library could not be created.
    fn is_valid(&self) -> bool;

    /// Looks up a registered function.
    /// ## Returns
    /// The function handle, or `None` if nothing is registered under
    /// `name` for `stage`.
    fn get_function(&self, name: &str, stage: ShaderStage) -> Option<ShaderFunction>;

    /// Registers one function, replacing any previous bytecode for the same
    /// name and stage.
    /// ## Errors
    /// * `ShaderError::InvalidBytecode` - If the blob is not valid for this backend.
    /// * `ShaderError::ModuleCreationFailed` - If the driver rejected the module.
    fn register_function(
        &self,
        name: &str,
        stage: ShaderStage,
        code: Arc<[u8]>,
    ) -> Result<ShaderFunction, ShaderError>;

    /// Removes a function. Returns `true` if it was registered.
    fn unregister_function(&self, name: &str, stage: ShaderStage) -> bool;
}
