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

use super::{Allocator, Capabilities, PipelineLibrary, ShaderLibrary};
use std::fmt::Debug;
use std::sync::Arc;

/// The backend-selected entry point that owns every per-device service.
///
/// Each responsibility is its own interface. A context only hands them out.
pub trait Context: Send + Sync + Debug + 'static {
    /// Returns `false` if backend construction failed. An invalid context
    /// must not be used to create resources.
    fn is_valid(&self) -> bool;

    /// A human readable backend name.
    fn describe_gpu_model(&self) -> String;

    /// The resource allocator, or `None` if the context is invalid.
    fn resource_allocator(&self) -> Option<Arc<dyn Allocator>>;

    /// The registered shaders, or `None` if the context is invalid.
    fn shader_library(&self) -> Option<Arc<dyn ShaderLibrary>>;

    /// The pipeline compiler and cache, or `None` if the context is invalid.
    fn pipeline_library(&self) -> Option<Arc<dyn PipelineLibrary>>;

    /// What the device supports. Always available, even on an invalid
    /// context, since it is queried before the device is created.
    fn capabilities(&self) -> Arc<dyn Capabilities>;

    /// Stops accepting work. Pending pipeline futures resolve to `None`.
    fn shutdown(&self);
}
