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

//! Provides the public, backend-agnostic rendering contracts.
//!
//! This module defines the "common language" shared by every backend: the
//! abstract `traits` (like [`PipelineLibrary`]), data structures (like
//! [`PipelineDescriptor`]), settings, and error types.
//!
//! This module defines the 'what' of rendering. The 'how' lives in a
//! concrete backend in the `impeller-infra` crate, which implements these
//! traits.

pub mod api;
pub mod error;
pub mod settings;
pub mod traits;

// Re-export the most important traits and types for easier use.
pub use self::api::*;
pub use self::error::{PipelineError, RenderError, ResourceError, ShaderError};
pub use self::settings::{ContextSettings, InstanceRetention, Workarounds};
pub use self::traits::{
    Allocator, Capabilities, Context, DeviceBuffer, Pipeline, PipelineLibrary, ShaderLibrary,
    Texture,
};
