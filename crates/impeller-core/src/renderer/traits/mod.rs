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

//! Defines the core architectural traits for the rendering subsystem.
//!
//! Each backend responsibility is a separate, flat interface:
//!
//! - [`Allocator`]: Creates buffers and textures.
//! - [`Capabilities`]: Answers feature queries answered at creation time.
//! - [`PipelineLibrary`]: Compiles and caches pipelines asynchronously.
//! - [`ShaderLibrary`]: Holds registered shader bytecode.
//! - [`Context`]: Owns and hands out the above for one device.
//! - [`DeviceBuffer`], [`Texture`], [`Pipeline`]: Backend resources.

mod allocator;
mod capabilities;
mod context;
mod pipeline_library;
mod resources;
mod shader_library;

pub use self::allocator::Allocator;
pub use self::capabilities::Capabilities;
pub use self::context::Context;
pub use self::pipeline_library::PipelineLibrary;
pub use self::resources::{DeviceBuffer, Pipeline, Texture};
pub use self::shader_library::ShaderLibrary;
