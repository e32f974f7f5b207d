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

use crate::renderer::api::pipeline::{
    ComputePipelineDescriptor, PipelineDescriptor, PipelineFuture,
};
use crate::renderer::api::shader::ShaderFunction;
use std::fmt::Debug;

/// A deduplicating, asynchronous pipeline compiler.
pub trait PipelineLibrary: Send + Sync + Debug + 'static {
    /// Returns `false` if the library could not be created.
    fn is_valid(&self) -> bool;

    /// Looks up or starts compiling the pipeline for `descriptor`.
    ///
    /// Never blocks. Value-equal descriptors share one future, and at most
    /// one compilation runs for a given descriptor.
    /// ## Arguments
    /// * `descriptor` - The cache key.
    /// ## Returns
    /// A future resolving to the pipeline, or to `None` if compilation failed.
    fn get_pipeline(&self, descriptor: PipelineDescriptor) -> PipelineFuture;

    /// Looks up or starts compiling a compute pipeline.
    ///
    /// Compute pipelines are not available on any backend yet, so the
    /// returned future is always resolved to `None`.
    fn get_compute_pipeline(&self, descriptor: ComputePipelineDescriptor) -> PipelineFuture;

    /// Evicts every cached pipeline that uses `function` in any stage.
    ///
    /// Used when a shader is hot-reloaded. In-flight futures stay valid.
    fn remove_pipelines_with_entry_point(&self, function: &ShaderFunction);
}
