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

use crate::renderer::api::formats::PixelFormat;
use std::fmt::Debug;

/// Read-only queries about what a backend supports.
///
/// Every value is queried once when the backend is created. Queries are
/// side-effect free and safe to call from any thread.
pub trait Capabilities: Send + Sync + Debug + 'static {
    /// Returns `false` if a required feature was missing at creation. An
    /// invalid capabilities object answers `false` to every support query.
    fn is_valid(&self) -> bool;

    /// The format of onscreen and default offscreen color targets.
    fn default_color_format(&self) -> PixelFormat;

    /// The preferred stencil-only format.
    fn default_stencil_format(&self) -> PixelFormat;

    /// The preferred combined depth-stencil format.
    fn default_depth_stencil_format(&self) -> PixelFormat;

    /// Whether offscreen targets can be multisampled.
    fn supports_offscreen_msaa(&self) -> bool;

    /// Whether shader storage buffers are available.
    fn supports_ssbo(&self) -> bool;

    /// Whether a fragment shader may read the attachment it writes.
    fn supports_framebuffer_fetch(&self) -> bool;

    /// Whether device-transient textures can be memoryless.
    fn supports_device_transient_textures(&self) -> bool;

    /// Whether the triangle-fan topology is available.
    fn supports_triangle_fan(&self) -> bool;

    /// Whether compute pipelines are available.
    fn supports_compute(&self) -> bool;
}
