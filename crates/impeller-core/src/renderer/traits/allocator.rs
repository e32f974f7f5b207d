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

use super::resources::{DeviceBuffer, Texture};
use crate::math::ISize;
use crate::renderer::api::buffer::DeviceBufferDescriptor;
use crate::renderer::api::texture::TextureDescriptor;
use std::fmt::Debug;
use std::sync::Arc;

/// Turns buffer and texture descriptors into device-resident resources.
///
/// Failures are reported through the validation log and surface as `None`.
/// Callers skip the affected draw instead of treating `None` as fatal.
pub trait Allocator: Send + Sync + Debug + 'static {
    /// Creates a buffer.
    /// ## Arguments
    /// * `descriptor` - Size, storage mode and readback intent.
    /// ## Returns
    /// The buffer, or `None` if the device could not satisfy the request.
    fn create_buffer(&self, descriptor: &DeviceBufferDescriptor) -> Option<Arc<dyn DeviceBuffer>>;

    /// Creates a texture.
    ///
    /// Device-transient render targets may be backed by memoryless storage
    /// when the device supports it. Otherwise they silently fall back to
    /// device-private memory.
    /// ## Returns
    /// The texture, or `None` if the descriptor is invalid or the device is
    /// out of memory.
    fn create_texture(&self, descriptor: &TextureDescriptor) -> Option<Arc<dyn Texture>>;

    /// The largest 2D texture the device can create.
    fn max_texture_size_supported(&self) -> ISize;
}
