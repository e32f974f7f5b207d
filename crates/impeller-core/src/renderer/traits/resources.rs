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

use crate::renderer::api::buffer::DeviceBufferDescriptor;
use crate::renderer::api::pipeline::PipelineDescriptor;
use crate::renderer::api::texture::TextureDescriptor;
use crate::renderer::error::ResourceError;
use std::any::Any;
use std::fmt::Debug;

/// A block of device memory created by an [`Allocator`](super::Allocator).
pub trait DeviceBuffer: Send + Sync + Debug + 'static {
    /// The descriptor the buffer was created from.
    fn descriptor(&self) -> &DeviceBufferDescriptor;

    /// Copies `data` into the buffer at `offset`.
    /// ## Arguments
    /// * `offset` - Byte offset into the buffer.
    /// * `data` - The bytes to write.
    /// ## Errors
    /// * `ResourceError::NotHostVisible` - If the buffer is not mapped on the host.
    /// * `ResourceError::OutOfBounds` - If the write would overflow the buffer.
    /// * `ResourceError::DeviceLost` - If the owning device is gone.
    fn write(&self, offset: usize, data: &[u8]) -> Result<(), ResourceError>;

    /// Reads `len` bytes starting at `offset`.
    /// ## Errors
    /// Same as [`DeviceBuffer::write`].
    fn read(&self, offset: usize, len: usize) -> Result<Vec<u8>, ResourceError>;

    /// Backend access for downcasting.
    fn as_any(&self) -> &dyn Any;
}

/// A texture created by an [`Allocator`](super::Allocator).
pub trait Texture: Send + Sync + Debug + 'static {
    /// The descriptor the texture was created from.
    fn descriptor(&self) -> &TextureDescriptor;

    /// Returns `true` if the texture is backed by live device memory.
    fn is_valid(&self) -> bool;

    /// Backend access for downcasting.
    fn as_any(&self) -> &dyn Any;
}

impl dyn Texture {
    /// Checked downcast to a backend texture.
    pub fn downcast_ref<T: Texture>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }
}

impl dyn DeviceBuffer {
    /// Checked downcast to a backend buffer.
    pub fn downcast_ref<T: DeviceBuffer>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }
}

/// A compiled graphics pipeline.
pub trait Pipeline: Send + Sync + Debug + 'static {
    /// The descriptor the pipeline was compiled from.
    fn descriptor(&self) -> &PipelineDescriptor;

    /// Returns `true` if the backend object exists.
    fn is_valid(&self) -> bool;

    /// Backend access for downcasting.
    fn as_any(&self) -> &dyn Any;
}

impl dyn Pipeline {
    /// Checked downcast to a backend pipeline.
    pub fn downcast_ref<T: Pipeline>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }
}
