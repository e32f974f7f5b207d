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

//! Defines data structures related to GPU buffer resources.

use super::formats::StorageMode;
use crate::renderer::traits::DeviceBuffer;
use std::fmt;
use std::ops::Range;
use std::sync::Arc;

/// A descriptor used to create a [`DeviceBuffer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct DeviceBufferDescriptor {
    /// Where the buffer's memory lives.
    pub storage_mode: StorageMode,
    /// The size of the buffer in bytes.
    pub size: usize,
    /// If `true`, the host reads the buffer back after the device writes it.
    /// Readback buffers are never carved out of a shared pool.
    pub readback: bool,
}

impl DeviceBufferDescriptor {
    /// A host-visible buffer of `size` bytes.
    pub fn host_visible(size: usize) -> Self {
        Self {
            storage_mode: StorageMode::HostVisible,
            size,
            readback: false,
        }
    }
}

/// A byte range inside a [`DeviceBuffer`], used to bind vertex, index and
/// uniform data.
#[derive(Clone)]
pub struct BufferView {
    /// The buffer holding the data.
    pub buffer: Arc<dyn DeviceBuffer>,
    /// The byte range within the buffer.
    pub range: Range<usize>,
}

impl BufferView {
    /// A view over the whole buffer.
    pub fn whole(buffer: Arc<dyn DeviceBuffer>) -> Self {
        let len = buffer.descriptor().size;
        Self {
            buffer,
            range: 0..len,
        }
    }

    /// The length of the view in bytes.
    pub fn len(&self) -> usize {
        self.range.len()
    }

    /// Returns `true` if the view covers no bytes.
    pub fn is_empty(&self) -> bool {
        self.range.is_empty()
    }
}

impl fmt::Debug for BufferView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferView")
            .field("buffer", &self.buffer.descriptor())
            .field("range", &self.range)
            .finish()
    }
}
