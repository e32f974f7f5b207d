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

//! Defines data structures related to GPU texture resources.

use super::formats::{PixelFormat, SampleCount, StorageMode, TextureType, TextureUsage};
use crate::math::ISize;

/// A descriptor used to create a texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureDescriptor {
    /// Where the texture's memory lives.
    pub storage_mode: StorageMode,
    /// The kind of texture.
    pub texture_type: TextureType,
    /// The pixel format.
    pub format: PixelFormat,
    /// The size of the base mip level.
    pub size: ISize,
    /// The number of mip levels, at least 1.
    pub mip_count: u32,
    /// How the texture will be used.
    pub usage: TextureUsage,
    /// Samples per pixel. Must be greater than one exactly when the type is
    /// multisampled.
    pub sample_count: SampleCount,
}

impl Default for TextureDescriptor {
    fn default() -> Self {
        Self {
            storage_mode: StorageMode::DevicePrivate,
            texture_type: TextureType::Texture2D,
            format: PixelFormat::Unknown,
            size: ISize::new(0, 0),
            mip_count: 1,
            usage: TextureUsage::SHADER_READ,
            sample_count: SampleCount::Count1,
        }
    }
}

impl TextureDescriptor {
    /// Returns `true` if the sample count agrees with the texture type.
    pub fn sampling_options_are_valid(&self) -> bool {
        if self.texture_type.is_multisample() {
            self.sample_count.samples() > 1
        } else {
            self.sample_count.samples() == 1
        }
    }

    /// Returns `true` if a texture can be created from this descriptor.
    pub fn is_valid(&self) -> bool {
        self.format != PixelFormat::Unknown
            && !self.size.is_empty()
            && self.mip_count >= 1
            && self.sampling_options_are_valid()
    }

    /// The size in bytes of the base mip level.
    pub fn byte_size_of_base_mip_level(&self) -> usize {
        if !self.is_valid() {
            return 0;
        }
        self.size.area() as usize * self.format.bytes_per_pixel()
    }

    /// Returns `true` if this texture will be used as a render pass attachment.
    pub fn is_render_target(&self) -> bool {
        self.usage.contains(TextureUsage::RENDER_TARGET)
    }
}
