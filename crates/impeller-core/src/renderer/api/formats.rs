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

//! Pixel formats, storage modes and the other closed enumerations that
//! describe GPU resources.
//!
//! Every query over [`PixelFormat`] is an exhaustive `match`, so adding a
//! format fails to compile until each query is updated.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The closed set of pixel formats understood by the renderer.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub enum PixelFormat {
    /// No format. Never valid for a resource.
    #[default]
    Unknown,
    /// 8-bit alpha only.
    A8UNormInt,
    /// 8-bit single channel.
    R8UNormInt,
    /// 8-bit two channel.
    R8G8UNormInt,
    /// 8-bit RGBA.
    R8G8B8A8UNormInt,
    /// 8-bit RGBA, sRGB encoded.
    R8G8B8A8UNormIntSRGB,
    /// 8-bit BGRA.
    B8G8R8A8UNormInt,
    /// 8-bit BGRA, sRGB encoded.
    B8G8R8A8UNormIntSRGB,
    /// 32-bit float RGBA.
    R32G32B32A32Float,
    /// 16-bit float RGBA.
    R16G16B16A16Float,
    /// 10-bit extended range BGR with padding.
    B10G10R10XR,
    /// 10-bit extended range BGR with padding, sRGB encoded.
    B10G10R10XRSRGB,
    /// 10-bit extended range BGRA.
    B10G10R10A10XR,
    /// 8-bit stencil.
    S8UInt,
    /// 24-bit depth with 8-bit stencil.
    D24UnormS8Uint,
    /// 32-bit float depth with 8-bit stencil.
    D32FloatS8UInt,
    /// 32-bit float depth.
    D32Float,
}

/// How a pixel format may be attached to a render pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttachmentKind {
    /// A color attachment.
    Color,
    /// A depth-only attachment.
    Depth,
    /// A stencil-only attachment.
    Stencil,
    /// A combined depth and stencil attachment.
    DepthStencil,
}

impl PixelFormat {
    /// Every pixel format, in declaration order.
    pub const ALL: [PixelFormat; 17] = [
        PixelFormat::Unknown,
        PixelFormat::A8UNormInt,
        PixelFormat::R8UNormInt,
        PixelFormat::R8G8UNormInt,
        PixelFormat::R8G8B8A8UNormInt,
        PixelFormat::R8G8B8A8UNormIntSRGB,
        PixelFormat::B8G8R8A8UNormInt,
        PixelFormat::B8G8R8A8UNormIntSRGB,
        PixelFormat::R32G32B32A32Float,
        PixelFormat::R16G16B16A16Float,
        PixelFormat::B10G10R10XR,
        PixelFormat::B10G10R10XRSRGB,
        PixelFormat::B10G10R10A10XR,
        PixelFormat::S8UInt,
        PixelFormat::D24UnormS8Uint,
        PixelFormat::D32FloatS8UInt,
        PixelFormat::D32Float,
    ];

    /// The size of one pixel in bytes.
    pub const fn bytes_per_pixel(&self) -> usize {
        match self {
            PixelFormat::Unknown => 0,
            PixelFormat::A8UNormInt | PixelFormat::R8UNormInt | PixelFormat::S8UInt => 1,
            PixelFormat::R8G8UNormInt => 2,
            PixelFormat::R8G8B8A8UNormInt
            | PixelFormat::R8G8B8A8UNormIntSRGB
            | PixelFormat::B8G8R8A8UNormInt
            | PixelFormat::B8G8R8A8UNormIntSRGB
            | PixelFormat::B10G10R10XR
            | PixelFormat::B10G10R10XRSRGB
            | PixelFormat::D24UnormS8Uint
            | PixelFormat::D32Float => 4,
            PixelFormat::D32FloatS8UInt => 5,
            PixelFormat::R16G16B16A16Float | PixelFormat::B10G10R10A10XR => 8,
            PixelFormat::R32G32B32A32Float => 16,
        }
    }

    /// Returns `true` if the format carries a depth component.
    pub const fn is_depth_writable(&self) -> bool {
        match self {
            PixelFormat::D24UnormS8Uint | PixelFormat::D32FloatS8UInt | PixelFormat::D32Float => {
                true
            }
            PixelFormat::Unknown
            | PixelFormat::A8UNormInt
            | PixelFormat::R8UNormInt
            | PixelFormat::R8G8UNormInt
            | PixelFormat::R8G8B8A8UNormInt
            | PixelFormat::R8G8B8A8UNormIntSRGB
            | PixelFormat::B8G8R8A8UNormInt
            | PixelFormat::B8G8R8A8UNormIntSRGB
            | PixelFormat::R32G32B32A32Float
            | PixelFormat::R16G16B16A16Float
            | PixelFormat::B10G10R10XR
            | PixelFormat::B10G10R10XRSRGB
            | PixelFormat::B10G10R10A10XR
            | PixelFormat::S8UInt => false,
        }
    }

    /// Returns `true` if the format carries a stencil component.
    pub const fn is_stencil_writable(&self) -> bool {
        match self {
            PixelFormat::S8UInt | PixelFormat::D24UnormS8Uint | PixelFormat::D32FloatS8UInt => {
                true
            }
            PixelFormat::Unknown
            | PixelFormat::A8UNormInt
            | PixelFormat::R8UNormInt
            | PixelFormat::R8G8UNormInt
            | PixelFormat::R8G8B8A8UNormInt
            | PixelFormat::R8G8B8A8UNormIntSRGB
            | PixelFormat::B8G8R8A8UNormInt
            | PixelFormat::B8G8R8A8UNormIntSRGB
            | PixelFormat::R32G32B32A32Float
            | PixelFormat::R16G16B16A16Float
            | PixelFormat::B10G10R10XR
            | PixelFormat::B10G10R10XRSRGB
            | PixelFormat::B10G10R10A10XR
            | PixelFormat::D32Float => false,
        }
    }

    /// Classifies the format by attachment role. `None` only for
    /// [`PixelFormat::Unknown`].
    pub const fn attachment_kind(&self) -> Option<AttachmentKind> {
        match self {
            PixelFormat::Unknown => None,
            PixelFormat::S8UInt => Some(AttachmentKind::Stencil),
            PixelFormat::D24UnormS8Uint | PixelFormat::D32FloatS8UInt => {
                Some(AttachmentKind::DepthStencil)
            }
            PixelFormat::D32Float => Some(AttachmentKind::Depth),
            PixelFormat::A8UNormInt
            | PixelFormat::R8UNormInt
            | PixelFormat::R8G8UNormInt
            | PixelFormat::R8G8B8A8UNormInt
            | PixelFormat::R8G8B8A8UNormIntSRGB
            | PixelFormat::B8G8R8A8UNormInt
            | PixelFormat::B8G8R8A8UNormIntSRGB
            | PixelFormat::R32G32B32A32Float
            | PixelFormat::R16G16B16A16Float
            | PixelFormat::B10G10R10XR
            | PixelFormat::B10G10R10XRSRGB
            | PixelFormat::B10G10R10A10XR => Some(AttachmentKind::Color),
        }
    }

    /// Returns `true` if the format can be a color attachment.
    #[inline]
    pub const fn is_color(&self) -> bool {
        matches!(self.attachment_kind(), Some(AttachmentKind::Color))
    }

    /// The name of the format.
    pub const fn name(&self) -> &'static str {
        match self {
            PixelFormat::Unknown => "Unknown",
            PixelFormat::A8UNormInt => "A8UNormInt",
            PixelFormat::R8UNormInt => "R8UNormInt",
            PixelFormat::R8G8UNormInt => "R8G8UNormInt",
            PixelFormat::R8G8B8A8UNormInt => "R8G8B8A8UNormInt",
            PixelFormat::R8G8B8A8UNormIntSRGB => "R8G8B8A8UNormIntSRGB",
            PixelFormat::B8G8R8A8UNormInt => "B8G8R8A8UNormInt",
            PixelFormat::B8G8R8A8UNormIntSRGB => "B8G8R8A8UNormIntSRGB",
            PixelFormat::R32G32B32A32Float => "R32G32B32A32Float",
            PixelFormat::R16G16B16A16Float => "R16G16B16A16Float",
            PixelFormat::B10G10R10XR => "B10G10R10XR",
            PixelFormat::B10G10R10XRSRGB => "B10G10R10XRSRGB",
            PixelFormat::B10G10R10A10XR => "B10G10R10A10XR",
            PixelFormat::S8UInt => "S8UInt",
            PixelFormat::D24UnormS8Uint => "D24UnormS8Uint",
            PixelFormat::D32FloatS8UInt => "D32FloatS8UInt",
            PixelFormat::D32Float => "D32Float",
        }
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Where a resource's memory lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum StorageMode {
    /// Memory the host can map, read and write.
    HostVisible,
    /// Memory only the device accesses.
    #[default]
    DevicePrivate,
    /// Device memory whose contents never outlive a render pass. Render
    /// targets in this mode may be memoryless when the device supports it.
    DeviceTransient,
}

impl fmt::Display for StorageMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StorageMode::HostVisible => "HostVisible",
            StorageMode::DevicePrivate => "DevicePrivate",
            StorageMode::DeviceTransient => "DeviceTransient",
        };
        f.write_str(name)
    }
}

bitflags! {
    /// The ways a texture may be used.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct TextureUsage: u32 {
        /// Sampled or read in a shader.
        const SHADER_READ = 1 << 0;
        /// Written from a shader.
        const SHADER_WRITE = 1 << 1;
        /// Used as a render pass attachment.
        const RENDER_TARGET = 1 << 2;
    }
}

/// The kind of texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TextureType {
    /// A 2D texture.
    #[default]
    Texture2D,
    /// A multisampled 2D texture.
    Texture2DMultisample,
    /// A cube map.
    TextureCube,
}

impl TextureType {
    /// Returns `true` for multisampled texture types.
    pub const fn is_multisample(&self) -> bool {
        matches!(self, TextureType::Texture2DMultisample)
    }
}

/// The number of samples per pixel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum SampleCount {
    /// One sample per pixel.
    #[default]
    Count1,
    /// Four samples per pixel.
    Count4,
}

impl SampleCount {
    /// The number of samples.
    pub const fn samples(&self) -> u32 {
        match self {
            SampleCount::Count1 => 1,
            SampleCount::Count4 => 4,
        }
    }
}

/// What happens to an attachment's contents when a render pass begins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LoadAction {
    /// Previous contents are undefined.
    #[default]
    DontCare,
    /// Previous contents are preserved.
    Load,
    /// Contents are cleared to the attachment's clear value.
    Clear,
}

/// What happens to an attachment's contents when a render pass ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum StoreAction {
    /// Contents may be discarded.
    #[default]
    DontCare,
    /// Contents are written back to memory.
    Store,
    /// The multisampled contents are resolved into the resolve texture and
    /// discarded.
    MultisampleResolve,
    /// The multisampled contents are resolved and also stored.
    StoreAndMultisampleResolve,
}

impl StoreAction {
    /// Returns `true` if this action writes into a resolve attachment.
    pub const fn performs_resolve(&self) -> bool {
        matches!(
            self,
            StoreAction::MultisampleResolve | StoreAction::StoreAndMultisampleResolve
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bytes_per_pixel() {
        assert_eq!(PixelFormat::Unknown.bytes_per_pixel(), 0);
        assert_eq!(PixelFormat::A8UNormInt.bytes_per_pixel(), 1);
        assert_eq!(PixelFormat::R8G8UNormInt.bytes_per_pixel(), 2);
        assert_eq!(PixelFormat::R8G8B8A8UNormInt.bytes_per_pixel(), 4);
        assert_eq!(PixelFormat::D32FloatS8UInt.bytes_per_pixel(), 5);
        assert_eq!(PixelFormat::B10G10R10A10XR.bytes_per_pixel(), 8);
        assert_eq!(PixelFormat::R32G32B32A32Float.bytes_per_pixel(), 16);
    }

    #[test]
    fn test_attachment_kind_is_never_ambiguous() {
        for format in PixelFormat::ALL {
            let kind = format.attachment_kind();
            if format == PixelFormat::Unknown {
                assert_eq!(kind, None);
                continue;
            }
            let expected = match (format.is_depth_writable(), format.is_stencil_writable()) {
                (true, true) => AttachmentKind::DepthStencil,
                (true, false) => AttachmentKind::Depth,
                (false, true) => AttachmentKind::Stencil,
                (false, false) => AttachmentKind::Color,
            };
            assert_eq!(kind, Some(expected), "{format}");
        }
    }

    #[test]
    fn test_depth_and_stencil_writability() {
        assert!(PixelFormat::D24UnormS8Uint.is_depth_writable());
        assert!(PixelFormat::D24UnormS8Uint.is_stencil_writable());
        assert!(PixelFormat::D32Float.is_depth_writable());
        assert!(!PixelFormat::D32Float.is_stencil_writable());
        assert!(PixelFormat::S8UInt.is_stencil_writable());
        assert!(!PixelFormat::S8UInt.is_depth_writable());
        assert!(!PixelFormat::B8G8R8A8UNormInt.is_depth_writable());
    }

    #[test]
    fn test_display_names() {
        assert_eq!(PixelFormat::R8G8B8A8UNormInt.to_string(), "R8G8B8A8UNormInt");
        assert_eq!(PixelFormat::D32FloatS8UInt.to_string(), "D32FloatS8UInt");
        assert_eq!(StorageMode::DeviceTransient.to_string(), "DeviceTransient");
    }

    #[test]
    fn test_store_action_resolve() {
        assert!(!StoreAction::Store.performs_resolve());
        assert!(!StoreAction::DontCare.performs_resolve());
        assert!(StoreAction::MultisampleResolve.performs_resolve());
        assert!(StoreAction::StoreAndMultisampleResolve.performs_resolve());
    }
}
